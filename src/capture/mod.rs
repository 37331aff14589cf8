//! Image acquisition: a picked file, an uploaded snapshot, or a camera frame.
//!
//! No validation of type or size happens here. Whatever bytes arrive are
//! forwarded; a bad payload fails later at the storage or vision call.

pub mod camera;

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose, Engine as _};
use tracing::debug;

use crate::error::PipelineError;

pub use camera::{Camera, MediaTrack, StillFrameDevice, StreamGuard, VideoDevice, VideoStream};

/// Name given to every camera snapshot before the blob prefix is applied.
pub const CAMERA_CAPTURE_NAME: &str = "camera-capture.jpg";

const FALLBACK_MIME: &str = "application/octet-stream";

/// Raw image payload ready for upload and analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// `flower-<epoch-millis>-<original-name>`
    pub name: String,
}

impl ImageAsset {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>, original_name: &str) -> Self {
        Self::with_timestamp(bytes, mime_type, original_name, epoch_millis())
    }

    pub fn with_timestamp(
        bytes: Vec<u8>,
        mime_type: impl Into<String>,
        original_name: &str,
        millis: u128,
    ) -> Self {
        let mime_type = mime_type.into();
        let mime_type = if mime_type.trim().is_empty() {
            FALLBACK_MIME.to_string()
        } else {
            mime_type
        };
        Self {
            bytes,
            mime_type,
            name: blob_name(original_name, millis),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

pub fn blob_name(original_name: &str, millis: u128) -> String {
    let original = Path::new(original_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("upload");
    format!("flower-{millis}-{original}")
}

fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Read a picked file from disk.
pub fn capture_from_file(path: &Path) -> Result<ImageAsset, PipelineError> {
    let bytes = std::fs::read(path)
        .map_err(|e| PipelineError::Decode(format!("file {}: {e}", path.display())))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    let mime = mime_from_path(path);
    debug!("captured {} bytes from {} ({mime})", bytes.len(), path.display());
    Ok(ImageAsset::new(bytes, mime, name))
}

/// Wrap bytes that arrived with a declared name and content type, e.g. a
/// multipart file field.
pub fn capture_from_upload(
    bytes: Vec<u8>,
    file_name: Option<&str>,
    content_type: Option<&str>,
) -> ImageAsset {
    let name = file_name.unwrap_or("upload");
    let mime = content_type
        .map(str::to_string)
        .unwrap_or_else(|| mime_from_path(Path::new(name)).to_string());
    ImageAsset::new(bytes, mime, name)
}

/// Decode a `data:<mime>;base64,<payload>` URL as produced by a canvas
/// snapshot in the browser.
pub fn capture_from_data_url(data_url: &str) -> Result<ImageAsset, PipelineError> {
    let rest = data_url
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| PipelineError::Decode("snapshot: not a data URL".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| PipelineError::Decode("snapshot: missing payload".to_string()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| PipelineError::Decode("snapshot: payload is not base64".to_string()))?;

    let bytes = general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| PipelineError::Decode(format!("snapshot: {e}")))?;
    Ok(ImageAsset::new(bytes, mime, CAMERA_CAPTURE_NAME))
}

fn mime_from_path(path: &Path) -> &'static str {
    use image::ImageFormat;

    match ImageFormat::from_path(path) {
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::Bmp) => "image/bmp",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Tiff) => "image/tiff",
        _ => FALLBACK_MIME,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn blob_name_keeps_original_file_name() {
        assert_eq!(blob_name("rose.jpg", 1700000000000), "flower-1700000000000-rose.jpg");
        assert_eq!(blob_name("/tmp/pics/rose.jpg", 5), "flower-5-rose.jpg");
        assert_eq!(blob_name("", 5), "flower-5-upload");
    }

    #[test]
    fn file_capture_accepts_anything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"not an image")
            .unwrap();

        let asset = capture_from_file(&path).unwrap();
        assert_eq!(asset.bytes, b"not an image");
        assert_eq!(asset.mime_type, FALLBACK_MIME);
        assert!(asset.name.starts_with("flower-"));
        assert!(asset.name.ends_with("-notes.txt"));
    }

    #[test]
    fn file_capture_guesses_image_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tulip.JPG");
        std::fs::write(&path, [0xFF, 0xD8, 0xFF]).unwrap();
        let asset = capture_from_file(&path).unwrap();
        assert_eq!(asset.mime_type, "image/jpeg");
    }

    #[test]
    fn missing_file_is_decode_error() {
        let err = capture_from_file(Path::new("/definitely/not/here.jpg")).unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }

    #[test]
    fn upload_prefers_declared_content_type() {
        let asset = capture_from_upload(vec![1, 2, 3], Some("lily.png"), Some("image/heic"));
        assert_eq!(asset.mime_type, "image/heic");
        assert!(asset.name.ends_with("-lily.png"));
    }

    #[test]
    fn data_url_decodes() {
        let encoded = general_purpose::STANDARD.encode([0xFFu8, 0xD8, 0xFF, 0xE0]);
        let asset = capture_from_data_url(&format!("data:image/jpeg;base64,{encoded}")).unwrap();
        assert_eq!(asset.bytes, vec![0xFF, 0xD8, 0xFF, 0xE0]);
        assert_eq!(asset.mime_type, "image/jpeg");
        assert!(asset.name.ends_with(CAMERA_CAPTURE_NAME));
    }

    #[test]
    fn malformed_data_url_is_decode_error() {
        for input in [
            "image/jpeg;base64,AAAA",
            "data:image/jpeg;base64",
            "data:image/jpeg,AAAA",
            "data:image/jpeg;base64,@@@",
        ] {
            let err = capture_from_data_url(input).unwrap_err();
            assert!(matches!(err, PipelineError::Decode(_)), "{input}");
        }
    }
}
