//! Single-shot camera capture.
//!
//! A [`Camera`] is either idle or streaming. Streaming owns a
//! [`StreamGuard`], and dropping the guard stops every media track, so the
//! device is released on every path out of streaming: toggling off, a
//! completed capture, a failed capture, or the camera itself going away.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::{DynamicImage, ImageOutputFormat};
use tracing::{debug, info, warn};

use super::{ImageAsset, CAMERA_CAPTURE_NAME};
use crate::error::PipelineError;

const JPEG_QUALITY: u8 = 85;

/// Handle to one live media track. Clones share the same live flag.
#[derive(Debug, Clone)]
pub struct MediaTrack {
    label: String,
    live: Arc<AtomicBool>,
}

impl MediaTrack {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        if self.live.swap(false, Ordering::AcqRel) {
            debug!("stopped track {}", self.label);
        }
    }
}

/// An open stream from a video device.
pub trait VideoStream {
    fn tracks(&self) -> &[MediaTrack];

    /// Current frame of the stream.
    fn grab_frame(&mut self) -> Result<DynamicImage, PipelineError>;
}

/// A source of live video.
pub trait VideoDevice {
    type Stream: VideoStream;

    /// Acquire a stream. Fails with [`PipelineError::Device`] when the device
    /// is missing or access is denied.
    fn open(&mut self) -> Result<Self::Stream, PipelineError>;
}

/// Owns an open stream and stops all of its tracks when dropped.
pub struct StreamGuard<S: VideoStream> {
    stream: S,
}

impl<S: VideoStream> StreamGuard<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        self.stream.tracks()
    }

    pub fn grab_frame(&mut self) -> Result<DynamicImage, PipelineError> {
        self.stream.grab_frame()
    }
}

impl<S: VideoStream> Drop for StreamGuard<S> {
    fn drop(&mut self) {
        for track in self.stream.tracks() {
            track.stop();
        }
    }
}

enum CameraState<S: VideoStream> {
    Idle,
    Streaming(StreamGuard<S>),
}

/// Idle ⇄ Streaming state machine over a [`VideoDevice`].
pub struct Camera<D: VideoDevice> {
    device: D,
    state: CameraState<D::Stream>,
}

impl<D: VideoDevice> Camera<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            state: CameraState::Idle,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.state, CameraState::Streaming(_))
    }

    /// Tracks of the live stream, empty while idle.
    pub fn tracks(&self) -> &[MediaTrack] {
        match &self.state {
            CameraState::Streaming(guard) => guard.tracks(),
            CameraState::Idle => &[],
        }
    }

    /// Idle → Streaming, or Streaming → Idle with every track stopped.
    pub fn toggle(&mut self) -> Result<(), PipelineError> {
        match std::mem::replace(&mut self.state, CameraState::Idle) {
            CameraState::Idle => {
                let stream = self.device.open().map_err(|e| {
                    warn!("camera open failed: {e}");
                    e
                })?;
                info!("camera streaming with {} track(s)", stream.tracks().len());
                self.state = CameraState::Streaming(StreamGuard::new(stream));
            }
            CameraState::Streaming(guard) => {
                drop(guard);
                info!("camera stopped");
            }
        }
        Ok(())
    }

    /// Take one JPEG snapshot and return to idle. The stream is released
    /// whether or not encoding succeeds.
    pub fn capture(&mut self) -> Result<ImageAsset, PipelineError> {
        let mut guard = match std::mem::replace(&mut self.state, CameraState::Idle) {
            CameraState::Streaming(guard) => guard,
            CameraState::Idle => {
                return Err(PipelineError::Device("camera is not streaming".to_string()))
            }
        };

        let frame = guard.grab_frame()?;
        let bytes = encode_jpeg(frame)?;
        drop(guard);

        info!("captured {} byte snapshot", bytes.len());
        Ok(ImageAsset::new(bytes, "image/jpeg", CAMERA_CAPTURE_NAME))
    }
}

/// Draw the frame into an RGB raster buffer and encode it as JPEG.
fn encode_jpeg(frame: DynamicImage) -> Result<Vec<u8>, PipelineError> {
    let raster = DynamicImage::ImageRgb8(frame.to_rgb8());
    let mut bytes = Vec::new();
    raster
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Jpeg(JPEG_QUALITY))
        .map_err(|e| PipelineError::Decode(format!("camera frame: {e}")))?;
    Ok(bytes)
}

/// Video device backed by a still frame that an external capture daemon keeps
/// refreshing (for example a webcam tool writing `latest.jpg` once a second).
#[derive(Debug, Clone)]
pub struct StillFrameDevice {
    path: PathBuf,
}

impl StillFrameDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

pub struct StillFrameStream {
    path: PathBuf,
    tracks: Vec<MediaTrack>,
}

impl VideoDevice for StillFrameDevice {
    type Stream = StillFrameStream;

    fn open(&mut self) -> Result<Self::Stream, PipelineError> {
        let meta = std::fs::metadata(&self.path)
            .map_err(|e| PipelineError::Device(format!("{}: {e}", self.path.display())))?;
        if !meta.is_file() {
            return Err(PipelineError::Device(format!(
                "{} is not a frame file",
                self.path.display()
            )));
        }
        Ok(StillFrameStream {
            path: self.path.clone(),
            tracks: vec![MediaTrack::new(format!("video:{}", self.path.display()))],
        })
    }
}

impl VideoStream for StillFrameStream {
    fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    fn grab_frame(&mut self) -> Result<DynamicImage, PipelineError> {
        image::open(&self.path)
            .map_err(|e| PipelineError::Decode(format!("frame {}: {e}", self.path.display())))
    }
}
