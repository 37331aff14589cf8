//! Vision client: one analyze call per image covering objects, colors,
//! description and tags.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::capture::ImageAsset;
use crate::config::Credentials;
use crate::error::PipelineError;

const ANALYZE_PATH: &str = "/vision/v3.2/analyze";
const ANALYZE_QUERY: &str =
    "visualFeatures=Objects,Color,Description,Tags&language=en&model-version=latest";
const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub object: String,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorInfo {
    pub dominant_colors: Option<Vec<String>>,
    pub dominant_color_foreground: Option<String>,
    pub dominant_color_background: Option<String>,
    pub accent_color: Option<String>,
    pub is_bw_img: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caption {
    pub text: String,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Description {
    pub captions: Option<Vec<Caption>>,
    pub tags: Option<Vec<String>>,
}

/// Analyze response. Every section is optional; absent or `null` sections
/// read as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionResult {
    pub tags: Option<Vec<Tag>>,
    pub objects: Option<Vec<DetectedObject>>,
    pub color: Option<ColorInfo>,
    pub description: Option<Description>,
}

impl VisionResult {
    pub fn tags(&self) -> &[Tag] {
        self.tags.as_deref().unwrap_or_default()
    }

    pub fn objects(&self) -> &[DetectedObject] {
        self.objects.as_deref().unwrap_or_default()
    }

    pub fn dominant_colors(&self) -> &[String] {
        self.color
            .as_ref()
            .and_then(|c| c.dominant_colors.as_deref())
            .unwrap_or_default()
    }

    pub fn first_caption(&self) -> Option<&str> {
        self.description
            .as_ref()
            .and_then(|d| d.captions.as_deref())
            .and_then(|c| c.first())
            .map(|c| c.text.as_str())
    }
}

/// Parsed result plus the raw payload kept for the diagnostics panel.
#[derive(Debug, Clone)]
pub struct VisionResponse {
    pub result: VisionResult,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct VisionClient {
    client: reqwest::Client,
    deadline: Option<Duration>,
}

impl VisionClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn analyze_url(endpoint: &str) -> String {
        format!(
            "{}{ANALYZE_PATH}?{ANALYZE_QUERY}",
            endpoint.trim_end_matches('/')
        )
    }

    /// POST the raw image bytes. Any non-2xx is [`PipelineError::Api`].
    pub async fn analyze(
        &self,
        asset: &ImageAsset,
        creds: &Credentials,
    ) -> Result<VisionResponse, PipelineError> {
        let url = Self::analyze_url(&creds.vision_endpoint);
        debug!("analyzing {} ({} bytes)", asset.name, asset.len());

        let mut request = self
            .client
            .post(&url)
            .header(SUBSCRIPTION_KEY_HEADER, &creds.vision_api_key)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(asset.bytes.clone());
        if let Some(deadline) = self.deadline {
            request = request.timeout(deadline);
        }

        let response = request.send().await.map_err(|e| PipelineError::Transport {
            stage: "vision",
            source: e,
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| PipelineError::Transport {
            stage: "vision",
            source: e,
        })?;

        if !status.is_success() {
            return Err(PipelineError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let raw: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| PipelineError::Decode(format!("vision response: {e}")))?;
        let result: VisionResult = serde_json::from_value(raw.clone())
            .map_err(|e| PipelineError::Decode(format!("vision response: {e}")))?;

        info!(
            "vision returned {} tag(s), {} object(s)",
            result.tags().len(),
            result.objects().len()
        );
        Ok(VisionResponse { result, raw })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_bytes, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn creds(endpoint: &str) -> Credentials {
        Credentials {
            storage_account: "floralstore".to_string(),
            storage_container: "uploads".to_string(),
            sas_token: "?sig=x".to_string(),
            vision_endpoint: endpoint.to_string(),
            vision_api_key: "vision-key".to_string(),
        }
    }

    fn asset() -> ImageAsset {
        ImageAsset::with_timestamp(vec![1, 2, 3, 4, 5], "image/jpeg", "daisy.jpg", 7)
    }

    #[test]
    fn analyze_url_requests_all_features_at_once() {
        assert_eq!(
            VisionClient::analyze_url("https://vision.example.com/"),
            "https://vision.example.com/vision/v3.2/analyze?visualFeatures=Objects,Color,Description,Tags&language=en&model-version=latest"
        );
    }

    #[test]
    fn empty_object_parses_to_empty_sections() {
        let result: VisionResult = serde_json::from_str("{}").unwrap();
        assert!(result.tags().is_empty());
        assert!(result.objects().is_empty());
        assert!(result.dominant_colors().is_empty());
        assert_eq!(result.first_caption(), None);
    }

    #[test]
    fn null_sections_parse_to_empty() {
        let result: VisionResult = serde_json::from_value(json!({
            "tags": null,
            "objects": null,
            "color": { "dominantColors": null },
            "description": { "captions": [] }
        }))
        .unwrap();
        assert!(result.tags().is_empty());
        assert!(result.dominant_colors().is_empty());
        assert_eq!(result.first_caption(), None);
    }

    #[test]
    fn full_response_parses() {
        let result: VisionResult = serde_json::from_value(json!({
            "tags": [{ "name": "flower", "confidence": 0.99 }],
            "objects": [{
                "rectangle": { "x": 1, "y": 2, "w": 3, "h": 4 },
                "object": "flower",
                "confidence": 0.7,
                "parent": { "object": "plant", "confidence": 0.8 }
            }],
            "color": {
                "dominantColorForeground": "Pink",
                "dominantColorBackground": "Green",
                "dominantColors": ["Pink", "Green"],
                "accentColor": "C8347A",
                "isBwImg": false
            },
            "description": {
                "tags": ["flower", "pink"],
                "captions": [{ "text": "a pink flower", "confidence": 0.5 }]
            },
            "requestId": "abc",
            "modelVersion": "2021-05-01"
        }))
        .unwrap();
        assert_eq!(result.tags()[0].name, "flower");
        assert_eq!(result.objects()[0].confidence, 0.7);
        assert_eq!(result.dominant_colors(), ["Pink", "Green"]);
        assert_eq!(result.first_caption(), Some("a pink flower"));
    }

    #[tokio::test]
    async fn posts_raw_bytes_with_subscription_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/vision/v3.2/analyze"))
            .and(query_param("visualFeatures", "Objects,Color,Description,Tags"))
            .and(query_param("language", "en"))
            .and(query_param("model-version", "latest"))
            .and(header("Ocp-Apim-Subscription-Key", "vision-key"))
            .and(header("content-type", "application/octet-stream"))
            .and(body_bytes(vec![1, 2, 3, 4, 5]))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tags": [{ "name": "daisy", "confidence": 0.9 }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = VisionClient::new(reqwest::Client::new());
        let response = client.analyze(&asset(), &creds(&server.uri())).await.unwrap();
        assert_eq!(response.result.tags().len(), 1);
        assert_eq!(response.raw["tags"][0]["name"], "daisy");
    }

    #[tokio::test]
    async fn non_success_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Access denied"))
            .mount(&server)
            .await;

        let client = VisionClient::new(reqwest::Client::new());
        let err = client
            .analyze(&asset(), &creds(&server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Api { status: 401, .. }));
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = VisionClient::new(reqwest::Client::new());
        let err = client
            .analyze(&asset(), &creds(&server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }
}
