//! Error types for the capture → upload → analyze pipeline.

use axum::http::StatusCode;

/// Missing or unusable credentials. Fatal for the whole page.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration values: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("could not fetch configuration: {0}")]
    Fetch(String),
}

/// Failure of a single pipeline stage. Each one aborts the current image only.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("camera unavailable: {0}")]
    Device(String),

    #[error("upload failed with status {status}: {body}")]
    Upload { status: u16, body: String },

    #[error("vision API returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("could not decode {0}")]
    Decode(String),

    #[error("{stage} request failed: {source}")]
    Transport {
        stage: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

impl PipelineError {
    /// Short message suitable for showing to the person who submitted the image.
    pub fn user_message(&self) -> &'static str {
        match self {
            PipelineError::Config(_) => {
                "The service is not configured. Please contact the administrator."
            }
            PipelineError::Device(_) => {
                "Unable to access the camera. You can still upload a photo instead."
            }
            PipelineError::Upload { .. } => "Failed to upload the image. Please try again.",
            PipelineError::Api { .. } => "Failed to analyze the image. Please try again.",
            PipelineError::Decode(_) => "Could not read the image. Please try another file.",
            PipelineError::Transport { .. } => {
                "The request could not be completed. Please try again."
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PipelineError::Device(_) => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::Upload { .. } | PipelineError::Api { .. } => StatusCode::BAD_GATEWAY,
            PipelineError::Decode(_) => StatusCode::BAD_REQUEST,
            PipelineError::Transport { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}
