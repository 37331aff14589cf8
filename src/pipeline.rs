//! One image, start to finish: upload → analyze → aggregate.
//!
//! A [`Pipeline`] carries the credentials it was built with; no stage reads
//! ambient state. Stages run strictly in sequence and the first failure
//! ends the run.

use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, info_span, Instrument};

use crate::aggregate::{aggregate, FlowerAnalysis};
use crate::capture::ImageAsset;
use crate::config::Credentials;
use crate::error::PipelineError;
use crate::presenter;
use crate::storage::{BlobUploader, RemoteImageRef, StorageEndpoint};
use crate::vision::VisionClient;

/// Transport settings shared by every remote call.
#[derive(Debug, Clone, Default)]
pub struct PipelineSettings {
    pub storage: StorageEndpoint,
    /// Per-request deadline. `None` waits indefinitely.
    pub deadline: Option<Duration>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutcome {
    pub image_url: RemoteImageRef,
    pub analysis: FlowerAnalysis,
    pub vision_response: serde_json::Value,
}

impl PipelineOutcome {
    pub fn html(&self) -> String {
        presenter::render_html(&self.analysis, &self.image_url)
    }

    pub fn text(&self) -> String {
        presenter::render_text(&self.analysis, &self.image_url)
    }

    pub fn diagnostics_html(&self) -> String {
        presenter::render_diagnostics(&self.image_url, &self.vision_response)
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    credentials: Credentials,
    uploader: BlobUploader,
    vision: VisionClient,
}

impl Pipeline {
    pub fn new(credentials: Credentials, uploader: BlobUploader, vision: VisionClient) -> Self {
        Self {
            credentials,
            uploader,
            vision,
        }
    }

    pub fn from_settings(
        credentials: Credentials,
        client: reqwest::Client,
        settings: &PipelineSettings,
    ) -> Self {
        let uploader = BlobUploader::new(client.clone(), settings.storage.clone())
            .with_deadline(settings.deadline);
        let vision = VisionClient::new(client).with_deadline(settings.deadline);
        Self::new(credentials, uploader, vision)
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub async fn run(&self, asset: ImageAsset) -> Result<PipelineOutcome, PipelineError> {
        let span = info_span!("pipeline", image = %asset.name, bytes = asset.len());
        self.run_stages(asset).instrument(span).await
    }

    async fn run_stages(&self, asset: ImageAsset) -> Result<PipelineOutcome, PipelineError> {
        let image_url = self
            .uploader
            .upload(&asset, &self.credentials)
            .await
            .map_err(|e| stage_failed("upload", e))?;

        let response = self
            .vision
            .analyze(&asset, &self.credentials)
            .await
            .map_err(|e| stage_failed("analyze", e))?;
        drop(asset);

        let analysis = aggregate(&response.result);
        info!(
            "found {} flower type(s), {} color(s)",
            analysis.flowers.len(),
            analysis.colors.len()
        );

        Ok(PipelineOutcome {
            image_url,
            analysis,
            vision_response: response.raw,
        })
    }
}

fn stage_failed(stage: &str, err: PipelineError) -> PipelineError {
    error!(stage, "{err}");
    err
}
