//! Blob uploader: one PUT of the raw image bytes to a SAS-signed URL.

use std::fmt;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::capture::ImageAsset;
use crate::config::Credentials;
use crate::error::{ConfigError, PipelineError};

pub const DEFAULT_STORAGE_HOST: &str = "blob.core.windows.net";
const BLOB_TYPE_HEADER: &str = "x-ms-blob-type";
const BLOCK_BLOB: &str = "BlockBlob";

/// Where blobs live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageEndpoint {
    /// `<scheme>://<account>.<host>/<container>/<blob>`
    AccountHost { scheme: String, host: String },
    /// `<base>/<container>/<blob>`, e.g. a local storage emulator.
    Base(Url),
}

impl Default for StorageEndpoint {
    fn default() -> Self {
        StorageEndpoint::AccountHost {
            scheme: "https".to_string(),
            host: DEFAULT_STORAGE_HOST.to_string(),
        }
    }
}

impl StorageEndpoint {
    pub fn from_settings(host: &str, base_override: Option<&str>) -> Result<Self, ConfigError> {
        match base_override {
            Some(base) => Url::parse(base)
                .map(StorageEndpoint::Base)
                .map_err(|e| ConfigError::Invalid {
                    field: "STORAGE_ENDPOINT",
                    reason: e.to_string(),
                }),
            None => Ok(StorageEndpoint::AccountHost {
                scheme: "https".to_string(),
                host: host.to_string(),
            }),
        }
    }

    /// Public URL of a blob, with no authorization attached.
    pub fn blob_url(&self, creds: &Credentials, blob_name: &str) -> Result<Url, PipelineError> {
        let mut url = match self {
            StorageEndpoint::AccountHost { scheme, host } => {
                let base = format!("{scheme}://{}.{host}/", creds.storage_account);
                Url::parse(&base).map_err(|e| invalid_endpoint(&base, e))?
            }
            StorageEndpoint::Base(base) => base.clone(),
        };
        if url.cannot_be_a_base() {
            return Err(invalid_endpoint(url.as_str(), "cannot be a base"));
        }
        url.path_segments_mut()
            .map_err(|()| invalid_endpoint(blob_name, "cannot be a base"))?
            .pop_if_empty()
            .push(&creds.storage_container)
            .push(blob_name);
        Ok(url)
    }
}

fn invalid_endpoint(url: &str, reason: impl fmt::Display) -> PipelineError {
    PipelineError::Config(ConfigError::Invalid {
        field: "STORAGE_ENDPOINT",
        reason: format!("{url}: {reason}"),
    })
}

/// Storage URL of an uploaded image, never carrying the SAS token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteImageRef(String);

impl RemoteImageRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct BlobUploader {
    client: reqwest::Client,
    endpoint: StorageEndpoint,
    deadline: Option<Duration>,
}

impl BlobUploader {
    pub fn new(client: reqwest::Client, endpoint: StorageEndpoint) -> Self {
        Self {
            client,
            endpoint,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// PUT the asset as a block blob. Single attempt; any non-2xx is an
    /// [`PipelineError::Upload`] carrying the response body.
    pub async fn upload(
        &self,
        asset: &ImageAsset,
        creds: &Credentials,
    ) -> Result<RemoteImageRef, PipelineError> {
        let public = self.endpoint.blob_url(creds, &asset.name)?;
        let mut signed = public.clone();
        signed.set_query(Some(creds.sas_token.trim_start_matches('?')));

        debug!("uploading {} bytes to {public}", asset.len());

        let mut request = self
            .client
            .put(signed)
            .header(BLOB_TYPE_HEADER, BLOCK_BLOB)
            .header(CONTENT_TYPE, &asset.mime_type)
            .body(asset.bytes.clone());
        if let Some(deadline) = self.deadline {
            request = request.timeout(deadline);
        }

        let response = request.send().await.map_err(|e| PipelineError::Transport {
            stage: "upload",
            source: e.without_url(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Upload {
                status: status.as_u16(),
                body,
            });
        }

        info!("uploaded {}", asset.name);
        Ok(RemoteImageRef(public.to_string()))
    }
}
