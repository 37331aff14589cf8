//! Third-party credentials for blob storage and the vision service.
//!
//! Credentials are resolved once, validated, and then handed to the pipeline
//! by value. Two sources exist:
//! - [`EnvCredentials`]: the process environment (after `.env` loading)
//! - [`RemoteCredentials`]: `GET /config` on a running floralbot server

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ConfigError;

pub const STORAGE_ACCOUNT: &str = "STORAGE_ACCOUNT";
pub const STORAGE_CONTAINER: &str = "STORAGE_CONTAINER";
pub const SAS_TOKEN: &str = "SAS_TOKEN";
pub const VISION_ENDPOINT: &str = "VISION_ENDPOINT";
pub const VISION_API_KEY: &str = "VISION_API_KEY";

const REQUIRED: [&str; 5] = [
    STORAGE_ACCOUNT,
    STORAGE_CONTAINER,
    SAS_TOKEN,
    VISION_ENDPOINT,
    VISION_API_KEY,
];

/// The five named values the page needs to talk to storage and vision.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Credentials {
    pub storage_account: String,
    pub storage_container: String,
    /// Always starts with `?` once validated.
    pub sas_token: String,
    pub vision_endpoint: String,
    pub vision_api_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("storage_account", &self.storage_account)
            .field("storage_container", &self.storage_container)
            .field("sas_token", &"<redacted>")
            .field("vision_endpoint", &self.vision_endpoint)
            .field("vision_api_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Build credentials from a name → value lookup, reporting every missing
    /// name at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let missing: Vec<&'static str> = REQUIRED
            .iter()
            .copied()
            .filter(|name| value(*name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let creds = Self {
            storage_account: value(STORAGE_ACCOUNT).unwrap_or_default(),
            storage_container: value(STORAGE_CONTAINER).unwrap_or_default(),
            sas_token: value(SAS_TOKEN).unwrap_or_default(),
            vision_endpoint: value(VISION_ENDPOINT).unwrap_or_default(),
            vision_api_key: value(VISION_API_KEY).unwrap_or_default(),
        };
        creds.validated()
    }

    /// Check non-emptiness and normalize the SAS token into a query suffix.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        let missing: Vec<&'static str> = [
            (STORAGE_ACCOUNT, &self.storage_account),
            (STORAGE_CONTAINER, &self.storage_container),
            (SAS_TOKEN, &self.sas_token),
            (VISION_ENDPOINT, &self.vision_endpoint),
            (VISION_API_KEY, &self.vision_api_key),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(name, _)| name)
        .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let token = self.sas_token.trim().to_string();
        if token.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid {
                field: SAS_TOKEN,
                reason: "token contains whitespace".to_string(),
            });
        }
        if !token.starts_with('?') {
            debug!("prefixing SAS token with '?'");
            self.sas_token = format!("?{token}");
        } else {
            self.sas_token = token;
        }

        if reqwest::Url::parse(&self.vision_endpoint).is_err() {
            return Err(ConfigError::Invalid {
                field: VISION_ENDPOINT,
                reason: format!("'{}' is not a URL", self.vision_endpoint),
            });
        }

        Ok(self)
    }
}

/// Presence of each credential in the environment, without the values.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvReport {
    pub env_vars: BTreeMap<String, String>,
    pub sas_token_info: Option<SasTokenInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SasTokenInfo {
    pub starts_with_question: bool,
    pub length: usize,
    pub first_char: Option<char>,
    pub has_spaces: bool,
}

impl EnvReport {
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_vars = REQUIRED
            .iter()
            .copied()
            .map(|name| {
                let status = match lookup(name) {
                    Some(v) if name == SAS_TOKEN && !v.is_empty() => {
                        format!("Present ({} chars)", v.chars().count())
                    }
                    Some(v) if !v.is_empty() => "Present".to_string(),
                    _ => "Missing".to_string(),
                };
                (name.to_string(), status)
            })
            .collect();

        let sas_token_info = lookup(SAS_TOKEN).map(|token| SasTokenInfo {
            starts_with_question: token.starts_with('?'),
            length: token.chars().count(),
            first_char: token.chars().next(),
            has_spaces: token.chars().any(char::is_whitespace),
        });

        Self {
            env_vars,
            sas_token_info,
        }
    }

    /// Log presence of each value. Secrets never reach the log.
    pub fn log(&self) {
        for (name, status) in &self.env_vars {
            if status == "Missing" {
                warn!("{name}: {status}");
            } else {
                info!("{name}: {status}");
            }
        }
    }
}

pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Something that can hand out validated credentials.
#[allow(async_fn_in_trait)]
pub trait CredentialProvider {
    async fn credentials(&self) -> Result<Credentials, ConfigError>;
}

/// Reads credentials from the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl CredentialProvider for EnvCredentials {
    async fn credentials(&self) -> Result<Credentials, ConfigError> {
        Credentials::from_lookup(env_lookup)
    }
}

/// Fetches credentials from a floralbot server's `/config` endpoint.
#[derive(Debug, Clone)]
pub struct RemoteCredentials {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ConfigErrorBody {
    error: String,
}

impl RemoteCredentials {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn config_url(&self) -> String {
        format!("{}/config", self.base_url.trim_end_matches('/'))
    }
}

impl CredentialProvider for RemoteCredentials {
    async fn credentials(&self) -> Result<Credentials, ConfigError> {
        let url = self.config_url();
        debug!("fetching credentials from {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ConfigError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ConfigErrorBody>(&text)
                .map(|b| b.error)
                .unwrap_or_else(|_| format!("status {status}: {text}"));
            return Err(ConfigError::Fetch(message));
        }

        let creds: Credentials = response
            .json()
            .await
            .map_err(|e| ConfigError::Fetch(e.to_string()))?;
        creds.validated()
    }
}
