use std::env;
use std::time::Duration;

use anyhow::Context;

use crate::storage::BlobStoreConfig;

/// Process-wide configuration, assembled once at startup and read at request
/// time. Never mutated after construction.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Base URL of the upstream generative API, without a trailing slash.
    pub upstream_base_url: String,
    pub api_key: String,
    pub image_model: String,
    pub text_model: String,
    /// Wall-clock ceiling for one whole generation request.
    pub request_timeout_secs: u64,
    /// Cadence of synthetic progress events while the upstream is quiet.
    pub progress_interval_ms: u64,
    /// Ceiling for the best-effort blob PUT, well under the request wall
    /// clock so a stalled store can never surface as a timeout.
    pub storage_timeout_secs: u64,
    pub store: BlobStoreConfig,
}

impl RelayConfig {
    pub fn from_env(
        host: String,
        port: u16,
        request_timeout_secs: u64,
        progress_interval_ms: u64,
    ) -> anyhow::Result<Self> {
        let api_key = env::var("IMAGE_API_KEY").context("IMAGE_API_KEY is not set")?;
        let upstream_base_url = env::var("IMAGE_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string())
            .trim_end_matches('/')
            .to_string();
        let image_model =
            env::var("IMAGE_MODEL").unwrap_or_else(|_| "gpt-image-1".to_string());
        let text_model =
            env::var("TEXT_MODEL").unwrap_or_else(|_| "gpt-4.1-mini".to_string());

        Ok(RelayConfig {
            host,
            port,
            upstream_base_url,
            api_key,
            image_model,
            text_model,
            request_timeout_secs,
            progress_interval_ms,
            storage_timeout_secs: 5,
            store: BlobStoreConfig::from_env(),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_secs)
    }
}
