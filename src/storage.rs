//! Optional best-effort persistence of final images. The store is a plain
//! HTTP blob endpoint: PUT raw bytes under a generated name, get a public URL
//! back. Failures never reach the user; the relay logs and moves on.

use std::env;

use rand::Rng;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

use crate::error::{RelayError, Result};

#[derive(Debug, Clone, Default)]
pub struct BlobStoreConfig {
    pub base_url: Option<String>,
    pub token: Option<String>,
}

impl BlobStoreConfig {
    pub fn from_env() -> Self {
        BlobStoreConfig {
            base_url: env::var("BLOB_STORE_URL").ok(),
            token: env::var("BLOB_STORE_TOKEN").ok(),
        }
    }
}

#[derive(Clone)]
pub struct BlobStore {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BlobStore {
    /// `None` when no store is configured; the relay then runs without
    /// persistence and the `url` field stays absent.
    pub fn from_config(config: &BlobStoreConfig, client: reqwest::Client) -> Option<Self> {
        let base_url = config.base_url.as_ref()?;
        Some(BlobStore {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn object_name() -> String {
        format!(
            "sackboy-{}-{:06x}.png",
            chrono::Utc::now().format("%Y%m%d%H%M%S"),
            rand::rng().random_range(0..0xff_ffffu32)
        )
    }

    pub async fn put(&self, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let url = format!("{}/{}", self.base_url, Self::object_name());
        let mut req = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, content_type)
            .body(bytes);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| RelayError::Storage(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(RelayError::Storage(format!(
                "blob store returned {}",
                resp.status()
            )));
        }
        // Some stores echo a public URL in the body; fall back to the key we
        // wrote to.
        if let Ok(value) = resp.json::<Value>().await {
            if let Some(public) = value.get("url").and_then(Value::as_str) {
                return Ok(public.to_string());
            }
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_is_absent_without_a_base_url() {
        let config = BlobStoreConfig {
            base_url: None,
            token: Some("t".to_string()),
        };
        assert!(BlobStore::from_config(&config, reqwest::Client::new()).is_none());
    }

    #[test]
    fn object_names_are_unique_enough() {
        let a = BlobStore::object_name();
        let b = BlobStore::object_name();
        assert!(a.starts_with("sackboy-"));
        assert!(a.ends_with(".png"));
        assert_ne!(a, b);
    }
}
