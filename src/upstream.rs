use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde_json::Value;

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::io_struct::GenerationRequest;

const AUX_SYSTEM_PROMPT: &str = "You write short, vivid prompts for an image generation model \
     that renders everything as handcrafted knitted Sackboy scenes.";

const AUX_USER_PROMPT: &str = "Invent one playful scene featuring a knitted Sackboy character. \
     Answer with the prompt text only, no preamble.";

/// Request-independent client for the upstream generative API. Holds the
/// shared connection pool; every per-request buffer lives in the relay
/// session instead.
#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    image_model: String,
    text_model: String,
}

impl UpstreamClient {
    pub fn new(config: &RelayConfig) -> anyhow::Result<Self> {
        // No whole-request timeout here: streamed bodies outlive any fixed
        // ceiling we could pick. The relay enforces the wall clock.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()?;
        Ok(UpstreamClient {
            client,
            base_url: config.upstream_base_url.clone(),
            api_key: config.api_key.clone(),
            image_model: config.image_model.clone(),
            text_model: config.text_model.clone(),
        })
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.client
    }

    /// One JSON call to the text model, used by modes whose prompt is not
    /// built locally. Must complete before the image call starts.
    pub async fn generate_aux_prompt(&self) -> Result<String> {
        let body = serde_json::json!({
            "model": self.text_model,
            "messages": [
                {"role": "system", "content": AUX_SYSTEM_PROMPT},
                {"role": "user", "content": AUX_USER_PROMPT},
            ],
        });
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        if !resp.status().is_success() {
            return Err(upstream_failure(resp).await);
        }
        let value: Value = resp.json().await.map_err(transport_error)?;
        value
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RelayError::Upstream {
                status: 502,
                message: "text model returned no prompt".to_string(),
            })
    }

    /// The single outbound image call for a request. Multipart fields per the
    /// upstream contract: model, prompt, size, optional stream flag, and the
    /// source image for modes that rework one.
    pub async fn start_image_call(
        &self,
        prompt: &str,
        request: &GenerationRequest,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let mut form = Form::new()
            .text("model", self.image_model.clone())
            .text("prompt", prompt.to_string())
            .text("size", request.size.upstream_value());
        if stream {
            form = form.text("stream", "true");
        }
        if let Some(image) = &request.image {
            let part = Part::bytes(image.bytes.to_vec())
                .file_name(image.filename.clone())
                .mime_str(&image.mime)
                .map_err(|e| {
                    RelayError::Validation(format!("invalid image content type: {e}"))
                })?;
            form = form.part("image[]", part);
        }

        let url = format!("{}{}", self.base_url, request.mode.upstream_path());
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;
        if !resp.status().is_success() {
            return Err(upstream_failure(resp).await);
        }
        Ok(resp)
    }
}

fn transport_error(err: reqwest::Error) -> RelayError {
    RelayError::Upstream {
        status: err.status().map(|s| s.as_u16()).unwrap_or(502),
        message: err.to_string(),
    }
}

async fn upstream_failure(resp: reqwest::Response) -> RelayError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    RelayError::Upstream {
        status,
        message: extract_error_message(&body),
    }
}

/// Pull a human-readable message out of an upstream error body: the JSON
/// `error.message` field when present, a bare `error` string otherwise, and
/// the raw text as a last resort.
pub fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(msg) = value.pointer("/error/message").and_then(Value::as_str) {
            return msg.to_string();
        }
        if let Some(msg) = value.get("error").and_then(Value::as_str) {
            return msg.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "upstream request failed".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_error_message_is_extracted() {
        assert_eq!(
            extract_error_message(r#"{"error":{"message":"rate limited"}}"#),
            "rate limited"
        );
    }

    #[test]
    fn flat_error_string_is_extracted() {
        assert_eq!(extract_error_message(r#"{"error":"boom"}"#), "boom");
    }

    #[test]
    fn raw_text_is_the_fallback() {
        assert_eq!(extract_error_message("service unavailable"), "service unavailable");
        assert_eq!(extract_error_message("  "), "upstream request failed");
        assert_eq!(
            extract_error_message(r#"{"message":"unrelated shape"}"#),
            r#"{"message":"unrelated shape"}"#
        );
    }
}
