use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};
use crate::upload::validate_upload;

/// Aspect/resolution presets accepted on the form; mapped to the upstream
/// API's size strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizePreset {
    Auto,
    Square,
    Portrait,
    Landscape,
}

impl SizePreset {
    pub fn upstream_value(&self) -> &'static str {
        match self {
            SizePreset::Auto => "auto",
            SizePreset::Square => "1024x1024",
            SizePreset::Portrait => "1024x1536",
            SizePreset::Landscape => "1536x1024",
        }
    }
}

impl FromStr for SizePreset {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(SizePreset::Auto),
            "square" => Ok(SizePreset::Square),
            "portrait" => Ok(SizePreset::Portrait),
            "landscape" => Ok(SizePreset::Landscape),
            other => Err(RelayError::Validation(format!(
                "unknown size preset `{other}`: use auto, square, portrait or landscape"
            ))),
        }
    }
}

impl fmt::Display for SizePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SizePreset::Auto => "auto",
            SizePreset::Square => "square",
            SizePreset::Portrait => "portrait",
            SizePreset::Landscape => "landscape",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleStrength {
    Low,
    Medium,
    High,
}

impl FromStr for StyleStrength {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(StyleStrength::Low),
            "medium" => Ok(StyleStrength::Medium),
            "high" => Ok(StyleStrength::High),
            other => Err(RelayError::Validation(format!(
                "unknown style strength `{other}`: use low, medium or high"
            ))),
        }
    }
}

impl fmt::Display for StyleStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StyleStrength::Low => "low",
            StyleStrength::Medium => "medium",
            StyleStrength::High => "high",
        };
        f.write_str(name)
    }
}

/// Which prompt-construction and upstream-call strategy a request uses.
/// The per-mode behavior lives in `strategy_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Restyle the whole photo.
    Transform,
    /// Insert a single styled element, leave the rest untouched.
    AddElement,
    /// No upload; the prompt comes from an auxiliary text-model call.
    Surprise,
}

impl FromStr for GenerationMode {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "transform" => Ok(GenerationMode::Transform),
            "add_element" | "add-element" => Ok(GenerationMode::AddElement),
            "surprise" => Ok(GenerationMode::Surprise),
            other => Err(RelayError::Validation(format!(
                "unknown generation mode `{other}`: use transform, add_element or surprise"
            ))),
        }
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GenerationMode::Transform => "transform",
            GenerationMode::AddElement => "add_element",
            GenerationMode::Surprise => "surprise",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub mime: String,
    pub bytes: Bytes,
}

/// One user click. Lives for the duration of one relay call and is discarded
/// after the terminal event.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub image: Option<UploadedImage>,
    pub size: SizePreset,
    pub style_strength: StyleStrength,
    pub diorama: bool,
    pub custom_prompt: String,
    pub remove_captions: bool,
    pub mode: GenerationMode,
    pub keep_private: bool,
}

/// Collector for incoming multipart fields. The server feeds text fields and
/// the image part as they arrive; `finish` parses, applies defaults and
/// enforces the cross-field invariants.
#[derive(Debug, Default)]
pub struct RequestFields {
    pub image: Option<UploadedImage>,
    size: Option<String>,
    style_strength: Option<String>,
    diorama: Option<String>,
    private: Option<String>,
    custom_prompt: Option<String>,
    remove_captions: Option<String>,
    mode: Option<String>,
}

impl RequestFields {
    /// Record a text field by its form name. Unknown fields are ignored.
    pub fn set_text(&mut self, name: &str, value: String) {
        match name {
            "size" => self.size = Some(value),
            "styleStrength" | "style_strength" => self.style_strength = Some(value),
            "diorama" => self.diorama = Some(value),
            "private" | "keepPrivate" => self.private = Some(value),
            "customPrompt" | "custom_prompt" => self.custom_prompt = Some(value),
            "removeCaptions" | "remove_captions" => self.remove_captions = Some(value),
            "generationMode" | "generation_mode" | "mode" => self.mode = Some(value),
            _ => {}
        }
    }

    pub fn finish(self) -> Result<GenerationRequest> {
        let size = match &self.size {
            Some(v) => v.parse()?,
            None => SizePreset::Auto,
        };
        let style_strength = match &self.style_strength {
            Some(v) => v.parse()?,
            None => StyleStrength::Medium,
        };
        let mode: GenerationMode = match &self.mode {
            Some(v) => v.parse()?,
            None => GenerationMode::Transform,
        };
        let diorama = match &self.diorama {
            Some(v) => parse_bool("diorama", v)?,
            None => false,
        };
        // Privacy-preserving by default: persistence is opt-out.
        let keep_private = match &self.private {
            Some(v) => parse_bool("private", v)?,
            None => true,
        };
        let remove_captions = match &self.remove_captions {
            Some(v) => parse_bool("removeCaptions", v)?,
            None => false,
        };

        if mode.requires_upload() && self.image.is_none() {
            return Err(RelayError::Validation(format!(
                "mode `{mode}` requires an image upload"
            )));
        }
        if let Some(image) = &self.image {
            validate_upload(image)?;
        }

        Ok(GenerationRequest {
            image: self.image,
            size,
            style_strength,
            diorama,
            custom_prompt: self.custom_prompt.unwrap_or_default(),
            remove_captions,
            mode,
            keep_private,
        })
    }
}

pub(crate) fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Ok(true),
        "false" | "0" | "off" | "no" | "" => Ok(false),
        other => Err(RelayError::Validation(format!(
            "field `{name}` is not a boolean: `{other}`"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMeta {
    pub size: SizePreset,
    pub style_strength: StyleStrength,
    pub diorama: bool,
    pub timing_ms: u64,
}

/// Wire protocol consumed by the presentation layer. One event per SSE frame,
/// `type` discriminator, exactly one terminal `complete` or `error` per
/// request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Progress {
        message: String,
        percent: u8,
    },
    Partial {
        image: String,
        index: u32,
    },
    Complete {
        image: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        meta: GenerationMeta,
    },
    Error {
        message: String,
    },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Complete { .. } | ProgressEvent::Error { .. }
        )
    }

    /// Serialize as one SSE frame: `data: <json>\n\n`.
    pub fn to_frame(&self) -> Bytes {
        let payload = serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","message":"event serialization failure"}"#.to_string()
        });
        Bytes::from(format!("data: {payload}\n\n"))
    }
}

/// Non-streaming response body for the sync endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResponse {
    pub image_base64: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub meta: GenerationMeta,
}
