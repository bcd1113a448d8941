use crate::io_struct::GenerationMode;

/// The mode is the tagged variant dispatched once at request start: it decides
/// whether an upload is required, where the prompt comes from, and which
/// upstream endpoint the image call targets.
impl GenerationMode {
    pub fn requires_upload(&self) -> bool {
        !matches!(self, GenerationMode::Surprise)
    }

    /// Modes whose prompt is produced by a separate text-model call instead
    /// of the prompt builder. The image call must not start until that call
    /// has returned.
    pub fn needs_aux_prompt(&self) -> bool {
        matches!(self, GenerationMode::Surprise)
    }

    /// Upstream endpoint: edits for modes that rework a source image,
    /// generations for the from-scratch mode.
    pub fn upstream_path(&self) -> &'static str {
        match self {
            GenerationMode::Transform | GenerationMode::AddElement => "/images/edits",
            GenerationMode::Surprise => "/images/generations",
        }
    }
}
