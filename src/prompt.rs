//! Prompt assembly. Pure and deterministic: the same options always produce
//! the same instruction string, and every output carries the no-text /
//! no-watermark clause exactly once.

use crate::error::{RelayError, Result};
use crate::io_struct::{GenerationMode, GenerationRequest, StyleStrength};

const TRANSFORM_BASE: &str = "Restyle this entire photo as a scene from the Sackboy universe: \
     turn people and objects into knitted sack-cloth characters with button eyes and zipper \
     details, and rebuild surfaces from yarn, felt and stitched fabric.";

const ADD_ELEMENT_BASE: &str = "Insert one knitted Sackboy character into this photo so that it \
     fits the scene naturally, matching the existing lighting, scale and perspective. Leave the \
     rest of the photo untouched.";

const REMOVE_CAPTIONS_CLAUSE: &str =
    "Remove any existing text, captions or subtitles from the image.";

const DIORAMA_CLAUSE: &str = "Present the scene as a handcrafted miniature diorama staged inside \
     a cardboard box, with visible felt, yarn and stitching.";

const NO_WATERMARK_CLAUSE: &str =
    "Do not add any text, captions, logos, trademarks or watermarks to the image.";

#[derive(Debug, Clone, Copy)]
pub struct PromptOptions<'a> {
    pub mode: GenerationMode,
    pub style_strength: StyleStrength,
    pub diorama: bool,
    pub custom_prompt: &'a str,
    pub remove_captions: bool,
}

impl<'a> From<&'a GenerationRequest> for PromptOptions<'a> {
    fn from(req: &'a GenerationRequest) -> Self {
        PromptOptions {
            mode: req.mode,
            style_strength: req.style_strength,
            diorama: req.diorama,
            custom_prompt: &req.custom_prompt,
            remove_captions: req.remove_captions,
        }
    }
}

fn strength_clause(strength: StyleStrength) -> &'static str {
    match strength {
        StyleStrength::Low => "Subtle Sackboy stylisation: keep the original look largely \
             intact, with light knitted-fabric accents.",
        StyleStrength::Medium => "Balanced Sackboy stylisation: a clearly handcrafted knitted \
             look while preserving the scene's composition.",
        StyleStrength::High => "Strong Sackboy stylisation: rebuild every surface from yarn, \
             felt and fabric with bold hand-stitched detail.",
    }
}

/// Build the instruction string for a prompt-built mode. A non-empty custom
/// prompt takes precedence: only the style-strength modifier and the
/// watermark exclusion are appended to it. Calling this for a mode whose
/// prompt comes from the auxiliary text call is a contract violation.
pub fn build_prompt(opts: &PromptOptions) -> Result<String> {
    if opts.mode.needs_aux_prompt() {
        return Err(RelayError::Validation(format!(
            "prompt for mode `{}` is produced by the text model, not the builder",
            opts.mode
        )));
    }

    let mut parts: Vec<&str> = Vec::new();
    let custom = opts.custom_prompt.trim();
    if !custom.is_empty() {
        parts.push(custom);
        parts.push(strength_clause(opts.style_strength));
    } else {
        parts.push(match opts.mode {
            GenerationMode::Transform => TRANSFORM_BASE,
            GenerationMode::AddElement => ADD_ELEMENT_BASE,
            // excluded by the needs_aux_prompt check above
            GenerationMode::Surprise => {
                return Err(RelayError::Validation(
                    "no base instruction for the surprise mode".to_string(),
                ));
            }
        });
        parts.push(strength_clause(opts.style_strength));
        if opts.remove_captions {
            parts.push(REMOVE_CAPTIONS_CLAUSE);
        }
        if opts.diorama {
            parts.push(DIORAMA_CLAUSE);
        }
    }
    parts.push(NO_WATERMARK_CLAUSE);
    Ok(parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(mode: GenerationMode) -> PromptOptions<'static> {
        PromptOptions {
            mode,
            style_strength: StyleStrength::Medium,
            diorama: false,
            custom_prompt: "",
            remove_captions: false,
        }
    }

    #[test]
    fn watermark_clause_appears_exactly_once_in_every_combination() {
        for mode in [GenerationMode::Transform, GenerationMode::AddElement] {
            for strength in [StyleStrength::Low, StyleStrength::Medium, StyleStrength::High] {
                for diorama in [false, true] {
                    for remove_captions in [false, true] {
                        for custom in ["", "A Sackboy riding a tram through Lisbon"] {
                            let prompt = build_prompt(&PromptOptions {
                                mode,
                                style_strength: strength,
                                diorama,
                                custom_prompt: custom,
                                remove_captions,
                            })
                            .unwrap();
                            assert_eq!(
                                prompt.matches(NO_WATERMARK_CLAUSE).count(),
                                1,
                                "mode={mode} strength={strength} diorama={diorama} \
                                 captions={remove_captions} custom={custom:?}"
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn custom_prompt_is_verbatim_and_replaces_the_base() {
        let prompt = build_prompt(&PromptOptions {
            custom_prompt: "A cosy knitted spaceship over Porto",
            ..opts(GenerationMode::Transform)
        })
        .unwrap();
        assert!(prompt.contains("A cosy knitted spaceship over Porto"));
        assert!(!prompt.contains("Restyle this entire photo"));
    }

    #[test]
    fn custom_prompt_still_carries_the_strength_modifier() {
        let prompt = build_prompt(&PromptOptions {
            custom_prompt: "A tiny felt dragon",
            style_strength: StyleStrength::High,
            ..opts(GenerationMode::Transform)
        })
        .unwrap();
        assert!(prompt.contains("Strong Sackboy stylisation"));
    }

    #[test]
    fn transform_high_without_diorama_matches_the_contract() {
        let prompt = build_prompt(&PromptOptions {
            style_strength: StyleStrength::High,
            ..opts(GenerationMode::Transform)
        })
        .unwrap();
        assert!(prompt.contains("Strong Sackboy stylisation"));
        assert!(!prompt.contains("diorama"));
    }

    #[test]
    fn diorama_and_caption_clauses_are_conditional() {
        let prompt = build_prompt(&PromptOptions {
            diorama: true,
            remove_captions: true,
            ..opts(GenerationMode::AddElement)
        })
        .unwrap();
        assert!(prompt.contains("diorama"));
        assert!(prompt.contains("Remove any existing text"));

        let plain = build_prompt(&opts(GenerationMode::AddElement)).unwrap();
        assert!(!plain.contains("diorama"));
        assert!(!plain.contains("Remove any existing text"));
    }

    #[test]
    fn builder_is_deterministic() {
        let a = build_prompt(&opts(GenerationMode::Transform)).unwrap();
        let b = build_prompt(&opts(GenerationMode::Transform)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn aux_prompt_mode_is_a_contract_violation() {
        let err = build_prompt(&opts(GenerationMode::Surprise)).unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)));
    }
}
