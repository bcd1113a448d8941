//! Incremental decoding of the upstream SSE byte stream. Frames arrive split
//! across read chunks at arbitrary boundaries; the decoder buffers partial
//! input and only ever yields whole frames, so re-chunking the same bytes can
//! never split or merge two logical events.

use serde_json::Value;

pub struct SseDecoder {
    pending: Vec<u8>,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        SseDecoder {
            pending: Vec::new(),
        }
    }

    /// Append a chunk to the buffer. The buffer holds raw bytes so a chunk
    /// boundary inside a multi-byte character cannot corrupt the payload;
    /// UTF-8 decoding happens once per complete frame. Carriage returns are
    /// stripped up front so CRLF framing decodes identically even when a
    /// boundary lands between the `\r` and the `\n`.
    pub fn push_chunk(&mut self, chunk: &[u8]) {
        if chunk.contains(&b'\r') {
            self.pending.extend(chunk.iter().filter(|&&b| b != b'\r'));
        } else {
            self.pending.extend_from_slice(chunk);
        }
    }

    /// Payload of the next complete frame, if one is buffered. Frames end on
    /// a blank line; frames without a `data:` line are skipped.
    pub fn next_data(&mut self) -> Option<String> {
        loop {
            let pos = self.pending.windows(2).position(|w| w == b"\n\n")?;
            let block: Vec<u8> = self.pending.drain(..pos + 2).take(pos).collect();
            let block = String::from_utf8_lossy(&block);

            let mut data_lines: Vec<&str> = Vec::new();
            for line in block.lines() {
                if let Some(rest) = line.strip_prefix("data:") {
                    data_lines.push(rest.trim_start());
                }
            }
            if !data_lines.is_empty() {
                return Some(data_lines.join("\n"));
            }
        }
    }
}

/// Upstream event types the relay recognizes. Everything else is noise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    Partial { image: String, index: u32 },
    Completed { image: String },
}

/// Decode one frame payload. Non-JSON payloads, the `[DONE]` sentinel and
/// unrecognized event types all yield `None` and are skipped, never fatal.
pub fn decode_upstream_event(data: &str) -> Option<UpstreamEvent> {
    if data.trim() == "[DONE]" {
        return None;
    }
    let value: Value = serde_json::from_str(data).ok()?;
    match value.get("type").and_then(Value::as_str)? {
        "image_generation.partial_image" => Some(UpstreamEvent::Partial {
            image: value.get("partial_image_b64")?.as_str()?.to_string(),
            index: value
                .get("partial_image_index")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32,
        }),
        "image_generation.completed" => Some(UpstreamEvent::Completed {
            image: value.get("b64_json")?.as_str()?.to_string(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARTIAL: &str = r#"{"type":"image_generation.partial_image","partial_image_b64":"cGFydGlhbA==","partial_image_index":0}"#;
    const COMPLETED: &str = r#"{"type":"image_generation.completed","b64_json":"ZmluYWw="}"#;

    fn stream_bytes() -> Vec<u8> {
        format!("data: {PARTIAL}\n\ndata: {COMPLETED}\n\n").into_bytes()
    }

    fn decode_all(bytes: &[u8], chunk_size: usize) -> Vec<String> {
        let mut decoder = SseDecoder::new();
        let mut out = Vec::new();
        for chunk in bytes.chunks(chunk_size.max(1)) {
            decoder.push_chunk(chunk);
            while let Some(data) = decoder.next_data() {
                out.push(data);
            }
        }
        out
    }

    #[test]
    fn framing_is_chunk_boundary_independent() {
        let bytes = stream_bytes();
        let reference = decode_all(&bytes, bytes.len());
        assert_eq!(reference.len(), 2);
        for chunk_size in [1, 2, 3, 7, 16, 64] {
            assert_eq!(decode_all(&bytes, chunk_size), reference, "size {chunk_size}");
        }
    }

    #[test]
    fn frame_split_across_two_reads_is_one_event() {
        let bytes = stream_bytes();
        // split inside the completed frame's payload
        let cut = bytes.len() - 10;
        let mut decoder = SseDecoder::new();
        decoder.push_chunk(&bytes[..cut]);
        let mut events = Vec::new();
        while let Some(data) = decoder.next_data() {
            events.push(data);
        }
        decoder.push_chunk(&bytes[cut..]);
        while let Some(data) = decoder.next_data() {
            events.push(data);
        }
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], PARTIAL);
        assert_eq!(events[1], COMPLETED);
    }

    #[test]
    fn crlf_framing_decodes_like_lf() {
        let lf = stream_bytes();
        let crlf = String::from_utf8(lf.clone())
            .unwrap()
            .replace('\n', "\r\n")
            .into_bytes();
        for chunk_size in [1, 5, crlf.len()] {
            assert_eq!(decode_all(&crlf, chunk_size), decode_all(&lf, lf.len()));
        }
    }

    #[test]
    fn multibyte_payload_split_across_reads_survives() {
        let frame = "data: {\"type\":\"image_generation.queued\",\"note\":\"café ✓ 縫い\"}\n\n";
        let bytes = frame.as_bytes();
        let reference = decode_all(bytes, bytes.len());
        assert_eq!(reference.len(), 1);
        assert!(reference[0].contains("café ✓ 縫い"));
        // byte-sized chunks land boundaries inside every multi-byte character
        for chunk_size in [1, 2, 3] {
            assert_eq!(decode_all(bytes, chunk_size), reference, "size {chunk_size}");
        }
    }

    #[test]
    fn event_only_frames_are_skipped() {
        let bytes = format!("event: ping\n\ndata: {COMPLETED}\n\n").into_bytes();
        let events = decode_all(&bytes, bytes.len());
        assert_eq!(events, vec![COMPLETED.to_string()]);
    }

    #[test]
    fn multiline_data_lines_are_joined() {
        let mut decoder = SseDecoder::new();
        decoder.push_chunk(b"data: first\ndata: second\n\n");
        assert_eq!(decoder.next_data().unwrap(), "first\nsecond");
        assert!(decoder.next_data().is_none());
    }

    #[test]
    fn decodes_partial_and_completed_events() {
        assert_eq!(
            decode_upstream_event(PARTIAL),
            Some(UpstreamEvent::Partial {
                image: "cGFydGlhbA==".to_string(),
                index: 0
            })
        );
        assert_eq!(
            decode_upstream_event(COMPLETED),
            Some(UpstreamEvent::Completed {
                image: "ZmluYWw=".to_string()
            })
        );
    }

    #[test]
    fn noise_is_not_fatal() {
        assert_eq!(decode_upstream_event("[DONE]"), None);
        assert_eq!(decode_upstream_event("not json at all"), None);
        assert_eq!(
            decode_upstream_event(r#"{"type":"image_generation.queued"}"#),
            None
        );
        assert_eq!(decode_upstream_event(r#"{"no_type":true}"#), None);
    }
}
