//! The relay core: one request in, one upstream image call out, a stream of
//! normalized progress events back. Each request owns its session state
//! (percent watermark, buffers, timers); the shared `RelayState` is read-only.

use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::MissedTickBehavior;
use tokio::time::error::Elapsed;

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::io_struct::{GenerationMeta, GenerationRequest, GenerationResponse, ProgressEvent};
use crate::prompt::{PromptOptions, build_prompt};
use crate::sse::{SseDecoder, UpstreamEvent, decode_upstream_event};
use crate::storage::BlobStore;
use crate::upstream::UpstreamClient;

/// Shared application state, constructed once at startup.
pub struct RelayState {
    pub config: RelayConfig,
    pub upstream: UpstreamClient,
    pub store: Option<BlobStore>,
}

impl RelayState {
    pub fn new(config: RelayConfig) -> anyhow::Result<Self> {
        let upstream = UpstreamClient::new(&config)?;
        let store = BlobStore::from_config(&config.store, upstream.http_client().clone());
        Ok(RelayState {
            config,
            upstream,
            store,
        })
    }
}

/// Per-request state. The percent watermark only ever moves forward, so
/// progress values are non-decreasing no matter how synthetic ticks and real
/// upstream events interleave.
pub struct RelaySession {
    percent: u8,
    started: Instant,
}

impl Default for RelaySession {
    fn default() -> Self {
        Self::new()
    }
}

impl RelaySession {
    pub fn new() -> Self {
        RelaySession {
            percent: 0,
            started: Instant::now(),
        }
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    fn bump_percent(&mut self, target: u8) -> u8 {
        self.percent = self.percent.max(target.min(99));
        self.percent
    }

    /// Small synthetic advance, capped well below completion.
    fn nudge_percent(&mut self) -> u8 {
        self.bump_percent((self.percent + 2).min(95))
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// What `drive_request` hands back on success; the caller decides whether it
/// becomes a `complete` event or a JSON body.
#[derive(Debug)]
pub struct FinishedImage {
    pub image_b64: String,
    pub url: Option<String>,
    pub meta: GenerationMeta,
}

fn send_event(tx: &UnboundedSender<ProgressEvent>, event: ProgressEvent) -> Result<()> {
    tx.send(event)
        .map_err(|_| RelayError::Stream("client disconnected".to_string()))
}

fn send_progress(
    tx: &UnboundedSender<ProgressEvent>,
    session: &mut RelaySession,
    target: u8,
    message: &str,
) -> Result<()> {
    let percent = session.bump_percent(target);
    send_event(
        tx,
        ProgressEvent::Progress {
            message: message.to_string(),
            percent,
        },
    )
}

/// Streaming entry point. Runs the whole request under the configured wall
/// clock and always emits exactly one terminal event: the pipeline below only
/// produces progress and partial events, and the single terminal send lives
/// here. Dropping the timed future aborts the upstream call and its timers.
pub async fn run_generation(
    state: &RelayState,
    request: GenerationRequest,
    tx: UnboundedSender<ProgressEvent>,
) {
    let mut session = RelaySession::new();
    log::info!(
        "generation started: mode={} size={} strength={}",
        request.mode,
        request.size,
        request.style_strength
    );
    let outcome = tokio::time::timeout(
        state.config.request_timeout(),
        drive_request(state, &request, &mut session, &tx),
    )
    .await;
    let terminal = terminal_event(outcome);
    match &terminal {
        ProgressEvent::Error { message } => log::error!("generation failed: {message}"),
        _ => log::info!("generation finished in {} ms", session.elapsed_ms()),
    }
    let _ = tx.send(terminal);
}

/// Non-streaming entry point for the sync endpoint. Progress events are
/// produced and discarded; the receiver stays alive so the pipeline does not
/// mistake it for a client disconnect.
pub async fn run_generation_sync(
    state: &RelayState,
    request: GenerationRequest,
) -> Result<GenerationResponse> {
    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let mut session = RelaySession::new();
    let outcome = tokio::time::timeout(
        state.config.request_timeout(),
        drive_request(state, &request, &mut session, &tx),
    )
    .await;
    match outcome {
        Ok(Ok(finished)) => Ok(GenerationResponse {
            image_base64: finished.image_b64,
            image_url: finished.url,
            meta: finished.meta,
        }),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(RelayError::Timeout),
    }
}

/// Fold the timed pipeline outcome into the one terminal event.
fn terminal_event(
    outcome: std::result::Result<Result<FinishedImage>, Elapsed>,
) -> ProgressEvent {
    match outcome {
        Ok(Ok(finished)) => ProgressEvent::Complete {
            image: finished.image_b64,
            url: finished.url,
            meta: finished.meta,
        },
        Ok(Err(err)) => ProgressEvent::Error {
            message: err.to_string(),
        },
        Err(_) => ProgressEvent::Error {
            message: RelayError::Timeout.to_string(),
        },
    }
}

/// Received → Validating happened in the handler; from here the request walks
/// PromptReady/AuxPromptGenerating → UpstreamCalling → StreamRelaying. Aux
/// modes resolve their prompt through the text model first, and that call
/// must finish before the image call is issued.
async fn drive_request(
    state: &RelayState,
    request: &GenerationRequest,
    session: &mut RelaySession,
    tx: &UnboundedSender<ProgressEvent>,
) -> Result<FinishedImage> {
    send_progress(tx, session, 5, "Warming up the yarn")?;

    let prompt = if request.mode.needs_aux_prompt() {
        send_progress(tx, session, 10, "Dreaming up a scene")?;
        state.upstream.generate_aux_prompt().await?
    } else {
        build_prompt(&PromptOptions::from(request))?
    };

    send_progress(tx, session, 15, "Sending your photo to the studio")?;
    let resp = state.upstream.start_image_call(&prompt, request, true).await?;

    send_progress(tx, session, 25, "Stitching in progress")?;
    let image_b64 = relay_stream(
        resp.bytes_stream().boxed(),
        session,
        tx,
        state.config.progress_interval(),
    )
    .await?;

    let url = if request.keep_private {
        None
    } else {
        persist_image(state, &image_b64).await
    };

    Ok(FinishedImage {
        image_b64,
        url,
        meta: GenerationMeta {
            size: request.size,
            style_strength: request.style_strength,
            diorama: request.diorama,
            timing_ms: session.elapsed_ms(),
        },
    })
}

/// Best-effort persistence after the final image materialized. Every failure
/// path logs and returns `None`; nothing here can fail the request. The PUT
/// runs under its own short ceiling so a stalled store cannot eat the
/// request wall clock and turn a finished image into a timeout.
async fn persist_image(state: &RelayState, image_b64: &str) -> Option<String> {
    let store = state.store.as_ref()?;
    let bytes = match BASE64.decode(image_b64) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::warn!("skipping blob upload, final image is not valid base64: {err}");
            return None;
        }
    };
    match tokio::time::timeout(state.config.storage_timeout(), store.put(bytes, "image/png"))
        .await
    {
        Ok(Ok(url)) => {
            log::info!("final image persisted at {url}");
            Some(url)
        }
        Ok(Err(err)) => {
            log::warn!("blob upload failed: {err}");
            None
        }
        Err(_) => {
            log::warn!(
                "blob upload timed out after {}s",
                state.config.storage_timeout_secs
            );
            None
        }
    }
}

/// StreamRelaying: read the upstream body incrementally, re-emit recognized
/// events, and keep the client warm with synthetic progress while the
/// upstream is quiet. Returns the final image payload; a stream that ends
/// without one is an error.
pub async fn relay_stream<S, E>(
    mut stream: S,
    session: &mut RelaySession,
    tx: &UnboundedSender<ProgressEvent>,
    progress_interval: Duration,
) -> Result<String>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut decoder = SseDecoder::new();
    let mut ticker = tokio::time::interval(progress_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            chunk = stream.next() => match chunk {
                Some(Ok(bytes)) => {
                    decoder.push_chunk(&bytes);
                    while let Some(data) = decoder.next_data() {
                        match decode_upstream_event(&data) {
                            Some(UpstreamEvent::Partial { image, index }) => {
                                session.bump_percent((40 + 20 * index.min(2)) as u8);
                                send_event(tx, ProgressEvent::Partial { image, index })?;
                            }
                            Some(UpstreamEvent::Completed { image }) => {
                                return Ok(image);
                            }
                            None => {}
                        }
                    }
                }
                Some(Err(err)) => {
                    return Err(RelayError::Stream(format!("upstream stream failed: {err}")));
                }
                None => {
                    return Err(RelayError::Stream(
                        "upstream stream ended without a final image".to_string(),
                    ));
                }
            },
            _ = ticker.tick() => {
                let percent = session.nudge_percent();
                send_event(
                    tx,
                    ProgressEvent::Progress {
                        message: "Still stitching".to_string(),
                        percent,
                    },
                )?;
            }
        }
    }
}
