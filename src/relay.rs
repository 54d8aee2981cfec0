//! Per-request relay pipeline.
//!
//! One producer task pulls chunks from the upstream, transcodes them and
//! pushes frames into a bounded channel; the channel's receiver is the SSE
//! response body. When the client goes away the body (and with it the
//! receiver) is dropped, which the producer observes through
//! [`ClientLiveness`] before every pull and while a pull is pending.

use crate::error::RelayError;
use crate::transcode::{StreamEvent, TranscodeState, transcode_chunk};
use crate::upstream::ChunkSource;
use async_trait::async_trait;
use axum::response::sse::Event;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::Instrument;

const FRAME_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum RelayFrame {
    Event(StreamEvent),
    /// Terminal diagnostic sent once when the stream fails mid-flight.
    Failure {
        code: String,
        error_type: String,
        message: String,
    },
}

impl RelayFrame {
    fn failure(err: &RelayError) -> Self {
        RelayFrame::Failure {
            code: err.code().to_string(),
            error_type: err.error_type().to_string(),
            message: err.to_string(),
        }
    }

    pub fn into_sse_event(self) -> Event {
        match self {
            RelayFrame::Event(ev) => Event::default().data(
                json!({
                    "content": ev.content,
                    "reasoning_content": ev.reasoning_content,
                })
                .to_string(),
            ),
            RelayFrame::Failure {
                code,
                error_type,
                message,
            } => Event::default().event("error").data(
                json!({
                    "error": {
                        "message": message,
                        "type": error_type,
                        "code": code,
                    }
                })
                .to_string(),
            ),
        }
    }
}

/// Cooperative view of whether the client is still there.
#[async_trait]
pub trait ClientLiveness: Send + Sync {
    fn is_disconnected(&self) -> bool;

    /// Resolves once the client has gone away.
    async fn disconnected(&self);
}

#[async_trait]
impl<T: Send> ClientLiveness for mpsc::Sender<T> {
    fn is_disconnected(&self) -> bool {
        self.is_closed()
    }

    async fn disconnected(&self) {
        self.closed().await
    }
}

#[derive(Debug, Clone)]
pub struct RelayContext {
    pub request_id: String,
    pub model: String,
}

#[derive(Debug)]
pub struct RelayOutcome {
    pub state: TranscodeState,
    pub events: usize,
    pub error: Option<RelayError>,
}

/// Starts a pipeline task for `source` and returns the receiving end of its
/// frames. Dropping the receiver cancels the pipeline.
pub fn spawn_relay<S>(source: S, ctx: RelayContext) -> mpsc::Receiver<RelayFrame>
where
    S: ChunkSource + 'static,
{
    let (tx, rx) = mpsc::channel::<RelayFrame>(FRAME_BUFFER);
    let span = tracing::info_span!("relay", request_id = %ctx.request_id, model = %ctx.model);
    tokio::spawn(
        async move {
            run_relay(source, &tx, &tx, &ctx).await;
        }
        .instrument(span),
    );
    rx
}

/// Drives `source` to completion, cancellation or failure.
///
/// Liveness is checked before each pull; a disconnect while a pull is
/// pending abandons that pull. The source is released exactly once
/// afterwards, whatever the exit path.
pub async fn run_relay<S, L>(
    mut source: S,
    liveness: &L,
    tx: &mpsc::Sender<RelayFrame>,
    ctx: &RelayContext,
) -> RelayOutcome
where
    S: ChunkSource,
    L: ClientLiveness + ?Sized,
{
    let mut state = TranscodeState::Streaming;
    let mut events = 0usize;
    let mut error: Option<RelayError> = None;

    while state == TranscodeState::Streaming {
        if liveness.is_disconnected() {
            state = TranscodeState::Cancelled;
            break;
        }
        let pulled = tokio::select! {
            biased;
            _ = liveness.disconnected() => None,
            next = source.next_chunk() => Some(next),
        };
        let Some(next) = pulled else {
            state = TranscodeState::Cancelled;
            break;
        };
        let failure = match next {
            None => {
                state = TranscodeState::Done;
                continue;
            }
            Some(Err(err)) => RelayError::Upstream(err),
            Some(Ok(chunk)) => match transcode_chunk(&chunk) {
                Ok(None) => continue,
                Ok(Some(ev)) => {
                    if tx.send(RelayFrame::Event(ev)).await.is_err() {
                        state = TranscodeState::Cancelled;
                    } else {
                        events += 1;
                        metrics::counter!("chatrelay_events_total", "model" => ctx.model.clone())
                            .increment(1);
                    }
                    continue;
                }
                Err(err) => {
                    tracing::debug!(chunk = %chunk.data, "undecodable upstream chunk");
                    RelayError::Transcode(err)
                }
            },
        };
        tracing::error!(
            request_id = %ctx.request_id,
            model = %ctx.model,
            events,
            error = %failure,
            "relay stream failed"
        );
        let _ = tx.send(RelayFrame::failure(&failure)).await;
        error = Some(failure);
        state = TranscodeState::Failed;
    }

    if let Err(err) = source.release().await {
        tracing::warn!(
            request_id = %ctx.request_id,
            model = %ctx.model,
            "failed to release upstream stream: {err}"
        );
    }

    match state {
        TranscodeState::Done => {
            tracing::info!(events, "relay stream completed");
        }
        TranscodeState::Cancelled => {
            tracing::info!(events, "client disconnected, upstream released");
            error = Some(RelayError::ClientDisconnected);
        }
        _ => {}
    }
    metrics::counter!(
        "chatrelay_streams_total",
        "model" => ctx.model.clone(),
        "outcome" => state.as_str()
    )
    .increment(1);

    RelayOutcome {
        state,
        events,
        error,
    }
}
