//! Streaming relay.
//!
//! Turns an adapter's fragment stream into ordered [`StreamChunk`]s. A reader
//! task drains the upstream into a bounded hand-off channel while the calling
//! task (the sender) wraps fragments into chunks and delivers them to the
//! client side. The two only share channels:
//!
//! ```text
//! upstream ──► reader task ──[fragments, bounded]──► sender ──► out
//!                   └───────[error, single slot]──────┘
//! ```
//!
//! The sender checks, in order, cancellation, a posted read error, the next
//! fragment and finally channel closure, which produces the terminal chunk.
//! The reader is aborted and awaited before [`StreamRelay::run`] returns.

use crate::core::cancel::StreamCancelHandle;
use crate::core::error::ProviderError;
use crate::providers::ByteStream;
use crate::transformer::StreamChunk;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;

/// Default capacity of the hand-off channel.
pub const DEFAULT_BUFFER_SIZE: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct RelayConfig {
    pub buffer_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Identity stamped on every chunk of one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkTemplate {
    pub id: String,
    pub model: String,
}

impl ChunkTemplate {
    /// Template with a fresh `chatcmpl-` id.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            model: model.into(),
        }
    }

    fn delta(&self, text: String) -> StreamChunk {
        StreamChunk::delta(self.id.clone(), self.model.clone(), text)
    }

    fn terminal(&self) -> StreamChunk {
        StreamChunk::terminal(self.id.clone(), self.model.clone())
    }
}

/// How a relay run ended. `chunks` counts non-terminal chunks delivered.
#[derive(Debug)]
pub enum RelayOutcome {
    Completed { chunks: usize },
    Cancelled { chunks: usize },
    Failed { chunks: usize, error: ProviderError },
}

impl RelayOutcome {
    pub fn chunks(&self) -> usize {
        match self {
            RelayOutcome::Completed { chunks }
            | RelayOutcome::Cancelled { chunks }
            | RelayOutcome::Failed { chunks, .. } => *chunks,
        }
    }

    /// Metrics label.
    pub fn label(&self) -> &'static str {
        match self {
            RelayOutcome::Completed { .. } => "completed",
            RelayOutcome::Cancelled { .. } => "cancelled",
            RelayOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamRelay {
    config: RelayConfig,
}

impl StreamRelay {
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }

    pub fn buffer_size(&self) -> usize {
        self.config.buffer_size
    }

    /// Relay `upstream` into `out` until it ends, fails or is cancelled.
    ///
    /// A dropped `out` receiver counts as cancellation.
    pub async fn run(
        &self,
        upstream: ByteStream,
        template: ChunkTemplate,
        cancel: StreamCancelHandle,
        out: mpsc::Sender<StreamChunk>,
    ) -> RelayOutcome {
        let (fragment_tx, fragment_rx) = mpsc::channel(self.config.buffer_size.max(1));
        let (error_tx, error_rx) = mpsc::channel(1);

        let reader = tokio::spawn(read_upstream(upstream, fragment_tx, error_tx));

        let outcome = send_chunks(fragment_rx, error_rx, &template, &cancel, &out).await;

        reader.abort();
        let _ = reader.await;

        tracing::debug!(
            stream_id = %template.id,
            outcome = outcome.label(),
            chunks = outcome.chunks(),
            "Relay finished"
        );
        outcome
    }
}

async fn read_upstream(
    mut upstream: ByteStream,
    fragments: mpsc::Sender<Bytes>,
    errors: mpsc::Sender<ProviderError>,
) {
    while let Some(item) = upstream.next().await {
        match item {
            Ok(fragment) => {
                if fragments.send(fragment).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                let _ = errors.try_send(e);
                return;
            }
        }
    }
}

async fn send_chunks(
    mut fragments: mpsc::Receiver<Bytes>,
    mut errors: mpsc::Receiver<ProviderError>,
    template: &ChunkTemplate,
    cancel: &StreamCancelHandle,
    out: &mpsc::Sender<StreamChunk>,
) -> RelayOutcome {
    let mut chunks = 0;
    let mut carry: Vec<u8> = Vec::new();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                return RelayOutcome::Cancelled { chunks };
            }

            Some(error) = errors.recv() => {
                return RelayOutcome::Failed { chunks, error };
            }

            fragment = fragments.recv() => match fragment {
                Some(fragment) => {
                    carry.extend_from_slice(&fragment);
                    let text = take_complete_utf8(&mut carry);
                    if text.is_empty() {
                        continue;
                    }
                    if !deliver(out, template.delta(text), cancel).await {
                        return RelayOutcome::Cancelled { chunks };
                    }
                    chunks += 1;
                }
                None => {
                    // The reader posts its error before the channel closes
                    if let Ok(error) = errors.try_recv() {
                        return RelayOutcome::Failed { chunks, error };
                    }
                    if !carry.is_empty() {
                        let text = String::from_utf8_lossy(&carry).into_owned();
                        if !deliver(out, template.delta(text), cancel).await {
                            return RelayOutcome::Cancelled { chunks };
                        }
                        chunks += 1;
                    }
                    if !deliver(out, template.terminal(), cancel).await {
                        return RelayOutcome::Cancelled { chunks };
                    }
                    return RelayOutcome::Completed { chunks };
                }
            },
        }
    }
}

/// Send one chunk unless cancelled first. Returns false if it was not delivered.
async fn deliver(out: &mpsc::Sender<StreamChunk>, chunk: StreamChunk, cancel: &StreamCancelHandle) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = out.send(chunk) => sent.is_ok(),
    }
}

/// Drain the longest valid UTF-8 prefix of `buf`, leaving an incomplete
/// trailing sequence in place. Invalid bytes are replaced.
fn take_complete_utf8(buf: &mut Vec<u8>) -> String {
    match std::str::from_utf8(buf) {
        Ok(text) => {
            let text = text.to_string();
            buf.clear();
            text
        }
        Err(e) if e.error_len().is_none() => {
            let tail = buf.split_off(e.valid_up_to());
            let text = String::from_utf8_lossy(buf).into_owned();
            *buf = tail;
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(buf).into_owned();
            buf.clear();
            text
        }
    }
}
