//! Server-Sent Events (SSE) framing for streamed chat completions.
//!
//! The relay delivers [`StreamChunk`]s over an mpsc channel; this module turns
//! them into `data: {json}\n\n` frames, one body chunk per frame, and ends
//! the body with `data: [DONE]\n\n` after the terminal chunk.

use crate::api::disconnect::DisconnectStream;
use crate::api::models::ChunkFrame;
use crate::core::StreamCancelHandle;
use crate::transformer::StreamChunk;
use axum::body::{Body, Bytes};
use axum::http::{header, StatusCode};
use axum::response::Response;
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;

/// Final frame of every successful stream.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Encode one chunk as an SSE frame. The terminal chunk becomes [`DONE_FRAME`].
pub fn encode_frame(chunk: &StreamChunk) -> Result<Bytes, serde_json::Error> {
    if chunk.done {
        return Ok(Bytes::from_static(DONE_FRAME.as_bytes()));
    }
    let json = serde_json::to_string(&ChunkFrame::from(chunk))?;
    Ok(Bytes::from(format!("data: {}\n\n", json)))
}

/// Body that frames every chunk received on `chunks`.
///
/// Dropping the body before the terminal frame was produced (client
/// disconnect) triggers `cancel`.
pub fn chunk_body(chunks: mpsc::Receiver<StreamChunk>, cancel: StreamCancelHandle) -> Body {
    let completion = cancel.clone();
    let frames = stream::unfold(chunks, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    })
    .map(move |chunk| {
        if chunk.done {
            completion.mark_completed();
        }
        encode_frame(&chunk).map_err(|e| {
            tracing::error!(error = %e, "Failed to encode stream chunk");
            std::io::Error::new(std::io::ErrorKind::InvalidData, e)
        })
    });

    Body::from_stream(DisconnectStream::new(Box::pin(frames), cancel))
}

/// Wrap an SSE body in a response with the streaming headers.
pub fn sse_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, header::HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, header::HeaderValue::from_static("keep-alive"));
    response
}
