//! Client disconnect detection for streamed bodies.

use crate::core::StreamCancelHandle;
use futures::stream::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Body stream wrapper that cancels the relay when dropped early.
///
/// hyper drops the body as soon as the client goes away. If that happens
/// before the terminal frame was produced, the cancel handle fires and the
/// relay stops without flushing buffered chunks.
pub struct DisconnectStream<S> {
    inner: S,
    cancel: StreamCancelHandle,
}

impl<S> DisconnectStream<S> {
    pub fn new(inner: S, cancel: StreamCancelHandle) -> Self {
        Self { inner, cancel }
    }
}

impl<S> Stream for DisconnectStream<S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<S> Drop for DisconnectStream<S> {
    fn drop(&mut self) {
        if !self.cancel.is_completed() {
            tracing::debug!("Client disconnected before end of stream, cancelling relay");
            self.cancel.cancel();
        }
    }
}
