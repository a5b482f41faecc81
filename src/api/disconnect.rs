use crate::core::metrics::get_metrics;
use crate::core::StreamCancelHandle;
use bytes::Bytes;
use futures::stream::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Response body wrapper that fires a cancellation handle when dropped.
///
/// hyper drops the body as soon as the downstream connection goes away, so a
/// drop before the inner stream marked itself completed is a client
/// disconnect.
pub struct DisconnectStream<S> {
    stream: S,
    cancel_handle: StreamCancelHandle,
    request_id: String,
}

impl<S> DisconnectStream<S> {
    pub fn new(stream: S, cancel_handle: StreamCancelHandle, request_id: String) -> Self {
        Self {
            stream,
            cancel_handle,
            request_id,
        }
    }
}

impl<S, E> Stream for DisconnectStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.stream).poll_next(cx)
    }
}

impl<S> Drop for DisconnectStream<S> {
    fn drop(&mut self) {
        if self.cancel_handle.cancel() {
            tracing::info!(
                request_id = %self.request_id,
                "Client disconnected mid-stream, cancelling upstream"
            );
            get_metrics().client_disconnects_total.inc();
        }
    }
}
