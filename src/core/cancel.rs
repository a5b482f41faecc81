use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Shared cancellation signal between a streaming response body and the task
/// pulling from the upstream.
///
/// The body side calls [`cancel`](Self::cancel) when the downstream client goes
/// away; the upstream side races [`cancelled`](Self::cancelled) against its
/// next read. A stream that finished on its own is marked completed first so
/// the final drop is not mistaken for a disconnect.
#[derive(Clone)]
pub struct StreamCancelHandle {
    sender: Arc<watch::Sender<bool>>,
    completed: Arc<AtomicBool>,
}

impl StreamCancelHandle {
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            completed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark the stream as completed normally.
    pub fn mark_completed(&self) {
        self.completed.store(true, Ordering::SeqCst);
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Signal cancellation. No-op once the stream has completed.
    ///
    /// Returns `true` if this call flipped the handle into the cancelled state.
    pub fn cancel(&self) -> bool {
        if self.is_completed() {
            return false;
        }
        self.sender.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolve once cancellation has been signalled.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so this can only end by the
        // predicate matching.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for StreamCancelHandle {
    fn default() -> Self {
        Self::new()
    }
}
