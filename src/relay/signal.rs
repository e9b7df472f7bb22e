//! Cancellation shared by the reader, the writer and the liveness monitor.
//!
//! The signal carries the first terminal event that fired. Later triggers
//! are ignored, so the recorded event is always the deterministic winner.

use std::sync::Arc;

use tokio::sync::watch;

use crate::relay::frame::CloseInfo;

/// Why a relay started shutting down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    /// The connection was closed (by the peer, on error, or on request).
    Closed(CloseInfo),
    /// The liveness monitor saw the connection leave the open state.
    PeerGone,
    ReaderExited,
    WriterExited,
    /// A relay task panicked.
    Fault(String),
}

/// Idempotent, one-way cancellation signal.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    tx: Arc<watch::Sender<Option<TerminalEvent>>>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation. Returns true only for the call that won.
    pub fn trigger(&self, event: TerminalEvent) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(event);
                true
            } else {
                false
            }
        })
    }

    pub fn is_requested(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// The event that won the trigger race, if any.
    pub fn terminal_event(&self) -> Option<TerminalEvent> {
        self.tx.borrow().clone()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(Option::is_some).await;
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}
