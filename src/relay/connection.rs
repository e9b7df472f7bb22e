//! Duplex connection shared by the relay tasks.
//!
//! # State Machine
//! ```text
//! Connecting → Open → Closing → Closed
//!                 └──────────────→ Closed   (abort: transport vanished)
//! ```
//! Transitions only move forward. The first caller that moves the
//! connection out of `Open` owns the close side effects; everyone else is a
//! no-op. The close notification is guarded separately so that it fires
//! exactly once whichever path (close, liveness poll, lifecycle) gets there
//! first.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;

use crate::net::tracker::ConnectionId;
use crate::observability::metrics;
use crate::relay::error::ConnectionError;
use crate::relay::frame::{CloseInfo, FrameKind, Inbound};
use crate::relay::signal::{CancellationSignal, TerminalEvent};
use crate::relay::transport::{FrameReader, FrameWriter};

/// Callback invoked once with the terminal close status.
pub type CloseHandler = Box<dyn FnOnce(&CloseInfo) + Send>;

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// A duplex connection owned by one relay.
pub struct Connection {
    id: ConnectionId,
    state: AtomicU8,
    reader: AsyncMutex<Box<dyn FrameReader>>,
    writer: AsyncMutex<Box<dyn FrameWriter>>,
    /// Set once the peer's close frame has been read.
    peer_closed: AtomicBool,
    /// Terminal status; whoever sets it fires the close handler.
    terminal: OnceLock<CloseInfo>,
    on_closed: Mutex<Option<CloseHandler>>,
    signal: CancellationSignal,
    close_timeout: Duration,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        reader: impl FrameReader,
        writer: impl FrameWriter,
        signal: CancellationSignal,
        close_timeout: Duration,
    ) -> Self {
        Self {
            id,
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            reader: AsyncMutex::new(Box::new(reader)),
            writer: AsyncMutex::new(Box::new(writer)),
            peer_closed: AtomicBool::new(false),
            terminal: OnceLock::new(),
            on_closed: Mutex::new(None),
            signal,
            close_timeout,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Terminal close status, once the close notification has fired.
    pub fn close_info(&self) -> Option<&CloseInfo> {
        self.terminal.get()
    }

    /// Register the close notification. Replaces any earlier handler.
    pub fn set_close_handler(&self, handler: CloseHandler) {
        *self.on_closed.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    /// Move forward to `target` if the current state is strictly earlier and
    /// no later than `ceiling`. Returns true on success.
    fn advance(&self, target: ConnectionState, ceiling: ConnectionState) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let current = ConnectionState::from_u8(current);
                (current < target && current <= ceiling).then_some(target as u8)
            })
            .is_ok()
    }

    /// Mark the upgrade as complete.
    pub fn mark_open(&self) -> bool {
        self.advance(ConnectionState::Open, ConnectionState::Connecting)
    }

    /// Drop to `Closed` without a handshake. Used when the transport is gone.
    pub fn abort(&self) -> bool {
        let aborted = self.advance(ConnectionState::Closed, ConnectionState::Open);
        if aborted {
            tracing::debug!(connection_id = %self.id, "Connection aborted");
        }
        aborted
    }

    /// Receive the next fragment or close frame from the peer.
    pub async fn receive(&self) -> Result<Inbound, ConnectionError> {
        if self.state() == ConnectionState::Closed {
            return Err(ConnectionError::Closed);
        }
        let mut reader = self.reader.lock().await;
        let inbound = reader.receive().await?;
        if matches!(inbound, Inbound::Close(_)) {
            self.peer_closed.store(true, Ordering::Release);
        }
        Ok(inbound)
    }

    /// Send one fragment. Fails immediately unless the connection is open.
    pub async fn send(
        &self,
        payload: Vec<u8>,
        kind: FrameKind,
        is_final: bool,
    ) -> Result<(), ConnectionError> {
        if !self.is_open() {
            return Err(ConnectionError::Closed);
        }
        let mut writer = self.writer.lock().await;
        writer.send(payload, kind, is_final).await?;
        Ok(())
    }

    /// Close the connection. Idempotent: only the first call has effects.
    ///
    /// The first call triggers cancellation, sends the close frame (or
    /// acknowledges the peer's), moves to `Closed` and fires the close
    /// notification. Returns whether this call did the work.
    pub async fn close(&self, info: CloseInfo) -> bool {
        if !self.advance(ConnectionState::Closing, ConnectionState::Open) {
            tracing::trace!(connection_id = %self.id, "Close requested on a closed connection");
            return false;
        }

        if !info.code.is_normal() {
            tracing::warn!(
                connection_id = %self.id,
                code = %info.code,
                reason = %info.display_reason(),
                "Closing connection with non-normal status"
            );
        }

        self.signal.trigger(TerminalEvent::Closed(info.clone()));

        // When the peer closed first this only acknowledges its close frame.
        let acknowledging = self.peer_closed.load(Ordering::Acquire);
        let frame = (!info.code.is_reserved()).then(|| info.clone());
        let handshake = async {
            let mut writer = self.writer.lock().await;
            writer.close(frame).await
        };
        match tokio::time::timeout(self.close_timeout, handshake).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(
                    connection_id = %self.id,
                    acknowledging,
                    error = %e,
                    "Close frame not delivered"
                );
            }
            Err(_) => {
                tracing::warn!(
                    connection_id = %self.id,
                    timeout_ms = self.close_timeout.as_millis() as u64,
                    "Close handshake timed out"
                );
            }
        }

        // Status is recorded before `Closed` becomes visible so the liveness
        // monitor never reports this connection as vanished.
        let recorded = self.terminal.set(info).is_ok();
        self.state.store(ConnectionState::Closed as u8, Ordering::Release);
        if recorded {
            self.fire_close_handler();
        }
        true
    }

    /// Fire the close notification if it has not fired yet.
    ///
    /// Returns true for the single call that fired it.
    pub fn notify_closed(&self, info: CloseInfo) -> bool {
        if self.terminal.set(info).is_err() {
            return false;
        }
        self.fire_close_handler();
        true
    }

    fn fire_close_handler(&self) {
        let Some(info) = self.terminal.get() else {
            return;
        };

        metrics::record_close(info.code.as_u16());
        tracing::info!(
            connection_id = %self.id,
            code = %info.code,
            reason = %info.reason,
            "Connection closed"
        );

        let handler = self
            .on_closed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handler) = handler {
            handler(info);
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("terminal", &self.terminal.get())
            .finish()
    }
}
