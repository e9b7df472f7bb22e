//! Reader and writer loops over one connection.
//!
//! # State Machine
//! ```text
//! Idle → Running → Draining → Terminated
//! ```
//! - Running: both loops spawned.
//! - Draining: one loop has exited and cancellation was triggered; waiting
//!   for the other.
//! - Terminated: both loops gone and the connection closed exactly once.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinError;

use crate::observability::metrics;
use crate::relay::connection::Connection;
use crate::relay::error::ConnectionError;
use crate::relay::frame::{CloseInfo, FrameKind, Inbound};
use crate::relay::message::InboundMessage;
use crate::relay::processor::{Outbound, Processor};
use crate::relay::queue::OutboundQueue;
use crate::relay::reassembler::{Accumulated, MessageReassembler};
use crate::relay::signal::{CancellationSignal, TerminalEvent};

/// Close reason used for transport failures.
pub const TRANSPORT_FAILURE: &str = "transport failure";

/// Close reason used when a relay task panicked.
pub const UNEXPECTED_ERROR: &str = "unexpected error processing connection";

const LOG_PREVIEW_BYTES: usize = 256;

/// Phase of a [`DuplexPump`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PumpPhase {
    Idle = 0,
    Running = 1,
    Draining = 2,
    Terminated = 3,
}

/// Shared, readable pump phase.
#[derive(Debug, Default)]
pub struct PhaseCell(AtomicU8);

impl PhaseCell {
    pub fn get(&self) -> PumpPhase {
        match self.0.load(Ordering::Acquire) {
            0 => PumpPhase::Idle,
            1 => PumpPhase::Running,
            2 => PumpPhase::Draining,
            _ => PumpPhase::Terminated,
        }
    }

    fn set(&self, phase: PumpPhase) {
        self.0.store(phase as u8, Ordering::Release);
    }
}

/// Why a loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Cancellation was observed.
    Cancelled,
    /// The peer sent a close frame.
    PeerClosed,
    /// The connection was no longer open.
    ConnectionClosed,
    /// Send or receive failed; the connection was closed with an internal error.
    TransportError,
    /// The task panicked.
    Panicked,
}

/// How both loops ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpReport {
    pub reader: LoopExit,
    pub writer: LoopExit,
}

impl PumpReport {
    pub fn faulted(&self) -> bool {
        self.reader == LoopExit::Panicked || self.writer == LoopExit::Panicked
    }
}

/// Loop tuning taken from the relay configuration.
#[derive(Debug, Clone, Copy)]
pub struct PumpSettings {
    pub max_message_bytes: usize,
    /// Upper bound on an idle writer wait before it re-checks state.
    pub writer_wait: Duration,
}

/// Runs the reader and writer loops against one connection.
pub struct DuplexPump {
    connection: Arc<Connection>,
    queue: Arc<OutboundQueue>,
    signal: CancellationSignal,
    processor: Arc<dyn Processor>,
    settings: PumpSettings,
    phase: Arc<PhaseCell>,
}

impl DuplexPump {
    pub fn new(
        connection: Arc<Connection>,
        queue: Arc<OutboundQueue>,
        signal: CancellationSignal,
        processor: Arc<dyn Processor>,
        settings: PumpSettings,
        phase: Arc<PhaseCell>,
    ) -> Self {
        Self {
            connection,
            queue,
            signal,
            processor,
            settings,
            phase,
        }
    }

    /// Run both loops to completion, then close the connection.
    pub async fn run(self) -> PumpReport {
        self.phase.set(PumpPhase::Running);

        let mut reader = tokio::spawn(read_loop(
            Arc::clone(&self.connection),
            self.signal.clone(),
            Arc::clone(&self.processor),
            Outbound::new(Arc::clone(&self.queue)),
            self.settings.max_message_bytes,
        ));
        let mut writer = tokio::spawn(write_loop(
            Arc::clone(&self.connection),
            self.signal.clone(),
            Arc::clone(&self.queue),
            self.settings.writer_wait,
        ));

        let (reader_first, first) = tokio::select! {
            result = &mut reader => (true, result),
            result = &mut writer => (false, result),
        };

        let (reader_exit, writer_exit) = if reader_first {
            let reader_exit = self.settle("reader", TerminalEvent::ReaderExited, first);
            let writer_exit = self.settle("writer", TerminalEvent::WriterExited, writer.await);
            (reader_exit, writer_exit)
        } else {
            let writer_exit = self.settle("writer", TerminalEvent::WriterExited, first);
            let reader_exit = self.settle("reader", TerminalEvent::ReaderExited, reader.await);
            (reader_exit, writer_exit)
        };

        let report = PumpReport {
            reader: reader_exit,
            writer: writer_exit,
        };

        let close = if report.faulted() {
            CloseInfo::internal_error(UNEXPECTED_ERROR)
        } else {
            CloseInfo::normal("relay terminated")
        };
        self.connection.close(close).await;
        self.phase.set(PumpPhase::Terminated);

        tracing::debug!(
            connection_id = %self.connection.id(),
            reader = ?report.reader,
            writer = ?report.writer,
            "Duplex pump terminated"
        );
        report
    }

    /// Record a loop's exit and make sure the other loop is told to stop.
    fn settle(
        &self,
        side: &'static str,
        event: TerminalEvent,
        result: Result<LoopExit, JoinError>,
    ) -> LoopExit {
        self.phase.set(PumpPhase::Draining);
        match result {
            Ok(exit) => {
                self.signal.trigger(event);
                exit
            }
            Err(e) => {
                tracing::error!(
                    connection_id = %self.connection.id(),
                    side,
                    error = %e,
                    "Unexpected error in relay loop"
                );
                self.signal.trigger(TerminalEvent::Fault(format!("{} loop: {}", side, e)));
                LoopExit::Panicked
            }
        }
    }
}

async fn read_loop(
    connection: Arc<Connection>,
    signal: CancellationSignal,
    processor: Arc<dyn Processor>,
    outbound: Outbound,
    max_message_bytes: usize,
) -> LoopExit {
    let id = connection.id();
    let mut reassembler = MessageReassembler::new(max_message_bytes);

    loop {
        if signal.is_requested() {
            return LoopExit::Cancelled;
        }
        if !connection.is_open() {
            return LoopExit::ConnectionClosed;
        }

        let received = tokio::select! {
            biased;
            _ = signal.cancelled() => return LoopExit::Cancelled,
            received = connection.receive() => received,
        };

        match received {
            Ok(Inbound::Fragment(fragment)) => match reassembler.accumulate(&fragment) {
                Ok(Accumulated::Complete(bytes)) => {
                    dispatch(&connection, processor.as_ref(), &outbound, &bytes);
                }
                Ok(Accumulated::NeedMoreData | Accumulated::Skipped) => {}
                Err(e) => {
                    tracing::warn!(connection_id = %id, error = %e, "Dropping oversized message");
                    metrics::record_discarded("too_large");
                }
            },
            Ok(Inbound::Close(info)) => {
                tracing::debug!(
                    connection_id = %id,
                    code = %info.code,
                    reason = %info.reason,
                    "Peer initiated close"
                );
                connection.close(info).await;
                return LoopExit::PeerClosed;
            }
            Err(ConnectionError::Closed) => return LoopExit::ConnectionClosed,
            Err(e) => {
                tracing::error!(connection_id = %id, error = %e, "Receive failed");
                connection.close(CloseInfo::internal_error(TRANSPORT_FAILURE)).await;
                return LoopExit::TransportError;
            }
        }
    }
}

/// Decode a complete message and hand it to the processor without waiting.
fn dispatch(connection: &Connection, processor: &dyn Processor, outbound: &Outbound, bytes: &[u8]) {
    match InboundMessage::decode(bytes) {
        Ok(message) => {
            metrics::record_message_received();
            tracing::trace!(
                connection_id = %connection.id(),
                stream = %message.stream_name,
                id = %message.data.id,
                "Dispatching message"
            );
            tokio::spawn(processor.process(message, outbound.clone()));
        }
        Err(e) => {
            let preview = &bytes[..bytes.len().min(LOG_PREVIEW_BYTES)];
            tracing::error!(
                connection_id = %connection.id(),
                error = %e,
                size = bytes.len(),
                payload = %String::from_utf8_lossy(preview),
                "Unexpected error parsing message data"
            );
            metrics::record_discarded("decode");
        }
    }
}

async fn write_loop(
    connection: Arc<Connection>,
    signal: CancellationSignal,
    queue: Arc<OutboundQueue>,
    wait: Duration,
) -> LoopExit {
    let id = connection.id();

    loop {
        if signal.is_requested() {
            return LoopExit::Cancelled;
        }
        if !connection.is_open() {
            return LoopExit::ConnectionClosed;
        }

        let Some(packet) = queue.try_dequeue() else {
            tokio::select! {
                biased;
                _ = signal.cancelled() => return LoopExit::Cancelled,
                _ = queue.wait_for_work(wait) => {}
            }
            continue;
        };

        let text = match packet.to_text() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(
                    connection_id = %id,
                    stream = %packet.body.stream_name,
                    error = %e,
                    "Failed to serialize outbound packet"
                );
                continue;
            }
        };

        // A peer that stops reading can stall the send indefinitely.
        let sent = tokio::select! {
            biased;
            _ = signal.cancelled() => return LoopExit::Cancelled,
            sent = connection.send(text.into_bytes(), FrameKind::Text, true) => sent,
        };

        match sent {
            Ok(()) => metrics::record_packet_sent(),
            Err(ConnectionError::Closed) => return LoopExit::ConnectionClosed,
            Err(e) => {
                tracing::error!(connection_id = %id, error = %e, "Send failed");
                connection.close(CloseInfo::internal_error(TRANSPORT_FAILURE)).await;
                return LoopExit::TransportError;
            }
        }
    }
}
