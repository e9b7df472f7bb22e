//! Relay lifecycle: accept → run pump and monitor → terminate once.

use std::sync::Arc;
use std::time::Duration;

use crate::config::RelayConfig;
use crate::net::tracker::ConnectionId;
use crate::observability::metrics;
use crate::relay::connection::{Connection, ConnectionState};
use crate::relay::frame::CloseInfo;
use crate::relay::liveness::LivenessMonitor;
use crate::relay::processor::{Outbound, Processor};
use crate::relay::pump::{DuplexPump, PhaseCell, PumpPhase, PumpReport, PumpSettings};
use crate::relay::queue::OutboundQueue;
use crate::relay::signal::{CancellationSignal, TerminalEvent};
use crate::relay::transport::{FrameReader, FrameWriter};

/// Final result of [`Relay::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Status reported through the close notification.
    pub close: CloseInfo,
    /// First terminal event recorded on the cancellation signal.
    pub terminal_event: Option<TerminalEvent>,
    pub report: PumpReport,
    /// Packets still queued when the relay stopped.
    pub unsent: usize,
}

/// Host-side view of a running relay.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    connection: Arc<Connection>,
    signal: CancellationSignal,
    phase: Arc<PhaseCell>,
}

impl RelayHandle {
    pub fn id(&self) -> ConnectionId {
        self.connection.id()
    }

    pub fn phase(&self) -> PumpPhase {
        self.phase.get()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn close_info(&self) -> Option<CloseInfo> {
        self.connection.close_info().cloned()
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_requested()
    }

    /// Close the connection from outside; the relay then winds down.
    pub async fn shutdown(&self, info: CloseInfo) -> bool {
        self.connection.close(info).await
    }

    /// Drop the connection without a handshake, as if the transport died.
    pub fn abort(&self) -> bool {
        self.connection.abort()
    }
}

/// One upgraded connection together with its queue and control state.
///
/// [`Relay::run`] consumes the relay, so exactly one processor is ever
/// attached to a connection.
pub struct Relay {
    connection: Arc<Connection>,
    queue: Arc<OutboundQueue>,
    signal: CancellationSignal,
    phase: Arc<PhaseCell>,
    settings: PumpSettings,
    liveness_interval: Duration,
}

impl Relay {
    pub fn new(
        id: ConnectionId,
        reader: impl FrameReader,
        writer: impl FrameWriter,
        config: &RelayConfig,
    ) -> Self {
        let signal = CancellationSignal::new();
        let connection = Arc::new(Connection::new(
            id,
            reader,
            writer,
            signal.clone(),
            Duration::from_millis(config.close_timeout_ms),
        ));

        Self {
            connection,
            queue: Arc::new(OutboundQueue::with_capacity(config.outbound_capacity)),
            signal,
            phase: Arc::new(PhaseCell::default()),
            settings: PumpSettings {
                max_message_bytes: config.max_message_bytes,
                writer_wait: Duration::from_millis(config.writer_wait_ms),
            },
            liveness_interval: Duration::from_millis(config.liveness_interval_ms),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.connection.id()
    }

    /// Register the close notification. It fires exactly once.
    pub fn on_closed<F>(&self, handler: F)
    where
        F: FnOnce(&CloseInfo) + Send + 'static,
    {
        self.connection.set_close_handler(Box::new(handler));
    }

    /// Producer handle for pushing packets from outside a processor.
    pub fn outbound(&self) -> Outbound {
        Outbound::new(Arc::clone(&self.queue))
    }

    pub fn handle(&self) -> RelayHandle {
        RelayHandle {
            connection: Arc::clone(&self.connection),
            signal: self.signal.clone(),
            phase: Arc::clone(&self.phase),
        }
    }

    /// Run until both loops and the liveness monitor have stopped.
    ///
    /// Never fails: transport faults and task panics end in a close with an
    /// internal-error status instead.
    pub async fn run(self, processor: Arc<dyn Processor>) -> RelayOutcome {
        let id = self.connection.id();
        self.connection.mark_open();
        tracing::info!(connection_id = %id, "Relay started");

        let monitor = tokio::spawn(
            LivenessMonitor::new(
                Arc::clone(&self.connection),
                self.signal.clone(),
                self.liveness_interval,
            )
            .run(),
        );

        let pump = DuplexPump::new(
            Arc::clone(&self.connection),
            Arc::clone(&self.queue),
            self.signal.clone(),
            processor,
            self.settings,
            Arc::clone(&self.phase),
        );
        let report = pump.run().await;

        // The pump closed the connection, which triggered cancellation.
        if let Err(e) = monitor.await {
            tracing::error!(connection_id = %id, error = %e, "Liveness monitor failed");
        }

        // Covers a connection that was aborted while no monitor tick caught it.
        self.connection.notify_closed(CloseInfo::empty());

        let unsent = self.queue.close();
        metrics::record_packets_dropped(self.queue.dropped());
        if unsent > 0 {
            tracing::debug!(connection_id = %id, unsent, "Discarded undelivered packets");
        }

        let close = self
            .connection
            .close_info()
            .cloned()
            .unwrap_or_else(CloseInfo::empty);
        let terminal_event = self.signal.terminal_event();

        tracing::info!(
            connection_id = %id,
            code = %close.code,
            event = ?terminal_event,
            "Relay terminated"
        );

        RelayOutcome {
            close,
            terminal_event,
            report,
            unsent,
        }
    }
}
