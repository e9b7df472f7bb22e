//! Periodic liveness polling.
//!
//! Catches a connection that reached `Closed` without anyone running the
//! close path (for example an aborted transport) and reports it once.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};

use crate::relay::connection::{Connection, ConnectionState};
use crate::relay::frame::CloseInfo;
use crate::relay::signal::{CancellationSignal, TerminalEvent};

/// Default polling interval.
pub const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::from_secs(2);

pub struct LivenessMonitor {
    connection: Arc<Connection>,
    signal: CancellationSignal,
    interval: Duration,
}

impl LivenessMonitor {
    pub fn new(connection: Arc<Connection>, signal: CancellationSignal, interval: Duration) -> Self {
        Self {
            connection,
            signal,
            interval,
        }
    }

    /// Poll until the connection is seen closed or cancellation is requested.
    ///
    /// Returns true if this monitor fired the close notification.
    pub async fn run(self) -> bool {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.signal.cancelled() => {
                    tracing::trace!(connection_id = %self.connection.id(), "Liveness monitor cancelled");
                    return false;
                }
                _ = ticker.tick() => {
                    // `Closing` belongs to the close path, which reports its own status.
                    if self.connection.state() == ConnectionState::Closed {
                        let fired = self.connection.notify_closed(CloseInfo::empty());
                        self.signal.trigger(TerminalEvent::PeerGone);
                        tracing::debug!(
                            connection_id = %self.connection.id(),
                            fired,
                            "Liveness monitor observed closed connection"
                        );
                        return fired;
                    }
                }
            }
        }
    }
}
