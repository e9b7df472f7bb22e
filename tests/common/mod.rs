//! Shared utilities for relay integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use socket_relay::config::{RelayServerConfig, RelayConfig};
use socket_relay::lifecycle::Shutdown;
use socket_relay::net::tracker::ConnectionTracker;
use socket_relay::relay::{
    CloseInfo, EchoProcessor, Fragment, FrameKind, FrameReader, FrameWriter, Inbound,
    TransportError,
};
use socket_relay::HttpServer;

const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// Something the relay wrote to the mock socket.
#[derive(Debug, Clone, PartialEq)]
pub enum WriterEvent {
    Sent {
        payload: Vec<u8>,
        kind: FrameKind,
        is_final: bool,
    },
    Close(Option<CloseInfo>),
}

/// Read half fed by a [`MockPeer`]. Ends with `Disconnected` once the peer
/// is dropped.
pub struct MockReader {
    rx: mpsc::UnboundedReceiver<Result<Inbound, TransportError>>,
}

impl FrameReader for MockReader {
    fn receive(&mut self) -> BoxFuture<'_, Result<Inbound, TransportError>> {
        Box::pin(async move {
            self.rx
                .recv()
                .await
                .unwrap_or(Err(TransportError::Disconnected))
        })
    }
}

/// Write half that records every call for the [`MockPeer`].
pub struct MockWriter {
    tx: mpsc::UnboundedSender<WriterEvent>,
    fail_sends: Arc<AtomicBool>,
}

impl FrameWriter for MockWriter {
    fn send(
        &mut self,
        payload: Vec<u8>,
        kind: FrameKind,
        is_final: bool,
    ) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(TransportError::Io("injected send failure".into()));
            }
            let _ = self.tx.send(WriterEvent::Sent {
                payload,
                kind,
                is_final,
            });
            Ok(())
        })
    }

    fn close(&mut self, close: Option<CloseInfo>) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            let _ = self.tx.send(WriterEvent::Close(close));
            Ok(())
        })
    }
}

/// Write half of a peer that stopped reading: every write hangs.
pub struct StalledWriter;

impl FrameWriter for StalledWriter {
    fn send(
        &mut self,
        _payload: Vec<u8>,
        _kind: FrameKind,
        _is_final: bool,
    ) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(std::future::pending())
    }

    fn close(&mut self, _close: Option<CloseInfo>) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(std::future::pending())
    }
}

/// The remote end of an in-memory transport.
pub struct MockPeer {
    inbound: mpsc::UnboundedSender<Result<Inbound, TransportError>>,
    events: mpsc::UnboundedReceiver<WriterEvent>,
    fail_sends: Arc<AtomicBool>,
}

impl MockPeer {
    pub fn send_fragment(&self, fragment: Fragment) {
        let _ = self.inbound.send(Ok(Inbound::Fragment(fragment)));
    }

    /// Send `text` as a single final text fragment.
    pub fn send_text(&self, text: &str) {
        self.send_fragment(Fragment::text(text.as_bytes().to_vec(), true));
    }

    /// Send `bytes` split into text fragments of at most `size` bytes.
    pub fn send_chunked(&self, bytes: &[u8], size: usize) {
        let chunks: Vec<&[u8]> = bytes.chunks(size).collect();
        let last = chunks.len().saturating_sub(1);
        for (i, chunk) in chunks.into_iter().enumerate() {
            self.send_fragment(Fragment::text(chunk.to_vec(), i == last));
        }
    }

    pub fn send_close(&self, info: CloseInfo) {
        let _ = self.inbound.send(Ok(Inbound::Close(info)));
    }

    pub fn send_error(&self, error: TransportError) {
        let _ = self.inbound.send(Err(error));
    }

    /// Make every later write fail.
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub async fn next_event(&mut self) -> WriterEvent {
        tokio::time::timeout(EVENT_TIMEOUT, self.events.recv())
            .await
            .expect("timed out waiting for writer event")
            .expect("writer dropped")
    }

    /// Next sent frame, parsed as JSON.
    pub async fn next_json(&mut self) -> Value {
        match self.next_event().await {
            WriterEvent::Sent {
                payload,
                kind,
                is_final,
            } => {
                assert_eq!(kind, FrameKind::Text);
                assert!(is_final);
                serde_json::from_slice(&payload).expect("sent frame is JSON")
            }
            other => panic!("expected a sent frame, got {:?}", other),
        }
    }

    /// Everything written so far without waiting.
    pub fn drain_events(&mut self) -> Vec<WriterEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Create a connected in-memory transport.
pub fn mock_transport() -> (MockReader, MockWriter, MockPeer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let fail_sends = Arc::new(AtomicBool::new(false));

    (
        MockReader { rx: inbound_rx },
        MockWriter {
            tx: events_tx,
            fail_sends: Arc::clone(&fail_sends),
        },
        MockPeer {
            inbound: inbound_tx,
            events: events_rx,
            fail_sends,
        },
    )
}

/// Relay settings with short intervals so tests finish quickly.
pub fn relay_config() -> RelayConfig {
    RelayConfig {
        writer_wait_ms: 50,
        liveness_interval_ms: 50,
        close_timeout_ms: 500,
        ..RelayConfig::default()
    }
}

/// JSON text of an inbound `Data` message.
pub fn data_message(stream: &str, id: &str, request: Value) -> String {
    serde_json::json!({
        "streamName": stream,
        "state": 2,
        "data": { "id": id, "request": request },
    })
    .to_string()
}

/// A server running on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub tracker: ConnectionTracker,
    pub task: JoinHandle<Result<(), std::io::Error>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

/// Start the echo relay server on 127.0.0.1 with an OS-assigned port.
pub async fn start_server() -> TestServer {
    let mut config = RelayServerConfig::default();
    config.relay = relay_config();
    config.timeouts.drain_secs = 2;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, Arc::new(EchoProcessor));
    let tracker = server.tracker();
    let task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    TestServer {
        addr,
        shutdown,
        tracker,
        task,
    }
}
