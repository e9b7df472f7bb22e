//! WebSocket upgrade handling and the axum transport adapter.
//!
//! # Responsibilities
//! - Reject requests that are not WebSocket upgrades (400)
//! - Complete the upgrade and hand the socket to a [`Relay`]
//! - Adapt axum's message stream to the relay's fragment seam
//!
//! # Data Flow
//! ```text
//! Client ──frames──→ WsReader (chunk to fragment_bytes) ──→ reader loop
//! Client ←─frames─── WsWriter (join fragments)          ←── writer loop
//! ```
//!
//! # Design Decisions
//! - axum delivers whole messages, so the reader re-chunks them and the
//!   reassembler sees bounded fragments
//! - Ping/pong replies are handled by the socket; the frames still flow
//!   to the relay, which ignores them
//! - A server shutdown closes each relay with 1001

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{
    future::BoxFuture,
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};

use crate::http::server::AppState;
use crate::relay::{
    CloseCode, CloseInfo, Fragment, FrameKind, FrameReader, FrameWriter, Inbound, Relay,
    TransportError,
};

/// Close reason sent to clients when the server stops.
pub const SHUTDOWN_REASON: &str = "server shutting down";

/// A received message not yet fully handed out as fragments.
///
/// Holds the socket's buffer as is; only one chunk is copied at a time.
struct PendingMessage {
    kind: FrameKind,
    data: Bytes,
    offset: usize,
}

impl PendingMessage {
    fn new(kind: FrameKind, data: Bytes) -> Self {
        Self {
            kind,
            data,
            offset: 0,
        }
    }

    /// Next chunk of at most `limit` bytes. An empty message yields one
    /// empty final fragment.
    fn take(&mut self, limit: usize) -> Fragment {
        let end = (self.offset + limit).min(self.data.len());
        let payload = self.data[self.offset..end].to_vec();
        self.offset = end;
        Fragment {
            kind: self.kind,
            payload,
            is_final: end == self.data.len(),
        }
    }
}

/// Read half of an upgraded socket.
pub struct WsReader {
    stream: SplitStream<WebSocket>,
    pending: Option<PendingMessage>,
    fragment_bytes: usize,
}

impl WsReader {
    pub fn new(stream: SplitStream<WebSocket>, fragment_bytes: usize) -> Self {
        Self {
            stream,
            pending: None,
            fragment_bytes: fragment_bytes.max(1),
        }
    }

    fn next_chunk(&mut self) -> Option<Fragment> {
        let fragment = self.pending.as_mut()?.take(self.fragment_bytes);
        if fragment.is_final {
            self.pending = None;
        }
        Some(fragment)
    }

    fn stage(&mut self, kind: FrameKind, data: Bytes) {
        self.pending = Some(PendingMessage::new(kind, data));
    }
}

impl FrameReader for WsReader {
    fn receive(&mut self) -> BoxFuture<'_, Result<Inbound, TransportError>> {
        Box::pin(async move {
            loop {
                if let Some(fragment) = self.next_chunk() {
                    return Ok(Inbound::Fragment(fragment));
                }

                let message = match self.stream.next().await {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => return Err(TransportError::Io(e.to_string())),
                    None => return Err(TransportError::Disconnected),
                };

                match message {
                    Message::Text(text) => self.stage(FrameKind::Text, Bytes::from(text)),
                    Message::Binary(data) => self.stage(FrameKind::Binary, data),
                    Message::Ping(data) => self.stage(FrameKind::Ping, data),
                    Message::Pong(data) => self.stage(FrameKind::Pong, data),
                    Message::Close(Some(frame)) => {
                        return Ok(Inbound::Close(CloseInfo::new(
                            CloseCode(frame.code),
                            frame.reason.as_str(),
                        )));
                    }
                    Message::Close(None) => return Ok(Inbound::Close(CloseInfo::empty())),
                }
            }
        })
    }
}

/// Write half of an upgraded socket.
///
/// Non-final fragments are buffered and sent as one message on the final one.
pub struct WsWriter {
    sink: SplitSink<WebSocket, Message>,
    partial: Vec<u8>,
}

impl WsWriter {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink,
            partial: Vec::new(),
        }
    }
}

impl FrameWriter for WsWriter {
    fn send(
        &mut self,
        payload: Vec<u8>,
        kind: FrameKind,
        is_final: bool,
    ) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            if !is_final {
                self.partial.extend_from_slice(&payload);
                return Ok(());
            }

            let data = if self.partial.is_empty() {
                payload
            } else {
                let mut data = std::mem::take(&mut self.partial);
                data.extend_from_slice(&payload);
                data
            };

            let message = match kind {
                FrameKind::Text => {
                    let text = String::from_utf8(data).map_err(|_| TransportError::InvalidUtf8)?;
                    Message::Text(text.into())
                }
                FrameKind::Binary => Message::Binary(data.into()),
                FrameKind::Ping => Message::Ping(data.into()),
                FrameKind::Pong => Message::Pong(data.into()),
            };

            self.sink
                .send(message)
                .await
                .map_err(|e| TransportError::Io(e.to_string()))
        })
    }

    fn close(&mut self, close: Option<CloseInfo>) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            let frame = close.map(|info| CloseFrame {
                code: info.code.as_u16(),
                reason: info.reason.into(),
            });
            self.sink
                .send(Message::Close(frame))
                .await
                .map_err(|e| TransportError::Io(e.to_string()))
        })
    }
}

/// Upgrade handler mounted on the relay route.
pub async fn relay_handler(
    State(state): State<AppState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match upgrade {
        Ok(ws) => ws
            .on_upgrade(move |socket| serve_socket(socket, state))
            .into_response(),
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected non-upgrade request");
            (StatusCode::BAD_REQUEST, "Expected a WebSocket upgrade request").into_response()
        }
    }
}

async fn serve_socket(socket: WebSocket, state: AppState) {
    let guard = state.tracker.track();
    let id = guard.id();

    let (sink, stream) = socket.split();
    let relay = Relay::new(
        id,
        WsReader::new(stream, state.config.fragment_bytes),
        WsWriter::new(sink),
        &state.config,
    );
    relay.on_closed(move |info| {
        tracing::debug!(connection_id = %id, code = %info.code, "Close notification delivered");
    });

    let handle = relay.handle();
    let mut stopping = state.shutdown.subscribe();
    let watcher = tokio::spawn(async move {
        if stopping.wait_for(|stop| *stop).await.is_ok() {
            handle
                .shutdown(CloseInfo::new(CloseCode::GOING_AWAY, SHUTDOWN_REASON))
                .await;
        }
    });

    let outcome = relay.run(Arc::clone(&state.processor)).await;
    watcher.abort();

    tracing::debug!(
        connection_id = %id,
        code = %outcome.close.code,
        unsent = outcome.unsent,
        "Socket released"
    );
    drop(guard);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(data: &[u8], limit: usize) -> Vec<Fragment> {
        let mut pending = PendingMessage::new(FrameKind::Text, Bytes::copy_from_slice(data));
        let mut out = Vec::new();
        loop {
            let fragment = pending.take(limit);
            let done = fragment.is_final;
            out.push(fragment);
            if done {
                return out;
            }
        }
    }

    #[test]
    fn empty_message_is_one_final_fragment() {
        let out = chunks(b"", 4);
        assert_eq!(out, vec![Fragment::text(Vec::new(), true)]);
    }

    #[test]
    fn message_splits_on_fragment_boundary() {
        let out = chunks(b"abcdefghij", 4);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].payload, b"abcd");
        assert!(!out[0].is_final);
        assert_eq!(out[2].payload, b"ij");
        assert!(out[2].is_final);
    }

    #[test]
    fn large_message_is_handed_out_in_bounded_chunks() {
        let data = Bytes::from(vec![b'x'; 64 * 1024]);
        let mut pending = PendingMessage::new(FrameKind::Binary, data.clone());

        let first = pending.take(4096);
        assert_eq!(first.payload.len(), 4096);
        assert_eq!(first.kind, FrameKind::Binary);
        assert!(!first.is_final);
        assert_eq!(pending.offset, 4096);
        // The staged message still points at the socket's buffer.
        assert_eq!(pending.data.as_ptr(), data.as_ptr());
    }
}
