//! Transport seam between the relay and a concrete socket.
//!
//! A transport is split into a read half and a write half so the reader and
//! writer loops can run concurrently. The axum adapter lives in
//! [`crate::http::websocket`]; tests plug in channel-backed halves.

use futures_util::future::BoxFuture;

use crate::relay::error::TransportError;
use crate::relay::frame::{CloseInfo, FrameKind, Inbound};

/// Read half of a duplex transport.
pub trait FrameReader: Send + 'static {
    /// Wait for the next fragment or the peer's close frame.
    ///
    /// Must be cancel safe: dropping the future may not lose data.
    fn receive(&mut self) -> BoxFuture<'_, Result<Inbound, TransportError>>;
}

/// Write half of a duplex transport.
pub trait FrameWriter: Send + 'static {
    fn send(
        &mut self,
        payload: Vec<u8>,
        kind: FrameKind,
        is_final: bool,
    ) -> BoxFuture<'_, Result<(), TransportError>>;

    /// Send a close frame. `None` sends a close frame without a body.
    fn close(&mut self, close: Option<CloseInfo>) -> BoxFuture<'_, Result<(), TransportError>>;
}
