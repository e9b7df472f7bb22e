//! Message relay over one upgraded WebSocket connection.
//!
//! # Data Flow
//! ```text
//! Connection ──receive──→ reassembler.rs ──complete message──→ Processor
//!     ▲                                                            │
//!     └──────send──── writer loop ◀── queue.rs ◀──── Outbound ◀────┘
//! ```
//!
//! # Control Flow
//! ```text
//! lifecycle.rs (Relay::run)
//!     → pump.rs      reader loop + writer loop
//!     → liveness.rs  periodic is_open() poll
//!     any of them → signal.rs (first terminal event wins)
//!                 → connection.rs close (once) → close notification (once)
//! ```
//!
//! # Design Decisions
//! - Framing and decode errors fail one message, never the connection
//! - Transport errors always close with an internal-error status
//! - Producers never wait on the writer
//! - Every loop selects on the cancellation signal instead of polling a flag

pub mod connection;
pub mod error;
pub mod frame;
pub mod lifecycle;
pub mod liveness;
pub mod message;
pub mod processor;
pub mod pump;
pub mod queue;
pub mod reassembler;
pub mod signal;
pub mod transport;

pub use connection::{Connection, ConnectionState};
pub use error::{ConnectionError, DecodeError, ReassemblyError, TransportError};
pub use frame::{CloseCode, CloseInfo, Fragment, FrameKind, Inbound};
pub use lifecycle::{Relay, RelayHandle, RelayOutcome};
pub use message::{InboundMessage, OutboundPacket, StreamState};
pub use processor::{processor_fn, EchoProcessor, Outbound, Processor};
pub use pump::{LoopExit, PumpPhase, PumpReport};
pub use queue::{EnqueueOutcome, OutboundQueue};
pub use signal::{CancellationSignal, TerminalEvent};
pub use transport::{FrameReader, FrameWriter};
