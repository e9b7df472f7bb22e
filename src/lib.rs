//! WebSocket relay library.
//!
//! Hosts a duplex message relay behind an axum upgrade endpoint: inbound
//! fragments are reassembled into JSON messages for a processor, and the
//! processor's packets are written back through an ordered outbound queue.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod relay;

pub use config::RelayServerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use relay::{Processor, Relay};
