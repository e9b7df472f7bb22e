//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, health endpoint)
//!     → websocket.rs (upgrade, transport adapter)
//!     → relay (pump, monitor, processor)
//! ```

pub mod server;
pub mod websocket;

pub use server::{AppState, HttpServer};
