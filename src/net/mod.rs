//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Upgraded connection
//!     → tracker.rs (connection ID, live count guard)
//!     → Hand off to relay layer
//! ```
//!
//! # Design Decisions
//! - Each relay tracked for graceful shutdown
//! - Guards release the slot even if the relay task panics

pub mod tracker;

pub use tracker::{ConnectionGuard, ConnectionId, ConnectionTracker};
