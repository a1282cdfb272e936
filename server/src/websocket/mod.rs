//! WebSocket support for live collection snapshots.
//!
//! Clients subscribe to collections and receive the full collection
//! whenever any client changes it.

mod manager;
mod protocol;

pub use manager::ConnectionManager;
pub use protocol::*;
