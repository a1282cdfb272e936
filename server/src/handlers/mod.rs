//! Request handlers shared by the HTTP routes and the WebSocket protocol.

mod documents;
mod websocket;

pub use documents::*;
pub use websocket::*;
