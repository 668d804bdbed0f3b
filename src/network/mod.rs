//! Network layer: the WebSocket acceptor and per-viewer sessions.

pub mod server;

pub use server::{SessionContext, WebSocketServer};
