mod handlers;
pub mod models;
mod server;
mod websocket;

pub use server::{SessionContext, WebSocketServer};
