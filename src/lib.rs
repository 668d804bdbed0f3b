//! deskcast - adaptive screen capture and streaming over WebSocket.
//!
//! A singleton capture engine samples the host display at an adaptive
//! cadence, deduplicates and coalesces frames, encodes JPEG off-thread and
//! fans each frame out to every connected viewer. Viewers send input and
//! quality-control messages back on the same duplex channel.

pub mod app;
pub mod capture;
pub mod codec;
pub mod constants;
pub mod engine;
pub mod error;
pub mod input;
pub mod network;
pub mod ports;
pub mod profile;

pub use app::{ServerController, StartOutcome};
pub use capture::{RawFrame, ScreenSize, ScreenSource, ScrapSource};
pub use engine::CaptureEngine;
pub use network::{SessionContext, WebSocketServer};
