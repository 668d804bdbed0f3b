use serde::{Deserialize, Serialize};

use crate::engine::QualityUpdate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Envelopes sent to viewers.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "screen-update")]
    ScreenUpdate {
        image: String,
        dimensions: Dimensions,
    },
    #[serde(rename = "screen-update-chunk")]
    ScreenUpdateChunk {
        chunk: String,
        #[serde(rename = "chunkIndex")]
        chunk_index: usize,
        #[serde(rename = "totalChunks")]
        total_chunks: usize,
        dimensions: Dimensions,
        #[serde(rename = "isLastChunk")]
        is_last_chunk: bool,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub enum MouseEventType {
    #[serde(rename = "down")]
    Down,
    #[serde(rename = "up")]
    Up,
    #[serde(rename = "move")]
    Move,
}

/// Tagged envelopes viewers send us.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "mouse-event")]
    MouseEvent {
        x: f64,
        y: f64,
        #[serde(rename = "eventType")]
        event_type: MouseEventType,
        #[serde(rename = "screenWidth")]
        screen_width: f64,
        #[serde(rename = "screenHeight")]
        screen_height: f64,
    },
    #[serde(rename = "keyboard-event")]
    KeyboardEvent {
        key: String,
        modifier: Option<String>,
    },
    #[serde(rename = "quality-update")]
    QualityUpdate {
        width: Option<u32>,
        #[serde(rename = "jpegQuality")]
        jpeg_quality: Option<u32>,
        fps: Option<u32>,
    },
}

/// One inbound payload, classified. Everything a viewer can send collapses
/// into this sum type through `classify_binary`/`classify_text`.
#[derive(Debug)]
pub enum ClientEvent {
    Mouse {
        x: f64,
        y: f64,
        event_type: MouseEventType,
        screen_width: f64,
        screen_height: f64,
    },
    Keyboard {
        key: String,
        modifier: Option<String>,
    },
    Quality(QualityUpdate),
    Command(String),
    Upload(Vec<u8>),
    Chat(String),
}

fn from_message(message: ClientMessage) -> ClientEvent {
    match message {
        ClientMessage::MouseEvent {
            x,
            y,
            event_type,
            screen_width,
            screen_height,
        } => ClientEvent::Mouse {
            x,
            y,
            event_type,
            screen_width,
            screen_height,
        },
        ClientMessage::KeyboardEvent { key, modifier } => ClientEvent::Keyboard { key, modifier },
        ClientMessage::QualityUpdate {
            width,
            jpeg_quality,
            fps,
        } => ClientEvent::Quality(QualityUpdate {
            width,
            jpeg_quality,
            fps,
        }),
    }
}

/// Classify a binary payload. JSON with a known tag dispatches directly;
/// anything else (including JSON with an unknown tag) is treated as command
/// text when the supplied predicate accepts it, or as an opaque upload.
pub fn classify_binary(payload: &[u8], is_command: impl Fn(&str) -> bool) -> ClientEvent {
    if let Ok(message) = serde_json::from_slice::<ClientMessage>(payload) {
        return from_message(message);
    }
    let text = String::from_utf8_lossy(payload);
    if is_command(&text) {
        ClientEvent::Command(text.into_owned())
    } else {
        ClientEvent::Upload(payload.to_vec())
    }
}

/// Classify a textual payload. Only `quality-update` is actionable; any
/// other text is a chat prompt.
pub fn classify_text(payload: &str) -> ClientEvent {
    if let Ok(ClientMessage::QualityUpdate {
        width,
        jpeg_quality,
        fps,
    }) = serde_json::from_str::<ClientMessage>(payload)
    {
        return ClientEvent::Quality(QualityUpdate {
            width,
            jpeg_quality,
            fps,
        });
    }
    ClientEvent::Chat(payload.to_string())
}
