use axum::extract::ws::{Message, WebSocket};
use base64::{engine::general_purpose, Engine};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::capture::ScreenSize;
use crate::engine::{self, CaptureEngine, FramePayload};
use crate::error::InputError;
use crate::input::{ButtonState, InputInjector, PointerButton};
use crate::network::server::models::{
    classify_binary, classify_text, ClientEvent, Dimensions, MouseEventType, ServerMessage,
};
use crate::ports::Ports;

/// One viewer: a duplex channel plus a subscription to the capture engine.
///
/// Frames flow out through an unbounded queue so the engine's fan-out never
/// blocks; inbound payloads are classified and dispatched one at a time.
/// Application-level errors are contained per message; only channel close
/// ends the session.
pub async fn handle_session(
    socket: WebSocket,
    ports: Ports,
    injector: Arc<Mutex<dyn InputInjector>>,
    mut stop_rx: broadcast::Receiver<()>,
) {
    let engine = match engine::require() {
        Ok(engine) => engine,
        Err(e) => {
            error!("Rejecting viewer: {}", e);
            return;
        }
    };
    let real = engine.screen_size();

    info!("New viewer connected ({} profile)", engine.profile().name);

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    // The engine invokes this for every emitted frame; serialization happens
    // here, once per session, so a slow viewer only backs up its own queue.
    let frame_tx = out_tx.clone();
    let mut subscription = engine.clone().subscribe(Box::new(move |payload| {
        for envelope in frame_envelopes(payload) {
            if frame_tx.send(envelope).is_err() {
                break;
            }
        }
    }));

    let (mut sender, mut receiver) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if let Err(e) = sender.send(Message::Text(text)).await {
                debug!("Viewer channel write failed: {}", e);
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                info!("Session closing: server is stopping");
                break;
            }
            message = receiver.next() => {
                match message {
                    Some(Ok(Message::Binary(payload))) => {
                        handle_binary(&engine, &ports, &injector, real, &payload, &out_tx).await;
                    }
                    Some(Ok(Message::Text(text))) => {
                        handle_text(&engine, &ports, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket connection closed by client");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    // Dropping the subscription also unsubscribes, but be explicit: the
    // session is the subscriber's lifecycle owner.
    subscription.unsubscribe();
    drop(out_tx);
    let _ = writer.await;
    info!("Viewer disconnected");
}

/// Serialize one engine payload into its wire envelopes.
fn frame_envelopes(payload: &FramePayload) -> Vec<String> {
    match payload {
        FramePayload::Full(frame) => {
            let message = ServerMessage::ScreenUpdate {
                image: general_purpose::STANDARD.encode(&frame.data),
                dimensions: Dimensions {
                    width: frame.dims.width,
                    height: frame.dims.height,
                },
            };
            match serde_json::to_string(&message) {
                Ok(text) => vec![text],
                Err(e) => {
                    error!("Failed to serialize frame envelope: {}", e);
                    Vec::new()
                }
            }
        }
        FramePayload::Chunked(frame) => {
            let dimensions = Dimensions {
                width: frame.dims.width,
                height: frame.dims.height,
            };
            frame
                .chunks
                .iter()
                .enumerate()
                .filter_map(|(index, chunk)| {
                    let message = ServerMessage::ScreenUpdateChunk {
                        chunk: general_purpose::STANDARD.encode(chunk),
                        chunk_index: index,
                        total_chunks: frame.total,
                        dimensions,
                        is_last_chunk: index == frame.total - 1,
                    };
                    serde_json::to_string(&message)
                        .map_err(|e| error!("Failed to serialize chunk envelope: {}", e))
                        .ok()
                })
                .collect()
        }
    }
}

async fn handle_binary(
    engine: &Arc<CaptureEngine>,
    ports: &Ports,
    injector: &Arc<Mutex<dyn InputInjector>>,
    real: ScreenSize,
    payload: &[u8],
    out_tx: &mpsc::UnboundedSender<String>,
) {
    let event = classify_binary(payload, |text| ports.commands.supports(text));
    match event {
        ClientEvent::Mouse {
            x,
            y,
            event_type,
            screen_width,
            screen_height,
        } => {
            if let Err(e) = inject_mouse(
                injector,
                real,
                x,
                y,
                event_type,
                screen_width,
                screen_height,
            ) {
                error!("Mouse injection failed: {}", e);
                send_error(out_tx, &e.to_string());
            }
        }
        ClientEvent::Keyboard { key, modifier } => {
            let result = injector.lock().tap_key(&key, modifier.as_deref());
            if let Err(e) = result {
                error!("Keyboard injection failed: {}", e);
                send_error(out_tx, &e.to_string());
            }
        }
        ClientEvent::Quality(update) => {
            engine.update_quality(update);
        }
        ClientEvent::Command(text) => {
            if let Err(e) = ports.commands.handle_command(&text).await {
                error!("Command failed: {}", e);
                send_error(out_tx, &e.to_string());
            }
        }
        ClientEvent::Upload(bytes) => {
            if let Err(e) = ports.uploads.handle_upload(&bytes).await {
                error!("Upload handling failed: {}", e);
                send_error(out_tx, &e.to_string());
            }
        }
        ClientEvent::Chat(_) => {
            // Binary payloads never classify as chat.
        }
    }
}

async fn handle_text(engine: &Arc<CaptureEngine>, ports: &Ports, text: &str) {
    match classify_text(text) {
        ClientEvent::Quality(update) => {
            engine.update_quality(update);
        }
        ClientEvent::Chat(prompt) => {
            let api_key = ports.secrets.api_key().unwrap_or_default();
            match ports.chat.chat(&prompt, &api_key).await {
                Ok(reply) => {
                    ports
                        .editor_ui
                        .post_message(json!({ "type": "ai-response", "text": reply }));
                }
                Err(e) => {
                    error!("Chat request failed: {}", e);
                    ports
                        .editor_ui
                        .post_message(json!({ "type": "error", "message": e.to_string() }));
                }
            }
        }
        _ => {}
    }
}

/// Map viewer coordinates onto the real display, move there, and toggle the
/// left button for down/up events.
fn inject_mouse(
    injector: &Arc<Mutex<dyn InputInjector>>,
    real: ScreenSize,
    x: f64,
    y: f64,
    event_type: MouseEventType,
    screen_width: f64,
    screen_height: f64,
) -> Result<(), InputError> {
    if screen_width <= 0.0 || screen_height <= 0.0 {
        return Err(InputError::InvalidDimensions {
            width: screen_width,
            height: screen_height,
        });
    }
    let actual_x = (x * real.width as f64 / screen_width).floor() as i32;
    let actual_y = (y * real.height as f64 / screen_height).floor() as i32;

    let mut injector = injector.lock();
    injector.move_mouse(actual_x, actual_y)?;
    match event_type {
        MouseEventType::Down => {
            injector.toggle_mouse_button(ButtonState::Down, PointerButton::Left)?
        }
        MouseEventType::Up => injector.toggle_mouse_button(ButtonState::Up, PointerButton::Left)?,
        MouseEventType::Move => {}
    }
    Ok(())
}

fn send_error(out_tx: &mpsc::UnboundedSender<String>, message: &str) {
    let envelope = ServerMessage::Error {
        message: message.to_string(),
    };
    if let Ok(text) = serde_json::to_string(&envelope) {
        let _ = out_tx.send(text);
    }
}
