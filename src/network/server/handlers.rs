use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;
use log::info;
use tokio::sync::broadcast;

use super::server::SessionContext;
use super::websocket::handle_session;

/// Upgrade an accepted connection and hand it to a session.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ctx: SessionContext,
    stop_rx: broadcast::Receiver<()>,
) -> impl IntoResponse {
    info!("WebSocket connection request");
    ws.on_upgrade(move |socket| {
        info!("WebSocket connection established");
        handle_session(socket, ctx.ports, ctx.injector, stop_rx)
    })
}
