use axum::{routing::get, Router};
use log::{error, info};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{
    net::TcpListener,
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tower_http::trace::TraceLayer;

use super::handlers::ws_handler;
use crate::error::ServerError;
use crate::input::InputInjector;
use crate::ports::Ports;

/// Everything a session needs from the host, cloned per connection.
#[derive(Clone)]
pub struct SessionContext {
    pub ports: Ports,
    pub injector: Arc<Mutex<dyn InputInjector>>,
}

/// The WebSocket acceptor. Owns the bound listener task; dropping the
/// struct without `shutdown` leaves the task running, so the controller
/// always goes through `shutdown`.
pub struct WebSocketServer {
    shutdown_tx: mpsc::Sender<()>,
    server_handle: JoinHandle<()>,
    // Broadcast so every live session observes the stop and cleans up.
    stop_broadcast: broadcast::Sender<()>,
    local_addr: SocketAddr,
}

impl WebSocketServer {
    pub async fn new(address: &str, port: u16, ctx: SessionContext) -> Result<Self, ServerError> {
        // Channel for shutdown signal
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        // Broadcast channel for stopping all connections
        let (stop_broadcast, _) = broadcast::channel::<()>(10);
        let stop_broadcast_clone = stop_broadcast.clone();

        let app = Router::new()
            .route(
                "/ws",
                get(move |ws: axum::extract::ws::WebSocketUpgrade| {
                    let ctx = ctx.clone();
                    let stop_rx = stop_broadcast_clone.subscribe();
                    async move { ws_handler(ws, ctx, stop_rx).await }
                }),
            )
            .layer(TraceLayer::new_for_http());

        let addr = format!("{}:{}", address, port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| ServerError::Bind {
            addr: addr.clone(),
            source: e,
        })?;
        let local_addr = listener.local_addr().map_err(|e| ServerError::Bind {
            addr,
            source: e,
        })?;

        info!("WebSocket server listening on {}", local_addr);

        let server = axum::serve(listener, app.into_make_service()).with_graceful_shutdown(
            async move {
                shutdown_rx.recv().await;
            },
        );

        let server_handle = tokio::spawn(async move {
            if let Err(e) = server.await {
                error!("Server error: {}", e);
            }
        });

        Ok(WebSocketServer {
            shutdown_tx,
            server_handle,
            stop_broadcast,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Close every session, then the acceptor. Failures are logged, never
    /// propagated; a stuck shutdown must not wedge the caller's cleanup.
    pub async fn shutdown(self) {
        let _ = self.stop_broadcast.send(());

        // Give sessions a moment to unsubscribe and flush
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        if let Err(e) = self.shutdown_tx.send(()).await {
            error!("Failed to send shutdown signal: {}", e);
        }

        if let Err(e) = self.server_handle.await {
            error!("Failed to join server task: {}", e);
        }

        info!("WebSocket server closed.");
    }
}
