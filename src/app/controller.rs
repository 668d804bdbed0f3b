use log::{error, info, warn};
use parking_lot::Mutex;

use crate::app::state::{ServerState, StartOutcome};
use crate::error::ServerError;
use crate::network::{SessionContext, WebSocketServer};
use crate::ports::UiPanel;

/// Idempotent start/stop surface over the WebSocket acceptor.
///
/// `start` refuses to double-bind; `stop` runs every cleanup step even when
/// individual steps fail and never returns an error.
pub struct ServerController {
    state: Mutex<ServerState>,
    ctx: SessionContext,
}

impl ServerController {
    pub fn new(ctx: SessionContext, port: u16) -> Self {
        Self {
            state: Mutex::new(ServerState::new(port)),
            ctx,
        }
    }

    /// Host UI panel to dispose when the server stops.
    pub fn register_panel(&self, panel: Box<dyn UiPanel>) {
        self.state.lock().panel = Some(panel);
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Bind the listener on the configured port. A bind failure propagates
    /// and leaves the controller stopped; a second start while running is
    /// answered without opening another listener.
    pub async fn start(&self, address: &str) -> Result<StartOutcome, ServerError> {
        let port = {
            let state = self.state.lock();
            if state.running {
                warn!("server is already running");
                return Ok(StartOutcome::AlreadyRunning);
            }
            state.port
        };

        let server = WebSocketServer::new(address, port, self.ctx.clone()).await?;
        let local_port = server.local_addr().port();

        let mut state = self.state.lock();
        if state.running {
            // Lost a start race; discard the extra listener.
            drop(state);
            server.shutdown().await;
            warn!("server is already running");
            return Ok(StartOutcome::AlreadyRunning);
        }
        state.server = Some(server);
        state.running = true;
        drop(state);

        let url = format!("http://{}:{}", address, local_port);
        info!("server started at {}", url);
        Ok(StartOutcome::Started { url })
    }

    /// Stop the acceptor and dispose any registered panel. Every step is
    /// best-effort; failures are logged and the remaining steps still run.
    pub async fn stop(&self) {
        let (server, panel) = {
            let mut state = self.state.lock();
            (state.server.take(), state.panel.take())
        };

        if let Some(server) = server {
            server.shutdown().await;
        }

        if let Some(panel) = panel {
            if let Err(e) = panel.dispose() {
                error!("Failed to dispose UI panel: {}", e);
            }
        }

        self.state.lock().running = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{ButtonState, InputInjector, PointerButton};
    use crate::ports::Ports;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct IdleInjector;

    impl InputInjector for IdleInjector {
        fn move_mouse(&mut self, _x: i32, _y: i32) -> Result<(), crate::error::InputError> {
            Ok(())
        }

        fn toggle_mouse_button(
            &mut self,
            _state: ButtonState,
            _button: PointerButton,
        ) -> Result<(), crate::error::InputError> {
            Ok(())
        }

        fn tap_key(
            &mut self,
            _key: &str,
            _modifier: Option<&str>,
        ) -> Result<(), crate::error::InputError> {
            Ok(())
        }
    }

    fn controller(port: u16) -> ServerController {
        let ctx = SessionContext {
            ports: Ports::default(),
            injector: Arc::new(Mutex::new(IdleInjector)),
        };
        ServerController::new(ctx, port)
    }

    struct FailingPanel {
        disposed: Arc<AtomicBool>,
    }

    impl UiPanel for FailingPanel {
        fn dispose(&self) -> anyhow::Result<()> {
            self.disposed.store(true, Ordering::Relaxed);
            anyhow::bail!("panel backend already gone")
        }
    }

    #[tokio::test]
    async fn test_start_stop_start_cycle() {
        let controller = controller(0);
        assert!(!controller.is_running());

        let outcome = controller.start("127.0.0.1").await.unwrap();
        assert!(matches!(outcome, StartOutcome::Started { .. }));
        assert!(controller.is_running());

        controller.stop().await;
        assert!(!controller.is_running());

        let outcome = controller.start("127.0.0.1").await.unwrap();
        assert!(matches!(outcome, StartOutcome::Started { .. }));
        controller.stop().await;
    }

    #[tokio::test]
    async fn test_second_start_does_not_rebind() {
        let controller = controller(0);
        let first = controller.start("127.0.0.1").await.unwrap();
        let url = match first {
            StartOutcome::Started { url } => url,
            StartOutcome::AlreadyRunning => panic!("first start must bind"),
        };
        assert!(url.starts_with("http://127.0.0.1:"));

        let second = controller.start("127.0.0.1").await.unwrap();
        assert!(matches!(second, StartOutcome::AlreadyRunning));
        controller.stop().await;
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_harmless() {
        let controller = controller(0);
        controller.stop().await;
        controller.stop().await;
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn test_stop_survives_panel_dispose_failure() {
        let controller = controller(0);
        let disposed = Arc::new(AtomicBool::new(false));
        controller.register_panel(Box::new(FailingPanel {
            disposed: disposed.clone(),
        }));

        controller.start("127.0.0.1").await.unwrap();
        controller.stop().await;

        // The panel was reached and its failure swallowed; running state
        // was still cleared afterwards.
        assert!(disposed.load(Ordering::Relaxed));
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn test_bind_failure_leaves_controller_stopped() {
        let first = controller(0);
        let outcome = first.start("127.0.0.1").await.unwrap();
        let port = match outcome {
            StartOutcome::Started { url } => url.rsplit(':').next().unwrap().parse().unwrap(),
            StartOutcome::AlreadyRunning => panic!("first start must bind"),
        };

        let second = controller(port);
        let result = second.start("127.0.0.1").await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
        assert!(!second.is_running());

        first.stop().await;
    }
}
