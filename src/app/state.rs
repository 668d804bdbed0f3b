use crate::constants::DEFAULT_SERVER_PORT;
use crate::network::WebSocketServer;
use crate::ports::UiPanel;

/// Result of a start request.
#[derive(Debug)]
pub enum StartOutcome {
    Started { url: String },
    AlreadyRunning,
}

/// Mutable listener state guarded by the controller.
pub struct ServerState {
    pub server: Option<WebSocketServer>,
    pub port: u16,
    pub running: bool,
    pub panel: Option<Box<dyn UiPanel>>,
}

impl ServerState {
    pub fn new(port: u16) -> Self {
        Self {
            server: None,
            port,
            running: false,
            panel: None,
        }
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_PORT)
    }
}
