mod controller;
mod state;

pub use controller::ServerController;
pub use state::{ServerState, StartOutcome};
