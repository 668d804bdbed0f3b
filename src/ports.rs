//! Narrow ports to the external collaborators the streaming core depends on.
//!
//! The core only ever talks to the editor-command layer, file uploads, AI
//! chat, the editor webview and the credential store through these traits;
//! the binary wires in whatever implementations the host environment has.

use async_trait::async_trait;
use log::{debug, info};
use std::sync::Arc;

/// Editor command vocabulary accepted verbatim (case-insensitive).
const COMMAND_WORDS: [&str; 13] = [
    "copy",
    "paste",
    "cut",
    "undo",
    "redo",
    "save",
    "select all",
    "find",
    "delete",
    "enter",
    "escape",
    "tab",
    "backspace",
];

/// Prefixes that mark a payload as a command regardless of the rest.
const COMMAND_PREFIXES: [&str; 7] = [
    "type ",
    "keytap ",
    "go to line",
    "open file",
    "search",
    "replace",
    "@cline",
];

/// Whether a payload's text form should be routed to the command port.
pub fn is_supported_command(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    COMMAND_WORDS.iter().any(|w| lowered == *w)
        || COMMAND_PREFIXES.iter().any(|p| lowered.starts_with(p))
}

#[async_trait]
pub trait CommandPort: Send + Sync {
    fn supports(&self, text: &str) -> bool {
        is_supported_command(text)
    }

    async fn handle_command(&self, text: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait FileUploadPort: Send + Sync {
    async fn handle_upload(&self, bytes: &[u8]) -> anyhow::Result<()>;
}

#[async_trait]
pub trait AiChatPort: Send + Sync {
    async fn chat(&self, text: &str, api_key: &str) -> anyhow::Result<String>;
}

pub trait EditorUiPort: Send + Sync {
    fn post_message(&self, message: serde_json::Value);
}

pub trait SecretStore: Send + Sync {
    fn api_key(&self) -> Option<String>;
}

/// A host UI panel registered with the listener; disposed on server stop.
pub trait UiPanel: Send + Sync {
    fn dispose(&self) -> anyhow::Result<()>;
}

/// Bundle of collaborator ports handed to every session.
#[derive(Clone)]
pub struct Ports {
    pub commands: Arc<dyn CommandPort>,
    pub uploads: Arc<dyn FileUploadPort>,
    pub chat: Arc<dyn AiChatPort>,
    pub editor_ui: Arc<dyn EditorUiPort>,
    pub secrets: Arc<dyn SecretStore>,
}

impl Default for Ports {
    fn default() -> Self {
        let noop = Arc::new(NoopPorts);
        Self {
            commands: noop.clone(),
            uploads: noop.clone(),
            chat: noop.clone(),
            editor_ui: noop.clone(),
            secrets: noop,
        }
    }
}

/// Logging stand-in used when the host environment provides no collaborators.
struct NoopPorts;

#[async_trait]
impl CommandPort for NoopPorts {
    async fn handle_command(&self, text: &str) -> anyhow::Result<()> {
        info!("Command received (no handler wired): {}", text);
        Ok(())
    }
}

#[async_trait]
impl FileUploadPort for NoopPorts {
    async fn handle_upload(&self, bytes: &[u8]) -> anyhow::Result<()> {
        info!("Upload received (no handler wired): {} bytes", bytes.len());
        Ok(())
    }
}

#[async_trait]
impl AiChatPort for NoopPorts {
    async fn chat(&self, _text: &str, _api_key: &str) -> anyhow::Result<String> {
        anyhow::bail!("no chat backend configured")
    }
}

impl EditorUiPort for NoopPorts {
    fn post_message(&self, message: serde_json::Value) {
        debug!("Editor UI message (no webview wired): {}", message);
    }
}

impl SecretStore for NoopPorts {
    fn api_key(&self) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_matches_case_insensitive() {
        assert!(is_supported_command("copy"));
        assert!(is_supported_command("PASTE"));
        assert!(is_supported_command("Select All"));
        assert!(is_supported_command("  undo  "));
    }

    #[test]
    fn test_prefixes_match() {
        assert!(is_supported_command("type hello world"));
        assert!(is_supported_command("keytap enter"));
        assert!(is_supported_command("go to line 42"));
        assert!(is_supported_command("open file src/main.rs"));
        assert!(is_supported_command("search for needle"));
        assert!(is_supported_command("replace foo with bar"));
        assert!(is_supported_command("@cline summarize this file"));
    }

    #[test]
    fn test_unknown_text_is_not_a_command() {
        assert!(!is_supported_command("hello there"));
        assert!(!is_supported_command(""));
        assert!(!is_supported_command("copying"));
    }
}
