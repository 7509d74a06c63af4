//! Media-key and menu input mapped to daemon control commands
//!
//! Input arriving while the link is down is dropped silently; enabling and
//! disabling of the input surface itself is the embedder's concern.

use crate::transport::{LinkError, Transport};
use std::sync::Arc;
use tracing::debug;

/// Hardware media keys the embedder can forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKey {
    PlayPause,
    Next,
    FastForward,
    Previous,
    Rewind,
}

/// Playback commands understood by the controlled daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    PlayPause,
    Next,
    Previous,
    Stop,
}

impl MediaKey {
    /// Collapse the five media keys onto the three playback commands
    pub fn command(self) -> ControlCommand {
        match self {
            MediaKey::PlayPause => ControlCommand::PlayPause,
            MediaKey::Next | MediaKey::FastForward => ControlCommand::Next,
            MediaKey::Previous | MediaKey::Rewind => ControlCommand::Previous,
        }
    }
}

/// Forwards playback input to the transport while a session is up
pub struct Controls {
    transport: Arc<dyn Transport>,
}

impl Controls {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Handle a media-key press. Dropped without error when disconnected.
    pub async fn handle_media_key(&self, key: MediaKey) -> Result<(), LinkError> {
        if !self.transport.is_connected() {
            debug!(?key, "media key ignored while disconnected");
            return Ok(());
        }
        self.command(key.command()).await
    }

    /// Issue a playback command directly (menu click path)
    pub async fn command(&self, command: ControlCommand) -> Result<(), LinkError> {
        if !self.transport.is_connected() {
            debug!(?command, "command ignored while disconnected");
            return Ok(());
        }
        self.transport.send(command).await
    }
}
