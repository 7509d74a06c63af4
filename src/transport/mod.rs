//! Transport seam between the supervisor and the daemon connection
//!
//! The supervisor never interprets protocol content; it only consumes
//! connect/disconnect signals and issues session-level operations through
//! the [`Transport`] trait.

pub mod tcp;

use crate::controls::ControlCommand;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub use tcp::TcpTransport;

/// Errors a transport can surface to the supervisor or its caller
#[derive(Debug, Error)]
pub enum LinkError {
    /// A connect attempt failed outright; surfaced once, never auto-retried
    /// on the manual path
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    /// A previously established connection dropped unexpectedly
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    /// An operation that requires a live session was issued without one
    #[error("not connected")]
    NotConnected,
}

/// Asynchronous notifications from the transport to the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A session was established and confirmed
    Connected,
    /// The session was lost; `reason` distinguishes EOF from IO errors for
    /// logging only
    Disconnected { reason: String },
}

/// Sender half the transport uses to report session events
pub type TransportEventTx = mpsc::Sender<TransportEvent>;

/// A session-oriented connection to the controlled daemon.
///
/// Implementations report `Connected` / `Disconnected` through the event
/// channel handed to them at construction. Loss events fire on any
/// teardown, intentional or not; the supervisor tells the two apart and
/// each loss is reported exactly once.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Attempt to establish a session. Resolves once the session is
    /// confirmed or the attempt has failed.
    async fn connect(&self) -> Result<(), LinkError>;

    /// Tear down the current session, if any. Idempotent.
    async fn disconnect(&self);

    /// Whether a session is currently established
    fn is_connected(&self) -> bool;

    /// Send a control command over the established session
    async fn send(&self, command: ControlCommand) -> Result<(), LinkError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
