//! mpdlink keeps a control connection to an MPD daemon alive.
//!
//! The [`supervisor::Supervisor`] owns the connection lifecycle: it honors
//! explicit connect/disconnect requests, and after an unexpected loss it
//! schedules reconnect attempts with an exponential backoff that resets on
//! the next confirmed success. [`controls`] forwards media-key and menu
//! input to the daemon while the link is up.

pub mod backoff;
pub mod config;
pub mod controls;
pub mod supervisor;
pub mod transport;

pub use backoff::BackoffConfig;
pub use config::LinkConfig;
pub use controls::{ControlCommand, Controls, MediaKey};
pub use supervisor::{LinkEvent, LinkState, Supervisor};
pub use transport::{LinkError, TcpTransport, Transport, TransportEvent};
