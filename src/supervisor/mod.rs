//! Connection lifecycle supervision
//!
//! This module handles:
//! - Explicit connect/disconnect requests from the embedder
//! - Backoff-scheduled reconnects after unexpected loss of the session
//! - Cancellation of the pending retry on intentional disconnect

mod runner;
mod state;

pub use runner::Supervisor;
pub use state::{LinkEvent, LinkState, SupervisorEvent, SupervisorMachine};
