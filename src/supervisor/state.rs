//! Connection supervisor state machine
//!
//! Pure and synchronous: every external signal comes in through
//! [`SupervisorMachine::process_event`], and every side effect goes out as
//! an [`Action`] for the async loop to carry out. The backoff delay and
//! the user-initiated-disconnect flag live here, so all of the reconnect
//! policy can be exercised without a runtime.

use crate::backoff::{Backoff, BackoffConfig};
use std::time::Duration;

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No session and no retry pending
    Disconnected,
    /// A connect attempt is in flight
    Connecting,
    /// A session is established
    Connected,
    /// A one-shot retry timer is armed; exactly one is pending
    ReconnectScheduled,
}

/// Inputs to the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// The embedder asked to connect
    ConnectRequested,
    /// The embedder asked to disconnect
    DisconnectRequested,
    /// The transport confirmed an established session
    TransportConnected,
    /// The transport reported loss of the session, intentional or not
    TransportDisconnected { reason: String },
    /// A connect attempt failed without ever establishing a session
    ConnectAttemptFailed { reason: String },
    /// The armed retry timer elapsed
    RetryTimerFired,
}

/// Side effects for the event loop to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Begin a connect attempt on the transport
    StartConnect,
    /// Tear down the transport session (or abort an in-flight attempt)
    TearDown,
    /// Arm the one-shot retry timer for the given delay
    ArmRetry(Duration),
    /// Drop the pending retry timer
    CancelRetry,
    /// Surface an event to the embedding layer
    Notify(LinkEvent),
}

/// State changes surfaced to the embedding layer (UI, binary)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    Disconnected { reason: String },
    ConnectFailed { reason: String },
    RetryScheduled { delay: Duration },
}

/// The supervisor state machine
#[derive(Debug)]
pub struct SupervisorMachine {
    state: LinkState,
    backoff: Backoff,
    /// Set between an explicit disconnect of a live session and the
    /// resulting transport disconnect event; consumed exactly once
    user_initiated: bool,
    /// Whether the in-flight connect attempt was started by the retry timer
    retrying: bool,
}

impl SupervisorMachine {
    pub fn new(backoff: BackoffConfig) -> Self {
        Self {
            state: LinkState::Disconnected,
            backoff: Backoff::new(backoff),
            user_initiated: false,
            retrying: false,
        }
    }

    /// Current state
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Process one event and return the actions it entails
    pub fn process_event(&mut self, event: SupervisorEvent) -> Vec<Action> {
        use LinkState::*;
        use SupervisorEvent::*;

        match event {
            ConnectRequested => match self.state {
                Disconnected => {
                    self.state = Connecting;
                    self.retrying = false;
                    vec![Action::StartConnect]
                }
                // An explicit connect overrides a pending retry; the
                // attempt counts as manual from here on.
                ReconnectScheduled => {
                    self.state = Connecting;
                    self.retrying = false;
                    vec![Action::CancelRetry, Action::StartConnect]
                }
                Connecting | Connected => Vec::new(),
            },

            DisconnectRequested => match self.state {
                Connected => {
                    // The transport will report the loss; the flag tells
                    // that handler not to schedule a retry.
                    self.user_initiated = true;
                    self.state = Disconnected;
                    vec![Action::TearDown]
                }
                Connecting => {
                    // Aborting the attempt produces no transport event,
                    // so the flag must stay clear.
                    self.state = Disconnected;
                    self.retrying = false;
                    vec![Action::TearDown]
                }
                ReconnectScheduled => {
                    self.state = Disconnected;
                    vec![Action::CancelRetry]
                }
                Disconnected => Vec::new(),
            },

            TransportConnected => match self.state {
                Connecting => {
                    self.state = Connected;
                    self.retrying = false;
                    self.backoff.reset();
                    vec![Action::Notify(LinkEvent::Connected)]
                }
                ReconnectScheduled => {
                    // Session came up out of band; the pending retry is moot.
                    self.state = Connected;
                    self.backoff.reset();
                    vec![Action::CancelRetry, Action::Notify(LinkEvent::Connected)]
                }
                // Stale confirmation after an abort: make sure the
                // transport is actually down.
                Disconnected => vec![Action::TearDown],
                Connected => Vec::new(),
            },

            TransportDisconnected { reason } => {
                if self.user_initiated {
                    self.user_initiated = false;
                    self.state = Disconnected;
                    return vec![Action::Notify(LinkEvent::Disconnected { reason })];
                }
                match self.state {
                    Connected => {
                        let delay = self.schedule_retry();
                        vec![
                            Action::Notify(LinkEvent::Disconnected { reason }),
                            Action::ArmRetry(delay),
                            Action::Notify(LinkEvent::RetryScheduled { delay }),
                        ]
                    }
                    // Handshake-level drop: same handling as an outright
                    // attempt failure.
                    Connecting => self.attempt_failed(reason),
                    // Repeated loss signal while already waiting: rearm
                    // with the next delay, keeping a single pending timer.
                    ReconnectScheduled => {
                        let delay = self.schedule_retry();
                        vec![
                            Action::CancelRetry,
                            Action::ArmRetry(delay),
                            Action::Notify(LinkEvent::RetryScheduled { delay }),
                        ]
                    }
                    Disconnected => Vec::new(),
                }
            }

            ConnectAttemptFailed { reason } => match self.state {
                Connecting => self.attempt_failed(reason),
                _ => Vec::new(),
            },

            RetryTimerFired => match self.state {
                ReconnectScheduled => {
                    self.state = Connecting;
                    self.retrying = true;
                    vec![Action::StartConnect]
                }
                // A cancelled timer that raced its own fire; nothing to do.
                _ => Vec::new(),
            },
        }
    }

    /// Handle a failed connect attempt. Timer-driven attempts stay in the
    /// retry cycle with the already-grown delay; manual attempts surface
    /// the failure once and stop.
    fn attempt_failed(&mut self, reason: String) -> Vec<Action> {
        if self.retrying {
            let delay = self.schedule_retry();
            vec![
                Action::ArmRetry(delay),
                Action::Notify(LinkEvent::RetryScheduled { delay }),
            ]
        } else {
            self.state = LinkState::Disconnected;
            vec![Action::Notify(LinkEvent::ConnectFailed { reason })]
        }
    }

    fn schedule_retry(&mut self) -> Duration {
        self.state = LinkState::ReconnectScheduled;
        self.retrying = false;
        self.backoff.next_delay()
    }
}
