//! Async driver for the supervisor state machine
//!
//! One spawned task owns the [`SupervisorMachine`] and performs every
//! transition, so the machine itself needs no locking. The task selects
//! over embedder commands, transport events, the in-flight connect
//! attempt, and the single optional retry timer; dropping the timer is
//! its cancellation.

use crate::backoff::BackoffConfig;
use crate::supervisor::state::{Action, LinkEvent, LinkState, SupervisorEvent, SupervisorMachine};
use crate::transport::{LinkError, Transport, TransportEvent};
use futures::future::OptionFuture;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Sleep};
use tracing::{debug, info, warn};

/// Embedder commands into the event loop
#[derive(Debug)]
enum Command {
    Connect,
    Disconnect,
}

/// Handle to a running connection supervisor.
///
/// Created once at startup and kept for the process lifetime; dropping it
/// shuts the event loop down.
pub struct Supervisor {
    command_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<LinkState>,
    event_rx: mpsc::Receiver<LinkEvent>,
}

impl Supervisor {
    /// Spawn the supervisor event loop over the given transport.
    ///
    /// `transport_rx` is the receiving half of the event channel handed to
    /// the transport at construction.
    pub fn start(
        transport: Arc<dyn Transport>,
        transport_rx: mpsc::Receiver<TransportEvent>,
        backoff: BackoffConfig,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(64);
        let (state_tx, state_rx) = watch::channel(LinkState::Disconnected);

        tokio::spawn(supervise(
            transport,
            transport_rx,
            command_rx,
            state_tx,
            event_tx,
            backoff,
        ));

        Self {
            command_tx,
            state_rx,
            event_rx,
        }
    }

    /// Ask the supervisor to connect. A failure of this attempt is
    /// surfaced once as [`LinkEvent::ConnectFailed`] and not retried.
    pub async fn request_connect(&self) {
        let _ = self.command_tx.send(Command::Connect).await;
    }

    /// Ask the supervisor to disconnect. Guarantees no reconnect is
    /// scheduled as a result; a pending retry timer is cancelled.
    pub async fn request_disconnect(&self) {
        let _ = self.command_tx.send(Command::Disconnect).await;
    }

    /// Current link state
    pub fn state(&self) -> LinkState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Receive the next link event
    pub async fn recv(&mut self) -> Option<LinkEvent> {
        self.event_rx.recv().await
    }
}

/// The supervisor event loop
async fn supervise(
    transport: Arc<dyn Transport>,
    mut transport_rx: mpsc::Receiver<TransportEvent>,
    mut command_rx: mpsc::Receiver<Command>,
    state_tx: watch::Sender<LinkState>,
    event_tx: mpsc::Sender<LinkEvent>,
    backoff: BackoffConfig,
) {
    let mut machine = SupervisorMachine::new(backoff);
    // At most one of each may be pending: the retry timer by the machine's
    // own invariant, the attempt because StartConnect only occurs in states
    // without one in flight.
    let mut retry: Option<Pin<Box<Sleep>>> = None;
    let mut attempt: Option<JoinHandle<Result<(), LinkError>>> = None;

    loop {
        let retry_fut: OptionFuture<_> = retry.as_mut().into();
        let attempt_fut: OptionFuture<_> = attempt.as_mut().into();

        let event = tokio::select! {
            command = command_rx.recv() => match command {
                Some(Command::Connect) => SupervisorEvent::ConnectRequested,
                Some(Command::Disconnect) => SupervisorEvent::DisconnectRequested,
                // All handles dropped: shut down.
                None => break,
            },

            Some(transport_event) = transport_rx.recv() => match transport_event {
                TransportEvent::Connected => SupervisorEvent::TransportConnected,
                TransportEvent::Disconnected { reason } => {
                    SupervisorEvent::TransportDisconnected { reason }
                }
            },

            Some(()) = retry_fut => {
                retry = None;
                SupervisorEvent::RetryTimerFired
            }

            Some(result) = attempt_fut => {
                attempt = None;
                match result {
                    // Success is reported by the transport's Connected
                    // event; the attempt result only carries failures.
                    Ok(Ok(())) => continue,
                    Ok(Err(e)) => SupervisorEvent::ConnectAttemptFailed {
                        reason: e.to_string(),
                    },
                    Err(join_error) => {
                        if !join_error.is_cancelled() {
                            warn!("connect attempt task failed: {join_error}");
                        }
                        continue;
                    }
                }
            }
        };

        debug!(?event, state = ?machine.state(), "supervisor event");
        let actions = machine.process_event(event);

        for action in actions {
            match action {
                Action::StartConnect => {
                    let transport = transport.clone();
                    info!(transport = transport.name(), "starting connect attempt");
                    attempt = Some(tokio::spawn(async move { transport.connect().await }));
                }
                Action::TearDown => {
                    if let Some(task) = attempt.take() {
                        task.abort();
                    }
                    transport.disconnect().await;
                }
                Action::ArmRetry(delay) => {
                    info!(?delay, "reconnect scheduled");
                    retry = Some(Box::pin(sleep(delay)));
                }
                Action::CancelRetry => {
                    retry = None;
                }
                Action::Notify(link_event) => {
                    match &link_event {
                        LinkEvent::Connected => info!("link established"),
                        LinkEvent::Disconnected { reason } => info!(%reason, "link down"),
                        LinkEvent::ConnectFailed { reason } => warn!(%reason, "connect failed"),
                        LinkEvent::RetryScheduled { .. } => {}
                    }
                    let _ = event_tx.send(link_event).await;
                }
            }
        }

        state_tx.send_if_modified(|state| {
            let changed = *state != machine.state();
            *state = machine.state();
            changed
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::ControlCommand;
    use crate::transport::TransportEventTx;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Transport double with scripted connect outcomes. Follows the real
    /// contract: success is announced on the event channel, loss of the
    /// session (intentional or not) emits a Disconnected event.
    struct FakeTransport {
        events: TransportEventTx,
        connected: AtomicBool,
        outcomes: Mutex<VecDeque<bool>>,
        attempts: AtomicUsize,
    }

    impl FakeTransport {
        fn new(events: TransportEventTx) -> Arc<Self> {
            Arc::new(Self {
                events,
                connected: AtomicBool::new(false),
                outcomes: Mutex::new(VecDeque::new()),
                attempts: AtomicUsize::new(0),
            })
        }

        /// Queue outcomes for upcoming connect attempts; unscripted
        /// attempts succeed.
        fn script(&self, outcomes: &[bool]) {
            self.outcomes.lock().unwrap().extend(outcomes.iter().copied());
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        /// Simulate the peer dropping the session.
        async fn drop_link(&self) {
            self.connected.store(false, Ordering::SeqCst);
            let _ = self
                .events
                .send(TransportEvent::Disconnected {
                    reason: "peer closed".into(),
                })
                .await;
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn connect(&self) -> Result<(), LinkError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let outcome = self.outcomes.lock().unwrap().pop_front().unwrap_or(true);
            if outcome {
                self.connected.store(true, Ordering::SeqCst);
                let _ = self.events.send(TransportEvent::Connected).await;
                Ok(())
            } else {
                Err(LinkError::ConnectFailed("refused".into()))
            }
        }

        async fn disconnect(&self) {
            if self.connected.swap(false, Ordering::SeqCst) {
                let _ = self
                    .events
                    .send(TransportEvent::Disconnected {
                        reason: "disconnect requested".into(),
                    })
                    .await;
            }
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn send(&self, _command: ControlCommand) -> Result<(), LinkError> {
            if self.is_connected() {
                Ok(())
            } else {
                Err(LinkError::NotConnected)
            }
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    fn setup() -> (Supervisor, Arc<FakeTransport>) {
        let (event_tx, event_rx) = mpsc::channel(16);
        let transport = FakeTransport::new(event_tx);
        let supervisor = Supervisor::start(
            transport.clone(),
            event_rx,
            BackoffConfig::default(),
        );
        (supervisor, transport)
    }

    async fn expect_connected(supervisor: &mut Supervisor) {
        assert_eq!(supervisor.recv().await, Some(LinkEvent::Connected));
    }

    async fn expect_retry_scheduled(supervisor: &mut Supervisor, secs: u64) {
        assert_eq!(
            supervisor.recv().await,
            Some(LinkEvent::RetryScheduled {
                delay: Duration::from_secs(secs),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_and_state_observation() {
        let (mut supervisor, transport) = setup();
        assert_eq!(supervisor.state(), LinkState::Disconnected);

        supervisor.request_connect().await;
        expect_connected(&mut supervisor).await;
        assert!(supervisor.is_connected());
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_delays_compound_then_reset_on_success() {
        let (mut supervisor, transport) = setup();
        supervisor.request_connect().await;
        expect_connected(&mut supervisor).await;

        // Drop the link; the first two retries fail, the third succeeds.
        transport.script(&[false, false, true]);
        transport.drop_link().await;

        assert!(matches!(
            supervisor.recv().await,
            Some(LinkEvent::Disconnected { .. })
        ));
        expect_retry_scheduled(&mut supervisor, 2).await;
        expect_retry_scheduled(&mut supervisor, 4).await;
        expect_retry_scheduled(&mut supervisor, 8).await;
        expect_connected(&mut supervisor).await;
        assert_eq!(transport.attempts(), 4);

        // Backoff must be back at the floor after the success.
        transport.drop_link().await;
        assert!(matches!(
            supervisor.recv().await,
            Some(LinkEvent::Disconnected { .. })
        ));
        expect_retry_scheduled(&mut supervisor, 2).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_disconnect_never_schedules_reconnect() {
        let (mut supervisor, transport) = setup();
        supervisor.request_connect().await;
        expect_connected(&mut supervisor).await;

        supervisor.request_disconnect().await;
        assert!(matches!(
            supervisor.recv().await,
            Some(LinkEvent::Disconnected { .. })
        ));

        // Give any erroneously armed timer ample paused time to fire.
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(transport.attempts(), 1);
        assert_eq!(supervisor.state(), LinkState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_retry() {
        let (mut supervisor, transport) = setup();
        supervisor.request_connect().await;
        expect_connected(&mut supervisor).await;

        // Make the retry wait at the ceiling so there is time to cancel it.
        transport.drop_link().await;
        assert!(matches!(
            supervisor.recv().await,
            Some(LinkEvent::Disconnected { .. })
        ));
        expect_retry_scheduled(&mut supervisor, 2).await;

        supervisor.request_disconnect().await;
        tokio::time::sleep(Duration::from_secs(300)).await;

        // The pending retry never fired.
        assert_eq!(transport.attempts(), 1);
        assert_eq!(supervisor.state(), LinkState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_manual_connect_is_surfaced_not_retried() {
        let (mut supervisor, transport) = setup();
        transport.script(&[false]);

        supervisor.request_connect().await;
        assert!(matches!(
            supervisor.recv().await,
            Some(LinkEvent::ConnectFailed { .. })
        ));

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(transport.attempts(), 1);
        assert_eq!(supervisor.state(), LinkState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_disconnect_requests_are_harmless() {
        let (mut supervisor, transport) = setup();
        supervisor.request_connect().await;
        expect_connected(&mut supervisor).await;

        supervisor.request_disconnect().await;
        supervisor.request_disconnect().await;
        supervisor.request_disconnect().await;

        assert!(matches!(
            supervisor.recv().await,
            Some(LinkEvent::Disconnected { .. })
        ));
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(transport.attempts(), 1);
        assert_eq!(supervisor.state(), LinkState::Disconnected);
    }
}
