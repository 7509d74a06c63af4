//! TCP transport to an MPD daemon
//!
//! The session is confirmed by the daemon's greeting line. After that a
//! reader task watches the socket and reports EOF or read errors as a
//! `Disconnected` event; response lines are drained without parsing, the
//! supervisor never sees protocol content.

use crate::config::LinkConfig;
use crate::controls::ControlCommand;
use crate::transport::{LinkError, Transport, TransportEvent, TransportEventTx};
use async_trait::async_trait;
use bytes::BytesMut;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

const GREETING_PREFIX: &[u8] = b"OK MPD ";

struct Session {
    writer: OwnedWriteHalf,
    reader_task: JoinHandle<()>,
}

/// TCP connection to the daemon with greeting confirmation
pub struct TcpTransport {
    address: String,
    connect_timeout: Duration,
    events: TransportEventTx,
    session: Mutex<Option<Session>>,
    connected: Arc<AtomicBool>,
}

impl TcpTransport {
    pub fn new(config: &LinkConfig, events: TransportEventTx) -> Self {
        Self {
            address: config.address(),
            connect_timeout: config.connect_timeout,
            events,
            session: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Dial and read the greeting, all under the connect timeout.
    async fn handshake(&self) -> Result<TcpStream, LinkError> {
        let handshake = async {
            let mut stream = TcpStream::connect(&self.address)
                .await
                .map_err(|e| LinkError::ConnectFailed(e.to_string()))?;
            read_greeting(&mut stream).await?;
            Ok(stream)
        };

        match timeout(self.connect_timeout, handshake).await {
            Ok(result) => result,
            Err(_) => Err(LinkError::ConnectFailed(format!(
                "timed out after {:?}",
                self.connect_timeout
            ))),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self) -> Result<(), LinkError> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Ok(());
        }

        let stream = self.handshake().await?;
        let (reader, writer) = stream.into_split();

        self.connected.store(true, Ordering::SeqCst);
        let reader_task = tokio::spawn(watch_socket(
            reader,
            self.events.clone(),
            self.connected.clone(),
        ));
        *session = Some(Session {
            writer,
            reader_task,
        });

        let _ = self.events.send(TransportEvent::Connected).await;
        Ok(())
    }

    async fn disconnect(&self) {
        let Some(mut session) = self.session.lock().await.take() else {
            return;
        };
        session.reader_task.abort();

        if let Err(e) = session.writer.shutdown().await {
            debug!("socket shutdown: {e}");
        }

        // The reader was aborted before it could observe the close, so
        // the loss event is emitted here, exactly once.
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

    async fn send(&self, command: ControlCommand) -> Result<(), LinkError> {
        let mut session = self.session.lock().await;
        let Some(session) = session.as_mut() else {
            return Err(LinkError::NotConnected);
        };

        session
            .writer
            .write_all(wire_line(command).as_bytes())
            .await
            .map_err(|e| LinkError::ConnectionLost(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "mpd-tcp"
    }
}

/// Read until the first newline and verify the daemon greeting.
async fn read_greeting(stream: &mut TcpStream) -> Result<(), LinkError> {
    let mut buf = BytesMut::with_capacity(64);
    loop {
        let n = stream
            .read_buf(&mut buf)
            .await
            .map_err(|e| LinkError::ConnectFailed(e.to_string()))?;
        if n == 0 {
            return Err(LinkError::ConnectFailed(
                "closed before greeting".into(),
            ));
        }
        if buf.contains(&b'\n') {
            break;
        }
    }

    if buf.starts_with(GREETING_PREFIX) {
        Ok(())
    } else {
        Err(LinkError::ConnectFailed("unexpected greeting".into()))
    }
}

/// Drain the socket until it closes or errors, then report the loss.
async fn watch_socket(
    mut reader: OwnedReadHalf,
    events: TransportEventTx,
    connected: Arc<AtomicBool>,
) {
    let mut buf = BytesMut::with_capacity(4096);
    let reason = loop {
        buf.clear();
        match reader.read_buf(&mut buf).await {
            Ok(0) => break "server closed connection".to_string(),
            Ok(_) => {
                // Command responses; nothing here is interpreted.
            }
            Err(e) => {
                warn!("socket read error: {e}");
                break format!("read error: {e}");
            }
        }
    };

    if connected.swap(false, Ordering::SeqCst) {
        let _ = events
            .send(TransportEvent::Disconnected { reason })
            .await;
    }
}

/// Wire line for a playback command
fn wire_line(command: ControlCommand) -> &'static str {
    match command {
        ControlCommand::PlayPause => "pause\n",
        ControlCommand::Next => "next\n",
        ControlCommand::Previous => "previous\n",
        ControlCommand::Stop => "stop\n",
    }
}
