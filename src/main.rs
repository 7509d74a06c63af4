use anyhow::Result;
use mpdlink::{LinkConfig, LinkEvent, Supervisor, TcpTransport};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = LinkConfig {
        host: std::env::var("MPD_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
        port: std::env::var("MPD_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(6600),
        ..Default::default()
    };

    info!("mpdlink starting, daemon at {}", config.address());

    let (event_tx, event_rx) = mpsc::channel(64);
    let transport = Arc::new(TcpTransport::new(&config, event_tx));
    let mut supervisor = Supervisor::start(transport, event_rx, config.backoff.clone());

    supervisor.request_connect().await;

    loop {
        tokio::select! {
            event = supervisor.recv() => match event {
                Some(LinkEvent::Connected) => info!("connected"),
                Some(LinkEvent::Disconnected { reason }) => info!("disconnected: {reason}"),
                Some(LinkEvent::ConnectFailed { reason }) => info!("connect failed: {reason}"),
                Some(LinkEvent::RetryScheduled { delay }) => {
                    info!("reconnecting in {}s", delay.as_secs());
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                supervisor.request_disconnect().await;
                // Let the teardown event arrive before exiting.
                let _ = tokio::time::timeout(std::time::Duration::from_secs(2), async {
                    while let Some(event) = supervisor.recv().await {
                        if matches!(event, LinkEvent::Disconnected { .. }) {
                            break;
                        }
                    }
                })
                .await;
                break;
            }
        }
    }

    Ok(())
}
