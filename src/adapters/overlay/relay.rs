//! Relay Link - WebSocket Peer Sync for the Mesh Store
//!
//! Connects the local mesh store to a relay peer over WebSocket and
//! exchanges put envelopes in both directions: locally-originated writes
//! are forwarded out, remote envelopes are merged in. Reconnects
//! automatically on disconnect; nothing is replayed for the disconnection
//! window (the store is eventually consistent, not strongly consistent).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};

use super::store::{MeshStore, PutEnvelope};

/// WebSocket link to one overlay relay peer.
pub struct RelayLink {
    store: Arc<MeshStore>,
    relay_url: String,
    connected: AtomicBool,
}

impl RelayLink {
    pub fn new(store: Arc<MeshStore>, relay_url: impl Into<String>) -> Self {
        Self {
            store,
            relay_url: relay_url.into(),
            connected: AtomicBool::new(false),
        }
    }

    /// Whether the link currently has a live connection.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Run the relay connection loop.
    ///
    /// Reconnects automatically on disconnect. Event-driven via
    /// tokio::select! — never polls on interval.
    #[instrument(skip(self, shutdown_rx), fields(url = %self.relay_url))]
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("Connecting to overlay relay");

        loop {
            match self.connect_and_stream(&mut shutdown_rx).await {
                Ok(()) => {
                    self.connected.store(false, Ordering::Relaxed);
                    info!("Relay link shut down gracefully");
                    return Ok(());
                }
                Err(e) => {
                    self.connected.store(false, Ordering::Relaxed);
                    warn!(error = %e, "Relay disconnected, reconnecting in 5s");
                    tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
                }
            }
        }
    }

    /// Single connection session: connect, stream both directions, exit
    /// on error or shutdown.
    async fn connect_and_stream(
        &self,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<()> {
        let (ws_stream, _) = connect_async(&self.relay_url)
            .await
            .context("Relay WebSocket connection failed")?;

        let (mut write, mut read) = ws_stream.split();
        let mut egress_rx = self.store.egress_subscribe();

        self.connected.store(true, Ordering::Relaxed);
        info!("Relay WebSocket connected");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received in relay link");
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                envelope = egress_rx.recv() => {
                    match envelope {
                        Ok(envelope) => {
                            let json = serde_json::to_string(&envelope)
                                .context("Envelope serialization failed")?;
                            write
                                .send(Message::Text(json))
                                .await
                                .context("Relay send failed")?;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            // Dropped envelopes are not replayed; remote
                            // peers converge via their own snapshots.
                            warn!(dropped = n, "Relay egress lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("Egress channel closed");
                            return Ok(());
                        }
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self.handle_message(&text).await {
                                debug!(error = %e, "Failed to apply relay message");
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            // Pong is handled automatically by tungstenite
                            debug!(len = data.len(), "Relay ping received");
                        }
                        Some(Err(e)) => {
                            return Err(anyhow::anyhow!("WebSocket error: {e}"));
                        }
                        None => {
                            return Err(anyhow::anyhow!("WebSocket stream ended"));
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// Parse and merge a single relay message.
    async fn handle_message(&self, text: &str) -> Result<()> {
        let envelope: PutEnvelope =
            serde_json::from_str(text).context("Invalid put envelope JSON")?;

        debug!(key = %envelope.key, topic = %envelope.topic, "Remote envelope received");
        self.store.apply_remote(envelope).await
    }
}
