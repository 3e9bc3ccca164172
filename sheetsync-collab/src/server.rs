//! WebSocket relay for live cell edits.
//!
//! Architecture:
//! ```text
//! Client A ──┐                    ┌──► Client B
//!            ├── BroadcastHub ────┤
//! Client C ──┘   (all but sender) └──► Client C / A
//! ```
//!
//! Each connection:
//! - is assigned a fresh connection id and told about it (`Welcome`)
//! - is subscribed to the hub for as long as the socket is open
//! - has its `CellContentUpdated` frames stamped with that id and fanned out
//!
//! The relay never reads or writes the entity store. Live edits and durable
//! cell writes are separate paths and can disagree.

use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::broadcast::BroadcastHub;
use crate::protocol::{ChannelMessage, EventKind};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Pause after a failed `accept` (fd exhaustion, aborted connection).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Connections beyond this are closed right after the handshake
    pub max_connections: usize,
    /// Frames buffered per connection before drops begin
    pub subscriber_capacity: usize,
    /// Sockets that have not completed the WebSocket upgrade by then are dropped
    pub handshake_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            max_connections: 1024,
            subscriber_capacity: 256,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl RelayConfig {
    /// Defaults overridden by `PORT`, `SHEETSYNC_MAX_CONNECTIONS` and
    /// `SHEETSYNC_SUBSCRIBER_CAPACITY`. Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(port) = lookup("PORT").and_then(|p| p.trim().parse::<u16>().ok()) {
            config.bind_addr = format!("0.0.0.0:{port}");
        }
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<usize>().ok());
        if let Some(max) = number("SHEETSYNC_MAX_CONNECTIONS") {
            config.max_connections = max;
        }
        if let Some(cap) = number("SHEETSYNC_SUBSCRIBER_CAPACITY") {
            config.subscriber_capacity = cap;
        }
        config
    }
}

/// Relay statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub rejected_connections: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub relayed_events: u64,
}

pub struct RelayServer {
    config: RelayConfig,
    hub: Arc<BroadcastHub>,
    stats: Arc<RwLock<RelayStats>>,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        let hub = Arc::new(BroadcastHub::new(config.subscriber_capacity));
        Self {
            config,
            hub,
            stats: Arc::new(RwLock::new(RelayStats::default())),
        }
    }

    /// Bind the configured address and serve forever.
    pub async fn run(&self) -> Result<(), BoxError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already-bound listener.
    ///
    /// Only returns if the listener's address cannot be read; accept errors
    /// are logged and retried after a short pause.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), BoxError> {
        log::info!("Relay listening on {}", listener.local_addr()?);
        self.accept_loop(listener).await;
        Ok(())
    }

    async fn accept_loop<I: Incoming>(&self, mut incoming: I) {
        loop {
            let (stream, addr) = match incoming.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    log::error!("Failed to accept connection: {e}");
                    sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };
            log::debug!("New TCP connection from {addr}");

            let hub = self.hub.clone();
            let stats = self.stats.clone();
            let config = self.config.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, hub, stats, &config).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        hub: Arc<BroadcastHub>,
        stats: Arc<RwLock<RelayStats>>,
        config: &RelayConfig,
    ) -> Result<(), BoxError> {
        let handshake = tokio_tungstenite::accept_async(stream);
        let ws_stream = match timeout(config.handshake_timeout, handshake).await {
            Ok(upgraded) => upgraded?,
            Err(_) => {
                log::warn!("WebSocket handshake from {addr} timed out");
                return Ok(());
            }
        };
        let max_connections = config.max_connections;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        {
            let mut s = stats.write().await;
            if s.active_connections as usize >= max_connections {
                s.rejected_connections += 1;
                drop(s);
                log::warn!("Rejecting {addr}: connection limit {max_connections} reached");
                ws_sender.send(Message::Close(None)).await?;
                return Ok(());
            }
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let connection_id = Uuid::new_v4();
        let mut outbound = hub.subscribe(connection_id).await;
        log::info!("Connection {connection_id} established from {addr}");

        let result = async {
            let welcome = ChannelMessage::welcome(connection_id).encode()?;
            ws_sender.send(Message::Binary(welcome.into())).await?;

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Binary(data))) => {
                                let bytes: Vec<u8> = data.into();
                                {
                                    let mut s = stats.write().await;
                                    s.total_messages += 1;
                                    s.total_bytes += bytes.len() as u64;
                                }

                                let msg = match ChannelMessage::decode(&bytes) {
                                    Ok(msg) => msg,
                                    Err(e) => {
                                        log::warn!(
                                            "Failed to decode frame from {connection_id}: {e}"
                                        );
                                        continue;
                                    }
                                };

                                match msg.event {
                                    EventKind::CellContentUpdated => {
                                        let relayed = ChannelMessage::cell_content_updated(
                                            connection_id,
                                            msg.payload,
                                        );
                                        let recipients = hub.broadcast(&relayed).await?;
                                        stats.write().await.relayed_events += 1;
                                        log::trace!(
                                            "Edit from {connection_id} sent to {recipients} peers"
                                        );
                                    }
                                    EventKind::Ping => {
                                        let pong = ChannelMessage::pong().encode()?;
                                        ws_sender.send(Message::Binary(pong.into())).await?;
                                    }
                                    other => {
                                        log::debug!("Ignoring {other:?} from {connection_id}");
                                    }
                                }
                            }

                            Some(Ok(Message::Ping(data))) => {
                                ws_sender.send(Message::Pong(data)).await?;
                            }

                            Some(Ok(Message::Close(_))) | None => {
                                log::info!("Connection {connection_id} closed");
                                break;
                            }

                            Some(Err(e)) => {
                                log::error!("WebSocket error from {connection_id}: {e}");
                                break;
                            }

                            _ => {}
                        }
                    }

                    frame = outbound.recv() => {
                        match frame {
                            Some(data) => {
                                ws_sender.send(Message::Binary(data.to_vec().into())).await?;
                            }
                            None => break,
                        }
                    }
                }
            }
            Ok::<(), BoxError>(())
        }
        .await;

        // Deregister no matter how the loop ended.
        hub.unsubscribe(&connection_id).await;
        stats.write().await.active_connections -= 1;
        log::debug!("Connection {connection_id} deregistered");

        result
    }

    pub async fn stats(&self) -> RelayStats {
        self.stats.read().await.clone()
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }
}

/// Source of accepted TCP connections.
trait Incoming {
    fn accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send;
}

impl Incoming for TcpListener {
    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}
