//! WebSocket Relay Server
//!
//! The single trusted orderer. Accepts signed envelopes from any connection,
//! checks their signatures, and on every tick broadcasts one relay-signed
//! frame report to every connection. The relay never runs the simulation.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, instrument, warn};

use crate::crypto::keys::{KeyError, KeyPair};
use crate::crypto::CodecError;
use crate::network::auth::{AuthError, SignedEnvelope};
use crate::network::batcher::FrameBatcher;
use crate::network::protocol::ProtocolError;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Reports per second.
    pub tick_rate: u32,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Root of the key directory.
    pub key_dir: PathBuf,
    /// Identity name of the relay's key pair.
    pub name: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8888)),
            tick_rate: crate::TICK_RATE,
            max_connections: 256,
            key_dir: PathBuf::from("keys"),
            name: "server".to_string(),
        }
    }
}

impl RelayConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("ARENA_RELAY_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bind_addr),
            tick_rate: std::env::var("ARENA_TICK_RATE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|rate| *rate > 0)
                .unwrap_or(defaults.tick_rate),
            max_connections: std::env::var("ARENA_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            key_dir: std::env::var("ARENA_KEY_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.key_dir),
            name: std::env::var("ARENA_RELAY_NAME").unwrap_or(defaults.name),
        }
    }

    /// Interval between reports.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.tick_rate.max(1)))
    }
}

/// Relay errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Failed to bind to address.
    #[error("failed to bind: {0}")]
    Bind(#[from] std::io::Error),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Relay key could not be loaded.
    #[error("relay key: {0}")]
    Key(#[from] KeyError),

    /// Report could not be signed.
    #[error("sealing report: {0}")]
    Codec(#[from] CodecError),

    /// Report could not be encoded.
    #[error("encoding report: {0}")]
    Protocol(#[from] ProtocolError),

    /// Report could not be serialized.
    #[error("serializing report: {0}")]
    Json(#[from] serde_json::Error),
}

type Connections = Arc<RwLock<BTreeMap<SocketAddr, mpsc::Sender<Message>>>>;

/// The relay server.
pub struct RelayServer {
    /// Relay configuration.
    config: RelayConfig,
    /// Key pair reports are signed with.
    keys: Arc<KeyPair>,
    /// Envelopes waiting for the next tick.
    batcher: Arc<Mutex<FrameBatcher>>,
    /// Outbound queue per connection.
    connections: Connections,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl RelayServer {
    /// Create a relay signing with `keys`.
    pub fn new(config: RelayConfig, keys: KeyPair) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            keys: Arc::new(keys),
            batcher: Arc::new(Mutex::new(FrameBatcher::new(Instant::now()))),
            connections: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Create a relay using the key pair named in `config`.
    pub fn from_config(config: RelayConfig) -> Result<Self, RelayError> {
        let keys = KeyPair::load_named(&config.key_dir, &config.name)?;
        Ok(Self::new(config, keys))
    }

    /// Run the server until shutdown.
    #[instrument(skip(self), fields(addr = %self.config.bind_addr))]
    pub async fn run(&self) -> Result<(), RelayError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!(
            "relay listening on {} at {} Hz",
            listener.local_addr()?,
            self.config.tick_rate
        );
        self.serve(listener).await
    }

    /// Serve connections on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), RelayError> {
        let tick_handle = tokio::spawn(Self::run_tick_loop(
            self.batcher.clone(),
            self.connections.clone(),
            self.keys.clone(),
            self.config.tick_interval(),
            self.shutdown_tx.subscribe(),
        ));

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.connections.read().await.len() >= self.config.max_connections {
                                warn!("connection limit reached, rejecting {}", addr);
                                continue;
                            }
                            info!("new connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        tick_handle.abort();
        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let connections = self.connections.clone();
        let batcher = self.batcher.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("websocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<Message>(64);

            connections.write().await.insert(addr, msg_tx);

            // Writer task; ends with a close frame once the relay drops this connection
            let mut sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    if ws_sender.send(msg).await.is_err() {
                        return;
                    }
                }
                let _ = ws_sender.send(Message::Close(None)).await;
            });

            loop {
                tokio::select! {
                    _ = &mut sender_task => {
                        debug!("writer for {} finished", addr);
                        break;
                    }
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                if let Err(e) = Self::accept_envelope(&batcher, &text).await {
                                    match e {
                                        AuthError::Malformed(_) => debug!("ignoring message from {}: {}", addr, e),
                                        _ => warn!("rejecting envelope from {}: {}", addr, e),
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("websocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            sender_task.abort();
            connections.write().await.remove(&addr);
            info!("client {} cleaned up", addr);
        });
    }

    /// Verify an inbound envelope and queue it for the next report.
    ///
    /// Only the signature is checked; the envelope is forwarded untouched
    /// and peers decode its action themselves.
    async fn accept_envelope(batcher: &Mutex<FrameBatcher>, text: &str) -> Result<(), AuthError> {
        let envelope = SignedEnvelope::from_json(text)?;
        let signer = envelope.open()?;
        let value = envelope
            .to_value()
            .map_err(|e| AuthError::Malformed(e.to_string()))?;

        let mut batcher = batcher.lock().await;
        batcher.push(value);
        debug!(signer = %signer, pending = batcher.pending_len(), "buffered envelope");
        Ok(())
    }

    /// Queue an inbound message as if it arrived over a connection.
    pub async fn submit(&self, text: &str) -> Result<(), AuthError> {
        Self::accept_envelope(&self.batcher, text).await
    }

    /// Emit one report now; returns its frame number.
    pub async fn tick(&self) -> Result<u64, RelayError> {
        Self::emit_report(&self.batcher, &self.connections, &self.keys).await
    }

    async fn emit_report(
        batcher: &Mutex<FrameBatcher>,
        connections: &Connections,
        keys: &KeyPair,
    ) -> Result<u64, RelayError> {
        // Held until the broadcast is queued so reports go out in frame order
        let mut batcher = batcher.lock().await;
        let (frame_number, text) = batcher.drain_sealed(Instant::now(), keys)?;

        // Every connection gets every report or is dropped. Dropping the
        // sender closes the socket once its queue drains.
        connections.write().await.retain(|addr, sender| {
            match sender.try_send(Message::Text(text.clone())) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(frame = frame_number, "outbound queue full for {}; disconnecting", addr);
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(frame = frame_number, "outbound queue closed for {}", addr);
                    false
                }
            }
        });
        Ok(frame_number)
    }

    /// Drain and broadcast at the configured rate.
    async fn run_tick_loop(
        batcher: Arc<Mutex<FrameBatcher>>,
        connections: Connections,
        keys: Arc<KeyPair>,
        tick_duration: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    if let Err(e) = Self::emit_report(&batcher, &connections, &keys).await {
                        error!("failed to emit report: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Envelopes waiting for the next report.
    pub async fn pending_count(&self) -> usize {
        self.batcher.lock().await.pending_len()
    }

    /// Identity reports are signed with.
    pub fn public_key_pem(&self) -> &str {
        self.keys.public_key_pem()
    }
}
