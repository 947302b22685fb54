//! Peer Client
//!
//! Connects a [`PeerSession`] to the relay: seals local actions under the
//! peer's key on the way out, hands incoming reports to the session on the
//! way in. An initial `join` is queued as soon as the connection is up.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, instrument, warn};

use crate::crypto::keys::{load_public_key_pem, relay_public_key_path, KeyError, KeyPair};
use crate::crypto::CodecError;
use crate::game::action::{Action, RequestId};
use crate::game::config::WorldConfig;
use crate::network::auth::{AuthError, SignedEnvelope};
use crate::network::protocol::action_request;
use crate::network::session::{PeerSession, SessionError};

/// Peer configuration.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Relay WebSocket URL.
    pub relay_url: String,
    /// Root of the key directory.
    pub key_dir: PathBuf,
    /// Identity name (`key_dir/<name>/`).
    pub name: String,
    /// Trusted relay public key; defaults to `key_dir/server_public_key.pem`.
    pub relay_public_key: Option<PathBuf>,
    /// World constants; must match every other peer.
    pub world: WorldConfig,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://127.0.0.1:8888".to_string(),
            key_dir: PathBuf::from("keys"),
            name: "player".to_string(),
            relay_public_key: None,
            world: WorldConfig::default(),
        }
    }
}

impl PeerConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            relay_url: std::env::var("ARENA_RELAY_URL").unwrap_or(defaults.relay_url),
            key_dir: std::env::var("ARENA_KEY_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.key_dir),
            name: std::env::var("ARENA_NAME").unwrap_or(defaults.name),
            relay_public_key: std::env::var("ARENA_RELAY_KEY").ok().map(PathBuf::from),
            world: WorldConfig::from_env(),
        }
    }

    /// Path of the trusted relay key.
    pub fn relay_public_key_path(&self) -> PathBuf {
        self.relay_public_key
            .clone()
            .unwrap_or_else(|| relay_public_key_path(&self.key_dir))
    }
}

/// Peer errors.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Key material missing or unreadable.
    #[error("key error: {0}")]
    Key(#[from] KeyError),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// An outgoing action could not be sealed.
    #[error("sealing action: {0}")]
    Codec(#[from] CodecError),

    /// An outgoing envelope could not be serialized.
    #[error("serializing action: {0}")]
    Json(#[from] serde_json::Error),

    /// Relay closed the connection.
    #[error("relay closed the connection")]
    ConnectionClosed,
}

/// A connected (or connectable) peer.
pub struct PeerClient {
    config: PeerConfig,
    keys: KeyPair,
    session: Arc<PeerSession>,
    outbound_rx: mpsc::UnboundedReceiver<Action>,
}

impl PeerClient {
    /// Build a peer from on-disk keys.
    pub fn from_config(config: PeerConfig) -> Result<Self, PeerError> {
        let keys = KeyPair::load_named(&config.key_dir, &config.name)?;
        let relay_pem = load_public_key_pem(&config.relay_public_key_path())?;
        Self::new(config, keys, &relay_pem)
    }

    /// Build a peer from explicit key material.
    pub fn new(config: PeerConfig, keys: KeyPair, relay_public_pem: &str) -> Result<Self, PeerError> {
        let (session, outbound_rx) = PeerSession::new(config.world.clone(), relay_public_pem)?;
        Ok(Self {
            config,
            keys,
            session: Arc::new(session),
            outbound_rx,
        })
    }

    /// Shared handle to the replica, for local input and inspection.
    pub fn session(&self) -> Arc<PeerSession> {
        self.session.clone()
    }

    /// This peer's identity.
    pub fn identity(&self) -> &str {
        self.keys.public_key_pem()
    }

    /// Connect and pump messages until shutdown or disconnect.
    #[instrument(skip(self, shutdown_rx), fields(relay = %self.config.relay_url))]
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), PeerError> {
        let (ws_stream, _) = connect_async(self.config.relay_url.as_str()).await?;
        info!("connected to relay as {}", crate::crypto::keys::short_identity(self.identity()));

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        // Announce ourselves
        self.session.queue_action(Action::Join);

        loop {
            tokio::select! {
                action = self.outbound_rx.recv() => {
                    let Some(action) = action else { break };
                    let text = match seal_action(&action, &self.keys) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(method = action.method(), "action not sent: {}", e);
                            continue;
                        }
                    };
                    debug!(method = action.method(), "sending action");
                    ws_sender.send(Message::Text(text)).await?;
                }
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_report(&text).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("relay disconnected");
                            return Err(PeerError::ConnectionClosed);
                        }
                        Some(Err(e)) => {
                            error!("websocket error: {}", e);
                            return Err(e.into());
                        }
                        _ => {}
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received");
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_report(&self, text: &str) {
        match self.session.handle_report(text).await {
            Ok(_) => {}
            Err(SessionError::Auth(AuthError::Malformed(e))) => {
                debug!("ignoring unparseable message: {}", e);
            }
            Err(SessionError::Auth(AuthError::NotAReport(method))) => {
                debug!("ignoring non-report message {}", method);
            }
            Err(e) => warn!("discarding report: {}", e),
        }
    }
}

/// Seal a local action into wire text.
pub fn seal_action(action: &Action, keys: &KeyPair) -> Result<String, PeerError> {
    let payload = action_request(action, RequestId::new_v4());
    Ok(SignedEnvelope::seal(payload, keys)?.to_json()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::fixtures;
    use crate::game::action::Direction;
    use crate::network::auth::open_action;
    use crate::network::server::{RelayConfig, RelayServer};
    use std::time::Duration;
    use tokio::net::TcpListener;

    #[test]
    fn test_peer_config_default() {
        let config = PeerConfig::default();
        assert_eq!(config.relay_url, "ws://127.0.0.1:8888");
        assert_eq!(config.relay_public_key_path(), PathBuf::from("keys/server_public_key.pem"));

        let explicit = PeerConfig {
            relay_public_key: Some(PathBuf::from("/etc/relay.pem")),
            ..Default::default()
        };
        assert_eq!(explicit.relay_public_key_path(), PathBuf::from("/etc/relay.pem"));
    }

    #[test]
    fn test_sealed_action_opens_as_author() {
        let alice = fixtures::alice();
        let text = seal_action(&Action::moving(Direction::Left), alice).unwrap();

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let authored = open_action(&value).unwrap();
        assert_eq!(authored.author.as_str(), alice.public_key_pem());
        assert_eq!(authored.action, Action::moving(Direction::Left));
        assert!(matches!(authored.request_id, RequestId::Text(_)));
    }

    #[test]
    fn test_client_builds_session() {
        let client = PeerClient::new(
            PeerConfig::default(),
            fixtures::alice().clone(),
            fixtures::relay().public_key_pem(),
        )
        .unwrap();
        assert_eq!(client.identity(), fixtures::alice().public_key_pem());
        assert_eq!(client.session().config(), &WorldConfig::default());
    }

    #[tokio::test]
    async fn test_peer_sees_own_join_through_relay() {
        let relay_keys = fixtures::relay();
        let alice = fixtures::alice();

        let relay = Arc::new(RelayServer::new(
            RelayConfig {
                tick_rate: 1,
                ..Default::default()
            },
            relay_keys.clone(),
        ));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let serving = tokio::spawn({
            let relay = relay.clone();
            async move { relay.serve(listener).await }
        });

        let config = PeerConfig {
            relay_url: format!("ws://{}", addr),
            world: WorldConfig::bounded(),
            ..Default::default()
        };
        let client = PeerClient::new(config, alice.clone(), relay_keys.public_key_pem()).unwrap();
        let session = client.session();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let peer = tokio::spawn(client.run(shutdown_rx));

        // The initial join reaches the relay, comes back in a signed report
        // and spawns the peer in its own replica
        let world = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                relay.tick().await.unwrap();
                let world = session.snapshot().await;
                if world.join_order.iter().any(|id| id.as_str() == alice.public_key_pem()) {
                    return world;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("join never applied");

        assert_eq!(world.join_order.len(), 1);
        assert_eq!(relay.connection_count().await, 1);
        let stats = session.stats().await;
        assert!(stats.frames_applied >= 1);
        assert_eq!(stats.frame_gaps, 0);
        assert_eq!(stats.rejected_reports, 0);

        shutdown_tx.send(()).unwrap();
        peer.await.unwrap().unwrap();
        relay.shutdown();
        serving.await.unwrap().unwrap();
    }

    #[test]
    fn test_missing_relay_key_fails() {
        let result = PeerClient::new(PeerConfig::default(), fixtures::alice().clone(), "nonsense");
        assert!(matches!(result, Err(PeerError::Key(_))));
    }
}
