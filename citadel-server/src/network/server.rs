//! WebSocket Game Server
//!
//! Async WebSocket server for lobby and game connections. Every inbound
//! frame, close and grace sweep runs to completion under one lock on the
//! [`Hub`], which keeps per-session broadcasts in processing order.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, Mutex, Notify};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::GameRules;
use crate::network::coordinator::{Audience, Coordinator, CoordinatorConfig, Effects};
use crate::network::protocol::{ClientMessage, ErrorCode, ServerMessage, ShutdownInfo};
use crate::network::registry::ConnectionId;
use crate::session::LobbyRules;

/// How long a closing connection may spend flushing its queue.
const WRITER_DRAIN: Duration = Duration::from_secs(1);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// How long a disconnected seated player keeps their seat.
    pub grace_period: Duration,
    /// How often expired grace windows are swept.
    pub grace_poll_interval: Duration,
    /// Per-connection outbound queue length.
    pub outbound_buffer: usize,
    /// Lobby policy.
    pub lobby: LobbyRules,
    /// Round economics.
    pub rules: GameRules,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], crate::DEFAULT_PORT)),
            max_connections: 1000,
            grace_period: Duration::from_secs(crate::DEFAULT_GRACE_SECS),
            grace_poll_interval: Duration::from_millis(250),
            outbound_buffer: 256,
            lobby: LobbyRules::default(),
            rules: GameRules::default(),
            version: crate::VERSION.to_string(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `CITADEL_*` environment variables.
    pub fn from_env() -> Result<Self, GameServerError> {
        let defaults = Self::default();

        let grace_poll_ms = env_or("CITADEL_GRACE_POLL_MS", 250u64)?;
        if grace_poll_ms == 0 {
            return Err(GameServerError::Config(
                "CITADEL_GRACE_POLL_MS must be positive".into(),
            ));
        }

        Ok(Self {
            bind_addr: env_or("CITADEL_BIND_ADDR", defaults.bind_addr)?,
            max_connections: env_or("CITADEL_MAX_CONNECTIONS", defaults.max_connections)?,
            grace_period: Duration::from_secs(env_or("CITADEL_GRACE_SECS", crate::DEFAULT_GRACE_SECS)?),
            grace_poll_interval: Duration::from_millis(grace_poll_ms),
            lobby: LobbyRules {
                require_all_ready: std::env::var("CITADEL_REQUIRE_ALL_READY")
                    .map(|v| parse_flag(&v))
                    .unwrap_or(false),
                default_max_players: env_or(
                    "CITADEL_DEFAULT_MAX_PLAYERS",
                    defaults.lobby.default_max_players,
                )?,
            },
            ..defaults
        })
    }

    /// Coordinator settings, with fresh seed entropy.
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            grace_period: self.grace_period,
            lobby: self.lobby.clone(),
            rules: self.rules.clone(),
            entropy: uuid::Uuid::new_v4().as_u128() as u64,
        }
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T, GameServerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| GameServerError::Config(format!("{key}={raw}: {e}"))),
        Err(_) => Ok(default),
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim(), "true" | "1")
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Bad configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

// =============================================================================
// HUB
// =============================================================================

/// Outbound side of one open connection.
struct Client {
    tx: mpsc::Sender<ServerMessage>,
    /// Fired when the queue overflowed and the connection must close.
    lagged: Arc<Notify>,
}

/// Coordinator plus the outbound queue of every open connection.
struct Hub {
    coordinator: Coordinator,
    clients: BTreeMap<ConnectionId, Client>,
}

impl Hub {
    fn new(coordinator: Coordinator) -> Self {
        Self {
            coordinator,
            clients: BTreeMap::new(),
        }
    }

    /// Track a new connection's queue. The returned handle fires if the
    /// connection falls behind.
    fn attach(&mut self, conn: ConnectionId, tx: mpsc::Sender<ServerMessage>) -> Arc<Notify> {
        let lagged = Arc::new(Notify::new());
        self.clients.insert(
            conn,
            Client {
                tx,
                lagged: lagged.clone(),
            },
        );
        lagged
    }

    /// Enqueue every message of `effects`. Never waits on a slow client.
    ///
    /// A client whose queue is full has lost part of its ordered stream; it is
    /// detached and told to close, and resyncs with `getSessionState` after
    /// reconnecting.
    fn deliver(&mut self, effects: Effects) {
        let mut lagging = Vec::new();

        for outbound in effects {
            #[cfg(feature = "debug-tracing")]
            debug!(audience = ?outbound.audience, message = ?outbound.message, "outbound");

            match outbound.audience {
                Audience::Connection(conn) => self.send_to(conn, outbound.message, &mut lagging),
                Audience::Connections(conns) => {
                    for conn in conns {
                        self.send_to(conn, outbound.message.clone(), &mut lagging);
                    }
                }
                Audience::Everyone => {
                    for conn in self.clients.keys() {
                        self.send_to(*conn, outbound.message.clone(), &mut lagging);
                    }
                }
            }
        }

        for conn in lagging {
            if let Some(client) = self.clients.remove(&conn) {
                client.lagged.notify_one();
            }
        }
    }

    fn send_to(&self, conn: ConnectionId, message: ServerMessage, lagging: &mut Vec<ConnectionId>) {
        if lagging.contains(&conn) {
            return;
        }
        let Some(client) = self.clients.get(&conn) else {
            return;
        };
        match client.tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(%conn, "outbound queue full, closing connection");
                lagging.push(conn);
            }
            Err(TrySendError::Closed(_)) => debug!(%conn, "outbound queue already closed"),
        }
    }
}

// =============================================================================
// SERVER
// =============================================================================

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Coordinator and connection queues.
    hub: Arc<Mutex<Hub>>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let coordinator = Coordinator::new(config.coordinator_config());

        Self {
            config,
            hub: Arc::new(Mutex::new(Hub::new(coordinator))),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("Game server listening on {}", listener.local_addr()?);

        let grace_handle = tokio::spawn(Self::run_grace_loop(
            self.hub.clone(),
            self.config.grace_poll_interval,
            self.shutdown_tx.subscribe(),
        ));

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.hub.lock().await.clients.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        grace_handle.abort();
        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let hub = self.hub.clone();
        let buffer = self.config.outbound_buffer;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let conn = ConnectionId::new();
            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(buffer);

            let lagged = hub.lock().await.attach(conn, msg_tx.clone());
            debug!(%conn, %addr, "connection registered");

            let mut writer = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                let _ = ws_sender.close().await;
            });

            loop {
                tokio::select! {
                    frame = ws_receiver.next() => {
                        let decoded = match frame {
                            Some(Ok(Message::Text(text))) => ClientMessage::from_json(&text),
                            Some(Ok(Message::Binary(data))) => ClientMessage::from_bytes(&data),
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            // ping/pong handled by tungstenite
                            Some(Ok(_)) => continue,
                        };

                        match decoded {
                            Ok(client_msg) => {
                                let mut hub = hub.lock().await;
                                let effects = hub.coordinator.handle(conn, client_msg, Instant::now());
                                hub.deliver(effects);
                            }
                            Err(e) => {
                                debug!("Invalid message from {}: {}", addr, e);
                                let _ = msg_tx.try_send(ServerMessage::error(
                                    ErrorCode::InvalidArgument,
                                    format!("Invalid message format: {e}"),
                                ));
                            }
                        }
                    }
                    _ = lagged.notified() => {
                        warn!("Client {} fell behind, closing", addr);
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.try_send(ServerMessage::Shutdown(ShutdownInfo {
                            reason: "Server shutting down".to_string(),
                        }));
                        break;
                    }
                }
            }

            {
                let mut hub = hub.lock().await;
                hub.clients.remove(&conn);
                let effects = hub.coordinator.connection_closed(conn, Instant::now());
                hub.deliver(effects);
            }

            drop(msg_tx);
            if tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
                writer.abort();
            }

            info!("Client {} cleaned up", addr);
        });
    }

    /// Release seats whose grace window ran out.
    async fn run_grace_loop(
        hub: Arc<Mutex<Hub>>,
        poll: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let mut ticker = interval(poll);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let mut hub = hub.lock().await;
                    let effects = hub.coordinator.expire_grace(Instant::now());
                    if !effects.is_empty() {
                        hub.deliver(effects);
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
        self.hub.lock().await.clients.len()
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        self.hub.lock().await.coordinator.directory().len()
    }
}
