//! `RookeryServer` builder and server loop.
//!
//! Ties the layers together: the WebSocket transport feeds per-connection
//! handlers, the HTTP listener feeds the axum router, and both reach game
//! state only through the shared [`SessionDirectory`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rookery_protocol::{Codec, JsonCodec};
use rookery_rules::RulesEngine;
use rookery_session::{AuditLog, SessionConfig, SessionDirectory, SnapshotStore};
use rookery_transport::{Transport, WebSocketTransport};
use tokio::net::TcpListener;

use crate::RookeryError;
use crate::handler::handle_connection;
use crate::http;

/// Network-facing settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// WebSocket listen address. Default: `127.0.0.1:8080`.
    pub bind_addr: String,
    /// HTTP fallback listen address; `None` disables the listener.
    /// Default: `None`.
    pub http_addr: Option<String>,
    /// How long a new connection has to send `attach`. Default: 5s.
    pub handshake_timeout: Duration,
    /// How long an attached connection may stay silent before it is
    /// dropped. Default: 10 minutes.
    pub idle_timeout: Duration,
    /// Upper bound on one real-time request. Default: 10s.
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            http_addr: None,
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Shared state handed to every connection task and HTTP handler.
pub(crate) struct ServerState<R, S, L, C> {
    pub(crate) directory: SessionDirectory<R, S, L>,
    pub(crate) codec: C,
    pub(crate) config: ServerConfig,
}

/// Builder for configuring and starting a server.
///
/// # Example
///
/// ```rust,no_run
/// use rookery::prelude::*;
///
/// # async fn run() -> Result<(), RookeryError> {
/// let server = RookeryServer::builder()
///     .bind("0.0.0.0:8080")
///     .http_bind("0.0.0.0:8081")
///     .build(ChessRules, MemoryStore::new(), MemoryAuditLog::new())
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct RookeryServerBuilder {
    config: ServerConfig,
    session_config: SessionConfig,
}

impl RookeryServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            session_config: SessionConfig::default(),
        }
    }

    /// Sets the WebSocket listen address.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Enables the HTTP fallback on `addr`.
    pub fn http_bind(mut self, addr: &str) -> Self {
        self.config.http_addr = Some(addr.to_string());
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Binds the listeners and wires the given backends into a server.
    ///
    /// Uses `JsonCodec` on the real-time channel.
    pub async fn build<R, S, L>(
        self,
        rules: R,
        store: S,
        audit: L,
    ) -> Result<RookeryServer<R, S, L, JsonCodec>, RookeryError>
    where
        R: RulesEngine,
        S: SnapshotStore,
        L: AuditLog,
    {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;
        let http_listener = match &self.config.http_addr {
            Some(addr) => {
                let listener = TcpListener::bind(addr).await?;
                tracing::info!(%addr, "HTTP fallback listening");
                Some(listener)
            }
            None => None,
        };

        let state = Arc::new(ServerState {
            directory: SessionDirectory::new(rules, store, audit, self.session_config),
            codec: JsonCodec,
            config: self.config,
        });

        Ok(RookeryServer {
            transport,
            http_listener,
            state,
        })
    }
}

impl Default for RookeryServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound server. Call [`run()`](Self::run) to start serving.
pub struct RookeryServer<R, S, L, C> {
    transport: WebSocketTransport,
    http_listener: Option<TcpListener>,
    state: Arc<ServerState<R, S, L, C>>,
}

impl RookeryServer<(), (), (), ()> {
    pub fn builder() -> RookeryServerBuilder {
        RookeryServerBuilder::new()
    }
}

impl<R, S, L, C> RookeryServer<R, S, L, C>
where
    R: RulesEngine,
    S: SnapshotStore,
    L: AuditLog,
    C: Codec,
{
    /// Address of the WebSocket listener.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Address of the HTTP listener, if enabled.
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_listener
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
    }

    /// The HTTP fallback as an axum router sharing this server's sessions.
    pub fn router(&self) -> axum::Router {
        http::router(Arc::clone(&self.state))
    }

    /// Serves both channels until the process is terminated.
    pub async fn run(mut self) -> Result<(), RookeryError> {
        tracing::info!("Rookery server running");

        if let Some(listener) = self.http_listener.take() {
            let app = http::router(Arc::clone(&self.state));
            tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!(error = %e, "HTTP fallback stopped");
                }
            });
        }

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        let conn_id = rookery_transport::Connection::id(&conn);
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(%conn_id, error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
