//! `DuelServer` builder and server loop.
//!
//! Ties the layers together: transport → protocol → presence → rooms.

use std::sync::Arc;
use std::time::Duration;

use mathduel_protocol::{Codec, JsonCodec};
use mathduel_room::{Coordinator, CoordinatorConfig};
use mathduel_transport::{Transport, WebSocketTransport};

use crate::DuelError;
use crate::handler::handle_connection;

/// How long a new connection has to send `register`.
pub(crate) const REGISTER_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-connection limits, fixed at build time.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnectionSettings {
    pub(crate) outbound_buffer: usize,
    pub(crate) idle_timeout: Duration,
    pub(crate) send_timeout: Duration,
}

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) coordinator: Arc<Coordinator>,
    pub(crate) codec: C,
    pub(crate) settings: ConnectionSettings,
}

/// Builder for configuring and starting a duel server.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use mathduel::prelude::*;
///
/// # async fn run() -> Result<(), DuelError> {
/// let server = DuelServer::builder()
///     .bind("0.0.0.0:8765")
///     .coordinator_config(
///         CoordinatorConfig::default().with_room_duration(Duration::from_secs(30)),
///     )
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct DuelServerBuilder {
    bind_addr: String,
    coordinator_config: CoordinatorConfig,
    settings: ConnectionSettings,
}

impl DuelServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8765".to_string(),
            coordinator_config: CoordinatorConfig::default(),
            settings: ConnectionSettings {
                outbound_buffer: 64,
                idle_timeout: Duration::from_secs(60),
                send_timeout: Duration::from_secs(5),
            },
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the room and heartbeat configuration.
    pub fn coordinator_config(mut self, config: CoordinatorConfig) -> Self {
        self.coordinator_config = config;
        self
    }

    /// Capacity of each player's outbound queue. Frames beyond it are
    /// dropped for that player only.
    pub fn outbound_buffer(mut self, frames: usize) -> Self {
        self.settings.outbound_buffer = frames.max(1);
        self
    }

    /// Closes a connection that sends nothing for this long.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.settings.idle_timeout = timeout;
        self
    }

    /// Upper bound on a single socket write.
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.settings.send_timeout = timeout;
        self
    }

    /// Binds the listener and creates the coordinator.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(self) -> Result<DuelServer, DuelError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            coordinator: Arc::new(Coordinator::new(self.coordinator_config)),
            codec: JsonCodec,
            settings: self.settings,
        });

        Ok(DuelServer { transport, state })
    }
}

impl Default for DuelServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound duel server.
///
/// Call [`run()`](Self::run) to start the heartbeat monitor and accept
/// connections.
pub struct DuelServer<C: Codec = JsonCodec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl DuelServer {
    /// Creates a new builder.
    pub fn builder() -> DuelServerBuilder {
        DuelServerBuilder::new()
    }
}

impl<C: Codec> DuelServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The coordinator behind this server.
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.state.coordinator
    }

    /// Runs the server accept loop.
    ///
    /// Spawns the heartbeat monitor, then accepts connections and spawns a
    /// handler task for each. Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), DuelError> {
        let _monitor = self.state.coordinator.spawn_heartbeat_monitor();
        tracing::info!(addr = ?self.local_addr().ok(), "duel server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
                            );
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = DuelServerBuilder::default();
        assert_eq!(builder.bind_addr, "127.0.0.1:8765");
        assert_eq!(builder.settings.outbound_buffer, 64);
        assert_eq!(builder.settings.idle_timeout, Duration::from_secs(60));
        assert_eq!(builder.settings.send_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_outbound_buffer_is_at_least_one() {
        let builder = DuelServerBuilder::new().outbound_buffer(0);
        assert_eq!(builder.settings.outbound_buffer, 1);
    }

    #[tokio::test]
    async fn test_build_binds_ephemeral_port() {
        let server = DuelServer::builder()
            .bind("127.0.0.1:0")
            .build()
            .await
            .unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
        assert_eq!(server.coordinator().room_count().await, 0);
    }

    #[tokio::test]
    async fn test_build_fails_on_bad_address() {
        let result = DuelServer::builder().bind("not an address").build().await;
        assert!(matches!(result, Err(DuelError::Transport(_))));
    }
}
