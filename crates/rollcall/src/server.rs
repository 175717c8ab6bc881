//! `RollcallServer` builder and server loop.
//!
//! This is the entry point for running a Rollcall server. It ties the
//! layers together: transport → protocol → identity → service.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rollcall_protocol::{Codec, JsonCodec};
use rollcall_session::IdentityProvider;
use rollcall_store::{AttendanceRepository, SessionRepository};
use rollcall_transport::{Transport, TransportError, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{AttendanceService, RollcallError, ServerConfig};

/// The current protocol version. Clients must send this in their
/// handshake or be rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<R, I, C> {
    pub(crate) service: AttendanceService<R>,
    pub(crate) identity: I,
    pub(crate) codec: C,
    pub(crate) handshake_timeout: Duration,
    pub(crate) idle_timeout: Duration,
}

/// Builder for configuring and starting a Rollcall server.
///
/// # Example
///
/// ```rust,ignore
/// use rollcall::prelude::*;
///
/// let server = RollcallServer::builder()
///     .bind("0.0.0.0:8080")
///     .build(service, identities)
///     .await?;
/// server.run().await
/// ```
pub struct RollcallServerBuilder {
    bind_addr: String,
    handshake_timeout: Duration,
    idle_timeout: Duration,
}

impl RollcallServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        let defaults = ServerConfig::default();
        Self::from_config(&defaults)
    }

    /// Takes the listener address and timeouts from `config`.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            bind_addr: config.bind_addr.clone(),
            handshake_timeout: config.handshake_timeout(),
            idle_timeout: config.idle_timeout(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// How long a new connection has to send its handshake.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// How long a connection may stay silent before it is closed.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Binds the listener and returns a server ready to [`run`](RollcallServer::run).
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build<R, I>(
        self,
        service: AttendanceService<R>,
        identity: I,
    ) -> Result<RollcallServer<R, I, JsonCodec>, RollcallError>
    where
        R: SessionRepository + AttendanceRepository,
        I: IdentityProvider,
    {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            service,
            identity,
            codec: JsonCodec,
            handshake_timeout: self.handshake_timeout,
            idle_timeout: self.idle_timeout,
        });

        Ok(RollcallServer { transport, state })
    }
}

impl Default for RollcallServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Rollcall server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct RollcallServer<R, I, C> {
    transport: WebSocketTransport,
    state: Arc<ServerState<R, I, C>>,
}

impl RollcallServer<(), (), JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> RollcallServerBuilder {
        RollcallServerBuilder::new()
    }
}

impl<R, I, C> RollcallServer<R, I, C>
where
    R: SessionRepository + AttendanceRepository,
    I: IdentityProvider,
    C: Codec,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, RollcallError> {
        Ok(self.transport.local_addr()?)
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), RollcallError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` completes.
    ///
    /// Each accepted connection gets its own task. Connections already
    /// being served keep running after the loop stops.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), RollcallError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "Rollcall server running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested, no longer accepting connections");
                    self.transport.shutdown().await?;
                    return Ok(());
                }
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(TransportError::Shutdown) => return Ok(()),
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                },
            }
        }
    }
}
