use crate::config::ServerConfig;
use crate::connection::handle_connection;
use crate::error::PairsError;
use crate::metrics::gauges;
use crate::registry::Registry;
use crate::router::Router;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{error, info, warn};

const DRAIN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Shared state for the relay server.
///
/// Constructed once at startup and passed to every connection task.
#[derive(Debug)]
pub struct ServerState {
    /// Peer id → connection table.
    pub registry: Arc<Registry>,
    /// Relays envelopes through [`ServerState::registry`].
    pub router: Router,
    /// Runtime server configuration.
    pub config: ServerConfig,
    active_connections: AtomicUsize,
    drained: Notify,
}

impl ServerState {
    /// Build the state for `config` with an empty registry.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(Registry::new());
        Self {
            router: Router::new(Arc::clone(&registry)),
            registry,
            config,
            active_connections: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    /// Number of connections currently being served.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Acquire)
    }

    /// Reserve a connection slot, or `None` if `max_conns` is reached.
    pub(crate) fn try_acquire_slot(self: &Arc<Self>) -> Option<ConnectionSlot> {
        let max = self.config.max_conns;
        self.active_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()?;
        gauges::inc_connections_active();
        Some(ConnectionSlot {
            state: Arc::clone(self),
        })
    }
}

/// Releases its connection slot when dropped.
pub(crate) struct ConnectionSlot {
    state: Arc<ServerState>,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.state.active_connections.fetch_sub(1, Ordering::AcqRel);
        gauges::dec_connections_active();
        self.state.drained.notify_waiters();
    }
}

/// Run the accept loop until the listener fails.
///
/// # Errors
///
/// Returns an error if the listener's local address cannot be read.
pub async fn run(listener: TcpListener, state: Arc<ServerState>) -> Result<(), PairsError> {
    run_with_shutdown(listener, state, std::future::pending()).await
}

/// Run the server accept loop until `shutdown` completes.
///
/// Once `shutdown` resolves the loop stops accepting new connections and
/// waits up to 30 seconds for in-flight connections to finish.
///
/// # Errors
///
/// Returns an error if the listener's local address cannot be read.
pub async fn run_with_shutdown<F>(
    listener: TcpListener,
    state: Arc<ServerState>,
    shutdown: F,
) -> Result<(), PairsError>
where
    F: Future<Output = ()>,
{
    let local_addr = listener.local_addr().map_err(PairsError::Io)?;
    info!("relay listening on ws://{}{}", local_addr, state.config.path);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        let Some(slot) = state.try_acquire_slot() else {
                            warn!("max connections reached, rejecting {}", addr);
                            drop(stream);
                            continue;
                        };
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, state).await {
                                tracing::debug!("connection from {} closed: {}", addr, e);
                            }
                            drop(slot);
                        });
                    }
                    Err(e) => {
                        error!("failed to accept connection: {}", e);
                    }
                }
            }
            () = &mut shutdown => {
                info!(
                    "shutdown signal received, draining {} connections",
                    state.active_connections()
                );
                break;
            }
        }
    }

    let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
    loop {
        let drained = state.drained.notified();
        let active = state.active_connections();
        if active == 0 {
            break;
        }
        if tokio::time::timeout_at(deadline, drained).await.is_err() {
            warn!("drain timeout reached with {} connections still active", active);
            break;
        }
    }

    info!("server shut down gracefully");
    Ok(())
}
