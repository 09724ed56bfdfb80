//! Task-per-Connection Engine
//!
//! ```text
//!            accept loop
//!                 │ spawn
//!       ┌─────────┼─────────┐
//!       ▼         ▼         ▼
//!    client    client    client      each: read ≤ 512 bytes
//!     task      task      task             lock store, respond, unlock
//!       │         │         │              write reply
//!       └─────────┼─────────┘
//!                 ▼
//!         Arc<Mutex<Store>> <──── ExpirySweeper (every cron interval)
//! ```
//!
//! Every connection gets its own task, so tasks run in parallel on the
//! multi-thread runtime. The store lock is held for the evaluation of one
//! chunk and never across an await.

use crate::commands::CommandTable;
use crate::config::ServerConfig;
use crate::connection::session::{ActiveConnection, ConnectionError, ConnectionStats, Session};
use crate::storage::{lock_store, ExpiryConfig, ExpirySweeper, SharedStore, Store};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Serves clients with one task each over a shared store.
#[derive(Debug)]
pub struct ThreadedServer {
    listener: TcpListener,
    store: SharedStore,
    session: Session,
    config: ServerConfig,
}

impl ThreadedServer {
    /// Binds to the configured address.
    pub async fn bind(config: ServerConfig, table: CommandTable) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_address()).await?;
        Ok(Self::from_listener(listener, config, table))
    }

    /// Serves on an already bound listener with a fresh store.
    pub fn from_listener(listener: TcpListener, config: ServerConfig, table: CommandTable) -> Self {
        Self {
            listener,
            store: Store::shared(),
            session: Session::new(table),
            config,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the store the server evaluates against.
    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(self.session.stats())
    }

    /// Accepts and serves clients until `shutdown` completes.
    ///
    /// On shutdown every connection task is aborted, which closes its socket.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        info!(addr = ?self.listener.local_addr().ok(), "Starting threaded server");

        let _sweeper = ExpirySweeper::start(
            Arc::clone(&self.store),
            ExpiryConfig {
                interval: self.config.cron_interval,
            },
        );

        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if self.session.stats().active() >= self.config.max_connections as u64 {
                            warn!(client = %addr, "Connection limit reached, rejecting client");
                            self.session.stats().connection_rejected();
                            continue;
                        }
                        let active = self.session.stats().track();
                        connections.spawn(handle_connection(
                            stream,
                            addr,
                            active,
                            Arc::clone(&self.store),
                            self.session.clone(),
                            self.config.read_buffer_size,
                        ));
                    }
                    Err(e) => error!(error = %e, "Failed to accept connection"),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = &mut shutdown => break,
            }
        }

        info!(connections = connections.len(), "Threaded server shutting down");
        connections.shutdown().await;
    }
}

/// Serves one TCP client until it disconnects or misbehaves.
///
/// `active` was taken when the client was accepted and is released when this
/// returns.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    active: ActiveConnection,
    store: SharedStore,
    session: Session,
    read_size: usize,
) {
    let _active = active;
    info!(client = %addr, active = session.stats().active(), "Client connected");

    match serve_stream(stream, &store, &session, read_size).await {
        Ok(()) => info!(client = %addr, "Client disconnected"),
        Err(ConnectionError::Io(ref e)) if e.kind() == io::ErrorKind::ConnectionReset => {
            debug!(client = %addr, "Connection reset by client")
        }
        Err(e) => warn!(client = %addr, error = %e, "Closing connection"),
    }
}

/// The per-connection loop, over any byte stream.
///
/// Reads at most `read_size` bytes at a time and answers each read before
/// issuing the next one. Returns `Ok(())` on end of stream and an error on
/// I/O or decode failure; either way the caller drops the stream.
pub async fn serve_stream<S>(
    mut stream: S,
    store: &SharedStore,
    session: &Session,
    read_size: usize,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; read_size];

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        session.stats().bytes_read(n);

        let reply = {
            let mut store = lock_store(store);
            session.respond(&buf[..n], &mut store)?
        };

        stream.write_all(&reply).await?;
        session.stats().bytes_written(reply.len());
    }
}
