//! The read-decode-evaluate-respond contract shared by both engines.
//!
//! ```text
//! ACCEPTED ──> READING ──> decode ok ──> EVALUATING ──> RESPONDED ──┐
//!                 ▲                                                 │
//!                 └─────────────────────────────────────────────────┘
//!              READING ──> decode error | EOF | I/O error ──> CLOSING
//! ```
//!
//! An engine owns the socket and the scheduling; [`Session::respond`] owns
//! everything between "these bytes arrived" and "send these bytes back".

use crate::commands::{Command, CommandTable};
use crate::protocol::{decode_all, DecodeError};
use crate::storage::Store;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The chunk read from the client is not valid RESP
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The socket cannot take a reply because the client is not reading
    #[error("client is not reading its replies")]
    SlowReader,
}

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Connections refused at the connection ceiling
    pub connections_rejected: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a new connection as active until the returned guard drops.
    pub fn track(self: &Arc<Self>) -> ActiveConnection {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        ActiveConnection {
            stats: Arc::clone(self),
        }
    }

    pub fn active(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Marks one connection as active. Dropping it, on any exit path, marks the
/// connection closed.
#[derive(Debug)]
pub struct ActiveConnection {
    stats: Arc<ConnectionStats>,
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.stats.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Protocol and evaluation state shared by every connection of an engine.
#[derive(Debug, Clone)]
pub struct Session {
    table: Arc<CommandTable>,
    stats: Arc<ConnectionStats>,
}

impl Session {
    pub fn new(table: CommandTable) -> Self {
        Self {
            table: Arc::new(table),
            stats: Arc::new(ConnectionStats::new()),
        }
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    /// Handles one chunk read from a client.
    ///
    /// Every command in the chunk is decoded first; if any frame is malformed
    /// nothing is evaluated and the error is returned so the engine can close
    /// the connection. Otherwise the commands run in arrival order and their
    /// replies are returned concatenated, one reply per command.
    pub fn respond(&self, chunk: &[u8], store: &mut Store) -> Result<Vec<u8>, ConnectionError> {
        let values = decode_all(chunk)?;

        let mut out = Vec::new();
        for value in values {
            match Command::from_value(value) {
                Ok(cmd) => self.table.respond(&cmd, store, &mut out),
                Err(e) => e.to_reply().serialize_into(&mut out),
            }
            self.stats.command_processed();
        }
        Ok(out)
    }
}
