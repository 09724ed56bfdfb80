//! # tinydice
//!
//! A small in-memory key-value server speaking the Redis wire protocol
//! (RESP). Values are binary-safe byte strings, keys can carry a TTL, and
//! expired keys are reclaimed both lazily and by a periodic sampling cycle.
//!
//! ## Architecture
//!
//! ```text
//!   bytes ──> protocol::decode_all ──> commands::Command ──> CommandTable
//!                                                                │
//!   bytes <── RespValue::serialize <─────── reply <──────────────┤
//!                                                                ▼
//!                                                          storage::Store
//!                                                                ▲
//!                                                   storage::run_expiry_cycle
//! ```
//!
//! Two connection engines drive this pipeline:
//!
//! - [`ThreadedServer`]: one tokio task per client, store behind a mutex,
//!   expiry on a background sweeper
//! - [`Reactor`]: one task multiplexing every client, store owned outright,
//!   expiry run from the event loop
//!
//! ## Quick Start
//!
//! ```no_run
//! use tinydice::{CommandTable, ServerConfig, ThreadedServer};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let server = ThreadedServer::bind(ServerConfig::default(), CommandTable::with_keyspace()).await?;
//!     server.run(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP values, encoder and decoder
//! - [`storage`]: the keyspace with lazy and sampled active expiry
//! - [`commands`]: the command table, `PING` and the keyspace commands
//! - [`connection`]: the session contract and both engines
//! - [`config`]: server settings

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod storage;

pub use commands::{Command, CommandError, CommandTable};
pub use config::{Mode, ServerConfig};
pub use connection::{ConnectionError, ConnectionStats, Reactor, Session, ThreadedServer};
pub use protocol::{decode, decode_all, encode, DecodeError, RespValue};
pub use storage::{run_expiry_cycle, ExpirySweeper, SharedStore, Store};

/// The default port the server listens on
pub const DEFAULT_PORT: u16 = 7379;

/// The default host the server binds to
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Version of tinydice
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
