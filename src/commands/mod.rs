//! Command Evaluation
//!
//! Turns decoded [`Command`]s into replies against the [`Store`](crate::storage::Store).
//!
//! - `command`: the `Command` type and `CommandError`
//! - `handler`: `CommandTable`, the name-to-handler lookup, and the built-in `PING`
//! - `keyspace`: `SET`, `GET`, `DEL`, `EXISTS`, `EXPIRE`, `TTL`, `DBSIZE`

pub mod command;
pub mod handler;
pub mod keyspace;

pub use command::{Command, CommandError};
pub use handler::{cmd_ping, CommandTable, Handler};
