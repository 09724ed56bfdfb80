//! Command Dispatch
//!
//! ```text
//! ┌──────────┐    ┌───────────────────────┐    ┌────────────────┐
//! │ Command  │───>│ CommandTable::lookup  │───>│ Handler(args,  │
//! │ "PING"   │    │ (fallback: PING)      │    │   &mut Store)  │
//! └──────────┘    └───────────────────────┘    └───────┬────────┘
//!                                                      ▼
//!                                        Result<RespValue, CommandError>
//! ```
//!
//! The table always knows `PING`. Everything else is registered by the
//! application through [`CommandTable::register`]. A name nobody registered
//! is handled by `PING`, so an unexpected command never takes a connection
//! down.

use crate::commands::command::{Command, CommandError};
use crate::commands::keyspace;
use crate::protocol::RespValue;
use crate::storage::Store;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Signature every command handler implements.
pub type Handler = fn(&[Bytes], &mut Store) -> Result<RespValue, CommandError>;

/// Name to handler lookup used by both connection engines.
#[derive(Clone)]
pub struct CommandTable {
    handlers: HashMap<String, Handler>,
    fallback: Handler,
}

impl fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("CommandTable").field("commands", &names).finish()
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandTable {
    /// Creates a table with only the built-in `PING`.
    pub fn new() -> Self {
        let mut table = Self {
            handlers: HashMap::new(),
            fallback: cmd_ping,
        };
        table.register("PING", cmd_ping);
        table
    }

    /// Creates a table with `PING` and the keyspace commands.
    pub fn with_keyspace() -> Self {
        let mut table = Self::new();
        keyspace::register(&mut table);
        table
    }

    /// Binds `name` (case-insensitive) to `handler`, replacing any earlier binding.
    pub fn register(&mut self, name: &str, handler: Handler) {
        self.handlers.insert(name.to_uppercase(), handler);
    }

    /// Returns true if `name` has its own handler.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(&name.to_uppercase())
    }

    /// Runs a command against the store and returns the reply to send.
    pub fn evaluate(&self, cmd: &Command, store: &mut Store) -> Result<RespValue, CommandError> {
        debug!(command = %cmd.name, args = cmd.args.len(), "Evaluating command");
        let handler = self.handlers.get(&cmd.name).copied().unwrap_or(self.fallback);
        handler(&cmd.args, store)
    }

    /// Evaluates a command and encodes the outcome.
    ///
    /// Evaluation errors become error replies; exactly one reply is appended
    /// to `out` per call.
    pub fn respond(&self, cmd: &Command, store: &mut Store, out: &mut Vec<u8>) {
        match self.evaluate(cmd, store) {
            Ok(reply) => reply.serialize_into(out),
            Err(e) => e.to_reply().serialize_into(out),
        }
    }
}

/// PING [message]
///
/// With no argument replies `+PONG`; with one, echoes it as a bulk string.
pub fn cmd_ping(args: &[Bytes], _store: &mut Store) -> Result<RespValue, CommandError> {
    match args {
        [] => Ok(RespValue::pong()),
        [message] => Ok(RespValue::bulk_string(message.clone())),
        _ => Err(CommandError::WrongArity("ping")),
    }
}
