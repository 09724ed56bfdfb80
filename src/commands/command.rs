//! Decoded commands and evaluation errors.

use crate::protocol::RespValue;
use bytes::Bytes;
use thiserror::Error;

/// A client command: an uppercased name plus positional arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<Bytes>,
}

impl Command {
    pub fn new(name: impl Into<String>, args: Vec<Bytes>) -> Self {
        Self {
            name: name.into().to_uppercase(),
            args,
        }
    }

    /// Builds a command from a decoded top-level value.
    ///
    /// The value must be a non-empty array of bulk or simple strings. The first
    /// element names the command, case-insensitively.
    ///
    /// ```
    /// use tinydice::commands::Command;
    /// use tinydice::protocol::decode;
    ///
    /// let (value, _) = decode(b"*2\r\n$4\r\nping\r\n$2\r\nhi\r\n").unwrap();
    /// let cmd = Command::from_value(value).unwrap();
    /// assert_eq!(cmd.name, "PING");
    /// assert_eq!(cmd.args, vec![bytes::Bytes::from("hi")]);
    /// ```
    pub fn from_value(value: RespValue) -> Result<Self, CommandError> {
        let items = value.into_array().ok_or(CommandError::InvalidFormat)?;
        let mut parts = items.into_iter().map(|item| match item {
            RespValue::BulkString(b) => Ok(b),
            RespValue::SimpleString(s) => Ok(Bytes::from(s)),
            _ => Err(CommandError::InvalidFormat),
        });

        let name = parts.next().ok_or(CommandError::EmptyCommand)??;
        let args = parts.collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(String::from_utf8_lossy(&name), args))
    }
}

/// Errors raised while evaluating a command.
///
/// Each one is sent back to the client as an error reply; the connection
/// stays open.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("ERR invalid command format")]
    InvalidFormat,

    #[error("ERR empty command")]
    EmptyCommand,

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    #[error("ERR invalid expire time in '{0}' command")]
    InvalidExpireTime(&'static str),
}

impl CommandError {
    /// The error-framed reply sent to the client.
    pub fn to_reply(&self) -> RespValue {
        RespValue::error(self.to_string())
    }
}
