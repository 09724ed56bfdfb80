//! RESP Value Types and Encoding
//!
//! Every payload that crosses the wire is one of five shapes, each introduced
//! by a single marker byte and terminated by CRLF:
//!
//! - `+` Simple String: `+PONG\r\n`
//! - `-` Error: `-ERR wrong number of arguments\r\n`
//! - `:` Integer: `:42\r\n`
//! - `$` Bulk String: `$5\r\nhello\r\n`
//! - `*` Array: `*2\r\n$3\r\nfoo\r\n:42\r\n`
//!
//! Incoming commands are always arrays of bulk strings; replies may be any of
//! the five, plus the null bulk string `$-1\r\n` for a missing value.

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// Wire form of [`RespValue::Null`]
pub const NULL_BULK: &[u8] = b"$-1\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A decoded RESP value.
///
/// Arrays nest arbitrarily; every consumer matches on the variant instead of
/// probing a dynamic type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Status text without CR or LF. Format: `+<string>\r\n`
    SimpleString(String),

    /// Human-readable error message. Format: `-<message>\r\n`
    Error(String),

    /// 64-bit signed integer. Format: `:<integer>\r\n`
    Integer(i64),

    /// Binary-safe, length-prefixed payload. Format: `$<length>\r\n<data>\r\n`
    BulkString(Bytes),

    /// Ordered sequence of values. Format: `*<count>\r\n<element>...`
    Array(Vec<RespValue>),

    /// Absent value, sent as the null bulk string `$-1\r\n`
    Null,
}

/// Selects how [`encode`] frames a reply payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `+<data>\r\n`, for fixed status replies such as `PONG`.
    Simple,
    /// `$<len>\r\n<data>\r\n`, for echoing arbitrary bytes back verbatim.
    Bulk,
}

/// Encodes a raw reply payload with the requested framing.
///
/// # Example
/// ```
/// use tinydice::protocol::{encode, Framing};
/// assert_eq!(encode(b"PONG", Framing::Simple), b"+PONG\r\n");
/// assert_eq!(encode(b"hello", Framing::Bulk), b"$5\r\nhello\r\n");
/// ```
pub fn encode(data: &[u8], framing: Framing) -> Vec<u8> {
    let mut buf = Vec::with_capacity(data.len() + 16);
    match framing {
        Framing::Simple => {
            buf.push(prefix::SIMPLE_STRING);
            buf.extend_from_slice(data);
            buf.extend_from_slice(CRLF);
        }
        Framing::Bulk => {
            buf.push(prefix::BULK_STRING);
            buf.extend_from_slice(data.len().to_string().as_bytes());
            buf.extend_from_slice(CRLF);
            buf.extend_from_slice(data);
            buf.extend_from_slice(CRLF);
        }
    }
    buf
}

impl RespValue {
    /// Creates a simple string value.
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    /// Creates an error value.
    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    /// Creates a bulk string value.
    ///
    /// # Example
    /// ```
    /// use tinydice::protocol::RespValue;
    /// use bytes::Bytes;
    /// let bulk = RespValue::bulk_string(Bytes::from("hello"));
    /// assert_eq!(bulk.serialize(), b"$5\r\nhello\r\n");
    /// ```
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    pub fn null() -> Self {
        RespValue::Null
    }

    /// `+OK\r\n`
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// `+PONG\r\n`
    pub fn pong() -> Self {
        RespValue::SimpleString("PONG".to_string())
    }

    /// Serializes the value to its wire representation.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the value into an existing buffer.
    ///
    /// Replies for a pipelined chunk are appended one after another into the
    /// same buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => {
                buf.extend_from_slice(&encode(s.as_bytes(), Framing::Simple));
            }
            RespValue::Error(s) => {
                buf.push(prefix::ERROR);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::Integer(n) => {
                buf.push(prefix::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::BulkString(data) => {
                buf.extend_from_slice(&encode(data, Framing::Bulk));
            }
            RespValue::Array(values) => {
                buf.push(prefix::ARRAY);
                buf.extend_from_slice(values.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for value in values {
                    value.serialize_into(buf);
                }
            }
            RespValue::Null => buf.extend_from_slice(NULL_BULK),
        }
    }

    /// Returns true if this value is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Borrows the payload of a bulk or simple string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespValue::BulkString(b) => Some(b),
            RespValue::SimpleString(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Consumes self and returns the inner array if this is an Array variant.
    pub fn into_array(self) -> Option<Vec<RespValue>> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "\"{}\"", s),
            RespValue::Error(s) => write!(f, "(error) {}", s),
            RespValue::Integer(n) => write!(f, "(integer) {}", n),
            RespValue::BulkString(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            RespValue::Null => write!(f, "(nil)"),
            RespValue::Array(values) => {
                if values.is_empty() {
                    return write!(f, "(empty array)");
                }
                for (i, v) in values.iter().enumerate() {
                    writeln!(f, "{}) {}", i + 1, v)?;
                }
                Ok(())
            }
        }
    }
}
