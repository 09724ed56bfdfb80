//! RESP Protocol Codec
//!
//! Stateless conversion between the Redis wire format and [`RespValue`].
//!
//! - `types`: the `RespValue` union, reply framing and serialization
//! - `parser`: `decode`, `decode_all` and the shared `read_length` routine
//!
//! ## Example
//!
//! ```
//! use tinydice::protocol::{decode, encode, Framing, RespValue};
//! use bytes::Bytes;
//!
//! let data = b"*2\r\n$3\r\nfoo\r\n:42\r\n";
//! let (value, consumed) = decode(data).unwrap();
//! assert_eq!(consumed, 19);
//! assert_eq!(
//!     value,
//!     RespValue::array(vec![RespValue::bulk_string(Bytes::from("foo")), RespValue::integer(42)])
//! );
//!
//! assert_eq!(encode(b"PONG", Framing::Simple), b"+PONG\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{decode, decode_all, read_length, DecodeError, DecodeResult};
pub use types::{encode, Framing, RespValue};
