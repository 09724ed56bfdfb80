//! RESP Decoder
//!
//! Decoding works on exactly the bytes of one read. There is no buffering
//! across reads: a frame that is cut short decodes to
//! [`DecodeError::Incomplete`] and the connection engine drops the client.
//!
//! Every decode function returns the value together with the number of bytes
//! it consumed, so that arrays and pipelined input can advance through the
//! buffer one frame at a time.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while decoding RESP data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty input")]
    EmptyInput,

    /// The leading byte is not one of the five RESP markers
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// The frame ends before its declared size or terminator
    #[error("incomplete frame")]
    Incomplete,

    /// A length or count field has no digits or overflows
    #[error("invalid length field")]
    InvalidLength,

    #[error("invalid integer")]
    InvalidInteger,

    /// Invalid UTF-8 in a simple string or error message
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// A field is followed by something other than CRLF
    #[error("expected CRLF terminator")]
    MissingTerminator,

    #[error("maximum nesting depth exceeded: {0}")]
    NestingTooDeep(usize),
}

/// Result type for decoding operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

/// Decodes one RESP value from the front of `buf`.
///
/// Returns the value and the number of bytes it occupied.
///
/// # Example
/// ```
/// use tinydice::protocol::{decode, RespValue};
/// use bytes::Bytes;
///
/// let (value, consumed) = decode(b"$3\r\nabc\r\n").unwrap();
/// assert_eq!(value, RespValue::BulkString(Bytes::from("abc")));
/// assert_eq!(consumed, 9);
/// ```
pub fn decode(buf: &[u8]) -> DecodeResult<(RespValue, usize)> {
    decode_value(buf, 0)
}

/// Decodes every value in `buf`, in order.
///
/// This is how pipelined commands sent back-to-back in one packet are split.
/// Any malformed frame fails the whole batch.
pub fn decode_all(buf: &[u8]) -> DecodeResult<Vec<RespValue>> {
    if buf.is_empty() {
        return Err(DecodeError::EmptyInput);
    }

    let mut values = Vec::new();
    let mut pos = 0;
    while pos < buf.len() {
        let (value, consumed) = decode(&buf[pos..])?;
        values.push(value);
        pos += consumed;
    }
    Ok(values)
}

/// Reads an ASCII-decimal length field terminated by CRLF.
///
/// Digits are accumulated until the first non-digit byte, which must start
/// the CRLF terminator. The consumed count includes the terminator.
///
/// ```
/// use tinydice::protocol::read_length;
/// assert_eq!(read_length(b"12\r\nrest"), Ok((12, 4)));
/// ```
pub fn read_length(buf: &[u8]) -> DecodeResult<(usize, usize)> {
    let mut length: usize = 0;
    let mut pos = 0;

    while pos < buf.len() && buf[pos].is_ascii_digit() {
        length = length
            .checked_mul(10)
            .and_then(|l| l.checked_add(usize::from(buf[pos] - b'0')))
            .ok_or(DecodeError::InvalidLength)?;
        pos += 1;
    }

    if pos == buf.len() {
        return Err(DecodeError::Incomplete);
    }
    if pos == 0 {
        return Err(DecodeError::InvalidLength);
    }
    expect_crlf(&buf[pos..])?;

    Ok((length, pos + 2))
}

fn decode_value(buf: &[u8], depth: usize) -> DecodeResult<(RespValue, usize)> {
    let Some(&marker) = buf.first() else {
        return Err(DecodeError::EmptyInput);
    };

    match marker {
        prefix::SIMPLE_STRING => {
            let (s, consumed) = read_line(buf, "simple string")?;
            Ok((RespValue::SimpleString(s), consumed))
        }
        prefix::ERROR => {
            let (s, consumed) = read_line(buf, "error")?;
            Ok((RespValue::Error(s), consumed))
        }
        prefix::INTEGER => read_integer(buf),
        prefix::BULK_STRING => read_bulk_string(buf),
        prefix::ARRAY => read_array(buf, depth),
        other => Err(DecodeError::UnknownPrefix(other)),
    }
}

/// `+<text>\r\n` and `-<text>\r\n`
fn read_line(buf: &[u8], what: &'static str) -> DecodeResult<(String, usize)> {
    let end = find_crlf(&buf[1..]).ok_or(DecodeError::Incomplete)?;
    let text = std::str::from_utf8(&buf[1..1 + end]).map_err(|_| DecodeError::InvalidUtf8(what))?;
    Ok((text.to_string(), 1 + end + 2))
}

/// `:<digits>\r\n`, with an optional leading minus sign.
fn read_integer(buf: &[u8]) -> DecodeResult<(RespValue, usize)> {
    let mut pos = 1;
    let negative = buf.get(pos) == Some(&b'-');
    if negative {
        pos += 1;
    }

    let digits_start = pos;
    let mut value: i64 = 0;
    while pos < buf.len() && buf[pos].is_ascii_digit() {
        let digit = i64::from(buf[pos] - b'0');
        // Accumulate towards the sign so i64::MIN is representable.
        value = value
            .checked_mul(10)
            .and_then(|v| if negative { v.checked_sub(digit) } else { v.checked_add(digit) })
            .ok_or(DecodeError::InvalidInteger)?;
        pos += 1;
    }

    if pos == buf.len() {
        return Err(DecodeError::Incomplete);
    }
    if pos == digits_start {
        return Err(DecodeError::InvalidInteger);
    }
    expect_crlf(&buf[pos..]).map_err(|e| match e {
        DecodeError::MissingTerminator => DecodeError::InvalidInteger,
        e => e,
    })?;

    Ok((RespValue::Integer(value), pos + 2))
}

/// `$<length>\r\n<data>\r\n`, or `$-1\r\n` for null.
fn read_bulk_string(buf: &[u8]) -> DecodeResult<(RespValue, usize)> {
    if let Some(consumed) = read_null(buf) {
        return Ok((RespValue::Null, consumed));
    }

    let (length, delta) = read_length(&buf[1..])?;
    let start = 1 + delta;
    let end = start.checked_add(length).ok_or(DecodeError::InvalidLength)?;
    let total = end.checked_add(2).ok_or(DecodeError::InvalidLength)?;

    if buf.len() < total {
        return Err(DecodeError::Incomplete);
    }
    expect_crlf(&buf[end..])?;

    let data = Bytes::copy_from_slice(&buf[start..end]);
    Ok((RespValue::BulkString(data), total))
}

/// `*<count>\r\n<element>...`, or `*-1\r\n` for null.
fn read_array(buf: &[u8], depth: usize) -> DecodeResult<(RespValue, usize)> {
    if let Some(consumed) = read_null(buf) {
        return Ok((RespValue::Null, consumed));
    }
    if depth >= MAX_NESTING_DEPTH {
        return Err(DecodeError::NestingTooDeep(MAX_NESTING_DEPTH));
    }

    let (count, delta) = read_length(&buf[1..])?;
    let mut pos = 1 + delta;

    // Each element takes at least three bytes, so a count larger than that
    // cannot be satisfied by this buffer.
    if count > (buf.len() - pos) / 3 {
        return Err(DecodeError::Incomplete);
    }

    let mut elements = Vec::with_capacity(count);
    for _ in 0..count {
        let (element, consumed) = decode_value(&buf[pos..], depth + 1).map_err(|e| match e {
            DecodeError::EmptyInput => DecodeError::Incomplete,
            e => e,
        })?;
        elements.push(element);
        pos += consumed;
    }

    Ok((RespValue::Array(elements), pos))
}

/// Matches a `-1` length after the marker byte.
fn read_null(buf: &[u8]) -> Option<usize> {
    buf[1..].starts_with(b"-1\r\n").then_some(5)
}

fn expect_crlf(buf: &[u8]) -> DecodeResult<()> {
    match buf {
        [b'\r', b'\n', ..] => Ok(()),
        [] | [b'\r'] => Err(DecodeError::Incomplete),
        _ => Err(DecodeError::MissingTerminator),
    }
}

/// Returns the position of the `\r` of the first CRLF in `buf`.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}
