//! RESP (Redis Serialization Protocol) Data Types
//!
//! This module defines the value type the proxy moves between clients and
//! backends, plus its wire serialization.
//!
//! ## Protocol Format
//!
//! Each RESP frame starts with a type prefix byte:
//! - `+` Simple String
//! - `-` Error
//! - `:` Integer
//! - `$` Bulk String
//! - `*` Array
//!
//! All frames are terminated with CRLF (`\r\n`).
//!
//! ## Examples
//!
//! Simple String: `+OK\r\n`
//! Error: `-ERR unknown command\r\n`
//! Integer: `:1000\r\n`
//! Bulk String: `$5\r\nhello\r\n`
//! Null Bulk String: `$-1\r\n`
//! Array: `*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`
//! Null Array: `*-1\r\n`
//!
//! Null bulk strings and null arrays are distinct variants here, not
//! zero-length payloads: `$-1\r\n` and `$0\r\n\r\n` are different values and
//! must survive a proxy hop unchanged.

use crate::protocol::number;
use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used in the RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A value in the RESP protocol.
///
/// The proxy never interprets these beyond framing; whatever a backend
/// returns is re-serialized byte-for-byte for the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Non-binary-safe string without interior CRLF.
    /// Format: `+<string>\r\n`
    SimpleString(String),

    /// An error reply, split into an error-type token and a message.
    /// Format: `-<kind> <message>\r\n`
    Error { kind: String, message: String },

    /// A signed integer, carried as its ASCII-decimal byte form.
    ///
    /// The byte form is authoritative: `:007\r\n` re-serializes as `:007\r\n`,
    /// not `:7\r\n`. The numeric value is derived via [`RespValue::as_i64`].
    Integer(Bytes),

    /// Binary-safe string. Format: `$<length>\r\n<data>\r\n`
    BulkString(Bytes),

    /// The null bulk string, `$-1\r\n`.
    NullBulkString,

    /// Ordered sequence of nested values, possibly empty.
    /// Format: `*<count>\r\n<element1><element2>...`
    Array(Vec<RespValue>),

    /// The null array, `*-1\r\n`.
    NullArray,
}

impl RespValue {
    /// Creates a simple string value.
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    /// Creates an error value from its type token and message.
    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        RespValue::Error {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Creates an integer value from a number, in minimal ASCII form.
    pub fn integer(n: i64) -> Self {
        RespValue::Integer(Bytes::from(number::encode(n)))
    }

    /// Creates a bulk string value.
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    /// Creates an array value.
    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    /// The numeric interpretation of an Integer value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RespValue::Integer(raw) => number::decode(raw),
            _ => None,
        }
    }

    /// Returns true if this value is an error reply.
    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error { .. })
    }

    /// Serializes the value to its wire form, including the final CRLF.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_frame(&mut buf);
        buf.extend_from_slice(CRLF);
        buf
    }

    /// Writes the frame body; the enclosing frame appends the final CRLF.
    ///
    /// Array children are emitted in their full serialized form except the
    /// last, whose trailing CRLF is suppressed because the enclosing frame
    /// supplies it. The result is byte-identical to standard RESP framing
    /// at every nesting depth.
    fn write_frame(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => {
                buf.push(prefix::SIMPLE_STRING);
                buf.extend_from_slice(s.as_bytes());
            }
            RespValue::Error { kind, message } => {
                buf.push(prefix::ERROR);
                buf.extend_from_slice(kind.as_bytes());
                buf.push(b' ');
                buf.extend_from_slice(message.as_bytes());
            }
            RespValue::Integer(raw) => {
                buf.push(prefix::INTEGER);
                buf.extend_from_slice(raw);
            }
            RespValue::BulkString(data) => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(&number::encode(data.len() as i64));
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
            }
            RespValue::NullBulkString => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(b"-1");
            }
            RespValue::Array(values) => {
                buf.push(prefix::ARRAY);
                if values.is_empty() {
                    buf.push(b'0');
                } else {
                    buf.extend_from_slice(&number::encode(values.len() as i64));
                    buf.extend_from_slice(CRLF);
                    let last = values.len() - 1;
                    for (i, value) in values.iter().enumerate() {
                        let child = value.serialize();
                        if i == last {
                            buf.extend_from_slice(&child[..child.len() - 2]);
                        } else {
                            buf.extend_from_slice(&child);
                        }
                    }
                }
            }
            RespValue::NullArray => {
                buf.push(prefix::ARRAY);
                buf.extend_from_slice(b"-1");
            }
        }
    }
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "\"{}\"", s),
            RespValue::Error { kind, message } => write!(f, "(error) {} {}", kind, message),
            RespValue::Integer(raw) => {
                write!(f, "(integer) {}", String::from_utf8_lossy(raw))
            }
            RespValue::BulkString(data) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    write!(f, "\"{}\"", s)
                } else {
                    write!(f, "(binary data, {} bytes)", data.len())
                }
            }
            RespValue::NullBulkString | RespValue::NullArray => write!(f, "(nil)"),
            RespValue::Array(values) => {
                if values.is_empty() {
                    write!(f, "(empty array)")
                } else {
                    writeln!(f)?;
                    for (i, v) in values.iter().enumerate() {
                        writeln!(f, "{}) {}", i + 1, v)?;
                    }
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_string_serialize() {
        let value = RespValue::simple_string("PONG");
        assert_eq!(value.serialize(), b"+PONG\r\n");
    }

    #[test]
    fn test_error_serialize() {
        let value = RespValue::error("ERR", "unknown command");
        assert_eq!(value.serialize(), b"-ERR unknown command\r\n");
    }

    #[test]
    fn test_integer_serialize() {
        assert_eq!(RespValue::integer(1000).serialize(), b":1000\r\n");
        assert_eq!(RespValue::integer(-42).serialize(), b":-42\r\n");
    }

    #[test]
    fn test_integer_bytes_are_authoritative() {
        // Leading zeros and odd signs survive a proxy hop verbatim.
        let value = RespValue::Integer(Bytes::from_static(b"007"));
        assert_eq!(value.serialize(), b":007\r\n");
        assert_eq!(value.as_i64(), Some(7));
    }

    #[test]
    fn test_bulk_string_serialize() {
        let value = RespValue::bulk_string(Bytes::from("hello"));
        assert_eq!(value.serialize(), b"$5\r\nhello\r\n");
    }

    #[test]
    fn test_empty_bulk_string_serialize() {
        let value = RespValue::bulk_string(Bytes::new());
        assert_eq!(value.serialize(), b"$0\r\n\r\n");
    }

    #[test]
    fn test_null_bulk_serialize() {
        assert_eq!(RespValue::NullBulkString.serialize(), b"$-1\r\n");
    }

    #[test]
    fn test_null_and_empty_array_serialize() {
        assert_eq!(RespValue::NullArray.serialize(), b"*-1\r\n");
        assert_eq!(RespValue::array(vec![]).serialize(), b"*0\r\n");
    }

    #[test]
    fn test_array_serialize() {
        let value = RespValue::array(vec![
            RespValue::bulk_string(Bytes::from("GET")),
            RespValue::bulk_string(Bytes::from("name")),
        ]);
        assert_eq!(value.serialize(), b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n");
    }

    #[test]
    fn test_nested_array_serialize() {
        let value = RespValue::array(vec![
            RespValue::integer(1),
            RespValue::array(vec![RespValue::integer(2), RespValue::integer(3)]),
        ]);
        assert_eq!(value.serialize(), b"*2\r\n:1\r\n*2\r\n:2\r\n:3\r\n");
    }

    #[test]
    fn test_deeply_nested_array_serialize() {
        // The trailing-CRLF handling at each level must compose: an array
        // whose last child is itself an array whose last child is an array.
        let value = RespValue::array(vec![
            RespValue::simple_string("a"),
            RespValue::array(vec![
                RespValue::simple_string("b"),
                RespValue::array(vec![RespValue::simple_string("c")]),
            ]),
        ]);
        assert_eq!(value.serialize(), b"*2\r\n+a\r\n*2\r\n+b\r\n*1\r\n+c\r\n");
    }

    #[test]
    fn test_array_with_nulls_serialize() {
        let value = RespValue::array(vec![
            RespValue::NullBulkString,
            RespValue::bulk_string(Bytes::from("x")),
            RespValue::NullArray,
        ]);
        assert_eq!(value.serialize(), b"*3\r\n$-1\r\n$1\r\nx\r\n*-1\r\n");
    }
}
