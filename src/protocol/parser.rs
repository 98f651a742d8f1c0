//! Incremental RESP Frame Parser
//!
//! This module parses RESP frames out of a byte buffer fed by socket reads.
//! TCP is a stream protocol: a read may deliver half a frame, or several
//! frames at once, so the parser reports one of three outcomes:
//!
//! - `Ok(Some((value, consumed)))` - a complete frame was parsed, `consumed`
//!   bytes of the buffer belong to it
//! - `Ok(None)` - the buffered data is an incomplete frame, read more
//! - `Err(ParseError)` - the data violates the protocol
//!
//! The caller appends incoming bytes to its buffer, calls [`RespParser::parse`],
//! and on success advances the buffer by `consumed`. Nothing is consumed on
//! the incomplete path, so parsing simply resumes when more data arrives.
//!
//! ## Framing rules
//!
//! A frame starts with a tag line: one prefix byte, at least one payload
//! byte, and CRLF. Any line shorter than that is rejected as
//! "invalid response". Bulk strings and arrays then carry a length prefix
//! that decides how much more input belongs to the frame; `-1` encodes the
//! null bulk string and the null array respectively.

use crate::protocol::number;
use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Tag line too short to hold a prefix, a payload and CRLF
    #[error("invalid response")]
    InvalidLine,

    /// Unknown type prefix byte
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// A length or integer field that is not ASCII decimal
    #[error("invalid integer")]
    InvalidInteger,

    /// Bulk string length below -1
    #[error("invalid bulk string length")]
    InvalidBulkLength,

    /// Array length below -1
    #[error("invalid array length")]
    InvalidArrayLength,

    /// Error line without the `<kind> <message>` field shape
    #[error("invalid error response")]
    InvalidErrorLine,

    /// Payload data where CRLF was required
    #[error("missing trailing CRLF")]
    MissingCrlf,

    /// Invalid UTF-8 in a textual field
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// Request array with a count below 1
    #[error("command can't be empty")]
    EmptyCommand,

    /// Request element that does not start with `$`
    #[error("expected bulk string header")]
    ExpectedBulkHeader,

    /// Arrays nested beyond the supported depth
    #[error("maximum nesting depth exceeded")]
    DepthExceeded,

    /// A bulk string larger than the allowed maximum
    #[error("bulk string too large: {0} bytes")]
    BulkTooLarge(i64),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: i64 = 512 * 1024 * 1024;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

/// Shortest legal tag line: prefix byte, one payload byte, CRLF.
const MIN_LINE_LEN: usize = 4;

/// An incremental RESP frame parser.
///
/// # Example
///
/// ```ignore
/// use shardis::protocol::parser::RespParser;
/// use bytes::BytesMut;
///
/// let mut parser = RespParser::new();
/// let mut buffer = BytesMut::from(&b"$3\r\nbar\r\n"[..]);
///
/// if let Some((value, consumed)) = parser.parse(&buffer)? {
///     buffer.advance(consumed);
///     println!("Parsed: {:?}", value);
/// }
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    /// Current nesting depth (for array parsing)
    depth: usize,
}

impl RespParser {
    /// Creates a new parser instance.
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to parse one RESP frame from the buffer.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        self.depth = 0;
        self.parse_value(buf)
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::DepthExceeded);
        }

        let (line, consumed) = match read_line(buf)? {
            Some(line) => line,
            None => return Ok(None),
        };

        let payload = &line[1..];
        match line[0] {
            prefix::SIMPLE_STRING => {
                let s = as_text(payload, "simple string")?;
                Ok(Some((RespValue::SimpleString(s.to_string()), consumed)))
            }
            prefix::ERROR => {
                let value = parse_error_line(payload)?;
                Ok(Some((value, consumed)))
            }
            prefix::INTEGER => {
                // The byte form is kept verbatim; numeric reading is derived.
                let raw = Bytes::copy_from_slice(payload);
                Ok(Some((RespValue::Integer(raw), consumed)))
            }
            prefix::BULK_STRING => self.parse_bulk(buf, payload, consumed),
            prefix::ARRAY => self.parse_array(buf, payload, consumed),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// Parses the body of a bulk string after its `$<length>` tag line.
    fn parse_bulk(
        &mut self,
        buf: &[u8],
        len_payload: &[u8],
        tag_consumed: usize,
    ) -> ParseResult<Option<(RespValue, usize)>> {
        let length = number::decode(len_payload).ok_or(ParseError::InvalidBulkLength)?;

        if length == -1 {
            return Ok(Some((RespValue::NullBulkString, tag_consumed)));
        }
        if length < -1 {
            return Err(ParseError::InvalidBulkLength);
        }
        if length > MAX_BULK_SIZE {
            return Err(ParseError::BulkTooLarge(length));
        }

        let length = length as usize;
        let total = tag_consumed + length + 2;
        if buf.len() < total {
            return Ok(None);
        }
        if &buf[tag_consumed + length..total] != CRLF {
            return Err(ParseError::MissingCrlf);
        }

        let data = Bytes::copy_from_slice(&buf[tag_consumed..tag_consumed + length]);
        Ok(Some((RespValue::BulkString(data), total)))
    }

    /// Parses the children of an array after its `*<count>` tag line.
    fn parse_array(
        &mut self,
        buf: &[u8],
        count_payload: &[u8],
        tag_consumed: usize,
    ) -> ParseResult<Option<(RespValue, usize)>> {
        let count = number::decode(count_payload).ok_or(ParseError::InvalidArrayLength)?;

        if count == -1 {
            return Ok(Some((RespValue::NullArray, tag_consumed)));
        }
        if count < -1 {
            return Err(ParseError::InvalidArrayLength);
        }

        let count = count as usize;
        let mut elements = Vec::with_capacity(count.min(64));
        let mut consumed = tag_consumed;

        self.depth += 1;
        for _ in 0..count {
            match self.parse_value(&buf[consumed..])? {
                Some((value, element_consumed)) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                None => return Ok(None),
            }
        }
        self.depth -= 1;

        Ok(Some((RespValue::Array(elements), consumed)))
    }
}

/// Parses a single RESP frame from bytes.
///
/// Convenience wrapper around [`RespParser`] for one-shot use.
pub fn parse_frame(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}

/// Splits an error payload into `(kind, message)` on the first space.
fn parse_error_line(payload: &[u8]) -> ParseResult<RespValue> {
    let text = as_text(payload, "error line")?;
    let (kind, message) = text.split_once(' ').ok_or(ParseError::InvalidErrorLine)?;
    Ok(RespValue::Error {
        kind: kind.to_string(),
        message: message.to_string(),
    })
}

/// Reads one CRLF-terminated tag line from the front of the buffer.
///
/// Returns the line without its CRLF plus the bytes consumed, `None` when
/// the terminator has not arrived yet. Lines shorter than [`MIN_LINE_LEN`]
/// in total are rejected.
pub(crate) fn read_line(buf: &[u8]) -> ParseResult<Option<(&[u8], usize)>> {
    match find_crlf(buf) {
        Some(pos) => {
            let consumed = pos + 2;
            if consumed < MIN_LINE_LEN {
                return Err(ParseError::InvalidLine);
            }
            Ok(Some((&buf[..pos], consumed)))
        }
        None => Ok(None),
    }
}

pub(crate) fn as_text<'a>(bytes: &'a [u8], field: &'static str) -> ParseResult<&'a str> {
    std::str::from_utf8(bytes).map_err(|_| ParseError::InvalidUtf8(field))
}

/// Finds the position of the first CRLF in the buffer.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    for i in 0..buf.len().saturating_sub(1) {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' {
            return Some(i);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_string() {
        let (value, consumed) = parse_frame(b"+PONG\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::simple_string("PONG"));
        assert_eq!(consumed, 7);
    }

    #[test]
    fn test_parse_simple_string_incomplete() {
        assert!(parse_frame(b"+PON").unwrap().is_none());
        assert!(parse_frame(b"+PONG\r").unwrap().is_none());
    }

    #[test]
    fn test_parse_error() {
        let input = b"-WRONGTYPE Operation against a key holding the wrong kind of value\r\n";
        let (value, consumed) = parse_frame(input).unwrap().unwrap();
        assert_eq!(
            value,
            RespValue::error(
                "WRONGTYPE",
                "Operation against a key holding the wrong kind of value"
            )
        );
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_parse_error_single_field_rejected() {
        assert_eq!(
            parse_frame(b"-ERR\r\n"),
            Err(ParseError::InvalidErrorLine)
        );
    }

    #[test]
    fn test_parse_integer_verbatim() {
        let (value, _) = parse_frame(b":1000\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Integer(Bytes::from_static(b"1000")));
        assert_eq!(value.as_i64(), Some(1000));

        let (value, _) = parse_frame(b":-42\r\n").unwrap().unwrap();
        assert_eq!(value.as_i64(), Some(-42));

        // Leading zeros are not normalized away.
        let (value, _) = parse_frame(b":0099\r\n").unwrap().unwrap();
        assert_eq!(value.serialize(), b":0099\r\n");
    }

    #[test]
    fn test_parse_bulk_string() {
        let (value, consumed) = parse_frame(b"$5\r\nhello\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::bulk_string(Bytes::from("hello")));
        assert_eq!(consumed, 11);
    }

    #[test]
    fn test_parse_null_bulk_string() {
        let (value, consumed) = parse_frame(b"$-1\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::NullBulkString);
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_parse_empty_bulk_string() {
        let (value, consumed) = parse_frame(b"$0\r\n\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::bulk_string(Bytes::new()));
        assert_eq!(consumed, 6);
    }

    #[test]
    fn test_parse_negative_bulk_length_rejected() {
        assert_eq!(parse_frame(b"$-2\r\n"), Err(ParseError::InvalidBulkLength));
    }

    #[test]
    fn test_parse_bulk_string_incomplete() {
        assert!(parse_frame(b"$5\r\nhel").unwrap().is_none());
        assert!(parse_frame(b"$5\r\nhello").unwrap().is_none());
    }

    #[test]
    fn test_parse_binary_safe_bulk_string() {
        let (value, _) = parse_frame(b"$5\r\nhel\x00o\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::bulk_string(Bytes::from_static(b"hel\x00o")));
    }

    #[test]
    fn test_parse_array() {
        let (value, consumed) = parse_frame(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(
            value,
            RespValue::array(vec![
                RespValue::bulk_string(Bytes::from("GET")),
                RespValue::bulk_string(Bytes::from("foo")),
            ])
        );
        assert_eq!(consumed, 22);
    }

    #[test]
    fn test_parse_null_array() {
        let (value, _) = parse_frame(b"*-1\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::NullArray);
    }

    #[test]
    fn test_parse_empty_array() {
        let (value, _) = parse_frame(b"*0\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::array(vec![]));
    }

    #[test]
    fn test_parse_array_length_below_minus_one_rejected() {
        assert_eq!(parse_frame(b"*-3\r\n"), Err(ParseError::InvalidArrayLength));
    }

    #[test]
    fn test_parse_nested_array() {
        let (value, _) = parse_frame(b"*2\r\n:1\r\n*2\r\n:2\r\n:3\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(
            value,
            RespValue::array(vec![
                RespValue::integer(1),
                RespValue::array(vec![RespValue::integer(2), RespValue::integer(3)]),
            ])
        );
    }

    #[test]
    fn test_parse_array_incomplete_children() {
        assert!(parse_frame(b"*2\r\n$3\r\nGET\r\n").unwrap().is_none());
    }

    #[test]
    fn test_parse_array_child_error_aborts() {
        assert_eq!(
            parse_frame(b"*2\r\n$3\r\nGET\r\n$-2\r\n"),
            Err(ParseError::InvalidBulkLength)
        );
    }

    #[test]
    fn test_parse_mixed_array() {
        let (value, _) = parse_frame(b"*3\r\n+OK\r\n:100\r\n$5\r\nhello\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(
            value,
            RespValue::array(vec![
                RespValue::simple_string("OK"),
                RespValue::integer(100),
                RespValue::bulk_string(Bytes::from("hello")),
            ])
        );
    }

    #[test]
    fn test_short_line_rejected() {
        assert_eq!(parse_frame(b"+\r\n"), Err(ParseError::InvalidLine));
    }

    #[test]
    fn test_unknown_prefix_rejected() {
        assert_eq!(parse_frame(b"@foo\r\n"), Err(ParseError::UnknownPrefix(b'@')));
    }

    #[test]
    fn test_roundtrip() {
        let samples: Vec<RespValue> = vec![
            RespValue::simple_string("OK"),
            RespValue::error("ERR", "boom"),
            RespValue::integer(-7),
            RespValue::bulk_string(Bytes::from("value")),
            RespValue::bulk_string(Bytes::new()),
            RespValue::NullBulkString,
            RespValue::NullArray,
            RespValue::array(vec![]),
            RespValue::array(vec![
                RespValue::NullBulkString,
                RespValue::array(vec![
                    RespValue::integer(1),
                    RespValue::array(vec![RespValue::simple_string("deep")]),
                ]),
                RespValue::bulk_string(Bytes::from("tail")),
            ]),
        ];

        for original in samples {
            let wire = original.serialize();
            let (parsed, consumed) = parse_frame(&wire).unwrap().unwrap();
            assert_eq!(parsed, original);
            assert_eq!(consumed, wire.len());
        }
    }
}
