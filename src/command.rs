//! Client Commands
//!
//! A [`Command`] is one decoded client request: a short ASCII name plus an
//! ordered list of binary-safe parameters. On the wire a command is an array
//! of bulk strings, `[name, params...]`; clients may also send a bare
//! `PING\r\n` outside the array form and it is accepted as a PING with no
//! parameters.
//!
//! The proxy does not interpret command semantics. The only field it looks
//! at is parameter 0, which serves as the shard key source for routing.
//!
//! The constructors at the bottom (`get`, `set`, ...) build well-formed
//! commands for tests and tooling; the proxy core itself only needs
//! [`Command::ping`] for the backend handshake.

use crate::protocol::number;
use crate::protocol::parser::{self, ParseError, ParseResult};
use crate::protocol::types::CRLF;
use bytes::Bytes;
use std::fmt;

/// One client request flowing through the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command name, e.g. `GET`
    pub name: String,
    /// Parameters following the name; parameter 0 is the shard key source
    pub params: Vec<Bytes>,
}

impl Command {
    /// Creates a command from a name and parameters.
    pub fn new(name: impl Into<String>, params: Vec<Bytes>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// The bytes routing derives the shard key from, when present.
    pub fn shard_source(&self) -> Option<&[u8]> {
        self.params.first().map(|p| p.as_ref())
    }

    /// Serializes the command as a RESP array of bulk strings.
    pub fn to_resp(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32);
        buf.push(b'*');
        buf.extend_from_slice(&number::encode(1 + self.params.len() as i64));
        buf.extend_from_slice(CRLF);
        write_bulk(&mut buf, self.name.as_bytes());
        for param in &self.params {
            write_bulk(&mut buf, param);
        }
        buf
    }

    // Convenience constructors, mirroring the redis commands they name.

    pub fn ping() -> Self {
        Self::new("PING", vec![])
    }

    pub fn get(key: impl Into<Bytes>) -> Self {
        Self::new("GET", vec![key.into()])
    }

    pub fn set(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self::new("SET", vec![key.into(), value.into()])
    }

    pub fn getset(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self::new("GETSET", vec![key.into(), value.into()])
    }

    pub fn incr(key: impl Into<Bytes>) -> Self {
        Self::new("INCR", vec![key.into()])
    }

    pub fn incr_by(key: impl Into<Bytes>, delta: i64) -> Self {
        Self::new("INCRBY", vec![key.into(), Bytes::from(number::encode(delta))])
    }

    pub fn decr(key: impl Into<Bytes>) -> Self {
        Self::new("DECR", vec![key.into()])
    }

    pub fn decr_by(key: impl Into<Bytes>, delta: i64) -> Self {
        Self::new("DECRBY", vec![key.into(), Bytes::from(number::encode(delta))])
    }

    pub fn mget(keys: impl IntoIterator<Item = impl Into<Bytes>>) -> Self {
        Self::new("MGET", keys.into_iter().map(Into::into).collect())
    }

    pub fn del(key: impl Into<Bytes>) -> Self {
        Self::new("DEL", vec![key.into()])
    }

    pub fn exists(key: impl Into<Bytes>) -> Self {
        Self::new("EXISTS", vec![key.into()])
    }

    pub fn lpush(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self::new("LPUSH", vec![key.into(), value.into()])
    }

    pub fn rpush(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self::new("RPUSH", vec![key.into(), value.into()])
    }

    pub fn lpop(key: impl Into<Bytes>) -> Self {
        Self::new("LPOP", vec![key.into()])
    }

    pub fn rpop(key: impl Into<Bytes>) -> Self {
        Self::new("RPOP", vec![key.into()])
    }

    pub fn lrange(key: impl Into<Bytes>, start: i64, stop: i64) -> Self {
        Self::new(
            "LRANGE",
            vec![
                key.into(),
                Bytes::from(number::encode(start)),
                Bytes::from(number::encode(stop)),
            ],
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for param in &self.params {
            write!(f, " {}", String::from_utf8_lossy(param))?;
        }
        Ok(())
    }
}

fn write_bulk(buf: &mut Vec<u8>, data: &[u8]) {
    buf.push(b'$');
    buf.extend_from_slice(&number::encode(data.len() as i64));
    buf.extend_from_slice(CRLF);
    buf.extend_from_slice(data);
    buf.extend_from_slice(CRLF);
}

/// Attempts to decode one client command from the front of the buffer.
///
/// Returns `Ok(Some((command, consumed)))` on a complete request,
/// `Ok(None)` when more data is needed, and an error on protocol
/// violations. A bare `PING\r\n` line decodes as a PING with no
/// parameters; everything else must be an array of bulk strings with at
/// least one element.
pub fn decode_command(buf: &[u8]) -> ParseResult<Option<(Command, usize)>> {
    let (line, mut consumed) = match parser::read_line(buf)? {
        Some(line) => line,
        None => return Ok(None),
    };

    // Some clients send PING outside the array form.
    if line == b"PING" {
        return Ok(Some((Command::ping(), consumed)));
    }

    if line[0] != b'*' {
        return Err(ParseError::UnknownPrefix(line[0]));
    }
    let count = number::decode(&line[1..]).ok_or(ParseError::InvalidInteger)?;
    if count < 1 {
        return Err(ParseError::EmptyCommand);
    }

    let mut args: Vec<Bytes> = Vec::with_capacity((count as usize).min(64));
    for _ in 0..count {
        match decode_arg(&buf[consumed..])? {
            Some((arg, arg_consumed)) => {
                args.push(arg);
                consumed += arg_consumed;
            }
            None => return Ok(None),
        }
    }

    let name = parser::as_text(&args[0], "command name")?.to_string();
    let params = args.split_off(1);
    Ok(Some((Command::new(name, params), consumed)))
}

/// Decodes one `$<len>\r\n<data>\r\n` request element.
fn decode_arg(buf: &[u8]) -> ParseResult<Option<(Bytes, usize)>> {
    let (line, consumed) = match parser::read_line(buf)? {
        Some(line) => line,
        None => return Ok(None),
    };
    if line[0] != b'$' {
        return Err(ParseError::ExpectedBulkHeader);
    }
    let len = number::decode(&line[1..]).ok_or(ParseError::InvalidBulkLength)?;
    if len < 0 {
        return Err(ParseError::InvalidBulkLength);
    }

    let len = len as usize;
    let total = consumed + len + 2;
    if buf.len() < total {
        return Ok(None);
    }
    if &buf[consumed + len..total] != CRLF {
        return Err(ParseError::MissingCrlf);
    }
    Ok(Some((
        Bytes::copy_from_slice(&buf[consumed..consumed + len]),
        total,
    )))
}
