//! Backend Connections
//!
//! One [`BackendConn`] per configured backend node, created at startup and
//! kept for the process lifetime. Establishment dials with a connect
//! timeout, enables TCP_NODELAY, and performs a PING/PONG handshake so a
//! node that is listening but not speaking RESP fails fast.
//!
//! After startup the connection is owned exclusively by the dispatcher
//! task, which interleaves exactly one write_command/read_response pair at
//! a time. There is no reconnection: the first I/O or framing failure
//! marks the connection unhealthy and every later use is refused.
//!
//! Each read and write is bounded by the configured timeout, applied per
//! operation.

use crate::command::Command;
use crate::protocol::{ParseError, RespParser, RespValue};
use crate::proxy::Config;
use bytes::BytesMut;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Initial capacity of the response read buffer
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Errors from backend establishment and I/O.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Network failure on dial, read, or write
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend sent bytes that do not frame as RESP
    #[error("{0}")]
    Parse(#[from] ParseError),

    /// The handshake PING did not come back as `+PONG`
    #[error("backend redis error: ping failure")]
    PingFailure,

    /// Dial did not complete within the configured timeout
    #[error("connect timeout")]
    ConnectTimeout,

    /// A read did not complete within the configured timeout
    #[error("read timeout")]
    ReadTimeout,

    /// A write did not complete within the configured timeout
    #[error("write timeout")]
    WriteTimeout,

    /// The backend closed the connection
    #[error("backend connection closed")]
    Closed,

    /// The connection failed earlier and is no longer usable
    #[error("backend connection unhealthy")]
    Unhealthy,

    /// The routed backend name is missing from the connection map
    #[error("acquire redis conn failure")]
    AcquireFailure,
}

/// Per-connection command counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandStats {
    pub total: u64,
    pub success: u64,
    pub failure: u64,
}

/// A single connection to one backend node.
#[derive(Debug)]
pub struct BackendConn {
    addr: String,
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
    parser: RespParser,
    read_timeout: Duration,
    write_timeout: Duration,
    healthy: bool,
    stats: CommandStats,
}

impl BackendConn {
    /// Dials a backend and performs the PING/PONG handshake.
    ///
    /// Fails with [`BackendError::PingFailure`] when the node answers the
    /// handshake with anything but `+PONG\r\n`.
    pub async fn connect(addr: &str, config: &Config) -> Result<Self, BackendError> {
        let stream = timeout(config.dialer_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| BackendError::ConnectTimeout)??;
        stream.set_nodelay(true)?;

        let mut conn = Self {
            addr: addr.to_string(),
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: RespParser::new(),
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            healthy: true,
            stats: CommandStats::default(),
        };

        conn.write_command(&Command::ping()).await?;
        match conn.read_response().await? {
            RespValue::SimpleString(state) if state == "PONG" => {
                debug!(backend = %conn.addr, "handshake complete");
                Ok(conn)
            }
            other => {
                debug!(backend = %conn.addr, reply = %other, "unexpected handshake reply");
                Err(BackendError::PingFailure)
            }
        }
    }

    /// The address this connection was dialed to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Serializes a command and writes it to the backend, flushing the
    /// buffer. Bounded by the write timeout.
    pub async fn write_command(&mut self, cmd: &Command) -> Result<(), BackendError> {
        let bytes = cmd.to_resp();
        trace!(backend = %self.addr, len = bytes.len(), "writing command");
        timeout(self.write_timeout, self.stream.write_all(&bytes))
            .await
            .map_err(|_| BackendError::WriteTimeout)??;
        timeout(self.write_timeout, self.stream.flush())
            .await
            .map_err(|_| BackendError::WriteTimeout)??;
        Ok(())
    }

    /// Reads and parses one RESP frame from the backend.
    ///
    /// Every socket read is bounded by the read timeout.
    pub async fn read_response(&mut self) -> Result<RespValue, BackendError> {
        loop {
            if !self.buffer.is_empty() {
                if let Some((value, consumed)) = self.parser.parse(&self.buffer)? {
                    let _ = self.buffer.split_to(consumed);
                    trace!(backend = %self.addr, consumed, "parsed response");
                    return Ok(value);
                }
            }

            let n = timeout(
                self.read_timeout,
                self.stream.get_mut().read_buf(&mut self.buffer),
            )
            .await
            .map_err(|_| BackendError::ReadTimeout)??;
            if n == 0 {
                return Err(BackendError::Closed);
            }
        }
    }

    /// Whether the connection is still usable.
    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    /// Takes the connection out of service after a failure.
    pub fn mark_unhealthy(&mut self) {
        self.healthy = false;
    }

    pub fn record_success(&mut self) {
        self.stats.total += 1;
        self.stats.success += 1;
    }

    pub fn record_failure(&mut self) {
        self.stats.total += 1;
        self.stats.failure += 1;
    }

    pub fn stats(&self) -> CommandStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const PING_WIRE: &[u8] = b"*1\r\n$4\r\nPING\r\n";

    /// Accepts one connection, answers the handshake with `handshake_reply`,
    /// then answers every further command with `reply`.
    async fn spawn_backend(handshake_reply: &'static [u8], reply: &'static [u8]) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let n = stream.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], PING_WIRE);
            stream.write_all(handshake_reply).await.unwrap();

            loop {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
                if stream.write_all(reply).await.is_err() {
                    return;
                }
            }
        });

        addr
    }

    #[tokio::test]
    async fn test_connect_handshake() {
        let addr = spawn_backend(b"+PONG\r\n", b"+OK\r\n").await;
        let conn = BackendConn::connect(&addr.to_string(), &Config::default())
            .await
            .unwrap();
        assert!(conn.is_healthy());
        assert_eq!(conn.addr(), addr.to_string());
    }

    #[tokio::test]
    async fn test_handshake_failure() {
        let addr = spawn_backend(b"+NOTPONG\r\n", b"+OK\r\n").await;
        let err = BackendConn::connect(&addr.to_string(), &Config::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::PingFailure));
        assert_eq!(err.to_string(), "backend redis error: ping failure");
    }

    #[tokio::test]
    async fn test_handshake_rejects_bulk_pong() {
        // Only a simple string counts for the handshake.
        let addr = spawn_backend(b"$4\r\nPONG\r\n", b"+OK\r\n").await;
        let err = BackendConn::connect(&addr.to_string(), &Config::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::PingFailure));
    }

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let addr = spawn_backend(b"+PONG\r\n", b"$3\r\nbar\r\n").await;
        let mut conn = BackendConn::connect(&addr.to_string(), &Config::default())
            .await
            .unwrap();

        conn.write_command(&Command::get("foo")).await.unwrap();
        let value = conn.read_response().await.unwrap();
        assert_eq!(value, RespValue::bulk_string(bytes::Bytes::from("bar")));
    }

    #[tokio::test]
    async fn test_read_on_closed_connection() {
        // A node that disappears right after its handshake.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 64];
            let _ = stream.read(&mut buf).await;
            let _ = stream.write_all(b"+PONG\r\n").await;
        });

        let mut conn = BackendConn::connect(&addr.to_string(), &Config::default())
            .await
            .unwrap();

        let _ = conn.write_command(&Command::get("a")).await;
        let err = conn.read_response().await.unwrap_err();
        assert!(matches!(err, BackendError::Closed | BackendError::Io(_)));
    }

    #[tokio::test]
    async fn test_stats_counters() {
        let addr = spawn_backend(b"+PONG\r\n", b"+OK\r\n").await;
        let mut conn = BackendConn::connect(&addr.to_string(), &Config::default())
            .await
            .unwrap();

        conn.record_success();
        conn.record_success();
        conn.record_failure();
        let stats = conn.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.success, 2);
        assert_eq!(stats.failure, 1);
    }
}
