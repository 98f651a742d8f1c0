//! Client Sessions
//!
//! Each accepted client gets its own session task running a
//! receive/decode/submit/respond loop:
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        |
//!        v
//! 2. Registered, session task spawned
//!        |
//!        v
//! 3. loop:
//!      read bytes -> decode command -> submit transaction
//!                                            |
//!                                            v
//!                                  await single reply
//!                                            |
//!                                            v
//!                                  serialize + write response
//!        |
//!        v
//! 4. Any error, EOF, or shutdown -> de-register and drop the socket
//! ```
//!
//! The submit-then-await step is synchronous within the task, so a client
//! has at most one request in flight and receives responses in submission
//! order. Pipelined bytes are still accepted: completed commands already
//! in the buffer are drained one at a time before the next socket read.
//!
//! Sessions never see the supervisor. They hold a [`SessionHandle`], a
//! small capability that can submit a transaction and de-register its own
//! id, nothing more.

use crate::backend::BackendError;
use crate::command::{decode_command, Command};
use crate::dispatch::{Reply, Transaction};
use crate::protocol::{ParseError, RespValue};
use crate::proxy::ClientRegistry;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Maximum size of the per-client read buffer (64 KB)
const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Errors that end a client session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// I/O error on the client socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The client sent bytes that do not frame as a command
    #[error("{0}")]
    Parse(#[from] ParseError),

    /// The dispatcher reported a failure for this client's transaction
    #[error("{0}")]
    Backend(#[from] BackendError),

    /// The dispatcher is gone; the proxy is shutting down
    #[error("dispatcher closed")]
    DispatcherClosed,

    /// Client closed the connection between commands
    #[error("client disconnected")]
    Disconnected,

    /// Client closed the connection mid-command
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// The client exceeded the read buffer limit without completing a command
    #[error("session buffer limit exceeded")]
    BufferFull,
}

/// The capability a session holds instead of a supervisor reference.
///
/// Two operations: submit a command for dispatch, and remove the session's
/// own registration.
#[derive(Clone)]
pub struct SessionHandle {
    transactions: mpsc::Sender<Transaction>,
    registry: Arc<ClientRegistry>,
}

impl SessionHandle {
    pub(crate) fn new(
        transactions: mpsc::Sender<Transaction>,
        registry: Arc<ClientRegistry>,
    ) -> Self {
        Self {
            transactions,
            registry,
        }
    }

    /// Submits one command and awaits its reply.
    ///
    /// The reply channel is written exactly once by the dispatcher, so this
    /// resolves for every submitted transaction.
    pub async fn submit(&self, cmd: Command) -> Result<RespValue, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel::<Reply>();
        self.transactions
            .send(Transaction {
                cmd,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::DispatcherClosed)?;
        let reply = reply_rx.await.map_err(|_| SessionError::DispatcherClosed)?;
        Ok(reply?)
    }

    /// De-registers the given client id.
    pub fn close_self(&self, id: u64) {
        self.registry.remove(id);
    }
}

/// One connected client.
pub struct ClientSession {
    id: u64,
    stream: BufWriter<TcpStream>,
    addr: SocketAddr,
    buffer: BytesMut,
    handle: SessionHandle,
    shutdown: CancellationToken,
}

impl ClientSession {
    pub fn new(
        id: u64,
        stream: TcpStream,
        addr: SocketAddr,
        handle: SessionHandle,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            handle,
            shutdown,
        }
    }

    /// Runs the session to completion and de-registers it.
    pub async fn run(mut self) {
        info!(client = %self.addr, id = self.id, "client connected");

        let result = self.receive_loop().await;
        match &result {
            Ok(()) => debug!(client = %self.addr, id = self.id, "session closed"),
            Err(SessionError::Disconnected) => {
                debug!(client = %self.addr, id = self.id, "client disconnected")
            }
            Err(SessionError::Io(e)) if e.kind() == std::io::ErrorKind::ConnectionReset => {
                debug!(client = %self.addr, id = self.id, "connection reset by client")
            }
            Err(e) => {
                warn!(client = %self.addr, id = self.id, error = %e, "session error")
            }
        }

        self.handle.close_self(self.id);
    }

    async fn receive_loop(&mut self) -> Result<(), SessionError> {
        loop {
            // Drain every complete command already buffered before reading
            // again; one reply is written per command, in order.
            while let Some(cmd) = self.try_decode_command()? {
                trace!(client = %self.addr, cmd = %cmd, "dispatching");
                let response = self.handle.submit(cmd).await?;
                self.write_response(&response).await?;
            }

            tokio::select! {
                res = read_more(&mut self.stream, &mut self.buffer) => res?,
                _ = self.shutdown.cancelled() => return Ok(()),
            }
        }
    }

    fn try_decode_command(&mut self) -> Result<Option<Command>, SessionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        match decode_command(&self.buffer)? {
            Some((cmd, consumed)) => {
                let _ = self.buffer.split_to(consumed);
                Ok(Some(cmd))
            }
            None => Ok(None),
        }
    }

    async fn write_response(&mut self, response: &RespValue) -> Result<(), SessionError> {
        let bytes = response.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        trace!(client = %self.addr, bytes = bytes.len(), "sent response");
        Ok(())
    }
}

/// Reads more data from the client socket into the buffer.
async fn read_more(
    stream: &mut BufWriter<TcpStream>,
    buffer: &mut BytesMut,
) -> Result<(), SessionError> {
    if buffer.len() >= MAX_BUFFER_SIZE {
        return Err(SessionError::BufferFull);
    }
    if buffer.capacity() - buffer.len() < 1024 {
        buffer.reserve(4096);
    }

    let n = stream.get_mut().read_buf(buffer).await?;
    if n == 0 {
        if buffer.is_empty() {
            return Err(SessionError::Disconnected);
        }
        return Err(SessionError::UnexpectedEof);
    }
    Ok(())
}
