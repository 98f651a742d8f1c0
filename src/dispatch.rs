//! Transaction Dispatcher
//!
//! The dispatcher is the single task that owns every backend connection.
//! Client sessions hand it work as [`Transaction`] envelopes over an mpsc
//! channel; it routes each command to a backend, performs the
//! write/read pair synchronously, and delivers the outcome on the
//! transaction's one-shot reply channel.
//!
//! Exactly one task ever reads the request channel, which gives two
//! properties for free:
//!
//! - each backend connection has at most one outstanding request, and
//!   responses pair with requests in order
//! - the buffered reader and writer of every backend need no locking
//!
//! Every transaction is answered exactly once, on every path: routing
//! failure, unhealthy backend, I/O failure, or success. A session that
//! submitted work can therefore always await its reply.

use crate::backend::{BackendConn, BackendError};
use crate::command::Command;
use crate::protocol::RespValue;
use crate::shard::ShardRouter;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// The outcome delivered to a waiting session.
pub type Reply = Result<RespValue, BackendError>;

/// One forwarded command coupled with its reply channel.
#[derive(Debug)]
pub struct Transaction {
    pub cmd: Command,
    pub reply: oneshot::Sender<Reply>,
}

/// Owns the backend connections and serializes access to them.
pub struct Dispatcher {
    requests: mpsc::Receiver<Transaction>,
    /// Backend names in configured order; position is the routing index
    names: Vec<String>,
    conns: HashMap<String, BackendConn>,
    router: ShardRouter,
}

impl Dispatcher {
    pub fn new(
        requests: mpsc::Receiver<Transaction>,
        names: Vec<String>,
        conns: HashMap<String, BackendConn>,
        router: ShardRouter,
    ) -> Self {
        debug_assert_eq!(names.len(), conns.len());
        Self {
            requests,
            names,
            conns,
            router,
        }
    }

    /// Drains the request channel until every sender is gone.
    pub async fn run(mut self) {
        while let Some(transaction) = self.requests.recv().await {
            let reply = self.dispatch(&transaction.cmd).await;
            if let Err(ref e) = reply {
                warn!(cmd = %transaction.cmd, error = %e, "dispatch failed");
            }
            // The session may have died while waiting; nothing to do then.
            let _ = transaction.reply.send(reply);
        }
        debug!("dispatcher stopped");
    }

    async fn dispatch(&mut self, cmd: &Command) -> Reply {
        let index = self.router.index(cmd, self.names.len());
        let name = &self.names[index];
        let conn = self
            .conns
            .get_mut(name)
            .ok_or(BackendError::AcquireFailure)?;

        if !conn.is_healthy() {
            return Err(BackendError::Unhealthy);
        }

        let result = forward(conn, cmd).await;
        match result {
            Ok(_) => conn.record_success(),
            Err(_) => {
                conn.record_failure();
                conn.mark_unhealthy();
            }
        }
        result
    }
}

async fn forward(conn: &mut BackendConn, cmd: &Command) -> Reply {
    conn.write_command(cmd).await?;
    let value = conn.read_response().await?;
    Ok(value)
}
