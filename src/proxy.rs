//! Proxy Supervisor
//!
//! Owns startup, the client registry, and shutdown.
//!
//! ## Startup sequence
//!
//! 1. Validate that at least one backend address is configured
//! 2. Bind the client listener
//! 3. Dial every configured backend concurrently; any handshake failure
//!    aborts startup before a single client is accepted
//! 4. Hand the connections to the dispatcher task
//! 5. Accept clients, one session task each
//!
//! The backend list keeps its configured order, and that order is the
//! routing index space: the same address list always produces the same
//! routes, across restarts.
//!
//! ## Shutdown
//!
//! Cancelling the root token stops the accept loop, fires every session's
//! child token, and lets the dispatcher drain: it exits when the last
//! transaction sender is dropped, taking the backend connections with it.

use crate::backend::{BackendConn, BackendError};
use crate::dispatch::{Dispatcher, Transaction};
use crate::session::{ClientSession, SessionHandle};
use crate::shard::ShardRouter;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Proxy configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listener bind address; a bare `:port` binds all interfaces
    pub addr: String,
    /// Backend endpoints; order determines the routing index space
    pub cluster_addrs: Vec<String>,
    /// Backend connect timeout
    pub dialer_timeout: Duration,
    /// Per-read deadline on backend sockets
    pub read_timeout: Duration,
    /// Per-write deadline on backend sockets
    pub write_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: ":6380".to_string(),
            cluster_addrs: vec!["localhost:6379".to_string()],
            dialer_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(180),
            write_timeout: Duration::from_secs(180),
        }
    }
}

impl Config {
    /// The address handed to the listener; `:6380` becomes `0.0.0.0:6380`.
    fn listen_addr(&self) -> String {
        if self.addr.starts_with(':') {
            format!("0.0.0.0{}", self.addr)
        } else {
            self.addr.clone()
        }
    }
}

/// Errors that abort proxy startup or the accept loop.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid cluster addrs")]
    NoBackends,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cluster node[{node}] error: {source}")]
    BackendConnect {
        node: String,
        #[source]
        source: BackendError,
    },

    #[error("backend dial task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Live client sessions, keyed by id.
///
/// Exists so shutdown can enumerate and close every session; removal also
/// runs when a session ends on its own.
pub(crate) struct ClientRegistry {
    clients: RwLock<HashMap<u64, CancellationToken>>,
}

impl ClientRegistry {
    fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a session. Fast path takes the read lock only: a duplicate
    /// id is a no-op. Ids are allocated monotonically, so duplicates do not
    /// occur in practice.
    pub(crate) fn add(&self, id: u64, token: CancellationToken) {
        {
            let clients = self.clients.read().unwrap();
            if clients.contains_key(&id) {
                return;
            }
        }
        let mut clients = self.clients.write().unwrap();
        clients.entry(id).or_insert(token);
    }

    /// Removes a session and fires its token.
    pub(crate) fn remove(&self, id: u64) {
        let mut clients = self.clients.write().unwrap();
        if let Some(token) = clients.remove(&id) {
            token.cancel();
        }
    }

    fn close_all(&self) {
        let mut clients = self.clients.write().unwrap();
        for (_, token) in clients.drain() {
            token.cancel();
        }
    }

    fn len(&self) -> usize {
        self.clients.read().unwrap().len()
    }
}

/// The proxy: listener, backend pool, dispatcher, and client sessions.
pub struct Proxy {
    config: Config,
    registry: Arc<ClientRegistry>,
    client_id_seq: AtomicU64,
    shutdown: CancellationToken,
    local_addr: OnceLock<SocketAddr>,
}

impl Proxy {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry: Arc::new(ClientRegistry::new()),
            client_id_seq: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            local_addr: OnceLock::new(),
        }
    }

    /// The bound listener address, available once startup has bound it.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Number of currently registered client sessions.
    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    /// Requests shutdown; `run` tears down and returns.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Runs the proxy until shutdown or a fatal error.
    pub async fn run(&self) -> Result<(), ProxyError> {
        if self.config.cluster_addrs.is_empty() {
            return Err(ProxyError::NoBackends);
        }

        let listener = TcpListener::bind(self.config.listen_addr()).await?;
        let addr = listener.local_addr()?;
        let _ = self.local_addr.set(addr);
        info!(%addr, "listening");

        let (names, conns) = self.connect_backends().await?;

        let (transactions, requests) = mpsc::channel::<Transaction>(1);
        let dispatcher = Dispatcher::new(requests, names, conns, ShardRouter::default());
        tokio::spawn(dispatcher.run());

        let result = self.accept_loop(listener, transactions).await;

        self.registry.close_all();
        info!("proxy stopped");
        result
    }

    /// Dials all configured backends concurrently.
    ///
    /// Results are collected in configured order, which fixes the routing
    /// index of each backend; the first failure aborts startup.
    async fn connect_backends(
        &self,
    ) -> Result<(Vec<String>, HashMap<String, BackendConn>), ProxyError> {
        let mut dials = Vec::with_capacity(self.config.cluster_addrs.len());
        for addr in &self.config.cluster_addrs {
            let addr = addr.clone();
            let config = self.config.clone();
            dials.push((
                addr.clone(),
                tokio::spawn(async move { BackendConn::connect(&addr, &config).await }),
            ));
        }

        let mut names = Vec::with_capacity(dials.len());
        let mut conns = HashMap::with_capacity(dials.len());
        let mut first_error = None;
        for (addr, dial) in dials {
            match dial.await? {
                Ok(conn) => {
                    info!(node = %addr, "cluster node connected");
                    names.push(addr.clone());
                    conns.insert(addr, conn);
                }
                Err(e) => {
                    error!(node = %addr, error = %e, "cluster node connect failed");
                    if first_error.is_none() {
                        first_error = Some(ProxyError::BackendConnect {
                            node: addr,
                            source: e,
                        });
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok((names, conns)),
        }
    }

    async fn accept_loop(
        &self,
        listener: TcpListener,
        transactions: mpsc::Sender<Transaction>,
    ) -> Result<(), ProxyError> {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    self.spawn_session(stream, peer, transactions.clone());
                }
                _ = self.shutdown.cancelled() => return Ok(()),
            }
        }
    }

    fn spawn_session(
        &self,
        stream: tokio::net::TcpStream,
        peer: SocketAddr,
        transactions: mpsc::Sender<Transaction>,
    ) {
        let id = self.client_id_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let token = self.shutdown.child_token();

        // Registered before the session task runs its first read.
        self.registry.add(id, token.clone());

        let handle = SessionHandle::new(transactions, Arc::clone(&self.registry));
        let session = ClientSession::new(id, stream, peer, handle, token);
        tokio::spawn(session.run());
    }
}
