//! # Shardis - A Sharding TCP Proxy for the RESP Protocol
//!
//! Shardis sits between RESP-speaking clients and a set of backend storage
//! nodes. Every client command is routed to exactly one backend by a shard
//! key, forwarded, and its response relayed back byte-for-byte. Clients use
//! it like a single Redis server; the key space is spread across the
//! configured nodes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────────────────────────────┐
//! │  client  │──>│ session (decode command)                     │
//! └──────────┘   │     │                                        │
//! ┌──────────┐   │     v               ┌────────────────────┐   │
//! │  client  │──>│ transaction channel │     dispatcher     │   │
//! └──────────┘   │ ───────────────────>│                    │   │
//! ┌──────────┐   │                     │ route by shard key │   │
//! │  client  │──>│     one-shot        │ write cmd / read   │   │
//! └──────────┘   │ <─────────────────  │ response           │   │
//!                │     replies         └───┬────────┬───────┘   │
//!                └─────────────────────────┼────────┼───────────┘
//!                                          v        v
//!                                   ┌─────────┐ ┌─────────┐
//!                                   │ backend │ │ backend │
//!                                   └─────────┘ └─────────┘
//! ```
//!
//! Routing extracts a hash tag from the command's first parameter (the
//! bytes between `{` and `}`, or the whole key without a tag), hashes it
//! with MD5, and reduces the digest to an index into the configured backend
//! list. `{user1}:cart` and `{user1}:name` always land on the same node.
//!
//! ## Quick Start
//!
//! ```ignore
//! use shardis::{Config, Proxy};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config {
//!         addr: ":6380".to_string(),
//!         cluster_addrs: vec!["localhost:6379".to_string(), "localhost:6378".to_string()],
//!         ..Config::default()
//!     };
//!
//!     let proxy = Arc::new(Proxy::new(config));
//!     proxy.run().await.unwrap();
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP frame types, parser, and serialization
//! - [`command`]: decoded client commands and their wire form
//! - [`shard`]: hash-tag extraction and backend selection
//! - [`backend`]: backend connections and the PING/PONG handshake
//! - [`dispatch`]: the transaction dispatcher owning all backend I/O
//! - [`session`]: per-client receive loops
//! - [`proxy`]: configuration, startup, registries, shutdown
//!
//! ## What it does not do
//!
//! Shardis is not a Redis Cluster client. It does not follow MOVED/ASK
//! redirections, does not speak CLUSTER SLOTS, does not multiplex pipelined
//! requests onto a shared backend socket, and does not reconnect to a
//! backend that fails after startup. Commands pass through uninterpreted;
//! multi-key commands whose keys hash to different nodes are the client's
//! responsibility.

pub mod backend;
pub mod command;
pub mod dispatch;
pub mod protocol;
pub mod proxy;
pub mod session;
pub mod shard;

// Re-export commonly used types for convenience
pub use backend::{BackendConn, BackendError, CommandStats};
pub use command::{decode_command, Command};
pub use protocol::{parse_frame, ParseError, RespValue};
pub use proxy::{Config, Proxy, ProxyError};
pub use session::{ClientSession, SessionError, SessionHandle};
pub use shard::{HashTag, ShardRouter};

/// The default listener address
pub const DEFAULT_ADDR: &str = ":6380";

/// The default backend address
pub const DEFAULT_CLUSTER_ADDR: &str = "localhost:6379";

/// Version of Shardis
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
