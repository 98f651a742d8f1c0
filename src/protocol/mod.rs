//! RESP Protocol Implementation
//!
//! This module implements the subset of the Redis Serialization Protocol the
//! proxy needs: the five classic frame kinds, an incremental parser for
//! responses arriving from backends, and byte-exact serialization back to
//! clients.
//!
//! ## Modules
//!
//! - `types`: the `RespValue` enum and wire serialization
//! - `parser`: incremental parser for buffered socket data
//! - `number`: ASCII-decimal integer codec used by length prefixes
//!
//! ## Example
//!
//! ```ignore
//! use shardis::protocol::{parse_frame, RespValue};
//! use bytes::Bytes;
//!
//! let (value, consumed) = parse_frame(b"$3\r\nbar\r\n").unwrap().unwrap();
//! assert_eq!(value, RespValue::bulk_string(Bytes::from("bar")));
//! assert_eq!(value.serialize(), b"$3\r\nbar\r\n");
//! ```

pub mod number;
pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{parse_frame, ParseError, ParseResult, RespParser};
pub use types::RespValue;
