//! Shard Routing
//!
//! Maps a command to a backend index. The shard key is taken from the
//! command's first parameter, narrowed by hash-tag extraction, hashed with
//! MD5, and reduced to an index by summing the digest bytes modulo the
//! backend count.
//!
//! Hash tags give clients control over co-location: `{user1}:cart` and
//! `{user1}:name` both route by `user1`, so multi-key flows for one entity
//! land on one backend. The delimiters are `{` and `}`, compatible with
//! Redis Cluster hash-tag semantics.
//!
//! Routing is a pure function of the key bytes and the ordered backend
//! list, so a restart with the same configured list yields the same routes.

use crate::command::Command;

/// Hash-tag delimiter pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashTag {
    left: u8,
    right: u8,
}

impl HashTag {
    /// Creates a tag with the given delimiter bytes.
    pub const fn new(left: u8, right: u8) -> Self {
        Self { left, right }
    }

    /// Extracts the shard key from a full key.
    ///
    /// Uses the bytes strictly between the first left delimiter and the
    /// first right delimiter when at least one byte lies between them;
    /// otherwise the whole key is the shard key. `{}` therefore does not
    /// count as a tag.
    pub fn extract<'a>(&self, key: &'a [u8]) -> &'a [u8] {
        let left = key.iter().position(|&b| b == self.left);
        let right = key.iter().position(|&b| b == self.right);
        match (left, right) {
            (Some(l), Some(r)) if r > l + 1 => &key[l + 1..r],
            _ => key,
        }
    }
}

impl Default for HashTag {
    fn default() -> Self {
        Self::new(b'{', b'}')
    }
}

/// Stateless router from commands to backend indexes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShardRouter {
    tag: HashTag,
}

impl ShardRouter {
    pub fn new(tag: HashTag) -> Self {
        Self { tag }
    }

    /// Returns the routing index for a command over `backend_count` backends.
    ///
    /// Commands without parameters route to index 0.
    pub fn index(&self, cmd: &Command, backend_count: usize) -> usize {
        debug_assert!(backend_count > 0);
        match cmd.shard_source() {
            Some(key) => self.index_for_key(key, backend_count),
            None => 0,
        }
    }

    /// Returns the routing index for a raw key.
    pub fn index_for_key(&self, key: &[u8], backend_count: usize) -> usize {
        let shard_key = self.tag.extract(key);
        let digest = md5::compute(shard_key);
        let total: usize = digest.iter().map(|&b| usize::from(b)).sum();
        total % backend_count
    }
}
