//! Coordination store abstraction
//!
//! The data layer runs against a hierarchical namespace of versioned nodes
//! with atomic multi-create transactions and per-path shared/exclusive
//! locks. This module defines that interface; [`memory`] provides the
//! in-process backend used by tests and single-box deployments.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::Result;

/// Node metadata returned alongside reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStat {
    /// Monotonic payload version; starts at 0, +1 on every successful set.
    pub version: u64,
    /// Number of direct children, lock artifacts included.
    pub num_children: usize,
}

/// One operation inside an atomic multi-node transaction.
#[derive(Debug, Clone)]
pub enum TxnOp {
    Create {
        path: String,
        payload: Vec<u8>,
        sequential: bool,
    },
}

/// Lock flavor: shared locks admit each other, an exclusive lock admits
/// nobody.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Connection state of the store handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreState {
    Connected,
    Disconnected,
}

impl std::fmt::Display for StoreState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreState::Connected => write!(f, "connected"),
            StoreState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// A held lock. Releases on drop, whichever exit path drops it.
pub struct LockGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl LockGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").finish_non_exhaustive()
    }
}

/// Hierarchical namespace of versioned nodes.
///
/// Paths are `/`-separated, absolute. Sequential creation appends a
/// store-assigned zero-padded 10-digit counter to the final path segment,
/// so lexicographic and creation order coincide.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Create a node. With `sequential`, the final segment gets the next
    /// sequence number appended and the resulting path is returned.
    async fn create(&self, path: &str, payload: Vec<u8>, sequential: bool) -> Result<String>;

    /// Read a node's payload and stat.
    async fn get(&self, path: &str) -> Result<(Vec<u8>, NodeStat)>;

    /// Replace a node's payload, bumping its version.
    async fn set(&self, path: &str, payload: Vec<u8>) -> Result<NodeStat>;

    /// Names of a node's direct children. Order is store-defined; callers
    /// needing positional correspondence to creation order must treat it as
    /// reverse-creation-order.
    async fn get_children(&self, path: &str) -> Result<Vec<String>>;

    /// Delete a node and everything below it.
    async fn delete_recursive(&self, path: &str) -> Result<()>;

    /// Create the path and any missing ancestors, empty payloads.
    async fn ensure_path(&self, path: &str) -> Result<()>;

    /// Apply all operations or none. Returns the created paths in order.
    async fn transaction(&self, ops: Vec<TxnOp>) -> Result<Vec<String>>;

    /// Acquire a lock scoped to `path`, waiting at most `timeout`.
    ///
    /// While held on an existing node, a lock artifact appears among that
    /// node's children; readers filter artifacts by structural pattern.
    async fn lock(&self, path: &str, mode: LockMode, timeout: Duration) -> Result<LockGuard>;

    /// Current connection state.
    fn state(&self) -> StoreState;

    /// Store endpoint description, for the `status` operation.
    fn endpoint(&self) -> &str;
}
