//! In-process coordination store backend
//!
//! Keeps the node tree under one mutex and hands out per-path
//! reader/writer locks with bounded acquisition. Faithful to the external
//! store's observable contract: sequence numbers are per-parent and
//! zero-padded to 10 digits, versions bump by one per set, child
//! enumeration is reverse-lexicographic (reverse creation order for
//! sequenced siblings), and held locks surface as `lock-`/`rlock-`
//! artifact children of the locked node.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::timeout;

use crate::common::{Error, Result};
use crate::store::{CoordinationStore, LockGuard, LockMode, NodeStat, StoreState, TxnOp};

#[derive(Debug, Default)]
struct Node {
    payload: Vec<u8>,
    version: u64,
    /// Next sequence number handed to a sequential child.
    next_seq: u64,
}

type Tree = BTreeMap<String, Node>;

/// In-memory store. Cheap to clone handles via [`Arc`].
pub struct MemoryStore {
    tree: Arc<Mutex<Tree>>,
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
    connected: AtomicBool,
    fail_next_txn: AtomicBool,
    endpoint: String,
}

impl MemoryStore {
    pub fn new() -> Self {
        let mut tree = Tree::new();
        // The namespace root always exists.
        tree.insert(String::new(), Node::default());
        Self {
            tree: Arc::new(Mutex::new(tree)),
            locks: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(true),
            fail_next_txn: AtomicBool::new(false),
            endpoint: "memory://local".to_string(),
        }
    }

    /// Simulate losing or regaining the store connection.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Fault hook: make the next transaction fail with no effect, so the
    /// rollback path of multi-node creation can be exercised.
    pub fn fail_next_transaction(&self) {
        self.fail_next_txn.store(true, Ordering::SeqCst);
    }

    fn check_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::StoreUnavailable)
        }
    }

    fn lock_cell(&self, path: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap();
        // Every holder and waiter keeps a strong handle, so a cell only the
        // map still references is dead and can be swept. Keeps the table
        // from growing with every path ever locked.
        locks.retain(|_, cell| Arc::strong_count(cell) > 1);
        locks.entry(path.to_string()).or_default().clone()
    }

    fn validate_path(path: &str) -> Result<()> {
        if !path.starts_with('/') || path.ends_with('/') || path.contains("//") {
            return Err(Error::MalformedRequest(format!("bad node path: {path}")));
        }
        Ok(())
    }

    fn parent_of(path: &str) -> &str {
        match path.rfind('/') {
            Some(idx) => &path[..idx],
            None => "",
        }
    }

    fn count_children(tree: &Tree, path: &str) -> usize {
        let prefix = format!("{path}/");
        tree.range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| !key[prefix.len()..].contains('/'))
            .count()
    }

    /// Create one node inside an already-locked tree.
    fn create_in(tree: &mut Tree, path: &str, payload: Vec<u8>, sequential: bool) -> Result<String> {
        let parent = Self::parent_of(path);
        if !tree.contains_key(parent) {
            return Err(Error::NoSuchNode(parent.to_string()));
        }

        let final_path = if sequential {
            let seq = {
                let parent_node = tree.get_mut(parent).unwrap();
                let seq = parent_node.next_seq;
                parent_node.next_seq += 1;
                seq
            };
            format!("{path}{seq:010}")
        } else {
            if tree.contains_key(path) {
                return Err(Error::NodeExists(path.to_string()));
            }
            path.to_string()
        };

        tree.insert(
            final_path.clone(),
            Node {
                payload,
                version: 0,
                next_seq: 0,
            },
        );
        Ok(final_path)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn create(&self, path: &str, payload: Vec<u8>, sequential: bool) -> Result<String> {
        self.check_connected()?;
        Self::validate_path(path)?;
        let mut tree = self.tree.lock().unwrap();
        Self::create_in(&mut tree, path, payload, sequential)
    }

    async fn get(&self, path: &str) -> Result<(Vec<u8>, NodeStat)> {
        self.check_connected()?;
        let tree = self.tree.lock().unwrap();
        let node = tree
            .get(path)
            .ok_or_else(|| Error::NoSuchNode(path.to_string()))?;
        Ok((
            node.payload.clone(),
            NodeStat {
                version: node.version,
                num_children: Self::count_children(&tree, path),
            },
        ))
    }

    async fn set(&self, path: &str, payload: Vec<u8>) -> Result<NodeStat> {
        self.check_connected()?;
        let mut tree = self.tree.lock().unwrap();
        let node = tree
            .get_mut(path)
            .ok_or_else(|| Error::NoSuchNode(path.to_string()))?;
        node.payload = payload;
        node.version += 1;
        let version = node.version;
        Ok(NodeStat {
            version,
            num_children: Self::count_children(&tree, path),
        })
    }

    async fn get_children(&self, path: &str) -> Result<Vec<String>> {
        self.check_connected()?;
        let tree = self.tree.lock().unwrap();
        if !tree.contains_key(path) {
            return Err(Error::NoSuchNode(path.to_string()));
        }
        let prefix = format!("{path}/");
        let mut names: Vec<String> = tree
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| !key[prefix.len()..].contains('/'))
            .map(|(key, _)| key[prefix.len()..].to_string())
            .collect();
        // Store-defined enumeration order: reverse creation order for
        // sequenced siblings.
        names.reverse();
        Ok(names)
    }

    async fn delete_recursive(&self, path: &str) -> Result<()> {
        self.check_connected()?;
        let mut tree = self.tree.lock().unwrap();
        if tree.remove(path).is_none() {
            return Err(Error::NoSuchNode(path.to_string()));
        }
        let prefix = format!("{path}/");
        let descendants: Vec<String> = tree
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in descendants {
            tree.remove(&key);
        }
        Ok(())
    }

    async fn ensure_path(&self, path: &str) -> Result<()> {
        self.check_connected()?;
        Self::validate_path(path)?;
        let mut tree = self.tree.lock().unwrap();
        let mut ancestor = String::new();
        for segment in path.split('/').skip(1) {
            ancestor.push('/');
            ancestor.push_str(segment);
            tree.entry(ancestor.clone()).or_default();
        }
        Ok(())
    }

    async fn transaction(&self, ops: Vec<TxnOp>) -> Result<Vec<String>> {
        self.check_connected()?;
        if self.fail_next_txn.swap(false, Ordering::SeqCst) {
            return Err(Error::StoreError("injected transaction failure".into()));
        }

        let mut tree = self.tree.lock().unwrap();

        // Validate every op against the live tree before touching it.
        for op in &ops {
            let TxnOp::Create {
                path, sequential, ..
            } = op;
            Self::validate_path(path)?;
            if !tree.contains_key(Self::parent_of(path)) {
                return Err(Error::StoreError(format!(
                    "transaction aborted, missing parent for {path}"
                )));
            }
            if !sequential && tree.contains_key(path.as_str()) {
                return Err(Error::StoreError(format!(
                    "transaction aborted, node exists: {path}"
                )));
            }
        }

        let mut created = Vec::with_capacity(ops.len());
        for op in ops {
            let TxnOp::Create {
                path,
                payload,
                sequential,
            } = op;
            // Cannot fail: validated above, tree locked throughout.
            created.push(Self::create_in(&mut tree, &path, payload, sequential)?);
        }
        Ok(created)
    }

    async fn lock(&self, path: &str, mode: LockMode, wait: Duration) -> Result<LockGuard> {
        self.check_connected()?;
        let cell = self.lock_cell(path);

        enum Held {
            Shared(tokio::sync::OwnedRwLockReadGuard<()>),
            Exclusive(tokio::sync::OwnedRwLockWriteGuard<()>),
        }

        let held = match mode {
            LockMode::Shared => timeout(wait, cell.read_owned()).await.map(Held::Shared),
            LockMode::Exclusive => timeout(wait, cell.write_owned()).await.map(Held::Exclusive),
        }
        .map_err(|_| Error::LockTimeout(path.to_string(), wait))?;

        // Surface the held lock as an artifact child, the way the external
        // store's lock recipe does. Absent nodes get no artifact; locking
        // them must not resurrect a deleted path.
        let artifact = {
            let mut tree = self.tree.lock().unwrap();
            if tree.contains_key(path) {
                let prefix = match mode {
                    LockMode::Shared => "rlock-",
                    LockMode::Exclusive => "lock-",
                };
                Some(Self::create_in(
                    &mut tree,
                    &format!("{path}/{prefix}"),
                    Vec::new(),
                    true,
                )?)
            } else {
                None
            }
        };

        let tree = Arc::clone(&self.tree);
        Ok(LockGuard::new(move || {
            if let Some(artifact) = artifact {
                // Gone already if the locked subtree was deleted.
                tree.lock().unwrap().remove(&artifact);
            }
            drop(held);
        }))
    }

    fn state(&self) -> StoreState {
        if self.connected.load(Ordering::SeqCst) {
            StoreState::Connected
        } else {
            StoreState::Disconnected
        }
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
