//! Local mirror of the server's state tree
//!
//! The `SnapshotStore` holds the one shared copy of the tree plus its
//! revision counter. Patches come in through [`SnapshotStore::apply`];
//! everything else only reads. Path-scoped subscriptions are served through
//! watch channels, so a slow reader sees the latest committed value rather
//! than an unbounded backlog (conflation, never reordering).

mod bootstrap;
mod error;

pub use bootstrap::{Bootstrapper, Snapshot};
pub use error::{StoreError, StoreResult};

use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use crate::patch::{PatchBatch, PatchOp, Revision};
use crate::path::TreePath;

/// In-memory mirror of the server's data tree
///
/// The tree is immutable per revision: an incremental batch is applied to a
/// working copy and committed only if every operation resolves, so a
/// rejected batch leaves no trace.
pub struct SnapshotStore {
    inner: RwLock<CacheInner>,
    watchers: Mutex<Vec<WatcherSlot>>,
}

struct CacheInner {
    revision: Revision,
    data: Value,
}

struct WatcherSlot {
    path: TreePath,
    tx: watch::Sender<Value>,
}

impl SnapshotStore {
    /// Create an empty store at revision 0
    pub fn new() -> Self {
        Self::from_snapshot(Snapshot::empty())
    }

    /// Create a store seeded from a restored snapshot
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            inner: RwLock::new(CacheInner {
                revision: snapshot.revision,
                data: snapshot.data,
            }),
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// Current revision counter
    pub fn revision(&self) -> Revision {
        self.read_inner().revision
    }

    /// Synchronous snapshot read of the subtree at `path`
    ///
    /// Returns `None` when the path does not resolve.
    pub fn read(&self, path: &TreePath) -> Option<Value> {
        path.resolve(&self.read_inner().data).cloned()
    }

    /// Full point-in-time copy of the tree, for persistence
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.read_inner();
        Snapshot::at(inner.revision, inner.data.clone())
    }

    /// Apply one patch batch atomically
    ///
    /// Every watcher whose path intersects a changed path is notified with
    /// the new subtree before this returns. Rejections leave the tree and
    /// revision untouched.
    pub fn apply(&self, batch: PatchBatch) -> StoreResult<Revision> {
        let mut inner = self.write_inner();

        let changed: Vec<TreePath> = match batch {
            PatchBatch::Dump { revision, data } => {
                if revision < inner.revision {
                    return Err(StoreError::StaleRevision {
                        expected: inner.revision,
                        found: revision,
                    });
                }
                inner.revision = revision;
                inner.data = data;
                vec![TreePath::root()]
            }
            PatchBatch::Patch { base, ops } => {
                if base != inner.revision {
                    return Err(StoreError::StaleRevision {
                        expected: inner.revision,
                        found: base,
                    });
                }
                let mut next = inner.data.clone();
                let mut changed = Vec::with_capacity(ops.len());
                for op in ops {
                    changed.push(op.path().clone());
                    apply_op(&mut next, op)?;
                }
                inner.data = next;
                inner.revision = base + 1;
                changed
            }
        };

        let revision = inner.revision;
        debug!(revision, changes = changed.len(), "patch applied");
        self.notify(&inner, &changed);
        Ok(revision)
    }

    /// Subscribe to the subtree at `path`
    ///
    /// The watcher yields the current value immediately, then a new value
    /// for every committed batch that intersects `path`. Each call is an
    /// independent subscription with its own delivery timing.
    pub fn watch(&self, path: TreePath) -> StoreWatcher {
        let inner = self.read_inner();
        let current = path.resolve(&inner.data).cloned().unwrap_or(Value::Null);

        let (tx, mut rx) = watch::channel(current);
        // First recv on the new subscription yields the value seeded above.
        rx.mark_changed();

        let mut watchers = self.watchers.lock().unwrap_or_else(PoisonError::into_inner);
        watchers.push(WatcherSlot {
            path: path.clone(),
            tx,
        });
        drop(watchers);
        drop(inner);

        StoreWatcher { path, rx }
    }

    fn notify(&self, inner: &CacheInner, changed: &[TreePath]) {
        let mut watchers = self.watchers.lock().unwrap_or_else(PoisonError::into_inner);
        watchers.retain(|slot| !slot.tx.is_closed());
        for slot in watchers.iter() {
            if changed.iter().any(|path| path.intersects(&slot.path)) {
                let subtree = slot
                    .path
                    .resolve(&inner.data)
                    .cloned()
                    .unwrap_or(Value::Null);
                let _ = slot.tx.send(subtree);
            }
        }
    }

    fn read_inner(&self) -> RwLockReadGuard<'_, CacheInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_inner(&self) -> RwLockWriteGuard<'_, CacheInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Path-scoped subscription handle
///
/// Dropping the watcher tears down the subscription; nothing else is
/// affected.
pub struct StoreWatcher {
    path: TreePath,
    rx: watch::Receiver<Value>,
}

impl StoreWatcher {
    /// The path this subscription is scoped to
    pub fn path(&self) -> &TreePath {
        &self.path
    }

    /// The most recently delivered value, without waiting
    pub fn current(&self) -> Value {
        self.rx.borrow().clone()
    }

    /// Whether a new value is ready without waiting
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// Wait for the next value
    ///
    /// Returns the current value on the first call, then one value per
    /// intersecting committed batch (conflated to the latest). `None` once
    /// the store has been dropped.
    pub async fn next(&mut self) -> Option<Value> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

fn apply_op(tree: &mut Value, op: PatchOp) -> StoreResult<()> {
    match op {
        PatchOp::Add { path, value } => {
            let (Some(parent_path), Some(key)) = (path.parent(), path.last()) else {
                // add at the root replaces the whole tree
                *tree = value;
                return Ok(());
            };
            let parent = parent_path
                .resolve_mut(tree)
                .ok_or_else(|| StoreError::malformed(&path, "parent path does not resolve"))?;
            match parent {
                Value::Object(map) => {
                    map.insert(key.to_string(), value);
                }
                Value::Array(items) => {
                    if key == "-" {
                        items.push(value);
                    } else {
                        let index: usize = key
                            .parse()
                            .map_err(|_| StoreError::malformed(&path, "array index expected"))?;
                        if index > items.len() {
                            return Err(StoreError::malformed(&path, "array index out of bounds"));
                        }
                        items.insert(index, value);
                    }
                }
                _ => return Err(StoreError::malformed(&path, "parent is not a container")),
            }
            Ok(())
        }
        PatchOp::Replace { path, value } => {
            let target = path
                .resolve_mut(tree)
                .ok_or_else(|| StoreError::malformed(&path, "path does not resolve"))?;
            *target = value;
            Ok(())
        }
        PatchOp::Remove { path } => {
            let (Some(parent_path), Some(key)) = (path.parent(), path.last()) else {
                return Err(StoreError::malformed(&path, "cannot remove the root"));
            };
            let parent = parent_path
                .resolve_mut(tree)
                .ok_or_else(|| StoreError::malformed(&path, "parent path does not resolve"))?;
            match parent {
                Value::Object(map) => {
                    map.remove(key)
                        .ok_or_else(|| StoreError::malformed(&path, "no such key"))?;
                }
                Value::Array(items) => {
                    let index: usize = key
                        .parse()
                        .map_err(|_| StoreError::malformed(&path, "array index expected"))?;
                    if index >= items.len() {
                        return Err(StoreError::malformed(&path, "array index out of bounds"));
                    }
                    items.remove(index);
                }
                _ => return Err(StoreError::malformed(&path, "parent is not a container")),
            }
            Ok(())
        }
    }
}
