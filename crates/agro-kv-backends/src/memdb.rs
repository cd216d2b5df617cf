//! In-memory KV store backed by a `BTreeMap`.
//!
//! This provides a fully functional [`KvEngine`] implementation suitable for
//! tests and single-process deployments. Read-write transactions are
//! serializable through optimistic concurrency control: every key read with
//! [`ReadOnlyTransaction::get`] (or scanned with `get_range`) joins the
//! transaction's read-conflict set, and commit fails with
//! `TransactionCode::CONFLICT` if any of those keys was written by a
//! transaction that committed after this one's read version.
//!
//! Snapshots are copy-on-write: a transaction holds an `Arc` of the map as of
//! its read version, and commits clone the map only while older snapshots are
//! still alive.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use agro_kv::{
    key_after, range_contains, GetRangeResult, KeySelector, KeyValue, KvEngine,
    ReadOnlyTransaction, ReadWriteTransaction,
};
use agro_types::{make_error_msg, Result, TransactionCode};

type Map = BTreeMap<Vec<u8>, Vec<u8>>;

// ---------------------------------------------------------------------------
// Fault injection
// ---------------------------------------------------------------------------

/// Failure mode injected into every transaction of a [`MemDbEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultInjection {
    #[default]
    None,
    /// Reads and commits fail with `TransactionCode::NETWORK_ERROR`, as if
    /// the substrate lost quorum. Nothing is applied.
    Unavailable,
    /// Commits are applied but report `TransactionCode::MAYBE_COMMITTED`,
    /// as if the reply was lost.
    CommitUnknownResult,
    /// Commits sleep for the given duration before applying.
    StallCommit(Duration),
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

struct Store {
    data: Arc<Map>,
    /// Last committed version that set or cleared each key.
    write_versions: BTreeMap<Vec<u8>, i64>,
    version: i64,
}

/// In-memory KV engine using a shared `BTreeMap`.
#[derive(Clone)]
pub struct MemDbEngine {
    store: Arc<RwLock<Store>>,
    fault: Arc<RwLock<FaultInjection>>,
}

impl MemDbEngine {
    /// Create a new, empty in-memory database.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(Store {
                data: Arc::new(Map::new()),
                write_versions: BTreeMap::new(),
                version: 0,
            })),
            fault: Arc::new(RwLock::new(FaultInjection::None)),
        }
    }

    /// Return the number of keys currently stored.
    pub fn len(&self) -> usize {
        self.store.read().data.len()
    }

    /// Return whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.store.read().data.is_empty()
    }

    /// Return the version of the latest commit.
    pub fn version(&self) -> i64 {
        self.store.read().version
    }

    /// Replace the injected failure mode. Affects transactions already open.
    pub fn set_fault(&self, fault: FaultInjection) {
        tracing::debug!(?fault, "memdb: fault injection changed");
        *self.fault.write() = fault;
    }

    fn snapshot(&self) -> MemDbReadOnlyTxn {
        let store = self.store.read();
        MemDbReadOnlyTxn {
            snapshot: Arc::clone(&store.data),
            read_version: store.version,
            fault: Arc::clone(&self.fault),
        }
    }
}

impl Default for MemDbEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl KvEngine for MemDbEngine {
    type RoTxn = MemDbReadOnlyTxn;
    type RwTxn = MemDbReadWriteTxn;

    fn create_readonly_transaction(&self) -> Self::RoTxn {
        self.snapshot()
    }

    fn create_readwrite_transaction(&self) -> Self::RwTxn {
        MemDbReadWriteTxn {
            ro: self.snapshot(),
            pending: BTreeMap::new(),
            conflicts: Mutex::new(ConflictSet::default()),
            store: Arc::clone(&self.store),
            committed_version: -1,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers: range bounds and collection
// ---------------------------------------------------------------------------

fn to_bounds(begin: &KeySelector, end: &KeySelector) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let start_bound = if begin.inclusive {
        Bound::Included(begin.key.clone())
    } else {
        Bound::Excluded(begin.key.clone())
    };

    let end_bound = if end.key.is_empty() {
        Bound::Unbounded
    } else if end.inclusive {
        Bound::Included(end.key.clone())
    } else {
        Bound::Excluded(end.key.clone())
    };

    (start_bound, end_bound)
}

/// Collect key-value pairs from `map` according to `begin` / `end` key
/// selectors. A `limit` of zero or less means "no limit". An empty end key
/// means "no upper bound".
fn collect_range(map: &Map, begin: &KeySelector, end: &KeySelector, limit: i32) -> GetRangeResult {
    let limit = if limit <= 0 { usize::MAX } else { limit as usize };
    let mut kvs = Vec::new();
    let mut has_more = false;

    for (k, v) in map.range(to_bounds(begin, end)) {
        if kvs.len() >= limit {
            has_more = true;
            break;
        }
        kvs.push(KeyValue {
            key: k.clone(),
            value: v.clone(),
        });
    }

    GetRangeResult { kvs, has_more }
}

fn check_available(fault: &RwLock<FaultInjection>) -> Result<()> {
    if *fault.read() == FaultInjection::Unavailable {
        return make_error_msg(TransactionCode::NETWORK_ERROR, "memdb: substrate unavailable");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Read-only transaction
// ---------------------------------------------------------------------------

/// Read-only transaction operating on a point-in-time snapshot.
pub struct MemDbReadOnlyTxn {
    snapshot: Arc<Map>,
    read_version: i64,
    fault: Arc<RwLock<FaultInjection>>,
}

#[async_trait]
impl ReadOnlyTransaction for MemDbReadOnlyTxn {
    fn read_version(&self) -> i64 {
        self.read_version
    }

    async fn snapshot_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        check_available(&self.fault)?;
        Ok(self.snapshot.get(key).cloned())
    }

    async fn snapshot_get_range(
        &self,
        begin: &KeySelector,
        end: &KeySelector,
        limit: i32,
    ) -> Result<GetRangeResult> {
        check_available(&self.fault)?;
        Ok(collect_range(&self.snapshot, begin, end, limit))
    }

    async fn cancel(&mut self) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Read-write transaction
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ConflictSet {
    keys: BTreeSet<Vec<u8>>,
    /// Half-open ranges `[begin, end)`; an empty end is unbounded.
    ranges: Vec<(Vec<u8>, Vec<u8>)>,
}

/// Read-write transaction that buffers writes and applies them atomically on
/// commit.
pub struct MemDbReadWriteTxn {
    /// The underlying read-only snapshot for reads.
    ro: MemDbReadOnlyTxn,
    /// Buffered mutations; `None` marks a clear.
    pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    /// Keys and ranges whose concurrent modification aborts this transaction.
    conflicts: Mutex<ConflictSet>,
    store: Arc<RwLock<Store>>,
    /// Version assigned after a successful commit; -1 if not yet committed.
    committed_version: i64,
}

impl MemDbReadWriteTxn {
    fn read_own(&self, key: &[u8]) -> Option<Option<Vec<u8>>> {
        self.pending.get(key).cloned()
    }

    /// Snapshot range with this transaction's own mutations overlaid.
    fn overlay_range(
        &self,
        begin: &KeySelector,
        end: &KeySelector,
        limit: i32,
    ) -> GetRangeResult {
        if self.pending.is_empty() {
            return collect_range(&self.ro.snapshot, begin, end, limit);
        }
        let bounds = to_bounds(begin, end);
        let mut merged: Map = self
            .ro
            .snapshot
            .range(bounds.clone())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (k, v) in self.pending.range(bounds) {
            match v {
                Some(v) => {
                    merged.insert(k.clone(), v.clone());
                }
                None => {
                    merged.remove(k);
                }
            }
        }
        collect_range(&merged, begin, end, limit)
    }

    fn conflict_with_later_writes(&self, store: &Store) -> Option<Vec<u8>> {
        let read_version = self.ro.read_version;
        let conflicts = self.conflicts.lock();

        for key in &conflicts.keys {
            if store
                .write_versions
                .get(key)
                .is_some_and(|v| *v > read_version)
            {
                return Some(key.clone());
            }
        }
        for (begin, end) in &conflicts.ranges {
            let hit = store
                .write_versions
                .range(begin.clone()..)
                .take_while(|(k, _)| range_contains(begin, end, k))
                .find(|(_, v)| **v > read_version);
            if let Some((k, _)) = hit {
                return Some(k.clone());
            }
        }
        None
    }
}

#[async_trait]
impl ReadOnlyTransaction for MemDbReadWriteTxn {
    fn read_version(&self) -> i64 {
        self.ro.read_version
    }

    async fn snapshot_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        check_available(&self.ro.fault)?;
        match self.read_own(key) {
            Some(own) => Ok(own),
            None => self.ro.snapshot_get(key).await,
        }
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value = self.snapshot_get(key).await?;
        self.conflicts.lock().keys.insert(key.to_vec());
        Ok(value)
    }

    async fn snapshot_get_range(
        &self,
        begin: &KeySelector,
        end: &KeySelector,
        limit: i32,
    ) -> Result<GetRangeResult> {
        check_available(&self.ro.fault)?;
        Ok(self.overlay_range(begin, end, limit))
    }

    async fn get_range(
        &self,
        begin: &KeySelector,
        end: &KeySelector,
        limit: i32,
    ) -> Result<GetRangeResult> {
        let result = self.snapshot_get_range(begin, end, limit).await?;

        let conflict_begin = if begin.inclusive {
            begin.key.clone()
        } else {
            key_after(&begin.key)
        };
        // A truncated scan only observed keys up to the last one returned.
        let conflict_end = match result.kvs.last() {
            Some(last) if result.has_more => key_after(&last.key),
            _ if end.inclusive && !end.key.is_empty() => key_after(&end.key),
            _ => end.key.clone(),
        };
        self.conflicts
            .lock()
            .ranges
            .push((conflict_begin, conflict_end));

        Ok(result)
    }

    async fn cancel(&mut self) -> Result<()> {
        self.pending.clear();
        *self.conflicts.lock() = ConflictSet::default();
        self.ro.cancel().await
    }
}

#[async_trait]
impl ReadWriteTransaction for MemDbReadWriteTxn {
    async fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.pending.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    async fn clear(&mut self, key: &[u8]) -> Result<()> {
        self.pending.insert(key.to_vec(), None);
        Ok(())
    }

    async fn add_read_conflict(&mut self, key: &[u8]) -> Result<()> {
        self.conflicts.lock().keys.insert(key.to_vec());
        Ok(())
    }

    async fn add_read_conflict_range(&mut self, begin: &[u8], end: &[u8]) -> Result<()> {
        self.conflicts
            .lock()
            .ranges
            .push((begin.to_vec(), end.to_vec()));
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let fault = *self.ro.fault.read();
        match fault {
            FaultInjection::Unavailable => {
                return make_error_msg(
                    TransactionCode::NETWORK_ERROR,
                    "memdb: substrate unavailable",
                );
            }
            FaultInjection::StallCommit(delay) => tokio::time::sleep(delay).await,
            FaultInjection::None | FaultInjection::CommitUnknownResult => {}
        }

        {
            let mut store = self.store.write();
            if let Some(key) = self.conflict_with_later_writes(&store) {
                tracing::trace!(key = %String::from_utf8_lossy(&key), "memdb: commit conflict");
                return make_error_msg(
                    TransactionCode::CONFLICT,
                    format!("conflict on key {}", String::from_utf8_lossy(&key)),
                );
            }

            let new_version = store.version + 1;
            let pending = std::mem::take(&mut self.pending);
            let data = Arc::make_mut(&mut store.data);
            let mut written = Vec::with_capacity(pending.len());
            for (key, value) in pending {
                match value {
                    Some(value) => {
                        data.insert(key.clone(), value);
                    }
                    None => {
                        data.remove(&key);
                    }
                }
                written.push(key);
            }
            for key in written {
                store.write_versions.insert(key, new_version);
            }
            store.version = new_version;
            self.committed_version = new_version;
        }

        if fault == FaultInjection::CommitUnknownResult {
            return make_error_msg(
                TransactionCode::MAYBE_COMMITTED,
                "memdb: commit reply lost",
            );
        }
        Ok(())
    }

    fn committed_version(&self) -> i64 {
        self.committed_version
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
