use async_trait::async_trait;
use agro_types::Result;

/// Key-value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Key selector for range queries.
#[derive(Debug, Clone)]
pub struct KeySelector {
    pub key: Vec<u8>,
    pub inclusive: bool,
}

impl KeySelector {
    pub fn new(key: impl Into<Vec<u8>>, inclusive: bool) -> Self {
        Self {
            key: key.into(),
            inclusive,
        }
    }
}

/// Result of a range query.
#[derive(Debug, Default)]
pub struct GetRangeResult {
    pub kvs: Vec<KeyValue>,
    pub has_more: bool,
}

/// Read-only transaction trait.
///
/// All reads of one transaction observe the same read version.
#[async_trait]
pub trait ReadOnlyTransaction: Send + Sync {
    /// Version of the substrate state this transaction reads from.
    fn read_version(&self) -> i64;

    /// Read a key without adding it to the read-conflict set.
    async fn snapshot_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Read a key; read-write transactions add it to the read-conflict set.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.snapshot_get(key).await
    }

    async fn snapshot_get_range(
        &self,
        begin: &KeySelector,
        end: &KeySelector,
        limit: i32,
    ) -> Result<GetRangeResult>;

    async fn get_range(
        &self,
        begin: &KeySelector,
        end: &KeySelector,
        limit: i32,
    ) -> Result<GetRangeResult> {
        self.snapshot_get_range(begin, end, limit).await
    }

    async fn cancel(&mut self) -> Result<()>;
}

/// Read-write transaction trait.
#[async_trait]
pub trait ReadWriteTransaction: ReadOnlyTransaction {
    async fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    async fn clear(&mut self, key: &[u8]) -> Result<()>;

    async fn add_read_conflict(&mut self, key: &[u8]) -> Result<()>;

    async fn add_read_conflict_range(&mut self, begin: &[u8], end: &[u8]) -> Result<()>;

    /// Atomically apply all buffered mutations.
    ///
    /// Fails with `TransactionCode::CONFLICT` (nothing applied), with
    /// `TransactionCode::NETWORK_ERROR` (nothing applied) or with
    /// `TransactionCode::MAYBE_COMMITTED` (outcome unknown).
    async fn commit(&mut self) -> Result<()>;

    /// Version assigned by a successful commit, -1 before that.
    fn committed_version(&self) -> i64;
}
