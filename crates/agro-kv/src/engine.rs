use crate::transaction::{ReadOnlyTransaction, ReadWriteTransaction};

/// Consistent substrate engine - creates transactions.
///
/// Read-write transactions must be serializable: a commit fails with
/// `TransactionCode::CONFLICT` when any key in its read-conflict set was
/// written by another transaction committed after its read version.
pub trait KvEngine: Send + Sync {
    type RoTxn: ReadOnlyTransaction;
    type RwTxn: ReadWriteTransaction;

    fn create_readonly_transaction(&self) -> Self::RoTxn;
    fn create_readwrite_transaction(&self) -> Self::RwTxn;
}
