//! Cluster-wide monotonic counters for inode and volume ids.
//!
//! A counter is a single big-endian `u64` record holding the last id issued.
//! Allocation reads it with `get` (joining the read-conflict set), writes the
//! successor, and relies on commit-time conflict detection to serialize
//! concurrent allocators: of two transactions that read the same value, only
//! one commits.

use agro_kv::{ReadOnlyTransaction, ReadWriteTransaction};
use agro_types::{make_error_msg, MetaCode, Result, StatusCode};

use crate::key_prefix;

fn decode(key: &[u8], value: &[u8]) -> Result<u64> {
    match <[u8; 8]>::try_from(value) {
        Ok(bytes) => Ok(u64::from_be_bytes(bytes)),
        Err(_) => make_error_msg(
            StatusCode::DATA_CORRUPTION,
            format!(
                "counter {} holds {} bytes",
                String::from_utf8_lossy(key),
                value.len()
            ),
        ),
    }
}

/// Last id issued by the counter at `key`; 0 if none was.
pub async fn load_counter<T: ReadOnlyTransaction + ?Sized>(txn: &T, key: &[u8]) -> Result<u64> {
    match txn.get(key).await? {
        Some(value) => decode(key, &value),
        None => Ok(0),
    }
}

/// Write the initial state of every counter.
pub async fn init_counters(txn: &mut dyn ReadWriteTransaction) -> Result<()> {
    for key in [key_prefix::INODE_COUNTER_KEY, key_prefix::VOLUME_COUNTER_KEY] {
        txn.set(key, &0u64.to_be_bytes()).await?;
    }
    Ok(())
}

/// Stage the issue of the next id from the counter at `key`.
pub async fn next_id(txn: &mut dyn ReadWriteTransaction, key: &[u8]) -> Result<u64> {
    let last = load_counter(&*txn, key).await?;
    let Some(next) = last.checked_add(1) else {
        return make_error_msg(MetaCode::INODE_ID_ALLOC_FAILED, "id space exhausted");
    };
    txn.set(key, &next.to_be_bytes()).await?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agro_kv::KvEngine;
    use agro_kv_backends::MemDbEngine;

    #[tokio::test]
    async fn test_sequential_ids() {
        let engine = MemDbEngine::new();
        let mut txn = engine.create_readwrite_transaction();
        init_counters(&mut txn).await.unwrap();
        txn.commit().await.unwrap();

        for expected in 1..=3u64 {
            let mut txn = engine.create_readwrite_transaction();
            let id = next_id(&mut txn, key_prefix::INODE_COUNTER_KEY).await.unwrap();
            txn.commit().await.unwrap();
            assert_eq!(id, expected);
        }

        // The volume counter is independent.
        let mut txn = engine.create_readwrite_transaction();
        assert_eq!(next_id(&mut txn, key_prefix::VOLUME_COUNTER_KEY).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_allocators_conflict() {
        let engine = MemDbEngine::new();
        let mut t1 = engine.create_readwrite_transaction();
        let mut t2 = engine.create_readwrite_transaction();
        assert_eq!(next_id(&mut t1, key_prefix::INODE_COUNTER_KEY).await.unwrap(), 1);
        assert_eq!(next_id(&mut t2, key_prefix::INODE_COUNTER_KEY).await.unwrap(), 1);
        t1.commit().await.unwrap();
        assert_eq!(
            t2.commit().await.unwrap_err().code(),
            agro_types::TransactionCode::CONFLICT
        );
    }

    #[tokio::test]
    async fn test_exhausted_and_corrupt_counters() {
        let engine = MemDbEngine::new();
        let mut txn = engine.create_readwrite_transaction();
        txn.set(key_prefix::INODE_COUNTER_KEY, &u64::MAX.to_be_bytes())
            .await
            .unwrap();
        txn.set(key_prefix::VOLUME_COUNTER_KEY, b"abc").await.unwrap();

        let err = next_id(&mut txn, key_prefix::INODE_COUNTER_KEY).await.unwrap_err();
        assert_eq!(err.code(), MetaCode::INODE_ID_ALLOC_FAILED);
        let err = next_id(&mut txn, key_prefix::VOLUME_COUNTER_KEY).await.unwrap_err();
        assert_eq!(err.code(), StatusCode::DATA_CORRUPTION);
    }
}
