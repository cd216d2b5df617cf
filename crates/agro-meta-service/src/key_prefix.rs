//! Layout of the substrate keyspace.
//!
//! Directory records are stored under their flat key (see [`crate::path`]),
//! which always starts with a volume name. System records live under
//! `\xff/agro/`; a UTF-8 volume name never starts with byte `0xff`, so the two
//! spaces cannot collide.

use agro_kv::{prefix_list_end_key, KeySelector, KeyValue, ReadOnlyTransaction};
use agro_types::Result;

/// Prefix of every system record.
pub const SYSTEM_PREFIX: &[u8] = b"\xff/agro/";

/// The filesystem's `GlobalMetadata`; present once mkfs has committed.
pub const GLOBAL_METADATA_KEY: &[u8] = b"\xff/agro/global";

/// Last issued inode id, big-endian u64.
pub const INODE_COUNTER_KEY: &[u8] = b"\xff/agro/counter/inode";

/// Last issued volume id, big-endian u64.
pub const VOLUME_COUNTER_KEY: &[u8] = b"\xff/agro/counter/volume";

/// Prefix of the volume catalog: one record per volume name.
pub const VOLUME_PREFIX: &[u8] = b"\xff/agro/volume/";

pub fn volume_key(name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(VOLUME_PREFIX.len() + name.len());
    key.extend_from_slice(VOLUME_PREFIX);
    key.extend_from_slice(name.as_bytes());
    key
}

/// Every record under `prefix`, fetched `page` keys per range request.
pub async fn scan_prefix<T: ReadOnlyTransaction + ?Sized>(
    txn: &T,
    prefix: &[u8],
    page: i32,
) -> Result<Vec<KeyValue>> {
    let end = KeySelector::new(prefix_list_end_key(prefix), false);
    let mut begin = KeySelector::new(prefix, true);
    let mut records = Vec::new();
    loop {
        let batch = txn.get_range(&begin, &end, page).await?;
        let Some(last) = batch.kvs.last() else {
            return Ok(records);
        };
        begin = KeySelector::new(last.key.clone(), false);
        let has_more = batch.has_more;
        records.extend(batch.kvs);
        if !has_more {
            return Ok(records);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_keys_share_prefix() {
        for key in [GLOBAL_METADATA_KEY, INODE_COUNTER_KEY, VOLUME_COUNTER_KEY, VOLUME_PREFIX] {
            assert!(key.starts_with(SYSTEM_PREFIX));
        }
        assert!(volume_key("a").starts_with(VOLUME_PREFIX));
    }

    #[tokio::test]
    async fn test_scan_prefix_pages_through_everything() {
        use agro_kv::{KvEngine, ReadWriteTransaction};
        use agro_kv_backends::MemDbEngine;

        let engine = MemDbEngine::new();
        let mut txn = engine.create_readwrite_transaction();
        for i in 0..10 {
            txn.set(&volume_key(&format!("v{}", i)), b"x").await.unwrap();
        }
        txn.set(GLOBAL_METADATA_KEY, b"x").await.unwrap();
        txn.commit().await.unwrap();

        let ro = engine.create_readonly_transaction();
        for page in [1, 3, 10, 100] {
            let records = scan_prefix(&ro, VOLUME_PREFIX, page).await.unwrap();
            assert_eq!(records.len(), 10, "page {}", page);
        }
        assert!(scan_prefix(&ro, b"nothing", 4).await.unwrap().is_empty());
    }

    #[test]
    fn test_directory_keys_sort_before_system_keys() {
        let dir_key = crate::path::Path::root("\u{10ffff}").key();
        assert!(dir_key.as_bytes() < SYSTEM_PREFIX);
        assert!(std::str::from_utf8(SYSTEM_PREFIX).is_err());
    }
}
