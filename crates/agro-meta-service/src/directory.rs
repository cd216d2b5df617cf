//! Directory records and their KV persistence.
//!
//! A directory record maps entry names to either a file content reference or
//! a sub-directory marker. It is stored as JSON under the directory's flat key.

use std::collections::BTreeMap;

use agro_kv::{ReadOnlyTransaction, ReadWriteTransaction};
use agro_types::{InodeId, Result, Status, StatusCode, VolumeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::path::Path;

/// Reference to a content object in the block layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct INodeRef {
    pub volume: VolumeId,
    pub inode: InodeId,
}

impl INodeRef {
    pub fn new(volume: VolumeId, inode: InodeId) -> Self {
        Self { volume, inode }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirEntry {
    File(INodeRef),
    Directory,
}

impl DirEntry {
    pub fn is_directory(&self) -> bool {
        matches!(self, DirEntry::Directory)
    }

    pub fn inode(&self) -> Option<INodeRef> {
        match self {
            DirEntry::File(r) => Some(*r),
            DirEntry::Directory => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirMetadata {
    pub mode: u32,
    pub ctime: DateTime<Utc>,
}

impl Default for DirMetadata {
    fn default() -> Self {
        Self {
            mode: 0o755,
            ctime: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    pub metadata: DirMetadata,
    #[serde(default)]
    pub entries: BTreeMap<String, DirEntry>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&DirEntry> {
        self.entries.get(name)
    }

    /// Names of the sub-directory markers, in order.
    pub fn subdirectories(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, e)| e.is_directory())
            .map(|(name, _)| name.as_str())
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, INodeRef)> {
        self.entries
            .iter()
            .filter_map(|(name, e)| e.inode().map(|r| (name.as_str(), r)))
    }

    pub fn pack(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            Status::with_message(
                StatusCode::DATA_CORRUPTION,
                format!("failed to serialize directory: {}", e),
            )
        })
    }

    pub fn unpack(value: &[u8]) -> Result<Self> {
        serde_json::from_slice(value).map_err(|e| {
            Status::with_message(
                StatusCode::DATA_CORRUPTION,
                format!("failed to deserialize directory: {}", e),
            )
        })
    }

    /// Load the record `path` addresses, adding its key to the read-conflict
    /// set of read-write transactions.
    pub async fn load<T: ReadOnlyTransaction + ?Sized>(
        txn: &T,
        path: &Path,
    ) -> Result<Option<Self>> {
        match txn.get(path.key().as_bytes()).await? {
            Some(value) => Ok(Some(Self::unpack(&value)?)),
            None => Ok(None),
        }
    }

    pub async fn store(&self, txn: &mut dyn ReadWriteTransaction, path: &Path) -> Result<()> {
        txn.set(path.key().as_bytes(), &self.pack()?).await
    }
}
