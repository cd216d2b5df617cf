//! The volume catalog: one record per volume name under
//! [`key_prefix::VOLUME_PREFIX`].

use agro_kv::{ReadOnlyTransaction, ReadWriteTransaction};
use agro_types::{make_error_msg, MetaCode, Result, Status, StatusCode, VolumeId};
use serde::{Deserialize, Serialize};

use crate::directory::Directory;
use crate::inode_alloc;
use crate::key_prefix;
use crate::path::{validate_volume_name, Path};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    pub id: VolumeId,
}

impl Volume {
    fn pack(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            Status::with_message(
                StatusCode::DATA_CORRUPTION,
                format!("failed to serialize volume: {}", e),
            )
        })
    }

    fn unpack(value: &[u8]) -> Result<Self> {
        serde_json::from_slice(value).map_err(|e| {
            Status::with_message(
                StatusCode::DATA_CORRUPTION,
                format!("failed to deserialize volume: {}", e),
            )
        })
    }

    pub async fn load<T: ReadOnlyTransaction + ?Sized>(txn: &T, name: &str) -> Result<Option<Self>> {
        match txn.get(&key_prefix::volume_key(name)).await? {
            Some(value) => Ok(Some(Self::unpack(&value)?)),
            None => Ok(None),
        }
    }

    /// Stage a new volume: the catalog record, its id from the volume
    /// counter and its root directory. Fails with `EXISTS` if the name is
    /// taken; the name read joins the conflict set so that of two concurrent
    /// creators only one commits.
    pub async fn create(txn: &mut dyn ReadWriteTransaction, name: &str) -> Result<Self> {
        validate_volume_name(name)?;
        if Self::load(&*txn, name).await?.is_some() {
            return make_error_msg(MetaCode::EXISTS, format!("volume {} already exists", name));
        }

        let id = VolumeId(inode_alloc::next_id(txn, key_prefix::VOLUME_COUNTER_KEY).await?);
        let volume = Volume {
            name: name.to_string(),
            id,
        };
        txn.set(&key_prefix::volume_key(name), &volume.pack()?).await?;

        Directory::new().store(txn, &Path::root(name)).await?;

        tracing::debug!(volume = name, %id, "staged volume");
        Ok(volume)
    }

    pub async fn list<T: ReadOnlyTransaction + ?Sized>(txn: &T, page: i32) -> Result<Vec<Self>> {
        key_prefix::scan_prefix(txn, key_prefix::VOLUME_PREFIX, page)
            .await?
            .iter()
            .map(|kv| Self::unpack(&kv.value))
            .collect()
    }
}
