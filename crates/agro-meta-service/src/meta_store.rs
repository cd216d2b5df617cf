//! MetaStore: metadata operations that run inside a caller-provided
//! transaction.
//!
//! Nothing here commits or retries; `KvMetadataService` owns the transaction
//! lifecycle. Every read-modify-write reads the records it depends on with
//! `get`, so the substrate's conflict detection turns the check-then-write
//! sequences below into atomic compare-and-set operations.

use agro_kv::{ReadOnlyTransaction, ReadWriteTransaction};
use agro_types::{make_error_msg, InodeId, MetaCode, Result, StatusCode, VolumeId};

use crate::config::MetadataConfig;
use crate::directory::{DirEntry, Directory, INodeRef};
use crate::global::GlobalMetadata;
use crate::inode_alloc;
use crate::key_prefix;
use crate::path::{validate_volume_name, Path};
use crate::volume::Volume;

pub struct MetaStore {
    config: MetadataConfig,
}

impl MetaStore {
    pub fn new(config: MetadataConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MetadataConfig {
        &self.config
    }

    fn check_path(&self, path: &Path) -> Result<()> {
        path.validate(self.config.max_directory_depth)
    }

    // ---- Filesystem lifecycle ----

    pub async fn mkfs(&self, txn: &mut dyn ReadWriteTransaction, md: &GlobalMetadata) -> Result<()> {
        md.validate()?;
        if txn.get(key_prefix::GLOBAL_METADATA_KEY).await?.is_some() {
            return make_error_msg(MetaCode::EXISTS, "filesystem is already formatted");
        }
        txn.set(key_prefix::GLOBAL_METADATA_KEY, &md.pack()?).await?;
        inode_alloc::init_counters(txn).await
    }

    pub async fn load_global<T: ReadOnlyTransaction + ?Sized>(
        txn: &T,
    ) -> Result<Option<GlobalMetadata>> {
        match txn.get(key_prefix::GLOBAL_METADATA_KEY).await? {
            Some(value) => Ok(Some(GlobalMetadata::unpack(&value)?)),
            None => Ok(None),
        }
    }

    // ---- Volumes ----

    pub async fn create_volume(
        &self,
        txn: &mut dyn ReadWriteTransaction,
        name: &str,
    ) -> Result<Volume> {
        Volume::create(txn, name).await
    }

    pub async fn volume_id<T: ReadOnlyTransaction + ?Sized>(
        &self,
        txn: &T,
        name: &str,
    ) -> Result<VolumeId> {
        validate_volume_name(name)?;
        match Volume::load(txn, name).await? {
            Some(volume) => Ok(volume.id),
            None => make_error_msg(MetaCode::NOT_FOUND, format!("volume {} not found", name)),
        }
    }

    pub async fn volume_names<T: ReadOnlyTransaction + ?Sized>(
        &self,
        txn: &T,
    ) -> Result<Vec<String>> {
        let volumes = Volume::list(txn, self.config.list_limit).await?;
        Ok(volumes.into_iter().map(|v| v.name).collect())
    }

    // ---- Inodes ----

    pub async fn commit_inode_index(&self, txn: &mut dyn ReadWriteTransaction) -> Result<InodeId> {
        inode_alloc::next_id(txn, key_prefix::INODE_COUNTER_KEY)
            .await
            .map(InodeId)
    }

    // ---- Directories ----

    /// Create the directory record for `path` and register it in its parent.
    ///
    /// Fails with `NOT_FOUND` if the parent record is missing and with
    /// `EXISTS` if the target record, or a file of the same name, is already
    /// present. The root of a volume already exists once the volume does.
    pub async fn mkdir(
        &self,
        txn: &mut dyn ReadWriteTransaction,
        path: &Path,
        dir: &Directory,
    ) -> Result<()> {
        self.check_path(path)?;
        if !path.is_dir() {
            return make_error_msg(
                StatusCode::INVALID_ARG,
                format!("{} is not a directory path", path),
            );
        }

        let parent_path = path.parent();
        let Some(mut parent) = Directory::load(&*txn, &parent_path).await? else {
            return make_error_msg(
                MetaCode::NOT_FOUND,
                format!("parent directory {} not found", parent_path),
            );
        };
        if Directory::load(&*txn, path).await?.is_some() {
            return make_error_msg(MetaCode::EXISTS, format!("{} already exists", path));
        }

        let name = path.name();
        if let Some(DirEntry::File(_)) = parent.get(name) {
            return make_error_msg(
                MetaCode::EXISTS,
                format!("a file named {} exists in {}", name, parent_path),
            );
        }

        dir.store(txn, path).await?;
        parent.entries.insert(name.to_string(), DirEntry::Directory);
        parent.store(txn, &parent_path).await?;

        tracing::debug!(%path, "mkdir: staged directory");
        Ok(())
    }

    /// The record of directory `path` and its immediate sub-directories,
    /// found by scanning the children prefix.
    pub async fn getdir<T: ReadOnlyTransaction + ?Sized>(
        &self,
        txn: &T,
        path: &Path,
    ) -> Result<(Directory, Vec<Path>)> {
        self.check_path(path)?;
        if !path.is_dir() {
            return make_error_msg(
                StatusCode::INVALID_ARG,
                format!("{} is not a directory path", path),
            );
        }

        let Some(dir) = Directory::load(txn, path).await? else {
            return make_error_msg(MetaCode::NOT_FOUND, format!("directory {} not found", path));
        };

        let prefix = path.children_prefix();
        let children = key_prefix::scan_prefix(txn, prefix.as_bytes(), self.config.list_limit)
            .await?
            .iter()
            .map(|kv| Path::from_key(&kv.key))
            .collect::<Result<Vec<_>>>()?;

        Ok((dir, children))
    }

    /// Bind the file named by `path` to `inode` in its parent directory,
    /// replacing any previous binding.
    pub async fn set_file_inode(
        &self,
        txn: &mut dyn ReadWriteTransaction,
        path: &Path,
        inode: INodeRef,
    ) -> Result<()> {
        self.check_path(path)?;
        if path.is_dir() || path.filename().is_empty() {
            return make_error_msg(
                StatusCode::INVALID_ARG,
                format!("{} is not a file path", path),
            );
        }

        let parent_path = path.parent();
        let Some(mut parent) = Directory::load(&*txn, &parent_path).await? else {
            return make_error_msg(
                MetaCode::NOT_FOUND,
                format!("parent directory {} not found", parent_path),
            );
        };

        let name = path.filename();
        if let Some(DirEntry::Directory) = parent.get(name) {
            return make_error_msg(MetaCode::IS_DIRECTORY, format!("{} is a directory", name));
        }
        let previous = parent.entries.insert(name.to_string(), DirEntry::File(inode));
        parent.store(txn, &parent_path).await?;

        tracing::debug!(%path, inode = %inode.inode, replaced = ?previous.and_then(|e| e.inode()), "set_file_inode: staged binding");
        Ok(())
    }
}
