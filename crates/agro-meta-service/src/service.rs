//! MetadataService trait and its KV-backed implementation.
//!
//! The `MetadataService` trait is the capability set front ends program
//! against. `KvMetadataService` implements it over any [`KvEngine`] by
//! running `MetaStore` operations inside transactions and handling the
//! transaction lifecycle (deadline, commit, retry on conflict).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use agro_kv::KvEngine;
use agro_types::{make_error_msg, InodeId, MetaCode, Result, VolumeId};
use async_trait::async_trait;

use crate::config::MetadataConfig;
use crate::directory::{Directory, INodeRef};
use crate::global::GlobalMetadata;
use crate::meta_store::MetaStore;
use crate::path::Path;
use crate::retry::{run_readonly, run_readwrite};

/// Filesystem metadata operations.
///
/// Every operation except `mkfs` and `close` fails with
/// `MetaCode::NOT_FORMATTED` until `mkfs` has committed. After `close`,
/// everything fails with `MetaCode::SERVICE_CLOSED`.
#[async_trait]
pub trait MetadataService: Send + Sync {
    /// Format the filesystem. Succeeds exactly once per instance.
    async fn mkfs(&self, md: GlobalMetadata) -> Result<()>;

    /// Register a volume and create its root directory.
    async fn create_volume(&self, name: &str) -> Result<VolumeId>;

    /// Names of all volumes, in key order.
    async fn get_volumes(&self) -> Result<Vec<String>>;

    async fn get_volume_id(&self, name: &str) -> Result<VolumeId>;

    /// Issue the next inode id; strictly greater than every id issued before.
    async fn commit_inode_index(&self) -> Result<InodeId>;

    async fn mkdir(&self, path: &Path, dir: Directory) -> Result<()>;

    /// A directory record and the paths of its immediate sub-directories,
    /// read from a single snapshot.
    async fn getdir(&self, path: &Path) -> Result<(Directory, Vec<Path>)>;

    async fn set_file_inode(&self, path: &Path, inode: INodeRef) -> Result<()>;

    async fn global_metadata(&self) -> Result<GlobalMetadata>;

    /// Stop serving requests. Idempotent.
    async fn close(&self) -> Result<()>;
}

pub struct KvMetadataService<E: KvEngine> {
    store: MetaStore,
    engine: Arc<E>,
    /// Written once by mkfs, so safe to keep after the first read.
    global: OnceLock<GlobalMetadata>,
    closed: AtomicBool,
}

impl<E: KvEngine> KvMetadataService<E> {
    pub fn new(engine: Arc<E>, config: MetadataConfig) -> Self {
        Self {
            store: MetaStore::new(config),
            engine,
            global: OnceLock::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn config(&self) -> &MetadataConfig {
        self.store.config()
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return make_error_msg(MetaCode::SERVICE_CLOSED, "metadata service is closed");
        }
        Ok(())
    }

    async fn ensure_formatted(&self) -> Result<GlobalMetadata> {
        self.check_open()?;
        if let Some(md) = self.global.get() {
            return Ok(md.clone());
        }
        let md = run_readonly(&*self.engine, self.config(), "global_metadata", |txn| async move {
            MetaStore::load_global(&txn).await
        })
        .await?;
        match md {
            Some(md) => Ok(self.global.get_or_init(|| md).clone()),
            None => make_error_msg(MetaCode::NOT_FORMATTED, "filesystem is not formatted"),
        }
    }
}

#[async_trait]
impl<E: KvEngine + 'static> MetadataService for KvMetadataService<E> {
    async fn mkfs(&self, md: GlobalMetadata) -> Result<()> {
        self.check_open()?;
        let store = &self.store;
        let md_ref = &md;
        run_readwrite(&*self.engine, self.config(), "mkfs", |mut txn| async move {
            store.mkfs(&mut txn, md_ref).await?;
            Ok((txn, ()))
        })
        .await?;

        tracing::info!(
            block_size = md.block_size,
            block_spec = %md.default_block_spec,
            "formatted filesystem"
        );
        let _ = self.global.set(md);
        Ok(())
    }

    async fn create_volume(&self, name: &str) -> Result<VolumeId> {
        self.ensure_formatted().await?;
        let store = &self.store;
        let volume = run_readwrite(&*self.engine, self.config(), "create_volume", |mut txn| async move {
            let volume = store.create_volume(&mut txn, name).await?;
            Ok((txn, volume))
        })
        .await?;
        tracing::info!(volume = %volume.name, id = %volume.id, "created volume");
        Ok(volume.id)
    }

    async fn get_volumes(&self) -> Result<Vec<String>> {
        self.ensure_formatted().await?;
        let store = &self.store;
        run_readonly(&*self.engine, self.config(), "get_volumes", |txn| async move {
            store.volume_names(&txn).await
        })
        .await
    }

    async fn get_volume_id(&self, name: &str) -> Result<VolumeId> {
        self.ensure_formatted().await?;
        let store = &self.store;
        run_readonly(&*self.engine, self.config(), "get_volume_id", |txn| async move {
            store.volume_id(&txn, name).await
        })
        .await
    }

    async fn commit_inode_index(&self) -> Result<InodeId> {
        self.ensure_formatted().await?;
        let store = &self.store;
        let id = run_readwrite(&*self.engine, self.config(), "commit_inode_index", |mut txn| async move {
            let id = store.commit_inode_index(&mut txn).await?;
            Ok((txn, id))
        })
        .await?;
        tracing::debug!(%id, "issued inode id");
        Ok(id)
    }

    async fn mkdir(&self, path: &Path, dir: Directory) -> Result<()> {
        self.ensure_formatted().await?;
        let store = &self.store;
        let dir = &dir;
        run_readwrite(&*self.engine, self.config(), "mkdir", |mut txn| async move {
            store.mkdir(&mut txn, path, dir).await?;
            Ok((txn, ()))
        })
        .await?;
        tracing::debug!(%path, "created directory");
        Ok(())
    }

    async fn getdir(&self, path: &Path) -> Result<(Directory, Vec<Path>)> {
        self.ensure_formatted().await?;
        let store = &self.store;
        run_readonly(&*self.engine, self.config(), "getdir", |txn| async move {
            store.getdir(&txn, path).await
        })
        .await
    }

    async fn set_file_inode(&self, path: &Path, inode: INodeRef) -> Result<()> {
        self.ensure_formatted().await?;
        let store = &self.store;
        run_readwrite(&*self.engine, self.config(), "set_file_inode", |mut txn| async move {
            store.set_file_inode(&mut txn, path, inode).await?;
            Ok((txn, ()))
        })
        .await
    }

    async fn global_metadata(&self) -> Result<GlobalMetadata> {
        self.ensure_formatted().await
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!("metadata service closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use agro_kv_backends::{FaultInjection, MemDbEngine};
    use agro_types::{ErrorKind, TransactionCode};

    use super::*;
    use crate::directory::DirEntry;

    fn service() -> (Arc<MemDbEngine>, Arc<KvMetadataService<MemDbEngine>>) {
        let engine = Arc::new(MemDbEngine::new());
        let config = MetadataConfig {
            max_retries: 1000,
            retry_init_wait_ms: 1,
            retry_max_wait_ms: 8,
            operation_timeout_ms: 30_000,
            ..Default::default()
        };
        let svc = Arc::new(KvMetadataService::new(engine.clone(), config));
        (engine, svc)
    }

    async fn formatted() -> (Arc<MemDbEngine>, Arc<KvMetadataService<MemDbEngine>>) {
        let (engine, svc) = service();
        svc.mkfs(GlobalMetadata::default()).await.unwrap();
        svc.create_volume("v").await.unwrap();
        (engine, svc)
    }

    fn p(path: &str) -> Path {
        Path::new("v", path)
    }

    #[tokio::test]
    async fn test_unformatted_instance_rejects_everything_but_mkfs() {
        let (_, svc) = service();
        let r = INodeRef::new(VolumeId(1), InodeId(1));

        let errors = vec![
            svc.create_volume("v").await.unwrap_err(),
            svc.get_volumes().await.unwrap_err(),
            svc.get_volume_id("v").await.unwrap_err(),
            svc.commit_inode_index().await.unwrap_err(),
            svc.mkdir(&p("/x/"), Directory::new()).await.unwrap_err(),
            svc.getdir(&p("/")).await.unwrap_err(),
            svc.set_file_inode(&p("/f"), r).await.unwrap_err(),
            svc.global_metadata().await.unwrap_err(),
        ];
        for err in errors {
            assert_eq!(err.kind(), ErrorKind::NotFormatted, "{}", err);
        }

        svc.mkfs(GlobalMetadata::default()).await.unwrap();
        assert_eq!(svc.global_metadata().await.unwrap(), GlobalMetadata::default());
    }

    #[tokio::test]
    async fn test_mkfs_validates_and_runs_once() {
        let (_, svc) = service();
        let bad = GlobalMetadata {
            block_size: 3000,
            ..Default::default()
        };
        assert_eq!(svc.mkfs(bad).await.unwrap_err().kind(), ErrorKind::InvalidArgument);

        svc.mkfs(GlobalMetadata::default()).await.unwrap();
        let err = svc.mkfs(GlobalMetadata::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn test_formatted_state_visible_to_other_instances() {
        let (engine, svc) = service();
        svc.mkfs(GlobalMetadata::default()).await.unwrap();

        let other = KvMetadataService::new(engine, MetadataConfig::default());
        assert_eq!(other.global_metadata().await.unwrap(), GlobalMetadata::default());
        let err = other.mkfs(GlobalMetadata::default()).await.unwrap_err();
        assert_eq!(err.code(), MetaCode::EXISTS);
    }

    #[tokio::test]
    async fn test_create_volume_twice() {
        let (_, svc) = service();
        svc.mkfs(GlobalMetadata::default()).await.unwrap();

        let err = svc.get_volume_id("a").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let id = svc.create_volume("a").await.unwrap();
        assert_eq!(svc.get_volume_id("a").await.unwrap(), id);

        let err = svc.create_volume("a").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let id_b = svc.create_volume("b").await.unwrap();
        assert_ne!(id, id_b);
        assert_eq!(svc.get_volumes().await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_create_volume_single_winner() {
        let (_, svc) = service();
        svc.mkfs(GlobalMetadata::default()).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let svc = svc.clone();
                tokio::spawn(async move { svc.create_volume("shared").await })
            })
            .collect();

        let mut ok = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) => assert_eq!(e.kind(), ErrorKind::AlreadyExists),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(svc.get_volumes().await.unwrap(), vec!["shared"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inode_ids_are_unique_and_dense() {
        let (_, svc) = formatted().await;

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let svc = svc.clone();
                tokio::spawn(async move { svc.commit_inode_index().await })
            })
            .collect();

        let mut ids = HashSet::new();
        for h in handles {
            let id = h.await.unwrap().unwrap();
            assert!(ids.insert(*id), "duplicate id {}", id);
        }
        let expected: HashSet<u64> = (1..=100).collect();
        assert_eq!(ids, expected);

        assert_eq!(*svc.commit_inode_index().await.unwrap(), 101);
    }

    #[tokio::test]
    async fn test_getdir_lists_immediate_children_only() {
        let (_, svc) = formatted().await;
        svc.mkdir(&p("/x/"), Directory::new()).await.unwrap();
        svc.mkdir(&p("/x/y/"), Directory::new()).await.unwrap();

        let (_, children) = svc.getdir(&p("/x/")).await.unwrap();
        assert_eq!(children, vec![p("/x/y/")]);

        svc.mkdir(&p("/x/y/z/"), Directory::new()).await.unwrap();
        svc.mkdir(&p("/xy/"), Directory::new()).await.unwrap();
        let (dir, children) = svc.getdir(&p("/x/")).await.unwrap();
        assert_eq!(children, vec![p("/x/y/")]);
        assert_eq!(dir.subdirectories().collect::<Vec<_>>(), vec!["y"]);

        let (_, root_children) = svc.getdir(&p("/")).await.unwrap();
        assert_eq!(root_children, vec![p("/x/"), p("/xy/")]);
    }

    #[tokio::test]
    async fn test_getdir_pages_large_directories() {
        let (engine, _) = formatted().await;
        let svc = KvMetadataService::new(
            engine,
            MetadataConfig {
                list_limit: 2,
                ..Default::default()
            },
        );
        for i in 0..7 {
            svc.mkdir(&p(&format!("/d{}/", i)), Directory::new()).await.unwrap();
        }
        let (_, children) = svc.getdir(&p("/")).await.unwrap();
        assert_eq!(children.len(), 7);
    }

    #[tokio::test]
    async fn test_rebinding_shows_latest_ref() {
        let (_, svc) = formatted().await;
        let vol = svc.get_volume_id("v").await.unwrap();
        svc.mkdir(&p("/x/"), Directory::new()).await.unwrap();

        let ref1 = INodeRef::new(vol, svc.commit_inode_index().await.unwrap());
        let ref2 = INodeRef::new(vol, svc.commit_inode_index().await.unwrap());
        svc.set_file_inode(&p("/x/f"), ref1).await.unwrap();
        svc.set_file_inode(&p("/x/f"), ref2).await.unwrap();

        let (dir, _) = svc.getdir(&p("/x/")).await.unwrap();
        assert_eq!(dir.get("f"), Some(&DirEntry::File(ref2)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_mkdir_single_winner() {
        let (_, svc) = formatted().await;

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let svc = svc.clone();
                tokio::spawn(async move {
                    let mut dir = Directory::new();
                    dir.metadata.mode = 0o700 + i;
                    svc.mkdir(&p("/x/"), dir).await
                })
            })
            .collect();

        let mut winners = Vec::new();
        for (i, h) in handles.into_iter().enumerate() {
            match h.await.unwrap() {
                Ok(()) => winners.push(i as u32),
                Err(e) => assert_eq!(e.kind(), ErrorKind::AlreadyExists),
            }
        }
        assert_eq!(winners.len(), 1);

        let (dir, _) = svc.getdir(&p("/x/")).await.unwrap();
        assert_eq!(dir.metadata.mode, 0o700 + winners[0]);
        let (root, children) = svc.getdir(&p("/")).await.unwrap();
        assert_eq!(root.subdirectories().count(), 1);
        assert_eq!(children, vec![p("/x/")]);
    }

    #[tokio::test]
    async fn test_unavailable_substrate_fails_cleanly() {
        let (engine, svc) = formatted().await;
        engine.set_fault(FaultInjection::Unavailable);

        let err = svc.commit_inode_index().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SubstrateUnavailable);
        assert!(err.is_retryable());

        let err = svc.mkdir(&p("/x/"), Directory::new()).await.unwrap_err();
        assert_eq!(err.code(), TransactionCode::NETWORK_ERROR);

        engine.set_fault(FaultInjection::None);
        assert_eq!(*svc.commit_inode_index().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_commit_outcome_is_indeterminate() {
        let (engine, svc) = formatted().await;
        engine.set_fault(FaultInjection::CommitUnknownResult);

        let err = svc.commit_inode_index().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Indeterminate);
        assert!(!err.is_retryable());

        engine.set_fault(FaultInjection::None);
        // The lost commit did apply; the next id is not reissued.
        assert_eq!(*svc.commit_inode_index().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_stalled_commit_times_out_as_indeterminate() {
        let (engine, _) = formatted().await;
        let svc = KvMetadataService::new(
            engine.clone(),
            MetadataConfig {
                operation_timeout_ms: 50,
                ..Default::default()
            },
        );
        svc.global_metadata().await.unwrap();

        engine.set_fault(FaultInjection::StallCommit(Duration::from_secs(5)));
        let err = svc.mkdir(&p("/slow/"), Directory::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Indeterminate);
    }

    #[tokio::test]
    async fn test_closed_service() {
        let (_, svc) = formatted().await;
        svc.close().await.unwrap();
        svc.close().await.unwrap();

        let err = svc.get_volumes().await.unwrap_err();
        assert_eq!(err.code(), MetaCode::SERVICE_CLOSED);
        let err = svc.mkfs(GlobalMetadata::default()).await.unwrap_err();
        assert_eq!(err.code(), MetaCode::SERVICE_CLOSED);
    }

    #[tokio::test]
    async fn test_usable_as_trait_object() {
        let (_, svc) = formatted().await;
        let dyn_svc: Arc<dyn MetadataService> = svc;
        assert_eq!(dyn_svc.get_volumes().await.unwrap(), vec!["v"]);
    }
}
