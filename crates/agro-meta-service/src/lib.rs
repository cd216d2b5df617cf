//! Metadata control plane: maps volumes, directories and file bindings onto
//! an ordered, transactional key-value substrate.
//!
//! - [`path`]: flat-key encoding of `(volume, path)` pairs
//! - [`meta_store`]: operations inside one transaction
//! - [`service`]: the `MetadataService` trait and its KV implementation
//! - [`registry`]: backend name to constructor resolution

pub mod config;
pub mod directory;
pub mod global;
pub mod inode_alloc;
pub mod key_prefix;
pub mod meta_store;
pub mod path;
pub mod registry;
pub mod retry;
pub mod service;
pub mod volume;

pub use config::{BackendConfig, ConfigError, MetadataConfig};
pub use directory::{DirEntry, DirMetadata, Directory, INodeRef};
pub use global::{BlockLayerKind, BlockLayerSpec, GlobalMetadata};
pub use path::Path;
pub use registry::{create_backend, register_backend, BackendRegistry, MEMORY_BACKEND};
pub use service::{KvMetadataService, MetadataService};
pub use volume::Volume;
