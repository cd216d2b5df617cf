//! Name-indexed registry of metadata backend constructors.
//!
//! Backends register a constructor under a unique name at startup; callers
//! resolve a configured name into a live `MetadataService` without depending
//! on the concrete type. Registering a name twice is a build defect and
//! panics.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use agro_kv_backends::MemDbEngine;
use agro_types::{make_error_msg, MetaCode, Result, Status};
use parking_lot::RwLock;

use crate::config::BackendConfig;
use crate::service::{KvMetadataService, MetadataService};

/// Name of the built-in in-process backend.
pub const MEMORY_BACKEND: &str = "memory";

pub type BackendConstructor =
    Arc<dyn Fn(&BackendConfig) -> Result<Arc<dyn MetadataService>> + Send + Sync>;

#[derive(Default)]
pub struct BackendRegistry {
    constructors: RwLock<HashMap<String, BackendConstructor>>,
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in backends.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register(MEMORY_BACKEND, new_memory_backend);
        registry
    }

    /// Register `constructor` under `name`.
    ///
    /// # Panics
    ///
    /// If `name` is already registered.
    pub fn register<F>(&self, name: &str, constructor: F)
    where
        F: Fn(&BackendConfig) -> Result<Arc<dyn MetadataService>> + Send + Sync + 'static,
    {
        let mut constructors = self.constructors.write();
        if constructors.contains_key(name) {
            panic!("metadata backend {:?} registered twice", name);
        }
        constructors.insert(name.to_string(), Arc::new(constructor));
        tracing::debug!(backend = name, "registered metadata backend");
    }

    /// Build the backend registered under `name`.
    pub fn create(&self, name: &str, config: &BackendConfig) -> Result<Arc<dyn MetadataService>> {
        let constructor = self.constructors.read().get(name).cloned();
        let Some(constructor) = constructor else {
            return make_error_msg(
                MetaCode::BACKEND_NOT_FOUND,
                format!("no metadata backend registered as {:?}", name),
            );
        };
        config.validate().map_err(Status::from)?;
        tracing::info!(backend = name, "creating metadata service");
        constructor(config)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.constructors.read().keys().cloned().collect();
        names.sort();
        names
    }
}

fn new_memory_backend(config: &BackendConfig) -> Result<Arc<dyn MetadataService>> {
    if !config.backend_options.is_empty() {
        let ignored: Vec<_> = config.backend_options.keys().collect();
        tracing::warn!(?ignored, "memory backend takes no backend_options");
    }
    Ok(Arc::new(KvMetadataService::new(
        Arc::new(MemDbEngine::new()),
        config.meta.clone(),
    )))
}

static GLOBAL_REGISTRY: LazyLock<BackendRegistry> = LazyLock::new(BackendRegistry::with_builtin);

/// Register a backend in the process-wide registry. Panics on a duplicate name.
pub fn register_backend<F>(name: &str, constructor: F)
where
    F: Fn(&BackendConfig) -> Result<Arc<dyn MetadataService>> + Send + Sync + 'static,
{
    GLOBAL_REGISTRY.register(name, constructor);
}

/// Build a backend from the process-wide registry.
pub fn create_backend(name: &str, config: &BackendConfig) -> Result<Arc<dyn MetadataService>> {
    GLOBAL_REGISTRY.create(name, config)
}

pub fn registered_backends() -> Vec<String> {
    GLOBAL_REGISTRY.names()
}
