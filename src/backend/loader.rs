//! Backend Loader
//!
//! Maps engine paths to constructors and produces engine instances.
//!
//! ## Contract
//! - Loading is serialized process-wide by `LOAD_LOCK`, across every
//!   loader instance
//! - A failed `initialize` destroys the half-built instance before the
//!   failure is returned

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{const_mutex, Mutex, RwLock};

use crate::error::{BucketError, EngineError, EngineResult, Result};

use super::{DisconnectCallback, EngineCallbacks, MemoryEngine, StorageEngine};

/// Constructor for an engine instance
pub type EngineFactory = Arc<dyn Fn() -> EngineResult<Arc<dyn StorageEngine>> + Send + Sync>;

/// Serializes instance construction for the whole process
static LOAD_LOCK: Mutex<()> = const_mutex(());

/// Resolves engine paths to engine instances
pub struct BackendLoader {
    /// Registered constructors, keyed by path
    factories: RwLock<HashMap<String, EngineFactory>>,
}

impl BackendLoader {
    /// Path of the built-in in-memory engine
    pub const MEMORY_ENGINE: &'static str = "memory";

    /// An empty loader with no engines registered
    pub fn empty() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// A loader with the built-in engines registered
    pub fn new() -> Self {
        let loader = Self::empty();
        loader.register(Self::MEMORY_ENGINE, || {
            Ok(Arc::new(MemoryEngine::new()) as Arc<dyn StorageEngine>)
        });
        loader
    }

    /// Register (or replace) the constructor for `path`
    pub fn register<F>(&self, path: impl Into<String>, factory: F)
    where
        F: Fn() -> EngineResult<Arc<dyn StorageEngine>> + Send + Sync + 'static,
    {
        self.factories.write().insert(path.into(), Arc::new(factory));
    }

    /// True if a constructor exists for `path`
    pub fn knows(&self, path: &str) -> bool {
        self.factories.read().contains_key(path)
    }

    /// Construct an uninitialized engine instance
    pub fn load(&self, path: &str) -> Result<Arc<dyn StorageEngine>> {
        let factory = self.factories.read().get(path).cloned();
        let Some(factory) = factory else {
            tracing::warn!("Failed to open engine \"{}\": no such engine", path);
            return Err(BucketError::LoadFailed(format!("unknown engine \"{}\"", path)));
        };

        let _load_guard = LOAD_LOCK.lock();
        factory().map_err(|e| {
            tracing::warn!("Failed to create instance of \"{}\": {}", path, e);
            match e {
                EngineError::OutOfMemory => BucketError::OutOfMemory,
                e => BucketError::LoadFailed(format!("failed to create instance of \"{}\": {}", path, e)),
            }
        })
    }

    /// Construct and initialize an engine instance
    pub fn load_initialized(
        &self,
        path: &str,
        config: &str,
    ) -> Result<(Arc<dyn StorageEngine>, Option<DisconnectCallback>)> {
        let engine = self.load(path)?;
        let on_disconnect = initialize_engine(engine.as_ref(), config)?;
        Ok((engine, on_disconnect))
    }
}

impl Default for BackendLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Initialize an engine, destroying it if initialization fails
pub fn initialize_engine(engine: &dyn StorageEngine, config: &str) -> Result<Option<DisconnectCallback>> {
    let mut callbacks = EngineCallbacks::new();
    match engine.initialize(config, &mut callbacks) {
        Ok(()) => Ok(callbacks.into_disconnect()),
        Err(e) => {
            engine.destroy(false);
            tracing::warn!("Failed to initialize instance: {}", e);
            Err(BucketError::InitFailed(e.to_string()))
        }
    }
}
