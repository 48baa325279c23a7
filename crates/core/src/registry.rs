//! Process-wide registry of source adapters, keyed by `sourceType`.

use crate::error::{CatalogError, Result};
use crate::handler::{RunnableApp, RuntimeOptions};
use crate::persist::read_source_type;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};

/// Knows how to rehydrate one source type from its persisted JSON.
pub trait SourceAdapter: Send + Sync {
    /// The `sourceType` tag this adapter owns.
    fn source_type(&self) -> &'static str;

    /// Decode the full config and attach a handler to every descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ConfigDecode`] when the bytes do not match this adapter's shape.
    fn load(&self, bytes: &[u8], origin: &str, options: &RuntimeOptions) -> Result<RunnableApp>;
}

#[derive(Default)]
pub struct SourceRegistry {
    adapters: RwLock<HashMap<&'static str, Arc<dyn SourceAdapter>>>,
}

static GLOBAL: LazyLock<SourceRegistry> = LazyLock::new(SourceRegistry::default);

/// The process-wide registry.
#[must_use]
pub fn global() -> &'static SourceRegistry {
    &GLOBAL
}

impl SourceRegistry {
    /// Register (or replace) the adapter for its source type.
    pub fn register(&self, adapter: Arc<dyn SourceAdapter>) {
        let tag = adapter.source_type();
        if self.adapters.write().insert(tag, adapter).is_some() {
            tracing::debug!(source_type = tag, "Replaced source adapter");
        }
    }

    #[must_use]
    pub fn get(&self, source_type: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.read().get(source_type).cloned()
    }

    #[must_use]
    pub fn source_types(&self) -> Vec<&'static str> {
        let mut out: Vec<_> = self.adapters.read().keys().copied().collect();
        out.sort_unstable();
        out
    }

    /// Two-phase load from bytes: read the envelope tag, then delegate to the adapter.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownSourceType`] when no adapter owns the tag, or whatever
    /// the adapter reports.
    pub fn load_bytes(
        &self,
        bytes: &[u8],
        origin: &str,
        options: &RuntimeOptions,
    ) -> Result<RunnableApp> {
        let source_type = read_source_type(bytes, origin)?;
        let adapter = self
            .get(&source_type)
            .ok_or(CatalogError::UnknownSourceType(source_type))?;
        adapter.load(bytes, origin, options)
    }

    /// Read a config file and load it.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Io`] if the file cannot be read, otherwise as [`Self::load_bytes`].
    pub fn load_file(&self, path: &Path, options: &RuntimeOptions) -> Result<RunnableApp> {
        let bytes = std::fs::read(path).map_err(|e| CatalogError::io(path, e))?;
        let app = self.load_bytes(&bytes, &path.display().to_string(), options)?;
        tracing::info!(
            app = %app.name,
            tools = app.tools.len(),
            path = %path.display(),
            "Loaded tool catalog"
        );
        Ok(app)
    }
}
