//! Memoized dispatch models
//!
//! Resolution runs once per (capability, mode); every later request returns
//! the same `Arc<DispatchModel>`. Models are immutable, so callers read them
//! without further synchronization.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use quilt_core::{CapabilityId, QuiltResult};

use crate::dispatch::{DispatchModel, ResolutionMode};
use crate::registry::CapabilityRegistry;
use crate::resolver::resolve;

/// Thread-safe cache of dispatch models over one registry
pub struct ModelCache {
    registry: Arc<CapabilityRegistry>,
    models: DashMap<(CapabilityId, ResolutionMode), Arc<DispatchModel>>,
}

impl ModelCache {
    /// Create an empty cache over a registry
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            registry,
            models: DashMap::new(),
        }
    }

    /// Underlying registry
    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Model for instantiating new composites
    ///
    /// # Errors
    ///
    /// Any resolution error. Failures are not cached.
    pub fn model(&self, capability: &CapabilityId) -> QuiltResult<Arc<DispatchModel>> {
        self.get_or_resolve(capability, ResolutionMode::Instantiate)
    }

    /// Model for wrapping existing objects
    ///
    /// # Errors
    ///
    /// Any resolution error except `MissingFragment`.
    pub fn wrapping_model(&self, capability: &CapabilityId) -> QuiltResult<Arc<DispatchModel>> {
        self.get_or_resolve(capability, ResolutionMode::Wrap)
    }

    /// Resolve every registered contract in wrap mode
    ///
    /// Surfaces graph, declaration and constraint errors up front. Missing
    /// cores are still only reported when a composite is first instantiated.
    ///
    /// # Errors
    ///
    /// The first resolution error, in registration order.
    pub fn resolve_all(&self) -> QuiltResult<usize> {
        let mut resolved = 0;
        for id in self.registry.ids() {
            let terminal = self.registry.get(id).map_or(true, |ty| ty.is_terminal());
            if terminal {
                continue;
            }
            self.wrapping_model(id)?;
            resolved += 1;
        }
        Ok(resolved)
    }

    /// Number of cached models
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Check whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    fn get_or_resolve(
        &self,
        capability: &CapabilityId,
        mode: ResolutionMode,
    ) -> QuiltResult<Arc<DispatchModel>> {
        let key = (capability.clone(), mode);
        if let Some(model) = self.models.get(&key) {
            return Ok(Arc::clone(model.value()));
        }

        // Resolve outside the shard lock; a concurrent resolver of the same
        // key loses and adopts the stored model.
        let model = Arc::new(resolve(&self.registry, capability, mode)?);
        debug!(
            target: "quilt::model",
            capability = %capability,
            mode = %mode,
            methods = model.methods().len(),
            fragments = model.fragments().len(),
            "Built dispatch model"
        );
        Ok(Arc::clone(self.models.entry(key).or_insert(model).value()))
    }
}

impl std::fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCache")
            .field("types", &self.registry.len())
            .field("models", &self.models.len())
            .finish()
    }
}
