//! The dispatcher: composite creation and casting
//!
//! A dispatcher owns the model cache and the fragment pool of one assembly.
//! Models are resolved on first use (or at startup with
//! `eager_resolution`), then shared by every composite of that capability.

use std::sync::Arc;

use tracing::debug;

use quilt_core::{CapabilityId, CoreFragment, QuiltResult, Value};
use quilt_model::{CapabilityRegistry, DispatchModel, ModelCache};

use crate::config::RuntimeConfig;
use crate::instance::{Composite, Wrapped};
use crate::pool::FragmentPool;

/// Creates composites from resolved dispatch models
///
/// # Example
///
/// ```ignore
/// let dispatcher = Dispatcher::new(registry)?;
/// let account = dispatcher.new_instance(&"Account".into(), vec![])?;
/// account.invoke("deposit", vec![Value::Int(10)])?;
/// ```
#[derive(Debug)]
pub struct Dispatcher {
    cache: Arc<ModelCache>,
    pool: Arc<FragmentPool>,
    config: RuntimeConfig,
}

impl Dispatcher {
    /// Create a dispatcher with the default configuration
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::with_config`].
    pub fn new(registry: CapabilityRegistry) -> QuiltResult<Self> {
        Self::with_config(registry, RuntimeConfig::default())
    }

    /// Create a dispatcher
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` if the configuration is invalid
    /// - any resolution error when `eager_resolution` is set
    pub fn with_config(registry: CapabilityRegistry, config: RuntimeConfig) -> QuiltResult<Self> {
        config.validate()?;
        let cache = Arc::new(ModelCache::new(Arc::new(registry)));
        if config.eager_resolution {
            let resolved = cache.resolve_all()?;
            debug!(target: "quilt::engine", resolved, "Resolved capability contracts eagerly");
        }
        let pool = if config.pooling {
            FragmentPool::new(config.max_pooled_fragments)
        } else {
            FragmentPool::disabled()
        };
        Ok(Self {
            cache,
            pool: Arc::new(pool),
            config,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Shared fragment pool
    pub fn pool(&self) -> &Arc<FragmentPool> {
        &self.pool
    }

    /// Model cache
    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.cache
    }

    /// Dispatch model of a capability
    ///
    /// # Errors
    ///
    /// Any resolution error.
    pub fn model(&self, capability: &CapabilityId) -> QuiltResult<Arc<DispatchModel>> {
        self.cache.model(capability)
    }

    /// Create a composite of a capability
    ///
    /// `args` are handed to fragment factories through
    /// [`FragmentContext::args`](quilt_core::FragmentContext::args).
    /// Fragments are built lazily, on the first call that needs them.
    ///
    /// # Errors
    ///
    /// Any resolution error, notably `MissingFragment`.
    pub fn new_instance(&self, capability: &CapabilityId, args: Vec<Value>) -> QuiltResult<Composite> {
        let model = self.cache.model(capability)?;
        Ok(Composite::new(model, Arc::clone(&self.pool), args, None))
    }

    /// Wrap an object implementing the whole contract
    ///
    /// Constraints, assertions and decorators of the capability apply; the
    /// object serves every method as core.
    ///
    /// # Errors
    ///
    /// Any resolution error except `MissingFragment`.
    pub fn cast(&self, capability: &CapabilityId, object: Arc<dyn CoreFragment>) -> QuiltResult<Composite> {
        self.wrap(capability, Wrapped::Object(object))
    }

    /// Wrap an existing composite as `capability`
    ///
    /// Casting a wrapper wraps its original object, never the wrapper.
    ///
    /// # Errors
    ///
    /// Any resolution error except `MissingFragment`.
    pub fn recast(&self, capability: &CapabilityId, composite: &Composite) -> QuiltResult<Composite> {
        let target = match composite.unwrapped() {
            Some(original) => original.clone(),
            None => Wrapped::Composite(composite.clone()),
        };
        self.wrap(capability, target)
    }

    /// Check whether a composite conforms to a capability, looking through wrappers
    pub fn is_instance(&self, composite: &Composite, capability: &CapabilityId) -> bool {
        composite.conforms_to(capability)
    }

    /// Pre-create the pooled fragments of a capability
    ///
    /// # Errors
    ///
    /// Any resolution or construction error.
    pub fn warmup(&self, capability: &CapabilityId) -> QuiltResult<usize> {
        let model = self.cache.model(capability)?;
        self.pool.warmup(&model)
    }

    fn wrap(&self, capability: &CapabilityId, target: Wrapped) -> QuiltResult<Composite> {
        let model = self.cache.wrapping_model(capability)?;
        Ok(Composite::new(model, Arc::clone(&self.pool), Vec::new(), Some(target)))
    }
}
