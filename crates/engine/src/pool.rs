//! Shared pool of stateless fragment instances
//!
//! A fragment declared stateless is created once per pool and shared by
//! every composite of every capability using that pool. Pooled instances
//! are built with a detached [`FragmentContext`]: they belong to no single
//! composite.
//!
//! Fragment ids are the pool key, so two descriptors with the same id are
//! treated as the same fragment.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::debug;

use quilt_core::{FragmentContext, FragmentId, QuiltResult};
use quilt_model::{DispatchModel, FragmentDescriptor, FragmentInstance};

/// Pool of shared fragment instances
///
/// # Memory Ordering
///
/// Counters use Relaxed ordering; they are observational only.
pub struct FragmentPool {
    instances: DashMap<FragmentId, FragmentInstance>,
    enabled: bool,
    max_size: usize,
    created: AtomicU64,
    hits: AtomicU64,
    overflows: AtomicU64,
}

impl FragmentPool {
    /// Create a pool holding at most `max_size` instances
    pub fn new(max_size: usize) -> Self {
        Self {
            instances: DashMap::new(),
            enabled: true,
            max_size,
            created: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            overflows: AtomicU64::new(0),
        }
    }

    /// Create a pool that never shares
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(0)
        }
    }

    /// Check whether the pool shares instances
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Get the shared instance of a stateless fragment
    ///
    /// Returns `Ok(None)` when the fragment must be created per composite:
    /// the fragment is stateful, pooling is disabled, or the pool is full.
    ///
    /// # Errors
    ///
    /// Returns the factory's error if the instance has to be created and
    /// construction fails. Nothing is pooled in that case.
    pub fn acquire(&self, descriptor: &FragmentDescriptor) -> QuiltResult<Option<FragmentInstance>> {
        if !self.enabled || !descriptor.is_stateless() {
            return Ok(None);
        }
        if let Some(instance) = self.instances.get(descriptor.id()) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(instance.value().clone()));
        }
        if self.instances.len() >= self.max_size {
            self.overflows.fetch_add(1, Ordering::Relaxed);
            debug!(
                target: "quilt::engine",
                fragment = %descriptor.id(),
                max_size = self.max_size,
                "Fragment pool full"
            );
            return Ok(None);
        }

        let instance = self
            .instances
            .entry(descriptor.id().clone())
            .or_try_insert_with(|| {
                self.created.fetch_add(1, Ordering::Relaxed);
                descriptor.instantiate(&FragmentContext::detached())
            })?
            .value()
            .clone();
        Ok(Some(instance))
    }

    /// Pre-create the stateless fragments of a model
    ///
    /// Returns the number of instances available in the pool for the model.
    ///
    /// # Errors
    ///
    /// The first construction error.
    pub fn warmup(&self, model: &DispatchModel) -> QuiltResult<usize> {
        let mut warmed = 0;
        for descriptor in model.fragments() {
            if self.acquire(descriptor)?.is_some() {
                warmed += 1;
            }
        }
        debug!(target: "quilt::engine", capability = %model.capability(), warmed, "Warmed fragment pool");
        Ok(warmed)
    }

    /// Check whether an instance is pooled for a fragment
    pub fn contains(&self, id: &FragmentId) -> bool {
        self.instances.contains_key(id)
    }

    /// Number of pooled instances
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Check whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Drop all pooled instances
    ///
    /// Composites already holding an instance keep it.
    pub fn clear(&self) {
        self.instances.clear();
    }

    /// Snapshot of the pool counters
    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            pooled: self.instances.len(),
            created: self.created.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for FragmentPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentPool")
            .field("enabled", &self.enabled)
            .field("max_size", &self.max_size)
            .field("metrics", &self.metrics())
            .finish()
    }
}

/// Pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolMetrics {
    /// Instances currently pooled
    pub pooled: usize,
    /// Instances created by the pool
    pub created: u64,
    /// Requests served from an existing instance
    pub hits: u64,
    /// Requests refused because the pool was full
    pub overflows: u64,
}
