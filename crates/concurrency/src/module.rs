//! Per-module concurrency state

use quilt_core::ModuleId;

use crate::lock::{ModuleLock, ModuleReadGuard, ModuleWriteGuard};
use crate::versions::EntityStateVersions;

/// Version cache and lock shared by every unit of work of one module
///
/// Owned by whoever assembles the module and handed to the check as an
/// `Arc`; two checks given the same `ModuleConcurrency` validate against
/// each other.
#[derive(Debug)]
pub struct ModuleConcurrency {
    module: ModuleId,
    lock: ModuleLock,
    versions: EntityStateVersions,
}

impl ModuleConcurrency {
    /// Create fresh state for a module
    pub fn new(module: impl Into<ModuleId>) -> Self {
        Self {
            module: module.into(),
            lock: ModuleLock::new(),
            versions: EntityStateVersions::new(),
        }
    }

    /// Module the state belongs to
    pub fn module(&self) -> &ModuleId {
        &self.module
    }

    /// Acquire the module read lock
    pub fn read(&self) -> ModuleReadGuard {
        self.lock.read()
    }

    /// Acquire the module write lock
    pub fn write(&self) -> ModuleWriteGuard {
        self.lock.write()
    }

    /// The module lock
    pub fn lock(&self) -> &ModuleLock {
        &self.lock
    }

    /// Remembered entity versions
    pub fn versions(&self) -> &EntityStateVersions {
        &self.versions
    }
}
