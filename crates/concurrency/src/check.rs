//! Concurrent-modification check
//!
//! [`ConcurrentModificationCheck`] decorates an entity store. Every unit of
//! work it hands out remembers the versions of the states it loads; when the
//! unit of work applies its changes, those versions are validated under the
//! module write lock, which the returned committer keeps until `commit` or
//! `cancel`.
//!
//! # Lock spans
//!
//! | Operation | Lock |
//! |---|---|
//! | `get_entity_state` | read, for the call |
//! | `apply_changes` | write, until the committer finishes (or for the call on failure) |
//! | `discard` | write, while forgetting versions |
//! | everything else | none |

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{error, warn};

use quilt_core::{
    EntityReference, EntityState, EntityStore, EntityStoreUnitOfWork, EntityVersion, ModuleId,
    QuiltError, QuiltResult, StateCommitter, Usecase, Value,
};

use crate::lock::ModuleWriteGuard;
use crate::module::ModuleConcurrency;

/// Entity store decorator detecting concurrent modifications
///
/// Module state is created on first use, or attached beforehand with
/// [`ConcurrentModificationCheck::attach`] to share it with other checks.
pub struct ConcurrentModificationCheck {
    delegate: Arc<dyn EntityStore>,
    modules: DashMap<ModuleId, Arc<ModuleConcurrency>>,
}

impl ConcurrentModificationCheck {
    /// Decorate a store
    pub fn wrap(delegate: Arc<dyn EntityStore>) -> Self {
        Self {
            delegate,
            modules: DashMap::new(),
        }
    }

    /// The decorated store
    pub fn delegate(&self) -> &Arc<dyn EntityStore> {
        &self.delegate
    }

    /// Use `state` for its module, returning the state it replaces
    pub fn attach(&self, state: Arc<ModuleConcurrency>) -> Option<Arc<ModuleConcurrency>> {
        self.modules.insert(state.module().clone(), state)
    }

    /// Concurrency state of a module
    pub fn module(&self, module: &ModuleId) -> Arc<ModuleConcurrency> {
        if let Some(state) = self.modules.get(module) {
            return Arc::clone(state.value());
        }
        Arc::clone(
            self.modules
                .entry(module.clone())
                .or_insert_with(|| Arc::new(ModuleConcurrency::new(module.clone())))
                .value(),
        )
    }

    /// Put a unit of work of the decorated store under the check
    pub fn check(&self, unit_of_work: Box<dyn EntityStoreUnitOfWork>) -> CheckedUnitOfWork {
        let concurrency = self.module(unit_of_work.module());
        CheckedUnitOfWork {
            delegate: unit_of_work,
            concurrency,
            store: Arc::clone(&self.delegate),
            loaded: Vec::new(),
            written: Vec::new(),
        }
    }
}

impl EntityStore for ConcurrentModificationCheck {
    fn new_unit_of_work(
        &self,
        usecase: &Usecase,
        module: &ModuleId,
    ) -> QuiltResult<Box<dyn EntityStoreUnitOfWork>> {
        let unit_of_work = self.delegate.new_unit_of_work(usecase, module)?;
        Ok(Box::new(self.check(unit_of_work)))
    }

    fn version_of(
        &self,
        module: &ModuleId,
        identity: &EntityReference,
    ) -> QuiltResult<Option<EntityVersion>> {
        self.delegate.version_of(module, identity)
    }
}

impl fmt::Debug for ConcurrentModificationCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentModificationCheck")
            .field("modules", &self.modules.len())
            .finish()
    }
}

/// Unit of work under the concurrent-modification check
pub struct CheckedUnitOfWork {
    delegate: Box<dyn EntityStoreUnitOfWork>,
    concurrency: Arc<ModuleConcurrency>,
    store: Arc<dyn EntityStore>,
    loaded: Vec<(EntityReference, EntityVersion)>,
    written: Vec<EntityReference>,
}

impl CheckedUnitOfWork {
    /// States loaded so far, with the version each was loaded at
    pub fn loaded(&self) -> &[(EntityReference, EntityVersion)] {
        &self.loaded
    }

    /// Concurrency state of the unit-of-work's module
    pub fn concurrency(&self) -> &Arc<ModuleConcurrency> {
        &self.concurrency
    }

    fn forgettable(&self) -> Vec<EntityReference> {
        let mut identities: Vec<EntityReference> =
            self.loaded.iter().map(|(id, _)| id.clone()).collect();
        identities.extend(self.written.iter().cloned());
        identities.sort();
        identities.dedup();
        identities
    }
}

impl EntityStoreUnitOfWork for CheckedUnitOfWork {
    fn identity(&self) -> &str {
        self.delegate.identity()
    }

    fn module(&self) -> &ModuleId {
        self.delegate.module()
    }

    fn new_entity_state(
        &mut self,
        identity: EntityReference,
        data: Value,
    ) -> QuiltResult<EntityState> {
        self.delegate.new_entity_state(identity, data)
    }

    fn get_entity_state(&mut self, identity: &EntityReference) -> QuiltResult<EntityState> {
        let _guard = self.concurrency.read();
        let state = self.delegate.get_entity_state(identity)?;
        if !state.is_new() {
            self.concurrency
                .versions()
                .remember(state.identity.clone(), state.version);
            self.loaded.push((state.identity.clone(), state.version));
        }
        Ok(state)
    }

    fn update_entity_state(&mut self, state: EntityState) -> QuiltResult<()> {
        let identity = state.identity.clone();
        self.delegate.update_entity_state(state)?;
        self.written.push(identity);
        Ok(())
    }

    fn remove_entity_state(&mut self, identity: &EntityReference) -> QuiltResult<()> {
        self.delegate.remove_entity_state(identity)?;
        self.written.push(identity.clone());
        Ok(())
    }

    fn apply_changes(&mut self) -> QuiltResult<Box<dyn StateCommitter>> {
        let guard = self.concurrency.write();
        let module = self.concurrency.module();

        let validation =
            self.concurrency
                .versions()
                .validate(&self.loaded, module, self.store.as_ref())?;
        if !validation.is_valid() {
            warn!(
                target: "quilt::concurrency",
                unit_of_work = %self.delegate.identity(),
                module = %module,
                conflicts = validation.conflicts.len(),
                "Concurrent modification detected"
            );
        }
        validation.into_result(module)?;

        let committer = self.delegate.apply_changes()?;
        Ok(Box::new(CheckedCommitter {
            delegate: committer,
            concurrency: Arc::clone(&self.concurrency),
            guard: Some(guard),
            identities: self.forgettable(),
            unit_of_work: self.delegate.identity().to_string(),
        }))
    }

    fn discard(&mut self) -> QuiltResult<()> {
        let result = self.delegate.discard();
        if let Err(e) = &result {
            error!(
                target: "quilt::concurrency",
                unit_of_work = %self.delegate.identity(),
                error = %e,
                "Discard failed, forgetting loaded versions anyway"
            );
        }

        {
            let _guard = self.concurrency.write();
            self.concurrency
                .versions()
                .forget(self.loaded.iter().map(|(id, _)| id));
        }
        self.loaded.clear();
        result
    }
}

impl fmt::Debug for CheckedUnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckedUnitOfWork")
            .field("identity", &self.delegate.identity())
            .field("module", self.concurrency.module())
            .field("loaded", &self.loaded.len())
            .field("written", &self.written.len())
            .finish()
    }
}

/// Committer holding the module write lock until it finishes
///
/// Dropping it without `commit` or `cancel` cancels.
pub struct CheckedCommitter {
    delegate: Box<dyn StateCommitter>,
    concurrency: Arc<ModuleConcurrency>,
    guard: Option<ModuleWriteGuard>,
    identities: Vec<EntityReference>,
    unit_of_work: String,
}

impl CheckedCommitter {
    /// Check whether `commit` or `cancel` already ran
    pub fn is_finished(&self) -> bool {
        self.guard.is_none()
    }

    fn release(&mut self) {
        self.concurrency.versions().forget(&self.identities);
        self.guard = None;
    }
}

impl StateCommitter for CheckedCommitter {
    fn commit(&mut self) -> QuiltResult<()> {
        if self.is_finished() {
            return Err(QuiltError::InvalidState(format!(
                "unit of work {} was already committed or cancelled",
                self.unit_of_work
            )));
        }
        let result = self.delegate.commit();
        self.release();
        result
    }

    fn cancel(&mut self) {
        if self.is_finished() {
            return;
        }
        self.delegate.cancel();
        self.release();
    }
}

impl Drop for CheckedCommitter {
    fn drop(&mut self) {
        if !self.is_finished() {
            warn!(
                target: "quilt::concurrency",
                unit_of_work = %self.unit_of_work,
                module = %self.concurrency.module(),
                "Committer dropped without commit or cancel, cancelling"
            );
            self.cancel();
        }
    }
}

impl fmt::Debug for CheckedCommitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckedCommitter")
            .field("unit_of_work", &self.unit_of_work)
            .field("finished", &self.is_finished())
            .finish()
    }
}
