//! In-memory entity store
//!
//! # Design
//!
//! - DashMap of modules: units of work on different modules never contend
//! - One `RwLock<FxHashMap>` per module: a commit applies all of its
//!   changes under a single write lock, so readers never see half of it
//! - Units of work buffer their changes until commit
//!
//! # Version Handling
//!
//! Each committed create writes `EntityVersion::INITIAL`; each committed
//! update writes the successor of the stored version. Versions are never
//! reused for an identity while it exists.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::debug;
use uuid::Uuid;

use quilt_core::{
    EntityReference, EntityState, EntityStatus, EntityStore, EntityStoreUnitOfWork,
    EntityVersion, ModuleId, QuiltError, QuiltResult, StateCommitter, Usecase, Value,
};

#[derive(Debug, Clone)]
struct StoredEntity {
    version: EntityVersion,
    data: Value,
}

type Shard = Arc<RwLock<FxHashMap<EntityReference, StoredEntity>>>;

/// In-memory storage collaborator
#[derive(Debug, Default)]
pub struct MemoryEntityStore {
    modules: DashMap<ModuleId, Shard>,
}

impl MemoryEntityStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn shard(&self, module: &ModuleId) -> Shard {
        Arc::clone(self.modules.entry(module.clone()).or_default().value())
    }

    /// Current version and data of an entity
    pub fn get(&self, module: &ModuleId, identity: &EntityReference) -> Option<(EntityVersion, Value)> {
        let shard = self.modules.get(module)?;
        let entities = shard.read();
        entities
            .get(identity)
            .map(|e| (e.version, e.data.clone()))
    }

    /// Number of entities stored for a module
    pub fn entity_count(&self, module: &ModuleId) -> usize {
        self.modules
            .get(module)
            .map(|shard| {
                let entities = shard.read();
                entities.len()
            })
            .unwrap_or(0)
    }
}

impl EntityStore for MemoryEntityStore {
    fn new_unit_of_work(
        &self,
        usecase: &Usecase,
        module: &ModuleId,
    ) -> QuiltResult<Box<dyn EntityStoreUnitOfWork>> {
        Ok(Box::new(MemoryUnitOfWork {
            identity: Uuid::new_v4().to_string(),
            usecase: usecase.clone(),
            module: module.clone(),
            shard: self.shard(module),
            changes: FxHashMap::default(),
            order: Vec::new(),
            open: true,
        }))
    }

    fn version_of(
        &self,
        module: &ModuleId,
        identity: &EntityReference,
    ) -> QuiltResult<Option<EntityVersion>> {
        Ok(self.modules.get(module).and_then(|shard| {
            let entities = shard.read();
            entities.get(identity).map(|e| e.version)
        }))
    }
}

/// A buffered change to one entity
#[derive(Debug, Clone)]
enum Change {
    Create(Value),
    Update(Value),
    Remove,
}

/// Unit of work over one module of a [`MemoryEntityStore`]
///
/// Reads see the unit-of-work's own pending changes first.
#[derive(Debug)]
pub struct MemoryUnitOfWork {
    identity: String,
    usecase: Usecase,
    module: ModuleId,
    shard: Shard,
    changes: FxHashMap<EntityReference, Change>,
    order: Vec<EntityReference>,
    open: bool,
}

impl MemoryUnitOfWork {
    /// Use case the unit-of-work was opened for
    pub fn usecase(&self) -> &Usecase {
        &self.usecase
    }

    /// Number of buffered changes
    pub fn pending_changes(&self) -> usize {
        self.changes.len()
    }

    fn ensure_open(&self) -> QuiltResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(QuiltError::InvalidState(format!(
                "unit of work {} is no longer open",
                self.identity
            )))
        }
    }

    fn record(&mut self, identity: EntityReference, change: Change) {
        if !self.changes.contains_key(&identity) {
            self.order.push(identity.clone());
        }
        self.changes.insert(identity, change);
    }

    fn forget(&mut self, identity: &EntityReference) {
        self.changes.remove(identity);
        self.order.retain(|i| i != identity);
    }

    fn stored(&self, identity: &EntityReference) -> Option<StoredEntity> {
        self.shard.read().get(identity).cloned()
    }
}

impl EntityStoreUnitOfWork for MemoryUnitOfWork {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn module(&self) -> &ModuleId {
        &self.module
    }

    fn new_entity_state(
        &mut self,
        identity: EntityReference,
        data: Value,
    ) -> QuiltResult<EntityState> {
        self.ensure_open()?;
        let exists = match self.changes.get(&identity) {
            Some(Change::Remove) => false,
            Some(_) => true,
            None => self.stored(&identity).is_some(),
        };
        if exists {
            return Err(QuiltError::EntityAlreadyExists(identity));
        }
        // Re-creating an entity removed in this unit-of-work replaces it
        let change = match self.changes.get(&identity) {
            Some(Change::Remove) => Change::Update(data.clone()),
            _ => Change::Create(data.clone()),
        };
        self.record(identity.clone(), change);
        Ok(EntityState::new(identity, data))
    }

    fn get_entity_state(&mut self, identity: &EntityReference) -> QuiltResult<EntityState> {
        self.ensure_open()?;
        let stored = self.stored(identity);
        match (self.changes.get(identity), stored) {
            (Some(Change::Remove), _) => Err(QuiltError::EntityNotFound(identity.clone())),
            (Some(Change::Create(data)), _) => Ok(EntityState::new(identity.clone(), data.clone())),
            (Some(Change::Update(data)), Some(stored)) => Ok(EntityState {
                identity: identity.clone(),
                version: stored.version,
                status: EntityStatus::Updated,
                data: data.clone(),
            }),
            (Some(Change::Update(_)), None) | (None, None) => {
                Err(QuiltError::EntityNotFound(identity.clone()))
            }
            (None, Some(stored)) => Ok(EntityState::loaded(
                identity.clone(),
                stored.version,
                stored.data,
            )),
        }
    }

    fn update_entity_state(&mut self, state: EntityState) -> QuiltResult<()> {
        self.ensure_open()?;
        if state.status == EntityStatus::Removed {
            return self.remove_entity_state(&state.identity);
        }
        match self.changes.get(&state.identity) {
            Some(Change::Create(_)) => {
                self.record(state.identity, Change::Create(state.data));
                Ok(())
            }
            Some(Change::Remove) => Err(QuiltError::EntityNotFound(state.identity)),
            Some(Change::Update(_)) => {
                self.record(state.identity, Change::Update(state.data));
                Ok(())
            }
            None if self.stored(&state.identity).is_some() => {
                self.record(state.identity, Change::Update(state.data));
                Ok(())
            }
            None => Err(QuiltError::EntityNotFound(state.identity)),
        }
    }

    fn remove_entity_state(&mut self, identity: &EntityReference) -> QuiltResult<()> {
        self.ensure_open()?;
        match self.changes.get(identity) {
            Some(Change::Create(_)) => {
                self.forget(identity);
                Ok(())
            }
            Some(Change::Remove) => Err(QuiltError::EntityNotFound(identity.clone())),
            Some(Change::Update(_)) => {
                self.record(identity.clone(), Change::Remove);
                Ok(())
            }
            None if self.stored(identity).is_some() => {
                self.record(identity.clone(), Change::Remove);
                Ok(())
            }
            None => Err(QuiltError::EntityNotFound(identity.clone())),
        }
    }

    fn apply_changes(&mut self) -> QuiltResult<Box<dyn StateCommitter>> {
        self.ensure_open()?;
        self.open = false;
        let mut changes = std::mem::take(&mut self.changes);
        let ordered = std::mem::take(&mut self.order)
            .into_iter()
            .filter_map(|id| changes.remove(&id).map(|c| (id, c)))
            .collect();
        Ok(Box::new(MemoryCommitter {
            unit_of_work: self.identity.clone(),
            module: self.module.clone(),
            shard: Arc::clone(&self.shard),
            changes: ordered,
            done: false,
        }))
    }

    fn discard(&mut self) -> QuiltResult<()> {
        self.open = false;
        self.changes.clear();
        self.order.clear();
        Ok(())
    }
}

/// Applies the changes of one unit-of-work
///
/// Commit validates every change against the current store contents before
/// applying any of them.
#[derive(Debug)]
pub struct MemoryCommitter {
    unit_of_work: String,
    module: ModuleId,
    shard: Shard,
    changes: Vec<(EntityReference, Change)>,
    done: bool,
}

impl StateCommitter for MemoryCommitter {
    fn commit(&mut self) -> QuiltResult<()> {
        if self.done {
            return Err(QuiltError::InvalidState(format!(
                "changes of unit of work {} were already committed or cancelled",
                self.unit_of_work
            )));
        }

        let mut entities = self.shard.write();
        for (identity, change) in &self.changes {
            let exists = entities.contains_key(identity);
            match change {
                Change::Create(_) if exists => {
                    return Err(QuiltError::EntityAlreadyExists(identity.clone()))
                }
                Change::Update(_) | Change::Remove if !exists => {
                    return Err(QuiltError::EntityNotFound(identity.clone()))
                }
                _ => {}
            }
        }

        for (identity, change) in std::mem::take(&mut self.changes) {
            match change {
                Change::Create(data) => {
                    entities.insert(
                        identity,
                        StoredEntity {
                            version: EntityVersion::INITIAL,
                            data,
                        },
                    );
                }
                Change::Update(data) => {
                    if let Some(entity) = entities.get_mut(&identity) {
                        entity.version = entity.version.next();
                        entity.data = data;
                    }
                }
                Change::Remove => {
                    entities.remove(&identity);
                }
            }
        }
        self.done = true;
        debug!(
            target: "quilt::storage",
            unit_of_work = %self.unit_of_work,
            module = %self.module,
            "Committed unit of work"
        );
        Ok(())
    }

    fn cancel(&mut self) {
        self.done = true;
        self.changes.clear();
    }
}
