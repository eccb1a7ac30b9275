//! Entity version cache and conflict detection
//!
//! Rules:
//! - A unit of work conflicts when an entity it READ changed since the read
//! - The remembered version is the reference; when nothing is remembered
//!   (the entry was forgotten by another commit), the store's version is used
//! - An entity removed since the read conflicts too
//! - Blind writes do NOT conflict (nothing was read)

use dashmap::DashMap;

use quilt_core::{EntityReference, EntityStore, EntityVersion, ModuleId, QuiltError, QuiltResult};

/// A loaded entity whose version changed before commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConflict {
    /// Entity that changed
    pub identity: EntityReference,
    /// Version the unit of work loaded
    pub read_version: EntityVersion,
    /// Version known at validation time; `None` if the entity is gone
    pub current_version: Option<EntityVersion>,
}

/// Result of validating the states loaded by a unit of work
///
/// A unit of work may apply its changes only if `is_valid()` returns true.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// All conflicts detected during validation
    pub conflicts: Vec<VersionConflict>,
}

impl ValidationResult {
    /// Create a successful validation result (no conflicts)
    pub fn ok() -> Self {
        Self::default()
    }

    /// Check if validation passed (no conflicts)
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Changed identities, each once, in detection order
    pub fn identities(&self) -> Vec<EntityReference> {
        let mut identities: Vec<EntityReference> = Vec::with_capacity(self.conflicts.len());
        for conflict in &self.conflicts {
            if !identities.contains(&conflict.identity) {
                identities.push(conflict.identity.clone());
            }
        }
        identities
    }

    /// Turn the result into `ConcurrentModification` unless it is valid
    ///
    /// # Errors
    ///
    /// `ConcurrentModification` listing the changed identities.
    pub fn into_result(self, module: &ModuleId) -> QuiltResult<()> {
        if self.is_valid() {
            return Ok(());
        }
        Err(QuiltError::ConcurrentModification {
            module: module.clone(),
            identities: self.identities(),
        })
    }
}

/// Last known version of each entity loaded in one module
///
/// Written under the module read lock while loading, pruned under the write
/// lock when a unit of work commits or discards. Entries of units of work
/// that are never finished stay until the module is dropped.
#[derive(Debug, Default)]
pub struct EntityStateVersions {
    versions: DashMap<EntityReference, EntityVersion>,
}

impl EntityStateVersions {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the version an entity was loaded at
    pub fn remember(&self, identity: EntityReference, version: EntityVersion) {
        self.versions.insert(identity, version);
    }

    /// Version remembered for an entity
    pub fn remembered(&self, identity: &EntityReference) -> Option<EntityVersion> {
        self.versions.get(identity).map(|v| *v.value())
    }

    /// Forget the remembered versions of entities
    pub fn forget<'a, I>(&self, identities: I)
    where
        I: IntoIterator<Item = &'a EntityReference>,
    {
        for identity in identities {
            self.versions.remove(identity);
        }
    }

    /// Number of remembered entities
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Check whether nothing is remembered
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Validate loaded versions
    ///
    /// For each `(identity, read_version)`, the current version is the
    /// remembered one or, when none is remembered, the store's.
    ///
    /// # Errors
    ///
    /// Store errors propagate unchanged; conflicts are reported in the result.
    pub fn validate(
        &self,
        loaded: &[(EntityReference, EntityVersion)],
        module: &ModuleId,
        store: &dyn EntityStore,
    ) -> QuiltResult<ValidationResult> {
        let mut result = ValidationResult::ok();

        for (identity, read_version) in loaded {
            let current_version = match self.remembered(identity) {
                Some(version) => Some(version),
                None => store.version_of(module, identity)?,
            };
            if current_version != Some(*read_version) {
                result.conflicts.push(VersionConflict {
                    identity: identity.clone(),
                    read_version: *read_version,
                    current_version,
                });
            }
        }

        Ok(result)
    }
}
