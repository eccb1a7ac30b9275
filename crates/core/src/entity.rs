//! Entity types shared with the storage collaborator
//!
//! This module defines:
//! - EntityReference: Identity of a persisted entity
//! - EntityVersion: Opaque version token (equality only)
//! - EntityState: Identity, version, status and data of a loaded entity
//! - ModuleId / Usecase: Scope and purpose of a unit-of-work

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::string_id;
use crate::value::Value;

string_id!(
    /// Identity of a persisted entity
    EntityReference
);

string_id!(
    /// Identifier of a module; entity stores and version caches are scoped to one module
    ModuleId
);

/// Opaque version token of a persisted entity
///
/// Versions are compared for equality only: a differing version means
/// "changed since read", nothing more. No ordering is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityVersion(u64);

impl EntityVersion {
    /// Version assigned to an entity when it is first persisted
    pub const INITIAL: EntityVersion = EntityVersion(1);

    /// Create a version from a raw token
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Version following this one
    pub fn next(&self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Raw token (for storage implementations)
    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Lifecycle status of an entity state within a unit-of-work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityStatus {
    /// Created in this unit-of-work, not yet persisted
    New,
    /// Loaded from the store, unchanged
    Loaded,
    /// Loaded and modified in this unit-of-work
    Updated,
    /// Marked for removal in this unit-of-work
    Removed,
}

/// State of an entity as seen by a unit-of-work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// Entity identity
    pub identity: EntityReference,
    /// Version the state was loaded at (or will be created at)
    pub version: EntityVersion,
    /// Status within the owning unit-of-work
    pub status: EntityStatus,
    /// Entity data
    pub data: Value,
}

impl EntityState {
    /// State of a freshly created entity
    pub fn new(identity: EntityReference, data: Value) -> Self {
        Self {
            identity,
            version: EntityVersion::INITIAL,
            status: EntityStatus::New,
            data,
        }
    }

    /// State loaded from the store at `version`
    pub fn loaded(identity: EntityReference, version: EntityVersion, data: Value) -> Self {
        Self {
            identity,
            version,
            status: EntityStatus::Loaded,
            data,
        }
    }

    /// Replace the data, marking a loaded state as updated
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        if self.status == EntityStatus::Loaded {
            self.status = EntityStatus::Updated;
        }
        self
    }

    /// Check whether the state was created in the current unit-of-work
    pub fn is_new(&self) -> bool {
        self.status == EntityStatus::New
    }
}

/// Purpose of a unit-of-work (used for diagnostics by stores)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Usecase {
    /// Use case name
    pub name: String,
}

impl Usecase {
    /// Create a named use case
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for Usecase {
    fn default() -> Self {
        Self::new("default")
    }
}
