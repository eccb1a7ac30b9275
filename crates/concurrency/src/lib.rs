//! Optimistic concurrency for entity stores
//!
//! This crate wraps any [`EntityStore`](quilt_core::EntityStore) with a
//! concurrent-modification check:
//! - EntityStateVersions: versions of entities loaded by open units of work
//! - ModuleLock: reentrant read/write lock, one per module
//! - ConcurrentModificationCheck: store decorator validating loaded versions
//!   when a unit of work applies its changes
//! - Bridge: an `EntityStore` capability putting the check into a dispatch chain
//!
//! Key rules:
//! - Conflicts are detected on versions READ, not on entities written
//! - Blind writes (write without read) never conflict
//! - New entity states are never checked
//! - Commits are totally ordered by write-lock acquisition

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bridge;
pub mod check;
pub mod lock;
pub mod module;
pub mod versions;

pub use bridge::{entity_store_capability, UnitOfWorkHandle, ENTITY_STORE_CAPABILITY};
pub use check::{CheckedCommitter, CheckedUnitOfWork, ConcurrentModificationCheck};
pub use lock::{ModuleLock, ModuleReadGuard, ModuleWriteGuard};
pub use module::ModuleConcurrency;
pub use versions::{EntityStateVersions, ValidationResult, VersionConflict};
