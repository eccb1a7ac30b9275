//! Storage layer for Quilt
//!
//! This crate provides the reference storage collaborator:
//! - MemoryEntityStore: DashMap of per-module shards, each behind a RwLock
//! - MemoryUnitOfWork: buffered changes with read-your-writes
//! - MemoryCommitter: all-or-nothing application of a unit-of-work
//!
//! Versions start at `EntityVersion::INITIAL` and advance by one per
//! committed update. The store performs no conflict detection of its own.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;

pub use memory::{MemoryCommitter, MemoryEntityStore, MemoryUnitOfWork};
