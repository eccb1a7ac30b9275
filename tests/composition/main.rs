//! Composition Integration Tests
//!
//! End-to-end tests through the `quilt` facade: capability graphs resolved
//! into dispatch models, composites and casts, the runtime configuration,
//! and units of work obtained through the `EntityStore` capability.

#[path = "../common/mod.rs"]
mod common;

mod configuration;
mod contracts;
mod persistence;
