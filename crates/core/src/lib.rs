//! Core types and traits for Quilt
//!
//! This crate defines the foundational types used throughout the system:
//! - Identifiers: CapabilityId, FragmentId, MethodId, Marker, ConstraintId
//! - Descriptors: MethodDescriptor, ParamDescriptor, ValueKind
//! - Value: Dynamic argument/result type for composite calls
//! - Error: Error taxonomy (configuration, invocation, persistence)
//! - Traits: Fragment contracts (CoreFragment, Decorator, Assertion, Constraint)
//!   and the storage collaborator (EntityStore, EntityStoreUnitOfWork, StateCommitter)
//! - Entity types: EntityReference, EntityVersion, EntityState, ModuleId, Usecase

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod entity;
pub mod error;
pub mod traits;
pub mod types;
pub mod value;

pub use entity::{EntityReference, EntityState, EntityStatus, EntityVersion, ModuleId, Usecase};
pub use error::{AssertionPhase, QuiltError, QuiltResult};
pub use traits::{
    Assertion, Call, CompositeRef, Constraint, CoreFragment, Decorator, EntityStore,
    EntityStoreUnitOfWork, FragmentContext, Next, StateCommitter,
};
pub use types::{
    CapabilityId, ConstraintId, FragmentId, Marker, MethodDescriptor, MethodId, ParamDescriptor,
    ValueKind,
};
pub use value::{Handle, Value};
