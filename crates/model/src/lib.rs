//! Capability resolution for Quilt
//!
//! This crate turns declared capability types into dispatch models:
//! - declaration: CapabilityType, FragmentDescriptor, ConstraintDeclaration
//! - registry: CapabilityRegistry (built once by the assembly layer)
//! - walker: depth-first, left-to-right traversal with cycle detection
//! - resolver: per-method core, decorators, assertions and constraints
//! - dispatch: the immutable DispatchModel
//! - cache: ModelCache memoizing one model per type and mode

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod declaration;
pub mod dispatch;
pub mod registry;
pub mod resolver;
pub mod walker;

pub use cache::ModelCache;
pub use declaration::{
    CapabilityType, ConstraintDeclaration, FragmentDeclaration, FragmentDescriptor,
    FragmentFactory, FragmentInstance, FragmentKind, Surface,
};
pub use dispatch::{ChainSummary, DispatchModel, MethodChain, ParamConstraints, ResolutionMode};
pub use registry::{CapabilityRegistry, CapabilityRegistryBuilder};
pub use resolver::resolve;
pub use walker::{abstract_methods, walk};
