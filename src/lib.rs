//! Quilt - composition runtime for capability contracts
//!
//! A capability is an abstract contract (a set of method signatures) that may
//! extend other capabilities. Its implementation is assembled from fragments:
//! core fragments implement methods, decorators wrap them, assertions check
//! them, and constraints validate their arguments. The runtime resolves each
//! capability once into an immutable dispatch model and creates any number
//! of composites from it.
//!
//! # Quick Start
//!
//! ```ignore
//! use quilt::{CapabilityRegistry, CapabilityType, Dispatcher, FragmentDescriptor, MethodDescriptor, Value};
//!
//! let registry = CapabilityRegistry::builder()
//!     .register(
//!         CapabilityType::contract("Greeter")
//!             .method(MethodDescriptor::new("greet"))
//!             .core(FragmentDescriptor::core("Hello", |_| {
//!                 Ok(|_call: &mut quilt::Call<'_>| Ok(Value::from("hello")))
//!             })),
//!     )
//!     .build()?;
//!
//! let dispatcher = Dispatcher::new(registry)?;
//! let greeter = dispatcher.new_instance(&"Greeter".into(), vec![])?;
//! assert_eq!(greeter.invoke("greet", vec![])?, Value::from("hello"));
//! ```
//!
//! # Architecture
//!
//! - `quilt-core`: identifiers, values, errors, fragment and storage traits
//! - `quilt-model`: declarations, graph walk, resolution, model cache
//! - `quilt-engine`: dispatcher, composites, fragment pool, configuration
//! - `quilt-storage`: in-memory entity store
//! - `quilt-concurrency`: optimistic concurrent-modification check

pub use quilt_core::{
    Assertion, AssertionPhase, Call, CapabilityId, CompositeRef, Constraint, ConstraintId,
    CoreFragment, Decorator, EntityReference, EntityState, EntityStatus, EntityStore,
    EntityStoreUnitOfWork, EntityVersion, FragmentContext, FragmentId, Handle, Marker,
    MethodDescriptor, MethodId, ModuleId, Next, ParamDescriptor, QuiltError, QuiltResult,
    StateCommitter, Usecase, Value, ValueKind,
};
pub use quilt_model::{
    abstract_methods, resolve, walk, CapabilityRegistry, CapabilityRegistryBuilder,
    CapabilityType, ChainSummary, ConstraintDeclaration, DispatchModel, FragmentDescriptor,
    FragmentKind, MethodChain, ModelCache, ResolutionMode, Surface,
};
pub use quilt_engine::{
    Composite, Dispatcher, FragmentPool, PoolMetrics, RuntimeConfig, Wrapped, CONFIG_FILE_NAME,
};
pub use quilt_storage::MemoryEntityStore;
pub use quilt_concurrency::{
    entity_store_capability, CheckedUnitOfWork, ConcurrentModificationCheck, ModuleConcurrency,
    UnitOfWorkHandle, ENTITY_STORE_CAPABILITY,
};
