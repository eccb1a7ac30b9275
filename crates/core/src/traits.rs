//! Core traits for fragments and the storage collaborator
//!
//! Fragments are the pieces a composite is assembled from:
//! - [`CoreFragment`]: primary implementation of one or more methods
//! - [`Decorator`]: wraps the call to the next link of the chain
//! - [`Assertion`]: checks invoked before and after the core
//! - [`Constraint`]: argument predicate evaluated before anything else
//!
//! The storage collaborator ([`EntityStore`], [`EntityStoreUnitOfWork`],
//! [`StateCommitter`]) is defined here so that decorators over it can live
//! in separate crates without depending on a concrete store.
//!
//! Thread safety: fragment instances may be shared between composites (when
//! declared stateless) and between threads, so all fragment traits require
//! `Send + Sync`.

use std::sync::{Arc, Weak};

use crate::entity::{EntityReference, EntityState, EntityVersion, ModuleId, Usecase};
use crate::error::{QuiltError, QuiltResult};
use crate::types::{CapabilityId, MethodDescriptor};
use crate::value::Value;

// ============================================================================
// Calls and composite identity
// ============================================================================

/// A call travelling through a composite's chain
///
/// Decorators may rewrite `args` before proceeding.
#[derive(Debug)]
pub struct Call<'a> {
    /// Capability of the invoked composite
    pub capability: &'a CapabilityId,
    /// Invoked method
    pub method: &'a MethodDescriptor,
    /// Arguments, in parameter order
    pub args: Vec<Value>,
}

impl<'a> Call<'a> {
    /// Create a call
    pub fn new(capability: &'a CapabilityId, method: &'a MethodDescriptor, args: Vec<Value>) -> Self {
        Self {
            capability,
            method,
            args,
        }
    }

    /// Get an argument by position
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the position is out of range.
    pub fn arg(&self, index: usize) -> QuiltResult<&Value> {
        self.args.get(index).ok_or_else(|| QuiltError::InvalidArgument {
            capability: self.capability.clone(),
            method: self.method.name.clone(),
            reason: format!("missing argument at position {}", index),
        })
    }

    /// Get an argument by position as an integer
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the argument is missing or not an `Int`.
    pub fn int_arg(&self, index: usize) -> QuiltResult<i64> {
        let value = self.arg(index)?;
        value.as_int().ok_or_else(|| self.type_error(index, "Int", value))
    }

    /// Get an argument by position as a string slice
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the argument is missing or not a `String`.
    pub fn str_arg(&self, index: usize) -> QuiltResult<&str> {
        let value = self.arg(index)?;
        value.as_str().ok_or_else(|| self.type_error(index, "String", value))
    }

    fn type_error(&self, index: usize, expected: &str, found: &Value) -> QuiltError {
        QuiltError::InvalidArgument {
            capability: self.capability.clone(),
            method: self.method.name.clone(),
            reason: format!(
                "argument {} should be {}, found {}",
                index,
                expected,
                found.type_name()
            ),
        }
    }
}

/// Handle to a live composite, as seen by its own fragments
pub trait CompositeRef: Send + Sync {
    /// Capability implemented by the composite
    fn capability(&self) -> &CapabilityId;

    /// Invoke a method through the composite's full chain
    ///
    /// # Errors
    ///
    /// Returns any error raised along the chain.
    fn invoke(&self, method: &str, args: Vec<Value>) -> QuiltResult<Value>;
}

/// Construction context handed to fragment factories
///
/// Fragments that need "the whole composite" rather than themselves get it
/// from [`FragmentContext::this`]. The handle is weak so that fragments
/// stored inside a composite do not keep it alive. Stateless (pooled)
/// fragments are shared between composites and receive a detached context.
#[derive(Clone)]
pub struct FragmentContext {
    this: Option<Weak<dyn CompositeRef>>,
    args: Arc<[Value]>,
}

impl FragmentContext {
    /// Context bound to a composite
    pub fn new(this: Weak<dyn CompositeRef>, args: Arc<[Value]>) -> Self {
        Self {
            this: Some(this),
            args,
        }
    }

    /// Context not bound to any composite
    pub fn detached() -> Self {
        Self {
            this: None,
            args: Arc::from(Vec::new()),
        }
    }

    /// The composite under construction, if bound and still alive
    pub fn this(&self) -> Option<Arc<dyn CompositeRef>> {
        self.this.as_ref().and_then(Weak::upgrade)
    }

    /// Whether the context is bound to a composite
    pub fn is_bound(&self) -> bool {
        self.this.is_some()
    }

    /// Instantiation arguments of the composite
    pub fn args(&self) -> &[Value] {
        &self.args
    }
}

impl std::fmt::Debug for FragmentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentContext")
            .field("bound", &self.is_bound())
            .field("args", &self.args)
            .finish()
    }
}

// ============================================================================
// Fragment traits
// ============================================================================

/// Primary implementation of capability methods
pub trait CoreFragment: Send + Sync {
    /// Execute the method named by `call.method`
    ///
    /// # Errors
    ///
    /// Fragment-specific failures, usually [`QuiltError::Fragment`].
    fn invoke(&self, call: &mut Call<'_>) -> QuiltResult<Value>;
}

impl<F> CoreFragment for F
where
    F: Fn(&mut Call<'_>) -> QuiltResult<Value> + Send + Sync,
{
    fn invoke(&self, call: &mut Call<'_>) -> QuiltResult<Value> {
        self(call)
    }
}

/// The remainder of a chain, as seen by a decorator
pub trait Next {
    /// Invoke the next link
    ///
    /// # Errors
    ///
    /// Returns whatever the next link returns.
    fn proceed(&self, call: &mut Call<'_>) -> QuiltResult<Value>;
}

/// Fragment wrapping the call to the next link
///
/// A decorator may rewrite arguments before calling `next`, rewrite the
/// result afterwards, or return without calling `next` at all. Errors from
/// `next` must be propagated unless the decorator deliberately absorbs them.
pub trait Decorator: Send + Sync {
    /// Handle the call, usually delegating to `next`
    ///
    /// # Errors
    ///
    /// Errors from `next`, or the decorator's own.
    fn invoke(&self, call: &mut Call<'_>, next: &dyn Next) -> QuiltResult<Value>;
}

impl<F> Decorator for F
where
    F: Fn(&mut Call<'_>, &dyn Next) -> QuiltResult<Value> + Send + Sync,
{
    fn invoke(&self, call: &mut Call<'_>, next: &dyn Next) -> QuiltResult<Value> {
        self(call, next)
    }
}

/// Fragment checked before and after the core
///
/// Returning `Err(message)` fails the call with `AssertionFailed`.
pub trait Assertion: Send + Sync {
    /// Check run before the decorator chain
    fn before(&self, _call: &Call<'_>) -> Result<(), String> {
        Ok(())
    }

    /// Check run after the core returned successfully
    fn after(&self, _call: &Call<'_>, _result: &Value) -> Result<(), String> {
        Ok(())
    }
}

/// Argument predicate
pub trait Constraint: Send + Sync {
    /// Whether the value satisfies the constraint
    fn is_valid(&self, value: &Value) -> bool;
}

impl<F> Constraint for F
where
    F: Fn(&Value) -> bool + Send + Sync,
{
    fn is_valid(&self, value: &Value) -> bool {
        self(value)
    }
}

// ============================================================================
// Entity storage
// ============================================================================

/// Storage collaborator for persisted entity state
///
/// Thread safety: stores are shared between threads; every unit-of-work is
/// used by one thread at a time.
pub trait EntityStore: Send + Sync {
    /// Open a unit-of-work against one module
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot start a unit-of-work.
    fn new_unit_of_work(
        &self,
        usecase: &Usecase,
        module: &ModuleId,
    ) -> QuiltResult<Box<dyn EntityStoreUnitOfWork>>;

    /// Authoritative current version of an entity, `None` if it does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn version_of(
        &self,
        module: &ModuleId,
        identity: &EntityReference,
    ) -> QuiltResult<Option<EntityVersion>>;
}

/// An ordered batch of reads and writes against one module
pub trait EntityStoreUnitOfWork: Send {
    /// Unique identity of this unit-of-work
    fn identity(&self) -> &str;

    /// Module the unit-of-work operates on
    fn module(&self) -> &ModuleId;

    /// Create a new entity
    ///
    /// # Errors
    ///
    /// `EntityAlreadyExists` if the identity is taken.
    fn new_entity_state(
        &mut self,
        identity: EntityReference,
        data: Value,
    ) -> QuiltResult<EntityState>;

    /// Load an entity
    ///
    /// # Errors
    ///
    /// `EntityNotFound` if the store has no such identity.
    fn get_entity_state(&mut self, identity: &EntityReference) -> QuiltResult<EntityState>;

    /// Record a modified state for persistence at commit
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be recorded.
    fn update_entity_state(&mut self, state: EntityState) -> QuiltResult<()>;

    /// Record a removal for persistence at commit
    ///
    /// # Errors
    ///
    /// Returns an error if the removal cannot be recorded.
    fn remove_entity_state(&mut self, identity: &EntityReference) -> QuiltResult<()>;

    /// Prepare the recorded changes, returning a deferred committer
    ///
    /// # Errors
    ///
    /// Returns an error if the changes cannot be prepared.
    fn apply_changes(&mut self) -> QuiltResult<Box<dyn StateCommitter>>;

    /// Drop all recorded changes
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to release resources.
    fn discard(&mut self) -> QuiltResult<()>;
}

/// Deferred commit of prepared changes
///
/// Calling `commit` exactly once is the contract. Behaviour of a second call
/// is implementation-defined.
pub trait StateCommitter: Send {
    /// Persist the prepared changes
    ///
    /// # Errors
    ///
    /// Returns an error if the changes cannot be persisted.
    fn commit(&mut self) -> QuiltResult<()>;

    /// Abandon the prepared changes
    fn cancel(&mut self);
}

impl std::fmt::Debug for dyn StateCommitter + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StateCommitter")
    }
}
