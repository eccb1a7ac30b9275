//! Composite instances
//!
//! A [`CompositeInstance`] owns one lazily-filled slot per fragment of its
//! dispatch model. A slot is filled at most once: stateless fragments are
//! taken from the pool, stateful ones are built with a context bound to the
//! composite itself. Callers hold [`Composite`] handles; the instance is
//! reclaimed when the last handle is dropped.
//!
//! Fragment factories must not invoke the composite they are building a
//! fragment for: slot initialization is not reentrant.

use std::fmt;
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;

use quilt_core::{
    Assertion, CapabilityId, Call, CompositeRef, CoreFragment, Decorator, FragmentContext,
    FragmentId, QuiltError, QuiltResult, Value,
};
use quilt_model::{DispatchModel, FragmentInstance, FragmentKind, MethodChain};

use crate::chain;
use crate::pool::FragmentPool;

/// Object wrapped by a cast composite
#[derive(Clone)]
pub enum Wrapped {
    /// A host object implementing the whole contract
    Object(Arc<dyn CoreFragment>),
    /// Another (non-wrapping) composite
    Composite(Composite),
}

impl Wrapped {
    fn invoke(&self, call: &mut Call<'_>) -> QuiltResult<Value> {
        match self {
            Wrapped::Object(object) => object.invoke(call),
            Wrapped::Composite(composite) => {
                composite.invoke(call.method.name.as_str(), call.args.clone())
            }
        }
    }

    fn identity(&self) -> *const () {
        match self {
            Wrapped::Object(object) => Arc::as_ptr(object) as *const (),
            Wrapped::Composite(composite) => composite.identity(),
        }
    }
}

impl fmt::Debug for Wrapped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Wrapped::Object(object) => write!(f, "Object({:p})", Arc::as_ptr(object) as *const ()),
            Wrapped::Composite(composite) => f.debug_tuple("Composite").field(composite).finish(),
        }
    }
}

pub(crate) struct CompositeInstance {
    model: Arc<DispatchModel>,
    pool: Arc<FragmentPool>,
    slots: Box<[OnceCell<FragmentInstance>]>,
    context: FragmentContext,
    wrapped: Option<Wrapped>,
}

impl CompositeInstance {
    pub(crate) fn capability(&self) -> &CapabilityId {
        self.model.capability()
    }

    pub(crate) fn fragment_id(&self, index: usize) -> FragmentId {
        self.model.fragments()[index].id().clone()
    }

    fn slot(&self, index: usize) -> QuiltResult<&FragmentInstance> {
        let descriptor = &self.model.fragments()[index];
        self.slots[index]
            .get_or_try_init(|| match self.pool.acquire(descriptor)? {
                Some(shared) => Ok(shared),
                None => descriptor.instantiate(&self.context),
            })
            .map_err(|e| match e {
                QuiltError::Instantiation { .. } => e,
                other => QuiltError::Instantiation {
                    fragment: descriptor.id().clone(),
                    message: other.to_string(),
                },
            })
    }

    fn kind_mismatch(&self, index: usize, expected: FragmentKind) -> QuiltError {
        QuiltError::InvalidState(format!(
            "fragment '{}' of '{}' is not a {}",
            self.fragment_id(index),
            self.capability(),
            expected
        ))
    }

    pub(crate) fn decorator(&self, index: usize) -> QuiltResult<&dyn Decorator> {
        match self.slot(index)? {
            FragmentInstance::Decorator(d) => Ok(d.as_ref()),
            _ => Err(self.kind_mismatch(index, FragmentKind::Decorator)),
        }
    }

    pub(crate) fn assertion(&self, index: usize) -> QuiltResult<&dyn Assertion> {
        match self.slot(index)? {
            FragmentInstance::Assertion(a) => Ok(a.as_ref()),
            _ => Err(self.kind_mismatch(index, FragmentKind::Assertion)),
        }
    }

    fn core(&self, index: usize) -> QuiltResult<&dyn CoreFragment> {
        match self.slot(index)? {
            FragmentInstance::Core(c) => Ok(c.as_ref()),
            _ => Err(self.kind_mismatch(index, FragmentKind::Core)),
        }
    }

    pub(crate) fn invoke_core(&self, chain: &MethodChain, call: &mut Call<'_>) -> QuiltResult<Value> {
        if let Some(wrapped) = &self.wrapped {
            return wrapped.invoke(call);
        }
        match chain.core {
            Some(index) => self.core(index)?.invoke(call),
            None => Err(QuiltError::MissingFragment {
                capability: self.capability().clone(),
                method: chain.method.name.clone(),
            }),
        }
    }
}

impl CompositeRef for CompositeInstance {
    fn capability(&self) -> &CapabilityId {
        self.model.capability()
    }

    fn invoke(&self, method: &str, args: Vec<Value>) -> QuiltResult<Value> {
        let chain = self
            .model
            .method(method)
            .ok_or_else(|| QuiltError::UnknownMethod {
                capability: self.capability().clone(),
                method: method.into(),
            })?;
        chain::execute(self, chain, args)
    }
}

/// Handle to a live composite
///
/// Cloning the handle does not clone the composite.
#[derive(Clone)]
pub struct Composite {
    inner: Arc<CompositeInstance>,
}

impl Composite {
    pub(crate) fn new(
        model: Arc<DispatchModel>,
        pool: Arc<FragmentPool>,
        args: Vec<Value>,
        wrapped: Option<Wrapped>,
    ) -> Self {
        let args: Arc<[Value]> = Arc::from(args);
        let slots = (0..model.fragments().len())
            .map(|_| OnceCell::new())
            .collect();
        let inner = Arc::new_cyclic(|weak: &Weak<CompositeInstance>| {
            let this: Weak<dyn CompositeRef> = weak.clone();
            CompositeInstance {
                model,
                pool,
                slots,
                context: FragmentContext::new(this, args),
                wrapped,
            }
        });
        Self { inner }
    }

    /// Capability implemented by the composite
    pub fn capability(&self) -> &CapabilityId {
        self.inner.model.capability()
    }

    /// Dispatch model driving the composite
    pub fn model(&self) -> &Arc<DispatchModel> {
        &self.inner.model
    }

    /// Invoke a method through its chain
    ///
    /// # Errors
    ///
    /// - `UnknownMethod` if the capability has no such method
    /// - `InvalidArgument`, `ConstraintViolation`, `AssertionFailed`
    /// - any error raised by a decorator or the core
    pub fn invoke(&self, method: &str, args: Vec<Value>) -> QuiltResult<Value> {
        CompositeRef::invoke(self.inner.as_ref(), method, args)
    }

    /// The object this composite wraps, if it was created by a cast
    pub fn unwrapped(&self) -> Option<&Wrapped> {
        self.inner.wrapped.as_ref()
    }

    /// Check whether the composite wraps another object
    pub fn is_wrapper(&self) -> bool {
        self.inner.wrapped.is_some()
    }

    /// Check whether two handles denote the same underlying object
    ///
    /// Wrappers compare by the object they wrap, so a composite and any
    /// cast of it have the same identity.
    pub fn same_identity(&self, other: &Composite) -> bool {
        self.identity() == other.identity()
    }

    /// Check whether two handles refer to the same composite
    pub fn ptr_eq(&self, other: &Composite) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Check whether the composite, or the composite it wraps, conforms to `capability`
    pub fn conforms_to(&self, capability: &CapabilityId) -> bool {
        if self.inner.model.conforms_to(capability) {
            return true;
        }
        matches!(&self.inner.wrapped, Some(Wrapped::Composite(c)) if c.conforms_to(capability))
    }

    /// Number of fragment slots filled so far
    pub fn instantiated_fragments(&self) -> usize {
        self.inner.slots.iter().filter(|s| s.get().is_some()).count()
    }

    /// The composite as a [`CompositeRef`]
    pub fn as_composite_ref(&self) -> Arc<dyn CompositeRef> {
        self.inner.clone()
    }

    fn identity(&self) -> *const () {
        match &self.inner.wrapped {
            Some(wrapped) => wrapped.identity(),
            None => Arc::as_ptr(&self.inner) as *const (),
        }
    }
}

impl CompositeRef for Composite {
    fn capability(&self) -> &CapabilityId {
        Composite::capability(self)
    }

    fn invoke(&self, method: &str, args: Vec<Value>) -> QuiltResult<Value> {
        Composite::invoke(self, method, args)
    }
}

impl fmt::Debug for Composite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composite")
            .field("capability", self.capability())
            .field("wrapper", &self.is_wrapper())
            .field("instantiated", &self.instantiated_fragments())
            .finish()
    }
}
