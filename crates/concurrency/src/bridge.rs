//! Entity store as a capability
//!
//! [`entity_store_capability`] declares an `EntityStore` capability whose
//! core fragment delegates to a storage collaborator and whose decorator is
//! the concurrent-modification check. Units of work travel through the
//! dispatch chain as [`Value::Handle`]s wrapping a [`UnitOfWorkHandle`].
//!
//! # Methods
//!
//! | Method | Arguments | Result |
//! |---|---|---|
//! | `new_unit_of_work` | usecase, module | unit-of-work handle, checked |
//! | `version_of` | module, identity | `Int` version or `Null` |

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use quilt_core::{
    Call, CoreFragment, Decorator, EntityReference, EntityStore, EntityStoreUnitOfWork,
    EntityVersion, Handle, MethodDescriptor, ModuleId, Next, ParamDescriptor, QuiltError,
    QuiltResult, Usecase, Value, ValueKind,
};
use quilt_model::{CapabilityType, ConstraintDeclaration, FragmentDescriptor};

use crate::check::ConcurrentModificationCheck;

/// Name of the entity store capability
pub const ENTITY_STORE_CAPABILITY: &str = "EntityStore";

const NEW_UNIT_OF_WORK: &str = "new_unit_of_work";
const VERSION_OF: &str = "version_of";
const UNIT_OF_WORK_MARKER: &str = "unit_of_work";
const NOT_BLANK: &str = "not_blank";
const STORE_CORE: &str = "EntityStoreCore";
const CHECK_DECORATOR: &str = "ConcurrentModificationCheck";

/// A unit of work passed around as a [`Value::Handle`]
pub struct UnitOfWorkHandle {
    unit_of_work: Mutex<Option<Box<dyn EntityStoreUnitOfWork>>>,
}

impl UnitOfWorkHandle {
    /// Wrap a unit of work
    pub fn new(unit_of_work: Box<dyn EntityStoreUnitOfWork>) -> Self {
        Self {
            unit_of_work: Mutex::new(Some(unit_of_work)),
        }
    }

    /// Recover the handle from a call result
    ///
    /// # Errors
    ///
    /// `InvalidState` if the value is not a unit-of-work handle.
    pub fn from_value(value: &Value) -> QuiltResult<Arc<UnitOfWorkHandle>> {
        value
            .as_handle()
            .and_then(Handle::downcast::<UnitOfWorkHandle>)
            .ok_or_else(|| {
                QuiltError::InvalidState(format!(
                    "expected a unit of work handle, found {}",
                    value.type_name()
                ))
            })
    }

    /// Run `f` on the unit of work
    ///
    /// # Errors
    ///
    /// `InvalidState` if the unit of work was taken out, otherwise whatever
    /// `f` returns.
    pub fn with<R>(
        &self,
        f: impl FnOnce(&mut dyn EntityStoreUnitOfWork) -> QuiltResult<R>,
    ) -> QuiltResult<R> {
        let mut unit_of_work = self.unit_of_work.lock();
        match unit_of_work.as_mut() {
            Some(unit_of_work) => f(unit_of_work.as_mut()),
            None => Err(QuiltError::InvalidState(
                "unit of work was taken out of its handle".to_string(),
            )),
        }
    }

    /// Take the unit of work out, leaving the handle empty
    pub fn take(&self) -> Option<Box<dyn EntityStoreUnitOfWork>> {
        self.unit_of_work.lock().take()
    }
}

impl fmt::Debug for UnitOfWorkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit_of_work = self.unit_of_work.lock();
        f.debug_struct("UnitOfWorkHandle")
            .field("identity", &unit_of_work.as_ref().map(|u| u.identity().to_string()))
            .finish()
    }
}

struct StoreCore {
    store: Arc<dyn EntityStore>,
}

impl CoreFragment for StoreCore {
    fn invoke(&self, call: &mut Call<'_>) -> QuiltResult<Value> {
        match call.method.name.as_str() {
            NEW_UNIT_OF_WORK => {
                let usecase = Usecase::new(call.str_arg(0)?);
                let module = ModuleId::new(call.str_arg(1)?);
                let unit_of_work = self.store.new_unit_of_work(&usecase, &module)?;
                Ok(Value::Handle(Handle::new(UnitOfWorkHandle::new(unit_of_work))))
            }
            VERSION_OF => {
                let module = ModuleId::new(call.str_arg(0)?);
                let identity = EntityReference::from(call.str_arg(1)?);
                match self.store.version_of(&module, &identity)? {
                    Some(version) => version_value(version),
                    None => Ok(Value::Null),
                }
            }
            other => Err(QuiltError::fragment(
                STORE_CORE,
                format!("unexpected method {}", other),
            )),
        }
    }
}

fn version_value(version: EntityVersion) -> QuiltResult<Value> {
    i64::try_from(version.as_raw())
        .map(Value::Int)
        .map_err(|_| {
            QuiltError::storage(format!(
                "entity version {} does not fit a signed integer",
                version.as_raw()
            ))
        })
}

struct CheckDecorator {
    check: Arc<ConcurrentModificationCheck>,
}

impl Decorator for CheckDecorator {
    fn invoke(&self, call: &mut Call<'_>, next: &dyn Next) -> QuiltResult<Value> {
        let result = next.proceed(call)?;
        let unit_of_work = UnitOfWorkHandle::from_value(&result)?
            .take()
            .ok_or_else(|| QuiltError::fragment(CHECK_DECORATOR, "unit of work already taken"))?;
        let checked = self.check.check(unit_of_work);
        Ok(Value::Handle(Handle::new(UnitOfWorkHandle::new(Box::new(checked)))))
    }
}

fn text(name: &str) -> ParamDescriptor {
    ParamDescriptor::new(name, ValueKind::String).constrained_by(NOT_BLANK)
}

/// Declare the entity store capability over a checked store
///
/// The core delegates to the store decorated by `check`; units of work
/// come out of `new_unit_of_work` already under the check.
pub fn entity_store_capability(check: Arc<ConcurrentModificationCheck>) -> CapabilityType {
    let store = Arc::clone(check.delegate());
    CapabilityType::contract(ENTITY_STORE_CAPABILITY)
        .method(
            MethodDescriptor::new(NEW_UNIT_OF_WORK)
                .param(text("usecase"))
                .param(text("module"))
                .marked(UNIT_OF_WORK_MARKER),
        )
        .method(
            MethodDescriptor::new(VERSION_OF)
                .param(text("module"))
                .param(text("identity")),
        )
        .core(FragmentDescriptor::core(STORE_CORE, move |_| {
            Ok(StoreCore {
                store: Arc::clone(&store),
            })
        }))
        .decorator(
            FragmentDescriptor::decorator(CHECK_DECORATOR, move |_| {
                Ok(CheckDecorator {
                    check: Arc::clone(&check),
                })
            })
            .applies_to(UNIT_OF_WORK_MARKER),
        )
        .constraint(ConstraintDeclaration::new(
            NOT_BLANK,
            NOT_BLANK,
            ValueKind::String,
            |v: &Value| v.as_str().map_or(false, |s| !s.trim().is_empty()),
        ))
}
