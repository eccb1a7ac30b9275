//! Shared fixtures for the integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Once};

use parking_lot::Mutex;

use quilt::{
    entity_store_capability, Assertion, Call, CapabilityId, CapabilityRegistry, CapabilityType,
    ConcurrentModificationCheck, ConstraintDeclaration, CoreFragment, Decorator, Dispatcher,
    FragmentContext, FragmentDescriptor, MemoryEntityStore, MethodDescriptor, Next,
    ParamDescriptor, QuiltError, QuiltResult, RuntimeConfig, Value, ValueKind,
};

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Install a test subscriber once per test binary
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
            .try_init();
    });
}

// ============================================================================
// Counter capabilities
//
//          AuditedCounter
//                |
//             Tracked
//             /     \
//        Identity  Counter
// ============================================================================

/// Calls seen by decorators, in order
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub struct IdentityCore {
    name: String,
}

impl CoreFragment for IdentityCore {
    fn invoke(&self, call: &mut Call<'_>) -> QuiltResult<Value> {
        match call.method.name.as_str() {
            "id" => Ok(Value::from(self.name.as_str())),
            other => Err(QuiltError::fragment("IdentityCore", format!("unexpected {}", other))),
        }
    }
}

pub struct CounterCore {
    count: AtomicI64,
    ctx: FragmentContext,
}

impl CoreFragment for CounterCore {
    fn invoke(&self, call: &mut Call<'_>) -> QuiltResult<Value> {
        match call.method.name.as_str() {
            "increment" => {
                let by = call.int_arg(0)?;
                Ok(Value::Int(self.count.fetch_add(by, Ordering::SeqCst) + by))
            }
            "count" => Ok(Value::Int(self.count.load(Ordering::SeqCst))),
            "reset" => {
                // Reads back through the composite so decorators see the call
                let this = self
                    .ctx
                    .this()
                    .ok_or_else(|| QuiltError::fragment("CounterCore", "composite is gone"))?;
                let before = this.invoke("count", vec![])?;
                self.count.store(0, Ordering::SeqCst);
                Ok(before)
            }
            other => Err(QuiltError::fragment("CounterCore", format!("unexpected {}", other))),
        }
    }
}

struct Logging {
    label: &'static str,
    log: CallLog,
}

impl Decorator for Logging {
    fn invoke(&self, call: &mut Call<'_>, next: &dyn Next) -> QuiltResult<Value> {
        self.log
            .lock()
            .push(format!("{} {}", self.label, call.method.name));
        next.proceed(call)
    }
}

struct NeverNegative;

impl Assertion for NeverNegative {
    fn after(&self, _call: &Call<'_>, result: &Value) -> Result<(), String> {
        match result.as_int() {
            Some(n) if n < 0 => Err(format!("count went negative: {}", n)),
            _ => Ok(()),
        }
    }
}

/// Register the counter capabilities; decorators append to `log`
pub fn counter_registry(log: &CallLog) -> CapabilityRegistry {
    let trace_log = Arc::clone(log);
    let audit_log = Arc::clone(log);

    CapabilityRegistry::builder()
        .register(
            CapabilityType::contract("Identity")
                .method(MethodDescriptor::new("id"))
                .core(FragmentDescriptor::core("IdentityCore", |ctx| {
                    let name = ctx
                        .args()
                        .first()
                        .and_then(Value::as_str)
                        .unwrap_or("anonymous")
                        .to_string();
                    Ok(IdentityCore { name })
                })
                .implements(["id"])),
        )
        .register(
            CapabilityType::contract("Counter")
                .method(
                    MethodDescriptor::new("increment")
                        .param(
                            ParamDescriptor::new("by", ValueKind::Int).constrained_by("positive"),
                        )
                        .marked("logged"),
                )
                .method(MethodDescriptor::new("count"))
                .method(MethodDescriptor::new("reset").marked("logged"))
                .core(FragmentDescriptor::core("CounterCore", |ctx| {
                    Ok(CounterCore {
                        count: AtomicI64::new(0),
                        ctx: ctx.clone(),
                    })
                })
                .implements(["increment", "count", "reset"]))
                .constraint(ConstraintDeclaration::new(
                    "positive",
                    "positive",
                    ValueKind::Int,
                    |v: &Value| v.as_int().map_or(false, |n| n > 0),
                )),
        )
        .register(
            CapabilityType::contract("Tracked")
                .extends("Identity")
                .extends("Counter")
                .decorator(
                    FragmentDescriptor::decorator("Trace", move |_| {
                        Ok(Logging {
                            label: "trace",
                            log: Arc::clone(&trace_log),
                        })
                    })
                    .stateless(),
                )
                .assertion(
                    FragmentDescriptor::assertion("NeverNegative", |_| Ok(NeverNegative))
                        .implements(["count", "increment"]),
                ),
        )
        .register(
            CapabilityType::contract("AuditedCounter")
                .extends("Tracked")
                .decorator(
                    FragmentDescriptor::decorator("Audit", move |_| {
                        Ok(Logging {
                            label: "audit",
                            log: Arc::clone(&audit_log),
                        })
                    })
                    .applies_to("logged"),
                ),
        )
        .build()
        .expect("counter registry is well formed")
}

/// Dispatcher over the counter capabilities
pub fn counter_dispatcher(config: RuntimeConfig) -> (Dispatcher, CallLog) {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = Dispatcher::with_config(counter_registry(&log), config)
        .expect("default config is valid");
    (dispatcher, log)
}

/// Host object implementing the whole `Tracked` contract
#[derive(Default)]
pub struct HostCounter {
    pub count: AtomicI64,
}

impl CoreFragment for HostCounter {
    fn invoke(&self, call: &mut Call<'_>) -> QuiltResult<Value> {
        match call.method.name.as_str() {
            "id" => Ok(Value::from("host")),
            "increment" => {
                let by = call.int_arg(0)?;
                Ok(Value::Int(self.count.fetch_add(by, Ordering::SeqCst) + by))
            }
            "count" => Ok(Value::Int(self.count.load(Ordering::SeqCst))),
            "reset" => Ok(Value::Int(self.count.swap(0, Ordering::SeqCst))),
            other => Err(QuiltError::fragment("HostCounter", format!("unexpected {}", other))),
        }
    }
}

pub fn cap(name: &str) -> CapabilityId {
    CapabilityId::new(name)
}

// ============================================================================
// Entity store capability
// ============================================================================

/// Dispatcher exposing an `EntityStore` capability over a checked memory store
pub fn store_dispatcher() -> (
    Dispatcher,
    Arc<MemoryEntityStore>,
    Arc<ConcurrentModificationCheck>,
) {
    let store = Arc::new(MemoryEntityStore::new());
    let check = Arc::new(ConcurrentModificationCheck::wrap(store.clone()));
    let registry = CapabilityRegistry::builder()
        .register(entity_store_capability(Arc::clone(&check)))
        .build()
        .expect("entity store capability is well formed");
    let dispatcher = Dispatcher::new(registry).expect("default config is valid");
    (dispatcher, store, check)
}
