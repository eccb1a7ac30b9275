//! Capability graphs resolved and dispatched through the facade

use std::sync::atomic::Ordering;
use std::sync::Arc;

use quilt::{
    Call, CapabilityRegistry, CapabilityType, ConstraintId, Dispatcher, FragmentId,
    MethodDescriptor, QuiltError, QuiltResult, RuntimeConfig, Value, Wrapped,
};

use crate::common::*;

fn log_of(log: &CallLog) -> Vec<String> {
    std::mem::take(&mut *log.lock())
}

fn ids(names: &[&str]) -> Vec<FragmentId> {
    names.iter().map(|n| FragmentId::new(*n)).collect()
}

#[test]
fn test_decorators_run_outermost_first() {
    init_tracing();
    let (dispatcher, log) = counter_dispatcher(RuntimeConfig::default());
    let counter = dispatcher
        .new_instance(&cap("AuditedCounter"), vec![Value::from("c1")])
        .unwrap();

    assert_eq!(counter.invoke("increment", vec![Value::Int(2)]).unwrap(), Value::Int(2));
    assert_eq!(log_of(&log), vec!["audit increment", "trace increment"]);

    // `count` is not marked, so the restricted decorator stays out
    assert_eq!(counter.invoke("count", vec![]).unwrap(), Value::Int(2));
    assert_eq!(log_of(&log), vec!["trace count"]);

    assert_eq!(counter.invoke("id", vec![]).unwrap(), Value::from("c1"));
    assert_eq!(log_of(&log), vec!["trace id"]);
}

#[test]
fn test_reentrant_call_passes_through_chain() {
    let (dispatcher, log) = counter_dispatcher(RuntimeConfig::default());
    let counter = dispatcher.new_instance(&cap("AuditedCounter"), vec![]).unwrap();
    counter.invoke("increment", vec![Value::Int(5)]).unwrap();
    log_of(&log);

    assert_eq!(counter.invoke("reset", vec![]).unwrap(), Value::Int(5));
    assert_eq!(
        log_of(&log),
        vec!["audit reset", "trace reset", "trace count"]
    );
    assert_eq!(counter.invoke("count", vec![]).unwrap(), Value::Int(0));
}

#[test]
fn test_constraint_rejects_before_decorators() {
    let (dispatcher, log) = counter_dispatcher(RuntimeConfig::default());
    let counter = dispatcher.new_instance(&cap("AuditedCounter"), vec![]).unwrap();

    match counter.invoke("increment", vec![Value::Int(0)]).unwrap_err() {
        QuiltError::ConstraintViolation {
            capability,
            parameter,
            constraint,
            ..
        } => {
            assert_eq!(capability.as_str(), "AuditedCounter");
            assert_eq!(parameter, "by");
            assert_eq!(constraint.as_str(), "positive");
        }
        other => panic!("expected ConstraintViolation, got {}", other),
    }
    assert!(log_of(&log).is_empty());
    assert_eq!(counter.invoke("count", vec![]).unwrap(), Value::Int(0));
}

#[test]
fn test_model_summary_reflects_graph() {
    let (dispatcher, _log) = counter_dispatcher(RuntimeConfig::default());
    let model = dispatcher.model(&cap("AuditedCounter")).unwrap();

    let walked: Vec<&str> = model.walked().iter().map(|c| c.as_str()).collect();
    assert_eq!(walked, vec!["AuditedCounter", "Tracked", "Identity", "Counter"]);

    let summary = model.summary();
    let increment = summary
        .iter()
        .find(|s| s.method.as_str() == "increment")
        .unwrap();
    assert_eq!(increment.core, Some(FragmentId::new("CounterCore")));
    assert_eq!(increment.decorators, ids(&["Audit", "Trace"]));
    assert_eq!(increment.assertions, ids(&["NeverNegative"]));
    assert_eq!(
        increment.constraints,
        vec![("by".to_string(), vec![ConstraintId::new("positive")])]
    );

    let id = summary.iter().find(|s| s.method.as_str() == "id").unwrap();
    assert_eq!(id.core, Some(FragmentId::new("IdentityCore")));
    assert_eq!(id.decorators, ids(&["Trace"]));
    assert!(id.assertions.is_empty());

    // Same model on every lookup
    assert!(Arc::ptr_eq(&model, &dispatcher.model(&cap("AuditedCounter")).unwrap()));
}

#[test]
fn test_conformance_follows_the_graph() {
    let (dispatcher, _log) = counter_dispatcher(RuntimeConfig::default());
    let audited = dispatcher.new_instance(&cap("AuditedCounter"), vec![]).unwrap();
    let tracked = dispatcher.new_instance(&cap("Tracked"), vec![]).unwrap();

    for name in ["AuditedCounter", "Tracked", "Identity", "Counter"] {
        assert!(dispatcher.is_instance(&audited, &cap(name)), "{}", name);
    }
    assert!(!dispatcher.is_instance(&tracked, &cap("AuditedCounter")));
}

#[test]
fn test_stateless_decorator_shared_across_composites() {
    let (dispatcher, log) = counter_dispatcher(RuntimeConfig::default());
    let first = dispatcher.new_instance(&cap("Tracked"), vec![]).unwrap();
    let second = dispatcher.new_instance(&cap("Tracked"), vec![]).unwrap();
    assert_eq!(first.instantiated_fragments(), 0);

    first.invoke("id", vec![]).unwrap();
    second.invoke("id", vec![]).unwrap();
    assert_eq!(log_of(&log), vec!["trace id", "trace id"]);

    let metrics = dispatcher.pool().metrics();
    assert_eq!(metrics.created, 1);
    assert_eq!(metrics.hits, 1);
    // Trace and IdentityCore; the counter core is still untouched
    assert_eq!(first.instantiated_fragments(), 2);
}

#[test]
fn test_cast_host_object_keeps_identity() {
    let (dispatcher, log) = counter_dispatcher(RuntimeConfig::default());
    let host = Arc::new(HostCounter::default());
    let tracked = dispatcher.cast(&cap("Tracked"), host.clone()).unwrap();

    assert_eq!(tracked.invoke("increment", vec![Value::Int(3)]).unwrap(), Value::Int(3));
    assert_eq!(host.count.load(Ordering::SeqCst), 3);
    assert_eq!(log_of(&log), vec!["trace increment"]);

    // The contract's constraints guard the host object too
    assert!(tracked.invoke("increment", vec![Value::Int(-1)]).is_err());
    assert_eq!(host.count.load(Ordering::SeqCst), 3);

    let audited = dispatcher.recast(&cap("AuditedCounter"), &tracked).unwrap();
    assert!(audited.same_identity(&tracked));
    assert!(!audited.ptr_eq(&tracked));
    assert!(matches!(audited.unwrapped(), Some(Wrapped::Object(_))));

    audited.invoke("increment", vec![Value::Int(1)]).unwrap();
    assert_eq!(host.count.load(Ordering::SeqCst), 4);
    assert_eq!(log_of(&log), vec!["audit increment", "trace increment"]);
}

#[test]
fn test_recast_composite_wraps_it() {
    let (dispatcher, log) = counter_dispatcher(RuntimeConfig::default());
    let tracked = dispatcher.new_instance(&cap("Tracked"), vec![]).unwrap();
    let audited = dispatcher.recast(&cap("AuditedCounter"), &tracked).unwrap();

    audited.invoke("increment", vec![Value::Int(2)]).unwrap();
    assert_eq!(tracked.invoke("count", vec![]).unwrap(), Value::Int(2));
    // Outer chain, then the wrapped composite's own chain
    assert_eq!(
        log_of(&log),
        vec!["audit increment", "trace increment", "trace increment", "trace count"]
    );
    assert!(audited.same_identity(&tracked));
}

#[test]
fn test_missing_core_only_blocks_instantiation() {
    let registry = CapabilityRegistry::builder()
        .register(CapabilityType::contract("Task").method(MethodDescriptor::new("run")))
        .build()
        .unwrap();
    let dispatcher = Dispatcher::new(registry).unwrap();

    match dispatcher.new_instance(&cap("Task"), vec![]).unwrap_err() {
        QuiltError::MissingFragment { capability, method } => {
            assert_eq!(capability.as_str(), "Task");
            assert_eq!(method.as_str(), "run");
        }
        other => panic!("expected MissingFragment, got {}", other),
    }

    let task = dispatcher
        .cast(
            &cap("Task"),
            Arc::new(|_call: &mut Call<'_>| -> QuiltResult<Value> { Ok(Value::from("done")) }),
        )
        .unwrap();
    assert_eq!(task.invoke("run", vec![]).unwrap(), Value::from("done"));
}
