//! Units of work obtained through the entity store capability

use std::sync::{Arc, Barrier};
use std::thread;

use quilt::{
    Composite, EntityReference, EntityStore, EntityVersion, ModuleId, QuiltError, QuiltResult,
    UnitOfWorkHandle, Value, ENTITY_STORE_CAPABILITY,
};

use crate::common::*;

const MODULE: &str = "ledger";

fn open(store: &Composite, usecase: &str) -> Arc<UnitOfWorkHandle> {
    let result = store
        .invoke(
            "new_unit_of_work",
            vec![Value::from(usecase), Value::from(MODULE)],
        )
        .unwrap();
    UnitOfWorkHandle::from_value(&result).unwrap()
}

fn balance(handle: &UnitOfWorkHandle, identity: &str) -> QuiltResult<i64> {
    handle.with(|uow| {
        let state = uow.get_entity_state(&EntityReference::from(identity))?;
        Ok(state.data.as_int().unwrap_or_default())
    })
}

fn seed(store: &Composite, identity: &str, amount: i64) {
    open(store, "seed")
        .with(|uow| {
            uow.new_entity_state(EntityReference::from(identity), Value::Int(amount))?;
            uow.apply_changes()?.commit()
        })
        .unwrap();
}

#[test]
fn test_first_committer_wins_through_capability() {
    init_tracing();
    let (dispatcher, _store, check) = store_dispatcher();
    let store = dispatcher.new_instance(&cap(ENTITY_STORE_CAPABILITY), vec![]).unwrap();
    seed(&store, "acct", 100);

    let barrier = Arc::new(Barrier::new(2));
    let workers: Vec<_> = (0..2)
        .map(|i| {
            let handle = open(&store, &format!("deposit-{}", i));
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let result = handle.with(|uow| {
                    let state = uow.get_entity_state(&EntityReference::from("acct"))?;
                    barrier.wait();
                    let amount = state.data.as_int().unwrap_or_default();
                    uow.update_entity_state(state.with_data(Value::Int(amount + 10)))?;
                    uow.apply_changes()?.commit()
                });
                if result.is_err() {
                    handle.with(|uow| uow.discard()).unwrap();
                }
                result
            })
        })
        .collect();

    let results: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let conflict = results.into_iter().find_map(Result::err).unwrap();
    match conflict {
        QuiltError::ConcurrentModification { module, identities } => {
            assert_eq!(module.as_str(), MODULE);
            assert_eq!(identities, vec![EntityReference::from("acct")]);
        }
        other => panic!("expected ConcurrentModification, got {}", other),
    }

    assert_eq!(balance(&open(&store, "audit"), "acct").unwrap(), 110);
    assert!(check.module(&ModuleId::new(MODULE)).versions().len() <= 1);
}

#[test]
fn test_version_of_reports_committed_versions() {
    let (dispatcher, store_impl, _check) = store_dispatcher();
    let store = dispatcher.new_instance(&cap(ENTITY_STORE_CAPABILITY), vec![]).unwrap();
    let args = || vec![Value::from(MODULE), Value::from("acct")];

    assert_eq!(store.invoke("version_of", args()).unwrap(), Value::Null);
    seed(&store, "acct", 5);
    let first = store.invoke("version_of", args()).unwrap();

    open(&store, "bump")
        .with(|uow| {
            let state = uow.get_entity_state(&EntityReference::from("acct"))?;
            uow.update_entity_state(state.with_data(Value::Int(6)))?;
            uow.apply_changes()?.commit()
        })
        .unwrap();
    let second = store.invoke("version_of", args()).unwrap();
    assert_ne!(first, second);

    let raw = store_impl
        .version_of(&ModuleId::new(MODULE), &EntityReference::from("acct"))
        .unwrap()
        .map(|v: EntityVersion| i64::try_from(v.as_raw()).unwrap());
    assert_eq!(second.as_int(), raw);
}

#[test]
fn test_discarded_reader_does_not_block_writer() {
    let (dispatcher, _store, check) = store_dispatcher();
    let store = dispatcher.new_instance(&cap(ENTITY_STORE_CAPABILITY), vec![]).unwrap();
    seed(&store, "acct", 1);

    let reader = open(&store, "peek");
    assert_eq!(balance(&reader, "acct").unwrap(), 1);
    assert_eq!(check.module(&ModuleId::new(MODULE)).versions().len(), 1);
    reader.with(|uow| uow.discard()).unwrap();
    assert!(check.module(&ModuleId::new(MODULE)).versions().is_empty());

    open(&store, "write")
        .with(|uow| {
            let state = uow.get_entity_state(&EntityReference::from("acct"))?;
            uow.update_entity_state(state.with_data(Value::Int(2)))?;
            uow.apply_changes()?.commit()
        })
        .unwrap();
    assert_eq!(balance(&open(&store, "check"), "acct").unwrap(), 2);
}

#[test]
fn test_missing_entity_surfaces_store_error() {
    let (dispatcher, _store, _check) = store_dispatcher();
    let store = dispatcher.new_instance(&cap(ENTITY_STORE_CAPABILITY), vec![]).unwrap();

    let err = balance(&open(&store, "lookup"), "ghost").unwrap_err();
    assert!(matches!(err, QuiltError::EntityNotFound(_)));
}
