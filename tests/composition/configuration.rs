//! Runtime configuration loaded from disk and applied to a dispatcher

use quilt::{
    CapabilityRegistry, CapabilityType, Dispatcher, MethodDescriptor, QuiltError, RuntimeConfig,
    CONFIG_FILE_NAME,
};
use tempfile::TempDir;

use crate::common::*;

fn coreless_registry() -> CapabilityRegistry {
    CapabilityRegistry::builder()
        .register(CapabilityType::contract("Task").method(MethodDescriptor::new("run")))
        .build()
        .unwrap()
}

#[test]
fn test_default_file_round_trips() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);

    RuntimeConfig::write_default_if_missing(&path).unwrap();
    assert!(path.exists());
    assert_eq!(RuntimeConfig::from_file(&path).unwrap(), RuntimeConfig::default());

    // An existing file is left alone
    let custom = RuntimeConfig {
        pooling: false,
        ..RuntimeConfig::default()
    };
    custom.write_to_file(&path).unwrap();
    RuntimeConfig::write_default_if_missing(&path).unwrap();
    assert_eq!(RuntimeConfig::from_file(&path).unwrap(), custom);
}

#[test]
fn test_disabled_pooling_creates_per_composite() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(&path, "pooling = false\n").unwrap();
    let config = RuntimeConfig::from_file(&path).unwrap();

    let (dispatcher, log) = counter_dispatcher(config);
    for _ in 0..3 {
        let tracked = dispatcher.new_instance(&cap("Tracked"), vec![]).unwrap();
        tracked.invoke("id", vec![]).unwrap();
    }
    assert_eq!(log.lock().len(), 3);

    let metrics = dispatcher.pool().metrics();
    assert_eq!(metrics.created, 0);
    assert_eq!(metrics.pooled, 0);
}

#[test]
fn test_eager_resolution_accepts_abstract_contracts() {
    let config = RuntimeConfig::from_toml_str("eager_resolution = true").unwrap();
    assert!(config.pooling);

    let dispatcher = Dispatcher::with_config(coreless_registry(), config).unwrap();
    let err = dispatcher.new_instance(&cap("Task"), vec![]).unwrap_err();
    assert!(matches!(err, QuiltError::MissingFragment { .. }));
}

#[test]
fn test_eager_resolution_surfaces_graph_errors() {
    let dangling = || {
        CapabilityRegistry::builder()
            .register(CapabilityType::contract("Orphan").extends("Nowhere"))
            .build()
            .unwrap()
    };
    let eager = RuntimeConfig {
        eager_resolution: true,
        ..RuntimeConfig::default()
    };

    let err = Dispatcher::with_config(dangling(), eager).unwrap_err();
    assert!(matches!(err, QuiltError::UnknownCapability(_)));

    // Lazily the error waits for first use
    let dispatcher = Dispatcher::new(dangling()).unwrap();
    assert!(dispatcher.model(&cap("Orphan")).is_err());
}

#[test]
fn test_invalid_config_rejected() {
    let err = RuntimeConfig::from_toml_str("max_pooled_fragments = 0").unwrap_err();
    assert!(matches!(err, QuiltError::InvalidConfig(_)));

    let err = RuntimeConfig::from_toml_str("pooling = \"yes\"").unwrap_err();
    assert!(matches!(err, QuiltError::InvalidConfig(_)));

    let dir = TempDir::new().unwrap();
    let err = RuntimeConfig::from_file(&dir.path().join(CONFIG_FILE_NAME)).unwrap_err();
    assert!(matches!(err, QuiltError::InvalidConfig(_)));

    // Hand-built configs are validated by the dispatcher
    let config = RuntimeConfig {
        max_pooled_fragments: 0,
        ..RuntimeConfig::default()
    };
    let err = Dispatcher::with_config(coreless_registry(), config).unwrap_err();
    assert!(matches!(err, QuiltError::InvalidConfig(_)));
}
