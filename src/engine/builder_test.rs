use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::watch;

use crate::AttributeValue;
use crate::DeviceEnvelope;
use crate::EngineBuilder;
use crate::Error;
use crate::MemoryShadowStore;
use crate::Settings;
use crate::SystemError;

fn number_delta(name: &str, value: f64) -> crate::AttributeMap {
    let mut delta = crate::AttributeMap::new();
    delta.insert(name.to_string(), AttributeValue::Number(value));
    delta
}

#[tokio::test]
async fn test_ready_before_build_fails() {
    let (_tx, shutdown_rx) = watch::channel(());
    let result = EngineBuilder::init(Settings::default(), shutdown_rx).ready();
    assert!(matches!(
        result,
        Err(Error::System(SystemError::EngineStartFailed(_)))
    ));
}

#[tokio::test]
async fn test_build_with_memory_store() {
    let (_tx, shutdown_rx) = watch::channel(());
    let engine = EngineBuilder::init(Settings::default(), shutdown_rx)
        .store(Arc::new(MemoryShadowStore::new()))
        .build()
        .ready()
        .expect("engine builds");

    assert!(!engine.server_is_ready());

    let outcome = engine
        .bridge()
        .apply_reported("thermostat-1", number_delta("temperature", 21.0), None)
        .await
        .unwrap();
    assert_eq!(outcome.document.version, 1);
}

#[tokio::test]
async fn test_device_transport_reaches_the_store() {
    let (_tx, shutdown_rx) = watch::channel(());
    let engine = EngineBuilder::init(Settings::default(), shutdown_rx)
        .store(Arc::new(MemoryShadowStore::new()))
        .build()
        .ready()
        .unwrap();

    engine
        .device_sender()
        .send(DeviceEnvelope {
            device_id: "thermostat-1".to_string(),
            attributes: number_delta("temperature", 23.5),
        })
        .await
        .unwrap();

    // The consumer task applies the envelope asynchronously
    let mut document = None;
    for _ in 0..50 {
        document = engine.bridge().fetch("thermostat-1").unwrap();
        if document.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let document = document.expect("envelope applied");
    assert_eq!(
        document.reported.get("temperature"),
        Some(&AttributeValue::Number(23.5))
    );
}

#[tokio::test]
async fn test_default_sled_store_round_trip() {
    let dir = TempDir::new().unwrap();
    let (_tx, shutdown_rx) = watch::channel(());
    let engine = EngineBuilder::new_from_db_path(dir.path().to_str().unwrap(), shutdown_rx)
        .build()
        .ready()
        .unwrap();

    engine
        .bridge()
        .apply_desired("d1", number_delta("temperature", 19.0), None)
        .await
        .unwrap();

    let document = engine.bridge().fetch("d1").unwrap().unwrap();
    assert_eq!(document.version, 1);
    assert!(document.pending.contains("temperature"));
}
