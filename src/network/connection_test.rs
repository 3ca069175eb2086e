use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;

use crate::AttributeValue;
use crate::ChangeEvent;
use crate::ClientFrame;
use crate::ConnectionManager;
use crate::EventSink;
use crate::NetworkConfig;
use crate::PendingDelta;
use crate::ServerFrame;

fn test_config(outbound_buffer: usize) -> NetworkConfig {
    NetworkConfig {
        outbound_buffer,
        ..NetworkConfig::default()
    }
}

fn event(device_id: &str, version: u64) -> ChangeEvent {
    let mut reported = std::collections::BTreeMap::new();
    reported.insert("temperature".to_string(), AttributeValue::Number(21.0));
    ChangeEvent {
        device_id: device_id.to_string(),
        version,
        reported_delta: Some(reported),
        desired_delta: None,
        pending_delta: PendingDelta::default(),
        timestamp: 0,
    }
}

#[tokio::test]
async fn test_fanout_reaches_subscribers_only() {
    let manager = ConnectionManager::new(&test_config(8));
    let (watcher, mut watcher_rx) = manager.register();
    let (bystander, mut bystander_rx) = manager.register();
    manager.mark_open(&watcher);
    manager.mark_open(&bystander);

    manager.handle_control(
        &watcher,
        ClientFrame::Subscribe {
            device_id: "d1".to_string(),
        },
    );

    manager.deliver(&event("d1", 1));

    match watcher_rx.try_recv().unwrap() {
        ServerFrame::Event { event } => {
            assert_eq!(event.device_id, "d1");
            assert_eq!(event.version, 1);
        }
        other => panic!("unexpected frame: {other:?}"),
    }
    assert!(matches!(bystander_rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_unsubscribe_stops_fanout() {
    let manager = ConnectionManager::new(&test_config(8));
    let (conn, mut rx) = manager.register();
    manager.mark_open(&conn);

    manager.handle_control(
        &conn,
        ClientFrame::Subscribe {
            device_id: "d1".to_string(),
        },
    );
    manager.handle_control(
        &conn,
        ClientFrame::Unsubscribe {
            device_id: "d1".to_string(),
        },
    );

    manager.deliver(&event("d1", 1));
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_overflow_marks_device_stale() {
    let manager = ConnectionManager::new(&test_config(1));
    let (conn, mut rx) = manager.register();
    manager.mark_open(&conn);
    manager.handle_control(
        &conn,
        ClientFrame::Subscribe {
            device_id: "d1".to_string(),
        },
    );

    // Second delivery overflows the depth-1 buffer
    manager.deliver(&event("d1", 1));
    manager.deliver(&event("d1", 2));

    assert_eq!(manager.take_stale_devices(&conn), vec!["d1".to_string()]);
    // Drained exactly once
    assert!(manager.take_stale_devices(&conn).is_empty());

    // The first event is still in the buffer
    assert!(matches!(rx.try_recv().unwrap(), ServerFrame::Event { .. }));
}

#[tokio::test]
async fn test_closed_receiver_triggers_teardown() {
    let manager = ConnectionManager::new(&test_config(8));
    let (conn, rx) = manager.register();
    manager.mark_open(&conn);
    manager.handle_control(
        &conn,
        ClientFrame::Subscribe {
            device_id: "d1".to_string(),
        },
    );
    drop(rx);

    manager.deliver(&event("d1", 1));

    assert_eq!(manager.connection_count(), 0);
    assert!(manager.registry().subscribers_of("d1").is_empty());
}

#[tokio::test]
async fn test_teardown_is_idempotent() {
    let manager = ConnectionManager::new(&test_config(8));
    let (conn, _rx) = manager.register();
    manager.handle_control(
        &conn,
        ClientFrame::Subscribe {
            device_id: "d1".to_string(),
        },
    );

    manager.teardown(&conn);
    manager.teardown(&conn);

    assert_eq!(manager.connection_count(), 0);
    assert!(manager.registry().subscribers_of("d1").is_empty());
}

#[tokio::test]
async fn test_zombie_detection_uses_liveness() {
    let manager = ConnectionManager::new(&test_config(8));
    let (conn, _rx) = manager.register();
    manager.mark_open(&conn);

    assert!(manager.zombie_candidates().is_empty());
    manager
        .liveness()
        .backdate(&conn, Duration::from_secs(60 * 60));
    assert_eq!(manager.zombie_candidates(), vec![conn]);
}
