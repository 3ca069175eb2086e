use std::collections::BTreeMap;

use crate::AttributeValue;
use crate::ChangeEvent;
use crate::ClientFrame;
use crate::PendingDelta;
use crate::ServerFrame;

#[test]
fn test_client_frame_decoding() {
    let frame: ClientFrame =
        serde_json::from_str(r#"{"type":"subscribe","device_id":"thermostat-1"}"#).unwrap();
    assert_eq!(
        frame,
        ClientFrame::Subscribe {
            device_id: "thermostat-1".to_string()
        }
    );

    let frame: ClientFrame =
        serde_json::from_str(r#"{"type":"unsubscribe","device_id":"thermostat-1"}"#).unwrap();
    assert_eq!(
        frame,
        ClientFrame::Unsubscribe {
            device_id: "thermostat-1".to_string()
        }
    );
}

#[test]
fn test_unknown_client_frame_is_rejected() {
    assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"shutdown"}"#).is_err());
}

#[test]
fn test_event_frame_flattens_change_event() {
    let mut reported = BTreeMap::new();
    reported.insert("temperature".to_string(), AttributeValue::Number(21.5));

    let frame = ServerFrame::event(ChangeEvent {
        device_id: "thermostat-1".to_string(),
        version: 7,
        reported_delta: Some(reported),
        desired_delta: None,
        pending_delta: PendingDelta::default(),
        timestamp: 1700000000000,
    });

    let json: serde_json::Value = serde_json::to_value(&frame).unwrap();
    assert_eq!(json["type"], "event");
    assert_eq!(json["device_id"], "thermostat-1");
    assert_eq!(json["version"], 7);
    assert_eq!(json["reported_delta"]["temperature"], 21.5);
    // Suppressed when empty
    assert!(json.get("desired_delta").is_none());
}

#[test]
fn test_resync_frame_shape() {
    let json = serde_json::to_string(&ServerFrame::Resync {
        device_id: "d1".to_string(),
    })
    .unwrap();
    assert_eq!(json, r#"{"type":"resync","device_id":"d1"}"#);
}
