use crate::AttributeSchema;
use crate::EngineConfig;
use crate::NetworkConfig;
use crate::Settings;
use crate::ValidationConfig;

#[test]
fn test_default_settings_pass_validation() {
    let settings = Settings::default();
    assert!(settings.validate().is_ok());
}

#[test]
fn test_invalid_notifier_shards() {
    let mut config = EngineConfig::default();
    config.notifier_shards = 0;

    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_heartbeat_interval() {
    let mut config = NetworkConfig::default();
    config.heartbeat_interval_ms = 0;

    assert!(config.validate().is_err());
}

#[test]
fn test_zombie_deadline_is_twice_heartbeat() {
    let config = NetworkConfig {
        heartbeat_interval_ms: 5_000,
        ..Default::default()
    };

    assert_eq!(config.zombie_deadline().as_millis(), 10_000);
    assert_eq!(config.heartbeat_interval().as_millis(), 5_000);
}

#[test]
fn test_inverted_numeric_range_rejected() {
    let mut config = ValidationConfig::default();
    config.attributes.insert(
        "temperature".to_string(),
        AttributeSchema::Number {
            min: Some(100.0),
            max: Some(50.0),
            tolerance: 0.0,
        },
    );

    assert!(config.validate().is_err());
}

#[test]
fn test_negative_tolerance_rejected() {
    let mut config = ValidationConfig::default();
    config.attributes.insert(
        "temperature".to_string(),
        AttributeSchema::Number {
            min: None,
            max: None,
            tolerance: -0.5,
        },
    );

    assert!(config.validate().is_err());
}
