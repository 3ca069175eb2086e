use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::watch;

use crate::AttributeMap;
use crate::AttributeValidator;
use crate::AttributeValue;
use crate::BackoffPolicy;
use crate::ChangeEvent;
use crate::ChangeNotifier;
use crate::ConflictError;
use crate::Error;
use crate::EventSink;
use crate::MemoryShadowStore;
use crate::MockShadowStore;
use crate::PutOutcome;
use crate::Reconciler;
use crate::ShadowDocument;
use crate::ShadowError;
use crate::ShadowStore;
use crate::StateKind;
use crate::ValidationConfig;

#[derive(Default)]
struct CaptureSink {
    events: Mutex<Vec<ChangeEvent>>,
}

impl EventSink for CaptureSink {
    fn deliver(
        &self,
        event: &ChangeEvent,
    ) {
        self.events.lock().unwrap().push(event.clone());
    }
}

impl CaptureSink {
    async fn wait_for(
        &self,
        count: usize,
    ) {
        for _ in 0..200 {
            if self.events.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("sink never reached {} events", count);
    }

    fn versions(&self) -> Vec<u64> {
        self.events.lock().unwrap().iter().map(|e| e.version).collect()
    }
}

struct Fixture {
    reconciler: Reconciler,
    sink: Arc<CaptureSink>,
    _shutdown: watch::Sender<()>,
}

fn fixture_with_store(store: Arc<dyn ShadowStore>) -> Fixture {
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let sink = Arc::new(CaptureSink::default());
    let notifier = ChangeNotifier::spawn(2, 64, sink.clone(), shutdown_rx);
    let validator = Arc::new(AttributeValidator::new(ValidationConfig::default()));
    let policy = BackoffPolicy {
        max_retries: 3,
        timeout_ms: 100,
        base_delay_ms: 1,
        max_delay_ms: 2,
    };

    Fixture {
        reconciler: Reconciler::new(store, notifier, validator, policy),
        sink,
        _shutdown: shutdown_tx,
    }
}

fn fixture() -> Fixture {
    fixture_with_store(Arc::new(MemoryShadowStore::new()))
}

fn temperature(value: f64) -> AttributeMap {
    [("temperature".to_string(), AttributeValue::Number(value))].into()
}

#[tokio::test(start_paused = true)]
async fn test_desired_then_reported_convergence_scenario() {
    let f = fixture();

    // Desired write on a fresh device creates the shadow
    let outcome = f
        .reconciler
        .apply("thermostat-1", StateKind::Desired, temperature(140.0), None)
        .await
        .expect("desired write");
    assert_eq!(outcome.document.version, 1);
    assert!(outcome.document.pending.contains("temperature"));

    // Device reports a different value: still pending
    let outcome = f
        .reconciler
        .apply("thermostat-1", StateKind::Reported, temperature(135.0), None)
        .await
        .expect("first report");
    assert_eq!(outcome.document.version, 2);
    assert!(outcome.document.pending.contains("temperature"));

    // Device reaches the target: pending clears
    let outcome = f
        .reconciler
        .apply("thermostat-1", StateKind::Reported, temperature(140.0), None)
        .await
        .expect("second report");
    assert_eq!(outcome.document.version, 3);
    assert!(outcome.document.pending.is_empty());
    assert!(outcome
        .event
        .pending_delta
        .removed
        .contains("temperature"));

    f.sink.wait_for(3).await;
    assert_eq!(f.sink.versions(), vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_versions_increase_by_one_per_accepted_write() {
    let f = fixture();

    for i in 1..=5u64 {
        let outcome = f
            .reconciler
            .apply("pump-1", StateKind::Reported, temperature(i as f64), None)
            .await
            .expect("write");
        assert_eq!(outcome.document.version, i);
    }
}

#[tokio::test(start_paused = true)]
async fn test_empty_delta_rejected_without_event() {
    let f = fixture();

    let result = f
        .reconciler
        .apply("thermostat-1", StateKind::Desired, AttributeMap::new(), None)
        .await;
    assert!(matches!(
        result,
        Err(Error::Shadow(ShadowError::Validation(_)))
    ));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(f.sink.versions().is_empty());
    assert!(f.reconciler.fetch("thermostat-1").expect("fetch").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_caller_precondition_applies_only_at_expected_version() {
    let f = fixture();

    f.reconciler
        .apply("thermostat-1", StateKind::Desired, temperature(140.0), None)
        .await
        .expect("seed write");

    // Matching expectation succeeds
    let outcome = f
        .reconciler
        .apply(
            "thermostat-1",
            StateKind::Desired,
            temperature(150.0),
            Some(1),
        )
        .await
        .expect("conditional write");
    assert_eq!(outcome.document.version, 2);

    // Stale expectation fails immediately, no retry
    let result = f
        .reconciler
        .apply(
            "thermostat-1",
            StateKind::Desired,
            temperature(160.0),
            Some(1),
        )
        .await;
    assert!(matches!(
        result,
        Err(Error::Shadow(ShadowError::Conflict(
            ConflictError::VersionPrecondition {
                expected: 1,
                actual: 2,
                ..
            }
        )))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_lost_race_retries_and_succeeds() {
    let mut mock = MockShadowStore::new();
    let mut seq = mockall::Sequence::new();

    mock.expect_get().times(2).returning(|device_id| {
        let mut doc = ShadowDocument::empty(device_id);
        doc.version = 5;
        Ok(Some(doc))
    });
    mock.expect_conditional_put()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(PutOutcome::VersionMismatch { actual: 6 }));
    mock.expect_conditional_put()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(PutOutcome::Committed));

    let f = fixture_with_store(Arc::new(mock));
    let outcome = f
        .reconciler
        .apply("pump-1", StateKind::Reported, temperature(1.0), None)
        .await
        .expect("should win on retry");
    assert_eq!(outcome.document.version, 6);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_surface_conflict_without_event() {
    let mut mock = MockShadowStore::new();

    mock.expect_get().returning(|device_id| {
        Ok(Some(ShadowDocument::empty(device_id)))
    });
    // Every attempt loses
    mock.expect_conditional_put()
        .times(4)
        .returning(|_, _| Ok(PutOutcome::VersionMismatch { actual: 9 }));

    let f = fixture_with_store(Arc::new(mock));
    let result = f
        .reconciler
        .apply("pump-1", StateKind::Reported, temperature(1.0), None)
        .await;

    assert!(matches!(
        result,
        Err(Error::Shadow(ShadowError::Conflict(
            ConflictError::RetriesExhausted { attempts: 4, .. }
        )))
    ));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(f.sink.versions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_disjoint_writes_both_land() {
    let f = fixture();

    let first = f.reconciler.apply(
        "thermostat-1",
        StateKind::Reported,
        [("temperature".to_string(), AttributeValue::Number(21.0))].into(),
        None,
    );
    let second = f.reconciler.apply(
        "thermostat-1",
        StateKind::Reported,
        [("humidity".to_string(), AttributeValue::Number(40.0))].into(),
        None,
    );

    let (a, b) = tokio::join!(first, second);
    a.expect("first write");
    b.expect("second write");

    let doc = f
        .reconciler
        .fetch("thermostat-1")
        .expect("fetch")
        .expect("document");
    assert_eq!(doc.version, 2);
    assert!(doc.reported.contains_key("temperature"));
    assert!(doc.reported.contains_key("humidity"));
}
