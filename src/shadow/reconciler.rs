use std::sync::Arc;

use autometrics::autometrics;
use tracing::debug;
use tracing::warn;

use crate::metrics::SHADOW_WRITES_METRIC;
use crate::metrics::VALIDATION_FAILURES_METRIC;
use crate::metrics::WRITE_CONFLICTS_METRIC;
use crate::utils::time;
use crate::API_SLO;
use crate::AttributeMap;
use crate::AttributeValidator;
use crate::BackoffPolicy;
use crate::ChangeEvent;
use crate::ChangeNotifier;
use crate::ConflictError;
use crate::PutOutcome;
use crate::Result;
use crate::ShadowDocument;
use crate::ShadowStore;
use crate::StateKind;

/// A successful reconciliation: the persisted document and the event that
/// was published for it.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub document: ShadowDocument,
    pub event: ChangeEvent,
}

/// The single entry point for shadow mutation.
///
/// Merge computation is pure; the only suspension points are the store call
/// and the backoff sleep between retries. Serialization of concurrent
/// writers comes entirely from the store's conditional write: the loser of
/// a race re-runs the whole read-merge-write cycle against the fresh
/// document, bounded by the reconcile retry policy.
pub struct Reconciler {
    store: Arc<dyn ShadowStore>,
    notifier: ChangeNotifier,
    validator: Arc<AttributeValidator>,
    policy: BackoffPolicy,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ShadowStore>,
        notifier: ChangeNotifier,
        validator: Arc<AttributeValidator>,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            store,
            notifier,
            validator,
            policy,
        }
    }

    pub fn store(&self) -> &Arc<dyn ShadowStore> {
        &self.store
    }

    /// Merges `delta` into the `kind` side of the device's shadow.
    ///
    /// With `expected_version: None` the write applies against whatever
    /// version the read observed, retrying lost races. A caller-supplied
    /// expectation means "apply only if still version N": any mismatch is
    /// an immediate conflict, supporting UI-driven optimistic updates.
    ///
    /// Exactly one change event is published per accepted write; none on
    /// validation failure or exhausted retries.
    #[autometrics(objective = API_SLO)]
    pub async fn apply(
        &self,
        device_id: &str,
        kind: StateKind,
        delta: AttributeMap,
        expected_version: Option<u64>,
    ) -> Result<ApplyOutcome> {
        if let Err(e) = self.validator.check_delta(&delta) {
            VALIDATION_FAILURES_METRIC
                .with_label_values(&[kind.as_str()])
                .inc();
            return Err(e.into());
        }

        let max_attempts = self.policy.max_retries + 1;
        for attempt in 0..max_attempts {
            let current = self
                .store
                .get(device_id)?
                .unwrap_or_else(|| ShadowDocument::empty(device_id));
            let read_version = current.version;

            if let Some(expected) = expected_version {
                if expected != read_version {
                    WRITE_CONFLICTS_METRIC
                        .with_label_values(&["precondition"])
                        .inc();
                    return Err(ConflictError::VersionPrecondition {
                        device_id: device_id.to_string(),
                        expected,
                        actual: read_version,
                    }
                    .into());
                }
            }

            let mut next = current;
            let changed = next.merge(kind, &delta);
            let pending_delta = next.recompute_pending(self.validator.as_ref());
            next.version = read_version + 1;
            next.updated_at = time::now_millis();

            match self.store.conditional_put(&next, read_version)? {
                PutOutcome::Committed => {
                    SHADOW_WRITES_METRIC
                        .with_label_values(&[kind.as_str()])
                        .inc();
                    debug!(
                        "applied {} delta to {} at v{}",
                        kind.as_str(),
                        device_id,
                        next.version
                    );

                    let event = ChangeEvent {
                        device_id: device_id.to_string(),
                        version: next.version,
                        reported_delta: (kind == StateKind::Reported && !changed.is_empty())
                            .then(|| changed.clone()),
                        desired_delta: (kind == StateKind::Desired && !changed.is_empty())
                            .then(|| changed.clone()),
                        pending_delta,
                        timestamp: next.updated_at,
                    };
                    self.notifier.publish(event.clone());

                    return Ok(ApplyOutcome {
                        document: next,
                        event,
                    });
                }
                PutOutcome::VersionMismatch { actual } => {
                    WRITE_CONFLICTS_METRIC.with_label_values(&["retried"]).inc();
                    warn!(
                        "version race on {} (read v{}, stored v{}), attempt {}/{}",
                        device_id,
                        read_version,
                        actual,
                        attempt + 1,
                        max_attempts
                    );

                    if let Some(expected) = expected_version {
                        return Err(ConflictError::VersionPrecondition {
                            device_id: device_id.to_string(),
                            expected,
                            actual,
                        }
                        .into());
                    }

                    if attempt + 1 < max_attempts {
                        tokio::time::sleep(self.policy.delay_with_jitter(attempt)).await;
                    }
                }
            }
        }

        WRITE_CONFLICTS_METRIC
            .with_label_values(&["exhausted"])
            .inc();
        Err(ConflictError::RetriesExhausted {
            device_id: device_id.to_string(),
            attempts: max_attempts,
        }
        .into())
    }

    /// Read side of the API: the full document for resynchronization.
    pub fn fetch(
        &self,
        device_id: &str,
    ) -> Result<Option<ShadowDocument>> {
        self.store.get(device_id)
    }
}
