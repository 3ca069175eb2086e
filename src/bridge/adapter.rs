use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::debug;
use tracing::error;
use tracing::info;

use super::DeviceEnvelope;
use super::DeviceRegistry;
use super::UnknownDevicePolicy;
use crate::ApplyOutcome;
use crate::AttributeMap;
use crate::BackoffPolicy;
use crate::Error;
use crate::Reconciler;
use crate::Result;
use crate::ShadowDocument;
use crate::ShadowError;
use crate::StateKind;
use crate::StorageError;
use crate::SystemError;

/// Entry point for both write directions.
///
/// Device reports arrive over the transport channel ([`BridgeAdapter::run`])
/// or the ingestion endpoint; operator requests arrive over the desired
/// endpoint. Both end up in [`Reconciler::apply`] with only the state kind
/// differing.
pub struct BridgeAdapter {
    reconciler: Arc<Reconciler>,
    registry: Arc<dyn DeviceRegistry>,
    policy: UnknownDevicePolicy,
    storage_backoff: BackoffPolicy,
}

impl BridgeAdapter {
    pub fn new(
        reconciler: Arc<Reconciler>,
        registry: Arc<dyn DeviceRegistry>,
        policy: UnknownDevicePolicy,
        storage_backoff: BackoffPolicy,
    ) -> Self {
        Self {
            reconciler,
            registry,
            policy,
            storage_backoff,
        }
    }

    /// Device-report merge. `expected_version` is `None` on the transport
    /// path; the ingestion endpoint may forward a caller expectation.
    pub async fn apply_reported(
        &self,
        device_id: &str,
        delta: AttributeMap,
        expected_version: Option<u64>,
    ) -> Result<ApplyOutcome> {
        self.check_device(device_id).await?;
        self.apply_with_storage_retry(device_id, StateKind::Reported, delta, expected_version)
            .await
    }

    /// Operator-request merge into desired state.
    pub async fn apply_desired(
        &self,
        device_id: &str,
        delta: AttributeMap,
        expected_version: Option<u64>,
    ) -> Result<ApplyOutcome> {
        self.check_device(device_id).await?;
        self.apply_with_storage_retry(device_id, StateKind::Desired, delta, expected_version)
            .await
    }

    /// Full-document read for the resync path.
    pub fn fetch(
        &self,
        device_id: &str,
    ) -> Result<Option<ShadowDocument>> {
        self.reconciler.fetch(device_id)
    }

    /// Drains the device-facing transport until it closes or shutdown is
    /// signalled. A failed envelope never stops the loop.
    pub async fn run(
        self: Arc<Self>,
        mut inbound: mpsc::Receiver<DeviceEnvelope>,
        mut shutdown_signal: watch::Receiver<()>,
    ) {
        info!("bridge adapter consuming device transport");
        loop {
            tokio::select! {
                maybe_envelope = inbound.recv() => match maybe_envelope {
                    Some(envelope) => {
                        if let Err(e) = self
                            .apply_reported(&envelope.device_id, envelope.attributes, None)
                            .await
                        {
                            error!(
                                "failed to apply report from {}: {:?}",
                                envelope.device_id, e
                            );
                        }
                    }
                    None => {
                        info!("device transport closed, stopping bridge");
                        break;
                    }
                },
                _ = shutdown_signal.changed() => {
                    info!("shutdown signalled, stopping bridge");
                    break;
                }
            }
        }
    }

    async fn check_device(
        &self,
        device_id: &str,
    ) -> Result<()> {
        if self.policy == UnknownDevicePolicy::AcceptAndCreate {
            return Ok(());
        }
        if self.registry.is_registered(device_id).await? {
            return Ok(());
        }
        Err(Error::Shadow(ShadowError::DeviceUnknown {
            device_id: device_id.to_string(),
        }))
    }

    /// Transient storage failures are retried here, at the reconciler's
    /// caller, with the storage backoff policy. Conflicts are not: the
    /// reconciler already spent its own retry budget on those.
    async fn apply_with_storage_retry(
        &self,
        device_id: &str,
        kind: StateKind,
        delta: AttributeMap,
        expected_version: Option<u64>,
    ) -> Result<ApplyOutcome> {
        let max_attempts = self.storage_backoff.max_retries + 1;
        let mut attempt = 0;
        loop {
            match self
                .reconciler
                .apply(device_id, kind, delta.clone(), expected_version)
                .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(e) if is_transient(&e) && attempt + 1 < max_attempts => {
                    debug!(
                        "transient storage failure on {} (attempt {}/{}): {:?}",
                        device_id,
                        attempt + 1,
                        max_attempts,
                        e
                    );
                    tokio::time::sleep(self.storage_backoff.delay_with_jitter(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_transient(error: &Error) -> bool {
    matches!(
        error,
        Error::System(SystemError::Storage(StorageError::Unavailable(_)))
    )
}
