//! The assembled shadow engine: reconciler, notifier, connection manager
//! and the subscriber-facing server, run as one unit.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::info;

use crate::network;
use crate::BridgeAdapter;
use crate::DeviceEnvelope;
use crate::Result;
use crate::Settings;
use crate::SharedConnectionManager;
use crate::SystemError;
use crate::TokenValidator;

pub struct ShadowEngine {
    bridge: Arc<BridgeAdapter>,
    manager: SharedConnectionManager,
    token_validator: Arc<dyn TokenValidator>,

    /// Producer half of the device transport; embedders push envelopes here
    device_tx: mpsc::Sender<DeviceEnvelope>,

    settings: Arc<Settings>,
    ready: AtomicBool,
    shutdown_signal: watch::Receiver<()>,
}

impl ShadowEngine {
    pub(super) fn new(
        bridge: Arc<BridgeAdapter>,
        manager: SharedConnectionManager,
        token_validator: Arc<dyn TokenValidator>,
        device_tx: mpsc::Sender<DeviceEnvelope>,
        settings: Arc<Settings>,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            bridge,
            manager,
            token_validator,
            device_tx,
            settings,
            ready: AtomicBool::new(false),
            shutdown_signal,
        }
    }

    /// Serves the HTTP and WebSocket surface until the shutdown signal.
    pub async fn run(&self) -> Result<()> {
        let routes = network::routes(
            self.bridge.clone(),
            self.manager.clone(),
            self.token_validator.clone(),
            self.settings.network.clone(),
            self.shutdown_signal.clone(),
        );

        let mut shutdown_signal = self.shutdown_signal.clone();
        let (addr, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(self.settings.network.listen_address, async move {
                let _ = shutdown_signal.changed().await;
            })
            .map_err(|e| SystemError::EngineStartFailed(e.to_string()))?;

        info!("shadow engine listening on {}", addr);
        self.set_ready(true);
        server.await;

        info!("shadow engine stopped");
        Ok(())
    }

    /// Direct access to the write/read API for embedded use.
    pub fn bridge(&self) -> &Arc<BridgeAdapter> {
        &self.bridge
    }

    /// Producer handle for the device-facing transport.
    pub fn device_sender(&self) -> mpsc::Sender<DeviceEnvelope> {
        self.device_tx.clone()
    }

    pub fn set_ready(
        &self,
        is_ready: bool,
    ) {
        self.ready.store(is_ready, Ordering::SeqCst);
    }

    pub fn server_is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}
