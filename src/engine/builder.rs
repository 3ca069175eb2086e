//! Builder for assembling a [`ShadowEngine`] instance.
//!
//! Initializes production defaults (sled-backed store, allow-all registry,
//! static token validation) and lets embedders override any seam before
//! `build()` wires the reconciler, notifier and connection manager together.
//!
//! ## Example
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(());
//! let engine = EngineBuilder::new(None, shutdown_rx)?
//!     .build()
//!     .start_metrics_server(shutdown_tx.subscribe())
//!     .ready()?;
//! engine.run().await?;
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::info;

use super::ShadowEngine;
use crate::metrics;
use crate::init_sled_shadow_db;
use crate::AllowAllRegistry;
use crate::AttributeValidator;
use crate::BridgeAdapter;
use crate::ChangeNotifier;
use crate::ConnectionManager;
use crate::DeviceRegistry;
use crate::Reconciler;
use crate::Result;
use crate::Settings;
use crate::ShadowStore;
use crate::SledShadowStore;
use crate::StaticTokenValidator;
use crate::SystemError;
use crate::TokenValidator;

pub struct EngineBuilder {
    pub(super) settings: Settings,
    pub(super) store: Option<Arc<dyn ShadowStore>>,
    pub(super) registry: Option<Arc<dyn DeviceRegistry>>,
    pub(super) validator: Option<Arc<AttributeValidator>>,
    pub(super) token_validator: Option<Arc<dyn TokenValidator>>,
    pub(super) shutdown_signal: watch::Receiver<()>,

    pub(super) engine: Option<Arc<ShadowEngine>>,
}

impl EngineBuilder {
    /// Creates a builder with configuration loaded from the standard
    /// sources, optionally merged with a deployment-specific file.
    pub fn new(
        config_path: Option<&str>,
        shutdown_signal: watch::Receiver<()>,
    ) -> Result<Self> {
        if let Some(path) = config_path {
            info!("loading configuration override from {}", path);
        }
        let settings = Settings::load(config_path)?;
        Ok(Self::init(settings, shutdown_signal))
    }

    /// Constructs a builder from pre-built settings.
    pub fn init(
        settings: Settings,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            settings,
            store: None,
            registry: None,
            validator: None,
            token_validator: None,
            shutdown_signal,
            engine: None,
        }
    }

    /// Sets a custom shadow store implementation
    pub fn store(
        mut self,
        store: Arc<dyn ShadowStore>,
    ) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets an external device registry
    pub fn registry(
        mut self,
        registry: Arc<dyn DeviceRegistry>,
    ) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets a pre-built attribute validator (e.g. with reloaded rules)
    pub fn validator(
        mut self,
        validator: Arc<AttributeValidator>,
    ) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Sets a custom connection credential check
    pub fn token_validator(
        mut self,
        token_validator: Arc<dyn TokenValidator>,
    ) -> Self {
        self.token_validator = Some(token_validator);
        self
    }

    /// Replaces the entire configuration
    pub fn settings(
        mut self,
        settings: Settings,
    ) -> Self {
        self.settings = settings;
        self
    }

    /// Assembles the engine and spawns its background tasks: the notifier
    /// dispatch loops and the device transport consumer.
    ///
    /// # Panics
    /// Panics if the default sled database cannot be opened.
    pub fn build(mut self) -> Self {
        let settings = self.settings.clone();

        let store = self.store.take().unwrap_or_else(|| {
            let db = init_sled_shadow_db(&settings.engine.db_root_dir)
                .expect("open shadow database successfully.");
            Arc::new(SledShadowStore::new(&db).expect("open shadow tree successfully."))
        });

        let manager = Arc::new(ConnectionManager::new(&settings.network));
        let notifier = ChangeNotifier::spawn(
            settings.engine.notifier_shards,
            settings.engine.shard_buffer,
            manager.clone(),
            self.shutdown_signal.clone(),
        );

        let validator = self
            .validator
            .take()
            .unwrap_or_else(|| Arc::new(AttributeValidator::new(settings.validation.clone())));

        // The engine-level retry bound wins over the generic policy default
        let mut reconcile_policy = settings.retry.reconcile;
        reconcile_policy.max_retries = settings.engine.max_write_retries;

        let reconciler = Arc::new(Reconciler::new(
            store,
            notifier,
            validator,
            reconcile_policy,
        ));

        let registry = self
            .registry
            .take()
            .unwrap_or_else(|| Arc::new(AllowAllRegistry));

        let bridge = Arc::new(BridgeAdapter::new(
            reconciler,
            registry,
            settings.engine.unknown_device_policy,
            settings.retry.storage,
        ));

        let token_validator = self
            .token_validator
            .take()
            .unwrap_or_else(|| Arc::new(StaticTokenValidator::new(settings.network.auth_token.clone())));

        // Device transport channel, drained by the bridge until shutdown
        let (device_tx, device_rx) = mpsc::channel(settings.engine.shard_buffer);
        tokio::spawn(
            bridge
                .clone()
                .run(device_rx, self.shutdown_signal.clone()),
        );

        self.engine = Some(Arc::new(ShadowEngine::new(
            bridge,
            manager,
            token_validator,
            device_tx,
            Arc::new(settings),
            self.shutdown_signal.clone(),
        )));
        self
    }

    /// Starts the Prometheus exporter when monitoring is enabled.
    pub fn start_metrics_server(
        self,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        if self.settings.monitoring.enabled {
            let port = self.settings.monitoring.prometheus_port;
            info!("starting metrics server on port {}", port);
            tokio::spawn(async move {
                metrics::start_server(port, shutdown_signal).await;
            });
        }
        self
    }

    /// Returns the built engine instance.
    ///
    /// # Errors
    /// Fails when called before `build()`.
    pub fn ready(self) -> Result<Arc<ShadowEngine>> {
        self.engine.ok_or_else(|| {
            SystemError::EngineStartFailed("engine was not built".to_string()).into()
        })
    }

    /// Test constructor with custom database path
    #[cfg(test)]
    pub fn new_from_db_path(
        db_path: &str,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        use std::path::PathBuf;

        let mut settings = Settings::default();
        settings.engine.db_root_dir = PathBuf::from(db_path);
        Self::init(settings, shutdown_signal)
    }
}
