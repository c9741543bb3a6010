use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{run_api, ApiState};
use crate::config::NodeConfig;
use crate::error::{LeadflowError, Result};
use crate::notify::Notifier;
use crate::rotation::{Matcher, Promoter, PromotionWindows};
use crate::store::Store;

/// Handles to the background rotation loops.
pub struct RotationHandles {
    pub promoter: JoinHandle<()>,
    pub matcher: JoinHandle<()>,
}

impl RotationHandles {
    pub async fn join(self) {
        if let Err(e) = self.promoter.await {
            tracing::error!(error = %e, "Promoter task panicked");
        }
        if let Err(e) = self.matcher.await {
            tracing::error!(error = %e, "Matcher task panicked");
        }
    }
}

/// Main node that orchestrates all components
pub struct Node {
    pub config: NodeConfig,
    pub store: Arc<Store>,
    pub notifier: Notifier,
}

impl Node {
    pub fn new(config: NodeConfig, store: Store) -> Self {
        let notifier = Notifier::new(config.rotation.notice_capacity);
        Self {
            config,
            store: Arc::new(store),
            notifier,
        }
    }

    /// Build a node, loading the store from `config.data_file` if set.
    pub async fn open(config: NodeConfig) -> Result<Self> {
        let store = match config.data_file {
            Some(ref path) => Store::load_with_capacity(path, config.max_leads).await?,
            None => Store::with_capacity(config.max_leads),
        };
        Ok(Self::new(config, store))
    }

    pub fn api_state(&self) -> ApiState {
        ApiState {
            store: self.store.clone(),
            notifier: self.notifier.clone(),
        }
    }

    /// Spawn the promoter and matcher loops.
    ///
    /// Each loop holds its own store subscription and exits when `shutdown`
    /// is cancelled.
    pub fn spawn_rotation(&self, shutdown: CancellationToken) -> RotationHandles {
        let rotation = &self.config.rotation;

        let promoter = Promoter::new(
            self.store.clone(),
            self.notifier.clone(),
            PromotionWindows::from_config(rotation),
        );
        let promoter_changes = self.store.subscribe();
        let promoter_interval = rotation.promoter_interval;
        let promoter_shutdown = shutdown.clone();
        let promoter = tokio::spawn(async move {
            promoter
                .run(promoter_changes, promoter_interval, promoter_shutdown)
                .await;
        });

        let matcher = Matcher::new(self.store.clone(), self.notifier.clone());
        let matcher_changes = self.store.subscribe();
        let debounce = rotation.matcher_debounce;
        let matcher = tokio::spawn(async move {
            matcher.run(matcher_changes, debounce, shutdown).await;
        });

        RotationHandles { promoter, matcher }
    }

    /// Run the node with all components.
    ///
    /// 1. Spawns the promoter and matcher loops
    /// 2. Serves the HTTP API until `shutdown` is cancelled
    /// 3. Waits for the loops to stop
    /// 4. Saves the store to the data file, if configured
    ///
    /// # Errors
    ///
    /// Returns an error if the API server cannot bind or the final save fails.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let rotation = self.spawn_rotation(shutdown.clone());

        let served = run_api(self.config.listen_addr, self.api_state(), shutdown.clone()).await;

        // The API may have failed before any signal; stop the loops either way.
        shutdown.cancel();
        rotation.join().await;

        if let Some(ref path) = self.config.data_file {
            self.store.save(path).await?;
        }

        served.map_err(|e| LeadflowError::Internal(format!("API server failed: {}", e)))
    }
}
