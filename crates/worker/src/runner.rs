//! Plan runner: wires the engine, store and executor together and drives
//! one campaign plan to completion.

use std::path::Path;
use std::sync::Arc;

use atelier_campaign::request_builder::TemplateRequestBuilder;
use atelier_campaign::store::{ArtifactStore, FsArtifactStore};
use atelier_campaign::{CampaignExecutor, CampaignPlan, RunSummary, StoreError};
use atelier_core::credentials::CredentialPool;
use atelier_engine::api::HttpBackend;
use atelier_engine::{ExecutionEngine, GenerationBackend};
use tokio_util::sync::CancellationToken;

use crate::bootstrap::build_pool;
use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::health;

pub struct Worker {
    config: WorkerConfig,
    pool: Arc<CredentialPool>,
    executor: CampaignExecutor,
}

impl Worker {
    /// Build a worker talking to the configured HTTP backend and writing
    /// artifacts under `OUTPUT_DIR`.
    pub fn from_config(config: WorkerConfig) -> Result<Self, WorkerError> {
        let backend = Arc::new(HttpBackend::new(config.backend_base_url.clone())?);
        let store = Arc::new(FsArtifactStore::new(config.output_dir.clone()));
        Self::with_parts(config, backend, store)
    }

    /// Build a worker over an explicit backend and store.
    pub fn with_parts(
        config: WorkerConfig,
        backend: Arc<dyn GenerationBackend>,
        store: Arc<dyn ArtifactStore>,
    ) -> Result<Self, WorkerError> {
        let pool = Arc::new(build_pool(&config)?);
        let engine = Arc::new(ExecutionEngine::new(
            backend,
            Arc::clone(&pool),
            config.engine_config(),
        ));
        let executor = CampaignExecutor::new(
            engine,
            Arc::new(TemplateRequestBuilder::new(config.catalog.clone())),
            store,
            config.executor_options(),
        );
        Ok(Self {
            config,
            pool,
            executor,
        })
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    /// Handle for stopping the run or subscribing to its events.
    pub fn executor(&self) -> &CampaignExecutor {
        &self.executor
    }

    /// Read, validate and run a plan file.
    pub async fn run_plan_file(&self, path: &Path) -> Result<RunSummary, WorkerError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| WorkerError::Plan {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        let plan = CampaignPlan::from_json(&raw)?;
        self.run_plan(plan).await
    }

    /// Run every pending shot of `plan` while the health watchdog runs
    /// alongside.
    pub async fn run_plan(&self, plan: CampaignPlan) -> Result<RunSummary, WorkerError> {
        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .map_err(StoreError::from)?;
        self.executor.load_plan(plan)?;

        let cancel = CancellationToken::new();
        let watchdog = tokio::spawn(health::run(
            Arc::clone(&self.pool),
            self.config.health_interval(),
            cancel.clone(),
        ));

        let result = self.executor.run_plan().await;

        cancel.cancel();
        if let Err(e) = watchdog.await {
            tracing::warn!(error = %e, "Health watchdog task failed");
        }

        Ok(result?)
    }
}
