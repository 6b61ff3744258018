pub mod config;
pub mod db;
pub mod error;
pub mod local_store;
pub mod sync_loop;
pub mod utils;
pub mod wizard;
pub mod worker;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use config::{DataPaths, WorkerConfig};
use db::Database;
use local_store::LocalStore;
use wizard::{DraftStore, WizardController};
use worker::{HttpNetwork, Network, ServiceWorker};

/// Everything one portal session owns. Dropping it tears the session down.
pub struct PortalContext<N: Network> {
    pub db: Database,
    pub store: Arc<LocalStore>,
    pub worker: Arc<ServiceWorker<N>>,
    pub wizard: WizardController,
}

impl<N: Network> PortalContext<N> {
    /// Opens the on-disk stores under `paths`. The receiver yields the sync
    /// tags the wizard requests after each submission.
    pub fn open(
        paths: &DataPaths,
        config: WorkerConfig,
        network: N,
    ) -> Result<(Self, mpsc::UnboundedReceiver<String>)> {
        let db = Database::new(paths.database())?;
        let store = LocalStore::open(paths.local_storage())?;
        Ok(Self::assemble(db, store, config, network))
    }

    /// Session backed by memory only; nothing survives the process.
    pub fn in_memory(
        config: WorkerConfig,
        network: N,
    ) -> Result<(Self, mpsc::UnboundedReceiver<String>)> {
        let db = Database::open_in_memory()?;
        Ok(Self::assemble(db, LocalStore::in_memory(), config, network))
    }

    fn assemble(
        db: Database,
        store: LocalStore,
        config: WorkerConfig,
        network: N,
    ) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sync_tx, sync_rx) = mpsc::unbounded_channel();
        let sync_tag = config.sync_tag.clone();
        let store = Arc::new(store);

        let worker = Arc::new(ServiceWorker::new(config, db.clone(), network));
        let wizard = WizardController::new(DraftStore::new(Arc::clone(&store)), worker.queue().clone())
            .with_sync_requests(sync_tx, &sync_tag);

        (
            Self {
                db,
                store,
                worker,
                wizard,
            },
            sync_rx,
        )
    }

    /// Installs and activates the worker. An offline restart keeps serving
    /// the generation stored by an earlier session. A failed first install is
    /// logged and the session continues without interception.
    pub async fn start(&self) -> Result<()> {
        match self.worker.install().await {
            Ok(count) => info!("precached {count} resources"),
            Err(err) => warn!("worker install failed, requests will pass through: {err}"),
        }

        if self.worker.is_ready_to_activate().await {
            let report = self.worker.activate().await?;
            for failure in &report.failures {
                warn!("{failure}");
            }
        }

        let counts = self.worker.queue().count_by_status().await?;
        info!(
            "appointment queue: {} pending, {} synced",
            counts.pending, counts.synced
        );
        info!(
            "preferences: language {}, theme {}",
            self.store.language().as_str(),
            self.store.theme().map(|theme| theme.as_str()).unwrap_or("system")
        );
        if self.wizard.has_draft() {
            info!("a saved appointment draft is available to restore");
        }
        Ok(())
    }
}

pub fn run() -> Result<()> {
    // RUST_LOG wins when set; otherwise info.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("DigGO portal core starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(serve())
}

async fn serve() -> Result<()> {
    let config = WorkerConfig::from_env()?;
    let paths = DataPaths::from_env();
    let network = HttpNetwork::new(config.origin.clone())?;
    let sync_interval = config.sync_interval;

    let (context, sync_requests) = PortalContext::open(&paths, config, network)?;
    context.start().await?;

    let cancel_token = CancellationToken::new();
    let sync_task = tokio::spawn(sync_loop::sync_loop(
        Arc::clone(&context.worker),
        sync_requests,
        sync_interval,
        cancel_token.clone(),
    ));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown requested");

    cancel_token.cancel();
    sync_task.await.context("sync loop task failed to join")?;
    context.worker.shutdown().await;

    info!("DigGO portal core stopped");
    Ok(())
}
