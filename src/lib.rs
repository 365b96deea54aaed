pub mod analysis;
pub mod bus;
pub mod capture;
mod cli;
pub mod db;
pub mod error;
pub mod notify;
pub mod overlay;
pub mod pipeline;
pub mod result_cache;
pub mod settings;
pub mod status;
pub mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinHandle;

use analysis::AnalysisClient;
use bus::{MessageBus, RequestReceiver, StoreEvents};
use capture::ScreenCapturer;
use db::Database;
use notify::Notifier;
use pipeline::Orchestrator;
use settings::SettingsStore;
use utils::paths::AppPaths;

/// Everything one process needs: both stores, the bus and the orchestrator.
pub struct AppState {
    pub db: Database,
    pub settings: Arc<SettingsStore>,
    pub bus: MessageBus,
    pub client: AnalysisClient,
    pub orchestrator: Orchestrator,
    requests: Option<RequestReceiver>,
}

impl AppState {
    pub fn init(
        paths: AppPaths,
        capturer: Arc<dyn ScreenCapturer>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        paths.ensure_exists()?;

        let database = Database::new(paths.database_file())?;
        let events = StoreEvents::new();
        let settings = Arc::new(SettingsStore::new(paths.settings_file(), events.clone())?);
        let (bus, requests) = MessageBus::new();
        let client = AnalysisClient::new()?;

        let orchestrator = Orchestrator::new(
            settings.clone(),
            database.clone(),
            events,
            bus.clone(),
            capturer,
            client.clone(),
            notifier,
        );

        Ok(Self {
            db: database,
            settings,
            bus,
            client,
            orchestrator,
            requests: Some(requests),
        })
    }

    /// Start answering bus requests. Only the first call spawns a server.
    pub fn serve(&mut self) -> Option<JoinHandle<()>> {
        let requests = self.requests.take()?;
        Some(pipeline::commands::serve(self.orchestrator.clone(), requests))
    }
}

pub fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    utils::logging::init(cli.debug || utils::logging::debug_from_env());

    log::debug!("ScreenMind starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(cli::execute(cli))
}
