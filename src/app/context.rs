use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::app::error::{Result, WeirError};
use crate::app::HttpClients;
use crate::capture::open_writer;
use crate::config::Config;
use crate::fetcher::ReqwestClient;
use crate::harvest::Harvester;
use crate::store::{open_state_store, HarvestStateStore};
use crate::stream::StreamSession;

/// Per-run switches from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct HarvestOptions {
    /// Discard records and don't persist state.
    pub dry_run: bool,
    /// Ignore the previous state snapshot.
    pub full: bool,
}

/// Loaded configuration and the resources built from it.
pub struct AppContext {
    pub config: Config,
    pub data_path: PathBuf,
}

impl AppContext {
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        Self::from_config(Config::load(config_path)?)
    }

    pub fn from_config(config: Config) -> Result<Self> {
        let data_path = config.data_path()?;
        std::fs::create_dir_all(&data_path)?;
        debug!(data_path = %data_path.display(), "Using data directory");
        Ok(Self { config, data_path })
    }

    pub fn state_store(&self, load: bool, persist: bool) -> Result<Box<dyn HarvestStateStore>> {
        open_state_store(self.config.state.backend, &self.data_path, load, persist)
    }

    /// A harvester seeded from `[[seeds]]`, writing to a fresh capture file.
    pub fn harvester(&self, options: HarvestOptions) -> Result<Harvester> {
        self.harvester_with(options, HttpClients::reqwest())
    }

    pub fn harvester_with(&self, options: HarvestOptions, clients: HttpClients) -> Result<Harvester> {
        let dry_run = options.dry_run || self.config.dry_run;
        let load = self.config.state.load && !options.full;

        let mut seeds = Vec::new();
        for seed in self.config.seeds.iter().cloned() {
            seeds.extend(seed.into_fetchables(&self.data_path)?);
        }
        if seeds.is_empty() {
            return Err(WeirError::Config("no [[seeds]] configured".to_string()));
        }

        let state = self.state_store(load, !dry_run)?;
        let writer = open_writer(&self.data_path, &self.config.collection, None, dry_run)?;
        info!(
            seeds = seeds.len(),
            dry_run,
            load_state = load,
            "Starting harvest"
        );

        let mut harvester = Harvester::new(writer, state, clients)
            .with_strategy(self.config.strategy.clone())
            .with_wait(self.config.wait())
            .with_exclude(self.config.exclude.clone())
            .with_services(self.config.services.clone())
            .with_dry_run(dry_run);
        harvester.seed(seeds);
        Ok(harvester)
    }

    /// A session for `[streams.<name>]` and the client that will feed it.
    pub fn stream_session(&self, name: &str) -> Result<(StreamSession, ReqwestClient)> {
        let mut stream = self.config.stream_config(name)?;
        stream.data_path = self.data_path.clone();

        let service_name = self
            .config
            .streams
            .get(name)
            .map(|s| s.service.as_str())
            .unwrap_or_default();
        let service = self.config.service(service_name).ok_or_else(|| {
            WeirError::Config(format!("no [services.{}] section configured", service_name))
        })?;
        let client = ReqwestClient::streaming(
            service.user_agent.as_deref(),
            service.bearer_token.as_deref(),
        )?;
        Ok((StreamSession::new(stream), client))
    }
}
