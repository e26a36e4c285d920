use anyhow::Context;
use std::path::Path;

use crate::classifier::{Classifier, LinearModel};
use crate::config::Config;
use crate::decision_engine::DecisionEngine;
use crate::features::FeatureEngine;
use crate::fetcher::{DocumentFetcher, HttpFetcher};
use crate::store::{ListStore, MemoryListStore};

/// Long-lived handles shared by every request. Built once at startup and only
/// read afterwards.
pub struct AppContext {
    pub config: Config,
    pub store: Box<dyn ListStore>,
    pub fetcher: Box<dyn DocumentFetcher>,
    pub classifier: Option<Box<dyn Classifier>>,
    pub engine: FeatureEngine,
}

impl AppContext {
    pub fn new(
        config: Config,
        store: Box<dyn ListStore>,
        fetcher: Box<dyn DocumentFetcher>,
        classifier: Option<Box<dyn Classifier>>,
    ) -> Self {
        Self {
            config,
            store,
            fetcher,
            classifier,
            engine: FeatureEngine::new(),
        }
    }

    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let mut store = MemoryListStore::from_file(&config.store_path)
            .with_context(|| format!("Failed to load list store {}", config.store_path))?;
        if let Some(csv_path) = &config.dataset_csv_path {
            store
                .import_dataset_csv(Path::new(csv_path))
                .with_context(|| format!("Failed to import dataset {csv_path}"))?;
        }
        store.ping().context("List store is not reachable")?;

        let fetcher = HttpFetcher::new(&config.fetch).context("Failed to build HTTP client")?;

        let classifier: Option<Box<dyn Classifier>> = match &config.model_path {
            Some(path) => Some(Box::new(LinearModel::from_file(path)?)),
            None => {
                log::warn!("No model_path configured; unmatched addresses will be unknown");
                None
            }
        };

        Ok(Self::new(config, Box::new(store), Box::new(fetcher), classifier))
    }

    pub fn decision_engine(&self) -> DecisionEngine<'_> {
        DecisionEngine::new(self)
    }
}
