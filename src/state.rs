//! Application state: the store, the loaded config, and the mutation notifier.

use tracing::{info, instrument};

use crate::config::BankConfig;
use crate::error::BankResult;
use crate::events::Notifier;
use crate::store::Store;

pub struct AppState {
    pub store: Store,
    pub config: BankConfig,
    pub events: Notifier,
}

impl AppState {
    /// Build state from config: open (and possibly load) the store.
    #[instrument(level = "info", skip_all)]
    pub async fn new(config: BankConfig) -> BankResult<Self> {
        let store = Store::open(config.storage.data_path.clone()).await?;
        {
            let t = store.read().await;
            info!(
                target: "exercise_bank",
                colleges = t.colleges.len(),
                courses = t.courses.len(),
                knowledge_points = t.knowledge_points.len(),
                exercises = t.exercises.len(),
                papers = t.papers.len(),
                "Startup inventory"
            );
        }
        if config.storage.data_path.is_none() {
            info!(target: "exercise_bank", "No data path configured; state is memory only");
        }
        Ok(Self { store, config, events: Notifier::new() })
    }

    /// Memory-only state with default config.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self { store: Store::in_memory(), config: BankConfig::default(), events: Notifier::new() }
    }
}
