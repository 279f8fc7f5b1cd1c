//! Process-scope container.
//!
//! All shared mutable state (agent-card cache, breaker registry, the watcher
//! handle) lives here and is injected into components at construction —
//! there are no globals to leak between tests.

use std::sync::Arc;

use vigil_a2a::{A2aRouter, AgentDirectory};
use vigil_resilience::{BreakerConfig, BreakerRegistry};
use vigil_store::{EsClient, StoreError};

use crate::analyst::AnalystScheduler;
use crate::config::Config;
use crate::pipeline::Coordinator;
use crate::watcher::{AlertWatcher, WatcherConfig};

/// Everything a running Vigil process holds.
pub struct VigilRuntime {
    pub config: Arc<Config>,
    pub store: Arc<EsClient>,
    pub directory: Arc<AgentDirectory>,
    pub router: Arc<A2aRouter>,
    pub breakers: Arc<BreakerRegistry>,
    pub analyst: Arc<AnalystScheduler>,
    pub coordinator: Arc<Coordinator>,
    pub watcher: Arc<AlertWatcher>,
}

impl VigilRuntime {
    /// Build the full component graph from configuration.
    pub fn initialize(config: Config) -> Result<Arc<Self>, StoreError> {
        let config = Arc::new(config);
        let store = Arc::new(EsClient::new(
            config.kibana_url.clone(),
            &config.elastic_api_key,
        )?);
        let directory = AgentDirectory::new(config.kibana_url.clone());
        let router = Arc::new(A2aRouter::new(
            directory.clone(),
            store.clone(),
            config.kibana_url.clone(),
        ));
        let breakers = Arc::new(BreakerRegistry::new(BreakerConfig::default()));
        let analyst = AnalystScheduler::new(
            store.clone(),
            router.clone(),
            config.report_exec_daily_schedule.clone(),
        );
        let coordinator = Coordinator::new(
            store.clone(),
            router.clone(),
            breakers.clone(),
            config.clone(),
            Some(analyst.clone()),
        );
        let watcher = AlertWatcher::new(
            store.clone(),
            coordinator.clone(),
            WatcherConfig {
                poll_interval: config.watcher_poll_interval,
                ..WatcherConfig::default()
            },
        );

        Ok(Arc::new(Self {
            config,
            store,
            directory,
            router,
            breakers,
            analyst,
            coordinator,
            watcher,
        }))
    }

    /// Clear process-local resilience state (used between tests).
    pub fn reset_state(&self) {
        self.breakers.reset();
    }

    /// Stop the background loops.
    pub fn shutdown(&self) {
        self.watcher.stop();
        self.analyst.stop();
    }
}
