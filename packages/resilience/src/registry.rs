//! Process-local breaker registry.
//!
//! One windowed breaker per agent id, created on first use. Lives inside the
//! process-scope runtime container rather than a global; tests reset it by
//! constructing a fresh registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::breaker::{AgentCircuitBreaker, BreakerConfig};

/// Registry of per-agent circuit breakers.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: RwLock<HashMap<String, Arc<AgentCircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Breaker for the named agent, creating it on first use.
    pub fn for_agent(&self, agent_id: &str) -> Arc<AgentCircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(agent_id) {
            return breaker.clone();
        }

        let mut breakers = self.breakers.write();
        breakers
            .entry(agent_id.to_string())
            .or_insert_with(|| Arc::new(AgentCircuitBreaker::new(agent_id, self.config)))
            .clone()
    }

    /// Drop all breakers (state reset between tests).
    pub fn reset(&self) {
        self.breakers.write().clear();
    }
}
