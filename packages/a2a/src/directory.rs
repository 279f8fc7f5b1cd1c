//! Agent discovery and card cache.
//!
//! Cards are fetched from the agent runtime's well-known path, cached, and
//! compared between discovery sweeps to emit `agent:up` / `agent:down`
//! transition events. Snapshots older than five minutes are served flagged
//! `stale`; a refresh already in flight is never doubled — concurrent
//! callers get the stale snapshot instead.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use crate::card::{agents, AgentCard};
use crate::error::A2aError;

/// Snapshot age beyond which `last_discovery` reports stale.
const STALE_AFTER_MS: i64 = 5 * 60 * 1000;

/// Result of one discovery sweep. Never an error: agents that could not be
/// reached land in `unavailable`.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOutcome {
    pub available: Vec<String>,
    pub unavailable: Vec<String>,
}

/// A point-in-time view of the last sweep.
#[derive(Debug, Clone)]
pub struct DiscoverySnapshot {
    pub available: Vec<String>,
    pub unavailable: Vec<String>,
    pub at: DateTime<Utc>,
    pub stale: bool,
}

/// Availability transition observed between sweeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    Up { agent_id: String },
    Down { agent_id: String },
}

#[derive(Debug, Clone)]
struct StoredSnapshot {
    available: Vec<String>,
    unavailable: Vec<String>,
    at: DateTime<Utc>,
}

/// Card registry + discovery service.
pub struct AgentDirectory {
    http: reqwest::Client,
    base_url: String,
    cache: RwLock<HashMap<String, AgentCard>>,
    last: RwLock<Option<StoredSnapshot>>,
    refreshing: AtomicBool,
    events: broadcast::Sender<AgentEvent>,
}

impl AgentDirectory {
    pub fn new(base_url: impl Into<String>) -> Arc<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        let (events, _) = broadcast::channel(64);

        Arc::new(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache: RwLock::new(HashMap::new()),
            last: RwLock::new(None),
            refreshing: AtomicBool::new(false),
            events,
        })
    }

    /// Listen for up/down transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }

    /// Register a card directly (bootstrap and tests).
    pub async fn register(&self, card: AgentCard) {
        let mut cache = self.cache.write().await;
        tracing::info!(agent_id = %card.agent_id, "agent card registered");
        cache.insert(card.agent_id.clone(), card);
    }

    /// Resolve a card, fetching on cache miss.
    pub async fn get_card(&self, agent_id: &str) -> Result<AgentCard, A2aError> {
        if let Some(card) = self.cache.read().await.get(agent_id) {
            return Ok(card.clone());
        }

        let card = self.fetch_card(agent_id, true).await?;
        self.cache
            .write()
            .await
            .insert(agent_id.to_string(), card.clone());
        Ok(card)
    }

    /// Discover all agents (or a given subset) in parallel.
    ///
    /// Transient failures are retried once; a 404 is permanent and is not.
    /// Never returns an error — unreachable agents are reported, and
    /// `agent:up` / `agent:down` events fire for availability transitions
    /// since the previous sweep.
    pub async fn discover_all(&self, list: Option<&[&str]>) -> DiscoveryOutcome {
        let ids: Vec<&str> = list.unwrap_or(agents::ALL).to_vec();

        let fetches = ids.iter().map(|id| self.fetch_card(id, true));
        let results = futures::future::join_all(fetches).await;

        let mut outcome = DiscoveryOutcome::default();
        let mut cards = Vec::new();
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(card) => {
                    outcome.available.push((*id).to_string());
                    cards.push(card);
                }
                Err(e) => {
                    tracing::warn!(agent_id = %id, error = %e, "agent discovery failed");
                    outcome.unavailable.push((*id).to_string());
                }
            }
        }

        {
            let mut cache = self.cache.write().await;
            for card in cards {
                cache.insert(card.agent_id.clone(), card);
            }
        }

        self.emit_transitions(&outcome).await;

        *self.last.write().await = Some(StoredSnapshot {
            available: outcome.available.clone(),
            unavailable: outcome.unavailable.clone(),
            at: Utc::now(),
        });

        outcome
    }

    /// Cloned view of the last sweep, flagged stale after five minutes.
    pub async fn last_discovery(&self) -> Option<DiscoverySnapshot> {
        let last = self.last.read().await;
        last.as_ref().map(|snapshot| DiscoverySnapshot {
            available: snapshot.available.clone(),
            unavailable: snapshot.unavailable.clone(),
            at: snapshot.at,
            stale: Utc::now() - snapshot.at > ChronoDuration::milliseconds(STALE_AFTER_MS),
        })
    }

    /// Re-run discovery unless one is already in flight, in which case the
    /// existing (possibly stale) snapshot is returned instead of doubling
    /// the sweep.
    pub async fn refresh_cache(&self) -> Option<DiscoverySnapshot> {
        if self.refreshing.swap(true, Ordering::SeqCst) {
            tracing::debug!("discovery refresh already in flight, serving last snapshot");
            return self.last_discovery().await;
        }

        let outcome = self.discover_all(None).await;
        self.refreshing.store(false, Ordering::SeqCst);

        Some(DiscoverySnapshot {
            available: outcome.available,
            unavailable: outcome.unavailable,
            at: Utc::now(),
            stale: false,
        })
    }

    async fn emit_transitions(&self, outcome: &DiscoveryOutcome) {
        let previous: HashSet<String> = match self.last.read().await.as_ref() {
            Some(snapshot) => snapshot.available.iter().cloned().collect(),
            None => HashSet::new(),
        };
        let current: HashSet<String> = outcome.available.iter().cloned().collect();

        for id in current.difference(&previous) {
            let _ = self.events.send(AgentEvent::Up {
                agent_id: id.clone(),
            });
        }
        for id in previous.difference(&current) {
            tracing::warn!(agent_id = %id, "agent went down");
            let _ = self.events.send(AgentEvent::Down {
                agent_id: id.clone(),
            });
        }
    }

    /// Fetch one card from the runtime's well-known path, retrying a
    /// transient failure once. A 404 is permanent and never retried.
    async fn fetch_card(&self, agent_id: &str, retry_transient: bool) -> Result<AgentCard, A2aError> {
        let url = format!(
            "{}/agents/{}/.well-known/agent.json",
            self.base_url, agent_id
        );

        let first = self.fetch_card_once(agent_id, &url).await;
        match first {
            Err(e) if retry_transient && e.is_transient() => {
                tokio::time::sleep(std::time::Duration::from_millis(250)).await;
                self.fetch_card_once(agent_id, &url).await
            }
            other => other,
        }
    }

    async fn fetch_card_once(&self, agent_id: &str, url: &str) -> Result<AgentCard, A2aError> {
        let response =
            self.http
                .get(url)
                .send()
                .await
                .map_err(|e| A2aError::CardUnavailable {
                    agent_id: agent_id.to_string(),
                    reason: e.to_string(),
                })?;

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() >= 500 {
                return Err(A2aError::Transport {
                    agent_id: agent_id.to_string(),
                    message: format!("card fetch failed with status {}", status),
                });
            }
            return Err(A2aError::CardUnavailable {
                agent_id: agent_id.to_string(),
                reason: format!("status {}", status),
            });
        }

        response
            .json()
            .await
            .map_err(|e| A2aError::CardUnavailable {
                agent_id: agent_id.to_string(),
                reason: format!("malformed card: {}", e),
            })
    }
}
