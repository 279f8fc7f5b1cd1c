//! Alert watcher: poll, claim, hand off.
//!
//! One poller per process. Each tick searches for unclaimed alerts
//! oldest-first, claims candidates with a compare-and-swap on the alert
//! document, and hands every claim to the pipeline without blocking the
//! poll loop. A 409 on the claim means another watcher won — skip, never
//! retry.

use chrono::Utc;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use vigil_store::{indices, EsClient, StoreError};

/// A claimed alert ready for the pipeline.
#[derive(Debug, Clone)]
pub struct ClaimedAlert {
    pub alert_id: String,
    /// Concrete index the alert lives in (claims must target it, not the
    /// search pattern).
    pub index: String,
    pub source: Value,
}

/// Receives claimed alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn process_alert(&self, alert: ClaimedAlert);
}

/// Watcher tunables.
#[derive(Debug, Clone, Copy)]
pub struct WatcherConfig {
    pub poll_interval: Duration,
    pub batch_size: u32,
    /// Consecutive poll failures before the watcher stops itself.
    pub max_consecutive_failures: u32,
    /// Backoff ceiling after poll failures.
    pub backoff_max: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 25,
            max_consecutive_failures: 5,
            backoff_max: Duration::from_secs(30),
        }
    }
}

/// The alert poller.
pub struct AlertWatcher {
    store: Arc<EsClient>,
    sink: Arc<dyn AlertSink>,
    config: WatcherConfig,
    running: AtomicBool,
    cancel: CancellationToken,
}

impl AlertWatcher {
    pub fn new(store: Arc<EsClient>, sink: Arc<dyn AlertSink>, config: WatcherConfig) -> Arc<Self> {
        Arc::new(Self {
            store,
            sink,
            config,
            running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        })
    }

    /// Start polling. Calling `start` on a running watcher is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::debug!("alert watcher already running");
            return;
        }
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "alert watcher starting"
        );

        let watcher = self.clone();
        tokio::spawn(async move {
            watcher.run().await;
            watcher.running.store(false, Ordering::SeqCst);
        });
    }

    /// Stop the poll loop.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn run(&self) {
        let mut consecutive_failures = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("alert watcher stopped");
                return;
            }

            let started = Instant::now();
            let delay = match self.poll_once().await {
                Ok(claimed) => {
                    consecutive_failures = 0;
                    self.emit_telemetry(claimed, started.elapsed()).await;
                    self.config.poll_interval
                }
                Err(e) => {
                    consecutive_failures += 1;
                    tracing::warn!(
                        consecutive_failures,
                        error = %e,
                        "alert poll failed"
                    );
                    if consecutive_failures >= self.config.max_consecutive_failures {
                        tracing::error!(
                            consecutive_failures,
                            "alert watcher giving up; restart required"
                        );
                        return;
                    }
                    // Exponential backoff up to the ceiling.
                    let exp = self
                        .config
                        .poll_interval
                        .saturating_mul(1u32 << consecutive_failures.min(8));
                    exp.min(self.config.backoff_max)
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => {}
            }
        }
    }

    /// One poll tick: search, claim, dispatch. Returns how many alerts this
    /// watcher claimed.
    async fn poll_once(&self) -> Result<u32, StoreError> {
        let query = serde_json::json!({
            "size": self.config.batch_size,
            "seq_no_primary_term": true,
            "sort": [{"@timestamp": {"order": "asc"}}],
            "query": {"bool": {"must_not": [
                {"exists": {"field": "_processing_started_at"}},
                {"exists": {"field": "processed_at"}}
            ]}}
        });

        let results = self.store.search(indices::ALERTS_PATTERN, &query).await?;
        let mut claimed = 0u32;

        for hit in results.hits {
            let Some(token) = hit.token() else {
                tracing::warn!(alert_id = %hit.id, "alert hit without concurrency tokens");
                continue;
            };

            let claim = serde_json::json!({ "_processing_started_at": Utc::now() });
            match self
                .store
                .update_doc(&hit.index, &hit.id, &claim, Some(token))
                .await
            {
                Ok(()) => {
                    claimed += 1;
                    let alert = ClaimedAlert {
                        alert_id: hit.id.clone(),
                        index: hit.index.clone(),
                        source: hit.source.clone(),
                    };
                    tracing::info!(alert_id = %hit.id, "alert claimed");
                    let sink = self.sink.clone();
                    // Pipelines run as their own tasks; the poller never waits.
                    tokio::spawn(async move {
                        sink.process_alert(alert).await;
                    });
                }
                Err(StoreError::VersionConflict { .. }) => {
                    tracing::debug!(alert_id = %hit.id, "alert claimed by another watcher");
                }
                Err(e) => {
                    tracing::warn!(alert_id = %hit.id, error = %e, "alert claim failed");
                }
            }
        }

        Ok(claimed)
    }

    /// Per-tick telemetry. Failures are logged and never break polling.
    async fn emit_telemetry(&self, claimed: u32, elapsed: Duration) {
        let record = serde_json::json!({
            "component": "alert-watcher",
            "timestamp": Utc::now(),
            "claimed": claimed,
            "poll_ms": elapsed.as_millis() as u64,
        });
        if let Err(e) = self
            .store
            .index_doc(indices::WATCHER_TELEMETRY, None, &record, false)
            .await
        {
            tracing::warn!(error = %e, "watcher telemetry write failed");
        }
    }
}
