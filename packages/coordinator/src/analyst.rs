//! Analyst scheduling.
//!
//! Two jobs, both deadline-isolated so a hung agent cannot wedge the
//! process: a per-incident retrospective fired on resolution (deduplicated
//! against recent learning records) and a daily executive report batch on a
//! crontab schedule. Each run leaves a status record.

use chrono::Utc;
use std::str::FromStr;
use std::sync::Arc;

use cron::Schedule;
use tokio_util::sync::CancellationToken;
use vigil_a2a::{agents, A2aError, A2aRouter, SendOptions};
use vigil_contracts::{Envelope, TaskPayload, WorkflowPayload};
use vigil_resilience::{run_with_deadline, DeadlineError};
use vigil_store::{indices, EsClient};

/// Wall budget for one retrospective.
const RETROSPECTIVE_DEADLINE_MS: u64 = 60_000;
/// Wall budget for the daily batch.
const DAILY_BATCH_DEADLINE_MS: u64 = 120_000;
/// A learning record younger than this suppresses re-generation.
const LEARNING_DEDUP_TTL_HOURS: i64 = 24;

pub struct AnalystScheduler {
    store: Arc<EsClient>,
    router: Arc<A2aRouter>,
    /// Five-field crontab line for the daily batch.
    schedule: String,
    cancel: CancellationToken,
}

impl AnalystScheduler {
    pub fn new(store: Arc<EsClient>, router: Arc<A2aRouter>, schedule: String) -> Arc<Self> {
        Arc::new(Self {
            store,
            router,
            schedule,
            cancel: CancellationToken::new(),
        })
    }

    /// Start the daily batch loop.
    pub fn start(self: &Arc<Self>) {
        let Some(schedule) = self.parse_schedule() else {
            tracing::error!(schedule = %self.schedule, "unparseable report schedule, daily batch disabled");
            return;
        };

        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.daily_loop(schedule).await;
        });
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Fire a retrospective for a resolved incident without blocking the
    /// caller.
    pub fn spawn_retrospective(self: &Arc<Self>, incident_id: String) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.run_retrospective(&incident_id).await;
        });
    }

    /// The `cron` crate wants six fields; operators write five.
    fn parse_schedule(&self) -> Option<Schedule> {
        Schedule::from_str(&format!("0 {}", self.schedule)).ok()
    }

    async fn daily_loop(&self, schedule: Schedule) {
        tracing::info!(schedule = %self.schedule, "daily report scheduler started");
        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                tracing::warn!("report schedule has no upcoming firings");
                return;
            };
            let wait = (next - Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::from_secs(1));

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.cancel.cancelled() => {
                    tracing::info!("daily report scheduler stopped");
                    return;
                }
            }

            self.run_daily_batch().await;
        }
    }

    async fn run_daily_batch(&self) {
        let started_at = Utc::now();
        tracing::info!("running daily executive report batch");

        let result = run_with_deadline(DAILY_BATCH_DEADLINE_MS, "daily report batch", |_| {
            self.dispatch(
                agents::REPORTING_WORKFLOW,
                TaskPayload::GenerateReport(WorkflowPayload {
                    args: serde_json::json!({
                        "report_type": "executive_daily",
                        "date": started_at.date_naive().to_string(),
                    }),
                }),
                format!("daily-{}", started_at.date_naive()),
            )
        })
        .await;

        self.write_status_record("executive_daily", started_at, &result)
            .await;
    }

    /// Generate learnings for one resolved incident, unless a recent
    /// learning record already covers it.
    pub async fn run_retrospective(&self, incident_id: &str) {
        match self.has_recent_learning(incident_id).await {
            Ok(true) => {
                tracing::info!(incident_id, "recent learning record exists, skipping retrospective");
                return;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(incident_id, error = %e, "learning dedup check failed, proceeding");
            }
        }

        let started_at = Utc::now();
        let result = run_with_deadline(RETROSPECTIVE_DEADLINE_MS, "retrospective", |_| {
            self.dispatch(
                agents::ANALYST,
                TaskPayload::RunRetrospective(WorkflowPayload {
                    args: serde_json::json!({ "incident_id": incident_id }),
                }),
                incident_id.to_string(),
            )
        })
        .await;

        self.write_status_record("retrospective", started_at, &result)
            .await;
    }

    async fn dispatch(
        &self,
        agent_id: &str,
        payload: TaskPayload,
        correlation_id: String,
    ) -> Result<(), A2aError> {
        let envelope = Envelope::new("analyst-scheduler", agent_id, correlation_id, payload);
        self.router
            .send(agent_id, &envelope, SendOptions::default())
            .await
            .map(|_| ())
    }

    async fn has_recent_learning(&self, incident_id: &str) -> Result<bool, vigil_store::StoreError> {
        let cutoff = Utc::now() - chrono::Duration::hours(LEARNING_DEDUP_TTL_HOURS);
        let query = serde_json::json!({
            "size": 1,
            "query": {"bool": {"must": [
                {"term": {"incident_id": incident_id}},
                {"range": {"generated_at": {"gte": cutoff}}}
            ]}}
        });
        let results = self.store.search(indices::LEARNINGS, &query).await?;
        Ok(results.total > 0)
    }

    async fn write_status_record(
        &self,
        job: &str,
        started_at: chrono::DateTime<Utc>,
        result: &Result<(), DeadlineError<A2aError>>,
    ) {
        let status = match result {
            Ok(()) => "success",
            Err(DeadlineError::Elapsed { .. }) => "deadline_exceeded",
            Err(DeadlineError::Inner(_)) => "failed",
        };
        if let Err(e) = result {
            tracing::warn!(job, error = %e, "analyst job did not complete");
        }

        let record = serde_json::json!({
            "report_type": format!("{}_status", job),
            "status": status,
            "started_at": started_at,
            "completed_at": Utc::now(),
        });
        if let Err(e) = self
            .store
            .index_doc(indices::REPORTS, None, &record, false)
            .await
        {
            tracing::warn!(job, error = %e, "status record write failed");
        }
    }
}
