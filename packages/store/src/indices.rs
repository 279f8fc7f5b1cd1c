//! Index names the runtime reads and writes.
//!
//! Alerts arrive in dated indices behind the `alerts-*` pattern; everything
//! else is a single concrete index.

/// Incident documents, keyed by incident id.
pub const INCIDENTS: &str = "incidents";

/// Read pattern covering all alert indices.
pub const ALERTS_PATTERN: &str = "alerts-*";

/// Write alias for new alert documents.
pub const ALERTS_WRITE: &str = "alerts-default";

/// Append-only action audit records.
pub const ACTIONS: &str = "actions";

/// Approval decisions written by the Slack callback.
pub const APPROVAL_RESPONSES: &str = "approval-responses";

/// One record per A2A call.
pub const AGENT_TELEMETRY: &str = "agent-telemetry";

/// One record per alert-watcher poll tick.
pub const WATCHER_TELEMETRY: &str = "watcher-telemetry";

/// Generated incident and executive reports.
pub const REPORTS: &str = "reports";

/// Analyst learning records.
pub const LEARNINGS: &str = "learnings";

/// Remediation runbooks consumed by the Commander.
pub const RUNBOOKS: &str = "runbooks";

/// Per-service statistical baselines consumed by the Verifier.
pub const BASELINES: &str = "baselines";

/// Deployment and push events from the GitHub webhook.
pub const GITHUB_EVENTS: &str = "github-events";
