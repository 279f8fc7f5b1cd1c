//! Environment-driven configuration.
//!
//! Every knob has a documented default; malformed values log a warning and
//! fall back rather than aborting startup.

use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration, parsed once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the storage/agent runtime host.
    pub kibana_url: String,
    pub elastic_api_key: String,

    pub slack_bot_token: String,
    pub slack_signing_secret: String,
    pub slack_incident_channel: String,
    pub slack_approval_channel: String,
    pub pagerduty_routing_key: String,
    pub github_webhook_secret: String,

    pub verification_deadline_ms: u64,
    pub stabilization_wait_seconds: i64,
    pub health_score_threshold: f64,
    pub suppress_threshold: f64,
    pub max_reflections: u32,
    pub approval_timeout_minutes: u64,
    /// How often the approval gate re-reads the incident document.
    pub approval_poll_interval: Duration,
    /// Alert watcher poll cadence.
    pub watcher_poll_interval: Duration,
    /// Crontab line for the daily executive report.
    pub report_exec_daily_schedule: String,
    /// Directory holding tool definition files.
    pub tools_dir: String,
    /// Webhook server bind port.
    pub webhook_port: u16,
    /// Agent endpoint server bind port.
    pub agent_port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            kibana_url: env_or("KIBANA_URL", "http://localhost:5601"),
            elastic_api_key: env_or("ELASTIC_API_KEY", ""),
            slack_bot_token: env_or("SLACK_BOT_TOKEN", ""),
            slack_signing_secret: env_or("SLACK_SIGNING_SECRET", ""),
            slack_incident_channel: env_or("SLACK_INCIDENT_CHANNEL", "#vigil-incidents"),
            slack_approval_channel: env_or("SLACK_APPROVAL_CHANNEL", "#vigil-approvals"),
            pagerduty_routing_key: env_or("PAGERDUTY_ROUTING_KEY", ""),
            github_webhook_secret: env_or("GITHUB_WEBHOOK_SECRET", ""),
            verification_deadline_ms: env_parse_or("VIGIL_VERIFICATION_DEADLINE_MS", 50_000),
            stabilization_wait_seconds: env_parse_or("VIGIL_STABILIZATION_WAIT_SECONDS", 10),
            health_score_threshold: env_parse_or("VIGIL_HEALTH_SCORE_THRESHOLD", 0.8),
            suppress_threshold: env_parse_or("SUPPRESS_THRESHOLD", 0.4),
            max_reflections: env_parse_or("MAX_REFLECTIONS", 3),
            approval_timeout_minutes: env_parse_or("APPROVAL_TIMEOUT_MINUTES", 15),
            approval_poll_interval: env_duration_or("VIGIL_APPROVAL_POLL_INTERVAL", "15s"),
            watcher_poll_interval: env_duration_or("VIGIL_WATCHER_POLL_INTERVAL", "5s"),
            report_exec_daily_schedule: env_or("REPORT_EXEC_DAILY_SCHEDULE", "0 7 * * *"),
            tools_dir: env_or("VIGIL_TOOLS_DIR", "./tools"),
            webhook_port: env_parse_or("VIGIL_WEBHOOK_PORT", 3100),
            agent_port: env_parse_or("VIGIL_AGENT_PORT", 3101),
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: FromStr + Copy>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %raw, "malformed env value, using default");
            default
        }),
        Err(_) => default,
    }
}

fn env_duration_or(name: &str, default: &str) -> Duration {
    let raw = env_or(name, default);
    humantime::parse_duration(&raw).unwrap_or_else(|_| {
        tracing::warn!(var = name, value = %raw, "malformed duration, using default");
        humantime::parse_duration(default).unwrap_or(Duration::from_secs(15))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        let config = Config::from_env();

        assert_eq!(config.verification_deadline_ms, 50_000);
        assert_eq!(config.suppress_threshold, 0.4);
        assert_eq!(config.max_reflections, 3);
        assert_eq!(config.approval_poll_interval, Duration::from_secs(15));
        assert_eq!(config.report_exec_daily_schedule, "0 7 * * *");
    }
}
