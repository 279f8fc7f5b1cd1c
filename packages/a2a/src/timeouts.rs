//! Per-agent round-trip budgets.
//!
//! Budgets include the router's single retry. The Verifier gets the longest
//! budget because its internal spend is a stabilization wait plus a health
//! check deadline before it even responds.

use std::time::Duration;

use crate::card::agents;

/// Fallback for agents without an entry.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Round-trip timeout for an agent.
pub fn timeout_for(agent_id: &str) -> Duration {
    let secs = match agent_id {
        agents::TRIAGE => 10,
        agents::INVESTIGATOR => 45,
        agents::THREAT_HUNTER => 60,
        agents::COMMANDER => 30,
        agents::EXECUTOR => 90,
        agents::VERIFIER => 120,
        agents::SENTINEL => 30,
        id if id.ends_with("-workflow") => 30,
        _ => return DEFAULT_TIMEOUT,
    };
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_agents() {
        assert_eq!(timeout_for("triage"), Duration::from_secs(10));
        assert_eq!(timeout_for("verifier"), Duration::from_secs(120));
        assert_eq!(timeout_for("executor"), Duration::from_secs(90));
    }

    #[test]
    fn test_workflow_suffix() {
        assert_eq!(timeout_for("approval-workflow"), Duration::from_secs(30));
        assert_eq!(timeout_for("kubernetes-workflow"), Duration::from_secs(30));
    }

    #[test]
    fn test_unknown_agent_default() {
        assert_eq!(timeout_for("mystery"), DEFAULT_TIMEOUT);
    }
}
