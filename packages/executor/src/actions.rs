//! Known action types and their display severity.

/// Category an action type belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionCategory {
    Containment,
    Remediation,
    Communication,
    Documentation,
}

/// The action vocabulary the Executor will dispatch. Anything else is
/// rejected at plan validation, before any action runs.
pub const KNOWN_ACTION_TYPES: &[(&str, ActionCategory)] = &[
    ("isolate_host", ActionCategory::Containment),
    ("block_ip", ActionCategory::Containment),
    ("disable_account", ActionCategory::Containment),
    ("revoke_credentials", ActionCategory::Containment),
    ("restart_service", ActionCategory::Remediation),
    ("rollback_deployment", ActionCategory::Remediation),
    ("scale_service", ActionCategory::Remediation),
    ("apply_patch", ActionCategory::Remediation),
    ("notify_stakeholders", ActionCategory::Communication),
    ("create_ticket", ActionCategory::Documentation),
    ("update_runbook", ActionCategory::Documentation),
];

/// Category for a known action type.
pub fn action_category(action_type: &str) -> Option<ActionCategory> {
    KNOWN_ACTION_TYPES
        .iter()
        .find(|(name, _)| *name == action_type)
        .map(|(_, category)| *category)
}

/// Display severity attached to approval requests.
pub fn derive_severity(action_type: &str) -> &'static str {
    match action_category(action_type) {
        Some(ActionCategory::Containment) => "critical",
        Some(ActionCategory::Remediation) => "high",
        Some(ActionCategory::Communication) => "low",
        Some(ActionCategory::Documentation) => "low",
        None => "high",
    }
}

/// Whether the workflow behind this action can undo it.
pub fn rollback_available(action_type: &str) -> bool {
    matches!(action_category(action_type), Some(ActionCategory::Remediation))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_map() {
        assert_eq!(derive_severity("isolate_host"), "critical");
        assert_eq!(derive_severity("restart_service"), "high");
        assert_eq!(derive_severity("notify_stakeholders"), "low");
        assert_eq!(derive_severity("create_ticket"), "low");
        assert_eq!(derive_severity("unheard_of"), "high");
    }

    #[test]
    fn test_unknown_action_has_no_category() {
        assert!(action_category("format_the_disk").is_none());
        assert!(action_category("block_ip").is_some());
    }
}
