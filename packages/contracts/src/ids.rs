//! Incident and action id generation.
//!
//! Handles are human-quotable: `INC-2026-K3F9Q`, `ACT-2026-7XM2P`. The year
//! comes from the wall clock; the suffix is five uppercase alphanumerics.

use chrono::{Datelike, Utc};
use rand::Rng;

const SUFFIX_LEN: usize = 5;
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

fn random_suffix() -> String {
    let mut rng = rand::rng();
    (0..SUFFIX_LEN)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// New incident handle, e.g. `INC-2026-K3F9Q`.
pub fn generate_incident_id() -> String {
    format!("INC-{}-{}", Utc::now().year(), random_suffix())
}

/// New action handle, e.g. `ACT-2026-7XM2P`.
pub fn generate_action_id() -> String {
    format!("ACT-{}-{}", Utc::now().year(), random_suffix())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incident_id_shape() {
        let id = generate_incident_id();
        let parts: Vec<&str> = id.split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "INC");
        assert_eq!(parts[1].len(), 4);
        assert_eq!(parts[2].len(), 5);
        assert!(parts[2].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_action_id_shape() {
        let id = generate_action_id();
        assert!(id.starts_with("ACT-"));
        assert_eq!(id.len(), "ACT-2026-XXXXX".len());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = generate_incident_id();
        let b = generate_incident_id();
        assert_ne!(a, b);
    }
}
