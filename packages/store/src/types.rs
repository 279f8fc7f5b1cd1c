//! Document and search result types.

use serde::{Deserialize, Serialize};

/// Optimistic concurrency token pair supplied by the store on every read.
///
/// A conditional write carrying a stale token fails with a version conflict
/// instead of clobbering a concurrent writer's update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyToken {
    pub seq_no: u64,
    pub primary_term: u64,
}

/// A document fetched by id.
#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_source")]
    pub source: serde_json::Value,
    #[serde(rename = "_seq_no")]
    pub seq_no: u64,
    #[serde(rename = "_primary_term")]
    pub primary_term: u64,
}

impl Document {
    /// Concurrency token for a conditional follow-up write.
    pub fn token(&self) -> ConcurrencyToken {
        ConcurrencyToken {
            seq_no: self.seq_no,
            primary_term: self.primary_term,
        }
    }
}

/// One hit from a search response.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_index", default)]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_source")]
    pub source: serde_json::Value,
    #[serde(rename = "_seq_no", default)]
    pub seq_no: Option<u64>,
    #[serde(rename = "_primary_term", default)]
    pub primary_term: Option<u64>,
}

impl SearchHit {
    /// Concurrency token, if the search requested seq_no/primary_term.
    pub fn token(&self) -> Option<ConcurrencyToken> {
        match (self.seq_no, self.primary_term) {
            (Some(seq_no), Some(primary_term)) => Some(ConcurrencyToken {
                seq_no,
                primary_term,
            }),
            _ => None,
        }
    }
}

/// Parsed search response.
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    pub total: u64,
    pub hits: Vec<SearchHit>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_token() {
        let doc: Document = serde_json::from_value(serde_json::json!({
            "_id": "INC-2026-A1B2C",
            "_source": {"status": "triaged"},
            "_seq_no": 7,
            "_primary_term": 2
        }))
        .unwrap();

        assert_eq!(
            doc.token(),
            ConcurrencyToken {
                seq_no: 7,
                primary_term: 2
            }
        );
    }

    #[test]
    fn test_hit_without_tokens() {
        let hit: SearchHit = serde_json::from_value(serde_json::json!({
            "_id": "a-1",
            "_source": {}
        }))
        .unwrap();

        assert!(hit.token().is_none());
    }
}
