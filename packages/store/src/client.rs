//! HTTP client for the document store.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;

use crate::error::StoreError;
use crate::types::{ConcurrencyToken, Document, SearchHit, SearchResults};

/// Default per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Document store client.
///
/// One instance per process, cheap to clone; all callers share the
/// underlying connection pool.
#[derive(Debug, Clone)]
pub struct EsClient {
    http: reqwest::Client,
    base_url: String,
}

impl EsClient {
    /// Create a client authenticated with an API key.
    pub fn new(base_url: impl Into<String>, api_key: &str) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("ApiKey {}", api_key))
            .map_err(|e| StoreError::Config(format!("invalid api key: {}", e)))?;
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    /// Fetch a document by id, including its concurrency token.
    pub async fn get_doc(&self, index: &str, id: &str) -> Result<Document, StoreError> {
        let url = format!("{}/{}/_doc/{}", self.base_url, index, id);
        let response = self.http.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound {
                index: index.to_string(),
                id: id.to_string(),
            });
        }
        let response = Self::check_status(response, index, id).await?;

        let doc: Document = response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        Ok(doc)
    }

    /// Index a document. With `id = None` the store assigns one.
    ///
    /// Returns the document id. `refresh` makes the write immediately
    /// visible to searches; telemetry writers leave it off.
    pub async fn index_doc(
        &self,
        index: &str,
        id: Option<&str>,
        body: &Value,
        refresh: bool,
    ) -> Result<String, StoreError> {
        let mut url = match id {
            Some(id) => format!("{}/{}/_doc/{}", self.base_url, index, id),
            None => format!("{}/{}/_doc", self.base_url, index),
        };
        if refresh {
            url.push_str("?refresh=true");
        }

        let response = self.http.post(&url).json(body).send().await?;
        let response = Self::check_status(response, index, id.unwrap_or("<auto>")).await?;

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        parsed
            .get("_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StoreError::Malformed("index response missing _id".into()))
    }

    /// Partial-document update, optionally conditional on a concurrency token.
    ///
    /// A 409 from the store maps to [`StoreError::VersionConflict`]; the
    /// caller re-reads and decides whether the observed state already
    /// satisfies its intent.
    pub async fn update_doc(
        &self,
        index: &str,
        id: &str,
        partial: &Value,
        token: Option<ConcurrencyToken>,
    ) -> Result<(), StoreError> {
        let mut url = format!("{}/{}/_update/{}?refresh=true", self.base_url, index, id);
        if let Some(token) = token {
            url.push_str(&format!(
                "&if_seq_no={}&if_primary_term={}",
                token.seq_no, token.primary_term
            ));
        }

        let body = serde_json::json!({ "doc": partial });
        let response = self.http.post(&url).json(&body).send().await?;
        Self::check_status(response, index, id).await?;
        Ok(())
    }

    /// Run a search query against an index or pattern.
    pub async fn search(&self, index: &str, body: &Value) -> Result<SearchResults, StoreError> {
        let url = format!("{}/{}/_search", self.base_url, index);
        let response = self.http.post(&url).json(body).send().await?;
        let response = Self::check_status(response, index, "<search>").await?;

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;

        let total = parsed
            .pointer("/hits/total/value")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let hits = parsed
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .map(|hits| {
                hits.iter()
                    .filter_map(|h| serde_json::from_value::<SearchHit>(h.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        Ok(SearchResults { total, hits })
    }

    /// Raw transport request for endpoints the typed surface does not cover
    /// (the tool executor's `/_query` calls go through here).
    ///
    /// Non-2xx responses are returned as `Ok` when the body is JSON so the
    /// caller can inspect the error reason; bodyless failures map to
    /// [`StoreError::Request`].
    pub async fn transport_request(
        &self,
        method: &str,
        path: &str,
        body: Option<&Value>,
    ) -> Result<TransportResponse, StoreError> {
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| StoreError::Config(format!("invalid method {}", method)))?;
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));

        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        Ok(TransportResponse { status, body })
    }

    async fn check_status(
        response: reqwest::Response,
        index: &str,
        id: &str,
    ) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::CONFLICT {
            return Err(StoreError::VersionConflict {
                index: index.to_string(),
                id: id.to_string(),
            });
        }

        let reason = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        Err(StoreError::Request {
            status: status.as_u16(),
            reason,
        })
    }
}

/// Status + parsed body from a raw transport request.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Value,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> EsClient {
        EsClient::new(server.uri(), "dGVzdA==").unwrap()
    }

    #[tokio::test]
    async fn test_get_doc_returns_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/incidents/_doc/INC-2026-A1B2C"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "_id": "INC-2026-A1B2C",
                "_source": {"status": "detected"},
                "_seq_no": 3,
                "_primary_term": 1
            })))
            .mount(&server)
            .await;

        let doc = client(&server)
            .await
            .get_doc("incidents", "INC-2026-A1B2C")
            .await
            .unwrap();

        assert_eq!(doc.source["status"], "detected");
        assert_eq!(doc.token().seq_no, 3);
    }

    #[tokio::test]
    async fn test_get_doc_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = client(&server).await.get_doc("incidents", "missing").await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_conditional_update_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/incidents/_update/INC-2026-A1B2C"))
            .and(query_param("if_seq_no", "3"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let result = client(&server)
            .await
            .update_doc(
                "incidents",
                "INC-2026-A1B2C",
                &serde_json::json!({"status": "triaged"}),
                Some(ConcurrencyToken {
                    seq_no: 3,
                    primary_term: 1,
                }),
            )
            .await;

        assert!(matches!(result, Err(StoreError::VersionConflict { .. })));
    }

    #[tokio::test]
    async fn test_search_parses_hits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/alerts-*/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "hits": {
                    "total": {"value": 2},
                    "hits": [
                        {"_index": "alerts-default", "_id": "a-1", "_source": {"rule_id": "r1"},
                         "_seq_no": 0, "_primary_term": 1},
                        {"_index": "alerts-default", "_id": "a-2", "_source": {"rule_id": "r2"},
                         "_seq_no": 1, "_primary_term": 1}
                    ]
                }
            })))
            .mount(&server)
            .await;

        let results = client(&server)
            .await
            .search("alerts-*", &serde_json::json!({"query": {"match_all": {}}}))
            .await
            .unwrap();

        assert_eq!(results.total, 2);
        assert_eq!(results.hits.len(), 2);
        assert!(results.hits[0].token().is_some());
    }

    #[tokio::test]
    async fn test_transport_request_surfaces_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_query"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"type": "parsing_exception", "reason": "unknown command [lookup]"}
            })))
            .mount(&server)
            .await;

        let response = client(&server)
            .await
            .transport_request("POST", "/_query", Some(&serde_json::json!({"query": "ROW 1"})))
            .await
            .unwrap();

        assert_eq!(response.status, 400);
        assert_eq!(response.body["error"]["type"], "parsing_exception");
    }
}
