//! In-memory document store for pipeline scenario tests.
//!
//! Implements just enough of the store's HTTP surface for the Coordinator:
//! get/index/update with `if_seq_no`/`if_primary_term` semantics (409 on
//! stale tokens) and a minimal search (match_all, term, bool.must/must_not,
//! exists) over index patterns.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct DocState {
    pub source: Value,
    pub seq_no: u64,
    pub primary_term: u64,
}

#[derive(Default)]
pub struct FakeEs {
    docs: Mutex<BTreeMap<(String, String), DocState>>,
    auto_id: Mutex<u64>,
}

impl FakeEs {
    pub async fn start() -> (Arc<FakeEs>, String) {
        let fake = Arc::new(FakeEs::default());
        let app = Router::new()
            .route("/{index}/_doc/{id}", get(get_doc).post(put_doc))
            .route("/{index}/_doc", post(post_doc))
            .route("/{index}/_update/{id}", post(update_doc))
            .route("/{index}/_search", post(search))
            .with_state(fake.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (fake, format!("http://{}", addr))
    }

    pub fn seed(&self, index: &str, id: &str, source: Value) {
        self.docs.lock().insert(
            (index.to_string(), id.to_string()),
            DocState {
                source,
                seq_no: 0,
                primary_term: 1,
            },
        );
    }

    pub fn get_source(&self, index: &str, id: &str) -> Option<Value> {
        self.docs
            .lock()
            .get(&(index.to_string(), id.to_string()))
            .map(|doc| doc.source.clone())
    }

    /// All documents in an index, as `(id, source)` pairs.
    pub fn docs_in(&self, index: &str) -> Vec<(String, Value)> {
        self.docs
            .lock()
            .iter()
            .filter(|((i, _), _)| i == index)
            .map(|((_, id), doc)| (id.clone(), doc.source.clone()))
            .collect()
    }

    /// Overwrite fields on an existing document (test-side mutation, e.g.
    /// simulating the approval webhook).
    pub fn merge_into(&self, index: &str, id: &str, partial: Value) {
        let mut docs = self.docs.lock();
        if let Some(doc) = docs.get_mut(&(index.to_string(), id.to_string())) {
            deep_merge(&mut doc.source, &partial);
            doc.seq_no += 1;
        }
    }
}

fn deep_merge(target: &mut Value, partial: &Value) {
    match (target, partial) {
        (Value::Object(target), Value::Object(partial)) => {
            for (key, value) in partial {
                match target.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value)
                    }
                    _ => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, partial) => *target = partial.clone(),
    }
}

fn doc_response(id: &str, doc: &DocState) -> Value {
    json!({
        "_id": id,
        "_source": doc.source,
        "_seq_no": doc.seq_no,
        "_primary_term": doc.primary_term,
    })
}

async fn get_doc(
    State(fake): State<Arc<FakeEs>>,
    Path((index, id)): Path<(String, String)>,
) -> (StatusCode, Json<Value>) {
    match fake.docs.lock().get(&(index, id.clone())) {
        Some(doc) => (StatusCode::OK, Json(doc_response(&id, doc))),
        None => (StatusCode::NOT_FOUND, Json(json!({"found": false}))),
    }
}

async fn put_doc(
    State(fake): State<Arc<FakeEs>>,
    Path((index, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    fake.docs.lock().insert(
        (index, id.clone()),
        DocState {
            source: body,
            seq_no: 0,
            primary_term: 1,
        },
    );
    (StatusCode::CREATED, Json(json!({"_id": id, "result": "created"})))
}

async fn post_doc(
    State(fake): State<Arc<FakeEs>>,
    Path(index): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let id = {
        let mut auto = fake.auto_id.lock();
        *auto += 1;
        format!("auto-{}", auto)
    };
    fake.docs.lock().insert(
        (index, id.clone()),
        DocState {
            source: body,
            seq_no: 0,
            primary_term: 1,
        },
    );
    (StatusCode::CREATED, Json(json!({"_id": id, "result": "created"})))
}

async fn update_doc(
    State(fake): State<Arc<FakeEs>>,
    Path((index, id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut docs = fake.docs.lock();
    let Some(doc) = docs.get_mut(&(index, id.clone())) else {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "missing"})));
    };

    if let Some(expected) = params.get("if_seq_no").and_then(|v| v.parse::<u64>().ok()) {
        let expected_term = params
            .get("if_primary_term")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(1);
        if expected != doc.seq_no || expected_term != doc.primary_term {
            return (StatusCode::CONFLICT, Json(json!({"error": "version_conflict"})));
        }
    }

    if let Some(partial) = body.get("doc") {
        deep_merge(&mut doc.source, partial);
    }
    doc.seq_no += 1;
    (StatusCode::OK, Json(json!({"_id": id, "result": "updated"})))
}

async fn search(
    State(fake): State<Arc<FakeEs>>,
    Path(index): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let size = body.get("size").and_then(Value::as_u64).unwrap_or(10) as usize;
    let query = body.get("query").cloned().unwrap_or(json!({"match_all": {}}));

    let docs = fake.docs.lock();
    let hits: Vec<Value> = docs
        .iter()
        .filter(|((i, _), _)| index_matches(&index, i))
        .filter(|(_, doc)| matches_query(&doc.source, &query))
        .take(size)
        .map(|((i, id), doc)| {
            let mut hit = doc_response(id, doc);
            hit["_index"] = json!(i);
            hit
        })
        .collect();

    Json(json!({
        "hits": {
            "total": {"value": hits.len()},
            "hits": hits,
        }
    }))
}

fn index_matches(pattern: &str, index: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => index.starts_with(prefix),
        None => pattern == index,
    }
}

fn matches_query(source: &Value, query: &Value) -> bool {
    if query.get("match_all").is_some() {
        return true;
    }
    if let Some(term) = query.get("term").and_then(Value::as_object) {
        return term
            .iter()
            .all(|(field, expected)| source.get(field) == Some(expected));
    }
    if let Some(exists) = query.get("exists") {
        let field = exists.get("field").and_then(Value::as_str).unwrap_or("");
        return source.get(field).is_some_and(|v| !v.is_null());
    }
    if query.get("range").is_some() {
        // Ranges are treated as always-matching; tests seed narrow data.
        return true;
    }
    if let Some(boolean) = query.get("bool") {
        let must_ok = boolean
            .get("must")
            .and_then(Value::as_array)
            .map(|clauses| clauses.iter().all(|c| matches_query(source, c)))
            .unwrap_or(true);
        let must_not_ok = boolean
            .get("must_not")
            .and_then(Value::as_array)
            .map(|clauses| !clauses.iter().any(|c| matches_query(source, c)))
            .unwrap_or(true);
        return must_ok && must_not_ok;
    }
    true
}
