//! Vigil Storage Client
//!
//! Thin wrapper over the document store's HTTP API. Every Vigil document
//! (incidents, alerts, action records, telemetry) lives in the store; this
//! crate exposes the handful of operations the runtime depends on —
//! get/index/update/search plus a raw transport escape hatch — with
//! optimistic concurrency tokens (`_seq_no`/`_primary_term`) surfaced on
//! every read and honored on conditional writes.

pub mod client;
pub mod error;
pub mod indices;
pub mod types;

pub use client::{EsClient, TransportResponse};
pub use error::StoreError;
pub use types::{ConcurrencyToken, Document, SearchHit, SearchResults};
