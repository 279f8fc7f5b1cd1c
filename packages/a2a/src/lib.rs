//! Vigil A2A Layer
//!
//! Agent-to-agent RPC: an agent invokes another by POSTing a message
//! envelope to the endpoint resolved from the target's agent card.
//!
//! The [`AgentDirectory`] owns card discovery and caching (with up/down
//! transition events and stale-snapshot semantics); the [`A2aRouter`] owns
//! the send path — envelope validation, capability gating, per-agent
//! timeouts, a single retry on transient 5xx, and one telemetry record per
//! call regardless of outcome.

pub mod card;
pub mod directory;
pub mod error;
pub mod router;
pub mod telemetry;
pub mod timeouts;

pub use card::{agents, AgentCard, Capability};
pub use directory::{AgentDirectory, AgentEvent, DiscoveryOutcome, DiscoverySnapshot};
pub use error::A2aError;
pub use router::{A2aRouter, SendOptions};
pub use telemetry::{TelemetryRecord, TelemetryStatus};
pub use timeouts::timeout_for;
