//! Vigil Coordinator
//!
//! The orchestration heart of the platform. A single poller claims raw
//! alerts from the store and spawns one pipeline task per incident:
//!
//! ```text
//! detected → triaged → investigating → (threat_hunting) → planning
//!     → (awaiting_approval) → executing → verifying → resolved
//!                                   ↘ reflecting ↗
//! ```
//!
//! Verification failures feed a bounded reflection loop (re-investigate with
//! the failure analysis, re-plan, re-execute, re-verify); anything the
//! pipeline cannot recover from latches the incident into `escalated` with a
//! reason and a single human notification.

pub mod analyst;
pub mod config;
pub mod escalation;
pub mod incident;
pub mod pipeline;
pub mod reporting;
pub mod runtime;
pub mod state_machine;
pub mod timing;
pub mod watcher;

pub use config::Config;
pub use incident::{IncidentDoc, IncidentStatus};
pub use pipeline::{Coordinator, PipelineError};
pub use runtime::VigilRuntime;
pub use state_machine::{evaluate_guard, transition, GuardContext, GuardDecision, TransitionError};
pub use watcher::{AlertSink, AlertWatcher, ClaimedAlert, WatcherConfig};
