//! Vigil Resilience Primitives
//!
//! The failure-handling spine of the runtime:
//!
//! - **Retry** with fixed or exponential backoff, a per-attempt timeout, and
//!   cancellation propagated through a fresh child token per attempt.
//! - **Deadline race** — run an operation against a wall-clock budget; the
//!   operation's token is cancelled *before* the caller sees the synthetic
//!   deadline error, so in-flight work stops rather than leaking.
//! - **Two circuit breakers**: a time-windowed breaker for agent/tool calls
//!   and a consecutive-failure breaker for third-party integrations.

pub mod breaker;
pub mod deadline;
pub mod integration_breaker;
pub mod registry;
pub mod retry;

pub use breaker::{AgentCircuitBreaker, BreakerConfig, BreakerState, CircuitOpen};
pub use deadline::{run_with_deadline, DeadlineError};
pub use integration_breaker::{IntegrationBreakerConfig, IntegrationCircuitBreaker};
pub use registry::BreakerRegistry;
pub use retry::{retry, Backoff, RetryError, RetryPolicy};
