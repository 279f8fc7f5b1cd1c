//! Vigil Integrations
//!
//! The runtime's edges: signature-verified webhook ingestion (GitHub
//! deployment events, Slack approval callbacks) and outbound notification
//! adapters (Slack `chat.postMessage`, PagerDuty Events v2), both wrapped by
//! the consecutive-failure integration breaker.

pub mod error;
pub mod pagerduty;
pub mod server;
pub mod signature;
pub mod slack;

pub use error::IntegrationError;
pub use pagerduty::PagerDutyClient;
pub use server::{webhook_routes, WebhookState};
pub use slack::SlackClient;
