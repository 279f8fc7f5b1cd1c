//! Vigil Verifier
//!
//! Decides whether remediation actually worked. After a stabilization wait
//! (pod rollouts, load-balancer updates, and metric pipelines need time to
//! settle), every affected service is health-checked in parallel under a
//! deadline, each success criterion is evaluated against both its explicit
//! threshold and the baseline-comparison verdict, and a failing verdict
//! produces the failure analysis that seeds the next reflection iteration.

pub mod baselines;
pub mod error;
pub mod handler;
pub mod health;
pub mod http;

pub use error::VerifierError;
pub use handler::{Verifier, VerifierConfig};
