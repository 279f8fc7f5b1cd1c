//! Vigil Inter-Agent Contracts
//!
//! Every payload that crosses an agent boundary is typed here: the message
//! envelope, the tagged task union, and the six request/response contract
//! pairs with their builders and validators.
//!
//! Validators accumulate every violation before failing — a response missing
//! four fields raises one [`ContractValidationError`] carrying four messages,
//! not four separate round-trips to discover them.

pub mod envelope;
pub mod error;
pub mod ids;
pub mod types;
pub mod validate;

pub use envelope::{Envelope, TaskPayload, WorkflowPayload};
pub use error::ContractValidationError;
pub use ids::{generate_action_id, generate_incident_id};
pub use types::{
    build_execute_request, build_investigate_request, build_plan_request,
    build_threat_hunt_request, build_triage_request, build_verify_request, ActionResult,
    CriterionOperator, CriterionResult, ExecuteRequest, ExecuteResponse, ExecutionStatus,
    InvestigateRequest, InvestigateResponse, PlanRequest, PlanResponse, PlannedAction,
    SuccessCriterion, ThreatHuntRequest, ThreatHuntResponse, TriageRequest, TriageResponse,
    VerifyRequest, VerifyResponse,
};
