//! Vigil Tool Executor
//!
//! Tools are declarative: a JSON file names the query, its typed parameters,
//! and whether the query leans on the storage engine's tech-preview lookup
//! join. The executor loads the definition, validates the supplied
//! parameters against the declared types, and issues a single `/_query`
//! request — falling back to an application-level join when the engine
//! reports the lookup command unsupported.

pub mod definition;
pub mod error;
pub mod executor;
pub mod fallback;
pub mod params;

pub use definition::{FallbackPlan, ParamSpec, ParamType, ToolDefinition};
pub use error::ToolError;
pub use executor::ToolExecutor;
