// Error types for pipeline orchestration

use resume_abstraction::ProviderId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::executor::FailureKind;
use crate::run::{RunId, RunStatus};

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Pipeline errors.
///
/// Pre-flight variants (`NotFound`, `BudgetExceeded`, `UnknownModel`,
/// `ProviderNotConfigured`) are returned before a run exists. `StepFailed`,
/// `AllBranchesFailed` and `Cancelled` describe why a run ended.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum PipelineError {
    /// Unknown strategy id
    #[error("Strategy not found: {0}")]
    NotFound(String),

    /// Projected cost exceeds the caller's ceiling
    #[error("Projected cost ${projected:.4} exceeds ceiling ${ceiling:.4} for strategy '{strategy_id}'")]
    BudgetExceeded {
        /// Strategy that was requested
        strategy_id: String,
        /// Estimator projection in USD
        projected: f64,
        /// Caller-supplied ceiling in USD
        ceiling: f64,
    },

    /// A strategy step names a model missing from the registry
    #[error("Unknown model '{0}'")]
    UnknownModel(String),

    /// No client is registered for a provider a strategy needs
    #[error("No client configured for provider '{0}'")]
    ProviderNotConfigured(ProviderId),

    /// A step failed and retries were exhausted (or not permitted)
    #[error("Step {step_index} ({model_id}) failed after {attempts} attempt(s): {message}")]
    StepFailed {
        /// Position of the step in the strategy
        step_index: usize,
        /// Catalog model id
        model_id: String,
        /// Terminal failure kind
        kind: FailureKind,
        /// Last error message
        message: String,
        /// Attempts made
        attempts: u32,
    },

    /// Every branch of a fan-out failed
    #[error("All {branches} parallel branches failed")]
    AllBranchesFailed {
        /// Number of branches dispatched
        branches: usize,
    },

    /// Run cancelled by the caller
    #[error("Run cancelled")]
    Cancelled,

    /// Unknown run id
    #[error("Run not found: {0}")]
    RunNotFound(RunId),

    /// Control operation on a run that is not running
    #[error("Run {run_id} is {status}, not running")]
    NotRunning {
        /// Run id
        run_id: RunId,
        /// Its current status
        status: RunStatus,
    },

    /// Removal requested for a run that has not reached a terminal status
    #[error("Run {0} is still running")]
    RunActive(RunId),
}
