//! Resume optimization pipeline engine.
//!
//! A strategy is a fixed graph of model calls (sequential, fan-out then
//! synthesize, or fan-out then judge). The orchestrator checks a strategy's
//! projected cost against the caller's ceiling, runs its steps through the
//! provider gateway with retries, and returns the optimized resume together
//! with a per-step cost and duration ledger.

pub mod catalog;
pub mod config;
pub mod error;
pub mod estimator;
pub mod executor;
pub mod gateway;
pub mod orchestrator;
pub mod prompts;
pub mod registry;
pub mod retry;
pub mod run;

pub use catalog::{Difficulty, StepGraph, StepRole, StepSpec, StrategyCatalog, StrategyDefinition};
pub use config::{ConfigError, PipelineConfig, PipelineConfigLoader};
pub use error::{PipelineError, Result};
pub use estimator::{CostEstimator, Estimate};
pub use executor::{FailureKind, StepContext, StepExecutor, StepFailure, StepResult, StepStatus};
pub use gateway::{ProviderGateway, ProviderRequest, ProviderResponse};
pub use orchestrator::{OptimizationRequest, PipelineOrchestrator};
pub use registry::{ModelProfile, ModelRegistry};
pub use retry::RetryPolicy;
pub use run::{HistoryRecord, PipelineRun, RunId, RunSnapshot, RunStatus};
