//! Pipeline run state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::executor::StepResult;

/// Unique identifier of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Run lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, not yet executing.
    Pending,
    /// Steps are executing.
    Running,
    /// Final output produced.
    Succeeded,
    /// A step or every branch failed.
    Failed,
    /// Cancelled by the caller.
    Cancelled,
}

impl RunStatus {
    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Checks if the run can transition to the given status.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Running | Self::Cancelled)
                | (Self::Running, Self::Succeeded | Self::Failed | Self::Cancelled)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.pad(name)
    }
}

/// One execution of a strategy.
///
/// Only the orchestrator mutates a run, and never after it reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Run id.
    pub id: RunId,
    /// Strategy executed.
    pub strategy_id: String,
    /// Input resume.
    pub resume_text: String,
    /// Input job description.
    pub job_description: String,
    /// Lifecycle status.
    pub status: RunStatus,
    /// Per-step results in completion order.
    pub steps: Vec<StepResult>,
    /// Number of steps the strategy declares.
    pub declared_steps: usize,
    /// Final optimized resume.
    pub output: Option<String>,
    /// Sum of succeeded step costs in USD.
    pub total_cost: f64,
    /// Wall-clock milliseconds from start to terminal status.
    pub total_duration_ms: u64,
    /// Why the run failed or was cancelled.
    pub error: Option<PipelineError>,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
    /// When the run entered `Running`.
    pub started_at: Option<DateTime<Utc>>,
    /// When the run reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Creates a pending run.
    #[must_use]
    pub fn new(strategy_id: &str, resume_text: &str, job_description: &str, declared_steps: usize) -> Self {
        Self {
            id: RunId::new(),
            strategy_id: strategy_id.to_string(),
            resume_text: resume_text.to_string(),
            job_description: job_description.to_string(),
            status: RunStatus::Pending,
            steps: Vec::with_capacity(declared_steps),
            declared_steps,
            output: None,
            total_cost: 0.0,
            total_duration_ms: 0,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Number of steps that have a ledger entry.
    #[must_use]
    pub fn completed_steps(&self) -> usize {
        self.steps.len()
    }

    /// Sum of succeeded step costs.
    #[must_use]
    pub fn succeeded_cost(&self) -> f64 {
        self.steps.iter().filter(|s| s.is_success()).map(|s| s.cost).sum()
    }

    /// Progress view.
    #[must_use]
    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            id: self.id,
            strategy_id: self.strategy_id.clone(),
            status: self.status,
            completed_steps: self.completed_steps(),
            declared_steps: self.declared_steps,
            cost_so_far: self.succeeded_cost(),
        }
    }

    /// The record handed to the persistence layer; `None` unless succeeded.
    #[must_use]
    pub fn history_record(&self) -> Option<HistoryRecord> {
        if self.status != RunStatus::Succeeded {
            return None;
        }
        Some(HistoryRecord {
            run_id: self.id,
            strategy_id: self.strategy_id.clone(),
            original_text: self.resume_text.clone(),
            optimized_text: self.output.clone()?,
            cost: self.total_cost,
            duration_ms: self.total_duration_ms,
            timestamp: self.finished_at.unwrap_or(self.created_at),
        })
    }

    pub(crate) fn transition(&mut self, to: RunStatus) -> bool {
        if !self.status.can_transition_to(to) {
            return false;
        }
        let now = Utc::now();
        if to == RunStatus::Running {
            self.started_at = Some(now);
        }
        if to.is_terminal() {
            self.finished_at = Some(now);
        }
        self.status = to;
        true
    }
}

/// Point-in-time progress of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    /// Run id.
    pub id: RunId,
    /// Strategy executed.
    pub strategy_id: String,
    /// Lifecycle status.
    pub status: RunStatus,
    /// Steps with a ledger entry.
    pub completed_steps: usize,
    /// Steps the strategy declares.
    pub declared_steps: usize,
    /// Cost of succeeded steps so far.
    pub cost_so_far: f64,
}

/// A finished optimization, ready to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Run that produced it.
    pub run_id: RunId,
    /// Strategy used.
    pub strategy_id: String,
    /// Resume before optimization.
    pub original_text: String,
    /// Resume after optimization.
    pub optimized_text: String,
    /// Total USD cost.
    pub cost: f64,
    /// Wall-clock milliseconds.
    pub duration_ms: u64,
    /// When the run finished.
    pub timestamp: DateTime<Utc>,
}
