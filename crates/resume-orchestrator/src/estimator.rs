//! Cost, latency and quality projection for strategies.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{StepGraph, StepSpec, StrategyDefinition};
use crate::error::{PipelineError, Result};
use crate::registry::ModelRegistry;

/// Tokens assumed per step (prompt and completion combined) when projecting cost.
pub const DEFAULT_ASSUMED_TOKENS_PER_STEP: u32 = 1000;

/// Projection for one strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    /// Projected USD cost.
    pub cost: f64,
    /// Projected wall-clock seconds.
    pub time_secs: f64,
    /// Declared quality score (0-10).
    pub quality: f64,
    /// Number of model calls.
    pub step_count: usize,
}

/// Pure estimator over the model registry's pricing and latency tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostEstimator {
    assumed_tokens_per_step: u32,
}

impl Default for CostEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_ASSUMED_TOKENS_PER_STEP)
    }
}

impl CostEstimator {
    /// Creates an estimator assuming `assumed_tokens_per_step` tokens per call.
    #[must_use]
    pub const fn new(assumed_tokens_per_step: u32) -> Self {
        Self { assumed_tokens_per_step }
    }

    /// Tokens assumed per step.
    #[must_use]
    pub const fn assumed_tokens_per_step(&self) -> u32 {
        self.assumed_tokens_per_step
    }

    /// Projects cost, time and quality for `strategy`.
    ///
    /// Sequential graphs take the sum of step latencies; fan-out graphs take
    /// the slowest branch plus the aggregator.
    ///
    /// # Errors
    /// Returns `PipelineError::UnknownModel` if a step names an unknown or
    /// disabled model.
    pub fn estimate(&self, strategy: &StrategyDefinition, models: &ModelRegistry) -> Result<Estimate> {
        let mut cost = 0.0;
        for step in strategy.graph.steps() {
            cost += models.require(&step.model_id)?.cost_for_tokens(self.assumed_tokens_per_step);
        }

        let latency = |step: &StepSpec| models.require(&step.model_id).map(|m| m.avg_latency_secs);
        let time_secs = match &strategy.graph {
            StepGraph::Sequential { steps } => {
                steps.iter().map(latency).sum::<Result<f64>>()?
            }
            StepGraph::ParallelThenSynthesize { branches, synthesis: aggregator }
            | StepGraph::ParallelThenJudge { branches, judge: aggregator } => {
                let mut slowest: f64 = 0.0;
                for branch in branches {
                    slowest = slowest.max(latency(branch)?);
                }
                slowest + latency(aggregator)?
            }
        };

        let estimate = Estimate {
            cost,
            time_secs,
            quality: strategy.quality_score,
            step_count: strategy.step_count(),
        };
        debug!(
            strategy_id = %strategy.id,
            cost = estimate.cost,
            time_secs = estimate.time_secs,
            "Estimated strategy"
        );
        Ok(estimate)
    }

    /// Rejects a projection above the caller's ceiling.
    ///
    /// # Errors
    /// Returns `PipelineError::BudgetExceeded` if `estimate.cost > ceiling`.
    pub fn check_ceiling(strategy_id: &str, estimate: &Estimate, ceiling: Option<f64>) -> Result<()> {
        match ceiling {
            Some(ceiling) if estimate.cost > ceiling => Err(PipelineError::BudgetExceeded {
                strategy_id: strategy_id.to_string(),
                projected: estimate.cost,
                ceiling,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StrategyCatalog;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_quick_optimize_projection() {
        let catalog = StrategyCatalog::builtin();
        let estimate = CostEstimator::default()
            .estimate(catalog.get("quick-optimize").unwrap(), &ModelRegistry::builtin())
            .unwrap();
        assert!(close(estimate.cost, 0.0007));
        assert!(close(estimate.time_secs, 7.0));
        assert!(close(estimate.quality, 6.5));
        assert_eq!(estimate.step_count, 1);
    }

    #[test]
    fn test_cost_is_sum_of_step_rates() {
        let catalog = StrategyCatalog::builtin();
        let models = ModelRegistry::builtin();
        let estimator = CostEstimator::default();

        for strategy in catalog.list() {
            let expected: f64 = strategy
                .graph
                .steps()
                .iter()
                .map(|s| models.get(&s.model_id).unwrap().cost_per_1k_tokens)
                .sum();
            let first = estimator.estimate(strategy, &models).unwrap();
            let second = estimator.estimate(strategy, &models).unwrap();
            assert!(close(first.cost, expected), "{}", strategy.id);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_fan_out_time_is_slowest_branch_plus_aggregator() {
        let catalog = StrategyCatalog::builtin();
        let estimate = CostEstimator::default()
            .estimate(catalog.get("parallel-ensemble").unwrap(), &ModelRegistry::builtin())
            .unwrap();
        // gpt-4-turbo (20s) is the slowest branch, claude-opus-4 (30s) aggregates.
        assert!(close(estimate.time_secs, 50.0));
    }

    #[test]
    fn test_assumed_tokens_scale_cost() {
        let catalog = StrategyCatalog::builtin();
        let estimate = CostEstimator::new(2000)
            .estimate(catalog.get("budget-optimizer").unwrap(), &ModelRegistry::builtin())
            .unwrap();
        assert!(close(estimate.cost, 2.0 * (0.0007 + 0.0033)));
    }

    #[test]
    fn test_unknown_model() {
        let catalog = StrategyCatalog::builtin();
        let err = CostEstimator::default()
            .estimate(catalog.get("quick-optimize").unwrap(), &ModelRegistry::new())
            .unwrap_err();
        assert_eq!(err, PipelineError::UnknownModel("groq-mixtral-8x7b".to_string()));
    }

    #[test]
    fn test_check_ceiling() {
        let estimate = Estimate { cost: 0.05, time_secs: 1.0, quality: 8.0, step_count: 3 };
        assert!(CostEstimator::check_ceiling("s", &estimate, None).is_ok());
        assert!(CostEstimator::check_ceiling("s", &estimate, Some(0.05)).is_ok());
        assert!(matches!(
            CostEstimator::check_ceiling("s", &estimate, Some(0.01)),
            Err(PipelineError::BudgetExceeded { .. })
        ));
    }
}
