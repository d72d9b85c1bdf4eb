//! Strategy catalog.
//!
//! A strategy is a fixed graph of model invocations. The catalog is built once
//! at start-up and only read afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

/// What a step is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRole {
    /// Extract requirements and gaps from the job description and resume.
    Analyze,
    /// Plan how to position the candidate.
    Strategize,
    /// Produce a full tailored resume.
    Write,
    /// Improve a previous draft.
    Refine,
    /// Review a draft and list concrete problems.
    Critique,
    /// Rewrite a draft to address a critique.
    Revise,
    /// Final copy edit.
    Edit,
    /// Merge several candidate drafts into one.
    Synthesize,
    /// Pick (or merge) the best of several candidate drafts.
    Judge,
}

impl StepRole {
    /// Whether the step's output is a full resume rather than working notes.
    #[must_use]
    pub const fn produces_draft(self) -> bool {
        !matches!(self, Self::Analyze | Self::Strategize | Self::Critique)
    }
}

impl fmt::Display for StepRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Analyze => "analyze",
            Self::Strategize => "strategize",
            Self::Write => "write",
            Self::Refine => "refine",
            Self::Critique => "critique",
            Self::Revise => "revise",
            Self::Edit => "edit",
            Self::Synthesize => "synthesize",
            Self::Judge => "judge",
        };
        f.pad(name)
    }
}

/// One model invocation within a strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Model registry id.
    pub model_id: String,
    /// What the step does.
    pub role: StepRole,
    /// Completion budget override for this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl StepSpec {
    /// Creates a step with the default completion budget.
    #[must_use]
    pub fn new(role: StepRole, model_id: &str) -> Self {
        Self { model_id: model_id.to_string(), role, max_tokens: None }
    }
}

/// Shape of a strategy's execution.
///
/// Step indices are positional: for `Sequential` the position in `steps`;
/// for the fan-out shapes, branches are `0..n` and the aggregator is `n`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepGraph {
    /// Each step consumes the previous step's output.
    Sequential {
        /// Steps in execution order.
        steps: Vec<StepSpec>,
    },
    /// Independent branches, then one step merging all successful outputs.
    ParallelThenSynthesize {
        /// Branches run concurrently from the same input.
        branches: Vec<StepSpec>,
        /// Merging step.
        synthesis: StepSpec,
    },
    /// Independent branches, then a judge choosing the best output.
    ParallelThenJudge {
        /// Branches run concurrently from the same input.
        branches: Vec<StepSpec>,
        /// Judging step.
        judge: StepSpec,
    },
}

impl StepGraph {
    /// Total number of steps, aggregator included.
    #[must_use]
    pub fn step_count(&self) -> usize {
        match self {
            Self::Sequential { steps } => steps.len(),
            Self::ParallelThenSynthesize { branches, .. }
            | Self::ParallelThenJudge { branches, .. } => branches.len() + 1,
        }
    }

    /// Steps in index order.
    #[must_use]
    pub fn steps(&self) -> Vec<&StepSpec> {
        match self {
            Self::Sequential { steps } => steps.iter().collect(),
            Self::ParallelThenSynthesize { branches, synthesis: last }
            | Self::ParallelThenJudge { branches, judge: last } => {
                branches.iter().chain(std::iter::once(last)).collect()
            }
        }
    }
}

/// Difficulty tier shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Cheap and fast.
    Easy,
    /// Multi-model.
    Medium,
    /// Premium fan-out.
    Hard,
}

/// Immutable catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDefinition {
    /// Stable identifier (e.g. `cascade-refinement`).
    pub id: String,
    /// Display name.
    pub name: String,
    /// One-line description.
    pub description: String,
    /// Execution graph.
    pub graph: StepGraph,
    /// Advertised cost in USD.
    pub estimated_cost: f64,
    /// Advertised duration in seconds.
    pub estimated_time_secs: u32,
    /// Advertised quality on a 0-10 scale.
    pub quality_score: f64,
    /// Difficulty tier.
    pub difficulty: Difficulty,
    /// Whether this is the suggested default.
    pub recommended: bool,
}

impl StrategyDefinition {
    /// Number of steps the strategy declares.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.graph.step_count()
    }

    /// Distinct model ids in first-use order.
    #[must_use]
    pub fn models(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for step in self.graph.steps() {
            if !seen.contains(&step.model_id.as_str()) {
                seen.push(&step.model_id);
            }
        }
        seen
    }
}

/// Registry of strategies, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct StrategyCatalog {
    strategies: Vec<StrategyDefinition>,
    index: HashMap<String, usize>,
}

impl StrategyCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The seven built-in strategies.
    #[must_use]
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for definition in builtin_strategies() {
            catalog.register(definition);
        }
        catalog
    }

    /// Adds a strategy.
    ///
    /// # Returns
    /// Returns `true` if newly added, `false` if it replaced an existing entry
    /// (which keeps its original position).
    pub fn register(&mut self, definition: StrategyDefinition) -> bool {
        debug!(strategy_id = %definition.id, steps = definition.step_count(), "Registering strategy");

        if let Some(&slot) = self.index.get(&definition.id) {
            warn!(strategy_id = %definition.id, "Strategy replaced in catalog");
            self.strategies[slot] = definition;
            false
        } else {
            self.index.insert(definition.id.clone(), self.strategies.len());
            self.strategies.push(definition);
            true
        }
    }

    /// Looks up a strategy.
    ///
    /// # Errors
    /// Returns `PipelineError::NotFound` for an unknown id.
    pub fn get(&self, id: &str) -> Result<&StrategyDefinition> {
        self.index
            .get(id)
            .map(|&slot| &self.strategies[slot])
            .ok_or_else(|| PipelineError::NotFound(id.to_string()))
    }

    /// All strategies in insertion order.
    pub fn list(&self) -> &[StrategyDefinition] {
        &self.strategies
    }

    /// The first strategy flagged as recommended.
    pub fn recommended(&self) -> Option<&StrategyDefinition> {
        self.strategies.iter().find(|s| s.recommended)
    }
}

#[allow(clippy::too_many_arguments)]
fn strategy(
    id: &str,
    name: &str,
    description: &str,
    graph: StepGraph,
    estimated_cost: f64,
    estimated_time_secs: u32,
    quality_score: f64,
    difficulty: Difficulty,
    recommended: bool,
) -> StrategyDefinition {
    StrategyDefinition {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        graph,
        estimated_cost,
        estimated_time_secs,
        quality_score,
        difficulty,
        recommended,
    }
}

fn builtin_strategies() -> Vec<StrategyDefinition> {
    use StepRole::{Analyze, Critique, Edit, Judge, Refine, Revise, Strategize, Synthesize, Write};

    let sequential = |steps: &[(StepRole, &str)]| StepGraph::Sequential {
        steps: steps.iter().map(|&(role, model)| StepSpec::new(role, model)).collect(),
    };
    let writers = |models: &[&str]| -> Vec<StepSpec> {
        models.iter().map(|model| StepSpec::new(Write, model)).collect()
    };

    vec![
        strategy(
            "quick-optimize",
            "Quick Optimize",
            "Fast single-pass optimization using Groq Mixtral",
            sequential(&[(Write, "groq-mixtral-8x7b")]),
            0.0007,
            7,
            6.5,
            Difficulty::Easy,
            false,
        ),
        strategy(
            "budget-optimizer",
            "Budget Optimizer",
            "Cost-effective two-step optimization",
            sequential(&[(Write, "groq-mixtral-8x7b"), (Refine, "deepseek-chat")]),
            0.004,
            20,
            7.2,
            Difficulty::Easy,
            false,
        ),
        strategy(
            "cascade-refinement",
            "Cascade Refinement",
            "Three-tier progressive enhancement (Recommended)",
            sequential(&[
                (Write, "groq-mixtral-8x7b"),
                (Refine, "gpt-4-turbo"),
                (Edit, "claude-sonnet-4"),
            ]),
            0.048,
            45,
            8.5,
            Difficulty::Medium,
            true,
        ),
        strategy(
            "specialized-pipeline",
            "Specialized Pipeline",
            "Four-step specialized approach: Analyze → Strategize → Write → Edit",
            sequential(&[
                (Analyze, "groq-mixtral-8x7b"),
                (Strategize, "claude-sonnet-4"),
                (Write, "gpt-4-turbo"),
                (Edit, "deepseek-chat"),
            ]),
            0.063,
            70,
            8.7,
            Difficulty::Medium,
            false,
        ),
        strategy(
            "adversarial-review",
            "Adversarial Review",
            "GPT-4 and Claude collaborate through critique and revision",
            sequential(&[
                (Write, "gpt-4-turbo"),
                (Critique, "claude-sonnet-4"),
                (Revise, "gpt-4-turbo"),
                (Edit, "claude-sonnet-4"),
            ]),
            0.085,
            60,
            8.8,
            Difficulty::Medium,
            false,
        ),
        strategy(
            "parallel-ensemble",
            "Parallel Ensemble",
            "Premium: Three models work in parallel, synthesized by Claude Opus",
            StepGraph::ParallelThenSynthesize {
                branches: writers(&["claude-sonnet-4", "gpt-4-turbo", "gemini-pro"]),
                synthesis: StepSpec::new(Synthesize, "claude-opus-4"),
            },
            0.155,
            75,
            9.5,
            Difficulty::Hard,
            false,
        ),
        strategy(
            "voting-consensus",
            "Voting Consensus",
            "Three models create versions, Claude Opus judges the best",
            StepGraph::ParallelThenJudge {
                branches: writers(&["gpt-4-turbo", "claude-sonnet-4", "gemini-pro"]),
                judge: StepSpec::new(Judge, "claude-opus-4"),
            },
            0.170,
            85,
            9.3,
            Difficulty::Hard,
            false,
        ),
    ]
}
