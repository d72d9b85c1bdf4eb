//! Pipeline orchestration.
//!
//! [`PipelineOrchestrator`] owns the run table. Each run executes on its own
//! task; sequential graphs run one step at a time, fan-out graphs dispatch
//! every branch onto a `JoinSet` and wait for all of them before the
//! aggregator step.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::catalog::{StepGraph, StepSpec, StrategyCatalog, StrategyDefinition};
use crate::error::{PipelineError, Result};
use crate::estimator::{CostEstimator, Estimate};
use crate::executor::{FailureKind, StepContext, StepExecutor, StepResult, millis};
use crate::prompts::{JudgeVerdict, parse_judge_reply};
use crate::retry::RetryPolicy;
use crate::run::{PipelineRun, RunId, RunSnapshot, RunStatus};

/// A request to optimize one resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRequest {
    /// Strategy to run.
    pub strategy_id: String,
    /// Source resume.
    pub resume_text: String,
    /// Target job description.
    pub job_description: String,
    /// Maximum projected USD cost the caller accepts.
    #[serde(default)]
    pub cost_ceiling: Option<f64>,
}

impl OptimizationRequest {
    /// Creates a request without a cost ceiling.
    #[must_use]
    pub fn new(strategy_id: &str, resume_text: &str, job_description: &str) -> Self {
        Self {
            strategy_id: strategy_id.to_string(),
            resume_text: resume_text.to_string(),
            job_description: job_description.to_string(),
            cost_ceiling: None,
        }
    }

    /// Sets the cost ceiling.
    #[must_use]
    pub const fn with_cost_ceiling(mut self, ceiling: f64) -> Self {
        self.cost_ceiling = Some(ceiling);
        self
    }
}

/// Shared state of one run.
struct RunState {
    run: Mutex<PipelineRun>,
    started: Instant,
    cancel: CancellationToken,
    status: watch::Sender<RunStatus>,
}

impl RunState {
    fn lock(&self) -> MutexGuard<'_, PipelineRun> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a ledger entry unless the run has left `Running`.
    fn append(&self, result: StepResult) -> bool {
        let mut run = self.lock();
        if run.status != RunStatus::Running {
            debug!(run_id = %run.id, step_index = result.step_index, "Discarding late step result");
            return false;
        }
        if run.steps.len() >= run.declared_steps {
            error!(run_id = %run.id, step_index = result.step_index, "Ledger already full");
            return false;
        }
        run.steps.push(result);
        true
    }

    /// Moves the run to its terminal status. No-op if it already has one.
    fn finish(&self, outcome: Result<String>) {
        let to = match &outcome {
            Ok(_) => RunStatus::Succeeded,
            Err(PipelineError::Cancelled) => RunStatus::Cancelled,
            Err(_) => RunStatus::Failed,
        };

        let mut run = self.lock();
        if !run.transition(to) {
            debug!(run_id = %run.id, status = %run.status, "Run already terminal");
            return;
        }
        run.total_duration_ms = millis(self.started.elapsed());
        run.total_cost = run.succeeded_cost();
        match outcome {
            Ok(output) => {
                info!(
                    run_id = %run.id,
                    cost = run.total_cost,
                    duration_ms = run.total_duration_ms,
                    steps = run.steps.len(),
                    "Run succeeded"
                );
                run.output = Some(output);
            }
            Err(err) => {
                if to == RunStatus::Failed {
                    error!(run_id = %run.id, error = %err, "Run failed");
                } else {
                    info!(run_id = %run.id, "Run cancelled");
                }
                run.error = Some(err);
            }
        }
        drop(run);
        self.status.send_replace(to);
    }
}

/// Drives one run to completion.
#[derive(Clone)]
struct RunDriver {
    executor: StepExecutor,
    retry: RetryPolicy,
    strategy: Arc<StrategyDefinition>,
    state: Arc<RunState>,
    context: StepContext,
}

impl RunDriver {
    async fn drive(self) {
        let outcome = match &self.strategy.graph {
            StepGraph::Sequential { steps } => self.run_sequential(steps).await,
            StepGraph::ParallelThenSynthesize { branches, synthesis } => {
                self.run_fan_out(branches, synthesis).await
            }
            StepGraph::ParallelThenJudge { branches, judge } => self.run_fan_out(branches, judge).await,
        };
        self.state.finish(outcome);
    }

    async fn run_sequential(&self, steps: &[StepSpec]) -> Result<String> {
        let mut context = self.context.clone();
        let mut output = None;

        for (index, spec) in steps.iter().enumerate() {
            let result = self.execute_step(index, spec, &context).await?;
            let text = self.settle(result)?;
            context.record(spec.role, &text);
            output = Some(text);
        }

        Ok(output.unwrap_or_else(|| self.context.resume_text.clone()))
    }

    async fn run_fan_out(&self, branches: &[StepSpec], aggregator: &StepSpec) -> Result<String> {
        let mut tasks = JoinSet::new();
        for (index, spec) in branches.iter().enumerate() {
            let driver = self.clone();
            let spec = spec.clone();
            tasks.spawn(async move { driver.execute_step(index, &spec, &driver.context).await });
        }
        debug!(branches = branches.len(), "Dispatched parallel branches");

        let mut succeeded: Vec<StepResult> = Vec::with_capacity(branches.len());
        while let Some(joined) = tasks.join_next().await {
            let result = match joined {
                Ok(result) => result?,
                Err(err) => {
                    error!(error = %err, "Branch task aborted");
                    continue;
                }
            };
            let ok = result.is_success();
            let index = result.step_index;
            if !self.state.append(result.clone()) {
                return Err(PipelineError::Cancelled);
            }
            if ok {
                succeeded.push(result);
            } else {
                warn!(step_index = index, "Branch failed; excluded from aggregation");
            }
        }

        if succeeded.is_empty() {
            return Err(PipelineError::AllBranchesFailed { branches: branches.len() });
        }
        succeeded.sort_by_key(|r| r.step_index);
        let candidates: Vec<String> = succeeded.into_iter().map(|r| r.output).collect();

        let context = self.context.with_candidates(candidates.clone());
        let result = self.execute_step(branches.len(), aggregator, &context).await?;
        let reply = self.settle(result)?;

        if !matches!(self.strategy.graph, StepGraph::ParallelThenJudge { .. }) {
            return Ok(reply);
        }
        match parse_judge_reply(&reply, candidates.len()) {
            JudgeVerdict::Selected(choice) => {
                info!(candidate = choice + 1, "Judge selected candidate");
                Ok(candidates[choice].clone())
            }
            JudgeVerdict::Merged(text) if !text.is_empty() => Ok(text),
            JudgeVerdict::Merged(_) => {
                warn!("Judge reply had no usable content; using first candidate");
                Ok(candidates[0].clone())
            }
        }
    }

    /// Records `result` and converts a failure into the run's error.
    fn settle(&self, result: StepResult) -> Result<String> {
        let failure = if result.is_success() {
            None
        } else {
            let (kind, message) = result
                .failure
                .as_ref()
                .map_or((FailureKind::Unknown, String::new()), |f| (f.kind, f.message.clone()));
            Some(PipelineError::StepFailed {
                step_index: result.step_index,
                model_id: result.model_id.clone(),
                kind,
                message,
                attempts: result.attempts,
            })
        };
        let output = result.output.clone();

        if !self.state.append(result) {
            return Err(PipelineError::Cancelled);
        }
        failure.map_or(Ok(output), Err)
    }

    /// Runs one step with retries. Returns `Err(Cancelled)` if the run is
    /// cancelled while the step is in flight or backing off.
    async fn execute_step(&self, index: usize, spec: &StepSpec, context: &StepContext) -> Result<StepResult> {
        let started = Instant::now();
        let mut attempts = 0;

        let mut result = loop {
            attempts += 1;
            let result = tokio::select! {
                biased;
                () = self.state.cancel.cancelled() => return Err(PipelineError::Cancelled),
                result = self.executor.run(index, spec, context) => result,
            };

            if result.is_success() {
                break result;
            }
            let kind = result.failure_kind().unwrap_or(FailureKind::Unknown);
            if !self.retry.should_retry(kind, attempts) {
                break result;
            }

            let delay = self.retry.delay_for(attempts - 1, result.retry_after());
            warn!(
                step_index = index,
                model_id = %spec.model_id,
                kind = %kind,
                attempt = attempts,
                delay_ms = millis(delay),
                "Step failed, retrying"
            );
            tokio::select! {
                biased;
                () = self.state.cancel.cancelled() => return Err(PipelineError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        };

        result.attempts = attempts;
        result.duration_ms = millis(started.elapsed());
        Ok(result)
    }
}

/// Entry point for estimating and running strategies.
pub struct PipelineOrchestrator {
    catalog: Arc<StrategyCatalog>,
    estimator: CostEstimator,
    executor: StepExecutor,
    retry: RetryPolicy,
    runs: RwLock<HashMap<RunId, Arc<RunState>>>,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("strategies", &self.catalog.list().len())
            .field("estimator", &self.estimator)
            .field("retry", &self.retry)
            .field("runs", &self.runs.read().map(|r| r.len()).unwrap_or(0))
            .finish_non_exhaustive()
    }
}

impl PipelineOrchestrator {
    /// Creates an orchestrator with the default estimator and retry policy.
    #[must_use]
    pub fn new(catalog: StrategyCatalog, executor: StepExecutor) -> Self {
        Self {
            catalog: Arc::new(catalog),
            estimator: CostEstimator::default(),
            executor,
            retry: RetryPolicy::default(),
            runs: RwLock::new(HashMap::new()),
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the estimator.
    #[must_use]
    pub const fn with_estimator(mut self, estimator: CostEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    /// The strategy catalog.
    #[must_use]
    pub fn catalog(&self) -> &StrategyCatalog {
        &self.catalog
    }

    /// All strategies in catalog order.
    #[must_use]
    pub fn strategies(&self) -> &[StrategyDefinition] {
        self.catalog.list()
    }

    /// Projection for one strategy.
    ///
    /// # Errors
    /// Returns `NotFound` or `UnknownModel`.
    pub fn estimate(&self, strategy_id: &str) -> Result<Estimate> {
        let strategy = self.catalog.get(strategy_id)?;
        self.estimator.estimate(strategy, self.executor.models())
    }

    /// Validates `request` and launches a run in the background.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns a pre-flight error (`NotFound`, `UnknownModel`,
    /// `BudgetExceeded`, `ProviderNotConfigured`); no run is created.
    pub fn start(&self, request: &OptimizationRequest) -> Result<RunId> {
        let strategy = self.catalog.get(&request.strategy_id)?;
        let estimate = self.estimator.estimate(strategy, self.executor.models())?;
        CostEstimator::check_ceiling(&strategy.id, &estimate, request.cost_ceiling).inspect_err(|err| {
            warn!(strategy_id = %strategy.id, error = %err, "Run rejected by cost ceiling");
        })?;

        for step in strategy.graph.steps() {
            let profile = self.executor.models().require(&step.model_id)?;
            if !self.executor.gateway().has_provider(profile.provider) {
                return Err(PipelineError::ProviderNotConfigured(profile.provider));
            }
        }

        let mut run = PipelineRun::new(
            &strategy.id,
            &request.resume_text,
            &request.job_description,
            strategy.step_count(),
        );
        run.transition(RunStatus::Running);
        let run_id = run.id;

        let (status, _) = watch::channel(RunStatus::Running);
        let state = Arc::new(RunState {
            run: Mutex::new(run),
            started: Instant::now(),
            cancel: CancellationToken::new(),
            status,
        });
        self.runs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(run_id, Arc::clone(&state));

        info!(
            run_id = %run_id,
            strategy_id = %strategy.id,
            steps = strategy.step_count(),
            projected_cost = estimate.cost,
            "Run started"
        );

        let driver = RunDriver {
            executor: self.executor.clone(),
            retry: self.retry.clone(),
            strategy: Arc::new(strategy.clone()),
            state,
            context: StepContext::new(request.resume_text.as_str(), request.job_description.as_str()),
        };
        let span = info_span!("run", run_id = %run_id, strategy_id = %strategy.id);
        tokio::spawn(driver.drive().instrument(span));

        Ok(run_id)
    }

    /// Waits until the run is terminal and returns it.
    ///
    /// # Errors
    /// Returns `RunNotFound` for an unknown id.
    pub async fn wait(&self, run_id: RunId) -> Result<PipelineRun> {
        let state = self.state(run_id)?;
        let mut status = state.status.subscribe();
        if status.wait_for(|s| s.is_terminal()).await.is_err() {
            warn!(run_id = %run_id, "Run status channel closed");
        }
        let run = state.lock().clone();
        Ok(run)
    }

    /// Runs `request` to completion and hands the finished run back.
    ///
    /// The run is not kept in the run table afterwards.
    ///
    /// # Errors
    /// Returns a pre-flight error; execution failures are reported on the
    /// returned run.
    pub async fn optimize(&self, request: &OptimizationRequest) -> Result<PipelineRun> {
        let run_id = self.start(request)?;
        let run = self.wait(run_id).await?;
        self.take(run_id)?;
        Ok(run)
    }

    /// Removes a terminal run from the run table and returns it.
    ///
    /// # Errors
    /// Returns `RunNotFound` for an unknown id and `RunActive` while the run
    /// has not finished.
    pub fn take(&self, run_id: RunId) -> Result<PipelineRun> {
        let mut runs = self.runs.write().unwrap_or_else(PoisonError::into_inner);
        let state = runs.get(&run_id).ok_or(PipelineError::RunNotFound(run_id))?;
        let run = state.lock().clone();
        if !run.status.is_terminal() {
            return Err(PipelineError::RunActive(run_id));
        }
        runs.remove(&run_id);
        debug!(run_id = %run_id, status = %run.status, "Run evicted");
        Ok(run)
    }

    /// Cancels a running run. Completed ledger entries are kept.
    ///
    /// # Errors
    /// Returns `RunNotFound` or `NotRunning`.
    pub fn cancel(&self, run_id: RunId) -> Result<()> {
        let state = self.state(run_id)?;
        {
            let mut run = state.lock();
            if !run.transition(RunStatus::Cancelled) {
                return Err(PipelineError::NotRunning { run_id, status: run.status });
            }
            run.error = Some(PipelineError::Cancelled);
            run.total_cost = run.succeeded_cost();
            run.total_duration_ms = millis(state.started.elapsed());
            info!(run_id = %run_id, completed_steps = run.steps.len(), "Run cancelled");
        }
        state.cancel.cancel();
        state.status.send_replace(RunStatus::Cancelled);
        Ok(())
    }

    /// Current progress of a run.
    ///
    /// # Errors
    /// Returns `RunNotFound` for an unknown id.
    pub fn snapshot(&self, run_id: RunId) -> Result<RunSnapshot> {
        Ok(self.state(run_id)?.lock().snapshot())
    }

    /// A copy of the run as it stands.
    ///
    /// # Errors
    /// Returns `RunNotFound` for an unknown id.
    pub fn get(&self, run_id: RunId) -> Result<PipelineRun> {
        let run = self.state(run_id)?.lock().clone();
        Ok(run)
    }

    fn state(&self, run_id: RunId) -> Result<Arc<RunState>> {
        self.runs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&run_id)
            .cloned()
            .ok_or(PipelineError::RunNotFound(run_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ProviderGateway;
    use crate::registry::ModelRegistry;
    use resume_abstraction::{ProviderError, ProviderId};
    use resume_models::{MockOutcome, MockProvider};
    use std::time::Duration;

    fn orchestrator(mock: MockProvider) -> PipelineOrchestrator {
        let gateway = ProviderGateway::new().with_client(Arc::new(mock));
        let executor = StepExecutor::new(gateway, Arc::new(ModelRegistry::builtin()));
        PipelineOrchestrator::new(StrategyCatalog::builtin(), executor)
    }

    #[tokio::test]
    async fn test_quick_optimize_single_step() {
        let mock = MockProvider::new(ProviderId::Groq)
            .with_sticky("mixtral-8x7b-32768", MockOutcome::reply_with_usage("Optimized", 500, 500));
        let orchestrator = orchestrator(mock);

        let run = orchestrator
            .optimize(&OptimizationRequest::new("quick-optimize", "resume", "job"))
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Succeeded);
        assert_eq!(run.steps.len(), 1);
        assert_eq!(run.output.as_deref(), Some("Optimized"));
        assert!((run.total_cost - 0.0007).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_unknown_strategy_is_not_found() {
        let orchestrator = orchestrator(MockProvider::new(ProviderId::Groq));
        let err = orchestrator.start(&OptimizationRequest::new("nope", "r", "j")).unwrap_err();
        assert_eq!(err, PipelineError::NotFound("nope".to_string()));
    }

    #[tokio::test]
    async fn test_missing_provider_is_rejected_before_start() {
        let orchestrator = orchestrator(MockProvider::new(ProviderId::Groq));
        let err = orchestrator
            .start(&OptimizationRequest::new("budget-optimizer", "r", "j"))
            .unwrap_err();
        assert_eq!(err, PipelineError::ProviderNotConfigured(ProviderId::DeepSeek));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_error_fails_after_one_attempt() {
        let mock = MockProvider::new(ProviderId::Groq).with_sticky(
            "mixtral-8x7b-32768",
            MockOutcome::fail(ProviderError::AuthError("invalid key".to_string())),
        );
        let orchestrator = orchestrator(mock);

        let run = orchestrator
            .optimize(&OptimizationRequest::new("quick-optimize", "r", "j"))
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.steps.len(), 1);
        assert_eq!(run.steps[0].attempts, 1);
        assert!(matches!(
            run.error,
            Some(PipelineError::StepFailed { kind: FailureKind::AuthError, attempts: 1, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_twice_is_not_running() {
        let mock = MockProvider::new(ProviderId::Groq).with_latency(Duration::from_secs(10));
        let orchestrator = orchestrator(mock);

        let run_id = orchestrator.start(&OptimizationRequest::new("quick-optimize", "r", "j")).unwrap();
        orchestrator.cancel(run_id).unwrap();
        assert!(matches!(
            orchestrator.cancel(run_id),
            Err(PipelineError::NotRunning { status: RunStatus::Cancelled, .. })
        ));

        let run = orchestrator.wait(run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
        assert!(run.steps.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_evicts_only_terminal_runs() {
        let mock = MockProvider::new(ProviderId::Groq).with_latency(Duration::from_secs(2));
        let orchestrator = orchestrator(mock);

        let run_id = orchestrator.start(&OptimizationRequest::new("quick-optimize", "r", "j")).unwrap();
        assert_eq!(orchestrator.take(run_id).unwrap_err(), PipelineError::RunActive(run_id));

        let finished = orchestrator.wait(run_id).await.unwrap();
        let taken = orchestrator.take(run_id).unwrap();
        assert_eq!(taken, finished);
        assert_eq!(orchestrator.get(run_id).unwrap_err(), PipelineError::RunNotFound(run_id));
        assert_eq!(orchestrator.take(run_id).unwrap_err(), PipelineError::RunNotFound(run_id));
    }

    #[tokio::test]
    async fn test_optimize_does_not_retain_run() {
        let orchestrator = orchestrator(MockProvider::new(ProviderId::Groq));
        let run = orchestrator
            .optimize(&OptimizationRequest::new("quick-optimize", "r", "j"))
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Succeeded);
        assert_eq!(orchestrator.get(run.id).unwrap_err(), PipelineError::RunNotFound(run.id));
    }

    #[tokio::test]
    async fn test_unknown_run_id() {
        let orchestrator = orchestrator(MockProvider::new(ProviderId::Groq));
        let id = RunId::new();
        assert_eq!(orchestrator.snapshot(id).unwrap_err(), PipelineError::RunNotFound(id));
    }
}
