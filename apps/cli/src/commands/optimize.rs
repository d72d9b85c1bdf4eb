//! Optimize command implementation.

use anyhow::{Context, Result, bail};
use colored::Colorize;
use comfy_table::{Cell, Color, Table};
use resume_abstraction::ProviderId;
use resume_models::MockProvider;
use resume_orchestrator::{
    OptimizationRequest, PipelineConfig, PipelineRun, ProviderGateway, RunStatus, StepStatus,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use super::usd;

/// Arguments for `jap optimize`.
#[derive(Debug)]
pub struct OptimizeArgs {
    /// Strategy to run.
    pub strategy_id: String,
    /// Resume file.
    pub resume: PathBuf,
    /// Job description file.
    pub job: PathBuf,
    /// Cost ceiling in USD.
    pub ceiling: Option<f64>,
    /// Use mock providers.
    pub mock: bool,
    /// Emit JSON.
    pub json: bool,
}

/// Run a strategy and print the result.
///
/// Fails (non-zero exit) on pre-flight errors and on any run that does not succeed.
pub async fn execute(config: &PipelineConfig, args: OptimizeArgs) -> Result<()> {
    let resume_text = std::fs::read_to_string(&args.resume)
        .with_context(|| format!("Failed to read resume from {}", args.resume.display()))?;
    let job_description = std::fs::read_to_string(&args.job)
        .with_context(|| format!("Failed to read job description from {}", args.job.display()))?;
    if resume_text.trim().is_empty() {
        bail!("Resume file {} is empty", args.resume.display());
    }

    let gateway = if args.mock { mock_gateway(config) } else { config.build_gateway() };
    let orchestrator = config.build_orchestrator(gateway)?;

    let mut request = OptimizationRequest::new(&args.strategy_id, &resume_text, &job_description);
    request.cost_ceiling = args.ceiling;

    info!(strategy_id = %args.strategy_id, mock = args.mock, "Starting optimization");
    let run = orchestrator.optimize(&request).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        print_run(&run);
    }

    match run.status {
        RunStatus::Succeeded => Ok(()),
        status => match &run.error {
            Some(err) => bail!("Run {} {}: {}", run.id, status, err),
            None => bail!("Run {} {}", run.id, status),
        },
    }
}

fn mock_gateway(config: &PipelineConfig) -> ProviderGateway {
    let mut gateway = ProviderGateway::new();
    for provider in ProviderId::ALL {
        gateway.register(Arc::new(MockProvider::new(provider)));
    }
    match config.execution.max_concurrent_provider_calls {
        Some(limit) => gateway.with_max_concurrent_calls(limit),
        None => gateway,
    }
}

fn print_run(run: &PipelineRun) {
    println!();
    if let Some(output) = &run.output {
        println!("{}", "Optimized Resume".bold().cyan());
        println!("{}", "─".repeat(60).dimmed());
        println!("{}", output.trim());
        println!("{}", "─".repeat(60).dimmed());
        println!();
    }

    let mut table = Table::new();
    table.set_header(vec!["#", "Role", "Model", "Status", "Attempts", "Tokens", "Cost", "Duration"]);
    for step in &run.steps {
        let status = match step.status {
            StepStatus::Succeeded => Cell::new("ok").fg(Color::Green),
            StepStatus::Failed => Cell::new("failed").fg(Color::Red),
            StepStatus::TimedOut => Cell::new("timed out").fg(Color::Yellow),
        };
        table.add_row(vec![
            Cell::new(step.step_index + 1),
            Cell::new(step.role),
            Cell::new(&step.model_id),
            status,
            Cell::new(step.attempts),
            Cell::new(u64::from(step.prompt_tokens) + u64::from(step.completion_tokens)),
            Cell::new(usd(step.cost)),
            Cell::new(format!("{:.1}s", step.duration_ms as f64 / 1000.0)),
        ]);
    }
    println!("{table}");
    println!();

    let status = match run.status {
        RunStatus::Succeeded => run.status.to_string().green(),
        RunStatus::Cancelled => run.status.to_string().yellow(),
        _ => run.status.to_string().red(),
    };
    println!("  {:<10} {}", "Status:", status);
    println!("  {:<10} {}", "Strategy:", run.strategy_id);
    println!("  {:<10} {}/{}", "Steps:", run.steps.len(), run.declared_steps);
    println!("  {:<10} {}", "Cost:", usd(run.total_cost));
    println!("  {:<10} {:.1}s", "Duration:", run.total_duration_ms as f64 / 1000.0);
    if let Some(err) = &run.error {
        println!("  {:<10} {}", "Error:", err.to_string().red());
    }
    println!();
}
