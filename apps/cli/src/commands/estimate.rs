//! Estimate command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use resume_orchestrator::{PipelineConfig, ProviderGateway};
use serde_json::json;

use super::usd;

/// Show the projection for one strategy and the models it calls.
pub fn execute(config: &PipelineConfig, strategy_id: &str, json_output: bool) -> Result<()> {
    let orchestrator = config.build_orchestrator(ProviderGateway::new())?;
    let strategy = orchestrator.catalog().get(strategy_id)?;
    let estimate = orchestrator
        .estimate(strategy_id)
        .with_context(|| format!("Failed to estimate strategy '{strategy_id}'"))?;

    if json_output {
        let output = json!({
            "strategy_id": strategy.id,
            "estimate": estimate,
            "declared": {
                "cost": strategy.estimated_cost,
                "time_secs": strategy.estimated_time_secs,
                "quality": strategy.quality_score,
            },
            "models": strategy.models(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!("{} {}", strategy.name.bold().cyan(), format!("({})", strategy.id).dimmed());
    println!("  {}", strategy.description);
    println!();
    println!("  {:<16} {}", "Projected cost:", usd(estimate.cost).green());
    println!("  {:<16} ~{:.0}s", "Projected time:", estimate.time_secs);
    println!("  {:<16} {:.1}/10", "Quality:", estimate.quality);
    println!("  {:<16} {}", "Steps:", estimate.step_count);
    println!();
    for (index, step) in strategy.graph.steps().iter().enumerate() {
        println!("  {}. {:<11} {}", index + 1, step.role, step.model_id.dimmed());
    }
    println!();
    Ok(())
}
