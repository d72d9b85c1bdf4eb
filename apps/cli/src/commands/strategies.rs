//! Strategies command implementation.

use anyhow::Result;
use colored::Colorize;
use comfy_table::{Cell, Color, Table};
use resume_orchestrator::{Difficulty, PipelineConfig, ProviderGateway};
use serde_json::json;

use super::usd;

/// List every strategy with its projected cost next to the advertised one.
pub fn execute(config: &PipelineConfig, json_output: bool) -> Result<()> {
    let orchestrator = config.build_orchestrator(ProviderGateway::new())?;

    if json_output {
        let mut entries = Vec::new();
        for strategy in orchestrator.strategies() {
            let estimate = orchestrator.estimate(&strategy.id)?;
            entries.push(json!({
                "strategy": strategy,
                "estimate": estimate,
            }));
        }
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Optimization Strategies ({})", orchestrator.strategies().len()).bold().cyan());
    println!();

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Steps", "Est. Cost", "Est. Time", "Quality", "Difficulty"]);

    for strategy in orchestrator.strategies() {
        let estimate = orchestrator.estimate(&strategy.id)?;
        let difficulty = match strategy.difficulty {
            Difficulty::Easy => Cell::new("easy").fg(Color::Green),
            Difficulty::Medium => Cell::new("medium").fg(Color::Yellow),
            Difficulty::Hard => Cell::new("hard").fg(Color::Red),
        };
        let id = if strategy.recommended {
            Cell::new(format!("{} *", strategy.id)).fg(Color::Cyan)
        } else {
            Cell::new(&strategy.id)
        };

        table.add_row(vec![
            id,
            Cell::new(&strategy.name),
            Cell::new(strategy.step_count()),
            Cell::new(usd(estimate.cost)),
            Cell::new(format!("~{:.0}s", estimate.time_secs)),
            Cell::new(format!("{:.1}/10", strategy.quality_score)),
            difficulty,
        ]);
    }

    println!("{table}");
    println!();
    println!("  {}", "* recommended".dimmed());
    println!();
    Ok(())
}
