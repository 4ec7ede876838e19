//! Metrics commands: per-addon aggregates from the metrics database.

use anyhow::{Context, Result};
use colored::Colorize;
use deckhand_core::metrics::{MetricsSink, SqliteMetrics};
use deckhand_core::Config;
use serde_json::json;

use crate::cli::{MetricsAction, MetricsCommand};

/// Execute metrics command.
pub async fn execute(cmd: MetricsCommand, config: &Config) -> Result<()> {
    match cmd.action {
        MetricsAction::Show { addon, limit, json } => show(config, &addon, limit, json).await,
    }
}

async fn show(config: &Config, addon: &str, limit: usize, json: bool) -> Result<()> {
    let path = &config.paths.database_path;
    let store = SqliteMetrics::open(path)
        .with_context(|| format!("Failed to open metrics database {}", path.display()))?;

    let metrics = store.addon_metrics(addon).await?;
    let runs = store.recent_runs(addon, limit)?;

    if json {
        let output = json!({
            "metrics": metrics,
            "success_rate": metrics.success_rate(),
            "avg_duration_ms": metrics.avg_duration_ms(),
            "recent_runs": runs,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{} {}", "Metrics for".bold(), addon.cyan());
    println!("{}", "═".repeat(60));

    if metrics.total_runs == 0 && metrics.retry_attempts == 0 {
        println!("{}", "No runs recorded.".yellow());
        return Ok(());
    }

    println!("  Runs:          {}", metrics.total_runs);
    println!(
        "  Succeeded:     {} ({:.0}%)",
        metrics.successes.to_string().green(),
        metrics.success_rate() * 100.0
    );
    println!("  Failed:        {}", metrics.failures.to_string().red());
    println!("  Avg duration:  {:.1}ms", metrics.avg_duration_ms());
    println!("  Retry attempts: {}", metrics.retry_attempts);
    if let Some(at) = metrics.last_run_at {
        println!("  Last run:      {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(at) = metrics.last_success_at {
        println!("  Last success:  {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(ref error) = metrics.last_error {
        let at = metrics
            .last_error_at
            .map(|at| format!(" ({})", at.format("%Y-%m-%d %H:%M:%S UTC")))
            .unwrap_or_default();
        println!("  Last error:    {}{}", error.red(), at.dimmed());
    }

    if !runs.is_empty() {
        println!();
        println!("{}", "Recent runs".bold());
        for run in &runs {
            println!(
                "  {} {} {} {}",
                super::status_icon(run.success),
                run.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
                format!("{}/{}", run.event, run.hook_name),
                format!("{}ms x{}", run.duration_ms, run.attempts).dimmed()
            );
        }
    }
    Ok(())
}
