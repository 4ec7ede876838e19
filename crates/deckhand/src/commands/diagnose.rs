//! Classify an error message the way the retry executor does.

use anyhow::Result;
use colored::Colorize;
use deckhand_core::retry::{detect_recoverable_errors, RecoveryAction};

/// Execute diagnose command.
pub fn execute(error: &str, json: bool) -> Result<()> {
    let actions = detect_recoverable_errors(error);

    if json {
        println!("{}", serde_json::to_string_pretty(&actions)?);
        return Ok(());
    }

    if actions.is_empty() {
        println!("{} No known recovery for this error; it would be retried as-is.", "○".yellow());
        return Ok(());
    }

    println!("{}", "Recovery actions".bold());
    println!("{}", "═".repeat(60));
    for action in &actions {
        print_action(action);
    }
    Ok(())
}

fn print_action(action: &RecoveryAction) {
    let mode = if action.auto_execute {
        "auto".green()
    } else {
        "manual".yellow()
    };
    println!(
        "● {} {} [{}]",
        format!("{:?}", action.category).bold(),
        action.kind.to_string().cyan(),
        mode
    );
    println!("  {}", action.description);
}
