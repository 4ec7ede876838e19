//! Addon commands: catalog, dependency order, install and uninstall.

use anyhow::{bail, Result};
use colored::Colorize;
use deckhand_core::{Config, ResolutionError};
use deckhand_sdk::{Deckhand, SdkError};
use serde_json::json;

use crate::cli::{AddonsAction, AddonsCommand};

/// Execute addon command.
pub async fn execute(cmd: AddonsCommand, config: Config) -> Result<()> {
    let deckhand = super::open(config).await?;
    match cmd.action {
        AddonsAction::List { json } => list(&deckhand, json),
        AddonsAction::Order { name, json } => order(&deckhand, &name, json),
        AddonsAction::Tree { name } => tree(&deckhand, &name),
        AddonsAction::Validate { json } => validate(&deckhand, json),
        AddonsAction::Install { name } => install(&deckhand, &name).await,
        AddonsAction::Uninstall { name, installed } => uninstall(&deckhand, &name, &installed).await,
    }
}

/// Print the addons involved in a graph defect.
fn report_resolution(err: &ResolutionError) {
    println!("{} {}", "✗".red(), err.to_string().red());
    println!("  {} {}", "Affected:".cyan(), err.affected_addons().join(", "));
}

fn list(deckhand: &Deckhand, json: bool) -> Result<()> {
    let catalog = deckhand.catalog();

    if json {
        let addons: Vec<_> = catalog
            .addons()
            .map(|a| json!({ "manifest": a.manifest, "dir": a.dir }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&addons)?);
        return Ok(());
    }

    if catalog.is_empty() {
        println!("{}", "No addons found.".yellow());
        println!(
            "  Addons directory: {}",
            deckhand.config().paths.addons_dir.display().to_string().cyan()
        );
        return Ok(());
    }

    println!("{}", "Addons".bold());
    println!("{}", "═".repeat(60));
    for addon in catalog.addons() {
        let manifest = &addon.manifest;
        println!(
            "● {} {} {}",
            manifest.name.bold(),
            format!("v{}", manifest.version).dimmed(),
            format!("({} hooks)", manifest.hooks.len()).dimmed()
        );
        if !manifest.description.is_empty() {
            println!("  {}", manifest.description);
        }
        if !manifest.dependencies.is_empty() {
            println!("  {} {}", "Requires:".cyan(), manifest.dependencies.join(", "));
        }
    }
    println!();
    Ok(())
}

fn order(deckhand: &Deckhand, name: &str, json: bool) -> Result<()> {
    let order = match deckhand.catalog().install_order(name) {
        Ok(order) => order,
        Err(e) => {
            if json {
                let output = json!({ "error": e.to_string(), "affected": e.affected_addons() });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                report_resolution(&e);
            }
            bail!("Cannot resolve install order for '{name}'");
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&order)?);
        return Ok(());
    }

    println!("{} {}", "Install order for".bold(), name.cyan());
    for (i, addon) in order.iter().enumerate() {
        println!("  {:>2}. {}", i + 1, addon);
    }
    Ok(())
}

fn tree(deckhand: &Deckhand, name: &str) -> Result<()> {
    if deckhand.catalog().get(name).is_none() {
        bail!("Addon not found: {name}");
    }
    print!("{}", deckhand.catalog().dependency_tree(name).render());
    Ok(())
}

fn validate(deckhand: &Deckhand, json: bool) -> Result<()> {
    let issues = deckhand.catalog().validate();

    if json {
        println!("{}", serde_json::to_string_pretty(&json!({ "issues": issues }))?);
    } else if issues.is_empty() {
        println!(
            "{} {} addons, dependency graph is valid",
            "✓".green(),
            deckhand.catalog().len()
        );
    } else {
        for issue in &issues {
            println!("{} {}", "✗".red(), issue);
        }
    }

    if !issues.is_empty() {
        bail!("{} dependency issue(s) found", issues.len());
    }
    Ok(())
}

async fn install(deckhand: &Deckhand, name: &str) -> Result<()> {
    match deckhand.installer().install(name).await {
        Ok(installed) if installed.is_empty() => {
            println!("{} {} is already installed", "○".yellow(), name);
            Ok(())
        }
        Ok(installed) => {
            for addon in &installed {
                println!("{} Installed {}", "✓".green(), addon.bold());
            }
            Ok(())
        }
        Err(SdkError::Resolution(e)) => {
            report_resolution(&e);
            bail!("Install of '{name}' not started");
        }
        Err(SdkError::OperationFailed { addon, message, .. }) => {
            let stats = deckhand.retry().stats(&format!("install:{addon}")).await;
            println!("{} {} failed: {}", "✗".red(), addon.bold(), message);
            println!(
                "  {} {} attempts, {} failed",
                "Retries:".cyan(),
                stats.total_attempts,
                stats.failures
            );
            bail!("Install of '{name}' failed");
        }
        Err(e) => Err(e.into()),
    }
}

async fn uninstall(deckhand: &Deckhand, name: &str, installed: &[String]) -> Result<()> {
    let installer = deckhand.installer();
    installer.mark_installed(name).await?;
    for other in installed {
        installer.mark_installed(other).await?;
    }

    installer.uninstall(name).await?;
    println!("{} Uninstalled {}", "✓".green(), name.bold());
    Ok(())
}
