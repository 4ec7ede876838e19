//! Hook commands: list registrations and trigger events by hand.

use anyhow::{bail, Result};
use colored::Colorize;
use deckhand_core::{Config, HookContext, HookResult};
use deckhand_sdk::hooks::HookRegistration;
use deckhand_sdk::{Deckhand, HookExecutionError, SdkError};
use serde_json::{json, Value};

use crate::cli::{HooksAction, HooksCommand};

/// Execute hook command.
pub async fn execute(cmd: HooksCommand, config: Config) -> Result<()> {
    let deckhand = super::open(config).await?;
    match cmd.action {
        HooksAction::List { event, json } => list(&deckhand, event.as_deref(), json),
        HooksAction::Trigger {
            event,
            deployment,
            project,
            env,
            meta,
            fail_fast,
            json,
        } => {
            let mut context = HookContext::new(&event);
            context.deployment_id = deployment;
            context.project_id = project;
            context.environment = env;
            for entry in &meta {
                let (key, value) = parse_meta(entry)?;
                context.metadata.insert(key, value);
            }
            trigger(&deckhand, &event, context, fail_fast, json).await
        }
    }
}

/// Parse `key=value`; the value is read as JSON when it parses, else as a string.
fn parse_meta(entry: &str) -> Result<(String, Value)> {
    let Some((key, raw)) = entry.split_once('=') else {
        bail!("Invalid --meta '{entry}', expected KEY=VALUE");
    };
    if key.is_empty() {
        bail!("Invalid --meta '{entry}', empty key");
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn registration_json(hook: &HookRegistration) -> Value {
    json!({
        "event": hook.event,
        "addon": hook.addon_name,
        "hook": hook.hook_name(),
        "priority": hook.options.priority,
        "timeout_ms": hook.options.timeout_ms,
        "retries": hook.options.retries,
        "enforcement": hook.options.enforcement,
        "conditions": hook.options.conditions,
    })
}

fn list(deckhand: &Deckhand, event: Option<&str>, json: bool) -> Result<()> {
    let registry = deckhand.executor().registry();
    let events: Vec<String> = match event {
        Some(event) => vec![event.to_string()],
        None => registry.events().into_iter().map(String::from).collect(),
    };

    let mut by_event = Vec::new();
    for event in events {
        let mut hooks = registry.get_hooks(&event);
        hooks.sort_by_key(|h| h.options.priority);
        by_event.push((event, hooks));
    }

    if json {
        let output: Vec<Value> = by_event
            .iter()
            .flat_map(|(_, hooks)| hooks.iter().map(registration_json))
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if by_event.iter().all(|(_, hooks)| hooks.is_empty()) {
        println!("{}", "No hooks registered.".yellow());
        return Ok(());
    }

    for (event, hooks) in by_event {
        println!("{}", event.bold());
        for hook in hooks {
            let timeout = hook
                .options
                .timeout_ms
                .map_or_else(|| "none".to_string(), |ms| format!("{ms}ms"));
            println!(
                "  {:>4}  {} {} {}",
                hook.options.priority,
                hook.hook_name().cyan(),
                format!("[{}]", hook.addon_name).dimmed(),
                format!(
                    "{} timeout={} retries={}",
                    hook.options.enforcement, timeout, hook.options.retries
                )
                .dimmed()
            );
        }
    }
    Ok(())
}

fn print_results(results: &[HookResult]) {
    for result in results {
        let icon = if result.skipped {
            "○".yellow()
        } else {
            super::status_icon(result.success)
        };
        println!(
            "{} {} {} {}",
            icon,
            result.hook_name.bold(),
            format!("[{}]", result.addon_name).dimmed(),
            format!("{}ms, {} attempt(s)", result.duration_ms, result.attempts).dimmed()
        );
        if let Some(ref error) = result.error {
            println!("    {} {}", "Error:".red(), error);
        }
    }
}

async fn trigger(
    deckhand: &Deckhand,
    event: &str,
    context: HookContext,
    fail_fast: bool,
    json: bool,
) -> Result<()> {
    let run_id = context.run_id;
    match deckhand.trigger(event, context, fail_fast).await {
        Ok(results) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                println!("{} {} {}", "Triggered".bold(), event.cyan(), format!("({run_id})").dimmed());
                print_results(&results);
            }
            Ok(())
        }
        Err(SdkError::HookExecution(err)) => {
            let HookExecutionError::EnforcementFailed {
                ref addon_name,
                ref hook_name,
                ..
            } = err;
            if json {
                let output = json!({ "aborted": err.to_string(), "results": err.results() });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_results(err.results());
            }
            bail!("Required hook '{hook_name}' of addon '{addon_name}' failed, '{event}' aborted");
        }
        Err(e) => Err(e.into()),
    }
}
