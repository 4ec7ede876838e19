//! Log commands: follow a file and print the chunks it produces.

use std::sync::Arc;

use anyhow::{bail, Result};
use colored::Colorize;
use deckhand_core::Config;
use deckhand_sdk::logs::{deployment_topic, BroadcastPublisher, LogTailManager, PipelineConfig};
use tokio::sync::broadcast::error::RecvError;

use crate::cli::{LogsAction, LogsCommand};

/// Execute log command.
pub async fn execute(cmd: LogsCommand, config: &Config) -> Result<()> {
    match cmd.action {
        LogsAction::Tail {
            file,
            deployment,
            from_start,
        } => tail(config, &file, &deployment, from_start).await,
    }
}

async fn tail(
    config: &Config,
    file: &std::path::Path,
    deployment: &str,
    from_start: bool,
) -> Result<()> {
    if deployment.trim().is_empty() {
        bail!("Deployment ID must not be empty");
    }

    let mut pipeline = PipelineConfig::from(config);
    pipeline.tailer.from_end = !from_start;

    let publisher = Arc::new(BroadcastPublisher::default());
    let mut rx = publisher.subscribe(&deployment_topic(deployment)).await;
    let manager = LogTailManager::new(pipeline, publisher.clone());
    manager.start(deployment, file).await;

    eprintln!(
        "{} {} {}",
        "Following".bold(),
        file.display().to_string().cyan(),
        "(Ctrl-C to stop)".dimmed()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            message = rx.recv() => match message {
                Ok(message) => {
                    for line in &message.lines {
                        println!("{line}");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Subscriber lagged, chunks dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    for (deployment_id, stats) in manager.stop_all().await {
        eprintln!(
            "{} {}: {} lines, {} chunks, {} reopen(s)",
            "○".yellow(),
            deployment_id,
            stats.lines_read,
            stats.chunks_dispatched,
            stats.reopen_count
        );
    }
    Ok(())
}
