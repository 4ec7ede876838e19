//! Tail -> aggregate -> rate limit -> dispatch, one pipeline per deployment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use deckhand_core::config::{AggregatorSettings, RateLimitSettings, TailerSettings};
use deckhand_core::Config;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use super::aggregator::ChunkAggregator;
use super::dispatcher::{Dispatcher, LogPublisher};
use super::rate_limit::RateLimiter;
use super::tailer::{FileTailer, TailerReport};

/// Settings for one pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub tailer: TailerSettings,
    pub aggregator: AggregatorSettings,
    pub rate_limit: RateLimitSettings,
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            tailer: config.tailer.clone(),
            aggregator: config.aggregator.clone(),
            rate_limit: config.rate_limit.clone(),
        }
    }
}

/// Final counters of a stopped pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TailStats {
    pub lines_read: u64,
    pub chunks_dispatched: u64,
    pub reopen_count: u64,
}

/// A running pipeline.
pub struct TailHandle {
    deployment_id: String,
    path: PathBuf,
    stop: Arc<AtomicBool>,
    tailer: JoinHandle<TailerReport>,
    consumer: JoinHandle<u64>,
}

impl TailHandle {
    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ask the tailer to exit at its next poll boundary.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.tailer.is_finished() && self.consumer.is_finished()
    }

    /// Wait for the tailer to exit and the last chunk to be dispatched.
    pub async fn join(self) -> TailStats {
        let report = self.tailer.await.unwrap_or_else(|e| {
            warn!(deployment = %self.deployment_id, error = %e, "Tailer task failed");
            TailerReport::default()
        });
        let chunks_dispatched = self.consumer.await.unwrap_or_else(|e| {
            warn!(deployment = %self.deployment_id, error = %e, "Log consumer task failed");
            0
        });
        TailStats {
            lines_read: report.lines_read,
            chunks_dispatched,
            reopen_count: report.reopen_count,
        }
    }
}

/// Start tailing `path` for `deployment_id`.
///
/// The tailer and its consumer share only the bounded line queue.
pub fn spawn_pipeline(
    deployment_id: impl Into<String>,
    path: impl Into<PathBuf>,
    config: &PipelineConfig,
    publisher: Arc<dyn LogPublisher>,
) -> TailHandle {
    let deployment_id = deployment_id.into();
    let path = path.into();

    let tailer = FileTailer::new(&path, config.tailer.clone());
    let stop = tailer.stop_flag();
    let (tx, rx) = mpsc::channel(config.tailer.queue_capacity.max(1));

    let consumer = tokio::spawn(consume(
        rx,
        ChunkAggregator::new(&config.aggregator),
        RateLimiter::from(&config.rate_limit),
        Dispatcher::new(&deployment_id, publisher),
    ));
    let tailer = tokio::spawn(tailer.run(tx));

    info!(deployment = %deployment_id, path = %path.display(), "Started log pipeline");
    TailHandle {
        deployment_id,
        path,
        stop,
        tailer,
        consumer,
    }
}

/// Drain the queue into chunks until the tailer hangs up, then flush.
async fn consume(
    mut rx: mpsc::Receiver<String>,
    mut aggregator: ChunkAggregator,
    limiter: RateLimiter,
    dispatcher: Dispatcher,
) -> u64 {
    let tick = (aggregator.flush_interval() / 4).max(Duration::from_millis(10));
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut dispatched = 0;

    loop {
        let chunk = tokio::select! {
            line = rx.recv() => match line {
                Some(line) => aggregator.add_line(line),
                None => break,
            },
            _ = ticker.tick() => aggregator.maybe_flush_by_time(),
        };
        if let Some(chunk) = chunk {
            limiter.acquire(1).await;
            if dispatcher.dispatch(chunk).await {
                dispatched += 1;
            }
        }
    }

    if let Some(chunk) = aggregator.flush() {
        limiter.acquire(1).await;
        if dispatcher.dispatch(chunk).await {
            dispatched += 1;
        }
    }
    dispatched
}

// ─────────────────────────────────────────────────────────────────────────────
// Manager
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the pipelines of all deployments being followed.
pub struct LogTailManager {
    config: PipelineConfig,
    publisher: Arc<dyn LogPublisher>,
    active: RwLock<HashMap<String, TailHandle>>,
    /// Serializes start/stop
    operation_lock: Mutex<()>,
}

impl LogTailManager {
    pub fn new(config: PipelineConfig, publisher: Arc<dyn LogPublisher>) -> Self {
        Self {
            config,
            publisher,
            active: RwLock::new(HashMap::new()),
            operation_lock: Mutex::new(()),
        }
    }

    /// Start following `path` for a deployment.
    ///
    /// A pipeline already running for the deployment is stopped first and
    /// its stats returned.
    pub async fn start(&self, deployment_id: &str, path: impl Into<PathBuf>) -> Option<TailStats> {
        let _lock = self.operation_lock.lock().await;
        let replaced = self.stop_inner(deployment_id).await;

        let handle = spawn_pipeline(deployment_id, path, &self.config, self.publisher.clone());
        self.active
            .write()
            .await
            .insert(deployment_id.to_string(), handle);
        replaced
    }

    async fn stop_inner(&self, deployment_id: &str) -> Option<TailStats> {
        let handle = self.active.write().await.remove(deployment_id)?;
        handle.stop();
        let stats = handle.join().await;
        info!(
            deployment = %deployment_id,
            lines_read = stats.lines_read,
            chunks = stats.chunks_dispatched,
            "Stopped log pipeline"
        );
        Some(stats)
    }

    /// Stop a deployment's pipeline, waiting for its final flush.
    pub async fn stop(&self, deployment_id: &str) -> Option<TailStats> {
        let _lock = self.operation_lock.lock().await;
        self.stop_inner(deployment_id).await
    }

    /// Stop every pipeline
    pub async fn stop_all(&self) -> Vec<(String, TailStats)> {
        let _lock = self.operation_lock.lock().await;
        let handles: Vec<TailHandle> = self.active.write().await.drain().map(|(_, h)| h).collect();

        for handle in &handles {
            handle.stop();
        }
        let mut stopped = Vec::with_capacity(handles.len());
        for handle in handles {
            let deployment_id = handle.deployment_id().to_string();
            stopped.push((deployment_id, handle.join().await));
        }
        stopped.sort_by(|a, b| a.0.cmp(&b.0));
        stopped
    }

    /// Deployments currently followed, sorted
    pub async fn active(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
