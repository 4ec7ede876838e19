//! Log tailing pipeline
//!
//! Follows deployment log files and streams them, in rate-limited chunks,
//! to per-deployment pub/sub topics.
//!
//! ```text
//! FileTailer --(bounded queue)--> ChunkAggregator --> RateLimiter --> Dispatcher
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use deckhand_sdk::logs::{BroadcastPublisher, LogTailManager, PipelineConfig};
//!
//! let publisher = Arc::new(BroadcastPublisher::default());
//! let mut rx = publisher.subscribe("deployment:42:logs").await;
//!
//! let manager = LogTailManager::new(PipelineConfig::from(&config), publisher);
//! manager.start("42", "/var/log/app/deploy.log").await;
//!
//! while let Ok(message) = rx.recv().await {
//!     for line in message.lines {
//!         println!("{line}");
//!     }
//! }
//! ```

mod aggregator;
mod dispatcher;
mod pipeline;
mod rate_limit;
mod tailer;

pub use aggregator::{Chunk, ChunkAggregator};
pub use dispatcher::{deployment_topic, BroadcastPublisher, Dispatcher, LogMessage, LogPublisher};
pub use pipeline::{spawn_pipeline, LogTailManager, PipelineConfig, TailHandle, TailStats};
pub use rate_limit::RateLimiter;
pub use tailer::{FileTailer, TailerReport};
