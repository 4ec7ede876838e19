//! Groups log lines into chunks bounded by line count, size and age.

use std::time::Duration;

use chrono::{DateTime, Utc};
use deckhand_core::config::AggregatorSettings;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// A batch of consecutive log lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub lines: Vec<String>,
    /// Sum of line lengths in bytes
    pub bytes: usize,
    /// When the first line was added
    pub created_at: DateTime<Utc>,
}

/// Cut `line` to at most `max_bytes`, on a char boundary.
fn truncate_line(mut line: String, max_bytes: usize) -> String {
    if line.len() > max_bytes {
        let mut end = max_bytes;
        while !line.is_char_boundary(end) {
            end -= 1;
        }
        line.truncate(end);
    }
    line
}

/// Chunk builder.
///
/// `add_line` flushes as soon as a size threshold is reached; callers poll
/// `maybe_flush_by_time` so a quiet stream still flushes within
/// `flush_interval` of its first pending line.
#[derive(Debug)]
pub struct ChunkAggregator {
    max_lines: usize,
    max_bytes: usize,
    max_line_bytes: usize,
    flush_interval: Duration,
    lines: Vec<String>,
    bytes: usize,
    started: Option<(Instant, DateTime<Utc>)>,
}

impl ChunkAggregator {
    pub fn new(settings: &AggregatorSettings) -> Self {
        Self {
            max_lines: settings.max_lines.max(1),
            max_bytes: settings.max_bytes.max(1),
            max_line_bytes: settings.max_line_bytes.max(1),
            flush_interval: Duration::from_millis(settings.flush_interval_ms),
            lines: Vec::new(),
            bytes: 0,
            started: None,
        }
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Append a line; returns the chunk if this line hit a threshold.
    pub fn add_line(&mut self, line: impl Into<String>) -> Option<Chunk> {
        let line = truncate_line(line.into(), self.max_line_bytes);
        if self.started.is_none() {
            self.started = Some((Instant::now(), Utc::now()));
        }
        self.bytes += line.len();
        self.lines.push(line);

        if self.lines.len() >= self.max_lines || self.bytes >= self.max_bytes {
            self.flush()
        } else {
            None
        }
    }

    /// Flush if the oldest pending line has waited `flush_interval`.
    pub fn maybe_flush_by_time(&mut self) -> Option<Chunk> {
        match self.started {
            Some((started, _)) if started.elapsed() >= self.flush_interval => self.flush(),
            _ => None,
        }
    }

    /// Take whatever is pending.
    pub fn flush(&mut self) -> Option<Chunk> {
        let (_, created_at) = self.started.take()?;
        let bytes = std::mem::take(&mut self.bytes);
        Some(Chunk {
            lines: std::mem::take(&mut self.lines),
            bytes,
            created_at,
        })
    }

    pub fn pending_lines(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(max_lines: usize, max_bytes: usize) -> AggregatorSettings {
        AggregatorSettings {
            max_lines,
            max_bytes,
            flush_interval_ms: 500,
            max_line_bytes: 16,
        }
    }

    #[test]
    fn test_flushes_exactly_at_max_lines() {
        let mut agg = ChunkAggregator::new(&settings(3, 10_000));
        assert!(agg.add_line("one").is_none());
        assert!(agg.add_line("two").is_none());
        let chunk = agg.add_line("three").unwrap();
        assert_eq!(chunk.lines, vec!["one", "two", "three"]);
        assert_eq!(chunk.bytes, 11);
        assert!(agg.is_empty());
        assert!(agg.flush().is_none());
    }

    #[test]
    fn test_flushes_on_bytes() {
        let mut agg = ChunkAggregator::new(&settings(100, 10));
        assert!(agg.add_line("12345").is_none());
        let chunk = agg.add_line("67890").unwrap();
        assert_eq!(chunk.bytes, 10);
    }

    #[test]
    fn test_truncates_on_char_boundary() {
        let mut agg = ChunkAggregator::new(&settings(1, 10_000));
        // 15 ASCII bytes then a 3-byte char straddling the 16-byte cap
        let chunk = agg.add_line("aaaaaaaaaaaaaaa€tail").unwrap();
        assert_eq!(chunk.lines[0], "aaaaaaaaaaaaaaa");
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_flush() {
        let mut agg = ChunkAggregator::new(&settings(100, 10_000));
        assert!(agg.maybe_flush_by_time().is_none());

        agg.add_line("slow");
        tokio::time::advance(Duration::from_millis(499)).await;
        assert!(agg.maybe_flush_by_time().is_none());

        tokio::time::advance(Duration::from_millis(1)).await;
        let chunk = agg.maybe_flush_by_time().unwrap();
        assert_eq!(chunk.lines, vec!["slow"]);
        assert!(agg.maybe_flush_by_time().is_none());
    }
}
