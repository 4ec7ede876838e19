//! Follows a log file across rotation and truncation.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use deckhand_core::config::TailerSettings;
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Counters reported when a tailer exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TailerReport {
    pub lines_read: u64,
    pub reopen_count: u64,
}

/// Identity of the file behind a path.
#[cfg(unix)]
fn file_id(meta: &std::fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.ino())
}

#[cfg(not(unix))]
fn file_id(_meta: &std::fs::Metadata) -> Option<u64> {
    None
}

struct OpenFile {
    reader: BufReader<File>,
    position: u64,
    inode: Option<u64>,
}

/// Where reading starts after an open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartAt {
    Beginning,
    End,
    /// Continue a handle that failed mid-read, if the path still names the
    /// same file and it has not shrunk
    Resume { inode: Option<u64>, position: u64 },
}

impl StartAt {
    /// Offset to seek to in a file with identity `inode` and length `len`.
    fn offset(self, inode: Option<u64>, len: u64) -> u64 {
        match self {
            StartAt::Beginning => 0,
            StartAt::End => len,
            StartAt::Resume { inode: previous, position } => {
                if previous == inode && len >= position {
                    position
                } else {
                    0
                }
            }
        }
    }
}

/// Why a read pass ended.
enum ReadStatus {
    /// Reached EOF after this many complete lines
    Eof(u64),
    /// The receiving side is gone
    Closed,
}

/// Tails one file, pushing complete lines into a bounded channel.
///
/// A full channel blocks the tailer, so a slow consumer throttles reading
/// instead of growing memory.
pub struct FileTailer {
    path: PathBuf,
    settings: TailerSettings,
    stop: Arc<AtomicBool>,
    partial: Vec<u8>,
    report: TailerReport,
}

impl FileTailer {
    pub fn new(path: impl Into<PathBuf>, settings: TailerSettings) -> Self {
        Self {
            path: path.into(),
            settings,
            stop: Arc::new(AtomicBool::new(false)),
            partial: Vec::new(),
            report: TailerReport::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flag observed at every poll boundary; setting it ends `run`.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    async fn open(&self, start: StartAt) -> std::io::Result<OpenFile> {
        let mut file = File::open(&self.path).await?;
        let meta = file.metadata().await?;
        let inode = file_id(&meta);
        let position = match start.offset(inode, meta.len()) {
            0 => 0,
            offset => file.seek(SeekFrom::Start(offset)).await?,
        };
        Ok(OpenFile {
            reader: BufReader::new(file),
            position,
            inode,
        })
    }

    /// Read every complete line currently available.
    async fn read_available(
        &mut self,
        open: &mut OpenFile,
        tx: &mpsc::Sender<String>,
    ) -> std::io::Result<ReadStatus> {
        let mut lines = 0;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = open.reader.read_until(b'\n', &mut buf).await?;
            if n == 0 {
                return Ok(ReadStatus::Eof(lines));
            }
            open.position += n as u64;
            self.partial.extend_from_slice(&buf);
            if !self.partial.ends_with(b"\n") {
                // Wait for the rest of the line
                continue;
            }
            if !self.emit_partial(tx).await {
                return Ok(ReadStatus::Closed);
            }
            lines += 1;
        }
    }

    /// Send the buffered line, if any. Returns false once the receiver is gone.
    async fn emit_partial(&mut self, tx: &mpsc::Sender<String>) -> bool {
        if self.partial.is_empty() {
            return true;
        }
        let mut bytes = std::mem::take(&mut self.partial);
        if bytes.ends_with(b"\n") {
            bytes.pop();
        }
        if bytes.ends_with(b"\r") {
            bytes.pop();
        }
        let line = String::from_utf8_lossy(&bytes).into_owned();
        if tx.send(line).await.is_err() {
            return false;
        }
        self.report.lines_read += 1;
        true
    }

    /// Whether the path now names a different or shorter file than `open`.
    async fn replaced(&self, open: &OpenFile) -> Option<&'static str> {
        let meta = fs::metadata(&self.path).await.ok()?;
        if file_id(&meta) != open.inode {
            Some("rotated")
        } else if meta.len() < open.position {
            Some("truncated")
        } else {
            None
        }
    }

    /// Tail until stopped or the receiver is dropped.
    pub async fn run(mut self, tx: mpsc::Sender<String>) -> TailerReport {
        let poll = Duration::from_millis(self.settings.poll_interval_ms.max(1));
        let max_backoff = Duration::from_millis(self.settings.max_backoff_ms).max(poll);
        let mut backoff = poll;
        let mut start = if self.settings.from_end {
            StartAt::End
        } else {
            StartAt::Beginning
        };
        let mut current: Option<OpenFile> = None;

        info!(path = %self.path.display(), from_end = self.settings.from_end, "Starting tailer");

        while !self.stopped() {
            if current.is_none() {
                match self.open(start).await {
                    Ok(file) => {
                        debug!(path = %self.path.display(), position = file.position, "Opened log file");
                        current = Some(file);
                        backoff = poll;
                    }
                    Err(e) => {
                        debug!(
                            path = %self.path.display(),
                            error = %e,
                            backoff_ms = backoff.as_millis() as u64,
                            "Log file unavailable, backing off"
                        );
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(max_backoff);
                    }
                }
                // A file that appears later is read from its start
                start = StartAt::Beginning;
                continue;
            }
            let Some(open) = current.as_mut() else {
                continue;
            };

            let status = match self.read_available(open, &tx).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Read failed, reopening");
                    start = StartAt::Resume {
                        inode: open.inode,
                        position: open.position,
                    };
                    current = None;
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(max_backoff);
                    continue;
                }
            };
            let lines = match status {
                ReadStatus::Eof(lines) => lines,
                ReadStatus::Closed => break,
            };

            if let Some(reason) = self.replaced(open).await {
                // Everything the old handle could still read was drained above
                if !self.emit_partial(&tx).await {
                    break;
                }
                info!(path = %self.path.display(), reason, "Log file replaced, reopening");
                self.report.reopen_count += 1;
                current = None;
                continue;
            }

            if lines == 0 {
                tokio::time::sleep(poll).await;
            }
        }

        // An unterminated last line goes out with the final flush
        self.emit_partial(&tx).await;

        info!(
            path = %self.path.display(),
            lines_read = self.report.lines_read,
            reopen_count = self.report.reopen_count,
            "Tailer stopped"
        );
        self.report
    }
}
