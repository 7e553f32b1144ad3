//! Append-only event sinks.
//!
//! A sink accepts formatted rows on named channels and never gives them
//! back to the simulator. Failures to persist a row are logged and
//! swallowed: analysis output must never change the run.

use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use tracing::{debug, warn};

pub trait MetricsSink: Send + Sync {
    fn record(&self, channel: &str, entry: String);

    /// Pushes buffered rows to their destination.
    fn flush(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn record(&self, _channel: &str, _entry: String) {}
}

/// Keeps every row in memory, per channel, in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    channels: Mutex<BTreeMap<String, Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows recorded on `channel`, oldest first.
    pub fn entries(&self, channel: &str) -> Vec<String> {
        lock(&self.channels).get(channel).cloned().unwrap_or_default()
    }

    /// Names of every channel written so far, sorted.
    pub fn channels(&self) -> Vec<String> {
        lock(&self.channels).keys().cloned().collect()
    }

    pub fn total_entries(&self) -> usize {
        lock(&self.channels).values().map(Vec::len).sum()
    }
}

impl MetricsSink for MemorySink {
    fn record(&self, channel: &str, entry: String) {
        lock(&self.channels)
            .entry(channel.to_string())
            .or_default()
            .push(entry);
    }
}

/// Appends each channel to `<dir>/<channel>.txt`.
///
/// Files are truncated the first time a channel is written during the
/// lifetime of the sink, so one run never mixes with the previous one.
#[derive(Debug)]
pub struct FileSink {
    dir: PathBuf,
    files: Mutex<HashMap<String, BufWriter<File>>>,
}

impl FileSink {
    /// Creates `dir` if needed and returns a sink writing into it.
    pub fn create(dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating results dir {}", dir.display()))?;
        debug!(dir = %dir.display(), "file sink ready");
        Ok(Self {
            dir: dir.to_path_buf(),
            files: Mutex::new(HashMap::new()),
        })
    }

    /// File that holds `channel`.
    pub fn path_for(&self, channel: &str) -> PathBuf {
        self.dir.join(format!("{channel}.txt"))
    }

    fn open(&self, channel: &str) -> std::io::Result<BufWriter<File>> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.path_for(channel))?;
        Ok(BufWriter::new(file))
    }
}

impl MetricsSink for FileSink {
    fn record(&self, channel: &str, entry: String) {
        let mut files = lock(&self.files);
        if !files.contains_key(channel) {
            match self.open(channel) {
                Ok(writer) => {
                    files.insert(channel.to_string(), writer);
                }
                Err(e) => {
                    warn!(channel, error = %e, "cannot open metrics file, dropping row");
                    return;
                }
            }
        }
        let Some(writer) = files.get_mut(channel) else {
            return;
        };
        if let Err(e) = writer.write_all(entry.as_bytes()) {
            warn!(channel, error = %e, "failed to append metrics row");
        }
    }

    fn flush(&self) -> anyhow::Result<()> {
        for (channel, writer) in lock(&self.files).iter_mut() {
            writer
                .flush()
                .with_context(|| format!("flushing metrics channel {channel}"))?;
        }
        Ok(())
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if let Err(e) = MetricsSink::flush(self) {
            warn!(error = %e, "metrics flush on drop failed");
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
