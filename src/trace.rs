//! Audit trail of workflow actions, one JSON object per line.
//!
//! Records are handed to a writer thread over a channel so a slow disk never holds the
//! session lock. Each line is flushed as soon as it is written, so the log is complete up
//! to the last action even if the process dies.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::engine::{Stage, StageEvent};

#[derive(Debug, Clone, Serialize)]
pub struct ActionTrace {
    pub timestamp_ms: i64,
    /// `SessionKey` display form.
    pub session: String,
    pub action: String,
    pub stage_before: Stage,
    pub stage_after: Stage,
    pub event: Option<StageEvent>,
    pub saved: bool,
    pub error: Option<String>,
}

impl ActionTrace {
    /// A record stamped with the current wall-clock time.
    pub fn now(session: String, action: &str, stage_before: Stage, stage_after: Stage) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        Self {
            timestamp_ms,
            session,
            action: action.to_string(),
            stage_before,
            stage_after,
            event: None,
            saved: false,
            error: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("cannot write action log: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot encode action record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("action log writer has stopped")]
    Closed,
    #[error("action log writer panicked")]
    WriterPanicked,
}

pub trait TraceSink: Send + Sync {
    fn record(&self, event: ActionTrace) -> Result<(), TraceError>;
}

/// Appends `ActionTrace` rows to a JSONL file.
#[derive(Clone)]
pub struct JsonlTraceSink {
    path: PathBuf,
    sender: mpsc::Sender<ActionTrace>,
}

/// Handle on the writer thread. Join it after every sink clone has been dropped.
pub struct TraceWorker {
    handle: JoinHandle<Result<usize, TraceError>>,
}

impl TraceWorker {
    /// Wait for the writer to drain; returns the number of lines written.
    pub fn join(self) -> Result<usize, TraceError> {
        self.handle.join().map_err(|_| TraceError::WriterPanicked)?
    }
}

impl JsonlTraceSink {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, TraceWorker), TraceError> {
        let path = path.as_ref().to_path_buf();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        let (sender, handle) = spawn_line_writer(file);
        Ok((Self { path, sender }, TraceWorker { handle }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TraceSink for JsonlTraceSink {
    fn record(&self, event: ActionTrace) -> Result<(), TraceError> {
        self.sender.send(event).map_err(|_| TraceError::Closed)
    }
}

fn spawn_line_writer<T>(file: File) -> (mpsc::Sender<T>, JoinHandle<Result<usize, TraceError>>)
where
    T: Serialize + Send + 'static,
{
    let (sender, receiver) = mpsc::channel::<T>();
    let handle = std::thread::spawn(move || -> Result<usize, TraceError> {
        let mut out = BufWriter::new(file);
        let mut written = 0usize;
        for record in receiver {
            serde_json::to_writer(&mut out, &record)?;
            out.write_all(b"\n")?;
            out.flush()?;
            written += 1;
        }
        Ok(written)
    });
    (sender, handle)
}
