// Audit Sink - bounded-queue async writer for the append-only audit log
//
// Many producers, one writer task. `submit` never blocks the scoring
// path: a full queue drops the entry with an error the caller logs.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

use super::AuditEntry;

/// Default bound on entries waiting for the writer
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

const WRITE_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit log buffer full")]
    BufferFull,

    #[error("audit logger is closed")]
    Closed,

    #[error("audit log i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct AuditLogger {
    tx: Mutex<Option<mpsc::Sender<AuditEntry>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl AuditLogger {
    /// Open `path` append-only (created 0600 if missing) and start the
    /// writer task.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        Self::with_capacity(path, DEFAULT_QUEUE_CAPACITY).await
    }

    pub async fn with_capacity(
        path: impl AsRef<Path>,
        capacity: usize,
    ) -> Result<Self, AuditError> {
        let mut options = OpenOptions::new();
        options.append(true).create(true);
        #[cfg(unix)]
        options.mode(0o600);
        let file = options.open(path.as_ref()).await?;

        let (tx, rx) = mpsc::channel(capacity);
        let writer = tokio::spawn(write_loop(
            BufWriter::with_capacity(WRITE_BUFFER_SIZE, file),
            rx,
        ));

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
        })
    }

    /// Hand an entry to the writer without blocking. Entries without an
    /// event id or timestamp are stamped here, before enqueue.
    pub fn submit(&self, mut entry: AuditEntry) -> Result<(), AuditError> {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let tx = guard.as_ref().ok_or(AuditError::Closed)?;

        if entry.event_id.is_nil() {
            entry.event_id = Uuid::new_v4();
        }
        if entry.event_time.is_none() {
            entry.event_time = Some(Utc::now());
        }

        match tx.try_send(entry) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(AuditError::BufferFull),
            Err(TrySendError::Closed(_)) => Err(AuditError::Closed),
        }
    }

    /// Stop accepting entries, wait for the writer to drain and flush,
    /// and close the file. Safe to call more than once.
    pub async fn close(&self) {
        let tx = self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        drop(tx);

        let writer = self.writer.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(writer) = writer {
            if let Err(err) = writer.await {
                warn!(error = %err, "audit writer task ended abnormally");
            }
        }
    }
}

/// The single task writing the audit file. Entries are written in
/// enqueue order, one JSON record per line, flushed per record.
async fn write_loop(mut out: BufWriter<File>, mut rx: mpsc::Receiver<AuditEntry>) {
    while let Some(entry) = rx.recv().await {
        let record = match serde_json::to_vec(&entry) {
            Ok(record) => record,
            // A non-serializable entry is skipped; audit never takes
            // the application down.
            Err(_) => continue,
        };

        if let Err(err) = write_record(&mut out, &record).await {
            warn!(error = %err, "failed to write audit record");
        }
    }

    if let Err(err) = out.shutdown().await {
        warn!(error = %err, "failed to flush audit log on close");
    }
}

async fn write_record(out: &mut BufWriter<File>, record: &[u8]) -> std::io::Result<()> {
    out.write_all(record).await?;
    out.write_all(b"\n").await?;
    out.flush().await
}
