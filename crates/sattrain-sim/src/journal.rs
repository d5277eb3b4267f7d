//! Journaled session store.
//!
//! Wraps `MemoryStore` and appends every accepted mutation to an hourly
//! JSONL journal on a dedicated writer thread:
//!
//! ```text
//!   actor ──► JournalStore ──► MemoryStore (authoritative)
//!                   │
//!                   └── try_send ──► [bounded channel] ──► writer thread
//!                                                          journal_YYYYMMDDHH.jsonl
//! ```
//!
//! The journal is best-effort. A full queue drops the line with a warning;
//! it never blocks a session.

use crate::core::{CommandRecord, SessionId, SessionSeed, SessionSnapshot};
use crate::error::SimResult;
use crate::store::{MemoryStore, SessionStore};
use async_trait::async_trait;
use chrono::Utc;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use tracing::{error, info, warn};

const WRITE_BUFFER: usize = 128 * 1024;

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum JournalEntry<'a> {
    Registered {
        session_id: &'a str,
        seed: &'a SessionSeed,
    },
    Command {
        session_id: &'a str,
        record: &'a CommandRecord,
    },
    Snapshot {
        session_id: &'a str,
        snapshot: &'a SessionSnapshot,
    },
}

struct JournalWriter {
    tx: Sender<String>,
    handle: thread::JoinHandle<()>,
}

pub struct JournalStore {
    inner: MemoryStore,
    writer: Mutex<Option<JournalWriter>>,
}

impl JournalStore {
    /// Create the journal directory and start the writer thread.
    pub fn open(dir: impl AsRef<Path>, capacity: usize) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let (tx, rx) = bounded::<String>(capacity.max(1));
        let handle = thread::Builder::new()
            .name("sattrain-journal".into())
            .spawn(move || run_writer(dir, rx))?;

        Ok(Self {
            inner: MemoryStore::new(),
            writer: Mutex::new(Some(JournalWriter { tx, handle })),
        })
    }

    /// Flush and stop the writer. Later mutations still hit memory.
    pub fn close(&self) {
        let writer = self.writer.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(JournalWriter { tx, handle }) = writer {
            drop(tx);
            if handle.join().is_err() {
                error!("journal writer panicked");
            }
        }
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.inner
    }

    fn append(&self, entry: JournalEntry<'_>) {
        let line = match serde_json::to_string(&entry) {
            Ok(mut line) => {
                line.push('\n');
                line
            }
            Err(e) => {
                warn!(error = %e, "unserializable journal entry");
                return;
            }
        };

        let writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let Some(writer) = writer.as_ref() else {
            return;
        };
        match writer.tx.try_send(line) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("journal queue full, dropping entry"),
            Err(TrySendError::Disconnected(_)) => warn!("journal writer gone"),
        }
    }
}

impl Drop for JournalStore {
    fn drop(&mut self) {
        self.close();
    }
}

fn journal_path(dir: &Path, hour: &str) -> PathBuf {
    dir.join(format!("journal_{hour}.jsonl"))
}

fn open_journal(dir: &Path, hour: &str) -> Option<BufWriter<File>> {
    let path = journal_path(dir, hour);
    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => Some(BufWriter::with_capacity(WRITE_BUFFER, file)),
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to open journal");
            None
        }
    }
}

fn run_writer(dir: PathBuf, rx: Receiver<String>) {
    let mut current_hour = Utc::now().format("%Y%m%d%H").to_string();
    let mut buffer = open_journal(&dir, &current_hour);

    info!(dir = %dir.display(), "journal writer active");

    while let Ok(line) = rx.recv() {
        let now_hour = Utc::now().format("%Y%m%d%H").to_string();
        if now_hour != current_hour || buffer.is_none() {
            if let Some(b) = buffer.as_mut() {
                let _ = b.flush();
            }
            current_hour = now_hour;
            buffer = open_journal(&dir, &current_hour);
        }

        if let Some(b) = buffer.as_mut() {
            if let Err(e) = b.write_all(line.as_bytes()) {
                warn!(error = %e, "journal write failed");
            }
        }
    }

    if let Some(b) = buffer.as_mut() {
        let _ = b.flush();
    }
    info!("journal writer stopped");
}

#[async_trait]
impl SessionStore for JournalStore {
    async fn register_session(&self, seed: SessionSeed) -> SimResult<()> {
        self.inner.register_session(seed.clone()).await?;
        self.append(JournalEntry::Registered {
            session_id: &seed.session_id,
            seed: &seed,
        });
        Ok(())
    }

    async fn load_session(&self, session_id: &SessionId) -> SimResult<SessionSeed> {
        self.inner.load_session(session_id).await
    }

    async fn append_command(&self, session_id: &SessionId, record: CommandRecord) -> SimResult<()> {
        self.append(JournalEntry::Command {
            session_id,
            record: &record,
        });
        self.inner.append_command(session_id, record).await
    }

    async fn save_snapshot(&self, session_id: &SessionId, snapshot: &SessionSnapshot) -> SimResult<()> {
        self.inner.save_snapshot(session_id, snapshot).await?;
        self.append(JournalEntry::Snapshot {
            session_id,
            snapshot,
        });
        Ok(())
    }

    async fn load_snapshot(&self, session_id: &SessionId) -> SimResult<Option<SessionSnapshot>> {
        self.inner.load_snapshot(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{seed, snapshot};

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("sattrain-journal-{}", uuid::Uuid::new_v4()))
    }

    fn read_lines(dir: &Path) -> Vec<serde_json::Value> {
        let mut lines = Vec::new();
        for entry in std::fs::read_dir(dir).unwrap() {
            let text = std::fs::read_to_string(entry.unwrap().path()).unwrap();
            for line in text.lines() {
                lines.push(serde_json::from_str(line).unwrap());
            }
        }
        lines
    }

    #[tokio::test]
    async fn test_mutations_are_journaled() {
        let dir = temp_dir();
        let store = JournalStore::open(&dir, 64).unwrap();
        let id = "s-1".to_string();

        store.register_session(seed("s-1")).await.unwrap();
        store.save_snapshot(&id, &snapshot("s-1", 2)).await.unwrap();
        // Rejected writes never reach the journal.
        assert!(store.save_snapshot(&id, &snapshot("s-1", 1)).await.is_err());
        store.close();

        let lines = read_lines(&dir);
        let types: Vec<_> = lines.iter().map(|l| l["type"].as_str().unwrap().to_string()).collect();
        assert_eq!(types, vec!["registered", "snapshot"]);
        assert_eq!(lines[1]["snapshot"]["version"], 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_memory_survives() {
        let dir = temp_dir();
        let store = JournalStore::open(&dir, 4).unwrap();
        store.close();
        store.close();

        store.register_session(seed("s-2")).await.unwrap();
        assert_eq!(store.memory().len().await, 1);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
