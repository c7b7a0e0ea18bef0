//! Append-only transaction log backends

use crate::errors::StoreError;
use crate::ledger::Transaction;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{error, warn};

/// Durable home of ledger transactions. Balances are a projection of
/// whatever `load_all` returns, in order.
pub trait TransactionStore: Send + Sync {
    /// Persist one transaction. The ledger applies nothing until this returns Ok.
    fn append(&self, tx: &Transaction) -> Result<(), StoreError>;

    /// Every transaction ever appended, in append order
    fn load_all(&self) -> Result<Vec<Transaction>, StoreError>;
}

/// Process-local log. Lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<Vec<Transaction>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TransactionStore for MemoryStore {
    fn append(&self, tx: &Transaction) -> Result<(), StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::WriteFailed("memory log lock poisoned".to_string()))?
            .push(tx.clone());
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<Transaction>, StoreError> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .map_err(|_| StoreError::ReadFailed("memory log lock poisoned".to_string()))
    }
}

/// Byte sink behind a `JsonLinesStore`
pub trait LogFile: Read + Write + Seek + Send {
    /// Flush written bytes to durable storage
    fn sync(&mut self) -> io::Result<()>;

    /// Cut the log back to `len` bytes
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// One JSON document per line, appended and never rewritten.
///
/// A failed append is rolled back to the previous end of the log. If the
/// rollback itself fails the store refuses further appends, since the tail
/// may hold a line the ledger never applied.
pub struct JsonLinesStore<F = File> {
    path: PathBuf,
    file: Mutex<F>,
    sync_writes: bool,
    failed: AtomicBool,
}

impl JsonLinesStore<File> {
    pub fn open<P: AsRef<Path>>(path: P, sync_writes: bool) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::OpenFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::OpenFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self::with_file(path, file, sync_writes))
    }
}

impl<F: LogFile> JsonLinesStore<F> {
    pub fn with_file<P: AsRef<Path>>(path: P, file: F, sync_writes: bool) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: Mutex::new(file),
            sync_writes,
            failed: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&self, file: &mut F, line: &[u8]) -> io::Result<()> {
        file.write_all(line)?;
        file.flush()?;
        if self.sync_writes {
            file.sync()?;
        }
        Ok(())
    }
}

impl<F: LogFile> TransactionStore for JsonLinesStore<F> {
    fn append(&self, tx: &Transaction) -> Result<(), StoreError> {
        if self.failed.load(Ordering::Acquire) {
            return Err(StoreError::WriteFailed(format!(
                "transaction log {} needs recovery after a failed rollback",
                self.path.display()
            )));
        }

        let mut line = serde_json::to_string(tx).map_err(|e| {
            StoreError::WriteFailed(format!("Failed to encode transaction {}: {}", tx.id, e))
        })?;
        line.push('\n');

        let mut file = self
            .file
            .lock()
            .map_err(|_| StoreError::WriteFailed("log file lock poisoned".to_string()))?;
        let end = file.seek(SeekFrom::End(0))?;

        if let Err(e) = self.write_line(&mut file, line.as_bytes()) {
            let rollback = file.truncate(end).and_then(|_| {
                if self.sync_writes {
                    file.sync()
                } else {
                    Ok(())
                }
            });
            match rollback {
                Ok(()) => warn!(tx_id = %tx.id, "Append failed, log rolled back: {}", e),
                Err(rollback_err) => {
                    self.failed.store(true, Ordering::Release);
                    error!(
                        tx_id = %tx.id,
                        path = %self.path.display(),
                        "Append failed and rollback failed, refusing further writes: {} / {}",
                        e,
                        rollback_err
                    );
                }
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<Transaction>, StoreError> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| StoreError::ReadFailed("log file lock poisoned".to_string()))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| StoreError::ReadFailed(e.to_string()))?;

        let mut transactions = Vec::new();
        for (index, line) in BufReader::new(&mut *file).lines().enumerate() {
            let line = line.map_err(|e| StoreError::ReadFailed(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let tx: Transaction = serde_json::from_str(&line).map_err(|e| StoreError::Corrupted {
                line: index + 1,
                reason: e.to_string(),
            })?;
            transactions.push(tx);
        }

        Ok(transactions)
    }
}
