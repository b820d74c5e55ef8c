//! Durable scan checkpoint stored as a single JSON record

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::StoreError;

/// File name of the progress record inside the data directory
pub const PROGRESS_FILE: &str = "progress.json";

/// Last checkpoint written by the scan loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Highest block height the scan has moved past
    pub last_processed_block: u64,
    /// Unix seconds of the last save, 0 for a record that was never saved
    pub last_update_time: u64,
    /// Address lines written since the record was created
    pub total_addresses_seen: u64,
    /// Balance lines written since the record was created
    pub addresses_with_balance: u64,
    /// Batch receiving appends at the time of the save
    pub active_batch_index: u64,
}

impl Default for ProgressRecord {
    fn default() -> Self {
        Self {
            last_processed_block: 0,
            last_update_time: 0,
            total_addresses_seen: 0,
            addresses_with_balance: 0,
            active_batch_index: 1,
        }
    }
}

impl ProgressRecord {
    /// Whether this record has never been written to disk
    pub fn is_fresh(&self) -> bool {
        self.last_update_time == 0
    }

    /// Height a new scan should begin at
    pub fn next_block(&self, start_block: u64) -> u64 {
        if self.is_fresh() {
            start_block
        } else {
            self.last_processed_block.saturating_add(1).max(start_block)
        }
    }
}

/// Single-record store for [`ProgressRecord`]
#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    /// Store keeping its record at `<data_dir>/progress.json`
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            path: data_dir.as_ref().join(PROGRESS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the record, falling back to the default when it is missing or corrupt
    pub fn load(&self) -> ProgressRecord {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No progress record at {}, starting fresh", self.path.display());
                return ProgressRecord::default();
            }
            Err(e) => {
                warn!("Failed to read progress record {}: {}", self.path.display(), e);
                return ProgressRecord::default();
            }
        };

        match serde_json::from_slice::<ProgressRecord>(&bytes) {
            Ok(mut record) => {
                if record.active_batch_index == 0 {
                    record.active_batch_index = 1;
                }
                record
            }
            Err(e) => {
                warn!("Ignoring corrupt progress record {}: {}", self.path.display(), e);
                ProgressRecord::default()
            }
        }
    }

    /// Overwrite the record atomically (temp file in the same directory, then rename)
    pub fn save(&self, record: &ProgressRecord) -> Result<(), StoreError> {
        write_atomic(&self.path, &serde_json::to_vec_pretty(record)?)
    }
}

/// Replace `path` with `contents` so readers see either the old or the new file
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
    tmp.write_all(contents)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| StoreError::io(path, e.error))?;
    Ok(())
}
