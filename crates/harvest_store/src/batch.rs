//! Numbered batch file pairs and the manifest that tracks them
//!
//! Every batch `N` owns two append-only logs in the data directory:
//! `addresses_N.txt` and `addresses_with_balance_N.txt`. Exactly one batch
//! is active and receives appends; older batches are only read or deleted.
//! Known indices and the active index live in `batches.json`, which is
//! rebuilt from file names when missing.

use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::progress::write_atomic;
use crate::{Balance, StoreError};

/// File name of the batch manifest inside the data directory
pub const MANIFEST_FILE: &str = "batches.json";

const ADDRESS_PREFIX: &str = "addresses_";
const BALANCE_PREFIX: &str = "addresses_with_balance_";
const LOG_SUFFIX: &str = ".txt";

/// Persisted list of known batches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct BatchManifest {
    active_index: u64,
    known: BTreeSet<u64>,
}

/// Line counts of one batch pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchInfo {
    pub index: u64,
    pub address_count: usize,
    pub balance_count: usize,
}

/// Paths and contents of one batch pair, for download
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFiles {
    pub index: u64,
    pub address_file: String,
    pub balance_file: String,
    pub addresses: String,
    pub balances: String,
}

/// Manager for the batch file pairs in one data directory
pub struct BatchStore {
    data_dir: PathBuf,
    unit: String,
    manifest: Mutex<BatchManifest>,
}

impl BatchStore {
    /// Open the batch directory, recovering the manifest and creating the active pair
    pub fn open<P: AsRef<Path>>(data_dir: P, unit: impl Into<String>) -> Result<Self, StoreError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir).map_err(|e| StoreError::io(&data_dir, e))?;

        let store = Self {
            data_dir,
            unit: unit.into(),
            manifest: Mutex::new(BatchManifest::default()),
        };

        let manifest = match store.read_manifest() {
            Some(mut manifest) => {
                if manifest.active_index == 0 {
                    manifest.active_index = manifest.known.last().copied().unwrap_or(1);
                }
                manifest.known.insert(manifest.active_index);
                manifest
            }
            None => {
                let known = store.scan_indices()?;
                let active_index = known.last().copied().unwrap_or(1);
                info!(
                    "Rebuilt batch manifest from {} file pair(s), active batch {}",
                    known.len(),
                    active_index
                );
                let mut manifest = BatchManifest { active_index, known };
                manifest.known.insert(active_index);
                manifest
            }
        };
        store.write_manifest(&manifest)?;
        *store.manifest.lock() = manifest;

        store.ensure_active_files()?;
        Ok(store)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Currency unit written after balance amounts
    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn active_index(&self) -> u64 {
        self.manifest.lock().active_index
    }

    pub fn address_path(&self, index: u64) -> PathBuf {
        self.data_dir.join(format!("{ADDRESS_PREFIX}{index}{LOG_SUFFIX}"))
    }

    pub fn balance_path(&self, index: u64) -> PathBuf {
        self.data_dir.join(format!("{BALANCE_PREFIX}{index}{LOG_SUFFIX}"))
    }

    /// Highest batch index found among the address logs on disk, or 1
    pub fn discover_highest_index(&self) -> u64 {
        match self.scan_indices() {
            Ok(indices) => indices.last().copied().unwrap_or(1),
            Err(e) => {
                warn!("Error getting file index: {}", e);
                1
            }
        }
    }

    /// Create the active pair if either log is missing, keeping existing content
    pub fn ensure_active_files(&self) -> Result<(), StoreError> {
        let index = self.active_index();
        for path in [self.address_path(index), self.balance_path(index)] {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| StoreError::io(&path, e))?;
        }
        Ok(())
    }

    /// Start a new empty batch and make it active; returns its index
    pub fn rotate(&self) -> Result<u64, StoreError> {
        let mut manifest = self.manifest.lock();
        self.rotate_locked(&mut manifest)
    }

    /// Read the active batch and rotate in one step, so no append lands in
    /// between; an active batch with no addresses yet is not claimable
    pub fn claim_active(&self) -> Result<(BatchFiles, u64), StoreError> {
        let mut manifest = self.manifest.lock();
        let files = self.batch_files(manifest.active_index)?;
        if files.addresses.is_empty() {
            return Err(StoreError::EmptyBatch(files.index));
        }
        let new_index = self.rotate_locked(&mut manifest)?;
        Ok((files, new_index))
    }

    fn rotate_locked(&self, manifest: &mut BatchManifest) -> Result<u64, StoreError> {
        let highest = manifest.known.last().copied().unwrap_or(0);
        let new_index = manifest.active_index.max(highest) + 1;

        for path in [self.address_path(new_index), self.balance_path(new_index)] {
            std::fs::File::create(&path).map_err(|e| StoreError::io(&path, e))?;
        }

        let mut next = manifest.clone();
        next.known.insert(new_index);
        next.active_index = new_index;
        self.write_manifest(&next)?;
        *manifest = next;

        info!("Created new file pair: {}", new_index);
        Ok(new_index)
    }

    /// Every known batch with both logs present, ascending by index
    pub fn list_batches(&self) -> Result<Vec<BatchInfo>, StoreError> {
        let known = self.manifest.lock().known.clone();
        let mut batches = Vec::with_capacity(known.len());

        for index in known {
            let address_path = self.address_path(index);
            let balance_path = self.balance_path(index);
            if !address_path.exists() || !balance_path.exists() {
                debug!("Skipping incomplete batch {}", index);
                continue;
            }
            batches.push(BatchInfo {
                index,
                address_count: count_lines(&address_path)?,
                balance_count: count_lines(&balance_path)?,
            });
        }

        Ok(batches)
    }

    /// Remove both logs of a batch; `Ok(false)` when nothing was there
    pub fn delete(&self, index: u64) -> Result<bool, StoreError> {
        let mut manifest = self.manifest.lock();
        if index == manifest.active_index {
            return Err(StoreError::ActiveBatch(index));
        }

        let mut removed = false;
        for path in [self.address_path(index), self.balance_path(index)] {
            match std::fs::remove_file(&path) {
                Ok(()) => removed = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io(&path, e)),
            }
        }

        if manifest.known.contains(&index) {
            let mut next = manifest.clone();
            next.known.remove(&index);
            self.write_manifest(&next)?;
            *manifest = next;
        }

        if removed {
            info!("Deleted file pair: {}", index);
        }
        Ok(removed)
    }

    /// Keep the `keep_count` newest batches and delete the rest; returns deletions
    pub fn cleanup(&self, keep_count: usize) -> Result<usize, StoreError> {
        let batches = self.list_batches()?;
        if batches.len() <= keep_count {
            return Ok(0);
        }

        let active = self.active_index();
        let stale = &batches[..batches.len() - keep_count];
        let mut deleted = 0;
        for batch in stale.iter().filter(|b| b.index != active) {
            if self.delete(batch.index)? {
                deleted += 1;
            }
        }

        info!("Cleaned up {} old file pairs", deleted);
        Ok(deleted)
    }

    /// Append one address line to the active batch
    pub fn append_address(&self, address: &str) -> Result<(), StoreError> {
        let manifest = self.manifest.lock();
        append_line(&self.address_path(manifest.active_index), address)
    }

    /// Append one `<address> - <amount> <unit>` line to the active batch
    pub fn append_balance(&self, address: &str, balance: Balance) -> Result<(), StoreError> {
        let manifest = self.manifest.lock();
        append_line(
            &self.balance_path(manifest.active_index),
            &self.balance_line(address, balance),
        )
    }

    /// Append an address and, when given, its balance line to the same batch.
    ///
    /// Both writes happen under one manifest lock, so a concurrent rotation
    /// lands either before or after the pair. Returns the batch written to.
    pub fn append_record(
        &self,
        address: &str,
        balance: Option<Balance>,
    ) -> Result<u64, StoreError> {
        let manifest = self.manifest.lock();
        let index = manifest.active_index;
        append_line(&self.address_path(index), address)?;
        if let Some(balance) = balance {
            append_line(&self.balance_path(index), &self.balance_line(address, balance))?;
        }
        Ok(index)
    }

    fn balance_line(&self, address: &str, balance: Balance) -> String {
        format!("{} - {} {}", address, balance, self.unit)
    }

    /// Read both logs of a batch; the balance log may be absent
    pub fn batch_files(&self, index: u64) -> Result<BatchFiles, StoreError> {
        let address_path = self.address_path(index);
        let addresses = match std::fs::read_to_string(&address_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::BatchNotFound(index));
            }
            Err(e) => return Err(StoreError::io(&address_path, e)),
        };

        let balance_path = self.balance_path(index);
        let balances = match std::fs::read_to_string(&balance_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(StoreError::io(&balance_path, e)),
        };

        Ok(BatchFiles {
            index,
            address_file: file_name(&address_path),
            balance_file: file_name(&balance_path),
            addresses,
            balances,
        })
    }

    fn read_manifest(&self) -> Option<BatchManifest> {
        let path = self.data_dir.join(MANIFEST_FILE);
        let bytes = std::fs::read(&path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!("Ignoring corrupt batch manifest {}: {}", path.display(), e);
                None
            }
        }
    }

    fn write_manifest(&self, manifest: &BatchManifest) -> Result<(), StoreError> {
        write_atomic(
            &self.data_dir.join(MANIFEST_FILE),
            &serde_json::to_vec_pretty(manifest)?,
        )
    }

    /// Indices parsed from `addresses_N.txt` names; anything else is skipped
    fn scan_indices(&self) -> Result<BTreeSet<u64>, StoreError> {
        let entries =
            std::fs::read_dir(&self.data_dir).map_err(|e| StoreError::io(&self.data_dir, e))?;

        let mut indices = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.data_dir, e))?;
            if let Some(index) = entry.file_name().to_str().and_then(parse_address_index) {
                indices.insert(index);
            }
        }
        Ok(indices)
    }
}

/// `addresses_7.txt` -> 7; balance logs and malformed names -> None
fn parse_address_index(name: &str) -> Option<u64> {
    let index = name
        .strip_prefix(ADDRESS_PREFIX)?
        .strip_suffix(LOG_SUFFIX)?
        .parse::<u64>()
        .ok()?;
    (index > 0).then_some(index)
}

fn append_line(path: &Path, line: &str) -> Result<(), StoreError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| StoreError::io(path, e))?;
    writeln!(file, "{}", line).map_err(|e| StoreError::io(path, e))
}

/// Number of lines, counting a trailing line without newline
fn count_lines(path: &Path) -> Result<usize, StoreError> {
    let bytes = std::fs::read(path).map_err(|e| StoreError::io(path, e))?;
    let newlines = bytes.iter().filter(|b| **b == b'\n').count();
    let unterminated = bytes.last().is_some_and(|b| *b != b'\n');
    Ok(newlines + usize::from(unterminated))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_index() {
        assert_eq!(parse_address_index("addresses_1.txt"), Some(1));
        assert_eq!(parse_address_index("addresses_42.txt"), Some(42));
        assert_eq!(parse_address_index("addresses_with_balance_3.txt"), None);
        assert_eq!(parse_address_index("addresses_x.txt"), None);
        assert_eq!(parse_address_index("addresses_0.txt"), None);
        assert_eq!(parse_address_index("addresses_5.txt.bak"), None);
        assert_eq!(parse_address_index("progress.json"), None);
    }

    #[test]
    fn test_count_lines() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("lines.txt");

        std::fs::write(&path, "").unwrap();
        assert_eq!(count_lines(&path).unwrap(), 0);

        std::fs::write(&path, "a\nb\n").unwrap();
        assert_eq!(count_lines(&path).unwrap(), 2);

        std::fs::write(&path, "a\nb").unwrap();
        assert_eq!(count_lines(&path).unwrap(), 2);
    }
}
