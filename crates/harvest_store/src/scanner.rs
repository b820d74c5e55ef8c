//! Block-by-block scan loop and the single-worker scan control

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::batch::{BatchInfo, BatchStore};
use crate::explorer::{BalanceSource, BlockData, BlockSource};
use crate::extractor::extract_addresses;
use crate::progress::{ProgressRecord, ProgressStore};
use crate::types::unix_now;
use crate::{ScanControlError, StoreError};

/// Tunables of the scan loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Height used when no progress record exists
    pub start_block: u64,
    /// Blocks processed per scan invocation
    pub max_blocks_per_run: u64,
    /// Pause after every fetched block
    pub api_delay: Duration,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            start_block: 0,
            max_blocks_per_run: 20,
            api_delay: Duration::from_secs(2),
        }
    }
}

/// Why a scan run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum ScanOutcome {
    /// The run limit was reached
    Completed,
    /// A stop request was observed at a block boundary
    Cancelled,
    /// A local storage operation failed
    Failed(String),
}

/// Result of one scan run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub start_block: u64,
    /// Last height the run moved past, `None` if it stopped before the first block
    pub last_block: Option<u64>,
    pub blocks_scanned: u64,
    pub blocks_skipped: u64,
    pub total_addresses: u64,
    pub addresses_with_balance: u64,
    pub active_batch_index: u64,
    pub outcome: ScanOutcome,
}

#[derive(Debug, Clone, Copy)]
struct Counters {
    current_block: u64,
    total_addresses: u64,
    addresses_with_balance: u64,
}

/// Drives the scan loop: fetch, extract, record, check balances, checkpoint.
///
/// Counters are restored from the progress record when the harvester is
/// built and grow with every appended line, so they are cumulative across
/// restarts.
pub struct Harvester {
    batches: Arc<BatchStore>,
    progress: ProgressStore,
    blocks: Arc<dyn BlockSource>,
    balances: Arc<dyn BalanceSource>,
    settings: ScanSettings,
    counters: Mutex<Counters>,
}

impl Harvester {
    pub fn new(
        batches: Arc<BatchStore>,
        progress: ProgressStore,
        blocks: Arc<dyn BlockSource>,
        balances: Arc<dyn BalanceSource>,
        settings: ScanSettings,
    ) -> Self {
        let record = progress.load();
        info!(
            "Loaded progress: block {}, {} addresses, {} with balance",
            record.last_processed_block, record.total_addresses_seen, record.addresses_with_balance
        );

        Self {
            batches,
            progress,
            blocks,
            balances,
            settings,
            counters: Mutex::new(Counters {
                current_block: record.last_processed_block,
                total_addresses: record.total_addresses_seen,
                addresses_with_balance: record.addresses_with_balance,
            }),
        }
    }

    pub fn batches(&self) -> &Arc<BatchStore> {
        &self.batches
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    /// Height the next scan run starts at
    pub fn resume_block(&self) -> u64 {
        self.progress.load().next_block(self.settings.start_block)
    }

    /// Current counters as a progress record (not persisted)
    pub fn snapshot(&self) -> ProgressRecord {
        let counters = *self.counters.lock();
        ProgressRecord {
            last_processed_block: counters.current_block,
            last_update_time: unix_now(),
            total_addresses_seen: counters.total_addresses,
            addresses_with_balance: counters.addresses_with_balance,
            active_batch_index: self.batches.active_index(),
        }
    }

    /// Scan heights `start .. start + run_limit`.
    ///
    /// Never fails: a storage error ends the run with [`ScanOutcome::Failed`]
    /// and the summary of what was done so far. Blocks the explorer cannot
    /// deliver are skipped without touching the logs or counters.
    pub async fn scan_range(
        &self,
        start: u64,
        run_limit: u64,
        cancel: &CancellationToken,
    ) -> ScanSummary {
        let end = start.saturating_add(run_limit);
        let mut height = start;
        let mut last_block = None;
        let mut blocks_scanned = 0;
        let mut blocks_skipped = 0;

        info!("Starting scan from block {} ({} blocks)", start, run_limit);

        let outcome = loop {
            if height >= end {
                break ScanOutcome::Completed;
            }
            if cancel.is_cancelled() {
                info!("Scan cancelled before block {}", height);
                break ScanOutcome::Cancelled;
            }

            debug!("Scanning block {}", height);
            let fetched = match self.blocks.fetch_block(height).await {
                Some(block) => {
                    if let Err(e) = self.process_block(height, &block).await {
                        error!("Error during scanning block {}: {}", height, e);
                        break ScanOutcome::Failed(e.to_string());
                    }
                    blocks_scanned += 1;
                    true
                }
                None => {
                    warn!("Could not fetch block {}", height);
                    blocks_skipped += 1;
                    false
                }
            };

            if let Err(e) = self.checkpoint(height) {
                error!("Failed to save progress at block {}: {}", height, e);
                break ScanOutcome::Failed(e.to_string());
            }
            last_block = Some(height);
            height += 1;

            if fetched && height < end && !self.settings.api_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.settings.api_delay) => {}
                }
            }
        };

        let counters = *self.counters.lock();
        let summary = ScanSummary {
            start_block: start,
            last_block,
            blocks_scanned,
            blocks_skipped,
            total_addresses: counters.total_addresses,
            addresses_with_balance: counters.addresses_with_balance,
            active_batch_index: self.batches.active_index(),
            outcome,
        };
        info!("Scan finished: {:?}", summary);
        summary
    }

    /// Record every sampled address of one block and its balance when positive
    async fn process_block(&self, height: u64, block: &BlockData) -> Result<(), StoreError> {
        let addresses = extract_addresses(block);
        info!("Found {} addresses in block {}", addresses.len(), height);

        for address in &addresses {
            // Look up first so the address and its balance line share a batch
            let balance = self.balances.check_balance(address).await;
            let positive = balance.is_positive().then_some(balance);
            self.batches.append_record(address, positive)?;

            {
                let mut counters = self.counters.lock();
                counters.total_addresses += 1;
                if positive.is_some() {
                    counters.addresses_with_balance += 1;
                }
            }
            if positive.is_some() {
                info!("Found balance: {} {} at {}", balance, self.batches.unit(), address);
            }
        }

        Ok(())
    }

    /// Persist progress after `height`; the stored height never moves backwards
    fn checkpoint(&self, height: u64) -> Result<(), StoreError> {
        let mut counters = self.counters.lock();
        let record = ProgressRecord {
            last_processed_block: counters.current_block.max(height),
            last_update_time: unix_now(),
            total_addresses_seen: counters.total_addresses,
            addresses_with_balance: counters.addresses_with_balance,
            active_batch_index: self.batches.active_index(),
        };
        self.progress.save(&record)?;
        counters.current_block = record.last_processed_block;
        Ok(())
    }
}

/// Point-in-time view of the harvester
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HarvestStats {
    pub current_block: u64,
    pub total_addresses: u64,
    pub addresses_with_balance: u64,
    pub is_running: bool,
    pub active_batch_index: u64,
    pub total_batches: usize,
}

/// Handle to a scan started by [`ScanService::start_scan`]
#[derive(Debug)]
pub struct ScanTicket {
    pub start_block: u64,
    pub run_limit: u64,
    /// Resolves with the summary once the run ends
    pub summary: oneshot::Receiver<ScanSummary>,
}

struct ActiveScan {
    cancel: CancellationToken,
    start_block: u64,
}

/// Clears the claimed slot when the scan task ends, even by panic
struct SlotRelease(Arc<Mutex<Option<ActiveScan>>>);

impl Drop for SlotRelease {
    fn drop(&mut self) {
        self.0.lock().take();
    }
}

/// Runs at most one scan at a time on a background task
#[derive(Clone)]
pub struct ScanService {
    harvester: Arc<Harvester>,
    active: Arc<Mutex<Option<ActiveScan>>>,
    last_summary: Arc<Mutex<Option<ScanSummary>>>,
}

impl ScanService {
    pub fn new(harvester: Arc<Harvester>) -> Self {
        Self {
            harvester,
            active: Arc::new(Mutex::new(None)),
            last_summary: Arc::new(Mutex::new(None)),
        }
    }

    pub fn harvester(&self) -> &Arc<Harvester> {
        &self.harvester
    }

    pub fn batches(&self) -> &Arc<BatchStore> {
        self.harvester.batches()
    }

    pub fn is_running(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Start block of the running scan, if any
    pub fn running_from(&self) -> Option<u64> {
        self.active.lock().as_ref().map(|scan| scan.start_block)
    }

    pub fn last_summary(&self) -> Option<ScanSummary> {
        self.last_summary.lock().clone()
    }

    /// Claim the scan slot and spawn a run from the resume block.
    ///
    /// Must be called from within a tokio runtime. A second call while a run
    /// is active returns [`ScanControlError::AlreadyRunning`].
    pub fn start_scan(&self) -> Result<ScanTicket, ScanControlError> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(ScanControlError::AlreadyRunning);
        }

        self.harvester.batches().ensure_active_files()?;
        let start_block = self.harvester.resume_block();
        let run_limit = self.harvester.settings().max_blocks_per_run;
        let cancel = CancellationToken::new();
        *active = Some(ActiveScan {
            cancel: cancel.clone(),
            start_block,
        });
        drop(active);

        let (tx, rx) = oneshot::channel();
        let release = SlotRelease(Arc::clone(&self.active));
        let harvester = Arc::clone(&self.harvester);
        let last_summary = Arc::clone(&self.last_summary);

        tokio::spawn(async move {
            let summary = harvester.scan_range(start_block, run_limit, &cancel).await;
            *last_summary.lock() = Some(summary.clone());
            drop(release);
            if tx.send(summary).is_err() {
                debug!("Scan summary receiver dropped");
            }
        });

        Ok(ScanTicket {
            start_block,
            run_limit,
            summary: rx,
        })
    }

    /// Ask the running scan to stop at the next block boundary
    pub fn stop_scan(&self) -> bool {
        match self.active.lock().as_ref() {
            Some(scan) => {
                info!("Stop requested for scan started at block {}", scan.start_block);
                scan.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn stats(&self) -> Result<HarvestStats, StoreError> {
        let snapshot = self.harvester.snapshot();
        Ok(HarvestStats {
            current_block: snapshot.last_processed_block,
            total_addresses: snapshot.total_addresses_seen,
            addresses_with_balance: snapshot.addresses_with_balance,
            is_running: self.is_running(),
            active_batch_index: snapshot.active_batch_index,
            total_batches: self.batches().list_batches()?.len(),
        })
    }

    pub fn list_batches(&self) -> Result<Vec<BatchInfo>, StoreError> {
        self.batches().list_batches()
    }
}
