//! Block harvester core: scan progress, batch files and the scan loop
//!
//! Addresses seen in sampled transactions of successive blocks are written
//! to numbered batch files together with the ones that hold a balance.

pub mod batch;
pub mod error;
pub mod explorer;
pub mod extractor;
pub mod progress;
pub mod scanner;
pub mod types;

#[cfg(test)]
mod test_helpers;

pub use batch::{BatchFiles, BatchInfo, BatchStore};
pub use error::{ExplorerError, ScanControlError, StoreError};
pub use explorer::{BalanceSource, BlockData, BlockSource, ExplorerClient, ExplorerConfig};
pub use extractor::{extract_addresses, TX_SAMPLE_SIZE};
pub use progress::{ProgressRecord, ProgressStore};
pub use scanner::{
    HarvestStats, Harvester, ScanOutcome, ScanService, ScanSettings, ScanSummary, ScanTicket,
};
pub use types::Balance;

// Re-exported so callers can build cancellation tokens without their own dependency
pub use tokio_util::sync::CancellationToken;
