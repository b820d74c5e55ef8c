//! In-memory explorer doubles for scanner tests

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use crate::{
    Balance, BalanceSource, BatchStore, BlockData, BlockSource, Harvester, ProgressStore,
    ScanSettings,
};

/// Explorer double serving canned blocks and balances
#[derive(Default)]
pub struct MockExplorer {
    blocks: HashMap<u64, BlockData>,
    balances: HashMap<String, u64>,
    balance_delay: Duration,
    pub block_requests: Mutex<Vec<u64>>,
    pub balance_requests: Mutex<Vec<String>>,
}

impl MockExplorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block with one transaction per entry of `txs`, each paying the listed addresses
    pub fn with_block(mut self, height: u64, txs: &[&[&str]]) -> Self {
        let txs: Vec<_> = txs
            .iter()
            .map(|outs| {
                let outs: Vec<_> = outs.iter().map(|a| json!({ "addr": a, "value": 1 })).collect();
                json!({ "out": outs })
            })
            .collect();
        self.blocks
            .insert(height, BlockData(json!({ "blocks": [{ "height": height, "tx": txs }] })));
        self
    }

    pub fn with_balance(mut self, address: &str, subunits: u64) -> Self {
        self.balances.insert(address.to_string(), subunits);
        self
    }

    /// Make every balance lookup take `delay`
    pub fn with_balance_delay(mut self, delay: Duration) -> Self {
        self.balance_delay = delay;
        self
    }
}

#[async_trait]
impl BlockSource for MockExplorer {
    async fn fetch_block(&self, height: u64) -> Option<BlockData> {
        self.block_requests.lock().push(height);
        self.blocks.get(&height).cloned()
    }
}

#[async_trait]
impl BalanceSource for MockExplorer {
    async fn check_balance(&self, address: &str) -> Balance {
        self.balance_requests.lock().push(address.to_string());
        if !self.balance_delay.is_zero() {
            tokio::time::sleep(self.balance_delay).await;
        }
        Balance::from_subunits(self.balances.get(address).copied().unwrap_or(0))
    }
}

/// Settings with no inter-block delay
pub fn fast_settings(max_blocks_per_run: u64) -> ScanSettings {
    ScanSettings {
        start_block: 0,
        max_blocks_per_run,
        api_delay: Duration::ZERO,
    }
}

/// Harvester over `dir` backed by `explorer` for both blocks and balances
pub fn harvester_in(
    dir: &std::path::Path,
    explorer: Arc<MockExplorer>,
    settings: ScanSettings,
) -> Harvester {
    let batches = Arc::new(BatchStore::open(dir, "BTC").unwrap());
    Harvester::new(
        batches,
        ProgressStore::new(dir),
        explorer.clone(),
        explorer,
        settings,
    )
}

/// Lines of a file, empty when it does not exist
pub fn read_lines(path: &std::path::Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}
