//! Block explorer access: block fetching and balance lookups

use async_trait::async_trait;
use serde_json::Value;

use crate::Balance;

mod client;
pub use client::{ExplorerClient, ExplorerConfig};

/// Raw block payload as returned by the explorer, e.g. `{"blocks": [{"tx": [...]}]}`
#[derive(Debug, Clone, PartialEq)]
pub struct BlockData(pub Value);

impl BlockData {
    pub fn as_json(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for BlockData {
    fn from(value: Value) -> Self {
        BlockData(value)
    }
}

/// Source of block data keyed by height
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Block at `height`, or `None` when it could not be retrieved for any reason
    async fn fetch_block(&self, height: u64) -> Option<BlockData>;
}

/// Source of address balances
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Current balance of `address`; any failure reads as zero
    async fn check_balance(&self, address: &str) -> Balance;
}
