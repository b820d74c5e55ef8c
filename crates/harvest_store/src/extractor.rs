//! Output address extraction from block payloads

use std::collections::HashSet;

use serde_json::Value;

use crate::explorer::BlockData;

/// Transactions sampled from the start of each block segment
pub const TX_SAMPLE_SIZE: usize = 3;

/// Output addresses of the first [`TX_SAMPLE_SIZE`] transactions of every
/// block segment, deduplicated, in first-seen order.
///
/// Missing or malformed fields are skipped; the result may be empty.
pub fn extract_addresses(block: &BlockData) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut addresses = Vec::new();

    for segment in as_slice(&block.as_json()["blocks"]) {
        for tx in as_slice(&segment["tx"]).iter().take(TX_SAMPLE_SIZE) {
            for output in as_slice(&tx["out"]) {
                if let Some(addr) = output["addr"].as_str() {
                    if !addr.is_empty() && seen.insert(addr) {
                        addresses.push(addr.to_string());
                    }
                }
            }
        }
    }

    addresses
}

fn as_slice(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or(&[])
}
