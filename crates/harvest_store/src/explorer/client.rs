//! HTTP client for a blockchain.info style explorer

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{BalanceSource, BlockData, BlockSource};
use crate::{Balance, ExplorerError};

/// Connection settings for the explorer API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorerConfig {
    /// Explorer base URL, without trailing slash
    pub url: String,
    /// Timeout for block requests in seconds
    pub block_timeout_secs: u64,
    /// Timeout for balance requests in seconds
    pub balance_timeout_secs: u64,
    /// Extra attempts for a block request after a transport failure
    pub max_retries: u32,
    /// Pause between retry attempts in milliseconds
    pub retry_backoff_ms: u64,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            url: "https://blockchain.info".to_string(),
            block_timeout_secs: 30,
            balance_timeout_secs: 10,
            max_retries: 2,
            retry_backoff_ms: 1000,
        }
    }
}

/// Explorer client implementing both [`BlockSource`] and [`BalanceSource`]
#[derive(Debug, Clone)]
pub struct ExplorerClient {
    config: ExplorerConfig,
    client: Client,
}

impl ExplorerClient {
    pub fn new(config: ExplorerConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn block_request(&self, height: u64) -> RequestBuilder {
        self.client
            .get(format!("{}/block-height/{}", self.base_url(), height))
            .query(&[("format", "json")])
    }

    /// Balance lookup with the address as an encoded `active` parameter
    fn balance_request(&self, address: &str) -> RequestBuilder {
        self.client
            .get(format!("{}/balance", self.base_url()))
            .query(&[("active", address)])
    }

    /// Send `request` and decode the JSON body
    async fn get_json(&self, request: RequestBuilder, timeout: Duration) -> Result<Value, ExplorerError> {
        let request = request
            .header("Accept", "application/json")
            .timeout(timeout)
            .build()
            .map_err(|e| ExplorerError::HttpError(e.to_string()))?;
        debug!("Explorer request URL: {}", request.url());

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| ExplorerError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExplorerError::BadStatus(status.as_u16()));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ExplorerError::JsonError(e.to_string()))
    }

    /// Block payload at `height`, retrying transport failures
    pub async fn get_block(&self, height: u64) -> Result<BlockData, ExplorerError> {
        let timeout = Duration::from_secs(self.config.block_timeout_secs);

        let mut attempt = 0;
        loop {
            match self.get_json(self.block_request(height), timeout).await {
                Ok(value) => return Ok(BlockData(value)),
                Err(ExplorerError::NetworkError(e)) if attempt < self.config.max_retries => {
                    attempt += 1;
                    debug!(
                        "Block {} request failed ({}), retry {}/{}",
                        height, e, attempt, self.config.max_retries
                    );
                    tokio::time::sleep(Duration::from_millis(self.config.retry_backoff_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// `final_balance` of `address` in subunits
    pub async fn get_balance(&self, address: &str) -> Result<Balance, ExplorerError> {
        let timeout = Duration::from_secs(self.config.balance_timeout_secs);

        let response = self.get_json(self.balance_request(address), timeout).await?;
        parse_final_balance(&response, address)
    }
}

/// Read `{"<address>": {"final_balance": n}}`
fn parse_final_balance(response: &Value, address: &str) -> Result<Balance, ExplorerError> {
    let entry = response
        .get(address)
        .ok_or_else(|| ExplorerError::JsonError(format!("Missing {} in balance response", address)))?;

    Ok(Balance::from_subunits(
        entry["final_balance"].as_u64().unwrap_or(0),
    ))
}

#[async_trait]
impl BlockSource for ExplorerClient {
    async fn fetch_block(&self, height: u64) -> Option<BlockData> {
        match self.get_block(height).await {
            Ok(block) => Some(block),
            Err(e) => {
                warn!("API failed for block {}: {}", height, e);
                None
            }
        }
    }
}

#[async_trait]
impl BalanceSource for ExplorerClient {
    async fn check_balance(&self, address: &str) -> Balance {
        self.get_balance(address).await.unwrap_or_else(|e| {
            debug!("Balance lookup for {} failed: {}", address, e);
            Balance::ZERO
        })
    }
}
