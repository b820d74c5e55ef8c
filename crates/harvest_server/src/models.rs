use harvest_store::{BatchFiles, ScanSummary};
use serde::{Deserialize, Serialize};

// Response structure for API responses
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

// Helper function to create success response
pub fn success_response<T>(data: T) -> ApiResponse<T> {
    ApiResponse {
        success: true,
        data: Some(data),
        error: None,
    }
}

// Helper function to create error response
pub fn error_response<T>(message: String) -> ApiResponse<T> {
    ApiResponse {
        success: false,
        data: None,
        error: Some(message),
    }
}

// Returned when a scan run has been spawned
#[derive(Debug, Serialize, Deserialize)]
pub struct ScanStartedResponse {
    pub start_block: u64,
    pub run_limit: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScanStopResponse {
    pub stopping: bool,
}

// Stats plus the summary of the last finished run
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: harvest_store::HarvestStats,
    pub last_scan: Option<ScanSummary>,
}

// Current batch handed out and the batch that replaces it
#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub batch: BatchFiles,
    pub new_index: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteBatchResponse {
    pub index: u64,
    pub deleted: bool,
}

// Query parameters for POST /batches/cleanup
#[derive(Debug, Default, Deserialize)]
pub struct CleanupRequest {
    pub keep_count: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub keep_count: usize,
    pub deleted: usize,
    pub remaining: usize,
}
