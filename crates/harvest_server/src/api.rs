use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use harvest_store::{BatchInfo, ScanControlError, StoreError};

use crate::{
    models::{
        error_response, success_response, ApiResponse, CleanupRequest, CleanupResponse,
        ClaimResponse, DeleteBatchResponse, ScanStartedResponse, ScanStopResponse, StatsResponse,
    },
    AppState,
};

type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

fn ok<T>(data: T) -> ApiResult<T> {
    (StatusCode::OK, Json(success_response(data)))
}

fn store_failure<T>(err: StoreError) -> ApiResult<T> {
    let status = match err {
        StoreError::BatchNotFound(_) => StatusCode::NOT_FOUND,
        StoreError::ActiveBatch(_) | StoreError::EmptyBatch(_) => StatusCode::CONFLICT,
        StoreError::StorageError(_) | StoreError::SerializationError(_) => {
            tracing::error!("Storage failure: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(error_response(err.to_string())))
}

// Basic handler that responds with a static string
pub async fn root() -> &'static str {
    "Block Harvester API: /stats /scan/start /scan/stop /batches /batches/current/claim /batches/cleanup"
}

// Counters, running state and the last finished run
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<StatsResponse> {
    match state.scanner.stats() {
        Ok(stats) => ok(StatsResponse {
            stats,
            last_scan: state.scanner.last_summary(),
        }),
        Err(e) => store_failure(e),
    }
}

// Spawn a scan run from the last checkpoint
pub async fn start_scan(State(state): State<AppState>) -> ApiResult<ScanStartedResponse> {
    let ticket = match state.scanner.start_scan() {
        Ok(ticket) => ticket,
        Err(ScanControlError::AlreadyRunning) => {
            return (
                StatusCode::CONFLICT,
                Json(error_response("Already scanning".to_string())),
            )
        }
        Err(ScanControlError::Store(e)) => return store_failure(e),
    };

    tracing::info!(
        "Starting scan from block {} ({} blocks)",
        ticket.start_block,
        ticket.run_limit
    );

    let response = ScanStartedResponse {
        start_block: ticket.start_block,
        run_limit: ticket.run_limit,
    };

    let summary_rx = ticket.summary;
    tokio::spawn(async move {
        match summary_rx.await {
            Ok(summary) => tracing::info!(
                "Scanning completed: last block {:?}, {} addresses, {} with balance, batch {} ({:?})",
                summary.last_block,
                summary.total_addresses,
                summary.addresses_with_balance,
                summary.active_batch_index,
                summary.outcome
            ),
            Err(_) => tracing::warn!("Scan task ended without a summary"),
        }
    });

    (StatusCode::ACCEPTED, Json(success_response(response)))
}

// Ask the running scan to stop at the next block boundary
pub async fn stop_scan(State(state): State<AppState>) -> ApiResult<ScanStopResponse> {
    if state.scanner.stop_scan() {
        ok(ScanStopResponse { stopping: true })
    } else {
        (
            StatusCode::CONFLICT,
            Json(error_response("No active scanning".to_string())),
        )
    }
}

pub async fn list_batches(State(state): State<AppState>) -> ApiResult<Vec<BatchInfo>> {
    match state.scanner.list_batches() {
        Ok(batches) => ok(batches),
        Err(e) => store_failure(e),
    }
}

// Contents of one batch pair
pub async fn get_batch(
    State(state): State<AppState>,
    Path(index): Path<u64>,
) -> ApiResult<harvest_store::BatchFiles> {
    match state.scanner.batches().batch_files(index) {
        Ok(files) => ok(files),
        Err(e) => store_failure(e),
    }
}

// Hand out the current batch and rotate to a fresh one
pub async fn claim_current_batch(State(state): State<AppState>) -> ApiResult<ClaimResponse> {
    match state.scanner.batches().claim_active() {
        Ok((batch, new_index)) => {
            tracing::info!(
                "Batch {} downloaded, new batch {} created for future addresses",
                batch.index,
                new_index
            );
            ok(ClaimResponse { batch, new_index })
        }
        Err(e) => store_failure(e),
    }
}

pub async fn delete_batch(
    State(state): State<AppState>,
    Path(index): Path<u64>,
) -> ApiResult<DeleteBatchResponse> {
    match state.scanner.batches().delete(index) {
        Ok(deleted) => ok(DeleteBatchResponse { index, deleted }),
        Err(e) => store_failure(e),
    }
}

// Keep the newest `keep_count` batches (configured default when omitted)
pub async fn cleanup_batches(
    State(state): State<AppState>,
    query: Result<Query<CleanupRequest>, QueryRejection>,
) -> ApiResult<CleanupResponse> {
    let Query(request) = match query {
        Ok(query) => query,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(error_response(rejection.body_text())),
            )
        }
    };
    let keep_count = request
        .keep_count
        .unwrap_or(state.config.scanner.max_files_to_keep);
    let batches = state.scanner.batches();

    let deleted = match batches.cleanup(keep_count) {
        Ok(deleted) => deleted,
        Err(e) => return store_failure(e),
    };

    match batches.list_batches() {
        Ok(remaining) => ok(CleanupResponse {
            keep_count,
            deleted,
            remaining: remaining.len(),
        }),
        Err(e) => store_failure(e),
    }
}
