// HTTP control surface tests driving the router in-process

#[cfg(test)]
mod api_tests {
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
        Router,
    };
    use harvest_server::{
        build_router, AppConfig, AppState, ScannerConfig, ServerConfig,
    };
    use harvest_store::{
        Balance, BalanceSource, BatchStore, BlockData, BlockSource, ExplorerConfig, Harvester,
        ProgressStore, ScanService,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    // Explorer double: one block per height, balances by address
    struct StaticExplorer {
        blocks: HashMap<u64, Vec<&'static str>>,
        balances: HashMap<&'static str, u64>,
    }

    #[async_trait]
    impl BlockSource for StaticExplorer {
        async fn fetch_block(&self, height: u64) -> Option<BlockData> {
            let outs: Vec<Value> = self
                .blocks
                .get(&height)?
                .iter()
                .map(|a| json!({ "addr": a }))
                .collect();
            Some(BlockData(json!({ "blocks": [{ "tx": [{ "out": outs }] }] })))
        }
    }

    #[async_trait]
    impl BalanceSource for StaticExplorer {
        async fn check_balance(&self, address: &str) -> Balance {
            Balance(self.balances.get(address).copied().unwrap_or(0))
        }
    }

    fn test_config(data_dir: &Path) -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            scanner: ScannerConfig {
                data_dir: data_dir.to_path_buf(),
                start_block: 100,
                max_blocks_per_run: 2,
                api_delay_secs: 0,
                max_files_to_keep: 5,
                unit: "BTC".to_string(),
            },
            explorer: ExplorerConfig::default(),
        }
    }

    fn test_app(data_dir: &Path) -> (Router, AppState) {
        let config = test_config(data_dir);
        let explorer = Arc::new(StaticExplorer {
            blocks: HashMap::from([(100, vec!["1Alpha", "1Beta"])]),
            balances: HashMap::from([("1Beta", 150_000_000)]),
        });
        let batches = Arc::new(BatchStore::open(data_dir, "BTC").unwrap());
        let harvester = Harvester::new(
            batches,
            ProgressStore::new(data_dir),
            explorer.clone(),
            explorer,
            config.scan_settings(),
        );
        let state = AppState {
            scanner: ScanService::new(Arc::new(harvester)),
            config: Arc::new(config),
        };
        (build_router(state.clone()), state)
    }

    async fn send(app: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn run_scan_to_completion(app: &Router, state: &AppState) {
        let (status, body) = send(app, Method::POST, "/scan/start").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["success"], true);

        tokio::time::timeout(Duration::from_secs(10), async {
            while state.scanner.is_running() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("scan did not finish");
    }

    #[tokio::test]
    async fn test_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (app, _) = test_app(temp_dir.path());

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_before_any_scan() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (app, _) = test_app(temp_dir.path());

        let (status, body) = send(&app, Method::GET, "/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total_addresses"], 0);
        assert_eq!(body["data"]["is_running"], false);
        assert_eq!(body["data"]["active_batch_index"], 1);
        assert_eq!(body["data"]["total_batches"], 1);
        assert!(body["data"]["last_scan"].is_null());
    }

    #[tokio::test]
    async fn test_scan_then_stats() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (app, state) = test_app(temp_dir.path());

        run_scan_to_completion(&app, &state).await;

        let (status, body) = send(&app, Method::GET, "/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["current_block"], 101);
        assert_eq!(body["data"]["total_addresses"], 2);
        assert_eq!(body["data"]["addresses_with_balance"], 1);
        assert_eq!(body["data"]["last_scan"]["start_block"], 100);
        assert_eq!(body["data"]["last_scan"]["outcome"]["status"], "completed");

        let (status, body) = send(&app, Method::GET, "/batches").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["index"], 1);
        assert_eq!(body["data"][0]["address_count"], 2);
        assert_eq!(body["data"][0]["balance_count"], 1);
    }

    #[tokio::test]
    async fn test_stop_without_scan() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (app, _) = test_app(temp_dir.path());

        let (status, body) = send(&app, Method::POST, "/scan/stop").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_claim_rotates_current_batch() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (app, state) = test_app(temp_dir.path());

        // Nothing collected yet
        let (status, _) = send(&app, Method::POST, "/batches/current/claim").await;
        assert_eq!(status, StatusCode::CONFLICT);

        run_scan_to_completion(&app, &state).await;

        let (status, body) = send(&app, Method::POST, "/batches/current/claim").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["batch"]["index"], 1);
        assert_eq!(body["data"]["batch"]["addresses"], "1Alpha\n1Beta\n");
        assert_eq!(body["data"]["batch"]["balances"], "1Beta - 1.50000000 BTC\n");
        assert_eq!(body["data"]["new_index"], 2);

        // The claimed batch stays downloadable
        let (status, body) = send(&app, Method::GET, "/batches/1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["address_file"], "addresses_1.txt");

        let (status, _) = send(&app, Method::GET, "/batches/9").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_and_cleanup() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (app, state) = test_app(temp_dir.path());
        for _ in 0..7 {
            state.scanner.batches().rotate().unwrap();
        }

        let (status, _) = send(&app, Method::DELETE, "/batches/8").await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(&app, Method::DELETE, "/batches/1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["deleted"], true);

        let (status, body) = send(&app, Method::POST, "/batches/cleanup?keep_count=3").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["deleted"], 4);
        assert_eq!(body["data"]["remaining"], 3);

        // Default retention comes from configuration
        let (status, body) = send(&app, Method::POST, "/batches/cleanup").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["keep_count"], 5);
        assert_eq!(body["data"]["deleted"], 0);
    }

    #[tokio::test]
    async fn test_cleanup_rejects_bad_keep_count() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (app, state) = test_app(temp_dir.path());
        state.scanner.batches().rotate().unwrap();

        let (status, body) = send(&app, Method::POST, "/batches/cleanup?keep_count=many").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["data"].is_null());
        assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));

        // Nothing was deleted
        let (_, body) = send(&app, Method::GET, "/batches").await;
        assert_eq!(body["data"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_state_from_config_opens_data_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let data_dir = temp_dir.path().join("data");

        let state = AppState::from_config(test_config(&data_dir)).unwrap();
        assert_eq!(state.scanner.batches().active_index(), 1);
        assert!(data_dir.join("addresses_1.txt").exists());
        assert!(!state.scanner.is_running());
    }
}
