//! Router tests

#[cfg(test)]
mod tests {
    use super::super::trade::market_tokens;
    use super::super::*;
    use crate::client::auth::{ApiCredentials, PolySigner};
    use crate::config::PolymarketConfig;
    use crate::execution::{SignedOrder, Transport};
    use crate::ideation::{CycleReport, IdeationOracle, MockIdeationOracle};
    use crate::resolution::{MarketLookup, MarketResolver};
    use crate::storage::Database;
    use crate::types::{Market, NewBet, Outcome};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use rust_decimal_macros::dec;
    use tower::ServiceExt;

    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const OFFLINE: &str = "http://127.0.0.1:9";

    /// Question search answers with these markets; id lookups find nothing
    struct SearchOnly(Vec<Market>);

    #[async_trait]
    impl MarketLookup for SearchOnly {
        async fn by_condition_id(&self, _: &str) -> Result<Vec<Market>> {
            Ok(Vec::new())
        }

        async fn by_slug(&self, _: &str) -> Result<Vec<Market>> {
            Ok(Vec::new())
        }

        async fn search(&self, _: &str) -> Result<Vec<Market>> {
            Ok(self.0.clone())
        }
    }

    struct Rejecting;

    #[async_trait]
    impl Transport for Rejecting {
        fn name(&self) -> &str {
            "direct"
        }

        async fn send(&self, _: &SignedOrder) -> Result<Value> {
            Err(BotError::Api("403 geoblocked".into()))
        }
    }

    struct Accepting;

    #[async_trait]
    impl Transport for Accepting {
        fn name(&self) -> &str {
            "relay"
        }

        async fn send(&self, _: &SignedOrder) -> Result<Value> {
            Ok(json!({"success": true, "orderID": "0x1"}))
        }
    }

    fn submitter(transport: Arc<dyn Transport>) -> Arc<OrderSubmitter> {
        let signer = PolySigner::from_private_key(TEST_KEY, 137).unwrap();
        let creds = ApiCredentials {
            api_key: "k".to_string(),
            api_secret: "c2VjcmV0".to_string(),
            api_passphrase: "p".to_string(),
        };
        Arc::new(OrderSubmitter::new(signer, creds, None, 0, vec![transport]).unwrap())
    }

    async fn state(
        oracle: Option<Arc<dyn IdeationOracle>>,
        submitter: Option<Arc<OrderSubmitter>>,
    ) -> (Arc<AppState>, Arc<Database>) {
        state_with_markets(Vec::new(), oracle, submitter).await
    }

    async fn state_with_markets(
        markets: Vec<Market>,
        oracle: Option<Arc<dyn IdeationOracle>>,
        submitter: Option<Arc<OrderSubmitter>>,
    ) -> (Arc<AppState>, Arc<Database>) {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let resolver = Arc::new(MarketResolver::new(Arc::new(SearchOnly(markets))));
        let reconciler = Arc::new(Reconciler::new(resolver, db.clone()));
        let bankroll = Arc::new(Bankroll::new(dec!(100)));

        let cycles = oracle.map(|oracle| {
            Arc::new(CycleRunner::new(
                oracle,
                db.clone(),
                reconciler.clone(),
                None,
                bankroll.clone(),
            ))
        });

        let polymarket = PolymarketClient::new(PolymarketConfig {
            clob_url: OFFLINE.to_string(),
            gamma_url: OFFLINE.to_string(),
            data_url: OFFLINE.to_string(),
            polygon_rpc_url: OFFLINE.to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

        let state = Arc::new(AppState {
            ledger: db.clone(),
            reconciler,
            cycles,
            submitter,
            polymarket: Arc::new(polymarket),
            bankroll,
        });
        (state, db)
    }

    async fn call(
        state: Arc<AppState>,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(b) => Body::from(b.to_string()),
                None => Body::empty(),
            })
            .unwrap();

        let response = create_router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn action(state: Arc<AppState>, body: Value) -> (StatusCode, Value) {
        call(state, "POST", "/polymarket-trade", Some(body)).await
    }

    fn bet(market: &str, is_live: bool) -> NewBet {
        NewBet {
            cycle: 1,
            market: market.to_string(),
            condition_id: None,
            market_slug: None,
            token_id: None,
            side: "BUY".to_string(),
            recommended_price: dec!(0.4),
            size: dec!(10),
            edge: None,
            is_live,
        }
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _) = state(None, None).await;
        let (status, body) = call(state, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_check_resolutions_on_empty_ledger() {
        let (state, _) = state(None, None).await;
        let (status, body) = call(state, "POST", "/check-resolutions", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"checked": 0, "resolved": 0, "results": []}));
    }

    #[tokio::test]
    async fn test_check_resolutions_leaves_unresolved_pending() {
        let (state, db) = state(None, None).await;
        db.record(bet("Unknown market", false)).await.unwrap();

        let (status, body) = call(state, "POST", "/check-resolutions", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checked"], 1);
        assert_eq!(body["resolved"], 0);
        assert_eq!(db.pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_check_resolutions_credits_bankroll() {
        let closed = Market {
            id: "7".to_string(),
            question: "X".to_string(),
            condition_id: None,
            slug: None,
            outcomes: vec![
                Outcome {
                    label: "Yes".to_string(),
                    price: Some(dec!(0.97)),
                    token_id: None,
                },
                Outcome {
                    label: "No".to_string(),
                    price: Some(dec!(0.03)),
                    token_id: None,
                },
            ],
            active: false,
            closed: true,
            end_date: None,
            volume: Decimal::ZERO,
            liquidity: Decimal::ZERO,
        };
        let (state, db) = state_with_markets(vec![closed], None, None).await;
        db.record(NewBet {
            recommended_price: dec!(0.30),
            size: dec!(50),
            ..bet("X", false)
        })
        .await
        .unwrap();

        let (status, body) = call(state.clone(), "POST", "/check-resolutions", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resolved"], 1);
        assert_eq!(body["results"][0]["pnl"], json!(35.0));
        assert_eq!(state.bankroll.get(false), dec!(135));
        assert_eq!(state.bankroll.get(true), dec!(100));

        let (_, summary) = call(state, "GET", "/summary", None).await;
        assert_eq!(summary["bankroll"]["simulated"], json!(135.0));
        assert_eq!(summary["simulated"]["won"], 1);
    }

    #[tokio::test]
    async fn test_run_cycle_without_llm() {
        let (state, _) = state(None, None).await;
        let (status, body) = call(state, "POST", "/run-cycle", Some(json!({"cycle": 1}))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("LLM"));
    }

    #[tokio::test]
    async fn test_run_cycle() {
        let mut oracle = MockIdeationOracle::new();
        oracle
            .expect_ideate()
            .withf(|req| req.cycle == 4 && req.bankroll == dec!(250) && req.system_prompt == "go")
            .returning(|req| Ok(CycleReport::fallback(req.cycle, req.bankroll, "not json")));

        let (state, _) = state(Some(Arc::new(oracle)), None).await;
        let (status, body) = call(
            state,
            "POST",
            "/run-cycle",
            Some(json!({"cycle": 4, "bankroll": 250, "systemPrompt": "go"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cycle"], 4);
        assert_eq!(body["bankroll"], json!(250.0));
        assert_eq!(body["recorded"], 0);
        assert_eq!(body["rules"][0], "Parse error - using fallback");
        assert_eq!(body["resolutions"]["checked"], 0);
    }

    #[tokio::test]
    async fn test_execute_trade_requires_submitter() {
        let (state, _) = state(None, None).await;
        let (status, body) = call(
            state,
            "POST",
            "/execute-trade",
            Some(json!({"tokenId": "1", "side": "BUY", "price": 0.5, "size": 2})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Polymarket API credentials not configured");
    }

    #[tokio::test]
    async fn test_execute_trade_missing_fields() {
        let (state, _) = state(None, Some(submitter(Arc::new(Accepting)))).await;
        let (status, body) = call(
            state,
            "POST",
            "/execute-trade",
            Some(json!({"tokenId": "1", "side": "BUY"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Missing required fields"));
    }

    #[tokio::test]
    async fn test_execute_trade_failure_is_400() {
        let (state, _) = state(None, Some(submitter(Arc::new(Rejecting)))).await;
        let (status, body) = call(
            state,
            "POST",
            "/execute-trade",
            Some(json!({"tokenId": "12345", "side": "BUY", "price": 0.5, "size": 2})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("403 geoblocked"));
    }

    #[tokio::test]
    async fn test_place_trade_action() {
        let (state, _) = state(None, Some(submitter(Arc::new(Accepting)))).await;
        let (status, body) = action(
            state,
            json!({
                "action": "place-trade",
                "tokenId": "12345",
                "side": "SELL",
                "price": "0.456",
                "size": 3
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["submitted"], true);
        assert_eq!(body["orderId"], "0x1");
        assert_eq!(body["finalPrice"], json!(0.46));
        assert_eq!(body["via"], "relay");
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let (state, _) = state(None, None).await;
        let (status, body) = action(state, json!({"action": "teleport"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Unknown action: teleport");
    }

    #[tokio::test]
    async fn test_actions_needing_configuration() {
        let (state, _) = state(None, None).await;

        for name in ["get-open-orders", "get-trades"] {
            let (status, body) = action(state.clone(), json!({"action": name})).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "Polymarket API credentials not configured");
        }

        let (status, _) = action(state.clone(), json!({"action": "get-positions"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = action(state.clone(), json!({"action": "get-wallet-balance"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = action(state, json!({"action": "get-market-tokens"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing conditionId");
    }

    #[tokio::test]
    async fn test_verify_connection_unconfigured() {
        let (state, _) = state(None, None).await;
        let (status, body) = action(state, json!({"action": "verify-connection"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connected"], false);
        assert_eq!(body["verified"], false);
        assert!(body["balance"].is_null());
    }

    #[tokio::test]
    async fn test_bets_filter_and_limit() {
        let (state, db) = state(None, None).await;
        db.record(bet("A", false)).await.unwrap();
        db.record(bet("B", true)).await.unwrap();
        db.record(bet("C", true)).await.unwrap();

        let (status, body) = call(state.clone(), "GET", "/bets?live=true", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert!(body.as_array().unwrap().iter().all(|b| b["is_live"] == true));

        let (_, body) = call(state, "GET", "/bets?limit=1", None).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_summary_includes_bankroll() {
        let (state, db) = state(None, None).await;
        db.record(bet("A", false)).await.unwrap();

        let (status, body) = call(state, "GET", "/summary", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["simulated"]["pending"], 1);
        assert_eq!(body["live"]["total"], 0);
        assert_eq!(body["bankroll"]["simulated"], json!(100.0));
    }

    #[test]
    fn test_market_tokens_shape() {
        let market = Market {
            id: "1".to_string(),
            question: "Will it rain?".to_string(),
            condition_id: Some("0xc".to_string()),
            slug: Some("rain".to_string()),
            outcomes: vec![
                Outcome {
                    label: "Yes".to_string(),
                    price: Some(dec!(0.25)),
                    token_id: Some("111".to_string()),
                },
                Outcome {
                    label: "No".to_string(),
                    price: None,
                    token_id: Some("222".to_string()),
                },
            ],
            active: true,
            closed: false,
            end_date: None,
            volume: Decimal::ZERO,
            liquidity: Decimal::ZERO,
        };

        let v = market_tokens(&market);
        assert_eq!(v["conditionId"], "0xc");
        assert_eq!(v["tokens"][0], json!({"outcome": "Yes", "tokenId": "111", "price": 0.25}));
        assert!(v["tokens"][1]["price"].is_null());
    }
}
