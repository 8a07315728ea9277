//! HTTP API consumed by the browser dashboard
//!
//! - `POST /check-resolutions` - settle every resolved pending bet
//! - `POST /run-cycle` - one ideation/trading cycle
//! - `POST /execute-trade` - submit one order
//! - `POST /polymarket-trade` - action-dispatched exchange and wallet queries
//! - `GET /bets`, `GET /summary`, `GET /health`

mod trade;
#[cfg(test)]
mod tests;

use crate::client::PolymarketClient;
use crate::cycle::{Balances, Bankroll, CycleRequest, CycleRunner};
use crate::error::{BotError, Result};
use crate::execution::{OrderRequest, OrderSubmitter, Receipt};
use crate::reconcile::Reconciler;
use crate::storage::{BetLedger, LedgerSummary};
use crate::types::{Bet, Side};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

const DEFAULT_BETS_LIMIT: u32 = 50;
const MAX_BETS_LIMIT: u32 = 500;

/// State shared across handlers
pub struct AppState {
    pub ledger: Arc<dyn BetLedger>,
    pub reconciler: Arc<Reconciler>,
    /// Absent when no LLM is configured
    pub cycles: Option<Arc<CycleRunner>>,
    /// Absent without a signer and API credentials
    pub submitter: Option<Arc<OrderSubmitter>>,
    pub polymarket: Arc<PolymarketClient>,
    pub bankroll: Arc<Bankroll>,
}

/// Error body `{error}` with a status code
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<BotError> for ApiError {
    fn from(e: BotError) -> Self {
        match e {
            BotError::InvalidInput(msg) => Self::bad_request(msg),
            BotError::MarketNotFound(msg) => Self::not_found(msg),
            other => {
                error!("Request failed: {}", other);
                Self::internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn check_resolutions(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    let summary = state.reconciler.reconcile().await?;
    state.bankroll.apply_summary(&summary);
    Ok(Json(serde_json::to_value(summary).map_err(BotError::from)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunCycleBody {
    #[serde(default = "first_cycle")]
    cycle: u64,
    #[serde(default)]
    bankroll: Option<Decimal>,
    #[serde(default)]
    system_prompt: String,
    #[serde(default)]
    live_trading: bool,
}

fn first_cycle() -> u64 {
    1
}

async fn run_cycle(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RunCycleBody>,
) -> ApiResult<Value> {
    let Some(cycles) = &state.cycles else {
        return Err(ApiError::unavailable("LLM provider not configured"));
    };

    info!(
        "Running cycle {} ({})",
        body.cycle,
        if body.live_trading { "live" } else { "simulated" }
    );

    let outcome = cycles
        .run(CycleRequest {
            cycle: body.cycle,
            bankroll: body.bankroll,
            system_prompt: body.system_prompt,
            live: body.live_trading,
        })
        .await?;

    Ok(Json(serde_json::to_value(outcome).map_err(BotError::from)?))
}

/// `{tokenId, side, price, size}` as sent by the dashboard
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TradeBody {
    #[serde(default, alias = "token_id")]
    token_id: Option<String>,
    #[serde(default)]
    side: Option<String>,
    #[serde(default)]
    price: Option<Decimal>,
    #[serde(default)]
    size: Option<Decimal>,
}

impl TradeBody {
    fn into_request(self) -> std::result::Result<OrderRequest, ApiError> {
        let missing =
            || ApiError::bad_request("Missing required fields: tokenId, side, size, price");

        let token_id = self.token_id.filter(|t| !t.trim().is_empty()).ok_or_else(missing)?;
        let side = self.side.ok_or_else(missing)?;
        let price = self.price.filter(|p| !p.is_zero()).ok_or_else(missing)?;
        let size = self.size.filter(|s| !s.is_zero()).ok_or_else(missing)?;

        let side = Side::from_alias(&side)
            .ok_or_else(|| ApiError::bad_request(format!("Unknown side: {}", side)))?;

        Ok(OrderRequest {
            token_id,
            side,
            size,
            price,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TradeReply {
    success: bool,
    submitted: bool,
    order_id: Option<String>,
    status: String,
    #[serde(with = "rust_decimal::serde::float")]
    final_price: Decimal,
    via: String,
}

impl From<Receipt> for TradeReply {
    fn from(r: Receipt) -> Self {
        Self {
            success: true,
            submitted: true,
            order_id: r.order_id,
            status: r.status,
            final_price: r.final_price,
            via: r.via,
        }
    }
}

/// Validate and submit one order; submission failures are the caller's 400
pub(crate) async fn place_order(
    state: &AppState,
    body: TradeBody,
) -> std::result::Result<Value, ApiError> {
    let Some(submitter) = &state.submitter else {
        return Err(ApiError::bad_request("Polymarket API credentials not configured"));
    };

    let request = body.into_request()?;
    let receipt = submitter
        .submit(request)
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    Ok(serde_json::to_value(TradeReply::from(receipt)).map_err(BotError::from)?)
}

async fn execute_trade(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TradeBody>,
) -> ApiResult<Value> {
    Ok(Json(place_order(&state, body).await?))
}

async fn polymarket_trade(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> ApiResult<Value> {
    Ok(Json(trade::dispatch(&state, body).await?))
}

#[derive(Debug, Deserialize)]
struct BetsQuery {
    live: Option<bool>,
    limit: Option<u32>,
}

async fn get_bets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BetsQuery>,
) -> ApiResult<Vec<Bet>> {
    let limit = query.limit.unwrap_or(DEFAULT_BETS_LIMIT).min(MAX_BETS_LIMIT);
    Ok(Json(state.ledger.recent(limit, query.live).await?))
}

/// Ledger totals plus running bankroll
#[derive(Serialize)]
struct DashboardSummary {
    #[serde(flatten)]
    ledger: LedgerSummary,
    bankroll: Balances,
}

async fn get_summary(State(state): State<Arc<AppState>>) -> ApiResult<DashboardSummary> {
    Ok(Json(DashboardSummary {
        ledger: state.ledger.summary().await?,
        bankroll: state.bankroll.snapshot(),
    }))
}

/// Create dashboard router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/bets", get(get_bets))
        .route("/summary", get(get_summary))
        .route("/check-resolutions", post(check_resolutions))
        .route("/run-cycle", post(run_cycle))
        .route("/execute-trade", post(execute_trade))
        .route("/polymarket-trade", post(polymarket_trade))
        .layer(cors)
        .with_state(state)
}

/// Start dashboard server
pub async fn start_dashboard(state: Arc<AppState>, host: &str, port: u16) -> Result<()> {
    let app = create_router(state);

    let addr = format!("{}:{}", host, port);
    info!("Dashboard server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
