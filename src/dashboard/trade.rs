//! `POST /polymarket-trade` actions

use super::{place_order, ApiError, AppState, TradeBody};
use crate::error::BotError;
use crate::types::Market;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

/// Markets returned by `search-markets`
const SEARCH_LIMIT: usize = 10;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ActionParams {
    token_ids: Vec<String>,
    token_id: Option<String>,
    query: Option<String>,
    condition_id: Option<String>,
}

pub(super) async fn dispatch(state: &AppState, body: Value) -> Result<Value, ApiError> {
    let action = body
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if action == "place-trade" {
        let trade: TradeBody = serde_json::from_value(body)
            .map_err(|e| ApiError::bad_request(format!("Invalid trade: {}", e)))?;
        return place_order(state, trade).await;
    }

    let params: ActionParams = serde_json::from_value(body)
        .map_err(|e| ApiError::bad_request(format!("Invalid parameters: {}", e)))?;
    let pm = &state.polymarket;

    match action.as_str() {
        "get-prices" => {
            let mut prices = Map::new();
            for token_id in &params.token_ids {
                let mid = match pm.clob.get_midpoint(token_id).await {
                    Ok(mid) => json!(mid.to_f64()),
                    Err(e) => {
                        debug!("Midpoint for {} unavailable: {}", token_id, e);
                        Value::Null
                    }
                };
                prices.insert(token_id.clone(), mid);
            }
            Ok(json!({ "prices": prices }))
        }

        "get-orderbook" => {
            let token_id = params
                .token_id
                .ok_or_else(|| ApiError::bad_request("Missing tokenId"))?;
            Ok(to_json(pm.clob.get_order_book(&token_id).await?)?)
        }

        "search-markets" => {
            let query = params.query.unwrap_or_default();
            let markets = pm.gamma.search_markets(&query, SEARCH_LIMIT).await?;
            Ok(json!({ "markets": to_json(markets)? }))
        }

        "get-market-tokens" => {
            let condition_id = params
                .condition_id
                .ok_or_else(|| ApiError::bad_request("Missing conditionId"))?;
            let market = pm
                .gamma
                .get_by_condition_id(&condition_id)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| ApiError::not_found("Not found"))?;
            Ok(market_tokens(&market))
        }

        "get-positions" => {
            let address = pm
                .account_address()
                .ok_or_else(|| ApiError::bad_request("Wallet private key not configured"))?;
            Ok(to_json(pm.data.positions(&address).await?)?)
        }

        "verify-connection" => {
            let connected = pm.clob.signer().is_some() && pm.clob.credentials().await.is_some();
            let verified = connected && pm.clob.verify_credentials().await.unwrap_or(false);
            let balance = if pm.account_address().is_some() {
                Some(pm.wallet_report().await?)
            } else {
                None
            };

            Ok(json!({
                "connected": connected,
                "verified": verified,
                "walletAddress": pm.account_address(),
                "eoaAddress": pm.clob.signer().map(|s| s.address_checksum()),
                "balance": to_json(balance)?,
            }))
        }

        "get-wallet-balance" => {
            let report = pm.wallet_report().await.map_err(|e| match e {
                BotError::Auth(msg) => ApiError::bad_request(msg),
                other => other.into(),
            })?;
            Ok(to_json(report)?)
        }

        "get-open-orders" => {
            require_credentials(state).await?;
            Ok(to_json(pm.clob.get_open_orders().await?)?)
        }

        "get-trades" => {
            require_credentials(state).await?;
            Ok(to_json(pm.clob.get_trades().await?)?)
        }

        other => Err(ApiError::bad_request(format!("Unknown action: {}", other))),
    }
}

async fn require_credentials(state: &AppState) -> Result<(), ApiError> {
    if state.polymarket.clob.credentials().await.is_none() {
        return Err(ApiError::bad_request("Polymarket API credentials not configured"));
    }
    Ok(())
}

fn to_json<T: serde::Serialize>(value: T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| BotError::from(e).into())
}

/// Token ids and prices of each outcome
pub(super) fn market_tokens(market: &Market) -> Value {
    let tokens: Vec<Value> = market
        .outcomes
        .iter()
        .map(|o| {
            json!({
                "outcome": o.label,
                "tokenId": o.token_id,
                "price": o.price.and_then(|p| p.to_f64()),
            })
        })
        .collect();

    json!({
        "conditionId": market.condition_id,
        "question": market.question,
        "slug": market.slug,
        "active": market.active,
        "closed": market.closed,
        "tokens": tokens,
    })
}
