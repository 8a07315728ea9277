//! CLOB (Central Limit Order Book) API client
//!
//! Public price and book queries, plus the authenticated account endpoints
//! (orders, trades, balance) and API key derivation.

use crate::client::auth::{ApiCredentials, PolySigner};
use crate::error::{BotError, Result};
use crate::types::Side;
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// USDC has 6 decimals on Polygon
const USDC_DECIMALS: u32 = 6;

/// CLOB API client
#[derive(Clone)]
pub struct ClobClient {
    pub http: Client,
    base_url: String,
    signer: Option<PolySigner>,
    signature_type: u8,
    credentials: Arc<RwLock<Option<ApiCredentials>>>,
}

#[derive(Debug, Deserialize)]
struct ApiKeyResponse {
    #[serde(rename = "apiKey")]
    api_key: String,
    secret: String,
    passphrase: String,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    #[serde(default)]
    balance: String,
}

/// Resting order owned by the authenticated account
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenOrder {
    pub id: String,
    pub market: String,
    pub asset_id: String,
    pub side: String,
    pub price: String,
    pub original_size: String,
    pub size_matched: String,
    pub status: String,
}

/// Fill history entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeRecord {
    pub id: String,
    pub market: String,
    pub asset_id: String,
    pub side: String,
    pub price: String,
    pub size: String,
    pub status: String,
    pub match_time: String,
    pub outcome: String,
}

impl ClobClient {
    /// Create a new CLOB client. Without a signer only public endpoints work.
    pub fn new(base_url: &str, signer: Option<PolySigner>, signature_type: u8) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            signer,
            signature_type,
            credentials: Arc::new(RwLock::new(None)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn signer(&self) -> Option<&PolySigner> {
        self.signer.as_ref()
    }

    /// Install L2 credentials (from config or [`Self::derive_api_key`])
    pub async fn set_credentials(&self, creds: ApiCredentials) {
        *self.credentials.write().await = Some(creds);
    }

    pub async fn credentials(&self) -> Option<ApiCredentials> {
        self.credentials.read().await.clone()
    }

    /// L2 headers for `method path body`
    pub async fn auth_headers(
        &self,
        method: &str,
        request_path: &str,
        body: Option<&str>,
    ) -> Result<Vec<(String, String)>> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| BotError::Auth("No private key configured".into()))?;
        let creds = self.credentials.read().await;
        let creds = creds
            .as_ref()
            .ok_or_else(|| BotError::Auth("Not authenticated".into()))?;

        creds.l2_headers(
            &signer.address_checksum(),
            chrono::Utc::now().timestamp(),
            method,
            request_path,
            body,
        )
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.http.get(&url).query(query).send().await?;

        if !resp.status().is_success() {
            return Err(BotError::Api(format!("GET {} returned {}", path, resp.status())));
        }

        Ok(resp.json().await?)
    }

    async fn get_authenticated(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<serde_json::Value> {
        let headers = self.auth_headers("GET", path, None).await?;
        let url = format!("{}{}", self.base_url, path);

        let mut req = self.http.get(&url).query(query);
        for (name, value) in &headers {
            req = req.header(name.as_str(), value.as_str());
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(BotError::Api(format!("GET {} returned {}: {}", path, status, body)));
        }

        Ok(resp.json().await?)
    }

    /// Check if the CLOB API is reachable
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/", self.base_url);
        let resp = self.http.get(&url).send().await?;
        Ok(resp.status().is_success())
    }

    /// Get midpoint price for a token
    pub async fn get_midpoint(&self, token_id: &str) -> Result<Decimal> {
        let resp = self.get_json("/midpoint", &[("token_id", token_id)]).await?;

        decimal_value(&resp["mid"])
            .ok_or_else(|| BotError::Api("Invalid midpoint response".into()))
    }

    /// Best price for taking `side` on a token
    pub async fn get_price(&self, token_id: &str, side: Side) -> Result<Decimal> {
        let resp = self
            .get_json("/price", &[("token_id", token_id), ("side", side.as_str())])
            .await?;

        decimal_value(&resp["price"]).ok_or_else(|| BotError::Api("Invalid price response".into()))
    }

    /// Get order book for a token
    pub async fn get_order_book(&self, token_id: &str) -> Result<OrderBook> {
        let resp = self.get_json("/book", &[("token_id", token_id)]).await?;
        Ok(OrderBook::from_json(&resp))
    }

    /// Open orders of the authenticated account
    pub async fn get_open_orders(&self) -> Result<Vec<OpenOrder>> {
        let resp = self.get_authenticated("/data/orders", &[]).await?;
        Ok(data_items(resp))
    }

    /// Recent fills of the authenticated account
    pub async fn get_trades(&self) -> Result<Vec<TradeRecord>> {
        let resp = self.get_authenticated("/data/trades", &[]).await?;
        Ok(data_items(resp))
    }

    /// Exchange collateral (USDC) available to the account
    pub async fn get_collateral_balance(&self) -> Result<Decimal> {
        let signature_type = self.signature_type.to_string();
        let resp = self
            .get_authenticated(
                "/balance-allowance",
                &[
                    ("asset_type", "COLLATERAL"),
                    ("signature_type", &signature_type),
                ],
            )
            .await?;

        let resp: BalanceResponse = serde_json::from_value(resp)?;
        let raw: Decimal = resp
            .balance
            .trim()
            .parse()
            .map_err(|e| BotError::Api(format!("Invalid balance: {}", e)))?;

        Ok(raw / Decimal::from(10u64.pow(USDC_DECIMALS)))
    }

    /// True when the exchange accepts the configured L2 credentials
    pub async fn verify_credentials(&self) -> Result<bool> {
        match self.get_authenticated("/auth/api-keys", &[]).await {
            Ok(_) => Ok(true),
            Err(BotError::Api(msg)) => {
                debug!("Credential check rejected: {}", msg);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Derive (or create) L2 credentials from the wallet signature
    pub async fn derive_api_key(&self, nonce: u64) -> Result<ApiCredentials> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| BotError::Auth("No private key configured".into()))?;

        let headers = signer.l1_headers(chrono::Utc::now().timestamp(), nonce)?;

        let derived = self
            .key_request(Method::GET, "/auth/derive-api-key", &headers)
            .await;

        let resp = match derived {
            Ok(resp) => resp,
            Err(e) => {
                warn!("derive-api-key failed ({}), creating a new key", e);
                self.key_request(Method::POST, "/auth/api-key", &headers)
                    .await?
            }
        };

        let creds = ApiCredentials {
            api_key: resp.api_key,
            api_secret: resp.secret,
            api_passphrase: resp.passphrase,
        };
        self.set_credentials(creds.clone()).await;

        Ok(creds)
    }

    async fn key_request(
        &self,
        method: Method,
        path: &str,
        headers: &[(String, String)],
    ) -> Result<ApiKeyResponse> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.request(method, &url);
        for (name, value) in headers {
            req = req.header(name.as_str(), value.as_str());
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(BotError::Api(format!("{} returned {}", path, resp.status())));
        }

        Ok(resp.json().await?)
    }
}

/// Listing endpoints answer either a bare array or `{data: [...]}`
fn data_items<T: for<'de> Deserialize<'de>>(resp: serde_json::Value) -> Vec<T> {
    let items = match resp {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut obj) => match obj.remove("data") {
            Some(serde_json::Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect()
}

/// Prices arrive as strings or numbers
pub(crate) fn decimal_value(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::String(s) => s.trim().parse().ok(),
        serde_json::Value::Number(n) => n.as_f64().and_then(|f| Decimal::try_from(f).ok()),
        _ => None,
    }
}

fn decimal_from_any<'de, D>(deserializer: D) -> std::result::Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    decimal_value(&value).ok_or_else(|| serde::de::Error::custom("expected a decimal"))
}

/// Order book data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBook {
    /// Best (highest) first
    pub bids: Vec<OrderBookLevel>,
    /// Best (lowest) first
    pub asks: Vec<OrderBookLevel>,
}

/// Single level in order book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookLevel {
    #[serde(
        deserialize_with = "decimal_from_any",
        serialize_with = "rust_decimal::serde::float::serialize"
    )]
    pub price: Decimal,
    #[serde(
        deserialize_with = "decimal_from_any",
        serialize_with = "rust_decimal::serde::float::serialize"
    )]
    pub size: Decimal,
}

impl OrderBook {
    /// Parse `{bids: [{price, size}], asks: [...]}`, skipping malformed levels
    pub fn from_json(resp: &serde_json::Value) -> Self {
        let parse_levels = |arr: &serde_json::Value| -> Vec<OrderBookLevel> {
            arr.as_array()
                .map(|a| {
                    a.iter()
                        .filter_map(|l| {
                            Some(OrderBookLevel {
                                price: decimal_value(&l["price"])?,
                                size: decimal_value(&l["size"])?,
                            })
                        })
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut bids = parse_levels(&resp["bids"]);
        let mut asks = parse_levels(&resp["asks"]);
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));

        Self { bids, asks }
    }

    /// Get best bid price
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    /// Get best ask price
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Get spread
    pub fn spread(&self) -> Option<Decimal> {
        Some(self.best_ask()? - self.best_bid()?)
    }

    /// Get midpoint
    pub fn midpoint(&self) -> Option<Decimal> {
        Some((self.best_bid()? + self.best_ask()?) / Decimal::TWO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_order_book_sorted_best_first() {
        let book = OrderBook::from_json(&json!({
            "bids": [{"price": "0.40", "size": "10"}, {"price": "0.45", "size": "5"}],
            "asks": [{"price": "0.55", "size": "7"}, {"price": "0.50", "size": "3"}, {"price": "bad", "size": "1"}]
        }));

        assert_eq!(book.best_bid(), Some(dec!(0.45)));
        assert_eq!(book.best_ask(), Some(dec!(0.50)));
        assert_eq!(book.asks.len(), 2);
        assert_eq!(book.spread(), Some(dec!(0.05)));
        assert_eq!(book.midpoint(), Some(dec!(0.475)));
    }

    #[test]
    fn test_empty_book_has_no_midpoint() {
        let book = OrderBook::from_json(&json!({}));
        assert!(book.midpoint().is_none());
        assert!(book.spread().is_none());
    }

    #[test]
    fn test_decimal_value_accepts_strings_and_numbers() {
        assert_eq!(decimal_value(&json!("0.51")), Some(dec!(0.51)));
        assert_eq!(decimal_value(&json!(0.5)), Some(dec!(0.5)));
        assert_eq!(decimal_value(&json!(null)), None);
        assert_eq!(decimal_value(&json!("n/a")), None);
    }

    #[test]
    fn test_data_items_accepts_both_shapes() {
        let bare: Vec<OpenOrder> = data_items(json!([{"id": "o1", "side": "BUY"}]));
        assert_eq!(bare[0].id, "o1");

        let wrapped: Vec<TradeRecord> =
            data_items(json!({"data": [{"id": "t1", "price": "0.3"}], "next_cursor": "LTE="}));
        assert_eq!(wrapped[0].price, "0.3");

        let neither: Vec<TradeRecord> = data_items(json!("nope"));
        assert!(neither.is_empty());
    }

    #[tokio::test]
    async fn test_authenticated_call_requires_signer() {
        let clob = ClobClient::new("http://127.0.0.1:9", None, 0).unwrap();
        let err = clob.auth_headers("GET", "/data/orders", None).await.unwrap_err();
        assert!(matches!(err, BotError::Auth(_)));
    }
}
