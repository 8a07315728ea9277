//! Public data API: positions held by an address

use crate::error::{BotError, Result};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct DataClient {
    http: Client,
    base_url: String,
}

/// One outcome-token holding
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Position {
    pub asset: String,
    pub condition_id: String,
    pub title: String,
    pub outcome: String,
    pub size: f64,
    pub avg_price: f64,
    pub cur_price: f64,
    pub current_value: f64,
    pub cash_pnl: f64,
}

impl DataClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Non-dust positions for `address`
    pub async fn positions(&self, address: &str) -> Result<Vec<Position>> {
        let url = format!("{}/positions", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("user", address), ("sizeThreshold", "0.01")])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(BotError::Api(format!("GET /positions returned {}", resp.status())));
        }

        Ok(resp.json().await?)
    }
}

/// Mark-to-market value of a set of positions
pub fn positions_value(positions: &[Position]) -> Decimal {
    positions
        .iter()
        .filter_map(|p| Decimal::try_from(p.current_value).ok())
        .sum()
}
