//! Gamma API client for market data
//!
//! Market lookups used by resolution, plus the liquidity-ranked listing the
//! ideation snapshot is built from.

use crate::error::{BotError, Result};
use crate::resolution::MarketLookup;
use crate::types::{Market, Outcome};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use tracing::debug;

/// Search input is cut to this many characters
const MAX_QUERY_CHARS: usize = 80;

/// Gamma API client for market data
#[derive(Clone)]
pub struct GammaClient {
    http: Client,
    base_url: String,
}

/// Market object as returned by the API. Every field is optional on the wire
/// and may also be `null`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GammaMarket {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub question: Option<String>,
    #[serde(rename = "conditionId")]
    pub condition_id: Option<String>,
    pub slug: Option<String>,
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
    pub end_date_iso: Option<String>,
    pub active: Option<bool>,
    pub closed: Option<bool>,
    pub resolved: Option<bool>,
    #[serde(rename = "volumeNum")]
    pub volume_num: Option<f64>,
    #[serde(rename = "liquidityNum")]
    pub liquidity_num: Option<f64>,
    /// JSON-encoded list, e.g. `"[\"Yes\", \"No\"]"`
    #[serde(deserialize_with = "embedded_list")]
    pub outcomes: Option<Vec<String>>,
    /// JSON-encoded list, e.g. `"[\"0.97\", \"0.03\"]"`
    #[serde(rename = "outcomePrices", deserialize_with = "embedded_list")]
    pub outcome_prices: Option<Vec<String>>,
    #[serde(rename = "clobTokenIds", deserialize_with = "embedded_list")]
    pub clob_token_ids: Option<Vec<String>>,
}

impl GammaClient {
    /// Create a new Gamma client
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch(&self, query: &[(&str, &str)]) -> Result<Vec<GammaMarket>> {
        let url = format!("{}/markets", self.base_url);
        let resp = self.http.get(&url).query(query).send().await?;

        if !resp.status().is_success() {
            return Err(BotError::Api(format!("GET /markets returned {}", resp.status())));
        }

        Ok(resp.json().await?)
    }

    /// Exact lookup by condition id
    pub async fn get_by_condition_id(&self, condition_id: &str) -> Result<Vec<Market>> {
        let raw = self
            .fetch(&[("condition_id", condition_id), ("limit", "1")])
            .await?;
        Ok(raw.into_iter().map(parse_market).collect())
    }

    /// Lookup by URL slug
    pub async fn get_by_slug(&self, slug: &str) -> Result<Vec<Market>> {
        let raw = self.fetch(&[("slug", slug), ("limit", "1")]).await?;
        Ok(raw.into_iter().map(parse_market).collect())
    }

    /// Full-text search, unfiltered
    pub async fn search_markets(&self, query: &str, limit: usize) -> Result<Vec<Market>> {
        let query: String = query.chars().take(MAX_QUERY_CHARS).collect();
        let limit = limit.to_string();
        let raw = self.fetch(&[("query", &query), ("limit", &limit)]).await?;
        Ok(raw.into_iter().map(parse_market).collect())
    }

    /// Search restricted to open markets
    pub async fn search_open_markets(&self, query: &str) -> Result<Vec<Market>> {
        let raw = self
            .fetch(&[
                ("active", "true"),
                ("closed", "false"),
                ("limit", "10"),
                ("query", query),
            ])
            .await?;
        Ok(raw.into_iter().map(parse_market).collect())
    }

    /// Active markets ordered by liquidity, deepest first
    pub async fn get_top_markets(&self, limit: usize) -> Result<Vec<Market>> {
        let limit = limit.to_string();
        let raw = self
            .fetch(&[
                ("active", "true"),
                ("limit", &limit),
                ("order", "liquidityNum"),
                ("ascending", "false"),
            ])
            .await?;

        debug!("Fetched {} top markets", raw.len());
        Ok(raw.into_iter().map(parse_market).collect())
    }
}

#[async_trait]
impl MarketLookup for GammaClient {
    async fn by_condition_id(&self, condition_id: &str) -> Result<Vec<Market>> {
        self.get_by_condition_id(condition_id).await
    }

    async fn by_slug(&self, slug: &str) -> Result<Vec<Market>> {
        self.get_by_slug(slug).await
    }

    async fn search(&self, question: &str) -> Result<Vec<Market>> {
        self.search_markets(question, 10).await
    }
}

/// Convert the wire record into a [`Market`], defaulting anything missing
pub fn parse_market(gm: GammaMarket) -> Market {
    let prices: Vec<Option<Decimal>> = gm
        .outcome_prices
        .unwrap_or_default()
        .iter()
        .map(|p| p.trim().parse::<Decimal>().ok())
        .collect();

    let token_ids = gm.clob_token_ids.unwrap_or_default();

    let names = gm
        .outcomes
        .filter(|o| !o.is_empty())
        .unwrap_or_else(|| vec!["Yes".to_string(), "No".to_string()]);

    let count = names.len().max(prices.len());
    let outcomes = (0..count)
        .map(|i| Outcome {
            label: names
                .get(i)
                .cloned()
                .unwrap_or_else(|| default_label(i).to_string()),
            price: prices.get(i).copied().flatten(),
            token_id: token_ids.get(i).cloned(),
        })
        .collect();

    Market {
        id: gm.id,
        question: gm.question.unwrap_or_default(),
        condition_id: gm.condition_id,
        slug: gm.slug,
        outcomes,
        active: gm.active.unwrap_or(false),
        closed: gm.closed.unwrap_or(false) || gm.resolved.unwrap_or(false),
        end_date: gm.end_date.or(gm.end_date_iso),
        volume: gm
            .volume_num
            .and_then(|v| Decimal::try_from(v).ok())
            .unwrap_or(Decimal::ZERO),
        liquidity: gm
            .liquidity_num
            .and_then(|v| Decimal::try_from(v).ok())
            .unwrap_or(Decimal::ZERO),
    }
}

/// Label used when the outcomes list is shorter than the prices list
pub(crate) fn default_label(index: usize) -> &'static str {
    if index == 0 {
        "Yes"
    } else {
        "No"
    }
}

/// Accept a JSON-encoded list string or a native list; anything else is `None`.
fn embedded_list<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;

    let items = match value {
        Some(serde_json::Value::String(s)) => {
            match serde_json::from_str::<Vec<serde_json::Value>>(&s) {
                Ok(items) => items,
                Err(_) => return Ok(None),
            }
        }
        Some(serde_json::Value::Array(items)) => items,
        _ => return Ok(None),
    };

    Ok(Some(
        items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
    ))
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_string_encoded_arrays() {
        let gm: GammaMarket = serde_json::from_str(
            r#"{
                "id": "123",
                "question": "Will BTC close above 100k?",
                "conditionId": "0xabc",
                "closed": true,
                "outcomes": "[\"Yes\", \"No\"]",
                "outcomePrices": "[\"0.97\", \"0.03\"]",
                "clobTokenIds": "[\"111\", \"222\"]",
                "endDate": "2026-01-01T00:00:00Z"
            }"#,
        )
        .unwrap();

        let market = parse_market(gm);
        assert_eq!(market.condition_id.as_deref(), Some("0xabc"));
        assert!(market.closed);
        assert_eq!(market.outcomes.len(), 2);
        assert_eq!(market.outcomes[0].price, Some(dec!(0.97)));
        assert_eq!(market.outcomes[1].token_id.as_deref(), Some("222"));
        assert_eq!(market.end_date.as_deref(), Some("2026-01-01T00:00:00Z"));
    }

    #[test]
    fn test_parse_native_arrays_and_numeric_id() {
        let gm: GammaMarket = serde_json::from_str(
            r#"{"id": 42, "question": "Q", "outcomes": ["Up", "Down"], "outcomePrices": [0.4, 0.6]}"#,
        )
        .unwrap();

        let market = parse_market(gm);
        assert_eq!(market.id, "42");
        assert_eq!(market.outcomes[0].label, "Up");
        assert_eq!(market.outcomes[1].price, Some(dec!(0.6)));
    }

    #[test]
    fn test_missing_fields_default_to_neutral() {
        let gm: GammaMarket = serde_json::from_str("{}").unwrap();
        let market = parse_market(gm);

        assert_eq!(market.question, "");
        assert!(market.condition_id.is_none());
        assert!(!market.closed);
        assert_eq!(market.volume, Decimal::ZERO);
        assert_eq!(market.liquidity, Decimal::ZERO);
        assert_eq!(market.outcomes.len(), 2);
        assert_eq!(market.outcomes[0].label, "Yes");
        assert!(market.outcomes[0].price.is_none());
    }

    #[test]
    fn test_null_fields_default_to_neutral() {
        let raw: Vec<GammaMarket> = serde_json::from_str(
            r#"[
                {"question": "Other", "active": null},
                {"question": "X", "closed": true, "outcomePrices": "[\"0.97\", \"0.03\"]"},
                {"id": null, "question": null, "closed": null, "conditionId": null, "volumeNum": null}
            ]"#,
        )
        .unwrap();

        let markets: Vec<Market> = raw.into_iter().map(parse_market).collect();
        assert_eq!(markets.len(), 3);
        assert!(!markets[0].active);
        assert!(!markets[0].closed);
        assert_eq!(markets[1].question, "X");
        assert!(markets[1].closed);
        assert_eq!(markets[1].outcomes[0].price, Some(dec!(0.97)));
        assert_eq!(markets[2].id, "");
        assert_eq!(markets[2].question, "");
        assert!(!markets[2].closed);
        assert_eq!(markets[2].volume, Decimal::ZERO);
    }

    #[test]
    fn test_malformed_prices_become_none() {
        let gm: GammaMarket = serde_json::from_str(
            r#"{"question": "Q", "outcomePrices": "not json", "resolved": true}"#,
        )
        .unwrap();

        let market = parse_market(gm);
        assert!(market.closed);
        assert!(market.outcomes.iter().all(|o| o.price.is_none()));
    }

    #[test]
    fn test_short_outcome_list_gets_default_labels() {
        let gm: GammaMarket = serde_json::from_str(
            r#"{"outcomes": "[\"Yes\"]", "outcomePrices": "[\"0.02\", \"0.98\"]"}"#,
        )
        .unwrap();

        let market = parse_market(gm);
        assert_eq!(market.outcomes[1].label, "No");
        assert_eq!(market.outcomes[1].price, Some(dec!(0.98)));
    }
}
