//! Ideation oracle
//!
//! An LLM reads a live market snapshot plus the operator's prompt and answers
//! with a JSON cycle report holding trade ideas ("hypos"). This module owns
//! the report format and its tolerant parser; [`llm`] owns the HTTP side.

mod llm;

pub use llm::{LlmOracle, LlmProvider};

use crate::client::clob::decimal_value;
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Raw text kept in the fallback log line
const RAW_PREVIEW_CHARS: usize = 200;

/// Input for one ideation call
#[derive(Debug, Clone)]
pub struct IdeationRequest {
    pub cycle: u64,
    pub bankroll: Decimal,
    pub system_prompt: String,
}

/// Source of cycle reports
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdeationOracle: Send + Sync {
    async fn ideate(&self, request: &IdeationRequest) -> Result<CycleReport>;
}

/// One trade idea
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hypo {
    #[serde(default)]
    pub market: String,
    /// BUY / SELL or one of the YES / NO aliases
    #[serde(default)]
    pub action: String,
    #[serde(
        default,
        deserialize_with = "lenient_decimal",
        serialize_with = "rust_decimal::serde::float::serialize"
    )]
    pub size: Decimal,
    #[serde(
        default,
        deserialize_with = "lenient_decimal",
        serialize_with = "rust_decimal::serde::float::serialize"
    )]
    pub pnl: Decimal,
    #[serde(
        default,
        deserialize_with = "lenient_opt_decimal",
        serialize_with = "rust_decimal::serde::float_option::serialize"
    )]
    pub price: Option<Decimal>,
    #[serde(
        default,
        deserialize_with = "lenient_opt_decimal",
        serialize_with = "rust_decimal::serde::float_option::serialize"
    )]
    pub edge: Option<Decimal>,
    #[serde(
        default,
        alias = "kellyF",
        deserialize_with = "lenient_opt_decimal",
        serialize_with = "rust_decimal::serde::float_option::serialize"
    )]
    pub kelly_f: Option<Decimal>,
    #[serde(
        default,
        rename = "tokenId",
        alias = "token_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub token_id: Option<String>,
    #[serde(
        default,
        rename = "conditionId",
        alias = "condition_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub condition_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

/// What the oracle returns for one cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub bankroll: Decimal,
    pub sharpe: f64,
    pub mdd: f64,
    pub hypos: Vec<Hypo>,
    pub rules: Vec<String>,
    pub log: String,
}

impl CycleReport {
    /// Report used when the oracle's answer cannot be read
    pub fn fallback(cycle: u64, bankroll: Decimal, raw: &str) -> Self {
        let preview: String = raw.chars().take(RAW_PREVIEW_CHARS).collect();
        Self {
            cycle,
            bankroll,
            sharpe: 0.0,
            mdd: 0.0,
            hypos: Vec::new(),
            rules: vec!["Parse error - using fallback".to_string()],
            log: format!("LLM response was not valid JSON. Raw: {}", preview),
        }
    }
}

/// Parse the oracle's text into a report. Never fails: unreadable output
/// yields [`CycleReport::fallback`] with the bankroll unchanged.
pub fn parse_report(text: &str, cycle: u64, bankroll: Decimal) -> CycleReport {
    let body = extract_fenced(text).unwrap_or(text).trim();

    let obj = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(obj)) => obj,
        _ => {
            tracing::warn!("Unparseable oracle response for cycle {}", cycle);
            return CycleReport::fallback(cycle, bankroll, text);
        }
    };

    let hypos = obj
        .get("hypos")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|h| match serde_json::from_value::<Hypo>(h.clone()) {
                    Ok(hypo) => Some(hypo),
                    Err(e) => {
                        tracing::debug!("Skipping malformed hypo {}: {}", h, e);
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let rules = obj
        .get("rules")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|r| r.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    CycleReport {
        cycle: obj
            .get("cycle")
            .and_then(Value::as_u64)
            .filter(|c| *c > 0)
            .unwrap_or(cycle),
        bankroll: obj
            .get("bankroll")
            .and_then(decimal_value)
            .filter(|b| !b.is_zero())
            .unwrap_or(bankroll),
        sharpe: obj.get("sharpe").and_then(Value::as_f64).unwrap_or(0.0),
        mdd: obj.get("mdd").and_then(Value::as_f64).unwrap_or(0.0),
        hypos,
        rules,
        log: obj
            .get("log")
            .and_then(Value::as_str)
            .filter(|l| !l.is_empty())
            .unwrap_or("Cycle complete")
            .to_string(),
    }
}

/// Contents of the first ```...``` block, language tag stripped
fn extract_fenced(text: &str) -> Option<&str> {
    let start = text.find("```")? + 3;
    let rest = &text[start..];
    let end = rest.find("```")?;
    let block = &rest[..end];

    Some(
        block
            .strip_prefix("json")
            .or_else(|| block.strip_prefix("JSON"))
            .unwrap_or(block),
    )
}

fn lenient_decimal<'de, D>(deserializer: D) -> std::result::Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(decimal_value(&value).unwrap_or(Decimal::ZERO))
}

fn lenient_opt_decimal<'de, D>(deserializer: D) -> std::result::Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(decimal_value(&value))
}
