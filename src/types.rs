//! Core domain types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction of a binary bet. `Buy` backs "YES", `Sell` backs "NO".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Normalize any label the oracle or ledger may carry.
    pub fn from_alias(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "BUY" | "YES" | "BUY_YES" => Some(Side::Buy),
            "SELL" | "NO" | "BUY_NO" | "SELL_YES" => Some(Side::Sell),
            _ => None,
        }
    }

    /// Outcome label this side wins on
    pub fn backed_outcome(&self) -> &'static str {
        match self {
            Side::Buy => "YES",
            Side::Sell => "NO",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a bet in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    Pending,
    Won,
    Lost,
    /// Market resolved ambiguously. Not produced by reconciliation today.
    Void,
    /// Market never resolved. Not produced by reconciliation today.
    Expired,
}

impl BetStatus {
    /// Status follows the sign of the settled P&L
    pub fn from_pnl(pnl: Decimal) -> Self {
        if pnl >= Decimal::ZERO {
            BetStatus::Won
        } else {
            BetStatus::Lost
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BetStatus::Pending => "pending",
            BetStatus::Won => "won",
            BetStatus::Lost => "lost",
            BetStatus::Void => "void",
            BetStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BetStatus::Pending)
    }
}

impl fmt::Display for BetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BetStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BetStatus::Pending),
            "won" => Ok(BetStatus::Won),
            "lost" => Ok(BetStatus::Lost),
            "void" => Ok(BetStatus::Void),
            "expired" => Ok(BetStatus::Expired),
            other => Err(format!("unknown bet status: {}", other)),
        }
    }
}

/// A recommended or executed wager as stored in the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    pub id: String,
    pub cycle: u64,
    pub market: String,
    pub condition_id: Option<String>,
    pub market_slug: Option<String>,
    pub token_id: Option<String>,
    /// Raw label as recorded; see [`Side::from_alias`]
    pub side: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub recommended_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub size: Decimal,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub edge: Option<Decimal>,
    pub status: BetStatus,
    pub resolution: Option<String>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub pnl: Option<Decimal>,
    pub is_live: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Bet {
    pub fn normalized_side(&self) -> Option<Side> {
        Side::from_alias(&self.side)
    }
}

/// Input for recording a new pending bet
#[derive(Debug, Clone)]
pub struct NewBet {
    pub cycle: u64,
    pub market: String,
    pub condition_id: Option<String>,
    pub market_slug: Option<String>,
    pub token_id: Option<String>,
    pub side: String,
    pub recommended_price: Decimal,
    pub size: Decimal,
    pub edge: Option<Decimal>,
    pub is_live: bool,
}

/// Market record parsed from the market-data API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
    pub question: String,
    pub condition_id: Option<String>,
    pub slug: Option<String>,
    pub outcomes: Vec<Outcome>,
    pub active: bool,
    /// Closed or resolved flag
    pub closed: bool,
    pub end_date: Option<String>,
    pub volume: Decimal,
    pub liquidity: Decimal,
}

/// One outcome of a market with its last (or settled) price
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub label: String,
    pub price: Option<Decimal>,
    pub token_id: Option<String>,
}

impl Market {
    fn price_of(&self, label: &str) -> Option<Decimal> {
        self.outcomes
            .iter()
            .find(|o| o.label.eq_ignore_ascii_case(label))
            .and_then(|o| o.price)
    }

    pub fn yes_price(&self) -> Option<Decimal> {
        self.price_of("yes")
    }

    pub fn no_price(&self) -> Option<Decimal> {
        self.price_of("no")
    }

    /// Token id for the outcome a side backs
    pub fn token_for(&self, side: Side) -> Option<&str> {
        self.outcomes
            .iter()
            .find(|o| o.label.eq_ignore_ascii_case(side.backed_outcome()))
            .and_then(|o| o.token_id.as_deref())
    }
}

/// Outcome of looking a bet's market up
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    pub resolved: bool,
    /// Uppercase winning label
    pub outcome: Option<String>,
    pub end_date: Option<String>,
}

impl ResolutionResult {
    pub fn unresolved() -> Self {
        Self::default()
    }
}
