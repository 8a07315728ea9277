//! Market resolution lookup
//!
//! Given a bet's market reference, find the market and decide whether it has
//! settled and which outcome won. Lookups go condition id, then slug, then
//! question search; the first step that yields a market wins. Every failure is
//! treated as "nothing found" so a bet is left pending rather than mis-resolved.


use crate::error::Result;
use crate::types::{Market, Outcome, ResolutionResult};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::debug;

/// Settled price at or above this marks the winner
pub const WIN_THRESHOLD: Decimal = dec!(0.95);
/// Settled price at or below this marks the loser
pub const LOSE_THRESHOLD: Decimal = dec!(0.05);

/// Source of market records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketLookup: Send + Sync {
    async fn by_condition_id(&self, condition_id: &str) -> Result<Vec<Market>>;
    async fn by_slug(&self, slug: &str) -> Result<Vec<Market>>;
    /// Free-text search, unfiltered
    async fn search(&self, question: &str) -> Result<Vec<Market>>;
}

pub struct MarketResolver {
    lookup: Arc<dyn MarketLookup>,
}

impl MarketResolver {
    pub fn new(lookup: Arc<dyn MarketLookup>) -> Self {
        Self { lookup }
    }

    /// Resolve a market reference. Never fails; see module docs.
    pub async fn resolve(
        &self,
        condition_id: Option<&str>,
        slug: Option<&str>,
        question: &str,
    ) -> ResolutionResult {
        match self.find_market(condition_id, slug, question).await {
            Some(market) => resolution_of(&market),
            None => ResolutionResult::unresolved(),
        }
    }

    async fn find_market(
        &self,
        condition_id: Option<&str>,
        slug: Option<&str>,
        question: &str,
    ) -> Option<Market> {
        if let Some(cid) = condition_id.filter(|c| !c.is_empty()) {
            match self.lookup.by_condition_id(cid).await {
                Ok(markets) if !markets.is_empty() => return markets.into_iter().next(),
                Ok(_) => debug!("No market for condition id {}", cid),
                Err(e) => debug!("Condition id lookup {} failed: {}", cid, e),
            }
        }

        if let Some(slug) = slug.filter(|s| !s.is_empty()) {
            match self.lookup.by_slug(slug).await {
                Ok(markets) if !markets.is_empty() => return markets.into_iter().next(),
                Ok(_) => debug!("No market for slug {}", slug),
                Err(e) => debug!("Slug lookup {} failed: {}", slug, e),
            }
        }

        if question.trim().is_empty() {
            return None;
        }

        match self.lookup.search(question).await {
            Ok(markets) => {
                let found = markets
                    .into_iter()
                    .find(|m| question_matches(&m.question, question));
                if found.is_none() {
                    debug!("No search hit matches question {:?}", question);
                }
                found
            }
            Err(e) => {
                debug!("Question search failed: {}", e);
                None
            }
        }
    }
}

/// Case-insensitive equality or containment in either direction.
/// An empty candidate never matches.
pub fn question_matches(candidate: &str, question: &str) -> bool {
    let candidate = candidate.trim().to_lowercase();
    let question = question.trim().to_lowercase();

    if candidate.is_empty() || question.is_empty() {
        return false;
    }

    candidate == question || candidate.contains(&question) || question.contains(&candidate)
}

/// Resolved only when the market is closed and an outcome can be read off its prices
pub fn resolution_of(market: &Market) -> ResolutionResult {
    let outcome = if market.closed {
        extract_outcome(&market.outcomes)
    } else {
        None
    };

    ResolutionResult {
        resolved: outcome.is_some(),
        outcome,
        end_date: market.end_date.clone(),
    }
}

/// Winning label, uppercased. First price >= 0.95 wins; failing that, on a
/// binary market, the complement of the first price <= 0.05.
pub fn extract_outcome(outcomes: &[Outcome]) -> Option<String> {
    if let Some(winner) = outcomes
        .iter()
        .find(|o| o.price.is_some_and(|p| p >= WIN_THRESHOLD))
    {
        return Some(winner.label.to_uppercase());
    }

    if outcomes.len() == 2 {
        let loser = outcomes
            .iter()
            .position(|o| o.price.is_some_and(|p| p <= LOSE_THRESHOLD))?;
        return Some(outcomes[1 - loser].label.to_uppercase());
    }

    None
}
