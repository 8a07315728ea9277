//! Resolution reconciliation
//!
//! Walks the pending bets oldest first, one at a time, and settles every bet
//! whose market has resolved. A failure on one bet is logged and the bet stays
//! pending for the next run.


use crate::error::Result;
use crate::resolution::MarketResolver;
use crate::settlement::settle;
use crate::storage::BetLedger;
use crate::types::{Bet, BetStatus};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One newly settled bet
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedBet {
    pub id: String,
    pub market: String,
    pub side: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub resolution: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub pnl: Decimal,
    pub status: BetStatus,
    pub is_live: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileSummary {
    pub checked: usize,
    pub resolved: usize,
    pub results: Vec<ResolvedBet>,
}

impl ReconcileSummary {
    /// Sum of P&L settled in this run for one partition
    pub fn realized_pnl(&self, is_live: bool) -> Decimal {
        self.results
            .iter()
            .filter(|r| r.is_live == is_live)
            .map(|r| r.pnl)
            .sum()
    }
}

pub struct Reconciler {
    resolver: Arc<MarketResolver>,
    ledger: Arc<dyn BetLedger>,
}

impl Reconciler {
    pub fn new(resolver: Arc<MarketResolver>, ledger: Arc<dyn BetLedger>) -> Self {
        Self { resolver, ledger }
    }

    /// Settle every pending bet whose market has resolved.
    /// Only a failure to list pending bets is returned as an error.
    pub async fn reconcile(&self) -> Result<ReconcileSummary> {
        let pending = self.ledger.pending().await?;

        let mut summary = ReconcileSummary {
            checked: pending.len(),
            ..Default::default()
        };

        for bet in &pending {
            if let Some(line) = self.reconcile_bet(bet).await {
                summary.results.push(line);
            }
        }
        summary.resolved = summary.results.len();

        info!(
            "Reconciled {} pending bets, {} resolved",
            summary.checked, summary.resolved
        );
        Ok(summary)
    }

    async fn reconcile_bet(&self, bet: &Bet) -> Option<ResolvedBet> {
        let Some(side) = bet.normalized_side() else {
            warn!("Bet {} has unknown side {:?}, leaving pending", bet.id, bet.side);
            return None;
        };

        let result = self
            .resolver
            .resolve(
                bet.condition_id.as_deref(),
                bet.market_slug.as_deref(),
                &bet.market,
            )
            .await;

        let outcome = match result.outcome {
            Some(outcome) if result.resolved => outcome,
            _ => {
                debug!("Bet {} ({}) not resolved yet", bet.id, bet.market);
                return None;
            }
        };

        let pnl = settle(side, bet.recommended_price, bet.size, &outcome);
        let status = BetStatus::from_pnl(pnl);

        match self.ledger.settle(&bet.id, &outcome, pnl, status).await {
            Ok(true) => {
                info!(
                    "Bet {} on {:?} resolved {} -> {} ({})",
                    bet.id, bet.market, outcome, status, pnl
                );
                Some(ResolvedBet {
                    id: bet.id.clone(),
                    market: bet.market.clone(),
                    side: bet.side.clone(),
                    price: bet.recommended_price,
                    resolution: outcome,
                    pnl,
                    status,
                    is_live: bet.is_live,
                })
            }
            Ok(false) => {
                debug!("Bet {} was settled by another run", bet.id);
                None
            }
            Err(e) => {
                warn!("Failed to settle bet {}: {}", bet.id, e);
                None
            }
        }
    }
}
