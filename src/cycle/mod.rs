//! One trading cycle
//!
//! ```text
//! ideate -> record pending bets -> (live) submit orders -> reconcile -> adjust bankroll
//! ```


use crate::error::Result;
use crate::execution::{OrderRequest, OrderSubmitter};
use crate::ideation::{CycleReport, Hypo, IdeationOracle, IdeationRequest};
use crate::reconcile::{ReconcileSummary, Reconciler};
use crate::storage::BetLedger;
use crate::types::{NewBet, Side};
use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Running balances, live and simulated kept apart
pub struct Bankroll {
    inner: RwLock<Balances>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Balances {
    #[serde(with = "rust_decimal::serde::float")]
    pub live: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub simulated: Decimal,
}

impl Bankroll {
    pub fn new(initial: Decimal) -> Self {
        Self {
            inner: RwLock::new(Balances {
                live: initial,
                simulated: initial,
            }),
        }
    }

    pub fn get(&self, is_live: bool) -> Decimal {
        let b = self.inner.read();
        if is_live {
            b.live
        } else {
            b.simulated
        }
    }

    pub fn set(&self, is_live: bool, value: Decimal) {
        let mut b = self.inner.write();
        if is_live {
            b.live = value;
        } else {
            b.simulated = value;
        }
    }

    /// Add realized P&L to one partition, returning the new balance
    pub fn apply(&self, is_live: bool, pnl: Decimal) -> Decimal {
        let mut b = self.inner.write();
        let slot = if is_live { &mut b.live } else { &mut b.simulated };
        *slot += pnl;
        *slot
    }

    /// Credit each partition with the P&L of the bets a reconcile run
    /// just settled. Every caller of `Reconciler::reconcile` goes through here.
    pub fn apply_summary(&self, summary: &ReconcileSummary) -> Balances {
        for is_live in [false, true] {
            let pnl = summary.realized_pnl(is_live);
            if !pnl.is_zero() {
                let balance = self.apply(is_live, pnl);
                info!(
                    "{} bankroll {:+} -> {}",
                    if is_live { "Live" } else { "Simulated" },
                    pnl,
                    balance
                );
            }
        }
        self.snapshot()
    }

    pub fn snapshot(&self) -> Balances {
        *self.inner.read()
    }
}

#[derive(Debug, Clone)]
pub struct CycleRequest {
    pub cycle: u64,
    /// Defaults to the running balance of the partition
    pub bankroll: Option<Decimal>,
    pub system_prompt: String,
    pub live: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Submitted,
    Failed,
}

/// What happened to one live order
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeExecution {
    pub market: String,
    pub token_id: String,
    pub side: Side,
    #[serde(with = "rust_decimal::serde::float")]
    pub size: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub status: TradeStatus,
    pub order_id: Option<String>,
    pub via: Option<String>,
    pub error: Option<String>,
    /// Unix millis
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleOutcome {
    #[serde(flatten)]
    pub report: CycleReport,
    pub recorded: usize,
    pub trades: Vec<TradeExecution>,
    pub resolutions: ReconcileSummary,
    pub balances: Balances,
}

pub struct CycleRunner {
    oracle: Arc<dyn IdeationOracle>,
    ledger: Arc<dyn BetLedger>,
    reconciler: Arc<Reconciler>,
    submitter: Option<Arc<OrderSubmitter>>,
    bankroll: Arc<Bankroll>,
}

impl CycleRunner {
    pub fn new(
        oracle: Arc<dyn IdeationOracle>,
        ledger: Arc<dyn BetLedger>,
        reconciler: Arc<Reconciler>,
        submitter: Option<Arc<OrderSubmitter>>,
        bankroll: Arc<Bankroll>,
    ) -> Self {
        Self {
            oracle,
            ledger,
            reconciler,
            submitter,
            bankroll,
        }
    }

    pub fn bankroll(&self) -> &Bankroll {
        &self.bankroll
    }

    /// Run one cycle. Only an oracle failure aborts it.
    pub async fn run(&self, request: CycleRequest) -> Result<CycleOutcome> {
        let bankroll = request
            .bankroll
            .unwrap_or_else(|| self.bankroll.get(request.live));

        let report = self
            .oracle
            .ideate(&IdeationRequest {
                cycle: request.cycle,
                bankroll,
                system_prompt: request.system_prompt.clone(),
            })
            .await?;

        let mut recorded = 0;
        for hypo in &report.hypos {
            if self.record(report.cycle, hypo, request.live).await {
                recorded += 1;
            }
        }

        let mut trades = Vec::new();
        if request.live {
            match &self.submitter {
                Some(submitter) => {
                    for hypo in report.hypos.iter().filter(|h| h.token_id.is_some()) {
                        if let Some(trade) = execute(submitter, hypo).await {
                            trades.push(trade);
                        }
                    }
                }
                None => warn!("Live cycle requested but no order submitter is configured"),
            }
        }

        let resolutions = match self.reconciler.reconcile().await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Reconciliation after cycle {} failed: {}", report.cycle, e);
                ReconcileSummary::default()
            }
        };

        let balances = self.bankroll.apply_summary(&resolutions);

        info!(
            "Cycle {} done: {} hypos, {} recorded, {} trades, {} resolved",
            report.cycle,
            report.hypos.len(),
            recorded,
            trades.len(),
            resolutions.resolved
        );

        Ok(CycleOutcome {
            report,
            recorded,
            trades,
            resolutions,
            balances,
        })
    }

    async fn record(&self, cycle: u64, hypo: &Hypo, is_live: bool) -> bool {
        if Side::from_alias(&hypo.action).is_none() {
            warn!("Skipping hypo {:?}: unknown action {:?}", hypo.market, hypo.action);
            return false;
        }

        let price = match hypo.price {
            Some(p) if p > Decimal::ZERO && p < Decimal::ONE => p,
            other => {
                warn!("Skipping hypo {:?}: price {:?} outside (0, 1)", hypo.market, other);
                return false;
            }
        };

        let bet = NewBet {
            cycle,
            market: hypo.market.clone(),
            condition_id: hypo.condition_id.clone(),
            market_slug: hypo.slug.clone(),
            token_id: hypo.token_id.clone(),
            side: hypo.action.clone(),
            recommended_price: price,
            size: hypo.size.max(Decimal::ZERO),
            edge: hypo.edge,
            is_live,
        };

        match self.ledger.record(bet).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Failed to record bet on {:?}: {}", hypo.market, e);
                false
            }
        }
    }
}

/// Buy the hypo's outcome token with its stake. Failures become a failed
/// trade line, never an error.
async fn execute(submitter: &OrderSubmitter, hypo: &Hypo) -> Option<TradeExecution> {
    let token_id = hypo.token_id.clone()?;
    let price = hypo.price.unwrap_or(Decimal::ZERO);

    let shares = if price > Decimal::ZERO {
        (hypo.size / price).round_dp_with_strategy(2, RoundingStrategy::ToZero)
    } else {
        Decimal::ZERO
    };

    let mut trade = TradeExecution {
        market: hypo.market.clone(),
        token_id: token_id.clone(),
        side: Side::Buy,
        size: shares,
        price,
        status: TradeStatus::Failed,
        order_id: None,
        via: None,
        error: None,
        timestamp: Utc::now().timestamp_millis(),
    };

    let request = OrderRequest {
        token_id,
        side: Side::Buy,
        size: shares,
        price,
    };

    match submitter.submit(request).await {
        Ok(receipt) => {
            trade.status = TradeStatus::Submitted;
            trade.price = receipt.final_price;
            trade.order_id = receipt.order_id;
            trade.via = Some(receipt.via);
        }
        Err(e) => {
            warn!("Order for {:?} failed: {}", hypo.market, e);
            trade.error = Some(e.to_string());
        }
    }

    Some(trade)
}
