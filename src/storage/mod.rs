//! Bet ledger persisted in SQLite
//!
//! Rows are only ever inserted as `pending` and later updated once to a
//! terminal status. Every update is conditional on the row still being
//! pending, so two reconcilers racing on the same bet settle it once.

#[cfg(test)]
mod tests;

use crate::error::{BotError, Result};
use crate::types::{Bet, BetStatus, NewBet};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use tracing::info;

/// Persistence seam for bets
#[async_trait]
pub trait BetLedger: Send + Sync {
    /// Insert a new pending bet
    async fn record(&self, bet: NewBet) -> Result<Bet>;

    /// All pending bets, oldest first
    async fn pending(&self) -> Result<Vec<Bet>>;

    /// Move a pending bet to a terminal state. Returns false when the bet was
    /// already resolved (or does not exist) and nothing changed.
    async fn settle(
        &self,
        id: &str,
        outcome: &str,
        pnl: Decimal,
        status: BetStatus,
    ) -> Result<bool>;

    /// Newest first, optionally restricted to one partition
    async fn recent(&self, limit: u32, is_live: Option<bool>) -> Result<Vec<Bet>>;

    async fn summary(&self) -> Result<LedgerSummary>;
}

/// Counts and realized P&L of one partition
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PartitionSummary {
    pub total: u64,
    pub pending: u64,
    pub won: u64,
    pub lost: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub realized_pnl: Decimal,
    /// won / (won + lost), zero before anything settles
    #[serde(with = "rust_decimal::serde::float")]
    pub win_rate: Decimal,
}

impl PartitionSummary {
    fn add(&mut self, status: BetStatus, pnl: Option<Decimal>) {
        self.total += 1;
        match status {
            BetStatus::Pending => self.pending += 1,
            BetStatus::Won => self.won += 1,
            BetStatus::Lost => self.lost += 1,
            BetStatus::Void | BetStatus::Expired => {}
        }
        if let Some(pnl) = pnl {
            self.realized_pnl += pnl;
        }
    }

    fn finish(&mut self) {
        let decided = self.won + self.lost;
        self.win_rate = if decided == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(self.won) / Decimal::from(decided)
        };
    }
}

/// Live and simulated bets, never mixed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerSummary {
    pub live: PartitionSummary,
    pub simulated: PartitionSummary,
}

/// SQLite-backed ledger
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database file at `path`
    pub async fn connect(path: &str) -> Result<Self> {
        let path = shellexpand::tilde(path).into_owned();

        if let Some(parent) = Path::new(&path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init().await?;

        info!("Bet ledger opened at {}", path);
        Ok(db)
    }

    /// Private in-memory database, for tests and dry runs
    pub async fn in_memory() -> Result<Self> {
        // One connection that is never recycled, or the data disappears
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bets (
                id TEXT PRIMARY KEY,
                cycle INTEGER NOT NULL,
                market TEXT NOT NULL,
                condition_id TEXT,
                market_slug TEXT,
                token_id TEXT,
                side TEXT NOT NULL,
                recommended_price TEXT NOT NULL, -- Decimal stored as text
                size TEXT NOT NULL,
                edge TEXT,
                status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'won', 'lost', 'void', 'expired')),
                resolution TEXT,
                pnl TEXT,
                is_live INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                resolved_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_bets_status_created ON bets(status, created_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Single bet by id
    pub async fn get(&self, id: &str) -> Result<Option<Bet>> {
        let row = sqlx::query("SELECT * FROM bets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(bet_from_row).transpose()
    }
}

#[async_trait]
impl BetLedger for Database {
    async fn record(&self, bet: NewBet) -> Result<Bet> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO bets (id, cycle, market, condition_id, market_slug, token_id, side,
                              recommended_price, size, edge, status, is_live, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?)
            "#,
        )
        .bind(&id)
        .bind(bet.cycle as i64)
        .bind(&bet.market)
        .bind(&bet.condition_id)
        .bind(&bet.market_slug)
        .bind(&bet.token_id)
        .bind(&bet.side)
        .bind(bet.recommended_price.to_string())
        .bind(bet.size.to_string())
        .bind(bet.edge.map(|e| e.to_string()))
        .bind(bet.is_live)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(Bet {
            id,
            cycle: bet.cycle,
            market: bet.market,
            condition_id: bet.condition_id,
            market_slug: bet.market_slug,
            token_id: bet.token_id,
            side: bet.side,
            recommended_price: bet.recommended_price,
            size: bet.size,
            edge: bet.edge,
            status: BetStatus::Pending,
            resolution: None,
            pnl: None,
            is_live: bet.is_live,
            created_at,
            resolved_at: None,
        })
    }

    async fn pending(&self) -> Result<Vec<Bet>> {
        let rows = sqlx::query(
            "SELECT * FROM bets WHERE status = 'pending' ORDER BY created_at ASC, rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(bet_from_row).collect()
    }

    async fn settle(
        &self,
        id: &str,
        outcome: &str,
        pnl: Decimal,
        status: BetStatus,
    ) -> Result<bool> {
        if !status.is_terminal() {
            return Err(BotError::InvalidInput(format!(
                "cannot settle bet {} as {}",
                id, status
            )));
        }

        let result = sqlx::query(
            r#"
            UPDATE bets
            SET status = ?, resolution = ?, pnl = ?, resolved_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(status.as_str())
        .bind(outcome)
        .bind(pnl.to_string())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn recent(&self, limit: u32, is_live: Option<bool>) -> Result<Vec<Bet>> {
        let rows = match is_live {
            Some(live) => {
                sqlx::query(
                    "SELECT * FROM bets WHERE is_live = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
                )
                .bind(live)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM bets ORDER BY created_at DESC, rowid DESC LIMIT ?")
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(bet_from_row).collect()
    }

    async fn summary(&self) -> Result<LedgerSummary> {
        let rows = sqlx::query("SELECT status, pnl, is_live FROM bets")
            .fetch_all(&self.pool)
            .await?;

        let mut summary = LedgerSummary::default();
        for row in &rows {
            let status = parse_status(row.try_get("status")?)?;
            let pnl = parse_opt_decimal(row.try_get("pnl")?)?;
            let is_live: bool = row.try_get("is_live")?;

            let partition = if is_live {
                &mut summary.live
            } else {
                &mut summary.simulated
            };
            partition.add(status, pnl);
        }

        summary.live.finish();
        summary.simulated.finish();
        Ok(summary)
    }
}

fn bet_from_row(row: &SqliteRow) -> Result<Bet> {
    let cycle: i64 = row.try_get("cycle")?;

    Ok(Bet {
        id: row.try_get("id")?,
        cycle: cycle.max(0) as u64,
        market: row.try_get("market")?,
        condition_id: row.try_get("condition_id")?,
        market_slug: row.try_get("market_slug")?,
        token_id: row.try_get("token_id")?,
        side: row.try_get("side")?,
        recommended_price: parse_decimal(row.try_get("recommended_price")?)?,
        size: parse_decimal(row.try_get("size")?)?,
        edge: parse_opt_decimal(row.try_get("edge")?)?,
        status: parse_status(row.try_get("status")?)?,
        resolution: row.try_get("resolution")?,
        pnl: parse_opt_decimal(row.try_get("pnl")?)?,
        is_live: row.try_get("is_live")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        resolved_at: row.try_get::<Option<DateTime<Utc>>, _>("resolved_at")?,
    })
}

fn parse_decimal(raw: String) -> Result<Decimal> {
    raw.parse()
        .map_err(|e| BotError::InvalidInput(format!("bad decimal {:?} in ledger: {}", raw, e)))
}

fn parse_opt_decimal(raw: Option<String>) -> Result<Option<Decimal>> {
    raw.map(parse_decimal).transpose()
}

fn parse_status(raw: String) -> Result<BetStatus> {
    raw.parse().map_err(BotError::InvalidInput)
}
