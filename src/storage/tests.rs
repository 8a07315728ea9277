//! Tests for the bet ledger

#[cfg(test)]
mod tests {
    use super::super::*;
    use rust_decimal_macros::dec;

    fn new_bet(market: &str, side: &str, is_live: bool) -> NewBet {
        NewBet {
            cycle: 1,
            market: market.to_string(),
            condition_id: None,
            market_slug: None,
            token_id: None,
            side: side.to_string(),
            recommended_price: dec!(0.30),
            size: dec!(50),
            edge: Some(dec!(0.07)),
            is_live,
        }
    }

    #[tokio::test]
    async fn test_record_and_read_back() {
        let db = Database::in_memory().await.unwrap();
        let bet = db.record(new_bet("X", "BUY", false)).await.unwrap();

        assert_eq!(bet.status, BetStatus::Pending);
        let stored = db.get(&bet.id).await.unwrap().unwrap();
        assert_eq!(stored.market, "X");
        assert_eq!(stored.recommended_price, dec!(0.30));
        assert_eq!(stored.edge, Some(dec!(0.07)));
        assert!(stored.pnl.is_none());
        assert!(stored.resolved_at.is_none());
    }

    #[tokio::test]
    async fn test_pending_is_oldest_first() {
        let db = Database::in_memory().await.unwrap();
        let a = db.record(new_bet("A", "BUY", false)).await.unwrap();
        let b = db.record(new_bet("B", "SELL", true)).await.unwrap();
        let c = db.record(new_bet("C", "YES", false)).await.unwrap();

        let ids: Vec<String> = db.pending().await.unwrap().into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
    }

    #[tokio::test]
    async fn test_settle_is_conditional_on_pending() {
        let db = Database::in_memory().await.unwrap();
        let bet = db.record(new_bet("X", "BUY", false)).await.unwrap();

        assert!(db.settle(&bet.id, "YES", dec!(35), BetStatus::Won).await.unwrap());
        // Second writer changes nothing
        assert!(!db.settle(&bet.id, "NO", dec!(-15), BetStatus::Lost).await.unwrap());

        let stored = db.get(&bet.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BetStatus::Won);
        assert_eq!(stored.resolution.as_deref(), Some("YES"));
        assert_eq!(stored.pnl, Some(dec!(35)));
        assert!(stored.resolved_at.is_some());
        assert!(db.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_settle_unknown_id_is_noop() {
        let db = Database::in_memory().await.unwrap();
        assert!(!db.settle("missing", "YES", dec!(1), BetStatus::Won).await.unwrap());
    }

    #[tokio::test]
    async fn test_settle_rejects_pending_status() {
        let db = Database::in_memory().await.unwrap();
        let bet = db.record(new_bet("X", "BUY", false)).await.unwrap();
        assert!(db
            .settle(&bet.id, "YES", dec!(1), BetStatus::Pending)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_recent_filters_partition() {
        let db = Database::in_memory().await.unwrap();
        db.record(new_bet("sim-1", "BUY", false)).await.unwrap();
        db.record(new_bet("live-1", "BUY", true)).await.unwrap();
        db.record(new_bet("sim-2", "BUY", false)).await.unwrap();

        let all = db.recent(10, None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].market, "sim-2");

        let live = db.recent(10, Some(true)).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].market, "live-1");

        assert_eq!(db.recent(1, Some(false)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_summary_keeps_partitions_apart() {
        let db = Database::in_memory().await.unwrap();
        let s1 = db.record(new_bet("s1", "BUY", false)).await.unwrap();
        let s2 = db.record(new_bet("s2", "BUY", false)).await.unwrap();
        db.record(new_bet("s3", "BUY", false)).await.unwrap();
        let l1 = db.record(new_bet("l1", "SELL", true)).await.unwrap();

        db.settle(&s1.id, "YES", dec!(35), BetStatus::Won).await.unwrap();
        db.settle(&s2.id, "NO", dec!(-15), BetStatus::Lost).await.unwrap();
        db.settle(&l1.id, "NO", dec!(35), BetStatus::Won).await.unwrap();

        let summary = db.summary().await.unwrap();
        assert_eq!(summary.simulated.total, 3);
        assert_eq!(summary.simulated.pending, 1);
        assert_eq!(summary.simulated.realized_pnl, dec!(20));
        assert_eq!(summary.simulated.win_rate, dec!(0.5));
        assert_eq!(summary.live.won, 1);
        assert_eq!(summary.live.realized_pnl, dec!(35));
        assert_eq!(summary.live.win_rate, Decimal::ONE);
    }

    #[tokio::test]
    async fn test_file_backed_ledger_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bets.db");
        let path = path.to_str().unwrap();

        let id = {
            let db = Database::connect(path).await.unwrap();
            db.record(new_bet("X", "BUY", false)).await.unwrap().id
        };

        let db = Database::connect(path).await.unwrap();
        let pending = db.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
    }
}
