//! Settlement of bets against a finished match.
//!
//! Runs inside the caller's transaction, on the same connection that
//! recorded the ENDED transition. The final score is read from the match's
//! latest snapshot; if there is no snapshot or either score is null the
//! match is left unsettled and a later sweep may retry. Grading never
//! touches an already-graded event, which is what makes settling the same
//! match twice a no-op.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::storage::{bets, odds};
use crate::types::{BetOutcome, Outcome};

/// What one settlement pass did.
#[derive(Debug, Clone)]
pub struct SettlementReport {
    pub match_id: String,
    /// None when settlement was skipped for lack of a final score.
    pub winner: Option<Outcome>,
    /// Bets that had at least one event graded in this pass.
    pub bets_touched: usize,
    pub bets_won: usize,
    pub bets_lost: usize,
    /// Total credited to user balances in this pass.
    pub credited: Decimal,
}

impl SettlementReport {
    fn skipped(match_id: &str) -> Self {
        SettlementReport {
            match_id: match_id.to_string(),
            winner: None,
            bets_touched: 0,
            bets_won: 0,
            bets_lost: 0,
            credited: Decimal::ZERO,
        }
    }
}

/// Settle every pending bet event on one match.
///
/// 1. Read the final score from the latest snapshot.
/// 2. Grade pending events: selection equal to the winner wins, the rest
///    lose.
/// 3. Recompute each touched bet from all of its events: any lost event
///    loses the bet; won only when every event is won; otherwise it stays
///    pending (a parlay waiting on another match).
/// 4. Credit `expected_payout` on a bet's pending-to-won edge, exactly
///    once.
pub async fn settle_match(conn: &mut SqliteConnection, match_id: &str) -> Result<SettlementReport> {
    let Some(latest) = odds::latest_for(&mut *conn, match_id).await? else {
        debug!(match_id, "No snapshot on record, skipping settlement");
        return Ok(SettlementReport::skipped(match_id));
    };
    let Some(score) = latest.score() else {
        debug!(match_id, "Latest snapshot has no final score, skipping settlement");
        return Ok(SettlementReport::skipped(match_id));
    };

    let winner = score.winner();
    let touched = bets::grade_pending_events(&mut *conn, match_id, winner).await?;

    let mut report = SettlementReport {
        match_id: match_id.to_string(),
        winner: Some(winner),
        bets_touched: touched.len(),
        bets_won: 0,
        bets_lost: 0,
        credited: Decimal::ZERO,
    };

    for bet_id in touched {
        let bet = bets::get_bet(&mut *conn, bet_id)
            .await?
            .with_context(|| format!("Bet {bet_id} vanished during settlement"))?;

        let events = bets::events_for_bet(&mut *conn, bet_id).await?;
        let any_lost = events.iter().any(|e| e.outcome == BetOutcome::Lost);
        let any_pending = events.iter().any(|e| e.outcome.is_pending());

        let target = if any_lost {
            BetOutcome::Lost
        } else if any_pending {
            BetOutcome::Pending
        } else {
            BetOutcome::Won
        };

        if target == bet.outcome {
            continue;
        }
        bets::set_bet_outcome(&mut *conn, bet_id, target).await?;

        match target {
            BetOutcome::Won => {
                report.bets_won += 1;
                if bet.outcome.is_pending() {
                    bets::credit_balance(&mut *conn, bet.user_id, bet.expected_payout).await?;
                    report.credited += bet.expected_payout;
                }
            }
            BetOutcome::Lost => report.bets_lost += 1,
            BetOutcome::Pending => {}
        }
    }

    debug!(
        match_id,
        winner = %winner,
        bets_won = report.bets_won,
        bets_lost = report.bets_lost,
        "Settled match"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::record::FeedRecord;
    use crate::storage::bets::{
        add_bet_event, create_bet, create_user, get_bet, get_user, place_bot_bet, BotBetSlip,
    };
    use crate::storage::{odds::record_snapshot, test_pool};
    use crate::types::{BetKind, OddsTriple, Score};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use sqlx::SqlitePool;

    async fn make_pool() -> SqlitePool {
        test_pool().await
    }

    async fn put_snapshot(pool: &SqlitePool, match_id: &str, home: i64, away: i64) -> i64 {
        let rec = FeedRecord {
            match_id: match_id.to_string(),
            competition_name: Some("Premier League".to_string()),
            country: Some("England".to_string()),
            home_team: Some("Arsenal".to_string()),
            away_team: Some("Chelsea".to_string()),
            event_status: "2nd half".to_string(),
            match_time: "90:00".to_string(),
            start_time: Some(Utc::now()),
            score: Score::new(home, away),
            odds: OddsTriple::new(Some(dec!(1.5)), Some(dec!(4.0)), Some(dec!(7.0))),
            fetched_at: Utc::now(),
        };
        let mut conn = pool.acquire().await.unwrap();
        record_snapshot(&mut conn, &rec).await.unwrap()
    }

    async fn make_user(pool: &SqlitePool, balance: Decimal) -> i64 {
        let mut conn = pool.acquire().await.unwrap();
        create_user(&mut conn, "a@b.c", None, balance).await.unwrap()
    }

    fn make_slip(user_id: i64, bot_id: i64, match_id: &str, selection: Outcome) -> BotBetSlip {
        BotBetSlip {
            user_id,
            bot_id,
            match_id: match_id.to_string(),
            selection,
            odds_id: 1,
            stake: dec!(10),
            expected_payout: dec!(25),
        }
    }

    #[tokio::test]
    async fn test_settle_skips_without_snapshot() {
        let pool = make_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let report = settle_match(&mut conn, "unknown").await.unwrap();
        assert_eq!(report.winner, None);
        assert_eq!(report.bets_touched, 0);
    }

    #[tokio::test]
    async fn test_settle_skips_on_null_scores() {
        let pool = make_pool().await;
        sqlx::query(
            r#"
            INSERT INTO latest_odd (match_id, odds_id, event_status, match_time,
                                    home_score, away_score, fetched_at)
            VALUES ('m1', 1, 'ended', '90:00', NULL, NULL, ?1)
            "#,
        )
        .bind(Utc::now())
        .execute(&pool)
        .await
        .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let report = settle_match(&mut conn, "m1").await.unwrap();
        assert_eq!(report.winner, None);
    }

    #[tokio::test]
    async fn test_settle_single_winner_credits_payout() {
        let pool = make_pool().await;
        let user_id = make_user(&pool, dec!(100)).await;

        let mut slip = make_slip(user_id, 1, "m1", Outcome::Home);
        slip.odds_id = put_snapshot(&pool, "m1", 2, 1).await;
        let bet_id = place_bot_bet(&pool, &slip).await.unwrap().unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let report = settle_match(&mut conn, "m1").await.unwrap();
        assert_eq!(report.winner, Some(Outcome::Home));
        assert_eq!(report.bets_won, 1);
        assert_eq!(report.bets_lost, 0);
        assert_eq!(report.credited, dec!(25));

        let bet = get_bet(&pool, bet_id).await.unwrap().unwrap();
        assert_eq!(bet.outcome, BetOutcome::Won);

        // 100 - 10 stake + 25 payout.
        let user = get_user(&pool, user_id).await.unwrap().unwrap();
        assert_eq!(user.balance, dec!(115));
    }

    #[tokio::test]
    async fn test_settle_loser_gets_nothing() {
        let pool = make_pool().await;
        let user_id = make_user(&pool, dec!(100)).await;

        let mut slip = make_slip(user_id, 1, "m1", Outcome::Away);
        slip.odds_id = put_snapshot(&pool, "m1", 2, 1).await;
        let bet_id = place_bot_bet(&pool, &slip).await.unwrap().unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let report = settle_match(&mut conn, "m1").await.unwrap();
        assert_eq!(report.bets_lost, 1);
        assert_eq!(report.credited, Decimal::ZERO);

        let bet = get_bet(&pool, bet_id).await.unwrap().unwrap();
        assert_eq!(bet.outcome, BetOutcome::Lost);

        let user = get_user(&pool, user_id).await.unwrap().unwrap();
        assert_eq!(user.balance, dec!(90));
    }

    #[tokio::test]
    async fn test_settle_level_score_pays_the_draw() {
        let pool = make_pool().await;
        let user_id = make_user(&pool, dec!(100)).await;

        let mut slip = make_slip(user_id, 1, "m1", Outcome::Draw);
        slip.odds_id = put_snapshot(&pool, "m1", 1, 1).await;
        place_bot_bet(&pool, &slip).await.unwrap().unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let report = settle_match(&mut conn, "m1").await.unwrap();
        assert_eq!(report.winner, Some(Outcome::Draw));
        assert_eq!(report.bets_won, 1);
    }

    #[tokio::test]
    async fn test_settlement_is_idempotent() {
        let pool = make_pool().await;
        let user_id = make_user(&pool, dec!(100)).await;

        let mut slip = make_slip(user_id, 1, "m1", Outcome::Home);
        slip.odds_id = put_snapshot(&pool, "m1", 3, 0).await;
        place_bot_bet(&pool, &slip).await.unwrap().unwrap();

        let mut conn = pool.acquire().await.unwrap();
        settle_match(&mut conn, "m1").await.unwrap();
        let second = settle_match(&mut conn, "m1").await.unwrap();

        assert_eq!(second.bets_touched, 0);
        assert_eq!(second.credited, Decimal::ZERO);
        let user = get_user(&pool, user_id).await.unwrap().unwrap();
        assert_eq!(user.balance, dec!(115));
    }

    #[tokio::test]
    async fn test_parlay_waits_for_every_leg() {
        let pool = make_pool().await;
        let user_id = make_user(&pool, dec!(100)).await;

        let odds_m1 = put_snapshot(&pool, "m1", 1, 0).await;
        let odds_m2 = put_snapshot(&pool, "m2", 2, 2).await;

        let mut conn = pool.acquire().await.unwrap();
        let bet_id = create_bet(&mut conn, user_id, BetKind::Parlay, dec!(10), dec!(60))
            .await
            .unwrap();
        add_bet_event(&mut conn, bet_id, "m1", Outcome::Home, odds_m1).await.unwrap();
        add_bet_event(&mut conn, bet_id, "m2", Outcome::Draw, odds_m2).await.unwrap();

        // First leg wins; the parlay still waits on m2.
        settle_match(&mut conn, "m1").await.unwrap();
        let bet = get_bet(&pool, bet_id).await.unwrap().unwrap();
        assert_eq!(bet.outcome, BetOutcome::Pending);
        assert_eq!(get_user(&pool, user_id).await.unwrap().unwrap().balance, dec!(100));

        // Second leg wins; the parlay settles and pays once.
        let report = settle_match(&mut conn, "m2").await.unwrap();
        assert_eq!(report.bets_won, 1);
        assert_eq!(report.credited, dec!(60));
        let bet = get_bet(&pool, bet_id).await.unwrap().unwrap();
        assert_eq!(bet.outcome, BetOutcome::Won);
        assert_eq!(get_user(&pool, user_id).await.unwrap().unwrap().balance, dec!(160));
    }

    #[tokio::test]
    async fn test_parlay_lost_leg_kills_the_bet_early() {
        let pool = make_pool().await;
        let user_id = make_user(&pool, dec!(100)).await;

        let odds_m1 = put_snapshot(&pool, "m1", 0, 2).await;
        let odds_m2 = put_snapshot(&pool, "m2", 1, 0).await;

        let mut conn = pool.acquire().await.unwrap();
        let bet_id = create_bet(&mut conn, user_id, BetKind::Parlay, dec!(10), dec!(60))
            .await
            .unwrap();
        add_bet_event(&mut conn, bet_id, "m1", Outcome::Home, odds_m1).await.unwrap();
        add_bet_event(&mut conn, bet_id, "m2", Outcome::Home, odds_m2).await.unwrap();

        // The first leg loses, so the bet is lost while m2 is still open.
        let report = settle_match(&mut conn, "m1").await.unwrap();
        assert_eq!(report.bets_lost, 1);
        let bet = get_bet(&pool, bet_id).await.unwrap().unwrap();
        assert_eq!(bet.outcome, BetOutcome::Lost);

        // The second leg winning later cannot revive it or pay anything.
        let report = settle_match(&mut conn, "m2").await.unwrap();
        assert_eq!(report.bets_won, 0);
        assert_eq!(report.credited, Decimal::ZERO);
        let bet = get_bet(&pool, bet_id).await.unwrap().unwrap();
        assert_eq!(bet.outcome, BetOutcome::Lost);
        assert_eq!(get_user(&pool, user_id).await.unwrap().unwrap().balance, dec!(100));
    }
}
