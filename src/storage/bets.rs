//! Reads and writes for `users`, `bots`, `bets` and `bet_events`.
//!
//! Balances and stakes are TEXT decimal columns, so all arithmetic and
//! comparisons happen in Rust. Writes that participate in a larger
//! transaction take `&mut SqliteConnection`; reads are generic over the
//! executor.

use anyhow::{Context, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};
use tracing::warn;

use super::rows::{BetEventRow, BetRow, BotRow, UserRow};
use crate::bots::rules::{BotAction, RuleSet};
use crate::types::{BetKind, BetOutcome, Outcome};

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

pub async fn create_user(
    conn: &mut SqliteConnection,
    email: &str,
    name: Option<&str>,
    balance: Decimal,
) -> Result<i64> {
    let id = sqlx::query_scalar(
        r#"
        INSERT INTO users (email, name, balance, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?4)
        RETURNING user_id
        "#,
    )
    .bind(email)
    .bind(name)
    .bind(balance.to_string())
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub async fn get_user<'e, E>(exec: E, user_id: i64) -> Result<Option<UserRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM users WHERE user_id = ?1")
        .bind(user_id)
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(UserRow::from_row).transpose()
}

pub async fn find_user_by_email<'e, E>(exec: E, email: &str) -> Result<Option<UserRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM users WHERE email = ?1")
        .bind(email)
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(UserRow::from_row).transpose()
}

/// Look up a user by email, creating it with the given starting balance
/// when absent. Returns the user id either way.
pub async fn ensure_user(
    conn: &mut SqliteConnection,
    email: &str,
    name: Option<&str>,
    starting_balance: Decimal,
) -> Result<i64> {
    if let Some(user) = find_user_by_email(&mut *conn, email).await? {
        return Ok(user.user_id);
    }
    create_user(conn, email, name, starting_balance).await
}

/// Subtract from a user's balance. The debit is unconditional; there is
/// no overdraft check.
pub async fn debit_balance(
    conn: &mut SqliteConnection,
    user_id: i64,
    amount: Decimal,
) -> Result<()> {
    adjust_balance(conn, user_id, -amount).await
}

pub async fn credit_balance(
    conn: &mut SqliteConnection,
    user_id: i64,
    amount: Decimal,
) -> Result<()> {
    adjust_balance(conn, user_id, amount).await
}

async fn adjust_balance(conn: &mut SqliteConnection, user_id: i64, delta: Decimal) -> Result<()> {
    let user = get_user(&mut *conn, user_id)
        .await?
        .with_context(|| format!("No such user: {user_id}"))?;
    sqlx::query("UPDATE users SET balance = ?1, updated_at = ?2 WHERE user_id = ?3")
        .bind((user.balance + delta).to_string())
        .bind(Utc::now())
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Bots
// ---------------------------------------------------------------------------

pub async fn create_bot(
    conn: &mut SqliteConnection,
    user_id: i64,
    name: &str,
    rules: &RuleSet,
    action: BotAction,
    stake: Decimal,
) -> Result<i64> {
    let conditions = serde_json::to_string(rules)?;
    let id = sqlx::query_scalar(
        r#"
        INSERT INTO bots (user_id, name, conditions, action, stake, active, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)
        RETURNING bot_id
        "#,
    )
    .bind(user_id)
    .bind(name)
    .bind(&conditions)
    .bind(action.as_str())
    .bind(stake.to_string())
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub async fn find_bot_by_name<'e, E>(exec: E, name: &str) -> Result<Option<BotRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM bots WHERE name = ?1 LIMIT 1")
        .bind(name)
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(BotRow::from_row).transpose()
}

/// All active bots with their conditions parsed. A stored row that no
/// longer parses is skipped with a warning instead of failing the cycle.
pub async fn active_bots(pool: &SqlitePool) -> Result<Vec<BotRow>> {
    let rows = sqlx::query("SELECT * FROM bots WHERE active = 1 ORDER BY bot_id")
        .fetch_all(pool)
        .await?;
    let mut bots = Vec::with_capacity(rows.len());
    for row in &rows {
        match BotRow::from_row(row) {
            Ok(bot) => bots.push(bot),
            Err(e) => warn!(error = %e, "Skipping bot with unparsable stored rules"),
        }
    }
    Ok(bots)
}

// ---------------------------------------------------------------------------
// Bets
// ---------------------------------------------------------------------------

/// Everything needed to record one bot-placed single bet.
#[derive(Debug, Clone)]
pub struct BotBetSlip {
    pub user_id: i64,
    pub bot_id: i64,
    pub match_id: String,
    pub selection: Outcome,
    /// Latest snapshot backing the taken price.
    pub odds_id: i64,
    pub stake: Decimal,
    pub expected_payout: Decimal,
}

/// Whether this bot already holds a bet on this match.
pub async fn bot_bet_exists<'e, E>(exec: E, bot_id: i64, match_id: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM bets WHERE bot_id = ?1 AND match_id = ?2")
            .bind(bot_id)
            .bind(match_id)
            .fetch_one(exec)
            .await?;
    Ok(count > 0)
}

/// Place a bot bet in one transaction: the bet row, its single event
/// against the given snapshot, and the stake debit. Returns `None` when
/// the (bot, match) uniqueness index reports a bet already on the books;
/// nothing is written in that case.
pub async fn place_bot_bet(pool: &SqlitePool, slip: &BotBetSlip) -> Result<Option<i64>> {
    let mut tx = pool.begin().await?;

    let bet_id: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO bets (user_id, kind, stake, expected_payout, outcome,
                          bot_id, match_id, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?7, ?7)
        ON CONFLICT(bot_id, match_id) WHERE bot_id IS NOT NULL DO NOTHING
        RETURNING bet_id
        "#,
    )
    .bind(slip.user_id)
    .bind(BetKind::Single.as_str())
    .bind(slip.stake.to_string())
    .bind(slip.expected_payout.to_string())
    .bind(slip.bot_id)
    .bind(&slip.match_id)
    .bind(Utc::now())
    .fetch_optional(&mut *tx)
    .await?;

    let Some(bet_id) = bet_id else {
        tx.rollback().await?;
        return Ok(None);
    };

    sqlx::query(
        r#"
        INSERT INTO bet_events (bet_id, match_id, selection, odds_id, outcome)
        VALUES (?1, ?2, ?3, ?4, 'pending')
        "#,
    )
    .bind(bet_id)
    .bind(&slip.match_id)
    .bind(slip.selection.as_str())
    .bind(slip.odds_id)
    .execute(&mut *tx)
    .await?;

    debit_balance(&mut *tx, slip.user_id, slip.stake).await?;

    tx.commit().await?;
    Ok(Some(bet_id))
}

/// Plain bet insert without bot attribution, for bets composed event by
/// event (see `add_bet_event`).
pub async fn create_bet(
    conn: &mut SqliteConnection,
    user_id: i64,
    kind: BetKind,
    stake: Decimal,
    expected_payout: Decimal,
) -> Result<i64> {
    let id = sqlx::query_scalar(
        r#"
        INSERT INTO bets (user_id, kind, stake, expected_payout, outcome,
                          created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?5)
        RETURNING bet_id
        "#,
    )
    .bind(user_id)
    .bind(kind.as_str())
    .bind(stake.to_string())
    .bind(expected_payout.to_string())
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub async fn add_bet_event(
    conn: &mut SqliteConnection,
    bet_id: i64,
    match_id: &str,
    selection: Outcome,
    odds_id: i64,
) -> Result<i64> {
    let id = sqlx::query_scalar(
        r#"
        INSERT INTO bet_events (bet_id, match_id, selection, odds_id, outcome)
        VALUES (?1, ?2, ?3, ?4, 'pending')
        RETURNING bet_event_id
        "#,
    )
    .bind(bet_id)
    .bind(match_id)
    .bind(selection.as_str())
    .bind(odds_id)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

// ---------------------------------------------------------------------------
// Settlement ops
// ---------------------------------------------------------------------------

/// Grade every pending event of a match against the winning outcome, in
/// one statement. Returns the distinct bet ids that were touched; events
/// already graded are left alone, so regrading an ended match returns
/// nothing.
pub async fn grade_pending_events(
    conn: &mut SqliteConnection,
    match_id: &str,
    winner: Outcome,
) -> Result<Vec<i64>> {
    let mut ids: Vec<i64> = sqlx::query_scalar(
        r#"
        UPDATE bet_events
        SET outcome = CASE WHEN selection = ?1 THEN 'won' ELSE 'lost' END
        WHERE match_id = ?2 AND outcome = 'pending'
        RETURNING bet_id
        "#,
    )
    .bind(winner.as_str())
    .bind(match_id)
    .fetch_all(conn)
    .await?;
    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

pub async fn events_for_bet<'e, E>(exec: E, bet_id: i64) -> Result<Vec<BetEventRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query("SELECT * FROM bet_events WHERE bet_id = ?1 ORDER BY bet_event_id")
        .bind(bet_id)
        .fetch_all(exec)
        .await?;
    rows.iter().map(BetEventRow::from_row).collect()
}

pub async fn get_bet<'e, E>(exec: E, bet_id: i64) -> Result<Option<BetRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM bets WHERE bet_id = ?1")
        .bind(bet_id)
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(BetRow::from_row).transpose()
}

pub async fn set_bet_outcome(
    conn: &mut SqliteConnection,
    bet_id: i64,
    outcome: BetOutcome,
) -> Result<()> {
    sqlx::query("UPDATE bets SET outcome = ?1, updated_at = ?2 WHERE bet_id = ?3")
        .bind(outcome.as_str())
        .bind(Utc::now())
        .bind(bet_id)
        .execute(conn)
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reads for the status API
// ---------------------------------------------------------------------------

pub async fn recent_bets<'e, E>(exec: E, limit: i64) -> Result<Vec<BetRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query("SELECT * FROM bets ORDER BY created_at DESC, bet_id DESC LIMIT ?1")
        .bind(limit)
        .fetch_all(exec)
        .await?;
    rows.iter().map(BetRow::from_row).collect()
}

pub async fn count_pending_bets<'e, E>(exec: E) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM bets WHERE outcome = 'pending'")
            .fetch_one(exec)
            .await?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bots::rules::{Condition, NumCmp};
    use crate::storage::test_pool;
    use rust_decimal_macros::dec;

    async fn make_pool() -> SqlitePool {
        test_pool().await
    }

    fn make_slip(user_id: i64, bot_id: i64, match_id: &str) -> BotBetSlip {
        BotBetSlip {
            user_id,
            bot_id,
            match_id: match_id.to_string(),
            selection: Outcome::Home,
            odds_id: 1,
            stake: dec!(10),
            expected_payout: dec!(12.5),
        }
    }

    // -- User tests --

    #[tokio::test]
    async fn test_ensure_user_is_idempotent() {
        let pool = make_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let first = ensure_user(&mut conn, "bots@ninety.local", Some("Bots"), dec!(1000))
            .await
            .unwrap();
        let second = ensure_user(&mut conn, "bots@ninety.local", Some("Bots"), dec!(9999))
            .await
            .unwrap();
        assert_eq!(first, second);

        // The starting balance from the first call stands.
        let user = get_user(&pool, first).await.unwrap().unwrap();
        assert_eq!(user.balance, dec!(1000));
    }

    #[tokio::test]
    async fn test_balance_adjustments() {
        let pool = make_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let id = create_user(&mut conn, "a@b.c", None, dec!(100)).await.unwrap();
        debit_balance(&mut conn, id, dec!(10)).await.unwrap();
        credit_balance(&mut conn, id, dec!(25.5)).await.unwrap();

        let user = get_user(&pool, id).await.unwrap().unwrap();
        assert_eq!(user.balance, dec!(115.5));
    }

    // -- Bot tests --

    #[tokio::test]
    async fn test_create_and_load_bot() {
        let pool = make_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let user_id = create_user(&mut conn, "a@b.c", None, dec!(100)).await.unwrap();
        let rules = RuleSet::new(vec![Condition::MatchTime(NumCmp::GreaterThan(dec!(80)))]);
        create_bot(
            &mut conn,
            user_id,
            "late-game",
            &rules,
            BotAction::PlaceBetLiveFavourite,
            dec!(10),
        )
        .await
        .unwrap();

        let bots = active_bots(&pool).await.unwrap();
        assert_eq!(bots.len(), 1);
        assert_eq!(bots[0].name, "late-game");
        assert_eq!(bots[0].rules, rules);
        assert_eq!(bots[0].action, BotAction::PlaceBetLiveFavourite);
        assert_eq!(bots[0].stake, dec!(10));

        assert!(find_bot_by_name(&pool, "late-game").await.unwrap().is_some());
        assert!(find_bot_by_name(&pool, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_active_bots_skips_unparsable_rows() {
        let pool = make_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let user_id = create_user(&mut conn, "a@b.c", None, dec!(100)).await.unwrap();
        create_bot(&mut conn, user_id, "good", &RuleSet::new(vec![]), BotAction::PlaceBetHome, dec!(5))
            .await
            .unwrap();
        // A row written before the field set shrank.
        sqlx::query(
            r#"
            INSERT INTO bots (user_id, name, conditions, action, stake, active, created_at)
            VALUES (?1, 'stale', '{"red_cards": {"operator": "equals", "value": 1}}',
                    'place_bet_home', '5', 1, ?2)
            "#,
        )
        .bind(user_id)
        .bind(Utc::now())
        .execute(&pool)
        .await
        .unwrap();

        let bots = active_bots(&pool).await.unwrap();
        assert_eq!(bots.len(), 1);
        assert_eq!(bots[0].name, "good");
    }

    // -- Bet placement tests --

    #[tokio::test]
    async fn test_place_bot_bet_records_and_debits() {
        let pool = make_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let user_id = create_user(&mut conn, "a@b.c", None, dec!(100)).await.unwrap();
        drop(conn);

        let bet_id = place_bot_bet(&pool, &make_slip(user_id, 1, "m1"))
            .await
            .unwrap()
            .expect("first placement goes through");

        let bet = get_bet(&pool, bet_id).await.unwrap().unwrap();
        assert_eq!(bet.kind, BetKind::Single);
        assert_eq!(bet.outcome, BetOutcome::Pending);
        assert_eq!(bet.stake, dec!(10));
        assert_eq!(bet.expected_payout, dec!(12.5));
        assert_eq!(bet.bot_id, Some(1));
        assert_eq!(bet.match_id, Some("m1".to_string()));

        let events = events_for_bet(&pool, bet_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].selection, Outcome::Home);
        assert_eq!(events[0].odds_id, 1);

        let user = get_user(&pool, user_id).await.unwrap().unwrap();
        assert_eq!(user.balance, dec!(90));
        assert!(bot_bet_exists(&pool, 1, "m1").await.unwrap());
    }

    #[tokio::test]
    async fn test_second_placement_is_a_noop() {
        let pool = make_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let user_id = create_user(&mut conn, "a@b.c", None, dec!(100)).await.unwrap();
        drop(conn);

        let slip = make_slip(user_id, 7, "m1");
        assert!(place_bot_bet(&pool, &slip).await.unwrap().is_some());
        assert!(place_bot_bet(&pool, &slip).await.unwrap().is_none());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bets")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);

        // The losing attempt left no debit behind.
        let user = get_user(&pool, user_id).await.unwrap().unwrap();
        assert_eq!(user.balance, dec!(90));

        // The same bot may still bet on a different match.
        assert!(place_bot_bet(&pool, &make_slip(user_id, 7, "m2"))
            .await
            .unwrap()
            .is_some());
    }

    // -- Settlement op tests --

    #[tokio::test]
    async fn test_grade_pending_events_is_one_shot() {
        let pool = make_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let user_id = create_user(&mut conn, "a@b.c", None, dec!(100)).await.unwrap();
        drop(conn);

        let winner_bet = place_bot_bet(&pool, &make_slip(user_id, 1, "m1"))
            .await
            .unwrap()
            .unwrap();
        let mut loser_slip = make_slip(user_id, 2, "m1");
        loser_slip.selection = Outcome::Away;
        let loser_bet = place_bot_bet(&pool, &loser_slip).await.unwrap().unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let touched = grade_pending_events(&mut conn, "m1", Outcome::Home)
            .await
            .unwrap();
        assert_eq!(touched.len(), 2);

        let won = events_for_bet(&pool, winner_bet).await.unwrap();
        assert_eq!(won[0].outcome, BetOutcome::Won);
        let lost = events_for_bet(&pool, loser_bet).await.unwrap();
        assert_eq!(lost[0].outcome, BetOutcome::Lost);

        // Nothing pending remains, so a second pass touches nothing.
        let again = grade_pending_events(&mut conn, "m1", Outcome::Home)
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_bet_outcome_update() {
        let pool = make_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let user_id = create_user(&mut conn, "a@b.c", None, dec!(100)).await.unwrap();

        let bet_id = create_bet(&mut conn, user_id, BetKind::Parlay, dec!(5), dec!(40)).await.unwrap();
        add_bet_event(&mut conn, bet_id, "m1", Outcome::Home, 1).await.unwrap();
        add_bet_event(&mut conn, bet_id, "m2", Outcome::Draw, 2).await.unwrap();

        set_bet_outcome(&mut conn, bet_id, BetOutcome::Lost).await.unwrap();
        let bet = get_bet(&pool, bet_id).await.unwrap().unwrap();
        assert_eq!(bet.outcome, BetOutcome::Lost);
        assert_eq!(events_for_bet(&pool, bet_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_recent_bets_and_pending_count() {
        let pool = make_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let user_id = create_user(&mut conn, "a@b.c", None, dec!(100)).await.unwrap();
        drop(conn);

        for (bot_id, m) in [(1, "m1"), (2, "m2"), (3, "m3")] {
            place_bot_bet(&pool, &make_slip(user_id, bot_id, m)).await.unwrap();
        }

        let recent = recent_bets(&pool, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(count_pending_bets(&pool).await.unwrap(), 3);

        let mut conn = pool.acquire().await.unwrap();
        set_bet_outcome(&mut conn, recent[0].bet_id, BetOutcome::Won).await.unwrap();
        assert_eq!(count_pending_bets(&pool).await.unwrap(), 2);
    }
}
