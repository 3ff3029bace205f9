//! Bot engine: evaluates stored rule sets against live matches and places
//! wagers.
//!
//! Placement is guarded twice. A prior-bet check skips the pair cheaply,
//! and the storage layer's (bot, match) uniqueness constraint decides the
//! race when two evaluations slip past it.

pub mod rules;

use std::time::Duration;

use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::SqlitePool;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::storage::bets::{self, BotBetSlip};
use crate::storage::{matches, odds};
use rules::{BotAction, Condition, EvalContext, NumCmp, OddsField, RuleSet};

/// Service account that owns the preset bots.
const PRESET_USER_EMAIL: &str = "bots@ninety.local";
const PRESET_USER_BALANCE: Decimal = dec!(1000);

// ---------------------------------------------------------------------------
// Presets
// ---------------------------------------------------------------------------

/// A seedable bot definition.
#[derive(Debug, Clone)]
pub struct BotPreset {
    pub name: &'static str,
    pub rules: RuleSet,
    pub action: BotAction,
    pub stake: Decimal,
}

/// Back the pregame favourite while its live price is still standing.
pub fn favourite_banker() -> BotPreset {
    BotPreset {
        name: "bet_favourite",
        rules: RuleSet::new(vec![
            Condition::InitialOdds(OddsField::Favourite, NumCmp::Between(dec!(1.0), dec!(1.5))),
            Condition::LiveOdds(OddsField::Favourite, NumCmp::Between(dec!(1.0), dec!(10.0))),
        ]),
        action: BotAction::PlaceBetLiveFavourite,
        stake: dec!(10),
    }
}

/// Back a heavy favourite after the 80th minute.
pub fn late_game_favourite() -> BotPreset {
    BotPreset {
        name: "bet_favourite_late_matches",
        rules: RuleSet::new(vec![
            Condition::MatchTime(NumCmp::GreaterThan(dec!(80))),
            Condition::LiveOdds(OddsField::Favourite, NumCmp::Between(dec!(1.0), dec!(1.5))),
        ]),
        action: BotAction::PlaceBetLiveFavourite,
        stake: dec!(10),
    }
}

pub fn presets() -> Vec<BotPreset> {
    vec![favourite_banker(), late_game_favourite()]
}

/// Create the preset bots under the service account, skipping any name
/// already on file. Returns how many were created.
pub async fn seed_presets(pool: &SqlitePool) -> Result<usize> {
    let mut conn = pool.acquire().await?;
    let user_id = bets::ensure_user(
        &mut conn,
        PRESET_USER_EMAIL,
        Some("ninety bots"),
        PRESET_USER_BALANCE,
    )
    .await?;

    let mut created = 0usize;
    for preset in presets() {
        if bets::find_bot_by_name(&mut *conn, preset.name).await?.is_some() {
            continue;
        }
        bets::create_bot(
            &mut conn,
            user_id,
            preset.name,
            &preset.rules,
            preset.action,
            preset.stake,
        )
        .await?;
        created += 1;
        info!(bot = preset.name, "Seeded preset bot");
    }
    Ok(created)
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct BotRunReport {
    pub bots: usize,
    pub live_matches: usize,
    pub placed: usize,
    pub already_placed: usize,
    pub no_selection: usize,
}

#[derive(Clone)]
pub struct BotEngine {
    pool: SqlitePool,
}

impl BotEngine {
    pub fn new(pool: SqlitePool) -> Self {
        BotEngine { pool }
    }

    /// One evaluation pass: every active bot against every live match
    /// without a prior bet for the pair.
    pub async fn run_all(&self) -> Result<BotRunReport> {
        let bots = bets::active_bots(&self.pool).await?;
        let live = matches::live_matches(&self.pool).await?;
        let mut report = BotRunReport {
            bots: bots.len(),
            live_matches: live.len(),
            ..BotRunReport::default()
        };
        if bots.is_empty() || live.is_empty() {
            return Ok(report);
        }

        for m in &live {
            let latest = odds::latest_for(&self.pool, &m.match_id).await?;
            let initial = odds::initial_for(&self.pool, &m.match_id).await?;
            let ctx = EvalContext {
                country: m.country.as_deref(),
                competition: m.competition_name.as_deref(),
                home_team: m.home_team.as_deref(),
                away_team: m.away_team.as_deref(),
                clock: &m.match_time,
                score: latest.as_ref().and_then(|row| row.score()),
                initial: initial.as_ref().map(|row| row.odds()),
                latest: latest.as_ref().map(|row| row.odds()),
            };

            for bot in &bots {
                if bets::bot_bet_exists(&self.pool, bot.bot_id, &m.match_id).await? {
                    report.already_placed += 1;
                    continue;
                }
                if !bot.rules.evaluate(&ctx) {
                    continue;
                }
                let Some((selection, odds_value)) = bot.action.resolve(&bot.rules, &ctx) else {
                    report.no_selection += 1;
                    debug!(
                        bot = %bot.name,
                        match_id = %m.match_id,
                        "Conditions met but no placeable selection"
                    );
                    continue;
                };
                // The bet event always references the latest snapshot,
                // whatever snapshot priced the action.
                let Some(latest_row) = latest.as_ref() else {
                    report.no_selection += 1;
                    continue;
                };

                let slip = BotBetSlip {
                    user_id: bot.user_id,
                    bot_id: bot.bot_id,
                    match_id: m.match_id.clone(),
                    selection,
                    odds_id: latest_row.odds_id,
                    stake: bot.stake,
                    expected_payout: bot.stake * odds_value,
                };
                match bets::place_bot_bet(&self.pool, &slip).await? {
                    Some(bet_id) => {
                        report.placed += 1;
                        info!(
                            bot = %bot.name,
                            match_id = %m.match_id,
                            bet_id,
                            selection = %selection,
                            odds = %odds_value,
                            stake = %bot.stake,
                            "Bot placed bet"
                        );
                    }
                    None => {
                        report.already_placed += 1;
                        debug!(
                            bot = %bot.name,
                            match_id = %m.match_id,
                            "Bet already on file for pair"
                        );
                    }
                }
            }
        }

        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Runs the engine on a fixed cadence.
pub struct BotWorker {
    pub engine: BotEngine,
    pub interval_secs: u64,
    pub shutdown: watch::Receiver<bool>,
}

impl BotWorker {
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        info!(interval_secs = self.interval_secs, "Bot worker running");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.engine.run_all().await {
                        Ok(report) if report.placed > 0 => info!(
                            bots = report.bots,
                            live = report.live_matches,
                            placed = report.placed,
                            "Bot pass placed bets"
                        ),
                        Ok(report) => debug!(
                            bots = report.bots,
                            live = report.live_matches,
                            "Bot pass placed nothing"
                        ),
                        Err(e) => error!(error = %e, "Bot pass failed, continuing to next"),
                    }
                }
                _ = self.shutdown.changed() => {
                    info!("Bot worker stopping");
                    break;
                }
            }
        }
    }
}
