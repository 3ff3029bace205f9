//! Typed bot rules.
//!
//! A bot's condition set arrives as an ordered JSON map of
//! `field → {operator, value}` and is parsed into a closed enum at
//! creation time. Unknown fields and operator/operand mismatches are
//! rejected there, never silently skipped. Evaluation is conjunctive and
//! fail-closed: any referenced quantity that cannot be computed makes
//! its condition false.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::clock::clock_minutes;
use crate::types::{NinetyError, OddsTriple, Outcome, Score};

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

/// Numeric comparison, operand(s) fixed at creation. `Between` bounds are
/// inclusive.
#[derive(Debug, Clone, PartialEq)]
pub enum NumCmp {
    Equals(Decimal),
    NotEquals(Decimal),
    GreaterThan(Decimal),
    LessThan(Decimal),
    Between(Decimal, Decimal),
}

impl NumCmp {
    fn matches(&self, value: Decimal) -> bool {
        match self {
            NumCmp::Equals(t) => value == *t,
            NumCmp::NotEquals(t) => value != *t,
            NumCmp::GreaterThan(t) => value > *t,
            NumCmp::LessThan(t) => value < *t,
            NumCmp::Between(lo, hi) => *lo <= value && value <= *hi,
        }
    }

    fn wire_parts(&self) -> (&'static str, serde_json::Value) {
        match self {
            NumCmp::Equals(t) => ("equals", serde_json::json!(t.to_string())),
            NumCmp::NotEquals(t) => ("not_equals", serde_json::json!(t.to_string())),
            NumCmp::GreaterThan(t) => ("greater_than", serde_json::json!(t.to_string())),
            NumCmp::LessThan(t) => ("less_than", serde_json::json!(t.to_string())),
            NumCmp::Between(lo, hi) => (
                "between",
                serde_json::json!([lo.to_string(), hi.to_string()]),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextCmp {
    Equals,
    NotEquals,
}

impl TextCmp {
    fn matches(&self, actual: &str, expected: &str) -> bool {
        match self {
            TextCmp::Equals => actual == expected,
            TextCmp::NotEquals => actual != expected,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            TextCmp::Equals => "equals",
            TextCmp::NotEquals => "not_equals",
        }
    }
}

/// Which value of an odds triple a condition reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OddsField {
    /// Minimum across the three outcomes.
    Any,
    Home,
    Draw,
    Away,
    /// The side the bot's `team` condition anchors to.
    SelectedTeam,
    /// Lowest odds; ties resolve towards home, then draw.
    Favourite,
    /// Highest odds; ties resolve towards away, then draw.
    Outsider,
}

impl OddsField {
    fn key_suffix(&self) -> &'static str {
        match self {
            OddsField::Any => "any",
            OddsField::Home => "home",
            OddsField::Draw => "draw",
            OddsField::Away => "away",
            OddsField::SelectedTeam => "selected_team",
            OddsField::Favourite => "favourite",
            OddsField::Outsider => "outsider",
        }
    }

    fn read(&self, triple: OddsTriple, anchor: Option<Outcome>) -> Option<Decimal> {
        match self {
            OddsField::Any => triple.lowest(),
            OddsField::Home => triple.home,
            OddsField::Draw => triple.draw,
            OddsField::Away => triple.away,
            OddsField::SelectedTeam => anchor.and_then(|side| triple.get(side)),
            OddsField::Favourite => triple.favourite().map(|(_, v)| v),
            OddsField::Outsider => triple.outsider().map(|(_, v)| v),
        }
    }
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// One parsed condition. The closed set of fields is the whole contract;
/// anything else is rejected at creation.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Country(TextCmp, String),
    Competition(TextCmp, String),
    /// Equality only. Also anchors the `*_selected_team` odds fields and
    /// the selected-team actions.
    Team(String),
    /// Live clock in minutes (mm:ss → minutes + seconds/60).
    MatchTime(NumCmp),
    HomeGoals(NumCmp),
    AwayGoals(NumCmp),
    /// Absolute score differential.
    ScoreDifference(NumCmp),
    InitialOdds(OddsField, NumCmp),
    LiveOdds(OddsField, NumCmp),
}

impl Condition {
    /// Parse one `field → {operator, value}` entry.
    pub fn parse(
        field: &str,
        operator: &str,
        value: serde_json::Value,
    ) -> Result<Condition, NinetyError> {
        let condition = match field {
            "country" => Condition::Country(text_cmp(field, operator)?, text_operand(field, value)?),
            "competition" => {
                Condition::Competition(text_cmp(field, operator)?, text_operand(field, value)?)
            }
            "team" => {
                if operator != "equals" {
                    return Err(NinetyError::InvalidCondition(format!(
                        "field team supports only equals, got {operator}"
                    )));
                }
                Condition::Team(text_operand(field, value)?)
            }
            "match_time" => Condition::MatchTime(num_cmp(field, operator, value)?),
            "home_goals" => Condition::HomeGoals(num_cmp(field, operator, value)?),
            "away_goals" => Condition::AwayGoals(num_cmp(field, operator, value)?),
            "score_difference" => Condition::ScoreDifference(num_cmp(field, operator, value)?),
            _ => {
                let (source, suffix) = match field.strip_prefix("initial_odds_") {
                    Some(suffix) => ("initial", suffix),
                    None => match field.strip_prefix("live_odds_") {
                        Some(suffix) => ("live", suffix),
                        None => {
                            return Err(NinetyError::InvalidCondition(format!(
                                "unknown field: {field}"
                            )))
                        }
                    },
                };
                let odds_field = match suffix {
                    "any" => OddsField::Any,
                    "home" => OddsField::Home,
                    "draw" => OddsField::Draw,
                    "away" => OddsField::Away,
                    "selected_team" => OddsField::SelectedTeam,
                    "favourite" => OddsField::Favourite,
                    "outsider" => OddsField::Outsider,
                    _ => {
                        return Err(NinetyError::InvalidCondition(format!(
                            "unknown field: {field}"
                        )))
                    }
                };
                let cmp = num_cmp(field, operator, value)?;
                if source == "initial" {
                    Condition::InitialOdds(odds_field, cmp)
                } else {
                    Condition::LiveOdds(odds_field, cmp)
                }
            }
        };
        Ok(condition)
    }

    fn evaluate(&self, ctx: &EvalContext, anchor: Option<Outcome>) -> bool {
        match self {
            Condition::Country(cmp, expected) => {
                ctx.country.map_or(false, |actual| cmp.matches(actual, expected))
            }
            Condition::Competition(cmp, expected) => {
                ctx.competition.map_or(false, |actual| cmp.matches(actual, expected))
            }
            Condition::Team(_) => anchor.is_some(),
            Condition::MatchTime(cmp) => {
                clock_minutes(ctx.clock).map_or(false, |minutes| cmp.matches(minutes))
            }
            Condition::HomeGoals(cmp) => {
                ctx.score.map_or(false, |s| cmp.matches(Decimal::from(s.home)))
            }
            Condition::AwayGoals(cmp) => {
                ctx.score.map_or(false, |s| cmp.matches(Decimal::from(s.away)))
            }
            Condition::ScoreDifference(cmp) => {
                ctx.score.map_or(false, |s| cmp.matches(Decimal::from(s.difference())))
            }
            Condition::InitialOdds(field, cmp) => ctx
                .initial
                .and_then(|triple| field.read(triple, anchor))
                .map_or(false, |value| cmp.matches(value)),
            Condition::LiveOdds(field, cmp) => ctx
                .latest
                .and_then(|triple| field.read(triple, anchor))
                .map_or(false, |value| cmp.matches(value)),
        }
    }

    fn wire_parts(&self) -> (String, &'static str, serde_json::Value) {
        match self {
            Condition::Country(cmp, v) => {
                ("country".to_string(), cmp.as_str(), serde_json::json!(v))
            }
            Condition::Competition(cmp, v) => {
                ("competition".to_string(), cmp.as_str(), serde_json::json!(v))
            }
            Condition::Team(v) => ("team".to_string(), "equals", serde_json::json!(v)),
            Condition::MatchTime(cmp) => {
                let (op, value) = cmp.wire_parts();
                ("match_time".to_string(), op, value)
            }
            Condition::HomeGoals(cmp) => {
                let (op, value) = cmp.wire_parts();
                ("home_goals".to_string(), op, value)
            }
            Condition::AwayGoals(cmp) => {
                let (op, value) = cmp.wire_parts();
                ("away_goals".to_string(), op, value)
            }
            Condition::ScoreDifference(cmp) => {
                let (op, value) = cmp.wire_parts();
                ("score_difference".to_string(), op, value)
            }
            Condition::InitialOdds(field, cmp) => {
                let (op, value) = cmp.wire_parts();
                (format!("initial_odds_{}", field.key_suffix()), op, value)
            }
            Condition::LiveOdds(field, cmp) => {
                let (op, value) = cmp.wire_parts();
                (format!("live_odds_{}", field.key_suffix()), op, value)
            }
        }
    }
}

fn text_cmp(field: &str, operator: &str) -> Result<TextCmp, NinetyError> {
    match operator {
        "equals" => Ok(TextCmp::Equals),
        "not_equals" => Ok(TextCmp::NotEquals),
        other => Err(NinetyError::InvalidCondition(format!(
            "field {field} supports equals/not_equals, got {other}"
        ))),
    }
}

fn text_operand(field: &str, value: serde_json::Value) -> Result<String, NinetyError> {
    match value {
        serde_json::Value::String(s) => Ok(s),
        other => Err(NinetyError::InvalidCondition(format!(
            "field {field} needs a string operand, got {other}"
        ))),
    }
}

fn decimal_operand(field: &str, value: &serde_json::Value) -> Result<Decimal, NinetyError> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.to_string().parse::<Decimal>().ok(),
        serde_json::Value::String(s) => s.trim().parse::<Decimal>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        NinetyError::InvalidCondition(format!("field {field} needs a numeric operand, got {value}"))
    })
}

fn num_cmp(field: &str, operator: &str, value: serde_json::Value) -> Result<NumCmp, NinetyError> {
    match operator {
        "equals" => Ok(NumCmp::Equals(decimal_operand(field, &value)?)),
        "not_equals" => Ok(NumCmp::NotEquals(decimal_operand(field, &value)?)),
        "greater_than" => Ok(NumCmp::GreaterThan(decimal_operand(field, &value)?)),
        "less_than" => Ok(NumCmp::LessThan(decimal_operand(field, &value)?)),
        "between" => match &value {
            serde_json::Value::Array(bounds) if bounds.len() == 2 => Ok(NumCmp::Between(
                decimal_operand(field, &bounds[0])?,
                decimal_operand(field, &bounds[1])?,
            )),
            other => Err(NinetyError::InvalidCondition(format!(
                "field {field} between needs a two-element array, got {other}"
            ))),
        },
        other => Err(NinetyError::InvalidCondition(format!(
            "unknown operator for field {field}: {other}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Rule set
// ---------------------------------------------------------------------------

/// Everything a condition can reference about one live match.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub country: Option<&'a str>,
    pub competition: Option<&'a str>,
    pub home_team: Option<&'a str>,
    pub away_team: Option<&'a str>,
    /// The match row's clock token.
    pub clock: &'a str,
    /// Score from the latest snapshot.
    pub score: Option<Score>,
    pub initial: Option<OddsTriple>,
    pub latest: Option<OddsTriple>,
}

/// An ordered conjunction of conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    conditions: Vec<Condition>,
}

impl RuleSet {
    pub fn new(conditions: Vec<Condition>) -> Self {
        RuleSet { conditions }
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// True only when every condition holds.
    pub fn evaluate(&self, ctx: &EvalContext) -> bool {
        let anchor = self.selected_team(ctx);
        self.conditions.iter().all(|c| c.evaluate(ctx, anchor))
    }

    /// The side the bot's team condition refers to in this match, if the
    /// named team plays in it at all. Comparison is case-insensitive.
    pub fn selected_team(&self, ctx: &EvalContext) -> Option<Outcome> {
        let team = self.conditions.iter().find_map(|c| match c {
            Condition::Team(name) => Some(name),
            _ => None,
        })?;
        let wanted = team.trim().to_lowercase();
        if ctx.home_team.map(|h| h.trim().to_lowercase()) == Some(wanted.clone()) {
            return Some(Outcome::Home);
        }
        if ctx.away_team.map(|a| a.trim().to_lowercase()) == Some(wanted) {
            return Some(Outcome::Away);
        }
        None
    }
}

impl Serialize for RuleSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.conditions.len()))?;
        for condition in &self.conditions {
            let (key, operator, value) = condition.wire_parts();
            map.serialize_entry(
                &key,
                &serde_json::json!({"operator": operator, "value": value}),
            )?;
        }
        map.end()
    }
}

#[derive(Deserialize)]
struct RawCondition {
    operator: String,
    #[serde(default)]
    value: serde_json::Value,
}

impl<'de> Deserialize<'de> for RuleSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RuleSetVisitor;

        impl<'de> Visitor<'de> for RuleSetVisitor {
            type Value = RuleSet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a map of condition fields")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<RuleSet, A::Error> {
                let mut conditions = Vec::new();
                while let Some((field, raw)) = map.next_entry::<String, RawCondition>()? {
                    let condition = Condition::parse(&field, &raw.operator, raw.value)
                        .map_err(serde::de::Error::custom)?;
                    conditions.push(condition);
                }
                Ok(RuleSet { conditions })
            }
        }

        deserializer.deserialize_map(RuleSetVisitor)
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// What a bot does when its conditions hold. Exactly one action per bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotAction {
    PlaceBetHome,
    PlaceBetDraw,
    PlaceBetAway,
    PlaceBetLiveFavourite,
    PlaceBetLiveOutsider,
    PlaceBetInitialFavourite,
    PlaceBetInitialOutsider,
    PlaceBetSelectedTeam,
    PlaceBetNotSelectedTeam,
}

impl BotAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotAction::PlaceBetHome => "place_bet_home",
            BotAction::PlaceBetDraw => "place_bet_draw",
            BotAction::PlaceBetAway => "place_bet_away",
            BotAction::PlaceBetLiveFavourite => "place_bet_live_favourite",
            BotAction::PlaceBetLiveOutsider => "place_bet_live_outsider",
            BotAction::PlaceBetInitialFavourite => "place_bet_initial_favourite",
            BotAction::PlaceBetInitialOutsider => "place_bet_initial_outsider",
            BotAction::PlaceBetSelectedTeam => "place_bet_selected_team",
            BotAction::PlaceBetNotSelectedTeam => "place_bet_not_selected_team",
        }
    }

    /// Pick the outcome to bet on and the odds value the payout is
    /// computed from. `None` means skip: the selection cannot be resolved
    /// or its odds value is missing or zero. Never defaulted.
    pub fn resolve(&self, rules: &RuleSet, ctx: &EvalContext) -> Option<(Outcome, Decimal)> {
        let selection = match self {
            BotAction::PlaceBetHome => (Outcome::Home, ctx.latest?.home?),
            BotAction::PlaceBetDraw => (Outcome::Draw, ctx.latest?.draw?),
            BotAction::PlaceBetAway => (Outcome::Away, ctx.latest?.away?),
            BotAction::PlaceBetLiveFavourite => ctx.latest?.favourite()?,
            BotAction::PlaceBetLiveOutsider => ctx.latest?.outsider()?,
            BotAction::PlaceBetInitialFavourite => ctx.initial?.favourite()?,
            BotAction::PlaceBetInitialOutsider => ctx.initial?.outsider()?,
            BotAction::PlaceBetSelectedTeam => {
                let side = rules.selected_team(ctx)?;
                (side, ctx.latest?.get(side)?)
            }
            BotAction::PlaceBetNotSelectedTeam => {
                let side = match rules.selected_team(ctx)? {
                    Outcome::Home => Outcome::Away,
                    Outcome::Away => Outcome::Home,
                    Outcome::Draw => return None,
                };
                (side, ctx.latest?.get(side)?)
            }
        };
        if selection.1 <= Decimal::ZERO {
            return None;
        }
        Some(selection)
    }
}

impl fmt::Display for BotAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BotAction {
    type Err = NinetyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "place_bet_home" => Ok(BotAction::PlaceBetHome),
            "place_bet_draw" => Ok(BotAction::PlaceBetDraw),
            "place_bet_away" => Ok(BotAction::PlaceBetAway),
            "place_bet_live_favourite" => Ok(BotAction::PlaceBetLiveFavourite),
            "place_bet_live_outsider" => Ok(BotAction::PlaceBetLiveOutsider),
            "place_bet_initial_favourite" => Ok(BotAction::PlaceBetInitialFavourite),
            "place_bet_initial_outsider" => Ok(BotAction::PlaceBetInitialOutsider),
            "place_bet_selected_team" => Ok(BotAction::PlaceBetSelectedTeam),
            "place_bet_not_selected_team" => Ok(BotAction::PlaceBetNotSelectedTeam),
            other => Err(NinetyError::InvalidAction(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn make_ctx<'a>() -> EvalContext<'a> {
        EvalContext {
            country: Some("England"),
            competition: Some("Premier League"),
            home_team: Some("Arsenal"),
            away_team: Some("Chelsea"),
            clock: "63:30",
            score: Some(Score::new(2, 1)),
            initial: Some(OddsTriple::new(
                Some(dec!(1.4)),
                Some(dec!(4.0)),
                Some(dec!(8.0)),
            )),
            latest: Some(OddsTriple::new(
                Some(dec!(1.2)),
                Some(dec!(5.0)),
                Some(dec!(12.0)),
            )),
        }
    }

    fn parse_rules(raw: &str) -> RuleSet {
        serde_json::from_str(raw).unwrap()
    }

    // -- Parsing tests --

    #[test]
    fn test_parse_preserves_document_order() {
        let rules = parse_rules(
            r#"{
                "match_time": {"operator": "greater_than", "value": 80},
                "country": {"operator": "equals", "value": "England"},
                "live_odds_favourite": {"operator": "between", "value": [1.0, 1.5]}
            }"#,
        );
        assert_eq!(rules.len(), 3);
        assert!(matches!(rules.conditions()[0], Condition::MatchTime(_)));
        assert!(matches!(rules.conditions()[1], Condition::Country(_, _)));
        assert!(matches!(
            rules.conditions()[2],
            Condition::LiveOdds(OddsField::Favourite, NumCmp::Between(_, _))
        ));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<RuleSet, _> = serde_json::from_str(
            r#"{"home_red_cards": {"operator": "equals", "value": 1}}"#,
        );
        let err = result.unwrap_err().to_string();
        assert!(err.contains("unknown field"), "{err}");
    }

    #[test]
    fn test_text_field_rejects_numeric_operator() {
        let result: Result<RuleSet, _> = serde_json::from_str(
            r#"{"country": {"operator": "greater_than", "value": "England"}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_team_rejects_not_equals() {
        let result: Result<RuleSet, _> = serde_json::from_str(
            r#"{"team": {"operator": "not_equals", "value": "Arsenal"}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_between_needs_two_bounds() {
        let result: Result<RuleSet, _> = serde_json::from_str(
            r#"{"match_time": {"operator": "between", "value": [10]}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_numeric_operand_accepts_strings() {
        let rules = parse_rules(r#"{"home_goals": {"operator": "equals", "value": "2"}}"#);
        assert!(rules.evaluate(&make_ctx()));
    }

    #[test]
    fn test_serialize_roundtrip_preserves_order() {
        let raw = r#"{
            "live_odds_any": {"operator": "less_than", "value": 2.0},
            "team": {"operator": "equals", "value": "Arsenal"},
            "score_difference": {"operator": "between", "value": [0, 2]}
        }"#;
        let rules = parse_rules(raw);
        let json = serde_json::to_string(&rules).unwrap();
        let reparsed: RuleSet = serde_json::from_str(&json).unwrap();
        assert_eq!(rules, reparsed);
        // Order survives the roundtrip.
        assert!(json.find("live_odds_any").unwrap() < json.find("team").unwrap());
        assert!(json.find("team").unwrap() < json.find("score_difference").unwrap());
    }

    // -- Evaluation tests --

    #[test]
    fn test_static_text_conditions() {
        let ctx = make_ctx();
        let yes = parse_rules(r#"{"country": {"operator": "equals", "value": "England"}}"#);
        assert!(yes.evaluate(&ctx));

        let no = parse_rules(r#"{"country": {"operator": "equals", "value": "Spain"}}"#);
        assert!(!no.evaluate(&ctx));

        let not_spain = parse_rules(r#"{"country": {"operator": "not_equals", "value": "Spain"}}"#);
        assert!(not_spain.evaluate(&ctx));

        // Missing country fails closed even for not_equals.
        let mut blank = make_ctx();
        blank.country = None;
        assert!(!not_spain.evaluate(&blank));
    }

    #[test]
    fn test_match_time_condition() {
        let rules = parse_rules(r#"{"match_time": {"operator": "greater_than", "value": 60}}"#);
        assert!(rules.evaluate(&make_ctx())); // 63:30 → 63.5

        let mut early = make_ctx();
        early.clock = "12:00";
        assert!(!rules.evaluate(&early));

        // Unparsable clock fails closed.
        let mut garbled = make_ctx();
        garbled.clock = "soon";
        assert!(!rules.evaluate(&garbled));
    }

    #[test]
    fn test_goal_conditions() {
        let ctx = make_ctx();
        assert!(parse_rules(r#"{"home_goals": {"operator": "equals", "value": 2}}"#).evaluate(&ctx));
        assert!(parse_rules(r#"{"away_goals": {"operator": "less_than", "value": 2}}"#).evaluate(&ctx));
        assert!(parse_rules(r#"{"score_difference": {"operator": "equals", "value": 1}}"#).evaluate(&ctx));

        let mut no_snapshot = make_ctx();
        no_snapshot.score = None;
        assert!(!parse_rules(r#"{"home_goals": {"operator": "equals", "value": 2}}"#)
            .evaluate(&no_snapshot));
    }

    #[test]
    fn test_odds_conditions() {
        let ctx = make_ctx();
        // any = minimum of the triple.
        assert!(parse_rules(r#"{"live_odds_any": {"operator": "equals", "value": 1.2}}"#).evaluate(&ctx));
        assert!(parse_rules(r#"{"initial_odds_draw": {"operator": "equals", "value": 4.0}}"#).evaluate(&ctx));
        assert!(parse_rules(r#"{"live_odds_favourite": {"operator": "between", "value": [1.0, 1.5]}}"#).evaluate(&ctx));
        assert!(parse_rules(r#"{"live_odds_outsider": {"operator": "greater_than", "value": 10}}"#).evaluate(&ctx));

        // Missing initial row fails closed.
        let mut no_initial = make_ctx();
        no_initial.initial = None;
        assert!(!parse_rules(r#"{"initial_odds_any": {"operator": "less_than", "value": 100}}"#)
            .evaluate(&no_initial));

        // Incomplete triple fails favourite/any closed.
        let mut partial = make_ctx();
        partial.latest = Some(OddsTriple::new(Some(dec!(1.2)), None, Some(dec!(9.0))));
        assert!(!parse_rules(r#"{"live_odds_favourite": {"operator": "less_than", "value": 100}}"#)
            .evaluate(&partial));
        // But a direct leg still reads.
        assert!(parse_rules(r#"{"live_odds_home": {"operator": "equals", "value": 1.2}}"#)
            .evaluate(&partial));
    }

    #[test]
    fn test_selected_team_anchor() {
        let ctx = make_ctx();
        let home_side = parse_rules(
            r#"{
                "team": {"operator": "equals", "value": "arsenal"},
                "live_odds_selected_team": {"operator": "equals", "value": 1.2}
            }"#,
        );
        assert!(home_side.evaluate(&ctx));

        let away_side = parse_rules(
            r#"{
                "team": {"operator": "equals", "value": "Chelsea"},
                "live_odds_selected_team": {"operator": "equals", "value": 12.0}
            }"#,
        );
        assert!(away_side.evaluate(&ctx));

        // Team not in this match: the team condition itself fails.
        let absent = parse_rules(r#"{"team": {"operator": "equals", "value": "Liverpool"}}"#);
        assert!(!absent.evaluate(&ctx));

        // selected_team without a team condition fails closed.
        let no_anchor =
            parse_rules(r#"{"live_odds_selected_team": {"operator": "greater_than", "value": 1}}"#);
        assert!(!no_anchor.evaluate(&ctx));
    }

    #[test]
    fn test_conjunction_short_circuits_false() {
        let rules = parse_rules(
            r#"{
                "country": {"operator": "equals", "value": "England"},
                "home_goals": {"operator": "greater_than", "value": 5}
            }"#,
        );
        assert!(!rules.evaluate(&make_ctx()));
    }

    #[test]
    fn test_between_bounds_inclusive() {
        let rules = parse_rules(r#"{"home_goals": {"operator": "between", "value": [2, 4]}}"#);
        assert!(rules.evaluate(&make_ctx())); // exactly 2
    }

    // -- Action tests --

    #[test]
    fn test_action_tokens_roundtrip() {
        let actions = [
            BotAction::PlaceBetHome,
            BotAction::PlaceBetDraw,
            BotAction::PlaceBetAway,
            BotAction::PlaceBetLiveFavourite,
            BotAction::PlaceBetLiveOutsider,
            BotAction::PlaceBetInitialFavourite,
            BotAction::PlaceBetInitialOutsider,
            BotAction::PlaceBetSelectedTeam,
            BotAction::PlaceBetNotSelectedTeam,
        ];
        for action in actions {
            assert_eq!(action.as_str().parse::<BotAction>().unwrap(), action);
        }
        assert!("place_bet_banker".parse::<BotAction>().is_err());
    }

    #[test]
    fn test_action_fixed_sides_use_latest_leg() {
        let rules = RuleSet::new(vec![]);
        let ctx = make_ctx();
        assert_eq!(
            BotAction::PlaceBetHome.resolve(&rules, &ctx),
            Some((Outcome::Home, dec!(1.2)))
        );
        assert_eq!(
            BotAction::PlaceBetDraw.resolve(&rules, &ctx),
            Some((Outcome::Draw, dec!(5.0)))
        );
    }

    #[test]
    fn test_action_favourite_sources() {
        let rules = RuleSet::new(vec![]);
        let ctx = make_ctx();
        // Live favourite reads the latest triple, initial the first one.
        assert_eq!(
            BotAction::PlaceBetLiveFavourite.resolve(&rules, &ctx),
            Some((Outcome::Home, dec!(1.2)))
        );
        assert_eq!(
            BotAction::PlaceBetInitialFavourite.resolve(&rules, &ctx),
            Some((Outcome::Home, dec!(1.4)))
        );
        assert_eq!(
            BotAction::PlaceBetLiveOutsider.resolve(&rules, &ctx),
            Some((Outcome::Away, dec!(12.0)))
        );
    }

    #[test]
    fn test_action_selected_team_and_opposite() {
        let rules = RuleSet::new(vec![Condition::Team("Chelsea".to_string())]);
        let ctx = make_ctx();
        assert_eq!(
            BotAction::PlaceBetSelectedTeam.resolve(&rules, &ctx),
            Some((Outcome::Away, dec!(12.0)))
        );
        assert_eq!(
            BotAction::PlaceBetNotSelectedTeam.resolve(&rules, &ctx),
            Some((Outcome::Home, dec!(1.2)))
        );

        let strangers = RuleSet::new(vec![Condition::Team("Liverpool".to_string())]);
        assert_eq!(BotAction::PlaceBetSelectedTeam.resolve(&strangers, &ctx), None);
    }

    #[test]
    fn test_action_skips_zero_and_missing_odds() {
        let rules = RuleSet::new(vec![]);
        let mut ctx = make_ctx();
        ctx.latest = Some(OddsTriple::new(Some(Decimal::ZERO), Some(dec!(3.0)), None));
        assert_eq!(BotAction::PlaceBetHome.resolve(&rules, &ctx), None);
        assert_eq!(BotAction::PlaceBetAway.resolve(&rules, &ctx), None);
        assert_eq!(BotAction::PlaceBetLiveFavourite.resolve(&rules, &ctx), None);

        ctx.latest = None;
        assert_eq!(BotAction::PlaceBetDraw.resolve(&rules, &ctx), None);
    }
}
