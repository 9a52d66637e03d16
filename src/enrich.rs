use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::elo::{self, EloConfig};
use crate::odds::{self, MarketConsensus};
use crate::state::{
    AdvancedStats, EnrichedMatch, Fixture, Hda, MarketData, ModelProbabilities, Motivation,
    PlayerData, PredictedResult, Prediction, Sides, TeamStats, ValueVerdict, VenueData,
};
use crate::stats::{MarketContext, MatchContext, StatsSource};
use crate::win_prob::{ScoreGrid, clamp, round1, to_percentages};

const GOALS_TOTAL_BASE: f64 = 2.60;
const TEAM_GOALS_BASE: f64 = GOALS_TOTAL_BASE / 2.0;
const XG_WEIGHT: f64 = 0.6;
const ELO_GOAL_SCALE: f64 = 1600.0;
const FORM_WEIGHT: f64 = 0.10;
const MOTIVATION_WEIGHT: f64 = 0.01;
const MOTIVATION_CAP: f64 = 0.15;
const H2H_WEIGHT: f64 = 0.05;
const OVER_LINE: f64 = 2.5;

/// Enriches every fixture, in parallel, preserving input order. A fixture
/// without stats gets placeholder prediction fields; the rest are unaffected.
pub fn enrich_batch(
    fixtures: &[Fixture],
    stats: &dyn StatsSource,
    now: DateTime<Utc>,
    cfg: &EngineConfig,
) -> Vec<EnrichedMatch> {
    fixtures
        .par_iter()
        .map(|fixture| enrich(fixture, stats, now, cfg))
        .collect()
}

pub fn enrich(
    fixture: &Fixture,
    stats: &dyn StatsSource,
    now: DateTime<Utc>,
    cfg: &EngineConfig,
) -> EnrichedMatch {
    match stats.context_for(fixture) {
        Ok(ctx) if context_is_usable(&ctx) => enrich_with_context(fixture, &ctx, now, cfg),
        Ok(_) => {
            warn!(fixture = %fixture.id, "stats context incomplete, prediction unavailable");
            unavailable_match(fixture, now)
        }
        Err(gap) => {
            debug!(%gap, "prediction unavailable");
            unavailable_match(fixture, now)
        }
    }
}

/// Pure enrichment step: identical inputs give identical output.
pub fn enrich_with_context(
    fixture: &Fixture,
    ctx: &MatchContext,
    now: DateTime<Utc>,
    cfg: &EngineConfig,
) -> EnrichedMatch {
    let strength = MatchStrength::compute(ctx);
    let grid = ScoreGrid::new(strength.lambda_home, strength.lambda_away, cfg.max_goals);
    let (p_home, p_draw, p_away) = grid.outcome_probs();
    let probs = to_percentages(p_home, p_draw, p_away);

    let consensus = odds::consensus_for_fixture(fixture);
    let value = assess_value(&probs, consensus.as_ref(), cfg);

    let btts_probability = round1(grid.btts() * 100.0);
    let over_probability = round1(grid.over(OVER_LINE) * 100.0);
    let scoreline = grid.most_likely();
    let result = favourite(&probs);

    let market_confidence = consensus
        .as_ref()
        .map(|c| round1(c.implied.home.max(c.implied.draw).max(c.implied.away) * 100.0))
        .unwrap_or(0.0);

    let prediction = Prediction {
        result,
        available: true,
        confidence: confidence(&probs, result, consensus.as_ref()),
        model_probabilities: probs,
        expected_goals: Some(format!(
            "{:.1} - {:.1}",
            strength.lambda_home, strength.lambda_away
        )),
        btts: Some(btts_probability >= 50.0),
        btts_probability,
        over_2_5: Some(over_probability >= 50.0),
        over_2_5_probability: over_probability,
        predicted_scoreline: Some(format!("{}-{}", scoreline.home, scoreline.away)),
        scoreline_probability: round1(scoreline.probability * 100.0),
        value_bets: value.verdicts,
        kelly_fractions: value.kelly,
        betting_edges: value.edges,
        advanced_stats: Some(AdvancedStats {
            home_elo: strength.elo.home.round(),
            away_elo: strength.elo.away.round(),
            home_form_score: round1(strength.form.home),
            away_form_score: round1(strength.form.away),
            home_attack_strength: round2(strength.attack.home),
            away_attack_strength: round2(strength.attack.away),
            venue_advantage: round1(strength.venue_advantage * 100.0),
            motivation_differential: round1(strength.motivation_diff),
            market_confidence,
            total_goals_expectancy: round2(strength.lambda_home + strength.lambda_away),
            league_competitiveness: round1(clamp(
                100.0 - (strength.elo.home - strength.elo.away).abs() / 4.0,
                0.0,
                100.0,
            )),
        }),
    };

    EnrichedMatch {
        fixture: fixture.clone(),
        team_stats: Some(ctx.team_stats.clone()),
        historical_data: ctx.historical.clone(),
        player_data: Some(ctx.player_data.clone()),
        venue_data: Some(ctx.venue.clone()),
        market_data: consensus
            .as_ref()
            .map(|c| market_data(c, &ctx.market)),
        motivation_factors: Some(ctx.motivation.clone()),
        prediction,
        last_updated: now,
    }
}

/// Record for a fixture that cannot be modelled. Market prices are still
/// attached when the bookmakers quoted the match.
pub fn unavailable_match(fixture: &Fixture, now: DateTime<Utc>) -> EnrichedMatch {
    EnrichedMatch {
        fixture: fixture.clone(),
        team_stats: None,
        historical_data: None,
        player_data: None,
        venue_data: None,
        market_data: odds::consensus_for_fixture(fixture)
            .map(|c| market_data(&c, &MarketContext::default())),
        motivation_factors: None,
        prediction: Prediction::unavailable(),
        last_updated: now,
    }
}

#[derive(Debug, Clone)]
struct MatchStrength {
    elo: Sides<f64>,
    form: Sides<f64>,
    attack: Sides<f64>,
    venue_advantage: f64,
    motivation_diff: f64,
    lambda_home: f64,
    lambda_away: f64,
}

impl MatchStrength {
    fn compute(ctx: &MatchContext) -> Self {
        let elo_cfg = EloConfig::default();
        let (home, away) = (&ctx.team_stats.home, &ctx.team_stats.away);

        let elo = Sides {
            home: elo::rating_from_form(home, elo_cfg),
            away: elo::rating_from_form(away, elo_cfg),
        };
        let form = Sides {
            home: elo::form_score(&home.form),
            away: elo::form_score(&away.form),
        };
        let attack = Sides {
            home: attack_strength(home) * availability(&ctx.player_data.home),
            away: attack_strength(away) * availability(&ctx.player_data.away),
        };
        let defence = Sides {
            home: defensive_weakness(home),
            away: defensive_weakness(away),
        };

        let venue_advantage = venue_advantage(&ctx.venue, home);
        let motivation_diff =
            motivation_score(&ctx.motivation.home) - motivation_score(&ctx.motivation.away);

        let mut lambda_home = TEAM_GOALS_BASE * attack.home * defence.away;
        let mut lambda_away = TEAM_GOALS_BASE * attack.away * defence.home;

        // Elo gap shifts goals from one side to the other.
        let elo_gap = elo.home + elo_cfg.home_adv_pts - elo.away;
        let elo_ratio = 10.0_f64.powf(elo_gap / ELO_GOAL_SCALE).sqrt();
        lambda_home *= elo_ratio;
        lambda_away /= elo_ratio;

        let form_shift = FORM_WEIGHT * (form.home - form.away) / 100.0;
        let motivation_shift =
            clamp(MOTIVATION_WEIGHT * motivation_diff, -MOTIVATION_CAP, MOTIVATION_CAP);
        let h2h_shift = ctx
            .historical
            .as_ref()
            .filter(|h| h.head_to_head.matches > 0)
            .map(|h| {
                let hh = &h.head_to_head;
                H2H_WEIGHT * (hh.home_wins as f64 - hh.away_wins as f64) / hh.matches as f64
            })
            .unwrap_or(0.0);
        let shift = form_shift + motivation_shift + h2h_shift;

        lambda_home *= (1.0 + venue_advantage) * (1.0 + shift);
        lambda_away *= (1.0 + clamp(away.away_form.unwrap_or(0.0), -0.3, 0.3)) * (1.0 - shift);

        Self {
            elo,
            form,
            attack,
            venue_advantage,
            motivation_diff,
            lambda_home: clamp(lambda_home, 0.20, 3.80),
            lambda_away: clamp(lambda_away, 0.20, 3.80),
        }
    }
}

fn attack_strength(stats: &TeamStats) -> f64 {
    let blended = XG_WEIGHT * stats.xg_for + (1.0 - XG_WEIGHT) * stats.goals_for;
    clamp(blended / TEAM_GOALS_BASE, 0.3, 3.0)
}

fn defensive_weakness(stats: &TeamStats) -> f64 {
    let blended = XG_WEIGHT * stats.xg_against + (1.0 - XG_WEIGHT) * stats.goals_against;
    clamp(blended / TEAM_GOALS_BASE, 0.3, 3.0)
}

fn availability(players: &PlayerData) -> f64 {
    let missing_core = 11_u32.saturating_sub(players.key_players_available.min(11)) as f64;
    let mut m = 0.85 + 0.15 * clamp(players.fitness_score, 0.0, 100.0) / 100.0;
    m -= 0.03 * players.key_injuries as f64;
    m -= 0.02 * players.suspensions as f64;
    m -= 0.01 * missing_core;
    if !players.top_scorer_available {
        m -= 0.05;
    }
    clamp(m, 0.70, 1.05)
}

fn venue_advantage(venue: &VenueData, home: &TeamStats) -> f64 {
    let travel = (venue.travel_distance / 10_000.0).min(0.05);
    let altitude = (venue.altitude / 20_000.0).min(0.05);
    let pitch = (1.0 - clamp(venue.pitch_condition, 0.0, 1.0)) * 0.1;
    let adv = venue.home_advantage_factor + home.home_advantage.unwrap_or(0.0) + travel + altitude
        - venue.weather_impact
        - pitch;
    clamp(adv, -0.10, 0.50)
}

fn motivation_score(m: &Motivation) -> f64 {
    m.match_importance + m.league_position_pressure + m.recent_form_momentum
        + 0.5 * m.revenge_factor
        - 0.5 * m.fixture_congestion
        + 0.3 * m.rest_days.min(7.0)
}

fn favourite(p: &ModelProbabilities) -> PredictedResult {
    if p.home_win >= p.draw && p.home_win >= p.away_win {
        PredictedResult::HomeWin
    } else if p.draw >= p.away_win {
        PredictedResult::Draw
    } else {
        PredictedResult::AwayWin
    }
}

fn confidence(
    p: &ModelProbabilities,
    result: PredictedResult,
    consensus: Option<&MarketConsensus>,
) -> u8 {
    let mut sorted = [p.home_win, p.draw, p.away_win];
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let mut score = sorted[0] + 0.5 * (sorted[0] - sorted[1]);
    if let Some(c) = consensus {
        let market_fav = favourite(&ModelProbabilities {
            home_win: c.implied.home,
            draw: c.implied.draw,
            away_win: c.implied.away,
        });
        if market_fav == result {
            score += 5.0;
        }
    }
    clamp(score, 5.0, 95.0).round() as u8
}

#[derive(Debug, Clone)]
struct ValueAssessment {
    verdicts: Hda<ValueVerdict>,
    kelly: Hda<f64>,
    edges: Hda<f64>,
}

fn assess_value(
    probs: &ModelProbabilities,
    consensus: Option<&MarketConsensus>,
    cfg: &EngineConfig,
) -> ValueAssessment {
    let Some(c) = consensus else {
        return ValueAssessment {
            verdicts: Hda::default(),
            kelly: Hda::default(),
            edges: Hda::default(),
        };
    };
    let model = probs.as_hda();
    let assess = |model_pct: f64, market_p: f64, price: f64| {
        let edge = round1(model_pct - market_p * 100.0);
        let p = model_pct / 100.0;
        let positive_return = p * price > 1.0;
        if edge >= cfg.value_edge_threshold && positive_return {
            (ValueVerdict::Value, kelly_fraction(p, price), edge)
        } else {
            (ValueVerdict::NoValue, 0.0, edge)
        }
    };
    let home = assess(model.home, c.implied.home, c.prices.home);
    let draw = assess(model.draw, c.implied.draw, c.prices.draw);
    let away = assess(model.away, c.implied.away, c.prices.away);

    ValueAssessment {
        verdicts: Hda::new(home.0, draw.0, away.0),
        kelly: Hda::new(home.1, draw.1, away.1),
        edges: Hda::new(home.2, draw.2, away.2),
    }
}

/// Full-Kelly stake for win probability `p` at decimal `price`, in [0, 1].
pub fn kelly_fraction(p: f64, price: f64) -> f64 {
    let b = price - 1.0;
    if b <= 0.0 || !p.is_finite() {
        return 0.0;
    }
    let f = (b * p - (1.0 - p)) / b;
    (clamp(f, 0.0, 1.0) * 10_000.0).round() / 10_000.0
}

fn market_data(c: &MarketConsensus, market: &MarketContext) -> MarketData {
    let opening = market.opening_odds.unwrap_or(c.prices);
    MarketData {
        opening_odds: opening,
        current_odds: c.prices,
        odds_movement: round2(c.prices.home - opening.home),
        betting_volume: market.betting_volume,
        sharp_money_indicator: market.sharp_money_indicator,
        bookmakers_used: c.bookmakers_used,
        implied_probabilities: c.implied.map(|p| round1(p * 100.0)),
    }
}

fn context_is_usable(ctx: &MatchContext) -> bool {
    let team_ok = |s: &TeamStats| {
        [
            s.goals_for,
            s.goals_against,
            s.xg_for,
            s.xg_against,
        ]
        .iter()
        .all(|v| v.is_finite() && *v >= 0.0)
    };
    let players_ok = |p: &PlayerData| p.fitness_score.is_finite();
    team_ok(&ctx.team_stats.home)
        && team_ok(&ctx.team_stats.away)
        && players_ok(&ctx.player_data.home)
        && players_ok(&ctx.player_data.away)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
