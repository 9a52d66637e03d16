use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scheduled match as returned by the odds provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub id: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: DateTime<Utc>,
    pub sport_title: String,
    pub sport_key: String,
    #[serde(default)]
    pub bookmakers: Vec<Bookmaker>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmaker {
    #[serde(default)]
    pub key: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub markets: Vec<BookmakerMarket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmakerMarket {
    pub key: String,
    #[serde(default)]
    pub outcomes: Vec<MarketOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOutcome {
    pub name: String,
    pub price: f64,
}

/// Home / draw / away triple used for odds, verdicts, edges and stakes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Hda<T> {
    pub home: T,
    pub draw: T,
    pub away: T,
}

impl<T> Hda<T> {
    pub fn new(home: T, draw: T, away: T) -> Self {
        Self { home, draw, away }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Hda<U> {
        Hda {
            home: f(self.home),
            draw: f(self.draw),
            away: f(self.away),
        }
    }
}

/// Home / away pair for per-side aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Sides<T> {
    pub home: T,
    pub away: T,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TeamStats {
    /// Result letters (W/D/L), most recent first.
    pub form: String,
    pub goals_for: f64,
    pub goals_against: f64,
    pub xg_for: f64,
    pub xg_against: f64,
    pub shots_per_game: f64,
    pub possession_avg: f64,
    pub pass_accuracy: f64,
    pub corners_per_game: f64,
    pub fouls_per_game: f64,
    pub cards_per_game: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_advantage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub away_form: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerData {
    pub key_players_available: u32,
    pub top_scorer_available: bool,
    pub key_injuries: u32,
    pub suspensions: u32,
    pub fitness_score: f64,
}

impl Default for PlayerData {
    fn default() -> Self {
        Self {
            key_players_available: 11,
            top_scorer_available: true,
            key_injuries: 0,
            suspensions: 0,
            fitness_score: 90.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueData {
    pub home_advantage_factor: f64,
    pub altitude: f64,
    pub weather_impact: f64,
    pub pitch_condition: f64,
    pub travel_distance: f64,
}

impl Default for VenueData {
    fn default() -> Self {
        Self {
            home_advantage_factor: 0.10,
            altitude: 0.0,
            weather_impact: 0.0,
            pitch_condition: 1.0,
            travel_distance: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Motivation {
    pub match_importance: f64,
    pub league_position_pressure: f64,
    pub recent_form_momentum: f64,
    pub revenge_factor: f64,
    pub fixture_congestion: f64,
    pub rest_days: f64,
}

impl Default for Motivation {
    fn default() -> Self {
        Self {
            match_importance: 5.0,
            league_position_pressure: 5.0,
            recent_form_momentum: 5.0,
            revenge_factor: 0.0,
            fixture_congestion: 5.0,
            rest_days: 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadToHead {
    pub matches: u32,
    pub home_wins: u32,
    pub away_wins: u32,
    pub draws: u32,
    pub avg_goals: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalData {
    pub home_wins: u32,
    pub away_wins: u32,
    pub draws: u32,
    pub home_goals_avg: f64,
    pub away_goals_avg: f64,
    pub head_to_head: HeadToHead,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    pub opening_odds: Hda<f64>,
    pub current_odds: Hda<f64>,
    pub odds_movement: f64,
    pub betting_volume: f64,
    pub sharp_money_indicator: f64,
    pub bookmakers_used: u8,
    /// De-margined implied probabilities, percent.
    pub implied_probabilities: Hda<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictedResult {
    #[serde(rename = "Home Win")]
    HomeWin,
    #[serde(rename = "Draw")]
    Draw,
    #[serde(rename = "Away Win")]
    AwayWin,
    #[serde(rename = "Unavailable")]
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ValueVerdict {
    #[serde(rename = "Value")]
    Value,
    #[default]
    #[serde(rename = "No Value")]
    NoValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelProbabilities {
    pub home_win: f64,
    pub draw: f64,
    pub away_win: f64,
}

impl ModelProbabilities {
    pub fn total(&self) -> f64 {
        self.home_win + self.draw + self.away_win
    }

    pub fn as_hda(&self) -> Hda<f64> {
        Hda::new(self.home_win, self.draw, self.away_win)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvancedStats {
    pub home_elo: f64,
    pub away_elo: f64,
    pub home_form_score: f64,
    pub away_form_score: f64,
    pub home_attack_strength: f64,
    pub away_attack_strength: f64,
    pub venue_advantage: f64,
    pub motivation_differential: f64,
    pub market_confidence: f64,
    pub total_goals_expectancy: f64,
    pub league_competitiveness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub result: PredictedResult,
    pub available: bool,
    pub confidence: u8,
    pub model_probabilities: ModelProbabilities,
    pub expected_goals: Option<String>,
    pub btts: Option<bool>,
    pub btts_probability: f64,
    pub over_2_5: Option<bool>,
    pub over_2_5_probability: f64,
    pub predicted_scoreline: Option<String>,
    pub scoreline_probability: f64,
    pub value_bets: Hda<ValueVerdict>,
    pub kelly_fractions: Hda<f64>,
    pub betting_edges: Hda<f64>,
    pub advanced_stats: Option<AdvancedStats>,
}

impl Prediction {
    /// Placeholder for fixtures whose stats inputs are missing.
    pub fn unavailable() -> Self {
        Self {
            result: PredictedResult::Unavailable,
            available: false,
            confidence: 0,
            model_probabilities: ModelProbabilities {
                home_win: 33.3,
                draw: 33.4,
                away_win: 33.3,
            },
            expected_goals: None,
            btts: None,
            btts_probability: 0.0,
            over_2_5: None,
            over_2_5_probability: 0.0,
            predicted_scoreline: None,
            scoreline_probability: 0.0,
            value_bets: Hda::default(),
            kelly_fractions: Hda::default(),
            betting_edges: Hda::default(),
            advanced_stats: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedMatch {
    #[serde(flatten)]
    pub fixture: Fixture,
    pub team_stats: Option<Sides<TeamStats>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historical_data: Option<HistoricalData>,
    pub player_data: Option<Sides<PlayerData>>,
    pub venue_data: Option<VenueData>,
    pub market_data: Option<MarketData>,
    pub motivation_factors: Option<Sides<Motivation>>,
    pub prediction: Prediction,
    pub last_updated: DateTime<Utc>,
}

impl EnrichedMatch {
    pub fn id(&self) -> &str {
        &self.fixture.id
    }

    pub fn confidence(&self) -> u8 {
        self.prediction.confidence
    }

    /// League filter used by the dashboard: exact key or case-insensitive
    /// substring of the competition name. `"all"` matches everything.
    pub fn matches_league(&self, league: &str) -> bool {
        let league = league.trim();
        if league.is_empty() || league.eq_ignore_ascii_case("all") {
            return true;
        }
        self.fixture.sport_key == league
            || self
                .fixture
                .sport_title
                .to_lowercase()
                .contains(&league.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(sport_key: &str, sport_title: &str) -> EnrichedMatch {
        EnrichedMatch {
            fixture: Fixture {
                id: "m1".to_string(),
                home_team: "Home".to_string(),
                away_team: "Away".to_string(),
                commence_time: Utc.with_ymd_and_hms(2026, 3, 1, 15, 0, 0).unwrap(),
                sport_title: sport_title.to_string(),
                sport_key: sport_key.to_string(),
                bookmakers: Vec::new(),
            },
            team_stats: None,
            historical_data: None,
            player_data: None,
            venue_data: None,
            market_data: None,
            motivation_factors: None,
            prediction: Prediction::unavailable(),
            last_updated: Utc.with_ymd_and_hms(2026, 2, 28, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn league_filter_matches_key_or_title_substring() {
        let m = sample("soccer_epl", "EPL Premier League");
        assert!(m.matches_league("soccer_epl"));
        assert!(m.matches_league("premier"));
        assert!(m.matches_league("all"));
        assert!(!m.matches_league("soccer_spain_la_liga"));
    }

    #[test]
    fn unavailable_prediction_keeps_probability_total() {
        let p = Prediction::unavailable();
        assert!((p.model_probabilities.total() - 100.0).abs() < 1e-9);
        assert_eq!(p.value_bets.home, ValueVerdict::NoValue);
    }

    #[test]
    fn enriched_match_serializes_flat_fixture_fields() {
        let json = serde_json::to_value(sample("soccer_epl", "EPL")).unwrap();
        assert_eq!(json["id"], "m1");
        assert_eq!(json["sport_key"], "soccer_epl");
        assert_eq!(json["prediction"]["result"], "Unavailable");
        assert_eq!(json["prediction"]["value_bets"]["home"], "No Value");
    }
}
