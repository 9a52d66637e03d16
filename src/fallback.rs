use chrono::{DateTime, Duration, Utc};

use crate::config::EngineConfig;
use crate::enrich::enrich_batch;
use crate::state::{
    Bookmaker, BookmakerMarket, EnrichedMatch, Fixture, Hda, HeadToHead, HistoricalData,
    MarketOutcome, Motivation, PlayerData, TeamStats, VenueData,
};
use crate::stats::{MarketContext, MatchupProfile, StatsBook, TeamProfile};

/// Built-in team profiles. A user-supplied stats book is layered on top.
pub fn builtin_stats_book() -> StatsBook {
    StatsBook::new(
        vec![
            manchester_city(),
            arsenal(),
            real_madrid(),
            barcelona(),
        ],
        vec![
            MatchupProfile {
                home: "Manchester City".to_string(),
                away: "Arsenal".to_string(),
                historical_data: Some(HistoricalData {
                    home_wins: 15,
                    away_wins: 8,
                    draws: 7,
                    home_goals_avg: 2.1,
                    away_goals_avg: 1.4,
                    head_to_head: HeadToHead {
                        matches: 10,
                        home_wins: 6,
                        away_wins: 2,
                        draws: 2,
                        avg_goals: 2.8,
                    },
                }),
                market: MarketContext {
                    opening_odds: Some(Hda::new(1.9, 3.5, 4.0)),
                    betting_volume: 2_500_000.0,
                    sharp_money_indicator: 0.7,
                },
            },
            MatchupProfile {
                home: "Real Madrid".to_string(),
                away: "Barcelona".to_string(),
                historical_data: Some(HistoricalData {
                    home_wins: 45,
                    away_wins: 42,
                    draws: 25,
                    home_goals_avg: 2.2,
                    away_goals_avg: 2.1,
                    head_to_head: HeadToHead {
                        matches: 20,
                        home_wins: 8,
                        away_wins: 7,
                        draws: 5,
                        avg_goals: 3.2,
                    },
                }),
                market: MarketContext {
                    opening_odds: Some(Hda::new(2.2, 3.1, 3.6)),
                    betting_volume: 5_000_000.0,
                    sharp_money_indicator: 0.8,
                },
            },
        ],
    )
}

/// Small fixed data set served when neither the provider nor the store has
/// anything. Always non-empty.
pub fn fallback_matches(now: DateTime<Utc>, cfg: &EngineConfig) -> Vec<EnrichedMatch> {
    let fixtures = fallback_fixtures(now);
    enrich_batch(&fixtures, &builtin_stats_book(), now, cfg)
}

pub fn fallback_fixtures(now: DateTime<Utc>) -> Vec<Fixture> {
    vec![
        fixture(
            "1",
            ("Manchester City", "Arsenal"),
            now + Duration::days(1),
            ("Premier League", "soccer_epl"),
            Hda::new(1.85, 3.4, 4.2),
        ),
        fixture(
            "2",
            ("Real Madrid", "Barcelona"),
            now + Duration::days(2),
            ("La Liga", "soccer_spain_la_liga"),
            Hda::new(2.1, 3.2, 3.8),
        ),
    ]
}

fn fixture(
    id: &str,
    (home, away): (&str, &str),
    kickoff: DateTime<Utc>,
    (title, key): (&str, &str),
    prices: Hda<f64>,
) -> Fixture {
    let outcome = |name: &str, price: f64| MarketOutcome {
        name: name.to_string(),
        price,
    };
    Fixture {
        id: id.to_string(),
        home_team: home.to_string(),
        away_team: away.to_string(),
        commence_time: kickoff,
        sport_title: title.to_string(),
        sport_key: key.to_string(),
        bookmakers: vec![Bookmaker {
            key: "bet365".to_string(),
            title: "Bet365".to_string(),
            last_update: None,
            markets: vec![BookmakerMarket {
                key: "h2h".to_string(),
                outcomes: vec![
                    outcome(home, prices.home),
                    outcome("Draw", prices.draw),
                    outcome(away, prices.away),
                ],
            }],
        }],
    }
}

fn manchester_city() -> TeamProfile {
    TeamProfile {
        name: "Manchester City".to_string(),
        aliases: vec!["Man City".to_string()],
        stats: TeamStats {
            form: "WWWDW".to_string(),
            goals_for: 2.3,
            goals_against: 0.8,
            xg_for: 2.5,
            xg_against: 0.9,
            shots_per_game: 18.2,
            possession_avg: 68.5,
            pass_accuracy: 89.2,
            corners_per_game: 7.1,
            fouls_per_game: 9.8,
            cards_per_game: 1.2,
            home_advantage: Some(0.15),
            away_form: None,
        },
        players: PlayerData {
            key_players_available: 10,
            top_scorer_available: true,
            key_injuries: 1,
            suspensions: 0,
            fitness_score: 92.0,
        },
        venue: VenueData {
            home_advantage_factor: 0.15,
            altitude: 50.0,
            weather_impact: 0.02,
            pitch_condition: 0.95,
            travel_distance: 200.0,
        },
        motivation: Motivation {
            match_importance: 8.0,
            league_position_pressure: 7.0,
            recent_form_momentum: 8.0,
            revenge_factor: 3.0,
            fixture_congestion: 6.0,
            rest_days: 4.0,
        },
    }
}

fn arsenal() -> TeamProfile {
    TeamProfile {
        name: "Arsenal".to_string(),
        aliases: Vec::new(),
        stats: TeamStats {
            form: "WDWLW".to_string(),
            goals_for: 1.9,
            goals_against: 1.1,
            xg_for: 2.1,
            xg_against: 1.3,
            shots_per_game: 15.8,
            possession_avg: 62.1,
            pass_accuracy: 86.7,
            corners_per_game: 5.9,
            fouls_per_game: 11.2,
            cards_per_game: 1.8,
            home_advantage: None,
            away_form: Some(-0.05),
        },
        players: PlayerData {
            key_players_available: 9,
            top_scorer_available: false,
            key_injuries: 2,
            suspensions: 1,
            fitness_score: 85.0,
        },
        venue: VenueData::default(),
        motivation: Motivation {
            match_importance: 9.0,
            league_position_pressure: 8.0,
            recent_form_momentum: 6.0,
            revenge_factor: 7.0,
            fixture_congestion: 7.0,
            rest_days: 3.0,
        },
    }
}

fn real_madrid() -> TeamProfile {
    TeamProfile {
        name: "Real Madrid".to_string(),
        aliases: Vec::new(),
        stats: TeamStats {
            form: "WWWWL".to_string(),
            goals_for: 2.8,
            goals_against: 0.9,
            xg_for: 2.9,
            xg_against: 1.0,
            shots_per_game: 19.5,
            possession_avg: 65.2,
            pass_accuracy: 88.9,
            corners_per_game: 8.2,
            fouls_per_game: 10.1,
            cards_per_game: 1.5,
            home_advantage: Some(0.2),
            away_form: None,
        },
        players: PlayerData {
            key_players_available: 11,
            top_scorer_available: true,
            key_injuries: 0,
            suspensions: 0,
            fitness_score: 95.0,
        },
        venue: VenueData {
            home_advantage_factor: 0.18,
            altitude: 650.0,
            weather_impact: 0.01,
            pitch_condition: 0.98,
            travel_distance: 500.0,
        },
        motivation: Motivation {
            match_importance: 10.0,
            league_position_pressure: 9.0,
            recent_form_momentum: 8.0,
            revenge_factor: 8.0,
            fixture_congestion: 5.0,
            rest_days: 5.0,
        },
    }
}

fn barcelona() -> TeamProfile {
    TeamProfile {
        name: "Barcelona".to_string(),
        aliases: vec!["FC Barcelona".to_string(), "Barça".to_string()],
        stats: TeamStats {
            form: "WDWWW".to_string(),
            goals_for: 2.5,
            goals_against: 1.0,
            xg_for: 2.7,
            xg_against: 1.1,
            shots_per_game: 17.8,
            possession_avg: 70.1,
            pass_accuracy: 91.2,
            corners_per_game: 6.8,
            fouls_per_game: 8.9,
            cards_per_game: 1.1,
            home_advantage: None,
            away_form: Some(0.1),
        },
        players: PlayerData {
            key_players_available: 10,
            top_scorer_available: true,
            key_injuries: 1,
            suspensions: 0,
            fitness_score: 93.0,
        },
        venue: VenueData::default(),
        motivation: Motivation {
            match_importance: 10.0,
            league_position_pressure: 8.0,
            recent_form_momentum: 9.0,
            revenge_factor: 8.0,
            fixture_congestion: 6.0,
            rest_days: 4.0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fallback_set_is_fully_enriched() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let matches = fallback_matches(now, &EngineConfig::default());
        assert_eq!(matches.len(), 2);
        for m in &matches {
            assert!(m.prediction.available, "{} should have a model prediction", m.id());
            assert!(m.market_data.is_some());
            assert_eq!(m.last_updated, now);
            assert!(m.fixture.commence_time > now);
        }
    }
}
