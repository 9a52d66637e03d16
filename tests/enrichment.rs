use chrono::{TimeZone, Utc};

use matchcast::config::EngineConfig;
use matchcast::enrich::{enrich, enrich_batch, enrich_with_context, kelly_fraction};
use matchcast::fallback::{builtin_stats_book, fallback_fixtures};
use matchcast::state::{
    Bookmaker, BookmakerMarket, EnrichedMatch, Fixture, Hda, MarketOutcome, PredictedResult,
    ValueVerdict,
};
use matchcast::stats::StatsSource;

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

fn with_prices(mut fixture: Fixture, prices: Hda<f64>) -> Fixture {
    let (home, away) = (fixture.home_team.clone(), fixture.away_team.clone());
    fixture.bookmakers = vec![Bookmaker {
        key: "testbook".to_string(),
        title: "Test Book".to_string(),
        last_update: None,
        markets: vec![BookmakerMarket {
            key: "h2h".to_string(),
            outcomes: vec![
                MarketOutcome {
                    name: home,
                    price: prices.home,
                },
                MarketOutcome {
                    name: "Draw".to_string(),
                    price: prices.draw,
                },
                MarketOutcome {
                    name: away,
                    price: prices.away,
                },
            ],
        }],
    }];
    fixture
}

/// Fixtures across a spread of market prices, including mispriced ones.
fn priced_fixtures() -> Vec<Fixture> {
    let grid = [
        Hda::new(1.85, 3.4, 4.2),
        Hda::new(3.5, 3.4, 2.1),
        Hda::new(6.0, 4.5, 1.5),
        Hda::new(1.2, 7.0, 13.0),
        Hda::new(2.9, 3.1, 2.6),
        Hda::new(9.0, 5.0, 1.3),
    ];
    let base = fallback_fixtures(now());
    let mut out = Vec::new();
    for (i, prices) in grid.iter().enumerate() {
        for fixture in &base {
            let mut f = with_prices(fixture.clone(), *prices);
            f.id = format!("{}-{i}", fixture.id);
            out.push(f);
        }
    }
    out
}

fn assert_record_invariants(m: &EnrichedMatch) {
    let p = &m.prediction;
    let total = p.model_probabilities.total();
    assert!((total - 100.0).abs() <= 0.1 + 1e-9, "{} sums to {total}", m.id());
    for v in [
        p.model_probabilities.home_win,
        p.model_probabilities.draw,
        p.model_probabilities.away_win,
        p.btts_probability,
        p.over_2_5_probability,
        p.scoreline_probability,
    ] {
        assert!((0.0..=100.0).contains(&v), "{} has probability {v}", m.id());
    }
    assert!(p.confidence <= 100);

    let pairs = [
        (p.value_bets.home, p.kelly_fractions.home),
        (p.value_bets.draw, p.kelly_fractions.draw),
        (p.value_bets.away, p.kelly_fractions.away),
    ];
    for (verdict, kelly) in pairs {
        assert!((0.0..=1.0).contains(&kelly));
        if kelly > 0.0 {
            assert_eq!(verdict, ValueVerdict::Value);
        }
        if verdict == ValueVerdict::NoValue {
            assert_eq!(kelly, 0.0);
        }
    }
}

#[test]
fn every_record_upholds_probability_and_kelly_invariants() {
    let book = builtin_stats_book();
    let matches = enrich_batch(&priced_fixtures(), &book, now(), &EngineConfig::default());
    assert_eq!(matches.len(), 12);
    for m in &matches {
        assert!(m.prediction.available);
        assert_record_invariants(m);
    }
}

#[test]
fn mispriced_underdog_is_flagged_as_value() {
    let book = builtin_stats_book();
    // City at home priced like a heavy underdog.
    let fixture = with_prices(fallback_fixtures(now()).remove(0), Hda::new(6.0, 4.5, 1.5));
    let m = enrich(&fixture, &book, now(), &EngineConfig::default());

    assert_eq!(m.prediction.value_bets.home, ValueVerdict::Value);
    assert!(m.prediction.kelly_fractions.home > 0.0);
    assert!(m.prediction.betting_edges.home >= 5.0);
    assert_eq!(m.prediction.value_bets.away, ValueVerdict::NoValue);
    assert_eq!(m.prediction.kelly_fractions.away, 0.0);
}

#[test]
fn higher_threshold_suppresses_marginal_value() {
    let book = builtin_stats_book();
    let fixture = with_prices(fallback_fixtures(now()).remove(0), Hda::new(6.0, 4.5, 1.5));
    let strict = EngineConfig {
        value_edge_threshold: 99.0,
        ..EngineConfig::default()
    };
    let m = enrich(&fixture, &book, now(), &strict);
    assert_eq!(m.prediction.value_bets, Hda::default());
    assert_eq!(m.prediction.kelly_fractions, Hda::new(0.0, 0.0, 0.0));
    assert_record_invariants(&m);
}

#[test]
fn enrichment_is_deterministic() {
    let book = builtin_stats_book();
    let fixtures = priced_fixtures();
    let cfg = EngineConfig::default();
    let a = enrich_batch(&fixtures, &book, now(), &cfg);
    let b = enrich_batch(&fixtures, &book, now(), &cfg);
    assert_eq!(a, b);

    let ctx = book.context_for(&fixtures[0]).expect("profiles exist");
    let c = enrich_with_context(&fixtures[0], &ctx, now(), &cfg);
    assert_eq!(c, a[0]);
}

#[test]
fn batch_preserves_input_order() {
    let book = builtin_stats_book();
    let fixtures = priced_fixtures();
    let matches = enrich_batch(&fixtures, &book, now(), &EngineConfig::default());
    let in_ids: Vec<_> = fixtures.iter().map(|f| f.id.clone()).collect();
    let out_ids: Vec<_> = matches.iter().map(|m| m.id().to_string()).collect();
    assert_eq!(in_ids, out_ids);
}

#[test]
fn stronger_home_side_is_predicted_to_win() {
    let book = builtin_stats_book();
    let fixture = fallback_fixtures(now()).remove(0);
    let m = enrich(&fixture, &book, now(), &EngineConfig::default());
    let p = &m.prediction;

    assert_eq!(p.result, PredictedResult::HomeWin);
    assert!(p.model_probabilities.home_win > p.model_probabilities.away_win);
    assert!(p.expected_goals.as_deref().is_some_and(|s| s.contains(" - ")));
    assert!(p.predicted_scoreline.as_deref().is_some_and(|s| s.contains('-')));
    let adv = p.advanced_stats.as_ref().expect("advanced stats");
    assert!(adv.home_elo > adv.away_elo);
    assert_eq!(m.last_updated, now());

    let market = m.market_data.as_ref().expect("priced fixture");
    assert_eq!(market.bookmakers_used, 1);
    assert_eq!(market.opening_odds, Hda::new(1.9, 3.5, 4.0));
    let implied = market.implied_probabilities;
    assert!((implied.home + implied.draw + implied.away - 100.0).abs() <= 0.2);
}

#[test]
fn missing_profile_yields_unavailable_sentinels() {
    let book = builtin_stats_book();
    let mut fixture = fallback_fixtures(now()).remove(0);
    fixture.away_team = "Sheffield Wednesday".to_string();
    let m = enrich(&fixture, &book, now(), &EngineConfig::default());

    assert_eq!(m.prediction.result, PredictedResult::Unavailable);
    assert!(!m.prediction.available);
    assert!(m.prediction.expected_goals.is_none());
    assert!(m.prediction.btts.is_none());
    assert!(m.prediction.advanced_stats.is_none());
    assert!(m.team_stats.is_none());
    assert_record_invariants(&m);

    let json = serde_json::to_value(&m).unwrap();
    assert_eq!(json["prediction"]["result"], "Unavailable");
    assert!(json["prediction"]["expected_goals"].is_null());
}

#[test]
fn unpriced_fixture_has_no_market_data_and_no_value() {
    let book = builtin_stats_book();
    let mut fixture = fallback_fixtures(now()).remove(1);
    fixture.bookmakers.clear();
    let m = enrich(&fixture, &book, now(), &EngineConfig::default());

    assert!(m.prediction.available);
    assert!(m.market_data.is_none());
    assert_eq!(m.prediction.value_bets, Hda::default());
    assert_eq!(m.prediction.betting_edges, Hda::new(0.0, 0.0, 0.0));
}

#[test]
fn kelly_matches_closed_form() {
    // b = 1.5, p = 0.5: (1.5 * 0.5 - 0.5) / 1.5
    let f = kelly_fraction(0.5, 2.5);
    assert!((f - 0.1667).abs() < 1e-9);
}
