use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use matchcast::config::ProviderConfig;
use matchcast::error::ProviderError;
use matchcast::odds::consensus_for_fixture;
use matchcast::provider::{FixtureSource, FixtureWindow, OddsApiClient, parse_odds_events};

const ODDS_PATH: &str = "/v4/sports/soccer_epl/odds";

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

fn provider_config(base_url: &str, api_key: Option<&str>) -> ProviderConfig {
    ProviderConfig {
        base_url: base_url.to_string(),
        api_key: api_key.map(str::to_string),
        sports: vec!["soccer_epl".to_string()],
        min_request_interval: Duration::from_millis(1),
        http_timeout: Duration::from_secs(2),
        ..ProviderConfig::default()
    }
}

fn upcoming_events() -> serde_json::Value {
    let kickoff = (Utc::now() + chrono::Duration::days(1)).to_rfc3339();
    let later = (Utc::now() + chrono::Duration::days(2)).to_rfc3339();
    json!([
        {
            "id": "late",
            "sport_key": "soccer_epl",
            "sport_title": "EPL",
            "commence_time": later,
            "home_team": "Liverpool",
            "away_team": "Chelsea",
            "bookmakers": []
        },
        {
            "id": "early",
            "sport_key": "soccer_epl",
            "sport_title": "EPL",
            "commence_time": kickoff,
            "home_team": "Manchester City",
            "away_team": "Arsenal",
            "bookmakers": [{
                "key": "bet365",
                "title": "Bet365",
                "markets": [{
                    "key": "h2h",
                    "outcomes": [
                        { "name": "Manchester City", "price": 1.85 },
                        { "name": "Draw", "price": 3.4 },
                        { "name": "Arsenal", "price": 4.2 }
                    ]
                }]
            }]
        }
    ])
}

fn window() -> FixtureWindow {
    FixtureWindow::lookahead(Utc::now(), 7)
}

#[test]
fn parses_odds_fixture_within_window() {
    let raw = read_fixture("odds_events.json");
    let window = FixtureWindow::lookahead(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(), 7);
    let fixtures = parse_odds_events(&raw, window).expect("fixture should parse");

    assert_eq!(fixtures.len(), 3, "event outside the window is dropped");
    let city = fixtures
        .iter()
        .find(|f| f.home_team == "Manchester City")
        .expect("city fixture");
    assert_eq!(city.bookmakers.len(), 2);
    assert!(city.bookmakers[0].last_update.is_some());

    let consensus = consensus_for_fixture(city).expect("two full h2h books");
    assert_eq!(consensus.bookmakers_used, 2);
    assert!((consensus.prices.home - 1.825).abs() < 1e-9);

    let brentford = fixtures
        .iter()
        .find(|f| f.home_team == "Brentford")
        .expect("brentford fixture");
    assert!(consensus_for_fixture(brentford).is_none());
}

#[tokio::test]
async fn fetch_sorts_by_kickoff_and_sends_expected_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ODDS_PATH))
        .and(query_param("apiKey", "test-key"))
        .and(query_param("markets", "h2h"))
        .and(query_param("oddsFormat", "decimal"))
        .and(query_param("regions", "uk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(upcoming_events()))
        .expect(1)
        .mount(&server)
        .await;

    let client = OddsApiClient::new(provider_config(&server.uri(), Some("test-key"))).unwrap();
    let fixtures = client.fetch_fixtures(window()).await.expect("fetch");

    let ids: Vec<_> = fixtures.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["early", "late"]);
    assert_eq!(fixtures[0].bookmakers[0].title, "Bet365");
}

#[tokio::test]
async fn second_fetch_within_ttl_is_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ODDS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(upcoming_events()))
        .expect(1)
        .mount(&server)
        .await;

    let client = OddsApiClient::new(provider_config(&server.uri(), Some("test-key"))).unwrap();
    let w = window();
    let first = client.fetch_fixtures(w).await.expect("first fetch");
    let second = client.fetch_fixtures(w).await.expect("cached fetch");
    assert_eq!(first, second);
    assert_eq!(client.cached_responses(), 1);
}

#[tokio::test]
async fn clear_cache_forces_a_new_upstream_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ODDS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(upcoming_events()))
        .expect(2)
        .mount(&server)
        .await;

    let client = OddsApiClient::new(provider_config(&server.uri(), Some("test-key"))).unwrap();
    let w = window();
    client.fetch_fixtures(w).await.expect("first fetch");
    client.clear_cache();
    assert_eq!(client.cached_responses(), 0);
    client.fetch_fixtures(w).await.expect("refetch");
}

#[tokio::test]
async fn rate_limit_is_reported_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ODDS_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3600"))
        .expect(1)
        .mount(&server)
        .await;

    let client = OddsApiClient::new(provider_config(&server.uri(), Some("test-key"))).unwrap();
    let err = client.fetch_fixtures(window()).await.expect_err("429");
    match err {
        ProviderError::RateLimited(msg) => assert!(msg.contains("3600")),
        other => panic!("expected RateLimited, got {other:?}"),
    }
    assert_eq!(client.cached_responses(), 0);
}

#[tokio::test]
async fn server_error_is_unreachable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ODDS_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let client = OddsApiClient::new(provider_config(&server.uri(), Some("test-key"))).unwrap();
    let err = client.fetch_fixtures(window()).await.expect_err("500");
    assert_eq!(err.kind(), "unreachable");
    assert!(err.to_string().contains("upstream down"));
}

#[tokio::test]
async fn undecodable_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ODDS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let client = OddsApiClient::new(provider_config(&server.uri(), Some("test-key"))).unwrap();
    let err = client.fetch_fixtures(window()).await.expect_err("html body");
    assert_eq!(err.kind(), "malformed_response");
}

#[tokio::test]
async fn missing_key_never_reaches_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let client = OddsApiClient::new(provider_config(&server.uri(), None)).unwrap();
    let err = client.fetch_fixtures(window()).await.expect_err("no key");
    assert_eq!(err, ProviderError::MissingCredentials("ODDS_API_KEY"));
}
