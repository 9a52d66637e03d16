use std::num::NonZeroU32;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, DurationRound, SecondsFormat, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::http_cache::{ResponseCache, fetch_json_cached, request_signature};
use crate::http_client::build_http_client;
use crate::state::{Bookmaker, BookmakerMarket, Fixture, MarketOutcome};

/// Kickoff range requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixtureWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl FixtureWindow {
    /// `now` truncated to the hour through `days` ahead. Truncation keeps the
    /// request signature stable across calls within the same hour.
    pub fn lookahead(now: DateTime<Utc>, days: i64) -> Self {
        let from = now
            .duration_trunc(ChronoDuration::hours(1))
            .unwrap_or(now);
        Self {
            from,
            to: from + ChronoDuration::days(days.max(1)),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at <= self.to
    }
}

/// Source of upcoming fixtures with bookmaker prices.
#[async_trait]
pub trait FixtureSource: Send + Sync {
    async fn fetch_fixtures(&self, window: FixtureWindow) -> Result<Vec<Fixture>, ProviderError>;

    /// Forces the next fetch to bypass any cached responses.
    fn clear_cache(&self);
}

pub struct OddsApiClient {
    cfg: ProviderConfig,
    http: Client,
    limiter: DefaultDirectRateLimiter,
    cache: ResponseCache,
}

impl OddsApiClient {
    pub fn new(cfg: ProviderConfig) -> anyhow::Result<Self> {
        let http = build_http_client(cfg.http_timeout)?;
        let quota = Quota::with_period(cfg.min_request_interval)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN));
        Ok(Self {
            limiter: RateLimiter::direct(quota),
            cache: ResponseCache::new(cfg.cache_ttl),
            http,
            cfg,
        })
    }

    pub fn cached_responses(&self) -> usize {
        self.cache.len()
    }

    async fn fetch_sport(
        &self,
        sport: &str,
        api_key: &str,
        window: FixtureWindow,
    ) -> Result<Vec<Fixture>, ProviderError> {
        let url = format!("{}/v4/sports/{sport}/odds", self.cfg.base_url);
        let params = [
            ("apiKey", api_key.to_string()),
            ("regions", self.cfg.regions.clone()),
            ("markets", "h2h".to_string()),
            ("oddsFormat", "decimal".to_string()),
            ("dateFormat", "iso".to_string()),
            ("commenceTimeFrom", iso_seconds(window.from)),
            ("commenceTimeTo", iso_seconds(window.to)),
        ];
        let body = fetch_json_cached(&self.http, &self.limiter, &self.cache, &url, &params).await?;
        parse_odds_events(&body, window).inspect_err(|_| {
            // Do not keep serving a payload that cannot be parsed.
            self.cache.remove(&request_signature(&url, &params));
        })
    }
}

#[async_trait]
impl FixtureSource for OddsApiClient {
    async fn fetch_fixtures(&self, window: FixtureWindow) -> Result<Vec<Fixture>, ProviderError> {
        let api_key = self
            .cfg
            .api_key
            .as_deref()
            .ok_or(ProviderError::MissingCredentials("ODDS_API_KEY"))?;

        let mut fixtures = Vec::new();
        let mut last_err = None;
        let mut ok_sports = 0usize;
        for sport in &self.cfg.sports {
            match self.fetch_sport(sport, api_key, window).await {
                Ok(mut batch) => {
                    ok_sports += 1;
                    fixtures.append(&mut batch);
                }
                // The provider throttles per key, so further sports would fail too.
                Err(err @ ProviderError::RateLimited(_)) => return Err(err),
                Err(err) => {
                    warn!(sport = %sport, error = %err, "sport fetch failed");
                    last_err = Some(err);
                }
            }
        }

        if ok_sports == 0
            && let Some(err) = last_err
        {
            return Err(err);
        }

        fixtures.sort_by(|a, b| {
            a.commence_time
                .cmp(&b.commence_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        fixtures.dedup_by(|a, b| a.id == b.id);
        info!(
            fixtures = fixtures.len(),
            sports = ok_sports,
            "fetched fixtures from provider"
        );
        Ok(fixtures)
    }

    fn clear_cache(&self) {
        let evicted = self.cache.clear();
        info!(evicted, "provider response cache cleared");
    }
}

#[derive(Debug, Deserialize)]
struct OddsEvent {
    id: String,
    #[serde(default)]
    sport_key: String,
    #[serde(default)]
    sport_title: String,
    commence_time: Option<String>,
    home_team: String,
    away_team: String,
    #[serde(default)]
    bookmakers: Vec<OddsBookmaker>,
}

#[derive(Debug, Deserialize)]
struct OddsBookmaker {
    #[serde(default)]
    key: String,
    #[serde(default)]
    title: String,
    last_update: Option<String>,
    #[serde(default)]
    markets: Vec<OddsMarket>,
}

#[derive(Debug, Deserialize)]
struct OddsMarket {
    key: String,
    #[serde(default)]
    outcomes: Vec<OddsOutcome>,
}

#[derive(Debug, Deserialize)]
struct OddsOutcome {
    name: String,
    price: f64,
}

/// Parses an `/odds` payload. Events outside `window`, without an id or
/// without a usable kickoff time are dropped; a payload that is not an event list is an error.
pub fn parse_odds_events(
    body: &str,
    window: FixtureWindow,
) -> Result<Vec<Fixture>, ProviderError> {
    let events: Vec<OddsEvent> = serde_json::from_str(body)
        .map_err(|e| ProviderError::MalformedResponse(format!("odds payload: {e}")))?;

    let mut out = Vec::with_capacity(events.len());
    for event in events {
        if event.id.trim().is_empty() {
            warn!(
                home = %event.home_team,
                away = %event.away_team,
                "skipping event without an id"
            );
            continue;
        }
        let Some(kickoff) = event.commence_time.as_deref().and_then(parse_time) else {
            warn!(event = %event.id, "skipping event without a valid kickoff");
            continue;
        };
        if !window.contains(kickoff) {
            continue;
        }
        out.push(Fixture {
            id: event.id,
            home_team: event.home_team,
            away_team: event.away_team,
            commence_time: kickoff,
            sport_title: event.sport_title,
            sport_key: event.sport_key,
            bookmakers: event.bookmakers.into_iter().map(into_bookmaker).collect(),
        });
    }
    Ok(out)
}

fn into_bookmaker(raw: OddsBookmaker) -> Bookmaker {
    Bookmaker {
        title: if raw.title.is_empty() {
            raw.key.clone()
        } else {
            raw.title
        },
        key: raw.key,
        last_update: raw.last_update.as_deref().and_then(parse_time),
        markets: raw
            .markets
            .into_iter()
            .map(|m| BookmakerMarket {
                key: m.key,
                outcomes: m
                    .outcomes
                    .into_iter()
                    .filter(|o| o.price.is_finite() && o.price > 1.0)
                    .map(|o| MarketOutcome {
                        name: o.name,
                        price: o.price,
                    })
                    .collect(),
            })
            .collect(),
    }
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn iso_seconds(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
