use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::EnrichmentGap;
use crate::odds::{NameKeys, canonical_words};
use crate::state::{
    Fixture, Hda, HistoricalData, Motivation, PlayerData, Sides, TeamStats, VenueData,
};

const STATS_BOOK_VERSION: u32 = 1;

/// Everything the engine needs besides the fixture itself.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchContext {
    pub team_stats: Sides<TeamStats>,
    pub player_data: Sides<PlayerData>,
    pub venue: VenueData,
    pub motivation: Sides<Motivation>,
    pub historical: Option<HistoricalData>,
    pub market: MarketContext,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MarketContext {
    #[serde(default)]
    pub opening_odds: Option<Hda<f64>>,
    #[serde(default)]
    pub betting_volume: f64,
    #[serde(default)]
    pub sharp_money_indicator: f64,
}

/// Supplies trailing-window aggregates for a fixture. Implementations must be
/// cheap and must not perform I/O; they are called from the enrichment pool.
pub trait StatsSource: Send + Sync {
    fn context_for(&self, fixture: &Fixture) -> Result<MatchContext, EnrichmentGap>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamProfile {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub stats: TeamStats,
    #[serde(default)]
    pub players: PlayerData,
    /// Venue characteristics when this team plays at home.
    #[serde(default)]
    pub venue: VenueData,
    #[serde(default)]
    pub motivation: Motivation,
}

/// Per-pairing extras (head-to-head history, opening prices).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchupProfile {
    pub home: String,
    pub away: String,
    #[serde(default)]
    pub historical_data: Option<HistoricalData>,
    #[serde(flatten)]
    pub market: MarketContext,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsBook {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    teams: Vec<TeamProfile>,
    #[serde(default)]
    matchups: Vec<MatchupProfile>,
}

impl StatsBook {
    pub fn new(teams: Vec<TeamProfile>, matchups: Vec<MatchupProfile>) -> Self {
        Self {
            version: STATS_BOOK_VERSION,
            teams,
            matchups,
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let book: StatsBook = serde_json::from_str(raw).context("invalid stats book json")?;
        if book.version != STATS_BOOK_VERSION {
            return Err(anyhow::anyhow!(
                "unsupported stats book version {} (expected {STATS_BOOK_VERSION})",
                book.version
            ));
        }
        Ok(book)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read stats book {}", path.display()))?;
        Self::from_json(&raw)
    }

    /// Layers `other` on top of `self`; profiles with the same name are replaced.
    pub fn merged_with(mut self, other: StatsBook) -> Self {
        for team in other.teams {
            let key = collapsed(&team.name);
            self.teams.retain(|t| collapsed(&t.name) != key);
            self.teams.push(team);
        }
        for matchup in other.matchups {
            let (h, a) = (collapsed(&matchup.home), collapsed(&matchup.away));
            self.matchups
                .retain(|m| collapsed(&m.home) != h || collapsed(&m.away) != a);
            self.matchups.push(matchup);
        }
        self
    }

    pub fn team_count(&self) -> usize {
        self.teams.len()
    }

    pub fn find_team(&self, name: &str) -> Option<&TeamProfile> {
        let key = collapsed(name);
        if key.is_empty() {
            return None;
        }
        let exact = self.teams.iter().find(|t| {
            collapsed(&t.name) == key || t.aliases.iter().any(|a| collapsed(a) == key)
        });
        if exact.is_some() {
            return exact;
        }

        // Loose matching only when it is unambiguous.
        let wanted = NameKeys::new(name);
        let mut hits = self
            .teams
            .iter()
            .filter(|t| NameKeys::new(&t.name).overlaps(&wanted));
        let first = hits.next()?;
        if hits.next().is_some() {
            return None;
        }
        Some(first)
    }

    fn find_matchup(&self, home: &str, away: &str) -> Option<&MatchupProfile> {
        let (h, a) = (collapsed(home), collapsed(away));
        self.matchups
            .iter()
            .find(|m| collapsed(&m.home) == h && collapsed(&m.away) == a)
    }
}

impl StatsSource for StatsBook {
    fn context_for(&self, fixture: &Fixture) -> Result<MatchContext, EnrichmentGap> {
        let gap = |team: &str| EnrichmentGap {
            fixture_id: fixture.id.clone(),
            team: team.to_string(),
        };
        let home = self
            .find_team(&fixture.home_team)
            .ok_or_else(|| gap(&fixture.home_team))?;
        let away = self
            .find_team(&fixture.away_team)
            .ok_or_else(|| gap(&fixture.away_team))?;
        let matchup = self.find_matchup(&home.name, &away.name);

        Ok(MatchContext {
            team_stats: Sides {
                home: home.stats.clone(),
                away: away.stats.clone(),
            },
            player_data: Sides {
                home: home.players.clone(),
                away: away.players.clone(),
            },
            venue: home.venue.clone(),
            motivation: Sides {
                home: home.motivation.clone(),
                away: away.motivation.clone(),
            },
            historical: matchup.and_then(|m| m.historical_data.clone()),
            market: matchup.map(|m| m.market.clone()).unwrap_or_default(),
        })
    }
}

fn collapsed(name: &str) -> String {
    canonical_words(name).join("")
}
