use std::cmp::Ordering;
use std::collections::HashSet;

use crate::state::{Bookmaker, Fixture, Hda, MarketOutcome};

const H2H_MARKET: &str = "h2h";

/// Bookmaker consensus for the match-result market.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketConsensus {
    /// Median decimal price per outcome.
    pub prices: Hda<f64>,
    /// Median de-margined probability per outcome, 0..1, summing to ~1.
    pub implied: Hda<f64>,
    pub bookmakers_used: u8,
    /// Median overround (sum of raw inverse prices minus one).
    pub margin: f64,
}

pub fn consensus_for_fixture(fixture: &Fixture) -> Option<MarketConsensus> {
    consensus_from_bookmakers(&fixture.bookmakers, &fixture.home_team, &fixture.away_team)
}

pub fn consensus_from_bookmakers(
    bookmakers: &[Bookmaker],
    home_team: &str,
    away_team: &str,
) -> Option<MarketConsensus> {
    let mut prices: Hda<Vec<f64>> = Hda::default();
    let mut implied: Hda<Vec<f64>> = Hda::default();
    let mut margins = Vec::new();

    for bookmaker in bookmakers {
        let Some(market) = bookmaker
            .markets
            .iter()
            .find(|m| m.key.eq_ignore_ascii_case(H2H_MARKET))
        else {
            continue;
        };
        let Some(triple) = extract_hda_prices(&market.outcomes, home_team, away_team) else {
            continue;
        };
        let Some((fair, margin)) = remove_margin(triple) else {
            continue;
        };
        prices.home.push(triple.home);
        prices.draw.push(triple.draw);
        prices.away.push(triple.away);
        implied.home.push(fair.home);
        implied.draw.push(fair.draw);
        implied.away.push(fair.away);
        margins.push(margin);
    }

    let used = margins.len();
    if used == 0 {
        return None;
    }

    let prices = Hda::new(
        median_f64(&prices.home)?,
        median_f64(&prices.draw)?,
        median_f64(&prices.away)?,
    );
    // Medians are taken per outcome, so re-normalize the fair triple.
    let raw = Hda::new(
        median_f64(&implied.home)?,
        median_f64(&implied.draw)?,
        median_f64(&implied.away)?,
    );
    let sum = raw.home + raw.draw + raw.away;
    if sum <= 0.0 {
        return None;
    }

    Some(MarketConsensus {
        prices,
        implied: raw.map(|p| p / sum),
        bookmakers_used: used.min(u8::MAX as usize) as u8,
        margin: median_f64(&margins).unwrap_or(0.0),
    })
}

/// Proportional de-margining: the bookmaker overround is spread across the
/// three outcomes in proportion to their raw implied probabilities.
pub fn remove_margin(prices: Hda<f64>) -> Option<(Hda<f64>, f64)> {
    if prices.home <= 1.0 || prices.draw <= 1.0 || prices.away <= 1.0 {
        return None;
    }
    let raw = prices.map(|p| 1.0 / p);
    let sum = raw.home + raw.draw + raw.away;
    if sum <= 0.0 {
        return None;
    }
    Some((raw.map(|p| p / sum), sum - 1.0))
}

fn extract_hda_prices(
    outcomes: &[MarketOutcome],
    home_team: &str,
    away_team: &str,
) -> Option<Hda<f64>> {
    let home_keys = NameKeys::new(home_team);
    let away_keys = NameKeys::new(away_team);
    let home_exact = canonical_words(home_team).join("");
    let away_exact = canonical_words(away_team).join("");

    let mut home = None;
    let mut draw = None;
    let mut away = None;

    for outcome in outcomes {
        let name = outcome.name.trim();
        if is_draw_label(name) {
            draw = Some(outcome.price);
            continue;
        }
        // Exact names first; aliases only disambiguate abbreviated labels.
        let collapsed = canonical_words(name).join("");
        if !collapsed.is_empty() && collapsed == home_exact {
            home = Some(outcome.price);
            continue;
        }
        if !collapsed.is_empty() && collapsed == away_exact {
            away = Some(outcome.price);
            continue;
        }
        let keys = NameKeys::new(name);
        let hits_home = keys.overlaps(&home_keys);
        let hits_away = keys.overlaps(&away_keys);
        match (hits_home, hits_away) {
            (true, false) if home.is_none() => home = Some(outcome.price),
            (false, true) if away.is_none() => away = Some(outcome.price),
            _ => {}
        }
    }

    Some(Hda::new(home?, draw?, away?))
}

pub fn median_f64(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

fn is_draw_label(name: &str) -> bool {
    let n = normalize_word(name);
    n == "draw" || n == "tie" || n == "x"
}

/// Loose keys for a team name, used to pair provider names with stats
/// profiles and odds outcome labels ("Man City", "Manchester City", "MCI").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameKeys(HashSet<String>);

impl NameKeys {
    pub fn new(name: &str) -> Self {
        let words = canonical_words(name);
        let Some(first) = words.first() else {
            return Self::default();
        };
        let joined = words.concat();
        let initials: String = words.iter().filter_map(|w| w.chars().next()).collect();

        let mut keys = vec![head(&joined, 3), joined, initials];
        if let [_, .., last] = words.as_slice() {
            keys.push(head(first, 1) + &head(last, 2));
        }
        keys.extend(words.iter().flat_map(|w| [head(w, 3), w.clone()]));
        // Single letters pair almost anything.
        Self(keys.into_iter().filter(|k| k.len() >= 2).collect())
    }

    pub fn overlaps(&self, other: &NameKeys) -> bool {
        self.0.iter().any(|k| other.0.contains(k))
    }
}

/// Lowercase alphanumeric words with club suffixes dropped.
pub fn canonical_words(name: &str) -> Vec<String> {
    let cleaned: String = name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    cleaned
        .split_whitespace()
        .map(normalize_word)
        .filter(|w| !w.is_empty())
        .filter(|w| !matches!(w.as_str(), "fc" | "cf" | "afc" | "sc" | "ac" | "club"))
        .collect()
}

fn normalize_word(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn head(word: &str, n: usize) -> String {
    word.chars().take(n).collect()
}
