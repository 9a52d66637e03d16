use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::state::EnrichedMatch;

const STORE_VERSION: u32 = 1;

/// A complete, immutable view of the store at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Confidence descending; ties keep their save order.
    pub matches: Vec<EnrichedMatch>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(flatten)]
    snapshot: Snapshot,
}

/// Latest enriched matches plus the "last refreshed at" timestamp.
///
/// Readers clone an `Arc` to the current snapshot and never wait on a writer
/// beyond the pointer swap. Writes are expected from one refresh cycle at a
/// time.
#[derive(Debug)]
pub struct MatchStore {
    path: Option<PathBuf>,
    current: RwLock<Arc<Snapshot>>,
}

impl MatchStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(Snapshot::default())),
        }
    }

    /// Opens the store backed by `path`. A missing, unreadable or
    /// version-mismatched file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let snapshot = match load_file(&path) {
            Ok(Some(snapshot)) => {
                debug!(path = %path.display(), matches = snapshot.matches.len(), "store loaded");
                snapshot
            }
            Ok(None) => Snapshot::default(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring unreadable store file");
                Snapshot::default()
            }
        };
        Self {
            path: Some(path),
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        let guard = self.current.read();
        Arc::clone(&*guard)
    }

    pub fn get_all(&self) -> Vec<EnrichedMatch> {
        self.snapshot().matches.clone()
    }

    pub fn len(&self) -> usize {
        self.current.read().matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_updated_at(&self) -> Option<DateTime<Utc>> {
        self.current.read().last_updated
    }

    pub fn is_stale(&self, interval: Duration) -> bool {
        self.is_stale_at(interval, Utc::now())
    }

    pub fn is_stale_at(&self, interval: Duration, now: DateTime<Utc>) -> bool {
        let Some(last) = self.last_updated_at() else {
            return true;
        };
        let age = now
            .signed_duration_since(last)
            .to_std()
            .unwrap_or(Duration::ZERO);
        age >= interval
    }

    /// Replaces the whole set, stamped with the current time.
    pub fn save_all(&self, matches: Vec<EnrichedMatch>) -> Result<Arc<Snapshot>> {
        self.save_all_at(matches, Utc::now())
    }

    /// Replaces the whole set. The file is written before the new snapshot is
    /// published, so a failed write leaves both untouched.
    pub fn save_all_at(
        &self,
        matches: Vec<EnrichedMatch>,
        now: DateTime<Utc>,
    ) -> Result<Arc<Snapshot>> {
        let snapshot = Arc::new(Snapshot {
            matches: order_by_confidence(dedup_by_id(matches)),
            last_updated: Some(now),
        });
        if let Some(path) = self.path.as_deref() {
            write_file(path, &snapshot)?;
        }
        *self.current.write() = Arc::clone(&snapshot);
        Ok(snapshot)
    }
}

/// Later records replace earlier ones with the same id, keeping the position
/// of the first occurrence. Records with a blank id are dropped.
fn dedup_by_id(matches: Vec<EnrichedMatch>) -> Vec<EnrichedMatch> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<EnrichedMatch> = Vec::with_capacity(matches.len());
    for m in matches {
        if m.id().trim().is_empty() {
            warn!(
                home = %m.fixture.home_team,
                away = %m.fixture.away_team,
                "dropping match without an id"
            );
            continue;
        }
        match index.get(m.id()) {
            Some(&i) => out[i] = m,
            None => {
                index.insert(m.id().to_string(), out.len());
                out.push(m);
            }
        }
    }
    out
}

pub fn order_by_confidence(mut matches: Vec<EnrichedMatch>) -> Vec<EnrichedMatch> {
    // sort_by is stable.
    matches.sort_by(|a, b| b.confidence().cmp(&a.confidence()));
    matches
}

fn load_file(path: &Path) -> Result<Option<Snapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let file: StoreFile =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    if file.version != STORE_VERSION {
        warn!(
            found = file.version,
            expected = STORE_VERSION,
            "store file version mismatch"
        );
        return Ok(None);
    }
    Ok(Some(file.snapshot))
}

fn write_file(path: &Path, snapshot: &Snapshot) -> Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let file = StoreFile {
        version: STORE_VERSION,
        snapshot: snapshot.clone(),
    };
    let json = serde_json::to_string(&file).context("serialize store")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("rename into {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Fixture, Prediction};
    use chrono::TimeZone;

    fn record(id: &str, confidence: u8) -> EnrichedMatch {
        let mut prediction = Prediction::unavailable();
        prediction.confidence = confidence;
        EnrichedMatch {
            fixture: Fixture {
                id: id.to_string(),
                home_team: "H".to_string(),
                away_team: "A".to_string(),
                commence_time: Utc.with_ymd_and_hms(2026, 3, 1, 15, 0, 0).unwrap(),
                sport_title: "EPL".to_string(),
                sport_key: "soccer_epl".to_string(),
                bookmakers: Vec::new(),
            },
            team_stats: None,
            historical_data: None,
            player_data: None,
            venue_data: None,
            market_data: None,
            motivation_factors: None,
            prediction,
            last_updated: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn duplicate_ids_keep_last_record() {
        let store = MatchStore::in_memory();
        store
            .save_all(vec![record("a", 10), record("b", 20), record("a", 90)])
            .unwrap();
        let all = store.get_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id(), "a");
        assert_eq!(all[0].confidence(), 90);
    }

    #[test]
    fn blank_ids_are_not_stored() {
        let store = MatchStore::in_memory();
        store
            .save_all(vec![record("", 80), record("b", 20), record(" ", 60)])
            .unwrap();
        let ids: Vec<_> = store.get_all().iter().map(|m| m.id().to_string()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[test]
    fn ties_keep_save_order() {
        let store = MatchStore::in_memory();
        store
            .save_all(vec![record("x", 50), record("y", 70), record("z", 50)])
            .unwrap();
        let ids: Vec<_> = store.get_all().iter().map(|m| m.id().to_string()).collect();
        assert_eq!(ids, vec!["y", "x", "z"]);
    }

    #[test]
    fn stale_boundary_is_inclusive() {
        let store = MatchStore::in_memory();
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        store.save_all_at(vec![record("a", 10)], t0).unwrap();
        let hour = Duration::from_secs(3600);
        assert!(!store.is_stale_at(hour, t0 + chrono::Duration::minutes(59)));
        assert!(store.is_stale_at(hour, t0 + chrono::Duration::minutes(60)));
    }
}
