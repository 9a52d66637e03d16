use std::env;
use std::path::PathBuf;
use std::time::Duration;

const APP_DIR: &str = "matchcast";
const STORE_FILE: &str = "matches.json";

const DEFAULT_BASE_URL: &str = "https://api.the-odds-api.com";
const DEFAULT_SPORTS: &[&str] = &[
    "soccer_epl",
    "soccer_spain_la_liga",
    "soccer_germany_bundesliga",
    "soccer_italy_serie_a",
    "soccer_france_ligue_one",
    "soccer_uefa_champs_league",
];

// Provider quotas are counted per hour, so staleness is measured in hours too.
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 2 * 60 * 60;

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub regions: String,
    pub sports: Vec<String>,
    pub cache_ttl: Duration,
    pub min_request_interval: Duration,
    pub http_timeout: Duration,
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        let base_url = env::var("ODDS_API_BASE_URL")
            .ok()
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let api_key = env::var("ODDS_API_KEY")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let regions = env::var("ODDS_REGIONS")
            .unwrap_or_else(|_| "uk".to_string())
            .trim()
            .to_ascii_lowercase();
        let sports = env::var("ODDS_SPORTS")
            .ok()
            .map(|raw| parse_list(&raw))
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| DEFAULT_SPORTS.iter().map(|s| s.to_string()).collect());

        Self {
            base_url,
            api_key,
            regions,
            sports,
            cache_ttl: Duration::from_secs(env_parse("ODDS_CACHE_TTL_SECS", 3600_u64)),
            min_request_interval: Duration::from_millis(
                env_parse("ODDS_MIN_REQUEST_INTERVAL_MS", 1000_u64).max(1),
            ),
            http_timeout: Duration::from_secs(env_parse("HTTP_TIMEOUT_SECS", 10_u64).max(1)),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            regions: "uk".to_string(),
            sports: DEFAULT_SPORTS.iter().map(|s| s.to_string()).collect(),
            cache_ttl: Duration::from_secs(3600),
            min_request_interval: Duration::from_millis(1000),
            http_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Maximum age of stored data before a refresh is attempted.
    pub interval: Duration,
    pub fetch_timeout: Duration,
    pub lookahead_days: i64,
    /// Cap on fixtures enriched per cycle.
    pub max_matches: usize,
}

impl RefreshConfig {
    pub fn from_env() -> Self {
        Self {
            interval: Duration::from_secs(
                env_parse("REFRESH_INTERVAL_SECS", DEFAULT_REFRESH_INTERVAL_SECS).max(1),
            ),
            fetch_timeout: Duration::from_secs(env_parse("REFRESH_FETCH_TIMEOUT_SECS", 60_u64).max(1)),
            lookahead_days: env_parse("ODDS_LOOKAHEAD_DAYS", 7_i64).clamp(1, 21),
            max_matches: env_parse("REFRESH_MAX_MATCHES", 10_usize).clamp(1, 200),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            fetch_timeout: Duration::from_secs(60),
            lookahead_days: 7,
            max_matches: 10,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Minimum model-minus-market edge, in percentage points, for a value call.
    pub value_edge_threshold: f64,
    /// Goal cap of the Poisson score grid.
    pub max_goals: u32,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            value_edge_threshold: env_parse("VALUE_EDGE_THRESHOLD", 5.0_f64).clamp(0.0, 50.0),
            ..Self::default()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            value_edge_threshold: 5.0,
            max_goals: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub refresh: RefreshConfig,
    pub engine: EngineConfig,
    pub admin_key: Option<String>,
    pub store_path: Option<PathBuf>,
    pub stats_path: Option<PathBuf>,
    pub scheduler_enabled: bool,
    pub scheduler_tick: Duration,
    pub bind_addr: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let admin_key = env::var("REFRESH_API_KEY")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let store_path = env::var("STORE_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| app_cache_dir().map(|dir| dir.join(STORE_FILE)));
        let stats_path = env::var("STATS_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        let bind_addr = env::var("BIND_ADDR")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "0.0.0.0:3000".to_string());

        Self {
            provider: ProviderConfig::from_env(),
            refresh: RefreshConfig::from_env(),
            engine: EngineConfig::from_env(),
            admin_key,
            store_path,
            stats_path,
            scheduler_enabled: env_bool("SCHEDULER_ENABLED", true),
            scheduler_tick: Duration::from_secs(env_parse("SCHEDULER_TICK_SECS", 600_u64).max(5)),
            bind_addr,
        }
    }
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = env::var("XDG_CACHE_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(APP_DIR));
        }
    }
    let home = env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(APP_DIR))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| {
            let t = v.trim().to_ascii_lowercase();
            !(t.is_empty() || t == "0" || t == "false" || t == "off" || t == "no")
        })
        .unwrap_or(default)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
