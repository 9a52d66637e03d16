use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use matchcast::api::{self, ApiState};
use matchcast::config::AppConfig;
use matchcast::fallback::builtin_stats_book;
use matchcast::provider::OddsApiClient;
use matchcast::refresh::Orchestrator;
use matchcast::scheduler::spawn_scheduler;
use matchcast::stats::StatsBook;
use matchcast::store::MatchStore;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cfg = AppConfig::from_env();
    if cfg.provider.api_key.is_none() {
        warn!("ODDS_API_KEY not set; refreshes will serve fallback data");
    }
    if cfg.admin_key.is_none() {
        warn!("REFRESH_API_KEY not set; /refresh will reject every request");
    }

    let stats = load_stats_book(&cfg)?;
    let store = match cfg.store_path.as_ref() {
        Some(path) => MatchStore::open(path),
        None => MatchStore::in_memory(),
    };
    info!(
        path = ?store.path(),
        matches = store.len(),
        last_updated = ?store.last_updated_at(),
        "match store ready"
    );

    let client = OddsApiClient::new(cfg.provider.clone())?;
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(client),
        Arc::new(stats),
        Arc::new(store),
        cfg.refresh.clone(),
        cfg.engine,
    ));

    if cfg.scheduler_enabled {
        spawn_scheduler(Arc::clone(&orchestrator), cfg.scheduler_tick);
    }

    let state = ApiState {
        orchestrator,
        admin_key: cfg.admin_key.as_deref().map(Arc::from),
    };
    api::serve(state, &cfg.bind_addr).await
}

fn load_stats_book(cfg: &AppConfig) -> Result<StatsBook> {
    let builtin = builtin_stats_book();
    let Some(path) = cfg.stats_path.as_ref() else {
        return Ok(builtin);
    };
    let file = StatsBook::load(path)
        .with_context(|| format!("load stats book from {}", path.display()))?;
    let book = builtin.merged_with(file);
    info!(teams = book.team_count(), "stats book loaded");
    Ok(book)
}
