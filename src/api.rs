use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::refresh::{DataSource, MatchFeed, Orchestrator};

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    /// Secret for `/refresh`. When unset the endpoint always refuses.
    pub admin_key: Option<Arc<str>>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{message}")]
    RefreshFailed {
        message: String,
        data_source: DataSource,
    },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Unauthorized" })),
            )
                .into_response(),
            ApiError::RefreshFailed {
                message,
                data_source,
            } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "error": message,
                    "dataSource": data_source,
                    "timestamp": Utc::now(),
                })),
            )
                .into_response(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MatchesQuery {
    pub league: Option<String>,
    #[serde(rename = "forceUpdate")]
    pub force_update: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshQuery {
    pub key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: chrono::DateTime<Utc>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/matches", get(get_matches))
        .route("/refresh", get(admin_refresh))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: ApiState, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "http api listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn get_matches(
    State(state): State<ApiState>,
    Query(query): Query<MatchesQuery>,
) -> Json<MatchFeed> {
    let force = query.force_update.as_deref().is_some_and(is_truthy);
    let league = query
        .league
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case("all"));
    Json(state.orchestrator.feed(force, league).await)
}

async fn admin_refresh(
    State(state): State<ApiState>,
    Query(query): Query<RefreshQuery>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let authorized = match (state.admin_key.as_deref(), query.key.as_deref()) {
        (Some(secret), Some(given)) => secret == given,
        _ => false,
    };
    if !authorized {
        warn!("rejected admin refresh with bad key");
        return Err(ApiError::Unauthorized);
    }

    let report = state.orchestrator.refresh(true).await;
    if report.source != DataSource::Provider {
        return Err(ApiError::RefreshFailed {
            message: report
                .error
                .unwrap_or_else(|| "refresh did not reach the provider".to_string()),
            data_source: report.source,
        });
    }

    Ok(Json(RefreshResponse {
        success: true,
        message: format!("Refreshed {} matches from provider", report.matches),
        timestamp: report.finished_at,
    }))
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}
