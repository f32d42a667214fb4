//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::display::{status_line, RecommendationView, SelectionListener, SelectionUpdate};
use crate::engine::coordinator::{RunSummary, SearchCoordinator, SearchStatus};
use crate::types::SearchMode;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Revision counter bumped whenever the recommendation list may have
/// changed. Registered with the coordinator as a listener.
#[derive(Debug, Default)]
pub struct RefreshTracker {
    revision: AtomicU64,
    last_updated: RwLock<Option<DateTime<Utc>>>,
}

impl RefreshTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        *self.last_updated.read().unwrap_or_else(|p| p.into_inner())
    }

    pub fn bump(&self) {
        self.revision.fetch_add(1, Ordering::SeqCst);
        *self.last_updated.write().unwrap_or_else(|p| p.into_inner()) = Some(Utc::now());
    }
}

impl SelectionListener for RefreshTracker {
    fn on_selection_updated(&self, _update: &SelectionUpdate<'_>) {
        self.bump();
    }
}

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub coordinator: Arc<SearchCoordinator>,
    pub refresh: Arc<RefreshTracker>,
    /// Budget used for quantity and total-cost columns. 0 disables.
    pub max_total_cost: u64,
}

impl DashboardState {
    pub fn new(coordinator: Arc<SearchCoordinator>, refresh: Arc<RefreshTracker>, max_total_cost: u64) -> Self {
        Self {
            coordinator,
            refresh,
            max_total_cost,
        }
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: SearchStatus,
    pub status_text: String,
    pub searching: bool,
    pub ready: bool,
    pub mode: SearchMode,
    pub recommendations: usize,
    pub revision: u64,
    pub last_updated: Option<String>,
    pub last_run: Option<RunSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub mode: Option<SearchMode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub accepted: bool,
    pub mode: SearchMode,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let coordinator = &state.coordinator;
    let status = coordinator.status().await;
    let count = coordinator.snapshot().await.len();

    Json(StatusResponse {
        status,
        status_text: status_line(status, count),
        searching: coordinator.is_searching(),
        ready: coordinator.is_ready(),
        mode: coordinator.mode(),
        recommendations: count,
        revision: state.refresh.revision(),
        last_updated: state.refresh.last_updated().map(|t| t.to_rfc3339()),
        last_run: coordinator.last_run().await,
    })
}

/// GET /api/recommendations
pub async fn get_recommendations(State(state): State<AppState>) -> Json<Vec<RecommendationView>> {
    let items = state.coordinator.snapshot().await;
    Json(RecommendationView::ranked(&items, state.max_total_cost))
}

/// POST /api/search
///
/// Body is optional; without one the search replaces all results.
pub async fn post_search(
    State(state): State<AppState>,
    body: Option<Json<SearchRequest>>,
) -> (StatusCode, Json<SearchResponse>) {
    let mode = body
        .and_then(|Json(req)| req.mode)
        .unwrap_or(SearchMode::ReplaceAll);

    let accepted = state.coordinator.request_search(mode);
    let code = if accepted {
        StatusCode::ACCEPTED
    } else {
        StatusCode::CONFLICT
    };
    (code, Json(SearchResponse { accepted, mode }))
}

/// DELETE /api/recommendations/:id
pub async fn delete_recommendation(State(state): State<AppState>, Path(id): Path<u32>) -> StatusCode {
    if state.coordinator.remove(id).await {
        state.refresh.bump();
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// DELETE /api/recommendations
pub async fn clear_recommendations(State(state): State<AppState>) -> StatusCode {
    state.coordinator.clear().await;
    state.refresh.bump();
    StatusCode::NO_CONTENT
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
