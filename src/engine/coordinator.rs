//! Search coordinator.
//!
//! Owns the run flags and the recommendation store, and drives one search
//! run end to end: snapshot → filter → rank → tiered select → accept →
//! notify. Runs are single-flight; a trigger that arrives while a run is
//! active is dropped, not queued.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SelectionConfig;
use crate::display::{SelectionListener, SelectionUpdate};
use crate::engine::filter::{filter_candidates, rank_by_profit, FilterStats, Thresholds};
use crate::engine::selector::{NoSelectionReason, SelectionOutcome, TieredSelector};
use crate::engine::store::{AcceptOutcome, RecommendationStore};
use crate::market::{LiquidityVerifier, MarketSnapshotProvider, MembershipClassifier};
use crate::types::{Candidate, SearchMode};

/// Where the coordinator stands between and during runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SearchStatus {
    /// No run requested or completed yet.
    Idle,
    /// A run was requested and is waiting for the host to start it.
    Pending,
    /// A run is executing.
    Searching,
    /// The last run finished; `selected` tells whether it added a winner.
    Completed { selected: bool },
}

/// Record of one finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub mode: SearchMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scanned: usize,
    pub eligible: usize,
    pub selected_item: Option<u32>,
    /// Zero-based tier index that produced the winner.
    pub tier: Option<usize>,
    pub no_selection_reason: Option<String>,
    pub evicted: Vec<u32>,
    #[serde(skip)]
    pub outcome: SelectionOutcome,
}

struct CoordinatorState {
    store: RecommendationStore,
    last_run: Option<RunSummary>,
}

#[derive(Debug, Clone, Copy)]
struct FlagState {
    in_progress: bool,
    ready: bool,
    mode: SearchMode,
}

/// Run flags. Every transition happens under one lock, so a request is
/// either recorded before a run claims the slot (and that run serves it)
/// or rejected.
struct SearchFlags(Mutex<FlagState>);

impl SearchFlags {
    fn new() -> Self {
        Self(Mutex::new(FlagState {
            in_progress: false,
            ready: false,
            mode: SearchMode::ReplaceAll,
        }))
    }

    fn lock(&self) -> MutexGuard<'_, FlagState> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get(&self) -> FlagState {
        *self.lock()
    }

    fn request(&self, mode: SearchMode) -> bool {
        let mut flags = self.lock();
        if flags.in_progress {
            return false;
        }
        flags.mode = mode;
        flags.ready = true;
        true
    }

    /// Claim the run slot, consuming any pending request.
    fn begin(&self) -> Option<SearchMode> {
        let mut flags = self.lock();
        if flags.in_progress {
            return None;
        }
        flags.in_progress = true;
        flags.ready = false;
        Some(flags.mode)
    }

    fn finish(&self) {
        let mut flags = self.lock();
        flags.in_progress = false;
        flags.ready = false;
    }
}

/// Releases the run slot when a run ends, however it ends.
struct InProgressGuard<'a>(&'a SearchFlags);

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

pub struct SearchCoordinator {
    flags: SearchFlags,
    state: RwLock<CoordinatorState>,
    selector: TieredSelector,
    thresholds: Thresholds,
    provider: Arc<dyn MarketSnapshotProvider>,
    classifier: Arc<dyn MembershipClassifier>,
    listeners: Vec<Arc<dyn SelectionListener>>,
}

impl SearchCoordinator {
    pub fn new(
        selector: TieredSelector,
        thresholds: Thresholds,
        max_recommendations: usize,
        provider: Arc<dyn MarketSnapshotProvider>,
        classifier: Arc<dyn MembershipClassifier>,
    ) -> Self {
        Self {
            flags: SearchFlags::new(),
            state: RwLock::new(CoordinatorState {
                store: RecommendationStore::new(max_recommendations),
                last_run: None,
            }),
            selector,
            thresholds,
            provider,
            classifier,
            listeners: Vec::new(),
        }
    }

    pub fn from_config(
        cfg: &SelectionConfig,
        provider: Arc<dyn MarketSnapshotProvider>,
        verifier: Arc<dyn LiquidityVerifier>,
        classifier: Arc<dyn MembershipClassifier>,
    ) -> Self {
        Self::new(
            TieredSelector::from_config(cfg, verifier),
            Thresholds::from(cfg),
            cfg.max_recommendations,
            provider,
            classifier,
        )
    }

    /// Register a listener notified after every run.
    pub fn with_listener(mut self, listener: Arc<dyn SelectionListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    // -- Flags -----------------------------------------------------------

    /// Mark a run as wanted in `mode`. Dropped (returns `false`) while a
    /// run is active.
    pub fn request_search(&self, mode: SearchMode) -> bool {
        if !self.flags.request(mode) {
            debug!(%mode, "Search already in progress, dropping request");
            return false;
        }
        debug!(%mode, "Search requested");
        true
    }

    pub fn is_search_allowed(&self) -> bool {
        let flags = self.flags.get();
        flags.ready && !flags.in_progress
    }

    pub fn is_searching(&self) -> bool {
        self.flags.get().in_progress
    }

    pub fn is_ready(&self) -> bool {
        self.flags.get().ready
    }

    /// Mode of the most recent request.
    pub fn mode(&self) -> SearchMode {
        self.flags.get().mode
    }

    pub async fn status(&self) -> SearchStatus {
        if self.is_searching() {
            return SearchStatus::Searching;
        }
        if self.is_ready() {
            return SearchStatus::Pending;
        }
        match &self.state.read().await.last_run {
            Some(run) => SearchStatus::Completed {
                selected: run.outcome.is_selected(),
            },
            None => SearchStatus::Idle,
        }
    }

    // -- Run -------------------------------------------------------------

    /// Execute one search run in the requested mode. Returns `None` when
    /// another run already holds the single-flight slot.
    pub async fn run_search(&self) -> Option<RunSummary> {
        let Some(mode) = self.flags.begin() else {
            debug!("Search already in progress, dropping run");
            return None;
        };
        let guard = InProgressGuard(&self.flags);

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, %mode, tiers = self.selector.tiers().len(), "Starting search");

        let (outcome, stats) = match self.provider.fetch_snapshot().await {
            Ok(snapshot) => {
                let seen = {
                    let mut state = self.state.write().await;
                    if mode == SearchMode::ReplaceAll {
                        state.store.clear();
                    }
                    state.store.seen_ids().clone()
                };

                let (mut candidates, stats) = filter_candidates(
                    &snapshot,
                    &seen,
                    mode.excludes_seen(),
                    &self.thresholds,
                    self.classifier.as_ref(),
                );
                rank_by_profit(&mut candidates);
                info!(%run_id, scanned = stats.scanned, eligible = stats.eligible, "Candidates ranked");

                let outcome = self
                    .selector
                    .select_with(&candidates, |report| {
                        debug!(
                            %run_id,
                            tier = report.index + 1,
                            considered = report.considered,
                            failed = report.failed_verifications,
                            excluded = report.excluded,
                            winner = ?report.winner,
                            "Tier resolved"
                        );
                    })
                    .await;
                (outcome, stats)
            }
            Err(e) => {
                warn!(%run_id, error = %e, "Failed to fetch market snapshot");
                (
                    SelectionOutcome::NoSelection(NoSelectionReason::SnapshotUnavailable),
                    FilterStats::default(),
                )
            }
        };

        let (recommendations, summary) = {
            let mut state = self.state.write().await;
            let evicted = match outcome.selection() {
                Some(sel) => match state.store.accept(sel.candidate.clone(), sel.liquidity) {
                    AcceptOutcome::Added { evicted } => evicted,
                    AcceptOutcome::Duplicate => Vec::new(),
                },
                None => Vec::new(),
            };

            let summary = RunSummary {
                run_id,
                mode,
                started_at,
                finished_at: Utc::now(),
                scanned: stats.scanned,
                eligible: stats.eligible,
                selected_item: outcome.selection().map(|s| s.candidate.id),
                tier: outcome.selection().map(|s| s.tier),
                no_selection_reason: match &outcome {
                    SelectionOutcome::NoSelection(reason) => Some(reason.to_string()),
                    SelectionOutcome::Selected(_) => None,
                },
                evicted,
                outcome,
            };
            state.last_run = Some(summary.clone());
            (state.store.snapshot(), summary)
        };

        drop(guard);

        match &summary.no_selection_reason {
            None => info!(%run_id, total = recommendations.len(), "Search complete"),
            Some(reason) => info!(%run_id, reason = %reason, "Search complete, nothing selected"),
        }

        let update = SelectionUpdate {
            run_id,
            outcome: &summary.outcome,
            recommendations: &recommendations,
        };
        for listener in &self.listeners {
            listener.on_selection_updated(&update);
        }

        Some(summary)
    }

    // -- Store access ----------------------------------------------------

    pub async fn snapshot(&self) -> Vec<Candidate> {
        self.state.read().await.store.snapshot()
    }

    pub async fn last_run(&self) -> Option<RunSummary> {
        self.state.read().await.last_run.clone()
    }

    pub async fn remove(&self, item_id: u32) -> bool {
        let removed = self.state.write().await.store.remove(item_id);
        if removed {
            info!(item_id, "Recommendation removed");
        }
        removed
    }

    pub async fn clear(&self) {
        self.state.write().await.store.clear();
        info!("Recommendations cleared");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
