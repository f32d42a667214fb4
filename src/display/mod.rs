//! Display refresh.
//!
//! The coordinator notifies every [`SelectionListener`] once per finished
//! run, selected or not, with a fresh copy of the ranked list. Listeners
//! re-render from that copy; they never touch the store.

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::coordinator::SearchStatus;
use crate::engine::selector::SelectionOutcome;
use crate::types::Candidate;

// ---------------------------------------------------------------------------
// Listener seam
// ---------------------------------------------------------------------------

/// Payload of one `on_selection_updated` notification.
#[derive(Debug, Clone, Copy)]
pub struct SelectionUpdate<'a> {
    pub run_id: Uuid,
    pub outcome: &'a SelectionOutcome,
    pub recommendations: &'a [Candidate],
}

pub trait SelectionListener: Send + Sync {
    fn on_selection_updated(&self, update: &SelectionUpdate<'_>);
}

// ---------------------------------------------------------------------------
// Grades and formatting
// ---------------------------------------------------------------------------

/// Six-step rating used for both volume and hourly profit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    VeryPoor,
    Poor,
    Fair,
    Good,
    VeryGood,
    Excellent,
}

impl Grade {
    /// Rates estimated units traded per day.
    pub fn for_daily_volume(daily: u64) -> Self {
        match daily {
            v if v >= 10_000 => Grade::Excellent,
            v if v >= 5_000 => Grade::VeryGood,
            v if v >= 2_000 => Grade::Good,
            v if v >= 1_000 => Grade::Fair,
            v if v >= 500 => Grade::Poor,
            _ => Grade::VeryPoor,
        }
    }

    /// Rates gp per hour.
    pub fn for_profit_per_hour(gp: i64) -> Self {
        match gp {
            v if v >= 500_000 => Grade::Excellent,
            v if v >= 300_000 => Grade::VeryGood,
            v if v >= 150_000 => Grade::Good,
            v if v >= 75_000 => Grade::Fair,
            v if v >= 25_000 => Grade::Poor,
            _ => Grade::VeryPoor,
        }
    }
}

/// Shorthand amount: `950`, `1.5K`, `25K`, `1.1M`, `2B`. Truncates to
/// one decimal.
pub fn format_gp(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let n = amount.unsigned_abs();
    let (div, suffix) = match n {
        n if n >= 1_000_000_000 => (1_000_000_000, "B"),
        n if n >= 1_000_000 => (1_000_000, "M"),
        n if n >= 1_000 => (1_000, "K"),
        _ => return format!("{sign}{n}"),
    };
    let tenths = n / (div / 10);
    let (whole, frac) = (tenths / 10, tenths % 10);
    if frac == 0 {
        format!("{sign}{whole}{suffix}")
    } else {
        format!("{sign}{whole}.{frac}{suffix}")
    }
}

/// One-line status summary for the current list.
pub fn status_line(status: SearchStatus, count: usize) -> String {
    if count > 0 {
        let plural = if count == 1 { "" } else { "s" };
        return format!("Found {count} item{plural}");
    }
    match status {
        SearchStatus::Pending | SearchStatus::Searching => "Searching for items...".to_string(),
        SearchStatus::Idle => "No search run yet".to_string(),
        SearchStatus::Completed { .. } => {
            "No suitable items found. Try lowering the minimum profit.".to_string()
        }
    }
}

// ---------------------------------------------------------------------------
// View model
// ---------------------------------------------------------------------------

/// Display-ready projection of a stored recommendation.
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationView {
    pub rank: usize,
    pub id: u32,
    pub name: String,
    pub icon: Option<String>,
    pub unit_price: u64,
    pub appraisal_value: u64,
    pub profit: i64,
    pub profit_per_hour: i64,
    pub profit_grade: Grade,
    pub purchase_limit: u32,
    pub recommended_quantity: u64,
    pub total_cost: u64,
    pub daily_volume: Option<u64>,
    pub hourly_volume: Option<u64>,
    pub volume_grade: Option<Grade>,
}

impl RecommendationView {
    pub fn new(rank: usize, c: &Candidate, max_total_cost: u64) -> Self {
        let daily = c.liquidity().map(|l| l.estimated_daily_volume());
        Self {
            rank,
            id: c.id,
            name: c.name.clone(),
            icon: c.icon.clone(),
            unit_price: c.unit_price,
            appraisal_value: c.appraisal_value,
            profit: c.profit,
            profit_per_hour: c.profit_per_hour(),
            profit_grade: Grade::for_profit_per_hour(c.profit_per_hour()),
            purchase_limit: c.purchase_limit,
            recommended_quantity: c.recommended_quantity(max_total_cost),
            total_cost: c.total_cost(max_total_cost),
            daily_volume: daily,
            hourly_volume: daily.map(|d| (d / 24).max(1)),
            volume_grade: daily.map(Grade::for_daily_volume),
        }
    }

    /// Views for a ranked list, numbered from 1.
    pub fn ranked(items: &[Candidate], max_total_cost: u64) -> Vec<Self> {
        items
            .iter()
            .enumerate()
            .map(|(i, c)| Self::new(i + 1, c, max_total_cost))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Log renderer
// ---------------------------------------------------------------------------

/// Renders the list to the log after every run.
pub struct LogDisplay {
    max_total_cost: u64,
}

impl LogDisplay {
    pub fn new(max_total_cost: u64) -> Self {
        Self { max_total_cost }
    }
}

impl SelectionListener for LogDisplay {
    fn on_selection_updated(&self, update: &SelectionUpdate<'_>) {
        let status = SearchStatus::Completed {
            selected: update.outcome.is_selected(),
        };
        info!(
            run_id = %update.run_id,
            "{}",
            status_line(status, update.recommendations.len())
        );

        for v in RecommendationView::ranked(update.recommendations, self.max_total_cost) {
            let volume = match (v.daily_volume, v.hourly_volume) {
                (Some(d), Some(h)) => format!("{}/day ({}/hr)", format_gp(d as i64), format_gp(h as i64)),
                _ => "no volume data".to_string(),
            };
            info!(
                "#{} {} | {} gp/alch | {} gp/hr | price {} | buy {} for {} gp | {}",
                v.rank,
                v.name,
                format_gp(v.profit),
                format_gp(v.profit_per_hour),
                format_gp(v.unit_price as i64),
                format_gp(v.recommended_quantity as i64),
                format_gp(v.total_cost as i64),
                volume,
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
