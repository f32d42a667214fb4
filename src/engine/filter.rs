//! Eligibility filter.
//!
//! Turns a raw market snapshot into the candidate list for one search
//! run. Pure: the only inputs are the snapshot, the seen-set, the
//! thresholds, and the classifier; nothing is mutated.

use std::collections::HashSet;
use tracing::debug;

use crate::config::SelectionConfig;
use crate::market::{MarketSnapshot, MembershipClassifier};
use crate::types::{recommended_quantity, Candidate, MembershipFilter, RawItem};

/// Threshold subset of [`SelectionConfig`] the filter reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub min_profit: i64,
    pub min_purchase_limit: u32,
    /// 0 disables.
    pub max_unit_price: u64,
    /// 0 disables.
    pub max_total_cost: u64,
    pub membership: MembershipFilter,
}

impl From<&SelectionConfig> for Thresholds {
    fn from(cfg: &SelectionConfig) -> Self {
        Self {
            min_profit: cfg.min_profit,
            min_purchase_limit: cfg.min_purchase_limit,
            max_unit_price: cfg.max_unit_price,
            max_total_cost: cfg.max_total_cost,
            membership: cfg.membership_filter,
        }
    }
}

/// Why items were dropped, for the per-run log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub scanned: usize,
    pub incomplete: usize,
    pub skipped_seen: usize,
    pub skipped_membership: usize,
    pub below_thresholds: usize,
    pub eligible: usize,
}

/// Filter a snapshot into candidates, in snapshot order.
pub fn filter_candidates(
    snapshot: &MarketSnapshot,
    seen: &HashSet<u32>,
    exclude_seen: bool,
    thresholds: &Thresholds,
    classifier: &dyn MembershipClassifier,
) -> (Vec<Candidate>, FilterStats) {
    let mut stats = FilterStats {
        scanned: snapshot.items.len(),
        ..FilterStats::default()
    };
    let mut candidates = Vec::new();

    for raw in &snapshot.items {
        if exclude_seen && seen.contains(&raw.id) {
            stats.skipped_seen += 1;
            continue;
        }

        if thresholds.membership != MembershipFilter::Both
            && !thresholds.membership.admits(classifier.classify(raw.id))
        {
            stats.skipped_membership += 1;
            continue;
        }

        let Some(candidate) = to_candidate(raw, snapshot.secondary_cost) else {
            stats.incomplete += 1;
            continue;
        };

        if !passes_thresholds(&candidate, thresholds) {
            stats.below_thresholds += 1;
            continue;
        }

        candidates.push(candidate);
    }

    stats.eligible = candidates.len();
    debug!(
        scanned = stats.scanned,
        eligible = stats.eligible,
        incomplete = stats.incomplete,
        seen = stats.skipped_seen,
        membership = stats.skipped_membership,
        thresholds = stats.below_thresholds,
        "Eligibility filter applied"
    );

    (candidates, stats)
}

/// `None` for items missing a price, appraisal, positive limit, or name.
fn to_candidate(raw: &RawItem, secondary_cost: u64) -> Option<Candidate> {
    if raw.name.is_empty() {
        return None;
    }
    let unit_price = raw.unit_price?;
    let appraisal = raw.appraisal_value?;
    let limit = raw.purchase_limit.filter(|&l| l > 0)?;

    Some(
        Candidate::new(raw.id, raw.name.clone(), unit_price, appraisal, secondary_cost, limit)
            .with_icon(raw.icon.clone()),
    )
}

fn passes_thresholds(c: &Candidate, t: &Thresholds) -> bool {
    if c.profit < t.min_profit {
        return false;
    }
    if c.purchase_limit < t.min_purchase_limit {
        return false;
    }
    if t.max_unit_price > 0 && c.unit_price > t.max_unit_price {
        return false;
    }
    if t.max_total_cost > 0 {
        let quantity = recommended_quantity(c.unit_price, c.purchase_limit, t.max_total_cost);
        if quantity.saturating_mul(c.unit_price) > t.max_total_cost {
            return false;
        }
    }
    true
}

/// Sort descending by profit. Stable, so equal-profit candidates keep
/// snapshot order.
pub fn rank_by_profit(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| b.profit.cmp(&a.profit));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
