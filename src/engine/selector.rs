//! Tiered selection engine.
//!
//! Walks an ordered tier sequence over profit-ranked candidates. Verified
//! tiers fan out one liquidity request per candidate, wait for every one
//! to settle, then score the whole tier; unverified tiers take the top
//! profit directly. The first tier to produce a winner ends the search.
//!
//! Tiers run strictly in sequence. Within a verified tier, requests are
//! joined (never raced): the winner is chosen from the complete result
//! set, so network timing cannot change the pick.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::SelectionConfig;
use crate::market::LiquidityVerifier;
use crate::types::{
    Candidate, LiquidityInfo, MissingLiquidityPolicy, ScoredCandidate, Tier, VerifyError,
};

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

const PROFIT_WEIGHT: f64 = 0.6;
const VOLUME_WEIGHT: f64 = 0.4;

/// Profit is scaled so 1000 gp per action scores 1.0.
const PROFIT_SCALE: f64 = 1000.0;

/// Daily volume whose log10 saturates the volume score (one million).
const VOLUME_LOG_CEILING: f64 = 6.0;

pub fn profit_score(candidate: &Candidate) -> f64 {
    candidate.profit as f64 / PROFIT_SCALE
}

/// `None` (failed verification) scores as zero volume.
pub fn volume_score(liquidity: Option<&LiquidityInfo>) -> f64 {
    let daily = liquidity.map_or(0, LiquidityInfo::estimated_daily_volume) as f64;
    ((daily + 1.0).log10() / VOLUME_LOG_CEILING).min(1.0)
}

pub fn score(candidate: &Candidate, liquidity: Option<&LiquidityInfo>) -> f64 {
    PROFIT_WEIGHT * profit_score(candidate) + VOLUME_WEIGHT * volume_score(liquidity)
}

// ---------------------------------------------------------------------------
// Liquidity policy
// ---------------------------------------------------------------------------

/// Minimum-liquidity-rate filter applied to verified tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LiquidityPolicy {
    /// Minimum estimated trades per hour. 0 disables the filter.
    pub min_per_hour: u64,
    pub on_missing: MissingLiquidityPolicy,
}

impl LiquidityPolicy {
    pub fn admits(&self, liquidity: Option<&LiquidityInfo>) -> bool {
        if self.min_per_hour == 0 {
            return true;
        }
        match liquidity {
            Some(l) => l.estimated_hourly_volume() >= self.min_per_hour as f64,
            None => self.on_missing == MissingLiquidityPolicy::Pass,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// The accepted pick of one search run.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub candidate: Candidate,
    /// Liquidity observed for the winner, if its tier verified and the
    /// verification succeeded.
    pub liquidity: Option<LiquidityInfo>,
    /// Zero-based index of the tier that produced the winner.
    pub tier: usize,
    /// Composite score; `None` for profit-only tiers.
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoSelectionReason {
    /// The filter left nothing to rank.
    NoCandidates,
    /// Every tier passed through without a winner.
    TiersExhausted,
    /// The market snapshot could not be fetched.
    SnapshotUnavailable,
}

impl std::fmt::Display for NoSelectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoSelectionReason::NoCandidates => write!(f, "no candidates"),
            NoSelectionReason::TiersExhausted => write!(f, "all tiers exhausted"),
            NoSelectionReason::SnapshotUnavailable => write!(f, "market snapshot unavailable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    Selected(Selection),
    NoSelection(NoSelectionReason),
}

impl SelectionOutcome {
    pub fn is_selected(&self) -> bool {
        matches!(self, SelectionOutcome::Selected(_))
    }

    pub fn selection(&self) -> Option<&Selection> {
        match self {
            SelectionOutcome::Selected(s) => Some(s),
            SelectionOutcome::NoSelection(_) => None,
        }
    }
}

/// How one tier resolved. Passed to the per-tier continuation.
#[derive(Debug, Clone, PartialEq)]
pub struct TierReport {
    pub index: usize,
    pub tier: Tier,
    /// Candidates in the tier's slice.
    pub considered: usize,
    /// Verifications that failed or timed out.
    pub failed_verifications: usize,
    /// Candidates dropped by the liquidity policy.
    pub excluded: usize,
    /// Winning item id, or `None` if the tier passed through.
    pub winner: Option<u32>,
}

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

pub struct TieredSelector {
    tiers: Vec<Tier>,
    verifier: Arc<dyn LiquidityVerifier>,
    policy: LiquidityPolicy,
    verify_timeout: Duration,
}

impl TieredSelector {
    pub fn new(
        tiers: Vec<Tier>,
        verifier: Arc<dyn LiquidityVerifier>,
        policy: LiquidityPolicy,
        verify_timeout: Duration,
    ) -> Self {
        Self {
            tiers,
            verifier,
            policy,
            verify_timeout,
        }
    }

    pub fn from_config(cfg: &SelectionConfig, verifier: Arc<dyn LiquidityVerifier>) -> Self {
        Self::new(
            cfg.tiers.clone(),
            verifier,
            LiquidityPolicy {
                min_per_hour: cfg.min_liquidity_per_hour,
                on_missing: cfg.missing_liquidity,
            },
            cfg.verify_timeout(),
        )
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// Select a winner from candidates already sorted descending by profit.
    pub async fn select(&self, candidates: &[Candidate]) -> SelectionOutcome {
        self.select_with(candidates, |_| {}).await
    }

    /// As [`TieredSelector::select`], invoking `on_tier` once per
    /// resolved tier, in order.
    pub async fn select_with<F>(&self, candidates: &[Candidate], mut on_tier: F) -> SelectionOutcome
    where
        F: FnMut(&TierReport),
    {
        if candidates.is_empty() {
            info!("No candidates to rank");
            return SelectionOutcome::NoSelection(NoSelectionReason::NoCandidates);
        }

        for (index, tier) in self.tiers.iter().copied().enumerate() {
            let slice = &candidates[..tier.ceiling.min(candidates.len())];
            if slice.is_empty() {
                continue;
            }

            info!(
                tier = index + 1,
                candidates = slice.len(),
                check_liquidity = tier.check_liquidity,
                "Evaluating search tier"
            );

            let (report, selection) = if tier.check_liquidity {
                self.evaluate_verified(index, tier, slice).await
            } else {
                let winner = slice[0].clone();
                let report = TierReport {
                    index,
                    tier,
                    considered: slice.len(),
                    failed_verifications: 0,
                    excluded: 0,
                    winner: Some(winner.id),
                };
                let selection = Selection {
                    candidate: winner,
                    liquidity: None,
                    tier: index,
                    score: None,
                };
                (report, Some(selection))
            };

            on_tier(&report);

            match selection {
                Some(sel) => {
                    info!(
                        tier = index + 1,
                        item = %sel.candidate.name,
                        item_id = sel.candidate.id,
                        profit = sel.candidate.profit,
                        score = ?sel.score,
                        daily_volume = ?sel.liquidity.map(|l| l.estimated_daily_volume()),
                        "Selected item"
                    );
                    return SelectionOutcome::Selected(sel);
                }
                None => {
                    info!(
                        tier = index + 1,
                        excluded = report.excluded,
                        "No item in tier met liquidity requirements, trying next tier"
                    );
                }
            }
        }

        warn!("All search tiers exhausted, no suitable item found");
        SelectionOutcome::NoSelection(NoSelectionReason::TiersExhausted)
    }

    /// Verify, score, filter, and pick within one tier.
    async fn evaluate_verified(
        &self,
        index: usize,
        tier: Tier,
        slice: &[Candidate],
    ) -> (TierReport, Option<Selection>) {
        let readings = self.verify_all(slice).await;
        let failed = readings.iter().filter(|r| r.is_none()).count();

        let mut excluded = 0;
        let mut eligible = Vec::with_capacity(slice.len());
        for (candidate, liquidity) in slice.iter().zip(readings) {
            let scored = ScoredCandidate {
                score: score(candidate, liquidity.as_ref()),
                candidate: candidate.clone(),
                liquidity,
            };
            debug!(
                tier = index + 1,
                item = %scored.candidate.name,
                score = scored.score,
                daily_volume = ?scored.liquidity.map(|l| l.estimated_daily_volume()),
                "Scored candidate"
            );
            if self.policy.admits(scored.liquidity.as_ref()) {
                eligible.push(scored);
            } else {
                debug!(item = %scored.candidate.name, "Filtered out by liquidity requirement");
                excluded += 1;
            }
        }

        let winner = pick_winner(eligible);
        let report = TierReport {
            index,
            tier,
            considered: slice.len(),
            failed_verifications: failed,
            excluded,
            winner: winner.as_ref().map(|w| w.candidate.id),
        };
        let selection = winner.map(|w| Selection {
            candidate: w.candidate,
            liquidity: w.liquidity,
            tier: index,
            score: Some(w.score),
        });
        (report, selection)
    }

    /// Issue one verification per candidate and join them all. The
    /// result is positionally aligned with `slice`; failures are `None`.
    async fn verify_all(&self, slice: &[Candidate]) -> Vec<Option<LiquidityInfo>> {
        let total = slice.len();
        let requests = slice.iter().map(|c| async move {
            let result = match tokio::time::timeout(self.verify_timeout, self.verifier.verify(c.id)).await {
                Ok(r) => r,
                Err(_) => Err(VerifyError::Timeout(self.verify_timeout.as_secs())),
            };
            match result {
                Ok(liq) => Some(liq),
                Err(e) => {
                    warn!(item = %c.name, item_id = c.id, error = %e, "Error checking volume");
                    None
                }
            }
        });

        let readings = join_all(requests).await;
        debug!(
            total,
            succeeded = readings.iter().filter(|r| r.is_some()).count(),
            "Volume checks settled"
        );
        readings
    }
}

/// Highest score wins; on a tie the earlier (higher-profit) entry stays.
pub fn pick_winner(scored: Vec<ScoredCandidate>) -> Option<ScoredCandidate> {
    let mut best: Option<ScoredCandidate> = None;
    for s in scored {
        if best.as_ref().map_or(true, |b| s.score > b.score) {
            best = Some(s);
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
