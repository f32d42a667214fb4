//! Shared types for the ALCHEMIST engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that market, engine, and
//! display modules can depend on them without circular references.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Actions per hour at one cast every 3 seconds.
pub const ACTIONS_PER_HOUR: i64 = 3600 / 3;

/// Five-minute sampling windows per day (1440 / 5).
pub const SAMPLE_WINDOWS_PER_DAY: u64 = 288;

// ---------------------------------------------------------------------------
// Raw market data
// ---------------------------------------------------------------------------

/// One tradeable item as reported by the market snapshot provider.
///
/// Fields the provider could not resolve are `None`; the eligibility
/// filter skips such items silently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawItem {
    pub id: u32,
    pub name: String,
    pub unit_price: Option<u64>,
    /// Value received per action (high-alchemy value).
    pub appraisal_value: Option<u64>,
    /// Maximum units purchasable per limit window.
    pub purchase_limit: Option<u32>,
    /// Opaque icon reference, passed through to the display.
    #[serde(default)]
    pub icon: Option<String>,
}

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// An item that passed the eligibility filter.
///
/// Immutable once constructed except for the liquidity annotation,
/// which the store attaches at most once on acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: u32,
    pub name: String,
    pub unit_price: u64,
    pub appraisal_value: u64,
    pub secondary_cost: u64,
    /// `appraisal_value - unit_price - secondary_cost`, may be negative.
    pub profit: i64,
    pub purchase_limit: u32,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    liquidity: Option<LiquidityInfo>,
}

impl Candidate {
    pub fn new(
        id: u32,
        name: impl Into<String>,
        unit_price: u64,
        appraisal_value: u64,
        secondary_cost: u64,
        purchase_limit: u32,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            unit_price,
            appraisal_value,
            secondary_cost,
            profit: profit_of(appraisal_value, unit_price, secondary_cost),
            purchase_limit,
            icon: None,
            liquidity: None,
        }
    }

    pub fn with_icon(mut self, icon: Option<String>) -> Self {
        self.icon = icon;
        self
    }

    pub fn liquidity(&self) -> Option<&LiquidityInfo> {
        self.liquidity.as_ref()
    }

    /// Attach liquidity data. Returns `false` if an annotation is
    /// already present; the first one wins.
    pub(crate) fn attach_liquidity(&mut self, liquidity: LiquidityInfo) -> bool {
        if self.liquidity.is_some() {
            return false;
        }
        self.liquidity = Some(liquidity);
        true
    }

    /// Expected profit per hour at [`ACTIONS_PER_HOUR`].
    pub fn profit_per_hour(&self) -> i64 {
        self.profit.saturating_mul(ACTIONS_PER_HOUR)
    }

    /// Units to buy: the purchase limit, capped by what `max_total_cost`
    /// can afford (0 disables the cap). Never less than one.
    pub fn recommended_quantity(&self, max_total_cost: u64) -> u64 {
        recommended_quantity(self.unit_price, self.purchase_limit, max_total_cost)
    }

    /// Total outlay for [`Candidate::recommended_quantity`] units.
    pub fn total_cost(&self, max_total_cost: u64) -> u64 {
        self.recommended_quantity(max_total_cost)
            .saturating_mul(self.unit_price)
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (#{}) price={} value={} profit={} limit={}",
            self.name,
            self.id,
            self.unit_price,
            self.appraisal_value,
            self.profit,
            self.purchase_limit,
        )
    }
}

/// Per-action profit: appraisal value minus unit price minus the
/// consumable cost of one action.
pub fn profit_of(appraisal_value: u64, unit_price: u64, secondary_cost: u64) -> i64 {
    let gp = |v: u64| i64::try_from(v).unwrap_or(i64::MAX);
    gp(appraisal_value)
        .saturating_sub(gp(unit_price))
        .saturating_sub(gp(secondary_cost))
}

pub fn recommended_quantity(unit_price: u64, purchase_limit: u32, max_total_cost: u64) -> u64 {
    let mut quantity = purchase_limit as u64;
    if max_total_cost > 0 && unit_price > 0 {
        quantity = quantity.min(max_total_cost / unit_price);
    }
    quantity.max(1)
}

// ---------------------------------------------------------------------------
// Liquidity
// ---------------------------------------------------------------------------

/// Trade volume observed for an item over one five-minute window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityInfo {
    pub item_id: u32,
    pub buy_volume: u64,
    pub sell_volume: u64,
}

impl LiquidityInfo {
    pub fn new(item_id: u32, buy_volume: u64, sell_volume: u64) -> Self {
        Self {
            item_id,
            buy_volume,
            sell_volume,
        }
    }

    /// Present-but-empty reading.
    pub fn empty(item_id: u32) -> Self {
        Self::new(item_id, 0, 0)
    }

    pub fn total_volume(&self) -> u64 {
        self.buy_volume.saturating_add(self.sell_volume)
    }

    /// Five-minute volume extrapolated to 24 hours.
    pub fn estimated_daily_volume(&self) -> u64 {
        self.total_volume().saturating_mul(SAMPLE_WINDOWS_PER_DAY)
    }

    pub fn estimated_hourly_volume(&self) -> f64 {
        self.estimated_daily_volume() as f64 / 24.0
    }
}

impl fmt::Display for LiquidityInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "buy={} sell={} daily~{}",
            self.buy_volume,
            self.sell_volume,
            self.estimated_daily_volume(),
        )
    }
}

// ---------------------------------------------------------------------------
// Tiers and scoring
// ---------------------------------------------------------------------------

/// One stage of the tiered search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    /// How many of the top-profit candidates this tier considers.
    pub ceiling: usize,
    /// Whether liquidity is verified before picking a winner.
    pub check_liquidity: bool,
}

impl Tier {
    pub const fn new(ceiling: usize, check_liquidity: bool) -> Self {
        Self {
            ceiling,
            check_liquidity,
        }
    }

    /// The stock tier sequence: two verified tiers, then two
    /// profit-only fallbacks.
    pub fn default_sequence() -> Vec<Tier> {
        vec![
            Tier::new(8, true),
            Tier::new(15, true),
            Tier::new(25, false),
            Tier::new(50, false),
        ]
    }
}

/// A candidate scored during a verified tier.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    /// `None` when verification failed; scored as zero volume.
    pub liquidity: Option<LiquidityInfo>,
    pub score: f64,
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Membership class reported by the item classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MembershipClass {
    Free,
    Members,
    Unknown,
}

/// Which membership classes the eligibility filter admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MembershipFilter {
    #[serde(alias = "free")]
    F2p,
    #[serde(alias = "p2p")]
    Members,
    #[default]
    Both,
}

impl MembershipFilter {
    /// `Unknown` always passes.
    pub fn admits(&self, class: MembershipClass) -> bool {
        match (self, class) {
            (MembershipFilter::Both, _) | (_, MembershipClass::Unknown) => true,
            (MembershipFilter::F2p, MembershipClass::Free) => true,
            (MembershipFilter::Members, MembershipClass::Members) => true,
            _ => false,
        }
    }
}

impl fmt::Display for MembershipFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MembershipFilter::F2p => write!(f, "Free-to-Play Only"),
            MembershipFilter::Members => write!(f, "Members Only"),
            MembershipFilter::Both => write!(f, "Both F2P and P2P"),
        }
    }
}

/// How a search run treats the existing recommendations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Clear the store and seen-set, then search from scratch.
    ReplaceAll,
    /// Keep the store and skip items already recommended.
    AddNew,
}

impl SearchMode {
    pub fn excludes_seen(&self) -> bool {
        matches!(self, SearchMode::AddNew)
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMode::ReplaceAll => write!(f, "replace-all"),
            SearchMode::AddNew => write!(f, "add-new"),
        }
    }
}

/// What the minimum-liquidity filter does with a candidate whose
/// verification produced no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingLiquidityPolicy {
    #[default]
    Pass,
    Reject,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failure of a single liquidity verification. Never fatal: the
/// selector scores the candidate at zero liquidity instead.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("volume request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("volume endpoint returned HTTP {0}")]
    Status(u16),

    #[error("malformed volume data: {0}")]
    Parse(String),

    #[error("verification timed out after {0}s")]
    Timeout(u64),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
