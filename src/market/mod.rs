//! Market integrations.
//!
//! Defines the three seams the engine consumes and provides HTTP
//! implementations for each:
//! - `MarketSnapshotProvider`: raw item prices and the per-action cost
//! - `LiquidityVerifier`: per-item trade volume
//! - `MembershipClassifier`: optional membership classification

pub mod item_db;
pub mod prices;
pub mod volume;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{LiquidityInfo, MembershipClass, RawItem, VerifyError};

/// All tradeable items at one point in time.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    pub items: Vec<RawItem>,
    /// Flat cost of one action, deducted from every item's profit.
    pub secondary_cost: u64,
}

/// Source of the raw market snapshot.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketSnapshotProvider: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<MarketSnapshot>;
}

/// Abstraction over the remote liquidity-data provider.
///
/// Each call is independent; the selector issues one per candidate
/// concurrently and treats any error as a zero-liquidity reading.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LiquidityVerifier: Send + Sync {
    async fn verify(&self, item_id: u32) -> Result<LiquidityInfo, VerifyError>;
}

/// Synchronous membership lookup. Must not block on I/O.
#[cfg_attr(test, mockall::automock)]
pub trait MembershipClassifier: Send + Sync {
    fn classify(&self, item_id: u32) -> MembershipClass;
}

/// Classifier for when no item database is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnknownClassifier;

impl MembershipClassifier for UnknownClassifier {
    fn classify(&self, _item_id: u32) -> MembershipClass {
        MembershipClass::Unknown
    }
}
