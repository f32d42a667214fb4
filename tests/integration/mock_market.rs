//! Mock market for integration testing.
//!
//! Provides a deterministic in-memory implementation of all three market
//! seams: snapshot, liquidity, and membership. Prices, volumes, failures,
//! and a fetch gate are controllable from test code.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use alchemist::market::{LiquidityVerifier, MarketSnapshot, MarketSnapshotProvider, MembershipClassifier};
use alchemist::types::{LiquidityInfo, MembershipClass, RawItem, VerifyError};

pub struct MockMarket {
    items: Mutex<Vec<RawItem>>,
    secondary_cost: u64,
    volumes: Mutex<HashMap<u32, LiquidityInfo>>,
    failing: Mutex<HashSet<u32>>,
    members: HashMap<u32, bool>,
    /// If set, snapshot fetches return this error.
    force_error: Mutex<Option<String>>,
    /// If set, snapshot fetches wait for a notification before returning.
    gate: Mutex<Option<Arc<Notify>>>,
    pub snapshot_calls: AtomicUsize,
    pub verify_calls: AtomicUsize,
}

impl MockMarket {
    pub fn new(items: Vec<RawItem>, secondary_cost: u64) -> Self {
        Self {
            items: Mutex::new(items),
            secondary_cost,
            volumes: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            members: HashMap::new(),
            force_error: Mutex::new(None),
            gate: Mutex::new(None),
            snapshot_calls: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
        }
    }

    /// A small market with known profits at a 180 gp action cost:
    /// 1 → 820, 2 → 620, 3 → 420, 4 → 220, 5 → 20 (below 100 minimum).
    pub fn standard() -> Self {
        let mut market = Self::new(
            vec![
                item(1, "Rune platebody", 38_000, 39_000, 70),
                item(2, "Rune 2h sword", 37_200, 38_000, 70),
                item(3, "Dragon dagger", 17_400, 18_000, 100),
                item(4, "Green d'hide body", 4_300, 4_700, 125),
                item(5, "Steel platebody", 3_000, 3_200, 125),
            ],
            180,
        );
        market.members = HashMap::from([(1, false), (2, false), (3, true), (4, true)]);
        market
    }

    pub fn with_volume(self, id: u32, buy: u64, sell: u64) -> Self {
        self.volumes.lock().unwrap().insert(id, LiquidityInfo::new(id, buy, sell));
        self
    }

    pub fn failing_verification(self, id: u32) -> Self {
        self.failing.lock().unwrap().insert(id);
        self
    }

    pub fn set_items(&self, items: Vec<RawItem>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    /// Make the next snapshot fetches block until the returned handle is
    /// notified.
    pub fn hold_snapshot(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }
}

pub fn item(id: u32, name: &str, price: u64, value: u64, limit: u32) -> RawItem {
    RawItem {
        id,
        name: name.to_string(),
        unit_price: Some(price),
        appraisal_value: Some(value),
        purchase_limit: Some(limit),
        icon: Some(format!("{}.png", name.replace(' ', "_"))),
    }
}

#[async_trait]
impl MarketSnapshotProvider for MockMarket {
    async fn fetch_snapshot(&self) -> Result<MarketSnapshot> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if let Some(msg) = self.force_error.lock().unwrap().clone() {
            return Err(anyhow!(msg));
        }

        Ok(MarketSnapshot {
            items: self.items.lock().unwrap().clone(),
            secondary_cost: self.secondary_cost,
        })
    }
}

#[async_trait]
impl LiquidityVerifier for MockMarket {
    async fn verify(&self, item_id: u32) -> Result<LiquidityInfo, VerifyError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(&item_id) {
            return Err(VerifyError::Status(503));
        }
        Ok(self
            .volumes
            .lock()
            .unwrap()
            .get(&item_id)
            .copied()
            .unwrap_or_else(|| LiquidityInfo::empty(item_id)))
    }
}

impl MembershipClassifier for MockMarket {
    fn classify(&self, item_id: u32) -> MembershipClass {
        match self.members.get(&item_id) {
            Some(true) => MembershipClass::Members,
            Some(false) => MembershipClass::Free,
            None => MembershipClass::Unknown,
        }
    }
}
