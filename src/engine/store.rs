//! Recommendation store.
//!
//! Bounded list of accepted winners, kept sorted descending by profit,
//! with the set of ids it has recommended. Every id in the list is in the
//! seen-set and vice versa; the list never exceeds `max_size` and never
//! holds an id twice.

use std::collections::HashSet;
use tracing::{debug, info};

use crate::types::{Candidate, LiquidityInfo};

/// Result of [`RecommendationStore::accept`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// Inserted; `evicted` lists ids trimmed off the tail to stay in bounds
    /// (may include the new id itself if it ranked last).
    Added { evicted: Vec<u32> },
    /// The id was already recommended; nothing changed.
    Duplicate,
}

#[derive(Debug, Clone)]
pub struct RecommendationStore {
    items: Vec<Candidate>,
    seen: HashSet<u32>,
    max_size: usize,
}

impl RecommendationStore {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: Vec::with_capacity(max_size.saturating_add(1)),
            seen: HashSet::new(),
            max_size,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.seen.contains(&id)
    }

    pub fn seen_ids(&self) -> &HashSet<u32> {
        &self.seen
    }

    /// Insert a winner, attaching `liquidity` if given, then re-sort and
    /// trim to `max_size`. Idempotent per id.
    pub fn accept(&mut self, mut candidate: Candidate, liquidity: Option<LiquidityInfo>) -> AcceptOutcome {
        if self.seen.contains(&candidate.id) {
            debug!(item = %candidate.name, item_id = candidate.id, "Item already recommended, skipping duplicate");
            return AcceptOutcome::Duplicate;
        }

        if let Some(liq) = liquidity {
            candidate.attach_liquidity(liq);
        }

        let name = candidate.name.clone();
        self.seen.insert(candidate.id);
        self.items.push(candidate);
        // Stable: among equal profits the newest sits last.
        self.items.sort_by(|a, b| b.profit.cmp(&a.profit));

        let mut evicted = Vec::new();
        while self.items.len() > self.max_size {
            if let Some(removed) = self.items.pop() {
                self.seen.remove(&removed.id);
                evicted.push(removed.id);
            }
        }

        info!(item = %name, total = self.items.len(), evicted = evicted.len(), "Added recommendation");
        AcceptOutcome::Added { evicted }
    }

    /// Remove by id. Returns whether anything was removed.
    pub fn remove(&mut self, id: u32) -> bool {
        let before = self.items.len();
        self.items.retain(|c| c.id != id);
        self.seen.remove(&id);
        before != self.items.len()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.seen.clear();
    }

    /// Owned copy of the ranked list.
    pub fn snapshot(&self) -> Vec<Candidate> {
        self.items.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
