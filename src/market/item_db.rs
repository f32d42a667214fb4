//! Item database (membership classifier).
//!
//! Downloads a complete item database once a day and keeps only the
//! `members` flag per item. Lookups are synchronous and never trigger a
//! download; an item not yet known classifies as `Unknown`, which the
//! eligibility filter always admits.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::MembershipClassifier;
use crate::config::MarketConfig;
use crate::types::MembershipClass;

const CACHE_TTL_HOURS: i64 = 24;

#[derive(Default)]
struct MembershipCache {
    members: HashMap<u32, bool>,
    loaded_at: Option<DateTime<Utc>>,
}

/// Counts from one parse of the database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub parsed: usize,
    pub free: usize,
    pub members: usize,
    pub skipped: usize,
}

pub struct ItemDatabase {
    http: Client,
    url: String,
    cache: RwLock<MembershipCache>,
    /// Held for the duration of a download so loads never overlap.
    load: Mutex<()>,
}

impl ItemDatabase {
    pub fn new(config: &MarketConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .connect_timeout(std::time::Duration::from_secs(10))
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to build HTTP client for item database")?;

        Ok(Self {
            http,
            url: config.item_db_url.clone(),
            cache: RwLock::new(MembershipCache::default()),
            load: Mutex::new(()),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, MembershipCache> {
        self.cache.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MembershipCache> {
        self.cache.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn cache_size(&self) -> usize {
        self.read().members.len()
    }

    /// Whether the cached data is younger than the TTL.
    pub fn is_fresh(&self) -> bool {
        self.read()
            .loaded_at
            .is_some_and(|at| Utc::now() - at < Duration::hours(CACHE_TTL_HOURS))
    }

    /// Download the database unless the cache is still fresh.
    pub async fn ensure_loaded(&self) -> Result<()> {
        if self.is_fresh() {
            return Ok(());
        }
        let _guard = self.load.lock().await;
        // Another caller may have finished a load while we waited.
        if self.is_fresh() {
            return Ok(());
        }
        self.download().await
    }

    /// Force a reload. A load that completes while this call waits for
    /// the in-flight one satisfies it.
    pub async fn refresh(&self) -> Result<()> {
        let requested_at = Utc::now();
        info!(url = %self.url, "Refreshing item database");
        let _guard = self.load.lock().await;
        if self.read().loaded_at.is_some_and(|at| at >= requested_at) {
            return Ok(());
        }
        self.download().await
    }

    async fn download(&self) -> Result<()> {
        debug!(url = %self.url, "Downloading item database");
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .context("Item database request failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("Failed to fetch item database: HTTP {}", resp.status());
        }

        let root: serde_json::Map<String, Value> = resp
            .json()
            .await
            .context("Failed to parse item database JSON")?;

        let (members, stats) = parse_members(&root);
        self.install(members);

        info!(
            parsed = stats.parsed,
            free = stats.free,
            members = stats.members,
            skipped = stats.skipped,
            "Item database loaded"
        );
        Ok(())
    }

    fn install(&self, members: HashMap<u32, bool>) {
        let mut cache = self.write();
        cache.members.extend(members);
        cache.loaded_at = Some(Utc::now());
    }
}

impl MembershipClassifier for ItemDatabase {
    fn classify(&self, item_id: u32) -> MembershipClass {
        match self.read().members.get(&item_id) {
            Some(true) => MembershipClass::Members,
            Some(false) => MembershipClass::Free,
            None => MembershipClass::Unknown,
        }
    }
}

/// Extract `id -> members` from a database keyed by item id. Invalid
/// keys and entries without a boolean `members` field are skipped.
pub fn parse_members(root: &serde_json::Map<String, Value>) -> (HashMap<u32, bool>, ParseStats) {
    let mut out = HashMap::with_capacity(root.len());
    let mut stats = ParseStats::default();

    for (key, item) in root {
        let Ok(id) = key.parse::<u32>() else {
            debug!(key = %key, "Skipping invalid item id");
            stats.skipped += 1;
            continue;
        };
        match item.get("members").and_then(Value::as_bool) {
            Some(is_members) => {
                out.insert(id, is_members);
                stats.parsed += 1;
                if is_members {
                    stats.members += 1;
                } else {
                    stats.free += 1;
                }
            }
            None => stats.skipped += 1,
        }
    }

    (out, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> ItemDatabase {
        ItemDatabase::new(&MarketConfig::default()).unwrap()
    }

    fn sample() -> serde_json::Map<String, Value> {
        serde_json::from_str(
            r#"{
                "1127": {"name": "Rune platebody", "members": false},
                "4151": {"name": "Abyssal whip", "members": true},
                "abc": {"members": true},
                "30": {"name": "No flag"}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_members() {
        let (map, stats) = parse_members(&sample());
        assert_eq!(map.get(&1127), Some(&false));
        assert_eq!(map.get(&4151), Some(&true));
        assert_eq!(map.len(), 2);
        assert_eq!(
            stats,
            ParseStats {
                parsed: 2,
                free: 1,
                members: 1,
                skipped: 2
            }
        );
    }

    #[test]
    fn test_classify_before_load_is_unknown() {
        let db = db();
        assert_eq!(db.classify(1127), MembershipClass::Unknown);
        assert!(!db.is_fresh());
        assert_eq!(db.cache_size(), 0);
    }

    #[test]
    fn test_classify_after_install() {
        let db = db();
        let (map, _) = parse_members(&sample());
        db.install(map);
        assert!(db.is_fresh());
        assert_eq!(db.classify(1127), MembershipClass::Free);
        assert_eq!(db.classify(4151), MembershipClass::Members);
        assert_eq!(db.classify(30), MembershipClass::Unknown);
    }

    #[tokio::test]
    async fn test_ensure_loaded_skips_when_fresh() {
        let mut cfg = MarketConfig::default();
        cfg.item_db_url = "http://127.0.0.1:1/items.json".to_string();
        let db = ItemDatabase::new(&cfg).unwrap();
        db.install(HashMap::from([(1, true)]));
        // Fresh cache: no request is made, so the bad URL never matters.
        assert!(db.ensure_loaded().await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_download_leaves_cache_intact() {
        let mut cfg = MarketConfig::default();
        cfg.item_db_url = "http://127.0.0.1:1/items.json".to_string();
        let db = ItemDatabase::new(&cfg).unwrap();
        assert!(db.refresh().await.is_err());
        assert_eq!(db.cache_size(), 0);
        assert!(!db.is_fresh());
    }
}
