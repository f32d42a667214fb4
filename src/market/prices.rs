//! Wiki real-time prices integration (snapshot provider).
//!
//! Joins the static item mapping (name, purchase limit, alchemy value)
//! with the latest traded prices to build a [`MarketSnapshot`].
//!
//! API docs: https://prices.runescape.wiki
//! Endpoints: `/mapping` (static, cached 24h), `/latest`
//! Auth: None, but a descriptive User-Agent is required.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{MarketSnapshot, MarketSnapshotProvider};
use crate::config::MarketConfig;
use crate::types::RawItem;

/// The mapping changes only with game updates.
const MAPPING_TTL_HOURS: i64 = 24;

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MappingEntry {
    id: u32,
    #[serde(default)]
    name: String,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    highalch: Option<u64>,
    #[serde(default)]
    icon: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LatestResponse {
    #[serde(default)]
    data: HashMap<String, LatestPrice>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct LatestPrice {
    #[serde(default)]
    high: Option<u64>,
    #[serde(default)]
    low: Option<u64>,
}

impl LatestPrice {
    /// What we'd pay: the instant-buy price, else the instant-sell price.
    fn effective(&self) -> Option<u64> {
        match (self.high, self.low) {
            (Some(h), _) if h > 0 => Some(h),
            (_, Some(l)) if l > 0 => Some(l),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

struct CachedMapping {
    entries: Arc<Vec<MappingEntry>>,
    fetched_at: DateTime<Utc>,
}

/// Snapshot provider backed by the wiki prices API.
pub struct WikiPriceClient {
    http: Client,
    base_url: String,
    secondary_cost_item_id: u32,
    mapping: Mutex<Option<CachedMapping>>,
}

impl WikiPriceClient {
    pub fn new(config: &MarketConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .connect_timeout(std::time::Duration::from_secs(10))
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to build HTTP client for wiki prices")?;

        Ok(Self {
            http,
            base_url: config.prices_base_url.trim_end_matches('/').to_string(),
            secondary_cost_item_id: config.secondary_cost_item_id,
            mapping: Mutex::new(None),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = format!("{}/{endpoint}", self.base_url);
        debug!(url = %url, "Fetching wiki prices endpoint");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Wiki prices request failed: {endpoint}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Wiki prices API error {status} on /{endpoint}: {body}");
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse wiki prices /{endpoint} response"))
    }

    /// Item mapping, refreshed at most once per [`MAPPING_TTL_HOURS`].
    /// The lock is held across the fetch so concurrent callers share it.
    async fn mapping(&self) -> Result<Arc<Vec<MappingEntry>>> {
        let mut cached = self.mapping.lock().await;
        if let Some(c) = cached.as_ref() {
            if Utc::now() - c.fetched_at < Duration::hours(MAPPING_TTL_HOURS) {
                return Ok(Arc::clone(&c.entries));
            }
        }

        let entries: Vec<MappingEntry> = self.get_json("mapping").await?;
        info!(items = entries.len(), "Item mapping loaded");
        let entries = Arc::new(entries);
        *cached = Some(CachedMapping {
            entries: Arc::clone(&entries),
            fetched_at: Utc::now(),
        });
        Ok(entries)
    }
}

/// Join the mapping with latest prices. Fields either side is missing
/// stay `None` on the raw item.
pub(crate) fn build_snapshot(
    mapping: &[MappingEntry],
    latest: &HashMap<String, LatestPrice>,
    secondary_cost_item_id: u32,
) -> MarketSnapshot {
    let price_of = |id: u32| latest.get(&id.to_string()).and_then(LatestPrice::effective);

    let items = mapping
        .iter()
        .map(|m| RawItem {
            id: m.id,
            name: m.name.clone(),
            unit_price: price_of(m.id),
            appraisal_value: m.highalch,
            purchase_limit: m.limit,
            icon: m.icon.clone(),
        })
        .collect();

    let secondary_cost = price_of(secondary_cost_item_id).unwrap_or_else(|| {
        warn!(
            item_id = secondary_cost_item_id,
            "No price for per-action consumable, assuming zero cost"
        );
        0
    });

    MarketSnapshot {
        items,
        secondary_cost,
    }
}

#[async_trait]
impl MarketSnapshotProvider for WikiPriceClient {
    async fn fetch_snapshot(&self) -> Result<MarketSnapshot> {
        let mapping = self.mapping().await?;
        let latest: LatestResponse = self.get_json("latest").await?;

        let snapshot = build_snapshot(&mapping, &latest.data, self.secondary_cost_item_id);
        info!(
            items = snapshot.items.len(),
            priced = latest.data.len(),
            secondary_cost = snapshot.secondary_cost,
            "Market snapshot fetched"
        );
        Ok(snapshot)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const MAPPING_JSON: &str = r#"[
        {"id": 1127, "name": "Rune platebody", "members": false, "limit": 70, "highalch": 39000, "icon": "Rune platebody.png"},
        {"id": 561, "name": "Nature rune", "members": false, "limit": 18000, "highalch": 108},
        {"id": 9999, "name": "Untradeable thing", "members": true}
    ]"#;

    const LATEST_JSON: &str = r#"{"data": {
        "1127": {"high": 38100, "highTime": 1700000000, "low": 37900, "lowTime": 1700000000},
        "561": {"high": 180, "low": 175},
        "9999": {"high": null, "low": 40}
    }}"#;

    fn parse() -> (Vec<MappingEntry>, LatestResponse) {
        (
            serde_json::from_str(MAPPING_JSON).unwrap(),
            serde_json::from_str(LATEST_JSON).unwrap(),
        )
    }

    #[test]
    fn test_build_snapshot_joins_mapping_and_prices() {
        let (mapping, latest) = parse();
        let snap = build_snapshot(&mapping, &latest.data, 561);

        assert_eq!(snap.items.len(), 3);
        assert_eq!(snap.secondary_cost, 180);

        let plate = &snap.items[0];
        assert_eq!(plate.name, "Rune platebody");
        assert_eq!(plate.unit_price, Some(38_100));
        assert_eq!(plate.appraisal_value, Some(39_000));
        assert_eq!(plate.purchase_limit, Some(70));
        assert_eq!(plate.icon.as_deref(), Some("Rune platebody.png"));
    }

    #[test]
    fn test_missing_fields_stay_none() {
        let (mapping, latest) = parse();
        let snap = build_snapshot(&mapping, &latest.data, 561);
        let odd = snap.items.iter().find(|i| i.id == 9999).unwrap();
        assert_eq!(odd.unit_price, Some(40), "falls back to low price");
        assert_eq!(odd.appraisal_value, None);
        assert_eq!(odd.purchase_limit, None);
    }

    #[test]
    fn test_unpriced_secondary_cost_is_zero() {
        let (mapping, _) = parse();
        let snap = build_snapshot(&mapping, &HashMap::new(), 561);
        assert_eq!(snap.secondary_cost, 0);
        assert!(snap.items.iter().all(|i| i.unit_price.is_none()));
    }

    #[test]
    fn test_effective_price_ignores_zero_high() {
        let p = LatestPrice {
            high: Some(0),
            low: Some(12),
        };
        assert_eq!(p.effective(), Some(12));
        let none = LatestPrice {
            high: None,
            low: None,
        };
        assert_eq!(none.effective(), None);
    }

    #[test]
    fn test_client_construction() {
        let client = WikiPriceClient::new(&MarketConfig::default()).unwrap();
        assert!(!client.base_url.ends_with('/'));
        assert_eq!(client.secondary_cost_item_id, 561);
    }
}
