//! Five-minute trade volume (liquidity verifier).
//!
//! The `/5m` endpoint returns volumes for every item at once, so the
//! response is cached briefly: a tier issuing eight concurrent
//! verifications costs one HTTP round trip, not eight.
//!
//! API: `https://prices.runescape.wiki/api/v1/osrs/5m`
//! Auth: None required.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::LiquidityVerifier;
use crate::config::MarketConfig;
use crate::types::{LiquidityInfo, VerifyError};

/// A new window is published every five minutes; a minute of reuse
/// keeps one search run on a single consistent sample.
const VOLUME_CACHE_TTL_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct FiveMinuteResponse {
    #[serde(default)]
    data: HashMap<String, FiveMinuteEntry>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FiveMinuteEntry {
    #[serde(default)]
    high_price_volume: u64,
    #[serde(default)]
    low_price_volume: u64,
}

struct VolumeWindow {
    entries: Arc<HashMap<String, FiveMinuteEntry>>,
    fetched_at: DateTime<Utc>,
}

pub struct WikiVolumeClient {
    http: Client,
    url: String,
    window: Mutex<Option<VolumeWindow>>,
}

impl WikiVolumeClient {
    pub fn new(config: &MarketConfig) -> Result<Self, VerifyError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .connect_timeout(std::time::Duration::from_secs(5))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            http,
            url: format!("{}/5m", config.prices_base_url.trim_end_matches('/')),
            window: Mutex::new(None),
        })
    }

    async fn current_window(&self) -> Result<Arc<HashMap<String, FiveMinuteEntry>>, VerifyError> {
        let mut window = self.window.lock().await;
        if let Some(w) = window.as_ref() {
            if Utc::now() - w.fetched_at < Duration::seconds(VOLUME_CACHE_TTL_SECS) {
                return Ok(Arc::clone(&w.entries));
            }
        }

        debug!(url = %self.url, "Fetching five-minute volume window");
        let resp = self.http.get(&self.url).send().await?;
        if !resp.status().is_success() {
            return Err(VerifyError::Status(resp.status().as_u16()));
        }
        let body = resp.text().await?;
        let parsed: FiveMinuteResponse =
            serde_json::from_str(&body).map_err(|e| VerifyError::Parse(e.to_string()))?;

        let entries = Arc::new(parsed.data);
        *window = Some(VolumeWindow {
            entries: Arc::clone(&entries),
            fetched_at: Utc::now(),
        });
        Ok(entries)
    }
}

/// An item with no trades in the window reads as zero volume, not an error.
fn liquidity_from_window(entries: &HashMap<String, FiveMinuteEntry>, item_id: u32) -> LiquidityInfo {
    match entries.get(&item_id.to_string()) {
        Some(e) => LiquidityInfo::new(item_id, e.high_price_volume, e.low_price_volume),
        None => {
            debug!(item_id, "No volume data in window");
            LiquidityInfo::empty(item_id)
        }
    }
}

#[async_trait]
impl LiquidityVerifier for WikiVolumeClient {
    async fn verify(&self, item_id: u32) -> Result<LiquidityInfo, VerifyError> {
        let entries = self.current_window().await?;
        Ok(liquidity_from_window(&entries, item_id))
    }
}
