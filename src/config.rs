//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every field has a default, so a partial (or empty) file is valid;
//! [`AppConfig::validate`] enforces the ranges the engine relies on.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::types::{MembershipFilter, MissingLiquidityPolicy, Tier};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub selection: SelectionConfig,
    pub market: MarketConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
    /// How often the host loop checks whether a search may start.
    pub tick_interval_ms: u64,
    /// Queue a replace-all search as soon as the agent starts.
    pub search_on_start: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "ALCHEMIST".to_string(),
            tick_interval_ms: 600,
            search_on_start: true,
        }
    }
}

/// Thresholds and policy for candidate selection.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SelectionConfig {
    /// Minimum profit per action (gp).
    pub min_profit: i64,
    pub min_purchase_limit: u32,
    /// 0 disables the filter.
    pub max_unit_price: u64,
    /// Budget for the recommended quantity. 0 disables the filter.
    pub max_total_cost: u64,
    pub membership_filter: MembershipFilter,
    /// Minimum estimated trades per hour. 0 disables the filter.
    pub min_liquidity_per_hour: u64,
    pub missing_liquidity: MissingLiquidityPolicy,
    pub max_recommendations: usize,
    pub verify_timeout_secs: u64,
    pub tiers: Vec<Tier>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_profit: 100,
            min_purchase_limit: 100,
            max_unit_price: 0,
            max_total_cost: 0,
            membership_filter: MembershipFilter::Both,
            min_liquidity_per_hour: 0,
            missing_liquidity: MissingLiquidityPolicy::Pass,
            max_recommendations: 10,
            verify_timeout_secs: 10,
            tiers: Tier::default_sequence(),
        }
    }
}

impl SelectionConfig {
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MarketConfig {
    pub prices_base_url: String,
    pub item_db_url: String,
    pub user_agent: String,
    /// Item consumed once per action; its price is the secondary cost.
    pub secondary_cost_item_id: u32,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            prices_base_url: "https://prices.runescape.wiki/api/v1/osrs".to_string(),
            item_db_url:
                "https://raw.githubusercontent.com/0xNeffarion/osrsreboxed-db/master/docs/items-complete.json"
                    .to_string(),
            user_agent: "ALCHEMIST/0.1.0 (alch recommendation engine)".to_string(),
            secondary_cost_item_id: 561,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let sel = &self.selection;
        if !(1..=100).contains(&sel.max_recommendations) {
            bail!(
                "selection.max_recommendations must be within 1..=100, got {}",
                sel.max_recommendations
            );
        }
        if sel.tiers.is_empty() {
            bail!("selection.tiers must contain at least one tier");
        }
        if let Some(i) = sel.tiers.iter().position(|t| t.ceiling == 0) {
            bail!("selection.tiers[{i}].ceiling must be greater than zero");
        }
        if sel.verify_timeout_secs == 0 {
            bail!("selection.verify_timeout_secs must be greater than zero");
        }
        if self.agent.tick_interval_ms == 0 {
            bail!("agent.tick_interval_ms must be greater than zero");
        }
        Ok(())
    }
}
