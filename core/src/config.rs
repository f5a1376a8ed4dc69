//! Process-wide configuration, explicit and passed by reference.
//!
//! One struct, one `Default`, loaded once at process start and handed to
//! every component constructor as `&Config` or `Arc<Config>`. Nothing here
//! is read from a global or lazily initialized.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub reservation_ttl_ms: u64,
    pub max_attempts: u32,
    pub max_risk_delta: u8,
    pub allow_cross_tier: bool,
    pub starvation_threshold: u32,
    pub priority_weights: PriorityWeights,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            reservation_ttl_ms: 30_000,
            max_attempts: 5,
            max_risk_delta: 25,
            allow_cross_tier: true,
            starvation_threshold: 10,
            priority_weights: PriorityWeights::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityWeights {
    pub tier: f64,
    pub age: f64,
    pub risk: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self { tier: 0.4, age: 0.4, risk: 0.2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub buffer_size: usize,
    pub ring_buffer_size: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { buffer_size: 256, ring_buffer_size: 1024 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SseConfig {
    pub heartbeat_ms: u64,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self { heartbeat_ms: 30_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub queue_sweep_ms: u64,
    pub settle_sweep_ms: u64,
    pub metrics_rollup_ms: u64,
    /// Seed for the per-reconciler startup jitter (`RngManager`), so
    /// independently-cadenced reconcilers don't all tick in lockstep.
    pub jitter_seed: u64,
    pub max_jitter_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { queue_sweep_ms: 1_000, settle_sweep_ms: 5_000, metrics_rollup_ms: 10_000, jitter_seed: 0x5EED, max_jitter_ms: 250 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WagerConfig {
    pub sport_min_stake: BTreeMap<String, i64>,
    pub bet_type_max_odds: BTreeMap<String, f64>,
}

impl Default for WagerConfig {
    fn default() -> Self {
        let mut sport_min_stake = BTreeMap::new();
        sport_min_stake.insert("football".to_string(), 1_000);
        sport_min_stake.insert("basketball".to_string(), 1_000);
        sport_min_stake.insert("default".to_string(), 500);
        Self { sport_min_stake, bet_type_max_odds: BTreeMap::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub max_hierarchy_depth: u8,
    pub ledger_checkpoint_interval: u64,
    pub queue: QueueConfig,
    pub bus: BusConfig,
    pub sse: SseConfig,
    pub scheduler: SchedulerConfig,
    pub wager: WagerConfig,
    pub commission_default_structure: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_hierarchy_depth: 8,
            ledger_checkpoint_interval: 1_024,
            queue: QueueConfig::default(),
            bus: BusConfig::default(),
            sse: SseConfig::default(),
            scheduler: SchedulerConfig::default(),
            wager: WagerConfig::default(),
            commission_default_structure: None,
        }
    }
}

impl Config {
    pub fn sport_min_stake(&self, sport: &str) -> i64 {
        self.wager
            .sport_min_stake
            .get(sport)
            .copied()
            .unwrap_or_else(|| *self.wager.sport_min_stake.get("default").unwrap_or(&500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_configuration_table() {
        let cfg = Config::default();
        assert_eq!(cfg.max_hierarchy_depth, 8);
        assert_eq!(cfg.ledger_checkpoint_interval, 1_024);
        assert_eq!(cfg.queue.reservation_ttl_ms, 30_000);
        assert_eq!(cfg.queue.max_attempts, 5);
        assert_eq!(cfg.queue.max_risk_delta, 25);
        assert!(cfg.queue.allow_cross_tier);
        assert_eq!(cfg.queue.starvation_threshold, 10);
        assert_eq!(cfg.bus.buffer_size, 256);
        assert_eq!(cfg.bus.ring_buffer_size, 1_024);
        assert_eq!(cfg.sse.heartbeat_ms, 30_000);
        assert_eq!(cfg.scheduler.queue_sweep_ms, 1_000);
        assert_eq!(cfg.scheduler.settle_sweep_ms, 5_000);
    }
}
