//! Commission structures, calculations, and the breakdown they produce.
//!
//! The accumulate-then-produce-a-breakdown-struct shape follows the
//! teacher's `CostAccumulator`/`CostBreakdown` pair in
//! `orchestrator/engine.rs`.

use super::ids::{AgentId, CommissionCalculationId, CommissionStructureId};
use crate::clock::PayoutSchedule;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VolumeBonusTier {
    pub min_volume: i64,
    pub bonus_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceBonusRule {
    pub metric: String,
    pub threshold: f64,
    /// Exactly one of these is set: a fixed minor-units bonus, or a rate
    /// applied against revenue.
    pub bonus_amount: Option<i64>,
    pub bonus_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Override {
    pub sport: Option<String>,
    pub bet_type: Option<String>,
    pub customer_id: Option<uuid::Uuid>,
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionStructure {
    pub id: CommissionStructureId,
    pub base_rate: f64,
    /// Sorted ascending by `min_volume`; together with an implicit `0`
    /// floor this partitions `[0, ∞)`.
    pub volume_bonus_tiers: Vec<VolumeBonusTier>,
    pub performance_bonus_rules: Vec<PerformanceBonusRule>,
    pub overrides: Vec<Override>,
    pub payout_schedule: PayoutSchedule,
}

impl CommissionStructure {
    pub fn new(base_rate: f64, payout_schedule: PayoutSchedule) -> Self {
        Self {
            id: CommissionStructureId::new(),
            base_rate,
            volume_bonus_tiers: Vec::new(),
            performance_bonus_rules: Vec::new(),
            overrides: Vec::new(),
            payout_schedule,
        }
    }

    pub fn with_volume_tier(mut self, min_volume: i64, bonus_rate: f64) -> Self {
        self.volume_bonus_tiers.push(VolumeBonusTier { min_volume, bonus_rate });
        self.volume_bonus_tiers.sort_by_key(|t| t.min_volume);
        self
    }

    pub fn with_performance_bonus(mut self, rule: PerformanceBonusRule) -> Self {
        self.performance_bonus_rules.push(rule);
        self
    }

    /// Greatest tier whose `min_volume <= revenue`, or `None` if revenue is
    /// below every tier's floor.
    pub fn volume_bonus_rate(&self, revenue: i64) -> f64 {
        self.volume_bonus_tiers
            .iter()
            .filter(|t| t.min_volume <= revenue)
            .map(|t| t.bonus_rate)
            .last()
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationState {
    Pending,
    Approved,
    Paid,
    Void,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionBreakdown {
    pub revenue: i64,
    pub base_rate: f64,
    pub volume_bonus: f64,
    pub performance_bonuses: Vec<(String, f64)>,
    pub overrides_applied: Vec<String>,
    pub effective_rate: f64,
    pub fixed_bonuses: i64,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionCalculation {
    pub id: CommissionCalculationId,
    pub agent_id: AgentId,
    pub structure_id: CommissionStructureId,
    pub period_start: chrono::DateTime<chrono::Utc>,
    pub period_end: chrono::DateTime<chrono::Utc>,
    pub breakdown: CommissionBreakdown,
    pub state: CalculationState,
}
