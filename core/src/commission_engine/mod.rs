//! CommissionEngine: structure resolution, breakdown calculation, and the
//! payout lifecycle wrapper (§4.4).
//!
//! The accumulate-into-a-breakdown-struct shape is grounded on the
//! teacher's `CostAccumulator` in `orchestrator/engine.rs`; the payout
//! transition wrapper mirrors `settlement/rtgs.rs`'s pattern of a thin
//! service layer around a model's own typed transition methods.

use crate::config::Config;
use crate::error::{ErrorKind, HasErrorKind};
use crate::event_bus::EventBus;
use crate::ledger::{Ledger, LedgerError};
use crate::models::*;
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum CommissionEngineError {
    #[error("agent {0:?} does not exist")]
    AgentNotFound(AgentId),
    #[error("no commission structure resolves for agent {0:?} and no system default is configured")]
    NoStructureResolved(AgentId),
    #[error(transparent)]
    PayoutTransition(#[from] PayoutTransitionError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("payout batch mixes agents or currencies; all calculations in a batch must share (agentId, currency)")]
    MixedBatch,
}

impl HasErrorKind for CommissionEngineError {
    fn kind(&self) -> ErrorKind {
        match self {
            CommissionEngineError::AgentNotFound(_) => ErrorKind::NotFound,
            CommissionEngineError::NoStructureResolved(_) => ErrorKind::Precondition,
            CommissionEngineError::PayoutTransition(e) => e.kind(),
            CommissionEngineError::Ledger(e) => e.kind(),
            CommissionEngineError::MixedBatch => ErrorKind::Validation,
        }
    }
}

pub struct PerformanceMetric {
    pub name: String,
    pub value: f64,
}

pub struct CommissionEngine {
    store: Arc<dyn Store>,
    config: Arc<Config>,
    ledger: Arc<Ledger>,
    bus: Arc<EventBus>,
}

impl CommissionEngine {
    pub fn new(store: Arc<dyn Store>, config: Arc<Config>, ledger: Arc<Ledger>, bus: Arc<EventBus>) -> Self {
        Self { store, config, ledger, bus }
    }

    /// Agent's explicit structure, else the nearest ancestor's, else the
    /// system default. Walks up through at most `max_hierarchy_depth`
    /// ancestors, same bound `AgentGraph` enforces on the hierarchy itself.
    pub async fn resolve_structure(&self, agent_id: AgentId) -> Result<Option<CommissionStructureId>, CommissionEngineError> {
        let txn = self.store.begin().await;
        let mut current = Some(agent_id);
        let mut depth = 0u8;
        let resolved = loop {
            let Some(id) = current else { break None };
            let agent = match self.store.get_agent(txn, id).await {
                Some(a) => a,
                None => {
                    if id == agent_id {
                        self.store.rollback(txn).await;
                        return Err(CommissionEngineError::AgentNotFound(agent_id));
                    }
                    break None;
                }
            };
            if let Some(structure_id) = agent.commission_structure_id() {
                break Some(structure_id);
            }
            depth += 1;
            if depth > self.config.max_hierarchy_depth {
                break None;
            }
            current = agent.parent_id();
        };
        self.store.rollback(txn).await;
        Ok(resolved)
    }

    /// Produces the audit `CommissionBreakdown` for `(agentId, period,
    /// revenue)`. This is the sole calculation path; there is no separate
    /// estimate/preview path anywhere in the implementation.
    #[instrument(skip(self, metrics, overrides))]
    pub async fn calculate(
        &self,
        agent_id: AgentId,
        structure: &CommissionStructure,
        revenue: i64,
        metrics: &[PerformanceMetric],
        sport: Option<&str>,
        bet_type: Option<&str>,
        customer_id: Option<uuid::Uuid>,
    ) -> CommissionBreakdown {
        let mut base_rate = structure.base_rate;
        let volume_bonus = structure.volume_bonus_rate(revenue);
        let mut effective_rate = base_rate + volume_bonus;

        let mut performance_bonuses = Vec::new();
        let mut fixed_bonuses = 0i64;
        for rule in &structure.performance_bonus_rules {
            let Some(metric) = metrics.iter().find(|m| m.name == rule.metric) else { continue };
            if metric.value < rule.threshold {
                continue;
            }
            if let Some(amount) = rule.bonus_amount {
                fixed_bonuses += amount;
                performance_bonuses.push((rule.metric.clone(), 0.0));
            } else if let Some(rate) = rule.bonus_rate {
                effective_rate += rate;
                performance_bonuses.push((rule.metric.clone(), rate));
            }
        }

        let mut overrides_applied = Vec::new();
        for ov in &structure.overrides {
            let sport_matches = ov.sport.as_deref().map_or(true, |s| Some(s) == sport);
            let bet_type_matches = ov.bet_type.as_deref().map_or(true, |b| Some(b) == bet_type);
            let customer_matches = ov.customer_id.map_or(true, |c| Some(c) == customer_id);
            if sport_matches && bet_type_matches && customer_matches {
                base_rate = ov.rate;
                effective_rate = ov.rate;
                overrides_applied.push(format!("{:?}/{:?}/{:?}", ov.sport, ov.bet_type, ov.customer_id));
            }
        }

        let amount = (revenue as f64 * effective_rate).round() as i64 + fixed_bonuses;

        CommissionBreakdown {
            revenue,
            base_rate,
            volume_bonus,
            performance_bonuses,
            overrides_applied,
            effective_rate,
            fixed_bonuses,
            amount,
        }
    }

    /// Closes a period for `agent_id`: resolves the structure, computes the
    /// breakdown, persists a `CommissionCalculation`, and returns it. Does
    /// not enqueue a `Payout` — callers (the Scheduler's batcher) decide
    /// batching across calculations.
    #[instrument(skip(self, metrics))]
    pub async fn close_period(
        &self,
        agent_id: AgentId,
        structure: &CommissionStructure,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        revenue: i64,
        metrics: &[PerformanceMetric],
    ) -> CommissionCalculation {
        let breakdown = self.calculate(agent_id, structure, revenue, metrics, None, None, None).await;
        let calc = CommissionCalculation {
            id: CommissionCalculationId::new(),
            agent_id,
            structure_id: structure.id,
            period_start,
            period_end,
            breakdown,
            state: CalculationState::Pending,
        };
        let txn = self.store.begin().await;
        self.store.put_commission_calculation(txn, calc.clone()).await;
        self.store.commit(txn).await.ok();
        calc
    }

    /// Requires all calculations in `calc_ids` to share `(agentId,
    /// currency)`; their summed `breakdown.amount` becomes the payout.
    #[instrument(skip(self, calcs))]
    pub async fn enqueue_payout(&self, calcs: &[CommissionCalculation], currency: &str) -> Result<Payout, CommissionEngineError> {
        let Some(first) = calcs.first() else {
            return Err(CommissionEngineError::MixedBatch);
        };
        if !calcs.iter().all(|c| c.agent_id == first.agent_id) {
            return Err(CommissionEngineError::MixedBatch);
        }
        let total: i64 = calcs.iter().map(|c| c.breakdown.amount).sum();
        let payout = Payout::new(first.agent_id, total, currency);
        let txn = self.store.begin().await;
        self.store.put_payout(txn, payout.clone()).await;
        self.store.commit(txn).await.ok();

        self.bus.publish(
            EventType::PayoutPending,
            Scope { agent_id: Some(first.agent_id), customer_id: None, department: None },
            json!({"payoutId": payout.id(), "amount": payout.amount()}),
        );
        Ok(payout)
    }

    #[instrument(skip(self))]
    pub async fn process_payout(&self, id: PayoutId, processed_by: &str) -> Result<(), CommissionEngineError> {
        self.transition_payout(id, EventType::PayoutProcessing, |p| p.process(processed_by)).await
    }

    #[instrument(skip(self))]
    pub async fn complete_payout(&self, id: PayoutId, reference: &str) -> Result<(), CommissionEngineError> {
        let agent_id_and_amount = {
            let txn = self.store.begin().await;
            let payout = self.store.get_payout(txn, id).await;
            self.store.rollback(txn).await;
            payout.map(|p| (p.agent_id(), p.amount()))
        };
        self.transition_payout(id, EventType::PayoutCompleted, |p| p.complete(reference, Utc::now())).await?;
        if let Some((agent_id, amount)) = agent_id_and_amount {
            self.ledger
                .credit(
                    AccountKey::new(OwnerKind::Agent, agent_id.0, Bucket::Available),
                    amount,
                    "USD",
                    &format!("payout-complete-{id}"),
                    "commission payout",
                )
                .await?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn fail_payout(&self, id: PayoutId) -> Result<(), CommissionEngineError> {
        self.transition_payout(id, EventType::PayoutFailed, |p| p.fail()).await
    }

    #[instrument(skip(self))]
    pub async fn cancel_payout(&self, id: PayoutId) -> Result<(), CommissionEngineError> {
        self.transition_payout(id, EventType::PayoutCancelled, |p| p.cancel()).await
    }

    async fn transition_payout(
        &self,
        id: PayoutId,
        event_type: EventType,
        f: impl FnOnce(&mut Payout) -> Result<(), PayoutTransitionError>,
    ) -> Result<(), CommissionEngineError> {
        let txn = self.store.begin().await;
        let mut payout = match self.store.get_payout(txn, id).await {
            Some(p) => p,
            None => {
                self.store.rollback(txn).await;
                return Err(CommissionEngineError::PayoutTransition(PayoutTransitionError { id, from: PayoutState::Cancelled }));
            }
        };
        f(&mut payout)?;
        let agent_id = payout.agent_id();
        self.store.put_payout(txn, payout).await;
        self.store.commit(txn).await.ok();
        self.bus.publish(event_type, Scope { agent_id: Some(agent_id), customer_id: None, department: None }, json!({"payoutId": id}));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::PayoutSchedule;
    use crate::store::MemoryStore;

    fn harness() -> CommissionEngine {
        let store = Arc::new(MemoryStore::new());
        let config = Arc::new(Config::default());
        let ledger = Arc::new(Ledger::new(store.clone()));
        let bus = Arc::new(EventBus::new(config.bus.clone()));
        CommissionEngine::new(store, config, ledger, bus)
    }

    #[tokio::test]
    async fn seed_scenario_6_commission_period_close() {
        let engine = harness();
        let agent_id = AgentId::new();
        let structure = CommissionStructure::new(0.05, PayoutSchedule::Monthly).with_volume_tier(500_000, 0.01);
        let metrics = [];
        let calc = engine.close_period(agent_id, &structure, Utc::now(), Utc::now(), 1_000_000, &metrics).await;
        assert_eq!(calc.breakdown.effective_rate, 0.06);
        assert_eq!(calc.breakdown.amount, 60_000);
    }

    #[tokio::test]
    async fn seed_scenario_6_with_fixed_bonus() {
        let engine = harness();
        let agent_id = AgentId::new();
        let structure = CommissionStructure::new(0.05, PayoutSchedule::Monthly)
            .with_volume_tier(500_000, 0.01)
            .with_performance_bonus(crate::models::commission::PerformanceBonusRule {
                metric: "retention".to_string(),
                threshold: 0.9,
                bonus_amount: Some(25_000),
                bonus_rate: None,
            });
        let metrics = [PerformanceMetric { name: "retention".to_string(), value: 0.95 }];
        let calc = engine.close_period(agent_id, &structure, Utc::now(), Utc::now(), 1_000_000, &metrics).await;
        assert_eq!(calc.breakdown.amount, 1_000_000_i64 * 6 / 100 + 25_000);
        assert_eq!(calc.breakdown.amount, 85_000);
    }

    #[tokio::test]
    async fn complete_requires_prior_processing() {
        let engine = harness();
        let calc = engine
            .close_period(AgentId::new(), &CommissionStructure::new(0.05, PayoutSchedule::Weekly), Utc::now(), Utc::now(), 100_000, &[])
            .await;
        let payout = engine.enqueue_payout(&[calc], "USD").await.unwrap();
        let err = engine.complete_payout(payout.id(), "ref").await.unwrap_err();
        assert!(matches!(err, CommissionEngineError::PayoutTransition(_)));
    }
}
