//! WagerEngine: places, updates, cancels, and settles bets against the
//! ledger and event bus (§4.2).
//!
//! The ordered-validation-chain-then-mutate shape in `create_bet` follows
//! the teacher's `models/transaction.rs::settle`; `bulk_settle_bets`'s
//! per-item independent transaction follows the teacher's batch-settlement
//! loop in `orchestrator/engine.rs`.

use crate::config::Config;
use crate::error::{CoreResult, ErrorKind, HasErrorKind};
use crate::ledger::{Ledger, LedgerError};
use crate::event_bus::EventBus;
use crate::models::*;
use crate::store::Store;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{instrument, warn};

#[derive(Debug, Error)]
pub enum WagerEngineError {
    #[error("customer {0:?} does not exist or is not active")]
    CustomerNotActive(CustomerId),
    #[error("event {0:?} does not exist")]
    EventNotFound(SportsEventId),
    #[error("event {0:?} is not open for wagering")]
    EventNotOpen(SportsEventId),
    #[error("customer's vip tier {0:?} is not permitted on this event")]
    VipTierNotAllowed(String),
    #[error("stake {stake} is below the sport minimum {minimum}")]
    StakeBelowMinimum { stake: i64, minimum: i64 },
    #[error("wager {0:?} does not exist")]
    WagerNotFound(WagerId),
    #[error(transparent)]
    Wager(#[from] WagerError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("field {0:?} cannot be updated on a wager")]
    FieldNotUpdatable(String),
}

impl HasErrorKind for WagerEngineError {
    fn kind(&self) -> ErrorKind {
        match self {
            WagerEngineError::CustomerNotActive(_) => ErrorKind::Precondition,
            WagerEngineError::EventNotFound(_) | WagerEngineError::WagerNotFound(_) => ErrorKind::NotFound,
            WagerEngineError::EventNotOpen(_) => ErrorKind::Precondition,
            WagerEngineError::VipTierNotAllowed(_) => ErrorKind::Validation,
            WagerEngineError::StakeBelowMinimum { .. } => ErrorKind::Validation,
            WagerEngineError::Wager(e) => e.kind(),
            WagerEngineError::Ledger(e) => e.kind(),
            WagerEngineError::FieldNotUpdatable(_) => ErrorKind::Validation,
        }
    }
}

pub struct CreateBetInput {
    pub customer_id: CustomerId,
    pub agent_id: AgentId,
    pub event_id: SportsEventId,
    pub bet_type: String,
    pub selection: String,
    pub stake: i64,
    pub odds: OddsMillis,
    pub sport: String,
}

pub struct WagerEngine {
    store: Arc<dyn Store>,
    config: Arc<Config>,
    ledger: Arc<Ledger>,
    bus: Arc<EventBus>,
}

impl WagerEngine {
    pub fn new(store: Arc<dyn Store>, config: Arc<Config>, ledger: Arc<Ledger>, bus: Arc<EventBus>) -> Self {
        Self { store, config, ledger, bus }
    }

    fn customer_available_key(customer_id: CustomerId) -> AccountKey {
        AccountKey::new(OwnerKind::Customer, customer_id.0, Bucket::Available)
    }

    fn customer_reserved_key(customer_id: CustomerId) -> AccountKey {
        AccountKey::new(OwnerKind::Customer, customer_id.0, Bucket::Reserved)
    }

    #[instrument(skip(self, input))]
    pub async fn create_bet(&self, input: CreateBetInput) -> Result<Wager, WagerEngineError> {
        let txn = self.store.begin().await;
        let customer = match self.store.get_customer(txn, input.customer_id).await {
            Some(c) if c.is_active() => c,
            _ => {
                self.store.rollback(txn).await;
                return Err(WagerEngineError::CustomerNotActive(input.customer_id));
            }
        };
        let event = match self.store.get_sports_event(txn, input.event_id).await {
            Some(e) => e,
            None => {
                self.store.rollback(txn).await;
                return Err(WagerEngineError::EventNotFound(input.event_id));
            }
        };
        if !matches!(event.status(), EventStatus::Scheduled | EventStatus::Live) {
            self.store.rollback(txn).await;
            return Err(WagerEngineError::EventNotOpen(input.event_id));
        }
        let vip_tier = format!("{:?}", customer.tier()).to_lowercase();
        if !event.vip_access().is_empty() && !event.vip_access().contains(&vip_tier) {
            self.store.rollback(txn).await;
            return Err(WagerEngineError::VipTierNotAllowed(vip_tier));
        }
        let minimum = self.config.sport_min_stake(&input.sport);
        if input.stake < minimum {
            self.store.rollback(txn).await;
            return Err(WagerEngineError::StakeBelowMinimum { stake: input.stake, minimum });
        }
        if let Some(&ceiling) = self.config.wager.bet_type_max_odds.get(&input.bet_type) {
            if input.odds.as_decimal() > ceiling {
                warn!(bet_type = %input.bet_type, odds = input.odds.as_decimal(), ceiling, "odds exceed configured ceiling");
            }
        }

        let wager = match Wager::new(
            input.customer_id,
            input.agent_id,
            input.event_id,
            input.bet_type,
            input.selection,
            input.stake,
            input.odds,
            vip_tier,
        ) {
            Ok(w) => w,
            Err(e) => {
                self.store.rollback(txn).await;
                return Err(e.into());
            }
        };

        // Reserve and persist in the same transaction: a failure after the
        // reservation can't leave a reserved stake with no wager record.
        if let Err(e) = self
            .ledger
            .reserve_in(
                txn,
                Self::customer_available_key(input.customer_id),
                input.stake,
                "USD",
                &format!("wager-place-{}", wager.id()),
                "wager stake reservation",
            )
            .await
        {
            self.store.rollback(txn).await;
            return Err(e.into());
        }
        self.store.put_wager(txn, wager.clone()).await;
        self.store.commit(txn).await.map_err(|_| WagerEngineError::WagerNotFound(wager.id()))?;

        self.bus.publish(
            EventType::WagerPlaced,
            Scope { agent_id: Some(wager.agent_id()), customer_id: Some(wager.customer_id()), department: None },
            json!({"wagerId": wager.id(), "stake": wager.stake(), "odds": wager.odds().as_decimal()}),
        );
        Ok(wager)
    }

    /// Only `notes`/`riskLevel`/`vipTier` while pending; everything else is
    /// rejected outright.
    #[instrument(skip(self))]
    pub async fn update_bet(&self, id: WagerId, field: &str, risk_level: Option<u8>, vip_tier: Option<String>) -> Result<Wager, WagerEngineError> {
        if !matches!(field, "notes" | "riskLevel" | "vipTier") {
            return Err(WagerEngineError::FieldNotUpdatable(field.to_string()));
        }
        let txn = self.store.begin().await;
        let mut wager = match self.store.get_wager(txn, id).await {
            Some(w) => w,
            None => {
                self.store.rollback(txn).await;
                return Err(WagerEngineError::WagerNotFound(id));
            }
        };
        if wager.status() != WagerStatus::Pending {
            self.store.rollback(txn).await;
            return Err(WagerEngineError::Wager(WagerError::InvalidState(id, wager.status())));
        }
        if let Some(level) = risk_level {
            wager.set_risk_level(level);
        }
        if let Some(tier) = vip_tier {
            wager.set_vip_tier(tier);
        }
        self.store.put_wager(txn, wager.clone()).await;
        self.store.commit(txn).await.map_err(|_| WagerEngineError::WagerNotFound(id))?;
        Ok(wager)
    }

    #[instrument(skip(self))]
    pub async fn cancel_bet(&self, id: WagerId, reason: &str) -> Result<(), WagerEngineError> {
        let txn = self.store.begin().await;
        let mut wager = match self.store.get_wager(txn, id).await {
            Some(w) => w,
            None => {
                self.store.rollback(txn).await;
                return Err(WagerEngineError::WagerNotFound(id));
            }
        };
        wager.cancel(Utc::now())?;
        self.store.put_wager(txn, wager.clone()).await;
        self.store.commit(txn).await.map_err(|_| WagerEngineError::WagerNotFound(id))?;

        self.ledger
            .release(
                Self::customer_reserved_key(wager.customer_id()),
                wager.stake(),
                "USD",
                &format!("wager-cancel-{}", id),
                reason,
            )
            .await?;

        self.bus.publish(
            EventType::WagerCancelled,
            Scope { agent_id: Some(wager.agent_id()), customer_id: Some(wager.customer_id()), department: None },
            json!({"wagerId": id, "reason": reason}),
        );
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn settle_bet(&self, id: WagerId, outcome: SettlementOutcome, settled_by: &str) -> Result<i64, WagerEngineError> {
        let txn = self.store.begin().await;
        let mut wager = match self.store.get_wager(txn, id).await {
            Some(w) => w,
            None => {
                self.store.rollback(txn).await;
                return Err(WagerEngineError::WagerNotFound(id));
            }
        };
        let customer_id = wager.customer_id();
        let stake = wager.stake();
        let actual_win = wager.settle(outcome, Utc::now(), settled_by)?;

        let mut customer = self.store.get_customer(txn, customer_id).await;
        if let Some(c) = customer.as_mut() {
            c.record_volume(stake);
            self.store.put_customer(txn, c.clone()).await;
        }
        self.store.put_wager(txn, wager.clone()).await;
        self.store.commit(txn).await.map_err(|_| WagerEngineError::WagerNotFound(id))?;

        let correlation = format!("wager-settle-{}", id);
        match outcome {
            SettlementOutcome::Won => {
                self.ledger.release(Self::customer_reserved_key(customer_id), stake, "USD", &correlation, "settle won: release stake").await?;
                if actual_win > 0 {
                    self.ledger.credit(Self::customer_available_key(customer_id), actual_win, "USD", &format!("{correlation}-payout"), "settle won: payout").await?;
                }
            }
            SettlementOutcome::Lost => {
                self.ledger
                    .transfer(Self::customer_reserved_key(customer_id), AccountKey::house(), stake, "USD", &correlation, "settle lost: reserved to house")
                    .await?;
            }
            SettlementOutcome::Void | SettlementOutcome::Pushed => {
                self.ledger.release(Self::customer_reserved_key(customer_id), stake, "USD", &correlation, "settle void/push: release stake").await?;
            }
        }

        self.bus.publish(
            EventType::WagerSettled,
            Scope { agent_id: Some(wager.agent_id()), customer_id: Some(customer_id), department: None },
            json!({"wagerId": id, "outcome": format!("{:?}", outcome), "actualWin": actual_win}),
        );
        Ok(actual_win)
    }

    /// Applies settlements transactionally per bet; one bet's failure does
    /// not affect the others.
    #[instrument(skip(self, settlements))]
    pub async fn bulk_settle_bets(&self, settlements: Vec<(WagerId, SettlementOutcome)>, settled_by: &str) -> Vec<(WagerId, Result<i64, WagerEngineError>)> {
        let mut results = Vec::with_capacity(settlements.len());
        for (id, outcome) in settlements {
            let result = self.settle_bet(id, outcome, settled_by).await;
            results.push((id, result));
        }
        results
    }

    /// Idempotent by `(eventId, reason, timestamp)` when `reason` carries a
    /// client correlation token — the caller is expected to pass a reason
    /// string that embeds that token.
    #[instrument(skip(self, snapshot))]
    pub async fn update_odds(&self, event_id: SportsEventId, snapshot: OddsSnapshot, volume: i64, reason: &str) -> CoreResult<()> {
        let txn = self.store.begin().await;
        let mut event = match self.store.get_sports_event(txn, event_id).await {
            Some(e) => e,
            None => {
                self.store.rollback(txn).await;
                return Err(crate::error::CoreError::new(ErrorKind::NotFound, format!("event {event_id:?} not found")));
            }
        };
        event.update_odds(snapshot, volume, reason).map_err(|e| crate::error::lift(e))?;
        self.store.put_sports_event(txn, event).await;
        self.store.commit(txn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusConfig;
    use crate::store::MemoryStore;

    fn harness() -> (WagerEngine, Arc<Ledger>, Arc<dyn Store>) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let config = Arc::new(Config::default());
        let ledger = Arc::new(Ledger::new(store.clone()));
        let bus = Arc::new(EventBus::new(BusConfig::default()));
        (WagerEngine::new(store.clone(), config, ledger.clone(), bus), ledger, store)
    }

    async fn seed_event(store: &Arc<dyn Store>) -> SportsEventId {
        let snapshot = OddsSnapshot { moneyline_home: OddsMillis(1910), moneyline_away: OddsMillis(2050), last_updated: Utc::now() };
        let event = SportsEvent::new("football", "nfl", Utc::now(), snapshot);
        let id = event.id();
        let txn = store.begin().await;
        store.put_sports_event(txn, event).await;
        store.commit(txn).await.unwrap();
        id
    }

    async fn seed_customer(store: &Arc<dyn Store>, agent_id: AgentId) -> CustomerId {
        let customer = Customer::new(agent_id);
        let id = customer.id();
        let txn = store.begin().await;
        store.put_customer(txn, customer).await;
        store.commit(txn).await.unwrap();
        id
    }

    fn bet(customer_id: CustomerId, agent_id: AgentId, event_id: SportsEventId, stake: i64) -> CreateBetInput {
        CreateBetInput {
            customer_id,
            agent_id,
            event_id,
            bet_type: "moneyline".to_string(),
            selection: "home".to_string(),
            stake,
            odds: OddsMillis::from_decimal(1.910),
            sport: "football".to_string(),
        }
    }

    #[tokio::test]
    async fn seed_scenario_1_bet_happy_path() {
        let (engine, ledger, store) = harness();
        let agent_id = AgentId::new();
        let event_id = seed_event(&store).await;
        let customer_id = seed_customer(&store, agent_id).await;
        ledger.credit(WagerEngine::customer_available_key(customer_id), 10_000, "USD", "seed", "test seed").await.unwrap();

        let wager = engine.create_bet(bet(customer_id, agent_id, event_id, 2_500)).await.unwrap();
        assert_eq!(wager.potential_payout(), 2_275);

        let txn = store.begin().await;
        let reserved_acc = store.get_ledger_account(txn, WagerEngine::customer_reserved_key(customer_id)).await.unwrap();
        let available_acc = store.get_ledger_account(txn, WagerEngine::customer_available_key(customer_id)).await.unwrap();
        store.rollback(txn).await;
        assert_eq!(reserved_acc.reserved(), 2_500);
        assert_eq!(available_acc.available(), 7_500);

        let actual_win = engine.settle_bet(wager.id(), SettlementOutcome::Won, "grader").await.unwrap();
        assert_eq!(actual_win, 2_275);

        let txn = store.begin().await;
        let available_acc = store.get_ledger_account(txn, WagerEngine::customer_available_key(customer_id)).await.unwrap();
        let reserved_acc = store.get_ledger_account(txn, WagerEngine::customer_reserved_key(customer_id)).await.unwrap();
        store.rollback(txn).await;
        assert_eq!(reserved_acc.reserved(), 0);
        assert_eq!(available_acc.available(), 7_500 + 2_500 + 2_275);
    }

    #[tokio::test]
    async fn seed_scenario_2_insufficient_funds_rejects_bet() {
        let (engine, ledger, store) = harness();
        let agent_id = AgentId::new();
        let event_id = seed_event(&store).await;
        let customer_id = seed_customer(&store, agent_id).await;
        ledger.credit(WagerEngine::customer_available_key(customer_id), 1_000, "USD", "seed", "test seed").await.unwrap();

        let err = engine.create_bet(bet(customer_id, agent_id, event_id, 2_500)).await.unwrap_err();
        assert!(matches!(err, WagerEngineError::Ledger(LedgerError::Insufficient { .. })));
        assert_eq!(err.kind(), ErrorKind::Insufficient);

        let txn = store.begin().await;
        let available_acc = store.get_ledger_account(txn, WagerEngine::customer_available_key(customer_id)).await.unwrap();
        store.rollback(txn).await;
        assert_eq!(available_acc.available(), 1_000);
    }

    #[tokio::test]
    async fn cancel_bet_releases_reserved_stake() {
        let (engine, ledger, store) = harness();
        let agent_id = AgentId::new();
        let event_id = seed_event(&store).await;
        let customer_id = seed_customer(&store, agent_id).await;
        ledger.credit(WagerEngine::customer_available_key(customer_id), 5_000, "USD", "seed", "test seed").await.unwrap();

        let wager = engine.create_bet(bet(customer_id, agent_id, event_id, 1_000)).await.unwrap();
        engine.cancel_bet(wager.id(), "customer request").await.unwrap();

        let txn = store.begin().await;
        let available_acc = store.get_ledger_account(txn, WagerEngine::customer_available_key(customer_id)).await.unwrap();
        let reserved_acc = store.get_ledger_account(txn, WagerEngine::customer_reserved_key(customer_id)).await.unwrap();
        store.rollback(txn).await;
        assert_eq!(available_acc.available(), 5_000);
        assert_eq!(reserved_acc.reserved(), 0);
    }
}
