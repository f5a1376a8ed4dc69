//! MatchingQueue: pairs withdrawals with deposits under the §4.5 rules.
//!
//! Operated as a single logical worker per the concurrency model: every
//! method here re-derives its view from `Store` rather than owning a
//! parallel index, matching the "reads are lock-free snapshots" contract
//! without a second source of truth to keep in sync. The priority-then-
//! greedy-fill loop in `run_matching_cycle` follows the teacher's
//! `policy` module's greedy-allocation shape (allocate largest-priority
//! item first, walk candidates until exhausted or satisfied).

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
pub enum MatchingQueueError {
    #[error("queue item {0:?} does not exist")]
    ItemNotFound(QueueItemId),
    #[error("match attempt {0:?} does not exist")]
    AttemptNotFound(MatchAttemptId),
    #[error(transparent)]
    QueueItem(#[from] QueueItemError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl HasErrorKind for MatchingQueueError {
    fn kind(&self) -> ErrorKind {
        match self {
            MatchingQueueError::ItemNotFound(_) | MatchingQueueError::AttemptNotFound(_) => ErrorKind::NotFound,
            MatchingQueueError::QueueItem(e) => e.kind(),
            MatchingQueueError::Ledger(e) => e.kind(),
        }
    }
}

pub struct MatchingQueue {
    store: Arc<dyn Store>,
    config: Arc<Config>,
    ledger: Arc<Ledger>,
    bus: Arc<EventBus>,
}

fn tier_ordinal(tier: Tier) -> i8 {
    match tier {
        Tier::Bronze => 0,
        Tier::Silver => 1,
        Tier::Gold => 2,
        Tier::Platinum => 3,
        Tier::Diamond => 4,
        Tier::Vip => 5,
    }
}

impl MatchingQueue {
    pub fn new(store: Arc<dyn Store>, config: Arc<Config>, ledger: Arc<Ledger>, bus: Arc<EventBus>) -> Self {
        Self { store, config, ledger, bus }
    }

    /// `(-priorityScore, enqueuedAt)`: higher score sorts first, ties break
    /// by enqueuedAt ascending. A flat bump applies once `attempts` crosses
    /// `starvationThreshold`, so a starved item eventually outranks fresher
    /// higher-tier arrivals.
    pub fn priority_score(&self, item: &QueueItem, now: DateTime<Utc>) -> f64 {
        let weights = &self.config.queue.priority_weights;
        let tier_component = tier_ordinal(item.tier()) as f64 / 5.0;
        let age_seconds = (now - item.enqueued_at()).num_seconds().max(0) as f64;
        let age_component = (age_seconds / 3600.0).min(1.0);
        let risk_component = 1.0 - (item.risk_score() as f64 / 100.0);
        let mut score = weights.tier * tier_component + weights.age * age_component + weights.risk * risk_component;
        if item.attempts() >= self.config.queue.starvation_threshold {
            score += 0.5;
        }
        score
    }

    fn sort_by_priority(&self, mut items: Vec<QueueItem>, now: DateTime<Utc>) -> Vec<QueueItem> {
        items.sort_by(|a, b| {
            let sa = self.priority_score(a, now);
            let sb = self.priority_score(b, now);
            sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal).then(a.enqueued_at().cmp(&b.enqueued_at()))
        });
        items
    }

    fn compatible(&self, a: &QueueItem, b: &QueueItem) -> bool {
        if a.currency() != b.currency() {
            return false;
        }
        if a.allowed_methods().is_disjoint(b.allowed_methods()) {
            return false;
        }
        let risk_delta = (a.risk_score() as i16 - b.risk_score() as i16).unsigned_abs();
        if risk_delta > self.config.queue.max_risk_delta as u16 {
            return false;
        }
        if !self.config.queue.allow_cross_tier {
            let (withdrawal, deposit) = if a.direction() == Direction::Withdrawal { (a, b) } else { (b, a) };
            if tier_ordinal(deposit.tier()) < tier_ordinal(withdrawal.tier()) - 1 {
                return false;
            }
        }
        true
    }

    #[instrument(skip(self, item))]
    pub async fn enqueue(&self, item: QueueItem) -> QueueItem {
        let txn = self.store.begin().await;
        self.store.put_queue_item(txn, item.clone()).await;
        self.store.commit(txn).await.ok();
        item
    }

    /// Reserves `withdrawal_id` against `deposit_id` for `amount`, creating
    /// the holding `MatchAttempt`.
    #[instrument(skip(self))]
    pub async fn reserve_pair(&self, withdrawal_id: QueueItemId, deposit_id: QueueItemId, amount: i64) -> Result<MatchAttempt, MatchingQueueError> {
        let txn = self.store.begin().await;
        let mut withdrawal = self.store.get_queue_item(txn, withdrawal_id).await.ok_or(MatchingQueueError::ItemNotFound(withdrawal_id))?;
        let mut deposit = self.store.get_queue_item(txn, deposit_id).await.ok_or(MatchingQueueError::ItemNotFound(deposit_id))?;
        let expires_at = Utc::now() + chrono::Duration::milliseconds(self.config.queue.reservation_ttl_ms as i64);
        let attempt = MatchAttempt::new(withdrawal_id, deposit_id, amount, expires_at);
        withdrawal.reserve(attempt.id())?;
        deposit.reserve(attempt.id())?;
        self.store.put_queue_item(txn, withdrawal).await;
        self.store.put_queue_item(txn, deposit).await;
        self.store.put_match_attempt(txn, attempt.clone()).await;
        self.store.commit(txn).await.map_err(|_| MatchingQueueError::AttemptNotFound(attempt.id()))?;
        Ok(attempt)
    }

    /// Confirms a pending attempt: moves both items toward filled/queued
    /// (partial) and performs the `Ledger` transfer deposit-customer to
    /// withdrawal-customer for `amount`.
    #[instrument(skip(self))]
    pub async fn confirm_match(&self, attempt_id: MatchAttemptId) -> Result<(), MatchingQueueError> {
        let txn = self.store.begin().await;
        let mut attempt = self.store.get_match_attempt(txn, attempt_id).await.ok_or(MatchingQueueError::AttemptNotFound(attempt_id))?;
        let mut withdrawal = self.store.get_queue_item(txn, attempt.withdrawal_id()).await.ok_or(MatchingQueueError::ItemNotFound(attempt.withdrawal_id()))?;
        let mut deposit = self.store.get_queue_item(txn, attempt.deposit_id()).await.ok_or(MatchingQueueError::ItemNotFound(attempt.deposit_id()))?;

        withdrawal.confirm_fill(attempt.amount())?;
        deposit.confirm_fill(attempt.amount())?;
        attempt.confirm();

        self.store.put_queue_item(txn, withdrawal.clone()).await;
        self.store.put_queue_item(txn, deposit.clone()).await;
        self.store.put_match_attempt(txn, attempt.clone()).await;
        self.store.commit(txn).await.map_err(|_| MatchingQueueError::AttemptNotFound(attempt_id))?;

        self.ledger
            .transfer(
                AccountKey::new(OwnerKind::Customer, deposit.customer_id().0, Bucket::Available),
                AccountKey::new(OwnerKind::Customer, withdrawal.customer_id().0, Bucket::Available),
                attempt.amount(),
                withdrawal.currency(),
                &format!("match-{attempt_id}"),
                "matched withdrawal/deposit",
            )
            .await?;

        self.bus.publish(
            EventType::QueueItemMatched,
            Scope { customer_id: Some(withdrawal.customer_id()), agent_id: None, department: None },
            json!({"withdrawalId": withdrawal.id(), "depositId": deposit.id(), "amount": attempt.amount()}),
        );
        Ok(())
    }

    /// Greedily fills queued withdrawals against queued deposits in
    /// priority order for one `currency`, reserving and immediately
    /// confirming each compatible pair found. Returns the attempts
    /// confirmed this cycle.
    #[instrument(skip(self))]
    pub async fn run_matching_cycle(&self, currency: &str) -> Result<Vec<MatchAttempt>, MatchingQueueError> {
        let now = Utc::now();
        let txn = self.store.begin().await;
        let withdrawals = self.store.queue_items_by_state_currency(txn, QueueItemState::Queued, currency).await;
        self.store.rollback(txn).await;

        let mut withdrawals: Vec<QueueItem> = withdrawals.into_iter().filter(|i| i.direction() == Direction::Withdrawal).collect();
        withdrawals = self.sort_by_priority(withdrawals, now);

        let mut confirmed = Vec::new();
        for withdrawal_snapshot in withdrawals {
            let mut remaining = {
                let txn = self.store.begin().await;
                let current = self.store.get_queue_item(txn, withdrawal_snapshot.id()).await;
                self.store.rollback(txn).await;
                match current {
                    Some(w) if w.state() == QueueItemState::Queued => w.residual(),
                    _ => continue,
                }
            };
            if remaining <= 0 {
                continue;
            }

            let txn = self.store.begin().await;
            let deposits = self.store.queue_items_by_state_currency(txn, QueueItemState::Queued, currency).await;
            self.store.rollback(txn).await;
            let mut deposits: Vec<QueueItem> = deposits.into_iter().filter(|i| i.direction() == Direction::Deposit).collect();
            deposits = self.sort_by_priority(deposits, now);

            for deposit in deposits {
                if remaining <= 0 {
                    break;
                }
                if !self.compatible(&withdrawal_snapshot, &deposit) {
                    continue;
                }
                if !withdrawal_snapshot.allow_partial() && deposit.residual() < remaining {
                    continue;
                }
                if !deposit.allow_partial() && deposit.residual() > remaining {
                    continue;
                }
                let amount = remaining.min(deposit.residual());
                if amount <= 0 {
                    continue;
                }
                let attempt = self.reserve_pair(withdrawal_snapshot.id(), deposit.id(), amount).await?;
                self.confirm_match(attempt.id()).await?;
                confirmed.push(attempt);
                remaining -= amount;
            }
        }
        Ok(confirmed)
    }

    /// Returns reserved items whose holding attempt expired without
    /// confirmation to `queued` (incrementing `attempts`) or `expired` once
    /// `maxAttempts` is reached.
    #[instrument(skip(self))]
    pub async fn expire_stale_reservations(&self, now: DateTime<Utc>) -> Result<u32, MatchingQueueError> {
        let txn = self.store.begin().await;
        let attempts = self.store.pending_match_attempts(txn).await;
        self.store.rollback(txn).await;

        let mut count = 0u32;
        for mut attempt in attempts {
            if !attempt.has_expired(now) {
                continue;
            }
            let txn = self.store.begin().await;
            for item_id in [attempt.withdrawal_id(), attempt.deposit_id()] {
                if let Some(mut item) = self.store.get_queue_item(txn, item_id).await {
                    if item.state() == QueueItemState::Reserved {
                        item.expire_reservation(self.config.queue.max_attempts)?;
                        if item.state() == QueueItemState::Expired {
                            self.bus.publish(
                                EventType::QueueItemExpired,
                                Scope { customer_id: Some(item.customer_id()), agent_id: None, department: None },
                                json!({"itemId": item_id}),
                            );
                        }
                        self.store.put_queue_item(txn, item).await;
                    }
                }
            }
            attempt.abort();
            self.store.put_match_attempt(txn, attempt).await;
            self.store.commit(txn).await.ok();
            count += 1;
        }
        Ok(count)
    }

    /// Permitted in `queued` (including the partially-filled representation
    /// of `queued` with `residual < amount`); reserved items must wait out
    /// the reservation TTL.
    #[instrument(skip(self))]
    pub async fn cancel_item(&self, id: QueueItemId) -> Result<(), MatchingQueueError> {
        let txn = self.store.begin().await;
        let mut item = self.store.get_queue_item(txn, id).await.ok_or(MatchingQueueError::ItemNotFound(id))?;
        item.cancel()?;
        self.store.put_queue_item(txn, item).await;
        self.store.commit(txn).await.map_err(|_| MatchingQueueError::ItemNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::collections::BTreeSet;

    fn harness() -> MatchingQueue {
        let store = Arc::new(MemoryStore::new());
        let config = Arc::new(Config::default());
        let ledger = Arc::new(Ledger::new(store.clone()));
        let bus = Arc::new(EventBus::new(config.bus.clone()));
        MatchingQueue::new(store, config, ledger, bus)
    }

    fn item(direction: Direction, amount: i64) -> QueueItem {
        QueueItem::new(
            direction,
            CustomerId::new(),
            amount,
            "USD",
            BTreeSet::from(["ach".to_string()]),
            Utc::now() + chrono::Duration::minutes(30),
            10,
            Tier::Gold,
            true,
        )
    }

    #[tokio::test]
    async fn seed_scenario_4_partial_fill_splits_across_deposits() {
        let queue = harness();
        let w1 = item(Direction::Withdrawal, 10_000);
        let d1 = item(Direction::Deposit, 4_000);
        let d2 = item(Direction::Deposit, 7_000);
        queue.ledger.credit(AccountKey::new(OwnerKind::Customer, d1.customer_id().0, Bucket::Available), 4_000, "USD", "seed-d1", "seed").await.unwrap();
        queue.ledger.credit(AccountKey::new(OwnerKind::Customer, d2.customer_id().0, Bucket::Available), 7_000, "USD", "seed-d2", "seed").await.unwrap();

        queue.enqueue(w1.clone()).await;
        queue.enqueue(d1.clone()).await;
        queue.enqueue(d2.clone()).await;

        let confirmed = queue.run_matching_cycle("USD").await.unwrap();
        assert_eq!(confirmed.len(), 2);

        let txn = queue.store.begin().await;
        let w1_after = queue.store.get_queue_item(txn, w1.id()).await.unwrap();
        let d2_after = queue.store.get_queue_item(txn, d2.id()).await.unwrap();
        queue.store.rollback(txn).await;

        assert_eq!(w1_after.state(), QueueItemState::Filled);
        assert_eq!(w1_after.residual(), 0);
        assert!(d2_after.is_partially_filled());
        assert_eq!(d2_after.residual(), 1_000);

        let total: i64 = confirmed.iter().map(|a| a.amount()).sum();
        assert_eq!(total, 10_000);
    }

    #[tokio::test]
    async fn currency_mismatch_never_matches() {
        let queue = harness();
        let w = item(Direction::Withdrawal, 1_000);
        let d = QueueItem::new(
            Direction::Deposit,
            CustomerId::new(),
            1_000,
            "EUR",
            BTreeSet::from(["ach".to_string()]),
            Utc::now() + chrono::Duration::minutes(30),
            10,
            Tier::Gold,
            true,
        );
        assert!(!queue.compatible(&w, &d));
    }
}
