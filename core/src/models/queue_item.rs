//! P2P matching queue entities: `QueueItem` and `MatchAttempt`.
//!
//! `QueueItem::reserve`/`confirm_fill`/`expire` mirror the teacher's
//! `models/transaction.rs::settle`/`drop_transaction` ordered-validation
//! style, generalized to the §4.5 reservation protocol's five states.

use super::ids::{CustomerId, MatchAttemptId, QueueItemId};
use crate::error::{ErrorKind, HasErrorKind};
use crate::models::customer::Tier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Withdrawal,
    Deposit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemState {
    Queued,
    Reserved,
    PartiallyFilled,
    Filled,
    Expired,
    Cancelled,
}

#[derive(Debug, Error)]
pub enum QueueItemError {
    #[error("queue item {0:?} is in state {1:?}, which does not allow this transition")]
    InvalidState(QueueItemId, QueueItemState),
}

impl HasErrorKind for QueueItemError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Precondition
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    id: QueueItemId,
    direction: Direction,
    customer_id: CustomerId,
    amount: i64,
    residual: i64,
    currency: String,
    allowed_methods: BTreeSet<String>,
    enqueued_at: DateTime<Utc>,
    timeout_at: DateTime<Utc>,
    state: QueueItemState,
    risk_score: u8,
    tier: Tier,
    attempts: u32,
    pending_attempt: Option<MatchAttemptId>,
    allow_partial: bool,
}

impl QueueItem {
    pub fn new(
        direction: Direction,
        customer_id: CustomerId,
        amount: i64,
        currency: impl Into<String>,
        allowed_methods: BTreeSet<String>,
        timeout_at: DateTime<Utc>,
        risk_score: u8,
        tier: Tier,
        allow_partial: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: QueueItemId::new(),
            direction,
            customer_id,
            amount,
            residual: amount,
            currency: currency.into(),
            allowed_methods,
            enqueued_at: now,
            timeout_at,
            state: QueueItemState::Queued,
            risk_score,
            tier,
            attempts: 0,
            pending_attempt: None,
            allow_partial,
        }
    }

    pub fn id(&self) -> QueueItemId {
        self.id
    }
    pub fn direction(&self) -> Direction {
        self.direction
    }
    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }
    pub fn amount(&self) -> i64 {
        self.amount
    }
    pub fn residual(&self) -> i64 {
        self.residual
    }
    pub fn currency(&self) -> &str {
        &self.currency
    }
    pub fn allowed_methods(&self) -> &BTreeSet<String> {
        &self.allowed_methods
    }
    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }
    pub fn state(&self) -> QueueItemState {
        self.state
    }
    pub fn risk_score(&self) -> u8 {
        self.risk_score
    }
    pub fn tier(&self) -> Tier {
        self.tier
    }
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
    pub fn allow_partial(&self) -> bool {
        self.allow_partial
    }

    /// `queued -> reserved`, recording the holding `MatchAttempt`.
    pub fn reserve(&mut self, attempt: MatchAttemptId) -> Result<(), QueueItemError> {
        if self.state != QueueItemState::Queued {
            return Err(QueueItemError::InvalidState(self.id, self.state));
        }
        self.state = QueueItemState::Reserved;
        self.pending_attempt = Some(attempt);
        Ok(())
    }

    /// Applies a confirmed fill of `filled_amount` against the residual,
    /// transitioning to `filled` when the residual reaches zero or
    /// `partially_filled` otherwise.
    pub fn confirm_fill(&mut self, filled_amount: i64) -> Result<(), QueueItemError> {
        if self.state != QueueItemState::Reserved {
            return Err(QueueItemError::InvalidState(self.id, self.state));
        }
        self.residual -= filled_amount;
        self.pending_attempt = None;
        self.state = if self.residual == 0 { QueueItemState::Filled } else { QueueItemState::PartiallyFilled };
        if self.state == QueueItemState::PartiallyFilled {
            // Residual stays queued: enqueued_at is preserved per §4.5.
            self.state = QueueItemState::Queued;
        }
        Ok(())
    }

    /// Reservation expired without confirmation: `reserved -> queued` with
    /// `attempts` incremented, or `-> expired` once `max_attempts` reached.
    pub fn expire_reservation(&mut self, max_attempts: u32) -> Result<(), QueueItemError> {
        if self.state != QueueItemState::Reserved {
            return Err(QueueItemError::InvalidState(self.id, self.state));
        }
        self.pending_attempt = None;
        self.attempts += 1;
        self.state = if self.attempts >= max_attempts { QueueItemState::Expired } else { QueueItemState::Queued };
        Ok(())
    }

    /// Permitted in `queued` or `partially-filled` (which, per this model,
    /// is represented by `queued` with `residual < amount`); in `reserved`
    /// the caller must wait for the reservation TTL.
    pub fn cancel(&mut self) -> Result<(), QueueItemError> {
        if self.state != QueueItemState::Queued {
            return Err(QueueItemError::InvalidState(self.id, self.state));
        }
        self.state = QueueItemState::Cancelled;
        Ok(())
    }

    pub fn is_partially_filled(&self) -> bool {
        self.state == QueueItemState::Queued && self.residual < self.amount
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchAttemptState {
    Pending,
    Confirmed,
    Aborted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchAttempt {
    id: MatchAttemptId,
    withdrawal_id: QueueItemId,
    deposit_id: QueueItemId,
    amount: i64,
    expires_at: DateTime<Utc>,
    state: MatchAttemptState,
}

impl MatchAttempt {
    pub fn new(withdrawal_id: QueueItemId, deposit_id: QueueItemId, amount: i64, expires_at: DateTime<Utc>) -> Self {
        Self { id: MatchAttemptId::new(), withdrawal_id, deposit_id, amount, expires_at, state: MatchAttemptState::Pending }
    }

    pub fn id(&self) -> MatchAttemptId {
        self.id
    }
    pub fn withdrawal_id(&self) -> QueueItemId {
        self.withdrawal_id
    }
    pub fn deposit_id(&self) -> QueueItemId {
        self.deposit_id
    }
    pub fn amount(&self) -> i64 {
        self.amount
    }
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
    pub fn state(&self) -> MatchAttemptState {
        self.state
    }

    pub fn confirm(&mut self) {
        self.state = MatchAttemptState::Confirmed;
    }

    pub fn abort(&mut self) {
        self.state = MatchAttemptState::Aborted;
    }

    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ids::CustomerId;

    fn item(amount: i64) -> QueueItem {
        QueueItem::new(
            Direction::Withdrawal,
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

    #[test]
    fn partial_fill_keeps_residual_queued() {
        let mut w = item(10_000);
        w.reserve(MatchAttemptId::new()).unwrap();
        w.confirm_fill(4_000).unwrap();
        assert_eq!(w.state(), QueueItemState::Queued);
        assert_eq!(w.residual(), 6_000);
        assert!(w.is_partially_filled());
    }

    #[test]
    fn full_fill_transitions_to_filled() {
        let mut w = item(10_000);
        w.reserve(MatchAttemptId::new()).unwrap();
        w.confirm_fill(10_000).unwrap();
        assert_eq!(w.state(), QueueItemState::Filled);
        assert_eq!(w.residual(), 0);
    }

    #[test]
    fn expiry_returns_to_queued_until_max_attempts() {
        let mut w = item(10_000);
        for _ in 0..4 {
            w.reserve(MatchAttemptId::new()).unwrap();
            w.expire_reservation(5).unwrap();
            assert_eq!(w.state(), QueueItemState::Queued);
        }
        w.reserve(MatchAttemptId::new()).unwrap();
        w.expire_reservation(5).unwrap();
        assert_eq!(w.state(), QueueItemState::Expired);
    }
}
