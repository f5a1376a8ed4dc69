//! Payout lifecycle DAG.
//!
//! Transition methods mirror the teacher's `settlement/rtgs.rs::try_settle`
//! shape: one method per edge, returning a typed error rather than leaving
//! the caller to inspect state manually.

use super::ids::{AgentId, PayoutId};
use crate::error::{ErrorKind, HasErrorKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutState {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Error)]
#[error("payout {id:?} cannot transition from {from:?} via this operation")]
pub struct PayoutTransitionError {
    pub id: PayoutId,
    pub from: PayoutState,
}

impl HasErrorKind for PayoutTransitionError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Precondition
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    id: PayoutId,
    agent_id: AgentId,
    amount: i64,
    currency: String,
    state: PayoutState,
    reference: Option<String>,
    processed_by: Option<String>,
    completed_at: Option<DateTime<Utc>>,
}

impl Payout {
    pub fn new(agent_id: AgentId, amount: i64, currency: impl Into<String>) -> Self {
        Self {
            id: PayoutId::new(),
            agent_id,
            amount,
            currency: currency.into(),
            state: PayoutState::Pending,
            reference: None,
            processed_by: None,
            completed_at: None,
        }
    }

    pub fn id(&self) -> PayoutId {
        self.id
    }
    pub fn agent_id(&self) -> AgentId {
        self.agent_id
    }
    pub fn amount(&self) -> i64 {
        self.amount
    }
    pub fn state(&self) -> PayoutState {
        self.state
    }

    fn require(&self, expected: PayoutState) -> Result<(), PayoutTransitionError> {
        if self.state != expected {
            return Err(PayoutTransitionError { id: self.id, from: self.state });
        }
        Ok(())
    }

    pub fn process(&mut self, processed_by: impl Into<String>) -> Result<(), PayoutTransitionError> {
        self.require(PayoutState::Pending)?;
        self.state = PayoutState::Processing;
        self.processed_by = Some(processed_by.into());
        Ok(())
    }

    pub fn complete(&mut self, reference: impl Into<String>, now: DateTime<Utc>) -> Result<(), PayoutTransitionError> {
        self.require(PayoutState::Processing)?;
        self.state = PayoutState::Completed;
        self.reference = Some(reference.into());
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn fail(&mut self) -> Result<(), PayoutTransitionError> {
        self.require(PayoutState::Processing)?;
        self.state = PayoutState::Failed;
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), PayoutTransitionError> {
        self.require(PayoutState::Pending)?;
        self.state = PayoutState::Cancelled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_requires_prior_processing() {
        let mut p = Payout::new(AgentId::new(), 1_000, "USD");
        let err = p.complete("ref", Utc::now()).unwrap_err();
        assert_eq!(err.from, PayoutState::Pending);
        p.process("ops").unwrap();
        p.complete("ref", Utc::now()).unwrap();
        assert_eq!(p.state(), PayoutState::Completed);
    }

    #[test]
    fn cancel_only_from_pending() {
        let mut p = Payout::new(AgentId::new(), 1_000, "USD");
        p.process("ops").unwrap();
        assert!(p.cancel().is_err());
    }
}
