//! Ledger primitives: accounts and double-entry postings.
//!
//! Generalizes the teacher's single balance+credit-limit `Agent` fields
//! (`models/agent.rs`) into the available/reserved bucket model §3 and §4.3
//! require, keyed by `(ownerKind, ownerId, bucket)`.

use super::ids::LedgerAccountId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    Customer,
    Agent,
    House,
    Escrow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Available,
    Reserved,
    House,
    Escrow,
    Freeplay,
}

/// `(ownerKind, ownerId, bucket)` — the account key the spec names directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountKey {
    pub owner_kind: OwnerKind,
    pub owner_id: Uuid,
    pub bucket: Bucket,
}

impl AccountKey {
    pub fn new(owner_kind: OwnerKind, owner_id: Uuid, bucket: Bucket) -> Self {
        Self { owner_kind, owner_id, bucket }
    }

    pub fn house() -> Self {
        Self { owner_kind: OwnerKind::House, owner_id: Uuid::nil(), bucket: Bucket::House }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerAccount {
    pub id: LedgerAccountId,
    pub key: AccountKey,
    pub currency: String,
    available: i64,
    reserved: i64,
}

impl LedgerAccount {
    pub fn new(key: AccountKey, currency: impl Into<String>) -> Self {
        Self { id: LedgerAccountId::new(), key, currency: currency.into(), available: 0, reserved: 0 }
    }

    pub fn available(&self) -> i64 {
        self.available
    }

    pub fn reserved(&self) -> i64 {
        self.reserved
    }

    pub fn is_house(&self) -> bool {
        matches!(self.key.owner_kind, OwnerKind::House)
    }

    /// House accounts are the only ones permitted to go negative (the house
    /// float is `-∑(non-house balances)`); all others must stay `>= 0`.
    pub fn invariant_holds(&self) -> bool {
        self.is_house() || (self.available >= 0 && self.reserved >= 0)
    }

    pub(crate) fn adjust_available(&mut self, delta: i64) {
        self.available += delta;
    }

    pub(crate) fn adjust_reserved(&mut self, delta: i64) {
        self.reserved += delta;
    }
}

/// Atomic double-entry record. `Posting`s are append-only; nothing in this
/// module ever mutates or removes one once committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Posting {
    pub id: Uuid,
    pub from: AccountKey,
    pub to: AccountKey,
    pub amount: i64,
    pub reason: String,
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
}

impl Posting {
    pub fn new(from: AccountKey, to: AccountKey, amount: i64, reason: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            from,
            to,
            amount,
            reason: reason.into(),
            correlation_id: correlation_id.into(),
            timestamp: Utc::now(),
        }
    }
}
