//! Ledger: double-entry postings over available/reserved/house/escrow
//! buckets.
//!
//! Generalizes the teacher's `models/agent.rs` (`available_liquidity`,
//! `can_pay`, `debit`/`credit` returning `AgentError::InsufficientLiquidity`)
//! from a single balance+credit-limit pair into the bucketed account model
//! §4.3 requires. Every operation here is idempotent keyed by `correlation`.

use crate::error::{ErrorKind, HasErrorKind};
use crate::models::{AccountKey, LedgerAccount, Posting};
use crate::store::{Store, TxnId};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient available balance in {account:?}: required {required}, available {available}")]
    Insufficient { account: AccountKey, required: i64, available: i64 },
    #[error("amount must be > 0, got {0}")]
    InvalidAmount(i64),
}

impl HasErrorKind for LedgerError {
    fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Insufficient { .. } => ErrorKind::Insufficient,
            LedgerError::InvalidAmount(_) => ErrorKind::Validation,
        }
    }
}

pub struct Ledger {
    store: Arc<dyn Store>,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn account_or_default(&self, txn: TxnId, key: AccountKey, currency: &str) -> LedgerAccount {
        match self.store.get_ledger_account(txn, key).await {
            Some(a) => a,
            None => LedgerAccount::new(key, currency),
        }
    }

    /// Returns `true` if this correlation id was already processed (caller
    /// should treat the call as a successful no-op), `false` if this call
    /// claimed it and should proceed.
    async fn already_applied(&self, txn: TxnId, correlation_id: &str) -> bool {
        !self.store.claim_correlation(txn, correlation_id).await
    }

    /// Moves `amount` from `from.available` into `from.reserved`, against
    /// an already-open transaction. Callers that need the reservation to
    /// land atomically with their own writes (e.g. `WagerEngine::create_bet`
    /// persisting the wager) use this directly instead of `reserve`, and own
    /// the surrounding `begin`/`commit`/`rollback`.
    pub(crate) async fn reserve_in(&self, txn: TxnId, from: AccountKey, amount: i64, currency: &str, correlation_id: &str, reason: &str) -> Result<(), LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if self.already_applied(txn, correlation_id).await {
            return Ok(());
        }
        let mut account = self.account_or_default(txn, from, currency).await;
        if account.available() < amount {
            return Err(LedgerError::Insufficient { account: from, required: amount, available: account.available() });
        }
        account.adjust_available(-amount);
        account.adjust_reserved(amount);
        self.store.put_ledger_account(txn, account).await;
        self.store
            .append_posting(txn, Posting::new(from, from, amount, reason, correlation_id))
            .await;
        Ok(())
    }

    /// Moves `amount` from `from.available` into `from.reserved`, in its
    /// own transaction.
    #[instrument(skip(self))]
    pub async fn reserve(&self, from: AccountKey, amount: i64, currency: &str, correlation_id: &str, reason: &str) -> Result<(), LedgerError> {
        let txn = self.store.begin().await;
        match self.reserve_in(txn, from, amount, currency, correlation_id, reason).await {
            Ok(()) => self.store.commit(txn).await.map_err(|_| LedgerError::InvalidAmount(amount)),
            Err(e) => {
                self.store.rollback(txn).await;
                Err(e)
            }
        }
    }

    /// Moves `amount` from `from.reserved` back into `from.available`.
    #[instrument(skip(self))]
    pub async fn release(&self, from: AccountKey, amount: i64, currency: &str, correlation_id: &str, reason: &str) -> Result<(), LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let txn = self.store.begin().await;
        if self.already_applied(txn, correlation_id).await {
            self.store.commit(txn).await.ok();
            return Ok(());
        }
        let mut account = self.account_or_default(txn, from, currency).await;
        account.adjust_reserved(-amount);
        account.adjust_available(amount);
        self.store.put_ledger_account(txn, account).await;
        self.store
            .append_posting(txn, Posting::new(from, from, amount, reason, correlation_id))
            .await;
        self.store.commit(txn).await.map_err(|_| LedgerError::InvalidAmount(amount))
    }

    /// Credits `to` from the house float. Both sides of the posting are
    /// materialized in the same transaction: `to.available` goes up,
    /// `house.available` goes down by the same amount (house is the only
    /// account permitted to go negative).
    #[instrument(skip(self))]
    pub async fn credit(&self, to: AccountKey, amount: i64, currency: &str, correlation_id: &str, reason: &str) -> Result<(), LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let txn = self.store.begin().await;
        if self.already_applied(txn, correlation_id).await {
            self.store.commit(txn).await.ok();
            return Ok(());
        }
        let mut account = self.account_or_default(txn, to, currency).await;
        account.adjust_available(amount);
        self.store.put_ledger_account(txn, account).await;
        if to != AccountKey::house() {
            let mut house = self.account_or_default(txn, AccountKey::house(), currency).await;
            house.adjust_available(-amount);
            self.store.put_ledger_account(txn, house).await;
        }
        self.store
            .append_posting(txn, Posting::new(AccountKey::house(), to, amount, reason, correlation_id))
            .await;
        self.store.commit(txn).await.map_err(|_| LedgerError::InvalidAmount(amount))
    }

    /// Debits `from` into the house float. Mirror of `credit`: `from`'s
    /// available must cover the amount, `house.available` goes up by it.
    #[instrument(skip(self))]
    pub async fn debit(&self, from: AccountKey, amount: i64, currency: &str, correlation_id: &str, reason: &str) -> Result<(), LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let txn = self.store.begin().await;
        if self.already_applied(txn, correlation_id).await {
            self.store.commit(txn).await.ok();
            return Ok(());
        }
        let mut account = self.account_or_default(txn, from, currency).await;
        if account.available() < amount {
            let err = LedgerError::Insufficient { account: from, required: amount, available: account.available() };
            self.store.rollback(txn).await;
            return Err(err);
        }
        account.adjust_available(-amount);
        self.store.put_ledger_account(txn, account).await;
        if from != AccountKey::house() {
            let mut house = self.account_or_default(txn, AccountKey::house(), currency).await;
            house.adjust_available(amount);
            self.store.put_ledger_account(txn, house).await;
        }
        self.store
            .append_posting(txn, Posting::new(from, AccountKey::house(), amount, reason, correlation_id))
            .await;
        self.store.commit(txn).await.map_err(|_| LedgerError::InvalidAmount(amount))
    }

    /// `transfer(a, b, x)` fails with `Insufficient` when `available(a) < x`.
    #[instrument(skip(self))]
    pub async fn transfer(&self, from: AccountKey, to: AccountKey, amount: i64, currency: &str, correlation_id: &str, reason: &str) -> Result<(), LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let txn = self.store.begin().await;
        if self.already_applied(txn, correlation_id).await {
            self.store.commit(txn).await.ok();
            return Ok(());
        }
        let mut from_account = self.account_or_default(txn, from, currency).await;
        if from_account.available() < amount {
            let err = LedgerError::Insufficient { account: from, required: amount, available: from_account.available() };
            self.store.rollback(txn).await;
            return Err(err);
        }
        from_account.adjust_available(-amount);
        let mut to_account = self.account_or_default(txn, to, currency).await;
        to_account.adjust_available(amount);
        self.store.put_ledger_account(txn, from_account).await;
        self.store.put_ledger_account(txn, to_account).await;
        self.store.append_posting(txn, Posting::new(from, to, amount, reason, correlation_id)).await;
        self.store.commit(txn).await.map_err(|_| LedgerError::InvalidAmount(amount))
    }

    /// Re-derives the non-negativity and house-float invariants directly
    /// from the account table: every non-house account's available and
    /// reserved balances stay `>= 0`, and `house.available` always equals
    /// `-∑(non-house available + reserved)` since `credit`/`debit` post the
    /// house offset in the same transaction as the customer/agent side.
    pub async fn accounts_satisfy_invariants(&self) -> bool {
        let txn = self.store.begin().await;
        let accounts = self.store.all_ledger_accounts(txn).await;
        self.store.rollback(txn).await;
        let non_house_total: i64 = accounts.iter().filter(|a| !a.is_house()).map(|a| a.available() + a.reserved()).sum();
        let house_total: i64 = accounts.iter().filter(|a| a.is_house()).map(|a| a.available()).sum();
        accounts.iter().all(|a| a.invariant_holds()) && non_house_total + house_total == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bucket, OwnerKind};
    use crate::store::MemoryStore;
    use uuid::Uuid;

    fn key(owner: Uuid) -> AccountKey {
        AccountKey::new(OwnerKind::Customer, owner, Bucket::Available)
    }

    #[tokio::test]
    async fn transfer_is_idempotent_by_correlation() {
        let ledger = Ledger::new(Arc::new(MemoryStore::new()));
        let a = key(Uuid::new_v4());
        let b = key(Uuid::new_v4());
        ledger.credit(a, 10_000, "USD", "seed", "test seed").await.unwrap();

        ledger.transfer(a, b, 2_500, "USD", "corr-1", "bet").await.unwrap();
        ledger.transfer(a, b, 2_500, "USD", "corr-1", "bet").await.unwrap(); // retried with same correlation

        let txn = ledger.store.begin().await;
        let a_acc = ledger.store.get_ledger_account(txn, a).await.unwrap();
        let b_acc = ledger.store.get_ledger_account(txn, b).await.unwrap();
        ledger.store.rollback(txn).await;
        assert_eq!(a_acc.available(), 7_500);
        assert_eq!(b_acc.available(), 2_500);
        assert!(ledger.accounts_satisfy_invariants().await);
    }

    #[tokio::test]
    async fn credit_and_debit_materialize_the_house_offset() {
        let ledger = Ledger::new(Arc::new(MemoryStore::new()));
        let a = key(Uuid::new_v4());
        ledger.credit(a, 10_000, "USD", "seed", "test seed").await.unwrap();
        ledger.debit(a, 4_000, "USD", "corr-house-1", "fee").await.unwrap();

        let txn = ledger.store.begin().await;
        let a_acc = ledger.store.get_ledger_account(txn, a).await.unwrap();
        let house_acc = ledger.store.get_ledger_account(txn, AccountKey::house()).await.unwrap();
        ledger.store.rollback(txn).await;
        assert_eq!(a_acc.available(), 6_000);
        assert_eq!(house_acc.available(), -6_000);
        assert!(ledger.accounts_satisfy_invariants().await);
    }

    #[tokio::test]
    async fn transfer_rejects_insufficient_available() {
        let ledger = Ledger::new(Arc::new(MemoryStore::new()));
        let a = key(Uuid::new_v4());
        let b = key(Uuid::new_v4());
        ledger.credit(a, 1_000, "USD", "seed", "test seed").await.unwrap();
        let err = ledger.transfer(a, b, 1_500, "USD", "corr-2", "bet").await.unwrap_err();
        assert!(matches!(err, LedgerError::Insufficient { .. }));
    }
}
