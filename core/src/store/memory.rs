//! In-memory `Store` implementation.
//!
//! Grounded on the teacher's `models/state.rs` (`SimulationState`):
//! `BTreeMap`-keyed entity tables for deterministic iteration order, plain
//! CRUD methods, and secondary-index scans computed on demand rather than
//! maintained incrementally — the same tradeoff the teacher's
//! `AgentQueueIndex` makes explicit (`rebuild()` is cheap enough to call
//! per read in a single-process backbone of this size).
//!
//! Transactions are copy-on-write: `begin` clones the whole `Tables` set
//! into a pending slot; every accessor below operates against that pending
//! clone; `commit` atomically swaps it into the committed slot; `rollback`
//! discards it. This keeps "transactional per call site" true without
//! requiring every accessor to thread lock guards across an await point.

use super::{Store, TxnId};
use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::models::*;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub(super) struct Tables {
    pub agents: BTreeMap<Uuid, Agent>,
    pub customers: BTreeMap<Uuid, Customer>,
    pub ledger_accounts: BTreeMap<AccountKey, LedgerAccount>,
    pub postings: Vec<Posting>,
    pub wagers: BTreeMap<Uuid, Wager>,
    pub sports_events: BTreeMap<Uuid, SportsEvent>,
    pub commission_structures: BTreeMap<Uuid, CommissionStructure>,
    pub commission_calculations: BTreeMap<Uuid, CommissionCalculation>,
    pub payouts: BTreeMap<Uuid, Payout>,
    pub queue_items: BTreeMap<Uuid, QueueItem>,
    pub match_attempts: BTreeMap<Uuid, MatchAttempt>,
    pub correlations_claimed: BTreeSet<String>,
}

pub struct MemoryStore {
    committed: RwLock<Tables>,
    pending: RwLock<HashMap<u64, Tables>>,
    next_txn: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { committed: RwLock::new(Tables::default()), pending: RwLock::new(HashMap::new()), next_txn: AtomicU64::new(1) }
    }

    fn with_pending<R>(&self, txn: TxnId, f: impl FnOnce(&mut Tables) -> R) -> R {
        let mut pending = self.pending.write();
        let tables = pending
            .get_mut(&txn.0)
            .expect("accessor called with a TxnId that was never begin()'d or was already committed/rolled back");
        f(tables)
    }

    pub fn snapshot_committed(&self) -> Tables {
        self.committed.read().clone()
    }

    /// Exports the last committed state as a [`super::StateSnapshot`],
    /// stamped with the hash of the `Config` the caller is running under.
    pub fn checkpoint(&self, config: &crate::config::Config) -> CoreResult<super::StateSnapshot> {
        let tables = self.snapshot_committed();
        Ok(super::StateSnapshot {
            agents: tables.agents.into_values().collect(),
            customers: tables.customers.into_values().collect(),
            ledger_accounts: tables.ledger_accounts.into_values().collect(),
            postings: tables.postings,
            wagers: tables.wagers.into_values().collect(),
            queue_items: tables.queue_items.into_values().collect(),
            config_hash: super::compute_config_hash(config)?,
        })
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> TxnId {
        let id = self.next_txn.fetch_add(1, Ordering::SeqCst);
        let snapshot = self.committed.read().clone();
        self.pending.write().insert(id, snapshot);
        TxnId(id)
    }

    async fn commit(&self, txn: TxnId) -> CoreResult<()> {
        let tables = self
            .pending
            .write()
            .remove(&txn.0)
            .ok_or_else(|| CoreError::new(ErrorKind::Internal, "commit called on unknown transaction"))?;
        *self.committed.write() = tables;
        Ok(())
    }

    async fn rollback(&self, txn: TxnId) {
        self.pending.write().remove(&txn.0);
    }

    async fn claim_correlation(&self, txn: TxnId, correlation_id: &str) -> bool {
        self.with_pending(txn, |t| t.correlations_claimed.insert(correlation_id.to_string()))
    }

    async fn put_agent(&self, txn: TxnId, agent: Agent) {
        self.with_pending(txn, |t| {
            t.agents.insert(agent.id().0, agent);
        })
    }

    async fn get_agent(&self, txn: TxnId, id: AgentId) -> Option<Agent> {
        self.with_pending(txn, |t| t.agents.get(&id.0).cloned())
    }

    async fn find_agent_by_login(&self, txn: TxnId, login: &str) -> Option<Agent> {
        self.with_pending(txn, |t| t.agents.values().find(|a| a.login() == login).cloned())
    }

    async fn children_of(&self, txn: TxnId, id: AgentId) -> Vec<AgentId> {
        self.with_pending(txn, |t| t.agents.get(&id.0).map(|a| a.children().to_vec()).unwrap_or_default())
    }

    async fn put_customer(&self, txn: TxnId, customer: Customer) {
        self.with_pending(txn, |t| {
            t.customers.insert(customer.id().0, customer);
        })
    }

    async fn get_customer(&self, txn: TxnId, id: CustomerId) -> Option<Customer> {
        self.with_pending(txn, |t| t.customers.get(&id.0).cloned())
    }

    async fn customers_by_agent(&self, txn: TxnId, agent_id: AgentId) -> Vec<Customer> {
        self.with_pending(txn, |t| {
            t.customers.values().filter(|c| c.attachments().iter().any(|a| a.agent_id == agent_id)).cloned().collect()
        })
    }

    async fn put_ledger_account(&self, txn: TxnId, account: LedgerAccount) {
        self.with_pending(txn, |t| {
            t.ledger_accounts.insert(account.key, account);
        })
    }

    async fn get_ledger_account(&self, txn: TxnId, key: AccountKey) -> Option<LedgerAccount> {
        self.with_pending(txn, |t| t.ledger_accounts.get(&key).cloned())
    }

    async fn append_posting(&self, txn: TxnId, posting: Posting) {
        self.with_pending(txn, |t| t.postings.push(posting))
    }

    async fn postings_by_correlation(&self, txn: TxnId, correlation_id: &str) -> Vec<Posting> {
        self.with_pending(txn, |t| t.postings.iter().filter(|p| p.correlation_id == correlation_id).cloned().collect())
    }

    async fn all_postings(&self, txn: TxnId) -> Vec<Posting> {
        self.with_pending(txn, |t| t.postings.clone())
    }

    async fn all_ledger_accounts(&self, txn: TxnId) -> Vec<LedgerAccount> {
        self.with_pending(txn, |t| t.ledger_accounts.values().cloned().collect())
    }

    async fn put_wager(&self, txn: TxnId, wager: Wager) {
        self.with_pending(txn, |t| {
            t.wagers.insert(wager.id().0, wager);
        })
    }

    async fn get_wager(&self, txn: TxnId, id: WagerId) -> Option<Wager> {
        self.with_pending(txn, |t| t.wagers.get(&id.0).cloned())
    }

    async fn wagers_by_event(&self, txn: TxnId, event_id: SportsEventId) -> Vec<Wager> {
        self.with_pending(txn, |t| t.wagers.values().filter(|w| w.event_id() == event_id).cloned().collect())
    }

    async fn wagers_by_agent(&self, txn: TxnId, agent_id: AgentId) -> Vec<Wager> {
        self.with_pending(txn, |t| t.wagers.values().filter(|w| w.agent_id() == agent_id).cloned().collect())
    }

    async fn put_sports_event(&self, txn: TxnId, event: SportsEvent) {
        self.with_pending(txn, |t| {
            t.sports_events.insert(event.id().0, event);
        })
    }

    async fn get_sports_event(&self, txn: TxnId, id: SportsEventId) -> Option<SportsEvent> {
        self.with_pending(txn, |t| t.sports_events.get(&id.0).cloned())
    }

    async fn put_commission_structure(&self, txn: TxnId, structure: CommissionStructure) {
        self.with_pending(txn, |t| {
            t.commission_structures.insert(structure.id.0, structure);
        })
    }

    async fn get_commission_structure(&self, txn: TxnId, id: CommissionStructureId) -> Option<CommissionStructure> {
        self.with_pending(txn, |t| t.commission_structures.get(&id.0).cloned())
    }

    async fn put_commission_calculation(&self, txn: TxnId, calc: CommissionCalculation) {
        self.with_pending(txn, |t| {
            t.commission_calculations.insert(calc.id.0, calc);
        })
    }

    async fn calculations_by_agent(&self, txn: TxnId, agent_id: AgentId) -> Vec<CommissionCalculation> {
        self.with_pending(txn, |t| t.commission_calculations.values().filter(|c| c.agent_id == agent_id).cloned().collect())
    }

    async fn put_payout(&self, txn: TxnId, payout: Payout) {
        self.with_pending(txn, |t| {
            t.payouts.insert(payout.id().0, payout);
        })
    }

    async fn get_payout(&self, txn: TxnId, id: PayoutId) -> Option<Payout> {
        self.with_pending(txn, |t| t.payouts.get(&id.0).cloned())
    }

    async fn payouts_by_agent(&self, txn: TxnId, agent_id: AgentId) -> Vec<Payout> {
        self.with_pending(txn, |t| t.payouts.values().filter(|p| p.agent_id() == agent_id).cloned().collect())
    }

    async fn put_queue_item(&self, txn: TxnId, item: QueueItem) {
        self.with_pending(txn, |t| {
            t.queue_items.insert(item.id().0, item);
        })
    }

    async fn get_queue_item(&self, txn: TxnId, id: QueueItemId) -> Option<QueueItem> {
        self.with_pending(txn, |t| t.queue_items.get(&id.0).cloned())
    }

    async fn queue_items_by_state_currency(&self, txn: TxnId, state: QueueItemState, currency: &str) -> Vec<QueueItem> {
        self.with_pending(txn, |t| {
            t.queue_items.values().filter(|q| q.state() == state && q.currency() == currency).cloned().collect()
        })
    }

    async fn all_queue_items(&self, txn: TxnId) -> Vec<QueueItem> {
        self.with_pending(txn, |t| t.queue_items.values().cloned().collect())
    }

    async fn put_match_attempt(&self, txn: TxnId, attempt: MatchAttempt) {
        self.with_pending(txn, |t| {
            t.match_attempts.insert(attempt.id().0, attempt);
        })
    }

    async fn get_match_attempt(&self, txn: TxnId, id: MatchAttemptId) -> Option<MatchAttempt> {
        self.with_pending(txn, |t| t.match_attempts.get(&id.0).cloned())
    }

    async fn pending_match_attempts(&self, txn: TxnId) -> Vec<MatchAttempt> {
        self.with_pending(txn, |t| {
            t.match_attempts.values().filter(|m| m.state() == MatchAttemptState::Pending).cloned().collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rollback_discards_writes() {
        let store = MemoryStore::new();
        let txn = store.begin().await;
        let agent = Agent::new("agent1", AgentType::Master, None);
        let id = agent.id();
        store.put_agent(txn, agent).await;
        store.rollback(txn).await;

        let txn2 = store.begin().await;
        assert!(store.get_agent(txn2, id).await.is_none());
    }

    #[tokio::test]
    async fn commit_makes_writes_visible_to_new_transactions() {
        let store = MemoryStore::new();
        let txn = store.begin().await;
        let agent = Agent::new("agent1", AgentType::Master, None);
        let id = agent.id();
        store.put_agent(txn, agent).await;
        store.commit(txn).await.unwrap();

        let txn2 = store.begin().await;
        assert!(store.get_agent(txn2, id).await.is_some());
    }

    #[tokio::test]
    async fn correlation_claim_is_set_on_absent() {
        let store = MemoryStore::new();
        let txn = store.begin().await;
        assert!(store.claim_correlation(txn, "corr-1").await);
        assert!(!store.claim_correlation(txn, "corr-1").await);
    }
}
