//! The abstract, pluggable `Store` contract (§4.9) and its in-memory
//! implementation.

mod memory;
mod snapshot;

pub use memory::MemoryStore;
pub use snapshot::{compute_config_hash, validate_snapshot, StateSnapshot};

use crate::error::CoreResult;
use crate::models::*;
use async_trait::async_trait;

/// Opaque transaction handle returned by [`Store::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxnId(pub u64);

/// Abstract, pluggable store. `MemoryStore` is the only implementation
/// shipped here; the trait exists so a durable backend can be swapped in
/// without touching component code.
///
/// `begin`/`commit`/`rollback` bracket a logical transaction; every
/// entity accessor below that is called between a `begin` and its matching
/// `commit`/`rollback` participates in that transaction's atomicity. Reads
/// with no enclosing transaction observe the last committed state.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> TxnId;
    async fn commit(&self, txn: TxnId) -> CoreResult<()>;
    async fn rollback(&self, txn: TxnId);

    /// Idempotency primitive: set-on-absent of a correlation id. Returns
    /// `true` if this call claimed the id (first time seen), `false` if it
    /// was already claimed.
    async fn claim_correlation(&self, txn: TxnId, correlation_id: &str) -> bool;

    async fn put_agent(&self, txn: TxnId, agent: Agent);
    async fn get_agent(&self, txn: TxnId, id: AgentId) -> Option<Agent>;
    async fn find_agent_by_login(&self, txn: TxnId, login: &str) -> Option<Agent>;
    async fn children_of(&self, txn: TxnId, id: AgentId) -> Vec<AgentId>;

    async fn put_customer(&self, txn: TxnId, customer: Customer);
    async fn get_customer(&self, txn: TxnId, id: CustomerId) -> Option<Customer>;
    async fn customers_by_agent(&self, txn: TxnId, agent_id: AgentId) -> Vec<Customer>;

    async fn put_ledger_account(&self, txn: TxnId, account: LedgerAccount);
    async fn get_ledger_account(&self, txn: TxnId, key: AccountKey) -> Option<LedgerAccount>;
    async fn append_posting(&self, txn: TxnId, posting: Posting);
    async fn postings_by_correlation(&self, txn: TxnId, correlation_id: &str) -> Vec<Posting>;
    async fn all_postings(&self, txn: TxnId) -> Vec<Posting>;
    async fn all_ledger_accounts(&self, txn: TxnId) -> Vec<LedgerAccount>;

    async fn put_wager(&self, txn: TxnId, wager: Wager);
    async fn get_wager(&self, txn: TxnId, id: WagerId) -> Option<Wager>;
    async fn wagers_by_event(&self, txn: TxnId, event_id: SportsEventId) -> Vec<Wager>;
    async fn wagers_by_agent(&self, txn: TxnId, agent_id: AgentId) -> Vec<Wager>;

    async fn put_sports_event(&self, txn: TxnId, event: SportsEvent);
    async fn get_sports_event(&self, txn: TxnId, id: SportsEventId) -> Option<SportsEvent>;

    async fn put_commission_structure(&self, txn: TxnId, structure: CommissionStructure);
    async fn get_commission_structure(&self, txn: TxnId, id: CommissionStructureId) -> Option<CommissionStructure>;
    async fn put_commission_calculation(&self, txn: TxnId, calc: CommissionCalculation);
    async fn calculations_by_agent(&self, txn: TxnId, agent_id: AgentId) -> Vec<CommissionCalculation>;

    async fn put_payout(&self, txn: TxnId, payout: Payout);
    async fn get_payout(&self, txn: TxnId, id: PayoutId) -> Option<Payout>;
    async fn payouts_by_agent(&self, txn: TxnId, agent_id: AgentId) -> Vec<Payout>;

    async fn put_queue_item(&self, txn: TxnId, item: QueueItem);
    async fn get_queue_item(&self, txn: TxnId, id: QueueItemId) -> Option<QueueItem>;
    async fn queue_items_by_state_currency(&self, txn: TxnId, state: QueueItemState, currency: &str) -> Vec<QueueItem>;
    async fn all_queue_items(&self, txn: TxnId) -> Vec<QueueItem>;

    async fn put_match_attempt(&self, txn: TxnId, attempt: MatchAttempt);
    async fn get_match_attempt(&self, txn: TxnId, id: MatchAttemptId) -> Option<MatchAttempt>;
    async fn pending_match_attempts(&self, txn: TxnId) -> Vec<MatchAttempt>;
}
