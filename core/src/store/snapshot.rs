//! Whole-store checkpoint/export, used by the commission batcher to fix a
//! stable view for period close and by tests to assert invariants after a
//! batch of operations.
//!
//! Ported near-verbatim from the teacher's `orchestrator/checkpoint.rs`:
//! canonical-JSON (sorted-keys) SHA256 config hashing, and a referential-
//! integrity validation pass over the exported tables.

use crate::error::{CoreError, ErrorKind};
use crate::models::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub agents: Vec<Agent>,
    pub customers: Vec<Customer>,
    pub ledger_accounts: Vec<LedgerAccount>,
    pub postings: Vec<Posting>,
    pub wagers: Vec<Wager>,
    pub queue_items: Vec<QueueItem>,
    pub config_hash: String,
}

/// Deterministic SHA256 hash of any serializable config, using canonical
/// (sorted-key) JSON so hash stability doesn't depend on map iteration
/// order.
pub fn compute_config_hash<T: Serialize>(config: &T) -> Result<String, CoreError> {
    use serde_json::Value;

    let value = serde_json::to_value(config)
        .map_err(|e| CoreError::new(ErrorKind::Internal, format!("config serialization failed: {e}")))?;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> = map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let canonical = canonicalize(value);
    let json = serde_json::to_string(&canonical)
        .map_err(|e| CoreError::new(ErrorKind::Internal, format!("config serialization failed: {e}")))?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Checks the universal invariants a snapshot must hold: ledger conservation
/// (non-house balances sum to the negative of the house float) and queue
/// item referential sanity (residual <= amount, residual == 0 iff filled).
pub fn validate_snapshot(snapshot: &StateSnapshot) -> Result<(), CoreError> {
    let non_house_total: i64 = snapshot
        .ledger_accounts
        .iter()
        .filter(|a| !a.is_house())
        .map(|a| a.available() + a.reserved())
        .sum();
    let house_total: i64 = snapshot.ledger_accounts.iter().filter(|a| a.is_house()).map(|a| a.available()).sum();
    if non_house_total + house_total != 0 {
        return Err(CoreError::new(
            ErrorKind::Invariant,
            format!("ledger does not conserve value: non-house={non_house_total}, house={house_total}"),
        ));
    }

    for account in &snapshot.ledger_accounts {
        if !account.invariant_holds() {
            return Err(CoreError::new(ErrorKind::Invariant, format!("account {:?} has a negative non-house balance", account.key)));
        }
    }

    for item in &snapshot.queue_items {
        if item.residual() > item.amount() {
            return Err(CoreError::new(ErrorKind::Invariant, format!("queue item {:?} residual exceeds amount", item.id())));
        }
        if item.state() == QueueItemState::Filled && item.residual() != 0 {
            return Err(CoreError::new(ErrorKind::Invariant, format!("queue item {:?} is filled with nonzero residual", item.id())));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_hash_is_deterministic_and_order_independent() {
        #[derive(Serialize)]
        struct Cfg {
            b: i32,
            a: i32,
        }
        let h1 = compute_config_hash(&Cfg { b: 1, a: 2 }).unwrap();
        let h2 = compute_config_hash(&Cfg { b: 1, a: 2 }).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn config_hash_differs_for_different_configs() {
        #[derive(Serialize)]
        struct Cfg {
            value: i32,
        }
        let h1 = compute_config_hash(&Cfg { value: 1 }).unwrap();
        let h2 = compute_config_hash(&Cfg { value: 2 }).unwrap();
        assert_ne!(h1, h2);
    }
}
