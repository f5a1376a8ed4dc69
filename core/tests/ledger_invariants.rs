//! Property tests over `Ledger`: arbitrary valid sequences of reserve/
//! release/transfer among a fixed set of customer accounts must never let
//! total non-house balance drift or any non-house account go negative.
//!
//! Candidate operations are filtered against a local mirror of each
//! account's available/reserved split before being applied, the same way a
//! real caller only ever releases what it has reserved — `Ledger::release`
//! trusts that invariant rather than re-deriving it.

use std::sync::Arc;

use ops_backbone_core::models::{AccountKey, Bucket, OwnerKind};
use ops_backbone_core::{Ledger, MemoryStore, Store};
use proptest::prelude::*;

const SEED_PER_ACCOUNT: i64 = 50_000;
const ACCOUNTS: usize = 4;

#[derive(Debug, Clone, Copy)]
enum Op {
    Reserve(usize, i64),
    Release(usize, i64),
    Transfer(usize, usize, i64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..ACCOUNTS, 1i64..2_000).prop_map(|(a, amt)| Op::Reserve(a, amt)),
        (0..ACCOUNTS, 1i64..2_000).prop_map(|(a, amt)| Op::Release(a, amt)),
        (0..ACCOUNTS, 0..ACCOUNTS, 1i64..2_000).prop_map(|(a, b, amt)| Op::Transfer(a, b, amt)),
    ]
}

async fn total_non_house(store: &Arc<dyn Store>, keys: &[AccountKey]) -> i64 {
    let txn = store.begin().await;
    let mut total = 0;
    for key in keys {
        if let Some(account) = store.get_ledger_account(txn, *key).await {
            total += account.available() + account.reserved();
        }
    }
    store.rollback(txn).await;
    total
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn conservation_and_non_negativity_hold_under_random_ops(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
            let ledger = Ledger::new(store.clone());
            let keys: Vec<AccountKey> = (0..ACCOUNTS)
                .map(|_| AccountKey::new(OwnerKind::Customer, uuid::Uuid::new_v4(), Bucket::Available))
                .collect();

            let mut available = vec![0i64; ACCOUNTS];
            let mut reserved = vec![0i64; ACCOUNTS];
            for (i, key) in keys.iter().enumerate() {
                ledger.credit(*key, SEED_PER_ACCOUNT, "USD", &format!("seed-{}", key.owner_id), "seed").await.unwrap();
                available[i] = SEED_PER_ACCOUNT;
            }
            let expected_total = SEED_PER_ACCOUNT * ACCOUNTS as i64;
            prop_assert_eq!(total_non_house(&store, &keys).await, expected_total);

            for (i, op) in ops.into_iter().enumerate() {
                let corr = format!("op-{i}");
                match op {
                    Op::Reserve(a, amt) if available[a] >= amt => {
                        ledger.reserve(keys[a], amt, "USD", &corr, "test reserve").await.unwrap();
                        available[a] -= amt;
                        reserved[a] += amt;
                    }
                    Op::Release(a, amt) if reserved[a] >= amt => {
                        ledger.release(keys[a], amt, "USD", &corr, "test release").await.unwrap();
                        reserved[a] -= amt;
                        available[a] += amt;
                    }
                    Op::Transfer(a, b, amt) if a != b && available[a] >= amt => {
                        ledger.transfer(keys[a], keys[b], amt, "USD", &corr, "test transfer").await.unwrap();
                        available[a] -= amt;
                        available[b] += amt;
                    }
                    _ => {} // skip ops the local model rules out, mirroring a real caller's own bookkeeping
                }
            }

            prop_assert_eq!(total_non_house(&store, &keys).await, expected_total);

            let txn = store.begin().await;
            for (i, key) in keys.iter().enumerate() {
                let account = store.get_ledger_account(txn, *key).await.unwrap();
                prop_assert!(account.invariant_holds());
                prop_assert_eq!(account.available(), available[i]);
                prop_assert_eq!(account.reserved(), reserved[i]);
            }
            store.rollback(txn).await;
        });
    }
}
