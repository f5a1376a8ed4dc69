//! End-to-end: agent hierarchy -> bet placement -> settlement -> commission
//! close/payout.

use std::sync::Arc;

use ops_backbone_core::clock::PayoutSchedule;
use ops_backbone_core::models::{
    AccountKey, AgentType, Bucket, Customer, OddsMillis, OddsSnapshot, OwnerKind, SettlementOutcome, SportsEvent,
};
use ops_backbone_core::store::validate_snapshot;
use ops_backbone_core::wager_engine::CreateBetInput;
use ops_backbone_core::{AgentGraph, CommissionEngine, Config, EventBus, Ledger, MemoryStore, Store, WagerEngine};

fn available_key(owner: uuid::Uuid) -> AccountKey {
    AccountKey::new(OwnerKind::Customer, owner, Bucket::Available)
}

#[tokio::test]
async fn bet_settlement_feeds_commission_payout() {
    let memory_store = Arc::new(MemoryStore::new());
    let store: Arc<dyn Store> = memory_store.clone();
    let config = Arc::new(Config::default());
    let ledger = Arc::new(Ledger::new(store.clone()));
    let bus = Arc::new(EventBus::new(config.bus.clone()));

    let graph = AgentGraph::new(store.clone(), config.clone());
    let agent = graph.create_agent("shop1", AgentType::Agent, None).await.unwrap();

    let snapshot = OddsSnapshot { moneyline_home: OddsMillis(1910), moneyline_away: OddsMillis(2050), last_updated: chrono::Utc::now() };
    let event = SportsEvent::new("football", "nfl", chrono::Utc::now(), snapshot);
    let event_id = event.id();
    let txn = store.begin().await;
    store.put_sports_event(txn, event).await;
    store.commit(txn).await.unwrap();

    let customer = Customer::new(agent.id());
    let customer_id = customer.id();
    let txn = store.begin().await;
    store.put_customer(txn, customer).await;
    store.commit(txn).await.unwrap();

    ledger.credit(available_key(customer_id.0), 10_000, "USD", "seed", "test seed").await.unwrap();

    let wager_engine = WagerEngine::new(store.clone(), config.clone(), ledger.clone(), bus.clone());
    let wager = wager_engine
        .create_bet(CreateBetInput {
            customer_id,
            agent_id: agent.id(),
            event_id,
            bet_type: "moneyline".to_string(),
            selection: "home".to_string(),
            stake: 2_500,
            odds: OddsMillis::from_decimal(1.910),
            sport: "football".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(wager.potential_payout(), 2_275);

    let payout_amount = wager_engine.settle_bet(wager.id(), SettlementOutcome::Won, "grader").await.unwrap();
    assert_eq!(payout_amount, 2_275);

    let commission_engine = CommissionEngine::new(store.clone(), config.clone(), ledger.clone(), bus.clone());
    let structure = ops_backbone_core::models::CommissionStructure::new(0.05, PayoutSchedule::Weekly);
    let calc = commission_engine
        .close_period(agent.id(), &structure, chrono::Utc::now(), chrono::Utc::now(), wager.stake(), &[])
        .await;
    assert_eq!(calc.breakdown.amount, 125); // 2_500 * 0.05

    let payout = commission_engine.enqueue_payout(&[calc], "USD").await.unwrap();
    commission_engine.process_payout(payout.id(), "ops").await.unwrap();
    commission_engine.complete_payout(payout.id(), "ref-1").await.unwrap();

    let txn = store.begin().await;
    let agent_account = store.get_ledger_account(txn, AccountKey::new(OwnerKind::Agent, agent.id().0, Bucket::Available)).await.unwrap();
    store.rollback(txn).await;
    assert_eq!(agent_account.available(), 125);

    let snapshot = memory_store.checkpoint(&config).unwrap();
    validate_snapshot(&snapshot).unwrap();
}
