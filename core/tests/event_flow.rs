//! Cross-component: a real `WagerEngine` operation publishes onto the
//! shared `EventBus`, and an `SseGateway` subscriber observes it as a framed
//! event without any direct coupling between the two components.

use std::sync::Arc;

use ops_backbone_core::config::SseConfig;
use ops_backbone_core::models::{AccountKey, AgentType, Bucket, Customer, Filter, OddsMillis, OddsSnapshot, OwnerKind, SportsEvent};
use ops_backbone_core::wager_engine::CreateBetInput;
use ops_backbone_core::{AgentGraph, Config, EventBus, Ledger, MemoryStore, SseGateway, Store, WagerEngine};

#[tokio::test]
async fn bet_placement_is_observable_over_sse() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let config = Arc::new(Config::default());
    let ledger = Arc::new(Ledger::new(store.clone()));
    let bus = Arc::new(EventBus::new(config.bus.clone()));
    let gateway = SseGateway::new(bus.clone(), SseConfig::default());

    let graph = AgentGraph::new(store.clone(), config.clone());
    let agent = graph.create_agent("shop1", AgentType::Agent, None).await.unwrap();

    let odds = OddsSnapshot { moneyline_home: OddsMillis(1910), moneyline_away: OddsMillis(2050), last_updated: chrono::Utc::now() };
    let event = SportsEvent::new("football", "nfl", chrono::Utc::now(), odds);
    let event_id = event.id();
    let txn = store.begin().await;
    store.put_sports_event(txn, event).await;
    store.commit(txn).await.unwrap();

    let customer = Customer::new(agent.id());
    let customer_id = customer.id();
    let txn = store.begin().await;
    store.put_customer(txn, customer).await;
    store.commit(txn).await.unwrap();

    ledger
        .credit(AccountKey::new(OwnerKind::Customer, customer_id.0, Bucket::Available), 5_000, "USD", "seed", "test seed")
        .await
        .unwrap();

    let (_handle, mut stream) = gateway.open(Filter::default());

    let wager_engine = WagerEngine::new(store.clone(), config.clone(), ledger.clone(), bus.clone());
    wager_engine
        .create_bet(CreateBetInput {
            customer_id,
            agent_id: agent.id(),
            event_id,
            bet_type: "moneyline".to_string(),
            selection: "home".to_string(),
            stake: 1_000,
            odds: OddsMillis::from_decimal(1.910),
            sport: "football".to_string(),
        })
        .await
        .unwrap();

    let frame = stream.next_frame().await.expect("stream closed before a frame arrived");
    let wire = frame.to_wire();
    assert!(wire.contains("event: wager_placed"), "unexpected frame: {wire}");
}
