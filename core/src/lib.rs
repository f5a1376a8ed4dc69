//! Ops Backbone Core
//!
//! Agent-hierarchy sportsbook and payments backbone: agents and customers,
//! wager placement and settlement, a double-entry ledger, commission
//! calculation and payout, a withdrawal/deposit matching queue, and the
//! event bus / SSE fan-out that ties them together for a dashboard.
//!
//! # Architecture
//!
//! - **config**: explicit process configuration, no globals
//! - **error**: the shared `ErrorKind` taxonomy every component maps onto
//! - **clock**: calendar period boundaries for commission cycles
//! - **models**: domain entities and their state machines
//! - **store**: the abstract, pluggable persistence contract
//! - **agent_graph**: agent hierarchy, customer attachment, tiers
//! - **ledger**: double-entry postings over available/reserved/house buckets
//! - **wager_engine**: bet placement, odds, and settlement
//! - **commission_engine**: commission calculation and payout lifecycle
//! - **matching_queue**: withdrawal/deposit matching
//! - **event_bus**: process-local publish/subscribe
//! - **sse_gateway**: text/event-stream framing over the bus
//! - **scheduler**: cancellable, independently-cadenced reconcilers
//! - **rng**: deterministic random number generation (fairness jitter only)
//!
//! # Critical invariants
//!
//! 1. All money values are i64 minor units.
//! 2. Every ledger posting balances; non-house balances never go negative.
//! 3. State machines are closed enums; unlisted transitions fail typed.

pub mod agent_graph;
pub mod clock;
pub mod commission_engine;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod ledger;
pub mod matching_queue;
pub mod models;
pub mod rng;
pub mod scheduler;
pub mod sse_gateway;
pub mod store;
pub mod wager_engine;

pub use agent_graph::{AgentGraph, AgentGraphError};
pub use commission_engine::{CommissionEngine, CommissionEngineError};
pub use config::Config;
pub use error::{CoreError, CoreResult, ErrorKind, HasErrorKind};
pub use event_bus::EventBus;
pub use ledger::{Ledger, LedgerError};
pub use matching_queue::{MatchingQueue, MatchingQueueError};
pub use rng::RngManager;
pub use scheduler::Scheduler;
pub use sse_gateway::SseGateway;
pub use store::{MemoryStore, Store};
pub use wager_engine::{WagerEngine, WagerEngineError};
