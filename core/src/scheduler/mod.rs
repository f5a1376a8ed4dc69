//! Scheduler: independently-cadenced, cancellable reconcilers (§4.8).
//!
//! Grounded on the teacher's `orchestrator/engine.rs` run-loop shape, split
//! into one `tokio::task` per reconciler instead of one monolithic loop,
//! each parameterized by `tokio::time::interval` and a shared
//! `tokio::sync::watch<bool>` cancellation signal per the concurrency
//! model's "context object carrying deadline and cancellation."

use crate::commission_engine::CommissionEngine;
use crate::config::Config;
use crate::event_bus::EventBus;
use crate::matching_queue::MatchingQueue;
use crate::models::{EventType, Scope};
use crate::rng::RngManager;
use crate::store::Store;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration};
use tracing::{info, instrument};

/// Startup delay for one reconciler, so the three tasks don't all tick on
/// the same wall-clock instant. Deterministic per `(seed, salt)` pair.
fn startup_jitter(seed: u64, salt: u64, max_ms: u64) -> Duration {
    if max_ms == 0 {
        return Duration::ZERO;
    }
    let mut rng = RngManager::new(seed ^ salt);
    Duration::from_millis(rng.range(0, max_ms as i64) as u64)
}

/// Shared cancellation signal. Reconcilers poll this between units of work
/// and finish the in-flight unit before exiting once it flips.
#[derive(Clone)]
pub struct CancellationContext {
    rx: watch::Receiver<bool>,
}

impl CancellationContext {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

pub struct CancellationToken {
    tx: watch::Sender<bool>,
}

impl CancellationToken {
    pub fn new() -> (Self, CancellationContext) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancellationContext { rx })
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

pub struct Scheduler {
    config: Arc<Config>,
    store: Arc<dyn Store>,
    queue: Arc<MatchingQueue>,
    commission: Arc<CommissionEngine>,
    bus: Arc<EventBus>,
}

impl Scheduler {
    pub fn new(config: Arc<Config>, store: Arc<dyn Store>, queue: Arc<MatchingQueue>, commission: Arc<CommissionEngine>, bus: Arc<EventBus>) -> Self {
        Self { config, store, queue, commission, bus }
    }

    /// Spawns all four reconcilers and returns their join handles plus a
    /// token the caller uses to cancel them together.
    pub fn spawn_all(self: &Arc<Self>) -> (CancellationToken, Vec<JoinHandle<()>>) {
        let (token, ctx) = CancellationToken::new();
        let handles = vec![
            self.clone().spawn_queue_sweeper(ctx.clone()),
            self.clone().spawn_settlement_sweeper(ctx.clone()),
            self.clone().spawn_metrics_rollup(ctx.clone()),
        ];
        (token, handles)
    }

    #[instrument(skip(self, ctx))]
    fn spawn_queue_sweeper(self: Arc<Self>, mut ctx: CancellationContext) -> JoinHandle<()> {
        let period = Duration::from_millis(self.config.scheduler.queue_sweep_ms);
        let jitter = startup_jitter(self.config.scheduler.jitter_seed, 1, self.config.scheduler.max_jitter_ms);
        tokio::spawn(async move {
            sleep(jitter).await;
            if ctx.is_cancelled() {
                info!("queue sweeper stopped before first tick");
                return;
            }
            let mut tick = interval(period);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if ctx.is_cancelled() { break; }
                        if let Err(e) = self.queue.expire_stale_reservations(Utc::now()).await {
                            tracing::warn!(error = %e, "queue sweep failed");
                        }
                        for currency in ["USD", "EUR", "GBP"] {
                            if let Err(e) = self.queue.run_matching_cycle(currency).await {
                                tracing::warn!(error = %e, currency, "matching cycle failed");
                            }
                        }
                    }
                    _ = ctx.rx.changed() => {
                        if ctx.is_cancelled() { break; }
                    }
                }
            }
            info!("queue sweeper stopped");
        })
    }

    #[instrument(skip(self, ctx))]
    fn spawn_settlement_sweeper(self: Arc<Self>, mut ctx: CancellationContext) -> JoinHandle<()> {
        let period = Duration::from_millis(self.config.scheduler.settle_sweep_ms);
        let jitter = startup_jitter(self.config.scheduler.jitter_seed, 2, self.config.scheduler.max_jitter_ms);
        tokio::spawn(async move {
            sleep(jitter).await;
            if ctx.is_cancelled() {
                info!("settlement sweeper stopped before first tick");
                return;
            }
            let mut tick = interval(period);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if ctx.is_cancelled() { break; }
                        // §4.8 says this sweeper "grades wagers on completed
                        // events lacking settlements", but grading needs the
                        // actual game result (who won) and `WagerEngine::
                        // settle_bet`/`bulk_settle_bets` both take an explicit
                        // `SettlementOutcome` as an argument — there is no
                        // field on `SportsEvent` holding a result, by design,
                        // since this core has no sports-results provider.
                        // `store.wagers_by_event` + `SportsEvent::status()`
                        // are enough to find the ungraded set; what's missing
                        // is the outcome to grade them with. Left as a no-op
                        // tick (cadence/cancellation wiring is real and ready)
                        // until a caller wires an external results feed in
                        // here via `bulk_settle_bets`.
                    }
                    _ = ctx.rx.changed() => {
                        if ctx.is_cancelled() { break; }
                    }
                }
            }
            info!("settlement sweeper stopped");
        })
    }

    #[instrument(skip(self, ctx))]
    fn spawn_metrics_rollup(self: Arc<Self>, mut ctx: CancellationContext) -> JoinHandle<()> {
        let period = Duration::from_millis(self.config.scheduler.metrics_rollup_ms);
        let jitter = startup_jitter(self.config.scheduler.jitter_seed, 3, self.config.scheduler.max_jitter_ms);
        tokio::spawn(async move {
            sleep(jitter).await;
            if ctx.is_cancelled() {
                info!("metrics rollup stopped before first tick");
                return;
            }
            let mut tick = interval(period);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if ctx.is_cancelled() { break; }
                        let txn = self.store.begin().await;
                        let queue_items = self.store.all_queue_items(txn).await;
                        let postings = self.store.all_postings(txn).await;
                        self.store.rollback(txn).await;
                        self.bus.publish(
                            EventType::DashboardUpdate,
                            Scope::default(),
                            json!({"queueDepth": queue_items.len(), "postingCount": postings.len()}),
                        );
                    }
                    _ = ctx.rx.changed() => {
                        if ctx.is_cancelled() { break; }
                    }
                }
            }
            info!("metrics rollup stopped");
        })
    }

    /// Closes the period ending at `now` for `agent_id` and enqueues a
    /// payout for the resulting calculation. Unlike the three interval-
    /// driven reconcilers above, the commission batcher runs on a period
    /// boundary rather than a fixed tick, so it is exposed as a plain
    /// method the caller invokes once `clock::period_containing` reports
    /// the boundary has passed, rather than as a spawned task.
    #[instrument(skip(self, structure, metrics))]
    pub async fn run_commission_batch(
        &self,
        agent_id: crate::models::AgentId,
        structure: &crate::models::CommissionStructure,
        revenue: i64,
        metrics: &[crate::commission_engine::PerformanceMetric],
        currency: &str,
    ) -> Result<crate::models::Payout, crate::commission_engine::CommissionEngineError> {
        let period = crate::clock::period_containing(structure.payout_schedule, Utc::now());
        let calc = self.commission.close_period(agent_id, structure, period.start, period.end, revenue, metrics).await;
        self.commission.enqueue_payout(&[calc], currency).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use crate::store::MemoryStore;

    fn harness() -> Arc<Scheduler> {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let config = Arc::new(Config::default());
        let ledger = Arc::new(Ledger::new(store.clone()));
        let bus = Arc::new(EventBus::new(config.bus.clone()));
        let queue = Arc::new(MatchingQueue::new(store.clone(), config.clone(), ledger.clone(), bus.clone()));
        let commission = Arc::new(CommissionEngine::new(store.clone(), config.clone(), ledger, bus.clone()));
        Arc::new(Scheduler::new(config, store, queue, commission, bus))
    }

    #[tokio::test]
    async fn reconcilers_stop_on_cancellation() {
        let scheduler = harness();
        let (token, handles) = scheduler.spawn_all();
        token.cancel();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        }
    }
}
