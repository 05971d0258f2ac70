//! Time-based order lifecycle sweeps.
//!
//! Two batch routines drive transitions and reminders without external
//! stimulus:
//!
//! - the **hourly** sweep reminds customers about abandoned carts and
//!   still-unpaid orders (no status change);
//! - the **per-minute** sweep expires pending orders past the expiry
//!   threshold through the status engine.
//!
//! Both are safe to re-trigger while a previous run is still in flight:
//! each order's current status is re-checked immediately before acting,
//! and an already-expired order simply has no `pending -> expired` edge
//! left. A failure on one order is logged and never aborts the remaining
//! batch.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use storefront_events::Dispatcher;
use storefront_orders::{OrderEvent, ReminderKind, Status};

use crate::clock::Clock;
use crate::engine::OrderStatusEngine;
use crate::store::OrderStore;

/// Age thresholds for the lifecycle sweeps.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// How long a cart may sit unsubmitted before the abandoned-cart
    /// reminder goes out.
    pub abandoned_cart_after: Duration,
    /// How long an order may await payment before the payment reminder
    /// goes out.
    pub payment_reminder_after: Duration,
    /// How long an order may await payment before it is auto-expired.
    pub expire_pending_after: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            abandoned_cart_after: Duration::from_secs(60 * 60 * 24),
            payment_reminder_after: Duration::from_secs(60 * 60 * 24),
            expire_pending_after: Duration::from_secs(60 * 60 * 24 * 30),
        }
    }
}

/// The two scheduled lifecycle routines.
///
/// Takes the store, engine, and clock as explicit constructor dependencies
/// and exposes no-argument entry points for whatever cron/timer driver the
/// deployment uses (see [`crate::scheduler`] for the in-process one).
pub struct LifecycleSweeps<S, D> {
    store: S,
    engine: Arc<OrderStatusEngine<S, D>>,
    events: D,
    clock: Arc<dyn Clock>,
    config: SweepConfig,
}

impl<S, D> LifecycleSweeps<S, D>
where
    S: OrderStore,
    D: Dispatcher<OrderEvent>,
{
    pub fn new(
        store: S,
        engine: Arc<OrderStatusEngine<S, D>>,
        events: D,
        clock: Arc<dyn Clock>,
        config: SweepConfig,
    ) -> Self {
        Self {
            store,
            engine,
            events,
            clock,
            config,
        }
    }

    /// Hourly entry point: abandoned-cart and payment reminders.
    pub fn run_hourly(&self) {
        let carts = self.remind_abandoned_carts();
        let payments = self.remind_waiting_payments();
        info!(carts, payments, "hourly reminder sweep finished");
    }

    /// Per-minute entry point: expire stale pending orders.
    pub fn run_minutely(&self) {
        let expired = self.expire_stale_orders();
        if expired > 0 {
            info!(expired, "expiry sweep finished");
        }
    }

    /// Remind customers about carts left unsubmitted past the threshold.
    /// Returns how many reminders went out.
    pub fn remind_abandoned_carts(&self) -> usize {
        self.remind(
            Status::Cart,
            self.config.abandoned_cart_after,
            ReminderKind::AbandonedCart,
        )
    }

    /// Remind customers about orders still awaiting payment past the
    /// threshold. Returns how many reminders went out.
    pub fn remind_waiting_payments(&self) -> usize {
        self.remind(
            Status::Pending,
            self.config.payment_reminder_after,
            ReminderKind::PaymentPending,
        )
    }

    fn remind(&self, status: Status, after: Duration, kind: ReminderKind) -> usize {
        let now = self.clock.now();
        let cutoff = now - chrono::Duration::from_std(after).unwrap_or_default();

        let stale = match self.store.list_by_status_older_than(status, cutoff) {
            Ok(orders) => orders,
            Err(err) => {
                warn!(status = %status, error = %err, "reminder scan failed");
                return 0;
            }
        };

        let mut notified = 0;
        for order in stale {
            // Re-check right before acting: a concurrent transition may
            // have moved the order since the scan.
            match self.store.get(order.id()) {
                Ok(Some(current)) if current.status() == status => {
                    let event = OrderEvent::ReminderIssued {
                        order_id: current.id(),
                        customer_id: current.customer_id(),
                        kind,
                        occurred_at: now,
                    };
                    match self.events.dispatch(event) {
                        Ok(()) => notified += 1,
                        Err(err) => {
                            warn!(order_id = %current.id(), error = ?err, "reminder dispatch failed");
                        }
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(order_id = %order.id(), error = %err, "reminder re-check failed");
                }
            }
        }
        notified
    }

    /// Expire pending orders older than the expiry threshold. Returns how
    /// many orders were expired.
    pub fn expire_stale_orders(&self) -> usize {
        let now = self.clock.now();
        let cutoff =
            now - chrono::Duration::from_std(self.config.expire_pending_after).unwrap_or_default();

        let stale = match self.store.list_by_status_older_than(Status::Pending, cutoff) {
            Ok(orders) => orders,
            Err(err) => {
                warn!(error = %err, "expiry scan failed");
                return 0;
            }
        };

        let mut expired = 0;
        for order in stale {
            match self
                .engine
                .transition(order.id(), Status::Expired, Some("auto-expired".to_string()))
            {
                Ok(_) => expired += 1,
                // The order moved on (paid, cancelled, already expired)
                // between the scan and the transition. Skip it; the batch
                // continues.
                Err(err) => {
                    warn!(order_id = %order.id(), error = %err, "expiry skipped");
                }
            }
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::{InMemoryOrderStore, OrderStoreError};
    use chrono::{DateTime, Utc};
    use storefront_core::{CustomerId, ExpectedVersion, OrderId};
    use storefront_events::{InMemoryDispatcher, Subscription};
    use storefront_orders::Order;

    type TestSweeps = LifecycleSweeps<Arc<InMemoryOrderStore>, Arc<InMemoryDispatcher<OrderEvent>>>;

    fn setup(config: SweepConfig) -> (
        Arc<InMemoryOrderStore>,
        Arc<FixedClock>,
        Subscription<OrderEvent>,
        TestSweeps,
    ) {
        let store = InMemoryOrderStore::arc();
        let dispatcher = Arc::new(InMemoryDispatcher::new());
        let clock = Arc::new(FixedClock::at(Utc::now()));
        let engine = Arc::new(OrderStatusEngine::new(
            store.clone(),
            dispatcher.clone(),
            clock.clone(),
        ));
        let sub = dispatcher.subscribe();
        let sweeps = LifecycleSweeps::new(store.clone(), engine, dispatcher, clock.clone(), config);
        (store, clock, sub, sweeps)
    }

    fn days(n: i64) -> chrono::Duration {
        chrono::Duration::days(n)
    }

    fn seed_pending(store: &InMemoryOrderStore, at: DateTime<Utc>) -> OrderId {
        let order = Order::placed(OrderId::new(), CustomerId::new(), 1200, at);
        let id = order.id();
        store.insert(order).unwrap();
        id
    }

    fn seed_cart(store: &InMemoryOrderStore, at: DateTime<Utc>) -> OrderId {
        let order = Order::cart(OrderId::new(), CustomerId::new(), 300, at);
        let id = order.id();
        store.insert(order).unwrap();
        id
    }

    #[test]
    fn pending_order_past_threshold_is_expired_with_comment() {
        let (store, clock, _sub, sweeps) = setup(SweepConfig::default());
        let id = seed_pending(&store, clock.now() - days(31));

        assert_eq!(sweeps.expire_stale_orders(), 1);

        let order = store.get(id).unwrap().unwrap();
        assert_eq!(order.status(), Status::Expired);
        assert_eq!(order.history().len(), 2);
        assert_eq!(order.last_change().comment.as_deref(), Some("auto-expired"));
    }

    #[test]
    fn fresh_pending_order_is_left_alone() {
        let (store, clock, _sub, sweeps) = setup(SweepConfig::default());
        let id = seed_pending(&store, clock.now() - days(29));

        assert_eq!(sweeps.expire_stale_orders(), 0);
        assert_eq!(store.get(id).unwrap().unwrap().status(), Status::Pending);
    }

    #[test]
    fn expiry_sweep_is_idempotent() {
        let (store, clock, sub, sweeps) = setup(SweepConfig::default());
        let id = seed_pending(&store, clock.now() - days(31));

        assert_eq!(sweeps.expire_stale_orders(), 1);
        assert_eq!(sweeps.expire_stale_orders(), 0);

        let order = store.get(id).unwrap().unwrap();
        assert_eq!(order.history().len(), 2, "expired at most once");

        // Exactly one expiry event across both runs.
        assert!(matches!(
            sub.try_recv().unwrap(),
            OrderEvent::StatusChanged { to: Status::Expired, .. }
        ));
        assert!(sub.try_recv().is_err());
    }

    #[test]
    fn one_failing_order_does_not_abort_the_batch() {
        struct FlakyStore {
            inner: Arc<InMemoryOrderStore>,
            poisoned: OrderId,
        }

        impl OrderStore for FlakyStore {
            fn insert(&self, order: Order) -> Result<(), OrderStoreError> {
                self.inner.insert(order)
            }

            fn get(&self, order_id: OrderId) -> Result<Option<Order>, OrderStoreError> {
                self.inner.get(order_id)
            }

            fn list_by_status_older_than(
                &self,
                status: Status,
                cutoff: DateTime<Utc>,
            ) -> Result<Vec<Order>, OrderStoreError> {
                self.inner.list_by_status_older_than(status, cutoff)
            }

            fn list_by_customer(
                &self,
                customer_id: CustomerId,
            ) -> Result<Vec<Order>, OrderStoreError> {
                self.inner.list_by_customer(customer_id)
            }

            fn apply_transition(
                &self,
                order_id: OrderId,
                expected: ExpectedVersion,
                to: Status,
                comment: Option<String>,
                now: DateTime<Utc>,
            ) -> Result<Order, OrderStoreError> {
                if order_id == self.poisoned {
                    return Err(OrderStoreError::Storage("disk on fire".to_string()));
                }
                self.inner.apply_transition(order_id, expected, to, comment, now)
            }
        }

        let inner = InMemoryOrderStore::arc();
        let dispatcher = Arc::new(InMemoryDispatcher::new());
        let clock = Arc::new(FixedClock::at(Utc::now()));

        let poisoned = seed_pending(&inner, clock.now() - days(40));
        let healthy = seed_pending(&inner, clock.now() - days(35));

        let store = Arc::new(FlakyStore {
            inner: inner.clone(),
            poisoned,
        });
        let engine = Arc::new(OrderStatusEngine::new(
            store.clone(),
            dispatcher.clone(),
            clock.clone(),
        ));
        let sweeps = LifecycleSweeps::new(
            store,
            engine,
            dispatcher,
            clock,
            SweepConfig::default(),
        );

        // The poisoned order fails, the healthy one still expires.
        assert_eq!(sweeps.expire_stale_orders(), 1);
        assert_eq!(inner.get(healthy).unwrap().unwrap().status(), Status::Expired);
        assert_eq!(inner.get(poisoned).unwrap().unwrap().status(), Status::Pending);
    }

    #[test]
    fn abandoned_carts_get_reminded_without_status_change() {
        let (store, clock, sub, sweeps) = setup(SweepConfig::default());
        let stale = seed_cart(&store, clock.now() - days(2));
        let _fresh = seed_cart(&store, clock.now());

        assert_eq!(sweeps.remind_abandoned_carts(), 1);

        let order = store.get(stale).unwrap().unwrap();
        assert_eq!(order.status(), Status::Cart);
        assert_eq!(order.history().len(), 1, "reminders never touch history");

        match sub.try_recv().unwrap() {
            OrderEvent::ReminderIssued { order_id, kind, .. } => {
                assert_eq!(order_id, stale);
                assert_eq!(kind, ReminderKind::AbandonedCart);
            }
            other => panic!("expected ReminderIssued, got {other:?}"),
        }
        assert!(sub.try_recv().is_err());
    }

    #[test]
    fn waiting_payments_get_reminded() {
        let (store, clock, sub, sweeps) = setup(SweepConfig::default());
        let id = seed_pending(&store, clock.now() - days(2));

        assert_eq!(sweeps.remind_waiting_payments(), 1);

        match sub.try_recv().unwrap() {
            OrderEvent::ReminderIssued { order_id, kind, .. } => {
                assert_eq!(order_id, id);
                assert_eq!(kind, ReminderKind::PaymentPending);
            }
            other => panic!("expected ReminderIssued, got {other:?}"),
        }
    }

    #[test]
    fn hourly_entry_point_covers_both_reminder_kinds() {
        let (store, clock, sub, sweeps) = setup(SweepConfig::default());
        seed_cart(&store, clock.now() - days(2));
        seed_pending(&store, clock.now() - days(2));

        sweeps.run_hourly();

        let kinds: Vec<_> = std::iter::from_fn(|| sub.try_recv().ok())
            .map(|event| match event {
                OrderEvent::ReminderIssued { kind, .. } => kind,
                other => panic!("expected ReminderIssued, got {other:?}"),
            })
            .collect();
        assert_eq!(kinds, vec![ReminderKind::AbandonedCart, ReminderKind::PaymentPending]);
    }
}
