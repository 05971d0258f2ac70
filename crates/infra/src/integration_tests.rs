//! Integration tests for the full order lifecycle pipeline.
//!
//! Tests: store -> engine -> dispatcher -> sweeps/bridge
//!
//! Verifies:
//! - the status/history-head invariant across a full fulfillment run
//! - per-order serialization under concurrent transition attempts
//! - sweep idempotence and gateway normalization end to end

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use chrono::Utc;

    use storefront_core::{CustomerId, OrderId};
    use storefront_events::{Dispatcher, Event, InMemoryDispatcher, Subscription};
    use storefront_orders::{
        GatewayStatusMap, Order, OrderEvent, PaymentNotification, Status,
    };

    use crate::clock::{Clock, FixedClock};
    use crate::engine::{OrderStatusEngine, TransitionError};
    use crate::notifier::PaymentNotifierBridge;
    use crate::store::{InMemoryOrderStore, OrderStore};
    use crate::sweeps::{LifecycleSweeps, SweepConfig};

    type TestEngine =
        OrderStatusEngine<Arc<InMemoryOrderStore>, Arc<InMemoryDispatcher<OrderEvent>>>;

    struct Pipeline {
        store: Arc<InMemoryOrderStore>,
        clock: Arc<FixedClock>,
        engine: Arc<TestEngine>,
        bridge: PaymentNotifierBridge<Arc<InMemoryOrderStore>, Arc<InMemoryDispatcher<OrderEvent>>>,
        sweeps: LifecycleSweeps<Arc<InMemoryOrderStore>, Arc<InMemoryDispatcher<OrderEvent>>>,
        sub: Subscription<OrderEvent>,
    }

    fn pipeline() -> Pipeline {
        storefront_observability::init();

        let store = InMemoryOrderStore::arc();
        let dispatcher = Arc::new(InMemoryDispatcher::new());
        let clock = Arc::new(FixedClock::at(Utc::now()));
        let engine = Arc::new(OrderStatusEngine::new(
            store.clone(),
            dispatcher.clone(),
            clock.clone(),
        ));
        let bridge = PaymentNotifierBridge::new(engine.clone(), GatewayStatusMap::default());
        let sub = dispatcher.subscribe();
        let sweeps = LifecycleSweeps::new(
            store.clone(),
            engine.clone(),
            dispatcher,
            clock.clone(),
            SweepConfig::default(),
        );

        Pipeline {
            store,
            clock,
            engine,
            bridge,
            sweeps,
            sub,
        }
    }

    fn drain_types(sub: &Subscription<OrderEvent>) -> Vec<&'static str> {
        std::iter::from_fn(|| sub.try_recv().ok())
            .map(|event| event.event_type())
            .collect()
    }

    #[test]
    fn full_fulfillment_run_keeps_the_invariant_and_emits_in_order() -> anyhow::Result<()> {
        let p = pipeline();
        let customer = CustomerId::new();
        let cart = Order::cart(OrderId::new(), customer, 4200, p.clock.now());
        let id = cart.id();
        p.store.insert(cart)?;

        p.engine.transition(id, Status::Pending, None)?;
        p.bridge.handle(&PaymentNotification {
            order_id: id,
            gateway_status: "approved".to_string(),
            comment: Some("gw-ref-123".to_string()),
        })?;
        p.engine.transition(id, Status::Packing, None)?;
        p.engine.transition(id, Status::Shipped, Some("tracking 42".to_string()))?;
        p.engine.transition(id, Status::Delivered, None)?;

        let order = p.store.get(id)?.expect("order exists");
        assert_eq!(order.status(), Status::Delivered);
        assert_eq!(order.status(), order.last_change().status);
        assert_eq!(order.version(), 6);
        assert_eq!(order.history().len(), 6);

        let statuses: Vec<_> = order.history().iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![
                Status::Cart,
                Status::Pending,
                Status::Paid,
                Status::Packing,
                Status::Shipped,
                Status::Delivered
            ]
        );

        assert_eq!(
            drain_types(&p.sub),
            vec![
                "orders.order.placed",
                "orders.order.paid",
                "orders.order.packing",
                "orders.order.shipped",
                "orders.order.delivered"
            ]
        );
        Ok(())
    }

    #[test]
    fn gateway_notification_normalizes_and_appends_history() -> anyhow::Result<()> {
        let p = pipeline();
        let order = Order::placed(OrderId::new(), CustomerId::new(), 2000, p.clock.now());
        let id = order.id();
        p.store.insert(order)?;

        let updated = p
            .bridge
            .handle(&PaymentNotification {
                order_id: id,
                gateway_status: "approved".to_string(),
                comment: Some("gw-ref-123".to_string()),
            })?
            .expect("transition applied");

        assert_eq!(updated.status(), Status::Paid);
        assert_eq!(updated.last_change().status, Status::Paid);
        assert_eq!(updated.last_change().comment.as_deref(), Some("gw-ref-123"));
        Ok(())
    }

    #[test]
    fn delivered_order_rejects_a_pending_rollback() -> anyhow::Result<()> {
        let p = pipeline();
        let mut order = Order::placed(OrderId::new(), CustomerId::new(), 100, p.clock.now());
        for status in [Status::Paid, Status::Packing, Status::Shipped, Status::Delivered] {
            order.apply_status(status, None, p.clock.now());
        }
        let id = order.id();
        let before = order.clone();
        p.store.insert(order)?;

        let err = p.engine.transition(id, Status::Pending, None).unwrap_err();
        assert!(matches!(err, TransitionError::InvalidTransition { .. }));

        assert_eq!(p.store.get(id)?.expect("order exists"), before);
        Ok(())
    }

    #[test]
    fn expiry_sweep_expires_month_old_pending_orders_once() -> anyhow::Result<()> {
        let p = pipeline();
        let order = Order::placed(
            OrderId::new(),
            CustomerId::new(),
            3000,
            p.clock.now() - chrono::Duration::days(31),
        );
        let id = order.id();
        p.store.insert(order)?;

        p.sweeps.run_minutely();
        p.sweeps.run_minutely();

        let order = p.store.get(id)?.expect("order exists");
        assert_eq!(order.status(), Status::Expired);
        assert_eq!(order.history().len(), 2);
        assert_eq!(order.last_change().comment.as_deref(), Some("auto-expired"));

        assert_eq!(drain_types(&p.sub), vec!["orders.order.expired"]);
        Ok(())
    }

    #[test]
    fn concurrent_transitions_serialize_per_order() {
        let p = pipeline();
        let order = Order::placed(OrderId::new(), CustomerId::new(), 5000, p.clock.now());
        let id = order.id();
        p.store.insert(order).unwrap();

        // Paid and Expired are both reachable from Pending but not from
        // each other, so exactly one attempt can win.
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [Status::Paid, Status::Expired]
            .into_iter()
            .map(|target| {
                let engine = p.engine.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    engine.transition(id, target, None)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        for result in &results {
            if let Err(err) = result {
                assert!(matches!(
                    err,
                    TransitionError::InvalidTransition { .. }
                        | TransitionError::Concurrency { .. }
                ));
            }
        }

        let order = p.store.get(id).unwrap().unwrap();
        assert_eq!(order.version(), 2);
        assert_eq!(order.history().len(), 2);
        assert_eq!(order.status(), order.last_change().status);
    }

    #[test]
    fn reminders_and_expiry_compose_over_one_data_set() -> anyhow::Result<()> {
        let p = pipeline();
        let now = p.clock.now();

        let abandoned = Order::cart(OrderId::new(), CustomerId::new(), 100, now - chrono::Duration::days(2));
        let unpaid = Order::placed(OrderId::new(), CustomerId::new(), 200, now - chrono::Duration::days(2));
        let ancient = Order::placed(OrderId::new(), CustomerId::new(), 300, now - chrono::Duration::days(45));
        let fresh = Order::placed(OrderId::new(), CustomerId::new(), 400, now);

        let ancient_id = ancient.id();
        let fresh_id = fresh.id();
        for order in [abandoned, unpaid, ancient, fresh] {
            p.store.insert(order)?;
        }

        // Expiry first: the 45-day order expires, so the hourly pass only
        // reminds the 2-day pending order.
        assert_eq!(p.sweeps.expire_stale_orders(), 1);
        assert_eq!(p.sweeps.remind_abandoned_carts(), 1);
        assert_eq!(p.sweeps.remind_waiting_payments(), 1);

        assert_eq!(p.store.get(ancient_id)?.expect("order exists").status(), Status::Expired);
        assert_eq!(p.store.get(fresh_id)?.expect("order exists").status(), Status::Pending);

        assert_eq!(
            drain_types(&p.sub),
            vec![
                "orders.order.expired",
                "orders.reminder.abandoned_cart",
                "orders.reminder.payment"
            ]
        );
        Ok(())
    }
}
