//! In-process sweep scheduler.
//!
//! Deployments with a real cron/timer can call the two sweep entry points
//! directly; this driver covers the single-process case with one named
//! background thread per cadence and a graceful shutdown handle.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::info;

use storefront_events::Dispatcher;
use storefront_orders::OrderEvent;

use crate::store::OrderStore;
use crate::sweeps::LifecycleSweeps;

/// Tick cadences for the two sweeps. The defaults match the production
/// schedule (reminders hourly, expiry every minute); tests shrink them.
#[derive(Debug, Clone, Copy)]
pub struct SweepIntervals {
    pub reminders: Duration,
    pub expiry: Duration,
}

impl Default for SweepIntervals {
    fn default() -> Self {
        Self {
            reminders: Duration::from_secs(60 * 60),
            expiry: Duration::from_secs(60),
        }
    }
}

/// Handle to control the running sweep threads.
#[derive(Debug)]
pub struct SweepSchedulerHandle {
    shutdown: Vec<mpsc::Sender<()>>,
    joins: Vec<thread::JoinHandle<()>>,
}

impl SweepSchedulerHandle {
    /// Request graceful shutdown and wait for both threads to stop.
    pub fn shutdown(mut self) {
        for tx in &self.shutdown {
            let _ = tx.send(());
        }
        for join in self.joins.drain(..) {
            let _ = join.join();
        }
    }
}

/// Spawns the two sweep loops.
pub struct SweepScheduler;

impl SweepScheduler {
    pub fn spawn<S, D>(
        sweeps: Arc<LifecycleSweeps<S, D>>,
        intervals: SweepIntervals,
    ) -> SweepSchedulerHandle
    where
        S: OrderStore + 'static,
        D: Dispatcher<OrderEvent> + 'static,
    {
        let mut shutdown = Vec::with_capacity(2);
        let mut joins = Vec::with_capacity(2);

        let (tx, rx) = mpsc::channel::<()>();
        let reminders = sweeps.clone();
        let join = thread::Builder::new()
            .name("lifecycle-reminders".to_string())
            .spawn(move || {
                sweep_loop("lifecycle-reminders", rx, intervals.reminders, || {
                    reminders.run_hourly()
                })
            })
            .expect("failed to spawn reminder sweep thread");
        shutdown.push(tx);
        joins.push(join);

        let (tx, rx) = mpsc::channel::<()>();
        let expiry = sweeps;
        let join = thread::Builder::new()
            .name("lifecycle-expiry".to_string())
            .spawn(move || {
                sweep_loop("lifecycle-expiry", rx, intervals.expiry, || {
                    expiry.run_minutely()
                })
            })
            .expect("failed to spawn expiry sweep thread");
        shutdown.push(tx);
        joins.push(join);

        SweepSchedulerHandle { shutdown, joins }
    }
}

fn sweep_loop(
    name: &'static str,
    shutdown_rx: mpsc::Receiver<()>,
    interval: Duration,
    tick: impl Fn(),
) {
    info!(sweep = name, "sweep scheduler started");

    loop {
        match shutdown_rx.recv_timeout(interval) {
            Err(mpsc::RecvTimeoutError::Timeout) => tick(),
            // Shutdown requested or the handle was dropped.
            _ => break,
        }
    }

    info!(sweep = name, "sweep scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, FixedClock};
    use crate::engine::OrderStatusEngine;
    use crate::store::InMemoryOrderStore;
    use crate::sweeps::SweepConfig;
    use chrono::Utc;
    use storefront_core::{CustomerId, OrderId};
    use storefront_events::InMemoryDispatcher;
    use storefront_orders::{Order, Status};

    #[test]
    fn spawned_scheduler_expires_stale_orders_and_shuts_down() {
        let store = InMemoryOrderStore::arc();
        let dispatcher = Arc::new(InMemoryDispatcher::new());
        let clock = Arc::new(FixedClock::at(Utc::now()));

        let order = Order::placed(
            OrderId::new(),
            CustomerId::new(),
            700,
            clock.now() - chrono::Duration::days(31),
        );
        let id = order.id();
        store.insert(order).unwrap();

        let engine = Arc::new(OrderStatusEngine::new(
            store.clone(),
            dispatcher.clone(),
            clock.clone(),
        ));
        let sweeps = Arc::new(LifecycleSweeps::new(
            store.clone(),
            engine,
            dispatcher,
            clock,
            SweepConfig::default(),
        ));

        let handle = SweepScheduler::spawn(
            sweeps,
            SweepIntervals {
                reminders: Duration::from_millis(10),
                expiry: Duration::from_millis(10),
            },
        );

        // Generous margin over the 10ms tick.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            if store.get(id).unwrap().unwrap().status() == Status::Expired {
                break;
            }
            assert!(
                std::time::Instant::now() < deadline,
                "expiry sweep never ran"
            );
            thread::sleep(Duration::from_millis(10));
        }

        handle.shutdown();
    }
}
