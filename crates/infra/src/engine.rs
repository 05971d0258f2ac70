//! Order status engine - the single authority allowed to change an
//! order's status.
//!
//! Both call sites (the payment notifier bridge and the lifecycle sweeps)
//! funnel through [`OrderStatusEngine::transition`], which validates the
//! target against the transition table, applies it through the store's
//! atomic compare-and-swap, and hands the lifecycle event to the
//! dispatcher exactly once per applied transition.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use storefront_core::{ExpectedVersion, OrderId};
use storefront_events::Dispatcher;
use storefront_orders::{Order, OrderEvent, Status};

use crate::clock::Clock;
use crate::store::{OrderStore, OrderStoreError};

/// Why a transition was not applied.
#[derive(Debug, Clone, Error)]
pub enum TransitionError {
    #[error("order not found: {0}")]
    NotFound(OrderId),

    /// The source/target pair is not in the allowed edge set. The order and
    /// its history are left untouched.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: Status, to: Status },

    /// Concurrent writers kept winning the compare-and-swap; the caller may
    /// retry later.
    #[error("concurrent modification on order {order_id}, gave up after {attempts} attempts")]
    Concurrency { order_id: OrderId, attempts: u32 },

    #[error("store error: {0}")]
    Store(String),
}

/// Validates and applies order status transitions.
pub struct OrderStatusEngine<S, D> {
    store: S,
    events: D,
    clock: Arc<dyn Clock>,
    max_retries: u32,
}

impl<S, D> OrderStatusEngine<S, D>
where
    S: OrderStore,
    D: Dispatcher<OrderEvent>,
{
    pub fn new(store: S, events: D, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            events,
            clock,
            max_retries: 3,
        }
    }

    /// How many times a transition re-reads and retries after losing the
    /// compare-and-swap before surfacing [`TransitionError::Concurrency`].
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read-only fetch, mapping a missing order to [`TransitionError::NotFound`].
    pub fn get(&self, order_id: OrderId) -> Result<Order, TransitionError> {
        self.store
            .get(order_id)
            .map_err(|e| TransitionError::Store(e.to_string()))?
            .ok_or(TransitionError::NotFound(order_id))
    }

    /// Apply `target` to the order, appending a history entry and emitting
    /// the lifecycle event.
    ///
    /// The status update and the history append are one atomic store
    /// operation; a concurrent writer on the same order makes the
    /// compare-and-swap fail, after which the engine re-reads and
    /// re-validates against the winner's state up to the retry budget.
    pub fn transition(
        &self,
        order_id: OrderId,
        target: Status,
        comment: Option<String>,
    ) -> Result<Order, TransitionError> {
        let mut attempts: u32 = 0;

        loop {
            let order = self.get(order_id)?;
            let from = order.status();

            if !from.can_transition_to(target) {
                return Err(TransitionError::InvalidTransition { from, to: target });
            }

            let now = self.clock.now();
            let applied = self.store.apply_transition(
                order_id,
                ExpectedVersion::Exact(order.version()),
                target,
                comment.clone(),
                now,
            );

            match applied {
                Ok(updated) => {
                    debug!(order_id = %order_id, from = %from, to = %target, "order status changed");

                    let event = OrderEvent::StatusChanged {
                        order_id,
                        customer_id: updated.customer_id(),
                        from,
                        to: target,
                        comment: comment.clone(),
                        occurred_at: now,
                    };
                    // The transition is already committed; a lost
                    // notification is logged, not unwound.
                    if let Err(err) = self.events.dispatch(event) {
                        warn!(order_id = %order_id, error = ?err, "status change dispatch failed");
                    }

                    return Ok(updated);
                }
                Err(OrderStoreError::Concurrency(reason)) => {
                    attempts += 1;
                    if attempts > self.max_retries {
                        warn!(
                            order_id = %order_id,
                            attempts,
                            reason = %reason,
                            "giving up after repeated concurrent modifications"
                        );
                        return Err(TransitionError::Concurrency { order_id, attempts });
                    }
                    // Re-read and re-validate against the winner's state.
                }
                Err(OrderStoreError::NotFound(id)) => {
                    return Err(TransitionError::NotFound(id));
                }
                Err(err) => return Err(TransitionError::Store(err.to_string())),
            }
        }
    }
}
