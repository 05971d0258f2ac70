use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use storefront_core::{CustomerId, ExpectedVersion, OrderId};
use storefront_orders::{Order, Status};

/// Order store operation error.
///
/// These are **infrastructure errors** (storage, concurrency) as opposed to
/// domain errors (transition rules live in the status engine).
#[derive(Debug, Clone, Error)]
pub enum OrderStoreError {
    #[error("order not found: {0}")]
    NotFound(OrderId),

    #[error("order already exists: {0}")]
    AlreadyExists(OrderId),

    /// Optimistic concurrency check failed - the caller saw a stale
    /// version and should re-read before retrying.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Persistence interface for orders and their status history.
///
/// ## Contract
///
/// - `apply_transition` must persist the status update and the appended
///   history entry **atomically**: a status change without its history
///   entry (or vice versa) must never be observable, even across a crash.
/// - `apply_transition` must serialize concurrent writers per order. The
///   `expected` version is the compare-and-swap token: a mismatch fails
///   with [`OrderStoreError::Concurrency`] and leaves the order untouched.
///   No cross-order coordination is required; orders are independent units
///   of concurrency.
/// - Transition *validation* is not the store's job - the status engine is
///   the single business caller of `apply_transition`.
/// - "Older than" queries measure age from the last status change
///   (`updated_at`): for carts that is last activity, for pending orders
///   it equals placement time.
pub trait OrderStore: Send + Sync {
    /// Persist a new order (with its seeded history). Rejects duplicates.
    fn insert(&self, order: Order) -> Result<(), OrderStoreError>;

    /// Fetch an order with its full status history.
    fn get(&self, order_id: OrderId) -> Result<Option<Order>, OrderStoreError>;

    /// All orders currently in `status` whose last status change happened
    /// before `cutoff`, oldest first.
    fn list_by_status_older_than(
        &self,
        status: Status,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, OrderStoreError>;

    /// All of a customer's orders, oldest first.
    fn list_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>, OrderStoreError>;

    /// Atomically append a history entry and update the order's
    /// status/updated-at/version, returning the updated order.
    fn apply_transition(
        &self,
        order_id: OrderId,
        expected: ExpectedVersion,
        to: Status,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderStoreError>;
}

impl<S> OrderStore for Arc<S>
where
    S: OrderStore + ?Sized,
{
    fn insert(&self, order: Order) -> Result<(), OrderStoreError> {
        (**self).insert(order)
    }

    fn get(&self, order_id: OrderId) -> Result<Option<Order>, OrderStoreError> {
        (**self).get(order_id)
    }

    fn list_by_status_older_than(
        &self,
        status: Status,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, OrderStoreError> {
        (**self).list_by_status_older_than(status, cutoff)
    }

    fn list_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>, OrderStoreError> {
        (**self).list_by_customer(customer_id)
    }

    fn apply_transition(
        &self,
        order_id: OrderId,
        expected: ExpectedVersion,
        to: Status,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderStoreError> {
        (**self).apply_transition(order_id, expected, to, comment, now)
    }
}
