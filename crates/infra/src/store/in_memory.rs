use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use storefront_core::{CustomerId, ExpectedVersion, OrderId};
use storefront_orders::{Order, Status};

use super::r#trait::{OrderStore, OrderStoreError};

/// In-memory order store.
///
/// Intended for tests/dev. The write lock doubles as the per-order
/// exclusion for `apply_transition` (coarser than per-order, which is fine
/// at this scale). Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl OrderStore for InMemoryOrderStore {
    fn insert(&self, order: Order) -> Result<(), OrderStoreError> {
        let mut orders = self
            .orders
            .write()
            .map_err(|_| OrderStoreError::Storage("lock poisoned".to_string()))?;

        if orders.contains_key(&order.id()) {
            return Err(OrderStoreError::AlreadyExists(order.id()));
        }
        orders.insert(order.id(), order);
        Ok(())
    }

    fn get(&self, order_id: OrderId) -> Result<Option<Order>, OrderStoreError> {
        let orders = self
            .orders
            .read()
            .map_err(|_| OrderStoreError::Storage("lock poisoned".to_string()))?;

        Ok(orders.get(&order_id).cloned())
    }

    fn list_by_status_older_than(
        &self,
        status: Status,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, OrderStoreError> {
        let orders = self
            .orders
            .read()
            .map_err(|_| OrderStoreError::Storage("lock poisoned".to_string()))?;

        let mut result: Vec<_> = orders
            .values()
            .filter(|o| o.status() == status && o.updated_at() < cutoff)
            .cloned()
            .collect();

        result.sort_by_key(|o| o.updated_at());
        Ok(result)
    }

    fn list_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>, OrderStoreError> {
        let orders = self
            .orders
            .read()
            .map_err(|_| OrderStoreError::Storage("lock poisoned".to_string()))?;

        let mut result: Vec<_> = orders
            .values()
            .filter(|o| o.customer_id() == customer_id)
            .cloned()
            .collect();

        result.sort_by_key(|o| o.created_at());
        Ok(result)
    }

    fn apply_transition(
        &self,
        order_id: OrderId,
        expected: ExpectedVersion,
        to: Status,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderStoreError> {
        let mut orders = self
            .orders
            .write()
            .map_err(|_| OrderStoreError::Storage("lock poisoned".to_string()))?;

        let order = orders
            .get_mut(&order_id)
            .ok_or(OrderStoreError::NotFound(order_id))?;

        if !expected.matches(order.version()) {
            return Err(OrderStoreError::Concurrency(format!(
                "expected {expected:?}, found {}",
                order.version()
            )));
        }

        order.apply_status(to, comment, now);
        Ok(order.clone())
    }
}
