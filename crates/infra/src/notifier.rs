//! Payment notifier bridge.
//!
//! External payment gateways report status changes in their own raw
//! vocabulary. The bridge normalizes each notification through the
//! configured [`GatewayStatusMap`] and forwards mapped ones to the status
//! engine; unmapped raw statuses are an explicit no-op, never an error.

use std::sync::Arc;

use tracing::debug;

use storefront_events::Dispatcher;
use storefront_orders::{GatewayStatusMap, Order, OrderEvent, PaymentNotification};

use crate::engine::{OrderStatusEngine, TransitionError};
use crate::store::OrderStore;

/// Bridges gateway notifications onto engine transitions.
pub struct PaymentNotifierBridge<S, D> {
    engine: Arc<OrderStatusEngine<S, D>>,
    statuses: GatewayStatusMap,
}

impl<S, D> PaymentNotifierBridge<S, D>
where
    S: OrderStore,
    D: Dispatcher<OrderEvent>,
{
    pub fn new(engine: Arc<OrderStatusEngine<S, D>>, statuses: GatewayStatusMap) -> Self {
        Self { engine, statuses }
    }

    /// Handle one gateway notification.
    ///
    /// Returns the updated order when a transition was applied, `None` when
    /// the notification was deliberately ignored: the raw status is
    /// unmapped, or the order already carries the mapped status (gateways
    /// redeliver).
    pub fn handle(
        &self,
        notification: &PaymentNotification,
    ) -> Result<Option<Order>, TransitionError> {
        let Some(target) = self.statuses.resolve(&notification.gateway_status) else {
            debug!(
                order_id = %notification.order_id,
                gateway_status = %notification.gateway_status,
                "unmapped gateway status ignored"
            );
            return Ok(None);
        };

        let order = self.engine.get(notification.order_id)?;
        if order.status() == target {
            debug!(
                order_id = %notification.order_id,
                status = %target,
                "gateway redelivery ignored"
            );
            return Ok(None);
        }

        self.engine
            .transition(notification.order_id, target, notification.comment.clone())
            .map(Some)
    }
}
