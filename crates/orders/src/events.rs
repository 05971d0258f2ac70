use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{CustomerId, OrderId};
use storefront_events::Event;

use crate::status::Status;

/// Reminder categories issued by the lifecycle sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    /// Cart left unsubmitted past the configured threshold.
    AbandonedCart,
    /// Placed order still awaiting payment past the configured threshold.
    PaymentPending,
}

/// Lifecycle events handed to the notification dispatcher.
///
/// One `StatusChanged` per successful transition, one `ReminderIssued` per
/// qualifying reminder. Whatever mails, webhooks, or otherwise notifies the
/// outside world subscribes to these; the core never talks to customers
/// directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    StatusChanged {
        order_id: OrderId,
        customer_id: CustomerId,
        from: Status,
        to: Status,
        comment: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    ReminderIssued {
        order_id: OrderId,
        customer_id: CustomerId,
        kind: ReminderKind,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::StatusChanged { to, .. } => match to {
                Status::Cart => "orders.order.cart",
                Status::Pending => "orders.order.placed",
                Status::Paid => "orders.order.paid",
                Status::Packing => "orders.order.packing",
                Status::Shipped => "orders.order.shipped",
                Status::Delivered => "orders.order.delivered",
                Status::Cancelled => "orders.order.cancelled",
                Status::Void => "orders.order.voided",
                Status::Refunded => "orders.order.refunded",
                Status::Expired => "orders.order.expired",
            },
            OrderEvent::ReminderIssued { kind, .. } => match kind {
                ReminderKind::AbandonedCart => "orders.reminder.abandoned_cart",
                ReminderKind::PaymentPending => "orders.reminder.payment",
            },
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::StatusChanged { occurred_at, .. } => *occurred_at,
            OrderEvent::ReminderIssued { occurred_at, .. } => *occurred_at,
        }
    }
}
