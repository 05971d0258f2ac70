//! Customer purchase reporting.
//!
//! Backend listings show each customer's lifetime spend, transaction count,
//! and most recent purchase. Only orders that produced (or will produce)
//! revenue count toward spend; carts never show up at all.

use chrono::{DateTime, Utc};
use serde::Serialize;

use storefront_core::CustomerId;
use storefront_orders::Status;

use crate::store::{OrderStore, OrderStoreError};

/// Statuses whose orders count toward a customer's spend.
pub const REVENUE_STATUSES: [Status; 4] = [
    Status::Paid,
    Status::Packing,
    Status::Shipped,
    Status::Delivered,
];

/// Aggregated purchase figures for one customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerSummary {
    pub customer_id: CustomerId,
    /// Sum of totals over revenue-status orders, smallest currency unit.
    pub spend: u64,
    /// Number of revenue-status orders.
    pub transactions: u64,
    /// Placement time of the newest non-cart order.
    pub last_transaction: Option<DateTime<Utc>>,
}

/// Compute the purchase summary for one customer.
pub fn customer_summary<S: OrderStore>(
    store: &S,
    customer_id: CustomerId,
) -> Result<CustomerSummary, OrderStoreError> {
    let orders = store.list_by_customer(customer_id)?;

    let mut spend: u64 = 0;
    let mut transactions: u64 = 0;
    let mut last_transaction: Option<DateTime<Utc>> = None;

    for order in &orders {
        if order.status() == Status::Cart {
            continue;
        }

        last_transaction = Some(match last_transaction {
            Some(current) => current.max(order.created_at()),
            None => order.created_at(),
        });

        if REVENUE_STATUSES.contains(&order.status()) {
            spend += order.total();
            transactions += 1;
        }
    }

    Ok(CustomerSummary {
        customer_id,
        spend,
        transactions,
        last_transaction,
    })
}
