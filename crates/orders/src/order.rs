use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{CustomerId, OrderId};

use crate::status::Status;

/// One entry in an order's status history.
///
/// Entries are immutable once appended; the sequence is append-only and
/// owned exclusively by its order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: Status,
    /// Free-text comment attributed to the actor causing the change
    /// (system, gateway reference, operator note).
    pub comment: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// A customer's purchase record progressing through the status lifecycle.
///
/// Orders are never physically deleted; terminal statuses are retained for
/// reporting. The current status always equals the status of the most
/// recent history entry, and `version` grows by one per applied status -
/// stores use it for optimistic concurrency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    customer_id: CustomerId,
    status: Status,
    /// Total in smallest currency unit (e.g., cents).
    total: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
    history: Vec<StatusHistoryEntry>,
}

impl Order {
    /// A cart the customer has not submitted at checkout yet.
    pub fn cart(id: OrderId, customer_id: CustomerId, total: u64, now: DateTime<Utc>) -> Self {
        Self::with_initial_status(id, customer_id, total, Status::Cart, now)
    }

    /// A placed order awaiting payment.
    pub fn placed(id: OrderId, customer_id: CustomerId, total: u64, now: DateTime<Utc>) -> Self {
        Self::with_initial_status(id, customer_id, total, Status::Pending, now)
    }

    fn with_initial_status(
        id: OrderId,
        customer_id: CustomerId,
        total: u64,
        status: Status,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            customer_id,
            status,
            total,
            created_at: now,
            updated_at: now,
            version: 1,
            history: vec![StatusHistoryEntry {
                status,
                comment: None,
                occurred_at: now,
            }],
        }
    }

    /// Rehydrate an order from a persisted representation.
    ///
    /// Store implementations are responsible for passing a history whose
    /// last entry matches `status`.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: OrderId,
        customer_id: CustomerId,
        status: Status,
        total: u64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        version: u64,
        history: Vec<StatusHistoryEntry>,
    ) -> Self {
        Self {
            id,
            customer_id,
            status,
            total,
            created_at,
            updated_at,
            version,
            history,
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Monotonically increasing version; +1 per applied status.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn history(&self) -> &[StatusHistoryEntry] {
        &self.history
    }

    /// The most recent history entry. History is never empty: construction
    /// seeds it with the initial status.
    pub fn last_change(&self) -> &StatusHistoryEntry {
        self.history
            .last()
            .expect("order history is seeded at construction")
    }

    /// Record a status, appending the history entry and updating the
    /// status/updated-at/version triple in one step.
    ///
    /// Transition validation happens before this point (see the status
    /// engine); stores call this under their per-order exclusion so the
    /// pair of writes is never observable half-applied.
    pub fn apply_status(&mut self, status: Status, comment: Option<String>, now: DateTime<Utc>) {
        self.history.push(StatusHistoryEntry {
            status,
            comment,
            occurred_at: now,
        });
        self.status = status;
        self.updated_at = now;
        self.version += 1;
    }
}
