//! Payment gateway status vocabulary.
//!
//! Gateways report status changes in their own raw vocabulary; only a
//! configured subset maps onto the canonical order statuses. Anything
//! unmapped is deliberately ignored by the notifier bridge - a silent
//! no-op, not an error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use storefront_core::OrderId;

use crate::status::Status;

/// A status-change record delivered by the external payment notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentNotification {
    pub order_id: OrderId,
    /// The gateway's raw status vocabulary (e.g. "approved").
    pub gateway_status: String,
    pub comment: Option<String>,
}

/// Configured mapping from raw gateway statuses to canonical statuses.
///
/// The mapping is deployment configuration, not something the engine
/// infers. Lookups are case-insensitive on the raw string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayStatusMap {
    mappings: HashMap<String, Status>,
}

impl GatewayStatusMap {
    /// A map with no entries; every raw status resolves to `None`.
    pub fn empty() -> Self {
        Self {
            mappings: HashMap::new(),
        }
    }

    /// Add or replace a raw-status mapping.
    pub fn with_mapping(mut self, raw: impl Into<String>, status: Status) -> Self {
        self.mappings.insert(raw.into().to_lowercase(), status);
        self
    }

    /// Resolve a raw gateway status to a canonical status, if mapped.
    pub fn resolve(&self, raw: &str) -> Option<Status> {
        self.mappings.get(raw.trim().to_lowercase().as_str()).copied()
    }
}

impl Default for GatewayStatusMap {
    /// The mappings every known gateway shares: settled payments arrive as
    /// "approved" or "paid", voided ones as "void".
    fn default() -> Self {
        Self::empty()
            .with_mapping("approved", Status::Paid)
            .with_mapping("paid", Status::Paid)
            .with_mapping("void", Status::Void)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_map_normalizes_settled_payments() {
        let map = GatewayStatusMap::default();
        assert_eq!(map.resolve("approved"), Some(Status::Paid));
        assert_eq!(map.resolve("paid"), Some(Status::Paid));
        assert_eq!(map.resolve("void"), Some(Status::Void));
    }

    #[test]
    fn unmapped_raw_status_resolves_to_none() {
        let map = GatewayStatusMap::default();
        assert_eq!(map.resolve("refunded_partial"), None);
        assert_eq!(map.resolve(""), None);
    }

    #[test]
    fn resolution_is_case_insensitive() {
        let map = GatewayStatusMap::default();
        assert_eq!(map.resolve("Approved"), Some(Status::Paid));
        assert_eq!(map.resolve(" VOID "), Some(Status::Void));
    }

    #[test]
    fn deployments_can_extend_the_map() {
        let map = GatewayStatusMap::default().with_mapping("chargeback", Status::Refunded);
        assert_eq!(map.resolve("chargeback"), Some(Status::Refunded));
    }
}
