use core::str::FromStr;
use serde::{Deserialize, Serialize};

use storefront_core::DomainError;

/// Order status lifecycle.
///
/// `Cart` is an order that has not been submitted at checkout yet; every
/// other status describes a placed order. Terminal statuses keep the order
/// around for reporting but admit no further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Cart,
    Pending,
    Paid,
    Packing,
    Shipped,
    Delivered,
    Cancelled,
    Void,
    Refunded,
    Expired,
}

impl Status {
    /// Every status, in lifecycle order.
    pub const ALL: [Status; 10] = [
        Status::Cart,
        Status::Pending,
        Status::Paid,
        Status::Packing,
        Status::Shipped,
        Status::Delivered,
        Status::Cancelled,
        Status::Void,
        Status::Refunded,
        Status::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Cart => "cart",
            Status::Pending => "pending",
            Status::Paid => "paid",
            Status::Packing => "packing",
            Status::Shipped => "shipped",
            Status::Delivered => "delivered",
            Status::Cancelled => "cancelled",
            Status::Void => "void",
            Status::Refunded => "refunded",
            Status::Expired => "expired",
        }
    }

    /// Terminal statuses have no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Delivered
                | Status::Cancelled
                | Status::Void
                | Status::Refunded
                | Status::Expired
        )
    }

    /// Whether `self -> target` is in the declared transition table.
    ///
    /// The fulfillment spine is cart -> pending -> paid -> packing ->
    /// shipped -> delivered; any non-terminal order can be cancelled or
    /// voided; unpaid orders expire; paid-for orders can be refunded until
    /// delivery completes the lifecycle.
    pub fn can_transition_to(self, target: Status) -> bool {
        if self.is_terminal() {
            return false;
        }

        match (self, target) {
            (_, Status::Cancelled) | (_, Status::Void) => true,
            (Status::Cart, Status::Pending) => true,
            (Status::Pending, Status::Paid) | (Status::Pending, Status::Expired) => true,
            (Status::Paid, Status::Packing) | (Status::Paid, Status::Refunded) => true,
            (Status::Packing, Status::Shipped) | (Status::Packing, Status::Refunded) => true,
            (Status::Shipped, Status::Delivered) | (Status::Shipped, Status::Refunded) => true,
            _ => false,
        }
    }
}

impl core::fmt::Display for Status {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cart" => Ok(Status::Cart),
            "pending" => Ok(Status::Pending),
            "paid" => Ok(Status::Paid),
            "packing" => Ok(Status::Packing),
            "shipped" => Ok(Status::Shipped),
            "delivered" => Ok(Status::Delivered),
            "cancelled" => Ok(Status::Cancelled),
            "void" => Ok(Status::Void),
            "refunded" => Ok(Status::Refunded),
            "expired" => Ok(Status::Expired),
            other => Err(DomainError::validation(format!(
                "unknown status code: {other}"
            ))),
        }
    }
}
