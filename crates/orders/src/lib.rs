//! Orders domain module.
//!
//! This crate contains the business rules of the order lifecycle - the
//! status set and its transition table, the order record with its
//! append-only status history, the lifecycle events, and the payment
//! gateway status vocabulary - implemented purely as deterministic domain
//! logic (no IO, no HTTP, no storage).

pub mod events;
pub mod gateway;
pub mod order;
pub mod status;

pub use events::{OrderEvent, ReminderKind};
pub use gateway::{GatewayStatusMap, PaymentNotification};
pub use order::{Order, StatusHistoryEntry};
pub use status::Status;
