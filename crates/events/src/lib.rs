//! `storefront-events` - lifecycle event & notification dispatch mechanics.
//!
//! Domain-agnostic plumbing: the [`Event`] contract plus a lightweight
//! pub/sub [`Dispatcher`] used to hand lifecycle events and reminders to
//! whatever performs outward communication (mail, webhooks, ...).

pub mod dispatch;
pub mod event;
pub mod in_memory;

pub use dispatch::{Dispatcher, Subscription};
pub use event::Event;
pub use in_memory::{InMemoryDispatchError, InMemoryDispatcher};
