//! Notification dispatch abstraction (mechanics only).
//!
//! A [`Dispatcher`] is the seam between the order lifecycle core and
//! outward communication: the core guarantees it is invoked exactly once
//! per qualifying transition or reminder, and makes no assumptions about
//! what happens after that.
//!
//! Delivery past the dispatch call is **at-least-once**: a transport may
//! retry, so consumers must be idempotent. The dispatcher is for
//! distribution, not storage - the order's status history is the durable
//! record of what happened.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A subscription to a dispatched message stream.
///
/// Each subscription gets a copy of every message dispatched after it was
/// created (broadcast semantics). Subscriptions are designed for
/// single-threaded consumption; share one across threads with a channel or
/// mutex if needed.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Transport-agnostic notification dispatcher (pub/sub).
///
/// Implementations may fan out over in-memory channels, a message queue, a
/// mail spooler - the contract is only:
///
/// - `dispatch` hands one message to every live subscriber;
/// - failures are surfaced to the caller, which decides whether the loss
///   matters (the lifecycle core logs and continues: the transition is
///   already committed by the time it dispatches).
///
/// The trait requires `Send + Sync`; multiple threads may dispatch
/// concurrently.
pub trait Dispatcher<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn dispatch(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, D> Dispatcher<M> for Arc<D>
where
    D: Dispatcher<M> + ?Sized,
{
    type Error = D::Error;

    fn dispatch(&self, message: M) -> Result<(), Self::Error> {
        (**self).dispatch(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
