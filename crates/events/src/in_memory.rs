//! In-memory dispatcher for tests, dev, and single-process deployments.

use std::sync::{Mutex, mpsc};

use crate::dispatch::{Dispatcher, Subscription};

#[derive(Debug)]
pub enum InMemoryDispatchError {
    /// Dispatch failed due to internal lock poisoning.
    Poisoned,
}

/// In-memory pub/sub dispatcher.
///
/// - No IO / no async
/// - Best-effort fan-out
/// - At-least-once acceptable (subscribers must be idempotent)
#[derive(Debug)]
pub struct InMemoryDispatcher<M> {
    subscribers: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryDispatcher<M> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<M> Default for InMemoryDispatcher<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> Dispatcher<M> for InMemoryDispatcher<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryDispatchError;

    fn dispatch(&self, message: M) -> Result<(), Self::Error> {
        let mut subs = self
            .subscribers
            .lock()
            .map_err(|_| InMemoryDispatchError::Poisoned)?;

        // Drop any dead subscribers while dispatching.
        subs.retain(|tx| tx.send(message.clone()).is_ok());

        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();

        // If the lock is poisoned, we still return a subscription;
        // it just won't receive messages until the process restarts.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }

        Subscription::new(rx)
    }
}
