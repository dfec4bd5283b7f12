use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::warn;

use crate::i18n::LanguageCode;

/// Published whenever the confirmed language changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageChanged {
    pub code: LanguageCode,
    pub previous: LanguageCode,
}

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Subscribers<E> {
    next_id: u64,
    entries: Vec<(u64, Callback<E>)>,
}

/// A cloneable handle to a shared subscriber list.
///
/// Delivery is synchronous and unbuffered: [`EventBus::publish`] calls every
/// current subscriber, in subscription order, before returning. A panicking
/// subscriber is logged and skipped.
pub struct EventBus<E> {
    inner: Arc<Mutex<Subscribers<E>>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Subscribers {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, Subscribers<E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `callback` for every future event.
    pub fn subscribe<F>(&self, callback: F) -> Subscription<E>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut subscribers = self.subscribers();
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        subscribers.entries.push((id, Arc::new(callback)));

        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `event` to every current subscriber.
    ///
    /// Subscribers run outside the bus lock, so they may subscribe, unsubscribe
    /// or publish themselves. Returns how many subscribers completed normally.
    pub fn publish(&self, event: &E) -> usize {
        let snapshot: Vec<(u64, Callback<E>)> = self.subscribers().entries.clone();

        let mut delivered = 0;
        for (id, callback) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!("Subscriber {} panicked while handling an event", id),
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().entries.len()
    }
}

/// Handle returned by [`EventBus::subscribe`].
///
/// Dropping the handle keeps the subscription alive; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription<E> {
    id: u64,
    bus: Weak<Mutex<Subscribers<E>>>,
}

impl<E> Subscription<E> {
    /// Remove the subscriber. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(bus) = self.bus.upgrade() else {
            return false;
        };
        let mut subscribers = bus.lock().unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.entries.len();
        subscribers.entries.retain(|(id, _)| *id != self.id);
        subscribers.entries.len() != before
    }
}
