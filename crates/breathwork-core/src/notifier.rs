//! Single-threaded publish/subscribe fabric.
//!
//! A [`Notifier`] delivers each payload to every subscriber in registration
//! order. Calls to [`Notifier::notify`] made while a delivery pass is running
//! (typically from inside a subscriber) are queued and drained by the outer
//! pass once it finishes, so payloads are never delivered nested or out of
//! order. A subscriber returning an error is logged and skipped; the rest
//! still receive the payload.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

/// Error type subscribers may return.
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

type Callback<T> = Rc<RefCell<dyn FnMut(&T) -> Result<(), SubscriberError>>>;

/// Handle returned by [`Notifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct Notifier<T> {
    name: &'static str,
    subscribers: RefCell<Vec<(SubscriptionId, Callback<T>)>>,
    pending: RefCell<VecDeque<T>>,
    notifying: Cell<bool>,
    next_id: Cell<u64>,
}

/// Clears the `notifying` flag even if a subscriber panics.
struct PassGuard<'a>(&'a Cell<bool>);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<T> Notifier<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            subscribers: RefCell::new(Vec::new()),
            pending: RefCell::new(VecDeque::new()),
            notifying: Cell::new(false),
            next_id: Cell::new(0),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: FnMut(&T) -> Result<(), SubscriberError> + 'static,
    {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        let callback: Callback<T> = Rc::new(RefCell::new(callback));
        self.subscribers.borrow_mut().push((id, callback));
        tracing::trace!(notifier = self.name, subscription = id.0, "subscribed");
        id
    }

    /// Returns `false` if the id was not (or no longer) subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        before != subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    pub fn is_notifying(&self) -> bool {
        self.notifying.get()
    }

    /// Deliver `payload` to every subscriber.
    pub fn notify(&self, payload: T) {
        self.pending.borrow_mut().push_back(payload);
        if self.notifying.get() {
            tracing::trace!(notifier = self.name, "queued reentrant notification");
            return;
        }

        self.notifying.set(true);
        let _guard = PassGuard(&self.notifying);

        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some(payload) = next else {
                break;
            };
            self.deliver(&payload);
        }
    }

    fn deliver(&self, payload: &T) {
        // Snapshot so subscribers may (un)subscribe during the pass.
        let targets: Vec<(SubscriptionId, Callback<T>)> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(id, cb)| (*id, Rc::clone(cb)))
            .collect();

        for (id, callback) in targets {
            let Ok(mut callback) = callback.try_borrow_mut() else {
                tracing::warn!(
                    notifier = self.name,
                    subscription = id.0,
                    "subscriber busy, skipping delivery"
                );
                continue;
            };
            if let Err(err) = (&mut *callback)(payload) {
                tracing::warn!(
                    notifier = self.name,
                    subscription = id.0,
                    error = %err,
                    "subscriber failed"
                );
            }
        }
    }
}

impl<T> std::fmt::Debug for Notifier<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("name", &self.name)
            .field("subscribers", &self.subscriber_count())
            .field("notifying", &self.notifying.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_to_all_subscribers_in_order() {
        let notifier = Notifier::new("test");
        let seen = Rc::new(RefCell::new(Vec::new()));

        for tag in ["a", "b"] {
            let seen = Rc::clone(&seen);
            notifier.subscribe(move |n: &u32| {
                seen.borrow_mut().push(format!("{tag}{n}"));
                Ok(())
            });
        }

        notifier.notify(1);
        notifier.notify(2);
        assert_eq!(*seen.borrow(), vec!["a1", "b1", "a2", "b2"]);
    }

    #[test]
    fn reentrant_notify_is_queued_not_nested() {
        let notifier = Rc::new(Notifier::new("reentrant"));
        let log = Rc::new(RefCell::new(Vec::new()));

        {
            let weak = Rc::downgrade(&notifier);
            let log = Rc::clone(&log);
            notifier.subscribe(move |n: &u32| {
                log.borrow_mut().push(format!("first:{n}:start"));
                if *n == 1 {
                    if let Some(notifier) = weak.upgrade() {
                        notifier.notify(2);
                        notifier.notify(3);
                    }
                }
                log.borrow_mut().push(format!("first:{n}:end"));
                Ok(())
            });
        }
        {
            let log = Rc::clone(&log);
            notifier.subscribe(move |n: &u32| {
                log.borrow_mut().push(format!("second:{n}"));
                Ok(())
            });
        }

        notifier.notify(1);

        assert_eq!(
            *log.borrow(),
            vec![
                "first:1:start",
                "first:1:end",
                "second:1",
                "first:2:start",
                "first:2:end",
                "second:2",
                "first:3:start",
                "first:3:end",
                "second:3",
            ]
        );
        assert!(!notifier.is_notifying());
    }

    #[test]
    fn failing_subscriber_does_not_block_others() {
        let notifier = Notifier::new("isolation");
        let hits = Rc::new(Cell::new(0));

        notifier.subscribe(|_: &()| Err("boom".into()));
        {
            let hits = Rc::clone(&hits);
            notifier.subscribe(move |_: &()| {
                hits.set(hits.get() + 1);
                Ok(())
            });
        }

        notifier.notify(());
        notifier.notify(());
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let notifier = Notifier::new("unsub");
        let hits = Rc::new(Cell::new(0));
        let id = {
            let hits = Rc::clone(&hits);
            notifier.subscribe(move |_: &()| {
                hits.set(hits.get() + 1);
                Ok(())
            })
        };

        notifier.notify(());
        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
        notifier.notify(());

        assert_eq!(hits.get(), 1);
        assert_eq!(notifier.subscriber_count(), 0);
    }
}
