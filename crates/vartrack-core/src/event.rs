#![forbid(unsafe_code)]

//! Synchronous multicast event hub with RAII subscriptions.
//!
//! # Design
//!
//! [`EventHandler<E>`] keeps its listeners as weak references to boxed
//! callbacks. The strong side lives inside the [`Subscription`] handed back by
//! [`listen`](EventHandler::listen); dropping or disposing it makes the
//! callback unreachable.
//!
//! # Invariants
//!
//! 1. Listeners run in registration order, synchronously inside `publish`.
//! 2. A listener unsubscribed during a dispatch is not called later in that
//!    same dispatch (weak references are upgraded lazily, one at a time).
//! 3. A listener registered during a dispatch is first called on the next
//!    publish (the listener list is snapshotted before iterating).
//! 4. After [`dispose`](EventHandler::dispose), `publish` is a no-op and
//!    `listen` returns an inert subscription. Repeated disposal is a no-op.
//!
//! # Failure Modes
//!
//! - **Subscriber leak**: subscriptions stored forever keep their callbacks
//!   alive. Dead entries are pruned lazily at the next `publish`.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

type ListenerRc<E> = Rc<dyn Fn(&E)>;
type ListenerWeak<E> = Weak<dyn Fn(&E)>;

struct HandlerInner<E> {
    listeners: Vec<ListenerWeak<E>>,
    disposed: bool,
}

/// A synchronous publish/subscribe hub for events of type `E`.
///
/// Cloning an `EventHandler` creates another handle to the same listener
/// list.
pub struct EventHandler<E> {
    inner: Rc<RefCell<HandlerInner<E>>>,
}

impl<E> Clone for EventHandler<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E> fmt::Debug for EventHandler<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("EventHandler")
            .field("listener_count", &inner.listeners.len())
            .field("disposed", &inner.disposed)
            .finish()
    }
}

impl<E: 'static> Default for EventHandler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> EventHandler<E> {
    /// Create a handler with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(HandlerInner {
                listeners: Vec::new(),
                disposed: false,
            })),
        }
    }

    /// Register a listener. The listener stays active for as long as the
    /// returned [`Subscription`] is alive and not disposed.
    pub fn listen(&self, listener: impl Fn(&E) + 'static) -> Subscription {
        let mut inner = self.inner.borrow_mut();
        if inner.disposed {
            return Subscription::inert();
        }
        let strong: ListenerRc<E> = Rc::new(listener);
        inner.listeners.push(Rc::downgrade(&strong));
        Subscription {
            guard: Some(Box::new(strong)),
        }
    }

    /// Deliver `event` to every live listener, in registration order.
    pub fn publish(&self, event: &E) {
        let listeners: Vec<ListenerWeak<E>> = {
            let mut inner = self.inner.borrow_mut();
            if inner.disposed {
                return;
            }
            inner.listeners.retain(|w| w.strong_count() > 0);
            inner.listeners.clone()
        };

        for weak in &listeners {
            if let Some(listener) = weak.upgrade() {
                listener(event);
            }
        }
    }

    /// Drop every listener and refuse new ones.
    pub fn dispose(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.disposed = true;
        inner.listeners.clear();
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.borrow().disposed
    }

    /// Number of registered listeners, including dead ones not yet pruned.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }
}

/// RAII handle for a registered listener.
///
/// Dropping the subscription, or calling [`dispose`](Self::dispose), makes
/// the listener unreachable.
#[must_use = "dropping a Subscription immediately unsubscribes its listener"]
pub struct Subscription {
    guard: Option<Box<dyn std::any::Any>>,
}

impl Subscription {
    /// A subscription with no listener behind it.
    pub fn inert() -> Self {
        Self { guard: None }
    }

    /// Unsubscribe now. Calling this more than once is a no-op.
    pub fn dispose(&mut self) {
        self.guard = None;
    }

    /// Whether the listener has been released.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.guard.is_none()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn publish_reaches_listener() {
        let handler = EventHandler::<u32>::new();
        let seen = Rc::new(Cell::new(0));
        let seen_clone = Rc::clone(&seen);
        let _sub = handler.listen(move |v| seen_clone.set(*v));

        handler.publish(&7);
        assert_eq!(seen.get(), 7);
    }

    #[test]
    fn registration_order_is_dispatch_order() {
        let handler = EventHandler::<()>::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l1 = Rc::clone(&log);
        let _a = handler.listen(move |_| l1.borrow_mut().push('A'));
        let l2 = Rc::clone(&log);
        let _b = handler.listen(move |_| l2.borrow_mut().push('B'));
        let l3 = Rc::clone(&log);
        let _c = handler.listen(move |_| l3.borrow_mut().push('C'));

        handler.publish(&());
        assert_eq!(*log.borrow(), vec!['A', 'B', 'C']);
    }

    #[test]
    fn dropped_subscription_stops_delivery() {
        let handler = EventHandler::<()>::new();
        let count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&count);
        let sub = handler.listen(move |_| count_clone.set(count_clone.get() + 1));

        handler.publish(&());
        drop(sub);
        handler.publish(&());
        assert_eq!(count.get(), 1);
        // Pruned on the publish after the drop.
        assert_eq!(handler.listener_count(), 0);
    }

    #[test]
    fn explicit_dispose_is_idempotent() {
        let handler = EventHandler::<()>::new();
        let count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&count);
        let mut sub = handler.listen(move |_| count_clone.set(count_clone.get() + 1));

        sub.dispose();
        sub.dispose();
        assert!(sub.is_disposed());
        handler.publish(&());
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn unsubscribe_during_dispatch_skips_later_listener() {
        let handler = EventHandler::<()>::new();
        let second_calls = Rc::new(Cell::new(0u32));
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let slot_clone = Rc::clone(&slot);
        let _first = handler.listen(move |_| {
            if let Some(mut sub) = slot_clone.borrow_mut().take() {
                sub.dispose();
            }
        });
        let calls = Rc::clone(&second_calls);
        *slot.borrow_mut() = Some(handler.listen(move |_| calls.set(calls.get() + 1)));

        handler.publish(&());
        assert_eq!(second_calls.get(), 0);
    }

    #[test]
    fn listener_added_during_dispatch_waits_for_next_publish() {
        let handler = EventHandler::<()>::new();
        let late_calls = Rc::new(Cell::new(0u32));
        let keep: Rc<RefCell<Vec<Subscription>>> = Rc::new(RefCell::new(Vec::new()));

        let handler_clone = handler.clone();
        let calls = Rc::clone(&late_calls);
        let keep_clone = Rc::clone(&keep);
        let _adder = handler.listen(move |_| {
            if keep_clone.borrow().is_empty() {
                let calls = Rc::clone(&calls);
                let sub = handler_clone.listen(move |_| calls.set(calls.get() + 1));
                keep_clone.borrow_mut().push(sub);
            }
        });

        handler.publish(&());
        assert_eq!(late_calls.get(), 0);
        handler.publish(&());
        assert_eq!(late_calls.get(), 1);
    }

    #[test]
    fn disposed_handler_is_silent() {
        let handler = EventHandler::<()>::new();
        let count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&count);
        let _sub = handler.listen(move |_| count_clone.set(count_clone.get() + 1));

        handler.dispose();
        handler.dispose();
        handler.publish(&());
        assert_eq!(count.get(), 0);
        assert!(handler.is_disposed());

        let late = handler.listen(|_| {});
        assert!(late.is_disposed());
    }

    #[test]
    fn clone_shares_listeners() {
        let handler = EventHandler::<()>::new();
        let count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&count);
        let _sub = handler.listen(move |_| count_clone.set(count_clone.get() + 1));

        handler.clone().publish(&());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn debug_format() {
        let handler = EventHandler::<()>::new();
        let dbg = format!("{handler:?}");
        assert!(dbg.contains("EventHandler"));
        assert!(dbg.contains("listener_count"));
    }
}
