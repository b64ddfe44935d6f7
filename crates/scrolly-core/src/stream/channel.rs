//! Typed multi-subscriber push channel with optional replay of the latest
//! value, and the cancellation handles it hands out.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::warn;

type Handler<T> = Rc<RefCell<Box<dyn FnMut(&T)>>>;

struct Inner<T> {
    listeners: RefCell<Vec<(u64, Handler<T>)>>,
    next_id: Cell<u64>,
    replay: bool,
    latest: RefCell<Option<T>>,
    /// Upstream subscriptions feeding a derived channel
    upstream: RefCell<Vec<Subscription>>,
}

impl<T> Inner<T> {
    fn remove(&self, id: u64) {
        self.listeners.borrow_mut().retain(|(lid, _)| *lid != id);
    }

    fn is_live(&self, id: u64) -> bool {
        self.listeners.borrow().iter().any(|(lid, _)| *lid == id)
    }
}

/// Push channel. Cloning yields another handle to the same channel.
pub struct Channel<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Non-owning reference to a channel, used by derived channels so that the
/// upstream closure does not keep the downstream alive.
pub struct WeakChannel<T> {
    inner: Weak<Inner<T>>,
}

impl<T> WeakChannel<T> {
    pub fn upgrade(&self) -> Option<Channel<T>> {
        self.inner.upgrade().map(|inner| Channel { inner })
    }
}

impl<T> Clone for WeakChannel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Channel<T> {
    fn build(replay: bool, latest: Option<T>) -> Self {
        Self {
            inner: Rc::new(Inner {
                listeners: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
                replay,
                latest: RefCell::new(latest),
                upstream: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Channel without replay: subscribers only see values published later
    pub fn new() -> Self {
        Self::build(false, None)
    }

    /// Channel that replays its latest value to every new subscriber
    pub fn replay() -> Self {
        Self::build(true, None)
    }

    /// Replaying channel seeded with an initial value
    pub fn with_value(value: T) -> Self {
        Self::build(true, Some(value))
    }

    pub fn is_replay(&self) -> bool {
        self.inner.replay
    }

    /// Latest published value (replaying channels only)
    pub fn latest(&self) -> Option<T> {
        self.inner.latest.borrow().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    pub fn downgrade(&self) -> WeakChannel<T> {
        WeakChannel {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Attach a handler. Replaying channels deliver the latest value
    /// immediately.
    pub fn subscribe(&self, handler: impl FnMut(&T) + 'static) -> Subscription {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);

        let handler: Handler<T> = Rc::new(RefCell::new(Box::new(handler)));
        self.inner
            .listeners
            .borrow_mut()
            .push((id, Rc::clone(&handler)));

        if self.inner.replay {
            let latest = self.inner.latest.borrow().clone();
            if let Some(value) = latest {
                (handler.borrow_mut())(&value);
            }
        }

        // The handle keeps the channel alive so intermediate operators in a
        // chain survive for as long as someone listens downstream
        let inner = Rc::clone(&self.inner);
        Subscription::new(move || inner.remove(id))
    }

    /// Push a value to every current subscriber, in subscription order
    pub fn publish(&self, value: T) {
        if self.inner.replay {
            *self.inner.latest.borrow_mut() = Some(value.clone());
        }

        let snapshot: Vec<(u64, Handler<T>)> = self.inner.listeners.borrow().clone();
        for (id, handler) in snapshot {
            // An earlier handler may have unsubscribed this one
            if !self.inner.is_live(id) {
                continue;
            }
            match handler.try_borrow_mut() {
                Ok(mut f) => f(&value),
                Err(_) => warn!(listener = id, "Re-entrant publish skipped for active listener"),
            }
        }
    }

    /// Keep an upstream subscription alive for as long as this channel lives
    pub(crate) fn hold(&self, subscription: Subscription) {
        self.inner.upstream.borrow_mut().push(subscription);
    }
}

impl<T: Clone + 'static> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellation handle returned by every `subscribe`.
///
/// Dropping the handle detaches the handler, so a component that stores the
/// handles it creates during activation and drops them on deactivation
/// cannot leak listeners.
#[must_use = "dropping a Subscription immediately detaches its handler"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Handle that owns nothing
    pub fn empty() -> Self {
        Self { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Bag of handles released together
#[derive(Debug, Default)]
#[must_use = "dropping Subscriptions detaches every handler it holds"]
pub struct Subscriptions {
    handles: Vec<Subscription>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, subscription: Subscription) {
        self.handles.push(subscription);
    }

    pub fn append(&mut self, mut other: Subscriptions) {
        self.handles.append(&mut other.handles);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Release every handle now, keeping the bag for reuse
    pub fn release_all(&mut self) {
        for handle in self.handles.drain(..) {
            handle.unsubscribe();
        }
    }
}

impl From<Vec<Subscription>> for Subscriptions {
    fn from(handles: Vec<Subscription>) -> Self {
        Self { handles }
    }
}

impl Extend<Subscription> for Subscriptions {
    fn extend<I: IntoIterator<Item = Subscription>>(&mut self, iter: I) {
        self.handles.extend(iter);
    }
}
