//! Derived channels.
//!
//! Each operator returns a new channel that owns its upstream subscription;
//! dropping the derived channel detaches it from its source. Derived
//! channels replay if their source does.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::channel::Channel;
use crate::runtime::{EventLoop, Millis, TimerHandle};

impl<T: Clone + 'static> Channel<T> {
    fn derived<U: Clone + 'static>(&self) -> Channel<U> {
        if self.is_replay() {
            Channel::replay()
        } else {
            Channel::new()
        }
    }

    /// Transform every value
    pub fn map<U: Clone + 'static>(&self, f: impl Fn(&T) -> U + 'static) -> Channel<U> {
        let out = self.derived::<U>();
        let weak = out.downgrade();
        let sub = self.subscribe(move |value| {
            if let Some(out) = weak.upgrade() {
                out.publish(f(value));
            }
        });
        out.hold(sub);
        out
    }

    /// Emit only when the value differs from the previously emitted one
    pub fn distinct(&self) -> Channel<T>
    where
        T: PartialEq,
    {
        let out = self.derived::<T>();
        let weak = out.downgrade();
        let last: RefCell<Option<T>> = RefCell::new(None);
        let sub = self.subscribe(move |value| {
            if last.borrow().as_ref() == Some(value) {
                return;
            }
            *last.borrow_mut() = Some(value.clone());
            if let Some(out) = weak.upgrade() {
                out.publish(value.clone());
            }
        });
        out.hold(sub);
        out
    }

    /// Emit the latest value once `quiet_ms` have passed without a new one
    pub fn debounce(&self, event_loop: &Rc<EventLoop>, quiet_ms: Millis) -> Channel<T> {
        let out = self.derived::<T>();
        let weak = out.downgrade();
        let event_loop = Rc::clone(event_loop);
        let pending: RefCell<Option<TimerHandle>> = RefCell::new(None);
        let sub = self.subscribe(move |value| {
            let weak = weak.clone();
            let mut value = Some(value.clone());
            let timer = event_loop.set_timeout(quiet_ms, move || {
                if let (Some(out), Some(value)) = (weak.upgrade(), value.take()) {
                    out.publish(value);
                }
            });
            // Replacing the handle cancels the previous timer
            *pending.borrow_mut() = Some(timer);
        });
        out.hold(sub);
        out
    }

    /// Emit a value, then ignore the source for `window_ms` (leading edge)
    pub fn throttle(&self, event_loop: &Rc<EventLoop>, window_ms: Millis) -> Channel<T> {
        let out = self.derived::<T>();
        let weak = out.downgrade();
        let event_loop = Rc::clone(event_loop);
        let open_at: Cell<Option<Millis>> = Cell::new(None);
        let sub = self.subscribe(move |value| {
            let now = event_loop.now();
            if open_at.get().is_some_and(|at| now < at) {
                return;
            }
            open_at.set(Some(now + window_ms));
            if let Some(out) = weak.upgrade() {
                out.publish(value.clone());
            }
        });
        out.hold(sub);
        out
    }
}
