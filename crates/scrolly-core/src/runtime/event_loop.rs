//! Single-threaded cooperative event loop with virtual time.
//!
//! The loop owns the clock. A host advances it, either from an animation
//! frame callback in a browser or explicitly in tests, and every due timer
//! runs synchronously inside `advance_to`. Animation-frame callbacks are
//! queued separately and run by `run_frame`.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};

use crate::stream::Subscription;

/// Virtual time in milliseconds
pub type Millis = u64;

type TimerCallback = Box<dyn FnMut()>;
type FrameCallback = Box<dyn FnOnce()>;

struct TimerEntry {
    period: Option<Millis>,
    callback: TimerCallback,
}

#[derive(Default)]
struct Timers {
    /// Keyed by (due, id) so iteration order is due time, then registration order
    queue: BTreeMap<(Millis, u64), TimerEntry>,
    /// id -> due, for cancellation
    live: HashMap<u64, Millis>,
}

/// Event loop shared by every component of one page
pub struct EventLoop {
    now: Cell<Millis>,
    next_id: Cell<u64>,
    timers: RefCell<Timers>,
    frames: RefCell<Vec<FrameCallback>>,
    /// Timer currently executing, and whether it cancelled itself
    running: Cell<Option<u64>>,
    running_cancelled: Cell<bool>,
}

impl EventLoop {
    pub fn new() -> Rc<Self> {
        Self::starting_at(0)
    }

    pub fn starting_at(now: Millis) -> Rc<Self> {
        Rc::new(Self {
            now: Cell::new(now),
            next_id: Cell::new(0),
            timers: RefCell::new(Timers::default()),
            frames: RefCell::new(Vec::new()),
            running: Cell::new(None),
            running_cancelled: Cell::new(false),
        })
    }

    #[inline]
    pub fn now(&self) -> Millis {
        self.now.get()
    }

    /// Run `callback` once after `delay` ms
    pub fn set_timeout(self: &Rc<Self>, delay: Millis, callback: impl FnMut() + 'static) -> TimerHandle {
        self.schedule(delay, None, Box::new(callback))
    }

    /// Run `callback` every `period` ms, first after one period
    pub fn set_interval(self: &Rc<Self>, period: Millis, callback: impl FnMut() + 'static) -> TimerHandle {
        let period = period.max(1);
        self.schedule(period, Some(period), Box::new(callback))
    }

    /// Queue `callback` for the next animation frame
    pub fn request_frame(&self, callback: impl FnOnce() + 'static) {
        self.frames.borrow_mut().push(Box::new(callback));
    }

    pub fn pending_frames(&self) -> usize {
        self.frames.borrow().len()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().live.len()
    }

    fn schedule(self: &Rc<Self>, delay: Millis, period: Option<Millis>, callback: TimerCallback) -> TimerHandle {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let due = self.now() + delay;

        let mut timers = self.timers.borrow_mut();
        timers.queue.insert((due, id), TimerEntry { period, callback });
        timers.live.insert(id, due);

        TimerHandle {
            id,
            owner: Rc::downgrade(self),
            armed: true,
        }
    }

    fn cancel(&self, id: u64) {
        if self.running.get() == Some(id) {
            self.running_cancelled.set(true);
        }
        let mut timers = self.timers.borrow_mut();
        if let Some(due) = timers.live.remove(&id) {
            timers.queue.remove(&(due, id));
        }
    }

    /// Advance virtual time to `target`, running every timer that falls due
    pub fn advance_to(&self, target: Millis) {
        loop {
            let next = {
                let mut timers = self.timers.borrow_mut();
                let key = match timers.queue.keys().next() {
                    Some(&key) if key.0 <= target => key,
                    _ => break,
                };
                timers.live.remove(&key.1);
                timers.queue.remove(&key).map(|entry| (key, entry))
            };

            let Some(((due, id), mut entry)) = next else {
                break;
            };

            if due > self.now() {
                self.now.set(due);
            }

            self.running.set(Some(id));
            self.running_cancelled.set(false);
            (entry.callback)();
            self.running.set(None);

            if let Some(period) = entry.period {
                if !self.running_cancelled.get() {
                    let next_due = due + period;
                    let mut timers = self.timers.borrow_mut();
                    timers.queue.insert((next_due, id), entry);
                    timers.live.insert(id, next_due);
                }
            }
        }

        if target > self.now() {
            self.now.set(target);
        }
    }

    /// Advance virtual time by `delta` ms
    pub fn advance(&self, delta: Millis) {
        self.advance_to(self.now() + delta);
    }

    /// Run the callbacks queued for this frame. Callbacks queued while
    /// running belong to the next frame.
    pub fn run_frame(&self) -> usize {
        let callbacks = std::mem::take(&mut *self.frames.borrow_mut());
        let count = callbacks.len();
        for callback in callbacks {
            callback();
        }
        count
    }

    /// One host tick: advance the clock, then run the frame
    pub fn tick(&self, now: Millis) -> usize {
        self.advance_to(now);
        self.run_frame()
    }
}

/// Cancels its timer when dropped
#[must_use = "dropping a TimerHandle cancels the timer; call detach() to let it run"]
pub struct TimerHandle {
    id: u64,
    owner: Weak<EventLoop>,
    armed: bool,
}

impl TimerHandle {
    pub fn cancel(mut self) {
        self.disarm_and_cancel();
    }

    /// Let the timer run to completion without holding the handle
    pub fn detach(mut self) {
        self.armed = false;
    }

    fn disarm_and_cancel(&mut self) {
        if self.armed {
            self.armed = false;
            if let Some(owner) = self.owner.upgrade() {
                owner.cancel(self.id);
            }
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.disarm_and_cancel();
    }
}

impl From<TimerHandle> for Subscription {
    fn from(handle: TimerHandle) -> Self {
        Subscription::new(move || handle.cancel())
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("id", &self.id)
            .field("armed", &self.armed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_fires_once_when_due() {
        let event_loop = EventLoop::new();
        let fired = Rc::new(Cell::new(0));
        let f = fired.clone();
        let handle = event_loop.set_timeout(100, move || f.set(f.get() + 1));

        event_loop.advance_to(99);
        assert_eq!(fired.get(), 0);
        event_loop.advance_to(100);
        assert_eq!(fired.get(), 1);
        event_loop.advance_to(500);
        assert_eq!(fired.get(), 1);
        drop(handle);
    }

    #[test]
    fn test_dropped_handle_cancels() {
        let event_loop = EventLoop::new();
        let fired = Rc::new(Cell::new(false));
        let f = fired.clone();
        drop(event_loop.set_timeout(10, move || f.set(true)));
        event_loop.advance(50);
        assert!(!fired.get());
        assert_eq!(event_loop.pending_timers(), 0);
    }

    #[test]
    fn test_detached_timer_still_runs() {
        let event_loop = EventLoop::new();
        let fired = Rc::new(Cell::new(false));
        let f = fired.clone();
        event_loop.set_timeout(0, move || f.set(true)).detach();
        event_loop.advance(0);
        assert!(fired.get());
    }

    #[test]
    fn test_interval_repeats_and_sees_due_time() {
        let event_loop = EventLoop::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        let weak = Rc::downgrade(&event_loop);
        let _handle = event_loop.set_interval(500, move || {
            if let Some(l) = weak.upgrade() {
                s.borrow_mut().push(l.now());
            }
        });

        event_loop.advance_to(1600);
        assert_eq!(*seen.borrow(), vec![500, 1000, 1500]);
        assert_eq!(event_loop.now(), 1600);
    }

    #[test]
    fn test_timers_run_in_due_then_registration_order() {
        let event_loop = EventLoop::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut handles = Vec::new();
        for (name, delay) in [("b", 20), ("a", 10), ("c", 20)] {
            let o = order.clone();
            handles.push(event_loop.set_timeout(delay, move || o.borrow_mut().push(name)));
        }
        event_loop.advance(20);
        assert_eq!(*order.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_frames_queued_during_frame_run_next_frame() {
        let event_loop = EventLoop::new();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let weak = Rc::downgrade(&event_loop);
        event_loop.request_frame(move || {
            c.set(c.get() + 1);
            let c2 = c.clone();
            if let Some(l) = weak.upgrade() {
                l.request_frame(move || c2.set(c2.get() + 1));
            }
        });

        assert_eq!(event_loop.run_frame(), 1);
        assert_eq!(count.get(), 1);
        assert_eq!(event_loop.pending_frames(), 1);
        assert_eq!(event_loop.run_frame(), 1);
        assert_eq!(count.get(), 2);
    }
}
