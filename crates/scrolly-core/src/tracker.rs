//! Viewport Intersection Tracker.
//!
//! Scroll events only request a check; at most one check runs per animation
//! frame. A check compares the sentinels and every tracked text block
//! against the viewport and emits what changed since the previous check.
//!
//! A sentinel counts as in view while any part of it overlaps the viewport,
//! with both edges exclusive. A text block enters when it is entirely inside
//! the viewport and exits when it is entirely outside.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde::Serialize;
use tracing::debug;

use crate::env::{NodeId, SharedHost};
use crate::runtime::EventLoop;
use crate::stream::Channel;

/// Which end of the story the reader is coming from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    /// Scrolling down
    FromTop,
    /// Scrolling up
    FromBottom,
}

impl Direction {
    pub fn from_scrolling_down(down: bool) -> Self {
        if down {
            Direction::FromTop
        } else {
            Direction::FromBottom
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockTrigger {
    /// Became fully visible while scrolling up
    EnterTop,
    /// Became fully visible while scrolling down
    EnterBottom,
    /// Left through the top edge
    ExitTop,
    /// Left through the bottom edge
    ExitBottom,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackerSignal {
    Activate(Direction),
    Deactivate(Direction),
    Block {
        index: usize,
        trigger: BlockTrigger,
        direction: Direction,
    },
}

#[derive(Debug, Default)]
struct TrackerState {
    ticking: bool,
    last_scroll: f64,
    top_in_view: bool,
    bottom_in_view: bool,
    viewable: Vec<bool>,
}

pub struct ViewportTracker {
    host: SharedHost,
    event_loop: Rc<EventLoop>,
    top: NodeId,
    bottom: NodeId,
    blocks: Vec<NodeId>,
    state: RefCell<TrackerState>,
    signals: Channel<TrackerSignal>,
    this: Weak<ViewportTracker>,
}

impl ViewportTracker {
    pub fn new(
        host: SharedHost,
        event_loop: Rc<EventLoop>,
        top: NodeId,
        bottom: NodeId,
        blocks: Vec<NodeId>,
    ) -> Rc<Self> {
        let last_scroll = host.scroll_y();
        let viewable = vec![false; blocks.len()];
        Rc::new_cyclic(|this| Self {
            host,
            event_loop,
            top,
            bottom,
            blocks,
            state: RefCell::new(TrackerState {
                last_scroll,
                viewable,
                ..TrackerState::default()
            }),
            signals: Channel::new(),
            this: this.clone(),
        })
    }

    pub fn signals(&self) -> &Channel<TrackerSignal> {
        &self.signals
    }

    /// Request a check on the next frame unless one is already pending
    pub fn on_scroll(&self) {
        {
            let mut state = self.state.borrow_mut();
            if state.ticking {
                return;
            }
            state.ticking = true;
        }
        let this = self.this.clone();
        self.event_loop.request_frame(move || {
            if let Some(tracker) = this.upgrade() {
                tracker.check();
            }
        });
    }

    pub fn is_pending(&self) -> bool {
        self.state.borrow().ticking
    }

    pub fn is_viewable(&self, index: usize) -> bool {
        self.state
            .borrow()
            .viewable
            .get(index)
            .copied()
            .unwrap_or(false)
    }

    /// Compare against the viewport now and publish every change
    pub fn check(&self) {
        let signals = self.collect();
        for signal in signals {
            debug!(?signal, "Viewport change");
            self.signals.publish(signal);
        }
    }

    fn collect(&self) -> Vec<TrackerSignal> {
        let mut state = self.state.borrow_mut();
        state.ticking = false;

        let scroll_y = self.host.scroll_y();
        let viewport = self.host.window_size().height;
        let down = scroll_y > state.last_scroll;
        state.last_scroll = scroll_y;
        let direction = Direction::from_scrolling_down(down);

        let mut out = Vec::new();

        let top_in_view = self.host.bounding_rect(self.top).intersects(viewport);
        if top_in_view && !state.top_in_view {
            out.push(if down {
                TrackerSignal::Activate(Direction::FromTop)
            } else {
                TrackerSignal::Deactivate(Direction::FromBottom)
            });
        }
        state.top_in_view = top_in_view;

        let bottom_in_view = self.host.bounding_rect(self.bottom).intersects(viewport);
        if bottom_in_view && !state.bottom_in_view {
            out.push(if down {
                TrackerSignal::Deactivate(Direction::FromTop)
            } else {
                TrackerSignal::Activate(Direction::FromBottom)
            });
        }
        state.bottom_in_view = bottom_in_view;

        for (index, node) in self.blocks.iter().enumerate() {
            let rect = self.host.bounding_rect(*node);
            let viewable = state.viewable[index];
            let trigger = if !viewable && rect.is_within(viewport) {
                state.viewable[index] = true;
                if down {
                    BlockTrigger::EnterBottom
                } else {
                    BlockTrigger::EnterTop
                }
            } else if viewable && rect.is_above() {
                state.viewable[index] = false;
                BlockTrigger::ExitTop
            } else if viewable && rect.is_below(viewport) {
                state.viewable[index] = false;
                BlockTrigger::ExitBottom
            } else {
                continue;
            };
            out.push(TrackerSignal::Block {
                index,
                trigger,
                direction,
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{HeadlessPage, Surface};
    use std::cell::RefCell;

    struct Fixture {
        page: Rc<HeadlessPage>,
        event_loop: Rc<EventLoop>,
        tracker: Rc<ViewportTracker>,
        seen: Rc<RefCell<Vec<TrackerSignal>>>,
        _sub: crate::Subscription,
    }

    fn block(page: &HeadlessPage, height: &str) -> NodeId {
        let node = page.create_element("div");
        page.set_style(node, "height", height);
        page.append_child(page.body(), node);
        node
    }

    // 1000px lead, 600px sentinel, 200px block, 600px sentinel, 2000px tail
    fn fixture() -> Fixture {
        let page = Rc::new(HeadlessPage::new(1000.0, 800.0));
        block(&page, "1000px");
        let top = block(&page, "600px");
        let text = block(&page, "200px");
        let bottom = block(&page, "600px");
        block(&page, "2000px");

        let event_loop = EventLoop::new();
        let tracker = ViewportTracker::new(page.clone(), event_loop.clone(), top, bottom, vec![text]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        let sub = tracker.signals().subscribe(move |signal| s.borrow_mut().push(*signal));
        Fixture {
            page,
            event_loop,
            tracker,
            seen,
            _sub: sub,
        }
    }

    impl Fixture {
        fn scroll_to(&self, y: f64) {
            self.page.set_scroll_y(y);
            self.tracker.on_scroll();
            self.event_loop.run_frame();
        }
    }

    #[test]
    fn test_scroll_events_coalesce_into_one_check_per_frame() {
        let f = fixture();
        for _ in 0..5 {
            f.tracker.on_scroll();
        }
        assert!(f.tracker.is_pending());
        assert_eq!(f.event_loop.pending_frames(), 1);
        f.event_loop.run_frame();
        assert!(!f.tracker.is_pending());
    }

    #[test]
    fn test_scrolling_down_through_the_region() {
        let f = fixture();
        let mut y = 0.0;
        while y <= 3000.0 {
            f.scroll_to(y);
            y += 50.0;
        }
        let seen = f.seen.borrow();
        assert_eq!(
            *seen,
            vec![
                TrackerSignal::Activate(Direction::FromTop),
                TrackerSignal::Block {
                    index: 0,
                    trigger: BlockTrigger::EnterBottom,
                    direction: Direction::FromTop
                },
                TrackerSignal::Deactivate(Direction::FromTop),
                TrackerSignal::Block {
                    index: 0,
                    trigger: BlockTrigger::ExitTop,
                    direction: Direction::FromTop
                },
            ]
        );
    }

    #[test]
    fn test_scrolling_back_up_mirrors_the_rules() {
        let f = fixture();
        f.scroll_to(2000.0);
        f.seen.borrow_mut().clear();
        // Top sentinel re-enters from above, then the block leaves through
        // the bottom edge
        f.scroll_to(1200.0);
        f.scroll_to(800.0);
        f.scroll_to(0.0);
        let seen = f.seen.borrow();
        assert!(seen.contains(&TrackerSignal::Block {
            index: 0,
            trigger: BlockTrigger::ExitBottom,
            direction: Direction::FromBottom
        }));
        assert!(seen.contains(&TrackerSignal::Deactivate(Direction::FromBottom)));
        assert!(!f.tracker.is_viewable(0));
    }

    #[test]
    fn test_touching_the_edge_is_not_in_view() {
        let f = fixture();
        // Top sentinel starts exactly at the viewport's bottom edge
        f.scroll_to(200.0);
        assert!(f.seen.borrow().is_empty());
        f.scroll_to(201.0);
        assert_eq!(
            *f.seen.borrow(),
            vec![TrackerSignal::Activate(Direction::FromTop)]
        );
    }
}
