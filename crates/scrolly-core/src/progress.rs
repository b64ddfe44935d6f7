//! Progress Mapper: scroll position to per-scene progress in [0, 1].

use std::cell::Cell;
use std::rc::Rc;

use tracing::debug;

use crate::env::{NodeId, SharedHost};
use crate::runtime::timing::ratio_clamped;
use crate::runtime::{EventLoop, Millis};
use crate::stream::{Channel, Subscription};

/// Where a scene sits in the scroll sequence, in screen lengths
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneSpan {
    /// Sum of the screen lengths of every preceding scene
    pub offset_screens: f64,
    pub screen_lengths: f64,
}

/// Pure progress computation.
///
/// The domain starts at `anchor_top + header_buffer + offset_screens ×
/// screen_height` and spans the scene's own height plus one screen. Values
/// outside the domain clamp to 0 or 1; a zero-length domain is widened to
/// one pixel.
pub fn map_progress(
    span: SceneSpan,
    scroll_y: f64,
    screen_height: f64,
    anchor_top: f64,
    header_buffer: f64,
) -> f64 {
    let start = anchor_top + header_buffer + span.offset_screens * screen_height;
    let total_height = span.screen_lengths * screen_height;
    ratio_clamped(scroll_y, start, start + total_height + screen_height)
}

/// Document offset of `node`'s top edge
pub fn document_top(host: &SharedHost, node: NodeId) -> f64 {
    host.bounding_rect(node).top + host.scroll_y()
}

/// Poll the document offset of `node` every `period` ms.
///
/// Layout reflow moves the anchor without firing any event, so it is read on
/// a timer. The returned channel replays and only emits changes; the
/// subscription stops the timer.
pub fn poll_anchor(
    event_loop: &Rc<EventLoop>,
    host: SharedHost,
    node: NodeId,
    period: Millis,
) -> (Channel<f64>, Subscription) {
    let raw = Channel::with_value(document_top(&host, node));
    let target = raw.downgrade();
    let timer = event_loop.set_interval(period, move || {
        if let Some(raw) = target.upgrade() {
            raw.publish(document_top(&host, node));
        }
    });
    (raw.distinct(), timer.into())
}

#[derive(Debug, Clone, Copy)]
struct Inputs {
    scroll_y: f64,
    screen_height: f64,
    anchor_top: f64,
}

/// Builds reactive progress channels that share one set of inputs
pub struct ProgressMapper {
    host: SharedHost,
    scroll: Channel<f64>,
    screen_height: Channel<f64>,
    anchor: Channel<f64>,
    header_buffer: f64,
}

impl ProgressMapper {
    pub fn new(
        host: SharedHost,
        scroll: Channel<f64>,
        screen_height: Channel<f64>,
        anchor: Channel<f64>,
        header_buffer: f64,
    ) -> Self {
        Self {
            host,
            scroll,
            screen_height,
            anchor,
            header_buffer,
        }
    }

    /// Progress of one scene, recomputed whenever scroll position, screen
    /// height or anchor position changes. Replays its latest value and
    /// suppresses repeats.
    pub fn progress(&self, span: SceneSpan) -> Channel<f64> {
        let inputs = Rc::new(Cell::new(Inputs {
            scroll_y: self.host.scroll_y(),
            screen_height: self.screen_height.latest().unwrap_or(0.0),
            anchor_top: self.anchor.latest().unwrap_or(0.0),
        }));

        let raw: Channel<f64> = Channel::replay();
        let header_buffer = self.header_buffer;
        let recompute = {
            let target = raw.downgrade();
            let inputs = inputs.clone();
            Rc::new(move || {
                let i = inputs.get();
                let p = map_progress(span, i.scroll_y, i.screen_height, i.anchor_top, header_buffer);
                if let Some(raw) = target.upgrade() {
                    raw.publish(p);
                }
            })
        };

        let (r, i) = (recompute.clone(), inputs.clone());
        raw.hold(self.scroll.subscribe(move |y| {
            i.set(Inputs { scroll_y: *y, ..i.get() });
            r();
        }));
        let (r, i) = (recompute.clone(), inputs.clone());
        raw.hold(self.screen_height.subscribe(move |h| {
            i.set(Inputs { screen_height: *h, ..i.get() });
            r();
        }));
        let (r, i) = (recompute, inputs);
        raw.hold(self.anchor.subscribe(move |top| {
            debug!(anchor = top, "Anchor moved");
            i.set(Inputs { anchor_top: *top, ..i.get() });
            r();
        }));

        raw.distinct()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{HeadlessPage, Surface};
    use std::cell::RefCell;

    const SPAN: SceneSpan = SceneSpan {
        offset_screens: 0.0,
        screen_lengths: 3.0,
    };

    #[test]
    fn test_clamps_outside_domain() {
        // Domain is [100, 100 + 3*800 + 800] = [100, 3300]
        assert_eq!(map_progress(SPAN, 0.0, 800.0, 100.0, 0.0), 0.0);
        assert_eq!(map_progress(SPAN, -500.0, 800.0, 100.0, 0.0), 0.0);
        assert_eq!(map_progress(SPAN, 9000.0, 800.0, 100.0, 0.0), 1.0);
        assert!((map_progress(SPAN, 1700.0, 800.0, 100.0, 0.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_offset_and_header_buffer_shift_the_domain() {
        let second = SceneSpan {
            offset_screens: 2.0,
            screen_lengths: 1.0,
        };
        // start = 0 + 50 + 2*800 = 1650
        assert_eq!(map_progress(second, 1650.0, 800.0, 0.0, 50.0), 0.0);
        assert!((map_progress(second, 2450.0, 800.0, 0.0, 50.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_height_does_not_divide_by_zero() {
        let empty = SceneSpan {
            offset_screens: 0.0,
            screen_lengths: 0.0,
        };
        let p = map_progress(empty, 10.0, 0.0, 0.0, 0.0);
        assert!(p.is_finite());
        assert_eq!(p, 1.0);
    }

    #[test]
    fn test_reactive_progress_is_distinct() {
        let page = Rc::new(HeadlessPage::new(1000.0, 800.0));
        let scroll = Channel::new();
        let screen_height = Channel::with_value(800.0);
        let anchor = Channel::with_value(0.0);
        let mapper = ProgressMapper::new(page, scroll.clone(), screen_height.clone(), anchor, 0.0);

        let progress = mapper.progress(SPAN);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        let _sub = progress.subscribe(move |p| s.borrow_mut().push(*p));

        scroll.publish(-10.0);
        scroll.publish(1600.0);
        scroll.publish(1600.0);
        screen_height.publish(800.0);
        assert_eq!(*seen.borrow(), vec![0.0, 0.5]);
    }

    #[test]
    fn test_anchor_poll_emits_only_changes() {
        let page = Rc::new(HeadlessPage::new(1000.0, 800.0));
        let spacer = page.create_element("div");
        page.set_style(spacer, "height", "300px");
        page.append_child(page.body(), spacer);
        let anchor = page.create_element("div");
        page.append_child(page.body(), anchor);

        let event_loop = EventLoop::new();
        let (channel, poller) = poll_anchor(&event_loop, page.clone(), anchor, 500);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        let _sub = channel.subscribe(move |top| s.borrow_mut().push(*top));

        event_loop.advance(1000);
        page.set_style(spacer, "height", "400px");
        event_loop.advance(500);
        assert_eq!(*seen.borrow(), vec![300.0, 400.0]);

        drop(poller);
        assert_eq!(event_loop.pending_timers(), 0);
    }
}
