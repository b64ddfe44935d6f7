//! Event Stream Layer: raw page events turned into long-lived channels.
//!
//! | Channel         | Replays | Fed by                                   |
//! |-----------------|---------|------------------------------------------|
//! | `resize`        | yes     | raw resize events, debounced             |
//! | `screen_height` | yes     | the graphic's resize handling            |
//! | `fallback`      | yes     | `set_fallback` and the debug key toggle  |
//! | `scroll`        | no      | every scroll event                       |
//! | `keydown`       | no      | every keydown event                      |
//!
//! This layer never touches the element tree.

use std::collections::VecDeque;
use std::rc::Rc;

use tracing::debug;

use crate::config::EngineConfig;
use crate::env::{SharedHost, WindowSize};
use crate::runtime::EventLoop;
use crate::stream::{Channel, Subscription};

/// ↑ ↑ ↓ ↓ ← → ← → B A
pub const KONAMI_CODE: [u32; 10] = [38, 38, 40, 40, 37, 39, 37, 39, 66, 65];

/// Raw event delivered by the host
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawEvent {
    Scroll,
    Resize,
    KeyDown(u32),
}

pub struct EventStreams {
    host: SharedHost,
    raw_resize: Channel<WindowSize>,
    resize: Channel<WindowSize>,
    screen_height: Channel<f64>,
    fallback: Channel<bool>,
    scroll: Channel<f64>,
    keydown: Channel<u32>,
    _resize_feed: Subscription,
}

impl EventStreams {
    pub fn new(host: SharedHost, event_loop: &Rc<EventLoop>, config: &EngineConfig) -> Self {
        let window = host.window_size();
        let raw_resize = Channel::new();
        let resize = Channel::with_value(window);

        let target = resize.downgrade();
        let resize_feed = raw_resize
            .debounce(event_loop, config.timing.resize_debounce_ms)
            .subscribe(move |size: &WindowSize| {
                if let Some(resize) = target.upgrade() {
                    resize.publish(*size);
                }
            });

        Self {
            host,
            raw_resize,
            resize,
            screen_height: Channel::with_value(window.height - config.layout.header_offset),
            fallback: Channel::with_value(false),
            scroll: Channel::new(),
            keydown: Channel::new(),
            _resize_feed: resize_feed,
        }
    }

    /// Feed one raw event. Values are read from the live host state.
    pub fn dispatch(&self, event: RawEvent) {
        match event {
            RawEvent::Scroll => self.scroll.publish(self.host.scroll_y()),
            RawEvent::Resize => self.raw_resize.publish(self.host.window_size()),
            RawEvent::KeyDown(code) => self.keydown.publish(code),
        }
    }

    pub fn resize(&self) -> &Channel<WindowSize> {
        &self.resize
    }

    pub fn screen_height(&self) -> &Channel<f64> {
        &self.screen_height
    }

    pub fn fallback(&self) -> &Channel<bool> {
        &self.fallback
    }

    pub fn scroll(&self) -> &Channel<f64> {
        &self.scroll
    }

    pub fn keydown(&self) -> &Channel<u32> {
        &self.keydown
    }

    pub fn set_fallback(&self, value: bool) {
        debug!(value, "Fallback set");
        self.fallback.publish(value);
    }

    pub fn current_fallback(&self) -> bool {
        self.fallback.latest().unwrap_or(false)
    }

    /// Toggle `fallback` whenever the last ten keydown codes spell the
    /// Konami code
    pub fn arm_fallback_toggle(&self) -> Subscription {
        let fallback = self.fallback.downgrade();
        let mut detector = KonamiDetector::new();
        self.keydown.subscribe(move |code| {
            if !detector.push(*code) {
                return;
            }
            if let Some(fallback) = fallback.upgrade() {
                let next = !fallback.latest().unwrap_or(false);
                debug!(fallback = next, "Key sequence toggled fallback");
                fallback.publish(next);
            }
        })
    }
}

/// Sliding window over the last ten key codes
#[derive(Debug, Default)]
pub struct KonamiDetector {
    buffer: VecDeque<u32>,
}

impl KonamiDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a key code; true when the window now matches exactly
    pub fn push(&mut self, code: u32) -> bool {
        self.buffer.push_back(code);
        if self.buffer.len() > KONAMI_CODE.len() {
            self.buffer.pop_front();
        }
        self.buffer.len() == KONAMI_CODE.len() && self.buffer.iter().eq(KONAMI_CODE.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{HeadlessPage, Surface};
    use std::cell::RefCell;

    fn streams() -> (Rc<HeadlessPage>, Rc<EventLoop>, EventStreams) {
        let page = Rc::new(HeadlessPage::new(1000.0, 800.0));
        let event_loop = EventLoop::new();
        let streams = EventStreams::new(page.clone(), &event_loop, &EngineConfig::default());
        (page, event_loop, streams)
    }

    #[test]
    fn test_initial_values() {
        let (_page, _loop, streams) = streams();
        assert_eq!(streams.screen_height().latest(), Some(750.0));
        assert_eq!(streams.resize().latest(), Some(WindowSize::new(1000.0, 800.0)));
        assert!(!streams.current_fallback());
    }

    #[test]
    fn test_scroll_reads_live_offset() {
        let (page, _loop, streams) = streams();
        let filler = page.create_element("div");
        page.set_style(filler, "height", "5000px");
        page.append_child(page.body(), filler);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        let _sub = streams.scroll().subscribe(move |y| s.borrow_mut().push(*y));
        page.set_scroll_y(300.0);
        streams.dispatch(RawEvent::Scroll);
        assert_eq!(*seen.borrow(), vec![300.0]);
    }

    #[test]
    fn test_konami_detector_needs_exact_window() {
        let mut detector = KonamiDetector::new();
        assert!(!detector.push(65));
        let hits: Vec<bool> = KONAMI_CODE.iter().map(|c| detector.push(*c)).collect();
        assert_eq!(hits.iter().filter(|h| **h).count(), 1);
        assert!(hits[9]);
        assert!(!detector.push(65));
    }

    #[test]
    fn test_key_sequence_toggles_fallback() {
        let (_page, _loop, streams) = streams();
        let _armed = streams.arm_fallback_toggle();
        for code in KONAMI_CODE {
            streams.dispatch(RawEvent::KeyDown(code));
        }
        assert!(streams.current_fallback());
        for code in KONAMI_CODE {
            streams.dispatch(RawEvent::KeyDown(code));
        }
        assert!(!streams.current_fallback());
    }
}
