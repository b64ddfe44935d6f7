#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use scrolly_core::env::Surface;
use scrolly_core::{Engine, EngineConfig, HeadlessPage, NodeId, RawEvent};

pub const WIDTH: f64 = 1000.0;
pub const HEIGHT: f64 = 800.0;

pub type Log<T> = Rc<RefCell<Vec<T>>>;

pub fn log<T>() -> Log<T> {
    Rc::new(RefCell::new(Vec::new()))
}

pub struct Harness {
    pub page: Rc<HeadlessPage>,
    pub engine: Engine,
}

impl Harness {
    pub fn new() -> Self {
        let page = Rc::new(HeadlessPage::new(WIDTH, HEIGHT));
        let engine = Engine::new(page.clone(), EngineConfig::default());
        Self { page, engine }
    }

    /// Append a block of fixed height to the body
    pub fn block(&self, height: &str) -> NodeId {
        let node = self.page.create_element("div");
        self.page.set_style(node, "height", height);
        self.page.append_child(self.page.body(), node);
        node
    }

    /// Append an empty element with `id` to the body
    pub fn anchor(&self, id: &str) -> NodeId {
        let node = self.page.create_element("div");
        self.page.set_id(node, id);
        self.page.append_child(self.page.body(), node);
        node
    }

    /// Scroll, then let the next animation frame run
    pub fn scroll_to(&self, y: f64) {
        self.page.set_scroll_y(y);
        self.engine.dispatch(RawEvent::Scroll);
        self.engine.advance(0);
    }

    /// Scroll and wait out every debounce
    pub fn scroll_and_settle(&self, y: f64) {
        self.scroll_to(y);
        self.engine.advance(250);
    }
}
