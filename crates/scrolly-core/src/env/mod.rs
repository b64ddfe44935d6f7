//! Environment capabilities the engine needs from its host.
//!
//! Components never reach for a global window or document. They receive an
//! `Rc<dyn Host>` at construction and use it to read the scroll offset and
//! viewport size and to manipulate the element tree they own. A browser glue
//! layer implements `Host` over the real DOM; `HeadlessPage` implements it in
//! memory for tests and the CLI.

pub mod headless;
pub mod style;

use std::rc::Rc;

use serde::{Deserialize, Serialize};

pub use headless::HeadlessPage;
pub use style::{Length, StyleMap};

/// Opaque handle to an element owned by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Inner window dimensions in px
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: f64,
    pub height: f64,
}

impl WindowSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Viewport-relative box of an element
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub width: f64,
}

impl Rect {
    pub fn new(top: f64, height: f64, left: f64, width: f64) -> Self {
        Self {
            top,
            bottom: top + height,
            left,
            width,
        }
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    /// Entirely inside `[0, viewport_height]`
    #[inline]
    pub fn is_within(&self, viewport_height: f64) -> bool {
        self.top >= 0.0 && self.bottom <= viewport_height
    }

    /// Overlaps `(0, viewport_height)`; touching an edge does not count
    #[inline]
    pub fn intersects(&self, viewport_height: f64) -> bool {
        self.bottom > 0.0 && self.top < viewport_height
    }

    #[inline]
    pub fn is_above(&self) -> bool {
        self.bottom <= 0.0
    }

    #[inline]
    pub fn is_below(&self, viewport_height: f64) -> bool {
        self.top >= viewport_height
    }
}

/// Read-only view of the live window state
pub trait Environment {
    /// Current vertical scroll offset of the document
    fn scroll_y(&self) -> f64;

    fn window_size(&self) -> WindowSize;
}

/// Element tree operations
pub trait Surface {
    fn create_element(&self, tag: &str) -> NodeId;

    /// Append `child` to `parent`, detaching it from any previous parent
    fn append_child(&self, parent: NodeId, child: NodeId);

    fn set_style(&self, node: NodeId, prop: &str, value: &str);

    fn remove_style(&self, node: NodeId, prop: &str);

    fn style(&self, node: NodeId, prop: &str) -> Option<String>;

    fn add_class(&self, node: NodeId, class: &str);

    fn remove_class(&self, node: NodeId, class: &str);

    fn has_class(&self, node: NodeId, class: &str) -> bool;

    fn set_text(&self, node: NodeId, text: &str);

    fn set_id(&self, node: NodeId, id: &str);

    /// First attached element matching `#id`, `.class` or a tag name
    fn query(&self, selector: &str) -> Option<NodeId>;

    /// Whether the element is part of the document tree
    fn is_attached(&self, node: NodeId) -> bool;

    /// Viewport-relative box of the element
    fn bounding_rect(&self, node: NodeId) -> Rect;
}

/// Everything a page host provides
pub trait Host: Environment + Surface {}

impl<T: Environment + Surface + ?Sized> Host for T {}

pub type SharedHost = Rc<dyn Host>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_predicates() {
        let inside = Rect::new(100.0, 50.0, 0.0, 10.0);
        assert!(inside.is_within(800.0));
        assert!(inside.intersects(800.0));

        let straddling = Rect::new(-10.0, 50.0, 0.0, 10.0);
        assert!(!straddling.is_within(800.0));
        assert!(straddling.intersects(800.0));

        let above = Rect::new(-60.0, 60.0, 0.0, 10.0);
        assert!(above.is_above());
        assert!(!above.intersects(800.0));

        let below = Rect::new(800.0, 60.0, 0.0, 10.0);
        assert!(below.is_below(800.0));
        assert!(!below.intersects(800.0));
    }
}
