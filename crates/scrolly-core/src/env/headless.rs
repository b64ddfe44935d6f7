//! In-memory page used for headless runs.
//!
//! Implements a deliberately small block-flow layout: elements stack
//! vertically inside their parent using `margin-top`, `height` and
//! `margin-bottom`; `position: absolute` elements are placed at `top` inside
//! their parent and `position: fixed` elements at `top` inside the viewport.
//! Elements with text and no explicit height get a default line-block height.
//! Margins do not collapse and widths are always the window width.

use std::cell::RefCell;

use super::{Environment, Length, NodeId, Rect, Surface, WindowSize};

/// Height of a text element without an explicit height
pub const DEFAULT_TEXT_HEIGHT: f64 = 120.0;

#[derive(Debug, Default)]
struct Node {
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
    styles: Vec<(String, String)>,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn style(&self, prop: &str) -> Option<&str> {
        self.styles
            .iter()
            .find(|(p, _)| p == prop)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Position {
    Flow,
    Absolute,
    Fixed,
}

#[derive(Debug)]
struct PageState {
    nodes: Vec<Node>,
    scroll_y: f64,
    window: WindowSize,
    text_height: f64,
}

/// Document top and fixed-ness of an element
struct Placement {
    top: f64,
    fixed: bool,
}

impl PageState {
    const BODY: NodeId = NodeId(0);

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    fn length(&self, node: NodeId, prop: &str) -> Option<f64> {
        let raw = self.node(node).style(prop)?;
        let length: Length = raw.parse().ok()?;
        Some(length.resolve(self.window, self.window.height))
    }

    fn position(&self, node: NodeId) -> Position {
        match self.node(node).style("position") {
            Some("absolute") => Position::Absolute,
            Some("fixed") => Position::Fixed,
            _ => Position::Flow,
        }
    }

    fn height(&self, node: NodeId) -> f64 {
        if let Some(h) = self.length(node, "height") {
            return h;
        }
        let n = self.node(node);
        let flow: Vec<NodeId> = n
            .children
            .iter()
            .copied()
            .filter(|c| self.position(*c) == Position::Flow)
            .collect();
        if flow.is_empty() {
            if n.text.is_empty() {
                0.0
            } else {
                self.text_height
            }
        } else {
            flow.iter().map(|c| self.outer_height(*c)).sum()
        }
    }

    fn outer_height(&self, node: NodeId) -> f64 {
        self.length(node, "margin-top").unwrap_or(0.0)
            + self.height(node)
            + self.length(node, "margin-bottom").unwrap_or(0.0)
    }

    fn placement(&self, node: NodeId) -> Placement {
        if node == Self::BODY {
            return Placement { top: 0.0, fixed: false };
        }
        let own_top = self.length(node, "top").unwrap_or(0.0);
        match self.position(node) {
            Position::Fixed => Placement { top: own_top, fixed: true },
            Position::Absolute => {
                let parent = self.parent_placement(node);
                Placement {
                    top: parent.top + own_top,
                    fixed: parent.fixed,
                }
            }
            Position::Flow => {
                let parent = self.parent_placement(node);
                let mut top = parent.top;
                if let Some(p) = self.node(node).parent {
                    for sibling in &self.node(p).children {
                        if *sibling == node {
                            break;
                        }
                        if self.position(*sibling) == Position::Flow {
                            top += self.outer_height(*sibling);
                        }
                    }
                }
                Placement {
                    top: top + self.length(node, "margin-top").unwrap_or(0.0),
                    fixed: parent.fixed,
                }
            }
        }
    }

    fn parent_placement(&self, node: NodeId) -> Placement {
        match self.node(node).parent {
            Some(p) => self.placement(p),
            None => Placement { top: 0.0, fixed: false },
        }
    }

    fn is_attached(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == Self::BODY {
                return true;
            }
            current = self.node(id).parent;
        }
        false
    }

    fn max_scroll(&self) -> f64 {
        (self.height(Self::BODY) - self.window.height).max(0.0)
    }

    fn matches(&self, node: NodeId, selector: &str) -> bool {
        let n = self.node(node);
        if let Some(id) = selector.strip_prefix('#') {
            n.id.as_deref() == Some(id)
        } else if let Some(class) = selector.strip_prefix('.') {
            n.classes.iter().any(|c| c == class)
        } else {
            n.tag == selector
        }
    }

    /// Attached elements in document order
    fn walk(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![Self::BODY];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.node(id).children.iter().rev().copied());
        }
        out
    }
}

/// Headless `Host` implementation
#[derive(Debug)]
pub struct HeadlessPage {
    state: RefCell<PageState>,
}

impl HeadlessPage {
    pub fn new(width: f64, height: f64) -> Self {
        let body = Node {
            tag: "body".to_string(),
            ..Node::default()
        };
        Self {
            state: RefCell::new(PageState {
                nodes: vec![body],
                scroll_y: 0.0,
                window: WindowSize::new(width, height),
                text_height: DEFAULT_TEXT_HEIGHT,
            }),
        }
    }

    pub fn body(&self) -> NodeId {
        PageState::BODY
    }

    /// Height given to text elements without an explicit height
    pub fn set_text_height(&self, height: f64) {
        self.state.borrow_mut().text_height = height;
    }

    /// Scroll to `y`, clamped to the scrollable range like a browser would
    pub fn set_scroll_y(&self, y: f64) {
        let mut state = self.state.borrow_mut();
        let max = state.max_scroll();
        state.scroll_y = y.clamp(0.0, max);
    }

    pub fn scroll_by(&self, delta: f64) {
        let y = self.state.borrow().scroll_y + delta;
        self.set_scroll_y(y);
    }

    pub fn set_window_size(&self, size: WindowSize) {
        self.state.borrow_mut().window = size;
    }

    pub fn document_height(&self) -> f64 {
        self.state.borrow().height(PageState::BODY)
    }

    pub fn max_scroll(&self) -> f64 {
        self.state.borrow().max_scroll()
    }

    /// Document offset of an element's top edge
    pub fn document_top(&self, node: NodeId) -> f64 {
        self.state.borrow().placement(node).top
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.state.borrow().node(node).children.clone()
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.state.borrow().node(node).parent
    }

    pub fn text(&self, node: NodeId) -> String {
        self.state.borrow().node(node).text.clone()
    }

    pub fn element_id(&self, node: NodeId) -> Option<String> {
        self.state.borrow().node(node).id.clone()
    }

    pub fn classes(&self, node: NodeId) -> Vec<String> {
        self.state.borrow().node(node).classes.clone()
    }

    /// Attached elements matching `selector`, in document order
    pub fn query_all(&self, selector: &str) -> Vec<NodeId> {
        let state = self.state.borrow();
        state
            .walk()
            .into_iter()
            .filter(|id| state.matches(*id, selector))
            .collect()
    }

    /// Total number of elements ever created, attached or not
    pub fn element_count(&self) -> usize {
        self.state.borrow().nodes.len()
    }
}

impl Environment for HeadlessPage {
    fn scroll_y(&self) -> f64 {
        self.state.borrow().scroll_y
    }

    fn window_size(&self) -> WindowSize {
        self.state.borrow().window
    }
}

impl Surface for HeadlessPage {
    fn create_element(&self, tag: &str) -> NodeId {
        let mut state = self.state.borrow_mut();
        let id = NodeId(state.nodes.len() as u32);
        state.nodes.push(Node {
            tag: tag.to_string(),
            ..Node::default()
        });
        id
    }

    fn append_child(&self, parent: NodeId, child: NodeId) {
        let mut state = self.state.borrow_mut();
        if let Some(old) = state.node(child).parent {
            state.node_mut(old).children.retain(|c| *c != child);
        }
        state.node_mut(parent).children.push(child);
        state.node_mut(child).parent = Some(parent);
    }

    fn set_style(&self, node: NodeId, prop: &str, value: &str) {
        let mut state = self.state.borrow_mut();
        let styles = &mut state.node_mut(node).styles;
        match styles.iter_mut().find(|(p, _)| p == prop) {
            Some(entry) => entry.1 = value.to_string(),
            None => styles.push((prop.to_string(), value.to_string())),
        }
    }

    fn remove_style(&self, node: NodeId, prop: &str) {
        self.state
            .borrow_mut()
            .node_mut(node)
            .styles
            .retain(|(p, _)| p != prop);
    }

    fn style(&self, node: NodeId, prop: &str) -> Option<String> {
        self.state.borrow().node(node).style(prop).map(str::to_string)
    }

    fn add_class(&self, node: NodeId, class: &str) {
        let mut state = self.state.borrow_mut();
        let classes = &mut state.node_mut(node).classes;
        if !classes.iter().any(|c| c == class) {
            classes.push(class.to_string());
        }
    }

    fn remove_class(&self, node: NodeId, class: &str) {
        self.state
            .borrow_mut()
            .node_mut(node)
            .classes
            .retain(|c| c != class);
    }

    fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.state
            .borrow()
            .node(node)
            .classes
            .iter()
            .any(|c| c == class)
    }

    fn set_text(&self, node: NodeId, text: &str) {
        self.state.borrow_mut().node_mut(node).text = text.to_string();
    }

    fn set_id(&self, node: NodeId, id: &str) {
        self.state.borrow_mut().node_mut(node).id = Some(id.to_string());
    }

    fn query(&self, selector: &str) -> Option<NodeId> {
        self.query_all(selector).into_iter().next()
    }

    fn is_attached(&self, node: NodeId) -> bool {
        self.state.borrow().is_attached(node)
    }

    fn bounding_rect(&self, node: NodeId) -> Rect {
        let state = self.state.borrow();
        if !state.is_attached(node) {
            return Rect::default();
        }
        let placement = state.placement(node);
        let top = if placement.fixed {
            placement.top
        } else {
            placement.top - state.scroll_y
        };
        Rect::new(top, state.height(node), 0.0, state.window.width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(page: &HeadlessPage, parent: NodeId, height: &str) -> NodeId {
        let node = page.create_element("div");
        page.set_style(node, "height", height);
        page.append_child(parent, node);
        node
    }

    #[test]
    fn test_flow_layout_stacks_children() {
        let page = HeadlessPage::new(1000.0, 800.0);
        let a = block(&page, page.body(), "100px");
        let b = block(&page, page.body(), "50vh");
        page.set_style(b, "margin-top", "20px");

        assert_eq!(page.document_top(a), 0.0);
        assert_eq!(page.document_top(b), 120.0);
        assert_eq!(page.document_height(), 520.0);
    }

    #[test]
    fn test_bounding_rect_follows_scroll_except_fixed() {
        let page = HeadlessPage::new(1000.0, 800.0);
        let _spacer = block(&page, page.body(), "3000px");
        let flow = block(&page, page.body(), "100px");
        let _tail = block(&page, page.body(), "1000px");
        let fixed = block(&page, page.body(), "100vh");
        page.set_style(fixed, "position", "fixed");
        page.set_style(fixed, "top", "0");

        // Fixed nodes take no room in the flow
        assert_eq!(page.document_height(), 4100.0);
        page.set_scroll_y(2500.0);
        assert_eq!(page.scroll_y(), 2500.0);
        assert_eq!(page.bounding_rect(flow).top, 500.0);
        assert_eq!(page.bounding_rect(fixed).top, 0.0);
        assert_eq!(page.bounding_rect(fixed).height(), 800.0);
    }

    #[test]
    fn test_text_without_height_gets_default() {
        let page = HeadlessPage::new(1000.0, 800.0);
        let p = page.create_element("p");
        page.set_text(p, "hello");
        page.append_child(page.body(), p);
        assert_eq!(page.bounding_rect(p).height(), DEFAULT_TEXT_HEIGHT);
    }

    #[test]
    fn test_scroll_is_clamped() {
        let page = HeadlessPage::new(1000.0, 800.0);
        block(&page, page.body(), "1000px");
        page.set_scroll_y(5000.0);
        assert_eq!(page.scroll_y(), 200.0);
        page.set_scroll_y(-5.0);
        assert_eq!(page.scroll_y(), 0.0);
    }

    #[test]
    fn test_query_and_attachment() {
        let page = HeadlessPage::new(1000.0, 800.0);
        let root = page.create_element("div");
        page.set_id(root, "story");
        assert_eq!(page.query("#story"), None);
        assert!(!page.is_attached(root));

        page.append_child(page.body(), root);
        assert_eq!(page.query("#story"), Some(root));
        assert!(page.is_attached(root));

        let child = page.create_element("p");
        page.add_class(child, "graph");
        page.append_child(root, child);
        assert_eq!(page.query_all(".graph"), vec![child]);
    }

    #[test]
    fn test_append_moves_node() {
        let page = HeadlessPage::new(1000.0, 800.0);
        let a = page.create_element("div");
        let b = page.create_element("div");
        let child = page.create_element("div");
        page.append_child(a, child);
        page.append_child(b, child);
        assert!(page.children(a).is_empty());
        assert_eq!(page.children(b), vec![child]);
    }
}
