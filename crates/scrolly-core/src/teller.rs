//! The text side of a story: a fixed graphic root behind a column of text
//! blocks, bracketed by two sentinels that tell when the story region is
//! entered and left.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::env::{Length, NodeId, SharedHost, StyleMap};
use crate::runtime::EventLoop;
use crate::signals::EventStreams;
use crate::state::NarrativeState;
use crate::stream::{Channel, Subscription, Subscriptions};
use crate::tracker::{BlockTrigger, Direction, TrackerSignal, ViewportTracker};
use crate::{Error, Result};

pub const DEFAULT_ACTIVE_COLOR: &str = "#0e1d1d";
pub const DEFAULT_INACTIVE_COLOR: &str = "inherit";
pub const GRAPH_CLASS: &str = "scrolly-teller-graph";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Trigger {
    Activated,
    Deactivated,
    EnterTop,
    EnterBottom,
    ExitTop,
    ExitBottom,
}

impl Trigger {
    pub fn name(&self) -> &'static str {
        match self {
            Trigger::Activated => "activated",
            Trigger::Deactivated => "deactivated",
            Trigger::EnterTop => "enterTop",
            Trigger::EnterBottom => "enterBottom",
            Trigger::ExitTop => "exitTop",
            Trigger::ExitBottom => "exitBottom",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<BlockTrigger> for Trigger {
    fn from(trigger: BlockTrigger) -> Self {
        match trigger {
            BlockTrigger::EnterTop => Trigger::EnterTop,
            BlockTrigger::EnterBottom => Trigger::EnterBottom,
            BlockTrigger::ExitTop => Trigger::ExitTop,
            BlockTrigger::ExitBottom => Trigger::ExitBottom,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GraphState {
    Entered,
    Exited,
}

/// Delivered to every trigger handler
#[derive(Clone)]
pub struct TellerEvent {
    pub trigger: Trigger,
    /// `None` for calls made directly through the API
    pub direction: Option<Direction>,
    /// Index of the text block for block triggers
    pub graph: Option<usize>,
    pub graph_state: Option<GraphState>,
    pub state: NarrativeState,
    pub controller: ScrollyTeller,
}

impl TellerEvent {
    pub fn set_state(&self, patch: Value) {
        self.state.set_state(patch);
    }
}

impl fmt::Debug for TellerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TellerEvent")
            .field("trigger", &self.trigger)
            .field("direction", &self.direction)
            .field("graph", &self.graph)
            .field("graph_state", &self.graph_state)
            .finish()
    }
}

/// Root given either as a selector or as an element
#[derive(Debug, Clone, PartialEq)]
pub enum Root {
    Selector(String),
    Element(NodeId),
}

impl From<&str> for Root {
    fn from(selector: &str) -> Self {
        Root::Selector(selector.to_string())
    }
}

impl From<String> for Root {
    fn from(selector: String) -> Self {
        Root::Selector(selector)
    }
}

impl From<NodeId> for Root {
    fn from(node: NodeId) -> Self {
        Root::Element(node)
    }
}

/// Style overrides laid over the defaults of each owned region
#[derive(Debug, Clone, Default)]
pub struct TellerOptions {
    pub graphic_root_styles: StyleMap,
    pub scroll_cover_styles: StyleMap,
    pub content_well_styles: StyleMap,
    pub graph_styles: StyleMap,
    /// Space above every text block and below the last one; defaults to the
    /// layout config
    pub graph_margin: Option<String>,
}

fn graphic_root_defaults() -> StyleMap {
    StyleMap::new()
        .with("background-color", DEFAULT_INACTIVE_COLOR)
        .with("width", "100vw")
        .with("height", "100vh")
        .with("position", "fixed")
        .with("top", "0")
        .with("left", "0")
        .with("z-index", "-1")
        .with("-webkit-transition", "background-color 2s")
        .with("transition", "background-color 2s")
}

fn scroll_cover_defaults() -> StyleMap {
    StyleMap::new().with("width", "100vw").with("z-index", "5")
}

fn content_well_defaults() -> StyleMap {
    StyleMap::new().with("max-width", "700px").with("width", "100vw")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    GraphicRoot,
    ScrollCover,
    ContentWell,
    Graph,
}

struct Applied {
    graphic_root: StyleMap,
    scroll_cover: StyleMap,
    content_well: StyleMap,
    graph: StyleMap,
}

struct TellerInner {
    host: SharedHost,
    streams: Rc<EventStreams>,
    graphs: Vec<String>,
    anchor_root: NodeId,
    graphic_root: NodeId,
    scroll_cover: NodeId,
    content_well: NodeId,
    top_spacer: NodeId,
    bottom_spacer: NodeId,
    graph_nodes: Vec<NodeId>,
    applied: RefCell<Applied>,
    graph_margin: RefCell<String>,
    active: Cell<bool>,
    mounted: Cell<bool>,
    state: NarrativeState,
    events: Channel<TellerEvent>,
    tracker: Rc<ViewportTracker>,
    subscriptions: RefCell<Subscriptions>,
}

/// Handle to a story's text side. Clones share the same story.
#[derive(Clone)]
pub struct ScrollyTeller {
    inner: Rc<TellerInner>,
}

impl ScrollyTeller {
    /// Build the element tree under `root` and append it.
    ///
    /// Fails when `content` is empty, when the root selector is empty or
    /// matches nothing, or when the root element is not in the document.
    pub fn create(
        host: SharedHost,
        event_loop: Rc<EventLoop>,
        streams: Rc<EventStreams>,
        root: impl Into<Root>,
        content: Vec<String>,
        options: TellerOptions,
        config: &EngineConfig,
    ) -> Result<Self> {
        if content.is_empty() {
            return Err(Error::MissingArgument("content".to_string()));
        }
        let anchor_root = match root.into() {
            Root::Selector(selector) if selector.trim().is_empty() => {
                return Err(Error::MissingArgument("root".to_string()));
            }
            Root::Selector(selector) => host
                .query(&selector)
                .ok_or(Error::RootNotFound(selector))?,
            Root::Element(node) => node,
        };
        if !host.is_attached(anchor_root) {
            return Err(Error::RootDetached);
        }

        let graph_margin = options
            .graph_margin
            .clone()
            .unwrap_or_else(|| config.layout.graph_margin.clone());
        graph_margin.parse::<Length>()?;

        let applied = Applied {
            graphic_root: graphic_root_defaults().merged(&options.graphic_root_styles),
            scroll_cover: scroll_cover_defaults().merged(&options.scroll_cover_styles),
            content_well: content_well_defaults().merged(&options.content_well_styles),
            graph: options.graph_styles.clone(),
        };

        let graphic_root = host.create_element("div");
        applied.graphic_root.apply(host.as_ref(), graphic_root);
        let scroll_cover = host.create_element("div");
        applied.scroll_cover.apply(host.as_ref(), scroll_cover);
        let content_well = host.create_element("div");
        applied.content_well.apply(host.as_ref(), content_well);

        let sentinel_height = format!("{}vh", config.layout.sentinel_fraction * 100.0);
        let top_spacer = host.create_element("div");
        let bottom_spacer = host.create_element("div");
        for (node, class) in [(top_spacer, "top-spacer"), (bottom_spacer, "bottom-spacer")] {
            host.add_class(node, class);
            host.set_style(node, "height", &sentinel_height);
        }

        let last = content.len() - 1;
        let graph_nodes: Vec<NodeId> = content
            .iter()
            .enumerate()
            .map(|(index, text)| {
                let p = host.create_element("p");
                host.set_id(p, &format!("scrolly-teller-graph-{index}"));
                host.add_class(p, GRAPH_CLASS);
                host.set_text(p, text);
                applied.graph.apply(host.as_ref(), p);
                host.set_style(p, "margin-top", &graph_margin);
                if index == last {
                    host.set_style(p, "margin-bottom", &graph_margin);
                }
                host.append_child(content_well, p);
                p
            })
            .collect();

        host.append_child(anchor_root, graphic_root);
        host.append_child(scroll_cover, top_spacer);
        host.append_child(scroll_cover, content_well);
        host.append_child(scroll_cover, bottom_spacer);
        host.append_child(anchor_root, scroll_cover);

        let tracker = ViewportTracker::new(
            host.clone(),
            event_loop,
            top_spacer,
            bottom_spacer,
            graph_nodes.clone(),
        );

        debug!(graphs = content.len(), "Teller created");
        Ok(Self {
            inner: Rc::new(TellerInner {
                host,
                streams,
                graphs: content,
                anchor_root,
                graphic_root,
                scroll_cover,
                content_well,
                top_spacer,
                bottom_spacer,
                graph_nodes,
                applied: RefCell::new(applied),
                graph_margin: RefCell::new(graph_margin),
                active: Cell::new(false),
                mounted: Cell::new(false),
                state: NarrativeState::new(),
                events: Channel::new(),
                tracker,
                subscriptions: RefCell::new(Subscriptions::new()),
            }),
        })
    }

    /// Start tracking scroll. Repeated calls are no-ops until `unmount`.
    pub fn mount(&self) {
        let inner = &self.inner;
        if inner.mounted.get() {
            return;
        }

        let mut subs = Subscriptions::new();
        let tracker = Rc::downgrade(&inner.tracker);
        subs.push(inner.streams.scroll().subscribe(move |_| {
            if let Some(tracker) = tracker.upgrade() {
                tracker.on_scroll();
            }
        }));

        let weak: Weak<TellerInner> = Rc::downgrade(inner);
        subs.push(inner.tracker.signals().subscribe(move |signal| {
            if let Some(inner) = weak.upgrade() {
                ScrollyTeller { inner }.on_signal(*signal);
            }
        }));

        *inner.subscriptions.borrow_mut() = subs;
        inner.mounted.set(true);
        info!(graphs = inner.graphs.len(), "Teller mounted");
    }

    pub fn unmount(&self) {
        if !self.inner.mounted.get() {
            return;
        }
        self.inner.subscriptions.borrow_mut().release_all();
        self.inner.mounted.set(false);
        info!("Teller unmounted");
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.get()
    }

    /// Paint the graphic root (default `#0e1d1d`) and emit `activated`
    pub fn activate(&self, color: Option<&str>) -> &Self {
        self.activate_from(None, color);
        self
    }

    /// Reset the graphic root (default `inherit`) and emit `deactivated`
    pub fn deactivate(&self, color: Option<&str>) -> &Self {
        self.deactivate_from(None, color);
        self
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    fn activate_from(&self, direction: Option<Direction>, color: Option<&str>) {
        let inner = &self.inner;
        inner.host.set_style(
            inner.graphic_root,
            "background-color",
            color.unwrap_or(DEFAULT_ACTIVE_COLOR),
        );
        inner.active.set(true);
        info!(?direction, "Story activated");
        self.emit(Trigger::Activated, direction, None);
    }

    fn deactivate_from(&self, direction: Option<Direction>, color: Option<&str>) {
        let inner = &self.inner;
        inner.host.set_style(
            inner.graphic_root,
            "background-color",
            color.unwrap_or(DEFAULT_INACTIVE_COLOR),
        );
        inner.active.set(false);
        info!(?direction, "Story deactivated");
        self.emit(Trigger::Deactivated, direction, None);
    }

    fn on_signal(&self, signal: TrackerSignal) {
        match signal {
            TrackerSignal::Activate(direction) if !self.is_active() => {
                self.activate_from(Some(direction), None);
            }
            TrackerSignal::Deactivate(direction) if self.is_active() => {
                self.deactivate_from(Some(direction), None);
            }
            TrackerSignal::Block {
                index,
                trigger,
                direction,
            } => self.emit(trigger.into(), Some(direction), Some(index)),
            _ => {}
        }
    }

    fn emit(&self, trigger: Trigger, direction: Option<Direction>, graph: Option<usize>) {
        let graph_state = match trigger {
            Trigger::EnterTop | Trigger::EnterBottom => Some(GraphState::Entered),
            Trigger::ExitTop | Trigger::ExitBottom => Some(GraphState::Exited),
            _ => None,
        };
        self.inner.events.publish(TellerEvent {
            trigger,
            direction,
            graph,
            graph_state,
            state: self.inner.state.clone(),
            controller: self.clone(),
        });
    }

    /// Every event, unfiltered
    pub fn events(&self) -> &Channel<TellerEvent> {
        &self.inner.events
    }

    pub fn on(&self, trigger: Trigger, mut handler: impl FnMut(&TellerEvent) + 'static) -> Subscription {
        self.inner.events.subscribe(move |event| {
            if event.trigger == trigger {
                handler(event);
            }
        })
    }

    /// Like `on`, for one direction only
    pub fn on_from(
        &self,
        trigger: Trigger,
        direction: Direction,
        mut handler: impl FnMut(&TellerEvent) + 'static,
    ) -> Subscription {
        self.inner.events.subscribe(move |event| {
            if event.trigger == trigger && event.direction == Some(direction) {
                handler(event);
            }
        })
    }

    pub fn state(&self) -> &NarrativeState {
        &self.inner.state
    }

    pub fn set_state(&self, patch: Value) {
        self.inner.state.set_state(patch);
    }

    pub fn graphs(&self) -> &[String] {
        &self.inner.graphs
    }

    pub fn graph_nodes(&self) -> &[NodeId] {
        &self.inner.graph_nodes
    }

    pub fn anchor_root(&self) -> NodeId {
        self.inner.anchor_root
    }

    pub fn graphic_root(&self) -> NodeId {
        self.inner.graphic_root
    }

    pub fn scroll_cover(&self) -> NodeId {
        self.inner.scroll_cover
    }

    pub fn content_well(&self) -> NodeId {
        self.inner.content_well
    }

    pub fn sentinels(&self) -> (NodeId, NodeId) {
        (self.inner.top_spacer, self.inner.bottom_spacer)
    }

    pub fn tracker(&self) -> &Rc<ViewportTracker> {
        &self.inner.tracker
    }

    pub fn graph_margin(&self) -> String {
        self.inner.graph_margin.borrow().clone()
    }

    /// Change the space between text blocks and reflow every block
    pub fn set_graph_margin(&self, margin: &str) -> Result<()> {
        margin.parse::<Length>()?;
        *self.inner.graph_margin.borrow_mut() = margin.to_string();
        self.reflow_graph_margin();
        Ok(())
    }

    /// Apply the stored graph margin to every block
    fn reflow_graph_margin(&self) {
        let inner = &self.inner;
        let margin = inner.graph_margin.borrow();
        let last = inner.graph_nodes.len().saturating_sub(1);
        for (index, node) in inner.graph_nodes.iter().enumerate() {
            inner.host.set_style(*node, "margin-top", &margin);
            if index == last {
                inner.host.set_style(*node, "margin-bottom", &margin);
            }
        }
    }

    pub fn set_graphic_root_styles(&self, overrides: &StyleMap) {
        self.restyle(Region::GraphicRoot, graphic_root_defaults().merged(overrides));
    }

    pub fn set_scroll_cover_styles(&self, overrides: &StyleMap) {
        self.restyle(Region::ScrollCover, scroll_cover_defaults().merged(overrides));
    }

    pub fn set_content_well_styles(&self, overrides: &StyleMap) {
        self.restyle(Region::ContentWell, content_well_defaults().merged(overrides));
    }

    pub fn set_graph_styles(&self, overrides: &StyleMap) {
        self.restyle(Region::Graph, overrides.clone());
    }

    /// Replace the applied styles of a region, dropping properties the new
    /// map no longer sets
    fn restyle(&self, region: Region, next: StyleMap) {
        let inner = &self.inner;
        let mut applied = inner.applied.borrow_mut();
        let (slot, nodes) = match region {
            Region::GraphicRoot => (&mut applied.graphic_root, vec![inner.graphic_root]),
            Region::ScrollCover => (&mut applied.scroll_cover, vec![inner.scroll_cover]),
            Region::ContentWell => (&mut applied.content_well, vec![inner.content_well]),
            Region::Graph => (&mut applied.graph, inner.graph_nodes.clone()),
        };
        for node in nodes {
            for (prop, _) in slot.iter() {
                if next.get(prop).is_none() {
                    inner.host.remove_style(node, prop);
                }
            }
            next.apply(inner.host.as_ref(), node);
        }
        *slot = next;

        // Block margins are owned by the graph margin setting
        if region == Region::Graph {
            drop(applied);
            self.reflow_graph_margin();
        }
    }
}
