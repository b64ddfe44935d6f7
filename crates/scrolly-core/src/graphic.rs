//! Scene Activation Controller.
//!
//! Owns the visual plate, the text plate and the ordered scenes. `mount`
//! attaches elements the first time only and (re)activates every scene;
//! `unmount` releases every handle taken while mounted.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::env::{NodeId, SharedHost, StyleMap};
use crate::progress::{poll_anchor, ProgressMapper, SceneSpan};
use crate::runtime::EventLoop;
use crate::scene::{is_hidden, SceneActivationParams, SceneMountParams, SceneRegistry};
use crate::signals::EventStreams;
use crate::stream::{Channel, Subscriptions};
use crate::{Error, Result};

pub const HIDDEN_CLASS: &str = "hidden-scene";

/// Text fragment placed on the text plate at `screen_position` screens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextItem {
    #[serde(default = "default_kind")]
    pub kind: String,
    pub text: String,
    pub screen_position: f64,
}

fn default_kind() -> String {
    "text".to_string()
}

#[derive(Debug, Clone, Default)]
pub struct GraphicOptions {
    /// Id of the element the plates are appended to
    pub mount_point: String,
    pub text: Vec<TextItem>,
    /// Log every signal and arm the fallback key sequence
    pub debug: bool,
    /// Screen lengths of padding after every scene; defaults to the layout config
    pub scene_buffer: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
struct Plates {
    viz: NodeId,
    text: NodeId,
    lead: NodeId,
    tail: NodeId,
}

pub struct Graphic {
    host: SharedHost,
    event_loop: Rc<EventLoop>,
    streams: Rc<EventStreams>,
    config: EngineConfig,
    registry: RefCell<SceneRegistry>,
    mount_point: NodeId,
    plates: Plates,
    text_nodes: Rc<Vec<(NodeId, f64)>>,
    scene_buffer: f64,
    total_screen_lengths: f64,
    debug: bool,
    /// Elements attached to the document
    is_mounted: Cell<bool>,
    /// Subscriptions live
    is_active: Cell<bool>,
    cancel_on_unmount: RefCell<Subscriptions>,
    scene_subscriptions: RefCell<Vec<(String, Subscriptions)>>,
}

fn px(value: f64) -> String {
    format!("{value}px")
}

impl Graphic {
    pub fn new(
        host: SharedHost,
        event_loop: Rc<EventLoop>,
        streams: Rc<EventStreams>,
        registry: SceneRegistry,
        options: GraphicOptions,
        config: EngineConfig,
    ) -> Result<Self> {
        let mount_point = host
            .query(&format!("#{}", options.mount_point))
            .ok_or_else(|| Error::MountPointNotFound(options.mount_point.clone()))?;

        let scene_buffer = options.scene_buffer.unwrap_or(config.layout.scene_buffer);
        let total_screen_lengths = registry.total_screen_lengths(scene_buffer);

        let plates = Plates {
            viz: host.create_element("div"),
            text: host.create_element("div"),
            lead: host.create_element("div"),
            tail: host.create_element("div"),
        };

        let text_nodes = options
            .text
            .iter()
            .map(|item| {
                let node = host.create_element("div");
                host.add_class(node, "text-item");
                host.add_class(node, &format!("text-{}", item.kind));
                host.set_text(node, &item.text);
                StyleMap::new()
                    .with("position", "absolute")
                    .with("left", "0")
                    .with("width", "100%")
                    .apply(host.as_ref(), node);
                (node, item.screen_position)
            })
            .collect();

        Ok(Self {
            host,
            event_loop,
            streams,
            config,
            registry: RefCell::new(registry),
            mount_point,
            plates,
            text_nodes: Rc::new(text_nodes),
            scene_buffer,
            total_screen_lengths,
            debug: options.debug,
            is_mounted: Cell::new(false),
            is_active: Cell::new(false),
            cancel_on_unmount: RefCell::new(Subscriptions::new()),
            scene_subscriptions: RefCell::new(Vec::new()),
        })
    }

    pub fn mount(&self) {
        if self.is_active.get() {
            debug!("Graphic already mounted");
            return;
        }

        let initial_height = self.host.window_size().height;
        if !self.is_mounted.get() {
            self.initialize_plates();
        }

        let mut subs = Subscriptions::new();
        subs.append(self.listen_resize(initial_height));
        self.attach_scene_containers();
        subs.append(self.activate_all_scenes());
        *self.cancel_on_unmount.borrow_mut() = subs;

        self.is_mounted.set(true);
        self.is_active.set(true);
        info!(scenes = self.registry.borrow().len(), "Graphic mounted");
    }

    pub fn unmount(&self) {
        if !self.is_active.get() {
            return;
        }
        self.cancel_on_unmount.borrow_mut().release_all();

        let mut registry = self.registry.borrow_mut();
        for (id, subs) in self.scene_subscriptions.borrow_mut().drain(..) {
            if let Some(scene) = registry.get_mut(&id) {
                scene.deactivate(subs);
            }
        }
        self.is_active.set(false);
        info!("Graphic unmounted");
    }

    /// Whether scroll and resize are currently driving the scenes
    pub fn is_active(&self) -> bool {
        self.is_active.get()
    }

    pub fn set_fallback(&self, value: bool) {
        self.streams.set_fallback(value);
    }

    pub fn screen_height(&self) -> f64 {
        self.streams.screen_height().latest().unwrap_or(0.0)
    }

    pub fn containers_for_scene(&self, id: &str) -> Result<NodeId> {
        self.registry
            .borrow()
            .get(id)
            .map(|scene| scene.container())
            .ok_or_else(|| Error::UnknownScene(id.to_string()))
    }

    pub fn scene_order(&self) -> Vec<String> {
        self.registry.borrow().order()
    }

    pub fn viz_plate(&self) -> NodeId {
        self.plates.viz
    }

    pub fn text_plate(&self) -> NodeId {
        self.plates.text
    }

    pub fn text_nodes(&self) -> Vec<NodeId> {
        self.text_nodes.iter().map(|(node, _)| *node).collect()
    }

    fn initialize_plates(&self) {
        let host = &self.host;
        let Plates { viz, text, lead, tail } = self.plates;
        for node in [viz, lead, text, tail] {
            host.append_child(self.mount_point, node);
        }

        StyleMap::new()
            .with("z-index", "1")
            .with("position", "fixed")
            .with("top", "0")
            .with("left", "0")
            .with("width", "100%")
            .apply(host.as_ref(), viz);
        StyleMap::new()
            .with("z-index", "10")
            .with("position", "relative")
            .with("top", "0")
            .with("left", "0")
            .with("width", "100%")
            .apply(host.as_ref(), text);
        host.add_class(viz, "viz-plate");
        host.add_class(text, "text-plate");

        for (node, _) in self.text_nodes.iter() {
            host.append_child(text, *node);
        }
    }

    /// Screen height follows the window, except for small growth such as a
    /// mobile URL bar collapsing, which is absorbed by the visual plate's
    /// top margin
    fn listen_resize(&self, initial_height: f64) -> Subscriptions {
        let mut subs = Subscriptions::new();

        let host = self.host.clone();
        let plates = self.plates;
        let text_nodes = self.text_nodes.clone();
        let (total, buffer) = (self.total_screen_lengths, self.scene_buffer);
        subs.push(self.streams.screen_height().subscribe(move |h| {
            host.set_style(plates.text, "height", &px(h * total));
            host.set_style(plates.viz, "height", &px(*h));
            host.set_style(plates.lead, "height", &px(h * buffer));
            host.set_style(plates.tail, "height", &px(h * buffer));
            for (node, position) in text_nodes.iter() {
                host.set_style(*node, "top", &px(h * position));
            }
        }));

        let host = self.host.clone();
        let viz = self.plates.viz;
        let screen_height = self.streams.screen_height().clone();
        let tolerance = self.config.layout.resize_tolerance;
        subs.push(self.streams.resize().subscribe(move |window| {
            let height = window.height;
            let growth = height - initial_height;
            if growth > 0.0 && growth <= tolerance {
                host.set_style(viz, "margin-top", &px(growth));
            } else if growth == 0.0 {
                host.set_style(viz, "margin-top", "0px");
            }
            let next = if growth.abs() <= tolerance { initial_height } else { height };
            debug!(height, screen_height = next, "Resized");
            screen_height.publish(next);
        }));

        subs
    }

    fn attach_scene_containers(&self) {
        let attach = !self.is_mounted.get();
        let mut registry = self.registry.borrow_mut();
        for (index, id, scene) in registry.iter_mut() {
            let container = scene.container();
            if attach {
                self.host.add_class(container, &format!("{id}-viz"));
                self.host.add_class(container, "viz");
                self.host
                    .set_style(container, "z-index", &(100 - index as i64).to_string());
                self.host.append_child(self.plates.viz, container);
            }
            scene.mount(&SceneMountParams {
                plate: container,
                host: self.host.clone(),
            });
        }
    }

    fn activate_all_scenes(&self) -> Subscriptions {
        let mut subs = Subscriptions::new();

        let (anchor, poller) = poll_anchor(
            &self.event_loop,
            self.host.clone(),
            self.mount_point,
            self.config.timing.anchor_poll_ms,
        );
        subs.push(poller);

        let mapper = ProgressMapper::new(
            self.host.clone(),
            self.streams.scroll().clone(),
            self.streams.screen_height().clone(),
            anchor.clone(),
            self.config.layout.header_buffer,
        );

        let mut registry = self.registry.borrow_mut();
        let offsets: Vec<f64> = (0..registry.len())
            .map(|index| registry.offset_screens(index))
            .collect();

        let mut scene_subs = self.scene_subscriptions.borrow_mut();
        for (index, id, scene) in registry.iter_mut() {
            let span = SceneSpan {
                offset_screens: offsets[index],
                screen_lengths: scene.screen_lengths(),
            };
            let progress = mapper.progress(span);

            let params = SceneActivationParams {
                id: id.to_string(),
                resize: self.streams.resize().clone(),
                screen_height: self.streams.screen_height().clone(),
                fallback: self.streams.fallback().clone(),
                progress: progress.clone(),
                timing: self.config.timing.clone(),
                event_loop: self.event_loop.clone(),
            };
            scene_subs.push((id.to_string(), scene.activate(&params)));

            let host = self.host.clone();
            let container = scene.container();
            subs.push(progress.subscribe(move |p| {
                if is_hidden(index, *p) {
                    host.add_class(container, HIDDEN_CLASS);
                } else {
                    host.remove_class(container, HIDDEN_CLASS);
                }
            }));
        }

        if self.debug {
            subs.append(self.debug_subscriptions(&anchor));
        }
        subs
    }

    fn debug_subscriptions(&self, anchor: &Channel<f64>) -> Subscriptions {
        let streams = &self.streams;
        vec![
            streams.arm_fallback_toggle(),
            streams
                .resize()
                .subscribe(|w| debug!(width = w.width, height = w.height, "resize")),
            streams.scroll().subscribe(|y| debug!(scroll_y = y, "scroll")),
            anchor.subscribe(|top| debug!(anchor_top = top, "anchor")),
            streams.fallback().subscribe(|f| debug!(fallback = f, "fallback")),
            streams
                .screen_height()
                .subscribe(|h| debug!(screen_height = h, "screen height")),
        ]
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{HeadlessPage, Surface};
    use crate::scene::{Stage, StageScene, StepData};

    fn page_with_mount() -> Rc<HeadlessPage> {
        let page = Rc::new(HeadlessPage::new(1000.0, 800.0));
        let root = page.create_element("div");
        page.set_id(root, "graphic");
        page.append_child(page.body(), root);
        page
    }

    fn graphic(page: &Rc<HeadlessPage>, scenes: &[(&str, f64)]) -> Graphic {
        let host: SharedHost = page.clone();
        let event_loop = EventLoop::new();
        let config = EngineConfig::default();
        let streams = Rc::new(EventStreams::new(host.clone(), &event_loop, &config));
        let mut registry = SceneRegistry::new();
        for (id, lengths) in scenes {
            let stage = Stage::new("only", vec![StepData::new("s", 0.0)]).unwrap();
            let scene = StageScene::new(host.clone(), *lengths, vec![stage]).unwrap();
            registry.register(*id, Box::new(scene)).unwrap();
        }
        let options = GraphicOptions {
            mount_point: "graphic".into(),
            text: vec![TextItem {
                kind: "text".into(),
                text: "hello".into(),
                screen_position: 1.5,
            }],
            ..GraphicOptions::default()
        };
        Graphic::new(host, event_loop, streams, registry, options, config).unwrap()
    }

    #[test]
    fn test_missing_mount_point() {
        let page: SharedHost = Rc::new(HeadlessPage::new(1000.0, 800.0));
        let event_loop = EventLoop::new();
        let config = EngineConfig::default();
        let streams = Rc::new(EventStreams::new(page.clone(), &event_loop, &config));
        let options = GraphicOptions {
            mount_point: "nowhere".into(),
            ..GraphicOptions::default()
        };
        let err = Graphic::new(page, event_loop, streams, SceneRegistry::new(), options, config).err();
        assert!(matches!(err, Some(Error::MountPointNotFound(id)) if id == "nowhere"));
    }

    #[test]
    fn test_mount_decorates_and_lays_out() {
        let page = page_with_mount();
        let graphic = graphic(&page, &[("intro", 2.0), ("chart", 3.0)]);
        graphic.mount();

        let intro = graphic.containers_for_scene("intro").unwrap();
        let chart = graphic.containers_for_scene("chart").unwrap();
        assert!(page.has_class(intro, "viz") && page.has_class(intro, "intro-viz"));
        assert_eq!(page.style(intro, "z-index").as_deref(), Some("100"));
        assert_eq!(page.style(chart, "z-index").as_deref(), Some("99"));
        assert_eq!(page.parent(intro), Some(graphic.viz_plate()));

        // Mount publishes the full window height; (2 + 0.5) + (3 + 0.5) screens
        assert_eq!(graphic.screen_height(), 800.0);
        assert_eq!(page.style(graphic.text_plate(), "height").as_deref(), Some("4800px"));
        assert_eq!(page.style(graphic.text_nodes()[0], "top").as_deref(), Some("1200px"));

        assert!(matches!(
            graphic.containers_for_scene("missing"),
            Err(Error::UnknownScene(_))
        ));
    }

    #[test]
    fn test_remount_does_not_duplicate_nodes() {
        let page = page_with_mount();
        let graphic = graphic(&page, &[("intro", 2.0)]);
        graphic.mount();
        let count = page.element_count();
        let children = page.children(graphic.viz_plate()).len();

        graphic.mount();
        graphic.unmount();
        graphic.mount();
        assert_eq!(page.element_count(), count);
        assert_eq!(page.children(graphic.viz_plate()).len(), children);
        assert!(graphic.is_active());
        graphic.unmount();
        assert!(!graphic.is_active());
        assert_eq!(page.element_count(), count);
    }

    #[test]
    fn test_unmount_releases_listeners() {
        let page = page_with_mount();
        let graphic = graphic(&page, &[("intro", 2.0), ("chart", 1.0)]);
        let before = graphic.streams.scroll().listener_count();
        graphic.mount();
        assert!(graphic.streams.scroll().listener_count() > before);
        graphic.unmount();
        assert_eq!(graphic.streams.scroll().listener_count(), before);
        assert_eq!(graphic.event_loop.pending_timers(), 0);
    }

    #[test]
    fn test_small_growth_is_absorbed_by_plate_margin() {
        let page = page_with_mount();
        let graphic = graphic(&page, &[("intro", 1.0)]);
        graphic.mount();

        page.set_window_size(crate::env::WindowSize::new(1000.0, 840.0));
        graphic.streams.dispatch(crate::signals::RawEvent::Resize);
        graphic.event_loop.advance(100);
        assert_eq!(page.style(graphic.viz_plate(), "margin-top").as_deref(), Some("40px"));
        assert_eq!(graphic.screen_height(), 800.0);

        page.set_window_size(crate::env::WindowSize::new(1000.0, 600.0));
        graphic.streams.dispatch(crate::signals::RawEvent::Resize);
        graphic.event_loop.advance(100);
        assert_eq!(graphic.screen_height(), 600.0);
    }
}
