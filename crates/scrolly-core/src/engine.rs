//! Entry point tying a host, a clock and the shared event streams together.

use std::rc::Rc;

use tracing::debug;

use crate::config::EngineConfig;
use crate::env::SharedHost;
use crate::graphic::{Graphic, GraphicOptions};
use crate::runtime::{EventLoop, Millis};
use crate::scene::SceneRegistry;
use crate::signals::{EventStreams, RawEvent};
use crate::teller::{Root, ScrollyTeller, TellerOptions};
use crate::Result;

pub struct Engine {
    host: SharedHost,
    event_loop: Rc<EventLoop>,
    streams: Rc<EventStreams>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(host: SharedHost, config: EngineConfig) -> Self {
        Self::with_event_loop(host, EventLoop::new(), config)
    }

    pub fn with_event_loop(host: SharedHost, event_loop: Rc<EventLoop>, config: EngineConfig) -> Self {
        let streams = Rc::new(EventStreams::new(host.clone(), &event_loop, &config));
        debug!(debug = config.general.debug, "Engine created");
        Self {
            host,
            event_loop,
            streams,
            config,
        }
    }

    pub fn host(&self) -> &SharedHost {
        &self.host
    }

    pub fn event_loop(&self) -> &Rc<EventLoop> {
        &self.event_loop
    }

    pub fn streams(&self) -> &Rc<EventStreams> {
        &self.streams
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Scene-driven story over the given scenes
    pub fn graphic(&self, registry: SceneRegistry, mut options: GraphicOptions) -> Result<Graphic> {
        options.debug |= self.config.general.debug;
        Graphic::new(
            self.host.clone(),
            self.event_loop.clone(),
            self.streams.clone(),
            registry,
            options,
            self.config.clone(),
        )
    }

    /// Text-driven story under `root`
    pub fn teller(
        &self,
        root: impl Into<Root>,
        content: Vec<String>,
        options: TellerOptions,
    ) -> Result<ScrollyTeller> {
        ScrollyTeller::create(
            self.host.clone(),
            self.event_loop.clone(),
            self.streams.clone(),
            root,
            content,
            options,
            &self.config,
        )
    }

    pub fn dispatch(&self, event: RawEvent) {
        self.streams.dispatch(event);
    }

    /// Move the clock to `now`, then run one animation frame
    pub fn tick(&self, now: Millis) -> usize {
        self.event_loop.tick(now)
    }

    /// Move the clock forward by `delta`, then flush pending frames
    pub fn advance(&self, delta: Millis) {
        self.event_loop.advance(delta);
        while self.event_loop.pending_frames() > 0 {
            self.event_loop.run_frame();
        }
    }
}
