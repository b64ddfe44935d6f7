//! Scenes: visual units that consume a number of screen lengths of scroll.
//!
//! The controller only talks to scenes through the `Scene` trait. Two
//! implementations ship with the engine:
//! - `stage` - steps grouped into stages, dispatched to registered handlers
//! - `video` - a media element scrubbed by the frame-drain scheduler

pub mod stage;
pub mod video;

use std::rc::Rc;

use indexmap::IndexMap;

use crate::config::TimingConfig;
use crate::env::{NodeId, SharedHost, WindowSize};
use crate::runtime::EventLoop;
use crate::stream::{Channel, Subscriptions};
use crate::{Error, Result};

pub use stage::{Stage, StageScene, StepContext, StepData};
pub use video::{FrameDrain, HeadlessMedia, MediaElement, VideoParams, VideoScene};

/// Everything a scene may subscribe to while active
#[derive(Clone)]
pub struct SceneActivationParams {
    pub id: String,
    pub resize: Channel<WindowSize>,
    pub screen_height: Channel<f64>,
    pub fallback: Channel<bool>,
    /// This scene's progress in [0, 1]
    pub progress: Channel<f64>,
    pub timing: TimingConfig,
    pub event_loop: Rc<EventLoop>,
}

pub struct SceneMountParams {
    /// Element the scene draws into
    pub plate: NodeId,
    pub host: SharedHost,
}

pub trait Scene {
    /// Viewport heights of scroll this scene consumes
    fn screen_lengths(&self) -> f64;

    fn container(&self) -> NodeId;

    /// Attach drawing surfaces. Called on every controller mount; element
    /// creation must only happen the first time.
    fn mount(&mut self, params: &SceneMountParams);

    /// Subscribe to live streams. Every handle created must be returned.
    fn activate(&mut self, params: &SceneActivationParams) -> Subscriptions;

    fn deactivate(&mut self, mut subscriptions: Subscriptions) {
        subscriptions.release_all();
    }
}

/// Ordered id → scene map. Iteration order is stacking and scroll order.
#[derive(Default)]
pub struct SceneRegistry {
    scenes: IndexMap<String, Box<dyn Scene>>,
}

impl SceneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a scene at the end of the order
    pub fn register(&mut self, id: impl Into<String>, scene: Box<dyn Scene>) -> Result<()> {
        let id = id.into();
        if self.scenes.contains_key(&id) {
            return Err(Error::DuplicateScene(id));
        }
        self.scenes.insert(id, scene);
        Ok(())
    }

    /// Build from a lookup map plus a separate order. Every ordered id must
    /// exist in the map and every mapped scene must appear in the order.
    pub fn from_parts(
        mut scenes: std::collections::HashMap<String, Box<dyn Scene>>,
        order: &[String],
    ) -> Result<Self> {
        let mut registry = Self::new();
        for id in order {
            let scene = scenes
                .remove(id)
                .ok_or_else(|| Error::UnknownScene(id.clone()))?;
            registry.register(id.clone(), scene)?;
        }
        if let Some(orphan) = scenes.into_keys().next() {
            return Err(Error::OrphanScene(orphan));
        }
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn order(&self) -> Vec<String> {
        self.scenes.keys().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&dyn Scene> {
        self.scenes.get(id).map(|s| s.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &str, &mut Box<dyn Scene>)> {
        self.scenes
            .iter_mut()
            .enumerate()
            .map(|(index, (id, scene))| (index, id.as_str(), scene))
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Box<dyn Scene>> {
        self.scenes.get_mut(id)
    }

    /// Sum of screen lengths of every scene before `index`
    pub fn offset_screens(&self, index: usize) -> f64 {
        self.scenes
            .values()
            .take(index)
            .map(|s| s.screen_lengths())
            .sum()
    }

    /// Total scroll length including `buffer` screens after every scene
    pub fn total_screen_lengths(&self, buffer: f64) -> f64 {
        self.scenes
            .values()
            .map(|s| s.screen_lengths() + buffer)
            .sum()
    }
}

/// Visibility rule at progress boundaries: the first scene hides once fully
/// scrolled past, later scenes stay hidden until they start.
pub fn is_hidden(index: usize, progress: f64) -> bool {
    if index == 0 {
        progress == 1.0
    } else {
        progress == 0.0
    }
}
