//! Media-backed scene and its frame-drain scheduler.
//!
//! Progress updates (throttled, de-duplicated) produce a plan: a short ramp
//! of frame numbers from the last drawn frame to the target frame. Each
//! ready tick from the media element (debounced) either restarts from a new
//! plan or, when the plan is unchanged, drains the next frame of the
//! remainder. Drawing a frame that is already showing re-fires the ready
//! tick on the next turn of the loop so the drain never stalls, and a
//! keep-alive tick is forced on progress at most once per second.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Scene, SceneActivationParams, SceneMountParams};
use crate::config::MediaConfig;
use crate::env::{NodeId, SharedHost, StyleMap};
use crate::runtime::timing::ramp;
use crate::stream::{Channel, Subscriptions};

/// Playable element the scheduler scrubs
pub trait MediaElement {
    fn node(&self) -> NodeId;

    /// Current playback position in seconds
    fn current_time(&self) -> f64;

    fn seek(&self, seconds: f64);

    fn pause(&self);

    /// Ticks whenever the media reports a new playback position
    fn ready(&self) -> Channel<()>;

    /// Emit a synthetic ready tick
    fn fire_ready(&self) {
        self.ready().publish(());
    }
}

/// In-memory media element. Seeking reports a ready tick immediately.
pub struct HeadlessMedia {
    node: NodeId,
    current_time: Cell<f64>,
    paused: Cell<bool>,
    seeks: RefCell<Vec<f64>>,
    ready: Channel<()>,
}

impl HeadlessMedia {
    pub fn new(host: &SharedHost) -> Self {
        Self {
            node: host.create_element("video"),
            current_time: Cell::new(0.0),
            paused: Cell::new(false),
            seeks: RefCell::new(Vec::new()),
            ready: Channel::new(),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.get()
    }

    /// Every position sought so far, in seconds
    pub fn seeks(&self) -> Vec<f64> {
        self.seeks.borrow().clone()
    }
}

impl MediaElement for HeadlessMedia {
    fn node(&self) -> NodeId {
        self.node
    }

    fn current_time(&self) -> f64 {
        self.current_time.get()
    }

    fn seek(&self, seconds: f64) {
        self.current_time.set(seconds);
        self.seeks.borrow_mut().push(seconds);
        self.ready.publish(());
    }

    fn pause(&self) {
        self.paused.set(true);
    }

    fn ready(&self) -> Channel<()> {
        self.ready.clone()
    }
}

/// What a ready tick asks the scene to do
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrainAction {
    /// No plan yet
    Idle,
    Draw(f64),
    /// Plan unchanged and fully drained
    Exhausted,
}

/// Scheduler state, free of any media or timing concerns
#[derive(Debug, Default)]
pub struct FrameDrain {
    last_drawn: f64,
    plan: Option<Vec<f64>>,
    last_plan: Vec<f64>,
    remainder: VecDeque<f64>,
}

impl FrameDrain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan `steps` frames from the last drawn frame to `num_frames × progress`
    pub fn plan(&mut self, progress: f64, num_frames: f64, steps: usize) -> &[f64] {
        let plan = ramp(self.last_drawn, num_frames * progress, steps);
        self.plan.insert(plan).as_slice()
    }

    pub fn on_ready(&mut self) -> DrainAction {
        let Some(plan) = self.plan.as_ref() else {
            return DrainAction::Idle;
        };
        if *plan == self.last_plan {
            return match self.remainder.pop_front() {
                Some(frame) => DrainAction::Draw(frame),
                None => DrainAction::Exhausted,
            };
        }
        self.last_plan = plan.clone();
        self.remainder = plan.iter().skip(1).copied().collect();
        match plan.first() {
            Some(frame) => DrainAction::Draw(*frame),
            None => DrainAction::Exhausted,
        }
    }

    pub fn mark_drawn(&mut self, frame: f64) {
        self.last_drawn = frame;
    }

    pub fn last_drawn(&self) -> f64 {
        self.last_drawn
    }

    pub fn remainder(&self) -> Vec<f64> {
        self.remainder.iter().copied().collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoParams {
    pub screen_lengths: f64,
    pub framerate: f64,
    pub num_frames: f64,
    pub frame_steps_desktop: usize,
    pub frame_steps_mobile: usize,
    pub is_mobile: bool,
}

impl VideoParams {
    /// Frame steps taken from the engine's media defaults
    pub fn new(screen_lengths: f64, framerate: f64, num_frames: f64, media: &MediaConfig) -> Self {
        Self {
            screen_lengths,
            framerate,
            num_frames,
            frame_steps_desktop: media.frame_steps_desktop,
            frame_steps_mobile: media.frame_steps_mobile,
            is_mobile: false,
        }
    }

    pub fn frame_steps(&self) -> usize {
        if self.is_mobile {
            self.frame_steps_mobile
        } else {
            self.frame_steps_desktop
        }
    }
}

const PIN_CLASS: &str = "pinned";
const UNPIN_CLASS: &str = "not-pinned";

pub struct VideoScene {
    params: VideoParams,
    media: Rc<dyn MediaElement>,
    container: NodeId,
    drain: Rc<RefCell<FrameDrain>>,
    is_mounted: bool,
    host: SharedHost,
}

impl VideoScene {
    pub fn new(host: SharedHost, media: Rc<dyn MediaElement>, params: VideoParams) -> Self {
        let container = host.create_element("div");
        host.add_class(container, "vid-container");
        host.add_class(container, if params.is_mobile { "mobile-vid" } else { "desktop-vid" });
        host.add_class(container, PIN_CLASS);
        StyleMap::new().with("width", "100%").apply(host.as_ref(), container);
        host.append_child(container, media.node());

        Self {
            params,
            media,
            container,
            drain: Rc::new(RefCell::new(FrameDrain::new())),
            is_mounted: false,
            host,
        }
    }

    pub fn last_drawn(&self) -> f64 {
        self.drain.borrow().last_drawn()
    }
}

/// Seek to `frame` unless it is already showing; otherwise re-fire the
/// ready tick on the next turn of the loop
fn draw(
    frame: f64,
    framerate: f64,
    media: &Rc<dyn MediaElement>,
    drain: &RefCell<FrameDrain>,
    event_loop: &Rc<crate::runtime::EventLoop>,
) {
    let showing = media.current_time() * framerate;
    if (frame - showing).abs() > f64::EPSILON {
        debug!(frame, "Drawing frame");
        drain.borrow_mut().mark_drawn(frame);
        media.seek(frame / framerate);
    } else {
        refire(media, event_loop);
    }
}

fn refire(media: &Rc<dyn MediaElement>, event_loop: &Rc<crate::runtime::EventLoop>) {
    let media = Rc::downgrade(media);
    event_loop
        .set_timeout(0, move || {
            if let Some(media) = media.upgrade() {
                media.fire_ready();
            }
        })
        .detach();
}

impl Scene for VideoScene {
    fn screen_lengths(&self) -> f64 {
        self.params.screen_lengths
    }

    fn container(&self) -> NodeId {
        self.container
    }

    fn mount(&mut self, params: &SceneMountParams) {
        if !self.is_mounted {
            params.host.append_child(params.plate, self.media.node());
            self.media.pause();
        }
        self.is_mounted = true;
    }

    fn activate(&mut self, params: &SceneActivationParams) -> Subscriptions {
        let mut subs = Subscriptions::new();

        let (host, container) = (self.host.clone(), self.container);
        subs.push(params.progress.subscribe(move |p| {
            if *p > 0.0 && *p < 1.0 {
                host.add_class(container, PIN_CLASS);
                host.remove_class(container, UNPIN_CLASS);
            } else {
                host.remove_class(container, PIN_CLASS);
                host.add_class(container, UNPIN_CLASS);
            }
        }));

        let drain = self.drain.clone();
        let (num_frames, steps) = (self.params.num_frames, self.params.frame_steps());
        subs.push(
            params
                .progress
                .throttle(&params.event_loop, params.timing.frame_throttle_ms)
                .distinct()
                .subscribe(move |p| {
                    let mut drain = drain.borrow_mut();
                    let plan = drain.plan(*p, num_frames, steps);
                    debug!(progress = p, frames = ?plan, "Planned frames");
                }),
        );

        let drain = self.drain.clone();
        let media = self.media.clone();
        let event_loop = params.event_loop.clone();
        let framerate = self.params.framerate;
        subs.push(
            self.media
                .ready()
                .debounce(&params.event_loop, params.timing.ready_debounce_ms)
                .subscribe(move |_| {
                    let action = drain.borrow_mut().on_ready();
                    match action {
                        DrainAction::Idle => {}
                        DrainAction::Draw(frame) => draw(frame, framerate, &media, &drain, &event_loop),
                        DrainAction::Exhausted => refire(&media, &event_loop),
                    }
                }),
        );

        let media = self.media.clone();
        subs.push(
            params
                .progress
                .throttle(&params.event_loop, params.timing.keep_alive_ms)
                .subscribe(move |_| media.fire_ready()),
        );

        subs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingConfig;
    use crate::env::{HeadlessPage, WindowSize};
    use crate::runtime::EventLoop;

    /// Media that never reports ready on its own, so only the scene's
    /// synthetic ticks can move the drain
    struct SilentMedia {
        node: NodeId,
        current_time: Cell<f64>,
        seeks: RefCell<Vec<f64>>,
        ready: Channel<()>,
    }

    impl SilentMedia {
        fn new(host: &SharedHost, showing_frame: f64, framerate: f64) -> Rc<Self> {
            Rc::new(Self {
                node: host.create_element("video"),
                current_time: Cell::new(showing_frame / framerate),
                seeks: RefCell::new(Vec::new()),
                ready: Channel::new(),
            })
        }
    }

    impl MediaElement for SilentMedia {
        fn node(&self) -> NodeId {
            self.node
        }

        fn current_time(&self) -> f64 {
            self.current_time.get()
        }

        fn seek(&self, seconds: f64) {
            self.current_time.set(seconds);
            self.seeks.borrow_mut().push(seconds);
        }

        fn pause(&self) {}

        fn ready(&self) -> Channel<()> {
            self.ready.clone()
        }
    }

    struct Rig {
        event_loop: Rc<EventLoop>,
        progress: Channel<f64>,
        media: Rc<SilentMedia>,
        _scene: VideoScene,
        _subs: Subscriptions,
    }

    /// 120-frame clip at 30 fps, already showing `showing_frame`
    fn rig(showing_frame: f64, frame_steps: usize) -> Rig {
        let host: SharedHost = Rc::new(HeadlessPage::new(1000.0, 800.0));
        let event_loop = EventLoop::new();
        let media = SilentMedia::new(&host, showing_frame, 30.0);
        let mut params = VideoParams::new(1.0, 30.0, 120.0, &MediaConfig::default());
        params.frame_steps_desktop = frame_steps;
        let mut scene = VideoScene::new(host, media.clone() as Rc<dyn MediaElement>, params);

        let progress = Channel::new();
        let subs = scene.activate(&SceneActivationParams {
            id: "clip".into(),
            resize: Channel::with_value(WindowSize::new(1000.0, 800.0)),
            screen_height: Channel::with_value(800.0),
            fallback: Channel::with_value(false),
            progress: progress.clone(),
            timing: TimingConfig::default(),
            event_loop: event_loop.clone(),
        });
        Rig {
            event_loop,
            progress,
            media,
            _scene: scene,
            _subs: subs,
        }
    }

    #[test]
    fn test_new_plan_draws_first_frame_and_keeps_rest() {
        let mut drain = FrameDrain::new();
        assert_eq!(drain.on_ready(), DrainAction::Idle);

        drain.plan(0.5, 120.0, 4);
        assert_eq!(drain.on_ready(), DrainAction::Draw(15.0));
        assert_eq!(drain.remainder(), vec![30.0, 45.0, 60.0]);
    }

    #[test]
    fn test_unchanged_plan_drains_one_frame_per_tick() {
        let mut drain = FrameDrain::new();
        drain.plan(0.5, 120.0, 4);
        drain.on_ready();
        assert_eq!(drain.on_ready(), DrainAction::Draw(30.0));
        assert_eq!(drain.remainder(), vec![45.0, 60.0]);
        drain.on_ready();
        drain.on_ready();
        assert_eq!(drain.on_ready(), DrainAction::Exhausted);
    }

    #[test]
    fn test_identical_replan_keeps_draining() {
        let mut drain = FrameDrain::new();
        drain.plan(0.5, 120.0, 4);
        drain.on_ready();
        // Same inputs with nothing drawn produce the same list
        drain.plan(0.5, 120.0, 4);
        assert_eq!(drain.on_ready(), DrainAction::Draw(30.0));
        assert_eq!(drain.remainder().len(), 2);
    }

    #[test]
    fn test_replan_starts_from_last_drawn() {
        let mut drain = FrameDrain::new();
        drain.mark_drawn(60.0);
        let plan = drain.plan(0.0, 120.0, 2).to_vec();
        assert_eq!(plan, vec![30.0, 0.0]);
    }

    #[test]
    fn test_drawing_the_showing_frame_refires_and_keeps_draining() {
        // Plan [30, 60] while frame 30 is already on screen
        let rig = rig(30.0, 2);
        rig.progress.publish(0.5);
        rig.event_loop.advance(100);

        assert_eq!(*rig.media.seeks.borrow(), vec![2.0]);
        assert_eq!(rig.media.current_time(), 2.0);
    }

    #[test]
    fn test_keep_alive_drives_a_stalled_drain() {
        // Plan [15, 30, 45, 60]; without ready ticks from the media the
        // drain stops after the first seek
        let rig = rig(0.0, 4);
        rig.progress.publish(0.5);
        rig.event_loop.advance(100);
        assert_eq!(*rig.media.seeks.borrow(), vec![0.5]);

        // Same progress inside the keep-alive window changes nothing
        rig.event_loop.advance(400);
        rig.progress.publish(0.5);
        rig.event_loop.advance(100);
        assert_eq!(*rig.media.seeks.borrow(), vec![0.5]);

        rig.event_loop.advance(400);
        rig.progress.publish(0.5);
        rig.event_loop.advance(100);
        assert_eq!(*rig.media.seeks.borrow(), vec![0.5, 1.0]);
    }

    #[test]
    fn test_mobile_uses_coarser_steps() {
        let mut params = VideoParams::new(2.0, 30.0, 300.0, &MediaConfig::default());
        assert_eq!(params.frame_steps(), 6);
        params.is_mobile = true;
        assert_eq!(params.frame_steps(), 2);
    }
}
