//! Stage/Step state machine.
//!
//! A `StageScene` owns an ordered list of `Stage`s. At construction every
//! stage's steps are re-offset into one strictly increasing threshold list
//! for the whole scene. While active, the scene's progress is debounced,
//! converted to a "current screen" and resolved to the last step whose
//! threshold does not exceed it. That step id is pushed into its stage's
//! progress channel; the stage invokes the handler registered for the id.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{Scene, SceneActivationParams, SceneMountParams};
use crate::env::{NodeId, SharedHost, StyleMap, WindowSize};
use crate::state::NarrativeState;
use crate::stream::{Channel, Subscriptions};
use crate::{Error, Result};

/// Step id every stage starts in and returns to on reset
pub const INIT_STEP: &str = "init";

/// A current screen below this resets every stage
pub const RESET_THRESHOLD: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepData {
    pub id: String,
    /// Offset within the stage, in screen lengths
    pub screen_length_pos: f64,
}

impl StepData {
    pub fn new(id: impl Into<String>, screen_length_pos: f64) -> Self {
        Self {
            id: id.into(),
            screen_length_pos,
        }
    }
}

/// What a step handler gets to work with
pub struct StepContext<'a> {
    pub stage: &'a str,
    pub step: &'a str,
    pub window: WindowSize,
    pub state: &'a NarrativeState,
    pub host: &'a SharedHost,
    /// Drawing surface created by the scene on first mount
    pub canvas: Option<NodeId>,
}

pub struct StageMountContext<'a> {
    pub stage: &'a str,
    pub state: &'a NarrativeState,
    pub host: &'a SharedHost,
    pub canvas: NodeId,
}

type StepHandler = Box<dyn FnMut(&StepContext)>;
type MountHook = Box<dyn FnMut(&StageMountContext)>;

pub struct Stage {
    id: String,
    steps: Vec<StepData>,
    screens: f64,
    start: f64,
    end: f64,
    handlers: Rc<RefCell<HashMap<String, StepHandler>>>,
    mount_hook: Option<MountHook>,
    progress: Channel<String>,
}

impl Stage {
    /// Steps must be non-empty, non-negative and strictly increasing
    pub fn new(id: impl Into<String>, steps: Vec<StepData>) -> Result<Self> {
        let id = id.into();
        let invalid = |reason: &str| Error::InvalidStage {
            stage: id.clone(),
            reason: reason.to_string(),
        };

        let last = steps.last().ok_or_else(|| invalid("stage has no steps"))?;
        if steps
            .iter()
            .any(|s| !s.screen_length_pos.is_finite() || s.screen_length_pos < 0.0)
        {
            return Err(invalid("step positions must be finite and non-negative"));
        }
        if steps
            .windows(2)
            .any(|w| w[1].screen_length_pos <= w[0].screen_length_pos)
        {
            return Err(invalid("step positions must be strictly increasing"));
        }
        let screens = last.screen_length_pos;

        Ok(Self {
            id,
            steps,
            screens,
            start: 0.0,
            end: screens,
            handlers: Rc::new(RefCell::new(HashMap::new())),
            mount_hook: None,
            progress: Channel::with_value(INIT_STEP.to_string()),
        })
    }

    /// Register the handler for `step_id` (use `INIT_STEP` for the reset
    /// state). A later registration for the same id replaces the earlier one.
    pub fn on(self, step_id: impl Into<String>, handler: impl FnMut(&StepContext) + 'static) -> Self {
        self.handlers
            .borrow_mut()
            .insert(step_id.into(), Box::new(handler));
        self
    }

    /// Hook run on every scene mount, after the canvas exists
    pub fn on_mount(mut self, hook: impl FnMut(&StageMountContext) + 'static) -> Self {
        self.mount_hook = Some(Box::new(hook));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn steps(&self) -> &[StepData] {
        &self.steps
    }

    /// Screen lengths spanned by the steps
    pub fn screens(&self) -> f64 {
        self.screens
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn has_handler(&self, step_id: &str) -> bool {
        self.handlers.borrow().contains_key(step_id)
    }

    /// Last step id pushed to this stage
    pub fn current_step(&self) -> String {
        self.progress
            .latest()
            .unwrap_or_else(|| INIT_STEP.to_string())
    }

    pub fn progress(&self) -> &Channel<String> {
        &self.progress
    }

    /// Invoke the handler for the current step whenever the step changes or
    /// the window is resized
    fn activate(
        &self,
        resize: &Channel<WindowSize>,
        state: NarrativeState,
        host: SharedHost,
        canvas: Option<NodeId>,
    ) -> Subscriptions {
        let latest: Rc<RefCell<(Option<String>, Option<WindowSize>)>> = Rc::default();
        let fire = {
            let latest = latest.clone();
            let handlers = self.handlers.clone();
            let stage = self.id.clone();
            Rc::new(move || {
                let (step, window) = match &*latest.borrow() {
                    (Some(step), Some(window)) => (step.clone(), *window),
                    _ => return,
                };
                let mut handlers = handlers.borrow_mut();
                match handlers.get_mut(&step) {
                    Some(handler) => {
                        debug!(stage = %stage, step = %step, "Running step handler");
                        handler(&StepContext {
                            stage: &stage,
                            step: &step,
                            window,
                            state: &state,
                            host: &host,
                            canvas,
                        });
                    }
                    None => error!(stage = %stage, step = %step, "No handler registered for step"),
                }
            })
        };

        let mut subs = Subscriptions::new();
        let (l, f) = (latest.clone(), fire.clone());
        subs.push(self.progress.distinct().subscribe(move |step: &String| {
            l.borrow_mut().0 = Some(step.clone());
            f();
        }));
        let (l, f) = (latest, fire);
        subs.push(resize.subscribe(move |window| {
            l.borrow_mut().1 = Some(*window);
            f();
        }));
        subs
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.id)
            .field("steps", &self.steps)
            .field("start", &self.start)
            .field("end", &self.end)
            .finish()
    }
}

/// A step placed in the scene-wide threshold space
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalStep {
    pub id: String,
    pub stage: usize,
    pub screen_length_pos: f64,
}

/// Compute every stage's `start`/`end` and re-offset all steps into one
/// ordered list.
///
/// Stages are laid end to end; the last stage absorbs whatever remains up
/// to `screen_lengths`. Each stage's steps are shifted by the screens of all
/// preceding stages plus one screen of padding per stage.
pub fn init_stages(stages: &mut [Stage], screen_lengths: f64) -> Vec<GlobalStep> {
    let last = stages.len().saturating_sub(1);
    let mut prev_end = 0.0;
    for (i, stage) in stages.iter_mut().enumerate() {
        if i == 0 {
            stage.start = 0.0;
            stage.end = stage.screens;
        } else if i == last {
            stage.start = prev_end;
            stage.end = screen_lengths.max(stage.start);
        } else {
            stage.start = prev_end;
            stage.end = stage.start + stage.screens;
        }
        prev_end = stage.end;
    }

    let mut offset = 0.0;
    let mut global = Vec::new();
    for (index, stage) in stages.iter().enumerate() {
        global.extend(stage.steps.iter().map(|step| GlobalStep {
            id: step.id.clone(),
            stage: index,
            screen_length_pos: step.screen_length_pos + offset,
        }));
        offset += 1.0 + stage.screens;
    }
    global
}

/// Half a screen earlier than the raw position, so a step triggers as its
/// text block reaches the middle of the viewport
#[inline]
pub fn current_screen(progress: f64, screen_lengths: f64) -> f64 {
    progress * screen_lengths - 0.5
}

/// Index of the last threshold not exceeding `current_screen`, or the first
/// one if none does. `None` only for an empty list.
pub fn resolve_step(thresholds: &[f64], current_screen: f64) -> Option<usize> {
    if thresholds.is_empty() {
        return None;
    }
    Some(thresholds.partition_point(|t| *t <= current_screen).saturating_sub(1))
}

pub struct StageScene {
    host: SharedHost,
    screen_lengths: f64,
    container: NodeId,
    canvas: Option<NodeId>,
    stages: Vec<Stage>,
    steps: Vec<GlobalStep>,
    state: NarrativeState,
}

impl StageScene {
    pub fn new(host: SharedHost, screen_lengths: f64, mut stages: Vec<Stage>) -> Result<Self> {
        for (i, stage) in stages.iter().enumerate() {
            if stages[..i].iter().any(|s| s.id == stage.id) {
                return Err(Error::InvalidStage {
                    stage: stage.id.clone(),
                    reason: "stage id used twice in one scene".to_string(),
                });
            }
        }

        let container = host.create_element("div");
        StyleMap::new()
            .with("width", "100%")
            .with("height", "100%")
            .with("position", "absolute")
            .with("top", "0")
            .with("left", "0")
            .apply(host.as_ref(), container);

        let steps = init_stages(&mut stages, screen_lengths);
        Ok(Self {
            host,
            screen_lengths,
            container,
            canvas: None,
            stages,
            steps,
            state: NarrativeState::new(),
        })
    }

    pub fn state(&self) -> &NarrativeState {
        &self.state
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(&self, id: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == id)
    }

    pub fn steps(&self) -> &[GlobalStep] {
        &self.steps
    }

    pub fn canvas(&self) -> Option<NodeId> {
        self.canvas
    }

    /// Push the step for `progress` into its stage, or reset every stage
    pub fn apply_progress(&self, progress: f64) {
        let thresholds: Vec<f64> = self.steps.iter().map(|s| s.screen_length_pos).collect();
        let channels: Vec<Channel<String>> = self.stages.iter().map(|s| s.progress.clone()).collect();
        let targets: Vec<(String, usize)> = self.steps.iter().map(|s| (s.id.clone(), s.stage)).collect();
        dispatch_progress(progress, self.screen_lengths, &thresholds, &targets, &channels);
    }
}

fn dispatch_progress(
    progress: f64,
    screen_lengths: f64,
    thresholds: &[f64],
    targets: &[(String, usize)],
    channels: &[Channel<String>],
) {
    let screen = current_screen(progress, screen_lengths);
    if screen < RESET_THRESHOLD {
        for channel in channels {
            channel.publish(INIT_STEP.to_string());
        }
        return;
    }
    if let Some(index) = resolve_step(thresholds, screen) {
        let (id, stage) = &targets[index];
        debug!(progress, screen, step = %id, "Resolved step");
        channels[*stage].publish(id.clone());
    }
}

impl Scene for StageScene {
    fn screen_lengths(&self) -> f64 {
        self.screen_lengths
    }

    fn container(&self) -> NodeId {
        self.container
    }

    fn mount(&mut self, params: &SceneMountParams) {
        let canvas = match self.canvas {
            Some(canvas) => canvas,
            None => {
                let canvas = params.host.create_element("svg");
                params.host.append_child(params.plate, canvas);
                self.state.set_state(serde_json::json!({ "canvas": canvas.0 }));
                self.canvas = Some(canvas);
                canvas
            }
        };

        for stage in &mut self.stages {
            if let Some(hook) = stage.mount_hook.as_mut() {
                hook(&StageMountContext {
                    stage: &stage.id,
                    state: &self.state,
                    host: &params.host,
                    canvas,
                });
            }
        }
    }

    fn activate(&mut self, params: &SceneActivationParams) -> Subscriptions {
        let mut subs = Subscriptions::new();
        for stage in &self.stages {
            subs.append(stage.activate(
                &params.resize,
                self.state.clone(),
                self.host.clone(),
                self.canvas,
            ));
        }

        let thresholds: Vec<f64> = self.steps.iter().map(|s| s.screen_length_pos).collect();
        let targets: Vec<(String, usize)> = self.steps.iter().map(|s| (s.id.clone(), s.stage)).collect();
        let channels: Vec<Channel<String>> = self.stages.iter().map(|s| s.progress.clone()).collect();
        let screen_lengths = self.screen_lengths;
        subs.push(
            params
                .progress
                .debounce(&params.event_loop, params.timing.step_debounce_ms)
                .subscribe(move |p| {
                    dispatch_progress(*p, screen_lengths, &thresholds, &targets, &channels);
                }),
        );
        subs
    }
}
