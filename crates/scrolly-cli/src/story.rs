//! Story files: a TOML description of a page, its scenes and text, and a
//! scroll script to replay against it.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::info;

use scrolly_core::env::Surface;
use scrolly_core::graphic::TextItem;
use scrolly_core::runtime::timing::lerp;
use scrolly_core::scene::stage::INIT_STEP;
use scrolly_core::scene::{HeadlessMedia, MediaElement};
use scrolly_core::{
    Engine, Graphic, GraphicOptions, HeadlessPage, Millis, SceneRegistry, ScrollyTeller,
    SharedHost, Stage, StageScene, StepData, Subscriptions, TellerOptions, VideoParams,
    VideoScene, WindowSize,
};

const GRAPHIC_MOUNT: &str = "graphic";
const TELLER_ROOT: &str = "story";

#[derive(Debug, Deserialize)]
pub struct Story {
    #[serde(default)]
    pub page: PageSpec,
    pub teller: Option<TellerSpec>,
    pub graphic: Option<GraphicSpec>,
    #[serde(default)]
    pub script: Script,
}

#[derive(Debug, Deserialize)]
pub struct PageSpec {
    #[serde(default = "default_width")]
    pub width: f64,
    #[serde(default = "default_height")]
    pub height: f64,
    /// Space before the story
    #[serde(default = "default_lead")]
    pub lead: String,
    /// Space after the story
    #[serde(default = "default_tail")]
    pub tail: String,
}

impl Default for PageSpec {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            lead: default_lead(),
            tail: default_tail(),
        }
    }
}

fn default_width() -> f64 {
    1280.0
}

fn default_height() -> f64 {
    800.0
}

fn default_lead() -> String {
    "100vh".to_string()
}

fn default_tail() -> String {
    "200vh".to_string()
}

#[derive(Debug, Deserialize)]
pub struct TellerSpec {
    pub content: Vec<String>,
    pub graph_margin: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GraphicSpec {
    #[serde(default)]
    pub debug: bool,
    pub scene_buffer: Option<f64>,
    #[serde(default)]
    pub text: Vec<TextItem>,
    pub scenes: Vec<SceneSpec>,
}

#[derive(Debug, Deserialize)]
pub struct SceneSpec {
    pub id: String,
    pub screen_lengths: f64,
    #[serde(flatten)]
    pub kind: SceneKind,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SceneKind {
    Stages { stages: Vec<StageSpec> },
    Video {
        framerate: f64,
        num_frames: f64,
        #[serde(default)]
        mobile: bool,
    },
}

#[derive(Debug, Deserialize)]
pub struct StageSpec {
    pub id: String,
    pub steps: Vec<StepData>,
}

#[derive(Debug, Deserialize)]
pub struct Script {
    #[serde(default = "default_frame_ms")]
    pub frame_ms: Millis,
    #[serde(default)]
    pub moves: Vec<Move>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            frame_ms: default_frame_ms(),
            moves: Vec::new(),
        }
    }
}

fn default_frame_ms() -> Millis {
    16
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Move {
    /// Scroll to `to`, spread evenly over `duration_ms`
    Scroll {
        to: f64,
        #[serde(default)]
        duration_ms: Millis,
    },
    Resize { width: f64, height: f64 },
    Wait { ms: Millis },
    Keys { codes: Vec<u32> },
}

/// What happens on one frame of a replay
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub scroll: Option<f64>,
    pub resize: Option<WindowSize>,
    pub keys: Vec<u32>,
}

impl Script {
    /// Expand the moves into one entry per frame, starting from `start`
    pub fn frames(&self, start: f64) -> Vec<Frame> {
        let frame_ms = self.frame_ms.max(1);
        let mut position = start;
        let mut out = Vec::new();
        for m in &self.moves {
            match m {
                Move::Scroll { to, duration_ms } => {
                    let count = (duration_ms / frame_ms).max(1);
                    for i in 1..=count {
                        out.push(Frame {
                            scroll: Some(lerp(position, *to, i as f64 / count as f64)),
                            ..Frame::default()
                        });
                    }
                    position = *to;
                }
                Move::Resize { width, height } => out.push(Frame {
                    resize: Some(WindowSize::new(*width, *height)),
                    ..Frame::default()
                }),
                Move::Wait { ms } => {
                    out.extend((0..(ms / frame_ms).max(1)).map(|_| Frame::default()));
                }
                Move::Keys { codes } => out.push(Frame {
                    keys: codes.clone(),
                    ..Frame::default()
                }),
            }
        }
        out
    }
}

impl Story {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read story {}", path.display()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let story: Story = toml::from_str(content).context("Failed to parse story")?;
        if story.teller.is_none() && story.graphic.is_none() {
            bail!("Story needs a [teller] or a [graphic] section");
        }
        Ok(story)
    }

    pub fn page(&self) -> Rc<HeadlessPage> {
        Rc::new(HeadlessPage::new(self.page.width, self.page.height))
    }

    /// Build every stage and scene without touching a page
    pub fn check(&self) -> Result<Vec<String>> {
        let mut report = Vec::new();
        if let Some(teller) = &self.teller {
            if teller.content.is_empty() {
                bail!("Teller content is empty");
            }
            if let Some(margin) = &teller.graph_margin {
                margin.parse::<scrolly_core::env::Length>()?;
            }
            report.push(format!("teller: {} text blocks", teller.content.len()));
        }
        if let Some(graphic) = &self.graphic {
            let host: SharedHost = self.page();
            let (registry, _) = build_registry(&host, graphic, &EventLog::default())?;
            for scene in &graphic.scenes {
                report.push(format!("scene {}: {} screens", scene.id, scene.screen_lengths));
            }
            report.push(format!(
                "graphic: {} scenes, {} screens of scenes",
                registry.len(),
                registry.total_screen_lengths(0.0)
            ));
        }
        Ok(report)
    }

    /// Lay out the page and mount everything the story declares
    pub fn build(&self, engine: &Engine, page: &Rc<HeadlessPage>, log: &EventLog) -> Result<Built> {
        let host: SharedHost = page.clone();
        block(page, &self.page.lead);

        let mut built = Built::default();
        if let Some(spec) = &self.graphic {
            anchor(page, GRAPHIC_MOUNT);
            let (registry, media) = build_registry(&host, spec, log)?;
            built.media = media;
            let graphic = engine.graphic(
                registry,
                GraphicOptions {
                    mount_point: GRAPHIC_MOUNT.to_string(),
                    text: spec.text.clone(),
                    debug: spec.debug,
                    scene_buffer: spec.scene_buffer,
                },
            )?;
            graphic.mount();
            built.graphic = Some(graphic);
        }

        if let Some(spec) = &self.teller {
            anchor(page, TELLER_ROOT);
            let teller = engine.teller(
                format!("#{TELLER_ROOT}"),
                spec.content.clone(),
                TellerOptions {
                    graph_margin: spec.graph_margin.clone(),
                    ..TellerOptions::default()
                },
            )?;
            let events = log.clone();
            built.subscriptions.push(teller.events().subscribe(move |e| {
                let graph = e.graph.map(|g| format!(" #{g}")).unwrap_or_default();
                let direction = e.direction.map(|d| format!(" {d:?}")).unwrap_or_default();
                events.push(format!("teller {}{graph}{direction}", e.trigger));
            }));
            teller.mount();
            built.teller = Some(teller);
        }

        block(page, &self.page.tail);
        info!(height = page.document_height(), "Page laid out");
        Ok(built)
    }
}

/// Shared, append-only record of everything the story emitted
#[derive(Debug, Clone, Default)]
pub struct EventLog(Rc<RefCell<Vec<String>>>);

impl EventLog {
    pub fn push(&self, entry: String) {
        info!("{entry}");
        self.0.borrow_mut().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

#[derive(Default)]
pub struct Built {
    pub graphic: Option<Graphic>,
    pub teller: Option<ScrollyTeller>,
    pub media: MediaList,
    pub subscriptions: Subscriptions,
}

fn block(page: &HeadlessPage, height: &str) {
    let node = page.create_element("div");
    page.set_style(node, "height", height);
    page.append_child(page.body(), node);
}

fn anchor(page: &HeadlessPage, id: &str) {
    let node = page.create_element("div");
    page.set_id(node, id);
    page.append_child(page.body(), node);
}

type MediaList = Vec<(String, Rc<HeadlessMedia>)>;

fn build_registry(
    host: &SharedHost,
    spec: &GraphicSpec,
    log: &EventLog,
) -> Result<(SceneRegistry, MediaList)> {
    let mut registry = SceneRegistry::new();
    let mut media_list = Vec::new();
    for scene in &spec.scenes {
        match &scene.kind {
            SceneKind::Stages { stages } => {
                let stages = stages
                    .iter()
                    .map(|s| stage(s, log))
                    .collect::<scrolly_core::Result<Vec<_>>>()?;
                let built = StageScene::new(host.clone(), scene.screen_lengths, stages)?;
                registry.register(scene.id.clone(), Box::new(built))?;
            }
            SceneKind::Video {
                framerate,
                num_frames,
                mobile,
            } => {
                let media = Rc::new(HeadlessMedia::new(host));
                media_list.push((scene.id.clone(), media.clone()));
                let mut params = VideoParams::new(
                    scene.screen_lengths,
                    *framerate,
                    *num_frames,
                    &scrolly_core::MediaConfig::default(),
                );
                params.is_mobile = *mobile;
                let built = VideoScene::new(host.clone(), media as Rc<dyn MediaElement>, params);
                registry.register(scene.id.clone(), Box::new(built))?;
            }
        }
    }
    Ok((registry, media_list))
}

/// A stage whose every step is recorded in `log`
fn stage(spec: &StageSpec, log: &EventLog) -> scrolly_core::Result<Stage> {
    let mut stage = Stage::new(spec.id.clone(), spec.steps.clone())?;
    for step in spec.steps.iter().map(|s| s.id.as_str()).chain([INIT_STEP]) {
        let log = log.clone();
        stage = stage.on(step, move |ctx| {
            log.push(format!("stage {} -> {}", ctx.stage, ctx.step));
        });
    }
    Ok(stage)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORY: &str = r#"
[teller]
content = ["one", "two"]

[graphic]
[[graphic.scenes]]
id = "intro"
kind = "stages"
screen_lengths = 2
[[graphic.scenes.stages]]
id = "first"
steps = [{ id = "a", screen_length_pos = 0 }, { id = "b", screen_length_pos = 1 }]

[[graphic.scenes]]
id = "film"
kind = "video"
screen_lengths = 1
framerate = 30
num_frames = 120

[script]
frame_ms = 10
moves = [
    { action = "scroll", to = 100, duration_ms = 40 },
    { action = "wait", ms = 20 },
    { action = "resize", width = 800, height = 600 },
]
"#;

    #[test]
    fn test_parse_story() {
        let story = Story::from_toml(STORY).unwrap();
        let graphic = story.graphic.as_ref().unwrap();
        assert_eq!(graphic.scenes.len(), 2);
        assert!(matches!(graphic.scenes[1].kind, SceneKind::Video { .. }));
        assert_eq!(story.page.height, 800.0);
    }

    #[test]
    fn test_frames_interpolate_scroll() {
        let story = Story::from_toml(STORY).unwrap();
        let frames = story.script.frames(0.0);
        let scrolls: Vec<f64> = frames.iter().filter_map(|f| f.scroll).collect();
        assert_eq!(scrolls, vec![25.0, 50.0, 75.0, 100.0]);
        assert_eq!(frames.len(), 4 + 2 + 1);
        assert_eq!(frames[6].resize, Some(WindowSize::new(800.0, 600.0)));
    }

    #[test]
    fn test_check_rejects_unordered_steps() {
        let broken = STORY.replace("screen_length_pos = 1", "screen_length_pos = 0");
        let story = Story::from_toml(&broken).unwrap();
        assert!(story.check().is_err());
        assert!(Story::from_toml("[script]\nmoves = []").is_err());
    }
}
