use std::path::Path;
use std::rc::Rc;

use anyhow::Result;
use tracing::debug;

use scrolly_core::env::Environment;
use scrolly_core::{Engine, EngineConfig, HeadlessPage, RawEvent};

use crate::story::{Built, EventLog, Frame, Story};

/// Push one scripted frame into the page and the engine's streams
pub fn apply_frame(engine: &Engine, page: &HeadlessPage, frame: &Frame) {
    if let Some(size) = frame.resize {
        page.set_window_size(size);
        engine.dispatch(RawEvent::Resize);
    }
    if let Some(y) = frame.scroll {
        page.set_scroll_y(y);
        engine.dispatch(RawEvent::Scroll);
    }
    for code in &frame.keys {
        engine.dispatch(RawEvent::KeyDown(*code));
    }
}

pub struct Session {
    pub story: Story,
    pub page: Rc<HeadlessPage>,
    pub engine: Engine,
    pub log: EventLog,
    pub built: Built,
}

impl Session {
    pub fn open(path: &Path, config: EngineConfig) -> Result<Self> {
        let story = Story::load(path)?;
        let page = story.page();
        let engine = Engine::new(page.clone(), config);
        let log = EventLog::default();
        let built = story.build(&engine, &page, &log)?;
        Ok(Self {
            story,
            page,
            engine,
            log,
            built,
        })
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.story.script.frames(self.page.scroll_y())
    }

    pub fn step(&self, frame: &Frame) {
        apply_frame(&self.engine, &self.page, frame);
        self.engine.advance(self.story.script.frame_ms);
    }

    pub fn print_summary(&self) {
        let entries = self.log.entries();
        println!("Events ({}):\n", entries.len());
        for entry in &entries {
            println!("  {entry}");
        }
        println!();
        println!("Virtual time: {}ms", self.engine.event_loop().now());
        println!("Final scroll: {}px", self.page.scroll_y());
        if let Some(teller) = &self.built.teller {
            println!("Teller active: {}", teller.is_active());
        }
        for (id, media) in &self.built.media {
            let seeks = media.seeks();
            match seeks.last() {
                Some(last) => println!("Video {id}: {} seeks, last at {last:.3}s", seeks.len()),
                None => println!("Video {id}: no seeks"),
            }
        }
    }
}

pub fn run(path: &Path, config: EngineConfig) -> Result<()> {
    let session = Session::open(path, config)?;
    let frames = session.frames();
    debug!(frames = frames.len(), "Replaying script");
    for frame in &frames {
        session.step(frame);
    }
    // Let debounced work settle
    session.engine.advance(1000);
    session.print_summary();
    Ok(())
}
