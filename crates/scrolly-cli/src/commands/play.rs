use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

use scrolly_core::EngineConfig;

use super::simulate::Session;

/// Replay the script paced by a real one-frame interval
pub async fn run(path: &Path, config: EngineConfig) -> Result<()> {
    let session = Session::open(path, config)?;
    let frames = session.frames();
    let frame_ms = session.story.script.frame_ms;

    let mut ticker = interval(Duration::from_millis(frame_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(frames = frames.len(), frame_ms, "Playing script");
    for frame in &frames {
        ticker.tick().await;
        session.step(frame);
    }
    for _ in 0..(1000 / frame_ms.max(1)) {
        ticker.tick().await;
        session.engine.advance(frame_ms);
    }
    session.print_summary();
    Ok(())
}
