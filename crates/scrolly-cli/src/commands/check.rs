use std::path::Path;

use anyhow::Result;

use crate::story::Story;

pub fn run(path: &Path) -> Result<()> {
    let story = Story::load(path)?;
    let report = story.check()?;
    println!("{} is valid:\n", path.display());
    for line in report {
        println!("  {line}");
    }
    println!("\n  script: {} frames", story.script.frames(0.0).len());
    Ok(())
}
