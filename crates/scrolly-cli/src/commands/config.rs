use anyhow::Result;

use scrolly_core::EngineConfig;

pub fn run(config: &EngineConfig, save: bool) -> Result<()> {
    if save {
        config.save()?;
        println!("Saved configuration to {}", EngineConfig::config_path().display());
        return Ok(());
    }
    println!("# {}", EngineConfig::config_path().display());
    print!("{}", config.to_toml()?);
    Ok(())
}
