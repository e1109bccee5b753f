//! Show or persist the effective configuration.

use framestitch_common::config::{config_file_path, AppConfig};

pub fn run(config: &AppConfig, write: bool) -> anyhow::Result<()> {
    let path = config_file_path();
    if write {
        config.save()?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    println!("# {}", path.display());
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
