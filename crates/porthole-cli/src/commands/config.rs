//! Config command handler

use anyhow::Result;

use porthole_core::Config;

/// Show the resolved configuration
pub fn show(config: &Config, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "config_file": Config::config_file_path(),
                "data_dir": config.data_dir,
                "snapshot_path": config.snapshot_path(),
                "source_url": config.source_url,
                "debounce_ms": config.debounce_ms,
            })
        );
        return Ok(());
    }

    println!("Config file: {}", Config::config_file_path().display());
    println!("Data dir:    {}", config.data_dir.display());
    println!("Snapshot:    {}", config.snapshot_path().display());
    match config.source_url {
        Some(ref url) => println!("Source URL:  {}", url),
        None => println!("Source URL:  (not configured)"),
    }
    println!("Debounce:    {} ms", config.debounce_ms);

    Ok(())
}
