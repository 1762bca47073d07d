//! Status command handler

use anyhow::{Context, Result};

use porthole_core::model::DataModel;
use porthole_core::{derive, Bootstrapper, Config};

/// Show package statuses from the last synced snapshot
pub fn show(config: &Config, json: bool) -> Result<()> {
    let snapshot = Bootstrapper::new(config).init();
    let model: DataModel = serde_json::from_value(snapshot.data.clone())
        .context("Persisted snapshot does not match the expected data model")?;

    if json {
        let packages: Vec<_> = model
            .package_data
            .iter()
            .map(|(id, entry)| {
                let status = derive(entry);
                serde_json::json!({
                    "id": id,
                    "title": entry.manifest.title,
                    "primary": status.primary.to_string(),
                    "dependency": status.dependency.map(|s| s.to_string()),
                    "health": status.health.map(|s| s.to_string()),
                })
            })
            .collect();

        println!(
            "{}",
            serde_json::json!({
                "server": {
                    "id": model.server_info.id,
                    "version": model.server_info.version,
                    "name": model.ui.name,
                },
                "revision": snapshot.revision,
                "synced_at": snapshot.saved_at.to_rfc3339(),
                "packages": packages,
            })
        );
        return Ok(());
    }

    println!("Porthole Status");
    println!("===============");
    println!();
    println!("Server:");
    if let Some(ref name) = model.ui.name {
        println!("  Name:    {}", name);
    }
    println!("  ID:      {}", model.server_info.id);
    println!("  Version: {}", model.server_info.version);
    println!();
    let age = chrono::Utc::now().signed_duration_since(snapshot.saved_at);
    println!("Snapshot:");
    println!("  Revision: {}", snapshot.revision);
    println!(
        "  Synced:   {} ({} min ago)",
        snapshot.saved_at.to_rfc3339(),
        age.num_minutes()
    );
    println!();

    if model.package_data.is_empty() {
        println!("No packages in the snapshot.");
        return Ok(());
    }

    println!("Packages:");
    for (id, entry) in &model.package_data {
        let status = derive(entry);
        let mut line = format!("  {:<20} {}", id, status.primary);
        if let Some(dependency) = status.dependency {
            line.push_str(&format!(", deps: {}", dependency));
        }
        if let Some(health) = status.health {
            line.push_str(&format!(", health: {}", health));
        }
        println!("{}", line);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use porthole_core::Snapshot;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> Config {
        Config {
            data_dir: temp_dir.path().to_path_buf(),
            source_url: None,
            debounce_ms: 500,
        }
    }

    #[test]
    fn test_show_with_empty_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);
        show(&config, false).unwrap();
        show(&config, true).unwrap();
    }

    #[test]
    fn test_show_with_synced_packages() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);

        let snapshot = Snapshot::at(
            12,
            json!({
                "server-info": { "id": "abc123", "version": "0.3.1" },
                "ui": { "name": "basement server" },
                "package-data": {
                    "bitcoind": {
                        "state": "installed",
                        "manifest": { "id": "bitcoind", "title": "Bitcoin Core" },
                        "installed": {
                            "status": {
                                "configured": true,
                                "main": { "status": "running" }
                            }
                        }
                    }
                }
            }),
        );
        Bootstrapper::new(&config).update(&snapshot).unwrap();

        show(&config, false).unwrap();
        show(&config, true).unwrap();
    }

    #[test]
    fn test_show_rejects_malformed_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);

        // a tree whose package entries don't match the model
        let snapshot = Snapshot::at(1, json!({ "package-data": { "x": { "state": 42 } } }));
        Bootstrapper::new(&config).update(&snapshot).unwrap();

        assert!(show(&config, false).is_err());
    }
}
