//! Watch command handler

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use porthole_core::{Bootstrapper, Config, PatchSyncClient, TreePath, WebSocketSource};

/// Connect to the patch feed and print every value delivered at `path`
pub async fn run(config: &Config, path: &str) -> Result<()> {
    let Some(ref url) = config.source_url else {
        bail!(
            "Patch feed URL not configured. Set it with:\n  \
             PORTHOLE_SOURCE_URL=ws://your-server:5959/db\n  \
             or source_url in the config file"
        );
    };

    let path: TreePath = path.parse().context("Invalid tree path")?;

    let source = Arc::new(WebSocketSource::new(url.clone()));
    let mut client = PatchSyncClient::init(vec![source], Bootstrapper::new(config))
        .with_debounce(config.debounce());

    // Surface connection transitions on stderr while values stream to stdout
    let mut status_rx = client.subscribe_status();
    tokio::spawn(async move {
        loop {
            let status = *status_rx.borrow();
            info!(%status, "connection status");
            if status_rx.changed().await.is_err() {
                break;
            }
        }
    });

    client.start();

    let mut watcher = client.watch(path);
    while let Some(value) = watcher.next().await {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }

    Ok(())
}
