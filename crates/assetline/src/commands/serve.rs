//! Preview server command.

use std::path::{Path, PathBuf};

use anyhow::Result;
use assetline_server::DevServer;

use crate::config::ConfigFile;

/// Run the serve command.
pub async fn run(
    config: &ConfigFile,
    root: &Path,
    port: Option<u16>,
    dir: Option<PathBuf>,
) -> Result<()> {
    let mut server_config = config.server_config(root);
    if let Some(dir) = dir {
        server_config.root = root.join(dir);
    }
    if let Some(port) = port {
        server_config.port = port;
    }
    server_config.live_reload = false;

    if !server_config.root.exists() {
        anyhow::bail!(
            "Directory not found: {}. Run 'assetline' first.",
            server_config.root.display()
        );
    }

    DevServer::new(server_config).start().await?;

    Ok(())
}
