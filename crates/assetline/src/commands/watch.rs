//! Watch mode: build, serve with live reload, rebuild on change.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use assetline_build::{ReloadKind, Target, TaskId, WatchPlan};
use assetline_server::{DevServer, FileWatcher, ReloadMessage};
use assetline_tasks::TaskGraph;

use crate::commands::build;
use crate::config::ConfigFile;

/// Run the watch command.
pub async fn run(config: &ConfigFile, root: &Path, port: Option<u16>, open: bool) -> Result<()> {
    let graph = build::graph(config, root)?;

    // A broken source should not keep the server from starting
    if let Err(e) = graph.run(Target::Watch.tasks()).await {
        tracing::error!("{}", e);
    }

    let mut server_config = config.server_config(root);
    if let Some(port) = port {
        server_config.port = port;
    }
    server_config.open = server_config.open && open;
    let server = DevServer::new(server_config);
    let hub = server.hub();

    let plan = WatchPlan::from_paths(&config.paths(root));
    let (watcher, mut rx) =
        FileWatcher::new(&plan.roots()).context("Failed to start file watcher")?;

    let root = root.to_path_buf();
    tokio::spawn(async move {
        // Keep watcher alive for as long as batches are handled
        let _watcher = watcher;

        while let Some(batch) = rx.recv().await {
            let changed: Vec<PathBuf> = batch.iter().map(|e| e.path().clone()).collect();
            if let Some(message) = rebuild(&plan, &graph, &root, &changed).await {
                hub.send(message);
            }
        }
    });

    server.start().await?;

    Ok(())
}

/// Run the tasks a batch of changes triggers. Returns the message for
/// connected browsers, or `None` when nothing matched or the run failed.
async fn rebuild(
    plan: &WatchPlan,
    graph: &TaskGraph<TaskId>,
    root: &Path,
    changed: &[PathBuf],
) -> Option<ReloadMessage> {
    let triggered = plan.triggered(changed)?;

    for path in changed {
        let shown = path.strip_prefix(root).unwrap_or(path);
        tracing::info!("Changed: {}", shown.display());
    }

    match graph.run(&triggered.tasks).await {
        Ok(_) => Some(match triggered.reload {
            ReloadKind::Css => ReloadMessage::Css,
            ReloadKind::Full => ReloadMessage::Reload,
        }),
        Err(e) => {
            tracing::error!("{}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    use crate::commands::init;

    async fn starter() -> (tempfile::TempDir, PathBuf, ConfigFile) {
        let temp = tempdir().unwrap();
        init::run(temp.path(), false).await.unwrap();
        let root = temp.path().canonicalize().unwrap();
        (temp, root, ConfigFile::default())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn style_change_swaps_css() {
        let (_temp, root, config) = starter().await;
        let paths = config.paths(&root);
        let plan = WatchPlan::from_paths(&paths);
        let graph = build::graph(&config, &root).unwrap();

        let message = rebuild(&plan, &graph, &root, &[paths.styles.join("main.scss")]).await;

        assert_eq!(message, Some(ReloadMessage::Css));
        assert!(paths.stylesheets_out().join("main.css").is_file());
        assert!(!paths.dist.join("index.html").exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mixed_change_reloads_the_page() {
        let (_temp, root, config) = starter().await;
        let paths = config.paths(&root);
        let plan = WatchPlan::from_paths(&paths);
        let graph = build::graph(&config, &root).unwrap();

        let changed = [
            paths.styles.join("_variables.scss"),
            paths.data.join("index.json"),
        ];
        let message = rebuild(&plan, &graph, &root, &changed).await;

        assert_eq!(message, Some(ReloadMessage::Reload));
        assert!(paths.dist.join("index.html").is_file());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_rebuild_sends_nothing_until_fixed() {
        let (_temp, root, config) = starter().await;
        let paths = config.paths(&root);
        let plan = WatchPlan::from_paths(&paths);
        let graph = build::graph(&config, &root).unwrap();
        let entry = paths.styles.join("main.scss");
        let changed = [entry.clone()];

        fs::write(&entry, ".broken { color: ").unwrap();
        assert_eq!(rebuild(&plan, &graph, &root, &changed).await, None);

        fs::write(&entry, ".fixed { color: red; }").unwrap();
        assert_eq!(
            rebuild(&plan, &graph, &root, &changed).await,
            Some(ReloadMessage::Css)
        );
    }

    #[tokio::test]
    async fn unrelated_change_runs_nothing() {
        let (_temp, root, config) = starter().await;
        let paths = config.paths(&root);
        let plan = WatchPlan::from_paths(&paths);
        let graph = build::graph(&config, &root).unwrap();

        let message = rebuild(&plan, &graph, &root, &[root.join("README.md")]).await;

        assert_eq!(message, None);
        assert!(!paths.dist.exists());
    }
}
