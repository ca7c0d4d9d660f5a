//! One-shot build commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use assetline_build::{task_graph, AssetBuilder, Target, TaskId};
use assetline_tasks::{RunReport, TaskGraph};

use crate::config::ConfigFile;

/// Build the task graph for a project at `root`.
pub fn graph(config: &ConfigFile, root: &Path) -> Result<TaskGraph<TaskId>> {
    let builder = Arc::new(AssetBuilder::new(config.build_config(root)));
    task_graph(builder).context("Invalid task graph")
}

/// Run an aggregate target.
pub async fn run_target(config: &ConfigFile, root: &Path, target: Target) -> Result<()> {
    tracing::info!("Running target '{}'...", target);

    let report = graph(config, root)?
        .run(target.tasks())
        .await
        .with_context(|| format!("Target '{}' failed", target))?;

    summarize(&report, config, root);
    Ok(())
}

/// Run tasks by name, with their prerequisites.
pub async fn run_tasks(config: &ConfigFile, root: &Path, names: &[String]) -> Result<()> {
    let tasks = names
        .iter()
        .map(|name| name.parse::<TaskId>())
        .collect::<Result<Vec<_>, _>>()?;

    let report = graph(config, root)?
        .run(&tasks)
        .await
        .context("Build failed")?;

    summarize(&report, config, root);
    Ok(())
}

fn summarize(report: &RunReport<TaskId>, config: &ConfigFile, root: &Path) {
    tracing::info!(
        "Ran {} tasks in {}ms",
        report.completed.len(),
        report.duration.as_millis()
    );
    tracing::info!("Output: {}", root.join(&config.paths.dist).display());
}
