//! Task listing.

use std::path::Path;

use anyhow::Result;

use crate::commands::build;
use crate::config::ConfigFile;

/// Print every task with its prerequisites.
pub fn run(config: &ConfigFile, root: &Path) -> Result<()> {
    let graph = build::graph(config, root)?;

    for id in graph.ids() {
        let prerequisites = graph
            .prerequisites(id)
            .unwrap_or_default()
            .iter()
            .map(|t| t.name())
            .collect::<Vec<_>>();

        if prerequisites.is_empty() {
            println!("{:<16} {}", id.name(), id.description());
        } else {
            println!(
                "{:<16} {} (after {})",
                id.name(),
                id.description(),
                prerequisites.join(", ")
            );
        }
    }

    Ok(())
}
