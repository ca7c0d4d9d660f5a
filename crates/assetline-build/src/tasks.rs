//! The named build tasks and the targets that combine them.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use assetline_tasks::{GraphError, TaskError, TaskGraph, TaskGraphBuilder};

use crate::builder::{AssetBuilder, BuildError};

/// Every task the pipeline knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskId {
    CleanImages,
    CopyJpegs,
    CompressPngs,
    Images,
    Styles,
    Autoprefix,
    StylesMin,
    Scripts,
    ScriptsMin,
    VendorScripts,
    Pages,
}

impl TaskId {
    /// All tasks in declaration order.
    pub const ALL: [TaskId; 11] = [
        TaskId::CleanImages,
        TaskId::CopyJpegs,
        TaskId::CompressPngs,
        TaskId::Images,
        TaskId::Styles,
        TaskId::Autoprefix,
        TaskId::StylesMin,
        TaskId::Scripts,
        TaskId::ScriptsMin,
        TaskId::VendorScripts,
        TaskId::Pages,
    ];

    /// Command-line name.
    pub fn name(self) -> &'static str {
        match self {
            TaskId::CleanImages => "clean-images",
            TaskId::CopyJpegs => "copy-jpegs",
            TaskId::CompressPngs => "compress-pngs",
            TaskId::Images => "images",
            TaskId::Styles => "styles",
            TaskId::Autoprefix => "autoprefix",
            TaskId::StylesMin => "styles-min",
            TaskId::Scripts => "scripts",
            TaskId::ScriptsMin => "scripts-min",
            TaskId::VendorScripts => "vendor-scripts",
            TaskId::Pages => "pages",
        }
    }

    /// One-line description for task listings.
    pub fn description(self) -> &'static str {
        match self {
            TaskId::CleanImages => "Empty the image output directory",
            TaskId::CopyJpegs => "Copy JPEG images",
            TaskId::CompressPngs => "Recompress PNG images",
            TaskId::Images => "Clean, copy and compress images",
            TaskId::Styles => "Compile SCSS to CSS",
            TaskId::Autoprefix => "Add vendor prefixes to compiled CSS",
            TaskId::StylesMin => "Write minified .min.css stylesheets",
            TaskId::Scripts => "Transpile scripts",
            TaskId::ScriptsMin => "Transpile and minify scripts to .min.js",
            TaskId::VendorScripts => "Copy vendor scripts",
            TaskId::Pages => "Render page templates with their data",
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A task name that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown task '{0}' (available: {tasks})", tasks = available_tasks())]
pub struct UnknownTask(pub String);

fn available_tasks() -> String {
    TaskId::ALL
        .iter()
        .map(|t| t.name())
        .collect::<Vec<_>>()
        .join(", ")
}

impl FromStr for TaskId {
    type Err = UnknownTask;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskId::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| UnknownTask(s.to_string()))
    }
}

/// Named combinations of tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Default,
    Build,
    Production,
    Watch,
}

impl Target {
    /// The tasks this target runs. The watch target runs these before the
    /// server and watchers start.
    pub fn tasks(self) -> &'static [TaskId] {
        match self {
            Target::Default | Target::Watch => &[
                TaskId::Pages,
                TaskId::Autoprefix,
                TaskId::Scripts,
                TaskId::Images,
                TaskId::VendorScripts,
            ],
            Target::Build => &[TaskId::Pages, TaskId::Autoprefix, TaskId::Scripts],
            Target::Production => &[
                TaskId::Pages,
                TaskId::StylesMin,
                TaskId::ScriptsMin,
                TaskId::Images,
                TaskId::VendorScripts,
            ],
        }
    }

    /// Command-line name.
    pub fn name(self) -> &'static str {
        match self {
            Target::Default => "default",
            Target::Build => "build",
            Target::Production => "production",
            Target::Watch => "watch",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Wrap a builder step as a task action.
fn step<F>(
    builder: &Arc<AssetBuilder>,
    run: F,
) -> impl Fn() -> Result<(), TaskError> + Send + Sync + 'static
where
    F: Fn(&AssetBuilder) -> Result<usize, BuildError> + Send + Sync + 'static,
{
    let builder = Arc::clone(builder);
    move || {
        let files = run(builder.as_ref())?;
        tracing::debug!("{} file(s) processed", files);
        Ok(())
    }
}

/// Register every task against `builder` and validate the graph.
pub fn task_graph(builder: Arc<AssetBuilder>) -> Result<TaskGraph<TaskId>, GraphError<TaskId>> {
    let mut graph = TaskGraphBuilder::new();

    graph.task(TaskId::CleanImages, &[], step(&builder, AssetBuilder::clean_images))?;
    graph.task(
        TaskId::CopyJpegs,
        &[TaskId::CleanImages],
        step(&builder, AssetBuilder::copy_jpegs),
    )?;
    graph.task(
        TaskId::CompressPngs,
        &[TaskId::CleanImages],
        step(&builder, AssetBuilder::compress_pngs),
    )?;
    graph.group(
        TaskId::Images,
        &[TaskId::CleanImages, TaskId::CopyJpegs, TaskId::CompressPngs],
    )?;

    graph.task(TaskId::Styles, &[], step(&builder, AssetBuilder::compile_styles))?;
    graph.task(
        TaskId::Autoprefix,
        &[TaskId::Styles],
        step(&builder, AssetBuilder::autoprefix_styles),
    )?;
    graph.task(
        TaskId::StylesMin,
        &[TaskId::Autoprefix],
        step(&builder, AssetBuilder::minify_styles),
    )?;

    graph.task(TaskId::Scripts, &[], step(&builder, AssetBuilder::transpile_scripts))?;
    graph.task(TaskId::ScriptsMin, &[], step(&builder, AssetBuilder::minify_scripts))?;
    graph.task(
        TaskId::VendorScripts,
        &[],
        step(&builder, AssetBuilder::copy_vendor_scripts),
    )?;

    graph.task(TaskId::Pages, &[], step(&builder, AssetBuilder::render_pages))?;

    graph.build()
}
