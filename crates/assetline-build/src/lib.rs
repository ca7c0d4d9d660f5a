//! Asset build steps for assetline.
//!
//! Compiles styles and scripts, optimizes images and renders page templates
//! into a distribution directory, and wires each step into a task graph.

pub mod assets;
pub mod builder;
pub mod data;
pub mod images;
pub mod paths;
pub mod tasks;
pub mod templates;
pub mod watch;

pub use assets::{AssetError, AssetPipeline, BrowserTargets};
pub use builder::{AssetBuilder, BuildConfig, BuildError};
pub use data::{DataError, DataResolver, TemplateContext};
pub use paths::PathConfig;
pub use tasks::{task_graph, Target, TaskId, UnknownTask};
pub use watch::{ReloadKind, Triggered, WatchPlan, WatchRule};
