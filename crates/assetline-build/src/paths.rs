//! Source and output locations for every asset category.

use std::path::{Path, PathBuf};

/// Default project-relative source and output directories.
pub const DEFAULT_DIST: &str = "dist";
pub const DEFAULT_STYLES: &str = "application/src/scss";
pub const DEFAULT_SCRIPTS: &str = "application/src/js";
pub const DEFAULT_VENDOR_SCRIPTS: &str = "application/src/js/vendor";
pub const DEFAULT_IMAGES: &str = "application/static/images";
pub const DEFAULT_TEMPLATES: &str = "application/templates";
pub const DEFAULT_DATA: &str = "application/data";

/// Where assets are read from and written to.
///
/// Every path is already joined onto the project root. Nothing here checks
/// that a directory exists; tasks find out when they read or write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathConfig {
    /// Project root
    pub root: PathBuf,

    /// Distribution root
    pub dist: PathBuf,

    /// SCSS sources
    pub styles: PathBuf,

    /// JavaScript sources
    pub scripts: PathBuf,

    /// Third-party scripts copied verbatim
    pub vendor_scripts: PathBuf,

    /// Source images
    pub images: PathBuf,

    /// Page templates and partials
    pub templates: PathBuf,

    /// JSON data documents for templates
    pub data: PathBuf,
}

impl PathConfig {
    /// Default layout under `root`.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            dist: root.join(DEFAULT_DIST),
            styles: root.join(DEFAULT_STYLES),
            scripts: root.join(DEFAULT_SCRIPTS),
            vendor_scripts: root.join(DEFAULT_VENDOR_SCRIPTS),
            images: root.join(DEFAULT_IMAGES),
            templates: root.join(DEFAULT_TEMPLATES),
            data: root.join(DEFAULT_DATA),
            root,
        }
    }

    /// Output directory for compiled stylesheets.
    pub fn stylesheets_out(&self) -> PathBuf {
        self.dist.join("static").join("stylesheets")
    }

    /// Output directory for transpiled scripts.
    pub fn javascripts_out(&self) -> PathBuf {
        self.dist.join("static").join("javascripts")
    }

    /// Output directory for vendor scripts.
    pub fn vendor_out(&self) -> PathBuf {
        self.javascripts_out().join("vendor")
    }

    /// Output directory for optimized images.
    pub fn images_out(&self) -> PathBuf {
        self.dist.join("static").join("images")
    }

    /// Output root for rendered pages.
    pub fn pages_out(&self) -> &Path {
        &self.dist
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        Self::at(".")
    }
}
