//! Project configuration (assetline.toml).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use assetline_build::assets::DEFAULT_SCRIPT_TARGET;
use assetline_build::data::DEFAULT_GLOBALS_FILE;
use assetline_build::paths::{
    DEFAULT_DATA, DEFAULT_DIST, DEFAULT_IMAGES, DEFAULT_SCRIPTS, DEFAULT_STYLES, DEFAULT_TEMPLATES,
    DEFAULT_VENDOR_SCRIPTS,
};
use assetline_build::{BrowserTargets, BuildConfig, PathConfig};
use assetline_server::DevServerConfig;
use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "assetline.toml";

/// Configuration file structure. Every field has a default.
#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ConfigFile {
    pub paths: PathsConfig,
    pub data: DataConfig,
    pub styles: StylesConfig,
    pub scripts: ScriptsConfig,
    pub server: ServerConfig,
}

/// Project-relative source and output directories.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    pub dist: String,
    pub styles: String,
    pub scripts: String,
    pub vendor_scripts: String,
    pub images: String,
    pub templates: String,
    pub data: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dist: DEFAULT_DIST.to_string(),
            styles: DEFAULT_STYLES.to_string(),
            scripts: DEFAULT_SCRIPTS.to_string(),
            vendor_scripts: DEFAULT_VENDOR_SCRIPTS.to_string(),
            images: DEFAULT_IMAGES.to_string(),
            templates: DEFAULT_TEMPLATES.to_string(),
            data: DEFAULT_DATA.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    /// Shared document inside the data directory
    pub globals: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            globals: DEFAULT_GLOBALS_FILE.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct StylesConfig {
    pub browsers: BrowserTargets,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScriptsConfig {
    /// ECMAScript version to transpile to
    pub target: String,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            target: DEFAULT_SCRIPT_TARGET.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub open: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let server = DevServerConfig::default();
        Self {
            host: server.host,
            port: server.port,
            open: server.open,
        }
    }
}

impl ConfigFile {
    /// Load configuration from `path` if it exists.
    /// Returns an error if the file exists but is malformed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: ConfigFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Source and output locations joined onto `root`.
    pub fn paths(&self, root: &Path) -> PathConfig {
        let p = &self.paths;
        PathConfig {
            root: root.to_path_buf(),
            dist: root.join(&p.dist),
            styles: root.join(&p.styles),
            scripts: root.join(&p.scripts),
            vendor_scripts: root.join(&p.vendor_scripts),
            images: root.join(&p.images),
            templates: root.join(&p.templates),
            data: root.join(&p.data),
        }
    }

    /// Build settings for a project at `root`.
    pub fn build_config(&self, root: &Path) -> BuildConfig {
        BuildConfig {
            paths: self.paths(root),
            globals_file: self.data.globals.clone(),
            browsers: self.styles.browsers.clone(),
            script_target: self.scripts.target.clone(),
        }
    }

    /// Server settings serving the distribution directory of `root`.
    pub fn server_config(&self, root: &Path) -> DevServerConfig {
        DevServerConfig {
            root: root.join(&self.paths.dist),
            host: self.server.host.clone(),
            port: self.server.port,
            open: self.server.open,
            live_reload: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn missing_file_uses_defaults() {
        let temp = tempdir().unwrap();

        let config = ConfigFile::load(&temp.path().join(DEFAULT_CONFIG_FILE)).unwrap();

        assert_eq!(config, ConfigFile::default());
        assert_eq!(
            config.paths(temp.path()),
            PathConfig::at(temp.path())
        );
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.scripts.target, "es2015");
        assert_eq!(config.build_config(temp.path()).globals_file, "data.json");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(
            &path,
            r#"
[paths]
dist = "public"

[styles]
browsers = { safari = 12 }

[server]
port = 8080
"#,
        )
        .unwrap();

        let config = ConfigFile::load(&path).unwrap();
        let build = config.build_config(temp.path());

        assert_eq!(build.paths.dist, temp.path().join("public"));
        assert_eq!(build.paths.styles, temp.path().join(DEFAULT_STYLES));
        assert_eq!(build.browsers.safari, Some(12));
        assert_eq!(build.browsers.chrome, Some(100));
        assert_eq!(build.globals_file, "data.json");

        let server = config.server_config(temp.path());
        assert_eq!(server.port, 8080);
        assert_eq!(server.host, "127.0.0.1");
        assert_eq!(server.root, temp.path().join("public"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "[paths\ndist = ").unwrap();

        let err = ConfigFile::load(&path).unwrap_err();

        assert!(err.to_string().contains("Failed to parse"));
    }
}
