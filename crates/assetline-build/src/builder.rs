//! The file-level build steps behind every task.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use glob::MatchOptions;
use rayon::prelude::*;

use crate::assets::{AssetError, AssetPipeline, BrowserTargets, DEFAULT_SCRIPT_TARGET};
use crate::data::{DataError, DataResolver, DEFAULT_GLOBALS_FILE};
use crate::images::{self, ImageError};
use crate::paths::PathConfig;
use crate::templates::TemplateEngine;

/// Configuration for building assets.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Source and output locations
    pub paths: PathConfig,

    /// File name of the shared data document inside the data directory
    pub globals_file: String,

    /// Browsers the CSS post-processor targets
    pub browsers: BrowserTargets,

    /// ECMAScript version scripts are transpiled to
    pub script_target: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            paths: PathConfig::default(),
            globals_file: DEFAULT_GLOBALS_FILE.to_string(),
            browsers: BrowserTargets::default(),
            script_target: DEFAULT_SCRIPT_TARGET.to_string(),
        }
    }
}

/// Errors that can occur during a build step.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid source pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Failed to process {}: {source}", .path.display())]
    Asset {
        path: PathBuf,
        #[source]
        source: AssetError,
    },

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("Failed to render template {}: {message}", .template.display())]
    Template { template: PathBuf, message: String },

    #[error("{} of {total} pages failed to render: {}", .failures.len(), summarize(.failures))]
    Pages {
        total: usize,
        failures: Vec<BuildError>,
    },
}

fn summarize(failures: &[BuildError]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Runs the individual build steps against a [`BuildConfig`].
///
/// Every step is synchronous and returns once all of its files are written.
/// A missing source directory means there is nothing to do.
pub struct AssetBuilder {
    config: BuildConfig,
    data: DataResolver,
}

impl AssetBuilder {
    /// Create a new builder.
    pub fn new(config: BuildConfig) -> Self {
        let data = DataResolver::new(&config.paths.data, config.globals_file.clone());
        Self { config, data }
    }

    /// The configuration this builder runs with.
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Empty the image output directory.
    pub fn clean_images(&self) -> Result<usize, BuildError> {
        let out = self.config.paths.images_out();
        let removed = images::clean_dir(&out).map_err(|e| BuildError::Write {
            path: out.clone(),
            source: e,
        })?;
        tracing::debug!("Removed {} entries from {}", removed, out.display());
        Ok(removed)
    }

    /// Copy JPEG images unchanged, keeping their subdirectories.
    pub fn copy_jpegs(&self) -> Result<usize, BuildError> {
        let src = &self.config.paths.images;
        let out = self.config.paths.images_out();

        let mut files = sources(src, "**/*.jpg")?;
        files.extend(sources(src, "**/*.jpeg")?);

        files.par_iter().try_for_each(|file| {
            let dest = mirror(src, file, &out);
            ensure_parent(&dest)?;
            fs::copy(file, &dest).map_err(|e| BuildError::Write {
                path: dest.clone(),
                source: e,
            })?;
            Ok::<_, BuildError>(())
        })?;

        Ok(files.len())
    }

    /// Recompress PNG images.
    pub fn compress_pngs(&self) -> Result<usize, BuildError> {
        let src = &self.config.paths.images;
        let out = self.config.paths.images_out();
        let files = sources(src, "**/*.png")?;

        files.par_iter().try_for_each(|file| {
            let dest = mirror(src, file, &out);
            ensure_parent(&dest)?;
            let savings = images::recompress_png(file, &dest)?;
            tracing::info!(
                "Minified {} ({} -> {} bytes, saved {:.1}%)",
                display_relative(src, file),
                savings.original,
                savings.written,
                savings.percent()
            );
            Ok::<_, BuildError>(())
        })?;

        Ok(files.len())
    }

    /// Compile top-level Sass entry points to CSS. Partials (`_name.scss`)
    /// are only compiled through the entries that load them.
    pub fn compile_styles(&self) -> Result<usize, BuildError> {
        let src = &self.config.paths.styles;
        let out = self.config.paths.stylesheets_out();
        let entries: Vec<PathBuf> = sources(src, "*.scss")?
            .into_iter()
            .filter(|p| !file_name(p).starts_with('_'))
            .collect();

        let load_paths = vec![src.clone()];
        entries.par_iter().try_for_each(|entry| {
            let css = AssetPipeline::compile_scss(entry, &load_paths).map_err(|e| {
                BuildError::Asset {
                    path: entry.clone(),
                    source: e,
                }
            })?;
            write_output(&out.join(with_extension(entry, "css")), &css)
        })?;

        Ok(entries.len())
    }

    /// Prefix compiled stylesheets in place for the configured browsers.
    pub fn autoprefix_styles(&self) -> Result<usize, BuildError> {
        let compiled = self.compiled_stylesheets()?;

        compiled.par_iter().try_for_each(|path| {
            let css = read_source(path)?;
            let processed =
                AssetPipeline::postprocess_css(&css, file_name(path), &self.config.browsers, false)
                    .map_err(|e| BuildError::Asset {
                        path: path.clone(),
                        source: e,
                    })?;
            write_output(path, &processed)
        })?;

        Ok(compiled.len())
    }

    /// Write a minified `<name>.min.css` beside every compiled stylesheet.
    pub fn minify_styles(&self) -> Result<usize, BuildError> {
        let compiled = self.compiled_stylesheets()?;

        compiled.par_iter().try_for_each(|path| {
            let css = read_source(path)?;
            let minified =
                AssetPipeline::postprocess_css(&css, file_name(path), &self.config.browsers, true)
                    .map_err(|e| BuildError::Asset {
                        path: path.clone(),
                        source: e,
                    })?;
            write_output(&path.with_file_name(min_name(path, "css")), &minified)
        })?;

        Ok(compiled.len())
    }

    /// Transpile top-level scripts to the configured target.
    pub fn transpile_scripts(&self) -> Result<usize, BuildError> {
        self.process_scripts(false)
    }

    /// Transpile and minify top-level scripts to `<name>.min.js`.
    pub fn minify_scripts(&self) -> Result<usize, BuildError> {
        self.process_scripts(true)
    }

    fn process_scripts(&self, minify: bool) -> Result<usize, BuildError> {
        let src = &self.config.paths.scripts;
        let out = self.config.paths.javascripts_out();
        let files = sources(src, "*.js")?;

        files.par_iter().try_for_each(|file| {
            let source = read_source(file)?;
            let code = self.compile_script(file, &source, minify).map_err(|e| {
                BuildError::Asset {
                    path: file.clone(),
                    source: e,
                }
            })?;
            let name = if minify {
                min_name(file, "js")
            } else {
                with_extension(file, "js")
            };
            write_output(&out.join(name), &code)
        })?;

        Ok(files.len())
    }

    fn compile_script(&self, path: &Path, source: &str, minify: bool) -> Result<String, AssetError> {
        let transpiled = AssetPipeline::transpile_js(source, path, &self.config.script_target)?;
        if minify {
            AssetPipeline::minify_js(&transpiled, path)
        } else {
            Ok(transpiled)
        }
    }

    /// Copy vendor scripts verbatim.
    pub fn copy_vendor_scripts(&self) -> Result<usize, BuildError> {
        let src = &self.config.paths.vendor_scripts;
        let out = self.config.paths.vendor_out();
        let files = sources(src, "**/*.js")?;

        for file in &files {
            let dest = mirror(src, file, &out);
            ensure_parent(&dest)?;
            fs::copy(file, &dest).map_err(|e| BuildError::Write {
                path: dest.clone(),
                source: e,
            })?;
        }

        Ok(files.len())
    }

    /// Render every page template with its data.
    ///
    /// A page whose data or template fails does not stop the others; the
    /// step fails afterwards, naming every failed page.
    pub fn render_pages(&self) -> Result<usize, BuildError> {
        let start = Instant::now();
        let templates_dir = &self.config.paths.templates;
        if !templates_dir.exists() {
            tracing::debug!("No templates at {}", templates_dir.display());
            return Ok(0);
        }

        let engine = TemplateEngine::new(templates_dir);
        let pages = engine.discover_pages();
        let out = self.config.paths.pages_out();

        let failures: Vec<BuildError> = pages
            .par_iter()
            .filter_map(|page| self.render_page(&engine, page, out).err())
            .collect();

        for failure in &failures {
            tracing::error!("{}", failure);
        }

        if !failures.is_empty() {
            return Err(BuildError::Pages {
                total: pages.len(),
                failures,
            });
        }

        tracing::debug!(
            "Rendered {} pages in {}ms",
            pages.len(),
            start.elapsed().as_millis()
        );
        Ok(pages.len())
    }

    fn render_page(
        &self,
        engine: &TemplateEngine,
        page: &Path,
        out: &Path,
    ) -> Result<(), BuildError> {
        let data = self.data.resolve(page)?;
        let html = engine
            .render_page(page, &data)
            .map_err(|e| BuildError::Template {
                template: page.to_path_buf(),
                message: format!("{:#}", e),
            })?;
        write_output(&out.join(page), &html)
    }

    /// Compiled stylesheets in the output directory, excluding minified
    /// copies.
    fn compiled_stylesheets(&self) -> Result<Vec<PathBuf>, BuildError> {
        let out = self.config.paths.stylesheets_out();
        Ok(sources(&out, "*.css")?
            .into_iter()
            .filter(|p| !file_name(p).ends_with(".min.css"))
            .collect())
    }
}

/// Files under `dir` matching `pattern`, sorted. A missing `dir` yields
/// nothing.
fn sources(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, BuildError> {
    if !dir.exists() {
        tracing::debug!("Source directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let full = format!(
        "{}/{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        pattern
    );
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };

    let mut files: Vec<PathBuf> = glob::glob_with(&full, options)?
        .filter_map(|e| e.ok())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    files.dedup();
    Ok(files)
}

/// `file` under `src`, re-rooted under `out`.
fn mirror(src: &Path, file: &Path, out: &Path) -> PathBuf {
    match file.strip_prefix(src) {
        Ok(relative) => out.join(relative),
        Err(_) => out.join(file_name(file)),
    }
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

fn with_extension(path: &Path, ext: &str) -> String {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("index");
    format!("{}.{}", stem, ext)
}

fn min_name(path: &Path, ext: &str) -> String {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("index");
    format!("{}.min.{}", stem, ext)
}

fn display_relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

fn read_source(path: &Path) -> Result<String, BuildError> {
    fs::read_to_string(path).map_err(|e| BuildError::Read {
        path: path.to_path_buf(),
        source: e,
    })
}

fn ensure_parent(path: &Path) -> Result<(), BuildError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::Write {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

fn write_output(path: &Path, content: &str) -> Result<(), BuildError> {
    ensure_parent(path)?;
    fs::write(path, content).map_err(|e| BuildError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}
