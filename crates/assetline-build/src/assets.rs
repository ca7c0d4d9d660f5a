//! Asset pipeline for CSS and JavaScript processing.

use std::path::{Path, PathBuf};

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use oxc_allocator::Allocator;
use oxc_ast::ast::{Program, Statement};
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{CompressOptions, MangleOptions, Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{TransformOptions, Transformer};
use serde::Deserialize;

/// Default ECMAScript target for transpiled scripts.
pub const DEFAULT_SCRIPT_TARGET: &str = "es2015";

/// Module the transformer imports its runtime helpers from.
const RUNTIME_HELPERS: &str = "@oxc-project/runtime/helpers/";

/// Errors from the style and script compilers.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Sass error: {0}")]
    Sass(String),

    #[error("CSS error: {0}")]
    Css(String),

    #[error("Script parse error: {0}")]
    ScriptParse(String),

    #[error("Script transform error: {0}")]
    ScriptTransform(String),
}

/// Minimum browser versions the CSS post-processor prefixes for.
///
/// Versions are major releases; unset browsers are not targeted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BrowserTargets {
    pub chrome: Option<u32>,
    pub edge: Option<u32>,
    pub firefox: Option<u32>,
    pub safari: Option<u32>,
    pub ios_saf: Option<u32>,
    pub samsung: Option<u32>,
}

impl Default for BrowserTargets {
    fn default() -> Self {
        Self {
            chrome: Some(100),
            edge: Some(100),
            firefox: Some(100),
            safari: Some(13),
            ios_saf: Some(13),
            samsung: None,
        }
    }
}

impl BrowserTargets {
    /// Convert to lightningcss targets. Versions are encoded as
    /// `major << 16`.
    pub fn to_targets(&self) -> Targets {
        let encode = |v: Option<u32>| v.map(|major| major << 16);
        Targets::from(Browsers {
            chrome: encode(self.chrome),
            edge: encode(self.edge),
            firefox: encode(self.firefox),
            safari: encode(self.safari),
            ios_saf: encode(self.ios_saf),
            samsung: encode(self.samsung),
            ..Browsers::default()
        })
    }
}

/// Asset pipeline utilities.
pub struct AssetPipeline;

impl AssetPipeline {
    /// Compile a Sass entry point to expanded CSS.
    ///
    /// The entry's directory and `load_paths` are searched for `@use` and
    /// `@import`.
    pub fn compile_scss(path: &Path, load_paths: &[PathBuf]) -> Result<String, AssetError> {
        let mut options = grass::Options::default().style(grass::OutputStyle::Expanded);
        if let Some(parent) = path.parent() {
            options = options.load_path(parent);
        }
        for dir in load_paths {
            options = options.load_path(dir);
        }

        grass::from_path(path, &options).map_err(|e| AssetError::Sass(e.to_string()))
    }

    /// Run CSS through lightningcss: vendor prefixes and syntax lowering for
    /// `targets`, optionally minified.
    pub fn postprocess_css(
        css: &str,
        filename: &str,
        targets: &BrowserTargets,
        minify: bool,
    ) -> Result<String, AssetError> {
        let targets = targets.to_targets();

        let mut stylesheet = StyleSheet::parse(
            css,
            ParserOptions {
                filename: filename.to_string(),
                ..Default::default()
            },
        )
        .map_err(|e| AssetError::Css(format!("{}: {}", filename, e)))?;

        stylesheet
            .minify(MinifyOptions {
                targets,
                ..Default::default()
            })
            .map_err(|e| AssetError::Css(format!("{}: {}", filename, e)))?;

        let printed = stylesheet
            .to_css(PrinterOptions {
                minify,
                targets,
                ..Default::default()
            })
            .map_err(|e| AssetError::Css(format!("{}: {}", filename, e)))?;

        Ok(printed.code)
    }

    /// Transpile a script down to `target` (for example `es2015`).
    pub fn transpile_js(source: &str, path: &Path, target: &str) -> Result<String, AssetError> {
        let allocator = Allocator::default();
        let source_type = SourceType::from_path(path).unwrap_or_default();

        let parsed = Parser::new(&allocator, source, source_type).parse();
        if let Some(error) = parsed.errors.first() {
            return Err(AssetError::ScriptParse(format!("{}: {}", path.display(), error)));
        }
        let mut program = parsed.program;

        let options =
            TransformOptions::from_target(target).map_err(AssetError::ScriptTransform)?;
        let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();
        let transformed =
            Transformer::new(&allocator, path, &options).build_with_scoping(scoping, &mut program);
        if let Some(error) = transformed.errors.first() {
            return Err(AssetError::ScriptTransform(format!(
                "{}: {}",
                path.display(),
                error
            )));
        }

        // Output is served as a plain script, so nothing may be left to import.
        let helpers = runtime_helpers(&program);
        if !helpers.is_empty() {
            return Err(AssetError::ScriptTransform(format!(
                "{}: lowering to {} needs runtime helpers ({}); raise the script target",
                path.display(),
                target,
                helpers.join(", ")
            )));
        }

        Ok(Codegen::new().build(&program).code)
    }

    /// Compress and mangle a script.
    pub fn minify_js(source: &str, path: &Path) -> Result<String, AssetError> {
        let allocator = Allocator::default();
        let source_type = SourceType::from_path(path).unwrap_or_default();

        let parsed = Parser::new(&allocator, source, source_type).parse();
        if let Some(error) = parsed.errors.first() {
            return Err(AssetError::ScriptParse(format!("{}: {}", path.display(), error)));
        }
        let mut program = parsed.program;

        let minified = Minifier::new(MinifierOptions {
            mangle: Some(MangleOptions::default()),
            compress: Some(CompressOptions::default()),
        })
        .build(&allocator, &mut program);

        Ok(Codegen::new()
            .with_options(CodegenOptions::minify())
            .with_scoping(minified.scoping)
            .build(&program)
            .code)
    }
}

/// Names of the runtime helpers the transformer imported into `program`.
fn runtime_helpers(program: &Program) -> Vec<String> {
    program
        .body
        .iter()
        .filter_map(|stmt| match stmt {
            Statement::ImportDeclaration(decl) => {
                decl.source.value.as_str().strip_prefix(RUNTIME_HELPERS)
            }
            _ => None,
        })
        .map(str::to_string)
        .collect()
}
