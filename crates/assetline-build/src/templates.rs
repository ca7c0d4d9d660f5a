//! Template engine for rendering pages.

use std::path::{Path, PathBuf};

use minijinja::{context, path_loader, Environment};
use walkdir::WalkDir;

use crate::data::TemplateContext;

/// Extension of templates rendered as pages.
const PAGE_EXTENSION: &str = "html";

/// Template engine using minijinja, loading from the templates directory.
///
/// Loaded templates are cached for the lifetime of the engine, so a new
/// engine is created for each render pass.
pub struct TemplateEngine {
    env: Environment<'static>,
    root: PathBuf,
}

impl TemplateEngine {
    /// Create an engine that loads templates from `templates_dir`.
    pub fn new(templates_dir: &Path) -> Self {
        let mut env = Environment::new();
        env.set_loader(path_loader(templates_dir));
        env.add_filter("prettynumber", prettynumber);
        env.add_filter("possession", possession);

        Self {
            env,
            root: templates_dir.to_path_buf(),
        }
    }

    /// Templates rendered as pages, relative to the templates directory.
    ///
    /// Pages are `.html` files whose name does not start with `_`. Everything
    /// else (`.njk` partials, `_layout.html`) is only reachable through
    /// `include` and `extends`.
    pub fn discover_pages(&self) -> Vec<PathBuf> {
        let mut pages: Vec<PathBuf> = WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| is_page(e.path()))
            .filter_map(|e| e.path().strip_prefix(&self.root).ok().map(Path::to_path_buf))
            .collect();

        pages.sort();
        pages
    }

    /// Render the template at `relative` (to the templates directory).
    pub fn render_page(
        &self,
        relative: &Path,
        data: &TemplateContext,
    ) -> Result<String, minijinja::Error> {
        let tmpl = self.env.get_template(&template_name(relative))?;

        tmpl.render(context! {
            globals => &data.globals,
            context => &data.context,
        })
    }
}

fn is_page(path: &Path) -> bool {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    ext == PAGE_EXTENSION && !name.starts_with('_')
}

/// Loader names always use forward slashes.
fn template_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Group the integer digits of a number with commas: `1234567.5` becomes
/// `1,234,567.5`.
fn prettynumber(value: minijinja::Value) -> String {
    let raw = value.to_string();
    let (sign, unsigned) = match raw.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", raw.as_str()),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return raw;
    }

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match frac_part {
        Some(f) => format!("{sign}{grouped}.{f}"),
        None => format!("{sign}{grouped}"),
    }
}

/// Possessive form of a name: `James'`, `Anna's`.
fn possession(name: String) -> String {
    if name.ends_with('s') || name.ends_with('S') {
        format!("{name}'")
    } else {
        format!("{name}'s")
    }
}
