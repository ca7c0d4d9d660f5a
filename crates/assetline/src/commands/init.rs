//! Scaffold a starter project.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::config::DEFAULT_CONFIG_FILE;

/// Starter files, relative to the project root.
const STARTER_FILES: &[(&str, &str)] = &[
    (DEFAULT_CONFIG_FILE, DEFAULT_CONFIG),
    ("application/src/scss/_variables.scss", DEFAULT_VARIABLES),
    ("application/src/scss/main.scss", DEFAULT_STYLES),
    ("application/src/js/main.js", DEFAULT_SCRIPT),
    ("application/templates/layout.njk", DEFAULT_LAYOUT),
    ("application/templates/index.html", DEFAULT_INDEX),
    ("application/data/data.json", DEFAULT_GLOBALS),
    ("application/data/index.json", DEFAULT_INDEX_DATA),
];

/// Directories created empty.
const STARTER_DIRS: &[&str] = &["application/src/js/vendor", "application/static/images"];

/// Run the init command.
pub async fn run(root: &Path, yes: bool) -> Result<()> {
    tracing::info!("Initializing assetline in {}...", root.display());

    let application = root.join("application");
    if application.exists() && !yes {
        tracing::warn!("application/ directory already exists. Use --yes to overwrite.");
        return Ok(());
    }

    for dir in STARTER_DIRS {
        fs::create_dir_all(root.join(dir))
            .with_context(|| format!("Failed to create {}", dir))?;
    }

    for (relative, content) in STARTER_FILES {
        let path = root.join(relative);
        if path.exists() && !yes {
            tracing::debug!("Keeping existing {}", relative);
            continue;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("Failed to write {}", relative))?;
        tracing::info!("Created {}", relative);
    }

    tracing::info!("Initialization complete!");
    tracing::info!("Run 'assetline watch' to start the development server.");

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# assetline configuration
# Every value below is the default; remove what you do not change.

[paths]
dist = "dist"
styles = "application/src/scss"
scripts = "application/src/js"
vendor_scripts = "application/src/js/vendor"
images = "application/static/images"
templates = "application/templates"
data = "application/data"

[data]
# Shared document every page sees as `globals`
globals = "data.json"

[styles]
# Oldest browser versions to add vendor prefixes for
browsers = { chrome = 100, edge = 100, firefox = 100, safari = 13, ios_saf = 13 }

[scripts]
# ECMAScript version scripts are transpiled to
target = "es2015"

[server]
host = "127.0.0.1"
port = 3000
open = true
"#;

const DEFAULT_VARIABLES: &str = r#"$font-stack: system-ui, sans-serif;
$text-color: #222;
$accent: #2a6496;
$measure: 40rem;
"#;

const DEFAULT_STYLES: &str = r#"@import 'variables';

body {
  font-family: $font-stack;
  color: $text-color;
  max-width: $measure;
  margin: 2rem auto;
  padding: 0 1rem;
}

a {
  color: $accent;

  &:hover {
    text-decoration: underline;
  }
}

.stats {
  display: flex;
  gap: 1rem;
  user-select: none;
}
"#;

const DEFAULT_SCRIPT: &str = r#"const counters = document.querySelectorAll('[data-count]');

counters.forEach((el) => {
  const total = Number(el.dataset.count ?? 0);
  el.title = `${total} in total`;
});
"#;

const DEFAULT_LAYOUT: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{% block title %}{{ globals.site_name }}{% endblock %}</title>
  <link rel="stylesheet" href="/static/stylesheets/main.css">
</head>
<body>
  {% block content %}{% endblock %}
  <script src="/static/javascripts/main.js"></script>
</body>
</html>
"#;

const DEFAULT_INDEX: &str = r#"{% extends "layout.njk" %}

{% block content %}
<h1>{{ context.heading }}</h1>
<p>{{ globals.owner | possession }} project has
  <span data-count="{{ context.visitors }}">{{ context.visitors | prettynumber }}</span>
  visitors.</p>
{% endblock %}
"#;

const DEFAULT_GLOBALS: &str = r#"{
  "site_name": "My Site",
  "owner": "James"
}
"#;

const DEFAULT_INDEX_DATA: &str = r#"{
  "heading": "Welcome",
  "visitors": 1234567
}
"#;
