//! Which source changes trigger which tasks in watch mode.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::paths::PathConfig;
use crate::tasks::TaskId;

/// How connected browsers should react once a rebuild finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadKind {
    /// Swap stylesheets in place
    Css,
    /// Reload the whole page
    Full,
}

/// One watched location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRule {
    pub dir: PathBuf,
    /// Lower-case extensions without the dot
    pub extensions: &'static [&'static str],
    /// Whether files in subdirectories match
    pub recursive: bool,
    pub tasks: &'static [TaskId],
    pub reload: ReloadKind,
}

impl WatchRule {
    /// Whether a changed file falls under this rule.
    pub fn matches(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.dir) else {
            return false;
        };
        if !self.recursive && relative.components().count() != 1 {
            return false;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|wanted| ext.eq_ignore_ascii_case(wanted))
            })
    }
}

/// Tasks to run for a batch of changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triggered {
    pub tasks: Vec<TaskId>,
    pub reload: ReloadKind,
}

/// The full set of watch rules for a project.
#[derive(Debug, Clone)]
pub struct WatchPlan {
    rules: Vec<WatchRule>,
}

impl WatchPlan {
    /// Default rules for the given layout.
    pub fn from_paths(paths: &PathConfig) -> Self {
        let rules = vec![
            WatchRule {
                dir: normalize(&paths.styles),
                extensions: &["scss"],
                recursive: true,
                tasks: &[TaskId::Autoprefix],
                reload: ReloadKind::Css,
            },
            WatchRule {
                dir: normalize(&paths.scripts),
                extensions: &["js"],
                recursive: false,
                tasks: &[TaskId::Scripts],
                reload: ReloadKind::Full,
            },
            WatchRule {
                dir: normalize(&paths.vendor_scripts),
                extensions: &["js"],
                recursive: true,
                tasks: &[TaskId::VendorScripts],
                reload: ReloadKind::Full,
            },
            WatchRule {
                dir: normalize(&paths.templates),
                extensions: &["html", "njk"],
                recursive: true,
                tasks: &[TaskId::Pages],
                reload: ReloadKind::Full,
            },
            WatchRule {
                dir: normalize(&paths.data),
                extensions: &["json"],
                recursive: true,
                tasks: &[TaskId::Pages],
                reload: ReloadKind::Full,
            },
            WatchRule {
                dir: normalize(&paths.images),
                extensions: &["jpg", "jpeg", "png"],
                recursive: true,
                tasks: &[TaskId::Images],
                reload: ReloadKind::Full,
            },
        ];
        Self { rules }
    }

    /// Directories to hand to the filesystem watcher. Directories nested
    /// inside another watched directory are left out, as are ones that do
    /// not exist.
    pub fn roots(&self) -> Vec<PathBuf> {
        let dirs: BTreeSet<&PathBuf> = self
            .rules
            .iter()
            .map(|r| &r.dir)
            .filter(|d| d.is_dir())
            .collect();

        dirs.iter()
            .filter(|dir| !dirs.iter().any(|other| other != *dir && dir.starts_with(other)))
            .map(|dir| (*dir).clone())
            .collect()
    }

    /// Map changed paths to the union of matching tasks. `None` when no rule
    /// matched. The reload is CSS-only when every matching rule asks for it.
    pub fn triggered(&self, changed: &[PathBuf]) -> Option<Triggered> {
        let mut tasks = BTreeSet::new();
        let mut css_only = true;

        for path in changed {
            let path = normalize(path);
            for rule in self.rules.iter().filter(|r| r.matches(&path)) {
                tasks.extend(rule.tasks.iter().copied());
                css_only &= rule.reload == ReloadKind::Css;
            }
        }

        if tasks.is_empty() {
            return None;
        }

        Some(Triggered {
            tasks: tasks.into_iter().collect(),
            reload: if css_only {
                ReloadKind::Css
            } else {
                ReloadKind::Full
            },
        })
    }
}

/// Canonical form when the path exists, so watcher events and rule
/// directories agree on symlinks.
fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    // Deleted files no longer canonicalize; resolve their parent instead.
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map(|p| p.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn layout() -> (tempfile::TempDir, PathConfig) {
        let temp = tempdir().unwrap();
        let root = temp.path().canonicalize().unwrap();
        let paths = PathConfig::at(&root);
        for dir in [
            &paths.styles,
            &paths.scripts,
            &paths.vendor_scripts,
            &paths.templates,
            &paths.data,
            &paths.images,
        ] {
            fs::create_dir_all(dir).unwrap();
        }
        (temp, paths)
    }

    #[test]
    fn scss_changes_only_refresh_css() {
        let (_temp, paths) = layout();
        let plan = WatchPlan::from_paths(&paths);

        let hit = plan
            .triggered(&[paths.styles.join("components/_nav.scss")])
            .unwrap();

        assert_eq!(
            hit,
            Triggered {
                tasks: vec![TaskId::Autoprefix],
                reload: ReloadKind::Css,
            }
        );
    }

    #[test]
    fn vendor_scripts_do_not_trigger_script_transpile() {
        let (_temp, paths) = layout();
        let plan = WatchPlan::from_paths(&paths);

        let hit = plan
            .triggered(&[paths.vendor_scripts.join("jquery.js")])
            .unwrap();
        assert_eq!(hit.tasks, vec![TaskId::VendorScripts]);

        let hit = plan.triggered(&[paths.scripts.join("app.js")]).unwrap();
        assert_eq!(hit.tasks, vec![TaskId::Scripts]);
    }

    #[test]
    fn mixed_batches_merge_tasks_and_force_full_reload() {
        let (_temp, paths) = layout();
        let plan = WatchPlan::from_paths(&paths);

        let hit = plan
            .triggered(&[
                paths.styles.join("main.scss"),
                paths.data.join("index.json"),
                paths.templates.join("_layout.njk"),
                paths.images.join("Logo.PNG"),
            ])
            .unwrap();

        assert_eq!(
            hit.tasks,
            vec![TaskId::Images, TaskId::Autoprefix, TaskId::Pages]
        );
        assert_eq!(hit.reload, ReloadKind::Full);
    }

    #[test]
    fn unrelated_files_trigger_nothing() {
        let (_temp, paths) = layout();
        let plan = WatchPlan::from_paths(&paths);

        assert_eq!(plan.triggered(&[paths.styles.join("notes.txt")]), None);
        assert_eq!(plan.triggered(&[paths.dist.join("index.html")]), None);
        assert_eq!(plan.triggered(&[]), None);
    }

    #[test]
    fn roots_skip_nested_and_missing_directories() {
        let (_temp, paths) = layout();
        fs::remove_dir_all(&paths.images).unwrap();
        let plan = WatchPlan::from_paths(&paths);

        let roots = plan.roots();

        assert!(roots.contains(&paths.scripts));
        assert!(!roots.contains(&paths.vendor_scripts));
        assert!(!roots.contains(&paths.images));
        assert!(roots.contains(&paths.templates));
    }
}
