//! File watching for rebuilds.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc as async_mpsc;

/// How long the watcher waits for more events before emitting a batch.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// One changed path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum WatchEvent {
    /// File was created
    Created(PathBuf),

    /// File was modified
    Modified(PathBuf),

    /// File was deleted
    Deleted(PathBuf),
}

impl WatchEvent {
    /// The path that changed.
    pub fn path(&self) -> &PathBuf {
        match self {
            WatchEvent::Created(p) | WatchEvent::Modified(p) | WatchEvent::Deleted(p) => p,
        }
    }
}

/// File watcher that groups bursts of events into batches.
///
/// Events arriving within the debounce window of each other are merged and
/// emitted once, deduplicated. Nothing is dropped.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Watch `paths` recursively with the default debounce window.
    ///
    /// Returns the watcher and a channel of event batches. Dropping the
    /// watcher closes the channel.
    pub fn new(
        paths: &[PathBuf],
    ) -> Result<(Self, async_mpsc::Receiver<Vec<WatchEvent>>), std::io::Error> {
        Self::with_debounce(paths, DEFAULT_DEBOUNCE)
    }

    /// Watch `paths` recursively, batching events within `debounce`.
    pub fn with_debounce(
        paths: &[PathBuf],
        debounce: Duration,
    ) -> Result<(Self, async_mpsc::Receiver<Vec<WatchEvent>>), std::io::Error> {
        let (sync_tx, sync_rx) = mpsc::channel();
        let (async_tx, async_rx) = async_mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
            match res {
                Ok(event) => {
                    let _ = sync_tx.send(event);
                }
                Err(e) => tracing::warn!("Watch error: {}", e),
            }
        })
        .map_err(std::io::Error::other)?;

        for path in paths {
            if path.exists() {
                watcher
                    .watch(path, RecursiveMode::Recursive)
                    .map_err(std::io::Error::other)?;
                tracing::debug!("Watching {}", path.display());
            }
        }

        std::thread::spawn(move || {
            while let Ok(first) = sync_rx.recv() {
                let mut batch = BTreeSet::new();
                batch.extend(classify_event(&first));

                // Keep collecting until the burst goes quiet
                while let Ok(event) = sync_rx.recv_timeout(debounce) {
                    batch.extend(classify_event(&event));
                }

                if batch.is_empty() {
                    continue;
                }
                if async_tx.blocking_send(batch.into_iter().collect()).is_err() {
                    break;
                }
            }
        });

        Ok((Self { _watcher: watcher }, async_rx))
    }
}

/// Classify a notify event into watch events, one per path.
fn classify_event(event: &notify::Event) -> Vec<WatchEvent> {
    let make: fn(PathBuf) -> WatchEvent = match event.kind {
        EventKind::Create(_) => WatchEvent::Created,
        EventKind::Modify(_) => WatchEvent::Modified,
        EventKind::Remove(_) => WatchEvent::Deleted,
        _ => return Vec::new(),
    };
    event.paths.iter().cloned().map(make).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn watches_file_changes() {
        let temp = tempdir().unwrap();
        let test_file = temp.path().join("main.scss");

        // Create the watcher first (so it catches file creation)
        let (watcher, mut rx) = FileWatcher::new(&[temp.path().to_path_buf()]).unwrap();

        // Give inotify time to set up
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(&test_file, ".a { color: red; }").unwrap();
        fs::write(&test_file, ".a { color: blue; }").unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;

        // Keep watcher alive until we're done
        drop(watcher);

        let batch = batch
            .expect("timeout waiting for file watch event")
            .expect("channel should not be closed");
        assert!(batch
            .iter()
            .any(|e| e.path().file_name() == test_file.file_name()));
    }

    #[test]
    fn classifies_by_event_kind() {
        use notify::event::{CreateKind, ModifyKind, RemoveKind};

        let event = |kind| {
            notify::Event::new(kind)
                .add_path(PathBuf::from("a.js"))
                .add_path(PathBuf::from("b.js"))
        };

        assert_eq!(
            classify_event(&event(EventKind::Create(CreateKind::File))),
            vec![
                WatchEvent::Created(PathBuf::from("a.js")),
                WatchEvent::Created(PathBuf::from("b.js"))
            ]
        );
        assert_eq!(
            classify_event(&event(EventKind::Modify(ModifyKind::Any)))[0],
            WatchEvent::Modified(PathBuf::from("a.js"))
        );
        assert_eq!(
            classify_event(&event(EventKind::Remove(RemoveKind::File)))[1],
            WatchEvent::Deleted(PathBuf::from("b.js"))
        );
        assert!(classify_event(&event(EventKind::Access(
            notify::event::AccessKind::Any
        )))
        .is_empty());
    }
}
