//! Development server with live reload for assetline.
//!
//! Serves the distribution directory, injects a reload client into HTML
//! pages and watches source directories for changes.

pub mod server;
pub mod watcher;
pub mod websocket;

pub use server::{inject_reload_script, DevServer, DevServerConfig, ServerError};
pub use watcher::{FileWatcher, WatchEvent};
pub use websocket::{ReloadHub, ReloadMessage};
