//! File watcher with debouncing for workspace changes.
//!
//! Uses notify-debouncer-mini for efficient file change detection.

use anyhow::Result;
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Directories that never hold files worth tagging.
const SKIPPED_DIRS: &[&str] = &["target", "node_modules"];

/// File event from the watcher.
#[derive(Debug, Clone)]
pub struct FileEvent {
    /// Absolute path of the file
    pub path: PathBuf,
    /// Type of event
    pub kind: FileEventKind,
}

/// Type of file event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    /// File was created or modified
    Modified,
    /// File was deleted
    Deleted,
}

/// File watcher that monitors the workspace roots.
pub struct FileWatcher {
    /// Watched roots
    roots: Vec<PathBuf>,
    /// Debouncer handle (must keep alive)
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    /// Receiver for file events
    event_rx: mpsc::UnboundedReceiver<FileEvent>,
}

/// Track last seen mtime to filter spurious events
type MtimeCache = Arc<Mutex<HashMap<PathBuf, SystemTime>>>;

impl FileWatcher {
    /// Create a watcher over `roots`. Files named in `ignored` (the note
    /// store) never produce events.
    ///
    /// Uses 200ms debounce period to avoid rapid-fire events during saves.
    pub fn new(roots: &[PathBuf], ignored: Vec<String>) -> Result<Self> {
        // Canonicalize so event paths and root prefixes agree (macOS
        // reports /private/var for /var).
        let roots: Vec<PathBuf> = roots
            .iter()
            .map(|root| root.canonicalize().unwrap_or_else(|_| root.clone()))
            .collect();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let roots_clone = roots.clone();
        let mtime_cache: MtimeCache = Arc::new(Mutex::new(HashMap::new()));

        let mut debouncer = new_debouncer(
            Duration::from_millis(200),
            move |result: Result<Vec<DebouncedEvent>, notify::Error>| match result {
                Ok(events) => {
                    for event in events {
                        if let Some(file_event) =
                            Self::process_event(&event, &roots_clone, &ignored, &mtime_cache)
                        {
                            if event_tx.send(file_event).is_err() {
                                // Receiver dropped
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("File watcher error: {}", e);
                }
            },
        )?;

        for root in &roots {
            debouncer.watcher().watch(root, RecursiveMode::Recursive)?;
        }

        Ok(Self {
            roots,
            _debouncer: debouncer,
            event_rx,
        })
    }

    /// Process a single debounced event, returning a FileEvent if relevant.
    fn process_event(
        event: &DebouncedEvent,
        roots: &[PathBuf],
        ignored: &[String],
        mtime_cache: &MtimeCache,
    ) -> Option<FileEvent> {
        let path = &event.path;
        let relative = roots.iter().find_map(|root| path.strip_prefix(root).ok())?;
        if !is_watched(relative, ignored) {
            return None;
        }

        let kind = if path.is_file() {
            FileEventKind::Modified
        } else if path.exists() {
            return None;
        } else {
            FileEventKind::Deleted
        };

        // Some filesystems report events without a write; compare mtimes.
        let mut cache = mtime_cache.lock().unwrap_or_else(|e| e.into_inner());
        match kind {
            FileEventKind::Modified => {
                if let Ok(mtime) = std::fs::metadata(path).and_then(|m| m.modified()) {
                    if cache.get(path) == Some(&mtime) {
                        return None;
                    }
                    cache.insert(path.clone(), mtime);
                }
            }
            FileEventKind::Deleted => {
                cache.remove(path);
            }
        }

        debug!("File event: {:?} - {}", kind, path.display());

        Some(FileEvent {
            path: path.clone(),
            kind,
        })
    }

    /// Get the receiver for file events.
    pub fn event_rx(&mut self) -> &mut mpsc::UnboundedReceiver<FileEvent> {
        &mut self.event_rx
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

/// Whether a path relative to a watched root should produce events.
fn is_watched(relative: &Path, ignored: &[String]) -> bool {
    let mut components = relative.components().peekable();
    while let Some(Component::Normal(name)) = components.next() {
        let Some(name) = name.to_str() else {
            return false;
        };
        if name.starts_with('.') {
            return false;
        }
        let is_file = components.peek().is_none();
        if is_file && ignored.iter().any(|i| i == name) {
            return false;
        }
        if !is_file && SKIPPED_DIRS.contains(&name) {
            return false;
        }
        if is_file {
            return true;
        }
    }
    false
}

/// Time-to-live for echo flags. Flags older than this are considered stale.
const ECHO_TTL: Duration = Duration::from_secs(5);

/// Tracks files we wrote ourselves so the watcher's echo is not processed
/// as an outside edit.
#[derive(Default, Clone)]
pub struct EchoTracker {
    /// Map of path -> timestamp when written
    written: Arc<Mutex<HashMap<PathBuf, Instant>>>,
}

impl EchoTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a path as written by us (call before writing to disk).
    pub fn mark_written(&self, path: &Path) {
        self.written
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_path_buf(), Instant::now());
    }

    /// Check if path was written by us and consume the flag (returns true
    /// once). Returns false if the flag has expired.
    pub fn consume(&self, path: &Path) -> bool {
        let mut written = self.written.lock().unwrap_or_else(|e| e.into_inner());
        match written.remove(path) {
            Some(timestamp) => timestamp.elapsed() < ECHO_TTL,
            None => false,
        }
    }

    /// Remove expired flags.
    pub fn cleanup_expired(&self) {
        self.written
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, timestamp| timestamp.elapsed() < ECHO_TTL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ignored() -> Vec<String> {
        vec!["comment.json".to_string()]
    }

    #[test]
    fn test_is_watched() {
        assert!(is_watched(Path::new("src/main.rs"), &ignored()));
        assert!(is_watched(Path::new("README.md"), &ignored()));
        assert!(!is_watched(Path::new(".git/HEAD"), &ignored()));
        assert!(!is_watched(Path::new("src/.hidden.rs"), &ignored()));
        assert!(!is_watched(Path::new("comment.json"), &ignored()));
        assert!(!is_watched(Path::new("app/comment.json"), &ignored()));
        assert!(!is_watched(Path::new("target/debug/build.rs"), &ignored()));
        assert!(!is_watched(Path::new("web/node_modules/x/index.js"), &ignored()));
        assert!(is_watched(Path::new("src/target.rs"), &ignored()));
    }

    #[test]
    fn test_echo_consumed_once() {
        let echoes = EchoTracker::new();
        let path = Path::new("/tmp/a.rs");
        assert!(!echoes.consume(path));
        echoes.mark_written(path);
        assert!(echoes.consume(path));
        assert!(!echoes.consume(path));
    }

    #[test]
    fn test_cleanup_keeps_fresh_flags() {
        let echoes = EchoTracker::new();
        echoes.mark_written(Path::new("/tmp/a.rs"));
        echoes.cleanup_expired();
        assert!(echoes.consume(Path::new("/tmp/a.rs")));
    }
}
