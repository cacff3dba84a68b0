//! anchor-daemon library: Exposes internal modules for testing.
//!
//! This is a thin library layer over the daemon components,
//! allowing integration tests to access internal types.

pub mod config;
pub mod file_host;
pub mod session;
pub mod watcher;

// Re-export key types for convenience
pub use config::{Config, ConfigError};
pub use file_host::FileHost;
pub use session::{ListedTag, Session, TextPanel};
pub use watcher::{EchoTracker, FileEvent, FileEventKind, FileWatcher};
