use std::path::PathBuf;

use anchor_core::project::DEFAULT_MARKERS;
use anchor_core::store::STORE_FILE_NAME;

/// Workspace roots, separated like `PATH`. Supports ~ for the home directory.
pub const WORKSPACE_VAR: &str = "ANCHOR_NOTES_WORKSPACE";
/// Name of the note store file inside each project root.
pub const STORE_FILE_VAR: &str = "ANCHOR_NOTES_STORE_FILE";
/// Comma-separated project marker file names.
pub const MARKERS_VAR: &str = "ANCHOR_NOTES_MARKERS";

/// Daemon configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Workspace folders; project roots never lie outside them
    pub workspace_roots: Vec<PathBuf>,
    /// Store file name (`comment.json` by default)
    pub store_file: String,
    /// Files whose presence marks a project root
    pub markers: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// All variables are optional:
    /// - `ANCHOR_NOTES_WORKSPACE`: workspace roots (default: current directory)
    /// - `ANCHOR_NOTES_STORE_FILE`: store file name (default: `comment.json`)
    /// - `ANCHOR_NOTES_MARKERS`: project markers (default: the JS and Cargo manifests)
    pub fn from_env() -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir().map_err(|_| ConfigError::NoWorkingDirectory)?;
        Self::from_lookup(|key| std::env::var(key).ok(), cwd)
    }

    /// Build a configuration from any variable source. `cwd` is the
    /// workspace when none is configured.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        cwd: PathBuf,
    ) -> Result<Self, ConfigError> {
        let workspace_roots = match lookup(WORKSPACE_VAR).filter(|v| !v.trim().is_empty()) {
            Some(value) => std::env::split_paths(&value)
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| expand_tilde(&p.to_string_lossy()))
                .collect(),
            None => vec![cwd],
        };

        let store_file = match lookup(STORE_FILE_VAR) {
            Some(name) if name.is_empty() || name.contains(['/', '\\']) => {
                return Err(ConfigError::InvalidStoreFile(name));
            }
            Some(name) => name,
            None => STORE_FILE_NAME.to_string(),
        };

        let markers = match lookup(MARKERS_VAR) {
            Some(value) => {
                let markers: Vec<String> = value
                    .split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(String::from)
                    .collect();
                if markers.is_empty() {
                    return Err(ConfigError::NoMarkers);
                }
                markers
            }
            None => DEFAULT_MARKERS.iter().map(|m| m.to_string()).collect(),
        };

        Ok(Self {
            workspace_roots,
            store_file,
            markers,
        })
    }

    /// Replace the workspace roots, expanding ~.
    pub fn with_workspace(mut self, roots: &[PathBuf]) -> Self {
        if !roots.is_empty() {
            self.workspace_roots = roots
                .iter()
                .map(|p| expand_tilde(&p.to_string_lossy()))
                .collect();
        }
        self
    }
}

/// Expand ~ or ~/ prefix to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine the current directory")]
    NoWorkingDirectory,

    #[error("ANCHOR_NOTES_STORE_FILE must be a plain file name, got {0:?}")]
    InvalidStoreFile(String),

    #[error("ANCHOR_NOTES_MARKERS lists no marker files")]
    NoMarkers,
}
