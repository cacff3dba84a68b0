//! Note store: one JSON object per project root mapping tag id to Markdown.
//!
//! The file is read on every operation and rewritten wholesale on every
//! mutation, so edits made to it by other processes are picked up
//! (last writer wins).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::Rng;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

use crate::notify::{with_cause, Notifier, TracingNotifier};

/// Default name of the store file inside a project root.
pub const STORE_FILE_NAME: &str = "comment.json";

/// Tag id to note text. Sorted so the file diffs cleanly.
pub type Notes = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize notes: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    /// The underlying failure, without the path.
    fn cause(&self) -> &dyn std::fmt::Display {
        match self {
            Self::Read { source, .. } | Self::Write { source, .. } => source,
            Self::Parse { source, .. } | Self::Serialize(source) => source,
        }
    }
}

#[derive(Clone)]
pub struct NoteStore {
    file_name: String,
    notifier: Arc<dyn Notifier>,
}

impl Default for NoteStore {
    fn default() -> Self {
        Self::new(Arc::new(TracingNotifier))
    }
}

impl NoteStore {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            file_name: STORE_FILE_NAME.to_string(),
            notifier,
        }
    }

    /// Use a different file name inside each root.
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn path_for(&self, root: &Path) -> PathBuf {
        root.join(&self.file_name)
    }

    /// Load the mapping, reporting problems to the caller.
    ///
    /// An absent file is an empty mapping, not an error.
    pub async fn try_read(&self, root: &Path) -> Result<Notes, StoreError> {
        let path = self.path_for(root);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No note store at {}", path.display());
                return Ok(Notes::new());
            }
            Err(source) => return Err(StoreError::Read { path, source }),
        };
        serde_json::from_str(&content).map_err(|source| StoreError::Parse { path, source })
    }

    /// Load the mapping. Any failure is shown to the user and yields an
    /// empty mapping; the file itself is left alone.
    pub async fn read(&self, root: &Path) -> Notes {
        match self.try_read(root).await {
            Ok(notes) => notes,
            Err(e) => {
                debug!("Unreadable note store: {:?}", e);
                self.notifier.warn(&with_cause(
                    &format!("Failed to read {}", self.file_name),
                    Some(e.cause()),
                ));
                Notes::new()
            }
        }
    }

    /// Replace the whole file with `notes`.
    ///
    /// Written to a temp file first and renamed into place, so a failed
    /// write leaves the previous content intact.
    pub async fn write(&self, root: &Path, notes: &Notes) -> Result<(), StoreError> {
        let path = self.path_for(root);
        let result = async {
            let json = serde_json::to_string_pretty(notes)?;
            atomic_write(&path, &json)
                .await
                .map_err(|source| StoreError::Write {
                    path: path.clone(),
                    source,
                })
        }
        .await;

        if let Err(e) = &result {
            self.notifier.error(&with_cause(
                &format!("Failed to write {}", self.file_name),
                Some(e.cause()),
            ));
        }
        result
    }

    pub async fn get(&self, root: &Path, id: &str) -> Option<String> {
        self.read(root).await.remove(id)
    }

    /// Store `content` under `id`.
    pub async fn set(&self, root: &Path, id: &str, content: &str) -> Result<(), StoreError> {
        let mut notes = self.read(root).await;
        notes.insert(id.to_string(), content.to_string());
        self.write(root, &notes).await?;
        info!("Saved note {} in {}", id, root.display());
        Ok(())
    }

    /// Remove `id`. Returns whether it was present; nothing is written when
    /// it was not.
    pub async fn delete_key(&self, root: &Path, id: &str) -> Result<bool, StoreError> {
        let mut notes = self.read(root).await;
        if notes.remove(id).is_none() {
            debug!("Note {} not in store, nothing to delete", id);
            return Ok(false);
        }
        self.write(root, &notes).await?;
        info!("Deleted note {} from {}", id, root.display());
        Ok(true)
    }
}

fn random_hex() -> String {
    let bytes: [u8; 8] = rand::rng().random();
    hex::encode(bytes)
}

async fn atomic_write(path: &Path, content: &str) -> Result<(), std::io::Error> {
    let temp_path = path.with_extension(format!("{}.tmp", random_hex()));

    if let Err(e) = fs::write(&temp_path, content).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e);
    }

    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e);
    }

    Ok(())
}
