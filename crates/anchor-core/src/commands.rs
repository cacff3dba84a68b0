//! Command surface: open and delete a note by `{id, filePath}`.
//!
//! Both commands accept arbitrary payloads. When the id or the file path is
//! missing they do nothing at all.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::codec;
use crate::editor::{NoteEditor, Panel};
use crate::engine::AnchorEngine;
use crate::host::{offset_to_position, DocumentId, Range, TextEdit, TextHost};
use crate::notify::{with_cause, Notifier};
use crate::project::{ProjectResolver, WorkspaceRoots};
use crate::store::{NoteStore, StoreError};
use crate::tag_id::TagId;

pub const OPEN_COMMAND: &str = "extension.openCommentBox";
pub const DELETE_COMMAND: &str = "extension.deleteCommentById";

#[derive(Debug, Error)]
pub enum NoteError {
    #[error("No note is open")]
    NotOpen,

    #[error("No file path provided for comment context.")]
    NoFilePath,

    #[error("Could not determine project root for comment storage.")]
    NoProjectRoot(PathBuf),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Arguments of the open and delete commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
}

impl NoteArgs {
    pub fn new(id: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        Self {
            id: Some(id.into()),
            file_path: Some(file_path.into()),
        }
    }

    /// Parse a command payload. Anything that is not an object with the
    /// expected fields yields empty arguments.
    pub fn from_json(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    /// Id and path, if both are present and the id is well formed.
    fn resolved(&self) -> Option<(TagId, PathBuf)> {
        let id = self.id.as_deref().filter(|id| !id.is_empty())?;
        let file_path = self
            .file_path
            .clone()
            .filter(|p| !p.as_os_str().is_empty())?;
        match id.parse::<TagId>() {
            Ok(id) => Some((id, file_path)),
            Err(e) => {
                debug!("Ignoring malformed note id {:?}: {}", id, e);
                None
            }
        }
    }
}

/// Everything note operations need: the engine (and through it the host),
/// root resolution, the store and the user-facing channel.
pub struct NoteContext<H: TextHost> {
    pub engine: Arc<AnchorEngine<H>>,
    pub resolver: ProjectResolver,
    pub workspace: Arc<dyn WorkspaceRoots>,
    pub store: NoteStore,
    pub notifier: Arc<dyn Notifier>,
}

impl<H: TextHost> NoteContext<H> {
    pub fn host(&self) -> &Arc<H> {
        self.engine.host()
    }

    /// Project root holding the notes for `file`.
    pub fn root_for(&self, file: &Path) -> Option<PathBuf> {
        self.resolver.resolve(self.workspace.as_ref(), file)
    }

    /// Note text for `id`, empty when there is none or no root resolves.
    pub async fn note_text(&self, id: &TagId, file: &Path) -> String {
        match self.root_for(file) {
            Some(root) => self.store.get(&root, id.as_str()).await.unwrap_or_default(),
            None => String::new(),
        }
    }

    /// Delete the note for `id` and strip its markers from `file`.
    ///
    /// The store write completes before the buffer is edited. Markers are
    /// only removed when `file` is the active document, and they go even
    /// when the store write failed; that failure is returned afterwards
    /// (the store has already reported it). Returns the number of markers
    /// removed.
    pub async fn remove_note(&self, id: &TagId, file: &Path) -> Result<usize, NoteError> {
        let root = self
            .root_for(file)
            .ok_or_else(|| NoteError::NoProjectRoot(file.to_path_buf()))?;
        let stored = self.store.delete_key(&root, id.as_str()).await;

        let doc = DocumentId::from(file);
        let removed = self.strip_markers(&doc, id);
        self.engine.forget(&doc, id);
        stored?;
        info!("Deleted note {} ({} markers removed from {})", id, removed, doc);
        Ok(removed)
    }

    fn strip_markers(&self, doc: &DocumentId, id: &TagId) -> usize {
        let host = self.host();
        if host.active_document().as_ref() != Some(doc) {
            debug!("{} is not active, leaving markers in place", doc);
            return 0;
        }
        let Some(text) = host.text(doc) else {
            return 0;
        };

        let edits: Vec<TextEdit> = codec::find_markers(&text, id.as_str())
            .into_iter()
            .map(|span| {
                TextEdit::delete(Range::new(
                    offset_to_position(&text, span.start),
                    offset_to_position(&text, span.end),
                ))
            })
            .collect();
        if edits.is_empty() {
            return 0;
        }

        match self.engine.apply_edits(doc, &edits) {
            Ok(()) => edits.len(),
            Err(e) => {
                warn!("Could not remove markers for {} from {}: {}", id, doc, e);
                0
            }
        }
    }
}

/// The two note commands plus the editor they drive.
pub struct Commands<H: TextHost, P: Panel> {
    ctx: Arc<NoteContext<H>>,
    editor: NoteEditor<H, P>,
}

impl<H: TextHost, P: Panel> Commands<H, P> {
    pub fn new(ctx: Arc<NoteContext<H>>, new_panel: impl Fn() -> P + Send + Sync + 'static) -> Self {
        let editor = NoteEditor::new(Arc::clone(&ctx), new_panel);
        Self { ctx, editor }
    }

    pub fn context(&self) -> &Arc<NoteContext<H>> {
        &self.ctx
    }

    pub fn editor(&self) -> &NoteEditor<H, P> {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut NoteEditor<H, P> {
        &mut self.editor
    }

    /// Open the editor for a note. The file path defaults to the active
    /// document. Returns whether an editor was opened.
    pub async fn open_note(&mut self, args: &NoteArgs) -> bool {
        let args = NoteArgs {
            file_path: args.file_path.clone().or_else(|| {
                self.ctx
                    .host()
                    .active_document()
                    .map(|doc| doc.path().to_path_buf())
            }),
            ..args.clone()
        };
        let Some((id, file_path)) = args.resolved() else {
            return false;
        };

        let content = self.ctx.note_text(&id, &file_path).await;
        self.editor.open(id, file_path, &content);
        true
    }

    /// Delete a note and its markers. Returns whether anything was attempted.
    pub async fn delete_note(&mut self, args: &NoteArgs) -> bool {
        let Some((id, file_path)) = args.resolved() else {
            return false;
        };

        match self.ctx.remove_note(&id, &file_path).await {
            Ok(_) => {
                if self.editor.is_showing(&id) {
                    self.editor.close();
                }
                self.ctx.notifier.warn(&with_cause("Comment deleted.", None));
            }
            // No workspace context: nothing to do.
            Err(NoteError::NoProjectRoot(path)) => {
                debug!("No project root for {}, delete skipped", path.display());
            }
            // Already shown by the store.
            Err(NoteError::Store(e)) => {
                debug!("Delete of {} not persisted: {}", id, e);
            }
            Err(e) => {
                self.ctx
                    .notifier
                    .error(&with_cause("Failed to delete comment.", Some(&e)));
            }
        }
        true
    }

    /// Dispatch a command by name with a JSON payload, as an overlay link
    /// would.
    pub async fn execute(&mut self, command: &str, payload: &serde_json::Value) -> bool {
        let args = NoteArgs::from_json(payload);
        match command {
            OPEN_COMMAND => self.open_note(&args).await,
            DELETE_COMMAND => self.delete_note(&args).await,
            other => {
                debug!("Unknown command {}", other);
                false
            }
        }
    }
}
