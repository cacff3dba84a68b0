//! Note editor: a single panel bound to one tag id and file.
//!
//! Opening a note closes whatever note was open before, so at most one
//! panel is visible. Content goes to the panel as `RichText` and comes back
//! as Markdown (or `RichText`, converted before it is stored).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::commands::{NoteContext, NoteError};
use crate::host::TextHost;
use crate::notify::with_cause;
use crate::rich_text::RichText;
use crate::tag_id::TagId;

/// Prefix of a panel title; the id follows.
pub const TITLE_PREFIX: &str = "📝 Comment: ";

/// The presentation side of the editor.
pub trait Panel: Send {
    fn show(&mut self, title: &str, content: &RichText);
    fn close(&mut self);
}

pub fn panel_title(id: &TagId) -> String {
    format!("{}{}", TITLE_PREFIX, id)
}

struct OpenNote<P> {
    id: TagId,
    file_path: PathBuf,
    panel: P,
}

pub struct NoteEditor<H: TextHost, P: Panel> {
    ctx: Arc<NoteContext<H>>,
    new_panel: Box<dyn Fn() -> P + Send + Sync>,
    current: Option<OpenNote<P>>,
}

impl<H: TextHost, P: Panel> NoteEditor<H, P> {
    pub fn new(ctx: Arc<NoteContext<H>>, new_panel: impl Fn() -> P + Send + Sync + 'static) -> Self {
        Self {
            ctx,
            new_panel: Box::new(new_panel),
            current: None,
        }
    }

    /// Show `markdown` for `id`, closing any note shown before.
    pub fn open(&mut self, id: TagId, file_path: PathBuf, markdown: &str) {
        self.close();
        let mut panel = (self.new_panel)();
        panel.show(&panel_title(&id), &RichText::from_markdown(markdown));
        self.current = Some(OpenNote {
            id,
            file_path,
            panel,
        });
    }

    pub fn close(&mut self) {
        if let Some(mut open) = self.current.take() {
            open.panel.close();
        }
    }

    /// Id and file of the open note.
    pub fn current(&self) -> Option<(&TagId, &Path)> {
        self.current
            .as_ref()
            .map(|open| (&open.id, open.file_path.as_path()))
    }

    pub fn is_showing(&self, id: &TagId) -> bool {
        self.current.as_ref().is_some_and(|open| &open.id == id)
    }

    pub fn panel(&self) -> Option<&P> {
        self.current.as_ref().map(|open| &open.panel)
    }

    /// Store `markdown` as the open note's text and close the editor.
    ///
    /// On failure the editor stays open so nothing typed is lost. Store
    /// failures are shown by the store itself.
    pub async fn save(&mut self, markdown: &str) -> Result<(), NoteError> {
        let (id, root) = self.target()?;
        if let Err(e) = self.ctx.store.set(&root, id.as_str(), markdown).await {
            debug!("Note {} not saved: {}", id, e);
            return Err(e.into());
        }
        info!("Saved note {} from editor", id);
        self.close();
        Ok(())
    }

    pub async fn save_rich(&mut self, content: &RichText) -> Result<(), NoteError> {
        self.save(&content.to_markdown()).await
    }

    /// Delete the open note and its markers, then close the editor.
    pub async fn delete(&mut self) -> Result<(), NoteError> {
        let (id, _) = self.target()?;
        let Some(open) = self.current.as_ref() else {
            return Err(NoteError::NotOpen);
        };
        let file_path = open.file_path.clone();
        if let Err(e) = self.ctx.remove_note(&id, &file_path).await {
            debug!("Note {} not deleted: {}", id, e);
            return Err(e);
        }
        self.close();
        Ok(())
    }

    /// Id of the open note and the root its store lives in.
    fn target(&self) -> Result<(TagId, PathBuf), NoteError> {
        let open = self.current.as_ref().ok_or(NoteError::NotOpen)?;
        let notify = |e: NoteError| {
            self.ctx.notifier.error(&with_cause(&e.to_string(), None));
            e
        };
        if open.file_path.as_os_str().is_empty() {
            return Err(notify(NoteError::NoFilePath));
        }
        let root = self
            .ctx
            .root_for(&open.file_path)
            .ok_or_else(|| notify(NoteError::NoProjectRoot(open.file_path.clone())))?;
        Ok((open.id.clone(), root))
    }
}
