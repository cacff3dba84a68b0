//! One daemon session: the file host, the anchor engine attached to it and
//! the note commands, wired from a `Config`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anchor_core::codec;
use anchor_core::editor::Panel;
use anchor_core::engine::Transition;
use anchor_core::{
    lookup, AnchorEngine, Commands, DocumentId, NoteArgs, NoteContext, NoteStore, Notifier,
    Overlay, Position, ProjectResolver, RichText, StaticWorkspace, Subscription, TagId, TextHost,
};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::file_host::FileHost;
use crate::watcher::{EchoTracker, FileEvent, FileEventKind};

/// Panel that keeps the last note it was asked to show as text.
#[derive(Debug, Default)]
pub struct TextPanel {
    rendered: Option<String>,
}

impl TextPanel {
    pub fn rendered(&self) -> Option<&str> {
        self.rendered.as_deref()
    }
}

impl Panel for TextPanel {
    fn show(&mut self, title: &str, content: &RichText) {
        self.rendered = Some(format!("{}\n\n{}", title, content.to_markdown()));
    }

    fn close(&mut self) {
        self.rendered = None;
    }
}

/// A tag found in a file, with its note if it has one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedTag {
    pub line: usize,
    pub column: usize,
    pub id: TagId,
    pub note: Option<String>,
}

pub struct Session {
    host: Arc<FileHost>,
    engine: Arc<AnchorEngine<FileHost>>,
    commands: Commands<FileHost, TextPanel>,
    echoes: EchoTracker,
    _subscription: Subscription,
}

impl Session {
    pub fn new(config: &Config, notifier: Arc<dyn Notifier>) -> Self {
        let host = Arc::new(FileHost::new());
        let engine = Arc::new(AnchorEngine::new(Arc::clone(&host)));
        let subscription = engine.attach();

        let roots = config
            .workspace_roots
            .iter()
            .map(|root| root.canonicalize().unwrap_or_else(|_| root.clone()))
            .collect();
        let ctx = Arc::new(NoteContext {
            engine: Arc::clone(&engine),
            resolver: ProjectResolver::new(config.markers.clone()),
            workspace: Arc::new(StaticWorkspace::new(roots)),
            store: NoteStore::new(Arc::clone(&notifier)).with_file_name(config.store_file.clone()),
            notifier,
        });

        Self {
            host,
            engine,
            commands: Commands::new(ctx, TextPanel::default),
            echoes: EchoTracker::new(),
            _subscription: subscription,
        }
    }

    pub fn host(&self) -> &Arc<FileHost> {
        &self.host
    }

    pub fn echoes(&self) -> &EchoTracker {
        &self.echoes
    }

    fn context(&self) -> &NoteContext<FileHost> {
        self.commands.context()
    }

    /// Load `path` (or refresh it if already loaded) and make it active.
    pub async fn open(&self, path: &Path) -> Result<DocumentId> {
        let path = path
            .canonicalize()
            .with_context(|| format!("No such file: {}", path.display()))?;
        self.host.load(&path).await
    }

    /// Write a buffer back, flagging the write so the watcher skips it.
    async fn save(&self, doc: &DocumentId) -> Result<bool> {
        if !self.host.is_dirty(doc) {
            return Ok(false);
        }
        self.echoes.mark_written(doc.path());
        self.host.save(doc).await
    }

    /// Bring every tag in `path` to canonical form and save the result.
    pub async fn fix(&self, path: &Path) -> Result<Vec<Transition>> {
        let doc = self.open(path).await?;
        let transitions = self.engine.sync_document(&doc);
        if self.save(&doc).await? {
            info!("Fixed {} tag(s) in {}", transitions.len(), doc);
        }
        Ok(transitions)
    }

    /// Overlay for the tag at `line`/`column` of `path`.
    pub async fn hover(&self, path: &Path, line: usize, column: usize) -> Result<Option<Overlay>> {
        let doc = self.open(path).await?;
        let ctx = self.context();
        Ok(lookup(
            self.host.as_ref(),
            &ctx.resolver,
            ctx.workspace.as_ref(),
            &ctx.store,
            &doc,
            Position::new(line, column),
        )
        .await)
    }

    /// Every tag in `path` with its note.
    pub async fn list(&self, path: &Path) -> Result<Vec<ListedTag>> {
        let doc = self.open(path).await?;
        let text = self
            .host
            .text(&doc)
            .with_context(|| format!("{} is not loaded", doc))?;
        let ctx = self.context();
        let notes = match ctx.root_for(doc.path()) {
            Some(root) => ctx.store.read(&root).await,
            None => Default::default(),
        };

        let mut tags = Vec::new();
        for (line, content) in text.lines().enumerate() {
            for tag in codec::parse_tags(content) {
                tags.push(ListedTag {
                    line,
                    column: tag.start + usize::from(tag.has_leading_space(content)),
                    note: notes.get(tag.id.as_str()).cloned(),
                    id: tag.id,
                });
            }
        }
        Ok(tags)
    }

    /// The note editor's rendering of a note: title, then its Markdown.
    pub async fn show(&mut self, id: &str, file: &Path) -> Result<String> {
        let id: TagId = id.parse()?;
        let file = absolute(file)?;
        if !self.commands.open_note(&NoteArgs::new(id.as_str(), file)).await {
            bail!("Could not open note {}", id);
        }
        let rendered = self
            .commands
            .editor()
            .panel()
            .and_then(|panel| panel.rendered())
            .unwrap_or_default()
            .to_string();
        self.commands.editor_mut().close();
        Ok(rendered)
    }

    /// Store `markdown` as the note for `id` through the editor.
    pub async fn set(&mut self, id: &str, file: &Path, markdown: &str) -> Result<()> {
        let id: TagId = id.parse()?;
        let file = absolute(file)?;
        let current = self.context().note_text(&id, &file).await;
        let editor = self.commands.editor_mut();
        editor.open(id, file, &current);
        editor.save(markdown).await?;
        Ok(())
    }

    /// Delete the note for `id` and strip its markers from `file`.
    pub async fn delete(&mut self, id: &str, file: &Path) -> Result<()> {
        let id: TagId = id.parse()?;
        let doc = self.open(file).await?;
        self.commands
            .delete_note(&NoteArgs::new(id.as_str(), doc.path()))
            .await;
        self.save(&doc).await?;
        Ok(())
    }

    /// React to a change the watcher saw on disk.
    ///
    /// The first sighting of a file brings all of it to canonical form;
    /// later ones are diffed against the buffer and handled like typing, so
    /// damaged tags can be restored from line memory.
    pub async fn handle_file_event(&self, event: &FileEvent) -> Result<()> {
        let doc = DocumentId::from(event.path.as_path());
        match event.kind {
            FileEventKind::Deleted => {
                self.host.unload(&doc);
                self.engine.forget_document(&doc);
                debug!("Forgot {}", doc);
            }
            FileEventKind::Modified => {
                if self.echoes.consume(&event.path) {
                    debug!("Skipping our own write to {}", doc);
                    return Ok(());
                }
                // A reload arrives as one change and stops at its first
                // trigger; the full pass picks up the rest.
                self.host.load(&event.path).await?;
                self.engine.sync_document(&doc);
                if self.save(&doc).await? {
                    info!("Updated tags in {}", doc);
                }
            }
        }
        self.echoes.cleanup_expired();
        Ok(())
    }
}

/// `path` made absolute, resolved through symlinks when it exists.
fn absolute(path: &Path) -> Result<PathBuf> {
    if let Ok(path) = path.canonicalize() {
        return Ok(path);
    }
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Could not determine the current directory")?;
    Ok(cwd.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_core::RecordingNotifier;
    use tempfile::TempDir;

    fn session(temp: &TempDir) -> (Session, Arc<RecordingNotifier>) {
        std::fs::write(temp.path().join("Cargo.toml"), "").unwrap();
        let config = Config::from_lookup(|_| None, temp.path().to_path_buf()).unwrap();
        let notifier = Arc::new(RecordingNotifier::new());
        (Session::new(&config, notifier.clone()), notifier)
    }

    #[tokio::test]
    async fn test_fix_converts_trigger() {
        let temp = TempDir::new().unwrap();
        let (session, _) = session(&temp);
        let file = temp.path().join("a.rs");
        std::fs::write(&file, "call(); //[cmt]\nok(); //[cmt:AbCd1234XYZ]\n").unwrap();

        let transitions = session.fix(&file).await.unwrap();
        assert_eq!(transitions.len(), 2);

        let text = std::fs::read_to_string(&file).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(codec::parse_tag(lines[0]).is_some());
        assert_eq!(lines[1], "ok(); //[cmt:AbCd1234]");
        assert!(session.echoes().consume(&file.canonicalize().unwrap()));
    }

    #[tokio::test]
    async fn test_set_show_list() {
        let temp = TempDir::new().unwrap();
        let (mut session, _) = session(&temp);
        let file = temp.path().join("a.rs");
        std::fs::write(&file, "x(); //[cmt:AbCd1234]\n").unwrap();

        session.set("AbCd1234", &file, "**why** this").await.unwrap();
        let shown = session.show("AbCd1234", &file).await.unwrap();
        assert_eq!(shown, "📝 Comment: AbCd1234\n\n**why** this");

        let tags = session.list(&file).await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].column, 5);
        assert_eq!(tags[0].note.as_deref(), Some("**why** this"));
    }

    #[tokio::test]
    async fn test_delete_strips_file_and_store() {
        let temp = TempDir::new().unwrap();
        let (mut session, notifier) = session(&temp);
        let file = temp.path().join("a.rs");
        std::fs::write(&file, "x(); //[cmt:AbCd1234]\n").unwrap();
        session.set("AbCd1234", &file, "gone soon").await.unwrap();

        session.delete("AbCd1234", &file).await.unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "x();\n");
        assert!(session.list(&file).await.unwrap().is_empty());
        assert!(!notifier.has_errors());
    }

    #[tokio::test]
    async fn test_hover_shows_note() {
        let temp = TempDir::new().unwrap();
        let (mut session, _) = session(&temp);
        let file = temp.path().join("a.rs");
        std::fs::write(&file, "x(); //[cmt:AbCd1234]\n").unwrap();
        session.set("AbCd1234", &file, "hello").await.unwrap();

        let overlay = session.hover(&file, 0, 8).await.unwrap().unwrap();
        assert_eq!(overlay.note.as_deref(), Some("hello"));
        assert!(session.hover(&file, 0, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_watch_restores_damaged_tag() {
        let temp = TempDir::new().unwrap();
        let (session, _) = session(&temp);
        let file = temp.path().join("a.rs");
        std::fs::write(&file, "x(); //[cmt]\n").unwrap();
        let modified = FileEvent {
            path: file.canonicalize().unwrap(),
            kind: FileEventKind::Modified,
        };

        session.handle_file_event(&modified).await.unwrap();
        let tagged = std::fs::read_to_string(&file).unwrap();
        let id = codec::parse_tag(&tagged).unwrap().id;
        // Our own write comes back once and is ignored.
        session.handle_file_event(&modified).await.unwrap();

        let first = if id.as_str().starts_with('Z') { 'Y' } else { 'Z' };
        let damaged = format!("x(); //[cmt:{}{}]\n", first, &id.as_str()[1..]);
        std::fs::write(&file, &damaged).unwrap();
        session.handle_file_event(&modified).await.unwrap();

        assert_eq!(std::fs::read_to_string(&file).unwrap(), tagged);
    }

    #[tokio::test]
    async fn test_watch_converts_every_trigger_of_a_save() {
        let temp = TempDir::new().unwrap();
        let (session, _) = session(&temp);
        let file = temp.path().join("a.rs");
        std::fs::write(&file, "a();\nb();\n").unwrap();
        let modified = FileEvent {
            path: file.canonicalize().unwrap(),
            kind: FileEventKind::Modified,
        };
        session.handle_file_event(&modified).await.unwrap();

        std::fs::write(&file, "a(); //[cmt]\nb(); //[cmt]\n").unwrap();
        session.handle_file_event(&modified).await.unwrap();

        let text = std::fs::read_to_string(&file).unwrap();
        let tags = codec::parse_tags(&text);
        assert_eq!(tags.len(), 2);
        assert_ne!(tags[0].id, tags[1].id);
        assert_eq!(
            text,
            format!("a(); //[cmt:{}]\nb(); //[cmt:{}]\n", tags[0].id, tags[1].id)
        );
    }

    #[tokio::test]
    async fn test_watch_deleted_file_is_forgotten() {
        let temp = TempDir::new().unwrap();
        let (session, _) = session(&temp);
        let file = temp.path().join("a.rs");
        std::fs::write(&file, "x(); //[cmt:AbCd1234]\n").unwrap();
        let path = file.canonicalize().unwrap();

        session
            .handle_file_event(&FileEvent {
                path: path.clone(),
                kind: FileEventKind::Modified,
            })
            .await
            .unwrap();
        std::fs::remove_file(&file).unwrap();
        session
            .handle_file_event(&FileEvent {
                path: path.clone(),
                kind: FileEventKind::Deleted,
            })
            .await
            .unwrap();
        assert!(!session.host().is_loaded(&DocumentId::from(path.as_path())));
    }
}
