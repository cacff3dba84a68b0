//! Text host over files on disk.
//!
//! Files are loaded into memory, edited there by the engine and written back
//! with `save`. Changes made to a file behind our back arrive through
//! `reload`, which diffs the new content against the buffer and publishes
//! the difference the way an editor would publish a keystroke.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anchor_core::events::ChangeBus;
use anchor_core::host::{
    self, apply_edits_to_text, offset_to_position, position_to_offset, ChangeEvent,
    ContentChange, DocumentId, HostError, Position, Range, TextEdit, TextHost,
};
use anyhow::{Context, Result};
use tracing::debug;

struct LoadedFile {
    text: String,
    /// Content as last read from or written to disk.
    on_disk: String,
    cursor: Position,
}

#[derive(Default)]
struct HostState {
    files: HashMap<DocumentId, LoadedFile>,
    active: Option<DocumentId>,
}

/// Host backed by the filesystem. The most recently loaded file is active.
pub struct FileHost {
    state: Mutex<HostState>,
    bus: Arc<ChangeBus>,
}

impl Default for FileHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FileHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HostState::default()),
            bus: Arc::new(ChangeBus::new()),
        }
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Read `path` into a buffer and make it active.
    ///
    /// A file that is already loaded is reloaded instead, so its listeners
    /// see the difference.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<DocumentId> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let doc = DocumentId::from(path);

        if self.is_loaded(&doc) {
            self.activate(&doc);
            self.reload(&doc, text);
        } else {
            let mut state = self.state();
            state.files.insert(
                doc.clone(),
                LoadedFile {
                    on_disk: text.clone(),
                    text,
                    cursor: Position::new(0, 0),
                },
            );
            state.active = Some(doc.clone());
        }
        Ok(doc)
    }

    pub fn is_loaded(&self, doc: &DocumentId) -> bool {
        self.state().files.contains_key(doc)
    }

    pub fn unload(&self, doc: &DocumentId) {
        let mut state = self.state();
        state.files.remove(doc);
        if state.active.as_ref() == Some(doc) {
            state.active = None;
        }
    }

    /// Focus a loaded file. Returns false if it is not loaded.
    pub fn activate(&self, doc: &DocumentId) -> bool {
        let mut state = self.state();
        if state.files.contains_key(doc) {
            state.active = Some(doc.clone());
            true
        } else {
            false
        }
    }

    /// Replace the buffer with `text` as an outside edit.
    ///
    /// Publishes one change covering the differing span and leaves the
    /// cursor after the new text. Returns false when nothing changed.
    pub fn reload(&self, doc: &DocumentId, text: String) -> bool {
        let event = {
            let mut state = self.state();
            let Some(file) = state.files.get_mut(doc) else {
                return false;
            };
            file.on_disk = text.clone();
            let Some(change) = diff(&file.text, &text) else {
                return false;
            };
            let start = position_to_offset(&file.text, change.range.start).unwrap_or(0);
            file.cursor = offset_to_position(&text, start + change.text.len());
            file.text = text;
            ChangeEvent {
                document: doc.clone(),
                changes: vec![change],
            }
        };
        debug!("Reloaded {}", doc);
        self.bus.emit(&event);
        true
    }

    /// Whether the buffer differs from what is on disk.
    pub fn is_dirty(&self, doc: &DocumentId) -> bool {
        self.state()
            .files
            .get(doc)
            .is_some_and(|file| file.text != file.on_disk)
    }

    /// Write the buffer back if it changed. Returns whether it wrote.
    pub async fn save(&self, doc: &DocumentId) -> Result<bool> {
        let text = {
            let state = self.state();
            let file = state
                .files
                .get(doc)
                .ok_or_else(|| HostError::DocumentNotOpen(doc.clone()))?;
            if file.text == file.on_disk {
                return Ok(false);
            }
            file.text.clone()
        };

        tokio::fs::write(doc.path(), &text)
            .await
            .with_context(|| format!("Failed to write {}", doc))?;
        if let Some(file) = self.state().files.get_mut(doc) {
            file.on_disk = text;
        }
        debug!("Saved {}", doc);
        Ok(true)
    }
}

impl TextHost for FileHost {
    fn active_document(&self) -> Option<DocumentId> {
        self.state().active.clone()
    }

    fn text(&self, doc: &DocumentId) -> Option<String> {
        self.state().files.get(doc).map(|file| file.text.clone())
    }

    fn cursor(&self, doc: &DocumentId) -> Option<Position> {
        self.state().files.get(doc).map(|file| file.cursor)
    }

    fn set_cursor(&self, doc: &DocumentId, pos: Position) -> host::Result<()> {
        let mut state = self.state();
        let file = state
            .files
            .get_mut(doc)
            .ok_or_else(|| HostError::DocumentNotOpen(doc.clone()))?;
        if position_to_offset(&file.text, pos).is_none() {
            return Err(HostError::InvalidRange(Range::point(pos)));
        }
        file.cursor = pos;
        Ok(())
    }

    fn apply_edits(&self, doc: &DocumentId, edits: &[TextEdit]) -> host::Result<()> {
        let event = {
            let mut state = self.state();
            let file = state
                .files
                .get_mut(doc)
                .ok_or_else(|| HostError::DocumentNotOpen(doc.clone()))?;

            let cursor = position_to_offset(&file.text, file.cursor).unwrap_or(0);
            let (changes, resolved) = apply_edits_to_text(&mut file.text, edits)?;
            let cursor = resolved.iter().fold(cursor, |off, edit| edit.remap(off));
            file.cursor = offset_to_position(&file.text, cursor);

            ChangeEvent {
                document: doc.clone(),
                changes,
            }
        };
        self.bus.emit(&event);
        Ok(())
    }

    fn changes(&self) -> &Arc<ChangeBus> {
        &self.bus
    }
}

/// Smallest single change turning `old` into `new`, or `None` if equal.
pub fn diff(old: &str, new: &str) -> Option<ContentChange> {
    if old == new {
        return None;
    }

    let mut prefix = old
        .bytes()
        .zip(new.bytes())
        .take_while(|(a, b)| a == b)
        .count();
    while !old.is_char_boundary(prefix) || !new.is_char_boundary(prefix) {
        prefix -= 1;
    }

    let room = old.len().min(new.len()) - prefix;
    let mut suffix = old
        .bytes()
        .rev()
        .zip(new.bytes().rev())
        .take(room)
        .take_while(|(a, b)| a == b)
        .count();
    while !old.is_char_boundary(old.len() - suffix) || !new.is_char_boundary(new.len() - suffix) {
        suffix -= 1;
    }

    Some(ContentChange {
        range: Range::new(
            offset_to_position(old, prefix),
            offset_to_position(old, old.len() - suffix),
        ),
        text: new[prefix..new.len() - suffix].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[test]
    fn test_diff_insertion() {
        let change = diff("foo();\nbar", "foo(); //[cmt]\nbar").unwrap();
        assert_eq!(change.range, Range::on_line(0, 6, 6));
        assert_eq!(change.text, " //[cmt]");
    }

    #[test]
    fn test_diff_multiline_replace() {
        let change = diff("a\nb\nc\n", "a\nx\ny\nc\n").unwrap();
        assert_eq!(change.range.start, Position::new(1, 0));
        assert_eq!(change.range.end, Position::new(1, 1));
        assert_eq!(change.text, "x\ny");
        assert_eq!(change.line_delta(), 1);
    }

    #[test]
    fn test_diff_respects_char_boundaries() {
        let change = diff("é", "è").unwrap();
        assert_eq!(change.text, "è");
        assert!(diff("same", "same").is_none());
    }

    #[tokio::test]
    async fn test_load_edit_save() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.rs");
        std::fs::write(&path, "fn a() {}\n").unwrap();

        let host = FileHost::new();
        let doc = host.load(&path).await.unwrap();
        assert_eq!(host.active_document(), Some(doc.clone()));
        assert!(!host.is_dirty(&doc));

        host.apply_edits(&doc, &[TextEdit::insert(Position::new(0, 9), " //[cmt:AbCd1234]")])
            .unwrap();
        assert!(host.is_dirty(&doc));
        assert!(host.save(&doc).await.unwrap());
        assert!(!host.save(&doc).await.unwrap());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "fn a() {} //[cmt:AbCd1234]\n"
        );
    }

    #[tokio::test]
    async fn test_reload_emits_change_and_moves_cursor() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.rs");
        std::fs::write(&path, "foo();\n").unwrap();

        let host = FileHost::new();
        let doc = host.load(&path).await.unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let _sub = host.changes().subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        std::fs::write(&path, "foo(); //[cmt]\n").unwrap();
        host.load(&path).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(host.cursor(&doc), Some(Position::new(0, 14)));
        assert!(!host.is_dirty(&doc));

        assert!(!host.reload(&doc, "foo(); //[cmt]\n".to_string()));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_load_missing_file_fails() {
        let temp = TempDir::new().unwrap();
        let host = FileHost::new();
        assert!(host.load(temp.path().join("nope.rs")).await.is_err());
    }
}
