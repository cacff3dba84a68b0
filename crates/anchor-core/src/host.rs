//! TextHost trait abstraction over the editor that owns the buffers.
//!
//! Implementations:
//! - `InMemoryHost` - For testing and embedding
//! - `FileHost` (in anchor-daemon) - Files on disk, edited in memory and saved back
//!
//! Positions are zero-based lines and UTF-8 byte columns within a line.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::events::ChangeBus;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("Document is not open: {0}")]
    DocumentNotOpen(DocumentId),

    #[error("Edit range is outside the document: {0:?}")]
    InvalidRange(Range),

    #[error("Edits overlap")]
    OverlappingEdits,

    #[error("Host rejected the edit: {0}")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, HostError>;

/// Identity of an open document: its file path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(PathBuf);

impl DocumentId {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl From<&str> for DocumentId {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<PathBuf> for DocumentId {
    fn from(path: PathBuf) -> Self {
        Self(path)
    }
}

impl From<&Path> for DocumentId {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

impl Display for DocumentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Empty range at `pos`, used for insertions.
    pub fn point(pos: Position) -> Self {
        Self::new(pos, pos)
    }

    /// Range of `start..end` columns on one line.
    pub fn on_line(line: usize, start: usize, end: usize) -> Self {
        Self::new(Position::new(line, start), Position::new(line, end))
    }

    /// Inclusive on both ends.
    pub fn contains(&self, pos: Position) -> bool {
        self.start <= pos && pos <= self.end
    }
}

/// A replacement to apply to a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub range: Range,
    pub new_text: String,
}

impl TextEdit {
    pub fn replace(range: Range, new_text: impl Into<String>) -> Self {
        Self {
            range,
            new_text: new_text.into(),
        }
    }

    pub fn insert(at: Position, text: impl Into<String>) -> Self {
        Self::replace(Range::point(at), text)
    }

    pub fn delete(range: Range) -> Self {
        Self::replace(range, "")
    }
}

/// One replaced range in a change notification. `range` is in the
/// coordinates of the document before the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentChange {
    pub range: Range,
    pub text: String,
}

impl ContentChange {
    /// Net number of lines the change added (negative when it removed lines).
    pub fn line_delta(&self) -> isize {
        let added = self.text.matches('\n').count() as isize;
        let removed = (self.range.end.line - self.range.start.line) as isize;
        added - removed
    }

    /// Lines of the changed document this change touched.
    pub fn touched_lines(&self) -> std::ops::RangeInclusive<usize> {
        let start = self.range.start.line;
        start..=start + self.text.matches('\n').count()
    }
}

/// Buffer change notification delivered by a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub document: DocumentId,
    pub changes: Vec<ContentChange>,
}

/// The editor surface the sync engine drives.
///
/// Implementations must publish a `ChangeEvent` on `changes()` for every
/// mutation, including those made through `apply_edits`.
pub trait TextHost: Send + Sync {
    /// Document currently shown in the focused editing surface.
    fn active_document(&self) -> Option<DocumentId>;

    /// Full text of an open document.
    fn text(&self, doc: &DocumentId) -> Option<String>;

    /// One line without its terminator.
    fn line_text(&self, doc: &DocumentId, line: usize) -> Option<String> {
        let text = self.text(doc)?;
        text.split('\n')
            .nth(line)
            .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
    }

    fn line_count(&self, doc: &DocumentId) -> Option<usize> {
        self.text(doc).map(|t| t.split('\n').count())
    }

    fn cursor(&self, doc: &DocumentId) -> Option<Position>;

    fn set_cursor(&self, doc: &DocumentId, pos: Position) -> Result<()>;

    /// Apply all edits as one batch. Ranges refer to the document before
    /// the batch and must not overlap.
    fn apply_edits(&self, doc: &DocumentId, edits: &[TextEdit]) -> Result<()>;

    /// Bus the host publishes changes on.
    fn changes(&self) -> &Arc<ChangeBus>;
}

/// Byte offset of `pos` in `text`, if it lies inside the document.
pub fn position_to_offset(text: &str, pos: Position) -> Option<usize> {
    let mut line_start = 0;
    for _ in 0..pos.line {
        line_start += text[line_start..].find('\n')? + 1;
    }
    let line_end = text[line_start..]
        .find('\n')
        .map_or(text.len(), |i| line_start + i);
    let offset = line_start + pos.column;
    (offset <= line_end && text.is_char_boundary(offset)).then_some(offset)
}

/// Position of a byte offset (clamped to the end of the text).
pub fn offset_to_position(text: &str, offset: usize) -> Position {
    let offset = offset.min(text.len());
    let before = &text[..offset];
    let line = before.matches('\n').count();
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    Position::new(line, offset - line_start)
}

/// An edit resolved to byte offsets of the pre-edit text.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedEdit {
    pub start: usize,
    pub end: usize,
    pub new_len: usize,
}

impl ResolvedEdit {
    /// Where `offset` ends up after this edit. Offsets inside the replaced
    /// span move to the end of the replacement.
    pub fn remap(&self, offset: usize) -> usize {
        if offset >= self.end {
            offset + self.new_len - (self.end - self.start)
        } else if offset > self.start {
            self.start + self.new_len
        } else {
            offset
        }
    }
}

/// Apply a batch of edits to `text` in descending order.
///
/// Returns the change records (descending) and the resolved edits, which
/// callers use to remap cursors.
pub fn apply_edits_to_text(
    text: &mut String,
    edits: &[TextEdit],
) -> Result<(Vec<ContentChange>, Vec<ResolvedEdit>)> {
    let mut sorted: Vec<&TextEdit> = edits.iter().collect();
    sorted.sort_by(|a, b| b.range.start.cmp(&a.range.start));

    let mut resolved = Vec::with_capacity(sorted.len());
    for edit in &sorted {
        let start = position_to_offset(text, edit.range.start)
            .ok_or(HostError::InvalidRange(edit.range))?;
        let end = position_to_offset(text, edit.range.end)
            .ok_or(HostError::InvalidRange(edit.range))?;
        if end < start {
            return Err(HostError::InvalidRange(edit.range));
        }
        if resolved
            .last()
            .is_some_and(|prev: &ResolvedEdit| end > prev.start)
        {
            return Err(HostError::OverlappingEdits);
        }
        resolved.push(ResolvedEdit {
            start,
            end,
            new_len: edit.new_text.len(),
        });
    }

    for (edit, span) in sorted.iter().zip(&resolved) {
        text.replace_range(span.start..span.end, &edit.new_text);
    }

    let changes = sorted
        .iter()
        .map(|edit| ContentChange {
            range: edit.range,
            text: edit.new_text.clone(),
        })
        .collect();
    Ok((changes, resolved))
}

struct OpenDocument {
    text: String,
    cursor: Position,
}

#[derive(Default)]
struct HostState {
    documents: HashMap<DocumentId, OpenDocument>,
    active: Option<DocumentId>,
    reject_next: Option<String>,
}

/// In-memory text host.
///
/// Behaves like a single-window editor: any number of open documents, one
/// of them active, one cursor per document. Change notifications are
/// emitted synchronously from inside the mutating call.
pub struct InMemoryHost {
    state: Mutex<HostState>,
    bus: Arc<ChangeBus>,
}

impl Default for InMemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HostState::default()),
            bus: Arc::new(ChangeBus::new()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a document and make it active.
    pub fn open(&self, doc: impl Into<DocumentId>, text: impl Into<String>) -> DocumentId {
        let doc = doc.into();
        let mut state = self.state();
        state.documents.insert(
            doc.clone(),
            OpenDocument {
                text: text.into(),
                cursor: Position::new(0, 0),
            },
        );
        state.active = Some(doc.clone());
        doc
    }

    pub fn close(&self, doc: &DocumentId) {
        let mut state = self.state();
        state.documents.remove(doc);
        if state.active.as_ref() == Some(doc) {
            state.active = None;
        }
    }

    /// Focus an open document. Returns false if it is not open.
    pub fn activate(&self, doc: &DocumentId) -> bool {
        let mut state = self.state();
        if state.documents.contains_key(doc) {
            state.active = Some(doc.clone());
            true
        } else {
            false
        }
    }

    /// Leave no document focused.
    pub fn deactivate(&self) {
        self.state().active = None;
    }

    /// Make the next `apply_edits` call fail with `HostError::Rejected`.
    pub fn reject_next_edit(&self, reason: impl Into<String>) {
        self.state().reject_next = Some(reason.into());
    }

    /// Simulate the user typing `text` at `at`; the cursor ends up after it.
    pub fn type_text(&self, doc: &DocumentId, at: Position, text: &str) -> Result<()> {
        self.user_edit(doc, TextEdit::insert(at, text))
    }

    /// Simulate the user replacing `range` with `text`.
    pub fn replace(&self, doc: &DocumentId, range: Range, text: &str) -> Result<()> {
        self.user_edit(doc, TextEdit::replace(range, text))
    }

    fn user_edit(&self, doc: &DocumentId, edit: TextEdit) -> Result<()> {
        let event = {
            let mut state = self.state();
            let open = state
                .documents
                .get_mut(doc)
                .ok_or_else(|| HostError::DocumentNotOpen(doc.clone()))?;
            let (changes, resolved) =
                apply_edits_to_text(&mut open.text, std::slice::from_ref(&edit))?;
            let end = resolved[0].start + resolved[0].new_len;
            open.cursor = offset_to_position(&open.text, end);
            ChangeEvent {
                document: doc.clone(),
                changes,
            }
        };
        self.bus.emit(&event);
        Ok(())
    }
}

impl TextHost for InMemoryHost {
    fn active_document(&self) -> Option<DocumentId> {
        self.state().active.clone()
    }

    fn text(&self, doc: &DocumentId) -> Option<String> {
        self.state().documents.get(doc).map(|d| d.text.clone())
    }

    fn cursor(&self, doc: &DocumentId) -> Option<Position> {
        self.state().documents.get(doc).map(|d| d.cursor)
    }

    fn set_cursor(&self, doc: &DocumentId, pos: Position) -> Result<()> {
        let mut state = self.state();
        let open = state
            .documents
            .get_mut(doc)
            .ok_or_else(|| HostError::DocumentNotOpen(doc.clone()))?;
        if position_to_offset(&open.text, pos).is_none() {
            return Err(HostError::InvalidRange(Range::point(pos)));
        }
        open.cursor = pos;
        Ok(())
    }

    fn apply_edits(&self, doc: &DocumentId, edits: &[TextEdit]) -> Result<()> {
        let event = {
            let mut state = self.state();
            if let Some(reason) = state.reject_next.take() {
                return Err(HostError::Rejected(reason));
            }
            let open = state
                .documents
                .get_mut(doc)
                .ok_or_else(|| HostError::DocumentNotOpen(doc.clone()))?;

            let cursor = position_to_offset(&open.text, open.cursor).unwrap_or(0);
            let (changes, resolved) = apply_edits_to_text(&mut open.text, edits)?;
            let cursor = resolved.iter().fold(cursor, |off, edit| edit.remap(off));
            open.cursor = offset_to_position(&open.text, cursor);

            ChangeEvent {
                document: doc.clone(),
                changes,
            }
        };
        // Lock released: listeners may call back into the host.
        self.bus.emit(&event);
        Ok(())
    }

    fn changes(&self) -> &Arc<ChangeBus> {
        &self.bus
    }
}
