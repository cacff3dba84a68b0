//! Tag lookup overlay: what to show when hovering an anchor tag.

use serde::Serialize;

use crate::codec;
use crate::commands::{NoteArgs, DELETE_COMMAND, OPEN_COMMAND};
use crate::host::{DocumentId, Position, TextHost};
use crate::project::{ProjectResolver, WorkspaceRoots};
use crate::store::NoteStore;
use crate::tag_id::TagId;

/// Shown instead of the note text when a tag has no note.
pub const EMPTY_NOTE: &str = "_No comment yet_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OverlayAction {
    Open(NoteArgs),
    Delete(NoteArgs),
}

impl OverlayAction {
    pub fn command(&self) -> &'static str {
        match self {
            OverlayAction::Open(_) => OPEN_COMMAND,
            OverlayAction::Delete(_) => DELETE_COMMAND,
        }
    }

    pub fn args(&self) -> &NoteArgs {
        match self {
            OverlayAction::Open(args) | OverlayAction::Delete(args) => args,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OverlayAction::Open(_) => "Open Comment Box",
            OverlayAction::Delete(_) => "Delete Comment",
        }
    }

    /// `command:` URI carrying the URL-encoded JSON arguments.
    pub fn uri(&self) -> String {
        let json = serde_json::to_string(self.args()).unwrap_or_default();
        format!("command:{}?{}", self.command(), urlencoding::encode(&json))
    }
}

/// A tag under the pointer with its note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Overlay {
    pub id: TagId,
    pub file_path: std::path::PathBuf,
    pub line: usize,
    /// Span of the marker itself, without a leading space.
    pub start: usize,
    pub end: usize,
    pub note: Option<String>,
    pub actions: [OverlayAction; 2],
}

impl Overlay {
    /// Hover body: the note (or a placeholder), a rule, then the actions as
    /// command links.
    pub fn to_markdown(&self) -> String {
        let mut markdown = String::new();
        match self.note.as_deref().filter(|note| !note.is_empty()) {
            Some(note) => markdown.push_str(note),
            None => markdown.push_str(EMPTY_NOTE),
        }
        markdown.push_str("\n\n---\n");
        let links: Vec<String> = self
            .actions
            .iter()
            .map(|action| format!("[{}]({})", action.label(), action.uri()))
            .collect();
        markdown.push_str(&links.join("&nbsp;&nbsp;&nbsp;"));
        markdown
    }
}

/// Find the tag at `position` in `doc` and load its note.
///
/// A tag matches when `position` lies on it, or when the host's cursor is on
/// the same line and lies on it. No match means no overlay.
pub async fn lookup<H: TextHost + ?Sized>(
    host: &H,
    resolver: &ProjectResolver,
    workspace: &dyn WorkspaceRoots,
    store: &NoteStore,
    doc: &DocumentId,
    position: Position,
) -> Option<Overlay> {
    let text = host.line_text(doc, position.line)?;
    let cursor = host
        .cursor(doc)
        .filter(|cursor| cursor.line == position.line);

    let (start, end, id) = codec::parse_tags(&text).into_iter().find_map(|tag| {
        let start = tag.start + usize::from(tag.has_leading_space(&text));
        let hit = |column: usize| start <= column && column <= tag.end;
        (hit(position.column) || cursor.is_some_and(|c| hit(c.column)))
            .then_some((start, tag.end, tag.id))
    })?;

    let file_path = doc.path().to_path_buf();
    let note = match resolver.resolve(workspace, &file_path) {
        Some(root) => store.get(&root, id.as_str()).await,
        None => None,
    };

    let args = NoteArgs::new(id.as_str(), file_path.clone());
    Some(Overlay {
        id,
        file_path,
        line: position.line,
        start,
        end,
        note,
        actions: [OverlayAction::Open(args.clone()), OverlayAction::Delete(args)],
    })
}
