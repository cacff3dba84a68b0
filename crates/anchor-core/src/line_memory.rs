//! Remembered tag positions, used to undo accidental edits of a tag's id.
//!
//! Each entry records the id minted for a tag and where that tag started.
//! Positions follow every change reported for the document (including the
//! engine's own edits), so inserting or deleting lines above a tag does not
//! detach the entry from it. A change that swallows a tag drops its entry,
//! unless the replacement text carries the same tag. Before an entry is
//! trusted it must sit exactly where the live tag starts, and it is checked
//! against the live text: an id that still exists somewhere in the document
//! was moved, not tampered with.

use std::collections::HashMap;

use crate::codec;
use crate::codec::{TAG_CLOSE, TAG_OPEN};
use crate::host::{offset_to_position, ContentChange, DocumentId, Position};
use crate::tag_id::TagId;

/// The id minted for a tag and the tag's current start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub id: TagId,
    pub position: Position,
}

#[derive(Debug, Default)]
pub struct LineMemory {
    anchors: HashMap<DocumentId, Vec<Anchor>>,
}

impl LineMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id` as the authoritative id of the tag starting at `position`.
    ///
    /// Replaces any entry on the same line and any entry with the same id.
    pub fn remember(&mut self, doc: &DocumentId, position: Position, id: TagId) {
        let anchors = self.anchors.entry(doc.clone()).or_default();
        anchors.retain(|a| a.position.line != position.line && a.id != id);
        anchors.push(Anchor { id, position });
    }

    /// Move entries to follow one reported change.
    ///
    /// An entry whose tag start was replaced follows the tag into the new
    /// text if it is there, and is dropped otherwise.
    pub fn shift(&mut self, doc: &DocumentId, change: &ContentChange) {
        let Some(anchors) = self.anchors.get_mut(doc) else {
            return;
        };
        anchors.retain_mut(|anchor| {
            match remap(anchor.position, change).or_else(|| carried(&anchor.id, change)) {
                Some(position) => {
                    anchor.position = position;
                    true
                }
                None => false,
            }
        });
        if anchors.is_empty() {
            self.anchors.remove(doc);
        }
    }

    /// The id the tag on `line` must carry, if it was tampered with.
    ///
    /// `live_id` is the id of the tag starting at `tag_start` and `text` the
    /// whole document. Returns `None` when the live id is fine, either
    /// because it is remembered itself or because nothing is remembered at
    /// that tag's position.
    pub fn expected_at(
        &mut self,
        doc: &DocumentId,
        line: usize,
        tag_start: usize,
        live_id: &TagId,
        text: &str,
    ) -> Option<TagId> {
        let anchors = self.anchors.get_mut(doc)?;

        if let Some(own) = anchors.iter_mut().find(|a| &a.id == live_id) {
            own.position = Position::new(line, tag_start);
            return None;
        }

        let here = Position::new(line, tag_start);
        for anchor in anchors.iter_mut().filter(|a| a.position == here) {
            match locate(text, &anchor.id) {
                // Moved elsewhere (cut and paste, line swap): follow it.
                Some(found) => anchor.position = found,
                None => return Some(anchor.id.clone()),
            }
        }
        None
    }

    /// Drop the entry for `id`. Returns whether one existed.
    pub fn forget(&mut self, doc: &DocumentId, id: &TagId) -> bool {
        let Some(anchors) = self.anchors.get_mut(doc) else {
            return false;
        };
        let before = anchors.len();
        anchors.retain(|a| &a.id != id);
        let removed = anchors.len() != before;
        if anchors.is_empty() {
            self.anchors.remove(doc);
        }
        removed
    }

    pub fn forget_document(&mut self, doc: &DocumentId) {
        self.anchors.remove(doc);
    }

    pub fn anchors(&self, doc: &DocumentId) -> &[Anchor] {
        self.anchors.get(doc).map_or(&[], Vec::as_slice)
    }
}

/// Where a position ends up after `change`, or `None` when the replaced
/// span covers it.
fn remap(pos: Position, change: &ContentChange) -> Option<Position> {
    let start = change.range.start;
    let end = change.range.end;
    if pos < start {
        return Some(pos);
    }
    if pos < end {
        return None;
    }

    let added_lines = change.text.matches('\n').count();
    let last_len = change.text.rsplit('\n').next().map_or(0, str::len);
    if pos.line == end.line {
        let tail = pos.column - end.column;
        if added_lines == 0 {
            Some(Position::new(start.line, start.column + last_len + tail))
        } else {
            Some(Position::new(start.line + added_lines, last_len + tail))
        }
    } else {
        let line = (pos.line as isize + change.line_delta()).max(0) as usize;
        Some(Position::new(line, pos.column))
    }
}

/// Start of the tag for `id` inside the replacement text of `change`, in
/// document coordinates after the change.
fn carried(id: &TagId, change: &ContentChange) -> Option<Position> {
    let marker = format!("{}{}{}", TAG_OPEN, id, TAG_CLOSE);
    let found = change.text.find(&marker)?;
    let offset = if change.text[..found].ends_with(' ') {
        found - 1
    } else {
        found
    };
    let relative = offset_to_position(&change.text, offset);
    let start = change.range.start;
    Some(if relative.line == 0 {
        Position::new(start.line, start.column + relative.column)
    } else {
        Position::new(start.line + relative.line, relative.column)
    })
}

/// First tag in `text` carrying `id`.
fn locate(text: &str, id: &TagId) -> Option<Position> {
    text.split('\n').enumerate().find_map(|(line, content)| {
        codec::parse_tags(content)
            .into_iter()
            .find(|tag| &tag.id == id)
            .map(|tag| Position::new(line, tag.start))
    })
}
