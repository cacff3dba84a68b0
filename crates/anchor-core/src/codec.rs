//! Inline marker syntax: recognize, render and locate `//[cmt:<id>]` tags.
//!
//! Supports:
//! - Trigger: `//[cmt]` (typed by the user, replaced with a fresh tag)
//! - Tags: `//[cmt:AbCd1234]`, optionally preceded by a single space
//!
//! All columns are UTF-8 byte offsets within a line. Tag text is ASCII, so
//! offsets returned here always fall on character boundaries.

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

use crate::tag_id::TagId;

/// Literal the user types to request a new tag.
pub const TRIGGER: &str = "//[cmt]";

/// Everything before the id in a rendered tag.
pub const TAG_OPEN: &str = "//[cmt:";

/// Closes a rendered tag.
pub const TAG_CLOSE: &str = "]";

static TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" ?//\[cmt:([A-Za-z0-9_-]+)\]").expect("valid tag pattern"));

/// A tag found on a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagMatch {
    /// Id truncated to the canonical length.
    pub id: TagId,
    /// Id exactly as it appears in the text.
    pub raw_id: String,
    /// Start of the match, including the optional leading space.
    pub start: usize,
    /// One past the closing `]`.
    pub end: usize,
}

impl TagMatch {
    /// Whether the match swallowed a leading space.
    pub fn has_leading_space(&self, line: &str) -> bool {
        line.as_bytes().get(self.start) == Some(&b' ')
    }

    /// Whether `column` falls within the tag (both ends inclusive, like an
    /// editor range containing a cursor).
    pub fn contains(&self, column: usize) -> bool {
        self.start <= column && column <= self.end
    }

    fn from_captures(caps: &regex::Captures<'_>) -> Option<Self> {
        let whole = caps.get(0)?;
        let raw = caps.get(1)?.as_str();
        Some(Self {
            id: TagId::normalize(raw),
            raw_id: raw.to_string(),
            start: whole.start(),
            end: whole.end(),
        })
    }
}

/// Byte column of the first trigger on the line.
pub fn detect_trigger(line: &str) -> Option<usize> {
    line.find(TRIGGER)
}

/// First tag on the line. Later tags on the same line are ignored by the
/// sync engine.
pub fn parse_tag(line: &str) -> Option<TagMatch> {
    TAG_PATTERN
        .captures(line)
        .and_then(|caps| TagMatch::from_captures(&caps))
}

/// Every non-overlapping tag on the line, left to right.
pub fn parse_tags(line: &str) -> Vec<TagMatch> {
    TAG_PATTERN
        .captures_iter(line)
        .filter_map(|caps| TagMatch::from_captures(&caps))
        .collect()
}

/// Render a tag for insertion: ` //[cmt:<id>]`, plus one space when the
/// insertion point is directly followed by code.
pub fn render_tag(id: &TagId, needs_trailing_space: bool) -> String {
    let mut out = format!(" {}{}{}", TAG_OPEN, id, TAG_CLOSE);
    if needs_trailing_space {
        out.push(' ');
    }
    out
}

/// Canonical text for the span `tag.start..tag.end` of an existing tag.
///
/// A present leading space is kept. A missing one is only added when the tag
/// is glued to preceding non-whitespace.
pub fn canonical_body(line: &str, tag: &TagMatch) -> String {
    let glued = line[..tag.start]
        .chars()
        .next_back()
        .is_some_and(|c| !c.is_whitespace());
    let lead = if tag.has_leading_space(line) || glued {
        " "
    } else {
        ""
    };
    format!("{}{}{}{}", lead, TAG_OPEN, tag.id, TAG_CLOSE)
}

/// True when the character right after the tag is not whitespace.
pub fn needs_padding(line: &str, tag: &TagMatch) -> bool {
    line[tag.end..]
        .chars()
        .next()
        .is_some_and(|c| !c.is_whitespace())
}

/// True when the text directly after `column` starts with non-whitespace.
pub fn followed_by_content(line: &str, column: usize) -> bool {
    line.get(column..)
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| !c.is_whitespace())
}

/// Byte ranges in a whole document to remove when deleting the tag `id`.
///
/// Each range covers the marker plus one leading space or tab if present.
/// One trailing space is included as well when no leading whitespace was
/// taken, or when the marker started its line, so that deleting never
/// leaves a doubled or dangling space.
pub fn find_markers(text: &str, id: &str) -> Vec<Range<usize>> {
    let pattern = format!(r"[ \t]?//\[cmt:{}\]", regex::escape(id));
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };

    let bytes = text.as_bytes();
    let mut ranges: Vec<Range<usize>> = Vec::new();
    for m in re.find_iter(text) {
        let start = m.start();
        let mut end = m.end();
        let took_leading = matches!(bytes[start], b' ' | b'\t');
        let at_line_start = start == 0 || bytes[start - 1] == b'\n';
        if (!took_leading || at_line_start) && bytes.get(end) == Some(&b' ') {
            end += 1;
        }
        // A trailing space taken for the previous marker may be this one's
        // leading space.
        if let Some(prev) = ranges.last_mut() {
            if prev.end > start {
                prev.end = start;
            }
        }
        ranges.push(start..end);
    }
    ranges
}
