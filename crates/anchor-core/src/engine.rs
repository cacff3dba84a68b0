//! AnchorEngine: keeps anchor tags in a live buffer canonical.
//!
//! On every change notification for the active document the engine looks at
//! the lines the change touched and applies at most one transition per line:
//!
//! 1. Insert: a typed `//[cmt]` trigger becomes a freshly minted tag, the
//!    cursor lands just before the closing `]` and the id is remembered
//! 2. Restore: a tag whose id was edited gets its remembered id back
//! 3. Normalize: a tag that is not in canonical form is rewritten
//! 4. Pad: a tag glued to following code gets a separating space
//!
//! Insert short-circuits the rest of the event. The engine's own edits are
//! applied while the document is suspended, so the change they produce is
//! not processed as user input. Anything left unconverged is picked up on
//! the next change to the line.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, warn};

use crate::codec::{self, TagMatch, TRIGGER};
use crate::events::Subscription;
use crate::host::{
    self, ChangeEvent, ContentChange, DocumentId, HostError, Position, Range, TextEdit, TextHost,
};
use crate::line_memory::{Anchor, LineMemory};
use crate::suspension::EditSuspension;
use crate::tag_id::TagId;

/// Upper bound on transitions applied to one line by `sync_document`.
const MAX_LINE_PASSES: usize = 8;

/// Source of new tag ids.
pub type Minter = Arc<dyn Fn() -> TagId + Send + Sync>;

/// One corrective step the engine applied to a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    Inserted { line: usize, id: TagId },
    Restored { line: usize, from: String, to: TagId },
    Normalized { line: usize, id: TagId },
    Padded { line: usize },
}

impl Transition {
    pub fn line(&self) -> usize {
        match self {
            Transition::Inserted { line, .. }
            | Transition::Restored { line, .. }
            | Transition::Normalized { line, .. }
            | Transition::Padded { line } => *line,
        }
    }
}

pub struct AnchorEngine<H: TextHost> {
    host: Arc<H>,
    memory: Mutex<LineMemory>,
    suspension: EditSuspension,
    minter: Minter,
}

impl<H: TextHost> AnchorEngine<H> {
    pub fn new(host: Arc<H>) -> Self {
        Self::with_minter(host, Arc::new(TagId::generate))
    }

    /// Engine drawing ids from `minter` instead of the random generator.
    pub fn with_minter(host: Arc<H>, minter: Minter) -> Self {
        Self {
            host,
            memory: Mutex::new(LineMemory::new()),
            suspension: EditSuspension::new(),
            minter,
        }
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    pub fn suspension(&self) -> &EditSuspension {
        &self.suspension
    }

    fn memory(&self) -> MutexGuard<'_, LineMemory> {
        self.memory.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Ids currently remembered for `doc`, with where their tags start.
    pub fn remembered(&self, doc: &DocumentId) -> Vec<Anchor> {
        self.memory().anchors(doc).to_vec()
    }

    /// Stop defending `id` in `doc` (its note was deleted).
    pub fn forget(&self, doc: &DocumentId, id: &TagId) -> bool {
        self.memory().forget(doc, id)
    }

    pub fn forget_document(&self, doc: &DocumentId) {
        self.memory().forget_document(doc);
    }

    /// Apply `edits` to `doc` with change handling suspended for it.
    ///
    /// Fails without touching the buffer if another self-edit is already in
    /// flight for the document.
    pub fn apply_edits(&self, doc: &DocumentId, edits: &[TextEdit]) -> host::Result<()> {
        let Some(_token) = self.suspension.suspend(doc) else {
            return Err(HostError::Rejected(format!("edit already in flight for {}", doc)));
        };
        self.host.apply_edits(doc, edits)
    }

    /// Process one change notification from the host.
    pub fn handle_change(&self, event: &ChangeEvent) -> Vec<Transition> {
        let doc = &event.document;

        // Descending, so each change's range is still valid once the ones
        // after it have been accounted for.
        let mut changes: Vec<&ContentChange> = event.changes.iter().collect();
        changes.sort_by(|a, b| b.range.start.cmp(&a.range.start));

        // Own edits move tags too.
        {
            let mut memory = self.memory();
            for change in &changes {
                memory.shift(doc, change);
            }
        }

        if self.suspension.is_suspended(doc) {
            debug!("Ignoring own edit in {}", doc);
            return Vec::new();
        }
        if self.host.active_document().as_ref() != Some(doc) {
            debug!("Ignoring change in inactive document {}", doc);
            return Vec::new();
        }

        let mut transitions = Vec::new();
        for line in touched_lines(&changes) {
            match self.step_line(doc, line) {
                Some(inserted @ Transition::Inserted { .. }) => {
                    transitions.push(inserted);
                    break;
                }
                Some(transition) => transitions.push(transition),
                None => {}
            }
        }
        transitions
    }

    /// Bring every line of `doc` to canonical form, whether or not it is
    /// the active document.
    pub fn sync_document(&self, doc: &DocumentId) -> Vec<Transition> {
        let mut transitions = Vec::new();
        let Some(line_count) = self.host.line_count(doc) else {
            return transitions;
        };
        for line in 0..line_count {
            for _ in 0..MAX_LINE_PASSES {
                match self.step_line(doc, line) {
                    Some(transition) => transitions.push(transition),
                    None => break,
                }
            }
        }
        transitions
    }

    /// Apply the first transition that fits `line`, if any.
    fn step_line(&self, doc: &DocumentId, line: usize) -> Option<Transition> {
        let text = self.host.line_text(doc, line)?;

        if let Some(column) = codec::detect_trigger(&text) {
            return self.insert(doc, line, &text, column);
        }

        let tag = codec::parse_tag(&text)?;

        let document = self.host.text(doc)?;
        let expected = self
            .memory()
            .expected_at(doc, line, tag.start, &tag.id, &document);
        if let Some(expected) = expected {
            let restored = TagMatch {
                id: expected.clone(),
                ..tag.clone()
            };
            let body = codec::canonical_body(&text, &restored);
            return self
                .replace_tag(doc, line, &tag, &body)
                .then(|| Transition::Restored {
                    line,
                    from: tag.raw_id.clone(),
                    to: expected,
                });
        }

        let body = codec::canonical_body(&text, &tag);
        if text[tag.start..tag.end] != body {
            return self
                .replace_tag(doc, line, &tag, &body)
                .then(|| Transition::Normalized {
                    line,
                    id: tag.id.clone(),
                });
        }

        if codec::needs_padding(&text, &tag) {
            let edit = TextEdit::insert(Position::new(line, tag.end), " ");
            return match self.apply_edits(doc, &[edit]) {
                Ok(()) => {
                    debug!("Padded tag {} on line {} of {}", tag.id, line, doc);
                    Some(Transition::Padded { line })
                }
                Err(e) => {
                    warn!("Could not pad tag on line {} of {}: {}", line, doc, e);
                    None
                }
            };
        }

        None
    }

    fn insert(&self, doc: &DocumentId, line: usize, text: &str, column: usize) -> Option<Transition> {
        let trigger_end = column + TRIGGER.len();
        let trailing = codec::followed_by_content(text, trigger_end);
        // The rendered tag brings its own leading space.
        let start = if text[..column].ends_with(' ') {
            column - 1
        } else {
            column
        };

        let id = (self.minter)();
        let rendered = codec::render_tag(&id, trailing);
        let edit = TextEdit::replace(Range::on_line(line, start, trigger_end), rendered.as_str());
        if let Err(e) = self.apply_edits(doc, &[edit]) {
            warn!("Could not insert tag on line {} of {}: {}", line, doc, e);
            return None;
        }

        let inside = start + rendered.len() - if trailing { 2 } else { 1 };
        if let Err(e) = self.host.set_cursor(doc, Position::new(line, inside)) {
            debug!("Could not move cursor into new tag: {}", e);
        }

        self.memory()
            .remember(doc, Position::new(line, start), id.clone());
        debug!("Inserted tag {} on line {} of {}", id, line, doc);
        Some(Transition::Inserted { line, id })
    }

    /// Replace the span of `tag` with `body`, keeping a cursor that sat
    /// inside the tag at the same column (clamped before the closing `]`).
    fn replace_tag(&self, doc: &DocumentId, line: usize, tag: &TagMatch, body: &str) -> bool {
        let cursor = self
            .host
            .cursor(doc)
            .filter(|c| c.line == line && c.column > tag.start && c.column < tag.end);

        let edit = TextEdit::replace(Range::on_line(line, tag.start, tag.end), body);
        if let Err(e) = self.apply_edits(doc, &[edit]) {
            warn!("Could not rewrite tag on line {} of {}: {}", line, doc, e);
            return false;
        }

        if let Some(cursor) = cursor {
            let last = tag.start + body.len().saturating_sub(1);
            let column = cursor.column.min(last);
            if let Err(e) = self.host.set_cursor(doc, Position::new(line, column)) {
                debug!("Could not restore cursor: {}", e);
            }
        }
        debug!("Rewrote tag on line {} of {} as {:?}", line, doc, body);
        true
    }
}

impl<H: TextHost + 'static> AnchorEngine<H> {
    /// Start handling the host's change notifications.
    ///
    /// The subscription only holds a weak reference, so dropping the last
    /// `Arc` of the engine detaches it as well.
    pub fn attach(self: &Arc<Self>) -> Subscription {
        let engine = Arc::downgrade(self);
        self.host.changes().subscribe(move |event| {
            if let Some(engine) = engine.upgrade() {
                engine.handle_change(event);
            }
        })
    }
}

/// Lines of the changed document touched by `changes` (sorted descending).
fn touched_lines(changes: &[&ContentChange]) -> BTreeSet<usize> {
    let mut lines = BTreeSet::new();
    for change in changes {
        let end_line = change.range.end.line;
        let delta = change.line_delta();
        lines = lines
            .into_iter()
            .map(|l| {
                if l >= end_line {
                    (l as isize + delta) as usize
                } else {
                    l
                }
            })
            .collect();
        lines.extend(change.touched_lines());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InMemoryHost;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const IDS: [&str; 4] = ["Mint0001", "Mint0002", "Mint0003", "Mint0004"];

    struct Fixture {
        host: Arc<InMemoryHost>,
        engine: Arc<AnchorEngine<InMemoryHost>>,
        minted: Arc<AtomicUsize>,
        _subscription: Subscription,
    }

    fn fixture() -> Fixture {
        let host = Arc::new(InMemoryHost::new());
        let minted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&minted);
        let minter: Minter = Arc::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            TagId::normalize(IDS[n % IDS.len()])
        });
        let engine = Arc::new(AnchorEngine::with_minter(Arc::clone(&host), minter));
        let subscription = engine.attach();
        Fixture {
            host,
            engine,
            minted,
            _subscription: subscription,
        }
    }

    fn line(f: &Fixture, doc: &DocumentId, n: usize) -> String {
        f.host.line_text(doc, n).unwrap()
    }

    #[test]
    fn test_trigger_becomes_tag() {
        let f = fixture();
        let doc = f.host.open("a.rs", "let x = 1;");
        f.host.type_text(&doc, Position::new(0, 10), " //[cmt]").unwrap();

        assert_eq!(line(&f, &doc, 0), "let x = 1; //[cmt:Mint0001]");
        // Just before the closing bracket.
        assert_eq!(f.host.cursor(&doc), Some(Position::new(0, 26)));
        assert_eq!(f.minted.load(Ordering::SeqCst), 1);
        assert_eq!(f.engine.remembered(&doc)[0].id.as_str(), "Mint0001");
    }

    #[test]
    fn test_trigger_before_code_gets_trailing_space() {
        let f = fixture();
        let doc = f.host.open("a.rs", "foobar");
        f.host.type_text(&doc, Position::new(0, 3), "//[cmt]").unwrap();

        assert_eq!(line(&f, &doc, 0), "foo //[cmt:Mint0001] bar");
        assert_eq!(f.host.cursor(&doc), Some(Position::new(0, 19)));
        assert_eq!(&line(&f, &doc, 0)[19..20], "]");
    }

    #[test]
    fn test_insert_converges_to_single_canonical_tag() {
        for text in ["//[cmt]", "x //[cmt]", "x//[cmt]y", "  //[cmt]  z", "é//[cmt]"] {
            let f = fixture();
            let doc = f.host.open("a.rs", "");
            f.host.type_text(&doc, Position::new(0, 0), text).unwrap();

            let out = line(&f, &doc, 0);
            assert!(codec::detect_trigger(&out).is_none(), "{out}");
            let tags = codec::parse_tags(&out);
            assert_eq!(tags.len(), 1, "{out}");
            assert_eq!(out[tags[0].start..tags[0].end], codec::canonical_body(&out, &tags[0]));
            assert!(!codec::needs_padding(&out, &tags[0]), "{out}");
        }
    }

    #[test]
    fn test_existing_tag_is_not_a_trigger() {
        let f = fixture();
        let doc = f.host.open("a.rs", "call(); //[cmt:AbCd1234]");
        f.host.type_text(&doc, Position::new(0, 24), " more").unwrap();

        assert_eq!(line(&f, &doc, 0), "call(); //[cmt:AbCd1234] more");
        assert_eq!(f.minted.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_canonical_line_is_left_alone() {
        let f = fixture();
        let doc = f.host.open("a.rs", "foo(); //[cmt:AbCd1234] bar");
        let before = f.host.text(&doc).unwrap();
        let event = ChangeEvent {
            document: doc.clone(),
            changes: vec![ContentChange {
                range: Range::on_line(0, 0, 0),
                text: String::new(),
            }],
        };
        assert!(f.engine.handle_change(&event).is_empty());
        assert_eq!(f.host.text(&doc).unwrap(), before);
    }

    #[test]
    fn test_tampered_id_is_restored() {
        let f = fixture();
        let doc = f.host.open("a.rs", "let x = 1;");
        f.host.type_text(&doc, Position::new(0, 10), " //[cmt]").unwrap();

        // Overwrite one character of the id.
        f.host.replace(&doc, Range::on_line(0, 20, 21), "Z").unwrap();
        assert_eq!(line(&f, &doc, 0), "let x = 1; //[cmt:Mint0001]");
    }

    #[test]
    fn test_restore_accepts_any_replacement_id() {
        for replacement in ["q", "Zz-_9", "abcdefghijklmnop"] {
            let f = fixture();
            let doc = f.host.open("a.rs", "x");
            f.host.type_text(&doc, Position::new(0, 1), "//[cmt]").unwrap();
            let original = line(&f, &doc, 0);
            let tag = codec::parse_tag(&original).unwrap();
            let id_start = tag.end - 1 - tag.raw_id.len();

            f.host
                .replace(&doc, Range::on_line(0, id_start, tag.end - 1), replacement)
                .unwrap();
            assert_eq!(line(&f, &doc, 0), original, "replacement {replacement}");
        }
    }

    #[test]
    fn test_restore_reports_transition() {
        let f = fixture();
        let doc = f.host.open("a.rs", "x");
        f.host.type_text(&doc, Position::new(0, 1), "//[cmt]").unwrap();

        // Tamper with the engine detached from the bus, then feed the event.
        let event = ChangeEvent {
            document: doc.clone(),
            changes: vec![ContentChange {
                range: Range::on_line(0, 11, 12),
                text: "Q".into(),
            }],
        };
        {
            let _token = f.engine.suspension().suspend(&doc).unwrap();
            f.host
                .apply_edits(&doc, &[TextEdit::replace(Range::on_line(0, 11, 12), "Q")])
                .unwrap();
        }
        let transitions = f.engine.handle_change(&event);
        assert_eq!(
            transitions,
            vec![Transition::Restored {
                line: 0,
                from: "MiQt0001".into(),
                to: TagId::normalize("Mint0001"),
            }]
        );
    }

    #[test]
    fn test_restore_survives_lines_inserted_above() {
        let f = fixture();
        let doc = f.host.open("a.rs", "a\nb\nc");
        f.host.type_text(&doc, Position::new(2, 1), " //[cmt]").unwrap();
        f.host.type_text(&doc, Position::new(0, 0), "new\nlines\n").unwrap();
        assert_eq!(line(&f, &doc, 4), "c //[cmt:Mint0001]");

        f.host.replace(&doc, Range::on_line(4, 10, 14), "XXXX").unwrap();
        assert_eq!(line(&f, &doc, 4), "c //[cmt:Mint0001]");
    }

    #[test]
    fn test_moved_tag_is_not_restored_over_foreign_tag() {
        let f = fixture();
        let doc = f.host.open("a.rs", "a\nb");
        f.host.type_text(&doc, Position::new(0, 1), " //[cmt]").unwrap();
        // Swap the lines: the tag now sits on line 1.
        f.host
            .replace(
                &doc,
                Range::new(Position::new(0, 0), Position::new(1, 1)),
                "b\na //[cmt:Mint0001]",
            )
            .unwrap();
        // A different hand-written tag on line 0 must stay as typed.
        f.host.type_text(&doc, Position::new(0, 1), " //[cmt:Other123]").unwrap();
        assert_eq!(line(&f, &doc, 0), "b //[cmt:Other123]");
        assert_eq!(line(&f, &doc, 1), "a //[cmt:Mint0001]");
    }

    #[test]
    fn test_deleting_tagged_line_leaves_next_tag_alone() {
        let f = fixture();
        let doc = f.host.open("a.rs", "a\nb //[cmt:Old12345]");
        f.host.type_text(&doc, Position::new(0, 1), " //[cmt]").unwrap();
        assert_eq!(line(&f, &doc, 0), "a //[cmt:Mint0001]");

        f.host
            .replace(&doc, Range::new(Position::new(0, 0), Position::new(1, 0)), "")
            .unwrap();
        assert_eq!(f.host.text(&doc).unwrap(), "b //[cmt:Old12345]");
        assert!(f.engine.remembered(&doc).is_empty());
    }

    #[test]
    fn test_cutting_tagged_line_leaves_next_tag_alone() {
        let f = fixture();
        let doc = f.host.open("a.rs", "x\na\nb //[cmt:Old12345]");
        f.host.type_text(&doc, Position::new(1, 1), " //[cmt]").unwrap();

        // Cut from the end of line 0 through the end of the tagged line.
        f.host
            .replace(&doc, Range::new(Position::new(0, 1), Position::new(1, 18)), "")
            .unwrap();
        f.host.type_text(&doc, Position::new(1, 18), " ").unwrap();
        assert_eq!(f.host.text(&doc).unwrap(), "x\nb //[cmt:Old12345] ");
    }

    #[test]
    fn test_restore_keeps_memory_of_rewritten_tag() {
        let f = fixture();
        let doc = f.host.open("a.rs", "x");
        f.host.type_text(&doc, Position::new(0, 1), "//[cmt]").unwrap();
        f.host.replace(&doc, Range::on_line(0, 11, 12), "Q").unwrap();
        f.host.replace(&doc, Range::on_line(0, 12, 13), "W").unwrap();

        assert_eq!(line(&f, &doc, 0), "x //[cmt:Mint0001]");
        assert_eq!(f.engine.remembered(&doc)[0].position, Position::new(0, 1));
    }

    #[test]
    fn test_long_id_is_normalized() {
        let f = fixture();
        let doc = f.host.open("a.rs", "x //[cmt:AbCd1234]");
        f.host.type_text(&doc, Position::new(0, 17), "zz").unwrap();
        assert_eq!(line(&f, &doc, 0), "x //[cmt:AbCd1234]");
    }

    #[test]
    fn test_glued_tag_is_normalized() {
        let f = fixture();
        let doc = f.host.open("a.rs", "foo;");
        f.host.type_text(&doc, Position::new(0, 4), "//[cmt:AbCd1234]").unwrap();
        assert_eq!(line(&f, &doc, 0), "foo; //[cmt:AbCd1234]");
    }

    #[test]
    fn test_normalize_keeps_cursor_inside_tag() {
        let f = fixture();
        let doc = f.host.open("a.rs", "x //[cmt:AbCd1234]");
        f.host.type_text(&doc, Position::new(0, 17), "zz").unwrap();
        // Typed at column 17, clamped before the closing bracket.
        assert_eq!(f.host.cursor(&doc), Some(Position::new(0, 17)));
    }

    #[test]
    fn test_glued_following_code_is_padded() {
        let f = fixture();
        let doc = f.host.open("a.rs", "//[cmt:AbCd1234]");
        f.host.type_text(&doc, Position::new(0, 16), "x").unwrap();
        assert_eq!(line(&f, &doc, 0), "//[cmt:AbCd1234] x");
    }

    #[test]
    fn test_own_edits_are_not_reprocessed() {
        let f = fixture();
        let doc = f.host.open("a.rs", "");
        f.host.type_text(&doc, Position::new(0, 0), "a //[cmt] b //[cmt]").unwrap();
        // Only the first trigger on the line is converted per event.
        assert_eq!(f.minted.load(Ordering::SeqCst), 1);
        assert_eq!(codec::parse_tags(&line(&f, &doc, 0)).len(), 1);
        assert!(!f.engine.suspension().is_suspended(&doc));
    }

    #[test]
    fn test_suspended_document_is_ignored() {
        let f = fixture();
        let a = f.host.open("a.rs", "");
        let token = f.engine.suspension().suspend(&a).unwrap();
        f.host.type_text(&a, Position::new(0, 0), "//[cmt]").unwrap();
        assert_eq!(line(&f, &a, 0), "//[cmt]");

        // Other documents keep flowing.
        let b = f.host.open("b.rs", "");
        f.host.type_text(&b, Position::new(0, 0), "//[cmt]").unwrap();
        assert_eq!(line(&f, &b, 0), " //[cmt:Mint0001]");
        drop(token);
    }

    #[test]
    fn test_inactive_document_is_ignored() {
        let f = fixture();
        let a = f.host.open("a.rs", "");
        let b = f.host.open("b.rs", "");
        assert_eq!(f.host.active_document(), Some(b));
        f.host.type_text(&a, Position::new(0, 0), "//[cmt]").unwrap();
        assert_eq!(line(&f, &a, 0), "//[cmt]");

        f.host.deactivate();
        f.host.type_text(&a, Position::new(0, 7), " ").unwrap();
        assert_eq!(line(&f, &a, 0), "//[cmt] ");
    }

    #[test]
    fn test_rejected_edit_is_not_retried() {
        let f = fixture();
        let doc = f.host.open("a.rs", "");
        f.host.reject_next_edit("document closing");
        f.host.type_text(&doc, Position::new(0, 0), "//[cmt]").unwrap();

        assert_eq!(line(&f, &doc, 0), "//[cmt]");
        assert!(f.engine.remembered(&doc).is_empty());
        assert!(!f.engine.suspension().is_suspended(&doc));

        // Converges on the next keystroke.
        f.host.type_text(&doc, Position::new(0, 7), ";").unwrap();
        assert_eq!(line(&f, &doc, 0), " //[cmt:Mint0002] ;");
    }

    #[test]
    fn test_insert_short_circuits_event() {
        let f = fixture();
        let doc = f.host.open("a.rs", "");
        f.host
            .type_text(&doc, Position::new(0, 0), "a //[cmt]\nb //[cmt:Long12345]")
            .unwrap();
        assert_eq!(line(&f, &doc, 0), "a //[cmt:Mint0001]");
        assert_eq!(line(&f, &doc, 1), "b //[cmt:Long12345]");
    }

    #[test]
    fn test_multi_line_paste_fixes_each_line() {
        let f = fixture();
        let doc = f.host.open("a.rs", "");
        f.host
            .type_text(&doc, Position::new(0, 0), "a //[cmt:Long12345]\nb;//[cmt:AbCd1234]")
            .unwrap();
        assert_eq!(line(&f, &doc, 0), "a //[cmt:Long1234]");
        assert_eq!(line(&f, &doc, 1), "b; //[cmt:AbCd1234]");
    }

    #[test]
    fn test_sync_document_converges_every_line() {
        let f = fixture();
        let doc = f
            .host
            .open("a.rs", "a //[cmt]\nb;//[cmt:AbCd1234xyz]c\n//[cmt:Zz]q\nplain");
        let transitions = f.engine.sync_document(&doc);

        assert_eq!(
            f.host.text(&doc).unwrap(),
            "a //[cmt:Mint0001]\nb; //[cmt:AbCd1234] c\n//[cmt:Zz] q\nplain"
        );
        assert_eq!(
            transitions,
            vec![
                Transition::Inserted {
                    line: 0,
                    id: TagId::normalize("Mint0001")
                },
                Transition::Normalized {
                    line: 1,
                    id: TagId::normalize("AbCd1234")
                },
                Transition::Padded { line: 1 },
                Transition::Padded { line: 2 },
            ]
        );
        assert!(f.engine.sync_document(&doc).is_empty());
    }

    #[test]
    fn test_forget_stops_restoring() {
        let f = fixture();
        let doc = f.host.open("a.rs", "x");
        f.host.type_text(&doc, Position::new(0, 1), "//[cmt]").unwrap();
        assert!(f.engine.forget(&doc, &TagId::normalize("Mint0001")));

        f.host.replace(&doc, Range::on_line(0, 11, 12), "Q").unwrap();
        assert_eq!(line(&f, &doc, 0), "x //[cmt:MiQt0001]");
    }

    #[test]
    fn test_dropping_engine_detaches() {
        let host = Arc::new(InMemoryHost::new());
        let engine = Arc::new(AnchorEngine::new(Arc::clone(&host)));
        let _subscription = engine.attach();
        drop(engine);

        let doc = host.open("a.rs", "");
        host.type_text(&doc, Position::new(0, 0), "//[cmt]").unwrap();
        assert_eq!(host.line_text(&doc, 0).unwrap(), "//[cmt]");
    }

    #[test]
    fn test_touched_lines_maps_to_post_change_lines() {
        let lower = ContentChange {
            range: Range::on_line(1, 0, 0),
            text: "x\ny\n".into(),
        };
        let upper = ContentChange {
            range: Range::on_line(5, 0, 2),
            text: "z".into(),
        };
        // Descending order, as hosts report batched edits.
        let lines = touched_lines(&[&upper, &lower]);
        assert_eq!(lines.into_iter().collect::<Vec<_>>(), vec![1, 2, 3, 7]);
    }

    #[test]
    fn test_transition_serializes_with_kind() {
        let json = serde_json::to_string(&Transition::Padded { line: 3 }).unwrap();
        assert_eq!(json, r#"{"kind":"padded","line":3}"#);
    }
}
