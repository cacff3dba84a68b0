//! anchor-core: inline anchor tags that link source lines to out-of-band notes.
//!
//! This crate provides:
//! - The `//[cmt:<id>]` tag syntax and id minting
//! - A sync engine that keeps tags canonical in a live, mutating buffer
//! - A per-project JSON note store keyed by tag id
//! - Hover overlays, a single-instance note editor and the open/delete
//!   commands
//! - `TextHost` and `WorkspaceRoots` abstractions over the hosting editor

pub mod codec;
pub mod commands;
pub mod editor;
pub mod engine;
pub mod events;
pub mod host;
pub mod line_memory;
pub mod notify;
pub mod overlay;
pub mod project;
pub mod rich_text;
pub mod store;
pub mod suspension;
pub mod tag_id;

pub use codec::TagMatch;
pub use commands::{Commands, NoteArgs, NoteContext, NoteError};
pub use editor::{NoteEditor, Panel};
pub use engine::{AnchorEngine, Transition};
pub use events::{ChangeBus, Subscription};
pub use host::{
    ChangeEvent, ContentChange, DocumentId, HostError, InMemoryHost, Position, Range, TextEdit,
    TextHost,
};
pub use notify::{Notifier, RecordingNotifier, TracingNotifier};
pub use overlay::{lookup, Overlay, OverlayAction};
pub use project::{ProjectResolver, StaticWorkspace, WorkspaceRoots};
pub use rich_text::RichText;
pub use store::{NoteStore, Notes, StoreError};
pub use tag_id::{TagId, TagIdError};
