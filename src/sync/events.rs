//! Capabilities the engine needs from its UI collaborator.
//!
//! The engine never touches the DOM; it only calls these traits, which are
//! handed to [`SyncEngine::new`](super::SyncEngine::new).

use super::error::SyncError;
use crate::models::{Note, NoteSummary};
use async_trait::async_trait;

/// The editor widget holding the working copy of the open note.
pub trait Editor {
    fn content(&self) -> String;

    /// Replace the working copy. Only the engine calls this, through
    /// `AutosavePolicy::replace_editor_content`.
    fn set_content(&self, content: &str);
}

/// Answer to a conflict prompt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConflictChoice {
    /// Re-save local content, overwriting the remote copy.
    KeepMine,
    /// Discard local content in favour of the remote copy.
    #[default]
    TakeTheirs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveState {
    Saving,
    Saved,
    Failed,
}

/// Notifications from the engine. All but the conflict prompt are fire-and-forget.
#[async_trait(?Send)]
pub trait SyncUi {
    fn on_note_selected(&self, _note: &Note) {}

    fn on_note_cleared(&self) {}

    /// Local edits are fresh and the remote copy diverged. Dismissing the prompt
    /// should resolve to [`ConflictChoice::TakeTheirs`].
    async fn on_conflict_detected(&self, local: &str, remote: &Note) -> ConflictChoice;

    fn on_idle_changed(&self, _idle: bool) {}

    fn on_typing_changed(&self, _note_id: &str, _typing: bool) {}

    fn on_index_changed(&self, _index: &[NoteSummary]) {}

    /// The open note's title/visibility/modified changed remotely.
    fn on_note_metadata_changed(&self, _note: &Note) {}

    fn on_save_state(&self, _note_id: &str, _state: SaveState) {}

    fn on_error(&self, _error: &SyncError) {}
}
