use crate::models::{Note, NoteSummary};
use crate::sync::{ConflictChoice, Editor, SaveState, SyncError, SyncUi};
use async_trait::async_trait;
use futures::channel::oneshot;
use leptos::prelude::*;

/// A conflict waiting for the user's answer.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ConflictPrompt {
    pub local: String,
    pub remote: Note,
}

/// Reactive view state. The sync engine writes it through the [`Editor`] and
/// [`SyncUi`] impls below; components only read it.
#[derive(Clone, Copy)]
pub(crate) struct AppState {
    pub index: RwSignal<Vec<NoteSummary>>,
    pub current_note: RwSignal<Option<Note>>,
    /// A switch to another note is loading; the editor is read-only meanwhile.
    pub loading: RwSignal<bool>,

    /// Working copy of the open note, bound to the textarea.
    pub content: RwSignal<String>,

    pub idle: RwSignal<bool>,
    pub typing: RwSignal<bool>,
    pub save_state: RwSignal<Option<SaveState>>,
    pub error: RwSignal<Option<String>>,

    pub conflict: RwSignal<Option<ConflictPrompt>>,
    conflict_reply: StoredValue<Option<oneshot::Sender<ConflictChoice>>>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            index: RwSignal::new(vec![]),
            current_note: RwSignal::new(None),
            loading: RwSignal::new(false),
            content: RwSignal::new(String::new()),
            idle: RwSignal::new(false),
            typing: RwSignal::new(false),
            save_state: RwSignal::new(None),
            error: RwSignal::new(None),
            conflict: RwSignal::new(None),
            conflict_reply: StoredValue::new(None),
        }
    }

    /// Answer the open conflict prompt, if any.
    pub fn resolve_conflict(&self, choice: ConflictChoice) {
        let mut reply = None;
        self.conflict_reply.update_value(|slot| reply = slot.take());
        self.conflict.set(None);
        if let Some(tx) = reply {
            let _ = tx.send(choice);
        }
    }

    fn is_current(&self, note_id: &str) -> bool {
        self.current_note
            .with_untracked(|n| n.as_ref().is_some_and(|n| n.id == note_id))
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl Editor for AppState {
    fn content(&self) -> String {
        self.content.get_untracked()
    }

    fn set_content(&self, content: &str) {
        self.content.set(content.to_string());
    }
}

#[async_trait(?Send)]
impl SyncUi for AppState {
    fn on_note_selected(&self, note: &Note) {
        self.current_note.set(Some(note.clone()));
        self.loading.set(false);
        self.save_state.set(None);
        self.error.set(None);
    }

    fn on_note_cleared(&self) {
        self.current_note.set(None);
        self.loading.set(false);
        self.typing.set(false);
        self.save_state.set(None);
    }

    async fn on_conflict_detected(&self, local: &str, remote: &Note) -> ConflictChoice {
        let (tx, rx) = oneshot::channel();
        let mut previous = None;
        self.conflict_reply
            .update_value(|slot| previous = slot.replace(tx));
        if let Some(previous) = previous {
            let _ = previous.send(ConflictChoice::default());
        }

        self.conflict.set(Some(ConflictPrompt {
            local: local.to_string(),
            remote: remote.clone(),
        }));
        // A dropped prompt counts as "take theirs".
        let choice = rx.await.unwrap_or_default();
        self.conflict.set(None);
        choice
    }

    fn on_idle_changed(&self, idle: bool) {
        self.idle.set(idle);
    }

    fn on_typing_changed(&self, note_id: &str, typing: bool) {
        if !typing || self.is_current(note_id) {
            self.typing.set(typing);
        }
    }

    fn on_index_changed(&self, index: &[NoteSummary]) {
        self.index.set(index.to_vec());
    }

    fn on_note_metadata_changed(&self, note: &Note) {
        if self.is_current(&note.id) {
            self.current_note.set(Some(note.clone()));
        }
    }

    fn on_save_state(&self, note_id: &str, state: SaveState) {
        if self.is_current(note_id) {
            self.save_state.set(Some(state));
        }
        if state == SaveState::Saved {
            self.error.set(None);
        }
    }

    fn on_error(&self, error: &SyncError) {
        self.error.set(Some(error.user_message()));
    }
}
