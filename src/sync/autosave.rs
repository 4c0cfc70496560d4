use super::events::{Editor, SyncUi};
use super::save::{SaveCoordinator, SaveMode, SaveOutcome};
use super::selection::NoteSelection;
use crate::models::NotePatch;
use crate::platform::{Runtime, TimerId};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

struct NoteTimer {
    note_id: String,
    timer: TimerId,
}

/// Content saves held back for one note while a conflict prompt is open.
#[derive(Debug)]
pub struct SaveHold {
    pub note_id: String,
    /// Edits arrived while held.
    pub deferred: bool,
    /// Editor content captured when the note was flushed (closed) while held.
    pub flushed_content: Option<String>,
}

/// Debounced autosave plus the typing indicator.
///
/// Also owns the one entry point through which the engine replaces editor
/// content, so programmatic replacements never look like local edits.
pub struct AutosavePolicy {
    runtime: Rc<dyn Runtime>,
    selection: Rc<NoteSelection>,
    editor: Rc<dyn Editor>,
    saves: Rc<SaveCoordinator>,
    ui: Rc<dyn SyncUi>,
    debounce_ms: u32,
    typing_quiet_ms: u32,
    pending: RefCell<Option<NoteTimer>>,
    typing: RefCell<Option<NoteTimer>>,
    hold: RefCell<Option<SaveHold>>,
    weak: Weak<Self>,
}

impl AutosavePolicy {
    pub fn new(
        runtime: Rc<dyn Runtime>,
        selection: Rc<NoteSelection>,
        editor: Rc<dyn Editor>,
        saves: Rc<SaveCoordinator>,
        ui: Rc<dyn SyncUi>,
        debounce_ms: u32,
        typing_quiet_ms: u32,
    ) -> Rc<Self> {
        Rc::new_cyclic(|weak| Self {
            runtime,
            selection,
            editor,
            saves,
            ui,
            debounce_ms,
            typing_quiet_ms,
            pending: RefCell::new(None),
            typing: RefCell::new(None),
            hold: RefCell::new(None),
            weak: weak.clone(),
        })
    }

    /// Called on every content mutation of the open note.
    pub fn on_content_changed(&self) {
        let Some(note_id) = self.selection.current_id() else {
            return;
        };

        self.take_pending();
        if self.defer_edit(&note_id) {
            self.touch_typing(&note_id);
            return;
        }

        let weak = self.weak.clone();
        let id = note_id.clone();
        let timer = self.runtime.set_timeout(
            self.debounce_ms,
            Box::new(move || {
                if let Some(this) = weak.upgrade() {
                    this.debounce_fired(&id);
                }
            }),
        );
        *self.pending.borrow_mut() = Some(NoteTimer {
            note_id: note_id.clone(),
            timer,
        });

        self.touch_typing(&note_id);
    }

    fn debounce_fired(&self, note_id: &str) {
        let ours = self
            .pending
            .borrow()
            .as_ref()
            .is_some_and(|p| p.note_id == note_id);
        if ours {
            self.pending.borrow_mut().take();
        }
        if !ours || !self.selection.is_open(note_id) {
            tracing::debug!(note_id, "autosave fired for a note that is no longer open");
            return;
        }

        // Read at fire time: the save always carries the latest content.
        let content = self.editor.content();
        self.saves
            .save(note_id, NotePatch::content(content), SaveMode::IfChanged);
    }

    /// Hold back content saves of `note_id` until [`release_hold`](Self::release_hold).
    pub fn hold(&self, note_id: &str) {
        self.take_pending();
        *self.hold.borrow_mut() = Some(SaveHold {
            note_id: note_id.to_string(),
            deferred: false,
            flushed_content: None,
        });
    }

    /// End the hold on `note_id`; None if it was cancelled meanwhile.
    pub fn release_hold(&self, note_id: &str) -> Option<SaveHold> {
        let mut hold = self.hold.borrow_mut();
        if hold.as_ref().is_some_and(|h| h.note_id == note_id) {
            hold.take()
        } else {
            None
        }
    }

    fn defer_edit(&self, note_id: &str) -> bool {
        match self.hold.borrow_mut().as_mut() {
            Some(hold) if hold.note_id == note_id => {
                hold.deferred = true;
                true
            }
            _ => false,
        }
    }

    fn is_held(&self, note_id: &str) -> bool {
        self.hold
            .borrow()
            .as_ref()
            .is_some_and(|hold| hold.note_id == note_id)
    }

    /// Cancel a pending debounce. Returns the note it was pending for.
    pub fn take_pending(&self) -> Option<String> {
        let pending = self.pending.borrow_mut().take()?;
        self.runtime.clear_timer(pending.timer);
        Some(pending.note_id)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.borrow().is_some()
    }

    /// Save the open note's editor content right away, cancelling the debounce.
    ///
    /// While the note is held the content is only captured, not saved.
    pub fn flush(&self) -> Option<SaveOutcome> {
        let cancelled = self.take_pending();
        let note_id = self.selection.current_id()?;
        let content = self.editor.content();
        if self.is_held(&note_id) {
            tracing::debug!(note_id, "conflict prompt open; flush deferred");
            if let Some(hold) = self.hold.borrow_mut().as_mut() {
                hold.flushed_content = Some(content);
            }
            return None;
        }
        if cancelled.is_some() {
            tracing::debug!(note_id, "flushing pending autosave");
        }
        Some(
            self.saves
                .save(&note_id, NotePatch::content(content), SaveMode::IfChanged),
        )
    }

    /// Replace the editor content without it counting as a local edit.
    pub fn replace_editor_content(&self, content: &str) {
        self.take_pending();
        self.editor.set_content(content);
    }

    fn touch_typing(&self, note_id: &str) {
        let previous = self.typing.borrow_mut().take();
        let mut started = true;
        if let Some(prev) = previous {
            self.runtime.clear_timer(prev.timer);
            if prev.note_id == note_id {
                started = false;
            } else {
                self.ui.on_typing_changed(&prev.note_id, false);
            }
        }
        if started {
            self.ui.on_typing_changed(note_id, true);
        }

        let weak = self.weak.clone();
        let id = note_id.to_string();
        let timer = self.runtime.set_timeout(
            self.typing_quiet_ms,
            Box::new(move || {
                if let Some(this) = weak.upgrade() {
                    this.typing_expired(&id);
                }
            }),
        );
        *self.typing.borrow_mut() = Some(NoteTimer {
            note_id: note_id.to_string(),
            timer,
        });
    }

    fn typing_expired(&self, note_id: &str) {
        let expired = self
            .typing
            .borrow()
            .as_ref()
            .is_some_and(|t| t.note_id == note_id);
        if expired {
            self.typing.borrow_mut().take();
            self.ui.on_typing_changed(note_id, false);
        }
    }

    pub fn is_typing(&self) -> bool {
        self.typing.borrow().is_some()
    }

    /// End the typing indicator now, e.g. when the note is closed.
    pub fn stop_typing(&self) {
        let Some(typing) = self.typing.borrow_mut().take() else {
            return;
        };
        self.runtime.clear_timer(typing.timer);
        self.ui.on_typing_changed(&typing.note_id, false);
    }

    /// Cancel both timers and any hold without saving.
    pub fn cancel_all(&self) {
        self.take_pending();
        self.hold.borrow_mut().take();
        self.stop_typing();
    }
}
