use super::activity::{ActivityTracker, ActivityTransition, Interaction};
use super::autosave::AutosavePolicy;
use super::coordinator::SyncCoordinator;
use super::error::{SyncError, SyncOp};
use super::events::{Editor, SyncUi};
use super::fingerprint::{fingerprint, Fingerprint};
use super::save::{SaveCoordinator, SaveMode, SaveOutcome};
use super::selection::NoteSelection;
use super::store::DocumentStore;
use crate::config::SyncConfig;
use crate::models::{Note, NotePatch, NoteSummary};
use crate::platform::{Runtime, TimerId};
use std::cell::Cell;
use std::rc::{Rc, Weak};

/// The one type the UI talks to.
///
/// Wires selection, activity tracking, autosave, saving and polling together
/// and routes between them. Everything runs on the caller's thread.
pub struct SyncEngine {
    config: SyncConfig,
    runtime: Rc<dyn Runtime>,
    store: Rc<dyn DocumentStore>,
    ui: Rc<dyn SyncUi>,
    selection: Rc<NoteSelection>,
    activity: Rc<ActivityTracker>,
    autosave: Rc<AutosavePolicy>,
    saves: Rc<SaveCoordinator>,
    sync: Rc<SyncCoordinator>,
    idle_timer: Cell<Option<TimerId>>,
    /// Bumped by every selection change; outstanding `select_note` calls
    /// compare against it and give up when superseded.
    select_requests: Cell<u64>,
    weak: Weak<Self>,
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        runtime: Rc<dyn Runtime>,
        store: Rc<dyn DocumentStore>,
        editor: Rc<dyn Editor>,
        ui: Rc<dyn SyncUi>,
    ) -> Rc<Self> {
        let selection = Rc::new(NoteSelection::new());
        let activity = Rc::new(ActivityTracker::new(
            config.idle_threshold_ms,
            runtime.now_ms(),
        ));
        let saves = SaveCoordinator::new(
            runtime.clone(),
            store.clone(),
            selection.clone(),
            ui.clone(),
        );
        let autosave = AutosavePolicy::new(
            runtime.clone(),
            selection.clone(),
            editor.clone(),
            saves.clone(),
            ui.clone(),
            config.autosave_debounce_ms,
            config.typing_quiet_ms,
        );
        let sync = SyncCoordinator::new(
            &config,
            runtime.clone(),
            store.clone(),
            selection.clone(),
            activity.clone(),
            autosave.clone(),
            saves.clone(),
            editor,
            ui.clone(),
        );

        Rc::new_cyclic(|weak| Self {
            config,
            runtime,
            store,
            ui,
            selection,
            activity,
            autosave,
            saves,
            sync,
            idle_timer: Cell::new(None),
            select_requests: Cell::new(0),
            weak: weak.clone(),
        })
    }

    /// Start the idle check and the list poller, and load the index once.
    pub fn start(&self) {
        if self.idle_timer.get().is_some() {
            return;
        }
        let weak = self.weak.clone();
        let id = self.runtime.set_interval(
            self.config.idle_check_interval_ms,
            Box::new(move || {
                if let Some(this) = weak.upgrade() {
                    this.check_idle();
                }
            }),
        );
        self.idle_timer.set(Some(id));
        self.sync.start_list_poller();
        self.sync.poll_index();
        tracing::info!("sync engine started");
    }

    /// Flush and close the open note. Its sync state stays around while a
    /// save for it is still on the wire.
    fn close_current(&self) -> Option<String> {
        self.autosave.flush();
        self.autosave.stop_typing();
        self.sync.stop_note_poller();

        let closed = self.selection.close()?;
        if !self.saves.is_busy(&closed) {
            self.selection.release(&closed);
        }
        tracing::info!(note_id = %closed, "note closed");
        Some(closed)
    }

    fn supersede_selection(&self) -> u64 {
        let request = self.select_requests.get() + 1;
        self.select_requests.set(request);
        request
    }

    /// Open an already loaded note. Returns the id of the note it replaced.
    pub fn open_note(&self, note: Note) -> Option<String> {
        self.supersede_selection();
        self.open(note)
    }

    fn open(&self, note: Note) -> Option<String> {
        let previous = self.close_current();

        let note_id = note.id.clone();
        let unsaved = self.saves.unsaved(&note_id);
        self.selection.select(note.clone(), self.runtime.now_ms());
        tracing::info!(note_id, "note opened");

        let Some(unsaved) = unsaved else {
            self.autosave.replace_editor_content(&note.content);
            self.ui.on_note_selected(&note);
            self.sync.start_note_poller();
            return previous;
        };

        // Content whose write failed earlier wins over the store's copy, unless
        // the store moved on since that write was attempted.
        let store_fp = fingerprint(&note.content);
        let restored = unsaved.patch.content.clone();
        let diverged = restored
            .as_ref()
            .is_some_and(|content| *content != note.content && unsaved.base != Some(store_fp));

        if !diverged {
            if let Some(content) = &restored {
                tracing::info!(note_id, "restoring unsaved local content");
                self.autosave.replace_editor_content(content);
            } else {
                self.autosave.replace_editor_content(&note.content);
            }
            self.ui.on_note_selected(&note);
            self.saves.save(&note_id, unsaved.patch, SaveMode::IfChanged);
        } else if self.sync.conflict_open() {
            tracing::info!(note_id, "unsaved content diverged; kept until the open prompt is answered");
            self.autosave.replace_editor_content(&note.content);
            self.ui.on_note_selected(&note);
        } else if let Some(content) = restored {
            self.autosave.replace_editor_content(&content);
            self.ui.on_note_selected(&note);
            let metadata = NotePatch {
                content: None,
                ..unsaved.patch
            };
            if metadata != NotePatch::default() {
                self.saves.save(&note_id, metadata, SaveMode::IfChanged);
            }
            self.sync.ask_about_unsaved(content, note);
        }
        self.sync.start_note_poller();
        previous
    }

    /// Switch to `note_id`, loading it from the store.
    ///
    /// The open note is flushed before anything is awaited. A later selection
    /// supersedes this one; the superseded call returns `Ok` without opening.
    /// The UI only hears `on_note_selected` for a switch, or `on_note_cleared`
    /// if loading the new note fails.
    pub async fn select_note(&self, note_id: &str) -> Result<(), SyncError> {
        let request = self.supersede_selection();
        let previous = self.close_current();

        // Our own pending writes must land before the store is read back.
        self.saves.flushed(note_id).await;
        if self.select_requests.get() != request {
            tracing::debug!(note_id, "selection superseded");
            return Ok(());
        }

        let result = self.store.fetch_note(note_id).await;
        if self.select_requests.get() != request {
            tracing::debug!(note_id, "selection superseded");
            return Ok(());
        }
        match result {
            Ok(note) => {
                self.open(note);
            }
            Err(e) => {
                tracing::warn!(note_id, error = %e, "failed to open note");
                let error = SyncError::new(SyncOp::Open, Some(note_id), e);
                self.ui.on_note_cleared();
                self.ui.on_error(&error);
                return Err(error);
            }
        }

        if let Some(previous) = previous {
            self.saves.flushed(&previous).await;
        }
        Ok(())
    }

    pub async fn clear_selection(&self) {
        self.supersede_selection();
        let previous = self.close_current();
        self.ui.on_note_cleared();
        if let Some(previous) = previous {
            self.saves.flushed(&previous).await;
        }
    }

    /// The editor content changed through user input.
    pub fn on_content_changed(&self) {
        self.record(Interaction::Edit);
        self.autosave.on_content_changed();
    }

    pub fn on_interaction(&self, kind: Interaction) {
        self.record(kind);
    }

    fn record(&self, kind: Interaction) {
        if let Some(transition) = self.activity.record(kind, self.runtime.now_ms()) {
            self.route(transition);
        }
    }

    pub fn check_idle(&self) {
        if let Some(transition) = self.activity.check(self.runtime.now_ms()) {
            self.route(transition);
        }
    }

    fn route(&self, transition: ActivityTransition) {
        match transition {
            ActivityTransition::BecameIdle => {
                tracing::info!("session idle");
                self.sync.suspend();
                self.ui.on_idle_changed(true);
            }
            ActivityTransition::Woke => {
                tracing::info!("session awake");
                self.ui.on_idle_changed(false);
                self.sync.resume();
            }
        }
    }

    /// Save title/visibility edits of the open note.
    pub fn update_metadata(&self, patch: NotePatch) -> Option<SaveOutcome> {
        let note_id = self.selection.current_id()?;
        Some(self.saves.save(&note_id, patch, SaveMode::IfChanged))
    }

    /// Save the open note now; used when the page is being hidden.
    pub fn flush_now(&self) -> Option<SaveOutcome> {
        self.autosave.flush()
    }

    /// Flush, stop every timer and forget all notes.
    pub async fn logout(&self) {
        self.supersede_selection();
        let previous = self.close_current();
        self.autosave.cancel_all();
        self.sync.cancel_all();
        if let Some(id) = self.idle_timer.take() {
            self.runtime.clear_timer(id);
        }
        self.ui.on_note_cleared();

        if let Some(previous) = previous {
            self.saves.flushed(&previous).await;
        }
        self.saves.reset();
        self.selection.reset();
        self.sync.reset_index();
        self.ui.on_index_changed(&[]);
        tracing::info!("signed out; sync state cleared");
    }

    pub fn current_note(&self) -> Option<Note> {
        self.selection.snapshot()
    }

    pub fn index(&self) -> Vec<NoteSummary> {
        self.sync.index()
    }

    pub fn is_idle(&self) -> bool {
        self.activity.is_idle()
    }

    pub fn is_typing(&self) -> bool {
        self.autosave.is_typing()
    }

    pub fn has_pending_save(&self) -> bool {
        self.autosave.has_pending()
    }

    pub fn is_saving(&self, note_id: &str) -> bool {
        self.saves.is_busy(note_id)
    }

    pub fn last_known(&self, note_id: &str) -> Option<Fingerprint> {
        self.selection.last_known(note_id)
    }

    pub fn unsaved(&self, note_id: &str) -> Option<NotePatch> {
        self.saves.unsaved(note_id).map(|u| u.patch)
    }

    pub fn conflict_open(&self) -> bool {
        self.sync.conflict_open()
    }

    pub fn polling_suspended(&self) -> bool {
        self.sync.is_suspended()
    }
}
