use super::activity::ActivityTracker;
use super::autosave::AutosavePolicy;
use super::conflict::{decide, Resolution};
use super::error::{SyncError, SyncOp};
use super::events::{ConflictChoice, Editor, SyncUi};
use super::fingerprint::fingerprint;
use super::save::{SaveCoordinator, SaveMode};
use super::selection::{NoteSelection, SelectionToken};
use super::store::DocumentStore;
use crate::config::SyncConfig;
use crate::models::{Note, NotePatch, NoteSummary};
use crate::platform::{Runtime, TimerId};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Polls the store for remote changes and reconciles them with the editor.
///
/// Two pollers run independently: the list poller keeps the note index fresh,
/// the note poller watches the open note's content. Neither overlaps with
/// itself, and a note poll result is thrown away whenever something happened
/// locally while it was on the wire; the next tick simply fetches again.
pub struct SyncCoordinator {
    runtime: Rc<dyn Runtime>,
    store: Rc<dyn DocumentStore>,
    selection: Rc<NoteSelection>,
    activity: Rc<ActivityTracker>,
    autosave: Rc<AutosavePolicy>,
    saves: Rc<SaveCoordinator>,
    editor: Rc<dyn Editor>,
    ui: Rc<dyn SyncUi>,
    note_poll_ms: u32,
    list_poll_ms: u32,
    recent_edit_window_ms: u32,

    list_timer: Cell<Option<TimerId>>,
    note_timer: Cell<Option<TimerId>>,
    note_poll_in_flight: Cell<bool>,
    index_poll_in_flight: Cell<bool>,
    conflict_open: Cell<bool>,
    suspended: Cell<bool>,
    index: RefCell<Vec<NoteSummary>>,
    /// Bumped by [`reset_index`](SyncCoordinator::reset_index); index polls
    /// issued before a reset are dropped.
    index_epoch: Cell<u64>,
    weak: Weak<Self>,
}

/// What a note poll saw of the world when it was issued.
struct PollTicket {
    token: SelectionToken,
    dispatched: u64,
}

impl SyncCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &SyncConfig,
        runtime: Rc<dyn Runtime>,
        store: Rc<dyn DocumentStore>,
        selection: Rc<NoteSelection>,
        activity: Rc<ActivityTracker>,
        autosave: Rc<AutosavePolicy>,
        saves: Rc<SaveCoordinator>,
        editor: Rc<dyn Editor>,
        ui: Rc<dyn SyncUi>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|weak| Self {
            runtime,
            store,
            selection,
            activity,
            autosave,
            saves,
            editor,
            ui,
            note_poll_ms: config.note_poll_interval_ms,
            list_poll_ms: config.list_poll_interval_ms,
            recent_edit_window_ms: config.recent_edit_window_ms,
            list_timer: Cell::new(None),
            note_timer: Cell::new(None),
            note_poll_in_flight: Cell::new(false),
            index_poll_in_flight: Cell::new(false),
            conflict_open: Cell::new(false),
            suspended: Cell::new(false),
            index: RefCell::new(Vec::new()),
            index_epoch: Cell::new(0),
            weak: weak.clone(),
        })
    }

    pub fn start_list_poller(&self) {
        if self.suspended.get() || self.list_timer.get().is_some() {
            return;
        }
        let weak = self.weak.clone();
        let id = self.runtime.set_interval(
            self.list_poll_ms,
            Box::new(move || {
                if let Some(this) = weak.upgrade() {
                    this.poll_index();
                }
            }),
        );
        self.list_timer.set(Some(id));
    }

    pub fn stop_list_poller(&self) {
        if let Some(id) = self.list_timer.take() {
            self.runtime.clear_timer(id);
        }
    }

    /// (Re)start the note poller for whatever note is open now.
    pub fn start_note_poller(&self) {
        self.stop_note_poller();
        if self.suspended.get() || self.selection.current_id().is_none() {
            return;
        }
        let weak = self.weak.clone();
        let id = self.runtime.set_interval(
            self.note_poll_ms,
            Box::new(move || {
                if let Some(this) = weak.upgrade() {
                    this.poll_note();
                }
            }),
        );
        self.note_timer.set(Some(id));
    }

    pub fn stop_note_poller(&self) {
        if let Some(id) = self.note_timer.take() {
            self.runtime.clear_timer(id);
        }
    }

    /// Stop polling until [`resume`](Self::resume).
    pub fn suspend(&self) {
        self.suspended.set(true);
        self.stop_note_poller();
        self.stop_list_poller();
        tracing::info!("polling suspended");
    }

    /// Resync once right away, then poll on the normal schedule again.
    pub fn resume(&self) {
        if !self.suspended.replace(false) {
            return;
        }
        tracing::info!("polling resumed");
        self.resync_now();
        self.start_list_poller();
        self.start_note_poller();
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.get()
    }

    pub fn resync_now(&self) {
        self.poll_note();
        self.poll_index();
    }

    pub fn cancel_all(&self) {
        self.stop_note_poller();
        self.stop_list_poller();
    }

    pub fn index(&self) -> Vec<NoteSummary> {
        self.index.borrow().clone()
    }

    pub fn reset_index(&self) {
        self.index_epoch.set(self.index_epoch.get() + 1);
        self.index.borrow_mut().clear();
    }

    pub fn conflict_open(&self) -> bool {
        self.conflict_open.get()
    }

    pub fn poll_note(&self) {
        if self.note_poll_in_flight.get() {
            tracing::debug!("note poll already in flight");
            return;
        }
        if self.conflict_open.get() {
            tracing::debug!("conflict prompt open; note poll skipped");
            return;
        }
        let Some(token) = self.selection.token() else {
            return;
        };
        if self.saves.is_busy(&token.note_id) {
            tracing::debug!(note_id = %token.note_id, "save in flight; note poll skipped");
            return;
        }
        let Some(this) = self.weak.upgrade() else {
            return;
        };

        let ticket = PollTicket {
            token,
            dispatched: self.saves.dispatch_count(),
        };
        self.note_poll_in_flight.set(true);
        self.runtime.spawn_local(Box::pin(async move {
            let result = this.store.fetch_note(&ticket.token.note_id).await;
            this.note_poll_in_flight.set(false);
            match result {
                Ok(remote) => this.reconcile(ticket, remote).await,
                Err(e) => {
                    tracing::warn!(note_id = %ticket.token.note_id, error = %e, "note poll failed");
                    this.ui.on_error(&SyncError::new(
                        SyncOp::PollNote,
                        Some(&ticket.token.note_id),
                        e,
                    ));
                }
            }
        }));
    }

    fn is_stale(&self, ticket: &PollTicket) -> bool {
        !self.selection.is_current(&ticket.token)
            || self.saves.is_busy(&ticket.token.note_id)
            || self.saves.dispatch_count() != ticket.dispatched
            || self.conflict_open.get()
    }

    async fn reconcile(&self, ticket: PollTicket, remote: Note) {
        let note_id = ticket.token.note_id.as_str();
        if self.is_stale(&ticket) {
            tracing::debug!(note_id, "local state moved while polling; result discarded");
            return;
        }
        let Some(last_known) = self.selection.last_known(note_id) else {
            return;
        };

        let now = self.runtime.now_ms();
        let remote_fp = fingerprint(&remote.content);
        if remote_fp == last_known {
            self.selection.record_synced(note_id, remote_fp, now);
            self.merge_metadata(&remote.summary());
            return;
        }

        let local = self.editor.content();
        let recent = self
            .activity
            .has_recent_edits(now, self.recent_edit_window_ms);
        match decide(&remote.content, &local, recent) {
            Resolution::InSync => {
                tracing::debug!(note_id, fingerprint = %remote_fp, "remote matches local content");
                self.selection.record_synced(note_id, remote_fp, now);
                self.merge_metadata(&remote.summary());
            }
            Resolution::AdoptRemote => {
                tracing::warn!(
                    note_id,
                    fingerprint = %remote_fp,
                    "remote changed and no recent local edits; adopting without prompt"
                );
                self.adopt_remote(&remote);
            }
            Resolution::AskUser => {
                tracing::info!(note_id, "remote diverged from fresh local edits; asking user");
                self.open_prompt(note_id);
                self.ask_user(ticket.token, local, remote).await;
            }
        }
    }

    /// Mark the prompt open and hold back content saves of `note_id` so no
    /// autosave lands while the user decides.
    fn open_prompt(&self, note_id: &str) {
        self.conflict_open.set(true);
        self.autosave.hold(note_id);
    }

    async fn ask_user(&self, token: SelectionToken, local: String, remote: Note) {
        let note_id = token.note_id.as_str();
        let choice = self.ui.on_conflict_detected(&local, &remote).await;
        self.conflict_open.set(false);
        let Some(hold) = self.autosave.release_hold(note_id) else {
            tracing::debug!(note_id, "conflict answered after sign-out; ignored");
            return;
        };

        let current = self.selection.is_current(&token);
        match choice {
            ConflictChoice::KeepMine => {
                // A note closed during the prompt left its content with the hold.
                let content = if current {
                    Some(self.editor.content())
                } else {
                    hold.flushed_content
                };
                if let Some(content) = content {
                    tracing::info!(note_id, current, "keeping local content");
                    let now = self.runtime.now_ms();
                    self.selection
                        .record_synced(note_id, fingerprint(&remote.content), now);
                    self.saves
                        .save(note_id, NotePatch::content(content), SaveMode::Always);
                }
            }
            ConflictChoice::TakeTheirs => {
                tracing::info!(note_id, current, "taking remote content");
                self.saves.forget_unsaved(note_id);
                if current {
                    self.adopt_remote(&remote);
                }
            }
        }

        // Reopened while the prompt was up: edits made since then still need saving.
        if !current && hold.deferred && self.selection.is_open(note_id) {
            self.autosave.flush();
        }
    }

    /// Content whose write failed earlier was restored over a store copy that
    /// changed since. Let the user decide which one survives.
    pub fn ask_about_unsaved(&self, local: String, remote: Note) {
        let Some(token) = self.selection.token() else {
            return;
        };
        let Some(this) = self.weak.upgrade() else {
            return;
        };
        tracing::info!(note_id = %token.note_id, "unsaved content diverged from the store; asking user");
        self.open_prompt(&token.note_id);
        self.runtime.spawn_local(Box::pin(async move {
            this.ask_user(token, local, remote).await;
        }));
    }

    fn adopt_remote(&self, remote: &Note) {
        if !self.selection.adopt(remote, self.runtime.now_ms()) {
            return;
        }
        self.saves.forget_unsaved(&remote.id);
        self.autosave.replace_editor_content(&remote.content);
        self.ui.on_note_metadata_changed(remote);
    }

    fn merge_metadata(&self, summary: &NoteSummary) {
        if let Some(note) = self.selection.merge_metadata(summary) {
            tracing::debug!(note_id = %note.id, "merged remote metadata");
            self.ui.on_note_metadata_changed(&note);
        }
    }

    pub fn poll_index(&self) {
        if self.index_poll_in_flight.get() {
            tracing::debug!("index poll already in flight");
            return;
        }
        let Some(this) = self.weak.upgrade() else {
            return;
        };

        let dispatched = self.saves.dispatch_count();
        let epoch = self.index_epoch.get();
        self.index_poll_in_flight.set(true);
        self.runtime.spawn_local(Box::pin(async move {
            let result = this.store.fetch_note_index().await;
            this.index_poll_in_flight.set(false);
            if this.index_epoch.get() != epoch {
                tracing::debug!("index reset while polling; result discarded");
                return;
            }
            match result {
                Ok(index) => this.apply_index(index, dispatched),
                Err(e) => {
                    tracing::warn!(error = %e, "index poll failed");
                    this.ui
                        .on_error(&SyncError::new(SyncOp::PollIndex, None, e));
                }
            }
        }));
    }

    fn apply_index(&self, index: Vec<NoteSummary>, dispatched: u64) {
        let changed = {
            let cached = self.index.borrow();
            cached.len() != index.len()
                || cached.iter().zip(&index).any(|(a, b)| !a.same_listing(b))
        };

        // The open note's listing may predate one of our own writes.
        if let Some(note_id) = self.selection.current_id() {
            let settled =
                !self.saves.is_busy(&note_id) && self.saves.dispatch_count() == dispatched;
            if settled {
                if let Some(summary) = index.iter().find(|s| s.id == note_id) {
                    self.merge_metadata(summary);
                }
            }
        }

        if !changed {
            return;
        }
        tracing::debug!(count = index.len(), "note index changed");
        *self.index.borrow_mut() = index.clone();
        self.ui.on_index_changed(&index);
    }
}
