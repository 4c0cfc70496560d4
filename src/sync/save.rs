use super::error::{SyncError, SyncOp};
use super::events::{SaveState, SyncUi};
use super::fingerprint::{fingerprint, Fingerprint};
use super::selection::NoteSelection;
use super::store::DocumentStore;
use crate::api::ApiResult;
use crate::models::{Note, NotePatch};
use crate::platform::Runtime;
use futures::channel::oneshot;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::rc::{Rc, Weak};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveMode {
    /// Skip content-only writes whose content the store already has.
    IfChanged,
    /// Always write, e.g. to overwrite a divergent remote copy.
    Always,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Dispatched,
    /// Folded into the follow-up write of a busy note.
    Coalesced,
    Unchanged,
}

/// Merged patch of failed writes for one note.
#[derive(Clone, Debug, PartialEq)]
pub struct UnsavedPatch {
    pub patch: NotePatch,
    /// `last_known` when the latest failure happened: the store copy the
    /// patch was written against.
    pub base: Option<Fingerprint>,
}

#[derive(Default)]
struct SaveSlot {
    /// Content fingerprint of the request on the wire (None for metadata-only).
    in_flight: Option<Option<Fingerprint>>,
    queued: Option<NotePatch>,
    queued_forced: bool,
    waiters: Vec<oneshot::Sender<()>>,
}

/// Serializes writes per note.
///
/// At most one request per note is on the wire; anything submitted meanwhile
/// is merged into a single queued patch that goes out when the current one
/// completes. Requests for different notes are independent.
pub struct SaveCoordinator {
    runtime: Rc<dyn Runtime>,
    store: Rc<dyn DocumentStore>,
    selection: Rc<NoteSelection>,
    ui: Rc<dyn SyncUi>,
    slots: RefCell<HashMap<String, SaveSlot>>,
    /// Patches whose write failed, kept until a later write of that note succeeds.
    unsaved: RefCell<HashMap<String, UnsavedPatch>>,
    dispatched: Cell<u64>,
    weak: Weak<Self>,
}

impl SaveCoordinator {
    pub fn new(
        runtime: Rc<dyn Runtime>,
        store: Rc<dyn DocumentStore>,
        selection: Rc<NoteSelection>,
        ui: Rc<dyn SyncUi>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|weak| Self {
            runtime,
            store,
            selection,
            ui,
            slots: RefCell::new(HashMap::new()),
            unsaved: RefCell::new(HashMap::new()),
            dispatched: Cell::new(0),
            weak: weak.clone(),
        })
    }

    pub fn save(&self, note_id: &str, patch: NotePatch, mode: SaveMode) -> SaveOutcome {
        let content_fp = patch.content.as_deref().map(fingerprint);
        let skippable = mode == SaveMode::IfChanged && patch.is_content_only();

        {
            let mut slots = self.slots.borrow_mut();
            if let Some(slot) = slots.get_mut(note_id) {
                if let Some(in_flight_fp) = slot.in_flight {
                    let queued = match slot.queued.take() {
                        Some(earlier) => earlier.merge(patch),
                        None if skippable && in_flight_fp == content_fp => {
                            tracing::debug!(note_id, "save matches in-flight content; skipped");
                            return SaveOutcome::Unchanged;
                        }
                        None => patch,
                    };
                    slot.queued = Some(queued);
                    slot.queued_forced |= mode == SaveMode::Always;
                    tracing::debug!(note_id, "save coalesced behind in-flight request");
                    return SaveOutcome::Coalesced;
                }
            }
        }

        if skippable && content_fp.is_some() && content_fp == self.selection.last_known(note_id)
        {
            tracing::debug!(note_id, "content unchanged since last sync; save skipped");
            return SaveOutcome::Unchanged;
        }

        self.dispatch(note_id, patch, content_fp);
        SaveOutcome::Dispatched
    }

    fn dispatch(&self, note_id: &str, patch: NotePatch, content_fp: Option<Fingerprint>) {
        let Some(this) = self.weak.upgrade() else {
            return;
        };

        self.slots
            .borrow_mut()
            .entry(note_id.to_string())
            .or_default()
            .in_flight = Some(content_fp);
        self.dispatched.set(self.dispatched.get() + 1);
        tracing::debug!(
            note_id,
            fingerprint = ?content_fp.map(|fp| fp.to_string()),
            "dispatching save"
        );
        self.ui.on_save_state(note_id, SaveState::Saving);

        let id = note_id.to_string();
        self.runtime.spawn_local(Box::pin(async move {
            let result = this.store.save_note(&id, &patch).await;
            this.complete(&id, patch, result);
        }));
    }

    fn complete(&self, note_id: &str, patch: NotePatch, result: ApiResult<Note>) {
        match result {
            Ok(stored) => {
                self.selection
                    .record_saved(note_id, patch.content.as_deref(), &stored);
                if patch.content.is_some() {
                    self.unsaved.borrow_mut().remove(note_id);
                }
                tracing::debug!(note_id, "save completed");
                self.ui.on_save_state(note_id, SaveState::Saved);
            }
            Err(e) => {
                tracing::warn!(note_id, error = %e, "save failed; local content kept");
                let base = self.selection.last_known(note_id);
                {
                    let mut unsaved = self.unsaved.borrow_mut();
                    let merged = match unsaved.remove(note_id) {
                        Some(earlier) => earlier.patch.merge(patch),
                        None => patch,
                    };
                    unsaved.insert(
                        note_id.to_string(),
                        UnsavedPatch {
                            patch: merged,
                            base,
                        },
                    );
                }
                self.ui.on_save_state(note_id, SaveState::Failed);
                self.ui
                    .on_error(&SyncError::new(SyncOp::Save, Some(note_id), e));
            }
        }

        let (queued, forced) = match self.slots.borrow_mut().get_mut(note_id) {
            Some(slot) => {
                slot.in_flight = None;
                (slot.queued.take(), std::mem::take(&mut slot.queued_forced))
            }
            None => (None, false),
        };

        if let Some(patch) = queued {
            let mode = if forced {
                SaveMode::Always
            } else {
                SaveMode::IfChanged
            };
            if self.save(note_id, patch, mode) == SaveOutcome::Dispatched {
                return;
            }
        }

        // Pipeline drained.
        let waiters = self
            .slots
            .borrow_mut()
            .remove(note_id)
            .map(|slot| slot.waiters)
            .unwrap_or_default();
        self.selection.release(note_id);
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }

    /// Resolves once `note_id` has nothing in flight or queued.
    pub fn flushed(&self, note_id: &str) -> impl Future<Output = ()> + 'static {
        let rx = match self.slots.borrow_mut().get_mut(note_id) {
            Some(slot) if slot.in_flight.is_some() => {
                let (tx, rx) = oneshot::channel();
                slot.waiters.push(tx);
                Some(rx)
            }
            _ => None,
        };
        async move {
            if let Some(rx) = rx {
                let _ = rx.await;
            }
        }
    }

    pub fn is_busy(&self, note_id: &str) -> bool {
        self.slots
            .borrow()
            .get(note_id)
            .is_some_and(|slot| slot.in_flight.is_some())
    }

    /// Number of writes dispatched so far; lets pollers detect writes that
    /// happened while their fetch was outstanding.
    pub fn dispatch_count(&self) -> u64 {
        self.dispatched.get()
    }

    /// The merged patch of failed writes for `note_id`, if any.
    pub fn unsaved(&self, note_id: &str) -> Option<UnsavedPatch> {
        self.unsaved.borrow().get(note_id).cloned()
    }

    /// Drop the failed writes of `note_id`; the remote copy superseded them.
    pub fn forget_unsaved(&self, note_id: &str) {
        if self.unsaved.borrow_mut().remove(note_id).is_some() {
            tracing::debug!(note_id, "unsaved local content discarded");
        }
    }

    /// Drop queued follow-ups and remembered failures. In-flight requests still
    /// complete.
    pub fn reset(&self) {
        for slot in self.slots.borrow_mut().values_mut() {
            slot.queued = None;
            slot.queued_forced = false;
        }
        self.unsaved.borrow_mut().clear();
    }
}
