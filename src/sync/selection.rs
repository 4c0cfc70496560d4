use super::fingerprint::{fingerprint, Fingerprint};
use crate::models::{Note, NoteSummary};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

/// Sync bookkeeping for one note.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncState {
    /// Fingerprint of the content as last fetched or saved.
    pub last_known: Fingerprint,
    /// When the store was last read for this note, epoch ms.
    pub loaded_at: i64,
}

/// Identifies one particular opening of a note.
///
/// Re-opening the same note yields a new token, so work started against the
/// earlier opening can tell it is stale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectionToken {
    pub note_id: String,
    generation: u64,
}

struct OpenNote {
    note: Note,
    sync: SyncState,
}

/// The note currently open in the editor.
///
/// Notes that were switched away from keep their [`SyncState`] in a retired
/// set until their save pipeline drains, so a late save completion still has
/// somewhere to record its fingerprint.
#[derive(Default)]
pub struct NoteSelection {
    current: RefCell<Option<OpenNote>>,
    retired: RefCell<HashMap<String, SyncState>>,
    generation: Cell<u64>,
}

impl NoteSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&self, note: Note, now: i64) -> SelectionToken {
        let generation = self.generation.get() + 1;
        self.generation.set(generation);

        self.retired.borrow_mut().remove(&note.id);
        let token = SelectionToken {
            note_id: note.id.clone(),
            generation,
        };
        let sync = SyncState {
            last_known: fingerprint(&note.content),
            loaded_at: now,
        };
        *self.current.borrow_mut() = Some(OpenNote { note, sync });
        token
    }

    /// Close the open note, keeping its sync state as retired.
    ///
    /// Returns the id of the note that was open.
    pub fn close(&self) -> Option<String> {
        self.generation.set(self.generation.get() + 1);
        let open = self.current.borrow_mut().take()?;
        self.retired
            .borrow_mut()
            .insert(open.note.id.clone(), open.sync);
        Some(open.note.id)
    }

    /// Drop the retired state of `note_id`, if any.
    pub fn release(&self, note_id: &str) {
        self.retired.borrow_mut().remove(note_id);
    }

    /// Forget everything, including retired notes.
    pub fn reset(&self) {
        self.generation.set(self.generation.get() + 1);
        self.current.borrow_mut().take();
        self.retired.borrow_mut().clear();
    }

    pub fn token(&self) -> Option<SelectionToken> {
        self.current.borrow().as_ref().map(|open| SelectionToken {
            note_id: open.note.id.clone(),
            generation: self.generation.get(),
        })
    }

    pub fn is_current(&self, token: &SelectionToken) -> bool {
        token.generation == self.generation.get() && self.is_open(&token.note_id)
    }

    pub fn is_open(&self, note_id: &str) -> bool {
        self.current
            .borrow()
            .as_ref()
            .is_some_and(|open| open.note.id == note_id)
    }

    pub fn current_id(&self) -> Option<String> {
        self.current.borrow().as_ref().map(|open| open.note.id.clone())
    }

    /// Last authoritative snapshot of the open note.
    pub fn snapshot(&self) -> Option<Note> {
        self.current.borrow().as_ref().map(|open| open.note.clone())
    }

    pub fn sync_state(&self, note_id: &str) -> Option<SyncState> {
        if let Some(open) = self.current.borrow().as_ref() {
            if open.note.id == note_id {
                return Some(open.sync);
            }
        }
        self.retired.borrow().get(note_id).copied()
    }

    pub fn last_known(&self, note_id: &str) -> Option<Fingerprint> {
        self.sync_state(note_id).map(|s| s.last_known)
    }

    fn update_sync(&self, note_id: &str, f: impl FnOnce(&mut SyncState)) {
        if let Some(open) = self.current.borrow_mut().as_mut() {
            if open.note.id == note_id {
                f(&mut open.sync);
                return;
            }
        }
        if let Some(state) = self.retired.borrow_mut().get_mut(note_id) {
            f(state);
        }
    }

    /// The store was read and agrees with `last_known`'s new value.
    pub fn record_synced(&self, note_id: &str, last_known: Fingerprint, now: i64) {
        self.update_sync(note_id, |s| {
            s.last_known = last_known;
            s.loaded_at = now;
        });
    }

    /// A write of `content` succeeded; `stored` is the store's answer.
    pub fn record_saved(&self, note_id: &str, content: Option<&str>, stored: &Note) {
        if let Some(content) = content {
            self.update_sync(note_id, |s| s.last_known = fingerprint(content));
        }
        if let Some(open) = self.current.borrow_mut().as_mut() {
            if open.note.id == note_id {
                if let Some(content) = content {
                    open.note.content = content.to_string();
                }
                open.note.merge_metadata(&stored.summary());
                open.note.assets = stored.assets.clone();
            }
        }
    }

    /// Replace the snapshot with `remote` wholesale. Returns false if `remote`
    /// is not the open note.
    pub fn adopt(&self, remote: &Note, now: i64) -> bool {
        let mut current = self.current.borrow_mut();
        let Some(open) = current.as_mut().filter(|open| open.note.id == remote.id) else {
            return false;
        };
        open.note = remote.clone();
        open.sync = SyncState {
            last_known: fingerprint(&remote.content),
            loaded_at: now,
        };
        true
    }

    /// Merge remote metadata into the open note; content is left alone.
    ///
    /// Returns the updated snapshot when something changed.
    pub fn merge_metadata(&self, summary: &NoteSummary) -> Option<Note> {
        let mut current = self.current.borrow_mut();
        let open = current.as_mut().filter(|open| open.note.id == summary.id)?;
        if open.note.merge_metadata(summary) {
            Some(open.note.clone())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: &str, content: &str) -> Note {
        Note {
            id: id.to_string(),
            content: content.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_select_records_fingerprint_and_time() {
        let sel = NoteSelection::new();
        let token = sel.select(note("a", "hello"), 42);
        assert!(sel.is_current(&token));
        let state = sel.sync_state("a").expect("open note has state");
        assert_eq!(state.last_known, fingerprint("hello"));
        assert_eq!(state.loaded_at, 42);
    }

    #[test]
    fn test_reselecting_invalidates_old_token() {
        let sel = NoteSelection::new();
        let first = sel.select(note("a", ""), 0);
        let second = sel.select(note("a", ""), 1);
        assert!(!sel.is_current(&first));
        assert!(sel.is_current(&second));
    }

    #[test]
    fn test_close_retires_until_released() {
        let sel = NoteSelection::new();
        let token = sel.select(note("a", "x"), 0);
        assert_eq!(sel.close().as_deref(), Some("a"));
        assert!(!sel.is_current(&token));
        assert!(sel.current_id().is_none());

        // A late save still lands on the retired state.
        sel.record_saved("a", Some("y"), &note("a", "y"));
        assert_eq!(sel.last_known("a"), Some(fingerprint("y")));

        sel.release("a");
        assert!(sel.last_known("a").is_none());
    }

    #[test]
    fn test_adopt_ignores_other_notes() {
        let sel = NoteSelection::new();
        sel.select(note("a", "x"), 0);
        assert!(!sel.adopt(&note("b", "y"), 5));
        assert!(sel.adopt(&note("a", "z"), 5));
        assert_eq!(sel.snapshot().map(|n| n.content), Some("z".to_string()));
        assert_eq!(sel.sync_state("a").map(|s| s.loaded_at), Some(5));
    }

    #[test]
    fn test_merge_metadata_reports_change_once() {
        let sel = NoteSelection::new();
        sel.select(note("a", "body"), 0);
        let summary = NoteSummary {
            id: "a".to_string(),
            title: "Renamed".to_string(),
            modified: 9,
            ..Default::default()
        };
        let merged = sel.merge_metadata(&summary).expect("title changed");
        assert_eq!(merged.title, "Renamed");
        assert_eq!(merged.content, "body");
        assert!(sel.merge_metadata(&summary).is_none());
    }
}
