//! Deterministic doubles for driving the engine in tests.

use super::{
    ConflictChoice, DocumentStore, Editor, SaveState, SyncEngine, SyncError, SyncOp, SyncUi,
};
use crate::api::{ApiError, ApiResult};
use crate::config::SyncConfig;
use crate::models::{Note, NotePatch, NoteSummary};
use crate::platform::{Runtime, TimerId};
use async_trait::async_trait;
use futures::channel::oneshot;
use futures::executor::{LocalPool, LocalSpawner};
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

enum Timer {
    Once(Box<dyn FnOnce()>),
    Repeat {
        period: u32,
        callback: Rc<RefCell<Box<dyn FnMut()>>>,
    },
}

/// Virtual clock plus a local executor. Time only moves in [`advance`](Self::advance).
pub struct ManualRuntime {
    now: Cell<i64>,
    next_id: Cell<i64>,
    /// Keyed by (due, id) so equal deadlines fire in creation order.
    timers: RefCell<BTreeMap<(i64, i64), Timer>>,
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
}

impl ManualRuntime {
    pub fn new() -> Rc<Self> {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Rc::new(Self {
            now: Cell::new(0),
            next_id: Cell::new(1),
            timers: RefCell::new(BTreeMap::new()),
            pool: RefCell::new(pool),
            spawner,
        })
    }

    fn schedule(&self, due: i64, id: i64, timer: Timer) {
        self.timers.borrow_mut().insert((due, id), timer);
    }

    /// Run spawned tasks until none can make progress.
    pub fn run_until_stalled(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }

    /// Move the clock forward by `ms`, firing every timer that falls due.
    pub fn advance(&self, ms: i64) {
        let target = self.now.get() + ms;
        self.run_until_stalled();
        loop {
            let next = self
                .timers
                .borrow()
                .keys()
                .next()
                .copied()
                .filter(|(due, _)| *due <= target);
            let Some(key) = next else {
                break;
            };
            let timer = self
                .timers
                .borrow_mut()
                .remove(&key)
                .expect("timer key was just read");
            let (due, id) = key;
            self.now.set(due);
            match timer {
                Timer::Once(callback) => callback(),
                Timer::Repeat { period, callback } => {
                    self.schedule(
                        due + i64::from(period),
                        id,
                        Timer::Repeat {
                            period,
                            callback: callback.clone(),
                        },
                    );
                    let mut callback = callback.borrow_mut();
                    (&mut **callback)();
                }
            }
            self.run_until_stalled();
        }
        self.now.set(target);
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }
}

impl Runtime for ManualRuntime {
    fn now_ms(&self) -> i64 {
        self.now.get()
    }

    fn set_timeout(&self, delay_ms: u32, callback: Box<dyn FnOnce()>) -> TimerId {
        let id = self.next_id.replace(self.next_id.get() + 1);
        self.schedule(
            self.now.get() + i64::from(delay_ms),
            id,
            Timer::Once(callback),
        );
        TimerId(id)
    }

    fn set_interval(&self, period_ms: u32, callback: Box<dyn FnMut()>) -> TimerId {
        let id = self.next_id.replace(self.next_id.get() + 1);
        self.schedule(
            self.now.get() + i64::from(period_ms),
            id,
            Timer::Repeat {
                period: period_ms.max(1),
                callback: Rc::new(RefCell::new(callback)),
            },
        );
        TimerId(id)
    }

    fn clear_timer(&self, id: TimerId) {
        self.timers.borrow_mut().retain(|(_, tid), _| *tid != id.0);
    }

    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
        self.spawner
            .spawn_local(task)
            .expect("local pool accepts tasks");
    }
}

/// In-memory store with controllable latency and failures.
///
/// Fetches snapshot the note when the request is made; saves are applied
/// when the (possibly held) request is released.
#[derive(Default)]
pub struct MockStore {
    notes: RefCell<HashMap<String, Note>>,
    order: RefCell<Vec<String>>,
    save_log: RefCell<Vec<(String, NotePatch)>>,
    fetches: Cell<usize>,
    index_fetches: Cell<usize>,
    modified: Cell<i64>,
    hold_saves: Cell<bool>,
    held_saves: RefCell<Vec<oneshot::Sender<()>>>,
    hold_fetches: Cell<bool>,
    held_fetches: RefCell<Vec<oneshot::Sender<()>>>,
    hold_index: Cell<bool>,
    held_index: RefCell<Vec<oneshot::Sender<()>>>,
    failing_saves: Cell<usize>,
    fail_next_fetch: RefCell<Option<ApiError>>,
    fail_next_index: RefCell<Option<ApiError>>,
}

impl MockStore {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    fn tick(&self) -> i64 {
        let modified = self.modified.get() + 1;
        self.modified.set(modified);
        modified
    }

    pub fn put(&self, id: &str, content: &str) {
        let note = Note {
            id: id.to_string(),
            title: id.to_uppercase(),
            content: content.to_string(),
            modified: self.tick(),
            ..Default::default()
        };
        if self.notes.borrow_mut().insert(id.to_string(), note).is_none() {
            self.order.borrow_mut().push(id.to_string());
        }
    }

    /// Another session changes the note's content.
    pub fn write_remote(&self, id: &str, content: &str) {
        let modified = self.tick();
        if let Some(note) = self.notes.borrow_mut().get_mut(id) {
            note.content = content.to_string();
            note.modified = modified;
        }
    }

    /// Another session renames the note.
    pub fn rename_remote(&self, id: &str, title: &str) {
        let modified = self.tick();
        if let Some(note) = self.notes.borrow_mut().get_mut(id) {
            note.title = title.to_string();
            note.modified = modified;
        }
    }

    pub fn content(&self, id: &str) -> String {
        self.notes
            .borrow()
            .get(id)
            .map(|n| n.content.clone())
            .unwrap_or_default()
    }

    pub fn save_log(&self) -> Vec<(String, NotePatch)> {
        self.save_log.borrow().clone()
    }

    pub fn save_count(&self) -> usize {
        self.save_log.borrow().len()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.get()
    }

    pub fn index_fetch_count(&self) -> usize {
        self.index_fetches.get()
    }

    pub fn hold_saves(&self, hold: bool) {
        self.hold_saves.set(hold);
    }

    pub fn release_saves(&self) {
        for tx in self.held_saves.borrow_mut().drain(..) {
            let _ = tx.send(());
        }
    }

    pub fn hold_fetches(&self, hold: bool) {
        self.hold_fetches.set(hold);
    }

    pub fn release_fetches(&self) {
        for tx in self.held_fetches.borrow_mut().drain(..) {
            let _ = tx.send(());
        }
    }

    pub fn hold_index(&self, hold: bool) {
        self.hold_index.set(hold);
    }

    pub fn release_index(&self) {
        for tx in self.held_index.borrow_mut().drain(..) {
            let _ = tx.send(());
        }
    }

    pub fn fail_saves(&self, count: usize) {
        self.failing_saves.set(count);
    }

    pub fn fail_next_fetch(&self, error: ApiError) {
        *self.fail_next_fetch.borrow_mut() = Some(error);
    }

    pub fn fail_next_index(&self, error: ApiError) {
        *self.fail_next_index.borrow_mut() = Some(error);
    }

    fn hold(
        flag: &Cell<bool>,
        held: &RefCell<Vec<oneshot::Sender<()>>>,
    ) -> Option<oneshot::Receiver<()>> {
        if !flag.get() {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        held.borrow_mut().push(tx);
        Some(rx)
    }
}

fn not_found() -> ApiError {
    ApiError::Http {
        status: 404,
        body: "not found".to_string(),
    }
}

#[async_trait(?Send)]
impl DocumentStore for MockStore {
    async fn fetch_note(&self, note_id: &str) -> ApiResult<Note> {
        self.fetches.set(self.fetches.get() + 1);
        let failure = self.fail_next_fetch.borrow_mut().take();
        let snapshot = self.notes.borrow().get(note_id).cloned();
        if let Some(rx) = Self::hold(&self.hold_fetches, &self.held_fetches) {
            let _ = rx.await;
        }
        if let Some(e) = failure {
            return Err(e);
        }
        snapshot.ok_or_else(not_found)
    }

    async fn save_note(&self, note_id: &str, patch: &NotePatch) -> ApiResult<Note> {
        self.save_log
            .borrow_mut()
            .push((note_id.to_string(), patch.clone()));
        if let Some(rx) = Self::hold(&self.hold_saves, &self.held_saves) {
            let _ = rx.await;
        }
        let failing = self.failing_saves.get();
        if failing > 0 {
            self.failing_saves.set(failing - 1);
            return Err(ApiError::Network("connection reset".to_string()));
        }

        let modified = self.tick();
        let mut notes = self.notes.borrow_mut();
        let note = notes.get_mut(note_id).ok_or_else(not_found)?;
        if let Some(content) = &patch.content {
            note.content = content.clone();
        }
        if let Some(title) = &patch.title {
            note.title = title.clone();
        }
        if let Some(visibility) = patch.visibility {
            note.visibility = visibility;
        }
        if let Some(public_editable) = patch.public_editable {
            note.public_editable = public_editable;
        }
        note.modified = modified;
        Ok(note.clone())
    }

    async fn fetch_note_index(&self) -> ApiResult<Vec<NoteSummary>> {
        self.index_fetches.set(self.index_fetches.get() + 1);
        if let Some(rx) = Self::hold(&self.hold_index, &self.held_index) {
            let _ = rx.await;
        }
        if let Some(e) = self.fail_next_index.borrow_mut().take() {
            return Err(e);
        }
        let notes = self.notes.borrow();
        Ok(self
            .order
            .borrow()
            .iter()
            .filter_map(|id| notes.get(id).map(Note::summary))
            .collect())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UiEvent {
    Selected(String),
    Cleared,
    Idle(bool),
    Typing(String, bool),
    Index(usize),
    Metadata(String),
    Save(String, SaveState),
    Error(SyncOp),
}

/// Editor and UI in one, recording everything the engine tells it.
#[derive(Default)]
pub struct FakeUi {
    content: RefCell<String>,
    events: RefCell<Vec<UiEvent>>,
    conflicts: RefCell<Vec<(String, String)>>,
    choice: Cell<ConflictChoice>,
    hold_prompts: Cell<bool>,
    open_prompts: RefCell<Vec<oneshot::Sender<ConflictChoice>>>,
}

impl FakeUi {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn content(&self) -> String {
        self.content.borrow().clone()
    }

    /// Change the editor without telling the engine.
    pub fn set_raw(&self, content: &str) {
        *self.content.borrow_mut() = content.to_string();
    }

    pub fn choose(&self, choice: ConflictChoice) {
        self.choice.set(choice);
    }

    /// Leave conflict prompts open until [`answer`](Self::answer).
    pub fn hold_prompts(&self, hold: bool) {
        self.hold_prompts.set(hold);
    }

    pub fn answer(&self, choice: ConflictChoice) {
        for tx in self.open_prompts.borrow_mut().drain(..) {
            let _ = tx.send(choice);
        }
    }

    pub fn events(&self) -> Vec<UiEvent> {
        self.events.borrow().clone()
    }

    pub fn clear_events(&self) {
        self.events.borrow_mut().clear();
    }

    /// (local, remote) content of every conflict prompt shown.
    pub fn conflicts(&self) -> Vec<(String, String)> {
        self.conflicts.borrow().clone()
    }

    pub fn errors(&self) -> Vec<SyncOp> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                UiEvent::Error(op) => Some(*op),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: UiEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl Editor for FakeUi {
    fn content(&self) -> String {
        self.content.borrow().clone()
    }

    fn set_content(&self, content: &str) {
        *self.content.borrow_mut() = content.to_string();
    }
}

#[async_trait(?Send)]
impl SyncUi for FakeUi {
    fn on_note_selected(&self, note: &Note) {
        self.push(UiEvent::Selected(note.id.clone()));
    }

    fn on_note_cleared(&self) {
        self.push(UiEvent::Cleared);
    }

    async fn on_conflict_detected(&self, local: &str, remote: &Note) -> ConflictChoice {
        self.conflicts
            .borrow_mut()
            .push((local.to_string(), remote.content.clone()));
        if !self.hold_prompts.get() {
            return self.choice.get();
        }
        let (tx, rx) = oneshot::channel();
        self.open_prompts.borrow_mut().push(tx);
        rx.await.unwrap_or_default()
    }

    fn on_idle_changed(&self, idle: bool) {
        self.push(UiEvent::Idle(idle));
    }

    fn on_typing_changed(&self, note_id: &str, typing: bool) {
        self.push(UiEvent::Typing(note_id.to_string(), typing));
    }

    fn on_index_changed(&self, index: &[NoteSummary]) {
        self.push(UiEvent::Index(index.len()));
    }

    fn on_note_metadata_changed(&self, note: &Note) {
        self.push(UiEvent::Metadata(note.title.clone()));
    }

    fn on_save_state(&self, note_id: &str, state: SaveState) {
        self.push(UiEvent::Save(note_id.to_string(), state));
    }

    fn on_error(&self, error: &SyncError) {
        self.push(UiEvent::Error(error.op));
    }
}

/// One session (engine + UI) over a shared runtime and store.
pub struct Harness {
    pub rt: Rc<ManualRuntime>,
    pub store: Rc<MockStore>,
    pub ui: Rc<FakeUi>,
    pub engine: Rc<SyncEngine>,
}

impl Harness {
    pub fn new(config: SyncConfig, notes: &[(&str, &str)]) -> Self {
        let store = MockStore::new();
        for (id, content) in notes {
            store.put(id, content);
        }
        Self::session(config, ManualRuntime::new(), store)
    }

    pub fn with_notes(notes: &[(&str, &str)]) -> Self {
        Self::new(SyncConfig::default(), notes)
    }

    fn session(config: SyncConfig, rt: Rc<ManualRuntime>, store: Rc<MockStore>) -> Self {
        let ui = FakeUi::new();
        let engine = SyncEngine::new(config, rt.clone(), store.clone(), ui.clone(), ui.clone());
        engine.start();
        rt.run_until_stalled();
        Self {
            rt,
            store,
            ui,
            engine,
        }
    }

    /// A second session sharing this one's clock and store.
    pub fn peer(&self, config: SyncConfig) -> Self {
        Self::session(config, self.rt.clone(), self.store.clone())
    }

    /// Start selecting `id` and run until the selection blocks or finishes.
    pub fn open(&self, id: &str) {
        let engine = self.engine.clone();
        let id = id.to_string();
        self.rt.spawn_local(Box::pin(async move {
            let _ = engine.select_note(&id).await;
        }));
        self.rt.run_until_stalled();
    }

    /// The user types: the editor now holds `text`.
    pub fn type_text(&self, text: &str) {
        self.ui.set_raw(text);
        self.engine.on_content_changed();
    }
}
