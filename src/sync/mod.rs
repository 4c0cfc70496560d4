//! Synchronization and conflict engine.
//!
//! The store is only reachable by request/response, so remote changes are
//! discovered by polling and local edits are pushed by a debounced autosave.
//! [`SyncEngine`] is the facade and the only type the app talks to.

mod activity;
mod autosave;
mod conflict;
mod coordinator;
mod engine;
mod error;
mod events;
mod fingerprint;
mod save;
mod selection;
mod store;

#[cfg(test)]
mod testing;

pub use activity::Interaction;
pub use engine::SyncEngine;
pub use error::{SyncError, SyncOp};
pub use events::{ConflictChoice, Editor, SaveState, SyncUi};
pub use fingerprint::{fingerprint, Fingerprint};
pub use save::SaveOutcome;
pub use store::DocumentStore;
