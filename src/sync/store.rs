use crate::api::ApiResult;
use crate::models::{Note, NotePatch, NoteSummary};
use async_trait::async_trait;

/// Pull-only access to the authoritative note store.
///
/// There is no push channel; every remote change is discovered by polling.
#[async_trait(?Send)]
pub trait DocumentStore {
    async fn fetch_note(&self, note_id: &str) -> ApiResult<Note>;

    /// Apply `patch` and return the note as stored.
    async fn save_note(&self, note_id: &str, patch: &NotePatch) -> ApiResult<Note>;

    async fn fetch_note_index(&self) -> ApiResult<Vec<NoteSummary>>;
}
