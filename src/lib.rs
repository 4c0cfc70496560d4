mod api;
mod app;
mod config;
mod models;
mod platform;
mod state;
mod storage;
mod sync;
mod util;

pub use crate::api::{ApiClient, ApiError, ApiResult};
pub use crate::app::App;
pub use crate::config::{EnvConfig, SyncConfig};
pub use crate::models::{Note, NotePatch, NoteSummary, Visibility};
pub use crate::platform::{BrowserRuntime, Runtime, TimerId};
pub use crate::sync::{
    fingerprint, ConflictChoice, DocumentStore, Editor, Fingerprint, Interaction, SaveOutcome,
    SaveState, SyncEngine, SyncError, SyncOp, SyncUi,
};

use leptos::prelude::*;

// Needed for `#[wasm_bindgen(start)]` on the wasm entrypoint.
#[cfg(all(target_arch = "wasm32", not(test)))]
use wasm_bindgen::prelude::wasm_bindgen;

// Only register the WASM start function for normal builds (not for tests),
// otherwise wasm-bindgen-test will end up with multiple entry symbols.
#[cfg_attr(all(target_arch = "wasm32", not(test)), wasm_bindgen(start))]
pub fn main() {
    console_error_panic_hook::set_once();
    #[cfg(target_arch = "wasm32")]
    tracing_wasm::set_as_global_default();
    mount_to_body(App);
}
