use serde::{Deserialize, Serialize};

/// Timing knobs of the sync engine, all in milliseconds.
///
/// Every field can be overridden on its own; missing fields keep their default.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    /// Quiet period after the last edit before the note is saved.
    pub autosave_debounce_ms: u32,
    /// Quiet period after which "stopped typing" is signalled.
    pub typing_quiet_ms: u32,
    pub note_poll_interval_ms: u32,
    pub list_poll_interval_ms: u32,
    /// No interaction for this long puts the session to sleep.
    pub idle_threshold_ms: u32,
    /// Local edits younger than this are protected by a conflict prompt.
    pub recent_edit_window_ms: u32,
    pub idle_check_interval_ms: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            autosave_debounce_ms: 1_000,
            typing_quiet_ms: 5_000,
            note_poll_interval_ms: 5_000,
            list_poll_interval_ms: 10_000,
            idle_threshold_ms: 3_600_000,
            recent_edit_window_ms: 10_000,
            idle_check_interval_ms: 60_000,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EnvConfig {
    pub api_url: String,
    pub sync: SyncConfig,
}

const DEFAULT_API_URL: &str = "http://localhost:6689";

impl EnvConfig {
    pub fn new() -> Self {
        let mut config = Self {
            api_url: DEFAULT_API_URL.to_string(),
            sync: SyncConfig::default(),
        };

        let Some(env) = web_sys::window()
            .and_then(|w| w.get("ENV"))
            .filter(|env| !env.is_undefined() && env.is_object())
        else {
            return config;
        };

        // We support BOTH `window.ENV.API_URL` and `window.ENV.api_url`.
        for key in ["API_URL", "api_url"] {
            if let Some(url) = js_sys::Reflect::get(&env, &key.into())
                .ok()
                .and_then(|v| v.as_string())
            {
                config.api_url = url;
                break;
            }
        }

        // Optional `window.ENV.SYNC = { autosaveDebounceMs: 500, ... }`.
        if let Some(json) = js_sys::Reflect::get(&env, &"SYNC".into())
            .ok()
            .filter(|v| v.is_object())
            .and_then(|v| js_sys::JSON::stringify(&v).ok())
            .and_then(|s| s.as_string())
        {
            match Self::parse_sync_overrides(&json) {
                Ok(sync) => config.sync = sync,
                Err(e) => tracing::warn!(error = %e, "ignoring malformed ENV.SYNC overrides"),
            }
        }

        config
    }

    pub(crate) fn parse_sync_overrides(json: &str) -> Result<SyncConfig, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new()
    }
}
