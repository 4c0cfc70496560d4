//! Clock and timer substrate the sync engine runs on.
//!
//! Everything is single-threaded: timers and spawned tasks interleave on one
//! execution context, never in parallel. The browser implementation sits on
//! `window.setTimeout`/`setInterval`; tests drive a virtual clock instead.

mod browser;

pub use browser::BrowserRuntime;

use futures::future::LocalBoxFuture;

/// Handle returned by [`Runtime::set_timeout`] and [`Runtime::set_interval`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub i64);

pub trait Runtime {
    /// Current time in epoch milliseconds.
    fn now_ms(&self) -> i64;

    /// Run `callback` once after `delay_ms`.
    fn set_timeout(&self, delay_ms: u32, callback: Box<dyn FnOnce()>) -> TimerId;

    /// Run `callback` every `period_ms` until cleared.
    fn set_interval(&self, period_ms: u32, callback: Box<dyn FnMut()>) -> TimerId;

    /// Cancel a pending timer. Clearing an already fired or unknown id is a no-op.
    fn clear_timer(&self, id: TimerId);

    /// Run `task` on the local executor.
    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>);
}
