use super::{Runtime, TimerId};
use crate::util::now_ms;
use futures::future::LocalBoxFuture;
use std::cell::RefCell;
use std::collections::HashMap;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;

/// [`Runtime`] backed by the browser window.
#[derive(Default)]
pub struct BrowserRuntime {
    /// Repeating callbacks must stay alive until cleared; one-shot ones own themselves.
    intervals: RefCell<HashMap<i32, Closure<dyn FnMut()>>>,
}

impl BrowserRuntime {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Runtime for BrowserRuntime {
    fn now_ms(&self) -> i64 {
        now_ms()
    }

    fn set_timeout(&self, delay_ms: u32, callback: Box<dyn FnOnce()>) -> TimerId {
        let Some(win) = web_sys::window() else {
            tracing::warn!("no window; timeout dropped");
            return TimerId(0);
        };

        let cb = Closure::once_into_js(move || callback());
        let tid = win
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                cb.as_ref().unchecked_ref(),
                delay_ms.min(i32::MAX as u32) as i32,
            )
            .unwrap_or(0);
        TimerId(i64::from(tid))
    }

    fn set_interval(&self, period_ms: u32, callback: Box<dyn FnMut()>) -> TimerId {
        let Some(win) = web_sys::window() else {
            tracing::warn!("no window; interval dropped");
            return TimerId(0);
        };

        let cb = Closure::wrap(callback);
        let tid = win
            .set_interval_with_callback_and_timeout_and_arguments_0(
                cb.as_ref().unchecked_ref(),
                period_ms.min(i32::MAX as u32) as i32,
            )
            .unwrap_or(0);
        self.intervals.borrow_mut().insert(tid, cb);
        TimerId(i64::from(tid))
    }

    fn clear_timer(&self, id: TimerId) {
        let Ok(tid) = i32::try_from(id.0) else {
            return;
        };
        if tid == 0 {
            return;
        }
        let Some(win) = web_sys::window() else {
            return;
        };

        // Timeouts and intervals share one id pool in browsers.
        win.clear_timeout_with_handle(tid);
        win.clear_interval_with_handle(tid);
        self.intervals.borrow_mut().remove(&tid);
    }

    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
        leptos::task::spawn_local(task);
    }
}
