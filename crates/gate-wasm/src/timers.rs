//! `Timers` over `window.setTimeout` / `setInterval`.

use std::collections::BTreeMap;

use answer_gate::dom::{TimerId, Timers};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::Window;

use crate::host::{Host, HostCall};

struct Scheduled {
    handle: i32,
    interval: bool,
    callback: Closure<dyn FnMut()>,
}

pub struct WebTimers {
    host: Host,
    window: Window,
    next_id: u32,
    active: BTreeMap<TimerId, Scheduled>,
    /// Callbacks that may still be on the JS stack; dropped when the next
    /// timer callback starts
    retired: Vec<Closure<dyn FnMut()>>,
}

impl WebTimers {
    pub fn new(host: Host, window: Window) -> Self {
        Self {
            host,
            window,
            next_id: 0,
            active: BTreeMap::new(),
            retired: Vec::new(),
        }
    }

    /// Release retired callbacks. Only call at the start of a drain, with the
    /// controller borrowed: none of them can be on the stack then.
    pub fn purge_retired(&mut self) {
        self.retired.clear();
    }

    /// A one-shot timer ran; its callback can be released.
    pub fn fired(&mut self, id: TimerId) {
        if self.active.get(&id).is_some_and(|s| !s.interval) {
            if let Some(scheduled) = self.active.remove(&id) {
                self.retired.push(scheduled.callback);
            }
        }
    }

    fn schedule(&mut self, ms: u32, interval: bool) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        let host = self.host.clone();
        let callback = Closure::<dyn FnMut()>::new(move || host.deliver(HostCall::Timer(id)));

        let function = callback.as_ref().unchecked_ref();
        let timeout = i32::try_from(ms).unwrap_or(i32::MAX);
        let handle = if interval {
            self.window
                .set_interval_with_callback_and_timeout_and_arguments_0(function, timeout)
        } else {
            self.window
                .set_timeout_with_callback_and_timeout_and_arguments_0(function, timeout)
        };

        match handle {
            Ok(handle) => {
                self.active.insert(
                    id,
                    Scheduled {
                        handle,
                        interval,
                        callback,
                    },
                );
            }
            Err(e) => tracing::warn!("Failed to schedule timer: {:?}", e),
        }
        id
    }
}

impl Timers for WebTimers {
    fn now_ms(&self) -> u64 {
        self.window
            .performance()
            .map(|p| p.now().max(0.0) as u64)
            .unwrap_or_default()
    }

    fn set_timeout(&mut self, delay_ms: u32) -> TimerId {
        self.schedule(delay_ms, false)
    }

    fn set_interval(&mut self, period_ms: u32) -> TimerId {
        self.schedule(period_ms, true)
    }

    fn clear(&mut self, id: TimerId) {
        let Some(scheduled) = self.active.remove(&id) else {
            return;
        };
        if scheduled.interval {
            self.window.clear_interval_with_handle(scheduled.handle);
        } else {
            self.window.clear_timeout_with_handle(scheduled.handle);
        }
        self.retired.push(scheduled.callback);
    }
}
