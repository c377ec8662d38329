//! WASM binding for the answer gate.
//!
//! Attaches the controller to a live wpProQuiz page: forwards clicks and
//! changes (capture phase, ahead of the engine's handlers), mutation batches
//! and timers, and re-dispatches gate events as `answer-gate:*` DOM events.

mod dom;
mod host;
mod logging;
mod timers;

use std::cell::RefCell;
use std::rc::Rc;

use answer_gate::config::GateConfig;
use answer_gate::controller::{AnswerGateController, Disposition, Handle, UserEvent};
use answer_gate::events::{GateEvent, Notice, Notifier};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CustomEvent, CustomEventInit, Document, Element, Event, Window};

pub use dom::WebDom;
use host::{Host, HostCall};
pub use timers::WebTimers;

#[cfg(feature = "console_error_panic_hook")]
pub use console_error_panic_hook::set_once as set_panic_hook;

pub(crate) type Gate = AnswerGateController<WebDom, WebTimers>;

/// Page events the gate listens to on the quiz root.
const LISTENED_EVENTS: [&str; 3] = ["click", "change", "input"];

/// Dispatched (cancelable) for every notice; unhandled notices fall back to
/// `window.alert`.
const NOTICE_EVENT: &str = "answer-gate:notice";

// ============================================================================
// DOM events
// ============================================================================

fn to_js(value: &impl serde::Serialize) -> JsValue {
    serde_json::to_string(value)
        .ok()
        .and_then(|json| js_sys::JSON::parse(&json).ok())
        .unwrap_or(JsValue::NULL)
}

/// Fire a bubbling CustomEvent on `target`. Returns false if a listener
/// called `preventDefault()`.
fn dispatch(target: &Element, name: &str, detail: &JsValue, cancelable: bool) -> bool {
    let init = CustomEventInit::new();
    init.set_bubbles(true);
    init.set_cancelable(cancelable);
    init.set_detail(detail);
    match CustomEvent::new_with_event_init_dict(name, &init) {
        Ok(event) => target.dispatch_event(&event).unwrap_or(true),
        Err(e) => {
            tracing::warn!("Failed to create {} event: {:?}", name, e);
            true
        }
    }
}

fn dispatch_gate_event(root: &Element, event: &GateEvent) {
    dispatch(root, event.dom_name(), &to_js(event), false);
}

struct WebNotifier {
    root: Element,
    window: Window,
}

impl Notifier for WebNotifier {
    fn notify(&mut self, notice: &Notice) {
        if dispatch(&self.root, NOTICE_EVENT, &to_js(notice), true) {
            if let Err(e) = self.window.alert_with_message(&notice.message) {
                tracing::warn!("Failed to show notice: {:?}", e);
            }
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

fn config_from_meta(document: &Document) -> GateConfig {
    let tags: Vec<(String, String)> = document
        .query_selector_all("meta[name][content]")
        .map(|list| {
            (0..list.length())
                .filter_map(|i| list.get(i))
                .filter_map(|node| node.dyn_into::<Element>().ok())
                .filter_map(|meta| Some((meta.get_attribute("name")?, meta.get_attribute("content")?)))
                .collect()
        })
        .unwrap_or_default();
    GateConfig::from_meta_tags(tags)
}

/// Settings blob if given, otherwise `answer-gate:*` meta tags.
fn resolve_config(document: &Document, settings_json: Option<String>) -> Result<GateConfig, JsValue> {
    match settings_json.filter(|s| !s.trim().is_empty()) {
        Some(json) => GateConfig::from_settings_json(&json).map_err(|e| JsValue::from_str(&e.to_string())),
        None => Ok(config_from_meta(document)),
    }
}

// ============================================================================
// Listeners
// ============================================================================

struct Listener {
    kind: &'static str,
    callback: Closure<dyn FnMut(Event)>,
}

fn install_listeners(root: &Element, host: &Host) -> Result<Vec<Listener>, JsValue> {
    let mut listeners = Vec::with_capacity(LISTENED_EVENTS.len());
    for kind in LISTENED_EVENTS {
        let host = host.clone();
        let callback = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            let Some(target) = event.target().and_then(|t| t.dyn_into::<Element>().ok()) else {
                return;
            };
            let user_event = if kind == "click" {
                UserEvent::Click(target)
            } else {
                UserEvent::Change(target)
            };
            if host.with_gate(|gate| gate.on_user_event(user_event)) == Some(Disposition::Block) {
                event.prevent_default();
                event.stop_immediate_propagation();
            }
        });
        root.add_event_listener_with_callback_and_bool(kind, callback.as_ref().unchecked_ref(), true)?;
        listeners.push(Listener { kind, callback });
    }
    Ok(listeners)
}

// ============================================================================
// WASM Exports
// ============================================================================

/// Initialize panic hook and console logging
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    set_panic_hook();
    logging::init();
}

/// One attached gate. Call `detach()` to hand the quiz back to the engine.
#[wasm_bindgen]
pub struct AnswerGate {
    inner: Rc<RefCell<Gate>>,
    host: Host,
    handle: Handle,
    root: Element,
    listeners: Vec<Listener>,
    detached: bool,
}

#[wasm_bindgen]
impl AnswerGate {
    /// Attach to the quiz container `root`.
    ///
    /// `settings_json` is the localized settings blob; when absent the
    /// `answer-gate:*` meta tags are used.
    #[wasm_bindgen(constructor)]
    pub fn new(root: Element, settings_json: Option<String>) -> Result<AnswerGate, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("no document"))?;
        let config = resolve_config(&document, settings_json)?;

        let host = Host::default();
        let dom = WebDom::new(host.clone(), window.clone(), document);
        dom.ensure_override_styles()?;
        let timers = WebTimers::new(host.clone(), window.clone());

        let mut gate = AnswerGateController::new(dom, timers);
        gate.set_notifier(WebNotifier {
            root: root.clone(),
            window,
        });
        {
            let root = root.clone();
            gate.subscribe(move |event| dispatch_gate_event(&root, event));
        }

        let inner = Rc::new(RefCell::new(gate));
        host.bind(&inner);
        let handle = host
            .with_gate(|gate| gate.attach(root.clone(), config))
            .ok_or_else(|| JsValue::from_str("answer gate busy"))?;
        let listeners = install_listeners(&root, &host)?;

        Ok(AnswerGate {
            inner,
            host,
            handle,
            root,
            listeners,
            detached: false,
        })
    }

    /// Stop gating and restore the engine's native presentation.
    pub fn detach(&mut self) {
        self.teardown();
    }

    /// Re-scan the quiz now, e.g. after the page swapped question markup
    /// in a way the observer cannot see.
    pub fn rescan(&self) {
        let handle = self.handle;
        self.host.with_gate(|gate| gate.rescan(handle));
    }

    /// Question states as a JS array.
    pub fn questions(&self) -> JsValue {
        match self.inner.try_borrow() {
            Ok(gate) => to_js(&gate.questions(self.handle)),
            Err(_) => JsValue::NULL,
        }
    }

    /// Recorded diagnostics as a JS array.
    pub fn diagnostics(&self) -> JsValue {
        match self.inner.try_borrow() {
            Ok(gate) => to_js(&gate.diagnostics().entries()),
            Err(_) => JsValue::NULL,
        }
    }

    /// Current attachment mode: "idle", "observing", "polling", "degraded"
    /// or "detached".
    pub fn mode(&self) -> String {
        let mode = self
            .inner
            .try_borrow()
            .ok()
            .and_then(|gate| gate.mode(self.handle));
        mode_name(mode).to_string()
    }
}

impl AnswerGate {
    /// Remove the page listeners and detach. Idempotent; a detach that finds
    /// the controller busy is queued for the current borrower.
    fn teardown(&mut self) {
        // Busy means we may be inside one of our own listeners
        let busy = self.inner.try_borrow_mut().is_err();
        for listener in self.listeners.drain(..) {
            let removed = self.root.remove_event_listener_with_callback_and_bool(
                listener.kind,
                listener.callback.as_ref().unchecked_ref(),
                true,
            );
            if let Err(e) = removed {
                tracing::warn!("Failed to remove {} listener: {:?}", listener.kind, e);
            }
            if busy {
                listener.callback.forget();
            }
        }
        if self.detached {
            return;
        }
        self.detached = true;
        let handle = self.handle;
        if self.host.with_gate(|gate| gate.detach(handle)).is_none() {
            self.host.deliver(HostCall::Detach(handle));
        }
    }
}

impl Drop for AnswerGate {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn mode_name(mode: Option<answer_gate::controller::AttachMode>) -> &'static str {
    use answer_gate::controller::AttachMode;
    match mode {
        Some(AttachMode::Idle) => "idle",
        Some(AttachMode::Observing(_)) => "observing",
        Some(AttachMode::Polling(_)) => "polling",
        Some(AttachMode::Degraded) => "degraded",
        None => "detached",
    }
}

// ============================================================================
// Tests
// ============================================================================
