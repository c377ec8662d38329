//! `QuizDom` over the real document.
//!
//! Display overrides are expressed as a data attribute matched by an
//! injected `!important` stylesheet rule, so the engine's own inline
//! `style.display` writes (jQuery `show()`/`hide()`) can neither clobber the
//! override nor be lost when it is released.

use std::collections::BTreeMap;

use answer_gate::dom::{
    DisplayOverride, EnabledOverride, InputState, MutationKind, MutationRecord, ObserverId, QuizDom,
};
use answer_gate::error::DomError;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    Document, Element, HtmlElement, HtmlInputElement, HtmlTextAreaElement, MutationObserver,
    MutationObserverInit, Window,
};

use crate::host::{Host, HostCall};

const DISPLAY_ATTRIBUTE: &str = "data-answer-gate-display";
const DISABLED_STASH_ATTRIBUTE: &str = "data-answer-gate-disabled";
const STYLE_ELEMENT_ID: &str = "answer-gate-overrides";

/// Rules backing the display override attribute.
pub fn override_css() -> String {
    format!(
        "[{attr}=\"hidden\"]{{display:none!important}}[{attr}=\"shown\"]{{display:revert!important}}",
        attr = DISPLAY_ATTRIBUTE
    )
}

fn display_token(display: DisplayOverride) -> Option<&'static str> {
    match display {
        DisplayOverride::Native => None,
        DisplayOverride::Hidden => Some("hidden"),
        DisplayOverride::Shown => Some("shown"),
    }
}

/// Map a browser `MutationRecord.type` to ours.
pub fn mutation_kind(kind: &str, attribute: Option<String>) -> Option<MutationKind> {
    match kind {
        "childList" => Some(MutationKind::ChildList),
        "attributes" => Some(MutationKind::Attribute(attribute.unwrap_or_default())),
        "characterData" => Some(MutationKind::CharacterData),
        _ => None,
    }
}

fn js_error(op: &'static str, value: JsValue) -> DomError {
    DomError::Operation {
        op,
        message: value.as_string().unwrap_or_else(|| format!("{:?}", value)),
    }
}

type ObserverCallback = Closure<dyn FnMut(js_sys::Array, MutationObserver)>;

pub struct WebDom {
    host: Host,
    window: Window,
    document: Document,
    observers: BTreeMap<ObserverId, (MutationObserver, ObserverCallback)>,
    next_observer: u32,
}

impl WebDom {
    pub fn new(host: Host, window: Window, document: Document) -> Self {
        Self {
            host,
            window,
            document,
            observers: BTreeMap::new(),
            next_observer: 0,
        }
    }

    /// Inject the override stylesheet once per document.
    pub fn ensure_override_styles(&self) -> Result<(), JsValue> {
        if self.document.get_element_by_id(STYLE_ELEMENT_ID).is_some() {
            return Ok(());
        }
        let style = self.document.create_element("style")?;
        style.set_id(STYLE_ELEMENT_ID);
        style.set_text_content(Some(&override_css()));
        let parent: Element = match self.document.head() {
            Some(head) => head.into(),
            None => self
                .document
                .document_element()
                .ok_or_else(|| JsValue::from_str("document has no root element"))?,
        };
        parent.append_child(&style)?;
        Ok(())
    }

    fn writable(&self, node: &Element) -> Result<(), DomError> {
        if node.is_connected() {
            Ok(())
        } else {
            Err(DomError::Detached)
        }
    }
}

fn convert_records(records: &js_sys::Array) -> Vec<MutationRecord<Element>> {
    records
        .iter()
        .filter_map(|value| value.dyn_into::<web_sys::MutationRecord>().ok())
        .filter_map(|record| {
            let kind = mutation_kind(&record.type_(), record.attribute_name())?;
            let target = record.target()?;
            let target = match target.dyn_ref::<Element>() {
                Some(element) => element.clone(),
                None => target.parent_element()?,
            };
            Some(MutationRecord { target, kind })
        })
        .collect()
}

impl QuizDom for WebDom {
    type Node = Element;

    fn query_all(&self, scope: &Element, selector: &str) -> Vec<Element> {
        match scope.query_selector_all(selector) {
            Ok(list) => (0..list.length())
                .filter_map(|i| list.get(i))
                .filter_map(|node| node.dyn_into::<Element>().ok())
                .collect(),
            Err(_) => {
                tracing::warn!("Invalid selector '{}'", selector);
                Vec::new()
            }
        }
    }

    fn matches(&self, node: &Element, selector: &str) -> bool {
        node.matches(selector).unwrap_or(false)
    }

    fn closest(&self, node: &Element, selector: &str) -> Option<Element> {
        node.closest(selector).ok().flatten()
    }

    fn attribute(&self, node: &Element, name: &str) -> Option<String> {
        node.get_attribute(name)
    }

    fn has_class(&self, node: &Element, class: &str) -> bool {
        node.class_list().contains(class)
    }

    fn is_visible(&self, node: &Element) -> bool {
        if !node.is_connected() {
            return false;
        }
        // No client rects: the element or an ancestor is display:none
        if node.get_client_rects().length() == 0 {
            return false;
        }
        match self.window.get_computed_style(node) {
            Ok(Some(style)) => style
                .get_property_value("visibility")
                .map(|v| v != "hidden")
                .unwrap_or(true),
            _ => true,
        }
    }

    fn text(&self, node: &Element) -> String {
        match node.dyn_ref::<HtmlElement>() {
            Some(html) => html.inner_text(),
            None => node.text_content().unwrap_or_default(),
        }
    }

    fn input_state(&self, node: &Element) -> InputState {
        if let Some(input) = node.dyn_ref::<HtmlInputElement>() {
            let kind = input.type_();
            let is_choice = kind == "radio" || kind == "checkbox";
            return InputState {
                is_choice,
                checked: is_choice && input.checked(),
                value: input.value(),
            };
        }
        if let Some(area) = node.dyn_ref::<HtmlTextAreaElement>() {
            return InputState {
                is_choice: false,
                checked: false,
                value: area.value(),
            };
        }
        InputState::default()
    }

    fn is_connected(&self, node: &Element) -> bool {
        node.is_connected()
    }

    fn set_display(&mut self, node: &Element, display: DisplayOverride) -> Result<(), DomError> {
        self.writable(node)?;
        match display_token(display) {
            Some(token) => node
                .set_attribute(DISPLAY_ATTRIBUTE, token)
                .map_err(|e| js_error("set_display", e)),
            None => node
                .remove_attribute(DISPLAY_ATTRIBUTE)
                .map_err(|e| js_error("set_display", e)),
        }
    }

    fn set_enabled(&mut self, node: &Element, enabled: EnabledOverride) -> Result<(), DomError> {
        self.writable(node)?;
        let Some(input) = node.dyn_ref::<HtmlInputElement>() else {
            return Ok(());
        };
        match enabled {
            EnabledOverride::Enabled => {
                if !node.has_attribute(DISABLED_STASH_ATTRIBUTE) {
                    let stash = if input.disabled() { "1" } else { "0" };
                    node.set_attribute(DISABLED_STASH_ATTRIBUTE, stash)
                        .map_err(|e| js_error("set_enabled", e))?;
                }
                input.set_disabled(false);
            }
            EnabledOverride::Native => {
                if let Some(stash) = node.get_attribute(DISABLED_STASH_ATTRIBUTE) {
                    input.set_disabled(stash == "1");
                    node.remove_attribute(DISABLED_STASH_ATTRIBUTE)
                        .map_err(|e| js_error("set_enabled", e))?;
                }
            }
        }
        Ok(())
    }

    fn set_class(&mut self, node: &Element, class: &str, on: bool) -> Result<(), DomError> {
        self.writable(node)?;
        let list = node.class_list();
        let result = if on { list.add_1(class) } else { list.remove_1(class) };
        result.map_err(|e| js_error("set_class", e))
    }

    fn insert_notice(
        &mut self,
        container: &Element,
        class: &str,
        text: &str,
    ) -> Result<Element, DomError> {
        self.writable(container)?;
        let notice = self
            .document
            .create_element("div")
            .map_err(|e| js_error("insert_notice", e))?;
        notice.set_class_name(class);
        notice
            .set_attribute("role", "status")
            .map_err(|e| js_error("insert_notice", e))?;
        notice.set_text_content(Some(text));
        container
            .append_child(&notice)
            .map_err(|e| js_error("insert_notice", e))?;
        Ok(notice)
    }

    fn remove_node(&mut self, node: &Element) -> Result<(), DomError> {
        self.writable(node)?;
        node.remove();
        Ok(())
    }

    fn observe(&mut self, root: &Element) -> Option<ObserverId> {
        self.next_observer += 1;
        let id = ObserverId(self.next_observer);
        let host = self.host.clone();
        let callback: ObserverCallback =
            Closure::new(move |records: js_sys::Array, _observer: MutationObserver| {
                host.deliver(HostCall::Mutations(id, convert_records(&records)));
            });

        let observer = match MutationObserver::new(callback.as_ref().unchecked_ref()) {
            Ok(observer) => observer,
            Err(e) => {
                tracing::warn!("MutationObserver unavailable: {:?}", e);
                return None;
            }
        };
        let init = MutationObserverInit::new();
        init.set_subtree(true);
        init.set_child_list(true);
        init.set_attributes(true);
        init.set_character_data(true);
        if let Err(e) = observer.observe_with_options(root, &init) {
            tracing::warn!("Failed to observe quiz root: {:?}", e);
            return None;
        }

        self.observers.insert(id, (observer, callback));
        Some(id)
    }

    fn disconnect(&mut self, observer: ObserverId) {
        if let Some((observer, _callback)) = self.observers.remove(&observer) {
            observer.disconnect();
        }
    }
}
