//! In-memory document implementing `QuizDom`.
//!
//! Models just enough of a browser page for the gate: an element tree with
//! classes and attributes, stylesheet-hidden defaults, engine inline display
//! (jQuery `show()`/`hide()`), the gate's `!important` display override, and
//! subtree mutation records delivered per observer.

use std::collections::BTreeMap;

use crate::dom::{
  DisplayOverride, EnabledOverride, InputState, MutationKind, MutationRecord, ObserverId, QuizDom,
};
use crate::error::DomError;
use crate::selectors::{parse_selector_list, Compound};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Default)]
struct Element {
  tag: String,
  classes: Vec<String>,
  attributes: BTreeMap<String, String>,
  text: String,
  parent: Option<NodeId>,
  children: Vec<NodeId>,
  hidden_by_stylesheet: bool,
  /// Engine inline `display`, `None` when unset
  inline_shown: Option<bool>,
  display_override: DisplayOverride,
  disabled: bool,
  /// Engine `disabled` value saved while the gate forces the input enabled
  stashed_disabled: Option<bool>,
  checked: bool,
  value: String,
}

#[derive(Debug)]
struct Observer {
  root: NodeId,
  records: Vec<MutationRecord<NodeId>>,
}

#[derive(Debug)]
pub struct MemoryDom {
  elements: Vec<Element>,
  body: NodeId,
  observers: BTreeMap<ObserverId, Observer>,
  next_observer: u32,
  observation_supported: bool,
  fail_writes: bool,
}

impl Default for MemoryDom {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryDom {
  pub fn new() -> Self {
    Self {
      elements: vec![Element {
        tag: "body".into(),
        ..Element::default()
      }],
      body: NodeId(0),
      observers: BTreeMap::new(),
      next_observer: 1,
      observation_supported: true,
      fail_writes: false,
    }
  }

  pub fn body(&self) -> NodeId {
    self.body
  }

  /// Pretend the host has no `MutationObserver`.
  pub fn set_observation_supported(&mut self, supported: bool) {
    self.observation_supported = supported;
  }

  /// Make every gate write fail, as a locked-down or torn-down page would.
  pub fn set_fail_writes(&mut self, fail: bool) {
    self.fail_writes = fail;
  }

  fn el(&self, node: NodeId) -> &Element {
    &self.elements[node.0]
  }

  fn el_mut(&mut self, node: NodeId) -> &mut Element {
    &mut self.elements[node.0]
  }

  // ==================== Page construction and engine-side changes ====================

  /// Create an element under `parent`.
  pub fn element(&mut self, parent: NodeId, tag: &str, classes: &[&str]) -> NodeId {
    let node = NodeId(self.elements.len());
    self.elements.push(Element {
      tag: tag.to_ascii_lowercase(),
      classes: classes.iter().map(|c| c.to_string()).collect(),
      parent: Some(parent),
      ..Element::default()
    });
    self.el_mut(parent).children.push(node);
    self.push_record(parent, MutationKind::ChildList);
    node
  }

  pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
    match name {
      "value" => self.el_mut(node).value = value.to_string(),
      "class" => {
        self.el_mut(node).classes = value.split_whitespace().map(str::to_string).collect();
      }
      _ => {
        self
          .el_mut(node)
          .attributes
          .insert(name.to_string(), value.to_string());
      }
    }
    self.push_record(node, MutationKind::Attribute(name.to_string()));
  }

  pub fn add_class(&mut self, node: NodeId, class: &str) {
    if !self.el(node).classes.iter().any(|c| c == class) {
      self.el_mut(node).classes.push(class.to_string());
      self.push_record(node, MutationKind::Attribute("class".into()));
    }
  }

  pub fn remove_class(&mut self, node: NodeId, class: &str) {
    let before = self.el(node).classes.len();
    self.el_mut(node).classes.retain(|c| c != class);
    if self.el(node).classes.len() != before {
      self.push_record(node, MutationKind::Attribute("class".into()));
    }
  }

  pub fn set_text(&mut self, node: NodeId, text: &str) {
    self.el_mut(node).text = text.to_string();
    self.push_record(node, MutationKind::CharacterData);
  }

  /// Stylesheet default, set while building a page; produces no record.
  pub fn set_hidden_by_stylesheet(&mut self, node: NodeId, hidden: bool) {
    self.el_mut(node).hidden_by_stylesheet = hidden;
  }

  /// Engine inline display (`show()` / `hide()`).
  pub fn set_inline_shown(&mut self, node: NodeId, shown: bool) {
    self.el_mut(node).inline_shown = Some(shown);
    self.push_record(node, MutationKind::Attribute("style".into()));
  }

  pub fn set_checked(&mut self, node: NodeId, checked: bool) {
    if self.el(node).checked != checked {
      self.el_mut(node).checked = checked;
      self.push_record(node, MutationKind::Attribute("checked".into()));
    }
  }

  pub fn set_disabled(&mut self, node: NodeId, disabled: bool) {
    self.el_mut(node).disabled = disabled;
    self.push_record(node, MutationKind::Attribute("disabled".into()));
  }

  /// Detach `node` from its parent, as an engine re-render would.
  pub fn detach(&mut self, node: NodeId) {
    if let Some(parent) = self.el_mut(node).parent.take() {
      self.el_mut(parent).children.retain(|c| *c != node);
      self.push_record(parent, MutationKind::ChildList);
    }
  }

  // ==================== Inspection ====================

  pub fn display_override(&self, node: NodeId) -> DisplayOverride {
    self.el(node).display_override
  }

  pub fn is_disabled(&self, node: NodeId) -> bool {
    self.el(node).disabled
  }

  pub fn children(&self, node: NodeId) -> &[NodeId] {
    &self.el(node).children
  }

  /// Drain the records queued for `observer`.
  pub fn take_records(&mut self, observer: ObserverId) -> Vec<MutationRecord<NodeId>> {
    self
      .observers
      .get_mut(&observer)
      .map(|o| std::mem::take(&mut o.records))
      .unwrap_or_default()
  }

  /// Serialize a subtree, for replay reports.
  pub fn outer_html(&self, node: NodeId) -> String {
    let mut out = String::new();
    self.write_html(node, &mut out);
    out
  }

  fn write_html(&self, node: NodeId, out: &mut String) {
    let el = self.el(node);
    out.push('<');
    out.push_str(&el.tag);
    if !el.classes.is_empty() {
      out.push_str(" class=\"");
      out.push_str(&html_escape::encode_double_quoted_attribute(&el.classes.join(" ")));
      out.push('"');
    }
    for (name, value) in &el.attributes {
      out.push(' ');
      out.push_str(name);
      out.push_str("=\"");
      out.push_str(&html_escape::encode_double_quoted_attribute(value));
      out.push('"');
    }
    if !el.value.is_empty() {
      out.push_str(" value=\"");
      out.push_str(&html_escape::encode_double_quoted_attribute(&el.value));
      out.push('"');
    }
    if el.checked {
      out.push_str(" checked");
    }
    if el.disabled {
      out.push_str(" disabled");
    }
    if !self.visible_self(node) {
      out.push_str(" hidden");
    }
    out.push('>');
    out.push_str(&html_escape::encode_text(&el.text));
    for child in &el.children {
      self.write_html(*child, out);
    }
    out.push_str("</");
    out.push_str(&el.tag);
    out.push('>');
  }

  // ==================== Internals ====================

  fn inclusive_ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
    std::iter::successors(Some(node), move |n| self.el(*n).parent)
  }

  fn push_record(&mut self, target: NodeId, kind: MutationKind) {
    let ancestors: Vec<NodeId> = self.inclusive_ancestors(target).collect();
    for observer in self.observers.values_mut() {
      if ancestors.contains(&observer.root) {
        observer.records.push(MutationRecord {
          target,
          kind: kind.clone(),
        });
      }
    }
  }

  fn visible_self(&self, node: NodeId) -> bool {
    let el = self.el(node);
    match el.display_override {
      DisplayOverride::Hidden => false,
      DisplayOverride::Shown => true,
      DisplayOverride::Native => el.inline_shown.unwrap_or(!el.hidden_by_stylesheet),
    }
  }

  fn matches_compound(&self, node: NodeId, compound: &Compound) -> bool {
    let el = self.el(node);
    if compound.tag.as_ref().is_some_and(|tag| *tag != el.tag) {
      return false;
    }
    if !compound
      .classes
      .iter()
      .all(|class| el.classes.iter().any(|c| c == class))
    {
      return false;
    }
    compound
      .attributes
      .iter()
      .all(|(name, want)| match (self.attribute(&node, name), want) {
        (Some(have), Some(want)) => have == *want,
        (Some(_), None) => true,
        (None, _) => false,
      })
  }

  fn matches_list(&self, node: NodeId, list: &[Compound]) -> bool {
    list.iter().any(|compound| self.matches_compound(node, compound))
  }

  fn collect_matches(&self, scope: NodeId, list: &[Compound], out: &mut Vec<NodeId>) {
    for child in &self.el(scope).children {
      if self.matches_list(*child, list) {
        out.push(*child);
      }
      self.collect_matches(*child, list, out);
    }
  }

  fn collect_text(&self, node: NodeId, parts: &mut Vec<String>) {
    if !self.visible_self(node) {
      return;
    }
    let text = self.el(node).text.trim();
    if !text.is_empty() {
      parts.push(text.to_string());
    }
    for child in &self.el(node).children {
      self.collect_text(*child, parts);
    }
  }

  fn check_writable(&self, node: NodeId, op: &'static str) -> Result<(), DomError> {
    if self.fail_writes {
      return Err(DomError::Operation {
        op,
        message: "write rejected by page".into(),
      });
    }
    if !self.is_connected(&node) {
      return Err(DomError::Detached);
    }
    Ok(())
  }
}

impl QuizDom for MemoryDom {
  type Node = NodeId;

  fn query_all(&self, scope: &NodeId, selector: &str) -> Vec<NodeId> {
    let Some(list) = parse_selector_list(selector) else {
      tracing::debug!("Unsupported selector '{}' matches nothing", selector);
      return Vec::new();
    };
    let mut out = Vec::new();
    self.collect_matches(*scope, &list, &mut out);
    out
  }

  fn matches(&self, node: &NodeId, selector: &str) -> bool {
    parse_selector_list(selector).is_some_and(|list| self.matches_list(*node, &list))
  }

  fn closest(&self, node: &NodeId, selector: &str) -> Option<NodeId> {
    let list = parse_selector_list(selector)?;
    self
      .inclusive_ancestors(*node)
      .find(|n| self.matches_list(*n, &list))
  }

  fn attribute(&self, node: &NodeId, name: &str) -> Option<String> {
    let el = self.el(*node);
    match name {
      "class" => (!el.classes.is_empty()).then(|| el.classes.join(" ")),
      "value" => Some(el.value.clone()),
      _ => el.attributes.get(name).cloned(),
    }
  }

  fn has_class(&self, node: &NodeId, class: &str) -> bool {
    self.el(*node).classes.iter().any(|c| c == class)
  }

  fn is_visible(&self, node: &NodeId) -> bool {
    self.is_connected(node) && self.inclusive_ancestors(*node).all(|n| self.visible_self(n))
  }

  fn text(&self, node: &NodeId) -> String {
    if !self.is_visible(node) {
      return String::new();
    }
    let mut parts = Vec::new();
    self.collect_text(*node, &mut parts);
    parts.join(" ")
  }

  fn input_state(&self, node: &NodeId) -> InputState {
    let el = self.el(*node);
    let is_choice = matches!(
      el.attributes.get("type").map(String::as_str),
      Some("radio") | Some("checkbox")
    );
    InputState {
      is_choice,
      checked: el.checked,
      value: el.value.clone(),
    }
  }

  fn is_connected(&self, node: &NodeId) -> bool {
    self.inclusive_ancestors(*node).any(|n| n == self.body)
  }

  fn set_display(&mut self, node: &NodeId, display: DisplayOverride) -> Result<(), DomError> {
    self.check_writable(*node, "set_display")?;
    self.el_mut(*node).display_override = display;
    self.push_record(*node, MutationKind::Attribute("style".into()));
    Ok(())
  }

  fn set_enabled(&mut self, node: &NodeId, enabled: EnabledOverride) -> Result<(), DomError> {
    self.check_writable(*node, "set_enabled")?;
    let el = self.el_mut(*node);
    match enabled {
      EnabledOverride::Enabled => {
        if el.stashed_disabled.is_none() {
          el.stashed_disabled = Some(el.disabled);
        }
        el.disabled = false;
      }
      EnabledOverride::Native => {
        if let Some(disabled) = el.stashed_disabled.take() {
          el.disabled = disabled;
        }
      }
    }
    self.push_record(*node, MutationKind::Attribute("disabled".into()));
    Ok(())
  }

  fn set_class(&mut self, node: &NodeId, class: &str, on: bool) -> Result<(), DomError> {
    self.check_writable(*node, "set_class")?;
    if on {
      self.add_class(*node, class);
    } else {
      self.remove_class(*node, class);
    }
    Ok(())
  }

  fn insert_notice(&mut self, container: &NodeId, class: &str, text: &str) -> Result<NodeId, DomError> {
    self.check_writable(*container, "insert_notice")?;
    let node = NodeId(self.elements.len());
    self.elements.push(Element {
      tag: "div".into(),
      classes: vec![class.to_string()],
      text: text.to_string(),
      parent: Some(*container),
      ..Element::default()
    });
    self.el_mut(*container).children.push(node);
    self.push_record(*container, MutationKind::ChildList);
    Ok(node)
  }

  fn remove_node(&mut self, node: &NodeId) -> Result<(), DomError> {
    self.check_writable(*node, "remove_node")?;
    self.detach(*node);
    Ok(())
  }

  fn observe(&mut self, root: &NodeId) -> Option<ObserverId> {
    if !self.observation_supported {
      return None;
    }
    let id = ObserverId(self.next_observer);
    self.next_observer += 1;
    self.observers.insert(
      id,
      Observer {
        root: *root,
        records: Vec::new(),
      },
    );
    Some(id)
  }

  fn disconnect(&mut self, observer: ObserverId) {
    self.observers.remove(&observer);
  }
}
