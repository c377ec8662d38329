//! The seams between the gate and the page it runs in.
//!
//! `QuizDom` covers everything the controller reads from or writes to the
//! engine-owned document, and `Timers` covers the two kinds of deferred work
//! it schedules. The browser binding implements both over `web-sys`; the
//! `sim` module implements them in memory for tests and replays.

use std::fmt::Debug;

use crate::error::DomError;

/// Display override applied by the gate on top of the engine's own styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayOverride {
  /// No override; whatever the engine and stylesheet say
  #[default]
  Native,
  /// Forced hidden
  Hidden,
  /// Forced visible
  Shown,
}

/// Enabled-state override for inputs and buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnabledOverride {
  #[default]
  Native,
  Enabled,
}

/// What an answer input currently holds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InputState {
  /// Radio or checkbox (true) versus free text (false)
  pub is_choice: bool,
  pub checked: bool,
  pub value: String,
}

impl InputState {
  /// The value this input contributes to the question's selection, if any.
  pub fn selected_value(&self) -> Option<&str> {
    if self.is_choice {
      self.checked.then_some(self.value.as_str())
    } else {
      let trimmed = self.value.trim();
      (!trimmed.is_empty()).then_some(trimmed)
    }
  }
}

/// Handle for an active subtree observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub u32);

/// Handle for a scheduled timeout or interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u32);

/// What changed in an observed subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
  ChildList,
  Attribute(String),
  CharacterData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord<N> {
  pub target: N,
  pub kind: MutationKind,
}

/// Read/write access to the engine-owned document.
pub trait QuizDom {
  type Node: Clone + PartialEq + Debug;

  /// All descendants of `scope` matching `selector`, in document order.
  fn query_all(&self, scope: &Self::Node, selector: &str) -> Vec<Self::Node>;

  fn query(&self, scope: &Self::Node, selector: &str) -> Option<Self::Node> {
    self.query_all(scope, selector).into_iter().next()
  }

  fn matches(&self, node: &Self::Node, selector: &str) -> bool;

  /// Nearest inclusive ancestor matching `selector`.
  fn closest(&self, node: &Self::Node, selector: &str) -> Option<Self::Node>;

  fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;

  fn has_class(&self, node: &Self::Node, class: &str) -> bool;

  /// Rendered visibility per computed style, including hidden ancestors.
  fn is_visible(&self, node: &Self::Node) -> bool;

  /// Rendered text, like `innerText`: hidden descendants contribute nothing.
  fn text(&self, node: &Self::Node) -> String;

  fn input_state(&self, node: &Self::Node) -> InputState;

  fn is_connected(&self, node: &Self::Node) -> bool;

  fn set_display(&mut self, node: &Self::Node, display: DisplayOverride) -> Result<(), DomError>;

  fn set_enabled(&mut self, node: &Self::Node, enabled: EnabledOverride) -> Result<(), DomError>;

  fn set_class(&mut self, node: &Self::Node, class: &str, on: bool) -> Result<(), DomError>;

  /// Append a text notice carrying `class` at the end of `container`.
  fn insert_notice(
    &mut self,
    container: &Self::Node,
    class: &str,
    text: &str,
  ) -> Result<Self::Node, DomError>;

  fn remove_node(&mut self, node: &Self::Node) -> Result<(), DomError>;

  /// Start observing `root`'s subtree. `None` when observation is unavailable.
  fn observe(&mut self, root: &Self::Node) -> Option<ObserverId>;

  fn disconnect(&mut self, observer: ObserverId);
}

/// Deferred work scheduling. Fired timers are fed back through
/// `AnswerGateController::on_timer`.
pub trait Timers {
  fn now_ms(&self) -> u64;
  fn set_timeout(&mut self, delay_ms: u32) -> TimerId;
  fn set_interval(&mut self, period_ms: u32) -> TimerId;
  fn clear(&mut self, id: TimerId);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_choice_selected_value() {
    let unchecked = InputState {
      is_choice: true,
      checked: false,
      value: "1".into(),
    };
    assert_eq!(unchecked.selected_value(), None);

    let checked = InputState {
      checked: true,
      ..unchecked
    };
    assert_eq!(checked.selected_value(), Some("1"));
  }

  #[test]
  fn test_text_selected_value_trims() {
    let blank = InputState {
      is_choice: false,
      checked: false,
      value: "   ".into(),
    };
    assert_eq!(blank.selected_value(), None);

    let typed = InputState {
      value: " Paris ".into(),
      ..blank
    };
    assert_eq!(typed.selected_value(), Some("Paris"));
  }
}
