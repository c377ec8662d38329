//! Desired per-question presentation and the diff-based writer.
//!
//! The controller never writes styles directly. It computes a `Presentation`
//! from state, and `apply` compares it with what was last written to the same
//! nodes, touching the DOM only where the two differ. An unchanged state is
//! therefore zero writes, which is what keeps the controller's own mutations
//! from feeding back into it.

use crate::dom::{DisplayOverride, EnabledOverride, QuizDom};
use crate::error::{DomError, LogOnError};
use crate::selectors::SelectorTable;
use crate::state::{Phase, QuestionState};

/// Engine nodes belonging to one question, re-read on every scan because the
/// engine may re-render any of them.
#[derive(Debug, Clone)]
pub struct QuestionNodes<N> {
  pub check: Option<N>,
  pub next: Option<N>,
  pub hint: Option<N>,
  pub hint_content: Option<N>,
  pub response: Option<N>,
  pub inputs: Vec<N>,
  pub feedback: Vec<N>,
}

impl<N: Clone> QuestionNodes<N> {
  pub fn collect<D: QuizDom<Node = N>>(dom: &D, question: &N, selectors: &SelectorTable) -> Self {
    let mut feedback = dom.query_all(question, &selectors.feedback_correct);
    feedback.extend(dom.query_all(question, &selectors.feedback_incorrect));
    Self {
      check: dom.query(question, &selectors.check),
      next: dom.query(question, &selectors.next),
      hint: dom.query(question, &selectors.hint),
      hint_content: dom.query(question, &selectors.hint_content),
      response: dom.query(question, &selectors.response),
      inputs: dom.query_all(question, &selectors.answer_input),
      feedback,
    }
  }

  /// A hint exists when the engine rendered both its trigger and content.
  pub fn hint_available(&self) -> bool {
    self.hint.is_some() && self.hint_content.is_some()
  }

  /// Where stale feedback lives: the response wrapper if present, otherwise
  /// the individual feedback containers.
  fn feedback_targets(&self) -> Vec<N> {
    match &self.response {
      Some(response) => vec![response.clone()],
      None => self.feedback.clone(),
    }
  }
}

/// What the gate wants a question to look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Presentation {
  pub next: DisplayOverride,
  pub hint: DisplayOverride,
  pub hint_highlight: bool,
  /// Neutral notice for an incorrect answer on a question without a hint
  pub try_again: bool,
  pub check: DisplayOverride,
  pub inputs: EnabledOverride,
  pub feedback: DisplayOverride,
}

impl Presentation {
  /// `gate_next`: the gate owns the Next button for this question.
  /// `stale_feedback`: the user re-selected after an incorrect answer and has
  /// not pressed check again yet.
  pub fn desired(state: &QuestionState, gate_next: bool, stale_feedback: bool) -> Self {
    let incorrect = state.phase == Phase::Incorrect;

    let next = match (gate_next, state.next_enabled) {
      (false, _) => DisplayOverride::Native,
      (true, true) => DisplayOverride::Shown,
      (true, false) => DisplayOverride::Hidden,
    };

    let (hint, hint_highlight, try_again) = match (incorrect, state.hint_available) {
      (true, true) => (DisplayOverride::Shown, true, false),
      (true, false) => (DisplayOverride::Native, false, true),
      (false, _) => (DisplayOverride::Native, false, false),
    };

    Self {
      next,
      hint,
      hint_highlight,
      try_again,
      check: if stale_feedback {
        DisplayOverride::Shown
      } else {
        DisplayOverride::Native
      },
      inputs: if incorrect || stale_feedback {
        EnabledOverride::Enabled
      } else {
        EnabledOverride::Native
      },
      feedback: if stale_feedback {
        DisplayOverride::Hidden
      } else {
        DisplayOverride::Native
      },
    }
  }
}

/// Which part of a node a corrective write touched, for matching the
/// mutation records it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
  Attributes,
  ChildList,
}

/// Last value written to a target, and the node(s) it was written to.
#[derive(Debug, Clone, Default)]
struct Slot<K, V> {
  key: Option<K>,
  value: V,
}

/// Bring one slot in line with `want`. Returns true if a write happened.
///
/// A target the engine re-rendered starts out native, so a new node needs no
/// write when nothing was overridden before and nothing is wanted now.
fn sync_slot<K, V>(
  slot: &mut Slot<K, V>,
  key: Option<K>,
  want: V,
  mut write: impl FnMut(&K, V) -> Result<(), DomError>,
) -> Result<bool, DomError>
where
  K: PartialEq,
  V: Copy + PartialEq + Default,
{
  let Some(key) = key else {
    slot.key = None;
    slot.value = V::default();
    return Ok(false);
  };

  let same_target = slot.key.as_ref() == Some(&key);
  if same_target && slot.value == want {
    return Ok(false);
  }
  if !same_target && want == V::default() && slot.value == V::default() {
    slot.key = Some(key);
    slot.value = want;
    return Ok(false);
  }

  write(&key, want)?;
  slot.key = Some(key);
  slot.value = want;
  Ok(true)
}

/// Everything the gate has written to one question.
#[derive(Debug, Clone)]
pub struct Applied<N> {
  next: Slot<N, DisplayOverride>,
  hint: Slot<N, DisplayOverride>,
  highlight: Slot<N, bool>,
  check: Slot<N, DisplayOverride>,
  inputs: Slot<Vec<N>, EnabledOverride>,
  feedback: Slot<Vec<N>, DisplayOverride>,
  notice: Option<N>,
}

impl<N> Default for Applied<N> {
  fn default() -> Self {
    Self {
      next: Slot { key: None, value: DisplayOverride::Native },
      hint: Slot { key: None, value: DisplayOverride::Native },
      highlight: Slot { key: None, value: false },
      check: Slot { key: None, value: DisplayOverride::Native },
      inputs: Slot { key: None, value: EnabledOverride::Native },
      feedback: Slot { key: None, value: DisplayOverride::Native },
      notice: None,
    }
  }
}

impl<N> Applied<N> {
  pub fn notice(&self) -> Option<&N> {
    self.notice.as_ref()
  }
}

fn non_empty<N>(nodes: Vec<N>) -> Option<Vec<N>> {
  (!nodes.is_empty()).then_some(nodes)
}

/// Write the difference between `applied` and `desired`.
///
/// Every write is logged to `ledger` so the resulting mutation records can be
/// recognized as our own. Returns the number of writes.
#[allow(clippy::too_many_arguments)]
pub fn apply<D: QuizDom>(
  dom: &mut D,
  question: &D::Node,
  nodes: &QuestionNodes<D::Node>,
  desired: &Presentation,
  applied: &mut Applied<D::Node>,
  selectors: &SelectorTable,
  try_again_text: &str,
  ledger: &mut Vec<(D::Node, WriteKind)>,
) -> Result<u32, DomError> {
  let mut writes = 0;

  let mut display = |slot: &mut Slot<D::Node, DisplayOverride>,
                     key: Option<D::Node>,
                     want: DisplayOverride,
                     dom: &mut D,
                     ledger: &mut Vec<(D::Node, WriteKind)>|
   -> Result<(), DomError> {
    if sync_slot(slot, key, want, |node, value| {
      ledger.push((node.clone(), WriteKind::Attributes));
      dom.set_display(node, value)
    })? {
      writes += 1;
    }
    Ok(())
  };

  display(&mut applied.next, nodes.next.clone(), desired.next, &mut *dom, &mut *ledger)?;
  display(&mut applied.hint, nodes.hint.clone(), desired.hint, &mut *dom, &mut *ledger)?;
  display(&mut applied.check, nodes.check.clone(), desired.check, &mut *dom, &mut *ledger)?;

  if sync_slot(
    &mut applied.highlight,
    nodes.hint.clone(),
    desired.hint_highlight,
    |node, on| {
      ledger.push((node.clone(), WriteKind::Attributes));
      dom.set_class(node, &selectors.highlight_class, on)
    },
  )? {
    writes += 1;
  }

  if sync_slot(
    &mut applied.inputs,
    non_empty(nodes.inputs.clone()),
    desired.inputs,
    |inputs, value| {
      for input in inputs {
        ledger.push((input.clone(), WriteKind::Attributes));
        dom.set_enabled(input, value)?;
      }
      Ok(())
    },
  )? {
    writes += 1;
  }

  if sync_slot(
    &mut applied.feedback,
    non_empty(nodes.feedback_targets()),
    desired.feedback,
    |targets, value| {
      for target in targets {
        ledger.push((target.clone(), WriteKind::Attributes));
        dom.set_display(target, value)?;
      }
      Ok(())
    },
  )? {
    writes += 1;
  }

  let notice_live = applied
    .notice
    .as_ref()
    .is_some_and(|notice| dom.is_connected(notice));
  match (desired.try_again, notice_live) {
    (true, false) => {
      let notice = dom.insert_notice(question, &selectors.try_again_class, try_again_text)?;
      ledger.push((question.clone(), WriteKind::ChildList));
      applied.notice = Some(notice);
      writes += 1;
    }
    (false, true) => {
      if let Some(notice) = applied.notice.take() {
        dom.remove_node(&notice)?;
        ledger.push((question.clone(), WriteKind::ChildList));
        writes += 1;
      }
    }
    (false, false) => applied.notice = None,
    (true, true) => {}
  }

  Ok(writes)
}

/// Undo every override, best effort. Used on detach and when degrading.
pub fn release<D: QuizDom>(dom: &mut D, applied: &mut Applied<D::Node>, selectors: &SelectorTable) {
  let native_display = |dom: &mut D, slot: &mut Slot<D::Node, DisplayOverride>| {
    if let Some(node) = slot.key.take() {
      if slot.value != DisplayOverride::Native && dom.is_connected(&node) {
        dom
          .set_display(&node, DisplayOverride::Native)
          .log_warn_default("Failed to release display override");
      }
    }
    slot.value = DisplayOverride::Native;
  };

  native_display(dom, &mut applied.next);
  native_display(dom, &mut applied.hint);
  native_display(dom, &mut applied.check);

  if let Some(node) = applied.highlight.key.take() {
    if applied.highlight.value && dom.is_connected(&node) {
      dom
        .set_class(&node, &selectors.highlight_class, false)
        .log_warn_default("Failed to remove hint highlight");
    }
  }
  applied.highlight.value = false;

  if let Some(inputs) = applied.inputs.key.take() {
    if applied.inputs.value != EnabledOverride::Native {
      let live: Vec<D::Node> = inputs.into_iter().filter(|i| dom.is_connected(i)).collect();
      for input in &live {
        dom
          .set_enabled(input, EnabledOverride::Native)
          .log_warn_default("Failed to release input override");
      }
    }
  }
  applied.inputs.value = EnabledOverride::Native;

  if let Some(targets) = applied.feedback.key.take() {
    if applied.feedback.value != DisplayOverride::Native {
      let live: Vec<D::Node> = targets.into_iter().filter(|t| dom.is_connected(t)).collect();
      for target in &live {
        dom
          .set_display(target, DisplayOverride::Native)
          .log_warn_default("Failed to release feedback override");
      }
    }
  }
  applied.feedback.value = DisplayOverride::Native;

  if let Some(notice) = applied.notice.take() {
    if dom.is_connected(&notice) {
      dom.remove_node(&notice).log_warn_default("Failed to remove notice");
    }
  }
}
