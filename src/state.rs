//! Per-question answer state and the Next-button policy.
//!
//! `QuestionState` only changes through `apply`, and `next_enabled` is
//! recomputed from the other fields after every transition. Nothing outside
//! this module writes it.

use serde::{Deserialize, Serialize};

use crate::identity::QuestionId;

/// Where a question is in its current answer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  #[default]
  Unanswered,
  /// A selection exists but grading is not (yet) known
  Answered,
  Correct,
  Incorrect,
}

impl Phase {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Unanswered => "unanswered",
      Self::Answered => "answered",
      Self::Correct => "correct",
      Self::Incorrect => "incorrect",
    }
  }

  pub fn from_str(s: &str) -> Option<Self> {
    match s {
      "unanswered" => Some(Self::Unanswered),
      "answered" => Some(Self::Answered),
      "correct" => Some(Self::Correct),
      "incorrect" => Some(Self::Incorrect),
      _ => None,
    }
  }
}

/// Outcome of correctness inference for one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
  Correct,
  Incorrect,
  /// No signal; never treated as correct
  Undetermined,
}

/// The answer value(s) currently chosen, sorted so that equal selections
/// compare equal regardless of DOM order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct Selection(Vec<String>);

impl Selection {
  pub fn new<I, S>(values: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let mut values: Vec<String> = values.into_iter().map(Into::into).collect();
    values.sort();
    values.dedup();
    Self(values)
  }

  pub fn is_present(&self) -> bool {
    !self.0.is_empty()
  }

  pub fn values(&self) -> &[String] {
    &self.0
  }
}

/// Inputs to a state change.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
  /// The user's selection was read from the inputs
  Select(Selection),
  /// Inference produced a verdict for the current attempt
  GradeResolved(Verdict),
  /// The hint trigger was used or the hint content became visible
  HintViewed,
}

/// Next is enabled by a correct answer, or in force-hint mode by a viewed
/// hint plus some selection on an attempted question.
///
/// A question without a hint can never satisfy the bypass, so force-hint mode
/// collapses to "correct only" for it.
pub fn next_enabled(
  phase: Phase,
  hint_available: bool,
  hint_viewed: bool,
  selection_present: bool,
  force_hint_mode: bool,
) -> bool {
  phase == Phase::Correct
    || (force_hint_mode
      && hint_available
      && phase != Phase::Unanswered
      && hint_viewed
      && selection_present)
}

/// Observable state of one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionState {
  pub question_id: QuestionId,
  pub phase: Phase,
  pub hint_available: bool,
  pub hint_viewed: bool,
  pub selection: Selection,
  pub next_enabled: bool,
  #[serde(skip)]
  force_hint_mode: bool,
}

impl QuestionState {
  pub fn new(question_id: QuestionId, hint_available: bool, force_hint_mode: bool) -> Self {
    Self {
      question_id,
      phase: Phase::Unanswered,
      hint_available,
      hint_viewed: false,
      selection: Selection::default(),
      next_enabled: false,
      force_hint_mode,
    }
  }

  /// Whether force-hint mode actually applies to this question.
  pub fn hint_gate_applies(&self) -> bool {
    self.force_hint_mode && self.hint_available
  }

  /// Hint availability follows the engine's markup, which can change on
  /// re-render. Returns true if anything changed.
  pub fn set_hint_available(&mut self, available: bool) -> bool {
    if self.hint_available == available {
      return false;
    }
    self.hint_available = available;
    self.recompute();
    true
  }

  /// Apply one transition. Returns true if any field changed.
  pub fn apply(&mut self, transition: Transition) -> bool {
    let before = self.clone();

    match transition {
      Transition::Select(selection) => {
        match self.phase {
          Phase::Unanswered if selection.is_present() => self.phase = Phase::Answered,
          Phase::Incorrect if selection != self.selection => self.phase = Phase::Answered,
          // Correct is terminal; Answered stays Answered within one attempt
          _ => {}
        }
        self.selection = selection;
      }
      Transition::GradeResolved(verdict) => {
        if self.phase == Phase::Answered {
          match verdict {
            Verdict::Correct => self.phase = Phase::Correct,
            Verdict::Incorrect => self.phase = Phase::Incorrect,
            Verdict::Undetermined => {}
          }
        }
      }
      Transition::HintViewed => self.hint_viewed = true,
    }

    self.recompute();

    let changed = *self != before;
    if changed {
      tracing::debug!(
        "question {}: {} -> {} (hint_viewed={}, next_enabled={})",
        self.question_id,
        before.phase.as_str(),
        self.phase.as_str(),
        self.hint_viewed,
        self.next_enabled
      );
    }
    changed
  }

  fn recompute(&mut self) {
    self.next_enabled = next_enabled(
      self.phase,
      self.hint_available,
      self.hint_viewed,
      self.selection.is_present(),
      self.force_hint_mode,
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn state(force_hint: bool) -> QuestionState {
    QuestionState::new(QuestionId::Post(1), true, force_hint)
  }

  fn pick(value: &str) -> Transition {
    Transition::Select(Selection::new([value]))
  }

  #[test]
  fn test_happy_path() {
    let mut s = state(false);
    assert!(s.apply(pick("a")));
    assert_eq!(s.phase, Phase::Answered);
    assert!(s.apply(Transition::GradeResolved(Verdict::Correct)));
    assert_eq!(s.phase, Phase::Correct);
    assert!(s.next_enabled);
  }

  #[test]
  fn test_empty_selection_keeps_unanswered() {
    let mut s = state(false);
    assert!(!s.apply(Transition::Select(Selection::default())));
    assert_eq!(s.phase, Phase::Unanswered);
  }

  #[test]
  fn test_reselect_after_incorrect_returns_to_answered() {
    let mut s = state(true);
    s.apply(pick("a"));
    s.apply(Transition::GradeResolved(Verdict::Incorrect));
    s.apply(Transition::HintViewed);
    assert!(s.apply(pick("b")));
    assert_eq!(s.phase, Phase::Answered);
    assert!(s.hint_viewed);
  }

  #[test]
  fn test_same_selection_after_incorrect_is_noop() {
    let mut s = state(false);
    s.apply(pick("a"));
    s.apply(Transition::GradeResolved(Verdict::Incorrect));
    assert!(!s.apply(pick("a")));
    assert_eq!(s.phase, Phase::Incorrect);
  }

  #[test]
  fn test_correct_is_terminal() {
    let mut s = state(false);
    s.apply(pick("a"));
    s.apply(Transition::GradeResolved(Verdict::Correct));
    s.apply(pick("b"));
    assert_eq!(s.phase, Phase::Correct);
    s.apply(Transition::GradeResolved(Verdict::Incorrect));
    assert_eq!(s.phase, Phase::Correct);
    assert!(s.next_enabled);
  }

  #[test]
  fn test_grade_ignored_without_selection() {
    let mut s = state(false);
    assert!(!s.apply(Transition::GradeResolved(Verdict::Correct)));
    assert_eq!(s.phase, Phase::Unanswered);
  }

  #[test]
  fn test_undetermined_stays_answered() {
    let mut s = state(false);
    s.apply(pick("a"));
    assert!(!s.apply(Transition::GradeResolved(Verdict::Undetermined)));
    assert_eq!(s.phase, Phase::Answered);
    assert!(!s.next_enabled);
  }

  #[test]
  fn test_hint_bypass_in_force_hint_mode() {
    let mut s = state(true);
    s.apply(pick("a"));
    s.apply(Transition::GradeResolved(Verdict::Incorrect));
    assert!(!s.next_enabled);
    s.apply(Transition::HintViewed);
    assert!(s.next_enabled);
  }

  #[test]
  fn test_no_bypass_without_force_hint_mode() {
    let mut s = state(false);
    s.apply(pick("a"));
    s.apply(Transition::GradeResolved(Verdict::Incorrect));
    s.apply(Transition::HintViewed);
    assert!(!s.next_enabled);
  }

  #[test]
  fn test_no_bypass_without_hint() {
    let mut s = QuestionState::new(QuestionId::Post(1), false, true);
    s.apply(pick("a"));
    s.apply(Transition::GradeResolved(Verdict::Incorrect));
    s.apply(Transition::HintViewed);
    assert!(!s.next_enabled);
    assert!(!s.hint_gate_applies());
  }

  #[test]
  fn test_policy_truth_table() {
    use Phase::*;
    for phase in [Unanswered, Answered, Correct, Incorrect] {
      for bits in 0..16u8 {
        let (avail, viewed, sel, force) =
          (bits & 1 != 0, bits & 2 != 0, bits & 4 != 0, bits & 8 != 0);
        let enabled = next_enabled(phase, avail, viewed, sel, force);
        if enabled {
          assert!(phase == Correct || (force && viewed && sel && phase != Unanswered));
        }
      }
    }
  }

  #[test]
  fn test_phase_round_trip_names() {
    assert_eq!(Phase::from_str("incorrect"), Some(Phase::Incorrect));
    assert_eq!(Phase::from_str(Phase::Answered.as_str()), Some(Phase::Answered));
    assert_eq!(Phase::from_str("graded"), None);
  }
}
