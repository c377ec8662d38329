//! Correctness inference from engine-rendered feedback.
//!
//! The engine never tells us whether an answer is right, so we read it off the
//! page. Signals are checked in a fixed order and the first match wins:
//!
//! 1. visible "correct" feedback
//! 2. visible "incorrect" feedback
//! 3. the engine's grading classes on the options
//! 4. configured locale phrases in the visible response text
//!
//! Anything else is `Undetermined`. Silence is never read as correct.

use unicode_normalization::UnicodeNormalization;

use crate::dom::QuizDom;
use crate::selectors::SelectorTable;
use crate::state::Verdict;

/// Raw signals read from one question.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evidence {
  pub correct_feedback_visible: bool,
  pub incorrect_feedback_visible: bool,
  /// A selected option carries the engine's "graded correct" class
  pub selected_marked_correct: bool,
  /// A selected option carries the engine's "graded incorrect" class
  pub selected_marked_incorrect: bool,
  /// An option the user did not pick is marked correct: the engine marks
  /// every right option, so a partial multi-select answer shows this
  pub unselected_marked_correct: bool,
  /// Text of the response area, only when it is visible
  pub response_text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inference {
  pub verdict: Verdict,
  /// Conflicting signals were present and the priority order decided
  pub ambiguous: bool,
}

impl Inference {
  fn clear(verdict: Verdict) -> Self {
    Self {
      verdict,
      ambiguous: false,
    }
  }
}

/// Locale phrase matcher for the text fallback.
#[derive(Debug, Clone, Default)]
pub struct PhraseMatcher {
  correct: Vec<String>,
  incorrect: Vec<String>,
}

/// NFC plus lowercase, so composed and decomposed input compare equal.
fn normalize(text: &str) -> String {
  text.nfc().collect::<String>().to_lowercase()
}

impl PhraseMatcher {
  pub fn new(correct: &[String], incorrect: &[String]) -> Self {
    let prepare = |phrases: &[String]| {
      phrases
        .iter()
        .map(|p| normalize(p.trim()))
        .filter(|p| !p.is_empty())
        .collect::<Vec<String>>()
    };
    Self {
      correct: prepare(correct),
      incorrect: prepare(incorrect),
    }
  }

  /// Incorrect phrases are tested first: in most locales the negative phrase
  /// contains the positive one ("incorrect", "לא נכון").
  pub fn classify(&self, text: &str) -> Verdict {
    let text = normalize(text);
    if self.incorrect.iter().any(|p| text.contains(p.as_str())) {
      Verdict::Incorrect
    } else if self.correct.iter().any(|p| text.contains(p.as_str())) {
      Verdict::Correct
    } else {
      Verdict::Undetermined
    }
  }
}

/// Apply the priority order to a set of signals.
pub fn infer(evidence: &Evidence, phrases: &PhraseMatcher) -> Inference {
  if evidence.correct_feedback_visible {
    return Inference {
      verdict: Verdict::Correct,
      ambiguous: evidence.incorrect_feedback_visible || evidence.selected_marked_incorrect,
    };
  }

  if evidence.incorrect_feedback_visible {
    return Inference::clear(Verdict::Incorrect);
  }

  // Mixed option marks on a multi-select: the less favorable reading wins
  match (evidence.selected_marked_correct, evidence.selected_marked_incorrect) {
    (true, true) => {
      return Inference {
        verdict: Verdict::Incorrect,
        ambiguous: true,
      };
    }
    (_, true) => return Inference::clear(Verdict::Incorrect),
    _ if evidence.unselected_marked_correct => return Inference::clear(Verdict::Incorrect),
    (true, false) => return Inference::clear(Verdict::Correct),
    (false, false) => {}
  }

  match evidence.response_text.as_deref() {
    Some(text) => Inference::clear(phrases.classify(text)),
    None => Inference::clear(Verdict::Undetermined),
  }
}

/// Read the signals for one question from the page.
pub fn collect_evidence<D: QuizDom>(
  dom: &D,
  question: &D::Node,
  selectors: &SelectorTable,
) -> Evidence {
  let any_visible = |selector: &str| {
    dom
      .query_all(question, selector)
      .iter()
      .any(|node| dom.is_visible(node))
  };

  let mut evidence = Evidence {
    correct_feedback_visible: any_visible(&selectors.feedback_correct),
    incorrect_feedback_visible: any_visible(&selectors.feedback_incorrect),
    ..Evidence::default()
  };

  for item in dom.query_all(question, &selectors.answer_item) {
    let selected = dom
      .query_all(&item, &selectors.answer_input)
      .iter()
      .any(|input| dom.input_state(input).selected_value().is_some());
    let marked_correct = dom.has_class(&item, &selectors.option_correct_class);
    if !selected {
      evidence.unselected_marked_correct |= marked_correct;
      continue;
    }
    evidence.selected_marked_correct |= marked_correct;
    if dom.has_class(&item, &selectors.option_incorrect_class) {
      evidence.selected_marked_incorrect = true;
    }
  }

  evidence.response_text = dom
    .query(question, &selectors.response)
    .filter(|response| dom.is_visible(response))
    .map(|response| dom.text(&response));

  evidence
}

#[cfg(test)]
mod tests {
  use super::*;

  fn phrases() -> PhraseMatcher {
    PhraseMatcher::new(
      &["Correct".to_string(), "נכון".to_string()],
      &["Incorrect".to_string(), "לא נכון".to_string()],
    )
  }

  #[test]
  fn test_visible_correct_feedback_wins() {
    let evidence = Evidence {
      correct_feedback_visible: true,
      selected_marked_incorrect: true,
      ..Evidence::default()
    };
    let result = infer(&evidence, &phrases());
    assert_eq!(result.verdict, Verdict::Correct);
    assert!(result.ambiguous);
  }

  #[test]
  fn test_visible_incorrect_feedback_beats_option_marks() {
    let evidence = Evidence {
      incorrect_feedback_visible: true,
      selected_marked_correct: true,
      ..Evidence::default()
    };
    assert_eq!(infer(&evidence, &phrases()).verdict, Verdict::Incorrect);
  }

  #[test]
  fn test_option_marks() {
    let correct = Evidence {
      selected_marked_correct: true,
      ..Evidence::default()
    };
    assert_eq!(infer(&correct, &phrases()).verdict, Verdict::Correct);

    let mixed = Evidence {
      selected_marked_correct: true,
      selected_marked_incorrect: true,
      ..Evidence::default()
    };
    let result = infer(&mixed, &phrases());
    assert_eq!(result.verdict, Verdict::Incorrect);
    assert!(result.ambiguous);
  }

  #[test]
  fn test_missed_correct_option_is_incorrect() {
    let partial = Evidence {
      selected_marked_correct: true,
      unselected_marked_correct: true,
      ..Evidence::default()
    };
    let result = infer(&partial, &phrases());
    assert_eq!(result.verdict, Verdict::Incorrect);
    assert!(!result.ambiguous);

    // A wrong pick the engine left unmarked, next to the marked right one
    let unmarked_pick = Evidence {
      unselected_marked_correct: true,
      response_text: Some("Correct".into()),
      ..Evidence::default()
    };
    assert_eq!(infer(&unmarked_pick, &phrases()).verdict, Verdict::Incorrect);
  }

  #[test]
  fn test_option_marks_beat_text() {
    let evidence = Evidence {
      selected_marked_incorrect: true,
      response_text: Some("Correct!".into()),
      ..Evidence::default()
    };
    assert_eq!(infer(&evidence, &phrases()).verdict, Verdict::Incorrect);
  }

  #[test]
  fn test_phrase_fallback() {
    let matcher = phrases();
    assert_eq!(matcher.classify("  CORRECT! Well done"), Verdict::Correct);
    assert_eq!(matcher.classify("Incorrect, try again"), Verdict::Incorrect);
    assert_eq!(matcher.classify("תשובה נכון"), Verdict::Correct);
    assert_eq!(matcher.classify("לא נכון"), Verdict::Incorrect);
    assert_eq!(matcher.classify("Points: 0"), Verdict::Undetermined);
  }

  #[test]
  fn test_silence_is_undetermined() {
    assert_eq!(
      infer(&Evidence::default(), &phrases()).verdict,
      Verdict::Undetermined
    );
  }

  #[test]
  fn test_blank_phrases_ignored() {
    let matcher = PhraseMatcher::new(&["  ".to_string()], &[]);
    assert_eq!(matcher.classify("anything"), Verdict::Undetermined);
  }
}
