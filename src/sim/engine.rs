//! A stand-in for the quiz engine: builds wpProQuiz-shaped markup and
//! performs the engine's own reactions (grading, showing feedback, toggling
//! buttons) on a `MemoryDom`.

use serde::Deserialize;

use super::memory::{MemoryDom, NodeId};
use crate::dom::QuizDom;
use crate::identity::QuestionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
  #[default]
  Single,
  Multiple,
  /// One free-text input
  Free,
}

/// How the engine reports the grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStyle {
  /// Correct/incorrect containers inside the response block
  #[default]
  Containers,
  /// Only answer options are marked
  OptionMarks,
  /// Plain response text without feedback classes
  TextOnly,
}

fn default_true() -> bool {
  true
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionFixture {
  #[serde(default)]
  pub post_id: Option<u64>,
  #[serde(default)]
  pub pro_id: Option<u64>,
  /// Verbatim question metadata attribute, overriding `post_id`/`pro_id`
  #[serde(default)]
  pub raw_meta: Option<String>,
  #[serde(default)]
  pub kind: QuestionKind,
  #[serde(default)]
  pub options: Vec<String>,
  /// Zero-based indexes into `options`
  #[serde(default)]
  pub correct: Vec<usize>,
  /// Expected text for free-text questions
  #[serde(default)]
  pub answer: Option<String>,
  #[serde(default)]
  pub hint: Option<String>,
  #[serde(default)]
  pub feedback: FeedbackStyle,
  #[serde(default = "default_true")]
  pub has_check: bool,
  #[serde(default = "default_true")]
  pub has_next: bool,
}

impl QuestionFixture {
  /// Single-choice question with no identity metadata.
  pub fn single(options: &[&str], correct: usize) -> Self {
    Self {
      post_id: None,
      pro_id: None,
      raw_meta: None,
      kind: QuestionKind::Single,
      options: options.iter().map(|o| o.to_string()).collect(),
      correct: vec![correct],
      answer: None,
      hint: None,
      feedback: FeedbackStyle::Containers,
      has_check: true,
      has_next: true,
    }
  }

  pub fn free(answer: &str) -> Self {
    Self {
      kind: QuestionKind::Free,
      options: Vec::new(),
      correct: Vec::new(),
      answer: Some(answer.to_string()),
      ..Self::single(&[], 0)
    }
  }

  pub fn with_post_id(mut self, id: u64) -> Self {
    self.post_id = Some(id);
    self
  }

  pub fn with_hint(mut self, text: &str) -> Self {
    self.hint = Some(text.to_string());
    self
  }

  pub fn with_feedback(mut self, style: FeedbackStyle) -> Self {
    self.feedback = style;
    self
  }

  /// The identity the gate should resolve for this fixture at `position`,
  /// when it is knowable without parsing `raw_meta`.
  pub fn expected_id(&self, position: usize) -> Option<QuestionId> {
    if self.raw_meta.is_some() {
      return None;
    }
    Some(match (self.post_id, self.pro_id) {
      (Some(id), _) => QuestionId::Post(id),
      (None, Some(id)) => QuestionId::ProQuiz(id),
      (None, None) => QuestionId::Position(position),
    })
  }

  fn meta_json(&self) -> Option<String> {
    if let Some(raw) = &self.raw_meta {
      return Some(raw.clone());
    }
    if self.post_id.is_none() && self.pro_id.is_none() {
      return None;
    }
    let mut meta = serde_json::json!({ "type": "question" });
    if let Some(id) = self.post_id {
      meta["question_post_id"] = id.into();
    }
    if let Some(id) = self.pro_id {
      meta["question_pro_id"] = id.into();
    }
    Some(meta.to_string())
  }
}

/// Engine nodes of one rendered question.
#[derive(Debug, Clone)]
pub struct PageQuestion {
  pub element: NodeId,
  pub items: Vec<NodeId>,
  pub inputs: Vec<NodeId>,
  pub check: Option<NodeId>,
  pub next: Option<NodeId>,
  pub hint: Option<NodeId>,
  pub hint_content: Option<NodeId>,
  pub response: NodeId,
  pub feedback_correct: Option<NodeId>,
  pub feedback_incorrect: Option<NodeId>,
  pub feedback_text: Option<NodeId>,
  pub fixture: QuestionFixture,
}

#[derive(Debug, Clone)]
pub struct QuizPage {
  pub root: NodeId,
  pub questions: Vec<PageQuestion>,
}

fn button(dom: &mut MemoryDom, parent: NodeId, name: &str, label: &str) -> NodeId {
  let node = dom.element(parent, "input", &["wpProQuiz_button"]);
  dom.set_attribute(node, "type", "button");
  dom.set_attribute(node, "name", name);
  dom.set_attribute(node, "value", label);
  node
}

impl QuizPage {
  pub fn build(dom: &mut MemoryDom, fixtures: &[QuestionFixture]) -> Self {
    let body = dom.body();
    let root = dom.element(body, "div", &["wpProQuiz_content"]);
    let list = dom.element(root, "ol", &["wpProQuiz_list"]);
    let questions = fixtures
      .iter()
      .enumerate()
      .map(|(index, fixture)| PageQuestion::build(dom, list, index, fixture))
      .collect();
    Self { root, questions }
  }
}

impl PageQuestion {
  fn build(dom: &mut MemoryDom, list: NodeId, index: usize, fixture: &QuestionFixture) -> Self {
    let element = dom.element(list, "li", &["wpProQuiz_listItem"]);
    if let Some(meta) = fixture.meta_json() {
      dom.set_attribute(element, "data-question-meta", &meta);
    }

    let body = dom.element(element, "div", &["wpProQuiz_question"]);
    let answers = dom.element(body, "ul", &["wpProQuiz_questionList"]);
    if let Some(id) = fixture.pro_id {
      dom.set_attribute(answers, "data-question_id", &id.to_string());
    }

    let mut items = Vec::new();
    let mut inputs = Vec::new();
    match fixture.kind {
      QuestionKind::Free => {
        let item = dom.element(answers, "li", &["wpProQuiz_questionListItem"]);
        let input = dom.element(item, "input", &["wpProQuiz_questionInput"]);
        dom.set_attribute(input, "type", "text");
        items.push(item);
        inputs.push(input);
      }
      kind => {
        let input_type = if kind == QuestionKind::Multiple { "checkbox" } else { "radio" };
        for (n, option) in fixture.options.iter().enumerate() {
          let item = dom.element(answers, "li", &["wpProQuiz_questionListItem"]);
          let label = dom.element(item, "label", &[]);
          let input = dom.element(label, "input", &["wpProQuiz_questionInput"]);
          dom.set_attribute(input, "type", input_type);
          dom.set_attribute(input, "name", &format!("question_{}", index));
          dom.set_attribute(input, "value", &(n + 1).to_string());
          let text = dom.element(label, "span", &[]);
          dom.set_text(text, option);
          items.push(item);
          inputs.push(input);
        }
      }
    }

    let response = dom.element(element, "div", &["wpProQuiz_response"]);
    dom.set_hidden_by_stylesheet(response, true);
    let (feedback_correct, feedback_incorrect, feedback_text) = match fixture.feedback {
      FeedbackStyle::TextOnly => {
        let text = dom.element(response, "div", &["wpProQuiz_responseText"]);
        (None, None, Some(text))
      }
      _ => {
        let correct = dom.element(response, "div", &["wpProQuiz_correct"]);
        dom.set_hidden_by_stylesheet(correct, true);
        let label = dom.element(correct, "span", &[]);
        dom.set_text(label, "Correct");
        let incorrect = dom.element(response, "div", &["wpProQuiz_incorrect"]);
        dom.set_hidden_by_stylesheet(incorrect, true);
        let label = dom.element(incorrect, "span", &[]);
        dom.set_text(label, "Incorrect");
        (Some(correct), Some(incorrect), None)
      }
    };

    let (hint, hint_content) = match &fixture.hint {
      Some(text) => {
        let content = dom.element(element, "div", &["wpProQuiz_tipp"]);
        dom.set_hidden_by_stylesheet(content, true);
        dom.set_text(content, text);
        (Some(button(dom, element, "tip", "Hint")), Some(content))
      }
      None => (None, None),
    };

    let check = fixture
      .has_check
      .then(|| button(dom, element, "check", "Check"));
    let next = fixture.has_next.then(|| {
      let next = button(dom, element, "next", "Next");
      dom.set_hidden_by_stylesheet(next, true);
      next
    });

    Self {
      element,
      items,
      inputs,
      check,
      next,
      hint,
      hint_content,
      response,
      feedback_correct,
      feedback_incorrect,
      feedback_text,
      fixture: fixture.clone(),
    }
  }

  /// User clicks option `option`. `None` when the input is disabled or
  /// missing; otherwise the input that fires `change`.
  pub fn select(&self, dom: &mut MemoryDom, option: usize) -> Option<NodeId> {
    let input = *self.inputs.get(option)?;
    if dom.is_disabled(input) || self.fixture.kind == QuestionKind::Free {
      return None;
    }
    match self.fixture.kind {
      QuestionKind::Multiple => {
        let checked = dom.input_state(&input).checked;
        dom.set_checked(input, !checked);
      }
      _ => {
        for other in &self.inputs {
          dom.set_checked(*other, *other == input);
        }
      }
    }
    Some(input)
  }

  /// User types into a free-text question.
  pub fn type_answer(&self, dom: &mut MemoryDom, text: &str) -> Option<NodeId> {
    let input = *self.inputs.first()?;
    if dom.is_disabled(input) || self.fixture.kind != QuestionKind::Free {
      return None;
    }
    dom.set_attribute(input, "value", text);
    Some(input)
  }

  fn is_correct(&self, dom: &MemoryDom) -> bool {
    match self.fixture.kind {
      QuestionKind::Free => {
        let typed = self
          .inputs
          .first()
          .map(|input| dom.input_state(input).value)
          .unwrap_or_default();
        self
          .fixture
          .answer
          .as_deref()
          .is_some_and(|answer| typed.trim().eq_ignore_ascii_case(answer.trim()))
      }
      _ => {
        let chosen: Vec<usize> = self
          .inputs
          .iter()
          .enumerate()
          .filter(|(_, input)| dom.input_state(input).checked)
          .map(|(n, _)| n)
          .collect();
        let mut expected = self.fixture.correct.clone();
        expected.sort_unstable();
        !chosen.is_empty() && chosen == expected
      }
    }
  }

  /// The engine's check handler. Returns the grade.
  pub fn grade(&self, dom: &mut MemoryDom) -> bool {
    let correct = self.is_correct(dom);

    for item in &self.items {
      dom.remove_class(*item, "wpProQuiz_answerCorrect");
      dom.remove_class(*item, "wpProQuiz_answerIncorrect");
    }

    match self.fixture.feedback {
      FeedbackStyle::Containers => {
        dom.set_inline_shown(self.response, true);
        if let Some(node) = self.feedback_correct {
          dom.set_inline_shown(node, correct);
        }
        if let Some(node) = self.feedback_incorrect {
          dom.set_inline_shown(node, !correct);
        }
      }
      FeedbackStyle::OptionMarks => {
        for (n, item) in self.items.iter().enumerate() {
          if self.fixture.correct.contains(&n) {
            dom.add_class(*item, "wpProQuiz_answerCorrect");
          } else if dom.input_state(&self.inputs[n]).checked {
            dom.add_class(*item, "wpProQuiz_answerIncorrect");
          }
        }
      }
      FeedbackStyle::TextOnly => {
        dom.set_inline_shown(self.response, true);
        if let Some(node) = self.feedback_text {
          dom.set_text(node, if correct { "Correct!" } else { "Incorrect" });
        }
      }
    }

    for input in &self.inputs {
      dom.set_disabled(*input, true);
    }
    if let Some(check) = self.check {
      dom.set_inline_shown(check, false);
    }
    if let Some(next) = self.next {
      dom.set_inline_shown(next, true);
    }
    correct
  }

  /// The engine's hint handler.
  pub fn open_hint(&self, dom: &mut MemoryDom) {
    if let Some(content) = self.hint_content {
      dom.set_inline_shown(content, true);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_markup_matches_default_selectors() {
    let mut dom = MemoryDom::new();
    let page = QuizPage::build(
      &mut dom,
      &[QuestionFixture::single(&["a", "b"], 0).with_hint("look closer")],
    );
    let q = &page.questions[0];
    assert_eq!(dom.query_all(&page.root, ".wpProQuiz_listItem"), vec![q.element]);
    assert_eq!(dom.query(&q.element, "input[name=check]"), q.check);
    assert_eq!(dom.query(&q.element, "input[name=tip]"), q.hint);
    assert_eq!(dom.query_all(&q.element, ".wpProQuiz_questionInput").len(), 2);
    assert!(!dom.is_visible(&q.next.unwrap()));
    assert!(!dom.is_visible(&q.hint_content.unwrap()));
  }

  #[test]
  fn test_grading_shows_feedback_and_next() {
    let mut dom = MemoryDom::new();
    let page = QuizPage::build(&mut dom, &[QuestionFixture::single(&["a", "b"], 1)]);
    let q = &page.questions[0];
    q.select(&mut dom, 0).unwrap();
    assert!(!q.grade(&mut dom));
    assert!(dom.is_visible(&q.feedback_incorrect.unwrap()));
    assert!(!dom.is_visible(&q.feedback_correct.unwrap()));
    assert!(dom.is_visible(&q.next.unwrap()));
    assert!(!dom.is_visible(&q.check.unwrap()));
    assert!(q.select(&mut dom, 1).is_none());
  }

  #[test]
  fn test_meta_json_prefers_raw() {
    let mut fixture = QuestionFixture::single(&["a"], 0).with_post_id(5);
    assert!(fixture.meta_json().unwrap().contains("\"question_post_id\":5"));
    fixture.raw_meta = Some("{oops".into());
    assert_eq!(fixture.meta_json().as_deref(), Some("{oops"));
    assert_eq!(fixture.expected_id(0), None);
  }
}
