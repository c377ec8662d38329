//! Selector table for the quiz engine's DOM contract.
//!
//! Every selector and class name the gate depends on lives here, so a markup
//! change in the host plugin is a one-table edit instead of a hunt through
//! string literals.

use serde::{Deserialize, Serialize};

/// CSS selectors consumed from the engine plus the class names the gate owns.
///
/// Selectors are kept to the compound subset (`tag.class[attr=value]`, comma
/// lists allowed) so the in-memory DOM can match them too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorTable {
  /// One quiz item
  pub question: String,
  /// The answer list inside a question (carries `data-question_id`)
  pub question_list: String,
  /// One answer option row
  pub answer_item: String,
  /// Answer input (radio, checkbox or text)
  pub answer_input: String,
  /// The engine's "check" trigger
  pub check: String,
  /// The engine's "next" trigger
  pub next: String,
  /// The engine's "hint" trigger
  pub hint: String,
  /// Hint content container
  pub hint_content: String,
  /// Response area wrapping both feedback containers
  pub response: String,
  /// Feedback container shown for a correct answer
  pub feedback_correct: String,
  /// Feedback container shown for an incorrect answer
  pub feedback_incorrect: String,
  /// Class the engine puts on an option it graded correct
  pub option_correct_class: String,
  /// Class the engine puts on an option it graded incorrect
  pub option_incorrect_class: String,
  /// Attribute holding the LearnDash question meta JSON
  pub meta_attribute: String,
  /// Attribute on the question list holding the pro-quiz question id
  pub list_id_attribute: String,
  /// Class the gate adds to emphasize the hint trigger
  pub highlight_class: String,
  /// Class of the neutral notice the gate inserts when no hint exists
  pub try_again_class: String,
}

impl Default for SelectorTable {
  fn default() -> Self {
    Self {
      question: ".wpProQuiz_listItem".into(),
      question_list: ".wpProQuiz_questionList".into(),
      answer_item: ".wpProQuiz_questionListItem".into(),
      answer_input: ".wpProQuiz_questionInput".into(),
      check: "input[name=check]".into(),
      next: "input[name=next]".into(),
      hint: "input[name=tip]".into(),
      hint_content: ".wpProQuiz_tipp".into(),
      response: ".wpProQuiz_response".into(),
      feedback_correct: ".wpProQuiz_correct".into(),
      feedback_incorrect: ".wpProQuiz_incorrect".into(),
      option_correct_class: "wpProQuiz_answerCorrect".into(),
      option_incorrect_class: "wpProQuiz_answerIncorrect".into(),
      meta_attribute: "data-question-meta".into(),
      list_id_attribute: "data-question_id".into(),
      highlight_class: "answer-gate-hint-highlight".into(),
      try_again_class: "answer-gate-try-again".into(),
    }
  }
}

// ============================================================================
// Compound selector subset
// ============================================================================

/// One compound selector: `tag.class.class[attr][attr=value]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Compound {
  pub tag: Option<String>,
  pub classes: Vec<String>,
  pub attributes: Vec<(String, Option<String>)>,
}

/// Parse a comma-separated list of compound selectors.
///
/// Returns `None` for anything outside the subset (combinators, pseudo
/// classes), which the in-memory DOM treats as "matches nothing".
pub fn parse_selector_list(selector: &str) -> Option<Vec<Compound>> {
  selector
    .split(',')
    .map(|part| parse_compound(part.trim()))
    .collect()
}

fn parse_compound(input: &str) -> Option<Compound> {
  if input.is_empty()
    || input.contains(char::is_whitespace)
    || input.contains([':', '>', '+', '~', '*', '#'])
  {
    return None;
  }

  let mut compound = Compound::default();
  let mut rest = input;

  let tag_end = rest.find(['.', '[']).unwrap_or(rest.len());
  if tag_end > 0 {
    compound.tag = Some(rest[..tag_end].to_ascii_lowercase());
  }
  rest = &rest[tag_end..];

  while !rest.is_empty() {
    if let Some(after_dot) = rest.strip_prefix('.') {
      let end = after_dot.find(['.', '[']).unwrap_or(after_dot.len());
      if end == 0 {
        return None;
      }
      compound.classes.push(after_dot[..end].to_string());
      rest = &after_dot[end..];
    } else if let Some(after_bracket) = rest.strip_prefix('[') {
      let close = after_bracket.find(']')?;
      let body = &after_bracket[..close];
      let attribute = match body.split_once('=') {
        Some((name, value)) => {
          let value = value.trim_matches(|c| c == '"' || c == '\'');
          (name.trim().to_string(), Some(value.to_string()))
        }
        None => (body.trim().to_string(), None),
      };
      if attribute.0.is_empty() {
        return None;
      }
      compound.attributes.push(attribute);
      rest = &after_bracket[close + 1..];
    } else {
      return None;
    }
  }

  Some(compound)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_class_selector() {
    let list = parse_selector_list(".wpProQuiz_listItem").unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].tag, None);
    assert_eq!(list[0].classes, vec!["wpProQuiz_listItem".to_string()]);
  }

  #[test]
  fn test_parse_tag_with_attribute() {
    let list = parse_selector_list("input[name=\"check\"]").unwrap();
    assert_eq!(list[0].tag.as_deref(), Some("input"));
    assert_eq!(
      list[0].attributes,
      vec![("name".to_string(), Some("check".to_string()))]
    );
  }

  #[test]
  fn test_parse_selector_list() {
    let list = parse_selector_list("li.a.b, [data-x]").unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].classes.len(), 2);
    assert_eq!(list[1].attributes, vec![("data-x".to_string(), None)]);
  }

  #[test]
  fn test_unsupported_selectors_rejected() {
    assert!(parse_selector_list(".a .b").is_none());
    assert!(parse_selector_list("a:hover").is_none());
    assert!(parse_selector_list("").is_none());
  }

  #[test]
  fn test_default_table_parses() {
    let table = SelectorTable::default();
    for selector in [
      &table.question,
      &table.question_list,
      &table.answer_item,
      &table.answer_input,
      &table.check,
      &table.next,
      &table.hint,
      &table.hint_content,
      &table.response,
      &table.feedback_correct,
      &table.feedback_incorrect,
    ] {
      assert!(parse_selector_list(selector).is_some(), "{selector}");
    }
  }
}
