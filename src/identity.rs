//! Canonical question identity resolution.
//!
//! Priority: LearnDash question post id, then pro-quiz question id (from the
//! question meta JSON or the answer list), then DOM position. Position is
//! fragile when the engine reorders questions, so it is only used when the
//! engine exposes no identity metadata at all.

use serde::{Deserialize, Serialize, Serializer};

use crate::dom::QuizDom;
use crate::selectors::SelectorTable;

/// Stable identity key for one question.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QuestionId {
  /// WordPress post id of the question
  Post(u64),
  /// wpProQuiz question id
  ProQuiz(u64),
  /// Index among the question elements under the attached root
  Position(usize),
}

impl std::fmt::Display for QuestionId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      QuestionId::Post(id) => write!(f, "post:{}", id),
      QuestionId::ProQuiz(id) => write!(f, "pro:{}", id),
      QuestionId::Position(index) => write!(f, "pos:{}", index),
    }
  }
}

impl std::str::FromStr for QuestionId {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (prefix, value) = s
      .split_once(':')
      .ok_or_else(|| format!("missing prefix in question id '{}'", s))?;
    let bad = |_| format!("invalid number in question id '{}'", s);
    match prefix {
      "post" => value.parse().map(QuestionId::Post).map_err(bad),
      "pro" => value.parse().map(QuestionId::ProQuiz).map_err(bad),
      "pos" => value.parse().map(QuestionId::Position).map_err(bad),
      _ => Err(format!("unknown question id prefix '{}'", prefix)),
    }
  }
}

impl Serialize for QuestionId {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

/// Subset of LearnDash's `data-question-meta` payload we care about.
#[derive(Debug, Deserialize)]
struct QuestionMeta {
  #[serde(default)]
  question_post_id: Option<serde_json::Value>,
  #[serde(default)]
  question_pro_id: Option<serde_json::Value>,
}

/// Ids arrive as numbers or numeric strings; zero means "unset".
fn parse_id(value: &serde_json::Value) -> Option<u64> {
  let id = match value {
    serde_json::Value::Number(n) => n.as_u64(),
    serde_json::Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }?;
  (id > 0).then_some(id)
}

fn parse_list_id(raw: &str) -> Option<u64> {
  raw.trim().parse::<u64>().ok().filter(|id| *id > 0)
}

/// Resolve identity from raw attribute values.
///
/// `Err` carries the reason the question must be skipped.
pub fn resolve_from_metadata(
  meta: Option<&str>,
  list_id: Option<&str>,
  position: usize,
  position_fallback: bool,
) -> Result<QuestionId, String> {
  let mut unusable = Vec::new();

  if let Some(raw) = meta {
    match serde_json::from_str::<QuestionMeta>(raw) {
      Ok(parsed) => {
        if let Some(id) = parsed.question_post_id.as_ref().and_then(parse_id) {
          return Ok(QuestionId::Post(id));
        }
        if let Some(id) = parsed.question_pro_id.as_ref().and_then(parse_id) {
          return Ok(QuestionId::ProQuiz(id));
        }
        unusable.push("question meta has no usable id".to_string());
      }
      Err(e) => unusable.push(format!("malformed question meta: {}", e)),
    }
  }

  if let Some(raw) = list_id {
    match parse_list_id(raw) {
      Some(id) => return Ok(QuestionId::ProQuiz(id)),
      None => unusable.push(format!("invalid question list id '{}'", raw)),
    }
  }

  if !unusable.is_empty() {
    return Err(unusable.join("; "));
  }

  if position_fallback {
    Ok(QuestionId::Position(position))
  } else {
    Err("no identity metadata and position fallback disabled".to_string())
  }
}

/// Resolve the identity of one question element.
pub fn resolve_identity<D: QuizDom>(
  dom: &D,
  question: &D::Node,
  position: usize,
  selectors: &SelectorTable,
  position_fallback: bool,
) -> Result<QuestionId, String> {
  let meta = dom.attribute(question, &selectors.meta_attribute);
  let list_id = dom
    .query(question, &selectors.question_list)
    .and_then(|list| dom.attribute(&list, &selectors.list_id_attribute));
  resolve_from_metadata(meta.as_deref(), list_id.as_deref(), position, position_fallback)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_post_id_wins() {
    let meta = r#"{"type":"question","question_pro_id":12,"question_post_id":345}"#;
    assert_eq!(
      resolve_from_metadata(Some(meta), Some("12"), 0, true),
      Ok(QuestionId::Post(345))
    );
  }

  #[test]
  fn test_string_ids_accepted() {
    let meta = r#"{"question_pro_id":"12","question_post_id":"0"}"#;
    assert_eq!(
      resolve_from_metadata(Some(meta), None, 0, true),
      Ok(QuestionId::ProQuiz(12))
    );
  }

  #[test]
  fn test_list_id_rescues_malformed_meta() {
    assert_eq!(
      resolve_from_metadata(Some("{not json"), Some("7"), 0, true),
      Ok(QuestionId::ProQuiz(7))
    );
  }

  #[test]
  fn test_position_fallback() {
    assert_eq!(
      resolve_from_metadata(None, None, 3, true),
      Ok(QuestionId::Position(3))
    );
    assert!(resolve_from_metadata(None, None, 3, false).is_err());
  }

  #[test]
  fn test_present_but_unusable_metadata_is_skipped() {
    let err = resolve_from_metadata(Some(""), None, 1, true).unwrap_err();
    assert!(err.contains("malformed question meta"));

    let err = resolve_from_metadata(None, Some("abc"), 1, true).unwrap_err();
    assert!(err.contains("invalid question list id"));
  }

  #[test]
  fn test_display_and_parse() {
    for id in [
      QuestionId::Post(1),
      QuestionId::ProQuiz(22),
      QuestionId::Position(0),
    ] {
      assert_eq!(id.to_string().parse::<QuestionId>(), Ok(id));
    }
    assert!("quiz:1".parse::<QuestionId>().is_err());
  }
}
