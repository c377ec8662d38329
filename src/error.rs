//! Error taxonomy and diagnostics.
//!
//! Nothing here is fatal to the page: the controller records these as
//! diagnostics and keeps going, except for `DomError` on a corrective write,
//! which degrades the attachment to the engine's native behavior.

use serde::Serialize;
use thiserror::Error;

use crate::identity::QuestionId;

/// Which engine affordance was expected but absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Affordance {
  Check,
  Next,
  Hint,
}

impl Affordance {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Check => "check",
      Self::Next => "next",
      Self::Hint => "hint",
    }
  }
}

impl std::fmt::Display for Affordance {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Recoverable conditions the controller records while managing a page.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GateError {
  /// A question element had no derivable stable id; it is skipped
  #[error("question at position {position} skipped: {reason}")]
  IdentityResolutionFailure { position: usize, reason: String },

  /// An engine affordance is missing; the dependent policy branch is off
  #[error("question {question} has no {affordance} trigger")]
  MissingAffordance {
    question: QuestionId,
    affordance: Affordance,
  },

  /// Correct and incorrect signals were both present
  #[error("question {question} shows conflicting feedback, resolved by priority order")]
  AmbiguousCorrectness { question: QuestionId },

  /// The selector table matched no question markup
  #[error("no question markup under the attached root")]
  EngineIncompatibility,

  /// A corrective write failed and the attachment fell back to native behavior
  #[error("degraded to native behavior: {reason}")]
  Degraded { reason: String },
}

impl GateError {
  /// Short machine-readable name, used to de-duplicate diagnostics.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::IdentityResolutionFailure { .. } => "identity_resolution_failure",
      Self::MissingAffordance { .. } => "missing_affordance",
      Self::AmbiguousCorrectness { .. } => "ambiguous_correctness",
      Self::EngineIncompatibility => "engine_incompatibility",
      Self::Degraded { .. } => "degraded",
    }
  }
}

/// Failure reported by a `QuizDom` implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
  #[error("node is no longer attached to the document")]
  Detached,
  #[error("DOM operation '{op}' failed: {message}")]
  Operation { op: &'static str, message: String },
}

/// Failure loading or parsing gate configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("invalid settings JSON: {0}")]
  Json(#[from] serde_json::Error),
  #[error("invalid config.toml: {0}")]
  Toml(#[from] toml::de::Error),
  #[error("IO error reading {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
}

/// A recorded diagnostic with the host time it was observed at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
  pub at_ms: u64,
  pub error: GateError,
}

/// Ordered, de-duplicated diagnostic log.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
  entries: Vec<Diagnostic>,
}

impl Diagnostics {
  /// Record `error` unless an equal one is already present.
  ///
  /// Returns true when the entry is new, so callers log it once.
  pub fn record(&mut self, at_ms: u64, error: GateError) -> bool {
    if self.entries.iter().any(|d| d.error == error) {
      return false;
    }
    tracing::warn!("{}", error);
    self.entries.push(Diagnostic { at_ms, error });
    true
  }

  pub fn entries(&self) -> &[Diagnostic] {
    &self.entries
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Count entries of one kind (see `GateError::kind`).
  pub fn count_kind(&self, kind: &str) -> usize {
    self.entries.iter().filter(|d| d.error.kind() == kind).count()
  }
}

/// Best-effort results: the page keeps working, the failure goes to the log.
pub trait LogOnError<T> {
  /// Warn with `context` prefixed and drop the error
  fn log_warn(self, context: &str) -> Option<T>;
  /// Like `log_warn`, falling back to `T::default()`
  fn log_warn_default(self, context: &str) -> T
  where
    T: Default;
}

impl<T, E: std::fmt::Display> LogOnError<T> for std::result::Result<T, E> {
  fn log_warn(self, context: &str) -> Option<T> {
    match self {
      Ok(v) => Some(v),
      Err(e) => {
        tracing::warn!("{}: {}", context, e);
        None
      }
    }
  }

  fn log_warn_default(self, context: &str) -> T
  where
    T: Default,
  {
    self.log_warn(context).unwrap_or_default()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_diagnostics_deduplicate() {
    let mut diagnostics = Diagnostics::default();
    assert!(diagnostics.record(1, GateError::EngineIncompatibility));
    assert!(!diagnostics.record(2, GateError::EngineIncompatibility));
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics.entries()[0].at_ms, 1);
  }

  #[test]
  fn test_missing_affordance_message() {
    let error = GateError::MissingAffordance {
      question: QuestionId::Post(12),
      affordance: Affordance::Hint,
    };
    assert_eq!(error.to_string(), "question post:12 has no hint trigger");
    assert_eq!(error.kind(), "missing_affordance");
  }

  #[test]
  fn test_log_warn_default() {
    let failed: Result<u32, DomError> = Err(DomError::Detached);
    assert_eq!(failed.log_warn_default("write"), 0);
    let ok: Result<u32, DomError> = Ok(7);
    assert_eq!(ok.log_warn("write"), Some(7));
  }
}
