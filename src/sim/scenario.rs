//! Scripted quiz sessions loaded from TOML, run against the simulation.
//!
//! ```toml
//! name = "hint after a wrong answer"
//!
//! [gate]
//! force_hint_mode = true
//!
//! [[questions]]
//! post_id = 11
//! options = ["Paris", "Lyon"]
//! correct = [0]
//! hint = "It is the capital."
//!
//! [[steps]]
//! action = "select"
//! question = 0
//! option = 1
//!
//! [[steps]]
//! action = "expect"
//! question = 0
//! phase = "answered"
//! next_visible = false
//! ```

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{QuestionFixture, Simulation};
use crate::config::GateConfig;
use crate::controller::Disposition;
use crate::error::{ConfigError, Diagnostic};
use crate::events::{GateEvent, Notice};
use crate::state::{Phase, QuestionState};

fn default_true() -> bool {
  true
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
  pub name: String,
  /// Falls back to the caller's configuration when absent
  #[serde(default)]
  pub gate: Option<GateConfig>,
  #[serde(default = "default_true")]
  pub observation: bool,
  pub questions: Vec<QuestionFixture>,
  #[serde(default)]
  pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
  Select {
    question: usize,
    option: usize,
  },
  Type {
    question: usize,
    text: String,
  },
  Check {
    question: usize,
  },
  Hint {
    question: usize,
  },
  Next {
    question: usize,
    #[serde(default)]
    expect_blocked: Option<bool>,
  },
  Wait {
    ms: u64,
  },
  Remove {
    question: usize,
  },
  Rescan,
  Detach,
  Expect {
    question: usize,
    #[serde(default)]
    phase: Option<Phase>,
    #[serde(default)]
    next_enabled: Option<bool>,
    #[serde(default)]
    hint_viewed: Option<bool>,
    #[serde(default)]
    next_visible: Option<bool>,
    #[serde(default)]
    hint_highlighted: Option<bool>,
    #[serde(default)]
    try_again_visible: Option<bool>,
    /// Expect the question to be untracked
    #[serde(default)]
    absent: bool,
  },
}

impl Scenario {
  pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
    Ok(toml::from_str(raw)?)
  }

  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.display().to_string(),
      source,
    })?;
    Self::from_toml_str(&raw)
  }
}

/// Outcome of one scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
  pub scenario: String,
  pub generated_at: DateTime<Utc>,
  pub questions: Vec<QuestionState>,
  pub events: Vec<GateEvent>,
  pub notices: Vec<Notice>,
  pub diagnostics: Vec<Diagnostic>,
  pub writes: u64,
  pub failures: Vec<String>,
  /// Final markup of the quiz root, gate overrides rendered as `hidden`
  pub page_html: String,
}

impl Report {
  pub fn passed(&self) -> bool {
    self.failures.is_empty()
  }
}

fn expect_eq<V: PartialEq + std::fmt::Debug>(
  failures: &mut Vec<String>,
  step: usize,
  what: &str,
  want: Option<V>,
  have: V,
) {
  if let Some(want) = want {
    if want != have {
      failures.push(format!("step {}: {} expected {:?}, got {:?}", step, what, want, have));
    }
  }
}

/// Run `scenario`, using `defaults` when it carries no `[gate]` table.
pub fn run(scenario: &Scenario, defaults: &GateConfig) -> Report {
  let config = scenario.gate.clone().unwrap_or_else(|| defaults.clone());
  let mut sim = Simulation::build(&scenario.questions, config, scenario.observation);
  let mut failures = Vec::new();
  let mut detached = false;
  let count = scenario.questions.len();

  for (n, step) in scenario.steps.iter().enumerate() {
    let step_no = n + 1;
    let question = match step {
      Step::Select { question, .. }
      | Step::Type { question, .. }
      | Step::Check { question }
      | Step::Hint { question }
      | Step::Next { question, .. }
      | Step::Remove { question }
      | Step::Expect { question, .. } => Some(*question),
      Step::Wait { .. } | Step::Rescan | Step::Detach => None,
    };
    if question.is_some_and(|q| q >= count) {
      failures.push(format!("step {}: no question {}", step_no, question.unwrap_or_default()));
      continue;
    }

    match step {
      Step::Select { question, option } => {
        if !sim.select(*question, *option) {
          failures.push(format!("step {}: option {} not selectable", step_no, option));
        }
      }
      Step::Type { question, text } => {
        if !sim.type_answer(*question, text) {
          failures.push(format!("step {}: question {} takes no typed answer", step_no, question));
        }
      }
      Step::Check { question } => {
        if !sim.check(*question) {
          failures.push(format!("step {}: check not available", step_no));
        }
      }
      Step::Hint { question } => {
        if !sim.open_hint(*question) {
          failures.push(format!("step {}: question {} has no hint", step_no, question));
        }
      }
      Step::Next {
        question,
        expect_blocked,
      } => {
        let blocked = sim.press_next(*question) == Some(Disposition::Block);
        expect_eq(&mut failures, step_no, "next blocked", *expect_blocked, blocked);
      }
      Step::Wait { ms } => sim.wait(*ms),
      Step::Remove { question } => sim.remove_question(*question),
      Step::Rescan => {
        sim.gate.rescan(sim.handle);
        sim.pump();
      }
      Step::Detach => {
        sim.gate.detach(sim.handle);
        detached = true;
      }
      Step::Expect {
        question,
        phase,
        next_enabled,
        hint_viewed,
        next_visible,
        hint_highlighted,
        try_again_visible,
        absent,
      } => {
        let state = sim.state(*question);
        if *absent {
          if state.is_some() {
            failures.push(format!("step {}: question {} still tracked", step_no, question));
          }
        } else if let Some(state) = state {
          expect_eq(&mut failures, step_no, "phase", *phase, state.phase);
          expect_eq(&mut failures, step_no, "next_enabled", *next_enabled, state.next_enabled);
          expect_eq(&mut failures, step_no, "hint_viewed", *hint_viewed, state.hint_viewed);
        } else if !detached {
          failures.push(format!("step {}: question {} not tracked", step_no, question));
        }
        expect_eq(&mut failures, step_no, "next_visible", *next_visible, sim.next_visible(*question));
        expect_eq(
          &mut failures,
          step_no,
          "hint_highlighted",
          *hint_highlighted,
          sim.hint_highlighted(*question),
        );
        expect_eq(
          &mut failures,
          step_no,
          "try_again_visible",
          *try_again_visible,
          sim.try_again_visible(*question),
        );
      }
    }
  }

  for failure in &failures {
    tracing::warn!("{}: {}", scenario.name, failure);
  }

  Report {
    scenario: scenario.name.clone(),
    generated_at: Utc::now(),
    questions: sim.gate.questions(sim.handle),
    events: sim.take_events(),
    notices: sim.notices.borrow().clone(),
    diagnostics: sim.gate.diagnostics().entries().to_vec(),
    writes: sim.gate.write_count(),
    failures,
    page_html: sim.gate.dom().outer_html(sim.page.root),
  }
}
