//! In-memory page, clock and quiz engine for driving the controller without
//! a browser. Used by the test suite and by the `gate-replay` binary.

pub mod engine;
pub mod memory;
pub mod scenario;
pub mod timers;

use std::cell::RefCell;
use std::rc::Rc;

pub use engine::{FeedbackStyle, PageQuestion, QuestionFixture, QuestionKind, QuizPage};
pub use memory::{MemoryDom, NodeId};
pub use timers::ManualTimers;

use crate::config::{GateConfig, MAX_SETTLE_DELAY_MS};
use crate::controller::{AnswerGateController, AttachMode, Disposition, Handle, UserEvent};
use crate::dom::QuizDom;
use crate::events::{GateEvent, Notice, RecordingNotifier};
use crate::selectors::SelectorTable;
use crate::state::QuestionState;

/// Settle passes before giving up on a page that keeps mutating.
const MAX_SETTLE_ROUNDS: usize = 16;

/// A quiz page with the gate attached, plus the user's hands.
pub struct Simulation {
  pub gate: AnswerGateController<MemoryDom, ManualTimers>,
  pub page: QuizPage,
  pub handle: Handle,
  pub events: Rc<RefCell<Vec<GateEvent>>>,
  pub notices: Rc<RefCell<Vec<Notice>>>,
  selectors: SelectorTable,
}

impl Simulation {
  pub fn new(fixtures: &[QuestionFixture], config: GateConfig) -> Self {
    Self::build(fixtures, config, true)
  }

  /// `observation`: whether the page supports subtree observation.
  pub fn build(fixtures: &[QuestionFixture], config: GateConfig, observation: bool) -> Self {
    let mut dom = MemoryDom::new();
    dom.set_observation_supported(observation);
    let page = QuizPage::build(&mut dom, fixtures);

    let mut gate = AnswerGateController::new(dom, ManualTimers::new());
    let events: Rc<RefCell<Vec<GateEvent>>> = Rc::default();
    {
      let events = events.clone();
      gate.subscribe(move |event| events.borrow_mut().push(event.clone()));
    }
    let notifier = RecordingNotifier::default();
    let notices = notifier.notices.clone();
    gate.set_notifier(notifier);

    let selectors = config.selectors.clone();
    let handle = gate.attach(page.root, config);
    let mut sim = Self {
      gate,
      page,
      handle,
      events,
      notices,
      selectors,
    };
    sim.pump();
    sim
  }

  fn question(&self, q: usize) -> &PageQuestion {
    &self.page.questions[q]
  }

  /// Deliver pending mutation records to the gate.
  pub fn pump(&mut self) {
    if let Some(AttachMode::Observing(observer)) = self.gate.mode(self.handle) {
      let records = self.gate.dom_mut().take_records(observer);
      if !records.is_empty() {
        self.gate.on_mutations(observer, &records);
      }
    }
  }

  /// Let timers run until the gate stops scheduling settle passes.
  pub fn settle(&mut self) {
    for _ in 0..MAX_SETTLE_ROUNDS {
      let fired = self
        .gate
        .timers_mut()
        .advance(u64::from(MAX_SETTLE_DELAY_MS));
      if fired.is_empty() {
        return;
      }
      for timer in fired {
        self.gate.on_timer(timer);
      }
      self.pump();
    }
  }

  /// Advance the clock by `ms`, firing whatever is due.
  pub fn wait(&mut self, ms: u64) {
    for timer in self.gate.timers_mut().advance(ms) {
      self.gate.on_timer(timer);
    }
    self.pump();
  }

  /// Click option `option`. False when the engine has the input disabled.
  pub fn select(&mut self, q: usize, option: usize) -> bool {
    let page_question = &self.page.questions[q];
    let Some(input) = page_question.select(self.gate.dom_mut(), option) else {
      return false;
    };
    self.changed(q, input);
    true
  }

  pub fn type_answer(&mut self, q: usize, text: &str) -> bool {
    let page_question = &self.page.questions[q];
    let Some(input) = page_question.type_answer(self.gate.dom_mut(), text) else {
      return false;
    };
    self.changed(q, input);
    true
  }

  /// A `change` event on `input`: the gate sees it first (capture phase),
  /// then the engine, which grades right away when there is no check button.
  fn changed(&mut self, q: usize, input: NodeId) {
    self.gate.on_user_event(UserEvent::Change(input));
    let page_question = &self.page.questions[q];
    if page_question.check.is_none() {
      page_question.grade(self.gate.dom_mut());
    }
    self.pump();
    self.settle();
  }

  /// Click the check button. False when it is missing or not visible.
  pub fn check(&mut self, q: usize) -> bool {
    let Some(check) = self.question(q).check else {
      return false;
    };
    if !self.gate.dom().is_visible(&check) {
      return false;
    }
    if self.gate.on_user_event(UserEvent::Click(check)) == Disposition::Allow {
      let page_question = &self.page.questions[q];
      page_question.grade(self.gate.dom_mut());
    }
    self.pump();
    self.settle();
    true
  }

  /// Click the hint button. False when there is none.
  pub fn open_hint(&mut self, q: usize) -> bool {
    let Some(hint) = self.question(q).hint else {
      return false;
    };
    if self.gate.on_user_event(UserEvent::Click(hint)) == Disposition::Allow {
      let page_question = &self.page.questions[q];
      page_question.open_hint(self.gate.dom_mut());
    }
    self.pump();
    self.settle();
    true
  }

  /// Click Next, visible or not, and report what the gate decided.
  pub fn press_next(&mut self, q: usize) -> Option<Disposition> {
    let next = self.question(q).next?;
    let disposition = self.gate.on_user_event(UserEvent::Click(next));
    self.pump();
    Some(disposition)
  }

  /// The engine drops a question from the page.
  pub fn remove_question(&mut self, q: usize) {
    let element = self.question(q).element;
    self.gate.dom_mut().detach(element);
    self.pump();
    self.settle();
  }

  pub fn state(&self, q: usize) -> Option<QuestionState> {
    let id = self.question(q).fixture.expected_id(q)?;
    self.gate.evaluate(&id)
  }

  pub fn next_visible(&self, q: usize) -> bool {
    self
      .question(q)
      .next
      .is_some_and(|next| self.gate.dom().is_visible(&next))
  }

  pub fn hint_visible(&self, q: usize) -> bool {
    self
      .question(q)
      .hint
      .is_some_and(|hint| self.gate.dom().is_visible(&hint))
  }

  pub fn hint_highlighted(&self, q: usize) -> bool {
    self
      .question(q)
      .hint
      .is_some_and(|hint| self.gate.dom().has_class(&hint, &self.selectors.highlight_class))
  }

  /// The neutral try-again notice is on screen.
  pub fn try_again_visible(&self, q: usize) -> bool {
    let dom = self.gate.dom();
    let class_selector = format!(".{}", self.selectors.try_again_class);
    dom
      .query_all(&self.question(q).element, &class_selector)
      .iter()
      .any(|notice| dom.is_visible(notice))
  }

  pub fn take_events(&self) -> Vec<GateEvent> {
    std::mem::take(&mut *self.events.borrow_mut())
  }
}
