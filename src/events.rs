//! Observable gate events and the notification seam.
//!
//! Other page components (progress sidebar, analytics) subscribe here instead
//! of reading gate state out of the DOM.

use serde::Serialize;

use crate::identity::QuestionId;
use crate::state::Verdict;

/// Something other components may want to react to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GateEvent {
  /// A question's current attempt was graded
  QuestionResolved {
    question: QuestionId,
    verdict: Verdict,
  },
  /// The user opened the hint for the first time
  HintViewed { question: QuestionId },
  /// The question's Next permission changed
  NextEnabled { question: QuestionId, enabled: bool },
  /// An incorrect answer must be followed by viewing the hint
  HintRequired { question: QuestionId },
  /// Counts for the sidebar panel, only when it is enabled
  ProgressChanged {
    answered: usize,
    correct: usize,
    total: usize,
  },
}

impl GateEvent {
  /// DOM event name used by the browser binding.
  pub fn dom_name(&self) -> &'static str {
    match self {
      Self::QuestionResolved { .. } => "answer-gate:question-resolved",
      Self::HintViewed { .. } => "answer-gate:hint-viewed",
      Self::NextEnabled { .. } => "answer-gate:next-enabled",
      Self::HintRequired { .. } => "answer-gate:hint-required",
      Self::ProgressChanged { .. } => "answer-gate:progress",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u32);

type Listener = Box<dyn FnMut(&GateEvent)>;

/// Synchronous in-order fan-out to subscribers.
#[derive(Default)]
pub struct EventBus {
  listeners: Vec<(SubscriptionId, Listener)>,
  next_id: u32,
}

impl EventBus {
  pub fn subscribe(&mut self, listener: impl FnMut(&GateEvent) + 'static) -> SubscriptionId {
    let id = SubscriptionId(self.next_id);
    self.next_id += 1;
    self.listeners.push((id, Box::new(listener)));
    id
  }

  /// Returns false if the subscription was already gone.
  pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
    let before = self.listeners.len();
    self.listeners.retain(|(sid, _)| *sid != id);
    self.listeners.len() != before
  }

  pub fn emit(&mut self, event: &GateEvent) {
    tracing::debug!("event {}", event.dom_name());
    for (_, listener) in self.listeners.iter_mut() {
      listener(event);
    }
  }

  pub fn len(&self) -> usize {
    self.listeners.len()
  }

  pub fn is_empty(&self) -> bool {
    self.listeners.is_empty()
  }
}

impl std::fmt::Debug for EventBus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("EventBus")
      .field("listeners", &self.listeners.len())
      .finish()
  }
}

/// Kind of user-facing prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
  /// Open the hint before moving on
  HintRequired,
  /// Next was pressed before the question allows it
  NextBlocked,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
  pub question: QuestionId,
  pub kind: NoticeKind,
  pub message: String,
}

/// The page's toast/alert layer.
pub trait Notifier {
  fn notify(&mut self, notice: &Notice);
}

/// Collects notices in memory, for tests and replays.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
  pub notices: std::rc::Rc<std::cell::RefCell<Vec<Notice>>>,
}

impl Notifier for RecordingNotifier {
  fn notify(&mut self, notice: &Notice) {
    self.notices.borrow_mut().push(notice.clone());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::RefCell;
  use std::rc::Rc;

  #[test]
  fn test_emit_in_subscription_order() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut bus = EventBus::default();
    for tag in ["a", "b"] {
      let seen = seen.clone();
      bus.subscribe(move |_| seen.borrow_mut().push(tag));
    }
    bus.emit(&GateEvent::HintViewed {
      question: QuestionId::Post(1),
    });
    assert_eq!(*seen.borrow(), vec!["a", "b"]);
  }

  #[test]
  fn test_unsubscribe() {
    let count = Rc::new(RefCell::new(0));
    let mut bus = EventBus::default();
    let id = {
      let count = count.clone();
      bus.subscribe(move |_| *count.borrow_mut() += 1)
    };
    assert!(bus.unsubscribe(id));
    assert!(!bus.unsubscribe(id));
    bus.emit(&GateEvent::ProgressChanged {
      answered: 0,
      correct: 0,
      total: 1,
    });
    assert_eq!(*count.borrow(), 0);
    assert!(bus.is_empty());
  }

  #[test]
  fn test_event_json_shape() {
    let json = serde_json::to_value(GateEvent::NextEnabled {
      question: QuestionId::ProQuiz(9),
      enabled: true,
    })
    .unwrap();
    assert_eq!(json["type"], "next_enabled");
    assert_eq!(json["question"], "pro:9");
    assert_eq!(json["enabled"], true);
  }
}
