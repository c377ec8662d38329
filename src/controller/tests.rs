use super::*;
use crate::dom::DisplayOverride;
use crate::events::NoticeKind;
use crate::sim::{FeedbackStyle, ManualTimers, MemoryDom, QuestionFixture, QuestionKind, Simulation};

// ==================== Fixtures ====================

fn capital(post_id: u64) -> QuestionFixture {
  QuestionFixture::single(&["Paris", "Lyon", "Nice"], 0)
    .with_post_id(post_id)
    .with_hint("It is the capital.")
}

fn config(force_hint_mode: bool) -> GateConfig {
  GateConfig {
    force_hint_mode,
    ..GateConfig::default()
  }
}

fn answered_wrong(force_hint_mode: bool) -> Simulation {
  let mut sim = Simulation::new(&[capital(7)], config(force_hint_mode));
  assert!(sim.select(0, 1));
  assert!(sim.check(0));
  sim
}

/// Next is enabled only by a correct answer or the force-hint bypass, and
/// the page shows exactly what the state says.
fn assert_next_policy(sim: &Simulation, q: usize, force_hint_mode: bool) {
  let Some(state) = sim.state(q) else {
    return;
  };
  if state.next_enabled {
    assert!(
      state.phase == Phase::Correct
        || (force_hint_mode && state.hint_viewed && state.selection.is_present()),
      "next enabled without grounds: {:?}",
      state
    );
  }
  assert_eq!(sim.next_visible(q), state.next_enabled, "{:?}", state);
}

// ==================== Scenarios ====================

#[test]
fn test_wrong_answer_surfaces_hint_in_force_mode() {
  let sim = answered_wrong(true);
  let state = sim.state(0).unwrap();
  assert_eq!(state.phase, Phase::Incorrect);
  assert!(!state.next_enabled);
  assert!(sim.hint_visible(0));
  assert!(sim.hint_highlighted(0));
  assert!(!sim.next_visible(0));

  let notices = sim.notices.borrow();
  assert_eq!(notices.len(), 1);
  assert_eq!(notices[0].kind, NoticeKind::HintRequired);
}

#[test]
fn test_viewed_hint_unlocks_next_in_force_mode() {
  let mut sim = answered_wrong(true);
  sim.take_events();
  assert!(sim.open_hint(0));

  let state = sim.state(0).unwrap();
  assert!(state.hint_viewed);
  assert!(state.selection.is_present());
  assert!(state.next_enabled);
  assert!(sim.next_visible(0));
  assert_eq!(sim.press_next(0), Some(Disposition::Allow));

  let events = sim.take_events();
  assert!(events.contains(&GateEvent::HintViewed {
    question: QuestionId::Post(7)
  }));
  assert!(events.contains(&GateEvent::NextEnabled {
    question: QuestionId::Post(7),
    enabled: true
  }));
}

#[test]
fn test_correct_answer_unlocks_next_without_forcing_hint() {
  let mut sim = Simulation::new(&[capital(3)], config(false));
  sim.take_events();
  assert!(sim.select(0, 0));
  assert!(sim.check(0));

  let state = sim.state(0).unwrap();
  assert_eq!(state.phase, Phase::Correct);
  assert!(state.next_enabled);
  assert!(sim.next_visible(0));
  assert!(!sim.hint_highlighted(0));
  let hint = sim.page.questions[0].hint.unwrap();
  assert_eq!(sim.gate.dom().display_override(hint), DisplayOverride::Native);

  assert_eq!(
    sim.take_events(),
    vec![
      GateEvent::QuestionResolved {
        question: QuestionId::Post(3),
        verdict: Verdict::Correct
      },
      GateEvent::NextEnabled {
        question: QuestionId::Post(3),
        enabled: true
      },
    ]
  );
}

#[test]
fn test_reselect_after_incorrect_clears_stale_feedback() {
  let mut sim = answered_wrong(false);
  assert!(sim.open_hint(0));
  assert!(sim.state(0).unwrap().hint_viewed);

  assert!(sim.select(0, 2));
  let state = sim.state(0).unwrap();
  assert_eq!(state.phase, Phase::Answered);
  assert!(state.hint_viewed);

  let q = sim.page.questions[0].clone();
  let dom = sim.gate.dom();
  assert!(!dom.is_visible(&q.feedback_incorrect.unwrap()));
  assert_eq!(dom.display_override(q.response), DisplayOverride::Hidden);
  assert!(dom.is_visible(&q.check.unwrap()));
  assert!(!sim.hint_highlighted(0));
  assert!(!sim.next_visible(0));
}

#[test]
fn test_question_graded_on_change_recovers_after_wrong_answer() {
  for observation in [true, false] {
    let mut fixture = capital(11);
    fixture.has_check = false;
    let mut sim = Simulation::build(&[fixture], config(true), observation);
    assert_eq!(sim.gate.diagnostics().count_kind("missing_affordance"), 1);
    assert!(!sim.check(0));

    assert!(sim.select(0, 1));
    let state = sim.state(0).unwrap();
    assert_eq!(state.phase, Phase::Incorrect);
    assert!(sim.hint_highlighted(0));
    assert!(!sim.next_visible(0));
    assert_eq!(sim.notices.borrow().len(), 1);

    // The engine re-grades on change; the old incorrect marker must not stick
    assert!(sim.select(0, 0));
    let state = sim.state(0).unwrap();
    assert_eq!(state.phase, Phase::Correct, "observation: {}", observation);
    assert!(state.next_enabled);
    assert!(sim.next_visible(0));
    assert_eq!(sim.press_next(0), Some(Disposition::Allow));
    assert_eq!(sim.notices.borrow().len(), 1);
  }
}

#[test]
fn test_unidentifiable_question_is_skipped() {
  let mut broken = QuestionFixture::single(&["x", "y"], 0);
  broken.raw_meta = Some("{not json".into());
  let sim = Simulation::new(&[capital(1), broken, capital(2)], config(true));

  let states = sim.gate.questions(sim.handle);
  assert_eq!(states.len(), 2);
  assert_eq!(states[0].question_id, QuestionId::Post(1));
  assert_eq!(states[1].question_id, QuestionId::Post(2));
  assert_eq!(sim.gate.diagnostics().count_kind("identity_resolution_failure"), 1);
  assert!(!sim.next_visible(0));
  assert!(!sim.next_visible(2));
}

#[test]
fn test_no_metadata_without_position_fallback_is_skipped() {
  let sim = Simulation::new(
    &[QuestionFixture::single(&["a"], 0), capital(9)],
    GateConfig {
      position_fallback: false,
      ..GateConfig::default()
    },
  );
  let states = sim.gate.questions(sim.handle);
  assert_eq!(states.len(), 1);
  assert_eq!(states[0].question_id, QuestionId::Post(9));
}

#[test]
fn test_position_fallback_identity() {
  let mut sim = Simulation::new(&[QuestionFixture::single(&["a", "b"], 1)], config(false));
  assert_eq!(sim.state(0).unwrap().question_id, QuestionId::Position(0));
  assert!(sim.select(0, 1));
  assert!(sim.check(0));
  assert_eq!(sim.state(0).unwrap().phase, Phase::Correct);
}

// ==================== Properties ====================

#[test]
fn test_hint_flag_never_reverts() {
  let mut sim = Simulation::new(&[capital(5)], config(true));
  let mut seen = false;
  let mut observe = |sim: &Simulation| {
    let viewed = sim.state(0).unwrap().hint_viewed;
    assert!(!(seen && !viewed), "hint_viewed reverted");
    seen |= viewed;
  };

  sim.open_hint(0);
  observe(&sim);
  sim.select(0, 1);
  observe(&sim);
  sim.check(0);
  observe(&sim);
  sim.select(0, 2);
  observe(&sim);
  sim.gate.rescan(sim.handle);
  observe(&sim);
  sim.check(0);
  observe(&sim);
  sim.select(0, 0);
  sim.check(0);
  observe(&sim);
  assert!(seen);
}

#[test]
fn test_next_requires_correct_or_hint_bypass() {
  for force in [false, true] {
    let mut sim = Simulation::new(&[capital(1)], config(force));
    assert_next_policy(&sim, 0, force);
    sim.select(0, 1);
    assert_next_policy(&sim, 0, force);
    sim.check(0);
    assert_next_policy(&sim, 0, force);
    sim.select(0, 2);
    assert_next_policy(&sim, 0, force);
    sim.open_hint(0);
    assert_next_policy(&sim, 0, force);
    sim.check(0);
    assert_next_policy(&sim, 0, force);
    assert_eq!(sim.state(0).unwrap().next_enabled, force);
    sim.select(0, 0);
    sim.check(0);
    assert_next_policy(&sim, 0, force);
    assert_eq!(sim.state(0).unwrap().phase, Phase::Correct);
  }
}

#[test]
fn test_rescan_is_idempotent() {
  let mut sim = answered_wrong(true);
  sim.take_events();
  let writes = sim.gate.write_count();
  let diagnostics = sim.gate.diagnostics().len();
  let states = sim.gate.questions(sim.handle);

  sim.gate.rescan(sim.handle);
  sim.gate.rescan(sim.handle);

  assert_eq!(sim.gate.write_count(), writes);
  assert_eq!(sim.gate.diagnostics().len(), diagnostics);
  assert_eq!(sim.gate.questions(sim.handle), states);
  assert!(sim.take_events().is_empty());
  assert_eq!(sim.notices.borrow().len(), 1);
}

#[test]
fn test_own_writes_do_not_retrigger() {
  let mut sim = Simulation::new(&[capital(1)], config(true));
  assert!(sim.gate.write_count() > 0);
  assert_eq!(sim.gate.timers().pending_count(), 0);

  sim.select(0, 1);
  sim.check(0);
  let writes = sim.gate.write_count();

  let AttachMode::Observing(observer) = sim.gate.mode(sim.handle).unwrap() else {
    panic!("expected observation");
  };
  // Nothing left from our own writes, and a fresh pass writes nothing
  assert!(sim.gate.dom_mut().take_records(observer).is_empty());
  assert_eq!(sim.gate.timers().pending_count(), 0);
  sim.gate.rescan(sim.handle);
  assert_eq!(sim.gate.write_count(), writes);
}

#[test]
fn test_foreign_mutation_arms_single_settle() {
  let mut sim = Simulation::new(&[capital(1)], config(false));
  let AttachMode::Observing(observer) = sim.gate.mode(sim.handle).unwrap() else {
    panic!("expected observation");
  };
  let element = sim.page.questions[0].element;
  sim.gate.dom_mut().add_class(element, "engine-touched");
  sim.gate.dom_mut().add_class(element, "engine-touched-again");
  let records = sim.gate.dom_mut().take_records(observer);
  sim.gate.on_mutations(observer, &records);
  sim.gate.on_mutations(observer, &records);
  assert_eq!(sim.gate.timers().pending_count(), 1);
  sim.settle();
  assert_eq!(sim.gate.timers().pending_count(), 0);
}

// ==================== Policy details ====================

#[test]
fn test_hidden_next_click_is_blocked_with_notice() {
  let mut sim = answered_wrong(false);
  assert_eq!(sim.press_next(0), Some(Disposition::Block));
  let notices = sim.notices.borrow();
  let last = notices.last().unwrap();
  assert_eq!(last.kind, NoticeKind::NextBlocked);
  assert_eq!(last.message, GateConfig::default().try_again_text);
}

#[test]
fn test_hint_required_once_per_attempt() {
  let mut sim = answered_wrong(true);
  let required = |sim: &Simulation| {
    sim
      .notices
      .borrow()
      .iter()
      .filter(|n| n.kind == NoticeKind::HintRequired)
      .count()
  };
  assert_eq!(required(&sim), 1);

  sim.gate.rescan(sim.handle);
  assert_eq!(required(&sim), 1);

  sim.select(0, 2);
  sim.check(0);
  assert_eq!(sim.state(0).unwrap().phase, Phase::Incorrect);
  assert_eq!(required(&sim), 2);
}

#[test]
fn test_question_without_hint_gets_try_again_notice() {
  let fixture = QuestionFixture::single(&["a", "b"], 0).with_post_id(4);
  let mut sim = Simulation::new(&[fixture], config(true));
  sim.select(0, 1);
  sim.check(0);

  let state = sim.state(0).unwrap();
  assert_eq!(state.phase, Phase::Incorrect);
  assert!(!state.hint_available);
  assert!(sim.try_again_visible(0));
  assert!(sim.notices.borrow().is_empty());
  assert_eq!(
    sim.gate.diagnostics().count_kind("missing_affordance"),
    1,
    "hint trigger missing in force mode"
  );

  sim.select(0, 0);
  assert!(!sim.try_again_visible(0));
  sim.check(0);
  assert_eq!(sim.state(0).unwrap().phase, Phase::Correct);
}

#[test]
fn test_engine_owned_next_when_not_required() {
  let mut sim = Simulation::new(
    &[capital(1)],
    GateConfig {
      require_correct_for_next: false,
      ..GateConfig::default()
    },
  );
  sim.select(0, 1);
  sim.check(0);
  let next = sim.page.questions[0].next.unwrap();
  assert_eq!(sim.gate.dom().display_override(next), DisplayOverride::Native);
  assert!(sim.next_visible(0));
  assert!(!sim.state(0).unwrap().next_enabled);
  assert_eq!(sim.press_next(0), Some(Disposition::Allow));
}

#[test]
fn test_option_marks_and_text_feedback() {
  let marks = QuestionFixture::single(&["a", "b"], 0)
    .with_post_id(1)
    .with_feedback(FeedbackStyle::OptionMarks);
  let text = QuestionFixture::single(&["a", "b"], 0)
    .with_post_id(2)
    .with_feedback(FeedbackStyle::TextOnly);
  let mut sim = Simulation::new(&[marks, text], config(false));

  sim.select(0, 1);
  sim.check(0);
  assert_eq!(sim.state(0).unwrap().phase, Phase::Incorrect);

  sim.select(1, 0);
  sim.check(1);
  assert_eq!(sim.state(1).unwrap().phase, Phase::Correct);
}

#[test]
fn test_partial_multi_select_is_incorrect_until_completed() {
  let fixture = QuestionFixture {
    kind: QuestionKind::Multiple,
    correct: vec![0, 2],
    ..QuestionFixture::single(&["2", "3", "5", "9"], 0)
  }
  .with_post_id(12)
  .with_feedback(FeedbackStyle::OptionMarks);
  let mut sim = Simulation::new(&[fixture], config(false));

  assert!(sim.select(0, 0));
  assert!(sim.check(0));
  let state = sim.state(0).unwrap();
  assert_eq!(state.phase, Phase::Incorrect);
  assert!(!state.next_enabled);
  assert!(!sim.next_visible(0));
  assert_eq!(sim.press_next(0), Some(Disposition::Block));
  assert_eq!(sim.gate.diagnostics().count_kind("ambiguous_correctness"), 0);

  assert!(sim.select(0, 2));
  assert_eq!(sim.state(0).unwrap().phase, Phase::Answered);
  assert!(sim.check(0));
  let state = sim.state(0).unwrap();
  assert_eq!(state.phase, Phase::Correct);
  assert_eq!(state.selection.values().to_vec(), vec!["1".to_string(), "3".to_string()]);
  assert!(sim.next_visible(0));
}

#[test]
fn test_conflicting_feedback_is_recorded() {
  let mut sim = Simulation::new(&[capital(8)], config(false));
  sim.select(0, 0);
  let q = sim.page.questions[0].clone();
  {
    let dom = sim.gate.dom_mut();
    dom.set_inline_shown(q.response, true);
    dom.set_inline_shown(q.feedback_correct.unwrap(), true);
    dom.set_inline_shown(q.feedback_incorrect.unwrap(), true);
  }
  sim.pump();
  sim.settle();

  assert_eq!(sim.state(0).unwrap().phase, Phase::Correct);
  assert_eq!(sim.gate.diagnostics().count_kind("ambiguous_correctness"), 1);
}

#[test]
fn test_correct_is_terminal() {
  let mut sim = Simulation::new(&[capital(8)], config(false));
  sim.select(0, 0);
  sim.check(0);
  let q = sim.page.questions[0].clone();
  {
    let dom = sim.gate.dom_mut();
    dom.set_inline_shown(q.feedback_correct.unwrap(), false);
    dom.set_inline_shown(q.feedback_incorrect.unwrap(), true);
  }
  sim.pump();
  sim.settle();
  let state = sim.state(0).unwrap();
  assert_eq!(state.phase, Phase::Correct);
  assert!(state.next_enabled);
}

#[test]
fn test_progress_events_follow_sidebar_setting() {
  let fixtures = [capital(1), capital(2)];
  let mut sim = Simulation::new(
    &fixtures,
    GateConfig {
      sidebar_enabled: true,
      ..GateConfig::default()
    },
  );
  sim.select(0, 0);
  sim.check(0);
  let progress: Vec<GateEvent> = sim
    .take_events()
    .into_iter()
    .filter(|e| matches!(e, GateEvent::ProgressChanged { .. }))
    .collect();
  assert_eq!(
    progress.last(),
    Some(&GateEvent::ProgressChanged {
      answered: 1,
      correct: 1,
      total: 2
    })
  );

  let mut quiet = Simulation::new(&fixtures, config(false));
  quiet.select(0, 0);
  assert!(!quiet
    .take_events()
    .iter()
    .any(|e| matches!(e, GateEvent::ProgressChanged { .. })));
}

// ==================== Lifecycle ====================

#[test]
fn test_removed_question_is_dropped() {
  let mut sim = Simulation::new(&[capital(1), capital(2)], config(false));
  sim.remove_question(1);
  assert!(sim.state(1).is_none());
  assert!(sim.state(0).is_some());
  assert_eq!(sim.gate.questions(sim.handle).len(), 1);
}

#[test]
fn test_polling_when_observation_unavailable() {
  let mut sim = Simulation::build(&[capital(1)], config(false), false);
  assert!(matches!(sim.gate.mode(sim.handle), Some(AttachMode::Polling(_))));

  sim.select(0, 0);
  // Engine grades without the gate seeing a click
  let q = sim.page.questions[0].clone();
  q.grade(sim.gate.dom_mut());
  assert_eq!(sim.state(0).unwrap().phase, Phase::Answered);

  sim.wait(1000);
  assert_eq!(sim.state(0).unwrap().phase, Phase::Correct);
  assert!(sim.next_visible(0));
}

#[test]
fn test_root_without_questions_stays_idle() {
  let dom = MemoryDom::new();
  let body = dom.body();
  let mut gate = AnswerGateController::new(dom, ManualTimers::new());
  let handle = gate.attach(body, GateConfig::default());
  assert_eq!(gate.mode(handle), Some(AttachMode::Idle));
  assert_eq!(gate.diagnostics().count_kind("engine_incompatibility"), 1);
  assert_eq!(gate.timers().pending_count(), 0);
  assert!(gate.questions(handle).is_empty());
}

#[test]
fn test_failed_write_degrades_to_native() {
  let mut sim = Simulation::new(&[capital(1)], config(true));
  sim.gate.dom_mut().set_fail_writes(true);
  sim.select(0, 1);
  sim.check(0);

  assert_eq!(sim.gate.mode(sim.handle), Some(AttachMode::Degraded));
  assert_eq!(sim.gate.diagnostics().count_kind("degraded"), 1);
  assert!(sim.gate.questions(sim.handle).is_empty());
  assert_eq!(sim.gate.timers().pending_count(), 0);
  assert_eq!(sim.press_next(0), Some(Disposition::Allow));
}

#[test]
fn test_detach_restores_native_presentation() {
  let mut sim = answered_wrong(false);
  assert!(sim.hint_highlighted(0));
  sim.gate.detach(sim.handle);

  let q = sim.page.questions[0].clone();
  assert_eq!(sim.gate.mode(sim.handle), None);
  assert!(!sim.hint_highlighted(0));
  assert_eq!(sim.gate.dom().display_override(q.next.unwrap()), DisplayOverride::Native);
  assert_eq!(sim.gate.dom().display_override(q.hint.unwrap()), DisplayOverride::Native);
  assert!(sim.next_visible(0));
  assert!(sim.gate.evaluate(&QuestionId::Post(7)).is_none());

  sim.take_events();
  sim.select(0, 0);
  assert!(sim.take_events().is_empty());
  sim.gate.detach(sim.handle);
}

#[test]
fn test_unsubscribed_listener_gets_nothing() {
  let mut sim = Simulation::new(&[capital(1)], config(false));
  let count = std::rc::Rc::new(std::cell::RefCell::new(0));
  let id = {
    let count = count.clone();
    sim.gate.subscribe(move |_| *count.borrow_mut() += 1)
  };
  assert!(sim.gate.unsubscribe(id));
  sim.select(0, 0);
  sim.check(0);
  assert_eq!(*count.borrow(), 0);
}
