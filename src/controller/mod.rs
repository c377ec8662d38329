//! The answer-gate controller.
//!
//! One controller per page. Each `attach` call manages the questions under a
//! root element: it owns their `QuestionState`, reacts to user events and to
//! engine-driven DOM mutations (after a short settle delay), and keeps the
//! Next/Hint presentation in line with the gate policy.
//!
//! Entry points are plain method calls. The host binding forwards DOM events,
//! mutation batches and fired timers; tests drive the same calls through the
//! in-memory simulation.

use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::config::GateConfig;
use crate::dom::{MutationKind, MutationRecord, ObserverId, QuizDom, TimerId, Timers};
use crate::error::{Affordance, Diagnostics, DomError, GateError};
use crate::events::{EventBus, GateEvent, Notice, NoticeKind, Notifier, SubscriptionId};
use crate::identity::{resolve_identity, QuestionId};
use crate::inference::{collect_evidence, infer, PhraseMatcher};
use crate::presentation::{self, Applied, Presentation, QuestionNodes, WriteKind};
use crate::state::{Phase, QuestionState, Selection, Transition, Verdict};

#[cfg(test)]
mod tests;

/// Identifies one attachment; pass it back to `detach`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u32);

/// A user interaction forwarded by the host, targeting the event's node.
#[derive(Debug, Clone, PartialEq)]
pub enum UserEvent<N> {
  Change(N),
  Click(N),
}

/// Whether the host should let the engine see the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
  Allow,
  /// Swallow the event (a Next click the policy does not allow)
  Block,
}

/// How an attachment learns about engine changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachMode {
  /// No question markup was found; nothing is managed
  Idle,
  Observing(ObserverId),
  /// Observation unavailable; bounded periodic rescan
  Polling(TimerId),
  /// A corrective write failed; the engine's native behavior is back
  Degraded,
}

enum Outgoing {
  Event(GateEvent),
  Notice(Notice),
}

/// Everything attachments share: the page seams plus bookkeeping.
struct Env<D, T> {
  dom: D,
  timers: T,
  diagnostics: Diagnostics,
  writes: u64,
  outbox: Vec<Outgoing>,
}

impl<D, T: Timers> Env<D, T> {
  fn record(&mut self, error: GateError) {
    let now = self.timers.now_ms();
    self.diagnostics.record(now, error);
  }
}

struct Tracked<N> {
  node: N,
  state: QuestionState,
  nodes: QuestionNodes<N>,
  applied: Applied<N>,
  /// Re-selected after an incorrect answer, check not pressed yet
  stale_feedback: bool,
  /// Re-selected after an incorrect answer on a question the engine grades
  /// on change; the visible feedback still belongs to the previous attempt
  /// until the next reconcile
  awaiting_regrade: bool,
  /// Hint-required notice already sent for the current attempt
  hint_required_sent: bool,
}

struct Attachment<N> {
  root: N,
  config: GateConfig,
  phrases: PhraseMatcher,
  questions: Vec<Tracked<N>>,
  mode: AttachMode,
  settle: Option<TimerId>,
  /// Corrective writes whose mutation records have not come back yet
  own_writes: Vec<(N, WriteKind)>,
}

fn read_selection<D: QuizDom>(dom: &D, inputs: &[D::Node]) -> Selection {
  Selection::new(
    inputs
      .iter()
      .filter_map(|input| dom.input_state(input).selected_value().map(str::to_string)),
  )
}

impl<N: Clone + PartialEq + Debug> Attachment<N> {
  fn new(root: N, config: GateConfig) -> Self {
    let phrases = PhraseMatcher::new(&config.correct_phrases, &config.incorrect_phrases);
    Self {
      root,
      config,
      phrases,
      questions: Vec::new(),
      mode: AttachMode::Idle,
      settle: None,
      own_writes: Vec::new(),
    }
  }

  fn is_active(&self) -> bool {
    matches!(self.mode, AttachMode::Observing(_) | AttachMode::Polling(_))
  }

  fn gate_next(&self, tracked: &Tracked<N>) -> bool {
    self.config.require_correct_for_next && tracked.nodes.next.is_some()
  }

  fn report_missing<D, T>(&self, id: &QuestionId, nodes: &QuestionNodes<N>, env: &mut Env<D, T>)
  where
    D: QuizDom<Node = N>,
    T: Timers,
  {
    let mut missing = Vec::new();
    if nodes.check.is_none() {
      missing.push(Affordance::Check);
    }
    if nodes.next.is_none() && self.config.require_correct_for_next {
      missing.push(Affordance::Next);
    }
    if nodes.hint.is_none() && self.config.force_hint_mode {
      missing.push(Affordance::Hint);
    }
    for affordance in missing {
      env.record(GateError::MissingAffordance {
        question: id.clone(),
        affordance,
      });
    }
  }

  /// Match question elements to tracked state, creating and dropping entries
  /// as questions appear and disappear. Returns how many question elements
  /// the selector matched.
  fn scan<D, T>(&mut self, env: &mut Env<D, T>) -> usize
  where
    D: QuizDom<Node = N>,
    T: Timers,
  {
    let elements = env.dom.query_all(&self.root, &self.config.selectors.question);
    let mut previous = std::mem::take(&mut self.questions);
    let mut current: Vec<Tracked<N>> = Vec::with_capacity(elements.len());

    for (position, element) in elements.iter().enumerate() {
      let id = match resolve_identity(
        &env.dom,
        element,
        position,
        &self.config.selectors,
        self.config.position_fallback,
      ) {
        Ok(id) => id,
        Err(reason) => {
          env.record(GateError::IdentityResolutionFailure { position, reason });
          continue;
        }
      };

      if current.iter().any(|t| t.state.question_id == id) {
        env.record(GateError::IdentityResolutionFailure {
          position,
          reason: format!("duplicate question id {}", id),
        });
        continue;
      }

      let nodes = QuestionNodes::collect(&env.dom, element, &self.config.selectors);
      let tracked = match previous.iter().position(|t| t.state.question_id == id) {
        Some(index) => {
          let mut tracked = previous.swap_remove(index);
          tracked.node = element.clone();
          tracked.nodes = nodes;
          tracked
        }
        None => {
          tracing::debug!("Tracking question {}", id);
          self.report_missing(&id, &nodes, env);
          Tracked {
            node: element.clone(),
            state: QuestionState::new(id, nodes.hint_available(), self.config.force_hint_mode),
            nodes,
            applied: Applied::default(),
            stale_feedback: false,
            awaiting_regrade: false,
            hint_required_sent: false,
          }
        }
      };
      current.push(tracked);
    }

    for mut gone in previous {
      tracing::debug!("Question {} left the page", gone.state.question_id);
      presentation::release(&mut env.dom, &mut gone.applied, &self.config.selectors);
    }

    self.questions = current;
    elements.len()
  }

  /// Re-read one question, advance its state, emit events, and write the
  /// presentation difference. Returns true if the state changed.
  ///
  /// `extra` is applied after the DOM-derived transitions; `run_inference`
  /// is off when the engine is known to be mid-grading.
  fn sync_question<D, T>(
    &mut self,
    index: usize,
    extra: Option<Transition>,
    run_inference: bool,
    env: &mut Env<D, T>,
  ) -> Result<bool, DomError>
  where
    D: QuizDom<Node = N>,
    T: Timers,
  {
    let gate_next = self.gate_next(&self.questions[index]);
    let Attachment {
      questions,
      config,
      phrases,
      own_writes,
      ..
    } = self;
    let q = &mut questions[index];
    let before = q.state.clone();
    let id = before.question_id.clone();

    q.state.set_hint_available(q.nodes.hint_available());

    let selection = read_selection(&env.dom, &q.nodes.inputs);
    q.state.apply(Transition::Select(selection));
    if before.phase == Phase::Incorrect && q.state.phase == Phase::Answered {
      // Without a check trigger the engine re-grades on its own, after us
      if q.nodes.check.is_some() {
        q.stale_feedback = true;
      } else {
        q.awaiting_regrade = true;
      }
      q.hint_required_sent = false;
      tracing::debug!("Question {} re-attempt started", id);
    }

    if q
      .nodes
      .hint_content
      .as_ref()
      .is_some_and(|content| env.dom.is_visible(content))
    {
      q.state.apply(Transition::HintViewed);
    }

    if run_inference && !q.stale_feedback && !q.awaiting_regrade {
      let evidence = collect_evidence(&env.dom, &q.node, &config.selectors);
      let inference = infer(&evidence, phrases);
      if inference.ambiguous {
        env.record(GateError::AmbiguousCorrectness {
          question: id.clone(),
        });
      }
      q.state.apply(Transition::GradeResolved(inference.verdict));
    }

    if let Some(transition) = extra {
      q.state.apply(transition);
    }

    let after = &q.state;
    if before.phase != after.phase {
      let verdict = match after.phase {
        Phase::Correct => Some(Verdict::Correct),
        Phase::Incorrect => Some(Verdict::Incorrect),
        _ => None,
      };
      if let Some(verdict) = verdict {
        env.outbox.push(Outgoing::Event(GateEvent::QuestionResolved {
          question: id.clone(),
          verdict,
        }));
      }
    }
    if !before.hint_viewed && after.hint_viewed {
      env.outbox.push(Outgoing::Event(GateEvent::HintViewed {
        question: id.clone(),
      }));
    }
    if before.next_enabled != after.next_enabled {
      env.outbox.push(Outgoing::Event(GateEvent::NextEnabled {
        question: id.clone(),
        enabled: after.next_enabled,
      }));
    }
    if after.phase == Phase::Incorrect
      && after.hint_gate_applies()
      && !after.hint_viewed
      && !q.hint_required_sent
    {
      q.hint_required_sent = true;
      env.outbox.push(Outgoing::Event(GateEvent::HintRequired {
        question: id.clone(),
      }));
      env.outbox.push(Outgoing::Notice(Notice {
        question: id.clone(),
        kind: NoticeKind::HintRequired,
        message: config.hint_required_text.clone(),
      }));
    }

    let desired = Presentation::desired(&q.state, gate_next, q.stale_feedback);
    let writes = presentation::apply(
      &mut env.dom,
      &q.node,
      &q.nodes,
      &desired,
      &mut q.applied,
      &config.selectors,
      &config.try_again_text,
      own_writes,
    )?;
    if writes > 0 {
      tracing::debug!("Question {}: {} corrective write(s)", id, writes);
    }
    env.writes += u64::from(writes);

    Ok(q.state != before)
  }

  /// Full pass: scan, then sync every question. Returns the number of
  /// question elements found.
  ///
  /// Only runs from timers and explicit rescans, after the engine's own
  /// handlers, so any re-grade a change event triggered is on the page.
  fn reconcile<D, T>(&mut self, env: &mut Env<D, T>) -> Result<usize, DomError>
  where
    D: QuizDom<Node = N>,
    T: Timers,
  {
    let before = self.questions.len();
    let found = self.scan(env);
    for tracked in self.questions.iter_mut() {
      tracked.awaiting_regrade = false;
    }
    let mut changed = self.questions.len() != before;
    for index in 0..self.questions.len() {
      changed |= self.sync_question(index, None, true, env)?;
    }
    if changed {
      self.push_progress(env);
    }
    Ok(found)
  }

  fn push_progress<D, T>(&self, env: &mut Env<D, T>) {
    if !self.config.sidebar_enabled {
      return;
    }
    let answered = self
      .questions
      .iter()
      .filter(|t| t.state.phase != Phase::Unanswered)
      .count();
    let correct = self
      .questions
      .iter()
      .filter(|t| t.state.phase == Phase::Correct)
      .count();
    env.outbox.push(Outgoing::Event(GateEvent::ProgressChanged {
      answered,
      correct,
      total: self.questions.len(),
    }));
  }

  fn arm_settle<D, T: Timers>(&mut self, env: &mut Env<D, T>) {
    if self.settle.is_none() {
      self.settle = Some(env.timers.set_timeout(self.config.settle_delay()));
    }
  }

  fn question_for<D: QuizDom<Node = N>>(&self, dom: &D, node: &N) -> Option<usize> {
    let question = dom.closest(node, &self.config.selectors.question)?;
    self.questions.iter().position(|t| t.node == question)
  }

  fn handle_user_event<D, T>(
    &mut self,
    index: usize,
    event: &UserEvent<N>,
    env: &mut Env<D, T>,
  ) -> Result<Disposition, DomError>
  where
    D: QuizDom<Node = N>,
    T: Timers,
  {
    let changed = match event {
      UserEvent::Change(_) => {
        let changed = self.sync_question(index, None, true, env)?;
        // No check trigger: the engine grades this change right after us
        if self.questions[index].nodes.check.is_none() {
          self.arm_settle(env);
        }
        changed
      }
      UserEvent::Click(node) => {
        let selectors = &self.config.selectors;
        if env.dom.closest(node, &selectors.hint).is_some() {
          self.sync_question(index, Some(Transition::HintViewed), true, env)?
        } else if env.dom.closest(node, &selectors.check).is_some() {
          // The engine grades after this handler; read the verdict once it settles
          self.questions[index].stale_feedback = false;
          let changed = self.sync_question(index, None, false, env)?;
          self.arm_settle(env);
          changed
        } else if env.dom.closest(node, &selectors.next).is_some() {
          let tracked = &self.questions[index];
          if self.gate_next(tracked) && !tracked.state.next_enabled {
            let message = if tracked.state.hint_gate_applies() && !tracked.state.hint_viewed {
              self.config.hint_required_text.clone()
            } else {
              self.config.try_again_text.clone()
            };
            tracing::info!("Blocked Next on question {}", tracked.state.question_id);
            env.outbox.push(Outgoing::Notice(Notice {
              question: tracked.state.question_id.clone(),
              kind: NoticeKind::NextBlocked,
              message,
            }));
            return Ok(Disposition::Block);
          }
          false
        } else {
          false
        }
      }
    };
    if changed {
      self.push_progress(env);
    }
    Ok(Disposition::Allow)
  }

  fn is_own_write(&self, record: &MutationRecord<N>) -> bool {
    self.own_writes.iter().any(|(node, kind)| {
      *node == record.target
        && matches!(
          (kind, &record.kind),
          (WriteKind::Attributes, MutationKind::Attribute(_))
            | (WriteKind::ChildList, MutationKind::ChildList)
        )
    })
  }

  /// Stop observation and timers.
  fn stop<D: QuizDom<Node = N>, T: Timers>(&mut self, env: &mut Env<D, T>) {
    if let Some(timer) = self.settle.take() {
      env.timers.clear(timer);
    }
    match self.mode {
      AttachMode::Observing(observer) => env.dom.disconnect(observer),
      AttachMode::Polling(timer) => env.timers.clear(timer),
      AttachMode::Idle | AttachMode::Degraded => {}
    }
    self.own_writes.clear();
  }

  fn release_all<D: QuizDom<Node = N>, T>(&mut self, env: &mut Env<D, T>) {
    for tracked in self.questions.iter_mut() {
      presentation::release(&mut env.dom, &mut tracked.applied, &self.config.selectors);
    }
  }

  /// Hand the page back to the engine after a failed corrective write.
  fn degrade<D: QuizDom<Node = N>, T: Timers>(&mut self, env: &mut Env<D, T>, error: DomError) {
    tracing::error!("Answer gate falling back to native quiz behavior: {}", error);
    env.record(GateError::Degraded {
      reason: error.to_string(),
    });
    self.stop(env);
    self.release_all(env);
    self.questions.clear();
    self.mode = AttachMode::Degraded;
  }
}

/// Answer-gate controller over a page (`D`) and its timers (`T`).
pub struct AnswerGateController<D: QuizDom, T: Timers> {
  env: Env<D, T>,
  attachments: BTreeMap<u32, Attachment<D::Node>>,
  next_handle: u32,
  bus: EventBus,
  notifier: Option<Box<dyn Notifier>>,
}

impl<D: QuizDom, T: Timers> AnswerGateController<D, T> {
  pub fn new(dom: D, timers: T) -> Self {
    Self {
      env: Env {
        dom,
        timers,
        diagnostics: Diagnostics::default(),
        writes: 0,
        outbox: Vec::new(),
      },
      attachments: BTreeMap::new(),
      next_handle: 1,
      bus: EventBus::default(),
      notifier: None,
    }
  }

  pub fn set_notifier(&mut self, notifier: impl Notifier + 'static) {
    self.notifier = Some(Box::new(notifier));
  }

  pub fn subscribe(&mut self, listener: impl FnMut(&GateEvent) + 'static) -> SubscriptionId {
    self.bus.subscribe(listener)
  }

  pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
    self.bus.unsubscribe(id)
  }

  /// Start managing the questions under `root`.
  ///
  /// Never fails: a root without question markup yields an idle attachment,
  /// and a page without mutation observation falls back to bounded rescans.
  pub fn attach(&mut self, root: D::Node, config: GateConfig) -> Handle {
    let handle = Handle(self.next_handle);
    self.next_handle += 1;

    let mut attachment = Attachment::new(root, config);
    match attachment.reconcile(&mut self.env) {
      Ok(0) => {
        self.env.record(GateError::EngineIncompatibility);
        tracing::info!("No quiz questions under root; answer gate idle");
      }
      Ok(_) => {
        attachment.mode = match self.env.dom.observe(&attachment.root) {
          Some(observer) => AttachMode::Observing(observer),
          None => {
            let period = attachment.config.rescan_interval();
            tracing::warn!(
              "DOM observation unavailable; rescanning every {}ms instead",
              period
            );
            AttachMode::Polling(self.env.timers.set_interval(period))
          }
        };
        tracing::info!(
          "Answer gate attached: {} question(s), {:?}",
          attachment.questions.len(),
          attachment.mode
        );
      }
      Err(e) => attachment.degrade(&mut self.env, e),
    }

    self.attachments.insert(handle.0, attachment);
    self.flush();
    handle
  }

  /// Stop managing an attachment and restore native presentation.
  /// Unknown or already-detached handles are ignored.
  pub fn detach(&mut self, handle: Handle) {
    let Some(mut attachment) = self.attachments.remove(&handle.0) else {
      return;
    };
    attachment.stop(&mut self.env);
    attachment.release_all(&mut self.env);
    tracing::info!("Answer gate detached ({} question(s) released)", attachment.questions.len());
  }

  /// Current state of a question, if any attachment manages it.
  pub fn evaluate(&self, question: &QuestionId) -> Option<QuestionState> {
    self
      .attachments
      .values()
      .flat_map(|a| a.questions.iter())
      .find(|t| &t.state.question_id == question)
      .map(|t| t.state.clone())
  }

  /// All question states of one attachment, in page order.
  pub fn questions(&self, handle: Handle) -> Vec<QuestionState> {
    self
      .attachments
      .get(&handle.0)
      .map(|a| a.questions.iter().map(|t| t.state.clone()).collect())
      .unwrap_or_default()
  }

  pub fn mode(&self, handle: Handle) -> Option<AttachMode> {
    self.attachments.get(&handle.0).map(|a| a.mode)
  }

  /// Forward a click or change event. Call before the engine's own handlers.
  pub fn on_user_event(&mut self, event: UserEvent<D::Node>) -> Disposition {
    let node = match &event {
      UserEvent::Change(node) | UserEvent::Click(node) => node.clone(),
    };

    let mut disposition = Disposition::Allow;
    for attachment in self.attachments.values_mut() {
      if !attachment.is_active() {
        continue;
      }
      attachment.own_writes.clear();
      let Some(index) = attachment.question_for(&self.env.dom, &node) else {
        continue;
      };
      match attachment.handle_user_event(index, &event, &mut self.env) {
        Ok(result) => disposition = result,
        Err(e) => attachment.degrade(&mut self.env, e),
      }
      break;
    }

    self.flush();
    disposition
  }

  /// Forward a batch of mutation records from observer `observer`.
  ///
  /// Records produced by the gate's own corrective writes are dropped; any
  /// other record schedules one settle-delayed reconcile.
  pub fn on_mutations(&mut self, observer: ObserverId, records: &[MutationRecord<D::Node>]) {
    let Some(attachment) = self
      .attachments
      .values_mut()
      .find(|a| a.mode == AttachMode::Observing(observer))
    else {
      return;
    };

    let foreign = records.iter().filter(|r| !attachment.is_own_write(r)).count();
    attachment.own_writes.clear();
    if foreign > 0 {
      attachment.arm_settle(&mut self.env);
    } else if !records.is_empty() {
      tracing::trace!("Ignored {} self-originated mutation record(s)", records.len());
    }
  }

  /// Forward a fired timer.
  pub fn on_timer(&mut self, timer: TimerId) {
    for attachment in self.attachments.values_mut() {
      let due = if attachment.settle == Some(timer) {
        attachment.settle = None;
        true
      } else {
        attachment.mode == AttachMode::Polling(timer)
      };
      if !due {
        continue;
      }
      attachment.own_writes.clear();
      if let Err(e) = attachment.reconcile(&mut self.env) {
        attachment.degrade(&mut self.env, e);
      }
      break;
    }
    self.flush();
  }

  /// Run a full scan and reconcile immediately.
  pub fn rescan(&mut self, handle: Handle) {
    if let Some(attachment) = self.attachments.get_mut(&handle.0) {
      if attachment.is_active() {
        if let Err(e) = attachment.reconcile(&mut self.env) {
          attachment.degrade(&mut self.env, e);
        }
      }
    }
    self.flush();
  }

  pub fn diagnostics(&self) -> &Diagnostics {
    &self.env.diagnostics
  }

  /// Total corrective DOM writes performed so far.
  pub fn write_count(&self) -> u64 {
    self.env.writes
  }

  pub fn dom(&self) -> &D {
    &self.env.dom
  }

  pub fn dom_mut(&mut self) -> &mut D {
    &mut self.env.dom
  }

  pub fn timers(&self) -> &T {
    &self.env.timers
  }

  pub fn timers_mut(&mut self) -> &mut T {
    &mut self.env.timers
  }

  fn flush(&mut self) {
    for item in std::mem::take(&mut self.env.outbox) {
      match item {
        Outgoing::Event(event) => self.bus.emit(&event),
        Outgoing::Notice(notice) => match self.notifier.as_mut() {
          Some(notifier) => notifier.notify(&notice),
          None => tracing::info!("Notice for {}: {}", notice.question, notice.message),
        },
      }
    }
  }
}
