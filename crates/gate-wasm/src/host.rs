//! Routing of browser callbacks back into the controller.
//!
//! Mutation observers and timers are created by `WebDom`/`WebTimers`, which
//! live inside the controller, so their callbacks cannot hold it directly.
//! They go through a `Host`: a weak handle plus a backlog that is drained by
//! whoever holds the controller borrow.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use answer_gate::controller::Handle;
use answer_gate::dom::{MutationRecord, ObserverId, TimerId};
use web_sys::Element;

use crate::Gate;

pub enum HostCall<N = Element> {
    Mutations(ObserverId, Vec<MutationRecord<N>>),
    Timer(TimerId),
    /// A detach requested while the controller was busy.
    Detach(Handle),
}

/// What a drained `HostCall` is applied to.
pub trait Routed {
    type Node;

    fn route(&mut self, call: HostCall<Self::Node>);

    /// Release timer callbacks that have already run or been cleared.
    fn purge_retired(&mut self);
}

impl Routed for Gate {
    type Node = Element;

    fn route(&mut self, call: HostCall<Element>) {
        match call {
            HostCall::Mutations(observer, records) => self.on_mutations(observer, &records),
            HostCall::Timer(timer) => {
                self.on_timer(timer);
                self.timers_mut().fired(timer);
            }
            HostCall::Detach(handle) => self.detach(handle),
        }
    }

    fn purge_retired(&mut self) {
        self.timers_mut().purge_retired();
    }
}

pub struct Host<G: Routed = Gate> {
    gate: Rc<RefCell<Option<Weak<RefCell<G>>>>>,
    backlog: Rc<RefCell<VecDeque<HostCall<G::Node>>>>,
}

impl<G: Routed> Clone for Host<G> {
    fn clone(&self) -> Self {
        Self {
            gate: Rc::clone(&self.gate),
            backlog: Rc::clone(&self.backlog),
        }
    }
}

impl<G: Routed> Default for Host<G> {
    fn default() -> Self {
        Self {
            gate: Rc::new(RefCell::new(None)),
            backlog: Rc::new(RefCell::new(VecDeque::new())),
        }
    }
}

impl<G: Routed> Host<G> {
    pub fn bind(&self, gate: &Rc<RefCell<G>>) {
        *self.gate.borrow_mut() = Some(Rc::downgrade(gate));
    }

    fn upgrade(&self) -> Option<Rc<RefCell<G>>> {
        self.gate.borrow().as_ref().and_then(Weak::upgrade)
    }

    /// Queue a callback and process it unless the controller is busy, in
    /// which case the current borrower picks it up.
    pub fn deliver(&self, call: HostCall<G::Node>) {
        self.backlog.borrow_mut().push_back(call);
        self.drain();
    }

    /// Run `f` against the controller. `None` when it is gone or already
    /// borrowed (a page listener re-entering from one of our own events).
    pub fn with_gate<R>(&self, f: impl FnOnce(&mut G) -> R) -> Option<R> {
        let gate = self.upgrade()?;
        let result = {
            let Ok(mut guard) = gate.try_borrow_mut() else {
                tracing::debug!("Controller busy; re-entrant call skipped");
                return None;
            };
            f(&mut guard)
        };
        self.drain();
        Some(result)
    }

    fn drain(&self) {
        let Some(gate) = self.upgrade() else {
            self.backlog.borrow_mut().clear();
            return;
        };
        let Ok(mut guard) = gate.try_borrow_mut() else {
            return;
        };
        // A callback retired during an earlier drain has returned by now
        guard.purge_retired();
        loop {
            let next = self.backlog.borrow_mut().pop_front();
            let Some(call) = next else {
                break;
            };
            guard.route(call);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
