//! Manually advanced clock implementing `Timers`.

use std::collections::BTreeMap;

use crate::dom::{TimerId, Timers};

#[derive(Debug, Clone, Copy)]
struct Pending {
  due: u64,
  period: Option<u32>,
}

#[derive(Debug, Default)]
pub struct ManualTimers {
  now: u64,
  next_id: u32,
  pending: BTreeMap<TimerId, Pending>,
}

impl ManualTimers {
  pub fn new() -> Self {
    Self::default()
  }

  fn schedule(&mut self, delay_ms: u32, period: Option<u32>) -> TimerId {
    self.next_id += 1;
    let id = TimerId(self.next_id);
    self.pending.insert(
      id,
      Pending {
        due: self.now + u64::from(delay_ms),
        period,
      },
    );
    id
  }

  /// Move the clock forward and return the timers that fired, earliest
  /// first. An interval fires at most once per call.
  pub fn advance(&mut self, ms: u64) -> Vec<TimerId> {
    self.now += ms;
    let mut fired: Vec<(u64, TimerId)> = self
      .pending
      .iter()
      .filter(|(_, p)| p.due <= self.now)
      .map(|(id, p)| (p.due, *id))
      .collect();
    fired.sort();

    for (_, id) in &fired {
      let Some(pending) = self.pending.get_mut(id) else {
        continue;
      };
      match pending.period {
        Some(period) => pending.due = self.now + u64::from(period.max(1)),
        None => {
          self.pending.remove(id);
        }
      }
    }
    fired.into_iter().map(|(_, id)| id).collect()
  }

  pub fn is_pending(&self, id: TimerId) -> bool {
    self.pending.contains_key(&id)
  }

  pub fn pending_count(&self) -> usize {
    self.pending.len()
  }
}

impl Timers for ManualTimers {
  fn now_ms(&self) -> u64 {
    self.now
  }

  fn set_timeout(&mut self, delay_ms: u32) -> TimerId {
    self.schedule(delay_ms, None)
  }

  fn set_interval(&mut self, period_ms: u32) -> TimerId {
    self.schedule(period_ms, Some(period_ms))
  }

  fn clear(&mut self, id: TimerId) {
    self.pending.remove(&id);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_timeout_fires_once() {
    let mut timers = ManualTimers::new();
    let id = timers.set_timeout(40);
    assert!(timers.advance(39).is_empty());
    assert_eq!(timers.advance(1), vec![id]);
    assert!(timers.advance(100).is_empty());
  }

  #[test]
  fn test_interval_repeats_until_cleared() {
    let mut timers = ManualTimers::new();
    let id = timers.set_interval(1000);
    assert_eq!(timers.advance(1000), vec![id]);
    assert_eq!(timers.advance(1000), vec![id]);
    timers.clear(id);
    assert!(timers.advance(5000).is_empty());
    assert_eq!(timers.pending_count(), 0);
  }

  #[test]
  fn test_fired_in_due_order() {
    let mut timers = ManualTimers::new();
    let late = timers.set_timeout(200);
    let early = timers.set_timeout(50);
    assert_eq!(timers.advance(300), vec![early, late]);
    assert_eq!(timers.now_ms(), 300);
  }
}
