//! Time sources for freshness timestamps.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Epoch milliseconds.
pub type Timestamp = i64;

/// Source of the current time.
pub trait Clock: Send + Sync {
  fn now(&self) -> Timestamp;
}

/// Wall clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> Timestamp {
    Utc::now().timestamp_millis()
  }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
  now: AtomicI64,
}

impl ManualClock {
  pub fn new(now: Timestamp) -> Self {
    Self {
      now: AtomicI64::new(now),
    }
  }

  pub fn set(&self, now: Timestamp) {
    self.now.store(now, Ordering::SeqCst);
  }

  pub fn advance(&self, millis: i64) {
    self.now.fetch_add(millis, Ordering::SeqCst);
  }
}

impl Clock for ManualClock {
  fn now(&self) -> Timestamp {
    self.now.load(Ordering::SeqCst)
  }
}
