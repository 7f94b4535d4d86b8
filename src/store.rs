//! Owner of the cache state; runs the reducer and fans signals out.

use std::sync::{Mutex, PoisonError};

use tokio::sync::broadcast;

use crate::intent::Action;
use crate::reducers::reduce;
use crate::state::CacheState;

const SIGNAL_CAPACITY: usize = 256;

/// Holds the latest [`CacheState`] snapshot.
///
/// Every action runs through [`reduce`] synchronously under the lock and is
/// then broadcast to subscribers, so observers see actions in the order
/// they were applied.
pub struct Store {
  state: Mutex<CacheState>,
  signals: broadcast::Sender<Action>,
}

impl Store {
  pub fn new() -> Self {
    Self::with_state(CacheState::default())
  }

  pub fn with_state(state: CacheState) -> Self {
    let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
    Self {
      state: Mutex::new(state),
      signals,
    }
  }

  /// Current snapshot. Cheap: only the slice `Arc`s are cloned.
  pub fn state(&self) -> CacheState {
    self
      .state
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  /// Apply `action` to the state, notify subscribers, and hand the action
  /// back to the caller.
  pub fn apply(&self, action: Action) -> Action {
    let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    *state = reduce(&state, &action);

    // No subscribers is fine
    let _ = self.signals.send(action.clone());
    action
  }

  /// Observe every action applied from now on.
  pub fn subscribe(&self) -> broadcast::Receiver<Action> {
    self.signals.subscribe()
  }
}

impl Default for Store {
  fn default() -> Self {
    Self::new()
  }
}
