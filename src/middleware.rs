//! Orchestrator: turns intents into transport calls and signals.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::TransportError;
use crate::intent::{Action, Failure, Intent, Operation, Success};
use crate::normalize::normalize;
use crate::provider::TransportResult;
use crate::response::Response;
use crate::staleness::should_skip_fetch;
use crate::store::Store;

/// Runs intents against their entity's provider and feeds the outcome
/// through the [`Store`].
///
/// For each intent that reaches the network the store sees
/// [`Action::Request`] before the transport call and exactly one of
/// [`Action::Succeeded`] / [`Action::Failed`] after it settles. Intents the
/// staleness policy can answer from cache produce a single
/// [`Action::Cached`] instead.
#[derive(Clone)]
pub struct Orchestrator {
  store: Arc<Store>,
  clock: Arc<dyn Clock>,
}

impl Orchestrator {
  pub fn new(store: Arc<Store>) -> Self {
    Self {
      store,
      clock: Arc::new(SystemClock),
    }
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn store(&self) -> &Arc<Store> {
    &self.store
  }

  /// Dispatch an action and return the last signal it produced.
  ///
  /// Anything other than a request passes straight through to the store.
  pub async fn dispatch(&self, action: impl Into<Action>) -> Action {
    let intent = match action.into() {
      Action::Request(intent) => intent,
      other => return self.store.apply(other),
    };

    debug!(
      entity = intent.entity().key(),
      operation = ?intent.operation,
      "intent received"
    );

    if should_skip_fetch(&self.store.state(), &intent, self.clock.as_ref()) {
      debug!(entity = intent.entity().key(), "serving from cache");
      return self.store.apply(Action::Cached(intent));
    }

    self.store.apply(Action::Request(intent.clone()));

    let outcome = match self.call(&intent).await {
      Ok(response) => self.succeeded(intent, response),
      Err(error) => {
        warn!(entity = intent.entity().key(), %error, "transport call failed");
        Action::Failed(Failure {
          status_code: error.status,
          error,
          intent,
        })
      }
    };

    self.store.apply(outcome)
  }

  async fn call(&self, intent: &Intent) -> TransportResult {
    let entity = intent.entity();
    let provider = entity.provider().ok_or_else(|| {
      TransportError::new(None, format!("entity '{}' has no provider", entity.key()))
    })?;
    let payload = intent.payload.clone();

    debug!(entity = entity.key(), operation = ?intent.operation, "calling transport");
    match intent.operation {
      Operation::Upsert => provider.upsert(payload, intent.options.params.clone()).await,
      Operation::Remove => provider.remove(payload).await,
      Operation::Find => provider.find(payload).await,
      Operation::Fetch => provider.fetch(payload).await,
    }
  }

  fn succeeded(&self, intent: Intent, response: Response) -> Action {
    let date = self.clock.now();

    let success = if intent.operation == Operation::Remove {
      Success {
        intent,
        entities: None,
        result: None,
        meta: None,
        date: None,
      }
    } else if intent.entity().is_singleton() {
      Success {
        intent,
        entities: None,
        result: Some(response.data),
        meta: response.meta,
        date: Some(date),
      }
    } else {
      let normalized = normalize(&response.data, &intent.target);
      Success {
        intent,
        entities: Some(normalized.entities),
        result: Some(normalized.result),
        meta: response.meta,
        date: Some(date),
      }
    };

    debug!(entity = success.intent.entity().key(), "transport call succeeded");
    Action::Succeeded(success)
  }
}
