//! Normalized entity cache sitting between UI code and a REST API.
//!
//! Callers dispatch [`Intent`]s through an [`Orchestrator`]. It consults the
//! staleness policy, calls the entity's [`Provider`], normalizes the
//! response, and runs the resulting signals through the reducers held by a
//! [`Store`]. Views are read back with the memoized selectors.
//!
//! ```ignore
//! let todo = Entity::builder("todo")
//!   .provider(Arc::new(RestProvider::new(api, ProviderOptions::new("todos"))?))
//!   .stale_timeout(Duration::from_secs(30))
//!   .build()?;
//!
//! let orchestrator = Orchestrator::new(Arc::new(Store::new()));
//! orchestrator.dispatch(Intent::fetch(todo.many(), json!({ "page": 1 }))).await;
//!
//! let state = orchestrator.store().state();
//! let todos = select_collection(&todo).select(&state, &json!({ "page": 1 }));
//! ```

pub mod clock;
pub mod config;
pub mod entity;
pub mod error;
pub mod fingerprint;
pub mod http;
pub mod intent;
pub mod middleware;
pub mod normalize;
pub mod provider;
pub mod reducers;
pub mod response;
pub mod selectors;
pub mod staleness;
pub mod state;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use entity::{Entity, EntityBuilder, EntityId, Relation, Schema, Target, UPDATED_AT};
pub use error::{DescriptorError, TransportError};
pub use fingerprint::fingerprint;
pub use http::{ApiClient, ApiOptions, ContentType, Method};
pub use intent::{clear_all, Action, Failure, Intent, Operation, RequestOptions, Success};
pub use middleware::Orchestrator;
pub use normalize::{normalize, EntityTables, Normalized};
pub use provider::{Provider, ProviderOptions, RestProvider};
pub use reducers::reduce;
pub use response::{Response, ResponseOptions};
pub use selectors::{select_collection, select_meta, select_one, select_singleton};
pub use staleness::should_skip_fetch;
pub use state::{CacheState, QueryResult, SingletonValue, Status};
pub use store::Store;
