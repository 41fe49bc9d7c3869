//! Client core for a remote hierarchical JSON database.
//!
//! A [`Database`] wraps a user-supplied [`Backend`] and hands out
//! [`Reference`]s. References carry a path and a [`Query`]; listeners
//! registered through them are multiplexed by the [`SubscriptionRegistry`]
//! so each distinct `(path, query, event)` is watched on the backend once.

pub mod backend;
pub mod config;
pub mod database;
pub mod disconnect;
pub mod error;
pub mod path;
pub mod push_id;
pub mod query;
pub mod reference;
pub mod registry;
pub mod request;
pub mod snapshot;

pub use backend::{
    Backend, BackendErrorPayload, BackendEvent, BackendResult, DataEvent, DisconnectAction,
    ErrorEvent, EventChannel, EventSink, NativeListenerId,
};
pub use config::DatabaseOptions;
pub use database::Database;
pub use disconnect::OnDisconnect;
pub use error::{BackendError, DatabaseError, QueryError, Result};
pub use path::Path;
pub use query::{ExportedQuery, Filter, FilterKind, Limit, OrderBy, Query};
pub use reference::Reference;
pub use registry::{callback, EventCallback, EventType, HandlePhase, SubscriptionRegistry};
pub use snapshot::{Snapshot, SnapshotPayload};
