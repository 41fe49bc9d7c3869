//! Reference: a path plus a query, bound to a database.
//!
//! References are immutable. Navigation (`child`, `parent`, `root`) and
//! query refinement (`order_by_*`, `limit_to_*`, `start_at`, ...) return new
//! references; the receiver never changes.
//!
//! ```no_run
//! # async fn demo(db: &rtdb::Database) -> rtdb::Result<()> {
//! use rtdb::{callback, EventType};
//!
//! let latest = db
//!     .reference("chat/messages")
//!     .order_by_child("ts")?
//!     .limit_to_last(20);
//! let listener = callback(|snap| println!("{} messages", snap.children_count()));
//! latest.on(EventType::Value, listener.clone()).await?;
//! // ...
//! latest.off(Some(EventType::Value), Some(&listener)).await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::{
    database::DatabaseCore,
    disconnect::OnDisconnect,
    error::{DatabaseError, Result},
    path::Path,
    query::{ExportedQuery, Filter, FilterKind, Limit, OrderBy, Query},
    registry::{EventCallback, EventType},
    snapshot::Snapshot,
};

#[derive(Clone)]
pub struct Reference {
    core: Arc<DatabaseCore>,
    path: Path,
    query: Query,
}

impl Reference {
    pub(crate) fn new(core: Arc<DatabaseCore>, path: Path, query: Query) -> Self {
        tracing::debug!(
            db = %core.name,
            path = %path,
            modifiers = %query,
            "created reference"
        );
        Self { core, path, query }
    }

    fn with_query(&self, query: Query) -> Self {
        Self::new(Arc::clone(&self.core), self.path.clone(), query)
    }

    fn at(&self, path: Path) -> Self {
        Self::new(Arc::clone(&self.core), path, Query::new())
    }

    // -----------------------------------------------------------------------
    // Location
    // -----------------------------------------------------------------------

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Last path segment, `None` at the root.
    pub fn key(&self) -> Option<&str> {
        self.path.key()
    }

    pub fn to_path_string(&self) -> String {
        self.path.to_path_string()
    }

    /// Reference to `path` below this one, with an empty query.
    pub fn child(&self, path: impl Into<Path>) -> Reference {
        let rel = path.into();
        self.at(self.path.child(rel.segments()))
    }

    /// Reference to the parent location, `None` at the root.
    pub fn parent(&self) -> Option<Reference> {
        self.path.parent().map(|p| self.at(p))
    }

    pub fn root(&self) -> Reference {
        self.at(Path::root())
    }

    // -----------------------------------------------------------------------
    // Query refinement
    // -----------------------------------------------------------------------

    /// Refine with a named ordering (`orderByKey`, `orderByChild`, ...).
    pub fn order_by(&self, name: &str, key: Option<&str>) -> Result<Reference> {
        let mut query = self.query.clone();
        query.set_order_by(name, key)?;
        Ok(self.with_query(query))
    }

    pub fn order_by_key(&self) -> Reference {
        self.with_query(self.query.clone().with_order_by(OrderBy::Key))
    }

    pub fn order_by_priority(&self) -> Reference {
        self.with_query(self.query.clone().with_order_by(OrderBy::Priority))
    }

    pub fn order_by_value(&self) -> Reference {
        self.with_query(self.query.clone().with_order_by(OrderBy::Value))
    }

    /// Fails with [`QueryError::MissingChildKey`](crate::error::QueryError)
    /// for an empty key.
    pub fn order_by_child(&self, key: &str) -> Result<Reference> {
        self.order_by("orderByChild", Some(key))
    }

    /// Refine with a named limit (`limitToFirst` / `limitToLast`).
    pub fn limit(&self, name: &str, n: i64) -> Result<Reference> {
        let mut query = self.query.clone();
        query.set_limit(name, n)?;
        Ok(self.with_query(query))
    }

    pub fn limit_to_first(&self, n: u64) -> Reference {
        self.with_query(self.query.clone().with_limit(Limit::First(n)))
    }

    pub fn limit_to_last(&self, n: u64) -> Reference {
        self.with_query(self.query.clone().with_limit(Limit::Last(n)))
    }

    /// Refine with a named filter (`startAt`, `endAt`, `equalTo`).
    pub fn filter(&self, name: &str, value: impl Into<Value>, key: Option<&str>) -> Result<Reference> {
        let mut query = self.query.clone();
        query.set_filter(name, value, key)?;
        Ok(self.with_query(query))
    }

    pub fn start_at(&self, value: impl Into<Value>, key: Option<&str>) -> Reference {
        self.with_filter(FilterKind::StartAt, value, key)
    }

    pub fn end_at(&self, value: impl Into<Value>, key: Option<&str>) -> Reference {
        self.with_filter(FilterKind::EndAt, value, key)
    }

    pub fn equal_to(&self, value: impl Into<Value>, key: Option<&str>) -> Reference {
        self.with_filter(FilterKind::EqualTo, value, key)
    }

    fn with_filter(&self, kind: FilterKind, value: impl Into<Value>, key: Option<&str>) -> Reference {
        self.with_query(self.query.clone().with_filter(kind, Filter::new(value, key)))
    }

    /// The query in its exported form, for
    /// [`Database::reference_with_query`](crate::Database::reference_with_query).
    pub fn export_query(&self) -> ExportedQuery {
        self.query.export()
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Listen for `event`. Resolves once the backend acknowledges the watch.
    pub async fn on(&self, event: EventType, callback: EventCallback) -> Result<()> {
        let path = self.to_path_string();
        let modifiers = self.query.build();
        let modifiers_string = self.query.modifiers_string();
        tracing::debug!(%path, modifiers = %modifiers_string, %event, "reference.on");
        self.core
            .registry
            .on(&path, &modifiers_string, &modifiers, event, callback)
            .await
    }

    /// Stop listening. See [`SubscriptionRegistry::off`](crate::SubscriptionRegistry::off).
    pub async fn off(
        &self,
        event: Option<EventType>,
        callback: Option<&EventCallback>,
    ) -> Result<()> {
        let path = self.to_path_string();
        let modifiers_string = self.query.modifiers_string();
        tracing::debug!(%path, modifiers = %modifiers_string, ?event, "reference.off");
        self.core
            .registry
            .off(&path, &modifiers_string, event, callback)
            .await
    }

    /// Read the current value once, without registering a listener.
    pub async fn once(&self, event: EventType) -> Result<Snapshot> {
        let path = self.to_path_string();
        let modifiers = self.query.build();
        let modifiers_string = self.query.modifiers_string();
        let payload = self
            .core
            .backend
            .read_once(&path, &modifiers_string, &modifiers, event)
            .await?;
        Ok(Snapshot::new(payload))
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    pub async fn set<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.core.backend.set(&self.to_path_string(), value).await?;
        Ok(())
    }

    /// Merge the fields of `value` into the location. `value` must serialize
    /// to a JSON object.
    pub async fn update<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        if !value.is_object() {
            return Err(DatabaseError::InvalidValue(format!(
                "update() at {} expects an object, got {value}",
                self.path
            )));
        }
        self.core.backend.update(&self.to_path_string(), value).await?;
        Ok(())
    }

    pub async fn remove(&self) -> Result<()> {
        self.core.backend.remove(&self.to_path_string()).await?;
        Ok(())
    }

    /// Append `value` under a new backend-generated child key and return a
    /// reference to it.
    pub async fn push<T: Serialize + ?Sized>(&self, value: &T) -> Result<Reference> {
        let value = serde_json::to_value(value)?;
        let new_path = self.core.backend.push(&self.to_path_string(), value).await?;
        Ok(self.at(Path::parse(&new_path)))
    }

    /// Reference to a fresh child under a locally generated push key. No
    /// backend call is made.
    pub fn push_ref(&self) -> Reference {
        let key = self.core.push_ids.next_id();
        self.child(key.as_str())
    }

    pub async fn keep_synced(&self, enabled: bool) -> Result<()> {
        self.core
            .backend
            .keep_synced(&self.to_path_string(), enabled)
            .await?;
        Ok(())
    }

    pub fn on_disconnect(&self) -> OnDisconnect {
        OnDisconnect::new(Arc::clone(&self.core.backend), self.to_path_string())
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.path, f)
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("db", &self.core.name)
            .field("path", &self.path.to_path_string())
            .field("query", &self.query.modifiers_string())
            .finish()
    }
}
