//! Database: entry point owning the backend, the subscription registry,
//! and the reference cache.
//!
//! # Threading model
//!
//! Backend events are drained by one dispatch task spawned on the current
//! Tokio runtime when the database is created. The task is aborted when the
//! last [`Reference`] or [`Database`] sharing the core is dropped.
//!
//! `Database::new` must therefore be called from within a Tokio runtime.

pub mod ref_cache;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    backend::{Backend, ErrorEvent},
    config::DatabaseOptions,
    error::Result,
    path::Path,
    push_id::PushIdGenerator,
    query::{ExportedQuery, Query},
    reference::Reference,
    registry::{ListenerId, SubscriptionRegistry},
};

pub use ref_cache::RefCache;

// ============================================================================
// Shared core
// ============================================================================

/// State shared by a database and every reference created from it.
pub(crate) struct DatabaseCore {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) registry: Arc<SubscriptionRegistry>,
    pub(crate) push_ids: PushIdGenerator,
    pub(crate) name: String,
    dispatcher: JoinHandle<()>,
}

impl Drop for DatabaseCore {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

// ============================================================================
// Database
// ============================================================================

pub struct Database {
    core: Arc<DatabaseCore>,
    refs: RefCache<Reference>,
    persistence: AtomicBool,
    options: DatabaseOptions,
}

impl Database {
    /// Create a database over `backend` and start its dispatch task.
    pub fn new(backend: Arc<dyn Backend>, options: DatabaseOptions) -> Self {
        let (registry, events) = SubscriptionRegistry::new(Arc::clone(&backend));
        let registry = Arc::new(registry);
        let dispatcher = tokio::spawn(Arc::clone(&registry).run(events));

        tracing::debug!(name = %options.name, "created database instance");

        Self {
            core: Arc::new(DatabaseCore {
                backend,
                registry,
                push_ids: PushIdGenerator::new(),
                name: options.name.clone(),
                dispatcher,
            }),
            refs: RefCache::new(),
            persistence: AtomicBool::new(false),
            options,
        }
    }

    /// Create a database and apply the persistence and keep-synced options.
    pub async fn open(backend: Arc<dyn Backend>, options: DatabaseOptions) -> Result<Self> {
        let db = Self::new(backend, options);
        if db.options.persistence {
            db.set_persistence(true).await?;
        }
        for path in &db.options.keep_synced {
            db.reference(path.as_str()).keep_synced(true).await?;
        }
        Ok(db)
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    // -----------------------------------------------------------------------
    // References
    // -----------------------------------------------------------------------

    /// The cached reference for `path`. Equal paths yield the same `Arc`.
    pub fn reference(&self, path: impl Into<Path>) -> Arc<Reference> {
        let path = path.into();
        let key = path.to_path_string();
        self.refs.get_or_insert_with(&key, || {
            Reference::new(Arc::clone(&self.core), path, Query::new())
        })
    }

    pub fn root(&self) -> Arc<Reference> {
        self.reference(Path::root())
    }

    /// Build an uncached reference whose query is restored from `exported`.
    pub fn reference_with_query(
        &self,
        path: impl Into<Path>,
        exported: &ExportedQuery,
    ) -> Result<Reference> {
        let query = Query::import(exported)?;
        Ok(Reference::new(Arc::clone(&self.core), path.into(), query))
    }

    /// Drop the cached reference for `path`. Returns whether one was cached.
    pub fn release(&self, path: impl Into<Path>) -> bool {
        self.refs.release(&path.into().to_path_string())
    }

    pub fn cached_references(&self) -> usize {
        self.refs.len()
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.core.registry
    }

    /// Listen to backend error events for every watched target.
    pub fn on_error(&self, callback: impl Fn(&ErrorEvent) + Send + Sync + 'static) -> ListenerId {
        self.core.registry.on_error(callback)
    }

    pub fn off_error(&self, id: ListenerId) -> bool {
        self.core.registry.off_error(id)
    }

    /// Remove every listener registered through this database.
    pub async fn cleanup(&self) -> Result<()> {
        self.core.registry.cleanup().await
    }

    // -----------------------------------------------------------------------
    // Connection
    // -----------------------------------------------------------------------

    /// Toggle backend persistence. No backend call when already in that state.
    pub async fn set_persistence(&self, enable: bool) -> Result<()> {
        if self.persistence.load(Ordering::SeqCst) == enable {
            tracing::debug!(name = %self.core.name, enable, "persistence already in requested state");
            return Ok(());
        }
        tracing::debug!(name = %self.core.name, enable, "setting persistence");
        self.core.backend.set_persistence(enable).await?;
        self.persistence.store(enable, Ordering::SeqCst);
        Ok(())
    }

    pub fn persistence_enabled(&self) -> bool {
        self.persistence.load(Ordering::SeqCst)
    }

    pub fn go_online(&self) {
        self.core.backend.go_online();
    }

    pub fn go_offline(&self) {
        self.core.backend.go_offline();
    }
}
