//! SubscriptionRegistry: demultiplexes backend events to listener callbacks.
//!
//! # Bookkeeping
//!
//! Callbacks are grouped by *handle* (`path|modifiers`) and then by
//! [`EventType`]. The maps are updated synchronously inside `on`/`off`
//! before any backend call is awaited, so an `on` immediately followed by
//! an `off` resolves against local state without waiting for the network.
//!
//! - Only the 0→1 transition for a `(handle, event)` issues
//!   [`Backend::watch`]; further callbacks piggyback on it.
//! - Only the 1→0 transition (or a bulk `off`) issues [`Backend::unwatch`].
//! - The shared data/error listener pair is attached when the first handle
//!   is created and detached once the last handle entry is released.
//! - A rejected `watch` rolls its callback back out, so a later `on` for
//!   the same target issues a fresh `watch`.
//! - A rejected `unwatch` leaves the entry `Unregistering`; the next `off`
//!   or stale event for it retries.
//!
//! # Stale events
//!
//! An event can still be in flight after a local `off`. When one arrives
//! for a `(handle, event)` with no callbacks, the registry issues an
//! `unwatch` for it instead of dropping it silently, so the backend never
//! keeps streaming to nobody.
//!
//! # Threading
//!
//! `state` is a `parking_lot::Mutex` that is never held across an `.await`,
//! while application callbacks run, or while calling into the backend.

use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{
    backend::{
        Backend, BackendEvent, DataEvent, ErrorEvent, EventChannel, EventSink, NativeListenerId,
    },
    error::Result,
    query::types::{escape_arg, MODIFIER_SEPARATOR},
    snapshot::Snapshot,
};

use super::{
    event::EventType,
    event_emitter::{EventEmitter, ListenerId},
};

// ============================================================================
// Public types
// ============================================================================

/// A listener callback. Removal matches on the `Arc` instance, so keep a
/// clone of what was passed to `on` to remove it later.
pub type EventCallback = Arc<dyn Fn(&Snapshot) + Send + Sync>;

/// Wrap a closure as an [`EventCallback`].
pub fn callback(f: impl Fn(&Snapshot) + Send + Sync + 'static) -> EventCallback {
    Arc::new(f)
}

/// Registry key for one distinct backend watch target.
///
/// Separators inside the path are escaped the same way query arguments are,
/// so a `|` in a path segment cannot shift part of it into the modifiers.
pub fn handle_key(path: &str, modifiers_string: &str) -> String {
    format!("{}{MODIFIER_SEPARATOR}{modifiers_string}", escape_arg(path))
}

/// Lifecycle of a handle entry. A handle with no entry is unregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlePhase {
    /// A `watch` has been issued and not yet acknowledged.
    Registering,
    /// Every issued `watch` has been acknowledged.
    Active,
    /// The last callback is gone; waiting for `unwatch` to complete.
    Unregistering,
}

/// What happened to a dispatched backend event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Delivered to this many callbacks (panicking ones included).
    Delivered(usize),
    /// No callback was registered; a defensive `unwatch` was issued.
    Stale,
    /// An error event, forwarded to the error stream.
    Error,
}

// ============================================================================
// Internal state
// ============================================================================

struct HandleEntry {
    path: String,
    modifiers_string: String,
    callbacks: BTreeMap<EventType, Vec<EventCallback>>,
    phase: HandlePhase,
}

impl HandleEntry {
    fn new(path: &str, modifiers_string: &str) -> Self {
        Self {
            path: path.to_string(),
            modifiers_string: modifiers_string.to_string(),
            callbacks: BTreeMap::new(),
            phase: HandlePhase::Registering,
        }
    }
}

struct NativeListeners {
    data: NativeListenerId,
    error: NativeListenerId,
}

struct RegistryState {
    handles: HashMap<String, HandleEntry>,
    native: Option<NativeListeners>,
}

fn same_callback(a: &EventCallback, b: &EventCallback) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

// ============================================================================
// SubscriptionRegistry
// ============================================================================

pub struct SubscriptionRegistry {
    backend: Arc<dyn Backend>,
    sink: EventSink,
    state: Mutex<RegistryState>,
    errors: EventEmitter<ErrorEvent>,
}

impl SubscriptionRegistry {
    /// Create a registry and the receiving end of its event channel.
    ///
    /// The receiver must be drained with [`SubscriptionRegistry::run`] (or
    /// by calling [`SubscriptionRegistry::dispatch`] per event).
    pub fn new(backend: Arc<dyn Backend>) -> (Self, mpsc::UnboundedReceiver<BackendEvent>) {
        let (sink, events) = mpsc::unbounded_channel();
        let registry = Self {
            backend,
            sink,
            state: Mutex::new(RegistryState {
                handles: HashMap::new(),
                native: None,
            }),
            errors: EventEmitter::new(),
        };
        (registry, events)
    }

    /// Dispatch loop: handles events one at a time, in arrival order.
    pub async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<BackendEvent>) {
        while let Some(event) = events.recv().await {
            self.dispatch(event).await;
        }
        tracing::debug!("event channel closed; dispatch loop exiting");
    }

    // -----------------------------------------------------------------------
    // on / off
    // -----------------------------------------------------------------------

    /// Register `callback` for `event` on `(path, modifiers_string)`.
    ///
    /// Resolves once the backend acknowledges the watch, or immediately when
    /// the `(handle, event)` was already being watched. A rejected watch is
    /// returned as-is and the callback is removed again, so calling `on`
    /// once more retries the watch.
    pub async fn on(
        &self,
        path: &str,
        modifiers_string: &str,
        modifiers: &[String],
        event: EventType,
        callback: EventCallback,
    ) -> Result<()> {
        let handle = handle_key(path, modifiers_string);

        let (first, needs_native) = {
            let mut st = self.state.lock();
            let needs_native = st.native.is_none();
            let entry = st
                .handles
                .entry(handle.clone())
                .or_insert_with(|| HandleEntry::new(path, modifiers_string));
            let list = entry.callbacks.entry(event).or_default();
            list.push(Arc::clone(&callback));
            let first = list.len() == 1;
            if first {
                entry.phase = HandlePhase::Registering;
            }
            (first, needs_native)
        };

        if needs_native {
            self.attach_native_listeners();
        }

        if !first {
            tracing::debug!(%handle, %event, "added listener to existing watch");
            return Ok(());
        }

        tracing::debug!(%handle, %event, "issuing backend watch");
        if let Err(e) = self
            .backend
            .watch(path, modifiers_string, modifiers, event)
            .await
        {
            tracing::warn!(%handle, %event, error = %e, "backend watch failed; dropping listener");
            self.rollback_failed_watch(&handle, event, &callback);
            return Err(e.into());
        }

        let mut st = self.state.lock();
        if let Some(entry) = st.handles.get_mut(&handle) {
            if entry.phase == HandlePhase::Registering && !entry.callbacks.is_empty() {
                entry.phase = HandlePhase::Active;
            }
        }
        Ok(())
    }

    /// Remove listeners for `(path, modifiers_string)`.
    ///
    /// - `event == None` clears every event type of the handle (any
    ///   `callback` is ignored).
    /// - `callback == Some` removes that instance only; the backend is told
    ///   to stop only once no callback is left for the event.
    ///
    /// Removing something that is not registered logs a warning and
    /// succeeds without a backend call. A handle whose earlier `unwatch`
    /// failed is still held in `Unregistering`; calling `off` on it again
    /// retries the `unwatch`. The entry is only released once an `unwatch`
    /// succeeds.
    pub async fn off(
        &self,
        path: &str,
        modifiers_string: &str,
        event: Option<EventType>,
        callback: Option<&EventCallback>,
    ) -> Result<()> {
        let handle = handle_key(path, modifiers_string);

        {
            let mut st = self.state.lock();
            let Some(entry) = st.handles.get_mut(&handle) else {
                tracing::warn!(%handle, ?event, "off() called, but not listening at that location");
                return Ok(());
            };

            let retry = entry.phase == HandlePhase::Unregistering && entry.callbacks.is_empty();
            if retry {
                tracing::debug!(%handle, ?event, "retrying unwatch for unregistering handle");
            } else {
                match event {
                    Some(ev) => {
                        let Some(list) = entry.callbacks.get_mut(&ev) else {
                            tracing::warn!(%handle, event = %ev, "off() called, but no listener for that event");
                            return Ok(());
                        };
                        if let Some(cb) = callback {
                            let Some(index) = list.iter().position(|c| same_callback(c, cb)) else {
                                tracing::warn!(%handle, event = %ev, "off() called, but the callback is not registered");
                                return Ok(());
                            };
                            list.remove(index);
                            if !list.is_empty() {
                                tracing::debug!(%handle, event = %ev, remaining = list.len(), "removed listener");
                                return Ok(());
                            }
                        }
                        entry.callbacks.remove(&ev);
                    }
                    None => {
                        if entry.callbacks.is_empty() {
                            tracing::warn!(%handle, "off() called, but no listeners remain at that location");
                            return Ok(());
                        }
                        entry.callbacks.clear();
                    }
                }

                if entry.callbacks.is_empty() {
                    entry.phase = HandlePhase::Unregistering;
                }
            }
        }

        tracing::debug!(%handle, ?event, "issuing backend unwatch");
        if let Err(e) = self.backend.unwatch(path, modifiers_string, event).await {
            tracing::warn!(%handle, ?event, error = %e, "backend unwatch failed; keeping handle for retry");
            return Err(e.into());
        }
        self.release_if_idle(&handle);
        Ok(())
    }

    /// Remove every listener in the registry, one `off` per `(handle, event)`.
    ///
    /// Every pair is attempted; the first failure is returned.
    ///
    /// Handles left `Unregistering` by an earlier failed `unwatch` get one
    /// bulk `off` each.
    pub async fn cleanup(&self) -> Result<()> {
        let targets: Vec<(String, String, Vec<Option<EventType>>)> = {
            let st = self.state.lock();
            st.handles
                .values()
                .map(|e| {
                    let events = if e.callbacks.is_empty() {
                        vec![None]
                    } else {
                        e.callbacks.keys().copied().map(Some).collect()
                    };
                    (e.path.clone(), e.modifiers_string.clone(), events)
                })
                .collect()
        };

        let mut first_err = None;
        for (path, modifiers_string, events) in targets {
            for event in events {
                if let Err(e) = self.off(&path, &modifiers_string, event, None).await {
                    tracing::warn!(%path, ?event, error = %e, "cleanup: unwatch failed");
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    pub async fn dispatch(&self, event: BackendEvent) -> Dispatch {
        match event {
            BackendEvent::Data(data) => self.dispatch_data(data).await,
            BackendEvent::Error(err) => {
                self.dispatch_error(&err);
                Dispatch::Error
            }
        }
    }

    async fn dispatch_data(&self, event: DataEvent) -> Dispatch {
        let handle = handle_key(&event.path, &event.modifiers_string);

        // Snapshot the callback list; the lock is released before any callback runs.
        let callbacks: Vec<EventCallback> = {
            let st = self.state.lock();
            st.handles
                .get(&handle)
                .and_then(|entry| entry.callbacks.get(&event.event))
                .cloned()
                .unwrap_or_default()
        };

        if callbacks.is_empty() {
            tracing::debug!(
                %handle,
                event = %event.event,
                "no listener registered; removing backend watch"
            );
            if let Err(e) = self
                .backend
                .unwatch(&event.path, &event.modifiers_string, Some(event.event))
                .await
            {
                tracing::warn!(%handle, event = %event.event, error = %e, "defensive unwatch failed");
            } else {
                self.release_if_idle(&handle);
            }
            return Dispatch::Stale;
        }

        tracing::debug!(
            %handle,
            event = %event.event,
            key = ?event.snapshot.key,
            listeners = callbacks.len(),
            "dispatching event"
        );
        for cb in &callbacks {
            let snapshot = Snapshot::new(event.snapshot.clone());
            if catch_unwind(AssertUnwindSafe(|| cb(&snapshot))).is_err() {
                tracing::error!(%handle, event = %event.event, "listener panicked during dispatch");
            }
        }
        Dispatch::Delivered(callbacks.len())
    }

    fn dispatch_error(&self, event: &ErrorEvent) {
        tracing::warn!(
            path = %event.path,
            modifiers = %event.modifiers_string,
            event = ?event.event,
            code = %event.error.code,
            message = %event.error.message,
            "backend reported an error"
        );
        self.errors.emit(event);
    }

    // -----------------------------------------------------------------------
    // Error stream
    // -----------------------------------------------------------------------

    pub fn on_error(&self, callback: impl Fn(&ErrorEvent) + Send + Sync + 'static) -> ListenerId {
        self.errors.on(callback)
    }

    pub fn off_error(&self, id: ListenerId) -> bool {
        self.errors.off(id)
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn handle_count(&self) -> usize {
        self.state.lock().handles.len()
    }

    pub fn handle_phase(&self, path: &str, modifiers_string: &str) -> Option<HandlePhase> {
        let handle = handle_key(path, modifiers_string);
        self.state.lock().handles.get(&handle).map(|e| e.phase)
    }

    pub fn listener_count(&self, path: &str, modifiers_string: &str, event: EventType) -> usize {
        let handle = handle_key(path, modifiers_string);
        self.state
            .lock()
            .handles
            .get(&handle)
            .and_then(|e| e.callbacks.get(&event))
            .map_or(0, Vec::len)
    }

    pub fn has_native_listeners(&self) -> bool {
        self.state.lock().native.is_some()
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    /// Attach the shared data/error listener pair unless it already is.
    ///
    /// The backend is called with the lock released. If a concurrent `on`
    /// attached first, the surplus pair is detached again.
    fn attach_native_listeners(&self) {
        if self.state.lock().native.is_some() {
            return;
        }
        let data = self.backend.add_listener(EventChannel::Data, self.sink.clone());
        let error = self.backend.add_listener(EventChannel::Error, self.sink.clone());

        let surplus = {
            let mut st = self.state.lock();
            if st.native.is_none() && !st.handles.is_empty() {
                st.native = Some(NativeListeners { data, error });
                None
            } else {
                Some(NativeListeners { data, error })
            }
        };
        match surplus {
            None => tracing::debug!(data, error, "attached backend listeners"),
            Some(native) => self.detach(native),
        }
    }

    fn detach(&self, native: NativeListeners) {
        self.backend.remove_listener(native.data);
        self.backend.remove_listener(native.error);
        tracing::debug!("detached backend listeners");
    }

    /// Take the listener pair out of `st` once no handle is left.
    fn take_native_if_empty(st: &mut RegistryState) -> Option<NativeListeners> {
        if st.handles.is_empty() {
            st.native.take()
        } else {
            None
        }
    }

    /// Drop the handle entry if it is still empty, and the backend listeners
    /// if no handle is left. Re-checks state, since an `on` may have raced
    /// the unwatch.
    fn release_if_idle(&self, handle: &str) {
        let native = {
            let mut st = self.state.lock();
            let idle = st
                .handles
                .get(handle)
                .is_some_and(|e| e.callbacks.is_empty() && e.phase == HandlePhase::Unregistering);
            if idle {
                st.handles.remove(handle);
                tracing::debug!(%handle, "released handle");
            }
            Self::take_native_if_empty(&mut st)
        };
        if let Some(native) = native {
            self.detach(native);
        }
    }

    /// Undo the registration of `callback` after its `watch` was rejected.
    ///
    /// Callbacks that piggybacked on the pending watch while it was in flight
    /// are dropped with it, since no backend watch backs them.
    fn rollback_failed_watch(&self, handle: &str, event: EventType, callback: &EventCallback) {
        let native = {
            let mut st = self.state.lock();
            let Some(entry) = st.handles.get_mut(handle) else {
                return;
            };
            if let Some(list) = entry.callbacks.get_mut(&event) {
                if list.iter().any(|c| same_callback(c, callback)) {
                    if list.len() > 1 {
                        tracing::warn!(
                            %handle,
                            %event,
                            dropped = list.len() - 1,
                            "dropping listeners that joined the rejected watch"
                        );
                    }
                    entry.callbacks.remove(&event);
                }
            }
            let emptied = entry.callbacks.is_empty();
            if !emptied && entry.phase == HandlePhase::Registering {
                entry.phase = HandlePhase::Active;
            }
            if emptied {
                st.handles.remove(handle);
            }
            Self::take_native_if_empty(&mut st)
        };
        if let Some(native) = native {
            self.detach(native);
        }
    }
}

impl Drop for SubscriptionRegistry {
    fn drop(&mut self) {
        if let Some(native) = self.state.get_mut().native.take() {
            self.backend.remove_listener(native.data);
            self.backend.remove_listener(native.error);
        }
    }
}
