//! Shared fixtures: a recording mock backend and event helpers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use rtdb::request::call;
use rtdb::{
    Backend, BackendError, BackendEvent, BackendResult, DataEvent, Database, DatabaseOptions,
    DisconnectAction, EventChannel, EventSink, EventType, NativeListenerId, SnapshotPayload,
};

// ============================================================================
// Mock Backend
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
#[allow(dead_code)]
pub enum Call {
    Watch {
        path: String,
        modifiers_string: String,
        modifiers: Vec<String>,
        event: EventType,
    },
    Unwatch {
        path: String,
        modifiers_string: String,
        event: Option<EventType>,
    },
    ReadOnce {
        path: String,
        modifiers_string: String,
        event: EventType,
    },
    Set { path: String, value: Value },
    Update { path: String, value: Value },
    Remove { path: String },
    Push { path: String, value: Value },
    Disconnect { path: String, action: DisconnectAction },
    KeepSynced { path: String, enabled: bool },
    Persistence(bool),
    GoOnline,
    GoOffline,
    AddListener(EventChannel),
    RemoveListener(NativeListenerId),
}

#[derive(Default)]
struct MockBackendInner {
    calls: Vec<Call>,
    sinks: HashMap<NativeListenerId, (EventChannel, EventSink)>,
    next_listener: NativeListenerId,
    failures: HashMap<&'static str, BackendError>,
    read_payload: SnapshotPayload,
    pushed: u64,
}

type ListenerHook = Arc<dyn Fn() + Send + Sync>;

pub struct MockBackend {
    inner: Mutex<MockBackendInner>,
    watch_gate: Mutex<Option<Arc<Semaphore>>>,
    on_add_listener: Mutex<Option<ListenerHook>>,
}

#[allow(dead_code)]
impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(MockBackendInner::default()),
            watch_gate: Mutex::new(None),
            on_add_listener: Mutex::new(None),
        })
    }

    /// Run `hook` inside every `add_listener`, after the mock has recorded
    /// the listener and released its own lock.
    pub fn on_add_listener(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_add_listener.lock() = Some(Arc::new(hook));
    }

    /// Make every call to `op` (e.g. `"watch"`, `"set"`) fail with `error`.
    pub fn fail(&self, op: &'static str, error: BackendError) {
        self.inner.lock().failures.insert(op, error);
    }

    pub fn clear_failures(&self) {
        self.inner.lock().failures.clear();
    }

    /// Payload returned by `read_once`.
    pub fn set_read_payload(&self, payload: Value) {
        self.inner.lock().read_payload =
            serde_json::from_value(payload).expect("valid snapshot payload");
    }

    /// Hold every `watch` until [`MockBackend::ack_watches`] releases it.
    pub fn hold_watches(&self) {
        *self.watch_gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn ack_watches(&self, n: usize) {
        if let Some(gate) = self.watch_gate.lock().as_ref() {
            gate.add_permits(n);
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    pub fn watch_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Watch { .. }))
            .collect()
    }

    pub fn unwatch_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Unwatch { .. }))
            .collect()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().sinks.len()
    }

    /// Deliver `event` to every attached listener of its channel. Returns
    /// how many listeners received it.
    pub fn emit(&self, event: BackendEvent) -> usize {
        let channel = event.channel();
        let sinks: Vec<EventSink> = self
            .inner
            .lock()
            .sinks
            .values()
            .filter(|(c, _)| *c == channel)
            .map(|(_, sink)| sink.clone())
            .collect();
        sinks
            .iter()
            .filter(|sink| sink.send(event.clone()).is_ok())
            .count()
    }

    fn record(&self, call: Call) {
        self.inner.lock().calls.push(call);
    }

    fn check(&self, op: &'static str) -> BackendResult<()> {
        match self.inner.lock().failures.get(op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Answer through the callback adapter, the way a native bridge would.
    async fn answer(&self, op: &'static str, call_record: Call) -> BackendResult<()> {
        self.record(call_record);
        let outcome = self.check(op);
        call(|done| done.respond(outcome)).await
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn watch(
        &self,
        path: &str,
        modifiers_string: &str,
        modifiers: &[String],
        event: EventType,
    ) -> BackendResult<()> {
        self.record(Call::Watch {
            path: path.to_string(),
            modifiers_string: modifiers_string.to_string(),
            modifiers: modifiers.to_vec(),
            event,
        });
        let gate = self.watch_gate.lock().clone();
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|_| BackendError::new("closed", "watch gate closed"))?
                .forget();
        }
        self.check("watch")
    }

    async fn unwatch(
        &self,
        path: &str,
        modifiers_string: &str,
        event: Option<EventType>,
    ) -> BackendResult<()> {
        self.answer(
            "unwatch",
            Call::Unwatch {
                path: path.to_string(),
                modifiers_string: modifiers_string.to_string(),
                event,
            },
        )
        .await
    }

    async fn read_once(
        &self,
        path: &str,
        modifiers_string: &str,
        _modifiers: &[String],
        event: EventType,
    ) -> BackendResult<SnapshotPayload> {
        self.record(Call::ReadOnce {
            path: path.to_string(),
            modifiers_string: modifiers_string.to_string(),
            event,
        });
        self.check("read_once")?;
        Ok(self.inner.lock().read_payload.clone())
    }

    async fn set(&self, path: &str, value: Value) -> BackendResult<()> {
        self.answer("set", Call::Set { path: path.to_string(), value })
            .await
    }

    async fn update(&self, path: &str, value: Value) -> BackendResult<()> {
        self.answer("update", Call::Update { path: path.to_string(), value })
            .await
    }

    async fn remove(&self, path: &str) -> BackendResult<()> {
        self.answer("remove", Call::Remove { path: path.to_string() })
            .await
    }

    async fn push(&self, path: &str, value: Value) -> BackendResult<String> {
        self.record(Call::Push { path: path.to_string(), value });
        self.check("push")?;
        let n = {
            let mut inner = self.inner.lock();
            inner.pushed += 1;
            inner.pushed
        };
        Ok(format!("{}/pushed-{n}", path.trim_end_matches('/')))
    }

    async fn set_disconnect_action(
        &self,
        path: &str,
        action: DisconnectAction,
    ) -> BackendResult<()> {
        self.answer(
            "set_disconnect_action",
            Call::Disconnect { path: path.to_string(), action },
        )
        .await
    }

    async fn keep_synced(&self, path: &str, enabled: bool) -> BackendResult<()> {
        self.answer(
            "keep_synced",
            Call::KeepSynced { path: path.to_string(), enabled },
        )
        .await
    }

    async fn set_persistence(&self, enabled: bool) -> BackendResult<()> {
        self.answer("set_persistence", Call::Persistence(enabled)).await
    }

    fn go_online(&self) {
        self.record(Call::GoOnline);
    }

    fn go_offline(&self) {
        self.record(Call::GoOffline);
    }

    fn add_listener(&self, channel: EventChannel, sink: EventSink) -> NativeListenerId {
        let id = {
            let mut inner = self.inner.lock();
            inner.next_listener += 1;
            let id = inner.next_listener;
            inner.sinks.insert(id, (channel, sink));
            inner.calls.push(Call::AddListener(channel));
            id
        };
        let hook = self.on_add_listener.lock().clone();
        if let Some(hook) = hook {
            hook();
        }
        id
    }

    fn remove_listener(&self, id: NativeListenerId) {
        let mut inner = self.inner.lock();
        inner.sinks.remove(&id);
        inner.calls.push(Call::RemoveListener(id));
    }
}

// ============================================================================
// Helpers
// ============================================================================

#[allow(dead_code)]
pub fn database(backend: &Arc<MockBackend>) -> Database {
    Database::new(backend.clone(), DatabaseOptions::default())
}

#[allow(dead_code)]
pub fn data_event(path: &str, modifiers_string: &str, event: EventType, snapshot: Value) -> BackendEvent {
    BackendEvent::Data(DataEvent {
        path: path.to_string(),
        modifiers_string: modifiers_string.to_string(),
        event,
        snapshot: serde_json::from_value(snapshot).expect("valid snapshot payload"),
    })
}

#[allow(dead_code)]
pub fn value_event(path: &str, modifiers_string: &str, value: Value) -> BackendEvent {
    data_event(path, modifiers_string, EventType::Value, json!({ "value": value }))
}

/// Poll `cond` until it holds, yielding to the dispatch task in between.
#[allow(dead_code)]
pub async fn eventually(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for: {what}");
}

/// Await the next message on `rx`, failing the test after one second.
#[allow(dead_code)]
pub async fn next<T>(rx: &mut tokio::sync::mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for delivery")
        .expect("channel closed")
}
