//! Backend contract: the asynchronous RPC + event source the client drives.
//!
//! Implementations own the actual network I/O and persistence. Data and
//! error events are pushed into an [`EventSink`] handed over through
//! [`Backend::add_listener`]; the database drains that channel on a single
//! dispatch task so events are processed in the order they were sent.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{
    error::BackendError,
    registry::event::EventType,
    snapshot::SnapshotPayload,
};

/// Result type for every backend call.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Channel over which a backend delivers events to the client.
pub type EventSink = mpsc::UnboundedSender<BackendEvent>;

/// Identifies a listener attached with [`Backend::add_listener`].
pub type NativeListenerId = u64;

// ============================================================================
// Events
// ============================================================================

/// Which backend event stream a listener is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventChannel {
    Data,
    Error,
}

/// A data change for one watched `(path, modifiers, event)` target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataEvent {
    pub path: String,
    #[serde(default)]
    pub modifiers_string: String,
    #[serde(rename = "eventName")]
    pub event: EventType,
    #[serde(default)]
    pub snapshot: SnapshotPayload,
}

/// A failure reported by the backend for one watched target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub path: String,
    #[serde(default)]
    pub modifiers_string: String,
    #[serde(rename = "eventName", default)]
    pub event: Option<EventType>,
    pub error: BackendErrorPayload,
}

/// Serialized form of a [`BackendError`] inside an [`ErrorEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendErrorPayload {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl From<BackendErrorPayload> for BackendError {
    fn from(payload: BackendErrorPayload) -> Self {
        BackendError::new(payload.code, payload.message)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    Data(DataEvent),
    Error(ErrorEvent),
}

impl BackendEvent {
    pub fn channel(&self) -> EventChannel {
        match self {
            Self::Data(_) => EventChannel::Data,
            Self::Error(_) => EventChannel::Error,
        }
    }
}

// ============================================================================
// Disconnect actions
// ============================================================================

/// A write the server applies on its own if the client drops unexpectedly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum DisconnectAction {
    SetValue(Value),
    Remove,
    Cancel,
}

// ============================================================================
// Backend trait
// ============================================================================

/// User-provided transport to the remote database.
///
/// All paths are the `/`-prefixed strings produced by
/// [`Path::to_path_string`](crate::path::Path::to_path_string).
#[async_trait]
pub trait Backend: Send + Sync {
    /// Start delivering `event` for the target. Resolves on acknowledgement,
    /// not on first data.
    async fn watch(
        &self,
        path: &str,
        modifiers_string: &str,
        modifiers: &[String],
        event: EventType,
    ) -> BackendResult<()>;

    /// Stop delivering `event` (or every event type when `None`).
    async fn unwatch(
        &self,
        path: &str,
        modifiers_string: &str,
        event: Option<EventType>,
    ) -> BackendResult<()>;

    /// Read the target once.
    async fn read_once(
        &self,
        path: &str,
        modifiers_string: &str,
        modifiers: &[String],
        event: EventType,
    ) -> BackendResult<SnapshotPayload>;

    async fn set(&self, path: &str, value: Value) -> BackendResult<()>;

    async fn update(&self, path: &str, value: Value) -> BackendResult<()>;

    async fn remove(&self, path: &str) -> BackendResult<()>;

    /// Append `value` under a new server-generated child. Returns the new
    /// child's path.
    async fn push(&self, path: &str, value: Value) -> BackendResult<String>;

    async fn set_disconnect_action(
        &self,
        path: &str,
        action: DisconnectAction,
    ) -> BackendResult<()>;

    async fn keep_synced(&self, path: &str, enabled: bool) -> BackendResult<()>;

    async fn set_persistence(&self, enabled: bool) -> BackendResult<()>;

    fn go_online(&self);

    fn go_offline(&self);

    /// Attach a listener that forwards `channel` events into `sink`.
    ///
    /// The registry calls this and [`Backend::remove_listener`] without
    /// holding its own lock, so an implementation may call back into the
    /// database from here.
    fn add_listener(&self, channel: EventChannel, sink: EventSink) -> NativeListenerId;

    /// Detach a listener. Unknown ids are ignored.
    fn remove_listener(&self, id: NativeListenerId);
}
