//! Adapter from callback-style backend calls to futures.
//!
//! Native transports often report completion through a callback. [`call`]
//! hands the operation a [`Responder`] and awaits whatever is sent through
//! it, so a `Backend` implementation can stay a plain `async fn`:
//!
//! ```
//! use rtdb::request::{call, Responder};
//!
//! fn native_remove(path: &str, done: Responder<()>) {
//!     // ... hand `done` to the native layer, which eventually answers:
//!     let _ = path;
//!     done.resolve(());
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let result = call(|done| native_remove("/a", done)).await;
//! assert!(result.is_ok());
//! # });
//! ```

use tokio::sync::oneshot;

use crate::{backend::BackendResult, error::BackendError};

/// One-shot completion handle passed to a callback-style operation.
///
/// Dropping it without answering rejects the pending call with
/// [`BackendError::dropped`].
pub struct Responder<T> {
    tx: oneshot::Sender<BackendResult<T>>,
}

impl<T> Responder<T> {
    pub fn resolve(self, value: T) {
        self.respond(Ok(value));
    }

    pub fn reject(self, error: BackendError) {
        self.respond(Err(error));
    }

    pub fn respond(self, result: BackendResult<T>) {
        // The caller may have stopped waiting; nothing to do then.
        let _ = self.tx.send(result);
    }

    /// True once the awaiting side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Run a callback-style operation and await its single answer.
pub async fn call<T, F>(operation: F) -> BackendResult<T>
where
    F: FnOnce(Responder<T>),
{
    let (tx, rx) = oneshot::channel();
    operation(Responder { tx });
    rx.await.unwrap_or_else(|_| Err(BackendError::dropped()))
}
