//! OnDisconnect: writes the server applies when this client goes away.
//!
//! Each call replaces the action registered for the path; `cancel` clears it.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::{
    backend::{Backend, DisconnectAction},
    error::Result,
};

pub struct OnDisconnect {
    backend: Arc<dyn Backend>,
    path: String,
}

impl OnDisconnect {
    pub(crate) fn new(backend: Arc<dyn Backend>, path: String) -> Self {
        Self { backend, path }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Write `value` at the path on disconnect.
    pub async fn set_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.apply(DisconnectAction::SetValue(value)).await
    }

    /// Remove the path on disconnect.
    pub async fn remove(&self) -> Result<()> {
        self.apply(DisconnectAction::Remove).await
    }

    /// Drop whatever action is registered for the path.
    pub async fn cancel(&self) -> Result<()> {
        self.apply(DisconnectAction::Cancel).await
    }

    async fn apply(&self, action: DisconnectAction) -> Result<()> {
        tracing::debug!(path = %self.path, ?action, "registering disconnect action");
        self.backend
            .set_disconnect_action(&self.path, action)
            .await?;
        Ok(())
    }
}

impl fmt::Debug for OnDisconnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnDisconnect")
            .field("path", &self.path)
            .finish()
    }
}
