//! Configuration for a [`Database`](crate::Database) instance.
//!
//! # Example
//!
//! ```
//! use rtdb::DatabaseOptions;
//!
//! let options = DatabaseOptions::default();
//! assert_eq!(options.name, "[DEFAULT]");
//! assert!(!options.persistence);
//!
//! let options: DatabaseOptions = serde_json::from_str(
//!     r#"{ "name": "chat", "persistence": true, "keep_synced": ["/rooms"] }"#,
//! ).unwrap();
//! assert_eq!(options.keep_synced, vec!["/rooms".to_string()]);
//! ```

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseOptions {
    /// Instance name, attached to log events.
    #[serde(default = "default_name")]
    pub name: String,

    /// Enable backend persistence when opened with
    /// [`Database::open`](crate::Database::open).
    #[serde(default)]
    pub persistence: bool,

    /// Paths kept synced from the moment the database is opened.
    #[serde(default)]
    pub keep_synced: Vec<String>,
}

fn default_name() -> String {
    "[DEFAULT]".to_string()
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            name: default_name(),
            persistence: false,
            keep_synced: Vec::new(),
        }
    }
}
