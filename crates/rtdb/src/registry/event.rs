//! EventType: the kinds of change a subscription can listen for.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// The whole value at the location changed.
    Value,
    ChildAdded,
    ChildChanged,
    ChildRemoved,
    ChildMoved,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        Self::Value,
        Self::ChildAdded,
        Self::ChildChanged,
        Self::ChildRemoved,
        Self::ChildMoved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::ChildAdded => "child_added",
            Self::ChildChanged => "child_changed",
            Self::ChildRemoved => "child_removed",
            Self::ChildMoved => "child_moved",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| QueryError::InvalidEventType(s.to_string()))
    }
}
