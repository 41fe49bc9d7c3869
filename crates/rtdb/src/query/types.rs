//! Query modifier types: ordering, limit, and range filters.
//!
//! Each type knows its wire name and how it renders into a single
//! modifier token (`orderByChild:ts`, `limitToLast:20`, `startAt:a:key`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::QueryError;

/// Separator between a modifier name and its arguments.
pub const ARGS_SEPARATOR: char = ':';

/// Separator between modifiers in a modifier string.
pub const MODIFIER_SEPARATOR: char = '|';

/// Prefix that makes the next character of a token argument literal.
pub const ESCAPE: char = '\\';

/// Backslash-escape both separators and the escape character itself.
pub fn escape_arg(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == ESCAPE || c == ARGS_SEPARATOR || c == MODIFIER_SEPARATOR {
            out.push(ESCAPE);
        }
        out.push(c);
    }
    out
}

/// Inverse of [`escape_arg`]. A trailing lone escape is kept as-is.
pub fn unescape_arg(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c == ESCAPE {
            out.push(chars.next().unwrap_or(ESCAPE));
        } else {
            out.push(c);
        }
    }
    out
}

/// Split on every `sep` that is not escaped. Pieces keep their escapes.
pub fn split_unescaped(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == ESCAPE {
            escaped = true;
        } else if c == sep {
            parts.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}

// ============================================================================
// Ordering
// ============================================================================

/// The single active sort key of a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrderBy {
    Key,
    Priority,
    Value,
    /// Order by the value of the named child.
    Child(String),
}

impl OrderBy {
    /// Parse a modifier name plus optional child key.
    ///
    /// `orderByChild` requires a non-empty key; the other orderings ignore it.
    pub fn parse(name: &str, key: Option<&str>) -> Result<Self, QueryError> {
        match name {
            "orderByKey" => Ok(Self::Key),
            "orderByPriority" => Ok(Self::Priority),
            "orderByValue" => Ok(Self::Value),
            "orderByChild" => match key.filter(|k| !k.is_empty()) {
                Some(k) => Ok(Self::Child(k.to_string())),
                None => Err(QueryError::MissingChildKey(name.to_string())),
            },
            other => Err(QueryError::InvalidModifier {
                kind: "order",
                name: other.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Key => "orderByKey",
            Self::Priority => "orderByPriority",
            Self::Value => "orderByValue",
            Self::Child(_) => "orderByChild",
        }
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Child(key) => write!(f, "{}{ARGS_SEPARATOR}{}", self.name(), escape_arg(key)),
            _ => f.write_str(self.name()),
        }
    }
}

// ============================================================================
// Limit
// ============================================================================

/// Caps the result set from the start or the end of the ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Limit {
    First(u64),
    Last(u64),
}

impl Limit {
    /// Parse a limit name and count. Negative counts are rejected.
    pub fn parse(name: &str, n: i64) -> Result<Self, QueryError> {
        let count = u64::try_from(n).map_err(|_| QueryError::InvalidLimit {
            name: name.to_string(),
            value: n.to_string(),
        })?;
        match name {
            "limitToFirst" => Ok(Self::First(count)),
            "limitToLast" => Ok(Self::Last(count)),
            other => Err(QueryError::InvalidModifier {
                kind: "limit",
                name: other.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::First(_) => "limitToFirst",
            Self::Last(_) => "limitToLast",
        }
    }

    pub fn count(&self) -> u64 {
        match self {
            Self::First(n) | Self::Last(n) => *n,
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{ARGS_SEPARATOR}{}", self.name(), self.count())
    }
}

// ============================================================================
// Filters
// ============================================================================

/// Range filter kinds. The derived `Ord` is the serialization order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterKind {
    StartAt,
    EndAt,
    EqualTo,
}

impl FilterKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartAt => "startAt",
            Self::EndAt => "endAt",
            Self::EqualTo => "equalTo",
        }
    }
}

impl FromStr for FilterKind {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "startAt" => Ok(Self::StartAt),
            "endAt" => Ok(Self::EndAt),
            "equalTo" => Ok(Self::EqualTo),
            other => Err(QueryError::InvalidModifier {
                kind: "filter",
                name: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bound value of a range filter, optionally keyed by a child key.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub value: Value,
    pub key: Option<String>,
}

impl Filter {
    pub fn new(value: impl Into<Value>, key: Option<&str>) -> Self {
        Self {
            value: value.into(),
            key: key.filter(|k| !k.is_empty()).map(str::to_string),
        }
    }

    /// Render the value for a modifier token, separators escaped.
    ///
    /// Strings go out raw unless the text would itself parse as JSON (`"5"`,
    /// `"true"`, `"\"x\""`); those are written as a quoted JSON string so
    /// they never render like the number, bool or string they resemble.
    /// Every other value is written as JSON text.
    pub fn render_value(&self) -> String {
        let text = match &self.value {
            Value::String(s) if serde_json::from_str::<Value>(s).is_ok() => self.value.to_string(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        escape_arg(&text)
    }

    /// Inverse of [`Filter::render_value`]: text that parses as JSON is
    /// taken as that value, anything else is a raw string.
    pub fn parse_value(raw: &str) -> Value {
        let text = unescape_arg(raw);
        match serde_json::from_str::<Value>(&text) {
            Ok(v) => v,
            Err(_) => Value::String(text),
        }
    }

    pub(crate) fn token(&self, kind: FilterKind) -> String {
        match &self.key {
            Some(key) => format!(
                "{}{ARGS_SEPARATOR}{}{ARGS_SEPARATOR}{}",
                kind.name(),
                self.render_value(),
                escape_arg(key)
            ),
            None => format!("{}{ARGS_SEPARATOR}{}", kind.name(), self.render_value()),
        }
    }
}

// ============================================================================
// Exported form
// ============================================================================

/// Compact string map used to carry a query's state into a new reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<String>,
}

impl ExportedQuery {
    pub fn is_empty(&self) -> bool {
        self.order_by.is_none() && self.limit.is_none() && self.filters.is_none()
    }
}

// ============================================================================
// Tests
// ============================================================================
