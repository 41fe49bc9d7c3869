//! Query: the accumulated ordering/limit/filter modifiers of a reference.
//!
//! Serialization is deterministic: `build()` always emits the ordering
//! first, then the limit, then filters in [`FilterKind`] order, no matter
//! in which order the setters were called. The joined form is used both on
//! the wire and as part of the subscription registry key.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::error::QueryError;

use super::types::{
    split_unescaped, unescape_arg, ExportedQuery, Filter, FilterKind, Limit, OrderBy,
    ARGS_SEPARATOR, MODIFIER_SEPARATOR,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    order_by: Option<OrderBy>,
    limit: Option<Limit>,
    filters: BTreeMap<FilterKind, Filter>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // String-named setters
    // -----------------------------------------------------------------------

    /// Replace the ordering. Last write wins.
    pub fn set_order_by(&mut self, name: &str, key: Option<&str>) -> Result<(), QueryError> {
        self.order_by = Some(OrderBy::parse(name, key)?);
        Ok(())
    }

    /// Replace the limit.
    pub fn set_limit(&mut self, name: &str, n: i64) -> Result<(), QueryError> {
        self.limit = Some(Limit::parse(name, n)?);
        Ok(())
    }

    /// Insert or replace the named filter.
    pub fn set_filter(
        &mut self,
        name: &str,
        value: impl Into<Value>,
        key: Option<&str>,
    ) -> Result<(), QueryError> {
        let kind: FilterKind = name.parse()?;
        self.filters.insert(kind, Filter::new(value, key));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Typed builders
    // -----------------------------------------------------------------------

    pub fn with_order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = Some(order_by);
        self
    }

    pub fn with_limit(mut self, limit: Limit) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_filter(mut self, kind: FilterKind, filter: Filter) -> Self {
        self.filters.insert(kind, filter);
        self
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn order_by(&self) -> Option<&OrderBy> {
        self.order_by.as_ref()
    }

    pub fn limit(&self) -> Option<Limit> {
        self.limit
    }

    pub fn filter(&self, kind: FilterKind) -> Option<&Filter> {
        self.filters.get(&kind)
    }

    /// True when no modifier is set (the query matches the whole location).
    pub fn is_default(&self) -> bool {
        self.order_by.is_none() && self.limit.is_none() && self.filters.is_empty()
    }

    // -----------------------------------------------------------------------
    // Export / import
    // -----------------------------------------------------------------------

    pub fn export(&self) -> ExportedQuery {
        let filters = if self.filters.is_empty() {
            None
        } else {
            Some(self.filter_tokens().join(&MODIFIER_SEPARATOR.to_string()))
        };
        ExportedQuery {
            order_by: self.order_by.as_ref().map(ToString::to_string),
            limit: self.limit.map(|l| l.to_string()),
            filters,
        }
    }

    /// Rebuild a query from its exported form.
    pub fn import(exported: &ExportedQuery) -> Result<Self, QueryError> {
        let mut query = Self::new();

        if let Some(order_by) = &exported.order_by {
            let parts = split_unescaped(order_by, ARGS_SEPARATOR);
            let key = parts.get(1).map(|k| unescape_arg(k));
            query.set_order_by(parts[0], key.as_deref())?;
        }

        if let Some(limit) = &exported.limit {
            let parts = split_unescaped(limit, ARGS_SEPARATOR);
            let raw = parts.get(1).copied().unwrap_or_default();
            let n = raw.parse::<i64>().map_err(|_| QueryError::InvalidLimit {
                name: parts[0].to_string(),
                value: raw.to_string(),
            })?;
            query.set_limit(parts[0], n)?;
        }

        if let Some(filters) = &exported.filters {
            for token in split_unescaped(filters, MODIFIER_SEPARATOR)
                .into_iter()
                .filter(|t| !t.is_empty())
            {
                let parts = split_unescaped(token, ARGS_SEPARATOR);
                let value = Filter::parse_value(parts.get(1).copied().unwrap_or_default());
                let key = parts.get(2).map(|k| unescape_arg(k));
                query.set_filter(parts[0], value, key.as_deref())?;
            }
        }

        Ok(query)
    }

    // -----------------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------------

    /// Modifier tokens in canonical order: ordering, limit, filters.
    pub fn build(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(2 + self.filters.len());
        if let Some(order_by) = &self.order_by {
            out.push(order_by.to_string());
        }
        if let Some(limit) = &self.limit {
            out.push(limit.to_string());
        }
        out.extend(self.filter_tokens());
        out
    }

    /// The `|`-joined modifier string. Empty for the default query.
    pub fn modifiers_string(&self) -> String {
        self.build().join(&MODIFIER_SEPARATOR.to_string())
    }

    fn filter_tokens(&self) -> Vec<String> {
        self.filters
            .iter()
            .map(|(kind, filter)| filter.token(*kind))
            .collect()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.modifiers_string())
    }
}
