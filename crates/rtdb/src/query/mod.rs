//! Query builder: ordering, limit and range filters for a reference.
//!
//! - [`types`]: [`OrderBy`], [`Limit`], [`FilterKind`], [`Filter`], [`ExportedQuery`].
//! - [`modifiers`]: [`Query`], the accumulated modifier set.

pub mod modifiers;
pub mod types;

pub use modifiers::Query;
pub use types::{ExportedQuery, Filter, FilterKind, Limit, OrderBy};
