#![deny(warnings)]
#![allow(unused_parens)]

//! A normalized in-memory entity cache.
//!
//! Nested response payloads are flattened into per-entity records keyed by a
//! stable entity key (`"<TypeName>:<id>"`). Relations between entities are
//! stored as explicit key-based [`Link`]s rather than nested data, so an
//! entity written through several different queries has exactly one record,
//! and every query reading it sees the same fields.
//!
//! Reads are driven by a [`FieldSelector`] tree describing the requested
//! shape, with per-field arguments keyed into the record so that different
//! argument sets for the same field (filters, pagination) never collide.
//!
//! ```
//! use normalized_cache::{FieldSelector, Store};
//! use serde_json::json;
//!
//! let store = Store::new();
//! let selection = vec![FieldSelector::object(
//!     "book",
//!     vec![
//!         FieldSelector::scalar("__typename"),
//!         FieldSelector::scalar("id"),
//!         FieldSelector::scalar("title")
//!     ]
//! )];
//! let data = json!({
//!     "book": { "__typename": "Book", "id": "abc", "title": "Normalization" }
//! });
//!
//! store.write_query("Query", &selection, &data).unwrap();
//! assert_eq!(store.read_query("Query", &selection).unwrap(), data);
//! ```

mod error;
mod store;
mod types;

pub use error::StoreError;
pub use store::{Link, ModifyHelpers, Store};
pub use types::{FieldModifiers, FieldSelector, FieldValue, Modified, StoreOptions};

/// `HashMap` with the fnv hasher used throughout the crate.
pub type HashMap<K, V> = std::collections::HashMap<K, V, fnv::FnvBuildHasher>;
/// `HashSet` with the fnv hasher used throughout the crate.
pub type HashSet<T> = std::collections::HashSet<T, fnv::FnvBuildHasher>;
