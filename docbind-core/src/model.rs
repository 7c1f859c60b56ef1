//! Core trait for record-to-document translation.
//!
//! A [`Model`] describes how a typed record maps onto a stored document: which
//! field carries the identifier, and which fields appear in the document under
//! which external names. Implementations are normally generated with
//! `#[derive(Model)]`, but hand-written impls are equally valid and follow the
//! same contract.

use bson::Document;

use crate::error::DbResult;

/// A typed record that can be stored in a document collection.
///
/// The identifier is a distinguished string field, excluded from the field
/// mapping; a record type may have at most one, and having none is legal (the
/// identifier then behaves as permanently empty). All other stored fields are
/// opted in explicitly via a mapping annotation — untagged fields never reach
/// the document.
///
/// `Default` supplies the zero value used when decoding query results into
/// freshly allocated records.
///
/// # Example
///
/// ```ignore
/// use docbind::prelude::*;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Default, Model)]
/// #[model(collection = "users")]
/// pub struct User {
///     #[model(id)]
///     pub id: String,
///     #[model(rename = "name")]
///     pub name: String,
///     #[model(rename = "age")]
///     pub age: i64,
///     pub scratch: u32, // untagged: never stored
/// }
/// ```
pub trait Model: Default + Clone + Send + Sync + 'static {
    /// Returns the identifier value, or `""` when the record has no
    /// identifier field or it is unset. Never fails.
    fn id(&self) -> &str;

    /// Sets the identifier field if the record has one; no-op otherwise.
    /// Never fails.
    fn set_id(&mut self, id: String);

    /// Converts the record into its stored field mapping: exactly the tagged,
    /// non-ignored fields, each serialized under its external name. The
    /// identifier is never part of the mapping.
    fn field_map(&self) -> DbResult<Document>;

    /// Applies a stored field mapping onto the record in place. Fields absent
    /// from `fields` keep their current value; the identifier is untouched
    /// (callers inject it from the document id separately).
    fn apply_field_map(&mut self, fields: &Document) -> DbResult<()>;

    /// The collection this record type is stored in.
    ///
    /// Override via `#[model(collection = "...")]` or a hand-written method
    /// body; the default derivation is the lowercase short type name with a
    /// pluralizing `"s"` appended. Deterministic and side-effect-free, so it
    /// is resolved on every call rather than cached.
    fn collection_name() -> String {
        default_collection_name::<Self>()
    }
}

/// Default collection-name derivation: lowercase short type name + `"s"`.
///
/// Generic arguments and module paths are stripped, so
/// `my_crate::orders::LineItem` resolves to `"lineitems"`.
pub fn default_collection_name<M: ?Sized>() -> String {
    let full = std::any::type_name::<M>();
    let base = full.split('<').next().unwrap_or(full);
    let short = base.rsplit("::").next().unwrap_or(base);
    format!("{}s", short.to_lowercase())
}
