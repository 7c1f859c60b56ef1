//! Capability surface abstracted from the external document store.
//!
//! The mapping layer never talks to a store directly; it goes through
//! [`DataSource`], a narrow async trait covering single-document access,
//! server-generated identifiers, structured queries, and atomic multi-write
//! batches. The transactional variant of each operation is expressed by the
//! optional [`TransactionToken`] parameter: the token is an opaque handle
//! minted and owned by the source — the mapping layer only passes it down,
//! never begins or commits a transaction itself.

use std::fmt::Debug;

use async_trait::async_trait;
use bson::{Bson, Document};

use crate::error::DbResult;
use crate::query::StructuredQuery;

/// Opaque handle to a transaction owned by the external data source.
///
/// Its lifetime and commit/rollback protocol belong entirely to the source;
/// the mapping layer treats it as a token to route reads and writes through.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionToken(u64);

impl TransactionToken {
    /// Mints a token from a raw source-assigned id.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw source-assigned id.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// One query result: a document id and its stored field mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// The document id.
    pub id: String,
    /// The stored field mapping.
    pub fields: Document,
}

/// A single field-path update.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    /// The field path to set.
    pub path: String,
    /// The new value.
    pub value: Bson,
}

impl FieldUpdate {
    /// Creates an update setting `path` to `value`.
    pub fn new(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }
}

/// One element of an atomic write batch.
#[derive(Debug, Clone)]
pub enum BatchWrite {
    /// Full-document overwrite (upsert).
    Set {
        /// Target collection.
        collection: String,
        /// Target document id.
        id: String,
        /// Full field mapping to store.
        fields: Document,
    },
    /// Field-path update of an existing document.
    Update {
        /// Target collection.
        collection: String,
        /// Target document id.
        id: String,
        /// Field updates to apply.
        updates: Vec<FieldUpdate>,
    },
    /// Document deletion (idempotent).
    Delete {
        /// Target collection.
        collection: String,
        /// Target document id.
        id: String,
    },
}

/// Abstract interface to the external document store.
///
/// Implementations must be thread-safe; every method is async and resolves
/// when the underlying round-trip completes. Errors are surfaced as
/// [`DbError`](crate::error::DbError) values — implementations must not
/// retry internally.
#[async_trait]
pub trait DataSource: Send + Sync + Debug {
    /// Fetches a single document, or `None` when absent. Routed through
    /// `txn` when given.
    async fn get_document(
        &self,
        txn: Option<&TransactionToken>,
        collection: &str,
        id: &str,
    ) -> DbResult<Option<Document>>;

    /// Writes the full field mapping at `id`, creating or overwriting the
    /// document (upsert). Routed through `txn` when given.
    async fn set_document(
        &self,
        txn: Option<&TransactionToken>,
        collection: &str,
        id: &str,
        fields: Document,
    ) -> DbResult<()>;

    /// Applies field-path updates to an existing document; a missing
    /// document is an error. Routed through `txn` when given.
    async fn update_document(
        &self,
        txn: Option<&TransactionToken>,
        collection: &str,
        id: &str,
        updates: Vec<FieldUpdate>,
    ) -> DbResult<()>;

    /// Deletes a document. Deleting a nonexistent document is not an error.
    /// Routed through `txn` when given.
    async fn delete_document(
        &self,
        txn: Option<&TransactionToken>,
        collection: &str,
        id: &str,
    ) -> DbResult<()>;

    /// Returns a fresh server-generated document identifier for `collection`.
    async fn new_document_id(&self, collection: &str) -> DbResult<String>;

    /// Executes a resolved query and returns matching snapshots in the
    /// store's result order, honoring filters, orders, limit, and
    /// `start_after`.
    async fn run_query(
        &self,
        txn: Option<&TransactionToken>,
        collection: &str,
        query: StructuredQuery,
    ) -> DbResult<Vec<Snapshot>>;

    /// Commits `writes` as one atomic unit: either every write applies or
    /// none does.
    async fn commit_batch(&self, writes: Vec<BatchWrite>) -> DbResult<()>;

    /// Releases any resources held by the source. Default is a no-op.
    async fn close(&self) -> DbResult<()> {
        Ok(())
    }
}
