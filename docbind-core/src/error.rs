//! Error types and result types for mapping-layer operations.
//!
//! Use [`DbResult<T>`] as the return type for fallible operations. Callers that
//! need to branch on "absent" versus "broken" should use [`DbError::is_not_found`].

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors surfaced by the mapping layer.
///
/// Precondition errors (`NoSource`, `EmptyId`, `PartialSaveWithoutId`,
/// `IdOrQueryRequired`, `TransactionalBatchUpdate`) are detected locally
/// before any external call. Not-found conditions are distinguishable from
/// generic failures. External errors are propagated, never swallowed.
#[derive(Error, Debug)]
pub enum DbError {
    /// Serialization/deserialization error when converting field values.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The session has no data source bound.
    #[error("no data source bound to session")]
    NoSource,
    /// The requested document was not found.
    /// The first argument is the document id, the second is the collection name.
    #[error("document {0} not found in collection {1}")]
    DocumentNotFound(String, String),
    /// A query expected to match at least one document matched none.
    #[error("no document matched the query in collection {0}")]
    NoMatch(String),
    /// An operation requiring a document identifier was called on a record
    /// with an empty identifier. The argument names the operation.
    #[error("identifier cannot be empty for {0}")]
    EmptyId(&'static str),
    /// Partial-field save requires a non-empty identifier.
    #[error("cannot update fields on a record with no identifier")]
    PartialSaveWithoutId,
    /// A named field is absent from the record's field mapping.
    #[error("field {field} not found in mapping for model {model}")]
    FieldMissing {
        /// Type name of the offending model.
        model: &'static str,
        /// The field name that was requested.
        field: String,
    },
    /// By-query update called with neither an identifier nor a usable query.
    #[error("either an identifier or query conditions must be provided")]
    IdOrQueryRequired,
    /// Batch-oriented bulk updates cannot run inside an active transaction.
    #[error("transactional batch updates are not supported")]
    TransactionalBatchUpdate,
    /// A deferred value provider failed while a query was being applied.
    #[error("failed to resolve value for field {field}: {message}")]
    ValueProvider {
        /// The filter field whose provider failed.
        field: String,
        /// Underlying failure description.
        message: String,
    },
    /// A document could not be decoded into the bound model.
    #[error("failed to decode document into model {model}: {message}")]
    Decode {
        /// Type name of the destination model.
        model: &'static str,
        /// Underlying failure description.
        message: String,
    },
    /// A transaction token was not recognized by the data source.
    #[error("invalid or expired transaction handle")]
    InvalidTransaction,
    /// An error occurred in the underlying data source.
    #[error("backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for mapping-layer operations.
pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// Returns true when the error represents an absent document rather than
    /// a failure of the operation itself.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::DocumentNotFound(..) | DbError::NoMatch(_))
    }
}

impl From<BsonError> for DbError {
    fn from(err: BsonError) -> Self {
        DbError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DbError {
    fn from(err: SerdeJsonError) -> Self {
        DbError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_variants_are_distinguishable() {
        assert!(DbError::DocumentNotFound("a".into(), "users".into()).is_not_found());
        assert!(DbError::NoMatch("users".into()).is_not_found());
        assert!(!DbError::EmptyId("get_by_id").is_not_found());
        assert!(!DbError::Backend("boom".into()).is_not_found());
    }
}
