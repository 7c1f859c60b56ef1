//! Connection/transaction holder.
//!
//! A [`Session`] pairs a shared data-source handle with an optional active
//! transaction. Sessions are immutable snapshots: [`Session::with_transaction`]
//! returns a new session sharing the same handle, so concurrent holders of the
//! original never observe another caller's transaction.

use std::sync::Arc;

use crate::error::{DbError, DbResult};
use crate::source::{DataSource, TransactionToken};

/// Holds a data-source handle and an optional active transaction.
///
/// When a transaction is bound, every read and write issued through the
/// session routes through it; batch-oriented bulk mutation is disallowed
/// while a transaction is active and fails fast instead of silently issuing
/// non-transactional writes.
#[derive(Debug)]
pub struct Session<S: DataSource> {
    source: Option<Arc<S>>,
    txn: Option<TransactionToken>,
}

impl<S: DataSource> Clone for Session<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            txn: self.txn.clone(),
        }
    }
}

impl<S: DataSource> Session<S> {
    /// Creates a session bound to `source`, with no active transaction.
    pub fn new(source: S) -> Self {
        Self {
            source: Some(Arc::new(source)),
            txn: None,
        }
    }

    /// Creates a session around an already-shared source handle.
    pub fn from_shared(source: Arc<S>) -> Self {
        Self {
            source: Some(source),
            txn: None,
        }
    }

    /// Creates a session with no data source bound. [`Session::validate`]
    /// fails on such a session; every mapper operation refuses it.
    pub fn detached() -> Self {
        Self {
            source: None,
            txn: None,
        }
    }

    /// Errors when no data-source handle is bound.
    pub fn validate(&self) -> DbResult<()> {
        if self.source.is_none() {
            return Err(DbError::NoSource);
        }
        Ok(())
    }

    /// True when a data-source handle is bound. Never fails.
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// True when a transaction is active. Never fails.
    pub fn has_transaction(&self) -> bool {
        self.txn.is_some()
    }

    /// The bound source handle, or [`DbError::NoSource`].
    pub fn source(&self) -> DbResult<&S> {
        self.source.as_deref().ok_or(DbError::NoSource)
    }

    /// The active transaction token, if any.
    pub fn transaction(&self) -> Option<&TransactionToken> {
        self.txn.as_ref()
    }

    /// Returns a new session sharing this session's source handle, bound to
    /// `txn`. The receiver is unaffected.
    pub fn with_transaction(&self, txn: TransactionToken) -> Self {
        Self {
            source: self.source.clone(),
            txn: Some(txn),
        }
    }

    /// Returns a new session sharing this session's source handle with no
    /// active transaction.
    pub fn without_transaction(&self) -> Self {
        Self {
            source: self.source.clone(),
            txn: None,
        }
    }

    /// Releases the underlying data-source handle.
    ///
    /// Consuming `self` makes double-close of this session unrepresentable,
    /// but cloned sessions share the same handle — the owner must ensure
    /// close is called once across all clones.
    pub async fn close(self) -> DbResult<()> {
        match self.source {
            Some(source) => source.close().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bson::Document;
    use crate::query::StructuredQuery;
    use crate::source::{BatchWrite, FieldUpdate, Snapshot};

    #[derive(Debug)]
    struct NullSource;

    #[async_trait]
    impl DataSource for NullSource {
        async fn get_document(
            &self,
            _txn: Option<&TransactionToken>,
            _collection: &str,
            _id: &str,
        ) -> DbResult<Option<Document>> {
            Ok(None)
        }

        async fn set_document(
            &self,
            _txn: Option<&TransactionToken>,
            _collection: &str,
            _id: &str,
            _fields: Document,
        ) -> DbResult<()> {
            Ok(())
        }

        async fn update_document(
            &self,
            _txn: Option<&TransactionToken>,
            _collection: &str,
            _id: &str,
            _updates: Vec<FieldUpdate>,
        ) -> DbResult<()> {
            Ok(())
        }

        async fn delete_document(
            &self,
            _txn: Option<&TransactionToken>,
            _collection: &str,
            _id: &str,
        ) -> DbResult<()> {
            Ok(())
        }

        async fn new_document_id(&self, _collection: &str) -> DbResult<String> {
            Ok("id".into())
        }

        async fn run_query(
            &self,
            _txn: Option<&TransactionToken>,
            _collection: &str,
            _query: StructuredQuery,
        ) -> DbResult<Vec<Snapshot>> {
            Ok(Vec::new())
        }

        async fn commit_batch(&self, _writes: Vec<BatchWrite>) -> DbResult<()> {
            Ok(())
        }
    }

    #[test]
    fn detached_session_fails_validation() {
        let session = Session::<NullSource>::detached();
        assert!(!session.has_source());
        assert!(matches!(session.validate(), Err(DbError::NoSource)));
        assert!(matches!(session.source(), Err(DbError::NoSource)));
    }

    #[test]
    fn with_transaction_is_copy_on_write() {
        let base = Session::new(NullSource);
        assert!(base.validate().is_ok());
        assert!(!base.has_transaction());

        let bound = base.with_transaction(TransactionToken::new(7));
        assert!(bound.has_transaction());
        assert_eq!(bound.transaction().map(TransactionToken::raw), Some(7));

        // The original never observes the derived transaction.
        assert!(!base.has_transaction());
        assert!(base.transaction().is_none());

        let unbound = bound.without_transaction();
        assert!(!unbound.has_transaction());
        assert!(bound.has_transaction());
    }

    #[tokio::test]
    async fn close_on_detached_session_is_a_no_op() {
        let session = Session::<NullSource>::detached();
        assert!(session.close().await.is_ok());
    }
}
