//! In-memory data source.
//!
//! Stores committed documents as BSON field mappings in nested maps guarded by
//! an async-aware read-write lock. Collections are keyed by name; within a
//! collection, documents live in a `BTreeMap` keyed by id, so an unordered
//! query still returns a stable, id-ascending result order.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering as AtomicOrdering},
    },
};

use async_trait::async_trait;
use bson::Document;
use mea::rwlock::RwLock;
use uuid::Uuid;

use docbind_core::{
    error::{DbError, DbResult},
    query::StructuredQuery,
    source::{BatchWrite, DataSource, FieldUpdate, Snapshot, TransactionToken},
};

use crate::evaluator::{is_after_cursor, matches_filter, compare_keys, order_key};

type CollectionMap = BTreeMap<String, Document>;
type StoreMap = HashMap<String, CollectionMap>;

/// Thread-safe in-memory [`DataSource`] implementation.
///
/// Cloneable with `Arc`-shared internal state, so clones observe the same
/// data. Queries scan the whole collection (no indexing), which is fine for
/// the development and testing workloads this source targets.
///
/// # Transactions
///
/// [`MemorySource::begin_transaction`] mints a token; writes routed through
/// the token are staged and invisible to reads until
/// [`MemorySource::commit_transaction`] applies them atomically. Reads inside
/// a transaction see committed state only.
///
/// # Example
///
/// ```ignore
/// use docbind::memory::MemorySource;
/// use docbind::prelude::*;
///
/// let source = MemorySource::new();
/// let db = Db::new(Session::new(source));
/// ```
#[derive(Default, Clone, Debug)]
pub struct MemorySource {
    /// Committed state: collection name -> (document id -> field mapping).
    store: Arc<RwLock<StoreMap>>,
    /// Staged writes per open transaction, keyed by raw token id.
    staged: Arc<RwLock<HashMap<u64, Vec<BatchWrite>>>>,
    /// Next raw transaction id.
    next_txn: Arc<AtomicU64>,
}

impl MemorySource {
    /// Creates a new empty source with no collections and no open
    /// transactions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a transaction and returns its token. Writes routed through the
    /// token are staged until committed.
    pub async fn begin_transaction(&self) -> TransactionToken {
        let raw = self.next_txn.fetch_add(1, AtomicOrdering::Relaxed);
        self.staged.write().await.insert(raw, Vec::new());
        TransactionToken::new(raw)
    }

    /// Atomically applies every write staged under `txn` and closes it.
    ///
    /// Nothing is applied when any staged update targets a missing document;
    /// the transaction is closed either way.
    pub async fn commit_transaction(&self, txn: &TransactionToken) -> DbResult<()> {
        let writes = self
            .staged
            .write()
            .await
            .remove(&txn.raw())
            .ok_or(DbError::InvalidTransaction)?;

        let mut store = self.store.write().await;
        apply_batch(&mut store, writes)
    }

    /// Discards every write staged under `txn` and closes it.
    pub async fn rollback_transaction(&self, txn: &TransactionToken) -> DbResult<()> {
        self.staged
            .write()
            .await
            .remove(&txn.raw())
            .map(|_| ())
            .ok_or(DbError::InvalidTransaction)
    }

    /// Runs `body` inside a transaction: committed when it returns `Ok`,
    /// rolled back when it returns `Err`.
    pub async fn run_transaction<F, Fut, T>(&self, body: F) -> DbResult<T>
    where
        F: FnOnce(TransactionToken) -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        let txn = self.begin_transaction().await;
        match body(txn.clone()).await {
            Ok(value) => {
                self.commit_transaction(&txn).await?;
                Ok(value)
            }
            Err(err) => {
                self.rollback_transaction(&txn).await?;
                Err(err)
            }
        }
    }

    /// Errors when `txn` names a transaction this source does not have open.
    async fn check_transaction(&self, txn: Option<&TransactionToken>) -> DbResult<()> {
        if let Some(token) = txn {
            if !self.staged.read().await.contains_key(&token.raw()) {
                return Err(DbError::InvalidTransaction);
            }
        }
        Ok(())
    }

    /// Stages `write` under the transaction `token` belongs to.
    async fn stage(&self, token: &TransactionToken, write: BatchWrite) -> DbResult<()> {
        let mut staged = self.staged.write().await;
        let writes = staged
            .get_mut(&token.raw())
            .ok_or(DbError::InvalidTransaction)?;
        writes.push(write);
        Ok(())
    }
}

/// Applies `writes` all-or-nothing: a validation pass first checks every
/// update target exists (accounting for sets and deletes earlier in the same
/// batch), then the writes are applied in order.
fn apply_batch(store: &mut StoreMap, writes: Vec<BatchWrite>) -> DbResult<()> {
    let mut created: HashSet<(String, String)> = HashSet::new();
    let mut removed: HashSet<(String, String)> = HashSet::new();

    for write in &writes {
        match write {
            BatchWrite::Set { collection, id, .. } => {
                removed.remove(&(collection.clone(), id.clone()));
                created.insert((collection.clone(), id.clone()));
            }
            BatchWrite::Update { collection, id, .. } => {
                let key = (collection.clone(), id.clone());
                let committed = store
                    .get(collection)
                    .is_some_and(|col| col.contains_key(id));
                let exists = !removed.contains(&key) && (committed || created.contains(&key));
                if !exists {
                    return Err(DbError::DocumentNotFound(id.clone(), collection.clone()));
                }
            }
            BatchWrite::Delete { collection, id } => {
                created.remove(&(collection.clone(), id.clone()));
                removed.insert((collection.clone(), id.clone()));
            }
        }
    }

    for write in writes {
        match write {
            BatchWrite::Set { collection, id, fields } => {
                store.entry(collection).or_default().insert(id, fields);
            }
            BatchWrite::Update { collection, id, updates } => {
                if let Some(fields) = store
                    .get_mut(&collection)
                    .and_then(|col| col.get_mut(&id))
                {
                    apply_updates(fields, &updates);
                }
            }
            BatchWrite::Delete { collection, id } => {
                if let Some(col) = store.get_mut(&collection) {
                    col.remove(&id);
                }
            }
        }
    }

    Ok(())
}

fn apply_updates(fields: &mut Document, updates: &[FieldUpdate]) {
    for update in updates {
        fields.insert(update.path.clone(), update.value.clone());
    }
}

#[async_trait]
impl DataSource for MemorySource {
    async fn get_document(
        &self,
        txn: Option<&TransactionToken>,
        collection: &str,
        id: &str,
    ) -> DbResult<Option<Document>> {
        self.check_transaction(txn).await?;
        let store = self.store.read().await;
        Ok(store
            .get(collection)
            .and_then(|col| col.get(id))
            .cloned())
    }

    async fn set_document(
        &self,
        txn: Option<&TransactionToken>,
        collection: &str,
        id: &str,
        fields: Document,
    ) -> DbResult<()> {
        if let Some(token) = txn {
            return self
                .stage(
                    token,
                    BatchWrite::Set {
                        collection: collection.to_string(),
                        id: id.to_string(),
                        fields,
                    },
                )
                .await;
        }

        let mut store = self.store.write().await;
        store
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        Ok(())
    }

    async fn update_document(
        &self,
        txn: Option<&TransactionToken>,
        collection: &str,
        id: &str,
        updates: Vec<FieldUpdate>,
    ) -> DbResult<()> {
        if let Some(token) = txn {
            return self
                .stage(
                    token,
                    BatchWrite::Update {
                        collection: collection.to_string(),
                        id: id.to_string(),
                        updates,
                    },
                )
                .await;
        }

        let mut store = self.store.write().await;
        let fields = store
            .get_mut(collection)
            .and_then(|col| col.get_mut(id))
            .ok_or_else(|| DbError::DocumentNotFound(id.to_string(), collection.to_string()))?;
        apply_updates(fields, &updates);
        Ok(())
    }

    async fn delete_document(
        &self,
        txn: Option<&TransactionToken>,
        collection: &str,
        id: &str,
    ) -> DbResult<()> {
        if let Some(token) = txn {
            return self
                .stage(
                    token,
                    BatchWrite::Delete {
                        collection: collection.to_string(),
                        id: id.to_string(),
                    },
                )
                .await;
        }

        let mut store = self.store.write().await;
        if let Some(col) = store.get_mut(collection) {
            col.remove(id);
        }
        Ok(())
    }

    async fn new_document_id(&self, _collection: &str) -> DbResult<String> {
        Ok(Uuid::new_v4().simple().to_string())
    }

    async fn run_query(
        &self,
        txn: Option<&TransactionToken>,
        collection: &str,
        query: StructuredQuery,
    ) -> DbResult<Vec<Snapshot>> {
        self.check_transaction(txn).await?;
        let store = self.store.read().await;
        let Some(col) = store.get(collection) else {
            return Ok(Vec::new());
        };

        // Precompute each row's sort key so ordering and cursor positioning
        // use the same values.
        let mut rows: Vec<(Vec<bson::Bson>, Snapshot)> = col
            .iter()
            .filter(|(_, fields)| {
                query
                    .filters
                    .iter()
                    .all(|filter| matches_filter(fields, filter))
            })
            .map(|(id, fields)| {
                (
                    order_key(fields, &query.orders),
                    Snapshot {
                        id: id.clone(),
                        fields: fields.clone(),
                    },
                )
            })
            .collect();

        rows.sort_by(|(left_key, left), (right_key, right)| {
            compare_keys(left_key, &left.id, right_key, &right.id, &query.orders)
        });

        let mut snapshots: Vec<Snapshot> = rows
            .into_iter()
            .filter(|(key, snapshot)| match &query.start_after {
                Some(cursor) => is_after_cursor(key, &snapshot.id, cursor, &query.orders),
                None => true,
            })
            .map(|(_, snapshot)| snapshot)
            .collect();

        if let Some(limit) = query.limit {
            snapshots.truncate(limit);
        }
        Ok(snapshots)
    }

    async fn commit_batch(&self, writes: Vec<BatchWrite>) -> DbResult<()> {
        let mut store = self.store.write().await;
        apply_batch(&mut store, writes)
    }
}
