//! The mapping orchestrator: binds a record type to a collection and executes
//! CRUD and query operations through a [`Session`].
//!
//! [`Db`] is the entry point; [`Db::model`] binds a [`Model`] type and yields
//! a [`Mapper`]. Both are immutable snapshots: every `with_*` binding method
//! returns a new value, so concurrent callers sharing a base instance never
//! interfere with each other's derived configuration.
//!
//! # Example
//!
//! ```ignore
//! use docbind::prelude::*;
//!
//! let db = Db::new(Session::new(source));
//! let items = db.model::<Item>();
//!
//! let mut item = Item { name: "Widget".into(), price: 10, ..Default::default() };
//! items.save(&mut item, &[]).await?;            // id generated and injected
//!
//! let mut found = Item::default();
//! items.find_one(&[QuerySpec::builder().filter(Filter::gt("price", 5)).build()], &mut found).await?;
//! ```

use std::marker::PhantomData;

use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::model::Model;
use crate::query::{Cursor, QuerySpec, StructuredQuery};
use crate::session::Session;
use crate::source::{BatchWrite, DataSource, FieldUpdate, Snapshot};

/// Default page size for paginated bulk updates.
pub const DEFAULT_UPDATE_BATCH_SIZE: usize = 100;

/// Entry point holding a session and bulk-update configuration, before a
/// model type is bound.
#[derive(Debug)]
pub struct Db<S: DataSource> {
    session: Session<S>,
    update_batch_size: usize,
}

impl<S: DataSource> Clone for Db<S> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            update_batch_size: self.update_batch_size,
        }
    }
}

impl<S: DataSource> Db<S> {
    /// Creates a new instance over `session` with the default bulk-update
    /// batch size.
    pub fn new(session: Session<S>) -> Self {
        Self {
            session,
            update_batch_size: DEFAULT_UPDATE_BATCH_SIZE,
        }
    }

    /// The underlying session.
    pub fn session(&self) -> &Session<S> {
        &self.session
    }

    /// Returns a new instance using `session`.
    pub fn with_session(&self, session: Session<S>) -> Self {
        Self {
            session,
            update_batch_size: self.update_batch_size,
        }
    }

    /// Returns a new instance whose session is bound to `txn`; the receiver
    /// is unaffected.
    pub fn with_transaction(&self, txn: crate::source::TransactionToken) -> Self {
        Self {
            session: self.session.with_transaction(txn),
            update_batch_size: self.update_batch_size,
        }
    }

    /// Returns a new instance using `size` as the bulk-update page size.
    pub fn with_update_batch_size(&self, size: usize) -> Self {
        Self {
            session: self.session.clone(),
            update_batch_size: size,
        }
    }

    /// The configured bulk-update page size.
    pub fn update_batch_size(&self) -> usize {
        self.update_batch_size
    }

    /// Binds the record type `M`, yielding a mapper for its collection. The
    /// receiver is unaffected; each call produces an independent mapper.
    pub fn model<M: Model>(&self) -> Mapper<S, M> {
        Mapper {
            session: self.session.clone(),
            update_batch_size: self.update_batch_size,
            _model: PhantomData,
        }
    }
}

/// A mapper bound to a record type `M`, executing operations against the
/// collection resolved from `M`.
#[derive(Debug)]
pub struct Mapper<S: DataSource, M: Model> {
    session: Session<S>,
    update_batch_size: usize,
    _model: PhantomData<M>,
}

impl<S: DataSource, M: Model> Clone for Mapper<S, M> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            update_batch_size: self.update_batch_size,
            _model: PhantomData,
        }
    }
}

impl<S: DataSource, M: Model> Mapper<S, M> {
    /// The underlying session.
    pub fn session(&self) -> &Session<S> {
        &self.session
    }

    /// Returns a new mapper using `session`.
    pub fn with_session(&self, session: Session<S>) -> Self {
        Self {
            session,
            update_batch_size: self.update_batch_size,
            _model: PhantomData,
        }
    }

    /// Returns a new mapper whose session is bound to `txn`; the receiver is
    /// unaffected.
    pub fn with_transaction(&self, txn: crate::source::TransactionToken) -> Self {
        Self {
            session: self.session.with_transaction(txn),
            update_batch_size: self.update_batch_size,
            _model: PhantomData,
        }
    }

    /// Returns a new mapper using `size` as the bulk-update page size.
    pub fn with_update_batch_size(&self, size: usize) -> Self {
        Self {
            session: self.session.clone(),
            update_batch_size: size,
            _model: PhantomData,
        }
    }

    /// The configured bulk-update page size.
    pub fn update_batch_size(&self) -> usize {
        self.update_batch_size
    }

    /// Fetches the document whose id is `record.id()` and decodes it into
    /// `record`, routed through the active transaction when one is bound.
    ///
    /// # Errors
    ///
    /// [`DbError::EmptyId`] when the record's identifier is empty;
    /// [`DbError::DocumentNotFound`] when the document is absent.
    pub async fn get_by_id(&self, record: &mut M) -> DbResult<()> {
        self.session.validate()?;
        let collection = M::collection_name();
        let id = record.id().to_string();
        if id.is_empty() {
            return Err(DbError::EmptyId("get_by_id"));
        }

        let source = self.session.source()?;
        let fields = source
            .get_document(self.session.transaction(), &collection, &id)
            .await?
            .ok_or_else(|| DbError::DocumentNotFound(id.clone(), collection.clone()))?;

        decode_into(record, &fields)?;
        record.set_id(id);
        Ok(())
    }

    /// Executes `specs` with an effective limit of exactly 1 — regardless of
    /// any caller-specified limit — and decodes the single result into
    /// `dest`, injecting its identifier.
    ///
    /// # Errors
    ///
    /// [`DbError::NoMatch`] when nothing matched.
    pub async fn find_one(&self, specs: &[QuerySpec], dest: &mut M) -> DbResult<()> {
        self.session.validate()?;
        let collection = M::collection_name();

        let mut query = StructuredQuery::new().apply(specs).await?;
        query.limit = Some(1);

        let source = self.session.source()?;
        let snapshots = source
            .run_query(self.session.transaction(), &collection, query)
            .await?;

        let snapshot = snapshots
            .into_iter()
            .next()
            .ok_or_else(|| DbError::NoMatch(collection.clone()))?;

        decode_into(dest, &snapshot.fields)?;
        dest.set_id(snapshot.id);
        Ok(())
    }

    /// Executes `specs` and returns every match, decoded in the store's
    /// result order (no client-side resort). Empty `specs` queries the whole
    /// collection unfiltered.
    pub async fn find_all(&self, specs: &[QuerySpec]) -> DbResult<Vec<M>> {
        self.session.validate()?;
        let collection = M::collection_name();

        let query = StructuredQuery::new().apply(specs).await?;
        let source = self.session.source()?;
        let snapshots = source
            .run_query(self.session.transaction(), &collection, query)
            .await?;

        let mut records = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            records.push(decode_snapshot::<M>(&snapshot)?);
        }
        Ok(records)
    }

    /// Inserts or updates a document.
    ///
    /// With empty `fields_to_save`: if the record's identifier is empty, a
    /// new server-generated id is injected into `record` and the full field
    /// mapping is written as a new document; otherwise the full mapping
    /// overwrites the document at that id (upsert, no pre-read).
    ///
    /// With non-empty `fields_to_save`: requires a non-empty identifier;
    /// each named field is looked up in the record's full field mapping and
    /// written as a field-path update restricted to exactly those fields.
    ///
    /// # Errors
    ///
    /// [`DbError::PartialSaveWithoutId`] for a partial save with no
    /// identifier; [`DbError::FieldMissing`] when a named field is absent
    /// from the mapping (no external write is issued).
    pub async fn save(&self, record: &mut M, fields_to_save: &[&str]) -> DbResult<()> {
        self.session.validate()?;
        let collection = M::collection_name();
        let mut id = record.id().to_string();
        let data = record.field_map()?;
        let source = self.session.source()?;

        if id.is_empty() && fields_to_save.is_empty() {
            id = source.new_document_id(&collection).await?;
            record.set_id(id.clone());
        }

        if !fields_to_save.is_empty() && id.is_empty() {
            return Err(DbError::PartialSaveWithoutId);
        }

        if fields_to_save.is_empty() {
            return source
                .set_document(self.session.transaction(), &collection, &id, data)
                .await;
        }

        let mut updates = Vec::with_capacity(fields_to_save.len());
        for field in fields_to_save {
            let value = data
                .get(*field)
                .cloned()
                .ok_or_else(|| DbError::FieldMissing {
                    model: std::any::type_name::<M>(),
                    field: (*field).to_string(),
                })?;
            updates.push(FieldUpdate {
                path: (*field).to_string(),
                value,
            });
        }

        source
            .update_document(self.session.transaction(), &collection, &id, updates)
            .await
    }

    /// Applies `updates` either to the single document identified by
    /// `record.id()` (when non-empty — this mode takes precedence), or to
    /// every document matched by `where_specs` via the paginated bulk-update
    /// algorithm.
    ///
    /// Bulk update pages through the result set in batches of
    /// [`Mapper::update_batch_size`] documents, committing each page as one
    /// atomic batch and advancing a cursor past the last document of the
    /// page. A page-commit failure aborts the loop; pages already committed
    /// are not rolled back — the operation is atomic within a page, not
    /// across pages. Bulk update is refused outright while a transaction is
    /// active, before any write is issued.
    ///
    /// Correctness of pagination relies on the store returning a stable
    /// result ordering across the repeated queries issued mid-mutation. If an
    /// updated field is also an order key, documents may be skipped or
    /// visited twice across pages; keep order keys disjoint from updated
    /// fields.
    ///
    /// # Errors
    ///
    /// [`DbError::IdOrQueryRequired`] when the identifier is empty and no
    /// non-empty where-spec is given; [`DbError::TransactionalBatchUpdate`]
    /// when bulk update is requested inside a transaction.
    pub async fn update(
        &self,
        record: &M,
        updates: &[FieldUpdate],
        where_specs: &[QuerySpec],
    ) -> DbResult<()> {
        self.session.validate()?;
        let collection = M::collection_name();
        let id = record.id();
        let source = self.session.source()?;

        if !id.is_empty() {
            return source
                .update_document(self.session.transaction(), &collection, id, updates.to_vec())
                .await;
        }

        if where_specs.iter().all(QuerySpec::is_empty) {
            return Err(DbError::IdOrQueryRequired);
        }

        if self.session.has_transaction() {
            return Err(DbError::TransactionalBatchUpdate);
        }

        let base = StructuredQuery::new().apply(where_specs).await?;
        self.update_by_query(&collection, base, updates).await
    }

    /// The paginated bulk-update loop. `base` carries the resolved filter and
    /// order clauses; each iteration re-issues it positioned strictly after
    /// the cursor, limited to one page.
    async fn update_by_query(
        &self,
        collection: &str,
        base: StructuredQuery,
        updates: &[FieldUpdate],
    ) -> DbResult<()> {
        let source = self.session.source()?;
        let mut cursor: Option<Cursor> = None;
        let mut pages = 0_usize;

        loop {
            let mut page_query = base.clone();
            page_query.start_after = cursor.clone();
            page_query.limit = Some(self.update_batch_size);

            let snapshots = source.run_query(None, collection, page_query).await?;
            if snapshots.is_empty() {
                break;
            }

            let last = Cursor::after(
                &snapshots[snapshots.len() - 1],
                &base.orders,
            );

            let writes = snapshots
                .into_iter()
                .map(|snapshot| BatchWrite::Update {
                    collection: collection.to_string(),
                    id: snapshot.id,
                    updates: updates.to_vec(),
                })
                .collect::<Vec<_>>();

            let page_size = writes.len();
            source.commit_batch(writes).await?;
            pages += 1;
            debug!(collection, page = pages, documents = page_size, "bulk update page committed");

            cursor = Some(last);
        }

        debug!(collection, pages, "bulk update complete");
        Ok(())
    }

    /// Deletes the document identified by `record.id()`, routed through the
    /// active transaction when one is bound. Deleting a document that does
    /// not exist is not an error.
    ///
    /// # Errors
    ///
    /// [`DbError::EmptyId`] when the record's identifier is empty.
    pub async fn delete(&self, record: &M) -> DbResult<()> {
        self.session.validate()?;
        let collection = M::collection_name();
        let id = record.id();
        if id.is_empty() {
            return Err(DbError::EmptyId("delete"));
        }

        self.session
            .source()?
            .delete_document(self.session.transaction(), &collection, id)
            .await
    }
}

/// Decodes `fields` into `record`, wrapping failures with the model name.
fn decode_into<M: Model>(record: &mut M, fields: &bson::Document) -> DbResult<()> {
    record
        .apply_field_map(fields)
        .map_err(|err| DbError::Decode {
            model: std::any::type_name::<M>(),
            message: err.to_string(),
        })
}

/// Decodes a snapshot into a freshly allocated record with its identifier
/// injected.
fn decode_snapshot<M: Model>(snapshot: &Snapshot) -> DbResult<M> {
    let mut record = M::default();
    decode_into(&mut record, &snapshot.fields)?;
    record.set_id(snapshot.id.clone());
    Ok(record)
}
