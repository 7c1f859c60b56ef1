//! End-to-end mapper behavior against the in-memory data source: CRUD,
//! queries, transactions, and paginated bulk updates.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use docbind::bson::Document;
use docbind::memory::MemorySource;
use docbind::prelude::*;

#[derive(Debug, Clone, Default, Model)]
struct Item {
    #[model(id)]
    id: String,
    #[model(rename = "name")]
    name: String,
    #[model(rename = "price")]
    price: i64,
}

fn item(id: &str, name: &str, price: i64) -> Item {
    Item {
        id: id.into(),
        name: name.into(),
        price,
    }
}

async fn seeded_db() -> (MemorySource, Db<MemorySource>) {
    let source = MemorySource::new();
    let db = Db::new(Session::new(source.clone()));
    let items = db.model::<Item>();

    for mut record in [
        item("a", "anvil", 10),
        item("b", "barrel", 20),
        item("c", "crate", 30),
        item("d", "dust", 3),
    ] {
        items.save(&mut record, &[]).await.unwrap();
    }
    (source, db)
}

fn price_above(threshold: i64) -> QuerySpec {
    QuerySpec::builder()
        .filter(Filter::gt("price", threshold))
        .build()
}

#[tokio::test]
async fn save_generates_an_id_and_get_by_id_round_trips() {
    let db = Db::new(Session::new(MemorySource::new()));
    let items = db.model::<Item>();

    let mut record = item("", "anvil", 10);
    items.save(&mut record, &[]).await.unwrap();
    assert!(!record.id.is_empty());

    let mut fetched = Item {
        id: record.id.clone(),
        ..Default::default()
    };
    items.get_by_id(&mut fetched).await.unwrap();
    assert_eq!(fetched.name, "anvil");
    assert_eq!(fetched.price, 10);
}

#[tokio::test]
async fn save_with_preset_id_overwrites_the_whole_document() {
    let (_, db) = seeded_db().await;
    let items = db.model::<Item>();

    let mut record = item("a", "anvil mk2", 12);
    items.save(&mut record, &[]).await.unwrap();

    let mut fetched = item("a", "", 0);
    items.get_by_id(&mut fetched).await.unwrap();
    assert_eq!(fetched.name, "anvil mk2");
    assert_eq!(fetched.price, 12);
}

#[tokio::test]
async fn get_by_id_requires_an_id_and_reports_missing_documents() {
    let (_, db) = seeded_db().await;
    let items = db.model::<Item>();

    let mut blank = Item::default();
    let err = items.get_by_id(&mut blank).await.unwrap_err();
    assert!(matches!(err, DbError::EmptyId(_)));

    let mut missing = item("zzz", "", 0);
    let err = items.get_by_id(&mut missing).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn partial_save_updates_only_the_named_fields() {
    let (_, db) = seeded_db().await;
    let items = db.model::<Item>();

    let mut record = item("a", "renamed", 999);
    items.save(&mut record, &["price"]).await.unwrap();

    let mut fetched = item("a", "", 0);
    items.get_by_id(&mut fetched).await.unwrap();
    assert_eq!(fetched.price, 999);
    assert_eq!(fetched.name, "anvil");
}

#[tokio::test]
async fn partial_save_preconditions() {
    let (_, db) = seeded_db().await;
    let items = db.model::<Item>();

    let mut no_id = item("", "anvil", 10);
    let err = items.save(&mut no_id, &["price"]).await.unwrap_err();
    assert!(matches!(err, DbError::PartialSaveWithoutId));
    assert!(no_id.id.is_empty());

    // An unknown field name fails before any write reaches the store.
    let mut record = item("a", "anvil", 999);
    let err = items.save(&mut record, &["missing"]).await.unwrap_err();
    assert!(matches!(err, DbError::FieldMissing { .. }));

    let mut fetched = item("a", "", 0);
    items.get_by_id(&mut fetched).await.unwrap();
    assert_eq!(fetched.price, 10);
}

#[tokio::test]
async fn find_one_returns_a_single_match_and_errors_when_none() {
    let (_, db) = seeded_db().await;
    let items = db.model::<Item>();

    // Several documents match; the forced limit keeps it to one.
    let spec = QuerySpec::builder()
        .filter(Filter::gt("price", 5))
        .order_by("price", OrderDirection::Desc)
        .limit(50)
        .build();
    let mut found = Item::default();
    items.find_one(&[spec], &mut found).await.unwrap();
    assert_eq!(found.id, "c");
    assert_eq!(found.price, 30);

    let mut none = Item::default();
    let err = items
        .find_one(&[price_above(1000)], &mut none)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn find_all_respects_filters_orders_and_limits() {
    let (_, db) = seeded_db().await;
    let items = db.model::<Item>();

    let all = items.find_all(&[]).await.unwrap();
    assert_eq!(all.len(), 4);

    let spec = QuerySpec::builder()
        .filter(Filter::gt("price", 5))
        .order_by("price", OrderDirection::Desc)
        .limit(2)
        .build();
    let top = items.find_all(&[spec]).await.unwrap();
    let ids: Vec<&str> = top.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, ["c", "b"]);
}

#[tokio::test]
async fn update_by_id_takes_precedence_over_conditions() {
    let (_, db) = seeded_db().await;
    let items = db.model::<Item>();

    // The where clause matches everything, but the record carries an id.
    items
        .update(
            &item("a", "", 0),
            &[FieldUpdate::new("price", 99_i64)],
            &[price_above(0)],
        )
        .await
        .unwrap();

    let all = items.find_all(&[]).await.unwrap();
    for record in all {
        if record.id == "a" {
            assert_eq!(record.price, 99);
        } else {
            assert_ne!(record.price, 99);
        }
    }
}

#[tokio::test]
async fn update_without_id_or_conditions_is_rejected() {
    let (_, db) = seeded_db().await;
    let items = db.model::<Item>();

    let err = items
        .update(
            &Item::default(),
            &[FieldUpdate::new("price", 0_i64)],
            &[QuerySpec::new()],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::IdOrQueryRequired));
}

/// Delegating source that counts page queries and batch commits.
#[derive(Debug, Default)]
struct CountingSource {
    inner: MemorySource,
    queries: AtomicUsize,
    commits: AtomicUsize,
}

#[async_trait]
impl DataSource for CountingSource {
    async fn get_document(
        &self,
        txn: Option<&TransactionToken>,
        collection: &str,
        id: &str,
    ) -> DbResult<Option<Document>> {
        self.inner.get_document(txn, collection, id).await
    }

    async fn set_document(
        &self,
        txn: Option<&TransactionToken>,
        collection: &str,
        id: &str,
        fields: Document,
    ) -> DbResult<()> {
        self.inner.set_document(txn, collection, id, fields).await
    }

    async fn update_document(
        &self,
        txn: Option<&TransactionToken>,
        collection: &str,
        id: &str,
        updates: Vec<FieldUpdate>,
    ) -> DbResult<()> {
        self.inner
            .update_document(txn, collection, id, updates)
            .await
    }

    async fn delete_document(
        &self,
        txn: Option<&TransactionToken>,
        collection: &str,
        id: &str,
    ) -> DbResult<()> {
        self.inner.delete_document(txn, collection, id).await
    }

    async fn new_document_id(&self, collection: &str) -> DbResult<String> {
        self.inner.new_document_id(collection).await
    }

    async fn run_query(
        &self,
        txn: Option<&TransactionToken>,
        collection: &str,
        query: StructuredQuery,
    ) -> DbResult<Vec<Snapshot>> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.inner.run_query(txn, collection, query).await
    }

    async fn commit_batch(&self, writes: Vec<BatchWrite>) -> DbResult<()> {
        self.commits.fetch_add(1, Ordering::Relaxed);
        self.inner.commit_batch(writes).await
    }
}

#[tokio::test]
async fn bulk_update_commits_one_batch_per_page() {
    let source = Arc::new(CountingSource::default());
    let db = Db::new(Session::from_shared(source.clone())).with_update_batch_size(1);
    let items = db.model::<Item>();

    for mut record in [
        item("a", "anvil", 10),
        item("b", "barrel", 20),
        item("c", "crate", 30),
        item("d", "dust", 3),
    ] {
        items.save(&mut record, &[]).await.unwrap();
    }
    source.queries.store(0, Ordering::Relaxed);
    source.commits.store(0, Ordering::Relaxed);

    // Each update mutates its document out of the filtered set; the cursor
    // still visits every match exactly once.
    items
        .update(
            &Item::default(),
            &[FieldUpdate::new("price", 0_i64)],
            &[price_above(5)],
        )
        .await
        .unwrap();

    assert_eq!(source.commits.load(Ordering::Relaxed), 3);
    assert_eq!(source.queries.load(Ordering::Relaxed), 4);

    let all = items.find_all(&[]).await.unwrap();
    for record in all {
        match record.id.as_str() {
            "d" => assert_eq!(record.price, 3),
            _ => assert_eq!(record.price, 0),
        }
    }
}

#[tokio::test]
async fn bulk_update_with_no_matches_commits_nothing() {
    let source = Arc::new(CountingSource::default());
    let db = Db::new(Session::from_shared(source.clone()));
    let items = db.model::<Item>();

    items
        .update(
            &Item::default(),
            &[FieldUpdate::new("price", 0_i64)],
            &[price_above(1000)],
        )
        .await
        .unwrap();

    assert_eq!(source.commits.load(Ordering::Relaxed), 0);
    assert_eq!(source.queries.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn update_by_id_of_a_missing_document_errors() {
    let (_, db) = seeded_db().await;
    let items = db.model::<Item>();

    let err = items
        .update(
            &item("zzz", "", 0),
            &[FieldUpdate::new("price", 1_i64)],
            &[],
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn bulk_update_inside_a_transaction_is_refused_before_writing() {
    let (source, db) = seeded_db().await;
    let txn = source.begin_transaction().await;
    let items = db.model::<Item>().with_transaction(txn);

    let err = items
        .update(
            &Item::default(),
            &[FieldUpdate::new("price", 0_i64)],
            &[price_above(5)],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::TransactionalBatchUpdate));

    let untouched = db.model::<Item>().find_all(&[price_above(5)]).await.unwrap();
    assert_eq!(untouched.len(), 3);
}

#[tokio::test]
async fn transactional_save_is_invisible_until_commit() {
    let source = MemorySource::new();
    let db = Db::new(Session::new(source.clone()));
    let items = db.model::<Item>();

    let txn = source.begin_transaction().await;
    let mut record = item("a", "anvil", 10);
    items
        .with_transaction(txn.clone())
        .save(&mut record, &[])
        .await
        .unwrap();

    let mut probe = item("a", "", 0);
    assert!(items.get_by_id(&mut probe).await.unwrap_err().is_not_found());

    source.commit_transaction(&txn).await.unwrap();
    items.get_by_id(&mut probe).await.unwrap();
    assert_eq!(probe.name, "anvil");
}

#[tokio::test]
async fn delete_removes_the_document_and_requires_an_id() {
    let (_, db) = seeded_db().await;
    let items = db.model::<Item>();

    items.delete(&item("a", "", 0)).await.unwrap();
    let mut probe = item("a", "", 0);
    assert!(items.get_by_id(&mut probe).await.unwrap_err().is_not_found());

    // Deleting again is fine; an empty id is not.
    items.delete(&item("a", "", 0)).await.unwrap();
    let err = items.delete(&Item::default()).await.unwrap_err();
    assert!(matches!(err, DbError::EmptyId(_)));
}

#[tokio::test]
async fn detached_session_refuses_every_operation() {
    let db = Db::new(Session::<MemorySource>::detached());
    let items = db.model::<Item>();

    let mut record = item("a", "anvil", 10);
    assert!(matches!(
        items.save(&mut record, &[]).await.unwrap_err(),
        DbError::NoSource,
    ));
    assert!(matches!(
        items.find_all(&[]).await.unwrap_err(),
        DbError::NoSource,
    ));
}
