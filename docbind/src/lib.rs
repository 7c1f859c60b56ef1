//! Main docbind crate providing a typed mapping layer over schemaless
//! document stores.
//!
//! This crate is the primary entry point for users of the docbind framework.
//! It re-exports the core types from the sub-crates, the `#[derive(Model)]`
//! macro, and the bundled in-memory data source.
//!
//! # Features
//!
//! - **Typed records** - Map plain structs onto stored documents with
//!   `#[model(...)]` field tags; untagged fields never leave the process
//! - **Composable queries** - Filter, order, and limit clauses folded into a
//!   single structured query, with deferred comparison values
//! - **Sessions and transactions** - Route every operation through an
//!   optional store-owned transaction handle
//! - **Paginated bulk updates** - Cursor-driven, batch-committed updates over
//!   arbitrarily large result sets
//!
//! # Quick Start
//!
//! ```ignore
//! use docbind::{prelude::*, memory::MemorySource};
//!
//! #[derive(Debug, Clone, Default, Model)]
//! pub struct User {
//!     #[model(id)]
//!     pub id: String,
//!     #[model(rename = "name")]
//!     pub name: String,
//!     #[model(rename = "age")]
//!     pub age: i64,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Db::new(Session::new(MemorySource::new()));
//!     let users = db.model::<User>();
//!
//!     // Insert with a generated id.
//!     let mut user = User { name: "Alice".into(), age: 30, ..Default::default() };
//!     users.save(&mut user, &[]).await?;
//!
//!     // Query it back.
//!     let mut found = User::default();
//!     users
//!         .find_one(
//!             &[QuerySpec::builder().filter(Filter::eq("name", "Alice")).build()],
//!             &mut found,
//!         )
//!         .await?;
//!     assert_eq!(found.id, user.id);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Transactions
//!
//! Transaction handles are minted by the data source; the mapping layer only
//! routes operations through them:
//!
//! ```ignore
//! let source = MemorySource::new();
//! let db = Db::new(Session::new(source.clone()));
//! let users = db.model::<User>();
//!
//! let txn = source.begin_transaction().await;
//! let in_txn = users.with_transaction(txn.clone());
//!
//! let mut user = User { name: "Bob".into(), ..Default::default() };
//! in_txn.save(&mut user, &[]).await?;      // staged, not yet visible
//! source.commit_transaction(&txn).await?;  // now visible
//! ```

pub mod prelude;

pub use docbind_core::{error, mapper, model, query, session, source};

pub use docbind_core::error::{DbError, DbResult};
pub use docbind_core::model::Model;

/// Derives [`Model`] from `#[model(...)]` field tags.
pub use docbind_macros::Model;

// Re-export BSON types for convenience
pub use bson;

/// In-memory data source implementation.
pub mod memory {
    pub use docbind_memory::MemorySource;
}
