//! In-memory data source for docbind.
//!
//! This crate provides a thread-safe, in-memory implementation of the
//! `DataSource` trait, ideal for development, testing, and small-scale
//! deployments.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes through an
//!   async-aware RwLock, shareable across tasks via cloning
//! - **Full query support** - Filters, order clauses, limits, and cursor
//!   pagination
//! - **Transactions** - Staged writes applied atomically on commit
//!
//! # Quick Start
//!
//! ```ignore
//! use docbind::memory::MemorySource;
//! use docbind::prelude::*;
//!
//! #[derive(Debug, Clone, Default, Model)]
//! pub struct User {
//!     #[model(id)]
//!     pub id: String,
//!     #[model(rename = "name")]
//!     pub name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Db::new(Session::new(MemorySource::new()));
//!     let users = db.model::<User>();
//!
//!     let mut user = User { name: "Alice".into(), ..Default::default() };
//!     users.save(&mut user, &[]).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docbind_memory;

pub mod evaluator;
pub mod store;

pub use store::MemorySource;
