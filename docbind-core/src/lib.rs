//! A typed object-document mapping layer for remote schemaless document stores.
//!
//! This crate is the core of the docbind project and provides:
//!
//! - **Record adapter** ([`model`]) - The [`Model`](model::Model) trait translating typed records to stored field mappings
//! - **Predicate builder** ([`query`]) - Composable filter, order, and limit clauses with deferred value resolution
//! - **Session** ([`session`]) - Connection and transaction holder passed into every operation
//! - **Mapper** ([`mapper`]) - High-level CRUD, query, and paginated bulk-update execution
//! - **Data source abstraction** ([`source`]) - The narrow async trait a store backend implements
//! - **Error handling** ([`error`]) - Error taxonomy and result type
//!
//! # Example
//!
//! ```ignore
//! use docbind_core::mapper::Db;
//! use docbind_core::model::Model;
//! use docbind_core::session::Session;
//!
//! let db = Db::new(Session::new(source));
//! let users = db.model::<User>();
//!
//! let mut user = User { name: "Ada".into(), ..Default::default() };
//! users.save(&mut user, &[]).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docbind_core;

pub mod error;
pub mod mapper;
pub mod model;
pub mod query;
pub mod session;
pub mod source;
