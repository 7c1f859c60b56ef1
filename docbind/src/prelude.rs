//! Convenient re-exports of commonly used types from docbind.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docbind::prelude::*;
//! ```
//!
//! This provides access to:
//! - The `Model` trait and its derive macro
//! - The mapper entry points and session types
//! - Query construction and filtering
//! - The data source abstraction
//! - Error types

pub use docbind_core::{
    error::{DbError, DbResult},
    mapper::{DEFAULT_UPDATE_BATCH_SIZE, Db, Mapper},
    model::Model,
    query::{
        Cursor, Filter, FilterClause, FilterOp, FilterValue, Order, OrderDirection, QuerySpec,
        QuerySpecBuilder, ResolvedFilter, StructuredQuery, UNLIMITED, ValueProvider,
    },
    session::Session,
    source::{BatchWrite, DataSource, FieldUpdate, Snapshot, TransactionToken},
};

pub use docbind_macros::Model;
