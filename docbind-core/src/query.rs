//! Query specifications and the predicate builder.
//!
//! A [`QuerySpec`] is the caller-facing, declarative form of a query: filter
//! clauses (with literal or deferred comparison values), order clauses, and an
//! optional limit. [`StructuredQuery::apply`] is the predicate builder: it
//! folds a slice of specs, in order, into a resolved [`StructuredQuery`] that
//! a data source can execute directly.
//!
//! # Example
//!
//! ```ignore
//! use docbind::prelude::*;
//!
//! let spec = QuerySpec::builder()
//!     .filter(Filter::gt("price", 5))
//!     .order_by("price", OrderDirection::Asc)
//!     .limit(10)
//!     .build();
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bson::Bson;

use crate::error::{DbError, DbResult};
use crate::source::Snapshot;

/// Sentinel limit meaning "no limit". Non-sentinel, non-positive limits are
/// ignored during application.
pub const UNLIMITED: i64 = -1;

/// Field comparison operators for filter clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// Equal to.
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Array field contains the value.
    ArrayContains,
    /// Field value is one of the values in the given array.
    In,
}

/// Sort direction for order clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

/// A single order-by clause.
#[derive(Debug, Clone)]
pub struct Order {
    /// The field name to order by.
    pub field: String,
    /// The sort direction.
    pub direction: OrderDirection,
}

/// Resolves a filter's comparison value at query-apply time rather than at
/// query-construction time.
///
/// Useful for values that depend on external state, e.g. "last processed
/// cursor". Resolved exactly once per query application, never cached across
/// applications.
#[async_trait]
pub trait ValueProvider: Send + Sync {
    /// Produces the comparison value for this application of the query.
    async fn value(&self) -> DbResult<Bson>;
}

/// A filter clause's comparison value: known up front, or deferred.
#[derive(Clone)]
pub enum FilterValue {
    /// A literal value captured at construction time.
    Literal(Bson),
    /// A provider resolved when the query is applied.
    Deferred(Arc<dyn ValueProvider>),
}

impl fmt::Debug for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            FilterValue::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// A single where clause: field, operator, and comparison value.
#[derive(Debug, Clone)]
pub struct FilterClause {
    /// The field name to compare.
    pub field: String,
    /// The comparison operator.
    pub op: FilterOp,
    /// The value to compare against.
    pub value: FilterValue,
}

/// Constructor namespace for filter clauses.
///
/// # Example
///
/// ```ignore
/// let clause = Filter::gt("price", 5);
/// ```
pub struct Filter;

impl Filter {
    fn clause(field: impl Into<String>, op: FilterOp, value: impl Into<Bson>) -> FilterClause {
        FilterClause {
            field: field.into(),
            op,
            value: FilterValue::Literal(value.into()),
        }
    }

    /// Equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> FilterClause {
        Self::clause(field, FilterOp::Eq, value)
    }

    /// Not-equal filter.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> FilterClause {
        Self::clause(field, FilterOp::Ne, value)
    }

    /// Greater-than filter.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> FilterClause {
        Self::clause(field, FilterOp::Gt, value)
    }

    /// Greater-than-or-equal filter.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> FilterClause {
        Self::clause(field, FilterOp::Gte, value)
    }

    /// Less-than filter.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> FilterClause {
        Self::clause(field, FilterOp::Lt, value)
    }

    /// Less-than-or-equal filter.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> FilterClause {
        Self::clause(field, FilterOp::Lte, value)
    }

    /// Array-membership filter: the array field contains the value.
    pub fn array_contains(field: impl Into<String>, value: impl Into<Bson>) -> FilterClause {
        Self::clause(field, FilterOp::ArrayContains, value)
    }

    /// Set-membership filter: the field value is one of the given values.
    pub fn is_in(field: impl Into<String>, values: impl Into<Bson>) -> FilterClause {
        Self::clause(field, FilterOp::In, values)
    }

    /// A filter whose comparison value is resolved by `provider` each time
    /// the query is applied.
    pub fn deferred(
        field: impl Into<String>,
        op: FilterOp,
        provider: Arc<dyn ValueProvider>,
    ) -> FilterClause {
        FilterClause {
            field: field.into(),
            op,
            value: FilterValue::Deferred(provider),
        }
    }
}

/// A declarative query: zero or more filters, zero or more order clauses, and
/// an optional limit ([`UNLIMITED`] by default).
#[derive(Debug, Clone)]
pub struct QuerySpec {
    /// Where clauses, applied in listed order.
    pub filters: Vec<FilterClause>,
    /// Order clauses, applied in listed order.
    pub order_by: Vec<Order>,
    /// Result limit; [`UNLIMITED`] means none.
    pub limit: i64,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: UNLIMITED,
        }
    }
}

impl QuerySpec {
    /// Creates an empty specification.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for fluent construction.
    pub fn builder() -> QuerySpecBuilder {
        QuerySpecBuilder::new()
    }

    /// True when the spec constrains nothing at all.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty() && self.order_by.is_empty() && self.limit == UNLIMITED
    }
}

/// Builder for [`QuerySpec`].
#[derive(Debug, Clone, Default)]
pub struct QuerySpecBuilder {
    spec: QuerySpec,
}

impl QuerySpecBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a filter clause.
    pub fn filter(mut self, clause: FilterClause) -> Self {
        self.spec.filters.push(clause);
        self
    }

    /// Appends an order clause.
    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.spec.order_by.push(Order {
            field: field.into(),
            direction,
        });
        self
    }

    /// Sets the result limit.
    pub fn limit(mut self, limit: i64) -> Self {
        self.spec.limit = limit;
        self
    }

    /// Builds the final specification.
    pub fn build(self) -> QuerySpec {
        self.spec
    }
}

/// A filter clause with its comparison value fully resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFilter {
    /// The field name to compare.
    pub field: String,
    /// The comparison operator.
    pub op: FilterOp,
    /// The resolved comparison value.
    pub value: Bson,
}

/// Position marker for resuming paginated iteration strictly after a
/// previously seen document.
///
/// Captures the order-key values of the document along with its id, so a data
/// source can locate the resume position even when the document itself has
/// since been mutated out of the result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    /// The cursor document's values for each order clause, in clause order.
    pub order_values: Vec<Bson>,
    /// The cursor document's id (final tiebreak).
    pub doc_id: String,
}

impl Cursor {
    /// Builds a cursor positioned after `snapshot` for the given order
    /// clauses. A missing order field is captured as `Bson::Null`.
    pub fn after(snapshot: &Snapshot, orders: &[Order]) -> Self {
        Self {
            order_values: orders
                .iter()
                .map(|order| {
                    snapshot
                        .fields
                        .get(&order.field)
                        .cloned()
                        .unwrap_or(Bson::Null)
                })
                .collect(),
            doc_id: snapshot.id.clone(),
        }
    }
}

/// A resolved, wire-ready query handed to [`DataSource::run_query`].
///
/// [`DataSource::run_query`]: crate::source::DataSource::run_query
#[derive(Debug, Clone, Default)]
pub struct StructuredQuery {
    /// Resolved filter clauses, conjunctive.
    pub filters: Vec<ResolvedFilter>,
    /// Order clauses, applied in listed order.
    pub orders: Vec<Order>,
    /// Result limit, if any.
    pub limit: Option<usize>,
    /// Resume position, if paginating.
    pub start_after: Option<Cursor>,
}

impl StructuredQuery {
    /// Creates an unconstrained query.
    pub fn new() -> Self {
        Self::default()
    }

    /// The predicate builder: folds `specs` onto this query in order.
    ///
    /// Within each spec, filters are applied in listed order (deferred values
    /// are resolved here — a resolution failure aborts the whole application
    /// with an error naming the offending field), then order clauses in
    /// listed order, then the limit. A limit is only applied when positive
    /// and not the [`UNLIMITED`] sentinel; a later spec's limit replaces an
    /// earlier one.
    pub async fn apply(mut self, specs: &[QuerySpec]) -> DbResult<Self> {
        for spec in specs {
            for clause in &spec.filters {
                let value = match &clause.value {
                    FilterValue::Literal(value) => value.clone(),
                    FilterValue::Deferred(provider) => {
                        provider.value().await.map_err(|err| DbError::ValueProvider {
                            field: clause.field.clone(),
                            message: err.to_string(),
                        })?
                    }
                };
                self.filters.push(ResolvedFilter {
                    field: clause.field.clone(),
                    op: clause.op,
                    value,
                });
            }

            for order in &spec.order_by {
                self.orders.push(order.clone());
            }

            if spec.limit != UNLIMITED && spec.limit > 0 {
                self.limit = Some(spec.limit as usize);
            }
        }
        Ok(self)
    }
}
