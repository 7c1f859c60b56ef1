//! Filter, ordering, and cursor evaluation for the in-memory data source.
//!
//! Everything here operates on plain BSON documents; the store delegates to
//! these helpers when executing a structured query against its collections.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, Document, datetime::DateTime};

use docbind_core::query::{Cursor, FilterOp, Order, OrderDirection, ResolvedFilter};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64 so filters written with an `Int32`
/// literal still match an `Int64` stored value.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => {
                Comparable::Array(arr.iter().map(Comparable::from).collect::<Vec<_>>())
            }
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>(),
            ),
            _ => Comparable::Null, // Other types are not comparable
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// True when `fields` satisfies `filter`. A missing field never matches, and
/// neither does a comparison across incompatible types.
pub(crate) fn matches_filter(fields: &Document, filter: &ResolvedFilter) -> bool {
    let Some(field_value) = fields.get(&filter.field) else {
        return false;
    };
    let left = Comparable::from(field_value);
    let right = Comparable::from(&filter.value);

    match filter.op {
        FilterOp::Eq => left == right,
        FilterOp::Ne => left != right,
        FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
            match left.partial_cmp(&right) {
                Some(ordering) => match filter.op {
                    FilterOp::Gt => ordering == Ordering::Greater,
                    FilterOp::Gte => ordering != Ordering::Less,
                    FilterOp::Lt => ordering == Ordering::Less,
                    FilterOp::Lte => ordering != Ordering::Greater,
                    _ => unreachable!(),
                },
                None => false,
            }
        }
        FilterOp::ArrayContains => match left {
            Comparable::Array(items) => items.iter().any(|item| item == &right),
            _ => false,
        },
        FilterOp::In => match right {
            Comparable::Array(values) => values.iter().any(|value| value == &left),
            _ => false,
        },
    }
}

/// Compares two order-key values, treating incomparable pairs as equal so the
/// id tiebreak decides.
fn compare_values(left: &Bson, right: &Bson) -> Ordering {
    Comparable::from(left)
        .partial_cmp(&Comparable::from(right))
        .unwrap_or(Ordering::Equal)
}

/// Compares two (order-values, id) sort keys under `orders`, with id
/// ascending as the final tiebreak. This single comparator drives both result
/// sorting and cursor positioning, so the two can never disagree.
pub(crate) fn compare_keys(
    left_values: &[Bson],
    left_id: &str,
    right_values: &[Bson],
    right_id: &str,
    orders: &[Order],
) -> Ordering {
    for (index, order) in orders.iter().enumerate() {
        let left = left_values.get(index).unwrap_or(&Bson::Null);
        let right = right_values.get(index).unwrap_or(&Bson::Null);
        let ordering = match order.direction {
            OrderDirection::Asc => compare_values(left, right),
            OrderDirection::Desc => compare_values(right, left),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    left_id.cmp(right_id)
}

/// Extracts the order-key values of a document, in clause order. A missing
/// order field yields `Bson::Null`, matching how cursors capture it.
pub(crate) fn order_key(fields: &Document, orders: &[Order]) -> Vec<Bson> {
    orders
        .iter()
        .map(|order| fields.get(&order.field).cloned().unwrap_or(Bson::Null))
        .collect()
}

/// True when the (order-values, id) key of a document sits strictly after the
/// cursor position. Documents at or before the cursor are excluded, which
/// keeps pagination correct even when the cursor document itself no longer
/// matches the filter.
pub(crate) fn is_after_cursor(
    key: &[Bson],
    id: &str,
    cursor: &Cursor,
    orders: &[Order],
) -> bool {
    compare_keys(key, id, &cursor.order_values, &cursor.doc_id, orders) == Ordering::Greater
}
