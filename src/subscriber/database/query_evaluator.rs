use std::cmp::Ordering;

use serde_json::Value;

use crate::subscriber::error::{invalid_argument, SubscriberResult};
use crate::subscriber::spec::FieldFilter;

use super::{Document, Query};

/// Pseudo field addressing the document identifier.
const DOCUMENT_ID_FIELD: &str = "__name__";

/// Comparison operators understood by [`MemoryDatabase`](super::MemoryDatabase).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOperator {
    LessThan,
    LessThanOrEqual,
    Equal,
    NotEqual,
    GreaterThanOrEqual,
    GreaterThan,
    ArrayContains,
    ArrayContainsAny,
    In,
    NotIn,
}

impl FilterOperator {
    pub fn parse(op: &str) -> SubscriberResult<Self> {
        match op {
            "<" => Ok(Self::LessThan),
            "<=" => Ok(Self::LessThanOrEqual),
            "==" => Ok(Self::Equal),
            "!=" => Ok(Self::NotEqual),
            ">=" => Ok(Self::GreaterThanOrEqual),
            ">" => Ok(Self::GreaterThan),
            "array-contains" => Ok(Self::ArrayContains),
            "array-contains-any" => Ok(Self::ArrayContainsAny),
            "in" => Ok(Self::In),
            "not-in" => Ok(Self::NotIn),
            other => Err(invalid_argument(format!(
                "Invalid query. Unsupported filter operator `{other}`"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::GreaterThanOrEqual => ">=",
            Self::GreaterThan => ">",
            Self::ArrayContains => "array-contains",
            Self::ArrayContainsAny => "array-contains-any",
            Self::In => "in",
            Self::NotIn => "not-in",
        }
    }
}

/// Rejects queries the in-memory evaluator cannot run.
pub(crate) fn validate_query(query: &Query) -> SubscriberResult<()> {
    for filter in query.filters() {
        let op = FilterOperator::parse(filter.op())?;
        let needs_array = matches!(
            op,
            FilterOperator::In | FilterOperator::NotIn | FilterOperator::ArrayContainsAny
        );
        if needs_array && filter.value().as_array().map_or(true, Vec::is_empty) {
            return Err(invalid_argument(format!(
                "Invalid query. A non-empty array is required for '{}' filters",
                op.as_str()
            )));
        }
    }
    Ok(())
}

/// Keeps the documents matching every filter of `query`. Input order is preserved.
pub(crate) fn apply_query_to_documents(documents: Vec<Document>, query: &Query) -> Vec<Document> {
    documents
        .into_iter()
        .filter(|document| document_satisfies_filters(document, query.filters()))
        .collect()
}

fn document_satisfies_filters(document: &Document, filters: &[FieldFilter]) -> bool {
    filters.iter().all(|filter| {
        let Ok(op) = FilterOperator::parse(filter.op()) else {
            return false;
        };
        match get_field_value(document, filter.field()) {
            Some(value) => evaluate_filter(op, &value, filter.value()),
            None => match op {
                FilterOperator::NotEqual => evaluate_filter(op, &Value::Null, filter.value()),
                _ => false,
            },
        }
    })
}

fn evaluate_filter(op: FilterOperator, value: &Value, operand: &Value) -> bool {
    match op {
        FilterOperator::Equal => values_equal(value, operand),
        FilterOperator::NotEqual => !values_equal(value, operand),
        FilterOperator::LessThan => compare_values(value, operand) == Some(Ordering::Less),
        FilterOperator::LessThanOrEqual => matches!(
            compare_values(value, operand),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOperator::GreaterThan => compare_values(value, operand) == Some(Ordering::Greater),
        FilterOperator::GreaterThanOrEqual => matches!(
            compare_values(value, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOperator::ArrayContains => match value {
            Value::Array(items) => items.iter().any(|item| values_equal(item, operand)),
            _ => false,
        },
        FilterOperator::ArrayContainsAny => match (value, operand) {
            (Value::Array(items), Value::Array(needles)) => needles
                .iter()
                .any(|needle| items.iter().any(|item| values_equal(item, needle))),
            _ => false,
        },
        FilterOperator::In => match operand {
            Value::Array(needles) => needles.iter().any(|needle| values_equal(needle, value)),
            _ => false,
        },
        FilterOperator::NotIn => match operand {
            Value::Array(needles) => {
                !value.is_null() && needles.iter().all(|needle| !values_equal(needle, value))
            }
            _ => false,
        },
    }
}

fn get_field_value(document: &Document, field: &str) -> Option<Value> {
    if field == DOCUMENT_ID_FIELD {
        return Some(Value::String(document.id().to_string()));
    }

    let mut segments = field.split('.');
    let first = segments.next()?;
    let mut current = document.data().get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current.clone())
}

/// Numbers compare by value so `1` matches `1.0`.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
