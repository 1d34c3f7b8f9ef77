//! Query model for realtime subscriptions.

use crate::document::Document;
use serde_json::Value;
use std::cmp::Ordering;

/// Field predicate applied by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field exists and differs from `value`.
    NotEqual { field: String, value: Value },
    /// Field is an array holding `value`.
    ArrayContains { field: String, value: Value },
}

impl Filter {
    /// Returns true if the document satisfies the predicate.
    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Self::NotEqual { field, value } => document.get(field).is_some_and(|v| v != value),
            Self::ArrayContains { field, value } => document
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
        }
    }
}

/// Ascending sort on a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Field to sort by.
    pub field: String,
}

/// A query over one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Collection to read.
    pub collection: String,
    /// Optional predicate.
    pub filter: Option<Filter>,
    /// Optional ascending order; ties and unordered queries fall back to id order.
    pub order_by: Option<OrderBy>,
}

impl Query {
    /// Selects every document of a collection.
    #[must_use]
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filter: None,
            order_by: None,
        }
    }

    /// Keeps documents whose `field` differs from `value`.
    #[must_use]
    pub fn where_not_equal(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter = Some(Filter::NotEqual {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Keeps documents whose array `field` contains `value`.
    #[must_use]
    pub fn where_array_contains(
        mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.filter = Some(Filter::ArrayContains {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Orders results ascending by `field`.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
        });
        self
    }

    /// Returns true if the document belongs in this query's results.
    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        self.filter.as_ref().is_none_or(|f| f.matches(document))
    }

    /// Sorts documents into this query's result order.
    pub fn sort(&self, documents: &mut [Document]) {
        match &self.order_by {
            Some(order) => documents.sort_by(|a, b| {
                compare_values(a.get(&order.field), b.get(&order.field))
                    .then_with(|| a.id.cmp(&b.id))
            }),
            None => documents.sort_by(|a, b| a.id.cmp(&b.id)),
        }
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, value: Value) -> Document {
        Document::new(id, value.as_object().cloned().unwrap())
    }

    #[test]
    fn not_equal_excludes_matching_and_missing() {
        let query = Query::collection("users").where_not_equal("uid", "a1");
        assert!(!query.matches(&doc("a1", json!({"uid": "a1"}))));
        assert!(query.matches(&doc("b1", json!({"uid": "b1"}))));
        assert!(!query.matches(&doc("c1", json!({"name": "no uid"}))));
    }

    #[test]
    fn array_contains_checks_membership() {
        let query = Query::collection("messages").where_array_contains("participants", "a1");
        assert!(query.matches(&doc("m1", json!({"participants": ["a1", "b1"]}))));
        assert!(!query.matches(&doc("m2", json!({"participants": ["b1", "c1"]}))));
        assert!(!query.matches(&doc("m3", json!({"participants": "a1"}))));
    }

    #[test]
    fn sort_orders_by_field_then_id() {
        let query = Query::collection("messages").order_by("timestamp");
        let mut docs = vec![
            doc("m3", json!({"timestamp": 20})),
            doc("m2", json!({"timestamp": 10})),
            doc("m1", json!({"timestamp": 10})),
        ];
        query.sort(&mut docs);
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["m1", "m2", "m3"]);
    }
}
