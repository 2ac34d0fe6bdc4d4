//! Subscription queries and their evaluation.

use std::cmp::Ordering;

use serde_json::Value;

use crate::document::{Document, Fields};
use crate::ops::{get_at, FieldPath};
use crate::paths::DocPath;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(FieldPath, Value),
    /// Matches documents whose array field contains the value.
    ArrayContains(FieldPath, Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// What a subscription watches: a whole collection or a single document.
#[derive(Debug, Clone, PartialEq)]
pub enum Scope {
    Collection(String),
    Doc(DocPath),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub scope: Scope,
    pub filter: Option<Filter>,
    pub order_by: Option<(FieldPath, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(path: impl Into<String>) -> Self {
        Self {
            scope: Scope::Collection(path.into()),
            filter: None,
            order_by: None,
            limit: None,
        }
    }

    pub fn doc(path: DocPath) -> Self {
        Self {
            scope: Scope::Doc(path),
            filter: None,
            order_by: None,
            limit: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order_by(mut self, field: FieldPath, direction: Direction) -> Self {
        self.order_by = Some((field, direction));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Whether a mutation at `path` can change this query's result set.
    pub fn watches(&self, path: &DocPath) -> bool {
        match &self.scope {
            Scope::Collection(collection) => path.collection() == collection,
            Scope::Doc(doc) => doc == path,
        }
    }

    pub fn matches(&self, path: &DocPath, fields: &Fields) -> bool {
        if !self.watches(path) {
            return false;
        }
        match &self.filter {
            None => true,
            Some(Filter::Eq(field, value)) => get_at(fields, field) == Some(value),
            Some(Filter::ArrayContains(field, value)) => get_at(fields, field)
                .and_then(Value::as_array)
                .is_some_and(|array| array.contains(value)),
        }
    }

    /// Evaluate against a document set: filter, order (document id breaks
    /// ties for determinism), limit.
    pub fn evaluate<'a>(
        &self,
        docs: impl Iterator<Item = (&'a DocPath, &'a Fields)>,
    ) -> Vec<Document> {
        let mut result: Vec<Document> = docs
            .filter(|(path, fields)| self.matches(path, fields))
            .map(|(path, fields)| Document {
                path: path.clone(),
                fields: fields.clone(),
            })
            .collect();

        if let Some((field, direction)) = &self.order_by {
            result.sort_by(|a, b| {
                let ordering = compare_values(get_at(&a.fields, field), get_at(&b.fields, field))
                    .then_with(|| a.id().cmp(b.id()));
                match direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        } else {
            result.sort_by(|a, b| a.path.cmp(&b.path));
        }

        if let Some(limit) = self.limit {
            result.truncate(limit);
        }
        result
    }
}

/// Total order over JSON values for sorting: absent < null < bool < number
/// < string; other types compare equal.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(_) => 5,
        }
    }
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_shared::types::{ConversationId, MessageId};
    use serde_json::json;

    fn doc(path: DocPath, fields: Value) -> (DocPath, Fields) {
        match fields {
            Value::Object(map) => (path, map),
            _ => unreachable!(),
        }
    }

    #[test]
    fn array_contains_filters_membership() {
        let conv = |id: &str| DocPath::conversation(&ConversationId(id.into()));
        let docs = vec![
            doc(conv("a"), json!({ "members": ["alice", "bob"] })),
            doc(conv("b"), json!({ "members": ["carol"] })),
        ];
        let query = Query::collection("conversations").filter(Filter::ArrayContains(
            FieldPath::new("members"),
            json!("alice"),
        ));
        let result = query.evaluate(docs.iter().map(|(p, f)| (p, f)));
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id(), "a");
    }

    #[test]
    fn order_limit_and_id_tiebreak() {
        let conv = ConversationId("c".into());
        let msg = |id: &str, ts: i64| {
            doc(
                DocPath::message(&conv, &MessageId(id.into())),
                json!({ "timestamp": ts }),
            )
        };
        let docs = vec![msg("m2", 200), msg("m1", 100), msg("m4", 200), msg("m3", 300)];
        let query = Query::collection(crate::paths::messages_collection(&conv))
            .order_by(FieldPath::new("timestamp"), Direction::Descending)
            .limit(3);
        let result = query.evaluate(docs.iter().map(|(p, f)| (p, f)));
        let ids: Vec<&str> = result.iter().map(|d| d.id()).collect();
        // Descending by timestamp; the 200s tie breaks on id, reversed.
        assert_eq!(ids, vec!["m3", "m4", "m2"]);
    }

    #[test]
    fn doc_scope_matches_one_document() {
        let conv = ConversationId("c".into());
        let docs = vec![
            doc(DocPath::conversation(&conv), json!({ "kind": "direct" })),
            doc(
                DocPath::conversation(&ConversationId("d".into())),
                json!({ "kind": "group" }),
            ),
        ];
        let query = Query::doc(DocPath::conversation(&conv));
        let result = query.evaluate(docs.iter().map(|(p, f)| (p, f)));
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id(), "c");
    }
}
