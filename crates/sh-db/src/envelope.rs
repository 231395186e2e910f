//! Result envelope normalization
//!
//! A query returns one value per statement, and a statement's value may be a
//! list of records, a list wrapped in another list, a bare record, or null
//! depending on its shape (`SELECT`, `CREATE ONLY`, `RETURN`, `LET`). Callers
//! pick the arity they expect and go through one of the two functions here.

use serde::de::DeserializeOwned;
use serde_json::Value;
use sh_core::{ShError, ShResult};

/// Normalize a statement value into a list of records
pub fn normalize_many<T: DeserializeOwned>(value: Value) -> ShResult<Vec<T>> {
    let items = match value {
        Value::Null => Vec::new(),
        Value::Array(mut items) => {
            if items.len() == 1 && items[0].is_array() {
                match items.pop() {
                    Some(Value::Array(inner)) => inner,
                    _ => Vec::new(),
                }
            } else {
                items
            }
        }
        other => vec![other],
    };

    items
        .into_iter()
        .filter(|item| !item.is_null())
        .map(|item| serde_json::from_value(item).map_err(shape_error::<T>))
        .collect()
}

/// Normalize a statement value into at most one record
pub fn normalize_one<T: DeserializeOwned>(value: Value) -> ShResult<Option<T>> {
    match value {
        Value::Null => Ok(None),
        Value::Array(items) => match items.into_iter().find(|item| !item.is_null()) {
            Some(first) => normalize_one(first),
            None => Ok(None),
        },
        other => serde_json::from_value(other)
            .map(Some)
            .map_err(shape_error::<T>),
    }
}

fn shape_error<T>(err: serde_json::Error) -> ShError {
    let type_name = std::any::type_name::<T>()
        .rsplit("::")
        .next()
        .unwrap_or("record");
    ShError::shape(format!("Malformed {} in query result: {}", type_name, err))
}

/// Per-statement results of one query call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementResults {
    results: Vec<Value>,
}

impl StatementResults {
    pub fn new(results: Vec<Value>) -> Self {
        Self { results }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Take the raw value of statement `index`, leaving null behind
    pub fn take(&mut self, index: usize) -> Value {
        self.results
            .get_mut(index)
            .map(Value::take)
            .unwrap_or(Value::Null)
    }

    /// The last non-null statement value, which is what a transaction returned
    pub fn last_value(&mut self) -> Value {
        self.results
            .iter_mut()
            .rev()
            .find(|v| !v.is_null())
            .map(Value::take)
            .unwrap_or(Value::Null)
    }

    pub fn many<T: DeserializeOwned>(&mut self, index: usize) -> ShResult<Vec<T>> {
        normalize_many(self.take(index))
    }

    pub fn one<T: DeserializeOwned>(&mut self, index: usize) -> ShResult<Option<T>> {
        normalize_one(self.take(index))
    }

    /// Record returned by a transaction's final `RETURN`
    pub fn returned_one<T: DeserializeOwned>(&mut self) -> ShResult<Option<T>> {
        normalize_one(self.last_value())
    }

    pub fn returned_many<T: DeserializeOwned>(&mut self) -> ShResult<Vec<T>> {
        normalize_many(self.last_value())
    }

    pub fn into_values(self) -> Vec<Value> {
        self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Named {
        name: String,
    }

    fn named(name: &str) -> Named {
        Named { name: name.into() }
    }

    #[test]
    fn test_normalize_many_shapes() {
        let flat: Vec<Named> = normalize_many(json!([{ "name": "a" }, { "name": "b" }])).unwrap();
        assert_eq!(flat, vec![named("a"), named("b")]);

        let nested: Vec<Named> = normalize_many(json!([[{ "name": "a" }]])).unwrap();
        assert_eq!(nested, vec![named("a")]);

        let bare: Vec<Named> = normalize_many(json!({ "name": "a" })).unwrap();
        assert_eq!(bare, vec![named("a")]);

        let empty: Vec<Named> = normalize_many(Value::Null).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_normalize_one_shapes() {
        let one: Option<Named> = normalize_one(json!([[{ "name": "a" }]])).unwrap();
        assert_eq!(one, Some(named("a")));

        let one: Option<Named> = normalize_one(json!({ "name": "a" })).unwrap();
        assert_eq!(one, Some(named("a")));

        let none: Option<Named> = normalize_one(json!([])).unwrap();
        assert_eq!(none, None);
    }

    #[test]
    fn test_malformed_record_is_shape_error() {
        let err = normalize_one::<Named>(json!({ "title": 1 })).unwrap_err();
        assert!(matches!(err, ShError::Shape(_)));
        assert!(err.to_string().contains("Malformed Named"));
    }

    #[test]
    fn test_transaction_result_is_last_non_null() {
        let mut results = StatementResults::new(vec![
            Value::Null,
            Value::Null,
            json!([{ "name": "created" }]),
            Value::Null,
        ]);
        let created: Option<Named> = results.returned_one().unwrap();
        assert_eq!(created, Some(named("created")));
    }
}
