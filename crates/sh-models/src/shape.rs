//! Serde helpers for the loosely shaped values the engine returns

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

/// Accept `T`, `[T, ...]`, `[]` or `null`, keeping the first element
pub fn one_or_first<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let value = Option::<OneOrMany<T>>::deserialize(deserializer)?;
    Ok(match value {
        Some(OneOrMany::One(item)) => Some(item),
        Some(OneOrMany::Many(items)) => items.into_iter().next(),
        None => None,
    })
}

/// Accept `T`, `[T, ...]` or `null` as a list
pub fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let value = Option::<OneOrMany<T>>::deserialize(deserializer)?;
    Ok(match value {
        Some(OneOrMany::One(item)) => vec![item],
        Some(OneOrMany::Many(items)) => items,
        None => Vec::new(),
    })
}

/// Treat `null` like a missing field
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Holder {
        #[serde(default, deserialize_with = "one_or_first")]
        first: Option<String>,
        #[serde(default, deserialize_with = "one_or_many")]
        many: Vec<String>,
        #[serde(default, deserialize_with = "null_as_default")]
        list: Vec<u8>,
    }

    #[test]
    fn test_one_or_first_shapes() {
        let h: Holder = serde_json::from_value(json!({ "first": "a" })).unwrap();
        assert_eq!(h.first.as_deref(), Some("a"));

        let h: Holder = serde_json::from_value(json!({ "first": ["b", "c"] })).unwrap();
        assert_eq!(h.first.as_deref(), Some("b"));

        let h: Holder = serde_json::from_value(json!({ "first": [] })).unwrap();
        assert_eq!(h.first, None);

        let h: Holder = serde_json::from_value(json!({ "first": null })).unwrap();
        assert_eq!(h.first, None);
    }

    #[test]
    fn test_one_or_many_and_null_default() {
        let h: Holder = serde_json::from_value(json!({ "many": "x", "list": null })).unwrap();
        assert_eq!(h.many, vec!["x".to_string()]);
        assert!(h.list.is_empty());

        let h: Holder = serde_json::from_value(json!({})).unwrap();
        assert!(h.many.is_empty());
    }
}
