//! The collection seam between [`LocalDb`](crate::LocalDb) and storage.

use crate::error::LocalDbResult;
use ddp_client::Fields;
use std::any::Any;
use std::sync::Arc;

/// A local mirror of one server-published collection.
///
/// Implementations fire their observers before mutating, and must not hold
/// internal locks while observers run.
pub trait DocumentCollection: Send + Sync {
    /// The collection name.
    fn name(&self) -> &str;

    /// Inserts a document, replacing any document with the same id.
    fn add(&self, id: &str, fields: Fields) -> LocalDbResult<()>;

    /// Overwrites `fields`, then removes every field named in `cleared`.
    fn change(&self, id: &str, fields: Fields, cleared: Vec<String>) -> LocalDbResult<()>;

    /// Deletes a document.
    fn remove(&self, id: &str) -> LocalDbResult<()>;

    /// Inserts a document before `before`. Order is not tracked, so this is
    /// an `add` unless overridden.
    fn add_before(&self, id: &str, fields: Fields, _before: Option<&str>) -> LocalDbResult<()> {
        self.add(id, fields)
    }

    /// Moves a document before `before`. A no-op unless overridden.
    fn move_before(&self, _id: &str, _before: Option<&str>) -> LocalDbResult<()> {
        Ok(())
    }

    /// Number of documents.
    fn len(&self) -> usize;

    /// Whether the collection holds no documents.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Upcast used by [`LocalDb::collection_as`](crate::LocalDb::collection_as).
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Applies a `changed` event to a field map.
pub(crate) fn merge_fields(target: &mut Fields, fields: Fields, cleared: &[String]) {
    for (name, value) in fields {
        target.insert(name, value);
    }
    for name in cleared {
        target.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn merge_overwrites_then_clears() {
        let mut doc = fields(json!({"a": 1, "b": 2, "c": 3}));
        merge_fields(&mut doc, fields(json!({"a": 10, "d": 4})), &["b".into()]);
        assert_eq!(doc, fields(json!({"a": 10, "c": 3, "d": 4})));
    }

    #[test]
    fn cleared_wins_over_same_named_field() {
        let mut doc = fields(json!({"a": 1}));
        merge_fields(&mut doc, fields(json!({"a": 2})), &["a".into()]);
        assert!(doc.is_empty());
    }

    #[test]
    fn clearing_missing_field_is_harmless() {
        let mut doc = fields(json!({"a": 1}));
        merge_fields(&mut doc, Fields::new(), &["zzz".into()]);
        assert_eq!(doc, fields(json!({"a": 1})));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn field_map() -> impl Strategy<Value = Fields> {
            prop::collection::btree_map("[a-e]", any::<i64>(), 0..5).prop_map(|map| {
                map.into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect()
            })
        }

        proptest! {
            #[test]
            fn merged_fields_present_unless_cleared(
                base in field_map(),
                update in field_map(),
                cleared in prop::collection::vec("[a-e]", 0..3),
            ) {
                let mut doc = base.clone();
                merge_fields(&mut doc, update.clone(), &cleared);
                for name in &cleared {
                    prop_assert!(!doc.contains_key(name));
                }
                for (name, value) in &update {
                    if !cleared.contains(name) {
                        prop_assert_eq!(doc.get(name), Some(value));
                    }
                }
                for (name, value) in &base {
                    if !cleared.contains(name) && !update.contains_key(name) {
                        prop_assert_eq!(doc.get(name), Some(value));
                    }
                }
            }
        }
    }
}
