//! Collection of raw JSON field maps.

use crate::collection::{merge_fields, DocumentCollection};
use crate::error::{LocalDbError, LocalDbResult};
use ddp_client::Fields;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

type AddedHandler = Arc<dyn Fn(&str, &Fields) + Send + Sync>;
type ChangedHandler = Arc<dyn Fn(&str, &Fields, &[String]) + Send + Sync>;
type RemovedHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// A collection storing each document as its raw field map.
///
/// Handlers see the event before the collection applies it, so
/// [`get`](Self::get) inside a handler returns the old document.
pub struct JsonCollection {
    name: String,
    documents: RwLock<BTreeMap<String, Fields>>,
    on_added: RwLock<Vec<AddedHandler>>,
    on_changed: RwLock<Vec<ChangedHandler>>,
    on_removed: RwLock<Vec<RemovedHandler>>,
}

impl JsonCollection {
    /// Creates an empty collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::new(BTreeMap::new()),
            on_added: RwLock::new(Vec::new()),
            on_changed: RwLock::new(Vec::new()),
            on_removed: RwLock::new(Vec::new()),
        }
    }

    /// Returns a copy of one document's fields.
    pub fn get(&self, id: &str) -> Option<Fields> {
        self.documents.read().get(id).cloned()
    }

    /// Whether a document is present.
    pub fn contains(&self, id: &str) -> bool {
        self.documents.read().contains_key(id)
    }

    /// Document ids in ascending order.
    pub fn ids(&self) -> Vec<String> {
        self.documents.read().keys().cloned().collect()
    }

    /// A copy of every document.
    pub fn snapshot(&self) -> BTreeMap<String, Fields> {
        self.documents.read().clone()
    }

    /// Registers a handler for added documents: `(id, fields)`.
    pub fn on_added(&self, handler: impl Fn(&str, &Fields) + Send + Sync + 'static) {
        self.on_added.write().push(Arc::new(handler));
    }

    /// Registers a handler for changed documents: `(id, fields, cleared)`.
    pub fn on_changed(&self, handler: impl Fn(&str, &Fields, &[String]) + Send + Sync + 'static) {
        self.on_changed.write().push(Arc::new(handler));
    }

    /// Registers a handler for removed documents: `(id)`.
    pub fn on_removed(&self, handler: impl Fn(&str) + Send + Sync + 'static) {
        self.on_removed.write().push(Arc::new(handler));
    }
}

impl DocumentCollection for JsonCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn add(&self, id: &str, fields: Fields) -> LocalDbResult<()> {
        trace!(collection = %self.name, %id, "add");
        let handlers = self.on_added.read().clone();
        for handler in &handlers {
            handler(id, &fields);
        }
        self.documents.write().insert(id.to_string(), fields);
        Ok(())
    }

    fn change(&self, id: &str, fields: Fields, cleared: Vec<String>) -> LocalDbResult<()> {
        if !self.contains(id) {
            return Err(LocalDbError::unknown(&self.name, id));
        }
        trace!(collection = %self.name, %id, "change");
        let handlers = self.on_changed.read().clone();
        for handler in &handlers {
            handler(id, &fields, &cleared);
        }

        let mut documents = self.documents.write();
        let document = documents
            .get_mut(id)
            .ok_or_else(|| LocalDbError::unknown(&self.name, id))?;
        merge_fields(document, fields, &cleared);
        Ok(())
    }

    fn remove(&self, id: &str) -> LocalDbResult<()> {
        if !self.contains(id) {
            return Err(LocalDbError::unknown(&self.name, id));
        }
        trace!(collection = %self.name, %id, "remove");
        let handlers = self.on_removed.read().clone();
        for handler in &handlers {
            handler(id);
        }
        self.documents.write().remove(id);
        Ok(())
    }

    fn len(&self) -> usize {
        self.documents.read().len()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl std::fmt::Debug for JsonCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonCollection")
            .field("name", &self.name)
            .field("documents", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn add_change_remove() {
        let items = JsonCollection::new("items");
        items.add("a", fields(json!({"x": 1, "y": 2}))).unwrap();
        items
            .change("a", fields(json!({"x": 5})), vec!["y".into()])
            .unwrap();
        assert_eq!(items.get("a"), Some(fields(json!({"x": 5}))));

        items.remove("a").unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn add_replaces_existing_document() {
        let items = JsonCollection::new("items");
        items.add("a", fields(json!({"x": 1}))).unwrap();
        items.add("a", fields(json!({"z": 3}))).unwrap();
        assert_eq!(items.get("a"), Some(fields(json!({"z": 3}))));
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn unknown_ids_are_errors_without_side_effects() {
        let items = JsonCollection::new("items");
        let fired = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&fired);
        items.on_changed(move |_, _, _| *counter.lock() += 1);

        assert!(matches!(
            items.change("ghost", Fields::new(), vec![]),
            Err(LocalDbError::UnknownDocument { .. })
        ));
        assert!(items.remove("ghost").is_err());
        assert_eq!(*fired.lock(), 0);
        assert!(items.is_empty());
    }

    #[test]
    fn handlers_fire_before_mutation() {
        let items = Arc::new(JsonCollection::new("items"));
        let seen = Arc::new(Mutex::new(Vec::new()));

        {
            let view = Arc::clone(&items);
            let seen = Arc::clone(&seen);
            items.on_added(move |id, _| seen.lock().push(("added", view.contains(id))));
        }
        {
            let view = Arc::clone(&items);
            let seen = Arc::clone(&seen);
            items.on_changed(move |id, fields, cleared| {
                assert_eq!(fields.get("x"), Some(&json!(2)));
                assert!(cleared.is_empty());
                let old = view.get(id).unwrap();
                seen.lock().push(("changed", old.get("x") == Some(&json!(1))));
            });
        }
        {
            let view = Arc::clone(&items);
            let seen = Arc::clone(&seen);
            items.on_removed(move |id| seen.lock().push(("removed", view.contains(id))));
        }

        items.add("a", fields(json!({"x": 1}))).unwrap();
        items.change("a", fields(json!({"x": 2})), vec![]).unwrap();
        items.remove("a").unwrap();

        assert_eq!(
            seen.lock().as_slice(),
            &[("added", false), ("changed", true), ("removed", true)]
        );
    }

    #[test]
    fn ordering_hints_degrade() {
        let items = JsonCollection::new("items");
        items
            .add_before("b", fields(json!({"n": 1})), Some("a"))
            .unwrap();
        items.move_before("b", None).unwrap();
        items.move_before("ghost", Some("b")).unwrap();
        assert_eq!(items.ids(), vec!["b".to_string()]);
    }
}
