//! Typed collection implementation.

use crate::codec::DocumentCodec;
use crate::collection::{merge_fields, DocumentCollection};
use crate::error::{LocalDbError, LocalDbResult};
use ddp_client::Fields;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

type AddedHandler<T> = Arc<dyn Fn(&str, &T) + Send + Sync>;
type ChangedHandler<T> = Arc<dyn Fn(&str, &T, &T) + Send + Sync>;
type RemovedHandler<T> = Arc<dyn Fn(&str, &T) + Send + Sync>;

/// A collection of typed documents.
///
/// `TypedCollection<T>` converts incoming field maps into `T` through
/// [`DocumentCodec`]. A `changed` event is applied to the field map of the
/// stored document and converted back, so handlers receive both the old and
/// the new document.
///
/// # Example
///
/// ```rust,ignore
/// let db = LocalDb::new(|_db, name| match name {
///     "items" => Arc::new(TypedCollection::<Item>::new(name)) as Arc<dyn DocumentCollection>,
///     _ => Arc::new(JsonCollection::new(name)),
/// });
///
/// let items = db.collection_as::<TypedCollection<Item>>("items").unwrap();
/// items.on_changed(|id, old, new| println!("{id}: {} -> {}", old.title, new.title));
/// ```
pub struct TypedCollection<T: DocumentCodec> {
    name: String,
    documents: RwLock<BTreeMap<String, T>>,
    on_added: RwLock<Vec<AddedHandler<T>>>,
    on_changed: RwLock<Vec<ChangedHandler<T>>>,
    on_removed: RwLock<Vec<RemovedHandler<T>>>,
}

impl<T: DocumentCodec> TypedCollection<T> {
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

    /// Gets a document by id.
    pub fn get(&self, id: &str) -> Option<T> {
        self.documents.read().get(id).cloned()
    }

    /// Document ids in ascending order.
    pub fn ids(&self) -> Vec<String> {
        self.documents.read().keys().cloned().collect()
    }

    /// Every document, ordered by id.
    pub fn all(&self) -> Vec<(String, T)> {
        self.documents
            .read()
            .iter()
            .map(|(id, doc)| (id.clone(), doc.clone()))
            .collect()
    }

    /// Registers a handler for added documents: `(id, document)`.
    pub fn on_added(&self, handler: impl Fn(&str, &T) + Send + Sync + 'static) {
        self.on_added.write().push(Arc::new(handler));
    }

    /// Registers a handler for changed documents: `(id, old, new)`.
    pub fn on_changed(&self, handler: impl Fn(&str, &T, &T) + Send + Sync + 'static) {
        self.on_changed.write().push(Arc::new(handler));
    }

    /// Registers a handler for removed documents: `(id, document)`.
    pub fn on_removed(&self, handler: impl Fn(&str, &T) + Send + Sync + 'static) {
        self.on_removed.write().push(Arc::new(handler));
    }
}

impl<T: DocumentCodec> DocumentCollection for TypedCollection<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn add(&self, id: &str, fields: Fields) -> LocalDbResult<()> {
        let document = T::from_fields(&self.name, id, &fields)?;
        trace!(collection = %self.name, %id, "add");
        let handlers = self.on_added.read().clone();
        for handler in &handlers {
            handler(id, &document);
        }
        self.documents.write().insert(id.to_string(), document);
        Ok(())
    }

    fn change(&self, id: &str, fields: Fields, cleared: Vec<String>) -> LocalDbResult<()> {
        let old = self
            .get(id)
            .ok_or_else(|| LocalDbError::unknown(&self.name, id))?;
        let mut merged = old.to_fields(&self.name, id)?;
        merge_fields(&mut merged, fields, &cleared);
        let new = T::from_fields(&self.name, id, &merged)?;

        trace!(collection = %self.name, %id, "change");
        let handlers = self.on_changed.read().clone();
        for handler in &handlers {
            handler(id, &old, &new);
        }
        self.documents.write().insert(id.to_string(), new);
        Ok(())
    }

    fn remove(&self, id: &str) -> LocalDbResult<()> {
        let document = self
            .get(id)
            .ok_or_else(|| LocalDbError::unknown(&self.name, id))?;
        trace!(collection = %self.name, %id, "remove");
        let handlers = self.on_removed.read().clone();
        for handler in &handlers {
            handler(id, &document);
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

impl<T: DocumentCodec> std::fmt::Debug for TypedCollection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedCollection")
            .field("name", &self.name)
            .field("type", &std::any::type_name::<T>())
            .field("documents", &self.len())
            .finish()
    }
}
