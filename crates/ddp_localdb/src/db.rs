//! Routing of connection data events to collections.

use crate::collection::DocumentCollection;
use crate::error::{LocalDbError, LocalDbResult};
use crate::json_collection::JsonCollection;
use ddp_client::{Connection, DataEvent, DataObserver, ObserverId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Builds the collection for a name on first use.
pub type CollectionFactory = dyn Fn(&LocalDb, &str) -> Arc<dyn DocumentCollection> + Send + Sync;

struct DbInner {
    factory: Box<CollectionFactory>,
    collections: Mutex<HashMap<String, Arc<dyn DocumentCollection>>>,
    attached: Mutex<Option<(Connection, ObserverId)>>,
}

impl Drop for DbInner {
    fn drop(&mut self) {
        if let Some((connection, id)) = self.attached.get_mut().take() {
            connection.remove_data_observer(id);
        }
    }
}

/// Client-side mirror of the collections a connection publishes.
///
/// Collections are created lazily by the factory, either on
/// [`get_collection`](Self::get_collection) or on the first data event
/// naming them, and are never duplicated. Cheap to clone.
#[derive(Clone)]
pub struct LocalDb {
    inner: Arc<DbInner>,
}

impl LocalDb {
    /// Creates a database with a custom collection factory.
    pub fn new(
        factory: impl Fn(&LocalDb, &str) -> Arc<dyn DocumentCollection> + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(DbInner {
                factory: Box::new(factory),
                collections: Mutex::new(HashMap::new()),
                attached: Mutex::new(None),
            }),
        }
    }

    /// Creates a database whose collections are all [`JsonCollection`]s.
    pub fn json() -> Self {
        Self::new(|_, name| Arc::new(JsonCollection::new(name)))
    }

    /// Returns the collection for `name`, creating it if needed.
    pub fn get_collection(&self, name: &str) -> Arc<dyn DocumentCollection> {
        if let Some(existing) = self.inner.collections.lock().get(name) {
            return Arc::clone(existing);
        }

        // The factory may itself look up collections, so it runs unlocked.
        let created = (self.inner.factory)(self, name);
        let mut collections = self.inner.collections.lock();
        let entry = collections
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(collection = %name, "collection created");
                created
            });
        Arc::clone(entry)
    }

    /// Returns the collection for `name` as its concrete type.
    ///
    /// Returns `None` if the factory built a different type.
    pub fn collection_as<C>(&self, name: &str) -> Option<Arc<C>>
    where
        C: DocumentCollection + 'static,
    {
        self.get_collection(name).into_any().downcast::<C>().ok()
    }

    /// Names of the collections created so far.
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.collections.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drops every collection. Later events recreate them empty.
    pub fn clear_collections(&self) {
        let dropped = std::mem::take(&mut *self.inner.collections.lock());
        debug!(collections = dropped.len(), "collections cleared");
    }

    /// Attaches to `connection`, detaching from the previous one.
    ///
    /// `None` only detaches. Collections are kept either way.
    pub fn set_connection(&self, connection: Option<&Connection>) {
        let mut attached = self.inner.attached.lock();
        if let Some((previous, id)) = attached.take() {
            previous.remove_data_observer(id);
            debug!("detached from connection");
        }
        if let Some(connection) = connection {
            let router: Arc<dyn DataObserver> = Arc::new(Router {
                db: Arc::downgrade(&self.inner),
            });
            let id = connection.add_data_observer(router);
            *attached = Some((connection.clone(), id));
            debug!("attached to connection");
        }
    }

    /// The connection this database is attached to.
    pub fn connection(&self) -> Option<Connection> {
        self.inner
            .attached
            .lock()
            .as_ref()
            .map(|(connection, _)| connection.clone())
    }

    /// Applies one data event to its collection.
    pub fn apply(&self, event: &DataEvent) -> LocalDbResult<()> {
        let collection = self.get_collection(event.collection());
        match event.clone() {
            DataEvent::Added { id, fields, .. } => collection.add(&id, fields),
            DataEvent::Changed {
                id,
                fields,
                cleared,
                ..
            } => collection.change(&id, fields, cleared),
            DataEvent::Removed { id, .. } => collection.remove(&id),
            DataEvent::AddedBefore {
                id, fields, before, ..
            } => collection.add_before(&id, fields, before.as_deref()),
            DataEvent::MovedBefore { id, before, .. } => {
                collection.move_before(&id, before.as_deref())
            }
        }
    }
}

impl std::fmt::Debug for LocalDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalDb")
            .field("collections", &self.collection_names())
            .field("attached", &self.inner.attached.lock().is_some())
            .finish()
    }
}

/// The observer registered on a connection.
///
/// Holds the database weakly so the connection never keeps it alive.
struct Router {
    db: Weak<DbInner>,
}

impl DataObserver for Router {
    fn on_data(&self, event: &DataEvent) {
        let Some(inner) = self.db.upgrade() else {
            return;
        };
        let db = LocalDb { inner };
        match db.apply(event) {
            Ok(()) => {}
            Err(err @ LocalDbError::UnknownDocument { .. }) => debug!(error = %err, "event skipped"),
            Err(err) => warn!(error = %err, "event skipped"),
        }
    }
}
