//! In-process document backend.
//!
//! Behaves like a hosted document database seen from one client: ids and
//! commit timestamps are assigned here, and every listener of a collection
//! receives the full collection after each change. Connectivity can be
//! switched off to exercise failure paths.

use crate::document::{DocumentWrite, Fields};
use crate::remote::{DocumentBackend, ListenerRegistration, SnapshotListener};
use crate::{error::Result, CollectionName, Document, DocumentId, Error, Snapshot, Timestamp};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type SharedListener = Arc<Mutex<SnapshotListener>>;

struct Inner {
    online: bool,
    collections: BTreeMap<CollectionName, BTreeMap<DocumentId, Fields>>,
    listeners: BTreeMap<CollectionName, Vec<(u64, SharedListener)>>,
    next_listener: u64,
    last_timestamp: Timestamp,
}

impl Inner {
    fn snapshot(&self, collection: &str) -> Snapshot {
        let documents = self
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default();

        Snapshot {
            collection: collection.to_string(),
            documents,
            read_time: self.last_timestamp,
        }
    }

    /// Commit clock. Strictly increasing even within one millisecond.
    fn tick(&mut self) -> Timestamp {
        let now = chrono::Utc::now().timestamp_millis();
        self.last_timestamp = now.max(self.last_timestamp + 1);
        self.last_timestamp
    }

    fn ensure_online(&self) -> Result<()> {
        if self.online {
            Ok(())
        } else {
            Err(Error::Connection("backend offline".to_string()))
        }
    }

    fn listeners_of(&self, collection: &str) -> Vec<SharedListener> {
        self.listeners
            .get(collection)
            .map(|ls| ls.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default()
    }
}

/// Shared handle to an in-memory document database.
#[derive(Clone)]
pub struct MemoryDocumentBackend {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryDocumentBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryDocumentBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("MemoryDocumentBackend")
            .field("online", &inner.online)
            .field("collections", &inner.collections.len())
            .finish()
    }
}

impl MemoryDocumentBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                online: true,
                collections: BTreeMap::new(),
                listeners: BTreeMap::new(),
                next_listener: 0,
                last_timestamp: 0,
            })),
        }
    }

    /// Switch connectivity. While offline, subscribe and writes fail.
    pub fn set_online(&self, online: bool) {
        self.lock().online = online;
    }

    /// End every live channel with a connection error.
    pub fn drop_connections(&self) {
        let dropped: Vec<SharedListener> = {
            let mut inner = self.lock();
            std::mem::take(&mut inner.listeners)
                .into_values()
                .flatten()
                .map(|(_, l)| l)
                .collect()
        };

        tracing::warn!(count = dropped.len(), "dropping document listeners");
        for listener in dropped {
            let mut callback = listener.lock().unwrap_or_else(PoisonError::into_inner);
            (&mut *callback)(Err(Error::Connection("connection lost".to_string())));
        }
    }

    pub fn document_count(&self, collection: &str) -> usize {
        self.lock()
            .collections
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    pub fn listener_count(&self, collection: &str) -> usize {
        self.lock().listeners.get(collection).map_or(0, Vec::len)
    }

    pub fn document(&self, collection: &str, id: &str) -> Option<Document> {
        self.lock()
            .collections
            .get(collection)?
            .get(id)
            .map(|fields| Document::new(id, fields.clone()))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock_inner(&self.inner)
    }

    /// Push the current collection to its listeners, outside the lock.
    fn notify(&self, collection: &str) {
        let (snapshot, listeners) = {
            let inner = self.lock();
            (inner.snapshot(collection), inner.listeners_of(collection))
        };

        for listener in listeners {
            let mut callback = listener.lock().unwrap_or_else(PoisonError::into_inner);
            (&mut *callback)(Ok(snapshot.clone()));
        }
    }
}

fn lock_inner(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DocumentBackend for MemoryDocumentBackend {
    fn subscribe(
        &self,
        collection: &str,
        listener: SnapshotListener,
    ) -> Result<ListenerRegistration> {
        let listener: SharedListener = Arc::new(Mutex::new(listener));

        let (listener_id, snapshot) = {
            let mut inner = self.lock();
            inner.ensure_online()?;
            let listener_id = inner.next_listener;
            inner.next_listener += 1;
            inner
                .listeners
                .entry(collection.to_string())
                .or_default()
                .push((listener_id, Arc::clone(&listener)));
            (listener_id, inner.snapshot(collection))
        };

        tracing::debug!(collection, listener_id, "listener registered");
        {
            let mut callback = listener.lock().unwrap_or_else(PoisonError::into_inner);
            (&mut *callback)(Ok(snapshot));
        }

        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        let collection = collection.to_string();
        Ok(ListenerRegistration::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut inner = lock_inner(&inner);
                if let Some(listeners) = inner.listeners.get_mut(&collection) {
                    listeners.retain(|(id, _)| *id != listener_id);
                    if listeners.is_empty() {
                        inner.listeners.remove(&collection);
                    }
                }
                tracing::debug!(collection = %collection, listener_id, "listener removed");
            }
        }))
    }

    fn add_document(&self, collection: &str, write: DocumentWrite) -> Result<DocumentId> {
        let id = {
            let mut inner = self.lock();
            inner.ensure_online()?;
            let now = inner.tick();
            let id = uuid::Uuid::new_v4().simple().to_string();
            inner
                .collections
                .entry(collection.to_string())
                .or_default()
                .insert(id.clone(), write.resolve(now));
            id
        };

        tracing::debug!(collection, id = %id, "document added");
        self.notify(collection);
        Ok(id)
    }

    fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
        {
            let mut inner = self.lock();
            inner.ensure_online()?;
            inner.tick();
            if let Some(docs) = inner.collections.get_mut(collection) {
                docs.remove(id);
            }
        }

        tracing::debug!(collection, id, "document deleted");
        self.notify(collection);
        Ok(())
    }

    fn update_document(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        {
            let mut inner = self.lock();
            inner.ensure_online()?;
            inner.tick();
            let doc = inner
                .collections
                .get_mut(collection)
                .and_then(|docs| docs.get_mut(id))
                .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;
            doc.extend(fields);
        }

        tracing::debug!(collection, id, "document updated");
        self.notify(collection);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn collect(
        backend: &MemoryDocumentBackend,
    ) -> (ListenerRegistration, mpsc::Receiver<Result<Snapshot>>) {
        let (tx, rx) = mpsc::channel();
        let registration = backend
            .subscribe(
                "todos",
                Box::new(move |event| {
                    let _ = tx.send(event);
                }),
            )
            .unwrap();
        (registration, rx)
    }

    #[test]
    fn subscribe_delivers_initial_snapshot() {
        let backend = MemoryDocumentBackend::new();
        let (_reg, rx) = collect(&backend);

        let snapshot = rx.try_recv().unwrap().unwrap();
        assert_eq!(snapshot.collection, "todos");
        assert!(snapshot.documents.is_empty());
    }

    #[test]
    fn every_mutation_pushes_full_snapshot() {
        let backend = MemoryDocumentBackend::new();
        let (_reg, rx) = collect(&backend);
        rx.try_recv().unwrap().unwrap();

        let id = backend
            .add_document("todos", DocumentWrite::new().field("task", "a"))
            .unwrap();
        backend
            .add_document("todos", DocumentWrite::new().field("task", "b"))
            .unwrap();
        assert_eq!(rx.try_recv().unwrap().unwrap().documents.len(), 1);
        assert_eq!(rx.try_recv().unwrap().unwrap().documents.len(), 2);

        backend.delete_document("todos", &id).unwrap();
        assert_eq!(rx.try_recv().unwrap().unwrap().documents.len(), 1);

        // other collections do not notify
        backend
            .add_document("notes", DocumentWrite::new().field("x", 1))
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn server_timestamps_are_increasing() {
        let backend = MemoryDocumentBackend::new();
        let write = || DocumentWrite::new().server_timestamp("createdAt");

        let a = backend.add_document("todos", write()).unwrap();
        let b = backend.add_document("todos", write()).unwrap();

        let at = |id: &str| backend.document("todos", id).unwrap().get_timestamp("createdAt");
        assert!(at(&a).unwrap() < at(&b).unwrap());
    }

    #[test]
    fn update_merges_fields() {
        let backend = MemoryDocumentBackend::new();
        let id = backend
            .add_document(
                "todos",
                DocumentWrite::new().field("task", "a").field("completed", false),
            )
            .unwrap();

        let mut fields = Fields::new();
        fields.insert("completed".into(), true.into());
        backend.update_document("todos", &id, fields).unwrap();

        let doc = backend.document("todos", &id).unwrap();
        assert_eq!(doc.get_str("task"), Some("a"));
        assert_eq!(doc.get_bool("completed"), Some(true));

        assert_eq!(
            backend.update_document("todos", "missing", Fields::new()),
            Err(Error::DocumentNotFound("missing".into()))
        );
    }

    #[test]
    fn registration_drop_unsubscribes() {
        let backend = MemoryDocumentBackend::new();
        let (reg, rx) = collect(&backend);
        assert_eq!(backend.listener_count("todos"), 1);

        drop(reg);
        assert_eq!(backend.listener_count("todos"), 0);

        rx.try_recv().unwrap().unwrap();
        backend
            .add_document("todos", DocumentWrite::new().field("task", "a"))
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn offline_rejects_everything() {
        let backend = MemoryDocumentBackend::new();
        backend.set_online(false);

        assert!(matches!(
            backend.subscribe("todos", Box::new(|_: Result<Snapshot>| {})),
            Err(Error::Connection(_))
        ));
        assert!(backend.add_document("todos", DocumentWrite::new()).is_err());
        assert!(backend.delete_document("todos", "x").is_err());
        assert_eq!(backend.listener_count("todos"), 0);
    }

    #[test]
    fn drop_connections_reports_error() {
        let backend = MemoryDocumentBackend::new();
        let (_reg, rx) = collect(&backend);
        rx.try_recv().unwrap().unwrap();

        backend.drop_connections();
        assert!(matches!(rx.try_recv().unwrap(), Err(Error::Connection(_))));
        assert_eq!(backend.listener_count("todos"), 0);
    }
}
