//! Remote record list: a live mirror of a hosted document collection.
//!
//! The controller never edits its own view. Writes go to the backend and the
//! next pushed [`Snapshot`] replaces the view in full.
//!
//! ## Scoped subscription
//!
//! [`DocumentBackend::subscribe`] hands back a [`ListenerRegistration`].
//! Dropping it releases the listener, so a controller that is deactivated,
//! fails, or is dropped never leaks its callback.

use crate::document::{DocumentWrite, Fields};
use crate::{error::Result, Document, DocumentId, Error, Snapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Collection the remote task screen reads and writes.
pub const TODOS_COLLECTION: &str = "todos";

/// Callback receiving every pushed snapshot, or the error that ended the
/// stream.
pub type SnapshotListener = Box<dyn FnMut(Result<Snapshot>) + Send>;

/// A hosted document-collection client.
pub trait DocumentBackend: Send + Sync {
    /// Open a live channel on `collection`.
    ///
    /// The listener receives the current snapshot first, then a full
    /// snapshot after every change from any client.
    fn subscribe(&self, collection: &str, listener: SnapshotListener)
        -> Result<ListenerRegistration>;

    /// Create a document and return its server-assigned id.
    fn add_document(&self, collection: &str, write: DocumentWrite) -> Result<DocumentId>;

    /// Delete a document by id.
    fn delete_document(&self, collection: &str, id: &str) -> Result<()>;

    /// Merge `fields` into an existing document.
    fn update_document(&self, collection: &str, id: &str, fields: Fields) -> Result<()>;
}

/// Handle to an active subscription. Unsubscribes when dropped.
pub struct ListenerRegistration {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerRegistration {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Unsubscribe now.
    pub fn remove(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// The backend client a remote controller was built with, or the reason
/// there is none.
#[derive(Clone)]
pub enum BackendHandle {
    Available(Arc<dyn DocumentBackend>),
    Unavailable(String),
}

impl BackendHandle {
    pub fn available(backend: impl DocumentBackend + 'static) -> Self {
        BackendHandle::Available(Arc::new(backend))
    }

    fn get(&self) -> Result<&Arc<dyn DocumentBackend>> {
        match self {
            BackendHandle::Available(backend) => Ok(backend),
            BackendHandle::Unavailable(reason) => Err(Error::BackendUnavailable(reason.clone())),
        }
    }
}

impl std::fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendHandle::Available(_) => f.write_str("Available"),
            BackendHandle::Unavailable(reason) => f.debug_tuple("Unavailable").field(reason).finish(),
        }
    }
}

/// A task document as shown on the remote task screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: DocumentId,
    pub task: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

impl Todo {
    /// Map a document. A missing completion flag reads as `false`; an unset
    /// or unresolved creation time reads as `now`.
    pub fn from_document(doc: &Document, now: DateTime<Utc>) -> Self {
        let task = match doc.get_str("task") {
            Some(task) => task.to_string(),
            None => {
                tracing::warn!(id = %doc.id, "todo document has no task text");
                String::new()
            }
        };
        let created_at = doc
            .get_timestamp("createdAt")
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or(now);

        Self {
            id: doc.id.clone(),
            task,
            completed: doc.get_bool("completed").unwrap_or(false),
            created_at,
        }
    }
}

/// Map a snapshot into display order: newest first.
pub fn todos_from_snapshot(snapshot: &Snapshot, now: DateTime<Utc>) -> Vec<Todo> {
    let mut todos: Vec<Todo> = snapshot
        .documents
        .iter()
        .map(|doc| Todo::from_document(doc, now))
        .collect();
    todos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    todos
}

/// What the remote task screen is showing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum ScreenState {
    /// Waiting for the first snapshot
    Loading,
    /// Showing the latest snapshot
    Ready,
    /// Connection failed; the screen offers a retry
    Failed(String),
}

#[derive(Debug)]
struct Mirror {
    state: ScreenState,
    todos: Vec<Todo>,
    /// The backend ended the channel; no further snapshots will arrive
    closed: bool,
}

impl Mirror {
    fn apply(&mut self, event: Result<Snapshot>) {
        match event {
            Ok(snapshot) => {
                self.todos = todos_from_snapshot(&snapshot, Utc::now());
                self.state = ScreenState::Ready;
                tracing::debug!(
                    collection = %snapshot.collection,
                    count = self.todos.len(),
                    "snapshot applied"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "document listener failed");
                self.state = ScreenState::Failed(CONNECT_FAILED.to_string());
                self.closed = true;
            }
        }
    }
}

const CONNECT_FAILED: &str = "Failed to connect to database";

/// Controller for the remote task screen.
#[derive(Debug)]
pub struct RemoteTodoList {
    backend: BackendHandle,
    collection: String,
    mirror: Arc<Mutex<Mirror>>,
    registration: Option<ListenerRegistration>,
}

impl RemoteTodoList {
    /// Create an inactive controller over the `todos` collection.
    pub fn new(backend: BackendHandle) -> Self {
        Self::with_collection(backend, TODOS_COLLECTION)
    }

    pub fn with_collection(backend: BackendHandle, collection: impl Into<String>) -> Self {
        Self {
            backend,
            collection: collection.into(),
            mirror: Arc::new(Mutex::new(Mirror {
                state: ScreenState::Loading,
                todos: Vec::new(),
                closed: false,
            })),
            registration: None,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn state(&self) -> ScreenState {
        self.lock().state.clone()
    }

    /// Todos from the latest snapshot, newest first.
    pub fn todos(&self) -> Vec<Todo> {
        self.lock().todos.clone()
    }

    /// Whether a live subscription is held. A channel the backend ended
    /// with an error is not live; `retry` replaces it.
    pub fn is_active(&self) -> bool {
        self.registration.is_some() && !self.lock().closed
    }

    /// Subscribe to the collection. Replaces any existing subscription.
    pub fn activate(&mut self) -> Result<()> {
        self.deactivate();
        {
            let mut mirror = self.lock();
            mirror.state = ScreenState::Loading;
            mirror.closed = false;
        }

        let backend = match self.backend.get() {
            Ok(backend) => Arc::clone(backend),
            Err(e) => {
                tracing::error!(error = %e, "no document backend");
                self.lock().state = ScreenState::Failed(e.alert().message);
                return Err(e);
            }
        };

        let mirror = Arc::clone(&self.mirror);
        let listener: SnapshotListener = Box::new(move |event| {
            mirror
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .apply(event);
        });

        match backend.subscribe(&self.collection, listener) {
            Ok(registration) => {
                tracing::info!(collection = %self.collection, "subscribed");
                self.registration = Some(registration);
                Ok(())
            }
            Err(e) => {
                tracing::error!(collection = %self.collection, error = %e, "subscribe failed");
                self.lock().state = ScreenState::Failed(CONNECT_FAILED.to_string());
                Err(e)
            }
        }
    }

    /// Release the subscription, if any.
    pub fn deactivate(&mut self) {
        if let Some(registration) = self.registration.take() {
            registration.remove();
            tracing::info!(collection = %self.collection, "unsubscribed");
        }
    }

    /// Drop the current subscription and establish a fresh one.
    pub fn retry(&mut self) -> Result<()> {
        tracing::info!(collection = %self.collection, "retrying subscription");
        self.activate()
    }

    /// Add a task. Blank text is rejected before contacting the backend.
    pub fn add(&self, text: &str) -> Result<DocumentId> {
        let task = text.trim();
        if task.is_empty() {
            return Err(Error::Validation("Please enter a task"));
        }
        let backend = self.backend()?;

        let write = DocumentWrite::new()
            .field("task", task)
            .field("completed", false)
            .server_timestamp("createdAt");

        backend
            .add_document(&self.collection, write)
            .map_err(|e| self.failed("Failed to add todo", e))
    }

    /// Delete a task by id.
    pub fn remove(&self, id: &str) -> Result<()> {
        let backend = self.backend()?;
        backend
            .delete_document(&self.collection, id)
            .map_err(|e| self.failed("Failed to delete todo", e))
    }

    /// Write the negation of `current` to the task's completion flag.
    pub fn toggle(&self, id: &str, current: bool) -> Result<()> {
        let backend = self.backend()?;
        let mut fields = Fields::new();
        fields.insert("completed".to_string(), (!current).into());
        backend
            .update_document(&self.collection, id, fields)
            .map_err(|e| self.failed("Failed to update todo", e))
    }

    fn backend(&self) -> Result<&Arc<dyn DocumentBackend>> {
        self.backend.get().inspect_err(|e| {
            tracing::error!(error = %e, "no document backend");
        })
    }

    fn failed(&self, message: &'static str, cause: Error) -> Error {
        tracing::error!(collection = %self.collection, error = %cause, "{}", message);
        Error::remote(message, cause)
    }

    fn lock(&self) -> MutexGuard<'_, Mirror> {
        self.mirror.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for RemoteTodoList {
    fn drop(&mut self) {
        self.deactivate();
    }
}
