//! # Daybook Engine
//!
//! Record list controllers behind the Daybook calendar, notes and task
//! screens.
//!
//! Every screen owns one named collection and follows the same pattern:
//! load the collection into the view, append a record, remove a record,
//! persist. The engine holds that pattern once and the screens only render.
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`Record`] is one user-entered item with a required text field:
//! - [`Event`] - a calendar day and a description (key `events`)
//! - [`Note`] - a free-text string (key `notes`)
//! - [`Task`] - a task and a deadline (key `todos`)
//!
//! ### Local lists
//!
//! [`LocalList`] mirrors one collection stored as a single JSON blob in a
//! [`KeyValueStore`]. Entries get a stable [`EntryId`] in memory so removal
//! never depends on a possibly stale position. The view only changes after
//! the write that backs it succeeded.
//!
//! ### Remote lists
//!
//! [`RemoteTodoList`] mirrors a collection in a hosted document database
//! through a [`DocumentBackend`]. It subscribes for full snapshots and
//! never patches its view by hand. The subscription is released when the
//! controller is deactivated or dropped.
//!
//! ### Task list
//!
//! [`TaskList`] puts both task variants behind one interface, selected by
//! [`AppConfig::task_backend`].
//!
//! ## Quick Start
//!
//! ```rust
//! use daybook_engine::{LocalList, MemoryStore, Note};
//!
//! let store = MemoryStore::new();
//! let mut notes: LocalList<Note, _> = LocalList::open(&store);
//!
//! let id = notes.append(Note::new("Buy milk")).unwrap();
//! assert_eq!(store.blob("notes").as_deref(), Some(r#"["Buy milk"]"#));
//!
//! notes.remove(&id).unwrap();
//! assert!(notes.is_empty());
//! ```
//!
//! ## FFI
//!
//! The [`ffi`] module provides C-compatible functions for the mobile shell.
//! All data is exchanged as JSON strings.

pub mod codec;
pub mod config;
pub mod document;
pub mod error;
pub mod ffi;
pub mod local;
pub mod memory;
pub mod record;
pub mod remote;
pub mod storage;
pub mod task_list;

// Re-export main types at crate root
pub use config::{AppConfig, ConfigError, TaskBackendKind};
pub use document::{Document, DocumentWrite, Fields, Snapshot};
pub use error::{Alert, Error, Result};
pub use local::{Entry, ListState, LocalList};
pub use memory::MemoryDocumentBackend;
pub use record::{Event, Note, Record, Task};
pub use remote::{
    BackendHandle, DocumentBackend, ListenerRegistration, RemoteTodoList, ScreenState,
    SnapshotListener, Todo, TODOS_COLLECTION,
};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use task_list::{TaskItem, TaskList};

/// Type aliases for clarity
pub type EntryId = String;
pub type DocumentId = String;
pub type CollectionName = String;
/// Milliseconds since the Unix epoch
pub type Timestamp = i64;
