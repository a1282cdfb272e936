//! Local record list: one collection mirrored between key-value storage
//! and the view.
//!
//! The persisted blob is positional and carries no identifiers. Every
//! in-memory entry gets a stable [`EntryId`] when it is loaded or appended,
//! and removal is keyed by that id, so a stale position can never delete
//! the wrong record.
//!
//! In-memory state only advances after the backing write succeeded. Every
//! failed write is logged and returned to the caller.

use crate::{codec, error::Result, EntryId, Error, KeyValueStore, Record};
use serde::Serialize;

/// Lifecycle of a local list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListState {
    /// Nothing read from storage yet
    Unloaded,
    /// View mirrors the persisted blob
    Loaded,
}

/// A record together with its session-stable identifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry<R> {
    pub id: EntryId,
    pub record: R,
}

impl<R> Entry<R> {
    fn new(record: R) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            record,
        }
    }
}

/// Controller for one locally persisted collection.
#[derive(Debug)]
pub struct LocalList<R, S> {
    store: S,
    state: ListState,
    entries: Vec<Entry<R>>,
}

impl<R: Record, S: KeyValueStore> LocalList<R, S> {
    /// Create an unloaded list over `store`.
    pub fn new(store: S) -> Self {
        Self {
            store,
            state: ListState::Unloaded,
            entries: Vec::new(),
        }
    }

    /// Create a list and load it immediately.
    ///
    /// Load failures are logged and leave the list empty; they do not
    /// prevent the screen from opening.
    pub fn open(store: S) -> Self {
        let mut list = Self::new(store);
        let _ = list.load();
        list
    }

    /// Storage key of the collection.
    pub fn key(&self) -> &'static str {
        R::COLLECTION
    }

    pub fn state(&self) -> ListState {
        self.state
    }

    /// Entries in display order.
    pub fn entries(&self) -> &[Entry<R>] {
        &self.entries
    }

    /// Records in display order.
    pub fn records(&self) -> Vec<R> {
        self.entries.iter().map(|e| e.record.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get an entry by id.
    pub fn get(&self, id: &str) -> Option<&Entry<R>> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read the collection's blob into the view.
    ///
    /// A missing blob yields an empty list. A decode failure is logged,
    /// leaves the list loaded and empty, and is returned. A read failure is
    /// logged, leaves the list unloaded so no write can replace data it never
    /// saw, and is returned.
    pub fn load(&mut self) -> Result<()> {
        let key = R::COLLECTION;
        self.entries.clear();

        let blob = match self.store.get(key) {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                self.state = ListState::Loaded;
                tracing::debug!(key, "no saved blob, starting empty");
                return Ok(());
            }
            Err(e) => {
                self.state = ListState::Unloaded;
                tracing::error!(key, error = %e, "failed to read collection");
                return Err(e);
            }
        };
        self.state = ListState::Loaded;

        let records: Vec<R> = codec::decode(&blob).inspect_err(|e| {
            tracing::error!(key, error = %e, "failed to decode collection");
        })?;

        self.entries = records.into_iter().map(Entry::new).collect();
        tracing::debug!(key, count = self.entries.len(), "collection loaded");
        Ok(())
    }

    /// Append a record at the end and persist the whole collection.
    ///
    /// Blank records are rejected before anything is written.
    pub fn append(&mut self, record: R) -> Result<EntryId> {
        record.validate()?;
        self.ensure_loaded()?;

        let mut records = self.records();
        records.push(record.clone());
        self.persist(&records)?;

        let entry = Entry::new(record);
        let id = entry.id.clone();
        self.entries.push(entry);
        tracing::info!(key = R::COLLECTION, id = %id, "record appended");
        Ok(id)
    }

    /// Remove the entry with `id` and persist the remaining collection.
    ///
    /// Returns the removed record.
    pub fn remove(&mut self, id: &str) -> Result<R> {
        self.ensure_loaded()?;

        let position = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| Error::EntryNotFound(id.to_string()))?;

        let records: Vec<R> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != position)
            .map(|(_, e)| e.record.clone())
            .collect();
        self.persist(&records)?;

        let removed = self.entries.remove(position);
        tracing::info!(key = R::COLLECTION, id = %id, position, "record removed");
        Ok(removed.record)
    }

    /// Remove the entry currently displayed at `position`.
    pub fn remove_at(&mut self, position: usize) -> Result<R> {
        self.ensure_loaded()?;
        let id = self
            .entries
            .get(position)
            .map(|e| e.id.clone())
            .ok_or(Error::PositionOutOfRange {
                position,
                len: self.entries.len(),
            })?;
        self.remove(&id)
    }

    fn ensure_loaded(&self) -> Result<()> {
        match self.state {
            ListState::Loaded => Ok(()),
            ListState::Unloaded => Err(Error::NotLoaded(R::COLLECTION)),
        }
    }

    fn persist(&self, records: &[R]) -> Result<()> {
        let key = R::COLLECTION;
        let blob = codec::encode(records)?;
        self.store.set(key, &blob).inspect_err(|e| {
            tracing::error!(key, error = %e, "failed to save collection");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Event, MemoryStore, Note, Task};
    use chrono::NaiveDate;

    fn notes(store: &MemoryStore) -> LocalList<Note, &MemoryStore> {
        LocalList::open(store)
    }

    #[test]
    fn load_without_blob_is_empty() {
        let store = MemoryStore::new();
        let mut list: LocalList<Note, _> = LocalList::new(&store);
        assert_eq!(list.state(), ListState::Unloaded);

        list.load().unwrap();
        assert_eq!(list.state(), ListState::Loaded);
        assert!(list.is_empty());
    }

    #[test]
    fn append_persists_then_updates_view() {
        let store = MemoryStore::new();
        let mut list = notes(&store);

        let id = list.append(Note::new("Buy milk")).unwrap();

        assert_eq!(store.blob("notes").as_deref(), Some(r#"["Buy milk"]"#));
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(&id).unwrap().record, Note::new("Buy milk"));
    }

    #[test]
    fn append_blank_is_rejected_without_write() {
        let store = MemoryStore::with_blob("notes", r#"["keep"]"#);
        let mut list = notes(&store);

        let err = list.append(Note::new("  ")).unwrap_err();
        assert_eq!(err, Error::Validation("Please enter a note."));
        assert_eq!(store.blob("notes").as_deref(), Some(r#"["keep"]"#));
        assert_eq!(list.records(), vec![Note::new("keep")]);
    }

    #[test]
    fn append_write_failure_leaves_view_unchanged() {
        let store = MemoryStore::new();
        let mut list = notes(&store);
        list.append(Note::new("first")).unwrap();

        store.fail_writes(true);
        let err = list.append(Note::new("second")).unwrap_err();
        assert!(matches!(err, Error::Storage { .. }));
        assert_eq!(list.records(), vec![Note::new("first")]);
        assert_eq!(store.blob("notes").as_deref(), Some(r#"["first"]"#));
    }

    #[test]
    fn remove_by_id_keeps_order() {
        let store = MemoryStore::new();
        let mut list = notes(&store);
        list.append(Note::new("a")).unwrap();
        let b = list.append(Note::new("b")).unwrap();
        list.append(Note::new("c")).unwrap();

        let removed = list.remove(&b).unwrap();
        assert_eq!(removed, Note::new("b"));
        assert_eq!(list.records(), vec![Note::new("a"), Note::new("c")]);
        assert_eq!(store.blob("notes").as_deref(), Some(r#"["a","c"]"#));
    }

    #[test]
    fn remove_write_failure_leaves_view_unchanged() {
        let store = MemoryStore::new();
        let mut list = notes(&store);
        let a = list.append(Note::new("a")).unwrap();

        store.fail_writes(true);
        assert!(list.remove(&a).is_err());
        assert_eq!(list.len(), 1);
        assert_eq!(store.blob("notes").as_deref(), Some(r#"["a"]"#));
    }

    #[test]
    fn stale_id_cannot_remove_another_record() {
        let store = MemoryStore::new();
        let mut list = notes(&store);
        let a = list.append(Note::new("a")).unwrap();
        list.append(Note::new("b")).unwrap();

        list.remove(&a).unwrap();
        assert_eq!(list.remove(&a), Err(Error::EntryNotFound(a.clone())));
        assert_eq!(list.records(), vec![Note::new("b")]);
    }

    #[test]
    fn remove_at_position() {
        let store = MemoryStore::new();
        let mut list = notes(&store);
        for text in ["a", "b", "c"] {
            list.append(Note::new(text)).unwrap();
        }

        assert_eq!(list.remove_at(0).unwrap(), Note::new("a"));
        assert_eq!(
            list.remove_at(5),
            Err(Error::PositionOutOfRange {
                position: 5,
                len: 2
            })
        );
        assert_eq!(store.blob("notes").as_deref(), Some(r#"["b","c"]"#));
    }

    #[test]
    fn mutations_require_load() {
        let store = MemoryStore::with_blob("notes", r#"["persisted"]"#);
        let mut list: LocalList<Note, _> = LocalList::new(&store);

        assert_eq!(
            list.append(Note::new("x")),
            Err(Error::NotLoaded("notes"))
        );
        assert_eq!(list.remove_at(0), Err(Error::NotLoaded("notes")));
        assert_eq!(store.blob("notes").as_deref(), Some(r#"["persisted"]"#));
    }

    #[test]
    fn corrupt_blob_loads_empty_and_reports() {
        let store = MemoryStore::with_blob("events", "not json");
        let mut list: LocalList<Event, _> = LocalList::new(&store);

        let err = list.load().unwrap_err();
        assert!(matches!(err, Error::CorruptBlob { .. }));
        assert_eq!(list.state(), ListState::Loaded);
        assert!(list.is_empty());
    }

    #[test]
    fn read_failure_is_reported() {
        let store = MemoryStore::new();
        store.fail_reads(true);
        let mut list: LocalList<Task, _> = LocalList::new(&store);

        assert!(matches!(list.load(), Err(Error::Storage { .. })));
        assert!(list.is_empty());
        assert_eq!(list.state(), ListState::Unloaded);
    }

    #[test]
    fn read_failure_blocks_writes_over_unseen_data() {
        let store = MemoryStore::with_blob("notes", r#"["a","b","c"]"#);
        store.fail_reads(true);
        let mut list: LocalList<Note, _> = LocalList::open(&store);
        assert_eq!(list.state(), ListState::Unloaded);

        store.fail_reads(false);
        assert_eq!(
            list.append(Note::new("new")),
            Err(Error::NotLoaded("notes"))
        );
        assert!(matches!(list.remove_at(0), Err(Error::NotLoaded(_))));
        assert_eq!(store.blob("notes").as_deref(), Some(r#"["a","b","c"]"#));

        list.load().unwrap();
        list.append(Note::new("new")).unwrap();
        assert_eq!(
            store.blob("notes").as_deref(),
            Some(r#"["a","b","c","new"]"#)
        );
    }

    #[test]
    fn failed_reload_drops_back_to_unloaded() {
        let store = MemoryStore::new();
        let mut list = notes(&store);
        list.append(Note::new("kept")).unwrap();

        store.fail_reads(true);
        assert!(list.load().is_err());
        assert!(matches!(list.append(Note::new("x")), Err(Error::NotLoaded(_))));
        assert_eq!(store.blob("notes").as_deref(), Some(r#"["kept"]"#));
    }

    #[test]
    fn appended_task_matches_its_reload() {
        let store = MemoryStore::new();
        let mut list: LocalList<Task, _> = LocalList::open(&store);
        let precise = NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(14, 30, 45)
            .unwrap();
        list.append(Task::new("Pay rent", precise)).unwrap();

        let reloaded: LocalList<Task, _> = LocalList::open(&store);
        assert_eq!(reloaded.records(), list.records());
    }

    #[test]
    fn reload_reassigns_ids_but_keeps_records() {
        let store = MemoryStore::new();
        let mut list = notes(&store);
        let id = list.append(Note::new("a")).unwrap();

        list.load().unwrap();
        assert_eq!(list.records(), vec![Note::new("a")]);
        assert!(list.get(&id).is_none());
    }

    #[test]
    fn event_scenario() {
        let store = MemoryStore::new();
        let mut list: LocalList<Event, _> = LocalList::open(&store);

        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        list.append(Event::new(date, "Dentist")).unwrap();

        assert_eq!(
            store.blob("events").as_deref(),
            Some(r#"[{"date":"2024-03-10","description":"Dentist"}]"#)
        );
    }
}
