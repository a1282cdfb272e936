//! FFI layer for the mobile shell.
//!
//! This module provides C-compatible functions the calendar, notes and task
//! screens call into. All data crosses the boundary as JSON strings.
//!
//! # Memory Management
//!
//! - Strings returned by `daybook_*` functions are allocated by Rust
//! - Caller must free them with `daybook_string_free`
//! - List handles must be freed with `daybook_list_free`
//!
//! # Task Screen
//!
//! `"todos"` lists follow the `taskBackend` setting. A remote list uses the
//! backend registered with [`install_document_backend`]; the `daybook_task_*`
//! functions (toggle, retry, state) only accept task handles.
//!
//! # Error Handling
//!
//! Functions return JSON with either:
//! - `{"ok": <result>}` on success
//! - `{"error": "<message>", "alert": {"title": .., "message": ..}}` on failure;
//!   the alert is what the screen shows

use crate::record::minute_format;
use crate::{
    Alert, AppConfig, BackendHandle, EntryId, Event, FileStore, LocalList, Note, Record, TaskList,
};
use chrono::NaiveDateTime;
use std::ffi::{c_char, CStr, CString};
use std::ptr;
use std::sync::{Mutex, PoisonError};

/// Result wrapper for FFI responses.
#[derive(serde::Serialize)]
#[serde(untagged)]
enum FfiResult<T: serde::Serialize> {
    Ok {
        ok: T,
    },
    Err {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        alert: Option<Alert>,
    },
}

impl<T: serde::Serialize> FfiResult<T> {
    fn ok(value: T) -> Self {
        FfiResult::Ok { ok: value }
    }

    fn err(message: impl Into<String>) -> Self {
        FfiResult::Err {
            error: message.into(),
            alert: None,
        }
    }

    fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization failed: {}"}}"#, e))
    }
}

impl<T: serde::Serialize> From<crate::Result<T>> for FfiResult<T> {
    fn from(result: crate::Result<T>) -> Self {
        match result {
            Ok(value) => FfiResult::ok(value),
            Err(e) => FfiResult::Err {
                error: e.to_string(),
                alert: Some(e.alert()),
            },
        }
    }
}

/// Convert a Rust string to a C string pointer.
/// Caller must free with `daybook_string_free`.
fn to_c_string(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => c"{\"error\":\"string contained null bytes\"}".to_owned().into_raw(),
    }
}

/// Convert a C string pointer to a Rust string.
/// Returns None if pointer is null or invalid UTF-8.
unsafe fn from_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Document backend used by task lists opened with `"taskBackend": "remote"`.
static DOCUMENT_BACKEND: Mutex<Option<BackendHandle>> = Mutex::new(None);

/// Install the hosted document client for remote task lists.
///
/// The host application calls this once at startup, before opening a
/// remote task list. Lists opened earlier keep the backend they saw.
pub fn install_document_backend(backend: BackendHandle) {
    tracing::info!(backend = ?backend, "document backend installed");
    *DOCUMENT_BACKEND
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = Some(backend);
}

fn document_backend() -> BackendHandle {
    DOCUMENT_BACKEND
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .unwrap_or_else(|| BackendHandle::Unavailable("no document backend installed".into()))
}

/// The list behind one screen.
pub enum ListHandle {
    Events(LocalList<Event, FileStore>),
    Notes(LocalList<Note, FileStore>),
    Tasks(TaskList<FileStore>),
}

/// Task input from the shell. Remote tasks ignore the deadline.
#[derive(serde::Deserialize)]
struct TaskInput {
    task: String,
    #[serde(default)]
    deadline: Option<String>,
}

impl ListHandle {
    fn new(kind: &str, config: &AppConfig, store: FileStore) -> Option<Self> {
        match kind {
            "events" => Some(ListHandle::Events(LocalList::open(store))),
            "notes" => Some(ListHandle::Notes(LocalList::open(store))),
            "todos" | "tasks" => Some(ListHandle::Tasks(TaskList::from_config(
                config,
                store,
                document_backend(),
            ))),
            _ => None,
        }
    }

    fn load(&mut self) -> String {
        let result = match self {
            ListHandle::Events(list) => list.load(),
            ListHandle::Notes(list) => list.load(),
            ListHandle::Tasks(tasks) => tasks.retry(),
        };
        FfiResult::from(result).to_json()
    }

    fn entries(&self) -> String {
        match self {
            ListHandle::Events(list) => FfiResult::ok(list.entries()).to_json(),
            ListHandle::Notes(list) => FfiResult::ok(list.entries()).to_json(),
            ListHandle::Tasks(tasks) => FfiResult::ok(tasks.items()).to_json(),
        }
    }

    fn append(&mut self, record_json: &str) -> String {
        match self {
            ListHandle::Events(list) => append_json(list, record_json),
            ListHandle::Notes(list) => append_json(list, record_json),
            ListHandle::Tasks(tasks) => append_task_json(tasks, record_json),
        }
    }

    fn remove(&mut self, id: &str) -> String {
        let result = match self {
            ListHandle::Events(list) => list.remove(id).map(|_| ()),
            ListHandle::Notes(list) => list.remove(id).map(|_| ()),
            ListHandle::Tasks(tasks) => tasks.remove(id),
        };
        FfiResult::from(result).to_json()
    }

    fn remove_at(&mut self, position: usize) -> String {
        let result = match self {
            ListHandle::Events(list) => list.remove_at(position).map(|_| ()),
            ListHandle::Notes(list) => list.remove_at(position).map(|_| ()),
            ListHandle::Tasks(tasks) => tasks.remove_at(position),
        };
        FfiResult::from(result).to_json()
    }

    fn tasks(&mut self) -> Option<&mut TaskList<FileStore>> {
        match self {
            ListHandle::Tasks(tasks) => Some(tasks),
            _ => None,
        }
    }
}

fn append_json<R: Record>(list: &mut LocalList<R, FileStore>, record_json: &str) -> String {
    let record: R = match serde_json::from_str(record_json) {
        Ok(r) => r,
        Err(e) => return FfiResult::<()>::err(format!("parse error: {}", e)).to_json(),
    };
    let result: crate::Result<EntryId> = list.append(record);
    FfiResult::from(result).to_json()
}

fn append_task_json(tasks: &mut TaskList<FileStore>, record_json: &str) -> String {
    let input: TaskInput = match serde_json::from_str(record_json) {
        Ok(input) => input,
        Err(e) => return FfiResult::<()>::err(format!("parse error: {}", e)).to_json(),
    };
    let deadline = match input.deadline.as_deref().map(|raw| {
        NaiveDateTime::parse_from_str(raw, minute_format::FORMAT)
    }) {
        Some(Ok(deadline)) => Some(deadline),
        Some(Err(e)) => return FfiResult::<()>::err(format!("parse error: {}", e)).to_json(),
        None => None,
    };
    FfiResult::from(tasks.add(&input.task, deadline)).to_json()
}

/// Run `op` on a task handle, or report that the handle is not one.
unsafe fn with_tasks(
    handle: *mut ListHandle,
    op: impl FnOnce(&mut TaskList<FileStore>) -> String,
) -> *mut c_char {
    let json = match handle.as_mut() {
        Some(h) => match h.tasks() {
            Some(tasks) => op(tasks),
            None => FfiResult::<()>::err("not a task list").to_json(),
        },
        None => FfiResult::<()>::err("null list handle").to_json(),
    };
    to_c_string(json)
}

// ============================================================================
// List Lifecycle
// ============================================================================

/// Open the list for one screen and load it.
///
/// # Arguments
/// - `kind`: `"events"`, `"notes"` or `"todos"`
/// - `config_json`: JSON string of AppConfig. For `"todos"`, `taskBackend`
///   picks local storage or the installed document backend.
///
/// # Returns
/// Pointer to ListHandle, or null on failure. A list that fails to load
/// still yields a handle; call `daybook_list_load` or
/// `daybook_task_state` to see the error. A remote task list without an
/// installed backend answers every call with a "Database not available"
/// error and never falls back to local storage.
///
/// # Safety
/// - `kind` and `config_json` must be valid null-terminated C strings or null
/// - Caller must free the returned pointer with `daybook_list_free`
#[no_mangle]
pub unsafe extern "C" fn daybook_list_open(
    kind: *const c_char,
    config_json: *const c_char,
) -> *mut ListHandle {
    let kind = match from_c_string(kind) {
        Some(k) => k,
        None => return ptr::null_mut(),
    };

    let config = match from_c_string(config_json).map(|json| AppConfig::from_json(&json)) {
        Some(Ok(config)) => config,
        Some(Err(e)) => {
            tracing::error!(error = %e, "invalid config");
            return ptr::null_mut();
        }
        None => return ptr::null_mut(),
    };

    let store = match config.open_store() {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "failed to open storage");
            return ptr::null_mut();
        }
    };

    match ListHandle::new(&kind, &config, store) {
        Some(handle) => Box::into_raw(Box::new(handle)),
        None => {
            tracing::error!(kind = %kind, "unknown list kind");
            ptr::null_mut()
        }
    }
}

/// Free a list handle.
///
/// # Safety
/// - `handle` must be a valid pointer from `daybook_list_open`
/// - Must not be called twice on the same pointer
#[no_mangle]
pub unsafe extern "C" fn daybook_list_free(handle: *mut ListHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Free a string allocated by the engine.
///
/// # Safety
/// - `s` must be a valid pointer from a `daybook_*` function
/// - Must not be called twice on the same pointer
#[no_mangle]
pub unsafe extern "C" fn daybook_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

// ============================================================================
// List Operations
// ============================================================================

/// Reload the list from storage. On a task list this is the retry action:
/// a remote list subscribes again.
///
/// # Returns
/// JSON string: `{"ok": null}` or `{"error": .., "alert": ..}`
///
/// # Safety
/// - `handle` must be a valid pointer from `daybook_list_open` or null
/// - Caller must free the returned string with `daybook_string_free`
#[no_mangle]
pub unsafe extern "C" fn daybook_list_load(handle: *mut ListHandle) -> *mut c_char {
    match handle.as_mut() {
        Some(h) => to_c_string(h.load()),
        None => to_c_string(FfiResult::<()>::err("null list handle").to_json()),
    }
}

/// Get all entries in display order.
///
/// # Returns
/// JSON string: `{"ok": [{"id": .., "record": ..}, ..]}`
///
/// # Safety
/// - `handle` must be a valid pointer from `daybook_list_open` or null
/// - Caller must free the returned string with `daybook_string_free`
#[no_mangle]
pub unsafe extern "C" fn daybook_list_entries(handle: *const ListHandle) -> *mut c_char {
    match handle.as_ref() {
        Some(h) => to_c_string(h.entries()),
        None => to_c_string(FfiResult::<()>::err("null list handle").to_json()),
    }
}

/// Append a record.
///
/// # Arguments
/// - `record_json`: the record as stored, e.g. `"Buy milk"` for notes or
///   `{"date":"2024-03-10","description":"Dentist"}` for events
///
/// # Returns
/// JSON string: `{"ok": "<entry id>"}` or `{"error": .., "alert": ..}`
///
/// # Safety
/// - `handle` must be a valid pointer from `daybook_list_open` or null
/// - `record_json` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `daybook_string_free`
#[no_mangle]
pub unsafe extern "C" fn daybook_list_append(
    handle: *mut ListHandle,
    record_json: *const c_char,
) -> *mut c_char {
    let handle = match handle.as_mut() {
        Some(h) => h,
        None => return to_c_string(FfiResult::<()>::err("null list handle").to_json()),
    };

    match from_c_string(record_json) {
        Some(json) => to_c_string(handle.append(&json)),
        None => to_c_string(FfiResult::<()>::err("invalid record JSON").to_json()),
    }
}

/// Remove an entry by id.
///
/// # Safety
/// - `handle` must be a valid pointer from `daybook_list_open` or null
/// - `entry_id` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `daybook_string_free`
#[no_mangle]
pub unsafe extern "C" fn daybook_list_remove(
    handle: *mut ListHandle,
    entry_id: *const c_char,
) -> *mut c_char {
    let handle = match handle.as_mut() {
        Some(h) => h,
        None => return to_c_string(FfiResult::<()>::err("null list handle").to_json()),
    };

    match from_c_string(entry_id) {
        Some(id) => to_c_string(handle.remove(&id)),
        None => to_c_string(FfiResult::<()>::err("invalid entry id").to_json()),
    }
}

/// Remove the entry currently displayed at `position`.
///
/// # Safety
/// - `handle` must be a valid pointer from `daybook_list_open` or null
/// - Caller must free the returned string with `daybook_string_free`
#[no_mangle]
pub unsafe extern "C" fn daybook_list_remove_at(
    handle: *mut ListHandle,
    position: u64,
) -> *mut c_char {
    let handle = match handle.as_mut() {
        Some(h) => h,
        None => return to_c_string(FfiResult::<()>::err("null list handle").to_json()),
    };

    let position = usize::try_from(position).unwrap_or(usize::MAX);
    to_c_string(handle.remove_at(position))
}

// ============================================================================
// Task Screen
// ============================================================================

/// Flip a task's completion flag.
///
/// # Returns
/// JSON string: `{"ok": null}` or `{"error": .., "alert": ..}`. Local tasks
/// have no completion flag and always return an error.
///
/// # Safety
/// - `handle` must be a valid pointer from `daybook_list_open` or null
/// - `task_id` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `daybook_string_free`
#[no_mangle]
pub unsafe extern "C" fn daybook_task_toggle(
    handle: *mut ListHandle,
    task_id: *const c_char,
) -> *mut c_char {
    let id = match from_c_string(task_id) {
        Some(id) => id,
        None => return to_c_string(FfiResult::<()>::err("invalid task id").to_json()),
    };
    with_tasks(handle, |tasks| FfiResult::from(tasks.toggle(&id)).to_json())
}

/// Retry after a failure: reload local tasks or re-subscribe remote ones.
///
/// # Safety
/// - `handle` must be a valid pointer from `daybook_list_open` or null
/// - Caller must free the returned string with `daybook_string_free`
#[no_mangle]
pub unsafe extern "C" fn daybook_task_retry(handle: *mut ListHandle) -> *mut c_char {
    with_tasks(handle, |tasks| FfiResult::from(tasks.retry()).to_json())
}

/// What the task screen should show.
///
/// # Returns
/// JSON string: `{"ok": {"status": "loading" | "ready"}}` or
/// `{"ok": {"status": "failed", "message": ..}}`
///
/// # Safety
/// - `handle` must be a valid pointer from `daybook_list_open` or null
/// - Caller must free the returned string with `daybook_string_free`
#[no_mangle]
pub unsafe extern "C" fn daybook_task_state(handle: *mut ListHandle) -> *mut c_char {
    with_tasks(handle, |tasks| FfiResult::ok(tasks.state()).to_json())
}

// ============================================================================
// Utility
// ============================================================================

/// Install a stderr log subscriber with an `EnvFilter` directive string,
/// e.g. `"daybook_engine=debug"`. Only the first call takes effect.
///
/// # Returns
/// `true` if this call installed the subscriber.
///
/// # Safety
/// - `filter` must be a valid null-terminated C string or null
#[no_mangle]
pub unsafe extern "C" fn daybook_init_logging(filter: *const c_char) -> bool {
    let directives = from_c_string(filter).unwrap_or_else(|| "daybook_engine=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(directives))
        .try_init()
        .is_ok()
}

/// Get the engine version.
#[no_mangle]
pub extern "C" fn daybook_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
