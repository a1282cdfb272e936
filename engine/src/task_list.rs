//! Task screen over either backend.
//!
//! The local variant keeps `(task, deadline)` records in key-value storage;
//! the remote variant mirrors `(task, completed, createdAt)` documents. Both
//! sit behind [`TaskList`] and the configured [`TaskBackendKind`] picks one.

use crate::{
    error::Result, record::minute_format, AppConfig, BackendHandle, Error, KeyValueStore,
    ListState, LocalList, RemoteTodoList, ScreenState, Task, TaskBackendKind,
};
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::Serialize;

/// One row of the task screen, whichever backend produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskItem {
    pub id: String,
    pub task: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<NaiveDateTime>,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// The task screen's controller.
#[derive(Debug)]
pub enum TaskList<S> {
    Local(LocalList<Task, S>),
    Remote(RemoteTodoList),
}

impl<S: KeyValueStore> TaskList<S> {
    /// Build and activate the variant selected by `config`.
    ///
    /// Activation failures are logged and reflected in the controller's
    /// state; the screen still opens.
    pub fn from_config(config: &AppConfig, store: S, remote: BackendHandle) -> Self {
        tracing::info!(backend = ?config.task_backend, "opening task list");
        match config.task_backend {
            TaskBackendKind::Local => TaskList::Local(LocalList::open(store)),
            TaskBackendKind::Remote => {
                let mut list = RemoteTodoList::new(remote);
                let _ = list.activate();
                TaskList::Remote(list)
            }
        }
    }

    pub fn kind(&self) -> TaskBackendKind {
        match self {
            TaskList::Local(_) => TaskBackendKind::Local,
            TaskList::Remote(_) => TaskBackendKind::Remote,
        }
    }

    /// What the screen shows. A local list is ready once loaded.
    pub fn state(&self) -> ScreenState {
        match self {
            TaskList::Local(list) => match list.state() {
                ListState::Unloaded => ScreenState::Loading,
                ListState::Loaded => ScreenState::Ready,
            },
            TaskList::Remote(list) => list.state(),
        }
    }

    /// Reload the local collection, or re-subscribe the remote one.
    pub fn retry(&mut self) -> Result<()> {
        match self {
            TaskList::Local(list) => list.load(),
            TaskList::Remote(list) => list.retry(),
        }
    }

    /// Rows in display order.
    pub fn items(&self) -> Vec<TaskItem> {
        match self {
            TaskList::Local(list) => list
                .entries()
                .iter()
                .map(|entry| TaskItem {
                    id: entry.id.clone(),
                    task: entry.record.task().to_string(),
                    deadline: Some(entry.record.deadline()),
                    completed: false,
                    created_at: None,
                })
                .collect(),
            TaskList::Remote(list) => list
                .todos()
                .into_iter()
                .map(|todo| TaskItem {
                    id: todo.id,
                    task: todo.task,
                    deadline: None,
                    completed: todo.completed,
                    created_at: Some(todo.created_at),
                })
                .collect(),
        }
    }

    /// Add a task. A missing deadline defaults to the current minute; the
    /// remote variant has no deadline field and ignores it.
    pub fn add(&mut self, text: &str, deadline: Option<NaiveDateTime>) -> Result<String> {
        match self {
            TaskList::Local(list) => {
                let deadline = deadline.unwrap_or_else(current_minute);
                list.append(Task::new(text, deadline))
            }
            TaskList::Remote(list) => {
                if deadline.is_some() {
                    tracing::debug!("remote tasks carry no deadline, ignoring it");
                }
                list.add(text)
            }
        }
    }

    pub fn remove(&mut self, id: &str) -> Result<()> {
        match self {
            TaskList::Local(list) => list.remove(id).map(|_| ()),
            TaskList::Remote(list) => list.remove(id),
        }
    }

    /// Remove the row currently displayed at `position`.
    pub fn remove_at(&mut self, position: usize) -> Result<()> {
        if let TaskList::Local(list) = self {
            return list.remove_at(position).map(|_| ());
        }

        let items = self.items();
        let id = items
            .get(position)
            .map(|item| item.id.clone())
            .ok_or(Error::PositionOutOfRange {
                position,
                len: items.len(),
            })?;
        self.remove(&id)
    }

    /// Flip a task's completion flag. Local tasks have none.
    pub fn toggle(&mut self, id: &str) -> Result<()> {
        match self {
            TaskList::Local(_) => Err(Error::Unsupported("local tasks have no completion flag")),
            TaskList::Remote(list) => {
                let current = list
                    .todos()
                    .into_iter()
                    .find(|todo| todo.id == id)
                    .map(|todo| todo.completed)
                    .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;
                list.toggle(id, current)
            }
        }
    }
}

fn current_minute() -> NaiveDateTime {
    minute_format::truncate(Local::now().naive_local())
}
