//! Record types kept by the screens.
//!
//! Each record type owns one named collection in local storage. Field names
//! and date formats are part of the persisted blob, so they must not change.

use crate::{error::Result, Error};
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// A record that lives in a local record list.
pub trait Record: Serialize + DeserializeOwned + Clone + PartialEq + std::fmt::Debug {
    /// Storage key of the collection this record belongs to.
    const COLLECTION: &'static str;

    /// The text field that must not be blank.
    fn required_text(&self) -> &str;

    /// Message shown when the required text is blank.
    fn validation_message() -> &'static str;

    /// Reject records whose required text is empty or whitespace-only.
    fn validate(&self) -> Result<()> {
        if self.required_text().trim().is_empty() {
            return Err(Error::Validation(Self::validation_message()));
        }
        Ok(())
    }
}

/// A calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Calendar day, stored as `YYYY-MM-DD`
    pub date: NaiveDate,
    pub description: String,
}

impl Event {
    pub fn new(date: NaiveDate, description: impl Into<String>) -> Self {
        Self {
            date,
            description: description.into(),
        }
    }
}

impl Record for Event {
    const COLLECTION: &'static str = "events";

    fn required_text(&self) -> &str {
        &self.description
    }

    fn validation_message() -> &'static str {
        "Please enter an event description."
    }
}

/// A free-text note, stored as a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Note(pub String);

impl Note {
    pub fn new(text: impl Into<String>) -> Self {
        Note(text.into())
    }

    pub fn text(&self) -> &str {
        &self.0
    }
}

impl Record for Note {
    const COLLECTION: &'static str = "notes";

    fn required_text(&self) -> &str {
        &self.0
    }

    fn validation_message() -> &'static str {
        "Please enter a note."
    }
}

/// A task with a deadline, kept in local storage.
///
/// The deadline is held at minute precision, the same as the stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    task: String,
    /// Deadline, stored as `YYYY-MM-DD HH:MM`
    #[serde(with = "minute_format")]
    deadline: NaiveDateTime,
}

impl Task {
    /// Seconds and sub-seconds of `deadline` are dropped.
    pub fn new(task: impl Into<String>, deadline: NaiveDateTime) -> Self {
        Self {
            task: task.into(),
            deadline: minute_format::truncate(deadline),
        }
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn deadline(&self) -> NaiveDateTime {
        self.deadline
    }
}

impl Record for Task {
    const COLLECTION: &'static str = "todos";

    fn required_text(&self) -> &str {
        &self.task
    }

    fn validation_message() -> &'static str {
        "Please enter a task."
    }
}

/// Date+time at minute precision: `YYYY-MM-DD HH:MM`.
pub mod minute_format {
    use super::Timelike;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M";

    /// Drop everything below the minute.
    pub fn truncate(value: NaiveDateTime) -> NaiveDateTime {
        value
            .with_second(0)
            .and_then(|v| v.with_nanosecond(0))
            .unwrap_or(value)
    }

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&value.format(FORMAT))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}
