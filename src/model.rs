use crate::db::schema::{directories, file_events, files};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use std::fmt;
use std::str::FromStr;

/// A storage prefix holding one archive batch (usually one month).
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = directories)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Directory {
    pub id: i32,
    pub path: String,
    pub scanned_dt: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = directories)]
pub struct NewDirectory {
    pub path: String,
}
pub const NEW_DIRECTORY_FIELD_COUNT: usize = 1;

/// One archive entry discovered under a [`Directory`].
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = files)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct File {
    pub id: i32,
    pub archive_filename: String,
    pub xml_filename: Option<String>,
    pub parent_directory: i32,
    pub status: String,
}

impl File {
    /// Parsed lifecycle status. Unknown values (e.g. a manual reset to a
    /// custom marker) are reported as `None` and treated as pending.
    pub fn file_status(&self) -> Option<FileStatus> {
        self.status.parse().ok()
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = files)]
pub struct NewFile {
    pub archive_filename: String,
    pub parent_directory: i32,
    pub status: String,
}
pub const NEW_FILE_FIELD_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = file_events)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct FileEvent {
    pub id: i32,
    pub file_id: i32,
    pub event_type: String,
    pub event_dt: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = file_events)]
pub struct NewFileEvent {
    pub file_id: i32,
    pub event_type: String,
    pub event_dt: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileStatus {
    Discovered,
    Downloaded,
    Error,
}

impl FileStatus {
    /// Statuses with no outgoing transition.
    pub const TERMINAL: [FileStatus; 2] = [FileStatus::Downloaded, FileStatus::Error];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Discovered => "discovered",
            FileStatus::Downloaded => "downloaded",
            FileStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discovered" => Ok(FileStatus::Discovered),
            "downloaded" => Ok(FileStatus::Downloaded),
            "error" => Ok(FileStatus::Error),
            other => Err(format!("unknown file status: {}", other)),
        }
    }
}

/// Result of one file's trip through the batch processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Downloaded { xml_filename: String },
    Error,
}

impl Outcome {
    pub fn status(&self) -> FileStatus {
        match self {
            Outcome::Downloaded { .. } => FileStatus::Downloaded,
            Outcome::Error => FileStatus::Error,
        }
    }

    /// Event types mirror the terminal status they record.
    pub fn event_type(&self) -> &'static str {
        self.status().as_str()
    }
}
