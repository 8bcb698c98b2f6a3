#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! The execution log: an append-only JSON Lines file of [`LogEntry`]
//! records, one per grading event.

/// Environment snapshots.
pub mod shelf;

use std::{
    collections::HashSet,
    fs::{self, OpenOptions},
    io::Write,
    path::Path,
};

use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
pub use shelf::{AdmissionFilter, Shelf, ShelfValue, ShelvedBinding, shelve, unshelve};

use crate::{error::GradingError, grade::TestFile};

/// Kinds of logged events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Start of a grading session.
    Init,
    /// A question was checked.
    Check,
    /// An export started.
    BeginExport,
    /// An export finished.
    EndExport,
    /// Checking every question started.
    BeginCheckAll,
    /// Checking every question finished.
    EndCheckAll,
    /// Authentication with a remote service.
    Auth,
    /// Rendering to another document format.
    ToExternalFormat,
}

/// One logged event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(on(String, into))]
pub struct LogEntry {
    /// What happened.
    pub event_type:  EventType,
    /// When it happened.
    #[builder(default = Utc::now())]
    pub timestamp:   DateTime<Utc>,
    /// Question the event concerns.
    #[serde(default)]
    pub question:    Option<String>,
    /// Whether the event completed successfully.
    #[builder(default = true)]
    pub success:     bool,
    /// Error detail for unsuccessful events.
    #[serde(default)]
    pub error:       Option<String>,
    /// Serialized environment snapshot.
    #[serde(default)]
    pub shelf:       Option<String>,
    /// Bindings left out of the snapshot.
    #[builder(default)]
    #[serde(default)]
    pub not_shelved: Vec<String>,
    /// The question's results at the time of the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results:     Option<TestFile>,
}

impl LogEntry {
    /// An entry with no question or payload.
    pub fn event(event_type: EventType) -> Self {
        LogEntry::builder().event_type(event_type).build()
    }

    /// Appends this entry to the log at `path`, creating it if needed.
    pub fn flush_to_file(&self, path: &Path) -> Result<(), GradingError> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", serde_json::to_string(self)?)?;
        Ok(())
    }

    /// Returns true if this entry records a check of `question`.
    fn is_check_of(&self, question: &str) -> bool {
        self.event_type == EventType::Check && self.question.as_deref() == Some(question)
    }
}

/// An ordered collection of log entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Log {
    /// Entries in the order they were written.
    entries: Vec<LogEntry>,
}

impl Log {
    /// Wraps entries that are already in order.
    pub fn new(entries: Vec<LogEntry>) -> Self {
        Self { entries }
    }

    /// Reads a log file. Blank lines are ignored.
    pub fn from_file(path: &Path) -> Result<Self, GradingError> {
        let text = fs::read_to_string(path)?;
        let entries = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<Vec<LogEntry>, _>>()?;
        Ok(Self::new(entries))
    }

    /// Entries in write order.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Every question with at least one check entry, sorted and unique.
    pub fn get_questions(&self) -> Vec<String> {
        let mut questions: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.event_type == EventType::Check)
            .filter_map(|entry| entry.question.clone())
            .collect();
        questions.sort();
        questions.dedup();
        questions
    }

    /// The most recent check entry for `question`.
    pub fn get_question_entry(&self, question: &str) -> Result<&LogEntry, GradingError> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.is_check_of(question))
            .ok_or_else(|| GradingError::QuestionNotFound(question.to_string()))
    }

    /// The most recent check entry of each question, newest first.
    pub fn question_iterator(&self) -> impl Iterator<Item = &LogEntry> {
        let mut seen = HashSet::new();
        self.entries.iter().rev().filter(move |entry| {
            entry.event_type == EventType::Check
                && entry
                    .question
                    .as_deref()
                    .is_some_and(|question| seen.insert(question.to_string()))
        })
    }

    /// Returns true if some check entry of `question` still carries a shelf.
    pub fn has_shelf_for(&self, question: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.is_check_of(question) && entry.shelf.is_some())
    }

    /// Appends `entry` to the log at `path`, first clearing the shelf of every
    /// earlier check entry for the same question. The whole file is rewritten
    /// through a temporary file in the same directory and renamed into
    /// place. Callers must hold exclusive access to the log.
    pub fn reshelve(path: &Path, entry: LogEntry) -> Result<(), GradingError> {
        let mut log = if path.exists() {
            Log::from_file(path)?
        } else {
            Log::default()
        };

        if let Some(question) = entry.question.as_deref() {
            for existing in log.entries.iter_mut() {
                if existing.is_check_of(question) {
                    existing.shelf = None;
                }
            }
        }
        log.entries.push(entry);

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        for existing in &log.entries {
            writeln!(temp, "{}", serde_json::to_string(existing)?)?;
        }
        temp.flush()?;
        temp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(question: &str, shelf: Option<&str>) -> LogEntry {
        LogEntry::builder()
            .event_type(EventType::Check)
            .question(question)
            .maybe_shelf(shelf.map(str::to_string))
            .build()
    }

    #[test]
    fn question_iterator_is_newest_first_and_unique() {
        let log = Log::new(vec![
            LogEntry::event(EventType::Init),
            check("q1", Some("a")),
            check("q2", Some("b")),
            check("q1", Some("c")),
        ]);
        let seen: Vec<(&str, &str)> = log
            .question_iterator()
            .map(|e| (e.question.as_deref().unwrap(), e.shelf.as_deref().unwrap()))
            .collect();
        assert_eq!(seen, vec![("q1", "c"), ("q2", "b")]);
        assert_eq!(log.get_questions(), vec!["q1", "q2"]);
        assert_eq!(log.get_question_entry("q1").unwrap().shelf.as_deref(), Some("c"));
        assert!(matches!(
            log.get_question_entry("q3"),
            Err(GradingError::QuestionNotFound(_))
        ));
    }

    #[test]
    fn event_types_use_snake_case() {
        let json = serde_json::to_string(&EventType::BeginCheckAll).unwrap();
        assert_eq!(json, "\"begin_check_all\"");
    }
}
