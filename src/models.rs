//! Core data models used throughout kb-sync.
//!
//! These types represent the local files, remote knowledge bases, and
//! per-file ingestion tasks that flow through one monitor cycle. None of them
//! are persisted: every cycle rebuilds them from the filesystem and the
//! remote service.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::error::{FileError, FolderError};

/// Set of filenames already attached to a knowledge base.
pub type RemoteFileSet = BTreeSet<String>;

/// A knowledge base as listed by the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteKnowledgeBase {
    pub id: String,
    pub name: String,
}

/// A resolved knowledge base: its local name and opaque remote id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeBaseHandle {
    pub name: String,
    pub remote_id: String,
}

/// A content file found in a knowledge base folder.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LocalFileRef {
    pub name: String,
    pub path: PathBuf,
}

impl LocalFileRef {
    /// Build a reference from a path, using its final component as the name.
    ///
    /// Returns `None` for paths without a UTF-8 file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_string();
        Some(Self {
            name,
            path: path.to_path_buf(),
        })
    }
}

/// Processing state of an uploaded file as reported by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStatus {
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    /// Map the service's status string. Anything that is not a terminal
    /// status counts as still processing.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "completed" => ProcessingStatus::Completed,
            "failed" | "error" => ProcessingStatus::Failed,
            _ => ProcessingStatus::Processing,
        }
    }
}

/// Lifecycle state of one file's ingestion task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Uploading,
    Processing,
    Attached,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Attached | TaskState::Failed)
    }

    /// Forward-only transition table.
    pub fn can_advance_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Pending, Uploading)
                | (Uploading, Processing)
                | (Processing, Attached)
                | (Pending | Uploading | Processing, Failed)
        )
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("illegal task transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: TaskState,
    pub to: TaskState,
}

/// State machine for one file within one cycle.
///
/// The full history is kept so the path a task took can be inspected after
/// it reaches a terminal state.
#[derive(Debug, Clone)]
pub struct IngestionTask {
    file: LocalFileRef,
    history: Vec<TaskState>,
}

impl IngestionTask {
    pub fn new(file: LocalFileRef) -> Self {
        Self {
            file,
            history: vec![TaskState::Pending],
        }
    }

    pub fn file(&self) -> &LocalFileRef {
        &self.file
    }

    pub fn state(&self) -> TaskState {
        // history always starts with Pending
        self.history.last().copied().unwrap_or(TaskState::Pending)
    }

    pub fn history(&self) -> &[TaskState] {
        &self.history
    }

    pub fn advance(&mut self, next: TaskState) -> Result<(), IllegalTransition> {
        let from = self.state();
        if !from.can_advance_to(next) {
            return Err(IllegalTransition { from, to: next });
        }
        self.history.push(next);
        Ok(())
    }

    /// Consume the task into its outcome.
    pub fn finish(self, file_id: Option<String>, result: Result<(), FileError>) -> TaskOutcome {
        TaskOutcome {
            file: self.file,
            file_id,
            history: self.history,
            result,
        }
    }
}

/// Terminal result of one ingestion task.
#[derive(Debug)]
pub struct TaskOutcome {
    pub file: LocalFileRef,
    /// Remote file id, when the upload got that far.
    pub file_id: Option<String>,
    pub history: Vec<TaskState>,
    pub result: Result<(), FileError>,
}

impl TaskOutcome {
    pub fn final_state(&self) -> TaskState {
        self.history.last().copied().unwrap_or(TaskState::Pending)
    }

    pub fn is_attached(&self) -> bool {
        self.final_state() == TaskState::Attached
    }

    pub fn error(&self) -> Option<&FileError> {
        self.result.as_ref().err()
    }
}

/// What happened to one folder during a cycle.
#[derive(Debug)]
pub struct FolderReport {
    pub knowledge_base: KnowledgeBaseHandle,
    pub local_files: usize,
    pub remote_files: usize,
    pub outcomes: Vec<TaskOutcome>,
}

impl FolderReport {
    pub fn attached(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_attached()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.attached()
    }

    pub fn is_up_to_date(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// One folder's entry in a [`CycleReport`].
#[derive(Debug)]
pub struct FolderOutcome {
    /// Folder directory name under the root.
    pub folder: String,
    pub result: Result<FolderReport, FolderError>,
}

/// Summary of one pass over all folders.
#[derive(Debug)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub folders: Vec<FolderOutcome>,
}

impl CycleReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            folders: Vec::new(),
        }
    }

    pub fn folder(&self, name: &str) -> Option<&FolderOutcome> {
        self.folders.iter().find(|f| f.folder == name)
    }

    pub fn files_attached(&self) -> usize {
        self.reports().map(FolderReport::attached).sum()
    }

    pub fn files_failed(&self) -> usize {
        self.reports().map(FolderReport::failed).sum()
    }

    pub fn folders_failed(&self) -> usize {
        self.folders.iter().filter(|f| f.result.is_err()).count()
    }

    /// True when no folder and no file failed.
    pub fn is_clean(&self) -> bool {
        self.folders_failed() == 0 && self.files_failed() == 0
    }

    fn reports(&self) -> impl Iterator<Item = &FolderReport> {
        self.folders.iter().filter_map(|f| f.result.as_ref().ok())
    }
}

impl Default for CycleReport {
    fn default() -> Self {
        Self::new()
    }
}
