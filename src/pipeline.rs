//! Per-file ingestion pipeline.
//!
//! Each planned file runs through
//!
//! ```text
//! Pending ──▶ Uploading ──▶ Processing ──▶ Attached
//!    │            │              │
//!    └────────────┴──────────────┴──────▶ Failed
//! ```
//!
//! 1. **Upload** the file and obtain a remote file id.
//! 2. **Poll** the processing status every `interval` until it is
//!    `completed` or `failed`, at most `max_attempts` times.
//! 3. **Attach** the file id to the knowledge base.
//!
//! Attach is last, so a file whose upload or processing failed is never
//! attached. Every failure ends the task in `Failed` and is returned as a
//! value: nothing escapes to sibling tasks or to the monitor loop.

use futures::stream::{self, StreamExt};
use std::time::Duration;

use crate::config::MonitorConfig;
use crate::error::FileError;
use crate::models::{
    IngestionTask, KnowledgeBaseHandle, LocalFileRef, ProcessingStatus, TaskOutcome, TaskState,
};
use crate::remote::RemoteService;

/// How processing status is polled after an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 10,
        }
    }
}

impl PollPolicy {
    pub fn from_config(monitor: &MonitorConfig) -> Self {
        Self {
            interval: monitor.poll_interval(),
            max_attempts: monitor.max_poll_attempts.max(1),
        }
    }
}

/// Run every file in `files` through [`ingest`], at most `concurrency` at a
/// time. Outcomes come back in completion order.
pub async fn ingest_all(
    remote: &dyn RemoteService,
    kb: &KnowledgeBaseHandle,
    files: Vec<LocalFileRef>,
    policy: PollPolicy,
    concurrency: usize,
) -> Vec<TaskOutcome> {
    stream::iter(files)
        .map(|file| ingest(remote, kb, file, policy))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}

/// Drive one file from `Pending` to a terminal state.
pub async fn ingest(
    remote: &dyn RemoteService,
    kb: &KnowledgeBaseHandle,
    file: LocalFileRef,
    policy: PollPolicy,
) -> TaskOutcome {
    let mut task = IngestionTask::new(file);

    advance(&mut task, TaskState::Uploading);
    let file_id = match remote.upload_file(task.file()).await {
        Ok(id) => id,
        Err(e) => return fail(task, kb, None, FileError::Upload(e)),
    };
    tracing::debug!(kb = %kb.name, file = %task.file().name, %file_id, "uploaded");

    advance(&mut task, TaskState::Processing);
    if let Err(e) = wait_for_processing(remote, &file_id, policy).await {
        return fail(task, kb, Some(file_id), e);
    }

    if let Err(source) = remote.attach_file(&kb.remote_id, &file_id).await {
        let err = FileError::Attach {
            file_id: file_id.clone(),
            source,
        };
        return fail(task, kb, Some(file_id), err);
    }

    advance(&mut task, TaskState::Attached);
    tracing::info!(
        kb = %kb.name,
        kb_id = %kb.remote_id,
        file = %task.file().name,
        %file_id,
        "file attached"
    );
    task.finish(Some(file_id), Ok(()))
}

/// Poll until the remote reports a terminal status or attempts run out.
///
/// A failed status request uses up one attempt but does not end the task on
/// its own. No sleep follows the last attempt.
async fn wait_for_processing(
    remote: &dyn RemoteService,
    file_id: &str,
    policy: PollPolicy,
) -> Result<(), FileError> {
    for attempt in 1..=policy.max_attempts {
        match remote.file_status(file_id).await {
            Ok(ProcessingStatus::Completed) => return Ok(()),
            Ok(ProcessingStatus::Failed) => {
                return Err(FileError::ProcessingFailed {
                    file_id: file_id.to_string(),
                })
            }
            Ok(ProcessingStatus::Processing) => {
                tracing::trace!(file_id, attempt, "still processing");
            }
            Err(e) => {
                tracing::warn!(file_id, attempt, error = %e, "status check failed");
            }
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    Err(FileError::ProcessingTimeout {
        file_id: file_id.to_string(),
        attempts: policy.max_attempts,
    })
}

fn advance(task: &mut IngestionTask, next: TaskState) {
    if let Err(e) = task.advance(next) {
        tracing::error!(file = %task.file().name, error = %e, "task state machine violated");
    }
}

fn fail(
    mut task: IngestionTask,
    kb: &KnowledgeBaseHandle,
    file_id: Option<String>,
    err: FileError,
) -> TaskOutcome {
    advance(&mut task, TaskState::Failed);
    tracing::warn!(
        kb = %kb.name,
        kb_id = %kb.remote_id,
        file = %task.file().name,
        file_id = file_id.as_deref().unwrap_or("-"),
        kind = err.kind(),
        error = %err,
        "file ingestion failed"
    );
    task.finish(file_id, Err(err))
}
