//! Error taxonomy for reconciliation and ingestion.
//!
//! Errors are split by blast radius:
//!
//! | Type | Scope | Effect |
//! |------|-------|--------|
//! | [`RemoteError`] | one HTTP call | wrapped into one of the two below |
//! | [`FolderError`] | one folder, one cycle | folder skipped, next folder runs |
//! | [`FileError`] | one file, one cycle | file skipped, siblings unaffected |
//!
//! Nothing here is fatal to the monitor loop. Startup failures are reported
//! through `anyhow` in the binary instead.

use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single call against the remote service.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Connection, TLS, timeout, or body streaming failure.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The service answered with a non-success status.
    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// The service reported that the entity being created already exists.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// The response body did not have the expected shape.
    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },

    /// A local file could not be opened for upload.
    #[error("cannot read {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RemoteError {
    /// Whether retrying the same call may succeed (rate limiting, server
    /// errors, network trouble).
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Transport { .. } => true,
            RemoteError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Error that aborts one folder's reconciliation for the current cycle.
#[derive(Error, Debug)]
pub enum FolderError {
    #[error("cannot scan folder {}: {message}", path.display())]
    Scan { path: PathBuf, message: String },

    #[error("cannot load {}: {message}", path.display())]
    ConfigLoad { path: PathBuf, message: String },

    #[error("cannot resolve knowledge base '{name}': {source}")]
    ResolutionFailed {
        name: String,
        #[source]
        source: RemoteError,
    },

    #[error("cannot create knowledge base '{name}': {source}")]
    CreationFailed {
        name: String,
        #[source]
        source: RemoteError,
    },

    #[error("cannot list files of knowledge base '{name}' ({remote_id}): {source}")]
    InventoryFetchFailed {
        name: String,
        remote_id: String,
        #[source]
        source: RemoteError,
    },
}

/// Terminal failure of one file's ingestion task.
#[derive(Error, Debug)]
pub enum FileError {
    #[error("upload failed: {0}")]
    Upload(#[source] RemoteError),

    #[error("remote processing of file {file_id} failed")]
    ProcessingFailed { file_id: String },

    #[error("file {file_id} still processing after {attempts} status checks")]
    ProcessingTimeout { file_id: String, attempts: u32 },

    #[error("attaching file {file_id} failed: {source}")]
    Attach {
        file_id: String,
        #[source]
        source: RemoteError,
    },
}

impl FileError {
    /// Short machine-friendly label, used in log fields and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            FileError::Upload(_) => "upload_error",
            FileError::ProcessingFailed { .. } => "processing_failed",
            FileError::ProcessingTimeout { .. } => "processing_timeout",
            FileError::Attach { .. } => "attach_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> RemoteError {
        RemoteError::Status {
            url: "http://x/api".to_string(),
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        assert!(status(429).is_transient());
        assert!(status(500).is_transient());
        assert!(status(503).is_transient());
    }

    #[test]
    fn client_errors_are_not_transient() {
        assert!(!status(400).is_transient());
        assert!(!status(401).is_transient());
        assert!(!status(404).is_transient());
        assert!(!RemoteError::AlreadyExists("kb".into()).is_transient());
    }

    #[test]
    fn file_error_kinds() {
        let e = FileError::ProcessingTimeout {
            file_id: "f1".into(),
            attempts: 10,
        };
        assert_eq!(e.kind(), "processing_timeout");
        assert_eq!(
            e.to_string(),
            "file f1 still processing after 10 status checks"
        );
    }
}
