//! Remote document-indexing service abstraction.
//!
//! Everything the engine needs from the remote side goes through the
//! [`RemoteService`] trait. The production implementation is
//! [`OpenWebUi`], a `reqwest` client for the Open WebUI HTTP API. Tests
//! substitute an in-memory fake.
//!
//! ```text
//!   directory ──▶ list_knowledge_bases / create_knowledge_base
//!   monitor   ──▶ list_files
//!   pipeline  ──▶ upload_file → file_status (polled) → attach_file
//! ```

mod openwebui;

pub use openwebui::OpenWebUi;

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::kb_config::KnowledgeBaseConfig;
use crate::models::{LocalFileRef, ProcessingStatus, RemoteFileSet, RemoteKnowledgeBase};

/// Operations consumed from the remote knowledge base service.
///
/// All methods are fallible and may be rate limited. Implementations handle
/// their own transport-level retries; callers decide what a failure means
/// for the folder or file at hand.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Every knowledge base visible to the credential.
    async fn list_knowledge_bases(&self) -> Result<Vec<RemoteKnowledgeBase>, RemoteError>;

    /// Create a knowledge base and return its id.
    ///
    /// Returns [`RemoteError::AlreadyExists`] when the service reports a name
    /// clash.
    async fn create_knowledge_base(
        &self,
        config: &KnowledgeBaseConfig,
    ) -> Result<String, RemoteError>;

    /// Names of the files attached to knowledge base `kb_id`.
    async fn list_files(&self, kb_id: &str) -> Result<RemoteFileSet, RemoteError>;

    /// Upload a local file's content and return the remote file id.
    async fn upload_file(&self, file: &LocalFileRef) -> Result<String, RemoteError>;

    /// Current processing status of an uploaded file.
    async fn file_status(&self, file_id: &str) -> Result<ProcessingStatus, RemoteError>;

    /// Attach an uploaded file to knowledge base `kb_id`.
    async fn attach_file(&self, kb_id: &str, file_id: &str) -> Result<(), RemoteError>;
}
