//! Knowledge base name → remote id resolution.
//!
//! Resolution always lists first and creates only on a miss, so running it
//! every cycle never duplicates a knowledge base. A creation that races with
//! another writer and reports "already exists" falls back to a second lookup.

use crate::error::{FolderError, RemoteError};
use crate::kb_config::KnowledgeBaseConfig;
use crate::models::KnowledgeBaseHandle;
use crate::remote::RemoteService;

/// Look up a knowledge base by exact name without creating it.
pub async fn find(
    remote: &dyn RemoteService,
    name: &str,
) -> Result<Option<KnowledgeBaseHandle>, RemoteError> {
    let existing = remote.list_knowledge_bases().await?;
    Ok(existing
        .into_iter()
        .find(|kb| kb.name == name)
        .map(|kb| KnowledgeBaseHandle {
            name: kb.name,
            remote_id: kb.id,
        }))
}

/// Return the knowledge base named `config.name`, creating it if absent.
pub async fn resolve_or_create(
    remote: &dyn RemoteService,
    config: &KnowledgeBaseConfig,
) -> Result<KnowledgeBaseHandle, FolderError> {
    let resolution_failed = |source| FolderError::ResolutionFailed {
        name: config.name.clone(),
        source,
    };

    if let Some(handle) = find(remote, &config.name).await.map_err(resolution_failed)? {
        tracing::debug!(kb = %handle.name, id = %handle.remote_id, "knowledge base exists");
        return Ok(handle);
    }

    match remote.create_knowledge_base(config).await {
        Ok(remote_id) => {
            tracing::info!(kb = %config.name, id = %remote_id, "created knowledge base");
            Ok(KnowledgeBaseHandle {
                name: config.name.clone(),
                remote_id,
            })
        }
        Err(RemoteError::AlreadyExists(_)) => {
            tracing::info!(kb = %config.name, "knowledge base created concurrently, looking it up");
            find(remote, &config.name)
                .await
                .map_err(resolution_failed)?
                .ok_or_else(|| {
                    resolution_failed(RemoteError::Decode {
                        url: "knowledge base list".to_string(),
                        message: format!(
                            "'{}' reported as existing but not listed",
                            config.name
                        ),
                    })
                })
        }
        Err(source) => Err(FolderError::CreationFailed {
            name: config.name.clone(),
            source,
        }),
    }
}
