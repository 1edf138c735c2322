//! Folder scanner.
//!
//! Walks the configured root one level deep for knowledge base folders, and
//! each folder one level deep for content files. Hidden entries, the
//! per-folder config file, and anything matching `paths.exclude_globs` are
//! skipped. Results are sorted for deterministic ordering.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::PathsConfig;
use crate::error::FolderError;
use crate::models::LocalFileRef;

#[derive(Debug, Clone)]
pub struct Scanner {
    config_file_name: String,
    exclude_set: GlobSet,
}

impl Scanner {
    pub fn new(config_file_name: &str, exclude_globs: &[String]) -> Result<Self> {
        Ok(Self {
            config_file_name: config_file_name.to_string(),
            exclude_set: build_globset(exclude_globs)?,
        })
    }

    pub fn from_config(paths: &PathsConfig) -> Result<Self> {
        Self::new(&paths.config_file_name, &paths.exclude_globs)
    }

    pub fn config_file_name(&self) -> &str {
        &self.config_file_name
    }

    /// Subdirectories of `root`, one per knowledge base.
    pub fn list_folders(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            bail!("knowledge base root does not exist: {}", root.display());
        }

        let mut folders = Vec::new();
        for entry in WalkDir::new(root).min_depth(1).max_depth(1).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                // depth 0 is the root itself
                Err(e) if e.depth() == 0 => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable root entry");
                    continue;
                }
            };
            if !entry.file_type().is_dir() || is_hidden(entry.file_name().to_str()) {
                continue;
            }
            folders.push(entry.into_path());
        }

        folders.sort();
        Ok(folders)
    }

    /// Candidate content files directly inside `folder`.
    pub fn list_files(&self, folder: &Path) -> Result<Vec<LocalFileRef>, FolderError> {
        let mut files = Vec::new();

        for entry in WalkDir::new(folder).min_depth(1).max_depth(1).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(FolderError::Scan {
                        path: folder.to_path_buf(),
                        message: e.to_string(),
                    })
                }
                Err(e) => {
                    tracing::warn!(
                        folder = %folder.display(),
                        file = %e.path().map(|p| p.display().to_string()).unwrap_or_default(),
                        error = %e,
                        "skipping unreadable file"
                    );
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(file) = LocalFileRef::from_path(entry.path()) else {
                tracing::warn!(path = %entry.path().display(), "skipping file with non UTF-8 name");
                continue;
            };
            if !self.is_candidate(&file.name) {
                continue;
            }
            files.push(file);
        }

        files.sort();
        Ok(files)
    }

    /// Whether a file with this name should be synchronized.
    pub fn is_candidate(&self, name: &str) -> bool {
        is_candidate_name(name, &self.config_file_name) && !self.exclude_set.is_match(name)
    }
}

/// Name-only filter shared with the reconciler: not hidden, not the config file.
pub fn is_candidate_name(name: &str, config_file_name: &str) -> bool {
    !name.is_empty() && !is_hidden(Some(name)) && name != config_file_name
}

fn is_hidden(name: Option<&str>) -> bool {
    name.map(|n| n.starts_with('.')).unwrap_or(true)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
