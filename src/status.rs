//! Read-only status and report printing.
//!
//! `kbsync status` shows, for each folder, which knowledge base it maps to
//! and how many files are still missing remotely. It only lists; it never
//! creates a knowledge base or uploads anything. This module also prints the
//! summary for `kbsync sync`.

use anyhow::Result;
use std::path::Path;

use crate::directory;
use crate::kb_config::KnowledgeBaseConfig;
use crate::models::CycleReport;
use crate::reconcile;
use crate::remote::RemoteService;
use crate::scanner::Scanner;

/// One row of the status table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderStatus {
    pub folder: String,
    pub knowledge_base: Option<String>,
    /// `None` when the knowledge base does not exist yet.
    pub remote_id: Option<String>,
    pub local_files: usize,
    pub remote_files: Option<usize>,
    pub pending: Option<usize>,
    pub error: Option<String>,
}

impl FolderStatus {
    fn new(folder: String) -> Self {
        Self {
            folder,
            knowledge_base: None,
            remote_id: None,
            local_files: 0,
            remote_files: None,
            pending: None,
            error: None,
        }
    }
}

/// Gather status rows for every folder under `root`.
pub async fn collect(
    remote: &dyn RemoteService,
    scanner: &Scanner,
    root: &Path,
) -> Result<Vec<FolderStatus>> {
    let mut rows = Vec::new();

    for folder in scanner.list_folders(root)? {
        let name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut row = FolderStatus::new(name);

        let local = match scanner.list_files(&folder) {
            Ok(files) => files,
            Err(e) => {
                row.error = Some(e.to_string());
                rows.push(row);
                continue;
            }
        };
        row.local_files = local.len();

        let kb_config = match KnowledgeBaseConfig::load(&folder, scanner.config_file_name()) {
            Ok(c) => c,
            Err(e) => {
                row.error = Some(e.to_string());
                rows.push(row);
                continue;
            }
        };
        row.knowledge_base = Some(kb_config.name.clone());

        match directory::find(remote, &kb_config.name).await {
            Ok(Some(kb)) => match remote.list_files(&kb.remote_id).await {
                Ok(remote_files) => {
                    let plan =
                        reconcile::plan(&local, &remote_files, scanner.config_file_name());
                    row.remote_files = Some(remote_files.len());
                    row.pending = Some(plan.len());
                    row.remote_id = Some(kb.remote_id);
                }
                Err(e) => {
                    row.remote_id = Some(kb.remote_id);
                    row.error = Some(e.to_string());
                }
            },
            Ok(None) => {
                // everything is pending until the knowledge base is created
                row.remote_files = Some(0);
                row.pending = Some(local.len());
            }
            Err(e) => row.error = Some(e.to_string()),
        }

        rows.push(row);
    }

    Ok(rows)
}

pub fn print_status(rows: &[FolderStatus]) {
    if rows.is_empty() {
        println!("No knowledge base folders found.");
        return;
    }

    println!(
        "{:<20} {:<24} {:<38} {:>6} {:>7} {:>8}",
        "FOLDER", "KNOWLEDGE BASE", "ID", "LOCAL", "REMOTE", "PENDING"
    );
    for row in rows {
        println!(
            "{:<20} {:<24} {:<38} {:>6} {:>7} {:>8}",
            truncate(&row.folder, 20),
            truncate(row.knowledge_base.as_deref().unwrap_or("-"), 24),
            row.remote_id.as_deref().unwrap_or("(not created)"),
            row.local_files,
            opt(row.remote_files),
            opt(row.pending),
        );
        if let Some(err) = &row.error {
            println!("  error: {}", err);
        }
    }
}

pub async fn run_status(remote: &dyn RemoteService, scanner: &Scanner, root: &Path) -> Result<()> {
    let rows = collect(remote, scanner, root).await?;
    print_status(&rows);
    Ok(())
}

/// Human summary of one `sync` cycle.
pub fn print_cycle_report(report: &CycleReport) {
    println!("Sync run: {}", report.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!();

    for folder in &report.folders {
        match &folder.result {
            Ok(r) if r.is_up_to_date() => {
                println!(
                    "  {:<20} up to date ({} files)",
                    folder.folder, r.local_files
                );
            }
            Ok(r) => {
                println!(
                    "  {:<20} {} attached, {} failed",
                    folder.folder,
                    r.attached(),
                    r.failed()
                );
                for outcome in &r.outcomes {
                    if let Some(err) = outcome.error() {
                        println!("      {} [{}]: {}", outcome.file.name, err.kind(), err);
                    }
                }
            }
            Err(e) => println!("  {:<20} skipped: {}", folder.folder, e),
        }
    }

    println!();
    println!(
        "  Folders: {}  Attached: {}  Failed files: {}  Failed folders: {}",
        report.folders.len(),
        report.files_attached(),
        report.files_failed(),
        report.folders_failed()
    );
}

fn opt(v: Option<usize>) -> String {
    v.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", head)
    }
}
