//! Monitor loop.
//!
//! One cycle visits every folder under the root, in order:
//!
//! ```text
//! kbconfig.yaml ──▶ resolve/create KB ──▶ remote inventory
//!                                              │
//!            local scan ──▶ reconcile::plan ◀──┘
//!                                │
//!                                ▼
//!                       pipeline::ingest_all
//! ```
//!
//! Any failure is confined to its folder: it is logged, recorded in the
//! [`CycleReport`], and the next folder proceeds. Nothing is cached between
//! cycles, so a failed folder or file is picked up again next time simply
//! because it is still missing remotely.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use crate::config::Config;
use crate::directory;
use crate::error::FolderError;
use crate::kb_config::KnowledgeBaseConfig;
use crate::models::{CycleReport, FolderOutcome, FolderReport};
use crate::pipeline::{self, PollPolicy};
use crate::reconcile;
use crate::remote::RemoteService;
use crate::scanner::Scanner;
use crate::shutdown::Shutdown;

pub struct Monitor {
    remote: Arc<dyn RemoteService>,
    scanner: Scanner,
    root: PathBuf,
    poll: PollPolicy,
    concurrency: usize,
    refresh_interval: Duration,
}

impl Monitor {
    pub fn new(remote: Arc<dyn RemoteService>, scanner: Scanner, root: PathBuf) -> Self {
        Self {
            remote,
            scanner,
            root,
            poll: PollPolicy::default(),
            concurrency: 4,
            refresh_interval: Duration::from_secs(crate::config::DEFAULT_REFRESH_INTERVAL_SECS),
        }
    }

    pub fn from_config(config: &Config, remote: Arc<dyn RemoteService>) -> Result<Self> {
        let scanner = Scanner::from_config(&config.paths)?;
        Ok(Self::new(remote, scanner, config.paths.root.clone())
            .with_poll_policy(PollPolicy::from_config(&config.monitor))
            .with_concurrency(config.monitor.max_concurrent_uploads)
            .with_refresh_interval(config.monitor.refresh_interval()))
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Loop until `shutdown` fires.
    ///
    /// Shutdown is honoured between folders and during the inter-cycle sleep;
    /// a folder that has started is always finished.
    pub async fn run(&self, shutdown: Shutdown) {
        tracing::info!(
            root = %self.root.display(),
            refresh_secs = self.refresh_interval.as_secs(),
            "monitor started"
        );

        let mut cycle: u64 = 0;
        while !shutdown.is_triggered() {
            cycle += 1;
            match self.cycle(None, Some(&shutdown)).await {
                Ok(report) => log_cycle(cycle, &report),
                Err(e) => tracing::error!(cycle, error = %e, "cycle aborted"),
            }

            if shutdown.is_triggered() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.refresh_interval) => {}
                _ = shutdown.wait() => {}
            }
        }

        tracing::info!(cycles = cycle, "monitor stopped");
    }

    /// One pass over every folder.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.cycle(None, None).await
    }

    /// One pass restricted to the folder named `only`, when given.
    pub async fn run_cycle_filtered(&self, only: Option<&str>) -> Result<CycleReport> {
        self.cycle(only, None).await
    }

    async fn cycle(&self, only: Option<&str>, shutdown: Option<&Shutdown>) -> Result<CycleReport> {
        let mut report = CycleReport::new();
        let folders = self.scanner.list_folders(&self.root)?;

        for folder in folders {
            if shutdown.is_some_and(Shutdown::is_triggered) {
                tracing::info!("shutdown requested, leaving remaining folders for later");
                break;
            }

            let name = folder_name(&folder);
            if only.is_some_and(|o| o != name) {
                continue;
            }

            let span = tracing::info_span!("folder", folder = %name);
            let result = self.reconcile_folder(&folder).instrument(span).await;
            if let Err(e) = &result {
                tracing::error!(folder = %name, error = %e, "folder skipped");
            }
            report.folders.push(FolderOutcome {
                folder: name,
                result,
            });
        }

        Ok(report)
    }

    /// Bring one folder's knowledge base up to date.
    pub async fn reconcile_folder(&self, folder: &Path) -> Result<FolderReport, FolderError> {
        let kb_config = KnowledgeBaseConfig::load(folder, self.scanner.config_file_name())?;
        let kb = directory::resolve_or_create(self.remote.as_ref(), &kb_config).await?;

        let remote_files = self
            .remote
            .list_files(&kb.remote_id)
            .await
            .map_err(|source| FolderError::InventoryFetchFailed {
                name: kb.name.clone(),
                remote_id: kb.remote_id.clone(),
                source,
            })?;

        let local_files = self.scanner.list_files(folder)?;
        let plan = reconcile::plan(&local_files, &remote_files, self.scanner.config_file_name());

        if plan.is_empty() {
            tracing::debug!(kb = %kb.name, local = local_files.len(), "up to date");
        } else {
            tracing::info!(
                kb = %kb.name,
                kb_id = %kb.remote_id,
                local = local_files.len(),
                remote = remote_files.len(),
                pending = plan.len(),
                "ingesting missing files"
            );
        }

        let outcomes =
            pipeline::ingest_all(self.remote.as_ref(), &kb, plan, self.poll, self.concurrency)
                .await;

        Ok(FolderReport {
            knowledge_base: kb,
            local_files: local_files.len(),
            remote_files: remote_files.len(),
            outcomes,
        })
    }
}

fn folder_name(folder: &Path) -> String {
    folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| folder.display().to_string())
}

fn log_cycle(cycle: u64, report: &CycleReport) {
    if report.is_clean() {
        tracing::info!(
            cycle,
            folders = report.folders.len(),
            attached = report.files_attached(),
            "cycle complete"
        );
    } else {
        tracing::warn!(
            cycle,
            folders = report.folders.len(),
            attached = report.files_attached(),
            files_failed = report.files_failed(),
            folders_failed = report.folders_failed(),
            "cycle complete with failures"
        );
    }
}
