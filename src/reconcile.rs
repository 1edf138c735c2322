//! Local vs remote diff for one folder.

use std::collections::BTreeSet;

use crate::models::{LocalFileRef, RemoteFileSet};
use crate::scanner::is_candidate_name;

/// Files that exist locally but are not attached remotely.
///
/// Matching is by exact file name. The config file and dotfiles are never
/// planned, even if a caller passes them in. The result is sorted by name and
/// holds at most one entry per name, so a file can only feed one task per
/// cycle.
pub fn plan(
    local_files: &[LocalFileRef],
    remote_files: &RemoteFileSet,
    config_file_name: &str,
) -> Vec<LocalFileRef> {
    let mut seen = BTreeSet::new();
    let mut planned: Vec<LocalFileRef> = local_files
        .iter()
        .filter(|f| is_candidate_name(&f.name, config_file_name))
        .filter(|f| !remote_files.contains(&f.name))
        .filter(|f| seen.insert(f.name.clone()))
        .cloned()
        .collect();
    planned.sort();
    planned
}
