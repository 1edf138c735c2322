//! Single-instance guard for each supervised unit.
//!
//! Each unit holds an exclusive advisory lock on `<lock_dir>/<unit>.lock` for
//! its whole lifetime and writes its pid into the file. The OS drops the lock
//! when the process dies, so a crash never leaves a stale lock behind.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct UnitLock {
    file: File,
    path: PathBuf,
}

impl UnitLock {
    /// Take the lock for `unit`, failing fast if another process holds it.
    pub fn acquire(lock_dir: &Path, unit: &str) -> Result<Self> {
        fs::create_dir_all(lock_dir)
            .with_context(|| format!("cannot create lock directory {}", lock_dir.display()))?;

        let path = lock_dir.join(format!("{}.lock", unit));
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("cannot open lock file {}", path.display()))?;

        file.try_lock_exclusive().map_err(|_| {
            let holder = fs::read_to_string(&path).unwrap_or_default();
            anyhow::anyhow!(
                "{} is already running (lock {} held by pid {})",
                unit,
                path.display(),
                holder.trim()
            )
        })?;

        file.set_len(0)?;
        write!(file, "{}", std::process::id())?;
        file.flush()?;

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UnitLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        let _ = FileExt::unlock(&self.file);
    }
}
