//! Process lock for the data directory.
//!
//! sled refuses concurrent opens of the same database; the lock turns that
//! into a clear startup error naming the other instance.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

const LOCK_FILE_NAME: &str = ".renewcast.lock";

/// What an existing lock file says about its owner.
#[derive(Debug, PartialEq, Eq)]
enum Holder {
    Running(u32),
    Gone,
    Unreadable,
}

/// PID lock file, removed on drop.
#[derive(Debug)]
pub struct ProcessLock {
    path: PathBuf,
    owned: bool,
}

impl ProcessLock {
    /// Take the lock in `data_dir`, creating the directory if needed.
    pub fn acquire<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let path = data_dir.join(LOCK_FILE_NAME);
        if path.exists() {
            match holder(&path) {
                Holder::Running(pid) => bail!(
                    "Another renewcast instance is already running (PID {pid}). \
                     Stop it, or remove {} if it is stale.",
                    path.display()
                ),
                Holder::Gone => tracing::info!("[Lock] Removing stale lock from a previous run"),
                Holder::Unreadable => tracing::warn!(path = %path.display(), "[Lock] Unreadable lock file, replacing"),
            }
            fs::remove_file(&path).context("Failed to remove stale lock file")?;
        }

        let pid = std::process::id();
        fs::write(&path, format!("{pid}\n"))
            .with_context(|| format!("Failed to write lock file {}", path.display()))?;
        tracing::debug!(pid, path = %path.display(), "[Lock] Acquired");

        Ok(Self { path, owned: true })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(&mut self) {
        if !self.owned {
            return;
        }
        self.owned = false;
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(error = %e, "[Lock] Failed to remove lock file");
        }
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        self.release();
    }
}

fn holder(path: &Path) -> Holder {
    let Some(pid) = fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
    else {
        return Holder::Unreadable;
    };
    if is_renewcast_process(pid) {
        Holder::Running(pid)
    } else {
        Holder::Gone
    }
}

#[cfg(unix)]
fn is_renewcast_process(pid: u32) -> bool {
    fs::read_to_string(format!("/proc/{pid}/cmdline")).is_ok_and(|cmdline| cmdline.contains("renewcast"))
}

#[cfg(not(unix))]
fn is_renewcast_process(_pid: u32) -> bool {
    true
}
