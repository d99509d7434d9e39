use crate::error::SyncError;
use crate::sync::paths::SyncPaths;
use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Exclusive advisory lock held for the whole of one sync run.
///
/// Released when dropped, including on panic unwind.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))
}

fn holder_pid(file: &mut File) -> Option<u32> {
    let mut raw = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut raw).ok()?;
    raw.trim().parse().ok()
}

pub fn acquire(paths: &SyncPaths) -> Result<RunLock> {
    let path = paths.run_lock();
    let mut file = open_lock_file(&path)?;
    if file.try_lock_exclusive().is_err() {
        let holder = holder_pid(&mut file)
            .map(|pid| format!("pid {pid}"))
            .unwrap_or_else(|| "unknown process".to_string());
        return Err(SyncError::Locked(format!("{} held by {holder}", path.display())).into());
    }

    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    write!(file, "{}", std::process::id())?;
    file.flush()?;
    Ok(RunLock { file, path })
}

/// Whether another process currently holds the run lock.
pub fn is_held(paths: &SyncPaths) -> Result<bool> {
    let path = paths.run_lock();
    if !path.exists() {
        return Ok(false);
    }
    let file = open_lock_file(&path)?;
    if file.try_lock_exclusive().is_err() {
        return Ok(true);
    }
    let _ = FileExt::unlock(&file);
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_acquire_fails_while_first_is_held() {
        let tmp = tempdir().expect("tempdir");
        let paths = SyncPaths::rooted_at(tmp.path().to_path_buf());

        let first = acquire(&paths).expect("first lock");
        let err = acquire(&paths).expect_err("second lock must fail");
        let sync_err = err.downcast_ref::<SyncError>().expect("sync error");
        assert_eq!(sync_err.code().as_str(), "E001_LOCKED");
        assert!(is_held(&paths).expect("probe"));

        drop(first);
        assert!(!is_held(&paths).expect("probe"));
        acquire(&paths).expect("lock after release");
    }
}
