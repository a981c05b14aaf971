use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::tier::Tier;
use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Exclusive claim on a tier for the duration of one job.
///
/// Backed by `<store_dir>/<tier>.lock`, created with create-new semantics so
/// a second process gets `Error::TierLocked`. The file records the holder's
/// pid and is removed on drop. A lock left behind by a killed process has to
/// be removed by hand.
#[derive(Debug)]
pub struct TierLock {
    path: PathBuf,
}

impl TierLock {
    pub fn lock_path(store_dir: &Path, tier: Tier) -> PathBuf {
        store_dir.join(format!("{}.lock", tier.dir_name()))
    }

    pub fn acquire(store_dir: &Path, tier: Tier) -> Result<TierLock> {
        std::fs::create_dir_all(store_dir)?;
        let path = Self::lock_path(store_dir, tier);
        let mut file = match File::create_new(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::tier_locked(tier, path));
            }
            Err(e) => return Err(e.into()),
        };
        let lock = TierLock { path };
        writeln!(file, "{}", std::process::id())?;
        tracing::debug!("Acquired {:?}", lock.path);
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TierLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("Failed to release lock {:?}: {}", self.path, e);
        }
    }
}
