//! Placement of finished dumps into a tier directory, and age-based pruning
//! of what a tier holds.

use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::{WithFnName, WithMsg};
use chrono::{Days, NaiveDate};
use function_name::named;
use itertools::Itertools;
use std::fs::{read_dir, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub static ARTIFACT_SUFFIX: &str = ".dump.sql";
static DATE_FORMAT: &str = "%Y-%m-%d";
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// `<database>-<YYYY-MM-DD>.dump.sql`
pub fn artifact_file_name(database: &str, date: NaiveDate) -> String {
    format!("{}-{}{}", database, date.format(DATE_FORMAT), ARTIFACT_SUFFIX)
}

/// Reads the date back out of an artifact name written for `database`.
/// Anything else, including artifacts of other databases, gives `None`.
pub fn get_date_from_file_path<P: AsRef<Path>>(database: &str, file_path: P) -> Option<NaiveDate> {
    let file_name = file_path.as_ref().file_name()?.to_str()?;
    let date = file_name
        .strip_prefix(database)?
        .strip_prefix('-')?
        .strip_suffix(ARTIFACT_SUFFIX)?;
    NaiveDate::parse_from_str(date, DATE_FORMAT).ok()
}

/// Moves `artifact` to `<tier_dir>/<database>-<date>.dump.sql`, creating
/// `tier_dir` if needed and replacing an artifact of the same day.
#[named]
pub fn retain_artifact(
    artifact: &Path,
    tier_dir: &Path,
    database: &str,
    date: NaiveDate,
) -> Result<PathBuf> {
    std::fs::create_dir_all(tier_dir)
        .map_err(Error::from)
        .with_msg(format!("Create tier directory {:?} failed", tier_dir))
        .with_fn_name(function_path!())?;

    let dst = tier_dir.join(artifact_file_name(database, date));
    info!("moving {:?} into {:?}", artifact, dst);
    move_file(artifact, &dst)
        .with_msg(format!("Move {:?} into {:?} failed", artifact, dst))
        .with_fn_name(function_path!())?;

    let size = std::fs::metadata(&dst)?.len();
    info!("{:?} has a size of {} bytes.", dst, size);
    Ok(dst)
}

/// Renames `src` to `dst`, overwriting `dst`. Across filesystems the data is
/// copied next to `dst` and renamed over it, then `src` is removed.
fn move_file(src: &Path, dst: &Path) -> Result<()> {
    match std::fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            debug!("rename {:?} -> {:?} crosses devices, copying instead", src, dst);
            copy_into_place(src, dst)?;
            if let Err(e) = std::fs::remove_file(src) {
                warn!("{:?} was copied to {:?} but could not be removed: {}", src, dst, e);
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// `dst` is either left untouched or fully replaced.
fn copy_into_place(src: &Path, dst: &Path) -> Result<()> {
    let dir = dst.parent().unwrap_or(Path::new("."));
    let mut staged = tempfile::Builder::new()
        .prefix(".backupter-")
        .tempfile_in(dir)?;
    std::io::copy(&mut File::open(src)?, staged.as_file_mut())?;
    staged.as_file().sync_all()?;
    staged.persist(dst).map_err(|e| e.error)?;
    Ok(())
}

/// Deletes `database`'s artifacts in `tier_dir` dated before
/// `today - retention`. Retention is counted in whole days since artifact
/// names only carry a date. Returns what was deleted.
pub fn prune_expired(
    tier_dir: &Path,
    database: &str,
    today: NaiveDate,
    retention: Duration,
) -> Result<Vec<PathBuf>> {
    let Some(cutoff) = today.checked_sub_days(Days::new(retention.as_secs() / SECONDS_PER_DAY))
    else {
        return Ok(Vec::new());
    };

    let expired = read_dir(tier_dir)?
        .filter_map(|r| r.ok())
        .map(|r| r.path())
        .filter(|p| p.is_file())
        .filter(|p| get_date_from_file_path(database, p).is_some_and(|d| d < cutoff))
        .sorted()
        .collect_vec();

    let mut removed = Vec::with_capacity(expired.len());
    let mut errors = Vec::new();
    for path in expired {
        info!("Removing out of retention file {:?}", path);
        match std::fs::remove_file(&path) {
            Ok(()) => removed.push(path),
            Err(e) => errors.push(Error::from(e).with_msg(format!("Remove {:?} failed", path))),
        }
    }
    convert_error_vec(errors)?;
    Ok(removed)
}
