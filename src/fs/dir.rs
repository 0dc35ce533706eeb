//! Staged access to a directory tree.
//!
//! The staging directory starts as a recursive copy of the target, so the
//! caller sees the directory as it is now and may add, change or delete
//! entries freely.
//!
//! ## Commit hazard
//!
//! There is no portable primitive that swaps a directory in one step.
//! Commit removes the existing target and then renames the staging
//! directory into its place; a reader in between sees no directory at all.

use super::transaction::{Finish, Lifecycle, STAGING_PREFIX, TransactionState, staging_root};
use crate::error::{Result, StageError};

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;

/// A directory transaction backed by a private temp directory.
#[must_use = "StagedDir must be committed or rolled back"]
#[derive(Debug)]
pub struct StagedDir {
    lifecycle: Lifecycle,
    staging_path: PathBuf,
    staging: Option<TempDir>,
}

impl StagedDir {
    /// Staging directory the caller works in.
    pub fn path(&self) -> &Path {
        &self.staging_path
    }

    /// Resolved absolute path of the directory being replaced.
    pub fn target(&self) -> &Path {
        self.lifecycle.target()
    }

    pub fn state(&self) -> TransactionState {
        self.lifecycle.state()
    }

    /// Replaces the target directory with the staging directory.
    ///
    /// Missing ancestors of the target are created. If anything fails once
    /// the old tree has been touched, the staging directory is kept on disk
    /// and reported through [`StageError::CommitInterrupted`].
    pub fn commit(&mut self) -> Result<()> {
        self.commit_with(|_| Ok(()))
    }

    /// Commit with a step run between removing the old tree and the rename.
    pub(crate) fn commit_with<F>(&mut self, before_rename: F) -> Result<()>
    where
        F: FnOnce(&Path) -> io::Result<()>,
    {
        let staging = &mut self.staging;

        self.lifecycle
            .transition(TransactionState::Committed, |target| {
                let dir = staging.as_ref().ok_or_else(|| {
                    StageError::InvalidState("staging directory already released".into())
                })?;
                let staging_path = dir.path().to_path_buf();
                let permissions = fs::metadata(target).ok().map(|m| m.permissions());

                let mut touched = false;
                let swapped = match fs::remove_dir_all(target) {
                    Ok(()) => {
                        touched = true;
                        log::debug!("Removed previous {}", target.display());
                        Ok(())
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                    Err(e) => {
                        // Removal may have stopped part way through.
                        touched = true;
                        Err(e)
                    }
                }
                .and_then(|()| before_rename(target))
                .and_then(|()| match target.parent() {
                    Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
                    _ => Ok(()),
                })
                .and_then(|()| fs::rename(&staging_path, target));

                if let Err(e) = swapped {
                    if !touched {
                        return Err(e.into());
                    }
                    // The staged tree may now be the only copy; never delete it.
                    if let Some(dir) = staging.take() {
                        let _ = dir.keep();
                    }
                    log::error!(
                        "Failed to move {} → {}: {}; staged contents kept",
                        staging_path.display(),
                        target.display(),
                        e
                    );
                    return Err(StageError::CommitInterrupted {
                        target: target.to_path_buf(),
                        staging: staging_path,
                        source: e,
                    });
                }

                if let Some(dir) = staging.take() {
                    // Already renamed away; only disarm the cleanup.
                    let _ = dir.keep();
                }

                if let Some(permissions) = permissions {
                    if let Err(e) = fs::set_permissions(target, permissions) {
                        log::warn!(
                            "Could not restore permissions on {}: {}",
                            target.display(),
                            e
                        );
                    }
                }
                Ok(())
            })?;

        log::info!("Committed: {}", self.target().display());
        Ok(())
    }

    /// Deletes the staging directory. The target is never touched.
    pub fn rollback(&mut self) -> Result<()> {
        let staging = &mut self.staging;

        self.lifecycle
            .transition(TransactionState::RolledBack, |_| {
                let dir = staging.as_ref().ok_or_else(|| {
                    StageError::InvalidState("staging directory already released".into())
                })?;

                fs::remove_dir_all(dir.path()).map_err(|e| {
                    StageError::Io(io::Error::new(
                        e.kind(),
                        format!("Failed to remove {}: {}", dir.path().display(), e),
                    ))
                })?;

                if let Some(dir) = staging.take() {
                    let _ = dir.keep();
                }
                Ok(())
            })?;

        log::info!("Rolled back: {}", self.target().display());
        Ok(())
    }
}

impl Finish for StagedDir {
    fn finish(&mut self, succeeded: bool) -> Result<()> {
        if self.state().is_terminal() {
            return Ok(());
        }
        if succeeded {
            self.commit()
        } else {
            self.rollback()
        }
    }
}

impl Drop for StagedDir {
    fn drop(&mut self) {
        if self.state() != TransactionState::Pending {
            return;
        }
        if self.staging.is_some() {
            log::warn!(
                "Staged directory dropped without commit, discarding changes to {}",
                self.target().display()
            );
        } else {
            log::warn!(
                "Staged directory for {} left at {}",
                self.target().display(),
                self.staging_path.display()
            );
        }
    }
}

/// Stages `path` in a temp directory holding a copy of its current contents.
///
/// The target is resolved to an absolute path first, so `.` or paths
/// ending in `..` name the directory they point at. A missing target
/// yields an empty staging directory. Any other error while reading the
/// target aborts before staging is allocated.
pub fn open_staged_dir(path: impl AsRef<Path>) -> Result<StagedDir> {
    let target = resolve_target(path.as_ref())?;

    if target.parent().is_none() {
        return Err(StageError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("cannot stage filesystem root {}", target.display()),
        )));
    }

    let entries = match fs::read_dir(&target) {
        Ok(entries) => Some(entries),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::debug!("{} does not exist yet, staging empty", target.display());
            None
        }
        Err(e) => return Err(e.into()),
    };

    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(staging_root(&target))?;

    log::debug!(
        "Staging {} at {}",
        target.display(),
        staging.path().display()
    );

    if let Some(entries) = entries {
        for entry in entries {
            let entry = entry?;
            let from = entry.path();
            if from == staging.path() {
                continue;
            }
            copy_entry(&from, &staging.path().join(entry.file_name()))?;
        }
    }

    Ok(StagedDir {
        lifecycle: Lifecycle::new(target),
        staging_path: staging.path().to_path_buf(),
        staging: Some(staging),
    })
}

/// Canonical path of an existing target, or a lexically cleaned absolute
/// path for one that does not exist yet.
fn resolve_target(path: &Path) -> io::Result<PathBuf> {
    match fs::canonicalize(path) {
        Ok(resolved) => Ok(resolved),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let absolute = std::path::absolute(path)?;
            let mut resolved = PathBuf::new();
            for component in absolute.components() {
                match component {
                    Component::CurDir => {}
                    Component::ParentDir => {
                        resolved.pop();
                    }
                    other => resolved.push(other.as_os_str()),
                }
            }
            Ok(resolved)
        }
        Err(e) => Err(e),
    }
}

/// Scoped form of [`open_staged_dir`].
///
/// `work` gets the staged directory. On `Ok` it is committed, on `Err` it
/// is rolled back and the error returned.
pub fn with_staged_dir<T, E, F>(path: impl AsRef<Path>, work: F) -> std::result::Result<T, E>
where
    E: From<StageError>,
    F: FnOnce(&mut StagedDir) -> std::result::Result<T, E>,
{
    let staged = open_staged_dir(path)?;
    super::transaction::scoped(staged, work)
}

/// Copies a file or directory tree. Symlinks are followed.
pub(crate) fn copy_entry(from: &Path, to: &Path) -> io::Result<()> {
    if fs::metadata(from)?.is_dir() {
        copy_dir_recursive(from, to)
    } else {
        fs::copy(from, to).map(|_| ())
    }
}

/// Recursively copies directory tree.
fn copy_dir_recursive(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;

    for entry in fs::read_dir(from)? {
        let entry = entry?;
        copy_entry(&entry.path(), &to.join(entry.file_name()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn leftover_staging(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .starts_with(STAGING_PREFIX)
            })
            .count()
    }

    #[test]
    fn test_missing_target_stages_empty() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("site");

        let staged = open_staged_dir(&target).unwrap();

        assert!(staged.path().is_dir());
        assert_eq!(fs::read_dir(staged.path()).unwrap().count(), 0);
        assert!(!target.exists());
    }

    #[test]
    fn test_existing_tree_is_copied() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("site");
        fs::create_dir_all(target.join("css/vendor")).unwrap();
        fs::write(target.join("index.html"), "<p>old</p>").unwrap();
        fs::write(target.join("css/vendor/reset.css"), "*{}").unwrap();

        let staged = open_staged_dir(&target).unwrap();

        assert_eq!(
            fs::read_to_string(staged.path().join("index.html")).unwrap(),
            "<p>old</p>"
        );
        assert_eq!(
            fs::read_to_string(staged.path().join("css/vendor/reset.css")).unwrap(),
            "*{}"
        );
    }

    #[test]
    fn test_target_that_is_a_file_fails_without_staging() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("plain.txt");
        fs::write(&target, "not a dir").unwrap();

        assert!(open_staged_dir(&target).is_err());
        assert_eq!(leftover_staging(temp.path()), 0);
    }

    #[test]
    fn test_commit_swaps_tree() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("site");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep.txt"), "keep").unwrap();
        fs::write(target.join("drop.txt"), "drop").unwrap();

        let mut staged = open_staged_dir(&target).unwrap();
        fs::remove_file(staged.path().join("drop.txt")).unwrap();
        fs::write(staged.path().join("new.txt"), "new").unwrap();
        staged.commit().unwrap();

        assert_eq!(fs::read_to_string(target.join("keep.txt")).unwrap(), "keep");
        assert_eq!(fs::read_to_string(target.join("new.txt")).unwrap(), "new");
        assert!(!target.join("drop.txt").exists());
        assert!(!staged.path().exists());
        assert_eq!(leftover_staging(temp.path()), 0);
    }

    #[test]
    fn test_rollback_leaves_target() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("site");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("a.txt"), "a").unwrap();

        let mut staged = open_staged_dir(&target).unwrap();
        fs::write(staged.path().join("a.txt"), "changed").unwrap();
        staged.rollback().unwrap();

        assert_eq!(fs::read_to_string(target.join("a.txt")).unwrap(), "a");
        assert!(!staged.path().exists());
        assert!(matches!(staged.commit(), Err(StageError::InvalidState(_))));
    }

    #[test]
    fn test_commit_creates_missing_parents() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("nested/deeper/site");

        let mut staged = open_staged_dir(&target).unwrap();
        fs::write(staged.path().join("index.html"), "hi").unwrap();
        staged.commit().unwrap();

        assert_eq!(fs::read_to_string(target.join("index.html")).unwrap(), "hi");
    }

    #[test]
    fn test_drop_discards_staging() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("site");

        let staged = open_staged_dir(&target).unwrap();
        let staging = staged.path().to_path_buf();
        drop(staged);

        assert!(!staging.exists());
        assert!(!target.exists());
    }

    #[test]
    fn test_parent_dir_suffix_resolves_to_named_directory() {
        let temp = TempDir::new().unwrap();
        let site = temp.path().join("site");
        fs::create_dir_all(site.join("sub")).unwrap();
        fs::write(site.join("keep.txt"), "keep").unwrap();

        let mut staged = open_staged_dir(site.join("sub/..")).unwrap();

        assert_eq!(staged.target(), fs::canonicalize(&site).unwrap());
        assert!(!staged.path().starts_with(staged.target()));
        assert!(staged.path().join("sub").is_dir());
        assert_eq!(leftover_staging(&staged.path().join("sub")), 0);

        fs::write(staged.path().join("new.txt"), "new").unwrap();
        staged.commit().unwrap();

        assert_eq!(fs::read_to_string(site.join("keep.txt")).unwrap(), "keep");
        assert_eq!(fs::read_to_string(site.join("new.txt")).unwrap(), "new");
        assert!(site.join("sub").is_dir());
        assert_eq!(leftover_staging(&site), 0);
        assert_eq!(leftover_staging(temp.path()), 0);
    }

    #[test]
    fn test_missing_target_with_parent_dir_is_normalized() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("missing/../fresh");

        let mut staged = open_staged_dir(&target).unwrap();
        assert_eq!(staged.target().file_name().unwrap(), "fresh");
        fs::write(staged.path().join("a.txt"), "a").unwrap();
        staged.commit().unwrap();

        assert_eq!(
            fs::read_to_string(temp.path().join("fresh/a.txt")).unwrap(),
            "a"
        );
        assert!(!temp.path().join("missing").exists());
    }

    #[test]
    fn test_interrupted_commit_keeps_staged_tree() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("site");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("a.txt"), "a").unwrap();

        let mut staged = open_staged_dir(&target).unwrap();
        let staging = staged.path().to_path_buf();
        fs::write(staging.join("new.txt"), "new").unwrap();

        // Something recreates the target between removal and rename.
        let result = staged.commit_with(|target| {
            fs::create_dir(target)?;
            fs::write(target.join("other.txt"), "other")
        });

        match result {
            Err(StageError::CommitInterrupted { staging: kept, .. }) => {
                assert_eq!(kept, staging)
            }
            other => panic!("expected CommitInterrupted, got {:?}", other),
        }
        assert_eq!(staged.state(), TransactionState::Pending);

        drop(staged);
        assert_eq!(fs::read_to_string(staging.join("a.txt")).unwrap(), "a");
        assert_eq!(fs::read_to_string(staging.join("new.txt")).unwrap(), "new");
        fs::remove_dir_all(&staging).unwrap();
    }

    #[test]
    fn test_failed_commit_before_removal_keeps_transaction_usable() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("site");

        let mut staged = open_staged_dir(&target).unwrap();
        let result = staged.commit_with(|_| Err(io::Error::other("stop")));

        assert!(matches!(result, Err(StageError::Io(_))));
        assert_eq!(staged.state(), TransactionState::Pending);
        assert!(staged.path().is_dir());

        staged.rollback().unwrap();
        assert_eq!(leftover_staging(temp.path()), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_applied_after_rename() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let target = temp.path().join("site");
        fs::create_dir(&target).unwrap();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o750)).unwrap();

        let mut staged = open_staged_dir(&target).unwrap();
        let staging = staged.path().to_path_buf();
        let result = staged.commit_with(|target| fs::create_dir(target.join("blocked")));

        // Rename never happened: the kept staging tree is still private.
        assert!(matches!(result, Err(StageError::CommitInterrupted { .. })));
        let mode = fs::metadata(&staging).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
        fs::remove_dir_all(&staging).unwrap();

        fs::create_dir(&target).unwrap();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o750)).unwrap();
        let mut staged = open_staged_dir(&target).unwrap();
        staged.commit().unwrap();

        let mode = fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn test_failed_rollback_reports_path_and_stays_pending() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("site");

        let mut staged = open_staged_dir(&target).unwrap();
        let staging = staged.path().to_path_buf();
        fs::remove_dir(&staging).unwrap();

        let err = staged.rollback().unwrap_err();
        assert!(err.to_string().contains(&*staging.to_string_lossy()));
        assert_eq!(staged.state(), TransactionState::Pending);
        assert!(staged.rollback().is_err());
    }
}
