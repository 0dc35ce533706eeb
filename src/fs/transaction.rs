//! Shared lifecycle for staged transactions.
//!
//! Every staged file or directory moves through the same three states:
//!
//! - **Pending**: staging resource allocated and handed to the caller
//! - **Committed**: staging resource replaced the target path
//! - **RolledBack**: staging resource discarded, target untouched
//!
//! Exactly one terminal transition happens per transaction. A second
//! `commit()` or `rollback()` fails with [`StageError::InvalidState`].
//!
//! ## Scoped use
//!
//! ```no_run
//! # use staged_fs::fs::{open_staged_dir, scoped};
//! # fn example() -> staged_fs::Result<()> {
//! let staged = open_staged_dir("site")?;
//!
//! scoped(staged, |dir| {
//!     std::fs::write(dir.path().join("index.html"), "<h1>hi</h1>")?;
//!     Ok::<_, staged_fs::StageError>(())
//! })?; // committed on Ok, rolled back on Err
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, StageError};

use std::fmt;
use std::path::{Path, PathBuf};

/// Prefix for temp files and directories created next to a target.
pub(crate) const STAGING_PREFIX: &str = ".staged-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Staging resource is live; no terminal operation has run.
    Pending,
    /// Target was replaced by the staging resource.
    Committed,
    /// Staging resource was discarded.
    RolledBack,
}

impl TransactionState {
    pub fn is_terminal(self) -> bool {
        self != TransactionState::Pending
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Pending => "pending",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled back",
        };
        f.write_str(name)
    }
}

/// Target path plus state, owned by each staged resource.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    target: PathBuf,
    state: TransactionState,
}

impl Lifecycle {
    pub(crate) fn new(target: PathBuf) -> Self {
        Self {
            target,
            state: TransactionState::Pending,
        }
    }

    pub(crate) fn target(&self) -> &Path {
        &self.target
    }

    pub(crate) fn state(&self) -> TransactionState {
        self.state
    }

    /// Runs `apply` against the target and, if it succeeds, moves to `to`.
    ///
    /// Fails with `InvalidState` unless the transaction is still pending.
    /// When `apply` fails the state stays `Pending` so the caller can still
    /// discard the staging resource.
    pub(crate) fn transition<F>(&mut self, to: TransactionState, apply: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        debug_assert!(to.is_terminal());

        if self.state != TransactionState::Pending {
            return Err(StageError::InvalidState(format!(
                "cannot mark {} as {}: transaction already {}",
                self.target.display(),
                to,
                self.state
            )));
        }

        apply(&self.target)?;
        self.state = to;
        Ok(())
    }
}

/// End of a scoped unit of work.
///
/// Implementors commit when `succeeded` is true and roll back otherwise.
/// If a terminal operation already ran manually, `finish` does nothing.
pub trait Finish {
    fn finish(&mut self, succeeded: bool) -> Result<()>;
}

/// Hands `staged` to `work`, then commits or rolls back based on its result.
///
/// The caller's error is returned unchanged after rollback. A rollback
/// failure at that point is logged, not returned, so the original error
/// is never masked.
pub fn scoped<S, T, E, F>(mut staged: S, work: F) -> std::result::Result<T, E>
where
    S: Finish,
    E: From<StageError>,
    F: FnOnce(&mut S) -> std::result::Result<T, E>,
{
    match work(&mut staged) {
        Ok(value) => {
            staged.finish(true)?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = staged.finish(false) {
                log::error!("Rollback after failed unit of work also failed: {}", rollback_err);
            }
            Err(e)
        }
    }
}

/// Directory that will hold the staging resource for `target`.
///
/// Uses the target's parent, or its nearest existing ancestor when the
/// parent has not been created yet, so the final move is a same-filesystem
/// rename.
pub(crate) fn staging_root(target: &Path) -> PathBuf {
    let mut ancestor = target.parent();

    while let Some(dir) = ancestor {
        let candidate = if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        };
        if candidate.is_dir() {
            return candidate.to_path_buf();
        }
        ancestor = dir.parent();
    }

    std::env::temp_dir()
}
