//! Staged access to a single file.
//!
//! [`open_staged_file`] maps an open mode onto a staging strategy:
//!
//! | Mode   | Staging                         | Capabilities |
//! |--------|---------------------------------|--------------|
//! | `w`    | empty temp file                 | write        |
//! | `w+`   | empty temp file                 | read, write  |
//! | `r`    | none, opens target directly     | read         |
//! | `r+`   | temp copy of target, rewound    | read, write  |
//! | `a`    | temp copy if present, at end    | write        |
//! | `a+`   | temp copy if present, at end    | read, write  |
//! | `x`    | none, creates target exclusively| write        |
//! | `x+`   | none, creates target exclusively| read, write  |
//!
//! Staged modes write into a temp file next to the target. Commit renames
//! it over the target in one step; rollback deletes it.
//!
//! Handles are unbuffered byte streams unless
//! [`StageOptions::buffer_capacity`] is set. Buffered writes are flushed on
//! `close()`, which reports any flush error.

use super::handle::Handle;
use super::mode::{Access, Capabilities, Mode, Prepopulate};
use super::transaction::{Finish, Lifecycle, STAGING_PREFIX, TransactionState, staging_root};
use crate::error::{Result, StageError};

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// Options applied to a staged file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageOptions {
    create_parents: bool,
    buffer_capacity: Option<usize>,
}

impl StageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create missing ancestors of the target at commit time.
    pub fn create_parents(mut self, create_parents: bool) -> Self {
        self.create_parents = create_parents;
        self
    }

    pub fn creates_parents(&self) -> bool {
        self.create_parents
    }

    /// Buffer reads and writes through an in-memory buffer of `capacity`
    /// bytes. Zero means unbuffered.
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = Some(capacity);
        self
    }

    pub fn buffer_size(&self) -> Option<usize> {
        self.buffer_capacity.filter(|&capacity| capacity > 0)
    }
}

/// A file transaction backed by a private temp file.
///
/// Dropping a pending `StagedFile` discards the staging file and leaves
/// the target untouched.
#[must_use = "StagedFile must be committed or rolled back"]
#[derive(Debug)]
pub struct StagedFile {
    lifecycle: Lifecycle,
    mode: Mode,
    create_parents: bool,
    // Dropped before `staging` so the file is closed before removal.
    handle: Handle,
    staging: Option<TempPath>,
}

impl StagedFile {
    pub fn target(&self) -> &Path {
        self.lifecycle.target()
    }

    pub fn state(&self) -> TransactionState {
        self.lifecycle.state()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn capabilities(&self) -> Capabilities {
        self.handle.capabilities()
    }

    pub fn creates_parents(&self) -> bool {
        self.create_parents
    }

    /// Path of the staging file while it is still owned by the transaction.
    pub fn staging_path(&self) -> Option<&Path> {
        self.staging.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Flushes and closes the staging handle. Does not commit or roll back.
    ///
    /// The handle counts as closed even if the flush fails.
    pub fn close(&mut self) -> Result<()> {
        self.handle.close().map_err(Into::into)
    }

    fn handle_mut(&mut self) -> &mut Handle {
        &mut self.handle
    }

    fn ensure_closed(&self, op: &str) -> Result<()> {
        if self.handle.is_closed() {
            Ok(())
        } else {
            Err(StageError::InvalidState(format!(
                "cannot {} {}: staging file is still open",
                op,
                self.target().display()
            )))
        }
    }

    /// Replaces the target with the staging file.
    ///
    /// The handle must be closed first. With `create_parents`, missing
    /// ancestors of the target are created before the rename.
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_closed("commit")?;

        let create_parents = self.create_parents;
        let staging = &mut self.staging;

        self.lifecycle
            .transition(TransactionState::Committed, |target| {
                let temp = staging.take().ok_or_else(|| {
                    StageError::InvalidState("staging file already released".into())
                })?;

                if create_parents {
                    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
                        if let Err(e) = fs::create_dir_all(parent) {
                            *staging = Some(temp);
                            return Err(e.into());
                        }
                    }
                }

                // Keep the target's permissions rather than the temp file's.
                if let Ok(metadata) = fs::metadata(target) {
                    if let Err(e) = fs::set_permissions(&temp, metadata.permissions()) {
                        *staging = Some(temp);
                        return Err(e.into());
                    }
                }

                temp.persist(target).map_err(|e| {
                    log::error!("Failed to replace {}: {}", target.display(), e.error);
                    *staging = Some(e.path);
                    StageError::Io(e.error)
                })
            })?;

        log::info!("Committed: {}", self.target().display());
        Ok(())
    }

    /// Deletes the staging file. The target is never touched.
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_closed("roll back")?;

        let staging = &mut self.staging;

        self.lifecycle
            .transition(TransactionState::RolledBack, |_| {
                let temp = staging.as_ref().ok_or_else(|| {
                    StageError::InvalidState("staging file already released".into())
                })?;

                fs::remove_file(temp).map_err(|e| {
                    StageError::Io(io::Error::new(
                        e.kind(),
                        format!("Failed to remove {}: {}", temp.display(), e),
                    ))
                })?;

                if let Some(temp) = staging.take() {
                    // Already deleted; only disarm the cleanup.
                    let _ = temp.keep();
                }
                Ok(())
            })?;

        log::info!("Rolled back: {}", self.target().display());
        Ok(())
    }
}

impl Finish for StagedFile {
    fn finish(&mut self, succeeded: bool) -> Result<()> {
        let closed = self.close();
        if self.state().is_terminal() {
            return closed;
        }
        match (succeeded, closed) {
            (true, Ok(())) => self.commit(),
            // Staged bytes are incomplete after a failed flush.
            (true, Err(e)) => {
                self.rollback()?;
                Err(e)
            }
            (false, _) => self.rollback(),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.state() == TransactionState::Pending {
            log::warn!(
                "Staged file dropped without commit, discarding changes to {}",
                self.target().display()
            );
        }
    }
}

/// Handle on the real path for modes that need no staging (`r`, `x`, `x+`).
#[derive(Debug)]
pub struct DirectFile {
    path: PathBuf,
    mode: Mode,
    handle: Handle,
}

impl DirectFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn capabilities(&self) -> Capabilities {
        self.handle.capabilities()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    pub fn close(&mut self) -> Result<()> {
        self.handle.close().map_err(Into::into)
    }

    fn handle_mut(&mut self) -> &mut Handle {
        &mut self.handle
    }
}

impl Finish for DirectFile {
    fn finish(&mut self, _succeeded: bool) -> Result<()> {
        self.close()
    }
}

/// Result of [`open_staged_file`]: a transaction, or a direct handle for
/// modes with nothing to protect.
#[derive(Debug)]
pub enum OpenedFile {
    Staged(StagedFile),
    Direct(DirectFile),
}

impl OpenedFile {
    pub fn is_staged(&self) -> bool {
        matches!(self, OpenedFile::Staged(_))
    }

    pub fn as_staged_mut(&mut self) -> Option<&mut StagedFile> {
        match self {
            OpenedFile::Staged(staged) => Some(staged),
            OpenedFile::Direct(_) => None,
        }
    }

    pub fn into_staged(self) -> Option<StagedFile> {
        match self {
            OpenedFile::Staged(staged) => Some(staged),
            OpenedFile::Direct(_) => None,
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            OpenedFile::Staged(f) => f.mode(),
            OpenedFile::Direct(f) => f.mode(),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            OpenedFile::Staged(f) => f.capabilities(),
            OpenedFile::Direct(f) => f.capabilities(),
        }
    }

    pub fn close(&mut self) -> Result<()> {
        match self {
            OpenedFile::Staged(f) => f.close(),
            OpenedFile::Direct(f) => f.close(),
        }
    }

    fn handle_mut(&mut self) -> &mut Handle {
        match self {
            OpenedFile::Staged(f) => f.handle_mut(),
            OpenedFile::Direct(f) => f.handle_mut(),
        }
    }
}

impl Finish for OpenedFile {
    fn finish(&mut self, succeeded: bool) -> Result<()> {
        match self {
            OpenedFile::Staged(f) => f.finish(succeeded),
            OpenedFile::Direct(f) => f.finish(succeeded),
        }
    }
}

macro_rules! delegate_io {
    ($ty:ty) => {
        impl Read for $ty {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                self.handle_mut().read(buf)
            }
        }

        impl Write for $ty {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.handle_mut().write(buf)
            }

            fn flush(&mut self) -> io::Result<()> {
                self.handle_mut().flush()
            }
        }

        impl Seek for $ty {
            fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
                self.handle_mut().seek(pos)
            }
        }
    };
}

delegate_io!(StagedFile);
delegate_io!(DirectFile);
delegate_io!(OpenedFile);

/// Opens `path` in `mode`, staging it when the mode can modify the target.
///
/// Errors:
/// - [`StageError::InvalidMode`] before any filesystem access
/// - [`StageError::NotFound`] for `r` / `r+` on an absent target, before
///   any staging file exists
/// - [`StageError::AlreadyExists`] for `x` / `x+` on an existing target
pub fn open_staged_file(
    path: impl AsRef<Path>,
    mode: &str,
    options: StageOptions,
) -> Result<OpenedFile> {
    let mode: Mode = mode.parse()?;
    let path = path.as_ref();

    if !mode.is_staged() {
        return open_direct(path, mode, options).map(OpenedFile::Direct);
    }

    // Read the source before allocating anything so a missing target leaves
    // nothing to clean up.
    let source = match mode.prepopulate() {
        Prepopulate::Nothing => None,
        Prepopulate::Required => Some(open_source(path)?),
        Prepopulate::IfPresent => match File::open(path) {
            Ok(file) => Some(file),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        },
    };

    let root = staging_root(path);
    let (mut file, temp_path) = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempfile_in(&root)?
        .into_parts();

    log::debug!(
        "Staging {} ({}) at {}",
        path.display(),
        mode,
        temp_path.display()
    );

    if let Some(mut source) = source {
        let copied = io::copy(&mut source, &mut file)?;
        log::debug!("Copied {} bytes into staging", copied);
    }

    let file = match mode.access() {
        Access::Append => {
            // Reopen in append mode so every write lands at the end.
            let mut reopened = OpenOptions::new()
                .append(true)
                .read(mode.is_update())
                .open(&temp_path)?;
            reopened.seek(SeekFrom::End(0))?;
            reopened
        }
        _ => {
            file.rewind()?;
            file
        }
    };

    Ok(OpenedFile::Staged(StagedFile {
        lifecycle: Lifecycle::new(path.to_path_buf()),
        mode,
        create_parents: options.creates_parents(),
        handle: Handle::new(file, mode.capabilities(), options.buffer_size()),
        staging: Some(temp_path),
    }))
}

/// Scoped form of [`open_staged_file`].
///
/// `work` gets the opened file. On `Ok` the staging file is committed, on
/// `Err` it is rolled back. Direct handles are simply closed.
pub fn with_staged_file<T, E, F>(
    path: impl AsRef<Path>,
    mode: &str,
    options: StageOptions,
    work: F,
) -> std::result::Result<T, E>
where
    E: From<StageError>,
    F: FnOnce(&mut OpenedFile) -> std::result::Result<T, E>,
{
    let opened = open_staged_file(path, mode, options)?;
    super::transaction::scoped(opened, work)
}

fn open_source(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => StageError::NotFound(path.to_path_buf()),
        _ => e.into(),
    })
}

fn open_direct(path: &Path, mode: Mode, options: StageOptions) -> Result<DirectFile> {
    let caps = mode.capabilities();

    let file = match mode.access() {
        Access::Exclusive => OpenOptions::new()
            .read(caps.read)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => StageError::AlreadyExists(path.to_path_buf()),
                _ => e.into(),
            })?,
        _ => open_source(path)?,
    };

    log::debug!("Opened {} directly ({})", path.display(), mode);

    Ok(DirectFile {
        path: path.to_path_buf(),
        mode,
        handle: Handle::new(file, caps, options.buffer_size()),
    })
}
