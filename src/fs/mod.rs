//! Staged file and directory transactions.
//!
//! Changes go to a private staging copy and replace the target only on
//! commit. Rollback, or dropping a pending transaction, discards them.

pub mod dir;
pub mod file;
mod handle;
pub mod mode;
pub mod transaction;

pub use dir::{StagedDir, open_staged_dir, with_staged_dir};
pub use file::{
    DirectFile, OpenedFile, StageOptions, StagedFile, open_staged_file, with_staged_file,
};
pub use mode::{Access, Capabilities, Mode};
pub use transaction::{Finish, TransactionState, scoped};

pub(crate) use dir::copy_entry;
