use crate::fs::{copy_entry, with_staged_dir};

use anyhow::{Context, bail};
use clap::Parser;
use colored::Colorize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug, Clone)]
pub struct SyncArgs {
    /// Directory whose entries are copied in
    pub source: PathBuf,

    /// Directory to replace
    pub target: PathBuf,

    /// Start from an empty directory instead of the target's current contents
    #[arg(long)]
    pub clean: bool,
}

/// Entries from `source` replace same-named entries in the staged target.
pub fn execute(args: SyncArgs) -> anyhow::Result<()> {
    if !args.source.is_dir() {
        bail!("Source is not a directory: {}", args.source.display());
    }

    let copied = with_staged_dir(&args.target, |staged| -> anyhow::Result<usize> {
        if args.clean {
            for entry in fs::read_dir(staged.path())? {
                remove_path(&entry?.path())?;
            }
        }

        let mut copied = 0;
        for entry in fs::read_dir(&args.source)? {
            let entry = entry?;
            let dest = staged.path().join(entry.file_name());
            remove_path(&dest)?;
            copy_entry(&entry.path(), &dest)
                .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
            copied += 1;
        }
        Ok(copied)
    })
    .with_context(|| format!("Failed to sync {}", args.target.display()))?;

    println!(
        "{:>12} {} → {} ({} entries)",
        "Synced".green().bold(),
        args.source.display(),
        args.target.display(),
        copied
    );
    Ok(())
}

fn remove_path(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
