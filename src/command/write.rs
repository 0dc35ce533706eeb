use crate::error::StageError;
use crate::fs::{Mode, StageOptions, with_staged_file};

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use std::io;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(verbatim_doc_comment)]
pub struct WriteArgs {
    /// File to write
    pub path: PathBuf,

    /// Open mode
    ///
    /// Staged: w, w+, r+, a, a+ (plus b variants).
    /// Direct: x, x+ create the file exclusively; r is read-only.
    #[arg(long, short = 'm', default_value = "w", verbatim_doc_comment)]
    pub mode: String,

    /// Create missing parent directories when committing
    #[arg(long, short = 'p')]
    pub parents: bool,

    /// Buffer writes in memory, flushing every BYTES bytes
    #[arg(long, value_name = "BYTES")]
    pub buffer_size: Option<usize>,
}

pub fn execute(args: WriteArgs) -> anyhow::Result<()> {
    let mode: Mode = args.mode.parse()?;
    let mut options = StageOptions::new().create_parents(args.parents);
    if let Some(capacity) = args.buffer_size {
        options = options.buffer_capacity(capacity);
    }

    log::debug!("Writing {} with mode {}", args.path.display(), mode);

    let mut stdin = io::stdin().lock();
    let written = with_staged_file(&args.path, &args.mode, options, |file| {
        io::copy(&mut stdin, file).map_err(StageError::from)
    })
    .with_context(|| format!("Failed to write {}", args.path.display()))?;

    let label = if mode.is_staged() {
        "Committed"
    } else {
        "Wrote"
    };
    println!(
        "{:>12} {} ({} bytes)",
        label.green().bold(),
        args.path.display(),
        written
    );
    Ok(())
}
