use crate::fs::{StageOptions, with_staged_file};

use anyhow::Context;
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
pub struct CatArgs {
    /// File to print
    pub path: PathBuf,
}

pub fn execute(args: CatArgs) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();

    with_staged_file(&args.path, "rb", StageOptions::new(), |file| {
        io::copy(file, &mut stdout)
    })
    .with_context(|| format!("Failed to read {}", args.path.display()))?;

    stdout.flush()?;
    Ok(())
}
