#![doc = include_str!("../README.md")]

pub mod cli;
pub mod command;
pub mod error;
pub mod fs;

pub use error::*;
pub use fs::{
    OpenedFile, StageOptions, StagedDir, StagedFile, TransactionState, open_staged_dir,
    open_staged_file, scoped, with_staged_dir, with_staged_file,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn run() -> anyhow::Result<()> {
    use clap::Parser;
    use command::Command;

    let cli = cli::Cli::parse();
    cli::init_logging(cli.verbose);

    match cli.command {
        Command::Write(args) => command::write::execute(args),
        Command::Cat(args) => command::cat::execute(args),
        Command::Sync(args) => command::sync::execute(args),
    }
}
