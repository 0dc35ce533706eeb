pub mod cat;
pub mod sync;
pub mod write;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Command {
    /// Stage a file, fill it from stdin and commit it.
    Write(write::WriteArgs),
    /// Print a file.
    Cat(cat::CatArgs),
    /// Copy a directory's entries into a staged copy of another and commit it.
    Sync(sync::SyncArgs),
}
