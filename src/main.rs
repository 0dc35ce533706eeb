//! Binary entry point for `staged`.

use std::process;

fn main() {
    if let Err(e) = staged_fs::run() {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
