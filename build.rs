//! Renders `capacity-hunter.1` into `OUT_DIR`.
//!
//! Release archives ship the page next to the binary so operators can read
//! `man capacity-hunter` for the retry budget flags. The page is built from
//! the same clap definition the binary parses.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = io::stdout();
    for watched in ["build.rs", "src/cli/mod.rs"] {
        writeln!(stdout, "cargo:rerun-if-changed={watched}")?;
    }

    let out_dir = env::var_os("OUT_DIR")
        .map(PathBuf::from)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "OUT_DIR was not set"))?;
    let page_name = format!("{}.1", env!("CARGO_PKG_NAME"));

    let mut page = Vec::new();
    Man::new(cli::Cli::command()).render(&mut page)?;
    fs::write(out_dir.join(page_name), page)?;

    Ok(())
}
