//! contribs: operator CLI for contributor boxes.
//!
//! Manages the local content database, contributor assignments and display
//! options, and renders posts and author archives.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
