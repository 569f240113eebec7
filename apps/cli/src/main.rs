//! nbforge CLI — notebook collection build and publication tool.
//!
//! Discovers buildable notebook categories, runs their builds in isolated
//! processes, and merges the resulting artifacts into a published site.

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
