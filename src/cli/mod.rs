//! Command-line interface.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "price-watch",
    about = "Price-intelligence pipeline for LLM inference services",
    version
)]
pub struct Cli {
    /// Run one tick and exit instead of looping.
    #[arg(long)]
    pub once: bool,

    /// Optional TOML configuration file; the environment overrides it.
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
