use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliOptions {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search an installer tree and extract the firmware blocks it contains
    Extract(ExtractArgs),
    /// Write a block catalog describing every file in a directory
    Author(AuthorArgs),
}

#[derive(clap::Args, Debug)]
pub struct ExtractArgs {
    /// Root of the unpacked installer tree
    #[arg(short, long)]
    pub source: PathBuf,

    /// Base directory for timestamped extraction directories
    #[arg(short, long, default_value = "./firmware")]
    pub output: PathBuf,

    /// Catalog file (overrides the configured search paths)
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Optional path to config file (YAML)
    #[arg(long)]
    pub config_path: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct AuthorArgs {
    /// Directory holding one file per reference block
    #[arg(short, long)]
    pub dir: PathBuf,

    /// Write the catalog here instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub fn parse() -> CliOptions {
    CliOptions::parse()
}
