//! Command-line arguments

use clap::{Parser, Subcommand};

/// Sync domain blocklists into Cloudflare Zero Trust Gateway lists and rules
#[derive(Parser, Debug)]
#[command(name = "gatesync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Perform lookups only; log every change instead of making it
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Upload the blocklist as managed lists and upsert the managed rules
    Upload,
    /// Upsert the managed rules over the managed lists already uploaded
    CreateRules,
    /// Delete managed rules, then managed lists
    Delete,
    /// Delete everything managed, then upload again
    Sync,
}

impl Command {
    /// Whether the command needs the domain files
    pub fn reads_domains(&self) -> bool {
        matches!(self, Command::Upload | Command::Sync)
    }
}
