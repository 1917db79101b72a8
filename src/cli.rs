use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI definition for hash-gate.
#[derive(Parser, Debug)]
#[command(name = "hash-gate")]
#[command(about = "Password gate backed by a 32-bit rolling hash", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Prompt for a password on stdin and decide access (the default).
    Check(CheckArgs),
    /// Print the digest of each value (or each stdin line) as JSON.
    Hash(HashArgs),
    /// Search for inputs whose digest equals a target.
    Solve(SolveArgs),
}

/// Arguments for the `check` subcommand.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct CheckArgs {
    /// Consume at most this many bytes of the password line.
    #[arg(long, conflicts_with = "legacy_buffer")]
    pub max_line_bytes: Option<usize>,

    /// Truncate the password line at 127 bytes like the original fixed buffer.
    #[arg(long, default_value_t = false)]
    pub legacy_buffer: bool,

    /// Directory where access decisions are appended as JSONL.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

/// Arguments for the `hash` subcommand.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct HashArgs {
    /// Values to hash; stdin lines are used when none are given.
    pub values: Vec<String>,
}

/// Arguments for the `solve` subcommand.
#[derive(clap::Args, Debug, Clone)]
pub struct SolveArgs {
    /// Digest to invert, as hex (`0xDEADBEEF`) or decimal.
    #[arg(long, value_parser = parse_hash, default_value = "0xDEADBEEF")]
    pub target: u32,

    /// Bytes candidate preimages are built from.
    #[arg(
        long,
        default_value = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789"
    )]
    pub alphabet: String,

    /// Longest prefix kept in the forward table.
    #[arg(long, default_value_t = 3)]
    pub prefix_len: usize,

    /// Longest suffix unwound backwards from the target.
    #[arg(long, default_value_t = 4)]
    pub suffix_len: usize,

    /// Stop after this many preimages.
    #[arg(long, default_value_t = 1)]
    pub limit: usize,

    /// Maximum number of concurrent search workers.
    #[arg(long, default_value_t = 8)]
    pub concurrency: usize,
}

/// Parse a digest written as `0x`-prefixed hex or plain decimal.
pub fn parse_hash(raw: &str) -> Result<u32, String> {
    let trimmed = raw.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
        None => trimmed.parse::<u32>(),
    };
    parsed.map_err(|err| format!("invalid 32-bit digest `{raw}`: {err}"))
}
