//! tlbsync: keep a TL-B schema, a bag of cells and its JSON view in step.
//!
//! # Usage
//!
//! ```text
//! tlbsync decode  [--schema <TEXT|@FILE>] <BINARY>
//! tlbsync encode  [--schema <TEXT|@FILE>] [--format hex|base64] <JSON>
//! tlbsync check   [--schema <TEXT|@FILE>] [--json]
//! tlbsync session [--schema <TEXT|@FILE>] [--format hex|base64]
//! tlbsync config show|path|init
//! ```
//!
//! Without `--schema`, the schema from `~/.tlbsync/config.yaml` (or the
//! built-in Message schema) is used.

mod commands;

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{
    check::CheckArgs, config::ConfigCommand, decode::DecodeArgs, encode::EncodeArgs,
    session::SessionArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "tlbsync",
    version,
    about = "Convert bag-of-cells payloads to JSON and back through a TL-B schema",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode a hex or base64 payload into JSON.
    Decode(DecodeArgs),

    /// Encode a JSON value into a payload.
    Encode(EncodeArgs),

    /// Compile a schema and list its types.
    Check(CheckArgs),

    /// Run an edit session speaking JSON lines on stdin/stdout.
    Session(SessionArgs),

    /// Inspect or create the configuration file.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

// ---------------------------------------------------------------------------
// Shared schema argument
// ---------------------------------------------------------------------------

/// Schema text given inline, or `@path` to read it from a file.
#[derive(Debug, Clone)]
pub enum SchemaArg {
    Inline(String),
    File(PathBuf),
}

impl SchemaArg {
    pub fn read(&self) -> Result<String> {
        match self {
            SchemaArg::Inline(text) => Ok(text.clone()),
            SchemaArg::File(path) => std::fs::read_to_string(path)
                .with_context(|| format!("cannot read schema file '{}'", path.display())),
        }
    }
}

impl FromStr for SchemaArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.strip_prefix('@') {
            Some("") => Err("expected a file path after '@'".to_string()),
            Some(path) => Ok(SchemaArg::File(PathBuf::from(path))),
            None => Ok(SchemaArg::Inline(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Decode(args) => args.run(),
        Commands::Encode(args) => args.run(),
        Commands::Check(args) => args.run(),
        Commands::Session(args) => args.run(),
        Commands::Config { command } => commands::config::run(command),
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_arg_distinguishes_files() {
        assert!(matches!("@s.tlb".parse::<SchemaArg>(), Ok(SchemaArg::File(p)) if p == PathBuf::from("s.tlb")));
        assert!(matches!("_ x:# = Foo;".parse::<SchemaArg>(), Ok(SchemaArg::Inline(_))));
        assert!("@".parse::<SchemaArg>().is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
