//! `tlbsync config show|path|init`

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use tlbsync_core::{config, Config};

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration (defaults when no file exists).
    Show(ShowArgs),

    /// Print the configuration file location.
    Path,

    /// Write the default configuration to disk.
    Init(InitArgs),
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Emit JSON instead of YAML.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}

pub fn run(cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show(args) => show(args),
        ConfigCommand::Path => path(),
        ConfigCommand::Init(args) => init(args),
    }
}

fn show(args: ShowArgs) -> Result<()> {
    let config = config::load().context("failed to load config")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print!("{}", serde_yaml::to_string(&config)?);
    }
    Ok(())
}

fn path() -> Result<()> {
    let path = config::config_path().context("could not determine home directory")?;
    println!("{}", path.display());
    Ok(())
}

fn init(args: InitArgs) -> Result<()> {
    let path = config::config_path().context("could not determine home directory")?;
    if path.exists() && !args.force {
        bail!(
            "config already exists at {}; pass --force to overwrite",
            path.display()
        );
    }
    let saved = config::save(&Config::default())
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("✓ Wrote default config to {}", saved.display());
    Ok(())
}
