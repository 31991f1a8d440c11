//! `tlbsync check [--schema ..] [--json]`

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use tlbsync_runtime::TlbRuntime;

use super::resolve_schema;
use crate::SchemaArg;

/// Compile a schema without touching any payload.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// TL-B schema text, or `@path` to read it from a file.
    #[arg(long, short = 's', value_name = "SCHEMA")]
    pub schema: Option<SchemaArg>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct CheckReport<'a> {
    root: &'a str,
    constructors: usize,
    types: Vec<&'a str>,
}

impl CheckArgs {
    pub fn run(self) -> Result<()> {
        let schema = resolve_schema(self.schema.as_ref())?;
        let transformer = TlbRuntime::new()
            .load(&schema)
            .context("schema does not compile")?;
        let program = transformer.program();

        let report = CheckReport {
            root: program.root(),
            constructors: program.constructor_count(),
            types: program.type_names().collect(),
        };
        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        println!(
            "{} {} types, {} constructors",
            "✓".green(),
            report.types.len(),
            report.constructors
        );
        for name in &report.types {
            if *name == report.root {
                println!("  {} {}", name.bold(), "(root)".dimmed());
            } else {
                println!("  {name}");
            }
        }
        Ok(())
    }
}
