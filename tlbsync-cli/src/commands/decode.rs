//! `tlbsync decode [--schema ..] <BINARY>`

use anyhow::{Context, Result};
use clap::Args;

use tlbsync_sync::{Seed, Synchronizer};

use super::resolve_schema;
use crate::SchemaArg;

/// Decode a payload and print its JSON view.
#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// TL-B schema text, or `@path` to read it from a file.
    #[arg(long, short = 's', value_name = "SCHEMA")]
    pub schema: Option<SchemaArg>,

    /// Bag of cells as hex or base64.
    pub binary: String,
}

impl DecodeArgs {
    pub fn run(self) -> Result<()> {
        let schema = resolve_schema(self.schema.as_ref())?;
        let mut sync = Synchronizer::new(Seed::new(schema)).context("schema rejected")?;
        let state = sync
            .set_binary(&self.binary)
            .context("failed to decode payload")?;
        println!("{}", state.structured);
        Ok(())
    }
}
