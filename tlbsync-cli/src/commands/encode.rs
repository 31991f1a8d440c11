//! `tlbsync encode [--schema ..] [--format hex|base64] <JSON>`

use anyhow::{Context, Result};
use clap::Args;

use tlbsync_core::DataFormat;
use tlbsync_sync::{Seed, Synchronizer};

use super::resolve_schema;
use crate::SchemaArg;

/// Encode a JSON value and print the payload.
#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// TL-B schema text, or `@path` to read it from a file.
    #[arg(long, short = 's', value_name = "SCHEMA")]
    pub schema: Option<SchemaArg>,

    /// Output encoding: hex | base64.
    #[arg(long, short = 'f', value_name = "FORMAT", default_value_t = DataFormat::Base64)]
    pub format: DataFormat,

    /// JSON value of the schema's root type.
    pub json: String,
}

impl EncodeArgs {
    pub fn run(self) -> Result<()> {
        let schema = resolve_schema(self.schema.as_ref())?;
        let seed = Seed::new(schema).with_format(self.format);
        let mut sync = Synchronizer::new(seed).context("schema rejected")?;
        let state = sync
            .set_structured(&self.json)
            .context("failed to encode value")?;
        println!("{}", state.binary);
        Ok(())
    }
}
