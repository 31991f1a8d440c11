pub mod check;
pub mod config;
pub mod decode;
pub mod encode;
pub mod session;

use anyhow::{Context, Result};

use crate::SchemaArg;

/// The `--schema` argument, or the configured schema when absent.
pub(crate) fn resolve_schema(arg: Option<&SchemaArg>) -> Result<String> {
    match arg {
        Some(schema) => schema.read(),
        None => Ok(tlbsync_core::config::load().context("failed to load config")?.schema),
    }
}
