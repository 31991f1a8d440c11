//! The seam between the synchronizer and a schema runtime.
//!
//! The synchronizer only sees these two traits. Errors cross the seam as
//! plain messages; the synchronizer adds its own category prefix.

use std::borrow::Cow;

use serde_json::Value;

use tlbsync_runtime::{Boc, TlbRuntime, Transformer};

/// Compiles schema text into a [`CellTransformer`].
pub trait SchemaRuntime {
    type Transformer: CellTransformer;

    /// Splice built-in fragments into the schema before compiling.
    fn expand_aliases<'a>(&self, schema: &'a str) -> Cow<'a, str>;

    fn compile(&self, schema: &str) -> Result<Self::Transformer, String>;
}

/// Decode/encode pair produced by a [`SchemaRuntime`].
pub trait CellTransformer {
    /// Exact text the transformer was compiled from.
    fn schema(&self) -> &str;

    fn decode(&self, binary: &str) -> Result<Value, String>;

    fn encode(&self, value: &Value) -> Result<Boc, String>;
}

impl SchemaRuntime for TlbRuntime {
    type Transformer = Transformer;

    fn expand_aliases<'a>(&self, schema: &'a str) -> Cow<'a, str> {
        TlbRuntime::expand_aliases(self, schema)
    }

    fn compile(&self, schema: &str) -> Result<Transformer, String> {
        TlbRuntime::compile(self, schema).map_err(|e| e.to_string())
    }
}

impl CellTransformer for Transformer {
    fn schema(&self) -> &str {
        Transformer::schema(self)
    }

    fn decode(&self, binary: &str) -> Result<Value, String> {
        Transformer::decode(self, binary).map_err(|e| e.to_string())
    }

    fn encode(&self, value: &Value) -> Result<Boc, String> {
        Transformer::encode(self, value).map_err(|e| e.to_string())
    }
}
