//! Public entry points: compile schema text, then decode and encode payloads.

use std::borrow::Cow;
use std::sync::Arc;

use serde_json::Value;

use crate::alias;
use crate::boc::Boc;
use crate::codec;
use crate::compiler::{compile, Program};
use crate::error::{CodecError, CompileError};

/// Stateless schema compiler.
#[derive(Debug, Clone, Copy, Default)]
pub struct TlbRuntime;

impl TlbRuntime {
    pub fn new() -> Self {
        TlbRuntime
    }

    pub fn expand_aliases<'a>(&self, schema: &'a str) -> Cow<'a, str> {
        alias::expand_aliases(schema)
    }

    /// Compile already-expanded schema text.
    pub fn compile(&self, schema: &str) -> Result<Transformer, CompileError> {
        let program = compile(schema)?;
        tracing::debug!(
            "compiled schema: {} types, {} constructors, root `{}`",
            program.type_names().count(),
            program.constructor_count(),
            program.root()
        );
        Ok(Transformer {
            schema: schema.to_string(),
            program: Arc::new(program),
        })
    }

    /// Expand aliases, then compile.
    pub fn load(&self, schema: &str) -> Result<Transformer, CompileError> {
        self.compile(&self.expand_aliases(schema))
    }
}

/// A compiled schema, ready to move payloads between BoC and JSON.
#[derive(Debug, Clone)]
pub struct Transformer {
    schema: String,
    program: Arc<Program>,
}

impl Transformer {
    /// The text this transformer was compiled from.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Decode hex or base64 BoC text into a JSON value of the root type.
    pub fn decode(&self, binary: &str) -> Result<Value, CodecError> {
        let root = Boc::from_text(binary)?.root()?;
        codec::decode_cell(&self.program, &root)
    }

    pub fn encode(&self, value: &Value) -> Result<Boc, CodecError> {
        let root = codec::encode_value(&self.program, value)?;
        Ok(Boc::from_cell(&root))
    }
}
