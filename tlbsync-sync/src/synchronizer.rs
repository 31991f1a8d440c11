//! The state synchronizer: schema, binary and structured text kept in step.
//!
//! ## Failure policy
//!
//! | operation        | on failure                                              |
//! |------------------|---------------------------------------------------------|
//! | `set_schema`     | previous transformer kept; no field changes             |
//! | `set_binary`     | raw binary text kept; structured text unchanged         |
//! | `set_structured` | trimmed structured text kept; binary unchanged          |
//! | `set_binary_format` | nothing changes                                      |
//!
//! A schema edit that compiles but whose dependent re-derivation fails keeps
//! the new schema and leaves the dependent field at its last good value.

use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;

use tlbsync_core::{Config, DataFormat, ResolutionPolicy, SyncState, EMPTY_STRUCTURED};
use tlbsync_runtime::{Boc, TlbRuntime};

use crate::error::{SyncFailure, SyncResult};
use crate::runtime::{CellTransformer, SchemaRuntime};

// ---------------------------------------------------------------------------
// Seed
// ---------------------------------------------------------------------------

/// Initial contents for [`Synchronizer::with_runtime`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Seed {
    pub schema: String,
    /// Wins over `structured` when both are non-empty.
    pub binary: Option<String>,
    pub structured: Option<String>,
    pub format: DataFormat,
}

impl Seed {
    pub fn new(schema: impl Into<String>) -> Self {
        Seed {
            schema: schema.into(),
            ..Seed::default()
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    pub fn with_structured(mut self, structured: impl Into<String>) -> Self {
        self.structured = Some(structured.into());
        self
    }

    pub fn with_format(mut self, format: DataFormat) -> Self {
        self.format = format;
        self
    }
}

impl From<&Config> for Seed {
    fn from(config: &Config) -> Self {
        Seed {
            schema: config.schema.clone(),
            binary: config.binary.clone(),
            structured: config.structured.clone(),
            format: config.format,
        }
    }
}

// ---------------------------------------------------------------------------
// Synchronizer
// ---------------------------------------------------------------------------

/// Owns the compiled transformer and the binary/structured text.
///
/// The schema text is whatever the active transformer was compiled from, so
/// the schema and transformer can never disagree.
pub struct Synchronizer<R: SchemaRuntime = TlbRuntime> {
    runtime: R,
    transformer: R::Transformer,
    binary: String,
    binary_format: DataFormat,
    structured: String,
}

impl Synchronizer<TlbRuntime> {
    /// Synchronizer over the bundled TL-B runtime.
    pub fn new(seed: Seed) -> Result<Self, SyncFailure> {
        Self::with_runtime(TlbRuntime::new(), seed)
    }
}

impl<R: SchemaRuntime> Synchronizer<R> {
    /// Compile the seed schema, then derive from the seed binary (or, when
    /// there is none, the seed structured text). Any failure is returned.
    pub fn with_runtime(runtime: R, seed: Seed) -> Result<Self, SyncFailure> {
        let transformer = compile(&runtime, &seed.schema)?;
        let mut sync = Synchronizer {
            runtime,
            transformer,
            binary: String::new(),
            binary_format: seed.format,
            structured: EMPTY_STRUCTURED.to_string(),
        };
        match (seed.binary.as_deref(), seed.structured.as_deref()) {
            (Some(binary), _) if !binary.is_empty() => {
                sync.set_binary(binary)?;
            }
            (_, Some(structured)) if !structured.is_empty() => {
                sync.set_structured(structured)?;
            }
            _ => {}
        }
        Ok(sync)
    }

    /// Read-only copy of the current state.
    pub fn snapshot(&self) -> SyncState {
        SyncState {
            schema: self.transformer.schema().to_string(),
            binary: self.binary.clone(),
            binary_format: self.binary_format,
            structured: self.structured.clone(),
        }
    }

    pub fn transformer(&self) -> &R::Transformer {
        &self.transformer
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Replace the schema, then re-derive according to `policy`.
    pub fn set_schema(&mut self, schema: &str, policy: ResolutionPolicy) -> SyncResult {
        if schema.trim().is_empty() {
            return Err(SyncFailure::empty_schema());
        }
        let expanded = self.runtime.expand_aliases(schema);
        if expanded == self.transformer.schema() {
            tracing::debug!("schema unchanged; skipping compilation");
            return Ok(self.snapshot());
        }

        let transformer = guarded(|| self.runtime.compile(&expanded)).map_err(|e| {
            tracing::debug!("schema rejected: {e}");
            SyncFailure::compile(e)
        })?;
        self.transformer = transformer;
        tracing::debug!("schema replaced; re-deriving from {policy}");

        match policy {
            ResolutionPolicy::PreferBinary => {
                let binary = self.binary.clone();
                self.set_binary(&binary)
            }
            ResolutionPolicy::PreferStructured => {
                let structured = self.structured.clone();
                self.set_structured(&structured)
            }
        }
    }

    /// Replace the binary text and re-derive the structured text.
    pub fn set_binary(&mut self, binary: &str) -> SyncResult {
        if binary.trim().is_empty() {
            self.binary.clear();
            self.structured = EMPTY_STRUCTURED.to_string();
            return Ok(self.snapshot());
        }

        self.binary = binary.to_string();
        let value = guarded(|| self.transformer.decode(binary)).map_err(|e| {
            tracing::debug!("binary rejected: {e}");
            SyncFailure::parse(e)
        })?;
        self.structured = serde_json::to_string_pretty(&value).map_err(SyncFailure::parse)?;
        Ok(self.snapshot())
    }

    /// Replace the structured text and re-derive the binary text.
    pub fn set_structured(&mut self, structured: &str) -> SyncResult {
        let trimmed = structured.trim();
        self.structured = trimmed.to_string();

        let value: Value = serde_json::from_str(trimmed).map_err(|e| {
            tracing::debug!("structured text is not JSON: {e}");
            SyncFailure::encode(e)
        })?;
        let boc = guarded(|| self.transformer.encode(&value)).map_err(|e| {
            tracing::debug!("structured value rejected: {e}");
            SyncFailure::encode(e)
        })?;
        self.binary = render(&boc, self.binary_format);
        Ok(self.snapshot())
    }

    /// Switch the textual encoding of the binary field, re-rendering the
    /// current payload.
    pub fn set_binary_format(&mut self, format: DataFormat) -> SyncResult {
        if !self.binary.trim().is_empty() {
            let boc = Boc::from_text(&self.binary).map_err(SyncFailure::parse)?;
            self.binary = render(&boc, format);
        }
        self.binary_format = format;
        Ok(self.snapshot())
    }
}

fn compile<R: SchemaRuntime>(runtime: &R, schema: &str) -> Result<R::Transformer, SyncFailure> {
    if schema.trim().is_empty() {
        return Err(SyncFailure::empty_schema());
    }
    let expanded = runtime.expand_aliases(schema);
    guarded(|| runtime.compile(&expanded)).map_err(SyncFailure::compile)
}

fn render(boc: &Boc, format: DataFormat) -> String {
    match format {
        DataFormat::Hex => boc.to_hex(),
        DataFormat::Base64 => boc.to_base64(),
    }
}

/// Run a runtime call, turning a panic into an error message.
fn guarded<T>(call: impl FnOnce() -> Result<T, String>) -> Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!("schema runtime panicked: {message}");
            Err(format!("runtime panic: {message}"))
        }
    }
}
