use std::borrow::Cow;
use std::cell::Cell;
use std::rc::Rc;

use rstest::rstest;
use serde_json::{json, Value};
use tlbsync_core::{Config, DataFormat, ResolutionPolicy};
use tlbsync_runtime::{Boc, TlbRuntime, Transformer};
use tlbsync_sync::{CellTransformer, FailureKind, SchemaRuntime, Seed, Synchronizer};

const FOO: &str = "_ x:# = Foo;";
const FOO_42: &str = "te6cckEBAQEABgAACAAAACoFpvBE";
const FOO_42_JSON: &str = r#"{"kind":"Foo","x":42}"#;
const MESSAGE_NEW_DATA: &str = "te6cckEBAQEACwAAERDcyu5AyMLow1FQ+MA=";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn foo() -> Synchronizer {
    init_logging();
    Synchronizer::new(Seed::new(FOO)).expect("foo synchronizer")
}

fn defaults() -> Synchronizer {
    init_logging();
    Synchronizer::new(Seed::from(&Config::default())).expect("default synchronizer")
}

// ---------------------------------------------------------------------------
// Test runtimes
// ---------------------------------------------------------------------------

/// Bundled runtime that counts compilations.
#[derive(Clone, Default)]
struct CountingRuntime {
    compiles: Rc<Cell<usize>>,
}

impl SchemaRuntime for CountingRuntime {
    type Transformer = Transformer;

    fn expand_aliases<'a>(&self, schema: &'a str) -> Cow<'a, str> {
        TlbRuntime::new().expand_aliases(schema)
    }

    fn compile(&self, schema: &str) -> Result<Transformer, String> {
        self.compiles.set(self.compiles.get() + 1);
        TlbRuntime::new().compile(schema).map_err(|e| e.to_string())
    }
}

/// Compiles anything; decoding and encoding panic.
struct PanickingRuntime;

struct PanickingTransformer(String);

impl CellTransformer for PanickingTransformer {
    fn schema(&self) -> &str {
        &self.0
    }

    fn decode(&self, _binary: &str) -> Result<Value, String> {
        panic!("decoder exploded")
    }

    fn encode(&self, _value: &Value) -> Result<Boc, String> {
        panic!("encoder exploded")
    }
}

impl SchemaRuntime for PanickingRuntime {
    type Transformer = PanickingTransformer;

    fn expand_aliases<'a>(&self, schema: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(schema)
    }

    fn compile(&self, schema: &str) -> Result<PanickingTransformer, String> {
        Ok(PanickingTransformer(schema.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Concrete scenarios
// ---------------------------------------------------------------------------

#[test]
fn structured_edit_produces_deterministic_binary() {
    let mut sync = foo();
    let state = sync.set_structured(FOO_42_JSON).expect("encode");
    assert_eq!(state.binary, FOO_42);
    assert_eq!(state.structured, FOO_42_JSON);
}

#[test]
fn binary_edit_produces_pretty_structured_text() {
    let mut sync = foo();
    let state = sync.set_binary(FOO_42).expect("decode");
    assert_eq!(state.structured, "{\n  \"kind\": \"Foo\",\n  \"x\": 42\n}");
    assert_eq!(state.binary, FOO_42);
}

#[test]
fn empty_schema_is_rejected_without_change() {
    let mut sync = defaults();
    let before = sync.snapshot();
    let err = sync.set_schema("", ResolutionPolicy::PreferBinary).unwrap_err();
    assert_eq!(err.kind, FailureKind::EmptySchema);
    assert_eq!(err.message, "Schema cannot be empty");
    assert_eq!(sync.snapshot(), before);
}

#[test]
fn malformed_json_is_an_encode_failure() {
    let mut sync = foo();
    sync.set_structured(FOO_42_JSON).expect("encode");
    let err = sync.set_structured(r#"{"invalid": json,}"#).unwrap_err();
    assert_eq!(err.kind, FailureKind::Encode);
    assert!(err.message.starts_with("Encode "), "got: {}", err.message);
    let state = sync.snapshot();
    assert_eq!(state.binary, FOO_42);
    assert_eq!(state.structured, r#"{"invalid": json,}"#);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn default_session_decodes_sample_payload() {
    let state = defaults().snapshot();
    let value: Value = serde_json::from_str(&state.structured).expect("json");
    assert_eq!(value["kind"], json!("Message"));
    assert_eq!(value["text"], json!("Test message in cell"));
}

#[test]
fn unchanged_schema_does_not_recompile() {
    init_logging();
    let runtime = CountingRuntime::default();
    let compiles = Rc::clone(&runtime.compiles);
    let mut sync = Synchronizer::with_runtime(runtime, Seed::new(FOO).with_binary(FOO_42)).expect("seed");
    assert_eq!(compiles.get(), 1);

    let before = sync.snapshot();
    let after = sync.set_schema(FOO, ResolutionPolicy::PreferStructured).expect("same schema");
    assert_eq!(after, before);
    assert_eq!(compiles.get(), 1);
}

#[test]
fn aliased_schema_compares_after_expansion() {
    init_logging();
    let runtime = CountingRuntime::default();
    let compiles = Rc::clone(&runtime.compiles);
    let schema = "block.tlb _ c:Coins = Price;";
    let mut sync = Synchronizer::with_runtime(runtime, Seed::new(schema)).expect("seed");
    sync.set_schema(schema, ResolutionPolicy::PreferBinary).expect("same schema");
    assert_eq!(compiles.get(), 1);
    assert!(sync.snapshot().schema.contains("VarUInteger"));
}

#[test]
fn displayed_aliased_schema_resubmits_without_recompiling() {
    init_logging();
    let runtime = CountingRuntime::default();
    let compiles = Rc::clone(&runtime.compiles);
    let mut sync =
        Synchronizer::with_runtime(runtime, Seed::new("block.tlb _ c:Coins = Price;")).expect("seed");
    let shown = sync.snapshot();

    let after = sync
        .set_schema(&shown.schema, ResolutionPolicy::PreferStructured)
        .expect("displayed schema is accepted");
    assert_eq!(after, shown);
    assert_eq!(compiles.get(), 1);
}

#[rstest]
#[case("_ x:int127 = Foo;", "-1")]
#[case("_ x:int127 = Foo;", "-85070591730234615865843651857942052864")]
#[case("_ x:int128 = Foo;", "-1")]
#[case("_ x:int128 = Foo;", "-170141183460469231731687303715884105728")]
fn widest_signed_fields_round_trip(#[case] schema: &str, #[case] x: &str) {
    init_logging();
    let mut sync = Synchronizer::new(Seed::new(schema)).expect("schema");
    let binary = sync
        .set_structured(&json!({ "kind": "Foo", "x": x }).to_string())
        .expect("encode")
        .binary;
    let structured = sync.set_binary(&binary).expect("decode").structured;
    let decoded: Value = serde_json::from_str(&structured).expect("json");
    assert_eq!(decoded["x"], json!(x));
}

#[rstest]
#[case(r#"{"kind":"Foo","x":0}"#)]
#[case(r#"{"kind":"Foo","x":42}"#)]
#[case(r#"{"kind":"Foo","x":4294967295}"#)]
fn structured_binary_round_trip(#[case] text: &str) {
    let mut sync = foo();
    let binary = sync.set_structured(text).expect("encode").binary;
    let structured = sync.set_binary(&binary).expect("decode").structured;
    let original: Value = serde_json::from_str(text).expect("json");
    let decoded: Value = serde_json::from_str(&structured).expect("json");
    assert_eq!(decoded, original);
}

#[rstest]
#[case("")]
#[case("   ")]
#[case("\n\t")]
fn blank_binary_clears_both_fields(#[case] blank: &str) {
    let mut sync = defaults();
    let state = sync.set_binary(blank).expect("blank binary always succeeds");
    assert_eq!(state.binary, "");
    assert_eq!(state.structured, "{}");
}

#[test]
fn rejected_binary_keeps_raw_text() {
    let mut sync = defaults();
    let structured_before = sync.snapshot().structured;
    let err = sync.set_binary("invalid-base64-string!@#").unwrap_err();
    assert_eq!(err.kind, FailureKind::Parse);
    assert!(err.message.starts_with("Parse "), "got: {}", err.message);
    let state = sync.snapshot();
    assert_eq!(state.binary, "invalid-base64-string!@#");
    assert_eq!(state.structured, structured_before);
}

#[test]
fn compile_failure_keeps_previous_schema() {
    let mut sync = defaults();
    let before = sync.snapshot();
    let err = sync.set_schema("#", ResolutionPolicy::PreferBinary).unwrap_err();
    assert_eq!(err.kind, FailureKind::SchemaCompile);
    assert_eq!(sync.snapshot(), before);
}

#[test]
fn new_binary_under_default_schema() {
    let mut sync = defaults();
    let state = sync.set_binary(MESSAGE_NEW_DATA).expect("decode");
    assert_eq!(state.binary, MESSAGE_NEW_DATA);
    assert_eq!(
        state.structured,
        serde_json::to_string_pretty(&json!({"kind": "Message", "len": 8, "text": "new data"})).unwrap()
    );
}

#[test]
fn unchanged_binary_keeps_state() {
    let mut sync = defaults();
    let before = sync.snapshot();
    let after = sync.set_binary(&before.binary).expect("decode");
    assert_eq!(after, before);
}

// ---------------------------------------------------------------------------
// Resolution policy
// ---------------------------------------------------------------------------

#[test]
fn schema_change_preferring_binary_reinterprets_payload() {
    let mut sync = defaults();
    let state = sync.set_schema(FOO, ResolutionPolicy::PreferBinary).expect("redecode");
    assert_eq!(state.schema, FOO);
    assert_eq!(state.structured, "{\n  \"kind\": \"Foo\",\n  \"x\": 682150630\n}");
}

#[test]
fn schema_change_preferring_structured_keeps_old_binary_on_failure() {
    let mut sync = defaults();
    let before = sync.snapshot();
    let err = sync.set_schema(FOO, ResolutionPolicy::PreferStructured).unwrap_err();
    assert_eq!(err.kind, FailureKind::Encode);
    let state = sync.snapshot();
    assert_eq!(state.schema, FOO);
    assert_eq!(state.binary, before.binary);
    assert_eq!(state.structured, before.structured);
}

#[test]
fn structured_edit_respects_hex_format() {
    init_logging();
    let mut sync = Synchronizer::new(Seed::new(FOO).with_format(DataFormat::Hex)).expect("seed");
    let state = sync.set_structured(FOO_42_JSON).expect("encode");
    assert_eq!(state.binary, "b5ee9c724101010100060000080000002a05a6f044");
}

#[test]
fn structured_seed_is_used_without_binary() {
    init_logging();
    let sync = Synchronizer::new(Seed::new(FOO).with_structured(FOO_42_JSON)).expect("seed");
    assert_eq!(sync.snapshot().binary, FOO_42);
}

// ---------------------------------------------------------------------------
// Isolation and panics
// ---------------------------------------------------------------------------

#[test]
fn synchronizers_share_nothing() {
    let mut a = foo();
    let b = foo();
    a.set_structured(FOO_42_JSON).expect("encode");
    assert_eq!(b.snapshot().binary, "");
}

#[test]
fn runtime_panics_become_failures() {
    init_logging();
    let mut sync = Synchronizer::with_runtime(PanickingRuntime, Seed::new(FOO)).expect("seed");

    let err = sync.set_binary(FOO_42).unwrap_err();
    assert_eq!(err.kind, FailureKind::Parse);
    assert!(err.message.contains("decoder exploded"), "got: {}", err.message);

    let err = sync.set_structured(FOO_42_JSON).unwrap_err();
    assert_eq!(err.kind, FailureKind::Encode);
    assert!(err.message.contains("encoder exploded"), "got: {}", err.message);
}
