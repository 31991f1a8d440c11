//! End-to-end runtime tests: schema text in, BoC text and JSON out.

use rstest::rstest;
use serde_json::{json, Value};
use tlbsync_runtime::{CodecError, CompileError, TlbRuntime, Transformer};

const MESSAGE_SCHEMA: &str = "message#_ len:(## 7) { len <= 127 } text:(bits (len * 8)) = Message;";
const MESSAGE_BOC: &str = "te6cckEBAQEAFwAAKSioyuboQNrK5ubCzspA0txAxsrY2Whv0fw=";
const JETTON_BURN: &str = "block.tlb burn#595f07bc query_id:uint64 amount:(VarUInteger 16) \
     response_destination:MsgAddress custom_payload:(Maybe ^Cell) = InternalMsgBody;";
const ZERO_MASTER: &str = "Ef8AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAADAU";

fn load(schema: &str) -> Transformer {
    TlbRuntime::new().load(schema).unwrap()
}

// ---------------------------------------------------------------------------
// Reference vectors
// ---------------------------------------------------------------------------

#[rstest]
#[case::foo_42("_ x:# = Foo;", json!({"kind": "Foo", "x": 42}), "te6cckEBAQEABgAACAAAACoFpvBE")]
#[case::foo_73("_ x:# = Foo;", json!({"kind": "Foo", "x": 73}), "te6cckEBAQEABgAACAAAAEmTxmY2")]
#[case::message(MESSAGE_SCHEMA, json!({"kind": "Message", "len": 8, "text": "new data"}), "te6cckEBAQEACwAAERDcyu5AyMLow1FQ+MA=")]
#[case::jetton_burn(
    JETTON_BURN,
    json!({
        "kind": "InternalMsgBody",
        "query_id": 0,
        "amount": "1",
        "response_destination": ZERO_MASTER,
        "custom_payload": {"kind": "Maybe_nothing"},
    }),
    "te6cckEBAQEAMQAAXllfB7wAAAAAAAAAABAZ/gAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA8gPSJw=="
)]
fn encodes_to_reference_base64(#[case] schema: &str, #[case] value: Value, #[case] expected: &str) {
    let boc = load(schema).encode(&value).unwrap();
    assert_eq!(boc.to_base64(), expected);
}

#[test]
fn foo_hex_vector() {
    let boc = load("_ x:# = Foo;").encode(&json!({"kind": "Foo", "x": 42})).unwrap();
    assert_eq!(boc.to_hex(), "b5ee9c724101010100060000080000002a05a6f044");
}

#[test]
fn decodes_default_message() {
    let value = load(MESSAGE_SCHEMA).decode(MESSAGE_BOC).unwrap();
    assert_eq!(value, json!({"kind": "Message", "len": 20, "text": "Test message in cell"}));
}

#[test]
fn decodes_message_bytes_as_foo() {
    let value = load("_ x:# = Foo;").decode(MESSAGE_BOC).unwrap();
    assert_eq!(value, json!({"kind": "Foo", "x": 682150630}));
}

#[test]
fn decodes_jetton_burn_from_hex() {
    let hex = "b5ee9c7241010101003100005e595f07bc000000000000000012a9fe0000000000000000000000000000000000000000000000000000000000000000e3f10fd5";
    let value = load(JETTON_BURN).decode(hex).unwrap();
    let pretty = serde_json::to_string_pretty(&value).unwrap();
    assert_eq!(
        pretty,
        serde_json::to_string_pretty(&json!({
            "kind": "InternalMsgBody",
            "query_id": "0",
            "amount": "42",
            "response_destination": ZERO_MASTER,
            "custom_payload": {"kind": "Maybe_nothing"},
        }))
        .unwrap()
    );
}

#[test]
fn raw_address_form_is_accepted() {
    let transformer = load(JETTON_BURN);
    let friendly = json!({
        "kind": "InternalMsgBody", "query_id": "0", "amount": "1",
        "response_destination": ZERO_MASTER, "custom_payload": {"kind": "Maybe_nothing"},
    });
    let mut raw = friendly.clone();
    raw["response_destination"] = json!(format!("-1:{}", "0".repeat(64)));
    assert_eq!(transformer.encode(&friendly).unwrap(), transformer.encode(&raw).unwrap());
}

#[test]
fn addr_none_roundtrips_as_null() {
    let transformer = load("block.tlb _ dest:MsgAddress = Dest;");
    let boc = transformer.encode(&json!({"kind": "Dest", "dest": null})).unwrap();
    assert_eq!(transformer.decode(&boc.to_base64()).unwrap(), json!({"kind": "Dest", "dest": null}));
}

#[test]
fn payload_can_be_url_safe_without_padding() {
    let url_safe = MESSAGE_BOC.replace('+', "-").replace('/', "_").trim_end_matches('=').to_string();
    assert_eq!(
        load(MESSAGE_SCHEMA).decode(&url_safe).unwrap(),
        load(MESSAGE_SCHEMA).decode(MESSAGE_BOC).unwrap()
    );
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[rstest]
#[case::lone_hash("#")]
#[case::missing_semicolon("_ x:# = Foo")]
#[case::unknown_type("_ x:Nope = Foo;")]
#[case::negation("_ x:~Foo = Foo;")]
fn bad_schemas_fail_to_compile(#[case] schema: &str) {
    assert!(TlbRuntime::new().load(schema).is_err());
}

#[test]
fn empty_schema_is_its_own_error() {
    assert_eq!(TlbRuntime::new().compile("   ").unwrap_err(), CompileError::Empty);
}

#[test]
fn garbage_payload_is_rejected() {
    let err = load(MESSAGE_SCHEMA).decode("invalid-base64-string!@#").unwrap_err();
    assert!(matches!(err, CodecError::Payload(_)), "got: {err}");
}

#[test]
fn wrong_kind_fails_to_encode() {
    let err = load("_ x:# = Foo;")
        .encode(&json!({"kind": "Message", "len": 1, "text": "a"}))
        .unwrap_err();
    assert_eq!(err.to_string(), "unknown kind `Message` for type `Foo`");
}

#[test]
fn text_longer_than_len_fails() {
    let err = load(MESSAGE_SCHEMA)
        .encode(&json!({"kind": "Message", "len": 2, "text": "abc"}))
        .unwrap_err();
    assert_eq!(err.to_string(), "in field `text`: expected 16 bits, got 24");
}

#[test]
fn var_uinteger_length_bound_is_enforced() {
    let transformer = load("block.tlb _ v:(VarUInteger 2) = V;");
    assert!(transformer.encode(&json!({"kind": "V", "v": "255"})).is_ok());
    assert!(transformer.encode(&json!({"kind": "V", "v": "256"})).is_err());
}
