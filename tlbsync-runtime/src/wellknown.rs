//! Compact JSON forms for well-known block types.
//!
//! The generic codec renders every type as `{kind, fields…}`. For a handful
//! of types from `block.tlb` that is needlessly verbose, so decoding
//! collapses them and encoding accepts the compact form back:
//!
//! | type                         | compact form                    |
//! |------------------------------|---------------------------------|
//! | `VarUInteger n`, `VarInteger n`, `Grams`, `Coins` | decimal string |
//! | `MsgAddressInt` (`addr_std`, no anycast) | friendly address      |
//! | `MsgAddress` holding `addr_none` | `null`                      |
//!
//! Values that do not have the expected generic shape pass through
//! untouched, so a schema defining its own type under one of these names
//! still round-trips in the generic form.

use serde_json::{json, Value};

use crate::address::StdAddress;
use crate::codec::{json_to_bits, json_to_i128, json_to_u128};
use crate::error::CodecError;

const ADDR_STD: &str = "MsgAddressInt_addr_std";
const ADDR_NONE: &str = "MsgAddressExt_addr_none";
const NO_ANYCAST: &str = "Maybe_nothing";

fn kind_is(value: &Value, kind: &str) -> bool {
    value.get("kind").and_then(Value::as_str) == Some(kind)
}

fn decimal(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) => Some(Value::String(n.to_string())),
        Value::String(s) => Some(Value::String(s.clone())),
        _ => None,
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::Number(_) | Value::String(_))
}

/// Collapse a freshly decoded generic value of `type_name`.
pub(crate) fn simplify(type_name: &str, value: Value) -> Value {
    let compact = match type_name {
        "VarUInteger" | "VarInteger" if kind_is(&value, type_name) => value.get("value").and_then(decimal),
        "Grams" if kind_is(&value, "Grams") => value.get("amount").filter(|v| is_scalar(v)).cloned(),
        "Coins" if kind_is(&value, "Coins") => value.get("grams").filter(|v| is_scalar(v)).cloned(),
        "MsgAddressInt" if kind_is(&value, ADDR_STD) => std_address(&value).map(|a| Value::String(a.to_friendly())),
        "MsgAddress" if kind_is(&value, ADDR_NONE) => Some(Value::Null),
        _ => None,
    };
    compact.unwrap_or(value)
}

fn std_address(value: &Value) -> Option<StdAddress> {
    if !kind_is(value.get("anycast")?, NO_ANYCAST) {
        return None;
    }
    let workchain = i8::try_from(value.get("workchain_id")?.as_i64()?).ok()?;
    let bits = json_to_bits(value.get("address")?).ok()?;
    let hash: [u8; 32] = bits.as_bytes().try_into().ok()?;
    if bits.len() != 256 {
        return None;
    }
    Some(StdAddress { workchain, hash })
}

/// Rewrite a compact value of `type_name` into its generic form. `None`
/// means the value is already generic (or not recognised) and is encoded as is.
pub(crate) fn expand(type_name: &str, value: &Value) -> Result<Option<Value>, CodecError> {
    Ok(match (type_name, value) {
        ("VarUInteger", v) if is_scalar(v) => {
            let amount = json_to_u128(v)?;
            let len = byte_len_unsigned(amount);
            Some(json!({"kind": type_name, "len": len, "value": amount.to_string()}))
        }
        ("VarInteger", v) if is_scalar(v) => {
            let amount = json_to_i128(v)?;
            let len = byte_len_signed(amount);
            Some(json!({"kind": type_name, "len": len, "value": amount.to_string()}))
        }
        ("Grams", v) if is_scalar(v) => Some(json!({"kind": "Grams", "amount": v})),
        ("Coins", v) if is_scalar(v) => Some(json!({"kind": "Coins", "grams": v})),
        ("MsgAddressInt", Value::String(text)) => {
            let addr: StdAddress = text.parse()?;
            Some(json!({
                "kind": ADDR_STD,
                "anycast": {"kind": NO_ANYCAST},
                "workchain_id": addr.workchain,
                "address": {"hex": hex::encode(addr.hash)},
            }))
        }
        ("MsgAddress", Value::Null) => Some(json!({"kind": ADDR_NONE})),
        _ => None,
    })
}

fn byte_len_unsigned(value: u128) -> u64 {
    u64::from((u128::BITS - value.leading_zeros()).div_ceil(8))
}

fn byte_len_signed(value: i128) -> u64 {
    (0..=16u32)
        .find(|&bytes| {
            if bytes == 0 {
                return value == 0;
            }
            if bytes == 16 {
                return true;
            }
            let bound = 1i128 << (bytes * 8 - 1);
            (-bound..bound).contains(&value)
        })
        .map(u64::from)
        .unwrap_or(16)
}
