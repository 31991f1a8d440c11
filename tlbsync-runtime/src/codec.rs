//! Walks a compiled [`Program`] over cells, in both directions.
//!
//! Decoding tries a type's constructors in declaration order on a forked
//! slice; the first whose tag and result arguments match and whose fields
//! decode wins. Encoding picks the constructor named by the object's `kind`
//! and falls back to trying transparent constructors in order.
//!
//! JSON shapes:
//! - unsigned/signed integers up to 32 bits are numbers, wider ones decimal
//!   strings (both accepted on input)
//! - byte-aligned printable bits are strings, other aligned bits
//!   `{"hex": ..}`, unaligned bits `{"bits": "0101"}`
//! - `Cell`/`Any` are base64 bags of cells

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::ast::{ArithOp, Constraint, NatExpr};
use crate::boc::Boc;
use crate::cell::{BitString, Cell, CellBuilder, CellSlice};
use crate::compiler::{Arg, Condition, Constructor, Program, ResultArg, Step, Ty, TypeDef};
use crate::error::CodecError;
use crate::wellknown;

/// Deepest chain of nested type applications followed before giving up.
pub const MAX_DEPTH: usize = 256;

/// Decode the root type from `cell`. Trailing data is allowed.
pub fn decode_cell(program: &Program, cell: &Cell) -> Result<Value, CodecError> {
    let def = root_def(program)?;
    let mut slice = cell.slice();
    let mut decoder = Decoder {
        ctx: Ctx::new(program, Mode::Decode),
        depth: 0,
    };
    decoder.named(def, &[], &mut slice)
}

/// Encode `value` as the root type.
pub fn encode_value(program: &Program, value: &Value) -> Result<Arc<Cell>, CodecError> {
    let def = root_def(program)?;
    let mut builder = CellBuilder::new();
    let mut encoder = Encoder {
        ctx: Ctx::new(program, Mode::Encode),
        depth: 0,
    };
    encoder.named(def, &[], value, &mut builder)?;
    Ok(Arc::new(builder.build()?))
}

fn root_def(program: &Program) -> Result<&TypeDef, CodecError> {
    program
        .get(program.root())
        .ok_or_else(|| CodecError::Decode(format!("root type `{}` is not defined", program.root())))
}

// ---------------------------------------------------------------------------
// Shared: environments and closed types
// ---------------------------------------------------------------------------

/// Values of nat variables and type parameters visible to a constructor.
#[derive(Debug, Clone, Default)]
struct Env<'p> {
    nats: HashMap<&'p str, u64>,
    types: HashMap<&'p str, Closed<'p>>,
}

/// A [`Ty`] with every width evaluated and every parameter substituted.
#[derive(Debug, Clone)]
enum Closed<'p> {
    Uint(usize),
    /// Unsigned of `width` bits, value strictly below `bound`.
    Below { width: usize, bound: u128 },
    Int(usize),
    Bits(usize),
    Bool,
    Cell,
    Named { def: &'p TypeDef, args: Vec<Actual<'p>> },
    Ref(Box<Closed<'p>>),
    Inline { steps: &'p [Step], env: Env<'p> },
}

#[derive(Debug, Clone)]
enum Actual<'p> {
    Nat(u64),
    Type(Closed<'p>),
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Decode,
    Encode,
}

struct Ctx<'p> {
    program: &'p Program,
    mode: Mode,
}

impl<'p> Ctx<'p> {
    fn new(program: &'p Program, mode: Mode) -> Self {
        Ctx { program, mode }
    }

    fn err(&self, message: impl Into<String>) -> CodecError {
        match self.mode {
            Mode::Decode => CodecError::Decode(message.into()),
            Mode::Encode => CodecError::Encode(message.into()),
        }
    }

    fn eval(&self, expr: &NatExpr, env: &Env<'p>) -> Result<u64, CodecError> {
        match expr {
            NatExpr::Const(v) => Ok(*v),
            NatExpr::Var(name) => env
                .nats
                .get(name.as_str())
                .copied()
                .ok_or_else(|| self.err(format!("variable `{name}` has no value"))),
            NatExpr::Binary { op, lhs, rhs } => {
                let (l, r) = (self.eval(lhs, env)?, self.eval(rhs, env)?);
                let value = match op {
                    ArithOp::Add => l.checked_add(r),
                    ArithOp::Sub => l.checked_sub(r),
                    ArithOp::Mul => l.checked_mul(r),
                };
                value.ok_or_else(|| self.err(format!("`{expr}` is out of range")))
            }
        }
    }

    fn width(&self, expr: &NatExpr, env: &Env<'p>) -> Result<usize, CodecError> {
        let value = self.eval(expr, env)?;
        usize::try_from(value).map_err(|_| self.err(format!("width {value} is too large")))
    }

    fn close(&self, ty: &'p Ty, env: &Env<'p>) -> Result<Closed<'p>, CodecError> {
        Ok(match ty {
            Ty::Uint(e) => Closed::Uint(self.width(e, env)?),
            Ty::Int(e) => Closed::Int(self.width(e, env)?),
            Ty::Bits(e) => Closed::Bits(self.width(e, env)?),
            Ty::UintLess(e) => {
                let n = self.eval(e, env)?;
                if n == 0 {
                    return Err(self.err("`#< 0` has no values"));
                }
                Closed::Below {
                    width: bit_length(n - 1),
                    bound: u128::from(n),
                }
            }
            Ty::UintLessEq(e) => {
                let n = self.eval(e, env)?;
                Closed::Below {
                    width: bit_length(n),
                    bound: u128::from(n) + 1,
                }
            }
            Ty::Bool => Closed::Bool,
            Ty::Cell | Ty::Any => Closed::Cell,
            Ty::Param(name) => env
                .types
                .get(name.as_str())
                .cloned()
                .ok_or_else(|| self.err(format!("type parameter `{name}` is unbound")))?,
            Ty::Named { name, args } => {
                let def = self
                    .program
                    .get(name)
                    .ok_or_else(|| self.err(format!("type `{name}` is not defined")))?;
                let args = args
                    .iter()
                    .map(|arg| match arg {
                        Arg::Nat(e) => self.eval(e, env).map(Actual::Nat),
                        Arg::Type(t) => self.close(t, env).map(Actual::Type),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if args.len() != def.params.len() {
                    return Err(self.err(format!("type `{name}` applied to {} argument(s)", args.len())));
                }
                Closed::Named { def, args }
            }
            Ty::Ref(inner) => Closed::Ref(Box::new(self.close(inner, env)?)),
            Ty::Inline(steps) => Closed::Inline {
                steps: steps.as_slice(),
                env: env.clone(),
            },
        })
    }

    fn check(&self, constraint: &Constraint, env: &Env<'p>) -> Result<(), CodecError> {
        let lhs = self.eval(&constraint.lhs, env)?;
        let rhs = self.eval(&constraint.rhs, env)?;
        if !constraint.op.holds(lhs, rhs) {
            return Err(self.err(format!("constraint `{constraint}` does not hold ({lhs} vs {rhs})")));
        }
        Ok(())
    }

    fn condition(&self, cond: &Option<Condition>, env: &Env<'p>) -> Result<bool, CodecError> {
        let Some(cond) = cond else {
            return Ok(true);
        };
        let flag = env
            .nats
            .get(cond.flag.as_str())
            .copied()
            .ok_or_else(|| self.err(format!("condition flag `{}` has no value", cond.flag)))?;
        Ok(match cond.bit {
            Some(bit) if bit >= 64 => false,
            Some(bit) => (flag >> bit) & 1 == 1,
            None => flag != 0,
        })
    }

    fn enter(&self, depth: &mut usize, def: &TypeDef) -> Result<(), CodecError> {
        *depth += 1;
        if *depth > MAX_DEPTH {
            return Err(self.err(format!(
                "type nesting deeper than {MAX_DEPTH} levels at `{}`",
                def.name
            )));
        }
        Ok(())
    }
}

/// Bind result arguments; `None` when a constant argument does not match.
fn bind<'p>(ctor: &'p Constructor, args: &[Actual<'p>]) -> Option<Env<'p>> {
    let mut env = Env::default();
    if ctor.result_args.len() != args.len() {
        return None;
    }
    for (formal, actual) in ctor.result_args.iter().zip(args) {
        match (formal, actual) {
            (ResultArg::Const(c), Actual::Nat(v)) if c == v => {}
            (ResultArg::Nat(name), Actual::Nat(v)) => {
                env.nats.insert(name.as_str(), *v);
            }
            (ResultArg::Type(name), Actual::Type(t)) => {
                env.types.insert(name.as_str(), t.clone());
            }
            _ => return None,
        }
    }
    Some(env)
}

fn bit_length(value: u64) -> usize {
    (u64::BITS - value.leading_zeros()) as usize
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn combine(type_name: &str, failures: Vec<(&str, CodecError)>, fallback: CodecError) -> CodecError {
    let mut failures = failures;
    match failures.len() {
        0 => fallback,
        1 => failures.remove(0).1,
        _ => {
            let detail: Vec<String> = failures.iter().map(|(ctor, e)| format!("{ctor}: {e}")).collect();
            fallback_with(fallback, format!("no constructor of `{type_name}` fits ({})", detail.join("; ")))
        }
    }
}

fn fallback_with(fallback: CodecError, message: String) -> CodecError {
    match fallback {
        CodecError::Encode(_) => CodecError::Encode(message),
        _ => CodecError::Decode(message),
    }
}

// ---------------------------------------------------------------------------
// JSON scalars
// ---------------------------------------------------------------------------

fn uint_json(value: u128, width: usize) -> Value {
    if width <= 32 {
        Value::from(value as u64)
    } else {
        Value::String(value.to_string())
    }
}

fn int_json(value: i128, width: usize) -> Value {
    if width <= 32 {
        Value::from(value as i64)
    } else {
        Value::String(value.to_string())
    }
}

pub(crate) fn json_to_u128(value: &Value) -> Result<u128, CodecError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(u128::from)
            .ok_or_else(|| CodecError::Encode(format!("{n} is not a non-negative integer"))),
        Value::String(s) => s
            .trim()
            .parse::<u128>()
            .map_err(|_| CodecError::Encode(format!("`{s}` is not a non-negative integer"))),
        other => Err(CodecError::Encode(format!("expected an integer, found {}", describe(other)))),
    }
}

pub(crate) fn json_to_i128(value: &Value) -> Result<i128, CodecError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .ok_or_else(|| CodecError::Encode(format!("{n} is not an integer"))),
        Value::String(s) => s
            .trim()
            .parse::<i128>()
            .map_err(|_| CodecError::Encode(format!("`{s}` is not an integer"))),
        other => Err(CodecError::Encode(format!("expected an integer, found {}", describe(other)))),
    }
}

pub(crate) fn bits_json(bits: &BitString) -> Value {
    if bits.is_empty() {
        return Value::String(String::new());
    }
    if !bits.is_byte_aligned() {
        let mut map = Map::new();
        map.insert("bits".into(), Value::String(bits.to_binary_string()));
        return Value::Object(map);
    }
    match std::str::from_utf8(bits.as_bytes()) {
        Ok(text) if !text.chars().any(char::is_control) => Value::String(text.to_string()),
        _ => {
            let mut map = Map::new();
            map.insert("hex".into(), Value::String(hex::encode(bits.as_bytes())));
            Value::Object(map)
        }
    }
}

pub(crate) fn json_to_bits(value: &Value) -> Result<BitString, CodecError> {
    match value {
        Value::String(text) => Ok(BitString::from_bytes(text.as_bytes())),
        Value::Object(map) => {
            if let Some(digits) = map.get("hex").and_then(Value::as_str) {
                let bytes = hex::decode(digits).map_err(|e| CodecError::Encode(format!("bad hex `{digits}`: {e}")))?;
                Ok(BitString::from_bytes(&bytes))
            } else if let Some(digits) = map.get("bits").and_then(Value::as_str) {
                BitString::from_binary_str(digits)
                    .ok_or_else(|| CodecError::Encode(format!("`{digits}` is not a string of 0 and 1")))
            } else {
                Err(CodecError::Encode("bits object needs a `hex` or `bits` key".to_string()))
            }
        }
        other => Err(CodecError::Encode(format!("expected bits, found {}", describe(other)))),
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

struct Decoder<'p> {
    ctx: Ctx<'p>,
    depth: usize,
}

impl<'p> Decoder<'p> {
    fn named<'c>(&mut self, def: &'p TypeDef, args: &[Actual<'p>], slice: &mut CellSlice<'c>) -> Result<Value, CodecError> {
        self.ctx.enter(&mut self.depth, def)?;
        let result = self.constructors(def, args, slice);
        self.depth -= 1;
        result
    }

    fn constructors<'c>(
        &mut self,
        def: &'p TypeDef,
        args: &[Actual<'p>],
        slice: &mut CellSlice<'c>,
    ) -> Result<Value, CodecError> {
        let mut failures = Vec::new();
        for ctor in &def.constructors {
            if !slice.starts_with(&ctor.tag) {
                continue;
            }
            let Some(env) = bind(ctor, args) else {
                continue;
            };
            let mut fork = *slice;
            fork.skip_bits(ctor.tag.len())?;
            match self.fields(&ctor.steps, env, &mut fork) {
                Ok(fields) => {
                    *slice = fork;
                    let value = if ctor.transparent {
                        fields.into_iter().next().map(|(_, v)| v).unwrap_or(Value::Null)
                    } else {
                        let mut object = Map::new();
                        object.insert("kind".into(), Value::String(ctor.kind.clone()));
                        object.extend(fields);
                        Value::Object(object)
                    };
                    tracing::trace!("decoded `{}` as `{}`", def.name, ctor.name);
                    return Ok(wellknown::simplify(&def.name, value));
                }
                Err(e) => failures.push((ctor.name.as_str(), e)),
            }
        }
        Err(combine(
            &def.name,
            failures,
            CodecError::Decode(format!("no constructor of `{}` matches the data", def.name)),
        ))
    }

    fn fields<'c>(&mut self, steps: &'p [Step], mut env: Env<'p>, slice: &mut CellSlice<'c>) -> Result<Map<String, Value>, CodecError> {
        let mut out = Map::new();
        for step in steps {
            let field = match step {
                Step::Check(c) => {
                    self.ctx.check(c, &env)?;
                    continue;
                }
                Step::Field(field) => field,
            };
            if !self.ctx.condition(&field.cond, &env)? {
                continue;
            }
            let closed = self.ctx.close(&field.ty, &env).map_err(|e| e.within(&field.key))?;
            let value = match &field.binds {
                Some(name) => {
                    let (raw, width) = self.unsigned(&closed, slice).map_err(|e| e.within(&field.key))?;
                    let nat = u64::try_from(raw)
                        .map_err(|_| self.ctx.err(format!("{raw} is too large to use as a number")).within(&field.key))?;
                    env.nats.insert(name.as_str(), nat);
                    uint_json(raw, width)
                }
                None => self.value(&closed, slice).map_err(|e| e.within(&field.key))?,
            };
            out.insert(field.key.clone(), value);
        }
        Ok(out)
    }

    fn unsigned<'c>(&self, closed: &Closed<'p>, slice: &mut CellSlice<'c>) -> Result<(u128, usize), CodecError> {
        match closed {
            Closed::Uint(width) => Ok((slice.load_uint(*width)?, *width)),
            Closed::Below { width, bound } => {
                let raw = slice.load_uint(*width)?;
                if raw >= *bound {
                    return Err(self.ctx.err(format!("value {raw} is not below {bound}")));
                }
                Ok((raw, *width))
            }
            _ => Err(self.ctx.err("expected an unsigned integer")),
        }
    }

    fn value<'c>(&mut self, closed: &Closed<'p>, slice: &mut CellSlice<'c>) -> Result<Value, CodecError> {
        match closed {
            Closed::Uint(_) | Closed::Below { .. } => {
                let (raw, width) = self.unsigned(closed, slice)?;
                Ok(uint_json(raw, width))
            }
            Closed::Int(width) => Ok(int_json(slice.load_int(*width)?, *width)),
            Closed::Bits(len) => Ok(bits_json(&slice.load_bits(*len)?)),
            Closed::Bool => Ok(Value::Bool(slice.load_bit()?)),
            Closed::Cell => {
                let mut builder = CellBuilder::new();
                builder.store_slice(slice)?;
                slice.skip_bits(slice.remaining_bits())?;
                while slice.remaining_refs() > 0 {
                    slice.load_ref()?;
                }
                let cell = Arc::new(builder.build()?);
                Ok(Value::String(Boc::from_cell(&cell).to_base64()))
            }
            Closed::Named { def, args } => self.named(*def, args, slice),
            Closed::Ref(inner) => {
                let child = slice.load_ref()?;
                let mut child_slice = child.slice();
                self.value(inner, &mut child_slice)
            }
            Closed::Inline { steps, env } => Ok(Value::Object(self.fields(*steps, env.clone(), slice)?)),
        }
    }
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

struct Encoder<'p> {
    ctx: Ctx<'p>,
    depth: usize,
}

impl<'p> Encoder<'p> {
    fn named(&mut self, def: &'p TypeDef, args: &[Actual<'p>], value: &Value, builder: &mut CellBuilder) -> Result<(), CodecError> {
        self.ctx.enter(&mut self.depth, def)?;
        let result = wellknown::expand(&def.name, value).and_then(|expanded| {
            let value = expanded.as_ref().unwrap_or(value);
            self.constructors(def, args, value, builder)
        });
        self.depth -= 1;
        result
    }

    fn constructors(
        &mut self,
        def: &'p TypeDef,
        args: &[Actual<'p>],
        value: &Value,
        builder: &mut CellBuilder,
    ) -> Result<(), CodecError> {
        let kind = value.get("kind").and_then(Value::as_str);

        if let Some(kind) = kind {
            if let Some(ctor) = def.constructors.iter().find(|c| !c.transparent && c.kind == kind) {
                return self.constructor(def, ctor, args, value, builder);
            }
        }

        let mut failures = Vec::new();
        for ctor in def.constructors.iter().filter(|c| c.transparent) {
            let mut fork = builder.clone();
            match self.constructor(def, ctor, args, value, &mut fork) {
                Ok(()) => {
                    *builder = fork;
                    return Ok(());
                }
                Err(e) => failures.push((ctor.name.as_str(), e)),
            }
        }

        if kind.is_none() && value.is_object() && def.constructors.len() == 1 && !def.constructors[0].transparent {
            return self.constructor(def, &def.constructors[0], args, value, builder);
        }

        let fallback = match (value, kind) {
            (Value::Object(_), Some(kind)) => {
                CodecError::Encode(format!("unknown kind `{kind}` for type `{}`", def.name))
            }
            (Value::Object(_), None) => {
                let expected: Vec<&str> = def.constructors.iter().map(|c| c.kind.as_str()).collect();
                CodecError::Encode(format!(
                    "missing `kind` for type `{}` (one of: {})",
                    def.name,
                    expected.join(", ")
                ))
            }
            (other, _) => CodecError::Encode(format!(
                "expected an object for type `{}`, found {}",
                def.name,
                describe(other)
            )),
        };
        Err(combine(&def.name, failures, fallback))
    }

    fn constructor(
        &mut self,
        def: &'p TypeDef,
        ctor: &'p Constructor,
        args: &[Actual<'p>],
        value: &Value,
        builder: &mut CellBuilder,
    ) -> Result<(), CodecError> {
        let env = bind(ctor, args).ok_or_else(|| {
            CodecError::Encode(format!(
                "constructor `{}` cannot produce `{}` with these arguments",
                ctor.name, def.name
            ))
        })?;
        builder.store_bits(&ctor.tag)?;
        if ctor.transparent {
            let mut single = Map::new();
            if let Some(Step::Field(field)) = ctor.steps.first() {
                single.insert(field.key.clone(), value.clone());
            }
            return self.fields(&ctor.steps, env, &single, builder);
        }
        let object = value
            .as_object()
            .ok_or_else(|| CodecError::Encode(format!("expected an object, found {}", describe(value))))?;
        self.fields(&ctor.steps, env, object, builder)
    }

    fn fields(&mut self, steps: &'p [Step], mut env: Env<'p>, object: &Map<String, Value>, builder: &mut CellBuilder) -> Result<(), CodecError> {
        for step in steps {
            let field = match step {
                Step::Check(c) => {
                    self.ctx.check(c, &env)?;
                    continue;
                }
                Step::Field(field) => field,
            };
            if !self.ctx.condition(&field.cond, &env)? {
                continue;
            }
            let value = object
                .get(&field.key)
                .ok_or_else(|| CodecError::Encode("missing field".to_string()).within(&field.key))?;
            let closed = self.ctx.close(&field.ty, &env).map_err(|e| e.within(&field.key))?;
            match &field.binds {
                Some(name) => {
                    let raw = self.unsigned(&closed, value, builder).map_err(|e| e.within(&field.key))?;
                    let nat = u64::try_from(raw)
                        .map_err(|_| self.ctx.err(format!("{raw} is too large to use as a number")).within(&field.key))?;
                    env.nats.insert(name.as_str(), nat);
                }
                None => self.value(&closed, value, builder).map_err(|e| e.within(&field.key))?,
            }
        }
        Ok(())
    }

    fn unsigned(&self, closed: &Closed<'p>, value: &Value, builder: &mut CellBuilder) -> Result<u128, CodecError> {
        let raw = json_to_u128(value)?;
        match closed {
            Closed::Uint(width) => {
                builder.store_uint(raw, *width)?;
            }
            Closed::Below { width, bound } => {
                if raw >= *bound {
                    return Err(self.ctx.err(format!("value {raw} is not below {bound}")));
                }
                builder.store_uint(raw, *width)?;
            }
            _ => return Err(self.ctx.err("expected an unsigned integer")),
        }
        Ok(raw)
    }

    fn value(&mut self, closed: &Closed<'p>, value: &Value, builder: &mut CellBuilder) -> Result<(), CodecError> {
        match closed {
            Closed::Uint(_) | Closed::Below { .. } => {
                self.unsigned(closed, value, builder)?;
            }
            Closed::Int(width) => {
                builder.store_int(json_to_i128(value)?, *width)?;
            }
            Closed::Bits(len) => {
                let bits = json_to_bits(value)?;
                if bits.len() != *len {
                    return Err(CodecError::Encode(format!("expected {len} bits, got {}", bits.len())));
                }
                builder.store_bits(&bits)?;
            }
            Closed::Bool => {
                let bit = match value {
                    Value::Bool(b) => *b,
                    Value::Number(n) if n.as_u64() == Some(0) => false,
                    Value::Number(n) if n.as_u64() == Some(1) => true,
                    other => {
                        return Err(CodecError::Encode(format!("expected a boolean, found {}", describe(other))))
                    }
                };
                builder.store_bit(bit)?;
            }
            Closed::Cell => {
                let text = value
                    .as_str()
                    .ok_or_else(|| CodecError::Encode(format!("expected a BoC string, found {}", describe(value))))?;
                let root = Boc::from_text(text)?.root()?;
                builder.store_slice(&root.slice())?;
            }
            Closed::Named { def, args } => self.named(*def, args, value, builder)?,
            Closed::Ref(inner) => {
                let mut child = CellBuilder::new();
                self.value(inner, value, &mut child)?;
                builder.store_ref(Arc::new(child.build()?))?;
            }
            Closed::Inline { steps, env } => {
                let object = value
                    .as_object()
                    .ok_or_else(|| CodecError::Encode(format!("expected an object, found {}", describe(value))))?;
                self.fields(*steps, env.clone(), object, builder)?;
            }
        }
        Ok(())
    }
}
