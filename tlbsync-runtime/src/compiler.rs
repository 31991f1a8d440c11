//! Name resolution and layout compilation: [`SchemaAst`] to [`Program`].
//!
//! Two passes. The first records each result type's parameter kinds so that
//! declarations may refer to types declared later; the second resolves every
//! field type into a [`Ty`] and checks nat expressions against the variables
//! in scope at that point of the constructor.

use std::collections::{HashMap, HashSet};

use crate::ast::{Constraint, Declaration, Item, NatExpr, ParamKind, SchemaAst, TypeExpr};
use crate::cell::{BitString, MAX_INT_BITS};
use crate::error::CompileError;
use crate::lexer::RawTag;
use crate::parser::{as_nat, parse};

// ---------------------------------------------------------------------------
// Compiled form
// ---------------------------------------------------------------------------

/// A compiled schema: every declared type with its constructors, plus the
/// root type decoded from and encoded to the top-level cell.
#[derive(Debug, Clone)]
pub struct Program {
    types: Vec<TypeDef>,
    index: HashMap<String, usize>,
    root: String,
}

impl Program {
    /// Result type of the last declaration.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Declared type names in order of first appearance.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.iter().map(|t| t.name.as_str())
    }

    pub fn constructor_count(&self) -> usize {
        self.types.iter().map(|t| t.constructors.len()).sum()
    }

    pub(crate) fn get(&self, name: &str) -> Option<&TypeDef> {
        self.index.get(name).map(|&i| &self.types[i])
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TypeDef {
    pub name: String,
    pub params: Vec<ParamKind>,
    pub constructors: Vec<Constructor>,
}

#[derive(Debug, Clone)]
pub(crate) struct Constructor {
    pub name: String,
    /// Value of the JSON `kind` key.
    pub kind: String,
    pub tag: BitString,
    pub result_args: Vec<ResultArg>,
    pub steps: Vec<Step>,
    /// A single anonymous field and nothing else: the JSON value is that
    /// field's value, without a wrapping object.
    pub transparent: bool,
}

/// How one result argument relates to the constructor's parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ResultArg {
    Nat(String),
    Type(String),
    Const(u64),
}

#[derive(Debug, Clone)]
pub(crate) enum Step {
    Field(FieldStep),
    Check(Constraint),
}

#[derive(Debug, Clone)]
pub(crate) struct FieldStep {
    /// JSON key: the field name, or `_N` for the N-th anonymous field.
    pub key: String,
    /// Set when later expressions may refer to this field's value.
    pub binds: Option<String>,
    pub ty: Ty,
    pub cond: Option<Condition>,
}

/// `flag?T` (flag non-zero) or `flag.bit?T` (that bit of flag set).
#[derive(Debug, Clone)]
pub(crate) struct Condition {
    pub flag: String,
    pub bit: Option<u32>,
}

#[derive(Debug, Clone)]
pub(crate) enum Ty {
    Uint(NatExpr),
    Int(NatExpr),
    /// `#< n`: unsigned, smallest width holding `n - 1`.
    UintLess(NatExpr),
    /// `#<= n`: unsigned, smallest width holding `n`.
    UintLessEq(NatExpr),
    Bits(NatExpr),
    Bool,
    /// Rest of the current cell, as a standalone cell.
    Cell,
    Any,
    Named { name: String, args: Vec<Arg> },
    Param(String),
    Ref(Box<Ty>),
    Inline(Vec<Step>),
}

impl Ty {
    /// Whether a named field of this type can appear in nat expressions.
    fn is_nat(&self) -> bool {
        matches!(self, Ty::Uint(_) | Ty::UintLess(_) | Ty::UintLessEq(_))
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Arg {
    Nat(NatExpr),
    Type(Ty),
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Parse and compile schema text.
pub fn compile(text: &str) -> Result<Program, CompileError> {
    compile_ast(&parse(text)?)
}

pub fn compile_ast(ast: &SchemaAst) -> Result<Program, CompileError> {
    let signatures = collect_signatures(ast)?;

    let mut types: Vec<TypeDef> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for decl in &ast.declarations {
        let constructor = Resolver::new(&signatures, decl).constructor()?;
        let slot = *index.entry(decl.result.clone()).or_insert_with(|| {
            types.push(TypeDef {
                name: decl.result.clone(),
                params: signatures[&decl.result].clone(),
                constructors: Vec::new(),
            });
            types.len() - 1
        });
        types[slot].constructors.push(constructor);
    }

    for def in &mut types {
        let single = def.constructors.len() == 1;
        for (i, ctor) in def.constructors.iter_mut().enumerate() {
            ctor.kind = if single {
                def.name.clone()
            } else if ctor.name == "_" {
                format!("{}_{i}", def.name)
            } else {
                format!("{}_{}", def.name, ctor.name)
            };
        }
    }

    // `parse` guarantees at least one declaration.
    let last = &ast.declarations[ast.declarations.len() - 1];
    if !signatures[&last.result].is_empty() {
        return Err(CompileError::Semantic {
            line: last.line,
            message: format!("root type `{}` must not take parameters", last.result),
        });
    }

    Ok(Program {
        types,
        index,
        root: last.result.clone(),
    })
}

// ---------------------------------------------------------------------------
// Pass 1: signatures
// ---------------------------------------------------------------------------

fn declared_params(decl: &Declaration) -> HashMap<&str, ParamKind> {
    decl.items
        .iter()
        .filter_map(|item| match item {
            Item::Param { name, kind } => Some((name.as_str(), *kind)),
            _ => None,
        })
        .collect()
}

fn result_args(decl: &Declaration) -> Result<Vec<ResultArg>, CompileError> {
    let params = declared_params(decl);
    decl.result_args
        .iter()
        .map(|arg| match arg {
            TypeExpr::Number(n) => Ok(ResultArg::Const(*n)),
            TypeExpr::Name(name) => match params.get(name.as_str()) {
                Some(ParamKind::Nat) => Ok(ResultArg::Nat(name.clone())),
                Some(ParamKind::Type) => Ok(ResultArg::Type(name.clone())),
                None => Err(CompileError::Semantic {
                    line: decl.line,
                    message: format!("result argument `{name}` is not a declared parameter"),
                }),
            },
            TypeExpr::Expr(e) => Err(CompileError::Unsupported {
                line: decl.line,
                what: format!("result argument expression `{e}`"),
            }),
            _ => Err(CompileError::Unsupported {
                line: decl.line,
                what: "compound result argument".to_string(),
            }),
        })
        .collect()
}

fn collect_signatures(ast: &SchemaAst) -> Result<HashMap<String, Vec<ParamKind>>, CompileError> {
    let mut signatures: HashMap<String, Vec<ParamKind>> = HashMap::new();
    for decl in &ast.declarations {
        let kinds: Vec<ParamKind> = result_args(decl)?
            .iter()
            .map(|arg| match arg {
                ResultArg::Type(_) => ParamKind::Type,
                ResultArg::Nat(_) | ResultArg::Const(_) => ParamKind::Nat,
            })
            .collect();
        match signatures.get(&decl.result) {
            Some(existing) if *existing != kinds => {
                return Err(CompileError::Semantic {
                    line: decl.line,
                    message: format!(
                        "constructor `{}` disagrees with earlier declarations of `{}` about its parameters",
                        decl.constructor, decl.result
                    ),
                });
            }
            Some(_) => {}
            None => {
                signatures.insert(decl.result.clone(), kinds);
            }
        }
    }
    Ok(signatures)
}

// ---------------------------------------------------------------------------
// Pass 2: constructors
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct Scope {
    nats: HashSet<String>,
    types: HashSet<String>,
}

struct Resolver<'a> {
    signatures: &'a HashMap<String, Vec<ParamKind>>,
    decl: &'a Declaration,
}

impl<'a> Resolver<'a> {
    fn new(signatures: &'a HashMap<String, Vec<ParamKind>>, decl: &'a Declaration) -> Self {
        Resolver { signatures, decl }
    }

    fn semantic(&self, message: impl Into<String>) -> CompileError {
        CompileError::Semantic {
            line: self.decl.line,
            message: message.into(),
        }
    }

    fn constructor(&self) -> Result<Constructor, CompileError> {
        let mut scope = Scope::default();
        for (name, kind) in declared_params(self.decl) {
            match kind {
                ParamKind::Nat => scope.nats.insert(name.to_string()),
                ParamKind::Type => scope.types.insert(name.to_string()),
            };
        }

        let steps = self.items(&self.decl.items, &mut scope, true)?;
        let mut content = self
            .decl
            .items
            .iter()
            .filter(|item| !matches!(item, Item::Param { .. }));
        let transparent = matches!(
            (content.next(), content.next()),
            (Some(Item::Field { name: None, .. }), None)
        );

        Ok(Constructor {
            name: self.decl.constructor.clone(),
            kind: String::new(),
            tag: self.tag()?,
            result_args: result_args(self.decl)?,
            steps,
            transparent,
        })
    }

    fn tag(&self) -> Result<BitString, CompileError> {
        let parsed = match &self.decl.tag {
            None => return Ok(BitString::new()),
            Some(RawTag::Hex(s) | RawTag::Binary(s)) if s.is_empty() || s == "_" => {
                return Ok(BitString::new())
            }
            Some(RawTag::Hex(s)) => BitString::from_hex_tag(s),
            Some(RawTag::Binary(s)) => BitString::from_binary_str(s),
        };
        parsed.ok_or_else(|| self.semantic(format!("invalid tag on constructor `{}`", self.decl.constructor)))
    }

    fn items(&self, items: &[Item], scope: &mut Scope, top_level: bool) -> Result<Vec<Step>, CompileError> {
        let mut steps = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut anonymous = 0usize;

        for item in items {
            match item {
                Item::Param { name, .. } => {
                    if !top_level {
                        return Err(self.semantic(format!("parameter `{name}` declared inside a cell")));
                    }
                }
                Item::Constraint(c) => {
                    self.check_vars(&c.lhs, scope)?;
                    self.check_vars(&c.rhs, scope)?;
                    steps.push(Step::Check(c.clone()));
                }
                Item::Field { name, ty } => {
                    let (ty, cond) = match ty {
                        TypeExpr::Cond { flag, bit, inner } => {
                            if !scope.nats.contains(flag) {
                                return Err(self.semantic(format!("condition flag `{flag}` is not a known number")));
                            }
                            let cond = Condition {
                                flag: flag.clone(),
                                bit: *bit,
                            };
                            (self.ty(inner, scope)?, Some(cond))
                        }
                        other => (self.ty(other, scope)?, None),
                    };

                    let (key, binds) = match name {
                        Some(name) => {
                            if !seen.insert(name.as_str()) {
                                return Err(self.semantic(format!("duplicate field `{name}`")));
                            }
                            let binds = ty.is_nat().then(|| name.clone());
                            if binds.is_some() {
                                scope.nats.insert(name.clone());
                            }
                            (name.clone(), binds)
                        }
                        None => {
                            anonymous += 1;
                            (format!("_{}", anonymous - 1), None)
                        }
                    };
                    steps.push(Step::Field(FieldStep { key, binds, ty, cond }));
                }
            }
        }
        Ok(steps)
    }

    fn ty(&self, expr: &TypeExpr, scope: &Scope) -> Result<Ty, CompileError> {
        match expr {
            TypeExpr::Nat32 => Ok(Ty::Uint(NatExpr::Const(32))),
            TypeExpr::UintN(e) => Ok(Ty::Uint(self.nat(e, scope)?)),
            TypeExpr::UintLess(e) => Ok(Ty::UintLess(self.nat(e, scope)?)),
            TypeExpr::UintLessEq(e) => Ok(Ty::UintLessEq(self.nat(e, scope)?)),
            TypeExpr::Ref(inner) => Ok(Ty::Ref(Box::new(self.ty(inner, scope)?))),
            TypeExpr::Cell(items) => {
                let mut inner = scope.clone();
                Ok(Ty::Inline(self.items(items, &mut inner, false)?))
            }
            TypeExpr::Name(name) => self.named(name, &[], scope),
            TypeExpr::Apply { head, args } => self.named(head, args, scope),
            TypeExpr::Cond { flag, .. } => Err(self.semantic(format!(
                "conditional `{flag}?…` must be the whole type of a field"
            ))),
            TypeExpr::Number(n) => Err(self.semantic(format!("expected a type, found number `{n}`"))),
            TypeExpr::Expr(e) => Err(self.semantic(format!("expected a type, found expression `{e}`"))),
        }
    }

    fn named(&self, name: &str, args: &[TypeExpr], scope: &Scope) -> Result<Ty, CompileError> {
        if scope.types.contains(name) {
            if !args.is_empty() {
                return Err(CompileError::Unsupported {
                    line: self.decl.line,
                    what: format!("applying type parameter `{name}`"),
                });
            }
            return Ok(Ty::Param(name.to_string()));
        }
        if scope.nats.contains(name) {
            return Err(self.semantic(format!("`{name}` is a number, not a type")));
        }

        if let Some(kinds) = self.signatures.get(name) {
            if kinds.len() != args.len() {
                return Err(self.semantic(format!(
                    "type `{name}` takes {} argument(s), {} given",
                    kinds.len(),
                    args.len()
                )));
            }
            let args = kinds
                .iter()
                .zip(args)
                .map(|(kind, arg)| match kind {
                    ParamKind::Nat => self.nat(arg, scope).map(Arg::Nat),
                    ParamKind::Type => self.ty(arg, scope).map(Arg::Type),
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Ty::Named {
                name: name.to_string(),
                args,
            });
        }

        match (name, args) {
            ("Bool", []) => Ok(Ty::Bool),
            ("Cell", []) => Ok(Ty::Cell),
            ("Any", []) => Ok(Ty::Any),
            ("uint", [width]) => Ok(Ty::Uint(self.int_width(width, scope)?)),
            ("int", [width]) => Ok(Ty::Int(self.int_width(width, scope)?)),
            ("bits", [width]) => Ok(Ty::Bits(self.nat(width, scope)?)),
            (_, []) => {
                if let Some(w) = fixed_width(name, "uint") {
                    Ok(Ty::Uint(self.const_int_width(w)?))
                } else if let Some(w) = fixed_width(name, "int") {
                    Ok(Ty::Int(self.const_int_width(w)?))
                } else if let Some(w) = fixed_width(name, "bits") {
                    Ok(Ty::Bits(NatExpr::Const(w)))
                } else {
                    Err(self.semantic(format!("unknown type `{name}`")))
                }
            }
            _ => Err(self.semantic(format!("unknown type `{name}`"))),
        }
    }

    fn int_width(&self, expr: &TypeExpr, scope: &Scope) -> Result<NatExpr, CompileError> {
        match self.nat(expr, scope)? {
            NatExpr::Const(w) => self.const_int_width(w),
            other => Ok(other),
        }
    }

    fn const_int_width(&self, width: u64) -> Result<NatExpr, CompileError> {
        if width > MAX_INT_BITS as u64 {
            return Err(CompileError::Unsupported {
                line: self.decl.line,
                what: format!("integers wider than {MAX_INT_BITS} bits ({width})"),
            });
        }
        Ok(NatExpr::Const(width))
    }

    fn nat(&self, expr: &TypeExpr, scope: &Scope) -> Result<NatExpr, CompileError> {
        let nat = as_nat(expr.clone()).ok_or_else(|| self.semantic("expected a number expression"))?;
        self.check_vars(&nat, scope)?;
        Ok(nat)
    }

    fn check_vars(&self, expr: &NatExpr, scope: &Scope) -> Result<(), CompileError> {
        match expr {
            NatExpr::Const(_) => Ok(()),
            NatExpr::Var(name) if scope.nats.contains(name) => Ok(()),
            NatExpr::Var(name) => Err(self.semantic(format!("unknown variable `{name}`"))),
            NatExpr::Binary { lhs, rhs, .. } => {
                self.check_vars(lhs, scope)?;
                self.check_vars(rhs, scope)
            }
        }
    }
}

/// `uint64` → 64 for prefix `uint`.
fn fixed_width(name: &str, prefix: &str) -> Option<u64> {
    let digits = name.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_constructor_kind_is_type_name() {
        let program = compile("_ x:# = Foo;").unwrap();
        assert_eq!(program.root(), "Foo");
        assert_eq!(program.get("Foo").unwrap().constructors[0].kind, "Foo");
    }

    #[test]
    fn multi_constructor_kind_joins_names() {
        let program = compile("nothing$0 = Opt; some$1 x:uint8 = Opt;").unwrap();
        let kinds: Vec<_> = program.get("Opt").unwrap().constructors.iter().map(|c| c.kind.clone()).collect();
        assert_eq!(kinds, vec!["Opt_nothing", "Opt_some"]);
    }

    #[test]
    fn hex_tag_is_compiled_to_bits() {
        let program = compile("burn#595f07bc = Body;").unwrap();
        let tag = &program.get("Body").unwrap().constructors[0].tag;
        assert_eq!(tag.len(), 32);
        assert_eq!(tag.as_bytes(), &[0x59, 0x5f, 0x07, 0xbc]);
    }

    #[test]
    fn forward_references_resolve() {
        let program = compile("_ inner:Inner = Outer; _ v:uint8 = Inner; _ o:Outer = Root;").unwrap();
        assert_eq!(program.type_names().collect::<Vec<_>>(), vec!["Outer", "Inner", "Root"]);
        assert_eq!(program.constructor_count(), 3);
    }

    #[test]
    fn single_anonymous_field_is_transparent() {
        let program = compile("_ v:uint8 = A; _ _:A = B;").unwrap();
        assert!(program.get("B").unwrap().constructors[0].transparent);
        assert!(!program.get("A").unwrap().constructors[0].transparent);
    }

    #[test]
    fn unknown_type_is_semantic_error() {
        let err = compile("_ x:Missing = Foo;").unwrap_err();
        assert_eq!(err.to_string(), "line 1: unknown type `Missing`");
    }

    #[test]
    fn unknown_variable_is_semantic_error() {
        let err = compile("_ text:(bits (len * 8)) = Foo;").unwrap_err();
        assert!(err.to_string().contains("unknown variable `len`"), "got: {err}");
    }

    #[test]
    fn arity_mismatch_is_reported() {
        let err = compile("nothing$0 {X:Type} = Maybe X; _ m:Maybe = Foo;").unwrap_err();
        assert!(err.to_string().contains("takes 1 argument(s), 0 given"), "got: {err}");
    }

    #[test]
    fn parameterized_root_is_rejected() {
        let err = compile("nothing$0 {X:Type} = Maybe X;").unwrap_err();
        assert!(err.to_string().contains("root type `Maybe`"), "got: {err}");
    }

    #[test]
    fn result_expression_is_unsupported() {
        let err = compile("succ$1 {n:#} = Nat (n + 1);").unwrap_err();
        assert!(matches!(err, CompileError::Unsupported { .. }), "got: {err}");
    }

    #[test]
    fn wide_fixed_integers_are_unsupported() {
        let err = compile("_ x:uint256 = Foo;").unwrap_err();
        assert!(matches!(err, CompileError::Unsupported { .. }), "got: {err}");
    }
}
