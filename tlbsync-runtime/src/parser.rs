//! Recursive-descent parser from tokens to [`SchemaAst`].

use crate::ast::{ArithOp, CmpOp, Constraint, Declaration, Item, NatExpr, ParamKind, SchemaAst, TypeExpr};
use crate::error::CompileError;
use crate::lexer::{tokenize, Token, TokenKind};

/// Parse schema text into declarations. Fails on an empty schema.
pub fn parse(text: &str) -> Result<SchemaAst, CompileError> {
    let mut parser = Parser {
        tokens: tokenize(text)?,
        pos: 0,
    };
    let mut declarations = Vec::new();
    while parser.peek().kind != TokenKind::Eof {
        declarations.push(parser.declaration()?);
    }
    if declarations.is_empty() {
        return Err(CompileError::Empty);
    }
    Ok(SchemaAst { declarations })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].kind
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn error(&self, token: &Token, message: impl Into<String>) -> CompileError {
        CompileError::Syntax {
            line: token.line,
            column: token.column,
            message: message.into(),
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, CompileError> {
        let token = self.next();
        if token.kind != kind {
            return Err(self.error(&token, format!("expected {what}, found {}", describe(&token.kind))));
        }
        Ok(token)
    }

    fn plain_ident(&mut self, what: &str) -> Result<String, CompileError> {
        let token = self.next();
        match &token.kind {
            TokenKind::Ident { name, tag: None } => Ok(name.clone()),
            TokenKind::Ident { tag: Some(_), .. } => {
                Err(self.error(&token, format!("unexpected constructor tag on {what}")))
            }
            other => Err(self.error(&token, format!("expected {what}, found {}", describe(other)))),
        }
    }

    // -----------------------------------------------------------------------
    // Declarations
    // -----------------------------------------------------------------------

    fn declaration(&mut self) -> Result<Declaration, CompileError> {
        let head = self.next();
        let (constructor, tag) = match head.kind.clone() {
            TokenKind::Ident { name, tag } => (name, tag),
            other => {
                return Err(self.error(&head, format!("expected constructor name, found {}", describe(&other))))
            }
        };

        let items = self.items_until(&TokenKind::Eq)?;
        self.expect(TokenKind::Eq, "`=`")?;
        let result = self.plain_ident("result type name")?;

        let mut result_args = Vec::new();
        while self.peek().kind != TokenKind::Semi {
            if self.peek().kind == TokenKind::Eof {
                let token = self.peek().clone();
                return Err(self.error(&token, "expected `;` at end of declaration"));
            }
            result_args.push(self.atom()?);
        }
        self.expect(TokenKind::Semi, "`;`")?;

        Ok(Declaration {
            constructor,
            tag,
            items,
            result,
            result_args,
            line: head.line,
        })
    }

    /// Fields, params and constraints up to (not including) `end`.
    fn items_until(&mut self, end: &TokenKind) -> Result<Vec<Item>, CompileError> {
        let mut items = Vec::new();
        loop {
            let token = self.peek().clone();
            if &token.kind == end {
                return Ok(items);
            }
            match &token.kind {
                TokenKind::Eof | TokenKind::Semi => {
                    return Err(self.error(&token, format!("expected {} before {}", describe(end), describe(&token.kind))))
                }
                TokenKind::LBrace => items.push(self.brace_item()?),
                TokenKind::Ident { name, tag: None } if *self.peek_at(1) == TokenKind::Colon => {
                    let name = name.clone();
                    self.next();
                    self.next();
                    let ty = self.field_type()?;
                    let name = if name == "_" { None } else { Some(name) };
                    items.push(Item::Field { name, ty });
                }
                _ => {
                    let ty = self.field_type()?;
                    items.push(Item::Field { name: None, ty });
                }
            }
        }
    }

    fn brace_item(&mut self) -> Result<Item, CompileError> {
        self.expect(TokenKind::LBrace, "`{`")?;
        let is_param = matches!(self.peek().kind, TokenKind::Ident { tag: None, .. })
            && *self.peek_at(1) == TokenKind::Colon;
        let item = if is_param {
            let name = self.plain_ident("parameter name")?;
            self.next();
            let token = self.next();
            let kind = match &token.kind {
                TokenKind::Hash => ParamKind::Nat,
                TokenKind::Ident { name, tag: None } if name == "Type" => ParamKind::Type,
                other => {
                    return Err(self.error(&token, format!("expected `#` or `Type`, found {}", describe(other))))
                }
            };
            Item::Param { name, kind }
        } else {
            let lhs = self.nat_expr()?;
            let token = self.next();
            let op = match &token.kind {
                TokenKind::Eq | TokenKind::EqEq => CmpOp::Eq,
                TokenKind::NotEq => CmpOp::NotEq,
                TokenKind::Less => CmpOp::Less,
                TokenKind::LessEq => CmpOp::LessEq,
                TokenKind::Greater => CmpOp::Greater,
                TokenKind::GreaterEq => CmpOp::GreaterEq,
                other => {
                    return Err(self.error(&token, format!("expected comparison, found {}", describe(other))))
                }
            };
            let rhs = self.nat_expr()?;
            Item::Constraint(Constraint { lhs, op, rhs })
        };
        self.expect(TokenKind::RBrace, "`}`")?;
        Ok(item)
    }

    // -----------------------------------------------------------------------
    // Types
    // -----------------------------------------------------------------------

    fn field_type(&mut self) -> Result<TypeExpr, CompileError> {
        if let TokenKind::Ident { name, tag: None } = self.peek().kind.clone() {
            let conditional = match (self.peek_at(1), self.peek_at(2), self.peek_at(3)) {
                (TokenKind::Question, _, _) => true,
                (TokenKind::Dot, TokenKind::Number(_), TokenKind::Question) => true,
                _ => false,
            };
            if conditional {
                self.next();
                let mut bit = None;
                if self.peek().kind == TokenKind::Dot {
                    self.next();
                    let token = self.next();
                    if let TokenKind::Number(n) = token.kind {
                        bit = Some(u32::try_from(n).map_err(|_| self.error(&token, "bit index too large"))?);
                    }
                }
                self.expect(TokenKind::Question, "`?`")?;
                let inner = self.atom()?;
                return Ok(TypeExpr::Cond {
                    flag: name,
                    bit,
                    inner: Box::new(inner),
                });
            }
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<TypeExpr, CompileError> {
        let token = self.next();
        match &token.kind {
            TokenKind::LParen => self.paren_rest(),
            TokenKind::Caret => Ok(TypeExpr::Ref(Box::new(self.atom()?))),
            TokenKind::Hash => Ok(TypeExpr::Nat32),
            TokenKind::HashHash => Ok(TypeExpr::UintN(Box::new(self.atom()?))),
            TokenKind::HashLess => Ok(TypeExpr::UintLess(Box::new(self.atom()?))),
            TokenKind::HashLessEq => Ok(TypeExpr::UintLessEq(Box::new(self.atom()?))),
            TokenKind::Ident { name, tag: None } => Ok(TypeExpr::Name(name.clone())),
            TokenKind::Number(n) => Ok(TypeExpr::Number(*n)),
            TokenKind::LBracket => {
                let items = self.items_until(&TokenKind::RBracket)?;
                self.expect(TokenKind::RBracket, "`]`")?;
                Ok(TypeExpr::Cell(items))
            }
            TokenKind::Tilde => Err(CompileError::Unsupported {
                line: token.line,
                what: "negated (`~`) parameters".to_string(),
            }),
            TokenKind::Bang => Err(CompileError::Unsupported {
                line: token.line,
                what: "exotic (`!`) type markers".to_string(),
            }),
            other => Err(self.error(&token, format!("expected a type, found {}", describe(other)))),
        }
    }

    /// After `(`: an application `Head args…` or a nat expression.
    fn paren_rest(&mut self) -> Result<TypeExpr, CompileError> {
        let first = self.atom()?;
        let expr = if is_arith(&self.peek().kind) {
            let token = self.peek().clone();
            let lhs = as_nat(first).ok_or_else(|| self.error(&token, "arithmetic on a non-numeric operand"))?;
            TypeExpr::Expr(self.continue_expr(lhs)?)
        } else if let TypeExpr::Name(head) = &first {
            let mut args = Vec::new();
            while self.peek().kind != TokenKind::RParen {
                if is_arith(&self.peek().kind) {
                    let token = self.peek().clone();
                    return Err(self.error(&token, "parenthesize arithmetic used as a type argument"));
                }
                args.push(self.atom()?);
            }
            if args.is_empty() {
                first
            } else {
                TypeExpr::Apply { head: head.clone(), args }
            }
        } else {
            first
        };
        self.expect(TokenKind::RParen, "`)`")?;
        Ok(expr)
    }

    // -----------------------------------------------------------------------
    // Nat expressions
    // -----------------------------------------------------------------------

    fn nat_expr(&mut self) -> Result<NatExpr, CompileError> {
        let first = self.nat_atom()?;
        self.continue_expr(first)
    }

    fn continue_expr(&mut self, first: NatExpr) -> Result<NatExpr, CompileError> {
        let mut lhs = self.product_rest(first)?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => ArithOp::Add,
                TokenKind::Minus => ArithOp::Sub,
                _ => return Ok(lhs),
            };
            self.next();
            let atom = self.nat_atom()?;
            let rhs = self.product_rest(atom)?;
            lhs = NatExpr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
    }

    fn product_rest(&mut self, mut lhs: NatExpr) -> Result<NatExpr, CompileError> {
        while self.peek().kind == TokenKind::Star {
            self.next();
            let rhs = self.nat_atom()?;
            lhs = NatExpr::Binary { op: ArithOp::Mul, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn nat_atom(&mut self) -> Result<NatExpr, CompileError> {
        let token = self.next();
        match &token.kind {
            TokenKind::Number(n) => Ok(NatExpr::Const(*n)),
            TokenKind::Ident { name, tag: None } => Ok(NatExpr::Var(name.clone())),
            TokenKind::LParen => {
                let expr = self.nat_expr()?;
                self.expect(TokenKind::RParen, "`)`")?;
                Ok(expr)
            }
            other => Err(self.error(&token, format!("expected a number or variable, found {}", describe(other)))),
        }
    }
}

fn is_arith(kind: &TokenKind) -> bool {
    matches!(kind, TokenKind::Plus | TokenKind::Minus | TokenKind::Star)
}

/// View a type expression as a nat expression when it can only be one.
pub(crate) fn as_nat(expr: TypeExpr) -> Option<NatExpr> {
    match expr {
        TypeExpr::Name(name) => Some(NatExpr::Var(name)),
        TypeExpr::Number(n) => Some(NatExpr::Const(n)),
        TypeExpr::Expr(e) => Some(e),
        _ => None,
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Ident { name, .. } => format!("`{name}`"),
        TokenKind::Number(n) => format!("`{n}`"),
        TokenKind::LParen => "`(`".into(),
        TokenKind::RParen => "`)`".into(),
        TokenKind::LBrace => "`{`".into(),
        TokenKind::RBrace => "`}`".into(),
        TokenKind::LBracket => "`[`".into(),
        TokenKind::RBracket => "`]`".into(),
        TokenKind::Semi => "`;`".into(),
        TokenKind::Colon => "`:`".into(),
        TokenKind::Caret => "`^`".into(),
        TokenKind::Tilde => "`~`".into(),
        TokenKind::Question => "`?`".into(),
        TokenKind::Dot => "`.`".into(),
        TokenKind::Bang => "`!`".into(),
        TokenKind::Plus => "`+`".into(),
        TokenKind::Minus => "`-`".into(),
        TokenKind::Star => "`*`".into(),
        TokenKind::Hash => "`#`".into(),
        TokenKind::HashHash => "`##`".into(),
        TokenKind::HashLess => "`#<`".into(),
        TokenKind::HashLessEq => "`#<=`".into(),
        TokenKind::Eq => "`=`".into(),
        TokenKind::EqEq => "`==`".into(),
        TokenKind::NotEq => "`!=`".into(),
        TokenKind::Less => "`<`".into(),
        TokenKind::LessEq => "`<=`".into(),
        TokenKind::Greater => "`>`".into(),
        TokenKind::GreaterEq => "`>=`".into(),
        TokenKind::Eof => "end of schema".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::RawTag;

    #[test]
    fn parses_simple_declaration() {
        let ast = parse("_ x:# = Foo;").unwrap();
        let decl = &ast.declarations[0];
        assert_eq!(decl.constructor, "_");
        assert_eq!(decl.result, "Foo");
        assert_eq!(
            decl.items,
            vec![Item::Field { name: Some("x".into()), ty: TypeExpr::Nat32 }]
        );
    }

    #[test]
    fn parses_constraint_and_arithmetic() {
        let ast = parse("message#_ len:(## 7) { len <= 127 } text:(bits (len * 8)) = Message;").unwrap();
        let decl = &ast.declarations[0];
        assert_eq!(decl.tag, Some(RawTag::Hex("_".into())));
        assert_eq!(decl.items.len(), 3);
        assert!(matches!(&decl.items[1], Item::Constraint(c) if c.to_string() == "len <= 127"));
        match &decl.items[2] {
            Item::Field { ty: TypeExpr::Apply { head, args }, .. } => {
                assert_eq!(head, "bits");
                assert_eq!(args[0], TypeExpr::Expr(NatExpr::Binary {
                    op: ArithOp::Mul,
                    lhs: Box::new(NatExpr::Var("len".into())),
                    rhs: Box::new(NatExpr::Const(8)),
                }));
            }
            other => panic!("unexpected item {other:?}"),
        }
    }

    #[test]
    fn parses_params_and_result_args() {
        let ast = parse("just$1 {X:Type} value:X = Maybe X;").unwrap();
        let decl = &ast.declarations[0];
        assert_eq!(decl.items[0], Item::Param { name: "X".into(), kind: ParamKind::Type });
        assert_eq!(decl.result_args, vec![TypeExpr::Name("X".into())]);
    }

    #[test]
    fn parses_conditional_and_inline_cell() {
        let ast = parse("_ flags:(## 2) a:flags.1?uint8 b:^[ c:# d:# ] = T;").unwrap();
        let items = &ast.declarations[0].items;
        assert!(matches!(&items[1], Item::Field { ty: TypeExpr::Cond { bit: Some(1), .. }, .. }));
        assert!(matches!(&items[2], Item::Field { ty: TypeExpr::Ref(inner), .. } if matches!(**inner, TypeExpr::Cell(ref f) if f.len() == 2)));
    }

    #[test]
    fn empty_text_is_rejected() {
        assert_eq!(parse("  // nothing\n").unwrap_err(), CompileError::Empty);
    }

    #[test]
    fn lone_hash_is_a_syntax_error() {
        let err = parse("#").unwrap_err();
        assert!(matches!(err, CompileError::Syntax { .. }), "got: {err}");
    }

    #[test]
    fn missing_semicolon_is_reported() {
        let err = parse("_ x:# = Foo").unwrap_err();
        assert!(err.to_string().contains("expected `;`"), "got: {err}");
    }

    #[test]
    fn negated_params_are_unsupported() {
        let err = parse("unary_zero$0 = Unary ~0;").unwrap_err();
        assert!(matches!(err, CompileError::Unsupported { .. }), "got: {err}");
    }
}
