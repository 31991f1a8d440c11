//! Tokenizer for TL-B schema text.

use crate::error::CompileError;

/// Constructor tag written directly after a constructor name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawTag {
    /// `#` followed by hex digits, optionally ending in `_`.
    Hex(String),
    /// `$` followed by binary digits, or `_` for an empty tag.
    Binary(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Ident { name: String, tag: Option<RawTag> },
    Number(u64),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Colon,
    Caret,
    Tilde,
    Question,
    Dot,
    Bang,
    Plus,
    Minus,
    Star,
    /// `#`
    Hash,
    /// `##`
    HashHash,
    /// `#<`
    HashLess,
    /// `#<=`
    HashLessEq,
    Eq,
    EqEq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::Syntax {
            line: self.line,
            column: self.column,
            message: message.into(),
        }
    }

    fn skip_trivia(&mut self) -> Result<(), CompileError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') => {
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    match ahead.next() {
                        Some('/') => {
                            while let Some(c) = self.bump() {
                                if c == '\n' {
                                    break;
                                }
                            }
                        }
                        Some('*') => {
                            self.bump();
                            self.bump();
                            let mut prev = '\0';
                            loop {
                                let Some(c) = self.bump() else {
                                    return Err(self.error("unterminated block comment"));
                                };
                                if prev == '*' && c == '/' {
                                    break;
                                }
                                prev = c;
                            }
                        }
                        _ => return Err(self.error("unexpected `/`")),
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }

    fn next_token(&mut self) -> Result<Token, CompileError> {
        self.skip_trivia()?;
        let (line, column) = (self.line, self.column);
        let token = |kind| Token { kind, line, column };

        let Some(c) = self.peek() else {
            return Ok(token(TokenKind::Eof));
        };

        if c.is_ascii_alphabetic() || c == '_' {
            let name = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
            let tag = match self.peek() {
                Some('#') => {
                    self.bump();
                    let digits = self.take_while(|c| c.is_ascii_hexdigit() || c == '_');
                    Some(RawTag::Hex(digits))
                }
                Some('$') => {
                    self.bump();
                    let digits = self.take_while(|c| c == '0' || c == '1' || c == '_');
                    Some(RawTag::Binary(digits))
                }
                _ => None,
            };
            return Ok(token(TokenKind::Ident { name, tag }));
        }

        if c.is_ascii_digit() {
            let digits = self.take_while(|c| c.is_ascii_digit());
            let value = digits
                .parse::<u64>()
                .map_err(|_| self.error(format!("number `{digits}` is too large")))?;
            return Ok(token(TokenKind::Number(value)));
        }

        self.bump();
        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ';' => TokenKind::Semi,
            ':' => TokenKind::Colon,
            '^' => TokenKind::Caret,
            '~' => TokenKind::Tilde,
            '?' => TokenKind::Question,
            '.' => TokenKind::Dot,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '!' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                }
            }
            '#' => match self.peek() {
                Some('#') => {
                    self.bump();
                    TokenKind::HashHash
                }
                Some('<') => {
                    self.bump();
                    if self.peek() == Some('=') {
                        self.bump();
                        TokenKind::HashLessEq
                    } else {
                        TokenKind::HashLess
                    }
                }
                _ => TokenKind::Hash,
            },
            '=' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::EqEq
                } else {
                    TokenKind::Eq
                }
            }
            '<' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::LessEq
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::GreaterEq
                } else {
                    TokenKind::Greater
                }
            }
            other => {
                return Err(CompileError::Syntax {
                    line,
                    column,
                    message: format!("unexpected character `{other}`"),
                })
            }
        };
        Ok(token(kind))
    }
}

/// Split schema text into tokens, ending with [`TokenKind::Eof`].
pub fn tokenize(text: &str) -> Result<Vec<Token>, CompileError> {
    let mut lexer = Lexer {
        chars: text.chars().peekable(),
        line: 1,
        column: 1,
    };
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(text).unwrap().into_iter().map(|t| t.kind).collect()
    }

    fn ident(name: &str) -> TokenKind {
        TokenKind::Ident { name: name.to_string(), tag: None }
    }

    #[test]
    fn constructor_tags_attach_to_names() {
        let tokens = kinds("burn#595f07bc addr_std$10 message#_");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Ident { name: "burn".into(), tag: Some(RawTag::Hex("595f07bc".into())) },
                TokenKind::Ident { name: "addr_std".into(), tag: Some(RawTag::Binary("10".into())) },
                TokenKind::Ident { name: "message".into(), tag: Some(RawTag::Hex("_".into())) },
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn hash_family_operators() {
        assert_eq!(
            kinds("x:# (## 7) (#< 16) (#<= 30)"),
            vec![
                ident("x"),
                TokenKind::Colon,
                TokenKind::Hash,
                TokenKind::LParen,
                TokenKind::HashHash,
                TokenKind::Number(7),
                TokenKind::RParen,
                TokenKind::LParen,
                TokenKind::HashLess,
                TokenKind::Number(16),
                TokenKind::RParen,
                TokenKind::LParen,
                TokenKind::HashLessEq,
                TokenKind::Number(30),
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        let tokens = kinds("// header\n_ /* inline */ = Foo; // trailing");
        assert_eq!(tokens, vec![ident("_"), TokenKind::Eq, ident("Foo"), TokenKind::Semi, TokenKind::Eof]);
    }

    #[test]
    fn positions_track_lines() {
        let tokens = tokenize("_ = A;\n  _ = B;").unwrap();
        assert_eq!((tokens[4].line, tokens[4].column), (2, 3));
    }

    #[test]
    fn stray_characters_are_errors() {
        let err = tokenize("_ x:# = Foo@;").unwrap_err();
        assert_eq!(err.to_string(), "line 1:12: unexpected character `@`");
    }
}
