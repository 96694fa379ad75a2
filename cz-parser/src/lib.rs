//! Recursive-descent parser for CZ, with precedence-climbing expression
//! parsing. Produces the `cz_ast` tree directly; there is no separate CST.
//! Failure is immediate at the first violation — no error recovery.

mod expressions;
mod items;
mod statements;
mod types;

use cz_ast::{Module, NodeIdGen, Position};
use cz_lexer::{tokenize, LexError, PositionedToken, Token};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{file}:{line}: expected {expected}, found {found}")]
    Unexpected {
        file: String,
        line: usize,
        expected: String,
        found: String,
    },
    #[error("{0}")]
    Lex(#[from] LexError),
    #[error("{file}:{line}: #run block failed: {message}")]
    RunFailed {
        file: String,
        line: usize,
        message: String,
    },
}

pub struct Parser<'a> {
    pub(crate) tokens: Vec<PositionedToken>,
    pub(crate) current: usize,
    pub(crate) file: String,
    pub(crate) source: &'a str,
    pub(crate) ids: NodeIdGen,
    /// Directory the source file lives in; `#run` blocks execute with this
    /// as their working directory.
    pub(crate) run_cwd: std::path::PathBuf,
    /// Disables `#run` execution. Per the design, disabling it is an
    /// explicit error at the call site, never a silent no-op.
    pub(crate) allow_run: bool,
}

impl<'a> Parser<'a> {
    pub fn new(file: impl Into<String>, source: &'a str, run_cwd: std::path::PathBuf) -> Result<Self, ParseError> {
        let tokens = tokenize(source)?;
        Ok(Self {
            tokens,
            current: 0,
            file: file.into(),
            source,
            ids: NodeIdGen::new(),
            run_cwd,
            allow_run: true,
        })
    }

    /// Gate `#run` execution off. A source that then contains a `#run`
    /// block fails to parse with `RunFailed`, rather than silently skipping it.
    pub fn deny_run_blocks(mut self) -> Self {
        self.allow_run = false;
        self
    }

    pub fn parse_module(&mut self) -> Result<Module, ParseError> {
        let pos = self.peek_pos();
        let id = self.ids.next();
        let name = if self.check(&Token::HashModule) {
            self.advance();
            Some(self.consume_ident("module name")?)
        } else {
            None
        };

        let mut imports = Vec::new();
        let mut items = Vec::new();
        while !self.is_at_end() {
            if self.check(&Token::Import) {
                imports.push(self.parse_import()?);
            } else {
                items.push(self.parse_item()?);
            }
        }

        Ok(Module {
            id,
            name,
            imports,
            items,
            pos,
        })
    }

    // ---- token stream helpers ----

    pub(crate) fn peek(&self) -> &Token {
        self.tokens
            .get(self.current)
            .map(|t| &t.token)
            .unwrap_or(&Token::Semicolon)
    }

    pub(crate) fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.current + offset).map(|t| &t.token)
    }

    pub(crate) fn peek_pos(&self) -> Position {
        self.tokens
            .get(self.current)
            .map(|t| Position::new(t.line, t.column))
            .unwrap_or_else(|| {
                self.tokens
                    .last()
                    .map(|t| Position::new(t.line, t.column))
                    .unwrap_or_else(Position::unknown)
            })
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.current >= self.tokens.len()
    }

    pub(crate) fn check(&self, kind: &Token) -> bool {
        !self.is_at_end() && std::mem::discriminant(self.peek()) == std::mem::discriminant(kind)
    }

    pub(crate) fn check_any(&self, kinds: &[Token]) -> bool {
        kinds.iter().any(|k| self.check(k))
    }

    pub(crate) fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if !self.is_at_end() {
            self.current += 1;
        }
        tok
    }

    pub(crate) fn match_token(&mut self, kind: &Token) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: &Token, what: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(what))
        }
    }

    pub(crate) fn unexpected(&self, expected: &str) -> ParseError {
        let pos = self.peek_pos();
        ParseError::Unexpected {
            file: self.file.clone(),
            line: pos.line,
            expected: expected.to_string(),
            found: format!("{:?}", self.peek()),
        }
    }

    pub(crate) fn consume_ident(&mut self, what: &str) -> Result<String, ParseError> {
        if let Token::Ident(name) = self.peek().clone() {
            self.advance();
            Ok(name)
        } else {
            Err(self.unexpected(what))
        }
    }

    pub(crate) fn next_id(&mut self) -> cz_ast::NodeId {
        self.ids.next()
    }

    /// Reconstructs verbatim text between an already-consumed opening `{`
    /// and its matching `}`, used for `#unsafe`/`#run` blocks whose contents
    /// are raw C or shell text rather than CZ tokens. Slices the original
    /// source by byte offset so comments and original whitespace survive,
    /// rather than rejoining re-tokenized lexemes.
    pub(crate) fn consume_raw_brace_balanced_text(&mut self) -> String {
        let start_byte = self
            .current
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.end)
            .unwrap_or(0);
        let mut depth = 1i32;
        while depth > 0 && !self.is_at_end() {
            match self.peek() {
                Token::LBrace => depth += 1,
                Token::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            self.advance();
        }
        let end_byte = self.tokens.get(self.current).map(|t| t.start).unwrap_or(self.source.len());
        self.source.get(start_byte..end_byte).unwrap_or_default().trim_matches('\n').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cz_ast::{Item, Type};

    fn parse(src: &str) -> Module {
        let mut p = Parser::new("t.cz", src, std::env::temp_dir()).unwrap();
        p.parse_module().unwrap()
    }

    #[test]
    fn empty_module_has_no_items() {
        let m = parse("");
        assert!(m.items.is_empty());
        assert!(m.imports.is_empty());
    }

    #[test]
    fn parses_module_directive() {
        let m = parse("#module main");
        assert_eq!(m.name.as_deref(), Some("main"));
    }

    #[test]
    fn parses_single_import() {
        let m = parse("import cz.fmt\n");
        assert_eq!(m.imports.len(), 1);
        assert_eq!(m.imports[0].dotted(), "cz.fmt");
    }

    #[test]
    fn parses_discard_statement() {
        let m = parse("fn f() { _ = g()\n }\n");
        let Item::Function(f) = &m.items[0] else { panic!("expected a function item") };
        assert!(matches!(f.body.statements[0], cz_ast::Stmt::Discard { .. }));
    }

    #[test]
    fn parses_generic_function_concrete_types() {
        let m = parse("fn id[T in {i32, f32}](x: T) -> T { return x }\n");
        let Item::Function(f) = &m.items[0] else { panic!("expected a function item") };
        assert_eq!(f.generics.len(), 1);
        assert_eq!(f.generics[0].name, "T");
        assert_eq!(f.generics[0].concrete_types, vec![Type::Named("i32".to_string()), Type::Named("f32".to_string())]);
    }
}
