//! Lexer for CZ source files.
//!
//! Comments (line and nested block) are stripped in a pre-pass that is
//! string-literal aware, so a `//` or `/*` inside a string is never mistaken
//! for a comment start. The cleaned buffer, with comment bytes replaced by
//! spaces (newlines preserved), is then tokenized with `logos`. Positions
//! are recovered from byte offsets via a precomputed line-start table.

use logos::Logos;

fn unescape_string(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some('0') => result.push('\0'),
                Some('"') => result.push('"'),
                Some('\'') => result.push('\''),
                Some('\\') => result.push('\\'),
                Some(c) => {
                    result.push('\\');
                    result.push(c);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(ch);
        }
    }
    result
}

/// Strip line and nested block comments from `source`, preserving byte
/// offsets and newlines so later line/column computation stays accurate.
/// String and char literals are scanned over (not stripped) so a comment
/// marker inside them is inert.
fn strip_comments(source: &str) -> Result<String, LexError> {
    let bytes = source.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'"' => {
                let start = i;
                out.push(b);
                i += 1;
                let mut closed = false;
                while i < bytes.len() {
                    let c = bytes[i];
                    out.push(c);
                    if c == b'\\' && i + 1 < bytes.len() {
                        i += 1;
                        out.push(bytes[i]);
                        i += 1;
                        continue;
                    }
                    i += 1;
                    if c == b'"' {
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(LexError::UnterminatedString {
                        offset: byte_position(source, start),
                    });
                }
            }
            b'\'' => {
                let start = i;
                out.push(b);
                i += 1;
                let mut closed = false;
                while i < bytes.len() {
                    let c = bytes[i];
                    out.push(c);
                    if c == b'\\' && i + 1 < bytes.len() {
                        i += 1;
                        out.push(bytes[i]);
                        i += 1;
                        continue;
                    }
                    i += 1;
                    if c == b'\'' {
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(LexError::UnterminatedString {
                        offset: byte_position(source, start),
                    });
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    out.push(b' ');
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let start = i;
                let mut depth = 1usize;
                i += 2;
                loop {
                    if i >= bytes.len() {
                        return Err(LexError::UnterminatedBlockComment {
                            offset: byte_position(source, start),
                        });
                    }
                    if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'*') {
                        depth += 1;
                        i += 2;
                    } else if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
                        depth -= 1;
                        i += 2;
                        if depth == 0 {
                            break;
                        }
                    } else {
                        if bytes[i] == b'\n' {
                            out.push(b'\n');
                        } else {
                            out.push(b' ');
                        }
                        i += 1;
                    }
                }
            }
            _ => {
                out.push(b);
                i += 1;
            }
        }
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn byte_position(source: &str, offset: usize) -> (usize, usize) {
    let before = &source[..offset.min(source.len())];
    let line = before.chars().filter(|&c| c == '\n').count() + 1;
    let column = before.rfind('\n').map_or(before.chars().count() + 1, |pos| {
        before[pos + 1..].chars().count() + 1
    });
    (line, column)
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    // Keywords
    #[token("module")]
    Module,
    #[token("import")]
    Import,
    #[token("as")]
    As,
    #[token("as?")]
    AsQuestion,
    #[token("struct")]
    Struct,
    #[token("interface")]
    Interface,
    #[token("implements")]
    Implements,
    #[token("enum")]
    Enum,
    #[token("fn")]
    Fn,
    #[token("mut")]
    Mut,
    #[token("self")]
    SelfKw,
    #[token("if")]
    If,
    #[token("elif")]
    Elif,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("repeat")]
    Repeat,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("return")]
    Return,
    #[token("free")]
    Free,
    #[token("new")]
    New,
    #[token("clone")]
    Clone,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,
    #[token("assert")]
    Assert,
    #[token("log")]
    Log,
    #[token("todo")]
    Todo,
    #[token("fixme")]
    Fixme,
    #[token("sizeof")]
    Sizeof,
    #[token("is")]
    Is,
    #[token("typeof")]
    TypeofKw,

    // Directives (macro items and compile-time expressions)
    #[token("#module")]
    HashModule,
    #[token("#alias")]
    HashAlias,
    #[token("#alloc")]
    HashAlloc,
    #[token("#init")]
    HashInit,
    #[token("#unsafe")]
    HashUnsafe,
    #[token("#run")]
    HashRun,
    #[token("#FILE")]
    HashFile,
    #[token("#LINE")]
    HashLine,
    #[token("#FUNCTION")]
    HashFunction,
    #[token("#DEBUG")]
    HashDebug,

    // Multi-char operators (must precede their single-char prefixes)
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("&&")]
    AndAnd,
    #[token("and")]
    AndKw,
    #[token("||")]
    OrOr,
    #[token("or")]
    OrKw,
    #[token("!!")]
    BangBang,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("%=")]
    PercentEq,
    #[token("->")]
    Arrow,
    #[token("::")]
    DoubleColon,
    #[token("..")]
    DotDot,

    // Single-char operators and delimiters
    #[token("=")]
    Eq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("!")]
    Bang,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token("?")]
    Question,
    #[token("_", priority = 10)]
    Underscore,

    // Literals
    #[regex(r"0[xX][0-9a-fA-F]+(?:i8|i16|i32|i64|u8|u16|u32|u64)?", |lex| lex.slice().to_string())]
    HexLiteral(String),
    #[regex(r"0[bB][01]+(?:i8|i16|i32|i64|u8|u16|u32|u64)?", |lex| lex.slice().to_string())]
    BinaryLiteral(String),
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse().ok())]
    FloatLiteral(f64),
    #[regex(r"[0-9]+(?:i8|i16|i32|i64|u8|u16|u32|u64)?", |lex| lex.slice().to_string())]
    IntLiteral(String),
    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        unescape_string(&s[1..s.len()-1])
    })]
    StringLiteral(String),
    #[regex(r"'([^'\\]|\\.)'", |lex| {
        let s = lex.slice();
        unescape_string(&s[1..s.len()-1]).chars().next()
    })]
    CharLiteral(char),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionedToken {
    pub token: Token,
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
    /// Byte offsets into the original source `strip_comments` was given.
    /// Comment stripping preserves byte length (comment bytes become
    /// spaces), so these line up with the original text, not just `cleaned`.
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum LexError {
    #[error("unterminated string literal at {}:{}", .offset.0, .offset.1)]
    UnterminatedString { offset: (usize, usize) },
    #[error("unterminated block comment at {}:{}", .offset.0, .offset.1)]
    UnterminatedBlockComment { offset: (usize, usize) },
    #[error("unrecognized character at {line}:{column}: {found:?}")]
    UnrecognizedChar {
        line: usize,
        column: usize,
        found: String,
    },
}

/// Tokenize an entire source file up front. Token positions are 1-indexed
/// lines and columns.
pub fn tokenize(source: &str) -> Result<Vec<PositionedToken>, LexError> {
    let cleaned = strip_comments(source)?;
    let mut lexer = Token::lexer(&cleaned);
    let mut out = Vec::new();
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(token) => {
                let (line, column) = byte_position(&cleaned, span.start);
                out.push(PositionedToken {
                    token,
                    lexeme: lexer.slice().to_string(),
                    line,
                    column,
                    start: span.start,
                    end: span.end,
                });
            }
            Err(_) => {
                let (line, column) = byte_position(&cleaned, span.start);
                return Err(LexError::UnrecognizedChar {
                    line,
                    column,
                    found: lexer.slice().to_string(),
                });
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_and_positions() {
        let source = "fn main() i32 {\n  return 0\n}";
        let toks = tokenize(source).unwrap();
        assert_eq!(toks[0].token, Token::Fn);
        assert_eq!(toks[0].line, 1);
        assert_eq!(toks[0].column, 1);
        assert!(toks.iter().any(|t| t.token == Token::Return && t.line == 2));
    }

    #[test]
    fn nested_block_comments() {
        let source = "/* outer /* inner */ still outer */ fn";
        let toks = tokenize(source).unwrap();
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].token, Token::Fn);
    }

    #[test]
    fn unterminated_block_comment_errors() {
        let source = "fn /* never closed";
        assert!(matches!(
            tokenize(source),
            Err(LexError::UnterminatedBlockComment { .. })
        ));
    }

    #[test]
    fn unterminated_string_errors() {
        let source = "\"abc";
        assert!(matches!(
            tokenize(source),
            Err(LexError::UnterminatedString { .. })
        ));
    }

    #[test]
    fn string_with_comment_marker_is_not_a_comment() {
        let source = r#""// not a comment" fn"#;
        let toks = tokenize(source).unwrap();
        assert_eq!(toks[0].token, Token::StringLiteral("// not a comment".to_string()));
        assert_eq!(toks[1].token, Token::Fn);
    }

    #[test]
    fn numeric_literals() {
        let toks = tokenize("42 3.14 0x1Fu8 0b1010").unwrap();
        assert_eq!(toks[0].token, Token::IntLiteral("42".to_string()));
        assert_eq!(toks[1].token, Token::FloatLiteral(3.14));
        assert_eq!(toks[2].token, Token::HexLiteral("0x1Fu8".to_string()));
        assert_eq!(toks[3].token, Token::BinaryLiteral("0b1010".to_string()));
    }
}
