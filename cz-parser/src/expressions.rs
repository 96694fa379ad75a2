//! Expression grammar, precedence lowest to highest:
//! logical-or, logical-and, equality, comparison, additive, multiplicative,
//! unary, postfix (call/index/field/method), primary. (Assignment is a
//! statement form, not an expression, so it is not part of this chain.)

use crate::{ParseError, Parser};
use cz_ast::{BinOp, Directive, Expr, Literal, UnaryOp};
use cz_lexer::Token;

impl<'a> Parser<'a> {
    pub(crate) fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.check(&Token::OrOr) || self.check(&Token::OrKw) {
            let pos = self.peek_pos();
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Binary {
                id: self.next_id(),
                op: BinOp::Or,
                left: Box::new(left),
                right: Box::new(right),
                pos,
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_equality()?;
        while self.check(&Token::AndAnd) || self.check(&Token::AndKw) {
            let pos = self.peek_pos();
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::Binary {
                id: self.next_id(),
                op: BinOp::And,
                left: Box::new(left),
                right: Box::new(right),
                pos,
            };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = if self.check(&Token::EqEq) {
                BinOp::Eq
            } else if self.check(&Token::NotEq) {
                BinOp::Ne
            } else {
                break;
            };
            let pos = self.peek_pos();
            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::Binary {
                id: self.next_id(),
                op,
                left: Box::new(left),
                right: Box::new(right),
                pos,
            };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = if self.check(&Token::Lt) {
                BinOp::Lt
            } else if self.check(&Token::LtEq) {
                BinOp::Le
            } else if self.check(&Token::Gt) {
                BinOp::Gt
            } else if self.check(&Token::GtEq) {
                BinOp::Ge
            } else {
                break;
            };
            let pos = self.peek_pos();
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::Binary {
                id: self.next_id(),
                op,
                left: Box::new(left),
                right: Box::new(right),
                pos,
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.check(&Token::Plus) {
                BinOp::Add
            } else if self.check(&Token::Minus) {
                BinOp::Sub
            } else {
                break;
            };
            let pos = self.peek_pos();
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                id: self.next_id(),
                op,
                left: Box::new(left),
                right: Box::new(right),
                pos,
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.check(&Token::Star) {
                BinOp::Mul
            } else if self.check(&Token::Slash) {
                BinOp::Div
            } else if self.check(&Token::Percent) {
                BinOp::Mod
            } else {
                break;
            };
            let pos = self.peek_pos();
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary {
                id: self.next_id(),
                op,
                left: Box::new(left),
                right: Box::new(right),
                pos,
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let pos = self.peek_pos();
        let op = if self.match_token(&Token::Minus) {
            Some(UnaryOp::Neg)
        } else if self.match_token(&Token::Bang) {
            Some(UnaryOp::Not)
        } else if self.match_token(&Token::Star) {
            Some(UnaryOp::Deref)
        } else {
            None
        };
        if let Some(op) = op {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                id: self.next_id(),
                op,
                operand: Box::new(operand),
                pos,
            });
        }
        self.parse_cast_chain()
    }

    /// `expr as Type`, `expr as? Type : fallback`, `expr!!`, `expr is Type`
    /// all bind tighter than binary operators but looser than postfix.
    fn parse_cast_chain(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_postfix()?;
        loop {
            let pos = self.peek_pos();
            if self.match_token(&Token::As) {
                let target = self.parse_type()?;
                expr = Expr::Cast {
                    id: self.next_id(),
                    target,
                    value: Box::new(expr),
                    pos,
                };
            } else if self.match_token(&Token::AsQuestion) {
                let target = self.parse_type()?;
                self.expect(&Token::Colon, "`:` with a fallback after `as?`")?;
                let fallback = self.parse_unary()?;
                expr = Expr::SafeCast {
                    id: self.next_id(),
                    target,
                    value: Box::new(expr),
                    fallback: Box::new(fallback),
                    pos,
                };
            } else if self.match_token(&Token::BangBang) {
                expr = Expr::NullCheck {
                    id: self.next_id(),
                    value: Box::new(expr),
                    pos,
                };
            } else if self.match_token(&Token::Is) {
                let ty = self.parse_type()?;
                expr = Expr::IsCheck {
                    id: self.next_id(),
                    value: Box::new(expr),
                    ty,
                    pos,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            let pos = self.peek_pos();
            if self.match_token(&Token::Dot) {
                let name = self.consume_ident("a field or method name")?;
                if self.check(&Token::LParen) {
                    let args = self.parse_call_args()?;
                    expr = Expr::MethodCall {
                        id: self.next_id(),
                        receiver: Box::new(expr),
                        method: name,
                        args,
                        pos,
                    };
                } else {
                    expr = Expr::Field {
                        id: self.next_id(),
                        receiver: Box::new(expr),
                        name,
                        pos,
                    };
                }
            } else if self.match_token(&Token::DoubleColon) {
                // Type::method(args) — only valid when the receiver parsed as
                // a bare identifier naming a type.
                let type_name = match &expr {
                    Expr::Identifier { name, .. } => name.clone(),
                    _ => return Err(self.unexpected("a type name before `::`")),
                };
                let method = self.consume_ident("a static method name")?;
                let args = self.parse_call_args()?;
                expr = Expr::StaticMethodCall {
                    id: self.next_id(),
                    type_name,
                    method,
                    args,
                    pos,
                };
            } else if self.check(&Token::LBracket) {
                self.advance();
                if self.check(&Token::DotDot) {
                    self.advance();
                    let end = if self.check(&Token::RBracket) {
                        None
                    } else {
                        Some(Box::new(self.parse_expression()?))
                    };
                    self.expect(&Token::RBracket, "`]` closing slice")?;
                    expr = Expr::Slice {
                        id: self.next_id(),
                        receiver: Box::new(expr),
                        start: None,
                        end,
                        pos,
                    };
                } else {
                    let first = self.parse_expression()?;
                    if self.match_token(&Token::DotDot) {
                        let end = if self.check(&Token::RBracket) {
                            None
                        } else {
                            Some(Box::new(self.parse_expression()?))
                        };
                        self.expect(&Token::RBracket, "`]` closing slice")?;
                        expr = Expr::Slice {
                            id: self.next_id(),
                            receiver: Box::new(expr),
                            start: Some(Box::new(first)),
                            end,
                            pos,
                        };
                    } else {
                        self.expect(&Token::RBracket, "`]` closing index")?;
                        expr = Expr::Index {
                            id: self.next_id(),
                            receiver: Box::new(expr),
                            index: Box::new(first),
                            pos,
                        };
                    }
                }
            } else if self.check(&Token::LParen) {
                let args = self.parse_call_args()?;
                expr = Expr::Call {
                    id: self.next_id(),
                    callee: Box::new(expr),
                    args,
                    pos,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    pub(crate) fn parse_call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(&Token::LParen, "`(`")?;
        let mut args = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                let pos = self.peek_pos();
                if self.match_token(&Token::Mut) {
                    let inner = self.parse_expression()?;
                    args.push(Expr::MutArg {
                        id: self.next_id(),
                        inner: Box::new(inner),
                        pos,
                    });
                } else {
                    args.push(self.parse_expression()?);
                }
                if !self.match_token(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RParen, "`)` closing argument list")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let pos = self.peek_pos();
        match self.peek().clone() {
            Token::IntLiteral(s) => {
                self.advance();
                let digits: String = s.chars().take_while(|c| c.is_ascii_alphanumeric() && *c != 'x').collect();
                let n: i64 = digits
                    .trim_end_matches(|c: char| c.is_alphabetic())
                    .parse()
                    .unwrap_or(0);
                Ok(Expr::Literal { id: self.next_id(), value: Literal::Int(n), pos })
            }
            Token::HexLiteral(s) | Token::BinaryLiteral(s) => {
                self.advance();
                let trimmed = s.trim_end_matches(|c: char| c.is_alphabetic() && !"xXbB".contains(c));
                let n = parse_radix_literal(trimmed).unwrap_or(0);
                Ok(Expr::Literal { id: self.next_id(), value: Literal::Int(n), pos })
            }
            Token::FloatLiteral(f) => {
                self.advance();
                Ok(Expr::Literal { id: self.next_id(), value: Literal::Float(f), pos })
            }
            Token::StringLiteral(s) => {
                self.advance();
                Ok(Expr::Literal { id: self.next_id(), value: Literal::Str(s), pos })
            }
            Token::CharLiteral(c) => {
                self.advance();
                Ok(Expr::Literal { id: self.next_id(), value: Literal::Char(c), pos })
            }
            Token::True => {
                self.advance();
                Ok(Expr::Literal { id: self.next_id(), value: Literal::Bool(true), pos })
            }
            Token::False => {
                self.advance();
                Ok(Expr::Literal { id: self.next_id(), value: Literal::Bool(false), pos })
            }
            Token::Null => {
                self.advance();
                Ok(Expr::Literal { id: self.next_id(), value: Literal::Null, pos })
            }
            Token::HashFile => {
                self.advance();
                Ok(Expr::DirectiveExpr { id: self.next_id(), directive: Directive::File, pos })
            }
            Token::HashLine => {
                self.advance();
                Ok(Expr::DirectiveExpr { id: self.next_id(), directive: Directive::Line, pos })
            }
            Token::HashFunction => {
                self.advance();
                Ok(Expr::DirectiveExpr { id: self.next_id(), directive: Directive::Function, pos })
            }
            Token::HashDebug => {
                self.advance();
                Ok(Expr::DirectiveExpr { id: self.next_id(), directive: Directive::Debug, pos })
            }
            Token::Sizeof => {
                self.advance();
                self.expect(&Token::LParen, "`(` after `sizeof`")?;
                let ty = self.parse_type()?;
                self.expect(&Token::RParen, "`)` closing `sizeof`")?;
                Ok(Expr::SizeOf { id: self.next_id(), ty, pos })
            }
            Token::TypeofKw => {
                self.advance();
                self.expect(&Token::LParen, "`(` after `typeof`")?;
                let value = self.parse_expression()?;
                self.expect(&Token::RParen, "`)` closing `typeof`")?;
                Ok(Expr::TypeOf { id: self.next_id(), value: Box::new(value), pos })
            }
            Token::Clone => {
                self.advance();
                let type_hint = if self.match_token(&Token::Lt) {
                    let t = self.parse_type()?;
                    self.expect(&Token::Gt, "`>` closing `clone<T>`")?;
                    Some(t)
                } else {
                    None
                };
                self.expect(&Token::LParen, "`(` after `clone`")?;
                let value = self.parse_expression()?;
                self.expect(&Token::RParen, "`)` closing `clone`")?;
                Ok(Expr::Clone { id: self.next_id(), type_hint, value: Box::new(value), pos })
            }
            Token::New => self.parse_new(),
            Token::SelfKw => {
                self.advance();
                Ok(Expr::Identifier { id: self.next_id(), name: "self".to_string(), pos })
            }
            Token::Ident(name) => {
                self.advance();
                if self.check(&Token::LBrace) && self.looks_like_struct_literal() {
                    self.parse_struct_literal(name, pos)
                } else {
                    Ok(Expr::Identifier { id: self.next_id(), name, pos })
                }
            }
            Token::LParen => {
                self.advance();
                let first = self.parse_expression()?;
                if self.match_token(&Token::Comma) {
                    let right = self.parse_expression()?;
                    self.expect(&Token::RParen, "`)` closing pair literal")?;
                    Ok(Expr::PairLiteral { id: self.next_id(), left: Box::new(first), right: Box::new(right), pos })
                } else {
                    self.expect(&Token::RParen, "`)` closing parenthesized expression")?;
                    Ok(first)
                }
            }
            Token::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                if !self.check(&Token::RBracket) {
                    loop {
                        elements.push(self.parse_expression()?);
                        if !self.match_token(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&Token::RBracket, "`]` closing array literal")?;
                Ok(Expr::ArrayLiteral { id: self.next_id(), elements, pos })
            }
            other => Err(self.unexpected(&format!("an expression, found {:?}", other))),
        }
    }

    /// Heuristic used to decide whether `Ident {` opens a struct literal
    /// (`Point { x: 1 }`) rather than, say, the body of an `if`/`while`
    /// whose condition happens to be a bare identifier.
    fn looks_like_struct_literal(&self) -> bool {
        matches!(self.peek_at(1), Some(Token::Ident(_)) | Some(Token::RBrace))
            && !matches!(self.peek_at(2), Some(Token::LBrace))
    }

    fn parse_struct_literal(&mut self, type_name: String, pos: cz_ast::Position) -> Result<Expr, ParseError> {
        self.expect(&Token::LBrace, "`{` opening struct literal")?;
        let fields = self.parse_field_inits()?;
        self.expect(&Token::RBrace, "`}` closing struct literal")?;
        Ok(Expr::StructLiteral { id: self.next_id(), type_name, fields, pos })
    }

    fn parse_field_inits(&mut self) -> Result<Vec<(String, Expr)>, ParseError> {
        let mut fields = Vec::new();
        if !self.check(&Token::RBrace) {
            loop {
                let name = self.consume_ident("a field name")?;
                self.expect(&Token::Colon, "`:` after field name")?;
                let value = self.parse_expression()?;
                fields.push((name, value));
                if !self.match_token(&Token::Comma) {
                    break;
                }
            }
        }
        Ok(fields)
    }

    fn parse_new(&mut self) -> Result<Expr, ParseError> {
        let pos = self.peek_pos();
        self.advance(); // `new`
        if self.check(&Token::LBracket) {
            self.advance();
            let mut elements = Vec::new();
            if !self.check(&Token::RBracket) {
                loop {
                    elements.push(self.parse_expression()?);
                    if !self.match_token(&Token::Comma) {
                        break;
                    }
                }
            }
            self.expect(&Token::RBracket, "`]` closing `new [...]`")?;
            return Ok(Expr::NewArray { id: self.next_id(), elements, pos });
        }

        let name = self.consume_ident("a type or `map`")?;
        if name == "map" {
            self.expect(&Token::LBracket, "`[` after `new map`")?;
            let key_type = self.parse_type()?;
            self.expect(&Token::RBracket, "`]` after map key type")?;
            let value_type = self.parse_type()?;
            self.expect(&Token::LBrace, "`{` opening map literal")?;
            let mut entries = Vec::new();
            if !self.check(&Token::RBrace) {
                loop {
                    let key = self.parse_expression()?;
                    self.expect(&Token::Colon, "`:` after map key")?;
                    let value = self.parse_expression()?;
                    entries.push((key, value));
                    if !self.match_token(&Token::Comma) {
                        break;
                    }
                }
            }
            self.expect(&Token::RBrace, "`}` closing map literal")?;
            return Ok(Expr::NewMap { id: self.next_id(), key_type, value_type, entries, pos });
        }

        self.expect(&Token::LBrace, "`{` opening `new` struct literal")?;
        let fields = self.parse_field_inits()?;
        self.expect(&Token::RBrace, "`}` closing `new` struct literal")?;
        Ok(Expr::NewHeap { id: self.next_id(), type_name: name, fields, pos })
    }
}

fn parse_radix_literal(s: &str) -> Option<i64> {
    if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        i64::from_str_radix(rest, 16).ok()
    } else if let Some(rest) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        i64::from_str_radix(rest, 2).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_expr(src: &str) -> Expr {
        let mut p = Parser::new("t.cz", src, std::env::temp_dir()).unwrap();
        p.parse_expression().unwrap()
    }

    #[test]
    fn precedence_mul_before_add() {
        let e = parse_expr("1 + 2 * 3");
        match e {
            Expr::Binary { op: BinOp::Add, right, .. } => {
                assert!(matches!(*right, Expr::Binary { op: BinOp::Mul, .. }));
            }
            _ => panic!("expected Add at top"),
        }
    }

    #[test]
    fn call_chain() {
        let e = parse_expr("a.b(1, 2).c");
        assert!(matches!(e, Expr::Field { .. }));
    }

    #[test]
    fn new_heap_struct() {
        let e = parse_expr("new Foo { x: 1 }");
        assert!(matches!(e, Expr::NewHeap { .. }));
    }

    #[test]
    fn safe_cast_with_fallback() {
        let e = parse_expr("x as? i32 : 0");
        assert!(matches!(e, Expr::SafeCast { .. }));
    }

    #[test]
    fn null_check_and_is_check() {
        assert!(matches!(parse_expr("p!!"), Expr::NullCheck { .. }));
        assert!(matches!(parse_expr("x is i32"), Expr::IsCheck { .. }));
    }
}
