//! Type grammar.
//!
//! Concrete surface syntax (not pinned by the language spec, chosen here and
//! applied consistently): `T*` pointer, `T?` nullable, `T[N]`/`T[*]` array,
//! `T[]` slice, `T...` varargs, `map[K]V` map, `pair[L, R]` pair. `string`,
//! `void` and `any` are reserved identifiers recognized at this layer.

use crate::{ParseError, Parser};
use cz_ast::{ArraySize, Type};
use cz_lexer::Token;

impl<'a> Parser<'a> {
    pub(crate) fn parse_type(&mut self) -> Result<Type, ParseError> {
        let mut ty = self.parse_type_atom()?;
        loop {
            if self.match_token(&Token::Star) {
                ty = Type::Pointer(Box::new(ty));
            } else if self.match_token(&Token::Question) {
                ty = Type::Nullable(Box::new(ty));
            } else if self.check(&Token::DotDot) && matches!(self.peek_at(1), Some(Token::Dot)) {
                self.advance();
                self.advance();
                ty = Type::Varargs(Box::new(ty));
            } else if self.check(&Token::LBracket) {
                // Disambiguate T[] / T[N] / T[*]
                self.advance();
                if self.match_token(&Token::RBracket) {
                    ty = Type::Slice(Box::new(ty));
                } else if self.match_token(&Token::Star) {
                    self.expect(&Token::RBracket, "`]` after `*`")?;
                    ty = Type::Array(Box::new(ty), ArraySize::Inferred);
                } else if let Token::IntLiteral(n) = self.peek().clone() {
                    self.advance();
                    self.expect(&Token::RBracket, "`]` after array size")?;
                    let size: usize = n
                        .trim_end_matches(|c: char| c.is_alphabetic())
                        .parse()
                        .map_err(|_| self.unexpected("integer array size"))?;
                    ty = Type::Array(Box::new(ty), ArraySize::Literal(size));
                } else {
                    return Err(self.unexpected("`]`, `*` or an integer literal"));
                }
            } else {
                break;
            }
        }
        Ok(ty)
    }

    fn parse_type_atom(&mut self) -> Result<Type, ParseError> {
        if self.match_token(&Token::LParen) {
            // pair sugar: (L, R)
            let left = self.parse_type()?;
            self.expect(&Token::Comma, "`,` in pair type")?;
            let right = self.parse_type()?;
            self.expect(&Token::RParen, "`)` closing pair type")?;
            return Ok(Type::Pair(Box::new(left), Box::new(right)));
        }

        let name = self.consume_ident("a type name")?;
        match name.as_str() {
            "string" => Ok(Type::String),
            "void" => Ok(Type::Void),
            "any" => Ok(Type::Any),
            "map" => {
                self.expect(&Token::LBracket, "`[` after `map`")?;
                let key = self.parse_type()?;
                self.expect(&Token::RBracket, "`]` after map key type")?;
                let value = self.parse_type()?;
                Ok(Type::Map(Box::new(key), Box::new(value)))
            }
            "pair" => {
                self.expect(&Token::LBracket, "`[` after `pair`")?;
                let left = self.parse_type()?;
                self.expect(&Token::Comma, "`,` in pair type")?;
                let right = self.parse_type()?;
                self.expect(&Token::RBracket, "`]` closing pair type")?;
                Ok(Type::Pair(Box::new(left), Box::new(right)))
            }
            _ => Ok(Type::Named(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ty(src: &str) -> Type {
        let mut p = Parser::new("t.cz", src, std::env::temp_dir()).unwrap();
        p.parse_type().unwrap()
    }

    #[test]
    fn primitives_are_named() {
        assert_eq!(parse_ty("i32"), Type::Named("i32".into()));
    }

    #[test]
    fn pointer_and_nullable() {
        assert_eq!(
            parse_ty("Foo*"),
            Type::Pointer(Box::new(Type::Named("Foo".into())))
        );
        assert_eq!(
            parse_ty("Foo?"),
            Type::Nullable(Box::new(Type::Named("Foo".into())))
        );
    }

    #[test]
    fn array_slice_and_varargs() {
        assert_eq!(
            parse_ty("i32[3]"),
            Type::Array(Box::new(Type::Named("i32".into())), ArraySize::Literal(3))
        );
        assert_eq!(
            parse_ty("i32[]"),
            Type::Slice(Box::new(Type::Named("i32".into())))
        );
        assert_eq!(
            parse_ty("i32..."),
            Type::Varargs(Box::new(Type::Named("i32".into())))
        );
    }

    #[test]
    fn map_and_pair() {
        assert_eq!(
            parse_ty("map[string]i32"),
            Type::Map(Box::new(Type::String), Box::new(Type::Named("i32".into())))
        );
        assert_eq!(
            parse_ty("pair[i32, f32]"),
            Type::Pair(
                Box::new(Type::Named("i32".into())),
                Box::new(Type::Named("f32".into()))
            )
        );
    }
}
