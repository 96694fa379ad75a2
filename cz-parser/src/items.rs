//! Import and top-level item parsing: struct, interface, enum, function,
//! type alias and `#alloc` declarations.

use crate::{ParseError, Parser};
use cz_ast::{
    AllocatorDecl, EnumDecl, Field, FunctionDecl, GenericParam, Import, InterfaceDecl, Item,
    MethodSig, Param, StructDecl, Type, TypeAliasDecl, Visibility,
};
use cz_lexer::Token;

impl<'a> Parser<'a> {
    pub(crate) fn parse_import(&mut self) -> Result<Import, ParseError> {
        let pos = self.peek_pos();
        let id = self.next_id();
        self.expect(&Token::Import, "`import`")?;
        let mut path = vec![self.consume_ident("a module path segment")?];
        while self.match_token(&Token::Dot) {
            path.push(self.consume_ident("a module path segment")?);
        }
        let alias = if self.match_token(&Token::As) {
            Some(self.consume_ident("an import alias")?)
        } else {
            None
        };
        Ok(Import { id, path, alias, pos })
    }

    pub(crate) fn parse_item(&mut self) -> Result<Item, ParseError> {
        match self.peek().clone() {
            Token::Struct => self.parse_struct().map(Item::Struct),
            Token::Interface => self.parse_interface().map(Item::Interface),
            Token::Enum => self.parse_enum().map(Item::Enum),
            Token::Fn => self.parse_function(false).map(Item::Function),
            Token::HashUnsafe => self.parse_unsafe_function().map(Item::Function),
            Token::HashAlias => self.parse_type_alias().map(Item::TypeAlias),
            Token::HashAlloc => self.parse_allocator_decl().map(Item::AllocatorMacro),
            other => Err(self.unexpected(&format!("a top-level declaration, found {:?}", other))),
        }
    }

    fn parse_visibility(&mut self) -> Visibility {
        // Bare names are public by default; a leading underscore-prefixed
        // name is private. Visibility is derived from the name itself, not
        // a separate keyword, matching the surface grammar used throughout.
        Visibility::Public
    }

    fn parse_struct(&mut self) -> Result<StructDecl, ParseError> {
        let pos = self.peek_pos();
        let id = self.next_id();
        self.advance(); // struct
        let name = self.consume_ident("a struct name")?;
        let implements = if self.match_token(&Token::Implements) {
            Some(self.consume_ident("an interface name")?)
        } else {
            None
        };
        self.expect(&Token::LBrace, "`{` opening struct body")?;
        let mut fields = Vec::new();
        while !self.check(&Token::RBrace) {
            fields.push(self.parse_field()?);
        }
        self.expect(&Token::RBrace, "`}` closing struct body")?;
        Ok(StructDecl { id, name, fields, implements, pos })
    }

    fn parse_field(&mut self) -> Result<Field, ParseError> {
        let pos = self.peek_pos();
        let visibility = self.parse_visibility();
        let name = self.consume_ident("a field name")?;
        self.expect(&Token::Colon, "`:` after field name")?;
        let ty = self.parse_type()?;
        Ok(Field { name, ty, visibility, pos })
    }

    fn parse_interface(&mut self) -> Result<InterfaceDecl, ParseError> {
        let pos = self.peek_pos();
        let id = self.next_id();
        self.advance(); // interface
        let name = self.consume_ident("an interface name")?;
        self.expect(&Token::LBrace, "`{` opening interface body")?;
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.check(&Token::Fn) {
                methods.push(self.parse_method_sig()?);
            } else {
                fields.push(self.parse_field()?);
            }
        }
        self.expect(&Token::RBrace, "`}` closing interface body")?;
        Ok(InterfaceDecl { id, name, fields, methods, pos })
    }

    fn parse_method_sig(&mut self) -> Result<MethodSig, ParseError> {
        let pos = self.peek_pos();
        self.advance(); // fn
        let name = self.consume_ident("a method name")?;
        let params = self.parse_params()?;
        let return_type = self.parse_return_type()?;
        Ok(MethodSig { name, params, return_type, pos })
    }

    fn parse_enum(&mut self) -> Result<EnumDecl, ParseError> {
        let pos = self.peek_pos();
        let id = self.next_id();
        self.advance(); // enum
        let name = self.consume_ident("an enum name")?;
        self.expect(&Token::LBrace, "`{` opening enum body")?;
        let mut values = Vec::new();
        if !self.check(&Token::RBrace) {
            loop {
                values.push(self.consume_ident("an enum value")?);
                if !self.match_token(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RBrace, "`}` closing enum body")?;
        Ok(EnumDecl { id, name, values, pos })
    }

    fn parse_type_alias(&mut self) -> Result<TypeAliasDecl, ParseError> {
        let pos = self.peek_pos();
        let id = self.next_id();
        self.advance(); // #alias
        let alias = self.consume_ident("an alias name")?;
        self.expect(&Token::Eq, "`=` after alias name")?;
        let target = self.parse_type()?;
        Ok(TypeAliasDecl { id, alias, target, pos })
    }

    fn parse_allocator_decl(&mut self) -> Result<AllocatorDecl, ParseError> {
        let pos = self.peek_pos();
        let id = self.next_id();
        self.advance(); // #alloc
        let name = self.consume_ident("an allocator name")?;
        Ok(AllocatorDecl { id, name, pos })
    }

    /// A `#unsafe fn` has no CZ body — its statements are a single raw C
    /// blob spliced verbatim by the code generator.
    fn parse_unsafe_function(&mut self) -> Result<FunctionDecl, ParseError> {
        let pos = self.peek_pos();
        let id = self.next_id();
        self.advance(); // #unsafe
        self.expect(&Token::Fn, "`fn` after `#unsafe`")?;
        let (receiver, name) = self.parse_fn_name_and_receiver()?;
        let params = self.parse_params()?;
        let return_type = self.parse_return_type()?;
        self.expect(&Token::LBrace, "`{` opening `#unsafe fn` body")?;
        let raw_c = self.consume_raw_brace_balanced_text();
        self.expect(&Token::RBrace, "`}` closing `#unsafe fn` body")?;
        Ok(FunctionDecl {
            id,
            name,
            receiver,
            params,
            generics: Vec::new(),
            return_type,
            body: cz_ast::Block { id: self.next_id(), statements: Vec::new(), pos },
            inline: false,
            unsafe_body: Some(raw_c),
            pos,
        })
    }

    fn parse_function(&mut self, inline: bool) -> Result<FunctionDecl, ParseError> {
        let pos = self.peek_pos();
        let id = self.next_id();
        self.advance(); // fn
        let (receiver, name) = self.parse_fn_name_and_receiver()?;
        let generics = self.parse_generics()?;
        let params = self.parse_params()?;
        let return_type = self.parse_return_type()?;
        let body = self.parse_block()?;
        Ok(FunctionDecl {
            id,
            name,
            receiver,
            params,
            generics,
            return_type,
            body,
            inline,
            unsafe_body: None,
            pos,
        })
    }

    /// `fn name(...)` or `fn (Receiver) name(...)` for a method.
    fn parse_fn_name_and_receiver(&mut self) -> Result<(Option<Type>, String), ParseError> {
        if self.match_token(&Token::LParen) {
            let receiver = self.parse_type()?;
            self.expect(&Token::RParen, "`)` closing receiver type")?;
            let name = self.consume_ident("a method name")?;
            Ok((Some(receiver), name))
        } else {
            let name = self.consume_ident("a function name")?;
            Ok((None, name))
        }
    }

    /// `[T in {i32, f32}, U in {...}]` after a function name. Each parameter
    /// carries its own concrete-type set inline; monomorphization expands one
    /// copy per combination later in declaration collection.
    fn parse_generics(&mut self) -> Result<Vec<GenericParam>, ParseError> {
        if !self.match_token(&Token::LBracket) {
            return Ok(Vec::new());
        }
        let mut generics = Vec::new();
        if !self.check(&Token::RBracket) {
            loop {
                let name = self.consume_ident("a generic parameter name")?;
                self.expect(&Token::In, "`in` after generic parameter name")?;
                self.expect(&Token::LBrace, "`{` opening the concrete-type set")?;
                let mut concrete_types = Vec::new();
                if !self.check(&Token::RBrace) {
                    loop {
                        concrete_types.push(self.parse_type()?);
                        if !self.match_token(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&Token::RBrace, "`}` closing the concrete-type set")?;
                generics.push(GenericParam { name, concrete_types });
                if !self.match_token(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RBracket, "`]` closing generic parameter list")?;
        Ok(generics)
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        self.expect(&Token::LParen, "`(` opening parameter list")?;
        let mut params = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                let pos = self.peek_pos();
                let mutable = self.match_token(&Token::Mut);
                let name = self.consume_ident("a parameter name")?;
                self.expect(&Token::Colon, "`:` after parameter name")?;
                let ty = self.parse_type()?;
                let default_value = if self.match_token(&Token::Eq) {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                params.push(Param { name, ty, mutable, default_value, pos });
                if !self.match_token(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RParen, "`)` closing parameter list")?;
        Ok(params)
    }

    fn parse_return_type(&mut self) -> Result<Type, ParseError> {
        if self.match_token(&Token::Arrow) {
            self.parse_type()
        } else {
            Ok(Type::Void)
        }
    }
}
