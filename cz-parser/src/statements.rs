//! Statement grammar, including block parsing and the `#run` block, whose
//! shell command runs synchronously at parse time (see `Parser::allow_run`).

use crate::{ParseError, Parser};
use cz_ast::{Block, CompoundOp, Stmt};
use cz_lexer::Token;

impl<'a> Parser<'a> {
    pub(crate) fn parse_block(&mut self) -> Result<Block, ParseError> {
        let pos = self.peek_pos();
        let id = self.next_id();
        self.expect(&Token::LBrace, "`{` opening a block")?;
        let mut statements = Vec::new();
        while !self.check(&Token::RBrace) {
            statements.push(self.parse_statement()?);
        }
        self.expect(&Token::RBrace, "`}` closing a block")?;
        Ok(Block { id, statements, pos })
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        match self.peek().clone() {
            Token::Mut => self.parse_var_decl(true),
            Token::Ident(name) if self.is_var_decl_start(&name) => self.parse_var_decl(false),
            Token::If => self.parse_if(),
            Token::While => self.parse_while(),
            Token::For => self.parse_for_in(),
            Token::Repeat => self.parse_repeat(),
            Token::Break => self.parse_break(),
            Token::Continue => self.parse_continue(),
            Token::Return => self.parse_return(),
            Token::Free => self.parse_free(),
            Token::Assert => self.parse_assert(),
            Token::Log => self.parse_log(),
            Token::Todo => self.parse_todo(),
            Token::Fixme => self.parse_fixme(),
            Token::HashRun => self.parse_run(),
            Token::HashUnsafe => self.parse_unsafe_block(),
            _ => self.parse_expr_or_assign_statement(),
        }
    }

    /// `name : Type` or `name : Type =` at statement start is a var decl;
    /// anything else beginning with an identifier is an expression or
    /// assignment statement. Looks ahead without consuming.
    fn is_var_decl_start(&self, _name: &str) -> bool {
        matches!(self.peek_at(1), Some(Token::Colon))
    }

    fn parse_var_decl(&mut self, leading_mut: bool) -> Result<Stmt, ParseError> {
        let pos = self.peek_pos();
        let id = self.next_id();
        let mutable = if leading_mut {
            self.advance();
            true
        } else {
            false
        };
        let name = self.consume_ident("a variable name")?;
        self.expect(&Token::Colon, "`:` after variable name")?;
        let ty = self.parse_type()?;
        let init = if self.match_token(&Token::Eq) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.consume_terminator();
        Ok(Stmt::VarDecl { id, name, ty, mutable, init, pos })
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.peek_pos();
        let id = self.next_id();
        self.advance(); // if
        let cond = self.parse_expression()?;
        let then_block = self.parse_block()?;
        let mut elseif_arms = Vec::new();
        while self.match_token(&Token::Elif) {
            let arm_cond = self.parse_expression()?;
            let arm_block = self.parse_block()?;
            elseif_arms.push((arm_cond, arm_block));
        }
        let else_block = if self.match_token(&Token::Else) {
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(Stmt::If { id, cond, then_block, elseif_arms, else_block, pos })
    }

    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.peek_pos();
        let id = self.next_id();
        self.advance(); // while
        let cond = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(Stmt::While { id, cond, body, pos })
    }

    /// `for item in collection { }` or `for index, item in collection { }`.
    fn parse_for_in(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.peek_pos();
        let id = self.next_id();
        self.advance(); // for
        let mutable = self.match_token(&Token::Mut);
        let first = self.consume_ident("a loop variable name")?;
        let (index, item) = if self.match_token(&Token::Comma) {
            let second = self.consume_ident("a loop item name")?;
            (Some(first), second)
        } else {
            (None, first)
        };
        self.expect(&Token::In, "`in` after loop variable(s)")?;
        let collection = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(Stmt::ForIn { id, index, item, mutable, collection, body, pos })
    }

    fn parse_repeat(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.peek_pos();
        let id = self.next_id();
        self.advance(); // repeat
        let count = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(Stmt::RepeatN { id, count, body, pos })
    }

    fn parse_loop_level(&mut self) -> u32 {
        if let Token::IntLiteral(s) = self.peek().clone() {
            self.advance();
            s.trim_end_matches(|c: char| c.is_alphabetic()).parse().unwrap_or(1)
        } else {
            1
        }
    }

    fn parse_break(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.peek_pos();
        let id = self.next_id();
        self.advance(); // break
        let level = self.parse_loop_level();
        self.consume_terminator();
        Ok(Stmt::Break { id, level, pos })
    }

    fn parse_continue(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.peek_pos();
        let id = self.next_id();
        self.advance(); // continue
        let level = self.parse_loop_level();
        self.consume_terminator();
        Ok(Stmt::Continue { id, level, pos })
    }

    fn parse_return(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.peek_pos();
        let id = self.next_id();
        self.advance(); // return
        let value = if self.at_statement_end() {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume_terminator();
        Ok(Stmt::Return { id, value, pos })
    }

    fn parse_free(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.peek_pos();
        let id = self.next_id();
        self.advance(); // free
        let target = self.parse_expression()?;
        self.consume_terminator();
        Ok(Stmt::Free { id, target, pos })
    }

    fn parse_assert(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.peek_pos();
        let id = self.next_id();
        self.advance(); // assert
        let cond = self.parse_expression()?;
        let message = if self.match_token(&Token::Comma) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.consume_terminator();
        Ok(Stmt::Assert { id, cond, message, pos })
    }

    fn parse_log(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.peek_pos();
        let id = self.next_id();
        self.advance(); // log
        let args = self.parse_call_args()?;
        self.consume_terminator();
        Ok(Stmt::Log { id, args, pos })
    }

    fn parse_todo(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.peek_pos();
        let id = self.next_id();
        self.advance(); // todo
        let message = self.parse_optional_message()?;
        self.consume_terminator();
        Ok(Stmt::Todo { id, message, pos })
    }

    fn parse_fixme(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.peek_pos();
        let id = self.next_id();
        self.advance(); // fixme
        let message = self.parse_optional_message()?;
        self.consume_terminator();
        Ok(Stmt::Fixme { id, message, pos })
    }

    fn parse_optional_message(&mut self) -> Result<Option<String>, ParseError> {
        if self.match_token(&Token::LParen) {
            let msg = if let Token::StringLiteral(s) = self.peek().clone() {
                self.advance();
                Some(s)
            } else {
                None
            };
            self.expect(&Token::RParen, "`)` closing message")?;
            Ok(msg)
        } else {
            Ok(None)
        }
    }

    /// `#run { shell commands }`. Executed synchronously, cwd set to the
    /// source file's directory. Denied execution is an explicit error, never
    /// a silent skip.
    fn parse_run(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.peek_pos();
        let id = self.next_id();
        self.advance(); // #run
        self.expect(&Token::LBrace, "`{` opening `#run` block")?;
        let commands = self.consume_raw_brace_balanced_text();
        self.expect(&Token::RBrace, "`}` closing `#run` block")?;

        if !self.allow_run {
            return Err(ParseError::RunFailed {
                file: self.file.clone(),
                line: pos.line,
                message: "#run blocks are denied in this context".to_string(),
            });
        }

        let output = std::process::Command::new("sh")
            .arg("-c")
            .arg(&commands)
            .current_dir(&self.run_cwd)
            .output()
            .map_err(|e| ParseError::RunFailed {
                file: self.file.clone(),
                line: pos.line,
                message: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(ParseError::RunFailed {
                file: self.file.clone(),
                line: pos.line,
                message: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(Stmt::Run { id, commands, pos })
    }

    fn parse_unsafe_block(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.peek_pos();
        let id = self.next_id();
        self.advance(); // #unsafe
        self.expect(&Token::LBrace, "`{` opening `#unsafe` block")?;
        let raw_c = self.consume_raw_brace_balanced_text();
        self.expect(&Token::RBrace, "`}` closing `#unsafe` block")?;
        Ok(Stmt::UnsafeBlock { id, raw_c, pos })
    }

    /// Bare expression, `_ = expr` discard, assignment, or compound
    /// assignment — distinguished after parsing the left operand.
    fn parse_expr_or_assign_statement(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.peek_pos();
        let id = self.next_id();
        if self.check(&Token::Underscore) && matches!(self.peek_at(1), Some(Token::Eq)) {
            self.advance(); // _
            self.advance(); // =
            let value = self.parse_expression()?;
            self.consume_terminator();
            return Ok(Stmt::Discard { id, value, pos });
        }

        let expr = self.parse_expression()?;
        let stmt = if self.match_token(&Token::Eq) {
            let value = self.parse_expression()?;
            Stmt::Assign { id, target: expr, value, pos }
        } else if let Some(op) = self.match_compound_op() {
            let value = self.parse_expression()?;
            Stmt::CompoundAssign { id, target: expr, op, value, pos }
        } else {
            Stmt::Expr { id, expr, pos }
        };
        self.consume_terminator();
        Ok(stmt)
    }

    fn match_compound_op(&mut self) -> Option<CompoundOp> {
        let op = if self.check(&Token::PlusEq) {
            CompoundOp::Add
        } else if self.check(&Token::MinusEq) {
            CompoundOp::Sub
        } else if self.check(&Token::StarEq) {
            CompoundOp::Mul
        } else if self.check(&Token::SlashEq) {
            CompoundOp::Div
        } else if self.check(&Token::PercentEq) {
            CompoundOp::Mod
        } else {
            return None;
        };
        self.advance();
        Some(op)
    }

    fn at_statement_end(&self) -> bool {
        self.is_at_end() || self.check(&Token::RBrace) || self.check(&Token::Semicolon)
    }

    /// Statements may be separated by an optional `;`; a trailing one is
    /// consumed if present but never required (newlines already terminate
    /// most statements in practice).
    fn consume_terminator(&mut self) {
        self.match_token(&Token::Semicolon);
    }
}
