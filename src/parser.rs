//! Recursive-descent parser for Imp.
//!
//! Builds the `SymbolTable` as it consumes `decl` productions and
//! constructs `Program` directly — there is no separate "resolve" pass;
//! Imp is single-file and single-pass.
//!
//! Precedence (low to high), all left-associative except unary `not`:
//! `or` < `and` < `=` < relational < `+`/`-` < `*`/`/`/`%` < `not`.

use crate::ast::{BinOp, Expr, Instr, Program};
use crate::error::CompileError;
use crate::lexer::{tokenize, Token, TokenKind};
use crate::symtab::{LabelGen, SymbolTable};
use crate::types::PrimitiveType;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    symbols: SymbolTable,
    labels: LabelGen,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self, CompileError> {
        let tokens = tokenize(source)?;
        Ok(Parser {
            tokens,
            pos: 0,
            symbols: SymbolTable::new(),
            labels: LabelGen::new(),
        })
    }

    pub fn parse(mut self) -> Result<Program, CompileError> {
        self.expect(&TokenKind::Program)?;
        let name = self.expect_ident()?;

        while self.at_decl_start() {
            self.parse_decl()?;
        }

        self.expect(&TokenKind::Begin)?;
        let body = self.parse_cmd_list(&[TokenKind::End])?;
        self.expect(&TokenKind::End)?;
        self.expect(&TokenKind::Eof)?;

        Ok(Program::new(name, self.symbols, body, self.labels))
    }

    // --- declarations ---

    fn at_decl_start(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Boolean | TokenKind::Natural
        )
    }

    fn parse_decl(&mut self) -> Result<(), CompileError> {
        let line = self.peek().line;
        let ty = match self.peek().kind {
            TokenKind::Boolean => PrimitiveType::Boolean,
            TokenKind::Natural => PrimitiveType::Natural,
            _ => {
                return Err(self.syntax_error("expected 'boolean' or 'natural'"));
            }
        };
        self.advance();
        let name = self.expect_ident()?;
        self.symbols.declare(&name, ty, line, &mut self.labels)?;
        Ok(())
    }

    // --- commands ---

    fn parse_cmd_list(&mut self, terminators: &[TokenKind]) -> Result<Vec<Instr>, CompileError> {
        let mut body = Vec::new();
        while !terminators.iter().any(|t| &self.peek().kind == t) {
            body.push(self.parse_cmd()?);
        }
        Ok(body)
    }

    fn parse_cmd(&mut self) -> Result<Instr, CompileError> {
        let line = self.peek().line;
        match &self.peek().kind {
            TokenKind::Read => {
                self.advance();
                self.expect(&TokenKind::LParen)?;
                let target = self.expect_ident()?;
                self.expect(&TokenKind::RParen)?;
                Ok(Instr::Read { line, target })
            }
            TokenKind::Write => {
                self.advance();
                self.expect(&TokenKind::LParen)?;
                let value = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(Instr::write(line, value))
            }
            TokenKind::If => {
                self.advance();
                let cond = self.parse_expr()?;
                self.expect(&TokenKind::Then)?;
                let then_body =
                    self.parse_cmd_list(&[TokenKind::Else, TokenKind::Endif])?;
                let else_body = if self.peek().kind == TokenKind::Else {
                    self.advance();
                    self.parse_cmd_list(&[TokenKind::Endif])?
                } else {
                    Vec::new()
                };
                self.expect(&TokenKind::Endif)?;
                Ok(Instr::If {
                    line,
                    cond,
                    then_body,
                    else_body,
                })
            }
            TokenKind::While => {
                self.advance();
                let cond = self.parse_expr()?;
                self.expect(&TokenKind::Do)?;
                let body = self.parse_cmd_list(&[TokenKind::Done])?;
                self.expect(&TokenKind::Done)?;
                Ok(Instr::While { line, cond, body })
            }
            TokenKind::Repeat => {
                self.advance();
                let count = self.parse_expr()?;
                self.expect(&TokenKind::Do)?;
                let body = self.parse_cmd_list(&[TokenKind::Done])?;
                self.expect(&TokenKind::Done)?;
                Ok(Instr::Repeat { line, count, body })
            }
            TokenKind::Ident(_) => {
                let target = self.expect_ident()?;
                self.expect(&TokenKind::Assign)?;
                let value = self.parse_expr()?;
                Ok(Instr::Assign {
                    line,
                    target,
                    value,
                })
            }
            _ => Err(self.syntax_error("expected a command")),
        }
    }

    // --- expressions, by precedence climbing ---

    fn parse_expr(&mut self) -> Result<Expr, CompileError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_and()?;
        while self.peek().kind == TokenKind::Or {
            let line = self.peek().line;
            self.advance();
            let right = self.parse_and()?;
            left = Expr::binop(line, BinOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_equality()?;
        while self.peek().kind == TokenKind::And {
            let line = self.peek().line;
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::binop(line, BinOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_relational()?;
        while self.peek().kind == TokenKind::Eq {
            let line = self.peek().line;
            self.advance();
            let right = self.parse_relational()?;
            left = Expr::binop(line, BinOp::Eq, left, right);
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Ge => BinOp::Ge,
                _ => break,
            };
            let line = self.peek().line;
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::binop(line, op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let line = self.peek().line;
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::binop(line, op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            let line = self.peek().line;
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::binop(line, op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        if self.peek().kind == TokenKind::Not {
            let line = self.peek().line;
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::not(line, operand));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let line = self.peek().line;
        match self.peek().kind.clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Boolean(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Boolean(false))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr::Id { line, name })
            }
            TokenKind::LParen => {
                self.advance();
                // Either a parenthesized expression or a ternary
                // `( cond ? then : else )`.
                let first = self.parse_expr()?;
                if self.peek().kind == TokenKind::Question {
                    self.advance();
                    let then_branch = self.parse_expr()?;
                    self.expect(&TokenKind::Colon)?;
                    let else_branch = self.parse_expr()?;
                    self.expect(&TokenKind::RParen)?;
                    Ok(Expr::ternary(line, first, then_branch, else_branch))
                } else {
                    self.expect(&TokenKind::RParen)?;
                    Ok(first)
                }
            }
            _ => Err(self.syntax_error("expected an expression")),
        }
    }

    // --- token stream plumbing ---

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> &Token {
        let tok = &self.tokens[self.pos];
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), CompileError> {
        if &self.peek().kind == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.syntax_error(&format!("expected {:?}", kind)))
        }
    }

    fn expect_ident(&mut self) -> Result<String, CompileError> {
        match self.peek().kind.clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.syntax_error("expected an identifier")),
        }
    }

    fn syntax_error(&self, message: &str) -> CompileError {
        CompileError::Syntax {
            line: self.peek().line,
            message: format!("{} (found {:?})", message, self.peek().kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Program {
        Parser::new(src).unwrap().parse().unwrap()
    }

    #[test]
    fn parses_minimal_program() {
        let program = parse("program p natural x begin x := 1 write(x) end");
        assert_eq!(program.name, "p");
        assert_eq!(program.body.len(), 2);
        assert_eq!(program.symbols.len(), 1);
    }

    #[test]
    fn operator_precedence_groups_multiplicative_tighter_than_additive() {
        let program = parse("program p natural x begin x := 1 + 2 * 3 end");
        match &program.body[0] {
            Instr::Assign { value, .. } => match value {
                Expr::Binop { op: BinOp::Add, right, .. } => {
                    assert!(matches!(**right, Expr::Binop { op: BinOp::Mul, .. }));
                }
                other => panic!("expected top-level +, got {:?}", other),
            },
            other => panic!("expected assign, got {:?}", other),
        }
    }

    #[test]
    fn relational_binds_tighter_than_equality_and_logic() {
        let program = parse("program p boolean b begin b := 1 < 2 = true end");
        match &program.body[0] {
            Instr::Assign { value, .. } => {
                assert!(matches!(value, Expr::Binop { op: BinOp::Eq, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn ternary_expression_parses() {
        let program = parse("program p natural x begin x := (true ? 1 : 2) end");
        match &program.body[0] {
            Instr::Assign { value, .. } => {
                assert!(matches!(value, Expr::Ternary { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn redeclaration_is_rejected() {
        let err = Parser::new("program p natural x natural x begin end")
            .unwrap()
            .parse()
            .unwrap_err();
        assert!(matches!(err, CompileError::Redeclaration { .. }));
    }

    #[test]
    fn while_and_repeat_and_if_parse() {
        let program = parse(
            "program p natural x \
             begin \
             while x < 10 do x := x + 1 done \
             repeat x do x := x - 1 done \
             if x = 0 then write(1) else write(0) endif \
             end",
        );
        assert_eq!(program.body.len(), 3);
        assert!(matches!(program.body[0], Instr::While { .. }));
        assert!(matches!(program.body[1], Instr::Repeat { .. }));
        assert!(matches!(program.body[2], Instr::If { .. }));
    }

    #[test]
    fn not_is_right_associative_unary() {
        let program = parse("program p boolean b begin b := not not true end");
        match &program.body[0] {
            Instr::Assign { value, .. } => match value {
                Expr::Not { operand, .. } => {
                    assert!(matches!(**operand, Expr::Not { .. }));
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }
}
