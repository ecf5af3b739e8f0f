//! Deterministic textual rendering of a checked AST.
//!
//! Mirrors the buffer-building style of [`crate::codegen`]: a small
//! struct wrapping a `String` and an indent depth, written to with
//! `std::fmt::Write`. Every `Binop` and `Ternary` is rendered fully
//! parenthesized -- there is no precedence table here, only the
//! parser's.

use crate::ast::{Expr, Instr, Program};
use std::fmt::Write as _;

const INDENT: &str = "    ";

pub fn print_program(program: &Program) -> String {
    let mut printer = Printer { out: String::new(), depth: 0 };
    printer.program(program);
    printer.out
}

struct Printer {
    out: String,
    depth: usize,
}

impl Printer {
    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn program(&mut self, program: &Program) {
        writeln!(self.out, "program {}", program.name).unwrap();
        for symbol in program.symbols.in_order() {
            writeln!(self.out, "{} {}", symbol.ty, symbol.name).unwrap();
        }
        self.out.push_str("begin\n");
        self.depth += 1;
        self.body(&program.body);
        self.depth -= 1;
        self.out.push_str("end\n");
    }

    fn body(&mut self, body: &[Instr]) {
        for instr in body {
            self.instr(instr);
        }
    }

    fn instr(&mut self, instr: &Instr) {
        match instr {
            Instr::Assign { target, value, .. } => {
                self.line(&format!("{} := {}", target, render_expr(value)));
            }
            Instr::Read { target, .. } => {
                self.line(&format!("read({})", target));
            }
            Instr::Write { value, .. } => {
                self.line(&format!("write({})", render_expr(value)));
            }
            Instr::If {
                cond,
                then_body,
                else_body,
                ..
            } => {
                self.line(&format!("if {} then", render_expr(cond)));
                self.depth += 1;
                self.body(then_body);
                self.depth -= 1;
                if !else_body.is_empty() {
                    self.line("else");
                    self.depth += 1;
                    self.body(else_body);
                    self.depth -= 1;
                }
                self.line("endif");
            }
            Instr::While { cond, body, .. } => {
                self.line(&format!("while {} do", render_expr(cond)));
                self.depth += 1;
                self.body(body);
                self.depth -= 1;
                self.line("done");
            }
            Instr::Repeat { count, body, .. } => {
                self.line(&format!("repeat {} do", render_expr(count)));
                self.depth += 1;
                self.body(body);
                self.depth -= 1;
                self.line("done");
            }
        }
    }
}

/// Renders an expression with every `Binop`/`Ternary` fully parenthesized,
/// regardless of what precedence would actually require.
fn render_expr(expr: &Expr) -> String {
    match expr {
        Expr::Number(n) => n.to_string(),
        Expr::Boolean(b) => b.to_string(),
        Expr::Id { name, .. } => name.clone(),
        Expr::Binop { op, left, right, .. } => {
            format!("({} {} {})", render_expr(left), op, render_expr(right))
        }
        Expr::Not { operand, .. } => format!("not ({})", render_expr(operand)),
        Expr::Ternary {
            cond,
            then_branch,
            else_branch,
            ..
        } => format!(
            "({} ? {} : {})",
            render_expr(cond),
            render_expr(then_branch),
            render_expr(else_branch)
        ),
    }
}
