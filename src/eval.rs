//! In-process interpreter.
//!
//! Mirrors the operational semantics used both for direct program
//! execution and for the constant values the optimizer folds. Runs over
//! an already type-checked `Program`.

use crate::ast::{BinOp, Expr, Instr};
use crate::error::EvalError;
use crate::symtab::SymbolTable;
use crate::types::PrimitiveType;
use std::collections::HashMap;
use std::io::BufRead;

/// A runtime value: booleans are stored as 0/1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Value(pub u32);

impl Value {
    pub fn as_bool(self) -> bool {
        self.0 != 0
    }
}

/// A single `write` observation, paired with the primitive type the type
/// checker recorded for it, so a caller can render a boolean as
/// `true`/`false` rather than its underlying `0`/`1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Written {
    pub ty: PrimitiveType,
    pub value: Value,
}

impl std::fmt::Display for Written {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.ty {
            PrimitiveType::Natural => write!(f, "{}", self.value.0),
            PrimitiveType::Boolean => write!(f, "{}", self.value.as_bool()),
        }
    }
}

/// Interprets a program against a pluggable `read`-like input source, so
/// tests can run headlessly against fixed input strings. The emitted
/// assembly's actual terminal I/O is an external collaborator, out of
/// scope here.
pub struct Evaluator<'a, R: BufRead> {
    symbols: &'a SymbolTable,
    vars: HashMap<String, Value>,
    input: &'a mut R,
    /// Side channel of every value passed to `write`, consumed by the
    /// optimizer-preserves-semantics tests.
    pub written: Vec<Written>,
}

impl<'a, R: BufRead> Evaluator<'a, R> {
    pub fn new(symbols: &'a SymbolTable, input: &'a mut R) -> Self {
        Evaluator {
            symbols,
            vars: HashMap::new(),
            input,
            written: Vec::new(),
        }
    }

    pub fn run(&mut self, body: &[Instr]) -> Result<(), EvalError> {
        for instr in body {
            self.run_instr(instr)?;
        }
        Ok(())
    }

    fn run_instr(&mut self, instr: &Instr) -> Result<(), EvalError> {
        match instr {
            Instr::Assign { target, value, .. } => {
                let v = self.eval(value)?;
                self.vars.insert(target.clone(), v);
                Ok(())
            }
            Instr::Read { target, .. } => {
                let ty = self
                    .symbols
                    .lookup(target)
                    .map(|s| s.ty)
                    .ok_or_else(|| EvalError::UndefinedVariable {
                        name: target.clone(),
                    })?;
                let mut raw = String::new();
                self.input.read_line(&mut raw).unwrap_or(0);
                let trimmed = raw.trim();
                let value = match ty {
                    PrimitiveType::Natural => Value(trimmed.parse::<u32>().unwrap_or(0)),
                    PrimitiveType::Boolean => Value((trimmed == "true") as u32),
                };
                self.vars.insert(target.clone(), value);
                Ok(())
            }
            Instr::Write { value, ty, .. } => {
                let v = self.eval(value)?;
                let ty = ty.get().expect("write type filled in by the type checker");
                self.written.push(Written { ty, value: v });
                Ok(())
            }
            Instr::If {
                cond,
                then_body,
                else_body,
                ..
            } => {
                if self.eval(cond)?.as_bool() {
                    self.run(then_body)
                } else {
                    self.run(else_body)
                }
            }
            Instr::While { cond, body, .. } => {
                while self.eval(cond)?.as_bool() {
                    self.run(body)?;
                }
                Ok(())
            }
            Instr::Repeat { count, body, .. } => {
                let n = self.eval(count)?.0;
                for _ in 0..n {
                    self.run(body)?;
                }
                Ok(())
            }
        }
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Number(n) => Ok(Value(*n)),
            Expr::Boolean(b) => Ok(Value(*b as u32)),
            Expr::Id { name, .. } => Ok(*self.vars.get(name).unwrap_or(&Value(0))),
            Expr::Not { operand, .. } => {
                let v = self.eval(operand)?;
                Ok(Value((!v.as_bool()) as u32))
            }
            Expr::Ternary {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                if self.eval(cond)?.as_bool() {
                    self.eval(then_branch)
                } else {
                    self.eval(else_branch)
                }
            }
            Expr::Binop { line, op, left, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                eval_binop(*line, *op, l, r)
            }
        }
    }
}

/// Evaluates a binary operator over two already-computed values, per the
/// semantics every stage (evaluator, optimizer, codegen) agrees on.
pub fn eval_binop(line: usize, op: BinOp, l: Value, r: Value) -> Result<Value, EvalError> {
    let (a, b) = (l.0, r.0);
    Ok(match op {
        BinOp::Add => Value(a.wrapping_add(b)),
        BinOp::Sub => Value(a.wrapping_sub(b)),
        BinOp::Mul => Value(a.wrapping_mul(b)),
        BinOp::Div => {
            if b == 0 {
                return Err(EvalError::DivisionByZero { line });
            }
            Value(a / b)
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(EvalError::DivisionByZero { line });
            }
            Value(a % b)
        }
        BinOp::Lt => Value((a < b) as u32),
        BinOp::Gt => Value((a > b) as u32),
        BinOp::Le => Value((a <= b) as u32),
        BinOp::Ge => Value((a >= b) as u32),
        BinOp::And => Value((l.as_bool() && r.as_bool()) as u32),
        BinOp::Or => Value((l.as_bool() || r.as_bool()) as u32),
        BinOp::Eq => Value((a == b) as u32),
    })
}
