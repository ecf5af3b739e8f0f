//! Static type checker: a post-order walk assigning each `Expr` its
//! `PrimitiveType` and validating every instruction's type rules.
//!
//! The first error encountered aborts checking — there is no recovery.

use crate::ast::{BinOp, Expr, Instr, Program};
use crate::error::CompileError;
use crate::symtab::SymbolTable;
use crate::types::PrimitiveType;

pub struct TypeChecker<'a> {
    symbols: &'a SymbolTable,
}

impl<'a> TypeChecker<'a> {
    pub fn new(symbols: &'a SymbolTable) -> Self {
        TypeChecker { symbols }
    }

    /// Type-checks every instruction in `body`, filling in `Write::ty`
    /// nodes as it goes.
    pub fn check_program(&self, program: &Program) -> Result<(), CompileError> {
        self.check_body(&program.body)
    }

    fn check_body(&self, body: &[Instr]) -> Result<(), CompileError> {
        for instr in body {
            self.check_instr(instr)?;
        }
        Ok(())
    }

    fn check_instr(&self, instr: &Instr) -> Result<(), CompileError> {
        match instr {
            Instr::Assign { line, target, value } => {
                let target_ty = self.lookup(target, *line)?;
                let value_ty = self.check_expr(value)?;
                if target_ty != value_ty {
                    return Err(mismatch(
                        *line,
                        format!(
                            "cannot assign {} to '{}' of type {}",
                            value_ty, target, target_ty
                        ),
                    ));
                }
                Ok(())
            }
            Instr::Read { line, target } => {
                self.lookup(target, *line)?;
                Ok(())
            }
            Instr::Write { value, ty, .. } => {
                let value_ty = self.check_expr(value)?;
                ty.set(Some(value_ty));
                Ok(())
            }
            Instr::If {
                line,
                cond,
                then_body,
                else_body,
            } => {
                self.expect_type(cond, PrimitiveType::Boolean, *line, "if condition")?;
                self.check_body(then_body)?;
                self.check_body(else_body)
            }
            Instr::While { line, cond, body } => {
                self.expect_type(cond, PrimitiveType::Boolean, *line, "while condition")?;
                self.check_body(body)
            }
            Instr::Repeat { line, count, body } => {
                self.expect_type(count, PrimitiveType::Natural, *line, "repeat count")?;
                self.check_body(body)
            }
        }
    }

    /// Post-order type computation for an expression.
    pub fn check_expr(&self, expr: &Expr) -> Result<PrimitiveType, CompileError> {
        match expr {
            Expr::Number(_) => Ok(PrimitiveType::Natural),
            Expr::Boolean(_) => Ok(PrimitiveType::Boolean),
            Expr::Id { line, name } => self.lookup(name, *line),
            Expr::Binop { line, op, left, right } => {
                let left_ty = self.check_expr(left)?;
                let right_ty = self.check_expr(right)?;
                self.check_binop(*line, *op, left_ty, right_ty)
            }
            Expr::Not { line, operand } => {
                self.expect_type(operand, PrimitiveType::Boolean, *line, "'not' operand")?;
                Ok(PrimitiveType::Boolean)
            }
            Expr::Ternary {
                line,
                cond,
                then_branch,
                else_branch,
            } => {
                self.expect_type(cond, PrimitiveType::Boolean, *line, "ternary condition")?;
                let then_ty = self.check_expr(then_branch)?;
                let else_ty = self.check_expr(else_branch)?;
                if then_ty != else_ty {
                    return Err(mismatch(
                        *line,
                        format!(
                            "ternary branches have different types: {} vs {}",
                            then_ty, else_ty
                        ),
                    ));
                }
                Ok(then_ty)
            }
        }
    }

    fn check_binop(
        &self,
        line: usize,
        op: BinOp,
        left: PrimitiveType,
        right: PrimitiveType,
    ) -> Result<PrimitiveType, CompileError> {
        if op.is_arithmetic() {
            self.require(left, PrimitiveType::Natural, line, op)?;
            self.require(right, PrimitiveType::Natural, line, op)?;
            Ok(PrimitiveType::Natural)
        } else if op.is_order() {
            self.require(left, PrimitiveType::Natural, line, op)?;
            self.require(right, PrimitiveType::Natural, line, op)?;
            Ok(PrimitiveType::Boolean)
        } else if op.is_logical() {
            self.require(left, PrimitiveType::Boolean, line, op)?;
            self.require(right, PrimitiveType::Boolean, line, op)?;
            Ok(PrimitiveType::Boolean)
        } else {
            // BinOp::Eq
            if left != right {
                return Err(mismatch(
                    line,
                    format!("cannot compare {} with {}", left, right),
                ));
            }
            Ok(PrimitiveType::Boolean)
        }
    }

    fn require(
        &self,
        actual: PrimitiveType,
        expected: PrimitiveType,
        line: usize,
        op: BinOp,
    ) -> Result<(), CompileError> {
        if actual != expected {
            Err(mismatch(
                line,
                format!("operator '{}' expects {}, found {}", op, expected, actual),
            ))
        } else {
            Ok(())
        }
    }

    fn expect_type(
        &self,
        expr: &Expr,
        expected: PrimitiveType,
        line: usize,
        what: &str,
    ) -> Result<(), CompileError> {
        let actual = self.check_expr(expr)?;
        if actual != expected {
            Err(mismatch(
                line,
                format!("{} must be {}, found {}", what, expected, actual),
            ))
        } else {
            Ok(())
        }
    }

    fn lookup(&self, name: &str, line: usize) -> Result<PrimitiveType, CompileError> {
        self.symbols
            .lookup(name)
            .map(|s| s.ty)
            .ok_or_else(|| CompileError::UndefinedVariable {
                line,
                name: name.to_string(),
            })
    }
}

fn mismatch(line: usize, message: String) -> CompileError {
    CompileError::TypeMismatch { line, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn check(src: &str) -> Result<(), CompileError> {
        let program = Parser::new(src).unwrap().parse().unwrap();
        TypeChecker::new(&program.symbols).check_program(&program)
    }

    #[test]
    fn well_typed_program_passes() {
        check("program p natural x begin x := 1 + 2 write(x) end").unwrap();
    }

    #[test]
    fn assigning_boolean_to_natural_fails() {
        let err = check("program p natural x begin x := true end").unwrap_err();
        assert!(matches!(err, CompileError::TypeMismatch { .. }));
    }

    #[test]
    fn undefined_variable_is_reported() {
        let err = check("program p natural x begin y := 1 end").unwrap_err();
        assert_eq!(
            err,
            CompileError::UndefinedVariable {
                line: 1,
                name: "y".to_string()
            }
        );
    }

    #[test]
    fn if_condition_must_be_boolean() {
        let err = check("program p natural x begin if x then write(1) endif end").unwrap_err();
        assert!(matches!(err, CompileError::TypeMismatch { .. }));
    }

    #[test]
    fn repeat_count_must_be_natural() {
        let err =
            check("program p boolean b begin repeat b do write(1) done end").unwrap_err();
        assert!(matches!(err, CompileError::TypeMismatch { .. }));
    }

    #[test]
    fn equality_requires_matching_types() {
        let err = check("program p natural x begin x := 1 = true end").unwrap_err();
        assert!(matches!(err, CompileError::TypeMismatch { .. }));
    }

    #[test]
    fn ternary_branches_must_match() {
        let err =
            check("program p natural x begin x := (true ? 1 : false) end").unwrap_err();
        assert!(matches!(err, CompileError::TypeMismatch { .. }));
    }

    #[test]
    fn write_records_its_expression_type() {
        let program = Parser::new("program p natural x begin write(x + 1) end")
            .unwrap()
            .parse()
            .unwrap();
        TypeChecker::new(&program.symbols)
            .check_program(&program)
            .unwrap();
        match &program.body[0] {
            Instr::Write { ty, .. } => assert_eq!(ty.get(), Some(PrimitiveType::Natural)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
