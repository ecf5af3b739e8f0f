//! Constant-propagation + algebraic rewriter.
//!
//! Walks the instruction list once, straight-line, maintaining a
//! per-name optimizability table. Every rewrite overwrites through a
//! `&mut Expr`/`&mut Instr` reference in place — there is no
//! identity-keyed search-and-replace helper, since every node is owned
//! exclusively by its parent (see ast.rs).
//!
//! `optimize_expr` is the single entry point every rule re-enters
//! through; whenever it returns `Known(v)` the node it was called on is
//! left holding the literal `v`, so a caller never has to re-fold a
//! child itself. Literal *shape* (boolean vs. natural) for a folded
//! `Id` comes from the symbol table, since the identifier carries no
//! type tag of its own.
//!
//! Loop bodies get a conservative pass before being walked: every name
//! the body (recursively) assigns is marked `Opaque` first, so a fact
//! folded before the loop cannot be reused unsoundly on a later
//! iteration. A `while` condition is re-evaluated every iteration, so
//! it is optimized *after* that invalidation; a `repeat` count is
//! evaluated once, up front, so it still sees pre-loop facts (see
//! DESIGN.md).

use crate::ast::{BinOp, Expr, Instr};
use crate::eval::{eval_binop, Value};
use crate::symtab::SymbolTable;
use crate::types::PrimitiveType;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OptState {
    Known(u32),
    Opaque,
}

type OptTable = HashMap<String, OptState>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OptResult {
    Known(u32),
    Opaque,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

pub struct Optimizer<'a> {
    symbols: &'a SymbolTable,
    table: OptTable,
}

impl<'a> Optimizer<'a> {
    pub fn new(symbols: &'a SymbolTable) -> Self {
        Optimizer {
            symbols,
            table: HashMap::new(),
        }
    }

    /// Optimizes `body` in place against `symbols`.
    pub fn optimize_program(symbols: &SymbolTable, body: &mut [Instr]) {
        let mut optimizer = Optimizer::new(symbols);
        optimizer.optimize_body(body);
    }

    fn optimize_body(&mut self, body: &mut [Instr]) {
        for instr in body.iter_mut() {
            self.optimize_instr(instr);
        }
    }

    fn optimize_instr(&mut self, instr: &mut Instr) {
        match instr {
            Instr::Assign { target, value, .. } => {
                match optimize_expr(value, &self.table, self.symbols) {
                    OptResult::Known(v) => {
                        self.table.insert(target.clone(), OptState::Known(v));
                    }
                    OptResult::Opaque => {
                        self.table.insert(target.clone(), OptState::Opaque);
                    }
                }
            }
            Instr::Read { target, .. } => {
                self.table.insert(target.clone(), OptState::Opaque);
            }
            Instr::Write { value, .. } => {
                optimize_expr(value, &self.table, self.symbols);
            }
            Instr::If {
                cond,
                then_body,
                else_body,
                ..
            } => {
                optimize_expr(cond, &self.table, self.symbols);
                self.optimize_body(then_body);
                self.optimize_body(else_body);
            }
            Instr::While { cond, body, .. } => {
                // The condition is re-checked on every iteration, so any
                // name the body reassigns must already be Opaque before
                // folding it -- otherwise a pre-loop fact would wrongly
                // survive every later check.
                self.invalidate_assigned(body);
                optimize_expr(cond, &self.table, self.symbols);
                self.optimize_body(body);
            }
            Instr::Repeat { count, body, .. } => {
                // The count is evaluated exactly once, before the body
                // runs, so it may still use pre-loop facts.
                optimize_expr(count, &self.table, self.symbols);
                self.invalidate_assigned(body);
                self.optimize_body(body);
            }
        }
    }

    /// Marks every name `body` (recursively) assigns as `Opaque`.
    fn invalidate_assigned(&mut self, body: &[Instr]) {
        let mut assigned = Vec::new();
        collect_assigned(body, &mut assigned);
        for name in assigned {
            self.table.insert(name, OptState::Opaque);
        }
    }
}

fn collect_assigned(body: &[Instr], out: &mut Vec<String>) {
    for instr in body {
        match instr {
            Instr::Assign { target, .. } | Instr::Read { target, .. } => {
                out.push(target.clone());
            }
            Instr::If {
                then_body,
                else_body,
                ..
            } => {
                collect_assigned(then_body, out);
                collect_assigned(else_body, out);
            }
            Instr::While { body, .. } | Instr::Repeat { body, .. } => {
                collect_assigned(body, out);
            }
            Instr::Write { .. } => {}
        }
    }
}

fn literal_for_type(ty: PrimitiveType, value: u32) -> Expr {
    match ty {
        PrimitiveType::Boolean => Expr::Boolean(value != 0),
        PrimitiveType::Natural => Expr::Number(value),
    }
}

fn binop_result_type(op: BinOp) -> PrimitiveType {
    if op.is_arithmetic() {
        PrimitiveType::Natural
    } else {
        PrimitiveType::Boolean
    }
}

fn is_literal(expr: &Expr) -> bool {
    matches!(expr, Expr::Number(_) | Expr::Boolean(_))
}

fn literal_value(expr: &Expr) -> Option<u32> {
    match expr {
        Expr::Number(n) => Some(*n),
        Expr::Boolean(b) => Some(*b as u32),
        _ => None,
    }
}

/// Optimizes `expr` in place. When this returns `Known(v)`, `expr` is
/// guaranteed to already hold the literal node for `v`.
fn optimize_expr(expr: &mut Expr, table: &OptTable, symbols: &SymbolTable) -> OptResult {
    match expr {
        Expr::Number(n) => OptResult::Known(*n),
        Expr::Boolean(b) => OptResult::Known(*b as u32),
        Expr::Id { name, .. } => {
            let known = match table.get(name.as_str()) {
                Some(OptState::Known(v)) => Some(*v),
                _ => None,
            };
            match known {
                Some(v) => {
                    let ty = symbols
                        .lookup(name.as_str())
                        .map(|s| s.ty)
                        .unwrap_or(PrimitiveType::Natural);
                    *expr = literal_for_type(ty, v);
                    OptResult::Known(v)
                }
                None => OptResult::Opaque,
            }
        }
        Expr::Not { operand, .. } => match optimize_expr(operand, table, symbols) {
            OptResult::Known(v) => {
                let folded = (v == 0) as u32;
                *expr = Expr::Boolean(folded != 0);
                OptResult::Known(folded)
            }
            OptResult::Opaque => OptResult::Opaque,
        },
        Expr::Ternary { .. } => optimize_ternary(expr, table, symbols),
        Expr::Binop { .. } => optimize_binop(expr, table, symbols),
    }
}

fn optimize_ternary(expr: &mut Expr, table: &OptTable, symbols: &SymbolTable) -> OptResult {
    let cond_result = match expr {
        Expr::Ternary { cond, .. } => optimize_expr(cond, table, symbols),
        _ => unreachable!("optimize_ternary called on a non-ternary expr"),
    };
    let c = match cond_result {
        OptResult::Known(c) => c,
        OptResult::Opaque => return OptResult::Opaque,
    };

    // The condition is known: recurse only into the taken branch. The
    // untaken branch is left untouched in the tree -- it is never
    // evaluated or optimized, so a division by zero or similar fault in
    // it is harmless.
    let taken_result = match expr {
        Expr::Ternary {
            then_branch,
            else_branch,
            ..
        } => {
            if c != 0 {
                optimize_expr(then_branch, table, symbols)
            } else {
                optimize_expr(else_branch, table, symbols)
            }
        }
        _ => unreachable!("optimize_ternary called on a non-ternary expr"),
    };

    match taken_result {
        OptResult::Known(v) => {
            let ty = match expr {
                Expr::Ternary {
                    then_branch,
                    else_branch,
                    ..
                } => {
                    let taken = if c != 0 {
                        then_branch.as_ref()
                    } else {
                        else_branch.as_ref()
                    };
                    match taken {
                        Expr::Boolean(_) => PrimitiveType::Boolean,
                        _ => PrimitiveType::Natural,
                    }
                }
                _ => unreachable!("optimize_ternary called on a non-ternary expr"),
            };
            *expr = literal_for_type(ty, v);
            OptResult::Known(v)
        }
        OptResult::Opaque => OptResult::Opaque,
    }
}

fn optimize_binop(expr: &mut Expr, table: &OptTable, symbols: &SymbolTable) -> OptResult {
    let (line, op, mut left, mut right) = match std::mem::replace(expr, Expr::Number(0)) {
        Expr::Binop {
            line,
            op,
            left,
            right,
        } => (line, op, left, right),
        _ => unreachable!("optimize_binop called on a non-binop expr"),
    };

    let left_result = optimize_expr(&mut left, table, symbols);
    let right_result = optimize_expr(&mut right, table, symbols);

    match (left_result, right_result) {
        (OptResult::Known(l), OptResult::Known(r)) => {
            // Division/modulus by a literal zero type-checks fine -- that
            // fault is the emitted `div` instruction's problem at runtime,
            // not the optimizer's. Decline to fold and leave the (already
            // child-optimized) literals in place for codegen to compile.
            match eval_binop(line, op, Value(l), Value(r)) {
                Ok(folded) => {
                    let ty = binop_result_type(op);
                    *expr = literal_for_type(ty, folded.0);
                    OptResult::Known(folded.0)
                }
                Err(_) => {
                    *expr = Expr::Binop {
                        line,
                        op,
                        left,
                        right,
                    };
                    OptResult::Opaque
                }
            }
        }
        (OptResult::Known(c), OptResult::Opaque) => {
            resolve_one_constant(expr, line, op, c, Side::Left, left, right, table, symbols)
        }
        (OptResult::Opaque, OptResult::Known(c)) => {
            resolve_one_constant(expr, line, op, c, Side::Right, left, right, table, symbols)
        }
        (OptResult::Opaque, OptResult::Opaque) => {
            resolve_both_opaque(expr, line, op, left, right, table, symbols)
        }
    }
}

enum Identity {
    /// The whole binop folds away to the non-constant operand, unchanged.
    PassThrough,
    /// The whole binop folds away to a fresh constant.
    Const(u32, PrimitiveType),
}

/// Exactly one operand folded to a known constant `c`; `constant_side`
/// says which. Tries an algebraic identity, then an associative-chain
/// hoist, before giving up and leaving a plain (but child-optimized)
/// binop in place.
#[allow(clippy::too_many_arguments)]
fn resolve_one_constant(
    expr: &mut Expr,
    line: usize,
    op: BinOp,
    c: u32,
    constant_side: Side,
    left: Box<Expr>,
    right: Box<Expr>,
    table: &OptTable,
    symbols: &SymbolTable,
) -> OptResult {
    let identity = match (op, constant_side, c) {
        (BinOp::Add, _, 0) => Some(Identity::PassThrough),
        (BinOp::Sub, Side::Right, 0) => Some(Identity::PassThrough),
        (BinOp::Mul, _, 1) => Some(Identity::PassThrough),
        (BinOp::Div, Side::Right, 1) => Some(Identity::PassThrough),
        (BinOp::And, _, 1) => Some(Identity::PassThrough),
        (BinOp::And, _, 0) => Some(Identity::Const(0, PrimitiveType::Boolean)),
        (BinOp::Or, _, 1) => Some(Identity::Const(1, PrimitiveType::Boolean)),
        (BinOp::Or, _, 0) => Some(Identity::PassThrough),
        _ => None,
    };

    if let Some(identity) = identity {
        return match identity {
            Identity::PassThrough => {
                let other = match constant_side {
                    Side::Left => right,
                    Side::Right => left,
                };
                *expr = *other;
                OptResult::Opaque
            }
            Identity::Const(v, ty) => {
                *expr = literal_for_type(ty, v);
                OptResult::Known(v)
            }
        };
    }

    let mut left = left;
    let mut right = right;
    if op.is_flippable() {
        let non_constant = match constant_side {
            Side::Left => &mut right,
            Side::Right => &mut left,
        };
        if let Some(rebuilt) = try_hoist_same_op(op, line, c, non_constant) {
            *expr = rebuilt;
            return optimize_expr(expr, table, symbols);
        }
    }

    *expr = Expr::Binop {
        line,
        op,
        left,
        right,
    };
    OptResult::Opaque
}

/// `slot` holds the side paired with the constant `c_outer` at the
/// outer level. If `slot` is itself a `Binop` of the same flippable
/// operator with exactly one literal grandchild, regroup so the two
/// constants sit together: `(a op K) op c_outer` becomes
/// `(c_outer op K) op a`.
fn try_hoist_same_op(op: BinOp, line: usize, c_outer: u32, slot: &mut Box<Expr>) -> Option<Expr> {
    let matches_shape = matches!(
        slot.as_ref(),
        Expr::Binop { op: inner_op, left, right, .. }
            if *inner_op == op && (is_literal(left) || is_literal(right))
    );
    if !matches_shape {
        return None;
    }
    match std::mem::replace(slot.as_mut(), Expr::Number(0)) {
        Expr::Binop {
            left: gl, right: gr, ..
        } => {
            let (inner_const, remaining) = if is_literal(&gl) {
                (literal_value(&gl).unwrap(), gr)
            } else {
                (literal_value(&gr).unwrap(), gl)
            };
            let combined = eval_binop(line, op, Value(c_outer), Value(inner_const))
                .expect("flippable ops (+, *, and, or) never fault");
            let ty = binop_result_type(op);
            Some(Expr::binop(
                line,
                op,
                literal_for_type(ty, combined.0),
                *remaining,
            ))
        }
        _ => unreachable!("shape already confirmed above"),
    }
}

/// Both operands are opaque. Tries self-cancellation for an identical
/// operand on both sides, then the same associative-chain hoist as
/// above but between two opaque siblings.
#[allow(clippy::too_many_arguments)]
fn resolve_both_opaque(
    expr: &mut Expr,
    line: usize,
    op: BinOp,
    mut left: Box<Expr>,
    mut right: Box<Expr>,
    table: &OptTable,
    symbols: &SymbolTable,
) -> OptResult {
    let same_id = match (left.as_ref(), right.as_ref()) {
        (Expr::Id { name: l, .. }, Expr::Id { name: r, .. }) => l == r,
        _ => false,
    };
    if same_id {
        match op {
            BinOp::Sub => {
                *expr = Expr::Number(0);
                return OptResult::Known(0);
            }
            BinOp::Div => {
                *expr = Expr::Number(1);
                return OptResult::Known(1);
            }
            BinOp::Mod => {
                *expr = Expr::Number(0);
                return OptResult::Known(0);
            }
            BinOp::And | BinOp::Or => {
                *expr = *left;
                return OptResult::Opaque;
            }
            _ => {}
        }
    }

    if op.is_flippable() {
        if let Some(rebuilt) = try_hoist_opaque_pair(op, line, &mut left, &mut right) {
            *expr = rebuilt;
            return optimize_expr(expr, table, symbols);
        }
    }

    *expr = Expr::Binop {
        line,
        op,
        left,
        right,
    };
    OptResult::Opaque
}

/// If `left` is itself a `Binop` of the same flippable operator with
/// exactly one literal grandchild, regroup so the two opaque operands
/// combine first -- `(a op K) op b` becomes `(a op b) op K` -- which may
/// then self-cancel on a later pass.
fn try_hoist_opaque_pair(
    op: BinOp,
    line: usize,
    left: &mut Box<Expr>,
    right: &mut Box<Expr>,
) -> Option<Expr> {
    let matches_shape = matches!(
        left.as_ref(),
        Expr::Binop { op: inner_op, left: gl, right: gr, .. }
            if *inner_op == op && (is_literal(gl) || is_literal(gr))
    );
    if !matches_shape {
        return None;
    }
    let owned_left = std::mem::replace(left.as_mut(), Expr::Number(0));
    let owned_right = std::mem::replace(right.as_mut(), Expr::Number(0));
    match owned_left {
        Expr::Binop {
            left: gl, right: gr, ..
        } => {
            let (constant, a) = if is_literal(&gl) {
                (literal_value(&gl).unwrap(), gr)
            } else {
                (literal_value(&gr).unwrap(), gl)
            };
            let inner = Expr::binop(line, op, *a, owned_right);
            let ty = binop_result_type(op);
            Some(Expr::binop(line, op, inner, literal_for_type(ty, constant)))
        }
        _ => unreachable!("shape already confirmed above"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::typechecker::TypeChecker;

    fn optimize(src: &str) -> Vec<Instr> {
        let mut program = Parser::new(src).unwrap().parse().unwrap();
        TypeChecker::new(&program.symbols)
            .check_program(&program)
            .unwrap();
        Optimizer::optimize_program(&program.symbols, &mut program.body);
        program.body
    }

    #[test]
    fn folds_a_chain_of_additions() {
        let body = optimize("program p natural x begin x := 1 + 2 + 3 write(x) end");
        match &body[0] {
            Instr::Assign { value, .. } => assert_eq!(*value, Expr::Number(6)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn self_subtraction_folds_to_zero() {
        let body =
            optimize("program p natural x natural y begin read(x) y := x - x write(y) end");
        match &body[1] {
            Instr::Assign { value, .. } => assert_eq!(*value, Expr::Number(0)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn identity_rewrites_to_bare_variable() {
        let body = optimize("program p natural x begin read(x) x := x * 1 + 0 write(x) end");
        match &body[1] {
            Instr::Assign { value, .. } => {
                assert_eq!(
                    *value,
                    Expr::Id {
                        line: 1,
                        name: "x".to_string()
                    }
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn ternary_folds_condition_and_prunes_taken_branch_only() {
        let body = optimize("program p natural x begin x := (true ? 7 : 1/0) write(x) end");
        match &body[0] {
            Instr::Assign { value, .. } => assert_eq!(*value, Expr::Number(7)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn or_with_true_operand_is_absorbing() {
        let body =
            optimize("program p boolean b begin read(b) if (b or true) then write(1) endif end");
        match &body[1] {
            Instr::If { cond, .. } => assert_eq!(*cond, Expr::Boolean(true)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn loop_body_assignment_invalidates_prior_known_fact() {
        // n starts known (10), but the while body reassigns n, so the
        // loop condition must remain opaque rather than folding on the
        // pre-loop value.
        let body =
            optimize("program p natural n begin n := 10 while n > 0 do n := n - 1 done end");
        match &body[1] {
            Instr::While { cond, .. } => {
                assert!(matches!(cond, Expr::Binop { op: BinOp::Gt, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn idempotent_on_already_optimized_ast() {
        let mut program = Parser::new("program p natural x begin x := 1 + 2 + 3 write(x) end")
            .unwrap()
            .parse()
            .unwrap();
        TypeChecker::new(&program.symbols)
            .check_program(&program)
            .unwrap();
        Optimizer::optimize_program(&program.symbols, &mut program.body);
        let once = program.body.clone();
        Optimizer::optimize_program(&program.symbols, &mut program.body);
        assert_eq!(once, program.body);
    }

    #[test]
    fn repeat_count_constant_is_preserved_for_codegen() {
        let body = optimize("program p natural n begin n := 10 repeat n do write(n) done end");
        match &body[1] {
            Instr::Repeat { count, .. } => assert_eq!(*count, Expr::Number(10)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn constant_division_by_zero_declines_to_fold_instead_of_panicking() {
        let body = optimize("program p natural x begin x := 1 / 0 end");
        match &body[0] {
            Instr::Assign { value, .. } => {
                assert!(matches!(value, Expr::Binop { op: BinOp::Div, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn constant_modulus_by_zero_declines_to_fold_instead_of_panicking() {
        let body = optimize("program p natural x begin x := 1 % 0 end");
        match &body[0] {
            Instr::Assign { value, .. } => {
                assert!(matches!(value, Expr::Binop { op: BinOp::Mod, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn x_times_zero_is_not_an_identity_rewrite() {
        // Not in the spec's identity table: only x*1/1*x is. Must stay a
        // plain (child-optimized) binop, not fold to a literal 0.
        let body = optimize("program p natural x begin read(x) x := x * 0 end");
        match &body[1] {
            Instr::Assign { value, .. } => {
                assert!(matches!(value, Expr::Binop { op: BinOp::Mul, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
