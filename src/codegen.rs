//! NASM (32-bit, Intel syntax) code generator.
//!
//! Emits a flat `.bss`/`.text` text buffer: one `resb` slot per declared
//! symbol in declaration order, then the translated instruction stream.
//! Runs after type checking (and, usually, optimization), so every
//! lookup and every `Write::ty` here is an established invariant rather
//! than something that can still fail.
//!
//! Every binary operator's body runs with the left operand already in
//! `eax`/`al` and the right operand in `ecx`/`cl`: compile left,
//! `push eax`, compile right, `mov ecx,eax`, `pop eax`. Moving the
//! right operand into `ecx` *before* popping the left one back into
//! `eax` is what keeps both operands alive for the operator body (see
//! DESIGN.md for the popping-order bug this avoids).

use crate::ast::{BinOp, Expr, Instr, Program};
use crate::symtab::LabelGen;
use crate::types::PrimitiveType;
use std::fmt::Write as _;

const EXTERNS: [&str; 4] = [
    "read_natural",
    "write_natural",
    "read_boolean",
    "write_boolean",
];

pub struct CodeGen<'a> {
    symbols: &'a crate::symtab::SymbolTable,
    labels: &'a mut LabelGen,
    out: String,
}

/// Emits NASM source for `program`, consuming further labels from its
/// (already-advanced-by-parsing) label counter.
pub fn generate(program: &mut Program) -> String {
    let mut codegen = CodeGen {
        symbols: &program.symbols,
        labels: &mut program.labels,
        out: String::new(),
    };
    codegen.emit(&program.body);
    codegen.out
}

impl<'a> CodeGen<'a> {
    fn emit(&mut self, body: &[Instr]) {
        self.preamble();
        self.bss_section();
        writeln!(self.out, "section .text").unwrap();
        writeln!(self.out, "main:").unwrap();
        self.emit_body(body);
        writeln!(self.out, "    xor eax,eax").unwrap();
        writeln!(self.out, "    ret").unwrap();
    }

    fn preamble(&mut self) {
        writeln!(self.out, "global main").unwrap();
        for routine in EXTERNS {
            writeln!(self.out, "extern {}", routine).unwrap();
        }
        writeln!(self.out).unwrap();
    }

    fn bss_section(&mut self) {
        writeln!(self.out, "section .bss").unwrap();
        for symbol in self.symbols.in_order() {
            writeln!(
                self.out,
                "{}: resb {}  ; variable: {}",
                symbol.label,
                symbol.ty.size_bytes(),
                symbol.name
            )
            .unwrap();
        }
        writeln!(self.out).unwrap();
    }

    fn emit_body(&mut self, body: &[Instr]) {
        for instr in body {
            self.emit_instr(instr);
        }
    }

    fn emit_instr(&mut self, instr: &Instr) {
        match instr {
            Instr::Assign { target, value, .. } => {
                self.emit_expr(value);
                let symbol = self
                    .symbols
                    .lookup(target)
                    .expect("assign target declared; checked by the type checker");
                writeln!(self.out, "    mov [{}], {}", symbol.label, reg_for(symbol.ty)).unwrap();
            }
            Instr::Read { target, .. } => {
                let symbol = self
                    .symbols
                    .lookup(target)
                    .expect("read target declared; checked by the type checker");
                writeln!(self.out, "    call read_{}", suffix_for(symbol.ty)).unwrap();
                writeln!(self.out, "    mov [{}], {}", symbol.label, reg_for(symbol.ty)).unwrap();
            }
            Instr::Write { value, ty, .. } => {
                self.emit_expr(value);
                let ty = ty.get().expect("write type filled in by the type checker");
                if ty == PrimitiveType::Boolean {
                    // Zero-extend before pushing a full dword argument;
                    // only al is guaranteed meaningful up to this point.
                    writeln!(self.out, "    and eax,1").unwrap();
                }
                writeln!(self.out, "    push eax").unwrap();
                writeln!(self.out, "    call write_{}", suffix_for(ty)).unwrap();
            }
            Instr::If {
                cond,
                then_body,
                else_body,
                ..
            } => {
                let else_label = self.labels.next();
                let end_label = self.labels.next();
                self.emit_expr(cond);
                writeln!(self.out, "    cmp al,1").unwrap();
                writeln!(self.out, "    jne near {}", else_label).unwrap();
                self.emit_body(then_body);
                writeln!(self.out, "    jmp {}", end_label).unwrap();
                writeln!(self.out, "{}:", else_label).unwrap();
                self.emit_body(else_body);
                writeln!(self.out, "{}:", end_label).unwrap();
            }
            Instr::While { cond, body, .. } => {
                let begin_label = self.labels.next();
                let end_label = self.labels.next();
                writeln!(self.out, "{}:", begin_label).unwrap();
                self.emit_expr(cond);
                writeln!(self.out, "    cmp al,1").unwrap();
                writeln!(self.out, "    jne near {}", end_label).unwrap();
                self.emit_body(body);
                writeln!(self.out, "    jmp {}", begin_label).unwrap();
                writeln!(self.out, "{}:", end_label).unwrap();
            }
            Instr::Repeat { count, body, .. } => {
                self.emit_expr(count);
                writeln!(self.out, "    mov ecx,eax").unwrap();
                let begin_label = self.labels.next();
                writeln!(self.out, "{}:", begin_label).unwrap();
                writeln!(self.out, "    push ecx").unwrap();
                self.emit_body(body);
                writeln!(self.out, "    pop ecx").unwrap();
                writeln!(self.out, "    loop {}", begin_label).unwrap();
            }
        }
    }

    fn emit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Number(n) => {
                writeln!(self.out, "    mov eax,{}", n).unwrap();
            }
            Expr::Boolean(b) => {
                writeln!(self.out, "    mov eax,{}", *b as u32).unwrap();
            }
            Expr::Id { name, .. } => {
                let symbol = self
                    .symbols
                    .lookup(name)
                    .expect("id declared; checked by the type checker");
                match symbol.ty {
                    PrimitiveType::Natural => {
                        writeln!(self.out, "    mov eax,[{}]", symbol.label).unwrap();
                    }
                    PrimitiveType::Boolean => {
                        writeln!(self.out, "    mov al,[{}]", symbol.label).unwrap();
                    }
                }
            }
            Expr::Not { operand, .. } => {
                self.emit_expr(operand);
                writeln!(self.out, "    xor al,1").unwrap();
            }
            Expr::Ternary {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                let else_label = self.labels.next();
                let end_label = self.labels.next();
                self.emit_expr(cond);
                writeln!(self.out, "    cmp al,1").unwrap();
                writeln!(self.out, "    jne near {}", else_label).unwrap();
                self.emit_expr(then_branch);
                writeln!(self.out, "    jmp {}", end_label).unwrap();
                writeln!(self.out, "{}:", else_label).unwrap();
                self.emit_expr(else_branch);
                writeln!(self.out, "{}:", end_label).unwrap();
            }
            Expr::Binop { op, left, right, .. } => {
                // Only `=` needs to know the operand width, since every
                // other operator's mnemonics are fixed by the operator
                // itself.
                let operand_ty = expr_type(left, self.symbols);
                self.emit_expr(left);
                writeln!(self.out, "    push eax").unwrap();
                self.emit_expr(right);
                writeln!(self.out, "    mov ecx,eax").unwrap();
                writeln!(self.out, "    pop eax").unwrap();
                self.emit_binop(*op, operand_ty);
            }
        }
    }

    fn emit_binop(&mut self, op: BinOp, operand_ty: PrimitiveType) {
        match op {
            BinOp::Add => {
                writeln!(self.out, "    add eax,ecx").unwrap();
            }
            BinOp::Sub => {
                writeln!(self.out, "    sub eax,ecx").unwrap();
            }
            BinOp::Mul => {
                writeln!(self.out, "    xor edx,edx").unwrap();
                writeln!(self.out, "    mul ecx").unwrap();
            }
            BinOp::Div => {
                writeln!(self.out, "    xor edx,edx").unwrap();
                writeln!(self.out, "    div ecx").unwrap();
            }
            BinOp::Mod => {
                writeln!(self.out, "    xor edx,edx").unwrap();
                writeln!(self.out, "    div ecx").unwrap();
                writeln!(self.out, "    mov eax,edx").unwrap();
            }
            BinOp::Lt => self.emit_relational("cmovb"),
            BinOp::Le => self.emit_relational("cmovbe"),
            BinOp::Gt => self.emit_relational("cmova"),
            BinOp::Ge => self.emit_relational("cmovae"),
            BinOp::And => {
                writeln!(self.out, "    cmp al,1").unwrap();
                writeln!(self.out, "    cmove ax,cx").unwrap();
            }
            BinOp::Or => {
                writeln!(self.out, "    cmp al,0").unwrap();
                writeln!(self.out, "    cmove ax,cx").unwrap();
            }
            BinOp::Eq => {
                match operand_ty {
                    PrimitiveType::Natural => writeln!(self.out, "    cmp eax,ecx").unwrap(),
                    PrimitiveType::Boolean => writeln!(self.out, "    cmp al,cl").unwrap(),
                }
                writeln!(self.out, "    mov al,0").unwrap();
                writeln!(self.out, "    mov cx,1").unwrap();
                writeln!(self.out, "    cmove ax,cx").unwrap();
            }
        }
    }

    /// `<`, `<=`, `>`, `>=` all share this shape; only the condition
    /// code differs. Unsigned (`b`/`be`/`a`/`ae`), since `Natural` is
    /// treated as an unsigned 32-bit value throughout.
    fn emit_relational(&mut self, cmov: &str) {
        writeln!(self.out, "    cmp eax,ecx").unwrap();
        writeln!(self.out, "    mov al,0").unwrap();
        writeln!(self.out, "    mov cx,1").unwrap();
        writeln!(self.out, "    {} ax,cx", cmov).unwrap();
    }
}

fn reg_for(ty: PrimitiveType) -> &'static str {
    match ty {
        PrimitiveType::Natural => "eax",
        PrimitiveType::Boolean => "al",
    }
}

fn suffix_for(ty: PrimitiveType) -> &'static str {
    match ty {
        PrimitiveType::Natural => "natural",
        PrimitiveType::Boolean => "boolean",
    }
}

/// Structural re-derivation of an expression's type, good enough for
/// codegen's one use (picking `=`'s comparison width): it does not
/// re-validate anything the type checker already guaranteed.
fn expr_type(expr: &Expr, symbols: &crate::symtab::SymbolTable) -> PrimitiveType {
    match expr {
        Expr::Number(_) => PrimitiveType::Natural,
        Expr::Boolean(_) => PrimitiveType::Boolean,
        Expr::Id { name, .. } => symbols
            .lookup(name)
            .map(|s| s.ty)
            .unwrap_or(PrimitiveType::Natural),
        Expr::Not { .. } => PrimitiveType::Boolean,
        Expr::Ternary { then_branch, .. } => expr_type(then_branch, symbols),
        Expr::Binop { op, .. } => {
            if op.is_arithmetic() {
                PrimitiveType::Natural
            } else {
                PrimitiveType::Boolean
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::typechecker::TypeChecker;

    fn codegen(src: &str) -> String {
        let mut program = Parser::new(src).unwrap().parse().unwrap();
        TypeChecker::new(&program.symbols)
            .check_program(&program)
            .unwrap();
        generate(&mut program)
    }

    #[test]
    fn preamble_declares_externs_and_entry_point() {
        let asm = codegen("program p natural x begin x := 1 write(x) end");
        assert!(asm.contains("global main"));
        assert!(asm.contains("extern read_natural"));
        assert!(asm.contains("extern write_boolean"));
        assert!(asm.contains("main:"));
    }

    #[test]
    fn bss_reserves_one_slot_per_symbol_in_order() {
        let asm = codegen("program p natural x boolean y begin x := 1 write(x) end");
        let bss_start = asm.find("section .bss").unwrap();
        let text_start = asm.find("section .text").unwrap();
        let bss = &asm[bss_start..text_start];
        let x_pos = bss.find("resb 4  ; variable: x").unwrap();
        let y_pos = bss.find("resb 1  ; variable: y").unwrap();
        assert!(x_pos < y_pos);
    }

    #[test]
    fn binop_moves_right_into_ecx_before_popping_left_back_into_eax() {
        let asm = codegen("program p natural x begin x := 1 + 2 write(x) end");
        let push_pos = asm.find("push eax").unwrap();
        let mov_ecx_pos = asm.find("mov ecx,eax").unwrap();
        let pop_pos = asm.find("pop eax").unwrap();
        assert!(push_pos < mov_ecx_pos);
        assert!(mov_ecx_pos < pop_pos);
    }

    #[test]
    fn relational_uses_unsigned_condition_codes() {
        let asm = codegen("program p natural x boolean b begin b := x >= 1 write(b) end");
        assert!(asm.contains("cmovae ax,cx"));
    }

    #[test]
    fn if_emits_two_distinct_labels_and_a_near_jump() {
        let asm = codegen(
            "program p natural x begin if x = 0 then write(1) else write(0) endif end",
        );
        assert!(asm.contains("jne near label"));
        assert!(asm.contains("jmp label"));
    }

    #[test]
    fn repeat_compiles_to_a_loop_instruction() {
        let asm = codegen("program p natural n begin n := 3 repeat n do write(n) done end");
        assert!(asm.contains("push ecx"));
        assert!(asm.contains("pop ecx"));
        assert!(asm.contains("loop label"));
    }

    #[test]
    fn write_boolean_masks_before_pushing_the_argument() {
        let asm = codegen("program p boolean b begin b := true write(b) end");
        let write_pos = asm.find("call write_boolean").unwrap();
        let and_pos = asm.find("and eax,1").unwrap();
        assert!(and_pos < write_pos);
    }
}
