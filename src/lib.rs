//! `impc` — a batch compiler for Imp, a small imperative teaching
//! language with two primitive types (`boolean`, `natural`),
//! declarations, assignment, console I/O, conditionals, pre-test and
//! counted loops, and a ternary conditional expression.
//!
//! The pipeline is: lex + parse into an [`ast::Program`] (with its
//! [`symtab::SymbolTable`] already populated), statically [`typechecker`]
//! it, optionally run it through the constant-propagation/algebraic
//! [`optimizer`], then either [`pretty`]-print it back to source-like
//! text or [`codegen`] it to 32-bit x86 NASM assembly.
//!
//! # Example
//!
//! ```
//! use impc::{compile_source, CompilerConfig};
//!
//! let mut program = compile_source(
//!     "program p natural x begin x := 1 + 2 write(x) end",
//!     &CompilerConfig::default(),
//! ).unwrap();
//! let asm = impc::codegen::generate(&mut program);
//! assert!(asm.contains("global main"));
//! ```

pub mod ast;
pub mod codegen;
pub mod config;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod optimizer;
pub mod parser;
pub mod pretty;
pub mod symtab;
pub mod typechecker;
pub mod types;

pub use ast::Program;
pub use config::CompilerConfig;
pub use error::{CompileError, EvalError};
pub use optimizer::Optimizer;
pub use parser::Parser;
pub use typechecker::TypeChecker;

use std::fs;
use std::path::Path;

/// Parses, type-checks, and (per `config.optimize`) optimizes `source`.
///
/// Returns the checked `Program`, ready for [`pretty::print_program`] or
/// [`codegen::generate`]. The first error encountered — lexical, syntax,
/// or semantic — aborts the pipeline.
pub fn compile_source(source: &str, config: &CompilerConfig) -> Result<Program, CompileError> {
    let mut program = Parser::new(source)?.parse()?;
    TypeChecker::new(&program.symbols).check_program(&program)?;
    if config.optimize {
        Optimizer::optimize_program(&program.symbols, &mut program.body);
    }
    Ok(program)
}

/// Reads `path` and runs it through [`compile_source`].
///
/// I/O errors are reported the same way a `CompileError` is: as a single
/// line beginning `Line <N>: Error:` (line 0 for failures that precede
/// any parsing, such as a missing file).
pub fn compile_file(path: &Path, config: &CompilerConfig) -> Result<Program, CompileError> {
    let source = fs::read_to_string(path).map_err(|e| CompileError::Syntax {
        line: 0,
        message: format!("could not read '{}': {}", path.display(), e),
    })?;
    compile_source(&source, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn compile_source_optimizes_by_default() {
        let program =
            compile_source("program p natural x begin x := 1 + 2 write(x) end", &CompilerConfig::default())
                .unwrap();
        match &program.body[0] {
            ast::Instr::Assign { value, .. } => assert_eq!(*value, ast::Expr::Number(3)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn no_optimize_config_leaves_arithmetic_unfolded() {
        let config = CompilerConfig::new().with_optimize(false);
        let program =
            compile_source("program p natural x begin x := 1 + 2 write(x) end", &config).unwrap();
        match &program.body[0] {
            ast::Instr::Assign { value, .. } => {
                assert!(matches!(value, ast::Expr::Binop { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn type_errors_surface_through_compile_source() {
        let err = compile_source("program p natural x begin x := true end", &CompilerConfig::default())
            .unwrap_err();
        assert!(matches!(err, CompileError::TypeMismatch { .. }));
    }

    #[test]
    fn compile_file_reads_and_compiles_a_real_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "program p natural x begin x := 4 write(x) end").unwrap();
        let program = compile_file(file.path(), &CompilerConfig::default()).unwrap();
        assert_eq!(program.name, "p");
    }

    #[test]
    fn compile_file_reports_missing_files_as_a_compile_error() {
        let err = compile_file(Path::new("/no/such/file.imp"), &CompilerConfig::default())
            .unwrap_err();
        assert_eq!(err.line(), 0);
    }
}
