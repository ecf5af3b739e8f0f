//! Compile-time and evaluation error types.

use std::fmt;

/// A fatal, unrecoverable compile error. The first one encountered aborts
/// the pipeline; there is no error recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// A name was declared twice.
    Redeclaration { line: usize, name: String },
    /// A name was used without having been declared.
    UndefinedVariable { line: usize, name: String },
    /// An operand, condition, or assignment had the wrong primitive type.
    TypeMismatch { line: usize, message: String },
    /// The lexer found a character that cannot start any token.
    Lexical { line: usize, message: String },
    /// The parser expected a different token or production.
    Syntax { line: usize, message: String },
}

impl CompileError {
    pub fn line(&self) -> usize {
        match self {
            CompileError::Redeclaration { line, .. }
            | CompileError::UndefinedVariable { line, .. }
            | CompileError::TypeMismatch { line, .. }
            | CompileError::Lexical { line, .. }
            | CompileError::Syntax { line, .. } => *line,
        }
    }

    fn message(&self) -> String {
        match self {
            CompileError::Redeclaration { name, .. } => {
                format!("'{}' is already declared", name)
            }
            CompileError::UndefinedVariable { name, .. } => {
                format!("'{}' is not declared", name)
            }
            CompileError::TypeMismatch { message, .. } => message.clone(),
            CompileError::Lexical { message, .. } => message.clone(),
            CompileError::Syntax { message, .. } => message.clone(),
        }
    }
}

impl fmt::Display for CompileError {
    /// Renders as `Line <N>: Error: <message>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line {}: Error: {}", self.line(), self.message())
    }
}

impl std::error::Error for CompileError {}

/// A runtime error raised by the in-process evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    DivisionByZero { line: usize },
    UndefinedVariable { name: String },
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::DivisionByZero { line } => {
                write!(f, "Line {}: Error: division or modulus by zero", line)
            }
            EvalError::UndefinedVariable { name } => {
                write!(f, "Error: '{}' has no value", name)
            }
        }
    }
}

impl std::error::Error for EvalError {}
