//! Symbol table and the shared label counter.
//!
//! The table is insertion-only: symbols are created once as the parser
//! consumes `decl` productions and are read-only for every stage after.

use crate::error::CompileError;
use crate::types::PrimitiveType;
use std::collections::HashMap;
use std::fmt;

/// A unique textual label, drawn from the process-wide [`LabelGen`] counter.
/// Used both for a symbol's storage slot and for control-flow targets, so
/// the draw order is observable in the emitted assembly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label(pub String);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing counter yielding `label<N>` starting at 1.
#[derive(Debug, Default)]
pub struct LabelGen {
    next: u32,
}

impl LabelGen {
    pub fn new() -> Self {
        LabelGen { next: 1 }
    }

    pub fn next(&mut self) -> Label {
        let label = Label(format!("label{}", self.next));
        self.next += 1;
        label
    }
}

/// A declared variable: its source line, name, type, and storage label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub line: usize,
    pub name: String,
    pub ty: PrimitiveType,
    pub label: Label,
}

/// Global, flat, insertion-only mapping from name to [`Symbol`].
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
    /// Declaration order, preserved for `.bss` emission and pretty-printing.
    order: Vec<String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            symbols: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Inserts a fresh symbol, generating its storage label from `labels`.
    /// Fails with `Redeclaration` if `name` is already present.
    pub fn declare(
        &mut self,
        name: &str,
        ty: PrimitiveType,
        line: usize,
        labels: &mut LabelGen,
    ) -> Result<&Symbol, CompileError> {
        if self.symbols.contains_key(name) {
            return Err(CompileError::Redeclaration {
                line,
                name: name.to_string(),
            });
        }
        let symbol = Symbol {
            line,
            name: name.to_string(),
            ty,
            label: labels.next(),
        };
        self.order.push(name.to_string());
        self.symbols.insert(name.to_string(), symbol);
        Ok(self.symbols.get(name).expect("just inserted"))
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    /// Symbols in declaration order.
    pub fn in_order(&self) -> impl Iterator<Item = &Symbol> {
        self.order.iter().map(move |n| &self.symbols[n])
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declare_then_lookup() {
        let mut table = SymbolTable::new();
        let mut labels = LabelGen::new();
        table
            .declare("x", PrimitiveType::Natural, 1, &mut labels)
            .unwrap();
        let sym = table.lookup("x").unwrap();
        assert_eq!(sym.ty, PrimitiveType::Natural);
        assert_eq!(sym.label, Label("label1".to_string()));
    }

    #[test]
    fn redeclaration_is_an_error() {
        let mut table = SymbolTable::new();
        let mut labels = LabelGen::new();
        table
            .declare("x", PrimitiveType::Natural, 1, &mut labels)
            .unwrap();
        let err = table
            .declare("x", PrimitiveType::Boolean, 2, &mut labels)
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::Redeclaration {
                line: 2,
                name: "x".to_string()
            }
        );
    }

    #[test]
    fn labels_and_symbol_storage_share_one_counter() {
        let mut table = SymbolTable::new();
        let mut labels = LabelGen::new();
        table
            .declare("a", PrimitiveType::Natural, 1, &mut labels)
            .unwrap();
        let control_flow_label = labels.next();
        table
            .declare("b", PrimitiveType::Natural, 2, &mut labels)
            .unwrap();
        assert_eq!(control_flow_label, Label("label2".to_string()));
        assert_eq!(
            table.lookup("b").unwrap().label,
            Label("label3".to_string())
        );
    }

    #[test]
    fn declaration_order_is_preserved() {
        let mut table = SymbolTable::new();
        let mut labels = LabelGen::new();
        table
            .declare("z", PrimitiveType::Natural, 1, &mut labels)
            .unwrap();
        table
            .declare("a", PrimitiveType::Boolean, 2, &mut labels)
            .unwrap();
        let names: Vec<_> = table.in_order().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["z", "a"]);
    }
}
