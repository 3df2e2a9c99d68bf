//! Variable slots for one function.
//!
//! WMLScript variables have function scope: parameters take the first
//! slots, then every `var` in declaration order, wherever in the body it
//! appears. Slots are never reused.

use rustc_hash::FxHashMap;

use crate::error::DiagnosticKind;

/// Number of variable slots a function may use.
pub const MAX_SLOTS: usize = 256;

/// A declared variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Local {
    /// Slot index
    pub slot: u8,
    /// Line of the declaration
    pub line: u32,
}

/// Name-to-slot table for one function.
#[derive(Debug, Default)]
pub struct Namespace {
    locals: FxHashMap<String, Local>,
}

impl Namespace {
    /// Creates an empty namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `name`, assigning it the next free slot.
    pub fn declare(&mut self, name: &str, line: u32) -> Result<u8, DiagnosticKind> {
        if let Some(previous) = self.locals.get(name) {
            return Err(DiagnosticKind::DuplicateDeclaration {
                name: name.to_string(),
                previous_line: previous.line,
            });
        }
        if self.locals.len() >= MAX_SLOTS {
            return Err(DiagnosticKind::TooManyVariables);
        }

        let slot = self.locals.len() as u8;
        self.locals.insert(name.to_string(), Local { slot, line });
        Ok(slot)
    }

    /// Resolves a variable to its slot.
    pub fn resolve(&self, name: &str) -> Option<u8> {
        self.locals.get(name).map(|local| local.slot)
    }

    /// Number of slots in use.
    pub fn len(&self) -> usize {
        self.locals.len()
    }

    /// Returns true if nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_declare() {
        let mut ns = Namespace::new();
        assert_eq!(ns.declare("a", 1), Ok(0));
        assert_eq!(ns.declare("b", 2), Ok(1));
        assert_eq!(ns.len(), 2);
        assert_eq!(ns.resolve("b"), Some(1));
        assert_eq!(ns.resolve("c"), None);
    }

    #[test]
    fn test_namespace_duplicate_reports_first_line() {
        let mut ns = Namespace::new();
        ns.declare("x", 3).unwrap();
        assert_eq!(
            ns.declare("x", 9),
            Err(DiagnosticKind::DuplicateDeclaration {
                name: "x".into(),
                previous_line: 3
            })
        );
        assert_eq!(ns.len(), 1);
    }

    #[test]
    fn test_namespace_limit() {
        let mut ns = Namespace::new();
        for i in 0..MAX_SLOTS {
            assert_eq!(ns.declare(&format!("v{i}"), 1), Ok(i as u8));
        }
        assert_eq!(ns.declare("overflow", 1), Err(DiagnosticKind::TooManyVariables));
    }
}
