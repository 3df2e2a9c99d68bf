//! Compiler configuration.

use serde::{Deserialize, Serialize};

/// Options controlling a compilation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Encode string constants as ISO-8859-1 instead of UTF-8
    pub use_latin1_strings: bool,
    /// Optimizer rule switches
    pub optimizer: OptimizerOptions,
    /// Keep the symbolic assembler listing of every function
    pub print_symbolic_assembler: bool,
    /// Keep a disassembly of every finalized function
    pub print_assembler: bool,
}

/// Individually switchable optimizer rules. All are enabled by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerOptions {
    /// Drop `TOBOOL` where the consumer converts anyway
    pub conversions: bool,
    /// Local pattern rewrites
    pub peephole: bool,
    /// Retarget jumps that land on another jump
    pub jumps_to_jumps: bool,
    /// Delete jumps to the immediately following instruction
    pub jumps_to_next_instruction: bool,
    /// Delete unreachable instructions
    pub dead_code: bool,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            conversions: true,
            peephole: true,
            jumps_to_jumps: true,
            jumps_to_next_instruction: true,
            dead_code: true,
        }
    }
}

impl OptimizerOptions {
    /// Every rule disabled.
    pub fn none() -> Self {
        Self {
            conversions: false,
            peephole: false,
            jumps_to_jumps: false,
            jumps_to_next_instruction: false,
            dead_code: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CompilerOptions::default();
        assert!(!options.use_latin1_strings);
        assert!(options.optimizer.dead_code);
        assert!(options.optimizer.conversions);
        assert!(!options.print_assembler);
    }

    #[test]
    fn test_partial_deserialize() {
        let options: CompilerOptions =
            serde_json::from_str(r#"{ "optimizer": { "peephole": false } }"#).unwrap();
        assert!(!options.optimizer.peephole);
        assert!(options.optimizer.jumps_to_jumps);
        assert!(!options.use_latin1_strings);
    }
}
