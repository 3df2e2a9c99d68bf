//! Compiler from WMLScript syntax trees to binary modules.
//!
//! # Module Structure
//!
//! - `opcode`: the concrete instruction set
//! - `asm`: symbolic instructions and the editable instruction list
//! - `codegen`: AST to symbolic instructions
//!   - `codegen::scope`: variable slot allocation
//! - `optimizer`: fixpoint rewriting of instruction lists
//! - `linearizer`: branch sizing and final encoding
//! - `disasm`: decoding function code back into listings
//!
//! # Pipeline
//!
//! ```text
//! CompilationUnit -> register_unit -> FunctionCodegen -> optimize -> linearize -> BytecodeModule
//! ```

pub mod asm;
pub mod codegen;
pub mod context;
pub mod disasm;
pub mod linearizer;
pub mod opcode;
pub mod optimizer;
pub mod options;

pub use context::CompilationContext;
pub use options::{CompilerOptions, OptimizerOptions};

use tracing::{debug, info};

use crate::ast::{CompilationUnit, MetaPragma};
use crate::bytecode::{self, BytecodeModule, Function};
use crate::error::{Diagnostic, Error, Result};
use crate::stdlib::{LibraryRegistry, StandardLibrary};

use codegen::FunctionCodegen;
use disasm::DisasmContext;

static STANDARD_LIBRARY: StandardLibrary = StandardLibrary;

/// Listings of one compiled function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionListing {
    /// Function name
    pub name: String,
    /// Optimized symbolic instructions, when requested
    pub symbolic: Option<String>,
    /// Disassembled final code, when requested
    pub assembler: Option<String>,
}

/// The output of a successful compilation.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    /// The module
    pub module: BytecodeModule,
    /// Warnings raised along the way
    pub diagnostics: Vec<Diagnostic>,
    /// Listings in function order, empty unless requested
    pub listings: Vec<FunctionListing>,
    /// `use meta name` and `use meta http equiv` entries
    pub metadata: Vec<MetaPragma>,
}

impl CompiledUnit {
    /// Serializes the module.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bytecode::encode(&self.module)
    }
}

/// Compiles units against a library registry.
pub struct Compiler<'r> {
    options: CompilerOptions,
    registry: &'r dyn LibraryRegistry,
}

impl Compiler<'static> {
    /// Creates a compiler using the standard libraries.
    pub fn new(options: CompilerOptions) -> Self {
        Self {
            options,
            registry: &STANDARD_LIBRARY,
        }
    }
}

impl Default for Compiler<'static> {
    fn default() -> Self {
        Self::new(CompilerOptions::default())
    }
}

impl<'r> Compiler<'r> {
    /// Replaces the library registry.
    pub fn with_registry<'n>(self, registry: &'n dyn LibraryRegistry) -> Compiler<'n> {
        Compiler {
            options: self.options,
            registry,
        }
    }

    /// The options in effect.
    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Compiles a unit.
    ///
    /// Semantic errors do not stop compilation early: every function is
    /// still generated so that all problems are reported together in
    /// [`Error::Compilation`].
    pub fn compile(&self, unit: &CompilationUnit) -> Result<CompiledUnit> {
        let mut ctx = CompilationContext::new(self.options.clone(), self.registry);
        codegen::register_unit(&mut ctx, unit)?;

        let mut listings = Vec::new();
        for decl in &unit.functions {
            let generated = FunctionCodegen::new(&mut ctx).generate(decl);
            if ctx.has_errors() {
                continue;
            }

            let mut code = generated.code;
            let passes = optimizer::optimize(&mut code, &ctx.options.optimizer);
            let symbolic = ctx
                .options
                .print_symbolic_assembler
                .then(|| code.listing());
            let bytes = linearizer::linearize(&code)?;
            debug!(function = %decl.name, passes, size = bytes.len(), "compiled function");

            let index = ctx.module.add_function(Function {
                arguments: generated.arguments,
                locals: generated.locals,
                code: bytes,
                name: decl.is_extern.then(|| decl.name.clone()),
            })?;

            let assembler = if ctx.options.print_assembler {
                let names = DisasmContext {
                    module: &ctx.module,
                    registry: self.registry,
                };
                Some(disasm::render_function(&names, index)?)
            } else {
                None
            };
            if symbolic.is_some() || assembler.is_some() {
                listings.push(FunctionListing {
                    name: decl.name.clone(),
                    symbolic,
                    assembler,
                });
            }
        }

        if ctx.has_errors() {
            info!(errors = ctx.error_count(), "compilation failed");
            let (_, diagnostics, _) = ctx.finish();
            return Err(Error::Compilation(diagnostics));
        }

        let (module, diagnostics, metadata) = ctx.finish();
        info!(
            functions = module.functions().len(),
            constants = module.constants().len(),
            "compilation succeeded"
        );
        Ok(CompiledUnit {
            module,
            diagnostics,
            listings,
            metadata,
        })
    }
}

/// Compiles a unit with the standard libraries.
pub fn compile(unit: &CompilationUnit, options: CompilerOptions) -> Result<CompiledUnit> {
    Compiler::new(options).compile(unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Callee, Expression, FunctionDeclaration, Statement};
    use crate::stdlib::{LibraryFunction, LookupError};

    struct Device;

    impl LibraryRegistry for Device {
        fn resolve(
            &self,
            library: &str,
            function: &str,
        ) -> std::result::Result<LibraryFunction, LookupError> {
            match (library, function) {
                ("Device", "vibrate") => Ok(LibraryFunction {
                    library: 512,
                    function: 9,
                    arity: 0,
                }),
                ("Device", _) => Err(LookupError::UnknownFunction),
                _ => Err(LookupError::UnknownLibrary),
            }
        }

        fn name_of(&self, library: u16, function: u8) -> Option<(&str, &str)> {
            (library == 512 && function == 9).then_some(("Device", "vibrate"))
        }
    }

    fn calling(library: &str, function: &str) -> CompilationUnit {
        CompilationUnit {
            pragmas: Vec::new(),
            functions: vec![FunctionDeclaration {
                name: "buzz".to_string(),
                is_extern: true,
                params: Vec::new(),
                body: vec![Statement::expression(Expression::call(
                    Callee::Library {
                        library: library.to_string(),
                        function: function.to_string(),
                    },
                    Vec::new(),
                    1,
                ))],
                line: 1,
            }],
        }
    }

    #[test]
    fn test_custom_registry() {
        let options = CompilerOptions {
            print_assembler: true,
            ..CompilerOptions::default()
        };
        let compiler = Compiler::new(options).with_registry(&Device);
        let compiled = compiler.compile(&calling("Device", "vibrate")).unwrap();

        // CALL_LIB_W 9 512, POP
        assert_eq!(
            compiled.module.functions()[0].code,
            vec![0x0b, 0x09, 0x02, 0x00, 0x37]
        );
        let assembler = compiled.listings[0].assembler.as_deref().unwrap();
        assert!(assembler.lines().next().unwrap().ends_with("; Device.vibrate"));

        assert!(matches!(
            compiler.compile(&calling("Lang", "abs")),
            Err(Error::Compilation(_))
        ));
    }

    #[test]
    fn test_default_compiler() {
        let compiled = compile(&calling("Lang", "abs"), CompilerOptions::default());
        // Lang.abs takes one argument.
        let Err(Error::Compilation(diagnostics)) = compiled else {
            panic!("expected an arity error");
        };
        assert_eq!(diagnostics.len(), 1);
        assert!(Compiler::default().options().optimizer.dead_code);
    }
}
