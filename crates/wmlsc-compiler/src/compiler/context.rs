//! State shared by every function of one compilation unit.

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::ast::MetaPragma;
use crate::bytecode::{BytecodeModule, StringEncoding};
use crate::error::{Diagnostic, DiagnosticKind};
use crate::stdlib::LibraryRegistry;

use super::options::CompilerOptions;

/// A function known to the unit, registered before any body is compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSignature {
    /// Index in the function pool
    pub index: u8,
    /// Number of declared parameters
    pub params: usize,
    /// Line of the declaration
    pub line: u32,
}

/// An external unit declared with `use url`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalUnit {
    /// Constant index of the URL string
    pub url: u16,
    /// Line of the pragma
    pub line: u32,
}

/// Everything the compilation of one unit owns.
///
/// Lives for exactly one call to [`Compiler::compile`](super::Compiler::compile).
pub struct CompilationContext<'r> {
    /// Options in effect
    pub options: CompilerOptions,
    /// The module being built
    pub module: BytecodeModule,
    /// Library lookup
    pub registry: &'r dyn LibraryRegistry,
    /// Functions by name
    pub functions: FxHashMap<String, FunctionSignature>,
    /// `use url` names
    pub externals: FxHashMap<String, ExternalUnit>,
    /// Line of the access pragma, once seen
    pub access_pragma_line: Option<u32>,
    /// `use meta name` and `use meta http equiv` entries
    pub metadata: Vec<MetaPragma>,
    diagnostics: Vec<Diagnostic>,
}

impl<'r> CompilationContext<'r> {
    /// Creates a context with an empty module.
    pub fn new(options: CompilerOptions, registry: &'r dyn LibraryRegistry) -> Self {
        let encoding = if options.use_latin1_strings {
            StringEncoding::Latin1
        } else {
            StringEncoding::Utf8
        };
        Self {
            options,
            module: BytecodeModule::new(encoding),
            registry,
            functions: FxHashMap::default(),
            externals: FxHashMap::default(),
            access_pragma_line: None,
            metadata: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Records an error. Compilation continues but will fail.
    pub fn error(&mut self, line: u32, kind: DiagnosticKind) {
        self.diagnostics.push(Diagnostic::error(line, kind));
    }

    /// Records a warning.
    pub fn warning(&mut self, line: u32, kind: DiagnosticKind) {
        let diagnostic = Diagnostic::warning(line, kind);
        warn!("{diagnostic}");
        self.diagnostics.push(diagnostic);
    }

    /// Returns true once any error has been recorded.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// Number of errors recorded so far.
    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    /// Diagnostics recorded so far, in order.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Consumes the context, returning the module, diagnostics and metadata.
    pub fn finish(self) -> (BytecodeModule, Vec<Diagnostic>, Vec<MetaPragma>) {
        (self.module, self.diagnostics, self.metadata)
    }
}
