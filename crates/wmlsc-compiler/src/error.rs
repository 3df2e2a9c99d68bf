//! Error and diagnostic types for the compiler.

use std::fmt;

use thiserror::Error;

use crate::bytecode::DecodeError;

/// Result type for compiler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while compiling or encoding a module.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// One or more semantic errors were reported during code generation.
    #[error("compilation failed with {} error(s)", count_errors(.0))]
    Compilation(Vec<Diagnostic>),

    /// A binary module could not be decoded.
    #[error("malformed module: {0}")]
    Decode(#[from] DecodeError),

    /// The constant pool is full.
    #[error("too many constants (limit: 65535)")]
    TooManyConstants,

    /// The pragma pool is full.
    #[error("too many pragmas (limit: 65535)")]
    TooManyPragmas,

    /// The function pool is full.
    #[error("too many functions (limit: 255)")]
    TooManyFunctions,

    /// A function name is not a valid identifier.
    #[error("invalid function name `{0}`")]
    InvalidFunctionName(String),

    /// A pragma references a constant that is missing or not a string.
    #[error("pragma references constant {0}, which is not a string")]
    InvalidPragma(u16),

    /// A function body does not fit the module format.
    #[error("function code is too large ({0} bytes)")]
    CodeTooLarge(usize),

    /// A branch distance exceeds the widest jump encoding.
    #[error("branch distance {distance} exceeds the 16-bit jump range")]
    BranchOutOfRange {
        /// The distance in bytes
        distance: u32,
    },

    /// Internal compiler defect.
    #[error("internal compiler error: {0}")]
    Internal(String),
}

fn count_errors(diagnostics: &[Diagnostic]) -> usize {
    diagnostics.iter().filter(|d| d.is_error()).count()
}

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Compilation continues and succeeds.
    Warning,
    /// Compilation continues but the unit is rejected at the end.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A diagnostic tied to a source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// Severity of the diagnostic
    pub severity: Severity,
    /// Source line (1-based, 0 when unknown)
    pub line: u32,
    /// What went wrong
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    /// Creates an error diagnostic.
    pub fn error(line: u32, kind: DiagnosticKind) -> Self {
        Self {
            severity: Severity::Error,
            line,
            kind,
        }
    }

    /// Creates a warning diagnostic.
    pub fn warning(line: u32, kind: DiagnosticKind) -> Self {
        Self {
            severity: Severity::Warning,
            line,
            kind,
        }
    }

    /// Returns true for error-severity diagnostics.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.severity, self.kind)
    }
}

/// The kinds of problems code generation can report.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DiagnosticKind {
    /// Reference to an undeclared variable
    #[error("unknown variable `{0}`")]
    UnknownIdentifier(String),

    /// Call to an undeclared local function
    #[error("unknown local function `{0}`")]
    UnknownFunction(String),

    /// Call into a library the registry does not know
    #[error("unknown system library `{0}`")]
    UnknownLibrary(String),

    /// Call to a function missing from a known library
    #[error("unknown library function `{library}.{function}`")]
    UnknownLibraryFunction {
        /// Library name
        library: String,
        /// Function name
        function: String,
    },

    /// External call through an undeclared `use url` name
    #[error("unknown external compilation unit `{0}`")]
    UnknownExternalUnit(String),

    /// Wrong number of arguments in a call
    #[error("invalid amount of arguments for `{callee}`: expected {expected}, got {got}")]
    ArityMismatch {
        /// Display name of the callee
        callee: String,
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        got: usize,
    },

    /// Name declared twice in the same scope
    #[error("redeclaration of `{name}` (previously declared on line {previous_line})")]
    DuplicateDeclaration {
        /// The duplicated name
        name: String,
        /// Line of the first declaration
        previous_line: u32,
    },

    /// More than one access pragma in a unit
    #[error("multiple access pragmas (previous one on line {0})")]
    DuplicateAccessPragma(u32),

    /// `break` or `continue` outside a loop
    #[error("{0} statement not within a loop")]
    NotWithinLoop(&'static str),

    /// A function needs more than 256 variable slots
    #[error("too many local variables (limit: 256)")]
    TooManyVariables,

    /// A unit declares more than 255 functions
    #[error("too many functions (limit: 255)")]
    TooManyFunctions,

    /// The constant pool overflowed
    #[error("too many constants (limit: 65535)")]
    TooManyConstants,

    /// A literal was saturated or rounded to fit the module format
    #[error("{0}")]
    EncodingOverflow(String),
}
