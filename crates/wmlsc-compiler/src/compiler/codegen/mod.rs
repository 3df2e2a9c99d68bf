//! Code generation from AST to symbolic instructions.
//!
//! A unit is compiled in two phases. [`register_unit`] walks the pragmas and
//! the function headers, so that every function can call every other one
//! regardless of order. Then each body is translated by a
//! [`FunctionCodegen`] into an [`InstructionList`].
//!
//! Semantic errors never stop generation; they are recorded on the
//! [`CompilationContext`] and the unit is rejected at the end.

mod expressions;
mod scope;
mod statements;


pub use scope::{Local, MAX_SLOTS, Namespace};

use tracing::debug;

use crate::ast::{AccessPragma, CompilationUnit, FunctionDeclaration, MetaProperty, Pragma};
use crate::bytecode::module::MAX_FUNCTIONS;
use crate::bytecode::Pragma as ModulePragma;
use crate::error::{DiagnosticKind, Result};

use super::asm::{InstructionList, LabelId};
use super::context::{CompilationContext, ExternalUnit, FunctionSignature};

// ============================================================================
// Unit-level registration
// ============================================================================

/// Registers the unit's pragmas and function signatures.
pub fn register_unit(ctx: &mut CompilationContext<'_>, unit: &CompilationUnit) -> Result<()> {
    for decl in &unit.functions {
        register_function(ctx, decl);
    }
    for pragma in &unit.pragmas {
        register_pragma(ctx, pragma)?;
    }
    Ok(())
}

fn register_function(ctx: &mut CompilationContext<'_>, decl: &FunctionDeclaration) {
    if let Some(previous) = ctx.functions.get(&decl.name) {
        let previous_line = previous.line;
        ctx.error(
            decl.line,
            DiagnosticKind::DuplicateDeclaration {
                name: decl.name.clone(),
                previous_line,
            },
        );
        return;
    }
    if ctx.functions.len() >= MAX_FUNCTIONS {
        ctx.error(decl.line, DiagnosticKind::TooManyFunctions);
        return;
    }

    let signature = FunctionSignature {
        index: ctx.functions.len() as u8,
        params: decl.params.len(),
        line: decl.line,
    };
    ctx.functions.insert(decl.name.clone(), signature);
}

fn register_pragma(ctx: &mut CompilationContext<'_>, pragma: &Pragma) -> Result<()> {
    match pragma {
        Pragma::Url(url) => {
            if let Some(previous) = ctx.externals.get(&url.name) {
                let previous_line = previous.line;
                ctx.error(
                    url.line,
                    DiagnosticKind::DuplicateDeclaration {
                        name: url.name.clone(),
                        previous_line,
                    },
                );
                return Ok(());
            }
            if let Some(index) = string_constant(ctx, &url.url, url.line) {
                ctx.externals.insert(
                    url.name.clone(),
                    ExternalUnit {
                        url: index,
                        line: url.line,
                    },
                );
            }
        }
        Pragma::Access(access) => register_access(ctx, access)?,
        Pragma::Meta(meta) => match meta.property {
            MetaProperty::Name | MetaProperty::HttpEquiv => ctx.metadata.push(meta.clone()),
            MetaProperty::UserAgent => {
                let name = string_constant(ctx, &meta.name, meta.line);
                let value = string_constant(ctx, &meta.content, meta.line);
                let scheme = match &meta.scheme {
                    Some(scheme) => string_constant(ctx, scheme, meta.line).map(Some),
                    None => Some(None),
                };
                if let (Some(name), Some(value), Some(scheme)) = (name, value, scheme) {
                    let pragma = match scheme {
                        Some(scheme) => ModulePragma::UserAgentPropertyAndScheme {
                            name,
                            value,
                            scheme,
                        },
                        None => ModulePragma::UserAgentProperty { name, value },
                    };
                    ctx.module.add_pragma(pragma)?;
                }
            }
        },
    }
    Ok(())
}

fn register_access(ctx: &mut CompilationContext<'_>, access: &AccessPragma) -> Result<()> {
    if let Some(previous) = ctx.access_pragma_line {
        ctx.error(access.line, DiagnosticKind::DuplicateAccessPragma(previous));
        return Ok(());
    }
    ctx.access_pragma_line = Some(access.line);

    if let Some(domain) = &access.domain {
        if let Some(index) = string_constant(ctx, domain, access.line) {
            ctx.module.add_pragma(ModulePragma::AccessDomain(index))?;
        }
    }
    if let Some(path) = &access.path {
        if let Some(index) = string_constant(ctx, path, access.line) {
            ctx.module.add_pragma(ModulePragma::AccessPath(index))?;
        }
    }
    Ok(())
}

/// Adds a string to the constant pool, reporting a full pool as an error.
fn string_constant(ctx: &mut CompilationContext<'_>, value: &str, line: u32) -> Option<u16> {
    match ctx.module.add_string(value) {
        Ok(index) => Some(index),
        Err(_) => {
            ctx.error(line, DiagnosticKind::TooManyConstants);
            None
        }
    }
}

// ============================================================================
// Function bodies
// ============================================================================

/// Labels of an enclosing loop.
#[derive(Debug, Clone, Copy)]
struct LoopLabels {
    continue_label: LabelId,
    break_label: LabelId,
}

/// The result of generating one function.
#[derive(Debug)]
pub struct GeneratedFunction {
    /// The instructions
    pub code: InstructionList,
    /// Number of parameters
    pub arguments: u8,
    /// Number of variables beyond the parameters
    pub locals: u8,
}

/// Translates one function body.
pub struct FunctionCodegen<'c, 'r> {
    ctx: &'c mut CompilationContext<'r>,
    code: InstructionList,
    namespace: Namespace,
    loops: Vec<LoopLabels>,
}

impl<'c, 'r> FunctionCodegen<'c, 'r> {
    /// Creates a generator writing into a fresh instruction list.
    pub fn new(ctx: &'c mut CompilationContext<'r>) -> Self {
        Self {
            ctx,
            code: InstructionList::new(),
            namespace: Namespace::new(),
            loops: Vec::new(),
        }
    }

    /// Generates code for `decl`.
    pub fn generate(mut self, decl: &FunctionDeclaration) -> GeneratedFunction {
        for param in &decl.params {
            self.declare(&param.name, param.line);
        }
        for statement in &decl.body {
            self.statement(statement);
        }

        let total = self.namespace.len();
        let params = decl.params.len().min(total);
        let arguments = u8::try_from(params).ok();
        let locals = u8::try_from(total - params).ok();
        let (arguments, locals) = match (arguments, locals) {
            (Some(arguments), Some(locals)) => (arguments, locals),
            _ => {
                self.ctx.error(decl.line, DiagnosticKind::TooManyVariables);
                (0, 0)
            }
        };

        debug!(
            function = %decl.name,
            instructions = self.code.len(),
            arguments,
            locals,
            "generated function"
        );
        GeneratedFunction {
            code: self.code,
            arguments,
            locals,
        }
    }

    /// Declares a variable, reporting duplicates and slot exhaustion.
    fn declare(&mut self, name: &str, line: u32) -> Option<u8> {
        match self.namespace.declare(name, line) {
            Ok(slot) => Some(slot),
            Err(kind) => {
                self.ctx.error(line, kind);
                None
            }
        }
    }

    /// Resolves a variable, reporting unknown names.
    fn resolve(&mut self, name: &str, line: u32) -> Option<u8> {
        let slot = self.namespace.resolve(name);
        if slot.is_none() {
            self.ctx
                .error(line, DiagnosticKind::UnknownIdentifier(name.to_string()));
        }
        slot
    }
}
