// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # wmlsc-compiler
//!
//! The back end of a WMLScript 1.1 compiler, implemented in Rust.
//!
//! ## Overview
//!
//! This crate turns a parsed compilation unit into a binary bytecode module:
//! - Code generation into a symbolic instruction list
//! - A fixpoint peephole and jump optimizer
//! - Branch sizing and final instruction encoding
//! - Serialization of the constant, pragma and function pools
//! - A disassembler for inspecting the result
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wmlsc_compiler::{Compiler, CompilerOptions};
//!
//! let unit: wmlsc_compiler::ast::CompilationUnit = serde_json::from_str(json)?;
//! let compiled = Compiler::new(CompilerOptions::default()).compile(&unit)?;
//! std::fs::write("out.wmlsc", compiled.to_bytes()?)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod bytecode;
pub mod compiler;
pub mod error;
pub mod stdlib;

// Re-exports for convenience
pub use bytecode::{BytecodeModule, DecodeError, decode, encode};
pub use compiler::{
    CompiledUnit, Compiler, CompilerOptions, FunctionListing, OptimizerOptions, compile,
};
pub use error::{Diagnostic, DiagnosticKind, Error, Result, Severity};
pub use stdlib::{LibraryRegistry, StandardLibrary};
