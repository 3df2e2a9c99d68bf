// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! wmlsc - WMLScript bytecode compiler
//!
//! This is the command-line driver. It reads a compilation unit as JSON,
//! compiles it and writes the binary module, or dumps an existing module.

mod config;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use wmlsc_compiler::ast::CompilationUnit;
use wmlsc_compiler::compiler::disasm::{self, DisasmContext};
use wmlsc_compiler::{Compiler, CompilerOptions, Diagnostic, Error, Severity, StandardLibrary};

use config::Config;

#[derive(Parser)]
#[command(
    name = "wmlsc",
    about = "Compiles WMLScript syntax trees into binary bytecode modules",
    version,
    author = "Pegasus Heavy Industries"
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a unit given as JSON
    Compile(CompileArgs),
    /// Print the pools and code of a binary module
    Dump {
        /// Module to inspect
        module: PathBuf,
    },
}

#[derive(Args)]
struct CompileArgs {
    /// Compilation unit (JSON syntax tree)
    input: PathBuf,

    /// Output file, defaults to the input with the configured extension
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Configuration file, defaults to ./wmlsc.toml when present
    #[arg(long)]
    config: Option<PathBuf>,

    /// Encode strings as ISO-8859-1
    #[arg(long)]
    latin1: bool,

    /// Disable conversion elision
    #[arg(long)]
    no_opt_conv: bool,

    /// Disable peephole rules
    #[arg(long)]
    no_opt_peephole: bool,

    /// Disable jump chain collapsing
    #[arg(long)]
    no_opt_jumps_to_jumps: bool,

    /// Disable removal of jumps to the next instruction
    #[arg(long)]
    no_opt_jumps_to_next: bool,

    /// Disable dead code removal
    #[arg(long)]
    no_opt_dead_code: bool,

    /// Print the symbolic assembler of every function
    #[arg(long)]
    symbolic: bool,

    /// Print the disassembly of every function
    #[arg(long)]
    disassemble: bool,
}

impl CompileArgs {
    /// Applies the flags on top of the configured options.
    fn apply(&self, options: &mut CompilerOptions) {
        options.use_latin1_strings |= self.latin1;
        options.print_symbolic_assembler |= self.symbolic;
        options.print_assembler |= self.disassemble;

        let optimizer = &mut options.optimizer;
        optimizer.conversions &= !self.no_opt_conv;
        optimizer.peephole &= !self.no_opt_peephole;
        optimizer.jumps_to_jumps &= !self.no_opt_jumps_to_jumps;
        optimizer.jumps_to_next_instruction &= !self.no_opt_jumps_to_next;
        optimizer.dead_code &= !self.no_opt_dead_code;
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("wmlsc=debug,wmlsc_compiler=debug")
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("wmlsc=warn,wmlsc_compiler=warn")
            .with_writer(std::io::stderr)
            .init();
    }

    let result = match &cli.command {
        Command::Compile(args) => run_compile(args),
        Command::Dump { module } => run_dump(module),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run_compile(args: &CompileArgs) -> Result<()> {
    let config = Config::load(args.config.as_deref())?;
    let mut options = config.compiler.clone();
    args.apply(&mut options);

    let source = std::fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let unit: CompilationUnit = serde_json::from_str(&source)
        .with_context(|| format!("{} is not a valid compilation unit", args.input.display()))?;

    let compiled = match Compiler::new(options).compile(&unit) {
        Ok(compiled) => compiled,
        Err(Error::Compilation(diagnostics)) => {
            report(&args.input, &diagnostics);
            let errors = diagnostics.iter().filter(|d| d.is_error()).count();
            anyhow::bail!("{} failed to compile ({errors} error(s))", args.input.display());
        }
        Err(e) => return Err(e.into()),
    };
    report(&args.input, &compiled.diagnostics);

    for listing in &compiled.listings {
        if let Some(symbolic) = &listing.symbolic {
            println!("{} {}:", "symbolic".cyan(), listing.name.bold());
            print!("{symbolic}");
        }
        if let Some(assembler) = &listing.assembler {
            println!("{} {}:", "assembler".cyan(), listing.name.bold());
            print!("{assembler}");
        }
    }

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension(config.output_extension()));
    let bytes = compiled.to_bytes()?;
    std::fs::write(&output, &bytes)
        .with_context(|| format!("failed to write {}", output.display()))?;
    tracing::info!(output = %output.display(), bytes = bytes.len(), "wrote module");
    Ok(())
}

/// Prints diagnostics as `file:line: severity: message`.
fn report(file: &Path, diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        let severity = match diagnostic.severity {
            Severity::Error => "error".red().bold().to_string(),
            Severity::Warning => "warning".yellow().bold().to_string(),
        };
        eprintln!(
            "{}:{}: {}: {}",
            file.display(),
            diagnostic.line,
            severity,
            diagnostic.kind
        );
    }
}

fn run_dump(path: &Path) -> Result<()> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let module = wmlsc_compiler::decode(&bytes)
        .with_context(|| format!("{} is not a valid module", path.display()))?;

    println!("{}", "constants".cyan().bold());
    for (index, constant) in module.constants().iter().enumerate() {
        println!("  {index:>5}  {constant}");
    }

    println!("{}", "pragmas".cyan().bold());
    for pragma in module.pragmas() {
        println!("  {pragma:?}");
    }

    println!("{}", "functions".cyan().bold());
    let ctx = DisasmContext {
        module: &module,
        registry: &StandardLibrary,
    };
    for (index, function) in module.functions().iter().enumerate() {
        let name = function.name.as_deref().unwrap_or("<local>");
        println!(
            "  {index}: {} (args {}, locals {}, {} bytes)",
            name.bold(),
            function.arguments,
            function.locals,
            function.code.len()
        );
        // The function pool never exceeds 255 entries.
        let listing = disasm::render_function(&ctx, index as u8)?;
        for line in listing.lines() {
            println!("    {line}");
        }
    }
    Ok(())
}
