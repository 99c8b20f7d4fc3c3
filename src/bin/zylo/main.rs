//! # Zylo
//!
//! This binary is the driver of the Zylo toolchain. It wires the lexer,
//! parser, semantic analyser, optimiser and the chosen back-end (evaluator
//! or Rust emitter) into a single application.

mod cli;

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use log::{error, info};

use zylo_lang::codegen;
use zylo_lang::diagnostics::{Diagnostic, Severity};
use zylo_lang::interpreter::Interpreter;
use zylo_lang::lexer::Lexer;
use zylo_lang::optimizer::optimize;
use zylo_lang::parser::ast::Program;
use zylo_lang::parser::Parser;
use zylo_lang::typechecker::{self, SymbolTable};

use cli::{BuildArgs, Cli, Commands, RunArgs};

fn main() -> ExitCode {
    let args = Cli::init();
    simple_logger::init_with_level((&args.verbosity).into()).expect("logger initialises once");

    let result = match args.command {
        Commands::Run(run) => command_run(&run),
        Commands::Check(check) => command_check(&check),
        Commands::Build(build) => command_build(&build),
    };

    match result {
        Ok(code) => code,
        Err(error) => {
            error!("{error:#}");
            ExitCode::FAILURE
        }
    }
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("could not read file: '{}'", path.to_string_lossy()))
}

/// Lex, parse and analyse a source file. Returns `None` after printing
/// diagnostics when any stage reports errors.
fn front_end(
    source: &str,
    file: &Path,
    dump_parsed: bool,
    dump_typed: bool,
) -> Result<Option<(Program, SymbolTable)>> {
    let tokens = Lexer::new(source).lex();
    let (program, parse_diagnostics) = Parser::new(tokens).parse();

    if dump_parsed {
        info!("parsed AST:\n{}", serde_json::to_string_pretty(&program)?);
    }

    if report(&parse_diagnostics, file) {
        return Ok(None);
    }

    let (table, semantic_diagnostics) = typechecker::analyze(&program);

    if dump_typed {
        info!(
            "symbol table:\n{}",
            serde_json::to_string_pretty(&table.to_json())?
        );
    }

    if report(&semantic_diagnostics, file) {
        return Ok(None);
    }

    Ok(Some((program, table)))
}

/// Print the stage's diagnostics; true when any of them is a hard error.
fn report(diagnostics: &[Diagnostic], file: &Path) -> bool {
    let mut fatal = false;
    for diagnostic in diagnostics {
        let diagnostic = diagnostic.clone().with_file(file.to_string_lossy());
        eprintln!("{diagnostic}");
        fatal |= diagnostic.severity == Severity::Error;
    }
    fatal
}

fn command_run(args: &RunArgs) -> Result<ExitCode> {
    let source = read_source(&args.file)?;
    let Some((program, _table)) = front_end(&source, &args.file, args.dump_parsed, args.dump_typed)?
    else {
        return Ok(ExitCode::FAILURE);
    };

    let program = optimize(program);

    // The evaluator recurses with the program; a roomy stack keeps the
    // depth guards tripping before the host stack does.
    let worker = std::thread::Builder::new()
        .name("zylo-eval".into())
        .stack_size(256 * 1024 * 1024)
        .spawn(move || {
            let mut interpreter = Interpreter::new();
            interpreter.run(&program)
        })
        .context("could not start the evaluator thread")?;

    match worker.join() {
        Ok(Ok(())) => Ok(ExitCode::SUCCESS),
        Ok(Err(runtime_error)) => {
            eprintln!("error: {runtime_error}");
            Ok(ExitCode::FAILURE)
        }
        Err(_) => {
            eprintln!("error: evaluator terminated unexpectedly");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn command_check(args: &RunArgs) -> Result<ExitCode> {
    let source = read_source(&args.file)?;
    match front_end(&source, &args.file, args.dump_parsed, args.dump_typed)? {
        Some(_) => Ok(ExitCode::SUCCESS),
        None => Ok(ExitCode::FAILURE),
    }
}

fn command_build(args: &BuildArgs) -> Result<ExitCode> {
    let source = read_source(&args.file)?;
    let Some((program, table)) = front_end(&source, &args.file, args.dump_parsed, false)? else {
        return Ok(ExitCode::FAILURE);
    };

    let program = optimize(program);
    let emitted = codegen::emit_program(&program, &table);

    fs::write(&args.output, emitted)
        .with_context(|| format!("could not write '{}'", args.output.to_string_lossy()))?;
    info!("wrote {}", args.output.to_string_lossy());
    Ok(ExitCode::SUCCESS)
}
