//! Shared helpers for driving the whole pipeline in-process.
#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;

use zylo_lang::diagnostics::{Diagnostic, Severity};
use zylo_lang::interpreter::{Interpreter, OutputSink, RuntimeError};
use zylo_lang::lexer::Lexer;
use zylo_lang::optimizer::optimize;
use zylo_lang::parser::ast::Program;
use zylo_lang::parser::Parser;
use zylo_lang::typechecker::{self, SymbolTable};

pub struct Expected<'a> {
    pub stdout: &'a str,
}

pub fn parse(source: &str) -> Program {
    let tokens = Lexer::new(source).lex();
    let (program, errors) = Parser::new(tokens).parse();
    assert!(errors.is_empty(), "unexpected parse errors: {errors:#?}");
    program
}

pub fn analyze(source: &str) -> (SymbolTable, Vec<Diagnostic>) {
    typechecker::analyze(&parse(source))
}

/// Lex, parse, analyse, optimise and evaluate with a captured output sink.
pub fn run_program(source: &str) -> (String, Result<(), RuntimeError>) {
    let program = parse(source);
    let (_table, diagnostics) = typechecker::analyze(&program);
    let fatal: Vec<&Diagnostic> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    assert!(fatal.is_empty(), "unexpected semantic errors: {fatal:#?}");

    let program = optimize(program);

    let buffer = Arc::new(Mutex::new(Vec::<u8>::new()));
    let sink: OutputSink = buffer.clone();
    let mut interpreter = Interpreter::with_output(sink);
    let result = interpreter.run(&program);

    let output = String::from_utf8(buffer.lock().clone()).expect("captured output is UTF-8");
    (output, result)
}

/// Run a program that is expected to finish cleanly and compare its stdout.
pub fn check_run(source: &str, expected: Expected<'_>) {
    let (stdout, result) = run_program(source);
    if let Err(error) = &result {
        panic!("program failed: {error} (output so far: {stdout:?})");
    }
    assert_eq!(stdout, expected.stdout);
}

/// Run a program expected to stop with a runtime error.
pub fn check_runtime_error(source: &str, message_fragment: &str) {
    let (_, result) = run_program(source);
    match result {
        Ok(()) => panic!("expected a runtime error containing {message_fragment:?}"),
        Err(error) => assert!(
            error.message.contains(message_fragment),
            "error {:?} does not contain {message_fragment:?}",
            error.message
        ),
    }
}
