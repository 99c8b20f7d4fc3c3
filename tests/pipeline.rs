//! End-to-end pipeline scenarios driven through the library.

mod common;

use common::{analyze, check_run, check_runtime_error, Expected};
use zylo_lang::diagnostics::ErrorCode;

#[test]
fn evaluates_folded_arithmetic() {
    check_run("x := 5 + 3\nshow.log(x)", Expected { stdout: "8\n" });
}

#[test]
fn evaluates_recursive_factorial() {
    check_run(
        "func fact(n) { if n <= 1 { return 1 }; return n * fact(n-1) }\nshow.log(fact(5))",
        Expected { stdout: "120\n" },
    );
}

#[test]
fn evaluates_negative_indexing_and_slices() {
    check_run(
        "arr := [1,2,3,4,5]\nshow.log(arr[-1])\nshow.log(arr[1:4])",
        Expected {
            stdout: "5\n[2, 3, 4]\n",
        },
    );
}

#[test]
fn constant_reassignment_is_a_runtime_error() {
    check_runtime_error(
        "NOMBRE := \"Wilson\"\nNOMBRE = \"Pedro\"",
        "no se puede reasignar constante: NOMBRE",
    );
}

#[test]
fn user_main_runs_with_conditional_expression() {
    check_run(
        "func main() { show.log(\"Mayor de edad\" if 20 >= 18 else \"Menor\") }",
        Expected {
            stdout: "Mayor de edad\n",
        },
    );
}

#[test]
fn unknown_identifier_is_a_single_semantic_diagnostic() {
    let (_table, diagnostics) = analyze("show.log(inexistente)");
    assert_eq!(diagnostics.len(), 1, "diagnostics: {diagnostics:#?}");
    let diagnostic = &diagnostics[0];
    assert_eq!(diagnostic.code, ErrorCode::UndefinedSymbol);
    assert_eq!(diagnostic.line, 1);
    assert!(diagnostic.message.contains("inexistente"));
}

#[test]
fn diagnostics_render_in_the_documented_format() {
    let (_table, diagnostics) = analyze("show.log(inexistente)");
    let rendered = diagnostics[0].render_plain();
    assert!(
        rendered.starts_with("[ZYLO_ERR_202] Semantic Error: "),
        "unexpected rendering: {rendered}"
    );
    assert!(rendered.contains("Line: 1, Column: "));
}

#[test]
fn parse_and_semantic_stages_accumulate_without_aborting() {
    let source = "a := inexistente\nb := tampoco\nshow.log(a)";
    let (_table, diagnostics) = analyze(source);
    assert_eq!(diagnostics.len(), 2);
    for diagnostic in &diagnostics {
        assert!(diagnostic.line >= 1);
        assert!(diagnostic.column >= 1);
    }
}
