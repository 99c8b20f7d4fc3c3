//! Semantic-analyser diagnostics and symbol-table behaviour.

mod common;

use common::analyze;
use zylo_lang::diagnostics::{ErrorCode, Severity};
use zylo_lang::typechecker::Type;

fn error_codes(source: &str) -> Vec<ErrorCode> {
    analyze(source)
        .1
        .into_iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| d.code)
        .collect()
}

#[test]
fn accepts_a_well_typed_program() {
    let (_, diagnostics) = analyze(
        "func add(a int, b int): int { return a + b }\nx := add(1, 2)\nshow.log(x)",
    );
    assert!(diagnostics.is_empty(), "diagnostics: {diagnostics:#?}");
}

#[test]
fn reports_argument_type_mismatches() {
    assert_eq!(
        error_codes("func add(a int, b int): int { return a + b }\nadd(\"x\", 2)"),
        vec![ErrorCode::TypeMismatch]
    );
}

#[test]
fn reports_arity_mismatches() {
    assert_eq!(
        error_codes("func f(a int) { }\nf(1, 2)"),
        vec![ErrorCode::TypeMismatch]
    );
}

#[test]
fn any_disables_checks_for_that_slot() {
    let (_, diagnostics) = analyze("func f(a) { return a + 1 }\nf(\"whatever\")");
    assert!(diagnostics.is_empty(), "diagnostics: {diagnostics:#?}");
}

#[test]
fn reports_non_numeric_operands() {
    assert_eq!(
        error_codes("x := true - 1"),
        vec![ErrorCode::InvalidOperandTypes]
    );
}

#[test]
fn string_concatenation_is_well_typed() {
    let (_, diagnostics) = analyze("x := \"a\" + 1\ny string := x + 2.5");
    assert!(diagnostics.is_empty(), "diagnostics: {diagnostics:#?}");
}

#[test]
fn reports_non_boolean_conditions() {
    assert_eq!(
        error_codes("if 1 + 2 { show.log(\"?\") }"),
        vec![ErrorCode::InvalidCondition]
    );
}

#[test]
fn reports_break_outside_a_loop() {
    assert_eq!(error_codes("break"), vec![ErrorCode::BreakOutsideLoop]);
    assert_eq!(error_codes("continue"), vec![ErrorCode::BreakOutsideLoop]);
}

#[test]
fn break_inside_a_loop_is_fine() {
    let (_, diagnostics) = analyze("while true { break }");
    assert!(diagnostics.is_empty(), "diagnostics: {diagnostics:#?}");
}

#[test]
fn reports_return_type_mismatches() {
    assert_eq!(
        error_codes("func f(): int { return \"nope\" }"),
        vec![ErrorCode::ReturnTypeMismatch]
    );
    assert_eq!(
        error_codes("func f(): int { return }"),
        vec![ErrorCode::ReturnTypeMismatch]
    );
}

#[test]
fn void_functions_may_not_return_values() {
    assert_eq!(
        error_codes("void func f() { return 1 }"),
        vec![ErrorCode::ReturnTypeMismatch]
    );
}

#[test]
fn constant_redefinition_is_reported() {
    assert_eq!(
        error_codes("MAX := 1\nMAX := 2"),
        vec![ErrorCode::RedefinedConstant]
    );
}

#[test]
fn shadowing_in_a_child_scope_is_allowed() {
    let (_, diagnostics) = analyze("x := 1\n{\n    x := \"shadow\"\n    show.log(x)\n}");
    assert!(diagnostics.is_empty(), "diagnostics: {diagnostics:#?}");
}

#[test]
fn unknown_module_is_reported() {
    assert_eq!(error_codes("import nosuch"), vec![ErrorCode::UnknownModule]);
}

#[test]
fn module_path_imports_warn_instead_of_guessing() {
    let (_, diagnostics) = analyze("import \"lib/util.zylo\"");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].severity, Severity::Warning);
    assert_eq!(diagnostics[0].code, ErrorCode::UnknownModule);
}

#[test]
fn stdlib_module_members_are_typed() {
    let (_, diagnostics) = analyze("import math\nx float := math.sqrt(2.0)\ny int := math.gcd(4, 6)");
    assert!(diagnostics.is_empty(), "diagnostics: {diagnostics:#?}");
    assert_eq!(
        error_codes("import math\nmath.sqrt(\"two\")"),
        vec![ErrorCode::TypeMismatch]
    );
}

#[test]
fn unknown_members_are_reported() {
    assert_eq!(
        error_codes("import math\nmath.sqroot(2.0)"),
        vec![ErrorCode::UndefinedSymbol]
    );
}

#[test]
fn captures_are_recorded_across_function_boundaries() {
    let (table, diagnostics) =
        analyze("outer := 1\nfunc f() {\n    return outer\n}");
    assert!(diagnostics.is_empty(), "diagnostics: {diagnostics:#?}");

    let root = table.root.borrow();
    let function_scope = root
        .children
        .iter()
        .find(|scope| scope.borrow().is_function_boundary)
        .expect("function scope exists");
    assert!(function_scope.borrow().captures.contains("outer"));
}

#[test]
fn number_literals_infer_int_or_float() {
    let (table, _) = analyze("a := 1\nb := 1.5");
    assert_eq!(table.resolve_global("a").map(|s| s.ty), Some(Type::Int));
    assert_eq!(table.resolve_global("b").map(|s| s.ty), Some(Type::Float));
}

#[test]
fn this_outside_a_class_is_reported() {
    assert_eq!(error_codes("x := this"), vec![ErrorCode::UndefinedSymbol]);
}

#[test]
fn class_members_resolve_through_superclasses() {
    let (_, diagnostics) = analyze(
        "class Base {\n    tag int = 1\n    describe(): string { return \"base\" }\n}\nclass Derived extends Base {\n}\nd := Derived()\nshow.log(d.tag)\nshow.log(d.describe())",
    );
    assert!(diagnostics.is_empty(), "diagnostics: {diagnostics:#?}");
}
