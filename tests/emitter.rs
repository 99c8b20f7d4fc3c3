//! Shape checks on the emitted Rust source for the common subset.

mod common;

use common::parse;
use zylo_lang::codegen;
use zylo_lang::optimizer::optimize;
use zylo_lang::typechecker;

fn emit(source: &str) -> String {
    let program = parse(source);
    let (table, diagnostics) = typechecker::analyze(&program);
    assert!(
        diagnostics.iter().all(|d| d.severity != zylo_lang::diagnostics::Severity::Error),
        "semantic errors: {diagnostics:#?}"
    );
    let program = optimize(program);
    codegen::emit_program(&program, &table)
}

#[test]
fn program_skeleton_declares_the_runtime_types() {
    let emitted = emit("show.log(1)");
    assert!(emitted.contains("enum Dyn"));
    assert!(emitted.contains("struct ZyResult"));
    assert!(emitted.contains("fn is_ok(&self)"));
    assert!(emitted.contains("fn is_err(&self)"));
    assert!(emitted.contains("fn unwrap(self)"));
    assert!(emitted.contains("fn zy_index"));
    assert!(emitted.contains("fn main() {"));
}

#[test]
fn folded_binding_emits_a_native_integer() {
    let emitted = emit("x := 5 + 3\nshow.log(x)");
    assert!(emitted.contains("let mut x: i64 = 8i64;"), "emitted:\n{emitted}");
    assert!(emitted.contains("println!(\"{}\", x);"), "emitted:\n{emitted}");
}

#[test]
fn annotated_types_map_to_native_hosts() {
    let emitted = emit("var ratio: float = 0.5\nvar label: string = \"x\"\nvar flag: bool = true");
    assert!(emitted.contains("let mut ratio: f64 = 0.5f64;"));
    assert!(emitted.contains("let mut label: String = String::from(\"x\");"));
    assert!(emitted.contains("let mut flag: bool = true;"));
}

#[test]
fn untyped_collections_use_the_boxed_representation() {
    let emitted = emit("xs := [1, 2]\nshow.log(xs[0])");
    assert!(emitted.contains("let mut xs: Dyn = Dyn::List(vec![Dyn::Int(1i64), Dyn::Int(2i64)]);"));
    assert!(emitted.contains("zy_index(&(xs).clone(), &Dyn::Int(0i64)).unwrap()"));
}

#[test]
fn typed_function_signatures_are_native() {
    let emitted = emit("func add(a int, b int): int { return a + b }\nshow.log(add(1, 2))");
    assert!(
        emitted.contains("fn add(a: i64, b: i64) -> i64 {"),
        "emitted:\n{emitted}"
    );
    assert!(emitted.contains("return (a + b);"));
    assert!(emitted.contains("println!(\"{}\", add(1i64, 2i64));"));
}

#[test]
fn user_main_body_is_flattened_into_host_main() {
    let emitted = emit("func main() { show.log(\"hi\") }");
    assert!(!emitted.contains("fn main() -> "));
    let main_pos = emitted.find("fn main() {").expect("host main");
    let print_pos = emitted.find("println!").expect("print call");
    assert!(print_pos > main_pos);
}

#[test]
fn classes_emit_structs_with_defaults_and_methods() {
    let emitted = emit(
        "class Point {\n    x int = 0\n    init(x int) { this.x = x }\n    get_x(): int { return this.x }\n}\np := Point(3)\nshow.log(p.get_x())",
    );
    assert!(emitted.contains("struct Point {"), "emitted:\n{emitted}");
    assert!(emitted.contains("impl Default for Point {"));
    assert!(emitted.contains("fn new(x: i64) -> Point {"));
    assert!(emitted.contains("fn get_x(&mut self) -> i64 {"));
    assert!(emitted.contains("return self.x;"));
    assert!(emitted.contains("Point::new(3i64)"));
}

#[test]
fn inherited_fields_are_flattened_into_the_subclass() {
    let emitted = emit(
        "class Base {\n    tag int = 1\n}\nclass Derived extends Base {\n    extra int = 2\n}",
    );
    let derived = emitted
        .split("struct Derived {")
        .nth(1)
        .expect("derived struct");
    assert!(derived.contains("tag: i64,"));
    assert!(derived.contains("extra: i64,"));
}

#[test]
fn conditional_expression_is_translated() {
    let emitted = emit("show.log(\"adult\" if 20 >= 18 else \"minor\")");
    // The optimiser folds the comparison, leaving the taken branch shape.
    assert!(emitted.contains("println!"), "emitted:\n{emitted}");
}

#[test]
fn constructs_outside_the_subset_emit_stubs() {
    let emitted = emit("try { show.log(1) } catch e { }\nmatch 1 { case other { } }");
    assert!(emitted.contains("// zylo: unsupported construct 'try/catch' omitted"));
    assert!(emitted.contains("// zylo: unsupported construct 'match' omitted"));
}

#[test]
fn loops_map_structurally() {
    let emitted = emit("for i := 0; i < 3; i += 1 { show.log(i) }\nfor x in [1, 2] { show.log(x) }");
    assert!(emitted.contains("while (i < 3i64) {"), "emitted:\n{emitted}");
    assert!(emitted.contains("for x in zy_iter("));
}
