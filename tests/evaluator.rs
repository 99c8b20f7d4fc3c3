//! Language-semantics coverage for the tree-walking evaluator.

mod common;

use std::sync::Arc;

use common::{check_run, check_runtime_error, parse, run_program, Expected};
use parking_lot::Mutex;
use zylo_lang::diagnostics::ErrorCode;
use zylo_lang::interpreter::{Interpreter, OutputSink};
use zylo_lang::optimizer::optimize;

#[test]
fn string_concatenation_stringifies_numbers() {
    check_run(
        "show.log(\"a\" + 1)\nshow.log(2.5 + \"x\")\nshow.log(\"l\" + \"r\")",
        Expected {
            stdout: "a1\n2.5x\nlr\n",
        },
    );
}

#[test]
fn integer_arithmetic_stays_integral() {
    check_run(
        "a := 7\nb := 2\nshow.log(a / b)\nshow.log(a % b)\nshow.log(a * b + 1)",
        Expected {
            stdout: "3\n1\n15\n",
        },
    );
}

#[test]
fn floor_division_and_power() {
    check_run(
        "show.log(7 // 2)\nshow.log(-7 // 2)\nshow.log(2 ** 10)\nshow.log(2.0 ** 0.5)",
        Expected {
            stdout: format!("3\n-4\n1024\n{}\n", 2.0f64.powf(0.5)).leak(),
        },
    );
}

#[test]
fn division_by_zero_is_a_runtime_error() {
    check_runtime_error("x := 1\nshow.log(x / 0)", "division by zero");
}

#[test]
fn float_division_by_zero_is_a_runtime_error() {
    check_runtime_error("x := 1.0\nshow.log(x / 0.0)", "division by zero");
}

#[test]
fn logical_operators_short_circuit_and_yield_bools() {
    check_run(
        "show.log(0 or 2)\nshow.log(1 and 0)\nshow.log(not \"\")\nfunc boom() { show.log(\"side effect\")\nreturn true }\nx := false and boom()\nshow.log(x)",
        Expected {
            stdout: "true\nfalse\ntrue\nfalse\n",
        },
    );
}

#[test]
fn while_loop_with_break_and_continue() {
    check_run(
        "i := 0\nwhile true {\n    i += 1\n    if i == 2 { continue }\n    if i > 4 { break }\n    show.log(i)\n}",
        Expected {
            stdout: "1\n3\n4\n",
        },
    );
}

#[test]
fn c_style_for_loop() {
    check_run(
        "for i := 0; i < 3; i += 1 { show.log(i) }",
        Expected {
            stdout: "0\n1\n2\n",
        },
    );
}

#[test]
fn for_in_iterates_lists_and_strings() {
    check_run(
        "for x in [10, 20] { show.log(x) }\nfor c in \"ab\" { print(c) }",
        Expected {
            stdout: "10\n20\nab",
        },
    );
}

#[test]
fn range_produces_a_half_open_list() {
    check_run(
        "r := 1..4\nshow.log(r)\nfor i in 5..5 { show.log(i) }",
        Expected {
            stdout: "[1, 2, 3]\n",
        },
    );
}

#[test]
fn closures_capture_their_environment_by_reference() {
    check_run(
        "func counter() {\n    count := 0\n    return func() {\n        count = count + 1\n        return count\n    }\n}\nc := counter()\nshow.log(c())\nshow.log(c())\nshow.log(c())",
        Expected {
            stdout: "1\n2\n3\n",
        },
    );
}

#[test]
fn arrow_functions_are_first_class() {
    check_run(
        "double := x => x * 2\napply := (f, v) => f(v)\nshow.log(apply(double, 21))",
        Expected { stdout: "42\n" },
    );
}

#[test]
fn typed_bindings_coerce_their_initialiser() {
    check_run(
        "x int := \"42\"\nshow.log(x + 1)\ny string := 7\nshow.log(y + \"!\")\nz float := 1\nshow.log(z)",
        Expected {
            stdout: "43\n7!\n1\n",
        },
    );
}

#[test]
fn failed_coercion_is_a_runtime_error() {
    check_runtime_error("x int := \"not a number\"", "cannot parse");
}

#[test]
fn as_cast_converts_values() {
    check_run(
        "show.log(\"5\" as int + 1)\nshow.log(3 as string + \"!\")\nshow.log(0 as bool)",
        Expected {
            stdout: "6\n3!\nfalse\n",
        },
    );
}

#[test]
fn malformed_cast_is_a_runtime_error() {
    check_runtime_error("x := \"abc\" as int", "cannot parse");
}

#[test]
fn map_literals_preserve_insertion_order() {
    check_run(
        "m := {\"b\": 1, \"a\": 2}\nshow.log(m)\nshow.log(m[\"a\"])\nshow.log(m[\"missing\"])",
        Expected {
            stdout: "{b: 1, a: 2}\n2\nnull\n",
        },
    );
}

#[test]
fn empty_collections_have_length_zero() {
    check_run(
        "show.log(len([]))\nshow.log(len({}))\nshow.log(len(\"\"))",
        Expected {
            stdout: "0\n0\n0\n",
        },
    );
}

#[test]
fn negative_index_boundaries() {
    check_run(
        "xs := [1, 2, 3]\nshow.log(xs[-1])\nshow.log(xs[-3])",
        Expected { stdout: "3\n1\n" },
    );
    check_runtime_error("xs := [1, 2, 3]\nshow.log(xs[-4])", "out of range");
}

#[test]
fn string_indexing_and_slicing() {
    check_run(
        "s := \"hello\"\nshow.log(s[1])\nshow.log(s[1:4])\nshow.log(s[:2])",
        Expected {
            stdout: "e\nell\nhe\n",
        },
    );
}

#[test]
fn index_assignment_mutates_collections() {
    check_run(
        "xs := [1, 2, 3]\nxs[0] = 9\nxs[-1] = 7\nshow.log(xs)\nm := {\"k\": 1}\nm[\"k\"] = 2\nm[\"n\"] = 3\nshow.log(m)",
        Expected {
            stdout: "[9, 2, 7]\n{k: 2, n: 3}\n",
        },
    );
}

#[test]
fn compound_assignment_reduces_to_read_op_write() {
    check_run(
        "x := 10\nx += 5\nx -= 3\nx *= 2\nx /= 4\nshow.log(x)",
        Expected { stdout: "6\n" },
    );
}

#[test]
fn list_methods_mutate_and_derive() {
    check_run(
        "xs := [3, 1, 2]\nxs.push(4)\nshow.log(len(xs))\nshow.log(xs.sort())\nshow.log(xs.includes(3))\nshow.log(xs.index_of(99))\nshow.log(xs.pop())",
        Expected {
            stdout: "4\n[1, 2, 3, 4]\ntrue\n-1\n4\n",
        },
    );
}

#[test]
fn membership_operator() {
    check_run(
        "show.log(2 in [1, 2])\nshow.log(\"k\" in {\"k\": 1})\nshow.log(\"ell\" in \"hello\")\nshow.log(9 in [1, 2])",
        Expected {
            stdout: "true\ntrue\ntrue\nfalse\n",
        },
    );
}

#[test]
fn switch_selects_the_first_matching_case() {
    check_run(
        "x := 2\nswitch x {\n    case 1: show.log(\"one\")\n    case 2: show.log(\"two\")\n    default: show.log(\"many\")\n}\nswitch 99 {\n    case 1: show.log(\"one\")\n    default: show.log(\"default\")\n}",
        Expected {
            stdout: "two\ndefault\n",
        },
    );
}

#[test]
fn match_with_literal_type_and_binder_patterns() {
    check_run(
        "func describe(v) {\n    match v {\n        case 0 { return \"zero\" }\n        case int n { return \"int \" + string(n) }\n        case string s { return \"str \" + s }\n        case other { return \"other\" }\n    }\n    return \"?\"\n}\nshow.log(describe(0))\nshow.log(describe(7))\nshow.log(describe(\"hi\"))\nshow.log(describe(true))",
        Expected {
            stdout: "zero\nint 7\nstr hi\nother\n",
        },
    );
}

#[test]
fn template_strings_interpolate_expressions() {
    check_run(
        "name := \"Zylo\"\nshow.log(`hello ${name}, ${1 + 1}!`)",
        Expected {
            stdout: "hello Zylo, 2!\n",
        },
    );
}

#[test]
fn try_catch_binds_the_message_and_finally_always_runs() {
    check_run(
        "try {\n    throw \"boom\"\n} catch e {\n    show.log(\"caught\", e)\n} finally {\n    show.log(\"finally\")\n}",
        Expected {
            stdout: "caught boom\nfinally\n",
        },
    );
}

#[test]
fn finally_runs_on_the_error_path_too() {
    let (stdout, result) = run_program("try {\n    throw \"bad\"\n} finally {\n    show.log(\"cleanup\")\n}");
    assert_eq!(stdout, "cleanup\n");
    assert!(result.is_err());
}

#[test]
fn throwing_a_non_string_raises_a_generic_message() {
    check_runtime_error("throw 42", "thrown exception");
}

#[test]
fn classes_with_fields_constructor_and_methods() {
    check_run(
        "class Point {\n    x int = 0\n    y int = 0\n    init(x, y) {\n        this.x = x\n        this.y = y\n    }\n    sum() { return this.x + this.y }\n}\np := Point(3, 4)\nshow.log(p.sum())\np.x = 10\nshow.log(p.sum())",
        Expected {
            stdout: "7\n14\n",
        },
    );
}

#[test]
fn inheritance_and_super_dispatch() {
    check_run(
        "class Animal {\n    name string = \"?\"\n    init(name) { this.name = name }\n    speak() { return this.name + \" makes a sound\" }\n}\nclass Dog extends Animal {\n    speak() { return super.speak() + \": woof\" }\n}\nd := Dog(\"Rex\")\nshow.log(d.speak())",
        Expected {
            stdout: "Rex makes a sound: woof\n",
        },
    );
}

#[test]
fn field_defaults_are_fresh_per_instance() {
    check_run(
        "class Bag {\n    items list = []\n}\na := Bag()\nb := Bag()\na.items.push(1)\nshow.log(len(a.items))\nshow.log(len(b.items))",
        Expected {
            stdout: "1\n0\n",
        },
    );
}

#[test]
fn async_calls_return_futures_resolved_by_await() {
    check_run(
        "async func work(x) { return x * 2 }\nf := work(21)\nshow.log(await f)",
        Expected { stdout: "42\n" },
    );
}

#[test]
fn a_future_can_only_be_awaited_once() {
    check_runtime_error(
        "async func one() { return 1 }\nf := one()\na := await f\nb := await f",
        "already awaited",
    );
}

#[test]
fn spawned_blocks_run_in_the_background() {
    let (_, result) = run_program("done := 0\nspawn { x := 1 + 1 }\nshow.log(\"spawned\")");
    assert!(result.is_ok());
}

#[test]
fn await_synchronises_with_the_producing_task() {
    check_run(
        "async func produce() {\n    return [1, 2, 3]\n}\nf := produce()\nitems := await f\nshow.log(items[-1])",
        Expected { stdout: "3\n" },
    );
}

#[test]
fn recursion_limit_reports_a_stack_overflow_error() {
    let program = optimize(parse("func f() { return f() }\nf()"));
    let buffer = Arc::new(Mutex::new(Vec::<u8>::new()));
    let sink: OutputSink = buffer.clone();
    let mut interpreter = Interpreter::with_output(sink).with_limits(500, 200);
    let error = interpreter.run(&program).expect_err("expected an error");
    assert_eq!(error.code, ErrorCode::StackOverflow);
    assert!(error.message.contains("stack overflow"));
}

#[test]
fn imported_modules_expose_their_members() {
    check_run(
        "import math\nshow.log(math.floor(3.7))\nshow.log(math.gcd(12, 18))\nimport string\nshow.log(string.to_upper(\"abc\"))\nimport json\nshow.log(json.stringify({\"a\": [1, 2]}))",
        Expected {
            stdout: "3\n6\nABC\n{\"a\":[1,2]}\n",
        },
    );
}

#[test]
fn json_round_trip() {
    check_run(
        "import json\nv := json.parse(\"{\\\"x\\\": 1, \\\"y\\\": [true, null]}\")\nshow.log(v[\"x\"])\nshow.log(v[\"y\"])",
        Expected {
            stdout: "1\n[true, null]\n",
        },
    );
}

#[test]
fn shadowing_in_nested_blocks() {
    check_run(
        "x := 1\n{\n    x := 2\n    show.log(x)\n}\nshow.log(x)",
        Expected { stdout: "2\n1\n" },
    );
}

#[test]
fn sets_deduplicate_their_elements() {
    check_run("s := {1, 2, 2, 3}\nshow.log(len(s))", Expected { stdout: "3\n" });
}

#[test]
fn integer_overflow_wraps() {
    check_run(
        &format!("x := {}\nshow.log(x + 1)", i64::MAX),
        Expected {
            stdout: format!("{}\n", i64::MIN).leak(),
        },
    );
}
