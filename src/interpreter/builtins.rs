//! Native built-ins and the standard-library module registry.
//!
//! The analyser knows these only by signature (`crate::typechecker::
//! builtins`); the implementations here are the runtime side of the same
//! table. Modules are plain member maps, so `math.sqrt` resolves through
//! ordinary member lookup.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::diagnostics::ErrorCode;
use crate::lexer::Span;
use crate::parser::ast::TypeName;

use super::environment::Environment;
use super::value::{
    shared, BuiltinFn, BuiltinFunction, ModuleValue, OrderedMap, Value,
};
use super::{EvalResult, Interpreter, RuntimeError};

fn builtin(name: &'static str, func: BuiltinFn) -> Value {
    Value::Builtin(BuiltinFunction { name, func })
}

fn module(name: &str, members: Vec<(&str, Value)>) -> Value {
    Value::Module(Arc::new(ModuleValue {
        name: name.into(),
        members: members
            .into_iter()
            .map(|(n, v)| (n.to_owned(), v))
            .collect::<HashMap<_, _>>(),
    }))
}

/// Install the always-available built-ins into the global environment.
pub fn install(globals: &Arc<Environment>) {
    globals.define(
        "show",
        module("show", vec![("log", builtin("show.log", show_log))]),
        true,
        None,
    );
    globals.define(
        "read",
        module(
            "read",
            vec![
                ("line", builtin("read.line", read_line)),
                ("int", builtin("read.int", read_int)),
            ],
        ),
        true,
        None,
    );

    globals.define("print", builtin("print", print), true, None);
    globals.define("println", builtin("println", println), true, None);
    globals.define("len", builtin("len", len), true, None);
    globals.define("split", builtin("split", split), true, None);
    globals.define("to_number", builtin("to_number", to_number), true, None);
    globals.define("string", builtin("string", convert_string), true, None);
    globals.define("int", builtin("int", convert_int), true, None);
    globals.define("float", builtin("float", convert_float), true, None);
    globals.define("bool", builtin("bool", convert_bool), true, None);

    globals.define("Add", builtin("Add", arith_add), true, None);
    globals.define("Subtract", builtin("Subtract", arith_subtract), true, None);
    globals.define("Multiply", builtin("Multiply", arith_multiply), true, None);
    globals.define("Divide", builtin("Divide", arith_divide), true, None);
}

// ----------------------------------------------------------------------
// argument plumbing

fn wrong_arity(name: &str, expected: usize, found: usize, span: &Span) -> RuntimeError {
    RuntimeError::new(
        ErrorCode::NotCallable,
        format!("{name} expects {expected} argument(s), found {found}"),
        span,
    )
}

fn expect_args<const N: usize>(
    name: &str,
    args: Vec<Value>,
    span: &Span,
) -> EvalResult<[Value; N]> {
    let found = args.len();
    args.try_into().map_err(|_| wrong_arity(name, N, found, span))
}

fn as_string(name: &str, value: &Value, span: &Span) -> EvalResult<String> {
    match value {
        Value::String(text) => Ok(text.clone()),
        other => Err(RuntimeError::new(
            ErrorCode::InvalidCast,
            format!("{name} expects a string, found {}", other.type_name()),
            span,
        )),
    }
}

fn as_int(name: &str, value: &Value, span: &Span) -> EvalResult<i64> {
    match value {
        Value::Integer(v) => Ok(*v),
        other => Err(RuntimeError::new(
            ErrorCode::InvalidCast,
            format!("{name} expects an int, found {}", other.type_name()),
            span,
        )),
    }
}

fn as_float(name: &str, value: &Value, span: &Span) -> EvalResult<f64> {
    match value {
        Value::Integer(v) => Ok(*v as f64),
        Value::Float(v) => Ok(*v),
        other => Err(RuntimeError::new(
            ErrorCode::InvalidCast,
            format!("{name} expects a number, found {}", other.type_name()),
            span,
        )),
    }
}

// ----------------------------------------------------------------------
// core built-ins

fn show_log(interp: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let rendered = args
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    write_output(interp, format!("{rendered}\n"), span)?;
    Ok(Value::Null)
}

fn println(interp: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    show_log(interp, args, span)
}

fn print(interp: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [value] = expect_args::<1>("print", args, span)?;
    write_output(interp, value.to_string(), span)?;
    Ok(Value::Null)
}

fn write_output(interp: &mut Interpreter, text: String, span: &Span) -> EvalResult<()> {
    let output = interp.output();
    let mut sink = output.lock();
    sink.write_all(text.as_bytes()).map_err(|error| {
        RuntimeError::new(ErrorCode::UncaughtThrow, format!("write failed: {error}"), span)
    })
}

fn read_line(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [] = expect_args::<0>("read.line", args, span)?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).map_err(|error| {
        RuntimeError::new(ErrorCode::UncaughtThrow, format!("read failed: {error}"), span)
    })?;
    let line = line.trim_end_matches(['\n', '\r']).to_owned();
    Ok(Value::String(line))
}

fn read_int(interp: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let line = read_line(interp, args, span)?;
    let Value::String(text) = &line else {
        unreachable!("read.line always yields a string");
    };
    text.trim().parse::<i64>().map(Value::Integer).map_err(|_| {
        RuntimeError::new(
            ErrorCode::InvalidCast,
            format!("cannot parse '{}' as int", text.trim()),
            span,
        )
    })
}

fn len(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [value] = expect_args::<1>("len", args, span)?;
    let length = match &value {
        Value::String(text) => text.chars().count(),
        Value::List(values) => values.lock().len(),
        Value::Map(map) => map.lock().len(),
        other => {
            return Err(RuntimeError::new(
                ErrorCode::InvalidCast,
                format!("len expects a list, map or string, found {}", other.type_name()),
                span,
            ))
        }
    };
    Ok(Value::Integer(length as i64))
}

fn split(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [text, separator] = expect_args::<2>("split", args, span)?;
    let text = as_string("split", &text, span)?;
    let separator = as_string("split", &separator, span)?;
    Ok(split_text(&text, &separator))
}

fn split_text(text: &str, separator: &str) -> Value {
    let parts: Vec<Value> = if separator.is_empty() {
        text.chars().map(|c| Value::String(c.to_string())).collect()
    } else {
        text.split(separator)
            .map(|part| Value::String(part.to_owned()))
            .collect()
    };
    Value::List(shared(parts))
}

fn to_number(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [value] = expect_args::<1>("to_number", args, span)?;
    let text = as_string("to_number", &value, span)?;
    text.trim().parse::<f64>().map(Value::Float).map_err(|_| {
        RuntimeError::new(
            ErrorCode::InvalidCast,
            format!("cannot parse '{}' as number", text.trim()),
            span,
        )
    })
}

fn convert_string(interp: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [value] = expect_args::<1>("string", args, span)?;
    interp.coerce(value, &TypeName::String, span)
}

fn convert_int(interp: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [value] = expect_args::<1>("int", args, span)?;
    interp.coerce(value, &TypeName::Int, span)
}

fn convert_float(interp: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [value] = expect_args::<1>("float", args, span)?;
    interp.coerce(value, &TypeName::Float, span)
}

fn convert_bool(interp: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [value] = expect_args::<1>("bool", args, span)?;
    interp.coerce(value, &TypeName::Bool, span)
}

fn arith(
    name: &'static str,
    op: fn(f64, f64) -> f64,
    int_op: fn(i64, i64) -> Option<i64>,
) -> impl Fn(&mut Interpreter, Vec<Value>, &Span) -> EvalResult<Value> {
    move |_, args, span| {
        let [left, right] = expect_args::<2>(name, args, span)?;
        if let (Value::Integer(l), Value::Integer(r)) = (&left, &right) {
            if let Some(value) = int_op(*l, *r) {
                return Ok(Value::Integer(value));
            }
        }
        let l = as_float(name, &left, span)?;
        let r = as_float(name, &right, span)?;
        Ok(Value::Float(op(l, r)))
    }
}

fn arith_add(interp: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    arith("Add", |l, r| l + r, |l, r| Some(l.wrapping_add(r)))(interp, args, span)
}

fn arith_subtract(interp: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    arith("Subtract", |l, r| l - r, |l, r| Some(l.wrapping_sub(r)))(interp, args, span)
}

fn arith_multiply(interp: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    arith("Multiply", |l, r| l * r, |l, r| Some(l.wrapping_mul(r)))(interp, args, span)
}

fn arith_divide(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [left, right] = expect_args::<2>("Divide", args, span)?;
    let l = as_float("Divide", &left, span)?;
    let r = as_float("Divide", &right, span)?;
    if r == 0.0 {
        return Err(RuntimeError::new(
            ErrorCode::DivisionByZero,
            "division by zero",
            span,
        ));
    }
    if let (Value::Integer(li), Value::Integer(ri)) = (&left, &right) {
        return Ok(Value::Integer(li.wrapping_div(*ri)));
    }
    Ok(Value::Float(l / r))
}

// ----------------------------------------------------------------------
// standard-library modules

pub fn stdlib_module_value(name: &str) -> Option<Value> {
    let value = match name {
        "math" => module(
            "math",
            vec![
                ("PI", Value::Float(std::f64::consts::PI)),
                ("E", Value::Float(std::f64::consts::E)),
                ("TAU", Value::Float(std::f64::consts::TAU)),
                ("PHI", Value::Float(1.618_033_988_749_895)),
                ("sqrt", builtin("math.sqrt", math_sqrt)),
                ("power", builtin("math.power", math_power)),
                ("abs", builtin("math.abs", math_abs)),
                ("floor", builtin("math.floor", math_floor)),
                ("ceil", builtin("math.ceil", math_ceil)),
                ("round", builtin("math.round", math_round)),
                ("sin", builtin("math.sin", math_sin)),
                ("cos", builtin("math.cos", math_cos)),
                ("tan", builtin("math.tan", math_tan)),
                ("factorial", builtin("math.factorial", math_factorial)),
                ("gcd", builtin("math.gcd", math_gcd)),
                ("lcm", builtin("math.lcm", math_lcm)),
                ("is_prime", builtin("math.is_prime", math_is_prime)),
                (
                    "fibonacci_iterative",
                    builtin("math.fibonacci_iterative", math_fibonacci),
                ),
                (
                    "degrees_to_radians",
                    builtin("math.degrees_to_radians", math_deg_to_rad),
                ),
                (
                    "radians_to_degrees",
                    builtin("math.radians_to_degrees", math_rad_to_deg),
                ),
                ("clamp", builtin("math.clamp", math_clamp)),
                ("lerp", builtin("math.lerp", math_lerp)),
                ("map_range", builtin("math.map_range", math_map_range)),
                ("add", builtin("math.add", arith_add)),
                ("subtract", builtin("math.subtract", arith_subtract)),
                ("multiply", builtin("math.multiply", arith_multiply)),
                ("divide", builtin("math.divide", arith_divide)),
            ],
        ),
        "string" => module(
            "string",
            vec![
                ("split", builtin("string.split", split)),
                ("join", builtin("string.join", string_join)),
                ("substring", builtin("string.substring", string_substring)),
                ("replace", builtin("string.replace", string_replace)),
                ("trim", builtin("string.trim", string_trim)),
                ("to_upper", builtin("string.to_upper", string_to_upper)),
                ("to_lower", builtin("string.to_lower", string_to_lower)),
                ("contains", builtin("string.contains", string_contains)),
                ("starts_with", builtin("string.starts_with", string_starts_with)),
                ("ends_with", builtin("string.ends_with", string_ends_with)),
            ],
        ),
        "json" => module(
            "json",
            vec![
                ("parse", builtin("json.parse", json_parse)),
                ("stringify", builtin("json.stringify", json_stringify)),
            ],
        ),
        "io" => module(
            "io",
            vec![
                ("read_file", builtin("io.read_file", io_read_file)),
                ("write_file", builtin("io.write_file", io_write_file)),
                ("read_line", builtin("io.read_line", read_line)),
            ],
        ),
        "time" => module(
            "time",
            vec![
                ("now", builtin("time.now", time_now)),
                ("parse", builtin("time.parse", time_parse)),
                ("format", builtin("time.format", time_format)),
                ("add_days", builtin("time.add_days", time_add_days)),
                ("add_hours", builtin("time.add_hours", time_add_hours)),
                ("diff_days", builtin("time.diff_days", time_diff_days)),
            ],
        ),
        "list" => module(
            "list",
            vec![
                ("push", builtin("list.push", list_push)),
                ("pop", builtin("list.pop", list_pop)),
                ("shift", builtin("list.shift", list_shift)),
                ("unshift", builtin("list.unshift", list_unshift)),
                ("slice", builtin("list.slice", list_slice)),
                ("sort", builtin("list.sort", list_sort)),
                ("reverse", builtin("list.reverse", list_reverse)),
                ("concat", builtin("list.concat", list_concat)),
                ("includes", builtin("list.includes", list_includes)),
                ("index_of", builtin("list.index_of", list_index_of)),
            ],
        ),
        "map" => module(
            "map",
            vec![
                ("set", builtin("map.set", map_set)),
                ("get", builtin("map.get", map_get)),
                ("has", builtin("map.has", map_has)),
                ("delete", builtin("map.delete", map_delete)),
                ("clear", builtin("map.clear", map_clear)),
                ("keys", builtin("map.keys", map_keys)),
                ("values", builtin("map.values", map_values)),
                ("entries", builtin("map.entries", map_entries)),
                ("size", builtin("map.size", map_size)),
            ],
        ),
        _ => return None,
    };
    Some(value)
}

// ----------------------------------------------------------------------
// collection methods: `xs.push(1)`, `m.keys()`, `s.trim()`

pub fn collection_method(
    interp: &mut Interpreter,
    receiver: &Value,
    method: &str,
    args: Vec<Value>,
    span: &Span,
) -> EvalResult<Value> {
    // Method-call form delegates to the module functions with the receiver
    // inserted as the first argument.
    let module_name = match receiver {
        Value::List(_) => "list",
        Value::Map(_) => "map",
        Value::String(_) => "string",
        other => {
            return Err(RuntimeError::new(
                ErrorCode::NotCallable,
                format!("cannot call method '{method}' on {}", other.type_name()),
                span,
            ))
        }
    };
    let module = stdlib_module_value(module_name).expect("collection modules always exist");
    let Value::Module(module) = module else {
        unreachable!("stdlib_module_value returns modules");
    };
    let Some(Value::Builtin(function)) = module.members.get(method) else {
        return Err(RuntimeError::new(
            ErrorCode::UndefinedVariable,
            format!("unknown method '{method}' on {}", receiver.type_name()),
            span,
        ));
    };

    let mut full_args = Vec::with_capacity(args.len() + 1);
    full_args.push(receiver.clone());
    full_args.extend(args);
    (function.func)(interp, full_args, span)
}

// ----------------------------------------------------------------------
// math

fn math_unary(
    name: &'static str,
    op: fn(f64) -> f64,
) -> impl Fn(&mut Interpreter, Vec<Value>, &Span) -> EvalResult<Value> {
    move |_, args, span| {
        let [value] = expect_args::<1>(name, args, span)?;
        Ok(Value::Float(op(as_float(name, &value, span)?)))
    }
}

fn math_sqrt(interp: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    math_unary("math.sqrt", f64::sqrt)(interp, args, span)
}

fn math_sin(interp: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    math_unary("math.sin", f64::sin)(interp, args, span)
}

fn math_cos(interp: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    math_unary("math.cos", f64::cos)(interp, args, span)
}

fn math_tan(interp: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    math_unary("math.tan", f64::tan)(interp, args, span)
}

fn math_deg_to_rad(interp: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    math_unary("math.degrees_to_radians", f64::to_radians)(interp, args, span)
}

fn math_rad_to_deg(interp: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    math_unary("math.radians_to_degrees", f64::to_degrees)(interp, args, span)
}

fn math_power(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [base, exponent] = expect_args::<2>("math.power", args, span)?;
    let base = as_float("math.power", &base, span)?;
    let exponent = as_float("math.power", &exponent, span)?;
    Ok(Value::Float(base.powf(exponent)))
}

fn math_abs(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [value] = expect_args::<1>("math.abs", args, span)?;
    match value {
        Value::Integer(v) => Ok(Value::Integer(v.wrapping_abs())),
        other => Ok(Value::Float(as_float("math.abs", &other, span)?.abs())),
    }
}

fn math_floor(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [value] = expect_args::<1>("math.floor", args, span)?;
    Ok(Value::Integer(
        as_float("math.floor", &value, span)?.floor() as i64
    ))
}

fn math_ceil(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [value] = expect_args::<1>("math.ceil", args, span)?;
    Ok(Value::Integer(as_float("math.ceil", &value, span)?.ceil() as i64))
}

fn math_round(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [value] = expect_args::<1>("math.round", args, span)?;
    Ok(Value::Integer(
        as_float("math.round", &value, span)?.round() as i64
    ))
}

fn math_factorial(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [value] = expect_args::<1>("math.factorial", args, span)?;
    let n = as_int("math.factorial", &value, span)?;
    if n < 0 {
        return Err(RuntimeError::new(
            ErrorCode::InvalidCast,
            "factorial of a negative number",
            span,
        ));
    }
    let mut result: i64 = 1;
    for factor in 2..=n {
        result = result.wrapping_mul(factor);
    }
    Ok(Value::Integer(result))
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.wrapping_abs(), b.wrapping_abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn math_gcd(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [a, b] = expect_args::<2>("math.gcd", args, span)?;
    Ok(Value::Integer(gcd(
        as_int("math.gcd", &a, span)?,
        as_int("math.gcd", &b, span)?,
    )))
}

fn math_lcm(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [a, b] = expect_args::<2>("math.lcm", args, span)?;
    let a = as_int("math.lcm", &a, span)?;
    let b = as_int("math.lcm", &b, span)?;
    if a == 0 || b == 0 {
        return Ok(Value::Integer(0));
    }
    Ok(Value::Integer((a / gcd(a, b)).wrapping_mul(b).wrapping_abs()))
}

fn math_is_prime(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [value] = expect_args::<1>("math.is_prime", args, span)?;
    let n = as_int("math.is_prime", &value, span)?;
    if n < 2 {
        return Ok(Value::Boolean(false));
    }
    let mut candidate = 2i64;
    while candidate.saturating_mul(candidate) <= n {
        if n % candidate == 0 {
            return Ok(Value::Boolean(false));
        }
        candidate += 1;
    }
    Ok(Value::Boolean(true))
}

fn math_fibonacci(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [value] = expect_args::<1>("math.fibonacci_iterative", args, span)?;
    let n = as_int("math.fibonacci_iterative", &value, span)?;
    let (mut a, mut b) = (0i64, 1i64);
    for _ in 0..n.max(0) {
        (a, b) = (b, a.wrapping_add(b));
    }
    Ok(Value::Integer(a))
}

fn math_clamp(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [value, low, high] = expect_args::<3>("math.clamp", args, span)?;
    let value = as_float("math.clamp", &value, span)?;
    let low = as_float("math.clamp", &low, span)?;
    let high = as_float("math.clamp", &high, span)?;
    Ok(Value::Float(value.clamp(low, high)))
}

fn math_lerp(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [a, b, t] = expect_args::<3>("math.lerp", args, span)?;
    let a = as_float("math.lerp", &a, span)?;
    let b = as_float("math.lerp", &b, span)?;
    let t = as_float("math.lerp", &t, span)?;
    Ok(Value::Float(a + (b - a) * t))
}

fn math_map_range(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [value, in_low, in_high, out_low, out_high] =
        expect_args::<5>("math.map_range", args, span)?;
    let value = as_float("math.map_range", &value, span)?;
    let in_low = as_float("math.map_range", &in_low, span)?;
    let in_high = as_float("math.map_range", &in_high, span)?;
    let out_low = as_float("math.map_range", &out_low, span)?;
    let out_high = as_float("math.map_range", &out_high, span)?;
    if in_high == in_low {
        return Err(RuntimeError::new(
            ErrorCode::DivisionByZero,
            "map_range with an empty input range",
            span,
        ));
    }
    let t = (value - in_low) / (in_high - in_low);
    Ok(Value::Float(out_low + (out_high - out_low) * t))
}

// ----------------------------------------------------------------------
// string

fn string_join(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [values, separator] = expect_args::<2>("string.join", args, span)?;
    let Value::List(values) = &values else {
        return Err(RuntimeError::new(
            ErrorCode::InvalidCast,
            format!("string.join expects a list, found {}", values.type_name()),
            span,
        ));
    };
    let separator = as_string("string.join", &separator, span)?;
    let joined = values
        .lock()
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(&separator);
    Ok(Value::String(joined))
}

fn string_substring(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [text, from, to] = expect_args::<3>("string.substring", args, span)?;
    let text = as_string("string.substring", &text, span)?;
    let from = as_int("string.substring", &from, span)?;
    let to = as_int("string.substring", &to, span)?;
    let chars: Vec<char> = text.chars().collect();
    let length = chars.len() as i64;
    let clamp = |bound: i64| {
        let bound = if bound < 0 { bound + length } else { bound };
        bound.clamp(0, length) as usize
    };
    let (from, to) = (clamp(from), clamp(to));
    Ok(Value::String(chars[from..from.max(to)].iter().collect()))
}

fn string_replace(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [text, from, to] = expect_args::<3>("string.replace", args, span)?;
    let text = as_string("string.replace", &text, span)?;
    let from = as_string("string.replace", &from, span)?;
    let to = as_string("string.replace", &to, span)?;
    Ok(Value::String(text.replace(&from, &to)))
}

fn string_map(
    name: &'static str,
    op: fn(&str) -> String,
) -> impl Fn(&mut Interpreter, Vec<Value>, &Span) -> EvalResult<Value> {
    move |_, args, span| {
        let [text] = expect_args::<1>(name, args, span)?;
        Ok(Value::String(op(&as_string(name, &text, span)?)))
    }
}

fn string_trim(interp: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    string_map("string.trim", |s| s.trim().to_owned())(interp, args, span)
}

fn string_to_upper(interp: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    string_map("string.to_upper", str::to_uppercase)(interp, args, span)
}

fn string_to_lower(interp: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    string_map("string.to_lower", str::to_lowercase)(interp, args, span)
}

fn string_test(
    name: &'static str,
    op: fn(&str, &str) -> bool,
) -> impl Fn(&mut Interpreter, Vec<Value>, &Span) -> EvalResult<Value> {
    move |_, args, span| {
        let [text, needle] = expect_args::<2>(name, args, span)?;
        let text = as_string(name, &text, span)?;
        let needle = as_string(name, &needle, span)?;
        Ok(Value::Boolean(op(&text, &needle)))
    }
}

fn string_contains(interp: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    string_test("string.contains", |t, n| t.contains(n))(interp, args, span)
}

fn string_starts_with(
    interp: &mut Interpreter,
    args: Vec<Value>,
    span: &Span,
) -> EvalResult<Value> {
    string_test("string.starts_with", |t, n| t.starts_with(n))(interp, args, span)
}

fn string_ends_with(interp: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    string_test("string.ends_with", |t, n| t.ends_with(n))(interp, args, span)
}

// ----------------------------------------------------------------------
// json

fn json_parse(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [text] = expect_args::<1>("json.parse", args, span)?;
    let text = as_string("json.parse", &text, span)?;
    let parsed: serde_json::Value = serde_json::from_str(&text).map_err(|error| {
        RuntimeError::new(
            ErrorCode::InvalidCast,
            format!("invalid JSON: {error}"),
            span,
        )
    })?;
    Ok(json_to_value(parsed))
}

fn json_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(value) => Value::Boolean(value),
        serde_json::Value::Number(number) => {
            if let Some(value) = number.as_i64() {
                Value::Integer(value)
            } else {
                Value::Float(number.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(value) => Value::String(value),
        serde_json::Value::Array(values) => {
            Value::List(shared(values.into_iter().map(json_to_value).collect()))
        }
        serde_json::Value::Object(entries) => {
            let mut map = OrderedMap::default();
            for (key, value) in entries {
                map.set(key, json_to_value(value));
            }
            Value::Map(shared(map))
        }
    }
}

fn value_to_json(value: &Value, span: &Span) -> EvalResult<serde_json::Value> {
    let json = match value {
        Value::Null => serde_json::Value::Null,
        Value::Boolean(value) => serde_json::Value::Bool(*value),
        Value::Integer(value) => serde_json::Value::from(*value),
        Value::Float(value) => serde_json::Value::from(*value),
        Value::String(value) => serde_json::Value::String(value.clone()),
        Value::List(values) => {
            let values = values.lock().clone();
            let mut array = Vec::with_capacity(values.len());
            for value in &values {
                array.push(value_to_json(value, span)?);
            }
            serde_json::Value::Array(array)
        }
        Value::Map(map) => {
            let entries = map.lock().clone();
            let mut object = serde_json::Map::new();
            for (key, value) in entries.iter() {
                object.insert(key.clone(), value_to_json(value, span)?);
            }
            serde_json::Value::Object(object)
        }
        other => {
            return Err(RuntimeError::new(
                ErrorCode::InvalidCast,
                format!("cannot serialise {} to JSON", other.type_name()),
                span,
            ))
        }
    };
    Ok(json)
}

fn json_stringify(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [value] = expect_args::<1>("json.stringify", args, span)?;
    let json = value_to_json(&value, span)?;
    Ok(Value::String(json.to_string()))
}

// ----------------------------------------------------------------------
// io

fn io_read_file(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [path] = expect_args::<1>("io.read_file", args, span)?;
    let path = as_string("io.read_file", &path, span)?;
    std::fs::read_to_string(&path)
        .map(Value::String)
        .map_err(|error| {
            RuntimeError::new(
                ErrorCode::UncaughtThrow,
                format!("cannot read '{path}': {error}"),
                span,
            )
        })
}

fn io_write_file(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [path, contents] = expect_args::<2>("io.write_file", args, span)?;
    let path = as_string("io.write_file", &path, span)?;
    let contents = as_string("io.write_file", &contents, span)?;
    std::fs::write(&path, contents).map_err(|error| {
        RuntimeError::new(
            ErrorCode::UncaughtThrow,
            format!("cannot write '{path}': {error}"),
            span,
        )
    })?;
    Ok(Value::Null)
}

// ----------------------------------------------------------------------
// time: epoch seconds with civil-date helpers

const SECONDS_PER_DAY: i64 = 86_400;

/// Days since 1970-01-01 for a civil date (Howard Hinnant's algorithm).
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = if year >= 0 { year } else { year - 399 } / 400;
    let yoe = year - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn civil_from_days(days: i64) -> (i64, i64, i64) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let year = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if month <= 2 { year + 1 } else { year };
    (year, month, day)
}

fn time_now(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [] = expect_args::<0>("time.now", args, span)?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok(Value::Integer(now))
}

fn time_parse(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [text] = expect_args::<1>("time.parse", args, span)?;
    let text = as_string("time.parse", &text, span)?;
    let bad = || {
        RuntimeError::new(
            ErrorCode::InvalidCast,
            format!("cannot parse '{text}' as date, expected YYYY-MM-DD"),
            span,
        )
    };

    let mut parts = text.trim().splitn(3, '-');
    let year = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
    let month: i64 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
    let day: i64 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(bad());
    }
    Ok(Value::Integer(
        days_from_civil(year, month, day) * SECONDS_PER_DAY,
    ))
}

fn time_format(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [timestamp] = expect_args::<1>("time.format", args, span)?;
    let timestamp = as_int("time.format", &timestamp, span)?;
    let days = timestamp.div_euclid(SECONDS_PER_DAY);
    let seconds = timestamp.rem_euclid(SECONDS_PER_DAY);
    let (year, month, day) = civil_from_days(days);
    let (hours, minutes, secs) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    Ok(Value::String(format!(
        "{year:04}-{month:02}-{day:02} {hours:02}:{minutes:02}:{secs:02}"
    )))
}

fn time_shift(
    name: &'static str,
    unit_seconds: i64,
) -> impl Fn(&mut Interpreter, Vec<Value>, &Span) -> EvalResult<Value> {
    move |_, args, span| {
        let [timestamp, amount] = expect_args::<2>(name, args, span)?;
        let timestamp = as_int(name, &timestamp, span)?;
        let amount = as_int(name, &amount, span)?;
        Ok(Value::Integer(
            timestamp.wrapping_add(amount.wrapping_mul(unit_seconds)),
        ))
    }
}

fn time_add_days(interp: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    time_shift("time.add_days", SECONDS_PER_DAY)(interp, args, span)
}

fn time_add_hours(interp: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    time_shift("time.add_hours", 3600)(interp, args, span)
}

fn time_diff_days(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [a, b] = expect_args::<2>("time.diff_days", args, span)?;
    let a = as_int("time.diff_days", &a, span)?;
    let b = as_int("time.diff_days", &b, span)?;
    Ok(Value::Integer((b - a) / SECONDS_PER_DAY))
}

// ----------------------------------------------------------------------
// list

fn expect_list(
    name: &str,
    value: &Value,
    span: &Span,
) -> EvalResult<super::value::Shared<Vec<Value>>> {
    match value {
        Value::List(values) => Ok(Arc::clone(values)),
        other => Err(RuntimeError::new(
            ErrorCode::InvalidCast,
            format!("{name} expects a list, found {}", other.type_name()),
            span,
        )),
    }
}

fn list_push(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [list, value] = expect_args::<2>("list.push", args, span)?;
    expect_list("list.push", &list, span)?.lock().push(value);
    Ok(Value::Null)
}

fn list_pop(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [list] = expect_args::<1>("list.pop", args, span)?;
    expect_list("list.pop", &list, span)?
        .lock()
        .pop()
        .ok_or_else(|| {
            RuntimeError::new(ErrorCode::IndexOutOfRange, "pop from an empty list", span)
        })
}

fn list_shift(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [list] = expect_args::<1>("list.shift", args, span)?;
    let list = expect_list("list.shift", &list, span)?;
    let mut values = list.lock();
    if values.is_empty() {
        return Err(RuntimeError::new(
            ErrorCode::IndexOutOfRange,
            "shift from an empty list",
            span,
        ));
    }
    Ok(values.remove(0))
}

fn list_unshift(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [list, value] = expect_args::<2>("list.unshift", args, span)?;
    expect_list("list.unshift", &list, span)?
        .lock()
        .insert(0, value);
    Ok(Value::Null)
}

fn list_slice(interp: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [list, from, to] = expect_args::<3>("list.slice", args, span)?;
    let from = as_int("list.slice", &from, span)?;
    let to = as_int("list.slice", &to, span)?;
    interp.slice_value(&list, Some(from), Some(to), span)
}

fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::Integer(l), Value::Integer(r)) => l.cmp(r),
        (Value::Float(l), Value::Float(r)) => l.partial_cmp(r).unwrap_or(Ordering::Equal),
        (Value::Integer(l), Value::Float(r)) => {
            (*l as f64).partial_cmp(r).unwrap_or(Ordering::Equal)
        }
        (Value::Float(l), Value::Integer(r)) => {
            l.partial_cmp(&(*r as f64)).unwrap_or(Ordering::Equal)
        }
        (Value::String(l), Value::String(r)) => l.cmp(r),
        (Value::Boolean(l), Value::Boolean(r)) => l.cmp(r),
        _ => Ordering::Equal,
    }
}

fn list_sort(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [list] = expect_args::<1>("list.sort", args, span)?;
    let mut values = expect_list("list.sort", &list, span)?.lock().clone();
    values.sort_by(compare_values);
    Ok(Value::List(shared(values)))
}

fn list_reverse(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [list] = expect_args::<1>("list.reverse", args, span)?;
    let mut values = expect_list("list.reverse", &list, span)?.lock().clone();
    values.reverse();
    Ok(Value::List(shared(values)))
}

fn list_concat(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [left, right] = expect_args::<2>("list.concat", args, span)?;
    let mut values = expect_list("list.concat", &left, span)?.lock().clone();
    values.extend(expect_list("list.concat", &right, span)?.lock().iter().cloned());
    Ok(Value::List(shared(values)))
}

fn list_includes(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [list, needle] = expect_args::<2>("list.includes", args, span)?;
    Ok(Value::Boolean(
        expect_list("list.includes", &list, span)?.lock().contains(&needle),
    ))
}

fn list_index_of(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [list, needle] = expect_args::<2>("list.index_of", args, span)?;
    let position = expect_list("list.index_of", &list, span)?
        .lock()
        .iter()
        .position(|value| *value == needle);
    Ok(Value::Integer(
        position.map(|p| p as i64).unwrap_or(-1),
    ))
}

// ----------------------------------------------------------------------
// map

fn expect_map(
    name: &str,
    value: &Value,
    span: &Span,
) -> EvalResult<super::value::Shared<OrderedMap>> {
    match value {
        Value::Map(map) => Ok(Arc::clone(map)),
        other => Err(RuntimeError::new(
            ErrorCode::InvalidCast,
            format!("{name} expects a map, found {}", other.type_name()),
            span,
        )),
    }
}

fn map_set(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [map, key, value] = expect_args::<3>("map.set", args, span)?;
    let key = as_string("map.set", &key, span)?;
    expect_map("map.set", &map, span)?.lock().set(key, value);
    Ok(Value::Null)
}

fn map_get(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [map, key] = expect_args::<2>("map.get", args, span)?;
    let key = as_string("map.get", &key, span)?;
    Ok(expect_map("map.get", &map, span)?
        .lock()
        .get(&key)
        .cloned()
        .unwrap_or(Value::Null))
}

fn map_has(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [map, key] = expect_args::<2>("map.has", args, span)?;
    let key = as_string("map.has", &key, span)?;
    Ok(Value::Boolean(
        expect_map("map.has", &map, span)?.lock().get(&key).is_some(),
    ))
}

fn map_delete(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [map, key] = expect_args::<2>("map.delete", args, span)?;
    let key = as_string("map.delete", &key, span)?;
    Ok(Value::Boolean(
        expect_map("map.delete", &map, span)?.lock().remove(&key),
    ))
}

fn map_clear(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [map] = expect_args::<1>("map.clear", args, span)?;
    expect_map("map.clear", &map, span)?.lock().clear();
    Ok(Value::Null)
}

fn map_keys(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [map] = expect_args::<1>("map.keys", args, span)?;
    let keys: Vec<Value> = expect_map("map.keys", &map, span)?
        .lock()
        .iter()
        .map(|(key, _)| Value::String(key.clone()))
        .collect();
    Ok(Value::List(shared(keys)))
}

fn map_values(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [map] = expect_args::<1>("map.values", args, span)?;
    let values: Vec<Value> = expect_map("map.values", &map, span)?
        .lock()
        .iter()
        .map(|(_, value)| value.clone())
        .collect();
    Ok(Value::List(shared(values)))
}

fn map_entries(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [map] = expect_args::<1>("map.entries", args, span)?;
    let entries: Vec<Value> = expect_map("map.entries", &map, span)?
        .lock()
        .iter()
        .map(|(key, value)| {
            Value::List(shared(vec![Value::String(key.clone()), value.clone()]))
        })
        .collect();
    Ok(Value::List(shared(entries)))
}

fn map_size(_: &mut Interpreter, args: Vec<Value>, span: &Span) -> EvalResult<Value> {
    let [map] = expect_args::<1>("map.size", args, span)?;
    Ok(Value::Integer(
        expect_map("map.size", &map, span)?.lock().len() as i64,
    ))
}
