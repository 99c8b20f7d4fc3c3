//! Signatures for built-in functions and standard-library modules.
//!
//! Modules are opaque capability records: a name plus a method/field
//! signature table, modelled as class types. The analyser only needs the
//! signatures; the interpreter provides the matching implementations in
//! `crate::interpreter::builtins`.

use super::scope::{define, ScopeRef};
use super::types::{ClassType, Type};

fn func(params: Vec<Type>, return_type: Type) -> Type {
    Type::Function {
        params,
        return_type: Box::new(return_type),
        variadic: false,
    }
}

fn variadic(return_type: Type) -> Type {
    Type::Function {
        params: vec![Type::Any],
        return_type: Box::new(return_type),
        variadic: true,
    }
}

fn module(name: &str, fields: Vec<(&str, Type)>, methods: Vec<(&str, Type)>) -> Type {
    Type::Class(Box::new(ClassType {
        name: name.into(),
        superclass: None,
        fields: fields.into_iter().map(|(n, t)| (n.into(), t)).collect(),
        methods: methods.into_iter().map(|(n, t)| (n.into(), t)).collect(),
    }))
}

/// Populate the root scope with the built-in identifiers every program
/// sees without importing anything.
pub fn install_builtins(root: &ScopeRef) {
    define(
        root,
        "show",
        module("show", vec![], vec![("log", variadic(Type::Null))]),
        true,
    );
    define(
        root,
        "read",
        module(
            "read",
            vec![],
            vec![
                ("line", func(vec![], Type::String)),
                ("int", func(vec![], Type::Int)),
            ],
        ),
        true,
    );

    define(root, "print", func(vec![Type::Any], Type::Null), true);
    define(root, "println", variadic(Type::Null), true);
    define(root, "len", func(vec![Type::Any], Type::Int), true);
    define(
        root,
        "split",
        func(
            vec![Type::String, Type::String],
            Type::List(Box::new(Type::String)),
        ),
        true,
    );
    define(root, "to_number", func(vec![Type::String], Type::Float), true);
    define(root, "string", func(vec![Type::Any], Type::String), true);
    define(root, "int", func(vec![Type::Any], Type::Int), true);
    define(root, "float", func(vec![Type::Any], Type::Float), true);
    define(root, "bool", func(vec![Type::Any], Type::Bool), true);

    // Arithmetic helpers take two numerics and return the widened numeric;
    // statically that is only expressible as `any`.
    for helper in ["Add", "Subtract", "Multiply", "Divide"] {
        define(root, helper, func(vec![Type::Any, Type::Any], Type::Any), true);
    }
}

/// Signature table for a standard-library module, or `None` for unknown
/// module names.
pub fn stdlib_module(name: &str) -> Option<Type> {
    let num2 = || vec![Type::Float, Type::Float];

    let ty = match name {
        "math" => module(
            "math",
            vec![
                ("PI", Type::Float),
                ("E", Type::Float),
                ("TAU", Type::Float),
                ("PHI", Type::Float),
            ],
            vec![
                ("sqrt", func(vec![Type::Float], Type::Float)),
                ("power", func(num2(), Type::Float)),
                ("abs", func(vec![Type::Float], Type::Float)),
                ("floor", func(vec![Type::Float], Type::Int)),
                ("ceil", func(vec![Type::Float], Type::Int)),
                ("round", func(vec![Type::Float], Type::Int)),
                ("sin", func(vec![Type::Float], Type::Float)),
                ("cos", func(vec![Type::Float], Type::Float)),
                ("tan", func(vec![Type::Float], Type::Float)),
                ("factorial", func(vec![Type::Int], Type::Int)),
                ("gcd", func(vec![Type::Int, Type::Int], Type::Int)),
                ("lcm", func(vec![Type::Int, Type::Int], Type::Int)),
                ("is_prime", func(vec![Type::Int], Type::Bool)),
                ("fibonacci_iterative", func(vec![Type::Int], Type::Int)),
                ("degrees_to_radians", func(vec![Type::Float], Type::Float)),
                ("radians_to_degrees", func(vec![Type::Float], Type::Float)),
                (
                    "clamp",
                    func(vec![Type::Float, Type::Float, Type::Float], Type::Float),
                ),
                (
                    "lerp",
                    func(vec![Type::Float, Type::Float, Type::Float], Type::Float),
                ),
                (
                    "map_range",
                    func(
                        vec![Type::Float, Type::Float, Type::Float, Type::Float, Type::Float],
                        Type::Float,
                    ),
                ),
                ("add", func(num2(), Type::Float)),
                ("subtract", func(num2(), Type::Float)),
                ("multiply", func(num2(), Type::Float)),
                ("divide", func(num2(), Type::Float)),
            ],
        ),
        "string" => module(
            "string",
            vec![],
            vec![
                (
                    "split",
                    func(
                        vec![Type::String, Type::String],
                        Type::List(Box::new(Type::String)),
                    ),
                ),
                (
                    "join",
                    func(
                        vec![Type::List(Box::new(Type::String)), Type::String],
                        Type::String,
                    ),
                ),
                (
                    "substring",
                    func(vec![Type::String, Type::Int, Type::Int], Type::String),
                ),
                (
                    "replace",
                    func(vec![Type::String, Type::String, Type::String], Type::String),
                ),
                ("trim", func(vec![Type::String], Type::String)),
                ("to_upper", func(vec![Type::String], Type::String)),
                ("to_lower", func(vec![Type::String], Type::String)),
                ("contains", func(vec![Type::String, Type::String], Type::Bool)),
                (
                    "starts_with",
                    func(vec![Type::String, Type::String], Type::Bool),
                ),
                (
                    "ends_with",
                    func(vec![Type::String, Type::String], Type::Bool),
                ),
            ],
        ),
        "json" => module(
            "json",
            vec![],
            vec![
                ("parse", func(vec![Type::String], Type::Any)),
                ("stringify", func(vec![Type::Any], Type::String)),
            ],
        ),
        "io" => module(
            "io",
            vec![],
            vec![
                ("read_file", func(vec![Type::String], Type::String)),
                (
                    "write_file",
                    func(vec![Type::String, Type::String], Type::Null),
                ),
                ("read_line", func(vec![], Type::String)),
            ],
        ),
        "time" => module(
            "time",
            vec![],
            vec![
                ("now", func(vec![], Type::Int)),
                ("parse", func(vec![Type::String], Type::Int)),
                ("format", func(vec![Type::Int], Type::String)),
                ("add_days", func(vec![Type::Int, Type::Int], Type::Int)),
                ("add_hours", func(vec![Type::Int, Type::Int], Type::Int)),
                ("diff_days", func(vec![Type::Int, Type::Int], Type::Int)),
            ],
        ),
        "list" => module(
            "list",
            vec![],
            vec![
                (
                    "push",
                    func(vec![Type::List(Box::new(Type::Any)), Type::Any], Type::Null),
                ),
                ("pop", func(vec![Type::List(Box::new(Type::Any))], Type::Any)),
                ("shift", func(vec![Type::List(Box::new(Type::Any))], Type::Any)),
                (
                    "unshift",
                    func(vec![Type::List(Box::new(Type::Any)), Type::Any], Type::Null),
                ),
                (
                    "slice",
                    func(
                        vec![Type::List(Box::new(Type::Any)), Type::Int, Type::Int],
                        Type::List(Box::new(Type::Any)),
                    ),
                ),
                (
                    "sort",
                    func(
                        vec![Type::List(Box::new(Type::Any))],
                        Type::List(Box::new(Type::Any)),
                    ),
                ),
                (
                    "reverse",
                    func(
                        vec![Type::List(Box::new(Type::Any))],
                        Type::List(Box::new(Type::Any)),
                    ),
                ),
                (
                    "concat",
                    func(
                        vec![
                            Type::List(Box::new(Type::Any)),
                            Type::List(Box::new(Type::Any)),
                        ],
                        Type::List(Box::new(Type::Any)),
                    ),
                ),
                (
                    "includes",
                    func(vec![Type::List(Box::new(Type::Any)), Type::Any], Type::Bool),
                ),
                (
                    "index_of",
                    func(vec![Type::List(Box::new(Type::Any)), Type::Any], Type::Int),
                ),
            ],
        ),
        "map" => {
            let map_any = || Type::Map(Box::new(Type::Any), Box::new(Type::Any));
            module(
                "map",
                vec![],
                vec![
                    (
                        "set",
                        func(vec![map_any(), Type::String, Type::Any], Type::Null),
                    ),
                    ("get", func(vec![map_any(), Type::String], Type::Any)),
                    ("has", func(vec![map_any(), Type::String], Type::Bool)),
                    ("delete", func(vec![map_any(), Type::String], Type::Bool)),
                    ("clear", func(vec![map_any()], Type::Null)),
                    ("keys", func(vec![map_any()], Type::List(Box::new(Type::String)))),
                    ("values", func(vec![map_any()], Type::List(Box::new(Type::Any)))),
                    (
                        "entries",
                        func(vec![map_any()], Type::List(Box::new(Type::Any))),
                    ),
                    ("size", func(vec![map_any()], Type::Int)),
                ],
            )
        }
        _ => return None,
    };
    Some(ty)
}

/// Method signatures available directly on collection receivers, e.g.
/// `xs.push(1)`. They mirror the stdlib `list`/`map`/`string` modules with
/// the receiver argument dropped.
pub fn collection_method(receiver: &Type, name: &str) -> Option<Type> {
    let elem = || Type::Any;
    match receiver {
        Type::List(_) => {
            let ty = match name {
                "push" => func(vec![Type::Any], Type::Null),
                "pop" | "shift" => func(vec![], elem()),
                "unshift" => func(vec![Type::Any], Type::Null),
                "slice" => func(vec![Type::Int, Type::Int], receiver.clone()),
                "sort" | "reverse" => func(vec![], receiver.clone()),
                "concat" => func(vec![receiver.clone()], receiver.clone()),
                "includes" => func(vec![Type::Any], Type::Bool),
                "index_of" => func(vec![Type::Any], Type::Int),
                _ => return None,
            };
            Some(ty)
        }
        Type::Map(_, value) => {
            let ty = match name {
                "set" => func(vec![Type::String, Type::Any], Type::Null),
                "get" => func(vec![Type::String], value.as_ref().clone()),
                "has" => func(vec![Type::String], Type::Bool),
                "delete" => func(vec![Type::String], Type::Bool),
                "clear" => func(vec![], Type::Null),
                "keys" => func(vec![], Type::List(Box::new(Type::String))),
                "values" => func(vec![], Type::List(value.clone())),
                "entries" => func(vec![], Type::List(Box::new(Type::Any))),
                "size" => func(vec![], Type::Int),
                _ => return None,
            };
            Some(ty)
        }
        Type::String => {
            let ty = match name {
                "split" => func(vec![Type::String], Type::List(Box::new(Type::String))),
                "substring" => func(vec![Type::Int, Type::Int], Type::String),
                "replace" => func(vec![Type::String, Type::String], Type::String),
                "trim" | "to_upper" | "to_lower" => func(vec![], Type::String),
                "contains" | "starts_with" | "ends_with" => func(vec![Type::String], Type::Bool),
                _ => return None,
            };
            Some(ty)
        }
        _ => None,
    }
}
