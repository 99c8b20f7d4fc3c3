//! The runtime value universe of the tree-walking evaluator.
//!
//! Values are cheap to clone: collections, instances and futures sit behind
//! `Arc` with lock-guarded interiors so closures and spawned tasks can
//! share them safely across threads.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;

use crate::parser::ast::{Block, Expression, FieldDecl, Parameter, TypeName};

use super::environment::Environment;
use super::{Interpreter, RuntimeError};

pub type Shared<T> = Arc<Mutex<T>>;

pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

#[derive(Clone)]
pub enum Value {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,
    List(Shared<Vec<Value>>),
    Map(Shared<OrderedMap>),
    Class(Arc<ClassValue>),
    Instance(Arc<InstanceValue>),
    BoundMethod {
        receiver: Arc<InstanceValue>,
        function: Arc<FunctionValue>,
    },
    /// `super` inside a method: the receiver plus the class to start method
    /// lookup at.
    Super {
        instance: Arc<InstanceValue>,
        class: Arc<ClassValue>,
    },
    Function(Arc<FunctionValue>),
    Builtin(BuiltinFunction),
    Future(Arc<FutureValue>),
    Module(Arc<ModuleValue>),
}

/// A map literal keeps its construction order; lookups walk the entries.
#[derive(Default, Clone)]
pub struct OrderedMap {
    entries: Vec<(String, Value)>,
}

impl OrderedMap {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn set(&mut self, key: String, value: Value) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| k != key);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Value)> {
        self.entries.iter()
    }
}

pub enum FunctionBody {
    Block(Block),
    /// Arrow functions with an expression body.
    Expr(Expression),
}

pub struct FunctionValue {
    pub name: String,
    pub params: Vec<Parameter>,
    pub body: FunctionBody,
    /// The environment the literal was created in; closures share it.
    pub env: Arc<Environment>,
    pub is_async: bool,
}

pub struct ClassValue {
    pub name: String,
    pub superclass: Option<Arc<ClassValue>>,
    /// Field declarations; defaults are evaluated per instantiation.
    pub fields: Vec<FieldDecl>,
    pub constructor: Option<Arc<FunctionValue>>,
    pub methods: HashMap<String, Arc<FunctionValue>>,
    /// The environment the class was declared in; field defaults evaluate
    /// against it.
    pub env: Arc<Environment>,
}

impl ClassValue {
    /// Walk the class chain for a method.
    pub fn find_method(&self, name: &str) -> Option<Arc<FunctionValue>> {
        if let Some(method) = self.methods.get(name) {
            return Some(Arc::clone(method));
        }
        self.superclass.as_ref().and_then(|s| s.find_method(name))
    }

    /// The nearest constructor in the chain.
    pub fn find_constructor(&self) -> Option<Arc<FunctionValue>> {
        if let Some(constructor) = &self.constructor {
            return Some(Arc::clone(constructor));
        }
        self.superclass.as_ref().and_then(|s| s.find_constructor())
    }
}

pub struct InstanceValue {
    pub class: Arc<ClassValue>,
    pub fields: Mutex<OrderedMap>,
}

/// A single-slot channel filled exactly once by a background task and
/// consumed exactly once by `await`.
pub struct FutureValue {
    pub receiver: Mutex<Option<Receiver<Result<Value, RuntimeError>>>>,
}

pub struct ModuleValue {
    pub name: String,
    pub members: HashMap<String, Value>,
}

pub type BuiltinFn =
    fn(&mut Interpreter, Vec<Value>, &crate::lexer::Span) -> Result<Value, RuntimeError>;

#[derive(Clone)]
pub struct BuiltinFunction {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Boolean(_) => "bool",
            Value::Null => "null",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Class(_) => "class",
            Value::Instance(_) => "instance",
            Value::BoundMethod { .. } => "method",
            Value::Super { .. } => "super",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin",
            Value::Future(_) => "future",
            Value::Module(_) => "module",
        }
    }

    /// Null, false, zero and the empty string are falsy; everything else
    /// is truthy.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(value) => *value,
            Value::Integer(value) => *value != 0,
            Value::String(value) => !value.is_empty(),
            _ => true,
        }
    }

    /// Whether the declared type name matches this value's runtime kind.
    pub fn matches_type(&self, type_name: &TypeName) -> bool {
        match type_name {
            TypeName::Any => true,
            TypeName::Int => matches!(self, Value::Integer(_)),
            TypeName::Float => matches!(self, Value::Float(_)),
            TypeName::String => matches!(self, Value::String(_)),
            TypeName::Bool => matches!(self, Value::Boolean(_)),
            TypeName::List => matches!(self, Value::List(_)),
            TypeName::Map => matches!(self, Value::Map(_)),
            TypeName::Named(name) => match self {
                Value::Instance(instance) => {
                    let mut class = Some(Arc::clone(&instance.class));
                    while let Some(current) = class {
                        if current.name == *name {
                            return true;
                        }
                        class = current.superclass.clone();
                    }
                    false
                }
                _ => false,
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(l), Value::Integer(r)) => l == r,
            (Value::Float(l), Value::Float(r)) => l == r,
            // Cross-kind numeric comparison widens int to float.
            (Value::Integer(l), Value::Float(r)) | (Value::Float(r), Value::Integer(l)) => {
                (*l as f64) == *r
            }
            (Value::String(l), Value::String(r)) => l == r,
            (Value::Boolean(l), Value::Boolean(r)) => l == r,
            (Value::Null, Value::Null) => true,
            (Value::List(l), Value::List(r)) => {
                if Arc::ptr_eq(l, r) {
                    return true;
                }
                let left = l.lock().clone();
                let right = r.lock().clone();
                left == right
            }
            (Value::Map(l), Value::Map(r)) => {
                if Arc::ptr_eq(l, r) {
                    return true;
                }
                let left = l.lock().entries.clone();
                let right = r.lock().entries.clone();
                left == right
            }
            (Value::Class(l), Value::Class(r)) => Arc::ptr_eq(l, r),
            (Value::Instance(l), Value::Instance(r)) => Arc::ptr_eq(l, r),
            (Value::Function(l), Value::Function(r)) => Arc::ptr_eq(l, r),
            (Value::Builtin(l), Value::Builtin(r)) => l.name == r.name,
            (Value::Future(l), Value::Future(r)) => Arc::ptr_eq(l, r),
            (Value::Module(l), Value::Module(r)) => l.name == r.name,
            // Mismatched kinds compare unequal, never error.
            _ => false,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::String(value) => f.write_str(value),
            Value::Boolean(value) => write!(f, "{value}"),
            Value::Null => f.write_str("null"),
            Value::List(values) => {
                let rendered = values
                    .lock()
                    .iter()
                    .map(Value::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "[{rendered}]")
            }
            Value::Map(map) => {
                let rendered = map
                    .lock()
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{{{rendered}}}")
            }
            Value::Class(class) => write!(f, "<class {}>", class.name),
            Value::Instance(instance) => write!(f, "<instance of {}>", instance.class.name),
            Value::BoundMethod { function, .. } => write!(f, "<method {}>", function.name),
            Value::Super { class, .. } => write!(f, "<super {}>", class.name),
            Value::Function(function) => write!(f, "<func {}>", function.name),
            Value::Builtin(builtin) => write!(f, "<builtin {}>", builtin.name),
            Value::Future(_) => f.write_str("<future>"),
            Value::Module(module) => write!(f, "<module {}>", module.name),
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self} ({})", self.type_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.truthy());
        assert!(!Value::Boolean(false).truthy());
        assert!(!Value::Integer(0).truthy());
        assert!(!Value::String(String::new()).truthy());
        assert!(Value::Integer(-1).truthy());
        assert!(Value::String("x".into()).truthy());
        assert!(Value::List(shared(vec![])).truthy());
        assert!(Value::Float(0.0).truthy());
    }

    #[test]
    fn test_cross_kind_numeric_equality() {
        assert_eq!(Value::Integer(2), Value::Float(2.0));
        assert_ne!(Value::Integer(2), Value::Float(2.5));
        assert_ne!(Value::Integer(0), Value::String("0".into()));
    }

    #[test]
    fn test_list_equality_is_deep() {
        let a = Value::List(shared(vec![Value::Integer(1), Value::Integer(2)]));
        let b = Value::List(shared(vec![Value::Integer(1), Value::Integer(2)]));
        assert_eq!(a, b);
    }

    #[test]
    fn test_ordered_map_preserves_insertion_order() {
        let mut map = OrderedMap::default();
        map.set("z".into(), Value::Integer(1));
        map.set("a".into(), Value::Integer(2));
        map.set("z".into(), Value::Integer(3));
        let keys: Vec<&str> = map.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["z", "a"]);
        assert_eq!(map.get("z"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_display_of_collections() {
        let list = Value::List(shared(vec![
            Value::Integer(2),
            Value::Integer(3),
            Value::Integer(4),
        ]));
        assert_eq!(list.to_string(), "[2, 3, 4]");

        let mut entries = OrderedMap::default();
        entries.set("a".into(), Value::Integer(1));
        let map = Value::Map(shared(entries));
        assert_eq!(map.to_string(), "{a: 1}");
    }
}
