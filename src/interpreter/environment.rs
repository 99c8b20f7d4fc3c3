//! Environments: runtime scope chains.
//!
//! An environment maps identifiers to cells holding the value, a constant
//! flag and an optional declared type. Chains are shared by reference:
//! closures and spawned tasks keep the chain alive through `Arc`, and cell
//! access is lock-guarded so concurrent tasks never observe torn writes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::parser::ast::TypeName;

use super::value::Value;

struct Cell {
    value: Value,
    constant: bool,
    declared: Option<TypeName>,
}

#[derive(Debug, PartialEq)]
pub enum UpdateError {
    NotDefined,
    Constant,
}

pub struct Environment {
    parent: Option<Arc<Environment>>,
    cells: Mutex<HashMap<String, Cell>>,
}

impl Environment {
    pub fn root() -> Arc<Environment> {
        Arc::new(Environment {
            parent: None,
            cells: Mutex::new(HashMap::new()),
        })
    }

    pub fn child(parent: &Arc<Environment>) -> Arc<Environment> {
        Arc::new(Environment {
            parent: Some(Arc::clone(parent)),
            cells: Mutex::new(HashMap::new()),
        })
    }

    /// Define a name in this scope, shadowing outer bindings.
    pub fn define(&self, name: impl Into<String>, value: Value, constant: bool, declared: Option<TypeName>) {
        self.cells.lock().insert(
            name.into(),
            Cell {
                value,
                constant,
                declared,
            },
        );
    }

    /// Walk the chain outwards until the name resolves.
    pub fn get(&self, name: &str) -> Option<Value> {
        let mut current = self;
        loop {
            if let Some(cell) = current.cells.lock().get(name) {
                return Some(cell.value.clone());
            }
            match &current.parent {
                Some(parent) => current = parent,
                None => return None,
            }
        }
    }

    /// The declared type of the binding, if the defining scope recorded one.
    pub fn declared_type(&self, name: &str) -> Option<TypeName> {
        let mut current = self;
        loop {
            if let Some(cell) = current.cells.lock().get(name) {
                return cell.declared.clone();
            }
            match &current.parent {
                Some(parent) => current = parent,
                None => return None,
            }
        }
    }

    /// Assign to an existing binding in whichever scope defines it.
    pub fn update(&self, name: &str, value: Value) -> Result<(), UpdateError> {
        let mut current = self;
        loop {
            {
                let mut cells = current.cells.lock();
                if let Some(cell) = cells.get_mut(name) {
                    if cell.constant {
                        return Err(UpdateError::Constant);
                    }
                    cell.value = value;
                    return Ok(());
                }
            }
            match &current.parent {
                Some(parent) => current = parent,
                None => return Err(UpdateError::NotDefined),
            }
        }
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.cells.lock().keys().cloned().collect();
        f.debug_struct("Environment")
            .field("names", &names)
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_walks_the_chain() {
        let root = Environment::root();
        root.define("x", Value::Integer(1), false, None);
        let child = Environment::child(&root);
        assert_eq!(child.get("x"), Some(Value::Integer(1)));
    }

    #[test]
    fn test_update_writes_to_defining_scope() {
        let root = Environment::root();
        root.define("x", Value::Integer(1), false, None);
        let child = Environment::child(&root);
        child.update("x", Value::Integer(2)).unwrap();
        assert_eq!(root.get("x"), Some(Value::Integer(2)));
    }

    #[test]
    fn test_define_shadows() {
        let root = Environment::root();
        root.define("x", Value::Integer(1), false, None);
        let child = Environment::child(&root);
        child.define("x", Value::Integer(9), false, None);
        assert_eq!(child.get("x"), Some(Value::Integer(9)));
        assert_eq!(root.get("x"), Some(Value::Integer(1)));
    }

    #[test]
    fn test_constant_rejects_update() {
        let root = Environment::root();
        root.define("X", Value::Integer(1), true, None);
        assert_eq!(
            root.update("X", Value::Integer(2)),
            Err(UpdateError::Constant)
        );
    }

    #[test]
    fn test_update_unknown_name() {
        let root = Environment::root();
        assert_eq!(
            root.update("missing", Value::Null),
            Err(UpdateError::NotDefined)
        );
    }
}
