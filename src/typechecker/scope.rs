//! The scope tree produced by semantic analysis.
//!
//! Scopes form a tree that survives analysis: the emitter reads it to pick
//! native or boxed representations. Resolution walks parent pointers; any
//! lookup that crosses a function-boundary scope is recorded in that
//! function scope's capture set, which the emitter uses to materialise
//! closures.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::{Rc, Weak};

use super::types::Type;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Symbol {
    pub name: String,
    pub ty: Type,
    pub constant: bool,
    /// Depth of the scope the symbol was defined in.
    pub depth: usize,
}

pub type ScopeRef = Rc<RefCell<Scope>>;

#[derive(Debug)]
pub struct Scope {
    pub name: String,
    pub depth: usize,
    pub parent: Option<Weak<RefCell<Scope>>>,
    pub symbols: HashMap<String, Symbol>,
    /// Marks function bodies: lookups crossing this scope are captures.
    pub is_function_boundary: bool,
    pub captures: BTreeSet<String>,
    pub children: Vec<ScopeRef>,
}

impl Scope {
    pub fn root() -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            name: "global".into(),
            depth: 0,
            parent: None,
            symbols: HashMap::new(),
            is_function_boundary: false,
            captures: BTreeSet::new(),
            children: vec![],
        }))
    }

    pub fn child(parent: &ScopeRef, name: impl Into<String>, is_function_boundary: bool) -> ScopeRef {
        let depth = parent.borrow().depth + 1;
        let scope = Rc::new(RefCell::new(Scope {
            name: name.into(),
            depth,
            parent: Some(Rc::downgrade(parent)),
            symbols: HashMap::new(),
            is_function_boundary,
            captures: BTreeSet::new(),
            children: vec![],
        }));
        parent.borrow_mut().children.push(Rc::clone(&scope));
        scope
    }
}

/// Define a symbol in the given scope, shadowing any previous binding of
/// the same name there.
pub fn define(scope: &ScopeRef, name: impl Into<String>, ty: Type, constant: bool) {
    let name = name.into();
    let depth = scope.borrow().depth;
    scope.borrow_mut().symbols.insert(
        name.clone(),
        Symbol {
            name,
            ty,
            constant,
            depth,
        },
    );
}

/// Look a name up in this scope only.
pub fn resolve_local(scope: &ScopeRef, name: &str) -> Option<Symbol> {
    scope.borrow().symbols.get(name).cloned()
}

/// Walk the parent chain looking for `name`. Every function-boundary scope
/// crossed before the defining scope records the name as a capture.
pub fn resolve(scope: &ScopeRef, name: &str) -> Option<Symbol> {
    let mut crossed: Vec<ScopeRef> = vec![];
    let mut current = Rc::clone(scope);

    loop {
        if let Some(symbol) = current.borrow().symbols.get(name).cloned() {
            for boundary in crossed {
                boundary.borrow_mut().captures.insert(name.to_owned());
            }
            return Some(symbol);
        }

        if current.borrow().is_function_boundary {
            crossed.push(Rc::clone(&current));
        }

        let parent = current.borrow().parent.as_ref().and_then(Weak::upgrade);
        match parent {
            Some(parent) => current = parent,
            None => return None,
        }
    }
}

/// The analysed scope tree, kept alive for the emitter.
#[derive(Debug)]
pub struct SymbolTable {
    pub root: ScopeRef,
}

impl SymbolTable {
    pub fn resolve_global(&self, name: &str) -> Option<Symbol> {
        resolve_local(&self.root, name)
    }

    /// Serialisable view of the scope tree for `--dump-typed`.
    pub fn to_json(&self) -> serde_json::Value {
        scope_to_json(&self.root)
    }
}

fn scope_to_json(scope: &ScopeRef) -> serde_json::Value {
    let scope = scope.borrow();
    let mut symbols: Vec<&Symbol> = scope.symbols.values().collect();
    symbols.sort_by(|a, b| a.name.cmp(&b.name));

    serde_json::json!({
        "name": scope.name,
        "depth": scope.depth,
        "function_boundary": scope.is_function_boundary,
        "captures": scope.captures.iter().collect::<Vec<_>>(),
        "symbols": symbols
            .iter()
            .map(|s| serde_json::json!({
                "name": s.name,
                "type": s.ty.to_string(),
                "constant": s.constant,
            }))
            .collect::<Vec<_>>(),
        "children": scope.children.iter().map(scope_to_json).collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_walks_parents() {
        let root = Scope::root();
        define(&root, "x", Type::Int, false);
        let inner = Scope::child(&root, "block", false);
        let symbol = resolve(&inner, "x").unwrap();
        assert_eq!(symbol.ty, Type::Int);
        assert_eq!(symbol.depth, 0);
    }

    #[test]
    fn test_shadowing_in_child_scope() {
        let root = Scope::root();
        define(&root, "x", Type::Int, false);
        let inner = Scope::child(&root, "block", false);
        define(&inner, "x", Type::String, false);
        assert_eq!(resolve(&inner, "x").unwrap().ty, Type::String);
        assert_eq!(resolve(&root, "x").unwrap().ty, Type::Int);
    }

    #[test]
    fn test_capture_recorded_across_function_boundary() {
        let root = Scope::root();
        define(&root, "captured", Type::Int, false);
        let function = Scope::child(&root, "fn closure", true);
        let block = Scope::child(&function, "block", false);

        assert!(resolve(&block, "captured").is_some());
        assert!(function.borrow().captures.contains("captured"));
        // Locals do not end up in the capture set.
        define(&block, "local", Type::Int, false);
        resolve(&block, "local");
        assert!(!function.borrow().captures.contains("local"));
    }

    #[test]
    fn test_nested_functions_capture_transitively() {
        let root = Scope::root();
        define(&root, "x", Type::Int, false);
        let outer = Scope::child(&root, "fn outer", true);
        let inner = Scope::child(&outer, "fn inner", true);

        resolve(&inner, "x");
        assert!(inner.borrow().captures.contains("x"));
        assert!(outer.borrow().captures.contains("x"));
    }
}
