use std::fmt::Display;

use crate::parser::ast::TypeName;

/// Canonical semantic type representation used by the analyser and, through
/// the symbol table, by the emitter. Lists, maps and functions compare
/// structurally; classes compare nominally by name.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Type {
    Int,
    Float,
    String,
    Bool,
    Null,
    /// The top type: assignable to and from everything.
    Any,
    List(Box<Type>),
    Map(Box<Type>, Box<Type>),
    Function {
        params: Vec<Type>,
        return_type: Box<Type>,
        /// Builtin signatures like `show.log(...any)` accept any arity.
        variadic: bool,
    },
    Class(Box<ClassType>),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClassType {
    pub name: String,
    pub superclass: Option<String>,
    pub fields: Vec<(String, Type)>,
    pub methods: Vec<(String, Type)>,
}

impl ClassType {
    pub fn field(&self, name: &str) -> Option<&Type> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    pub fn method(&self, name: &str) -> Option<&Type> {
        self.methods.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::List(l), Type::List(r)) => l == r,
            (Type::Map(lk, lv), Type::Map(rk, rv)) => lk == rk && lv == rv,
            (
                Type::Function {
                    params: lp,
                    return_type: lr,
                    variadic: lv,
                },
                Type::Function {
                    params: rp,
                    return_type: rr,
                    variadic: rv,
                },
            ) => lp == rp && lr == rr && lv == rv,
            // Class identity is nominal.
            (Type::Class(l), Type::Class(r)) => l.name == r.name,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl Type {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Type::Any)
    }

    /// The directional "target accepts value" relation: `any` absorbs on
    /// either side (at any depth), `float` accepts `int`, everything else
    /// requires equality.
    pub fn assignable(target: &Type, value: &Type) -> bool {
        match (target, value) {
            (Type::Any, _) | (_, Type::Any) => true,
            (Type::Float, Type::Int) => true,
            (Type::List(t), Type::List(v)) => Type::assignable(t, v),
            (Type::Map(tk, tv), Type::Map(vk, vv)) => {
                Type::assignable(tk, vk) && Type::assignable(tv, vv)
            }
            (
                Type::Function {
                    params: tp,
                    return_type: tr,
                    ..
                },
                Type::Function {
                    params: vp,
                    return_type: vr,
                    ..
                },
            ) => {
                tp.len() == vp.len()
                    && tp.iter().zip(vp).all(|(t, v)| Type::assignable(t, v))
                    && Type::assignable(tr, vr)
            }
            _ => target == value,
        }
    }

    /// The joined type of two branches or elements: equal types stay,
    /// int/float widen, anything else collapses to `any`.
    pub fn unify(&self, other: &Type) -> Type {
        if self == other {
            return self.clone();
        }
        match (self, other) {
            (Type::Int, Type::Float) | (Type::Float, Type::Int) => Type::Float,
            _ => Type::Any,
        }
    }
}

impl From<&TypeName> for Type {
    fn from(value: &TypeName) -> Self {
        match value {
            TypeName::Int => Type::Int,
            TypeName::Float => Type::Float,
            TypeName::String => Type::String,
            TypeName::Bool => Type::Bool,
            TypeName::List => Type::List(Box::new(Type::Any)),
            TypeName::Map => Type::Map(Box::new(Type::Any), Box::new(Type::Any)),
            TypeName::Any => Type::Any,
            // Named types resolve through the scope; unresolved names are
            // reported by the analyser and degrade to `any`.
            TypeName::Named(_) => Type::Any,
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int => f.write_str("int"),
            Type::Float => f.write_str("float"),
            Type::String => f.write_str("string"),
            Type::Bool => f.write_str("bool"),
            Type::Null => f.write_str("null"),
            Type::Any => f.write_str("any"),
            Type::List(inner) => write!(f, "list<{inner}>"),
            Type::Map(key, value) => write!(f, "map<{key}, {value}>"),
            Type::Function {
                params,
                return_type,
                variadic,
            } => {
                let params = params
                    .iter()
                    .map(Type::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                if *variadic {
                    write!(f, "func(...{params}) -> {return_type}")
                } else {
                    write!(f, "func({params}) -> {return_type}")
                }
            }
            Type::Class(class) => write!(f, "class {}", class.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignable_is_reflexive() {
        let types = [
            Type::Int,
            Type::Float,
            Type::String,
            Type::Bool,
            Type::Null,
            Type::Any,
            Type::List(Box::new(Type::Int)),
            Type::Map(Box::new(Type::String), Box::new(Type::Float)),
        ];
        for ty in &types {
            assert!(Type::assignable(ty, ty), "{ty} should accept itself");
        }
    }

    #[test]
    fn test_any_absorbs_both_directions() {
        assert!(Type::assignable(&Type::Any, &Type::Int));
        assert!(Type::assignable(&Type::Int, &Type::Any));
        assert!(Type::assignable(
            &Type::List(Box::new(Type::Any)),
            &Type::List(Box::new(Type::Int))
        ));
    }

    #[test]
    fn test_float_widens_int() {
        assert!(Type::assignable(&Type::Float, &Type::Int));
        assert!(!Type::assignable(&Type::Int, &Type::Float));
    }

    #[test]
    fn test_no_other_coercions() {
        assert!(!Type::assignable(&Type::String, &Type::Int));
        assert!(!Type::assignable(&Type::Bool, &Type::Int));
        assert!(!Type::assignable(
            &Type::List(Box::new(Type::Int)),
            &Type::List(Box::new(Type::String))
        ));
    }

    #[test]
    fn test_class_equality_is_nominal() {
        let a = Type::Class(Box::new(ClassType {
            name: "Point".into(),
            superclass: None,
            fields: vec![("x".into(), Type::Int)],
            methods: vec![],
        }));
        let b = Type::Class(Box::new(ClassType {
            name: "Point".into(),
            superclass: None,
            fields: vec![],
            methods: vec![],
        }));
        let c = Type::Class(Box::new(ClassType {
            name: "Other".into(),
            superclass: None,
            fields: vec![("x".into(), Type::Int)],
            methods: vec![],
        }));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_unify_widens_numbers() {
        assert_eq!(Type::Int.unify(&Type::Float), Type::Float);
        assert_eq!(Type::Int.unify(&Type::Int), Type::Int);
        assert_eq!(Type::Int.unify(&Type::String), Type::Any);
    }
}
