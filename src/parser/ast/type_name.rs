use std::fmt::Display;

/// A parsed type annotation. Class references stay by-name and are
/// resolved against the symbol table, never by pointer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TypeName {
    Int,
    Float,
    String,
    Bool,
    List,
    Map,
    Any,
    Named(String),
}

impl Display for TypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeName::Int => f.write_str("int"),
            TypeName::Float => f.write_str("float"),
            TypeName::String => f.write_str("string"),
            TypeName::Bool => f.write_str("bool"),
            TypeName::List => f.write_str("list"),
            TypeName::Map => f.write_str("map"),
            TypeName::Any => f.write_str("any"),
            TypeName::Named(name) => f.write_str(name),
        }
    }
}
