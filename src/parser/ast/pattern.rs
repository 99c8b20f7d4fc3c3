use crate::lexer::Span;

use super::{Expression, TypeName};

/// Patterns appear only in `match` arms.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Pattern {
    /// A literal value the discriminant is compared against.
    Literal(Expression),
    /// An irrefutable binder, e.g. `case other { … }`.
    Binder { name: String, span: Span },
    /// A runtime-kind test with an optional binder, e.g. `case int n { … }`.
    Type {
        type_name: TypeName,
        binder: Option<String>,
        span: Span,
    },
}

impl Pattern {
    pub fn span(&self) -> Span {
        match self {
            Pattern::Literal(expr) => expr.span(),
            Pattern::Binder { span, .. } | Pattern::Type { span, .. } => *span,
        }
    }
}
