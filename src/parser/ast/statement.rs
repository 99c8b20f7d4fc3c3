use crate::lexer::Span;

use super::{Expression, Pattern, TypeName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum Visibility {
    Public,
    Private,
    #[default]
    Package,
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub statements: Vec<Statement>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Parameter {
    pub name: String,
    pub type_annotation: Option<TypeName>,
    pub span: Span,
}

/// A single-name binding. All four surface forms (`x := v`, `x T := v`,
/// `var x = v`, `const X = v`) produce this node; bindings without an
/// initialiser are rejected at parse time.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VarBinding {
    pub name: String,
    pub type_annotation: Option<TypeName>,
    pub value: Expression,
    pub constant: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Parameter>,
    pub return_type: Option<TypeName>,
    pub body: Block,
    pub is_async: bool,
    pub is_void: bool,
    pub visibility: Visibility,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub type_annotation: Option<TypeName>,
    pub default: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClassDecl {
    pub name: String,
    pub superclass: Option<String>,
    pub fields: Vec<FieldDecl>,
    /// The method named `init`, when present.
    pub constructor: Option<FunctionDecl>,
    pub methods: Vec<FunctionDecl>,
    pub visibility: Visibility,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IfStatement {
    pub condition: Expression,
    pub consequence: Block,
    pub alternative: Option<ElseBranch>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ElseBranch {
    Block(Block),
    If(Box<IfStatement>),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ForStatement {
    pub init: Box<Statement>,
    pub condition: Expression,
    pub post: Box<Statement>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CatchClause {
    pub parameter: Option<String>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TryStatement {
    pub body: Block,
    pub catch: Option<CatchClause>,
    pub finally: Option<Block>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SwitchCase {
    pub value: Expression,
    pub body: Vec<Statement>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SwitchStatement {
    pub discriminant: Expression,
    pub cases: Vec<SwitchCase>,
    pub default: Option<Vec<Statement>>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MatchStatement {
    pub discriminant: Expression,
    pub arms: Vec<MatchArm>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ImportTarget {
    /// `import math` — a standard-library module by name.
    Module(String),
    /// `import "path/to/file"` — a module path.
    Path(String),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Statement {
    VarBinding(VarBinding),
    FunctionDecl(FunctionDecl),
    ClassDecl(ClassDecl),
    Return {
        value: Option<Expression>,
        span: Span,
    },
    If(IfStatement),
    While {
        condition: Expression,
        body: Block,
        span: Span,
    },
    For(ForStatement),
    ForIn {
        variable: String,
        iterable: Expression,
        body: Block,
        span: Span,
    },
    Break {
        span: Span,
    },
    Continue {
        span: Span,
    },
    Try(TryStatement),
    Throw {
        value: Expression,
        span: Span,
    },
    Block(Block),
    Expression(Expression),
    Import {
        target: ImportTarget,
        span: Span,
    },
    Export {
        inner: Box<Statement>,
        span: Span,
    },
    Switch(SwitchStatement),
    Match(MatchStatement),
    Spawn {
        body: Block,
        span: Span,
    },
}

impl Statement {
    pub fn span(&self) -> Span {
        match self {
            Statement::VarBinding(b) => b.span,
            Statement::FunctionDecl(f) => f.span,
            Statement::ClassDecl(c) => c.span,
            Statement::Return { span, .. }
            | Statement::While { span, .. }
            | Statement::ForIn { span, .. }
            | Statement::Break { span }
            | Statement::Continue { span }
            | Statement::Throw { span, .. }
            | Statement::Import { span, .. }
            | Statement::Export { span, .. }
            | Statement::Spawn { span, .. } => *span,
            Statement::If(i) => i.span,
            Statement::For(f) => f.span,
            Statement::Try(t) => t.span,
            Statement::Block(b) => b.span,
            Statement::Expression(e) => e.span(),
            Statement::Switch(s) => s.span,
            Statement::Match(m) => m.span,
        }
    }

    /// Whether control never reaches the statement following this one
    /// within the same block.
    pub fn diverges(&self) -> bool {
        matches!(
            self,
            Statement::Return { .. }
                | Statement::Break { .. }
                | Statement::Continue { .. }
                | Statement::Throw { .. }
        )
    }
}
