use crate::lexer::Span;

use super::{Block, Parameter, TypeName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PrefixOperator {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum InfixOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    FloorDivide,
    Equal,
    NotEqual,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    And,
    Or,
    In,
}

impl InfixOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            InfixOperator::Add => "+",
            InfixOperator::Subtract => "-",
            InfixOperator::Multiply => "*",
            InfixOperator::Divide => "/",
            InfixOperator::Modulo => "%",
            InfixOperator::Power => "**",
            InfixOperator::FloorDivide => "//",
            InfixOperator::Equal => "==",
            InfixOperator::NotEqual => "!=",
            InfixOperator::LessThan => "<",
            InfixOperator::LessOrEqual => "<=",
            InfixOperator::GreaterThan => ">",
            InfixOperator::GreaterOrEqual => ">=",
            InfixOperator::And => "&&",
            InfixOperator::Or => "||",
            InfixOperator::In => "in",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AssignOperator {
    Assign,
    AddAssign,
    SubtractAssign,
    MultiplyAssign,
    DivideAssign,
    ModuloAssign,
}

impl AssignOperator {
    /// The arithmetic operator a compound assignment reduces to.
    pub fn binary(&self) -> Option<InfixOperator> {
        match self {
            AssignOperator::Assign => None,
            AssignOperator::AddAssign => Some(InfixOperator::Add),
            AssignOperator::SubtractAssign => Some(InfixOperator::Subtract),
            AssignOperator::MultiplyAssign => Some(InfixOperator::Multiply),
            AssignOperator::DivideAssign => Some(InfixOperator::Divide),
            AssignOperator::ModuloAssign => Some(InfixOperator::Modulo),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Number {
    Integer(i64),
    Float(f64),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

/// One segment of a template string: literal text or an interpolated
/// expression parsed out of a `${ … }` hole.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum TemplatePart {
    Text(String),
    Expr(Expression),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ArrowBody {
    Expr(Box<Expression>),
    Block(Block),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Expression {
    Identifier(Ident),
    NumberLit {
        value: Number,
        span: Span,
    },
    StringLit {
        value: String,
        span: Span,
    },
    TemplateString {
        parts: Vec<TemplatePart>,
        span: Span,
    },
    BooleanLit {
        value: bool,
        span: Span,
    },
    NullLit {
        span: Span,
    },
    ListLit {
        elements: Vec<Expression>,
        span: Span,
    },
    /// Entries keep construction order.
    MapLit {
        entries: Vec<(Expression, Expression)>,
        span: Span,
    },
    SetLit {
        elements: Vec<Expression>,
        span: Span,
    },
    Prefix {
        operator: PrefixOperator,
        operand: Box<Expression>,
        span: Span,
    },
    Infix {
        left: Box<Expression>,
        operator: InfixOperator,
        right: Box<Expression>,
        span: Span,
    },
    Assign {
        target: Box<Expression>,
        operator: AssignOperator,
        value: Box<Expression>,
        span: Span,
    },
    Call {
        callee: Box<Expression>,
        args: Vec<Expression>,
        span: Span,
    },
    /// `receiver.method(args)` for every receiver except the `show`
    /// pseudo-module, which parses as a plain [`Expression::Call`] on a
    /// member access.
    MethodCall {
        object: Box<Expression>,
        method: String,
        args: Vec<Expression>,
        span: Span,
    },
    Member {
        object: Box<Expression>,
        property: String,
        span: Span,
    },
    Index {
        object: Box<Expression>,
        index: Box<Expression>,
        span: Span,
    },
    /// `object[start:end]`, half-open; either bound may be elided.
    Slice {
        object: Box<Expression>,
        start: Option<Box<Expression>>,
        end: Option<Box<Expression>>,
        span: Span,
    },
    Range {
        start: Box<Expression>,
        end: Box<Expression>,
        span: Span,
    },
    This {
        span: Span,
    },
    SuperRef {
        span: Span,
    },
    Await {
        inner: Box<Expression>,
        span: Span,
    },
    Cast {
        value: Box<Expression>,
        target: TypeName,
        span: Span,
    },
    /// Postfix conditional: `value if condition else alternative`.
    IfExpr {
        then_value: Box<Expression>,
        condition: Box<Expression>,
        else_value: Box<Expression>,
        span: Span,
    },
    BlockExpr(Block),
    FunctionLit {
        params: Vec<Parameter>,
        return_type: Option<TypeName>,
        body: Block,
        is_async: bool,
        span: Span,
    },
    ArrowFunction {
        params: Vec<Parameter>,
        return_type: Option<TypeName>,
        body: ArrowBody,
        span: Span,
    },
}

impl Expression {
    pub fn span(&self) -> Span {
        match self {
            Expression::Identifier(Ident { span, .. })
            | Expression::NumberLit { span, .. }
            | Expression::StringLit { span, .. }
            | Expression::TemplateString { span, .. }
            | Expression::BooleanLit { span, .. }
            | Expression::NullLit { span }
            | Expression::ListLit { span, .. }
            | Expression::MapLit { span, .. }
            | Expression::SetLit { span, .. }
            | Expression::Prefix { span, .. }
            | Expression::Infix { span, .. }
            | Expression::Assign { span, .. }
            | Expression::Call { span, .. }
            | Expression::MethodCall { span, .. }
            | Expression::Member { span, .. }
            | Expression::Index { span, .. }
            | Expression::Slice { span, .. }
            | Expression::Range { span, .. }
            | Expression::This { span }
            | Expression::SuperRef { span }
            | Expression::Await { span, .. }
            | Expression::Cast { span, .. }
            | Expression::IfExpr { span, .. }
            | Expression::FunctionLit { span, .. }
            | Expression::ArrowFunction { span, .. } => *span,
            Expression::BlockExpr(block) => block.span,
        }
    }
}
