//! Constant folding: arithmetic and comparisons between literal numbers
//! collapse into the computed literal.
//!
//! Integer arithmetic wraps, matching the evaluator. Division and modulo
//! by a literal zero are left untouched so they still fail at runtime.

use crate::parser::ast::{
    ArrowBody, Block, ElseBranch, Expression, IfStatement, InfixOperator, Number, Pattern,
    PrefixOperator, Program, Statement, TemplatePart,
};

use super::OptimizerPass;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantFolding;

impl OptimizerPass for ConstantFolding {
    fn run(&self, program: Program) -> Program {
        Program {
            statements: program.statements.into_iter().map(fold_statement).collect(),
        }
    }
}

fn fold_block(block: Block) -> Block {
    Block {
        statements: block.statements.into_iter().map(fold_statement).collect(),
        span: block.span,
    }
}

fn fold_statement(statement: Statement) -> Statement {
    match statement {
        Statement::VarBinding(mut binding) => {
            binding.value = fold_expression(binding.value);
            Statement::VarBinding(binding)
        }
        Statement::FunctionDecl(mut decl) => {
            decl.body = fold_block(decl.body);
            Statement::FunctionDecl(decl)
        }
        Statement::ClassDecl(mut decl) => {
            decl.fields = decl
                .fields
                .into_iter()
                .map(|mut field| {
                    field.default = fold_expression(field.default);
                    field
                })
                .collect();
            decl.constructor = decl.constructor.map(|mut c| {
                c.body = fold_block(c.body);
                c
            });
            decl.methods = decl
                .methods
                .into_iter()
                .map(|mut m| {
                    m.body = fold_block(m.body);
                    m
                })
                .collect();
            Statement::ClassDecl(decl)
        }
        Statement::Return { value, span } => Statement::Return {
            value: value.map(fold_expression),
            span,
        },
        Statement::If(if_statement) => Statement::If(fold_if(if_statement)),
        Statement::While {
            condition,
            body,
            span,
        } => Statement::While {
            condition: fold_expression(condition),
            body: fold_block(body),
            span,
        },
        Statement::For(mut for_statement) => {
            for_statement.init = Box::new(fold_statement(*for_statement.init));
            for_statement.condition = fold_expression(for_statement.condition);
            for_statement.post = Box::new(fold_statement(*for_statement.post));
            for_statement.body = fold_block(for_statement.body);
            Statement::For(for_statement)
        }
        Statement::ForIn {
            variable,
            iterable,
            body,
            span,
        } => Statement::ForIn {
            variable,
            iterable: fold_expression(iterable),
            body: fold_block(body),
            span,
        },
        Statement::Try(mut try_statement) => {
            try_statement.body = fold_block(try_statement.body);
            try_statement.catch = try_statement.catch.map(|mut catch| {
                catch.body = fold_block(catch.body);
                catch
            });
            try_statement.finally = try_statement.finally.map(fold_block);
            Statement::Try(try_statement)
        }
        Statement::Throw { value, span } => Statement::Throw {
            value: fold_expression(value),
            span,
        },
        Statement::Block(block) => Statement::Block(fold_block(block)),
        Statement::Expression(expression) => Statement::Expression(fold_expression(expression)),
        Statement::Export { inner, span } => Statement::Export {
            inner: Box::new(fold_statement(*inner)),
            span,
        },
        Statement::Switch(mut switch) => {
            switch.discriminant = fold_expression(switch.discriminant);
            switch.cases = switch
                .cases
                .into_iter()
                .map(|mut case| {
                    case.value = fold_expression(case.value);
                    case.body = case.body.into_iter().map(fold_statement).collect();
                    case
                })
                .collect();
            switch.default = switch
                .default
                .map(|body| body.into_iter().map(fold_statement).collect());
            Statement::Switch(switch)
        }
        Statement::Match(mut match_statement) => {
            match_statement.discriminant = fold_expression(match_statement.discriminant);
            match_statement.arms = match_statement
                .arms
                .into_iter()
                .map(|mut arm| {
                    if let Pattern::Literal(literal) = arm.pattern {
                        arm.pattern = Pattern::Literal(fold_expression(literal));
                    }
                    arm.body = fold_block(arm.body);
                    arm
                })
                .collect();
            Statement::Match(match_statement)
        }
        Statement::Spawn { body, span } => Statement::Spawn {
            body: fold_block(body),
            span,
        },
        other @ (Statement::Break { .. } | Statement::Continue { .. } | Statement::Import { .. }) => {
            other
        }
    }
}

fn fold_if(if_statement: IfStatement) -> IfStatement {
    IfStatement {
        condition: fold_expression(if_statement.condition),
        consequence: fold_block(if_statement.consequence),
        alternative: if_statement.alternative.map(|branch| match branch {
            ElseBranch::Block(block) => ElseBranch::Block(fold_block(block)),
            ElseBranch::If(nested) => ElseBranch::If(Box::new(fold_if(*nested))),
        }),
        span: if_statement.span,
    }
}

pub(super) fn fold_expression(expression: Expression) -> Expression {
    match expression {
        Expression::Prefix {
            operator,
            operand,
            span,
        } => {
            let operand = fold_expression(*operand);
            if operator == PrefixOperator::Negate {
                if let Expression::NumberLit { value, .. } = &operand {
                    let folded = match value {
                        Number::Integer(v) => Number::Integer(v.wrapping_neg()),
                        Number::Float(v) => Number::Float(-v),
                    };
                    return Expression::NumberLit { value: folded, span };
                }
            }
            Expression::Prefix {
                operator,
                operand: Box::new(operand),
                span,
            }
        }
        Expression::Infix {
            left,
            operator,
            right,
            span,
        } => {
            let left = fold_expression(*left);
            let right = fold_expression(*right);

            if let (
                Expression::NumberLit { value: lhs, .. },
                Expression::NumberLit { value: rhs, .. },
            ) = (&left, &right)
            {
                if let Some(folded) = fold_numbers(lhs, operator, rhs, span) {
                    return folded;
                }
            }

            Expression::Infix {
                left: Box::new(left),
                operator,
                right: Box::new(right),
                span,
            }
        }
        Expression::Assign {
            target,
            operator,
            value,
            span,
        } => Expression::Assign {
            target,
            operator,
            value: Box::new(fold_expression(*value)),
            span,
        },
        Expression::ListLit { elements, span } => Expression::ListLit {
            elements: elements.into_iter().map(fold_expression).collect(),
            span,
        },
        Expression::SetLit { elements, span } => Expression::SetLit {
            elements: elements.into_iter().map(fold_expression).collect(),
            span,
        },
        Expression::MapLit { entries, span } => Expression::MapLit {
            entries: entries
                .into_iter()
                .map(|(k, v)| (fold_expression(k), fold_expression(v)))
                .collect(),
            span,
        },
        Expression::TemplateString { parts, span } => Expression::TemplateString {
            parts: parts
                .into_iter()
                .map(|part| match part {
                    TemplatePart::Expr(inner) => TemplatePart::Expr(fold_expression(inner)),
                    text => text,
                })
                .collect(),
            span,
        },
        Expression::Call { callee, args, span } => Expression::Call {
            callee: Box::new(fold_expression(*callee)),
            args: args.into_iter().map(fold_expression).collect(),
            span,
        },
        Expression::MethodCall {
            object,
            method,
            args,
            span,
        } => Expression::MethodCall {
            object: Box::new(fold_expression(*object)),
            method,
            args: args.into_iter().map(fold_expression).collect(),
            span,
        },
        Expression::Member {
            object,
            property,
            span,
        } => Expression::Member {
            object: Box::new(fold_expression(*object)),
            property,
            span,
        },
        Expression::Index {
            object,
            index,
            span,
        } => Expression::Index {
            object: Box::new(fold_expression(*object)),
            index: Box::new(fold_expression(*index)),
            span,
        },
        Expression::Slice {
            object,
            start,
            end,
            span,
        } => Expression::Slice {
            object: Box::new(fold_expression(*object)),
            start: start.map(|s| Box::new(fold_expression(*s))),
            end: end.map(|e| Box::new(fold_expression(*e))),
            span,
        },
        Expression::Range { start, end, span } => Expression::Range {
            start: Box::new(fold_expression(*start)),
            end: Box::new(fold_expression(*end)),
            span,
        },
        Expression::Await { inner, span } => Expression::Await {
            inner: Box::new(fold_expression(*inner)),
            span,
        },
        Expression::Cast {
            value,
            target,
            span,
        } => Expression::Cast {
            value: Box::new(fold_expression(*value)),
            target,
            span,
        },
        Expression::IfExpr {
            then_value,
            condition,
            else_value,
            span,
        } => Expression::IfExpr {
            then_value: Box::new(fold_expression(*then_value)),
            condition: Box::new(fold_expression(*condition)),
            else_value: Box::new(fold_expression(*else_value)),
            span,
        },
        Expression::BlockExpr(block) => Expression::BlockExpr(fold_block(block)),
        Expression::FunctionLit {
            params,
            return_type,
            body,
            is_async,
            span,
        } => Expression::FunctionLit {
            params,
            return_type,
            body: fold_block(body),
            is_async,
            span,
        },
        Expression::ArrowFunction {
            params,
            return_type,
            body,
            span,
        } => Expression::ArrowFunction {
            params,
            return_type,
            body: match body {
                ArrowBody::Expr(inner) => ArrowBody::Expr(Box::new(fold_expression(*inner))),
                ArrowBody::Block(block) => ArrowBody::Block(fold_block(block)),
            },
            span,
        },
        leaf => leaf,
    }
}

fn fold_numbers(
    lhs: &Number,
    operator: InfixOperator,
    rhs: &Number,
    span: crate::lexer::Span,
) -> Option<Expression> {
    use InfixOperator::*;

    // Comparisons fold for any literal-number pair, widening int to float.
    if matches!(
        operator,
        Equal | NotEqual | LessThan | LessOrEqual | GreaterThan | GreaterOrEqual
    ) {
        let (l, r) = (as_float(lhs), as_float(rhs));
        let value = match operator {
            Equal => l == r,
            NotEqual => l != r,
            LessThan => l < r,
            LessOrEqual => l <= r,
            GreaterThan => l > r,
            GreaterOrEqual => l >= r,
            _ => unreachable!(),
        };
        return Some(Expression::BooleanLit { value, span });
    }

    match (lhs, rhs) {
        (Number::Integer(l), Number::Integer(r)) => {
            let value = match operator {
                Add => l.wrapping_add(*r),
                Subtract => l.wrapping_sub(*r),
                Multiply => l.wrapping_mul(*r),
                Divide if *r != 0 => l.wrapping_div(*r),
                Modulo if *r != 0 => l.wrapping_rem(*r),
                FloorDivide if *r != 0 => floor_div(*l, *r),
                Power if *r >= 0 => wrapping_pow(*l, *r as u64),
                _ => return None,
            };
            Some(Expression::NumberLit {
                value: Number::Integer(value),
                span,
            })
        }
        _ => {
            let (l, r) = (as_float(lhs), as_float(rhs));
            let value = match operator {
                Add => l + r,
                Subtract => l - r,
                Multiply => l * r,
                Divide if r != 0.0 => l / r,
                Modulo if r != 0.0 => l % r,
                FloorDivide if r != 0.0 => (l / r).floor(),
                Power => l.powf(r),
                _ => return None,
            };
            Some(Expression::NumberLit {
                value: Number::Float(value),
                span,
            })
        }
    }
}

fn as_float(number: &Number) -> f64 {
    match number {
        Number::Integer(v) => *v as f64,
        Number::Float(v) => *v,
    }
}

pub(crate) fn floor_div(l: i64, r: i64) -> i64 {
    let quotient = l.wrapping_div(r);
    let remainder = l.wrapping_rem(r);
    if remainder != 0 && (remainder < 0) != (r < 0) {
        quotient.wrapping_sub(1)
    } else {
        quotient
    }
}

pub(crate) fn wrapping_pow(base: i64, mut exponent: u64) -> i64 {
    let mut result: i64 = 1;
    let mut base = base;
    while exponent > 0 {
        if exponent & 1 == 1 {
            result = result.wrapping_mul(base);
        }
        base = base.wrapping_mul(base);
        exponent >>= 1;
    }
    result
}
