//! Dead-code elimination.
//!
//! An `if` whose condition is a boolean literal is replaced by its taken
//! branch, and statements following `return`, `break`, `continue` or
//! `throw` inside the same block are discarded.

use crate::parser::ast::{
    Block, ElseBranch, Expression, IfStatement, Program, Statement,
};

use super::OptimizerPass;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadCodeElimination;

impl OptimizerPass for DeadCodeElimination {
    fn run(&self, program: Program) -> Program {
        Program {
            statements: eliminate_statements(program.statements),
        }
    }
}

fn eliminate_statements(statements: Vec<Statement>) -> Vec<Statement> {
    let mut result = vec![];
    for statement in statements {
        let Some(statement) = eliminate_statement(statement) else {
            continue;
        };
        let diverges = statement.diverges();
        result.push(statement);
        if diverges {
            break;
        }
    }
    result
}

fn eliminate_block(block: Block) -> Block {
    Block {
        statements: eliminate_statements(block.statements),
        span: block.span,
    }
}

fn eliminate_statement(statement: Statement) -> Option<Statement> {
    let statement = match statement {
        Statement::If(if_statement) => return eliminate_if(if_statement),
        Statement::FunctionDecl(mut decl) => {
            decl.body = eliminate_block(decl.body);
            Statement::FunctionDecl(decl)
        }
        Statement::ClassDecl(mut decl) => {
            decl.constructor = decl.constructor.map(|mut c| {
                c.body = eliminate_block(c.body);
                c
            });
            decl.methods = decl
                .methods
                .into_iter()
                .map(|mut m| {
                    m.body = eliminate_block(m.body);
                    m
                })
                .collect();
            Statement::ClassDecl(decl)
        }
        Statement::While {
            condition,
            body,
            span,
        } => Statement::While {
            condition,
            body: eliminate_block(body),
            span,
        },
        Statement::For(mut for_statement) => {
            for_statement.body = eliminate_block(for_statement.body);
            Statement::For(for_statement)
        }
        Statement::ForIn {
            variable,
            iterable,
            body,
            span,
        } => Statement::ForIn {
            variable,
            iterable,
            body: eliminate_block(body),
            span,
        },
        Statement::Try(mut try_statement) => {
            try_statement.body = eliminate_block(try_statement.body);
            try_statement.catch = try_statement.catch.map(|mut catch| {
                catch.body = eliminate_block(catch.body);
                catch
            });
            try_statement.finally = try_statement.finally.map(eliminate_block);
            Statement::Try(try_statement)
        }
        Statement::Block(block) => Statement::Block(eliminate_block(block)),
        Statement::Export { inner, span } => Statement::Export {
            inner: Box::new(eliminate_statement(*inner)?),
            span,
        },
        Statement::Switch(mut switch) => {
            switch.cases = switch
                .cases
                .into_iter()
                .map(|mut case| {
                    case.body = eliminate_statements(case.body);
                    case
                })
                .collect();
            switch.default = switch.default.map(eliminate_statements);
            Statement::Switch(switch)
        }
        Statement::Match(mut match_statement) => {
            match_statement.arms = match_statement
                .arms
                .into_iter()
                .map(|mut arm| {
                    arm.body = eliminate_block(arm.body);
                    arm
                })
                .collect();
            Statement::Match(match_statement)
        }
        Statement::Spawn { body, span } => Statement::Spawn {
            body: eliminate_block(body),
            span,
        },
        other => other,
    };
    Some(statement)
}

fn eliminate_if(if_statement: IfStatement) -> Option<Statement> {
    let IfStatement {
        condition,
        consequence,
        alternative,
        span,
    } = if_statement;

    if let Expression::BooleanLit { value, .. } = condition {
        return if value {
            Some(Statement::Block(eliminate_block(consequence)))
        } else {
            match alternative {
                Some(ElseBranch::Block(block)) => Some(Statement::Block(eliminate_block(block))),
                Some(ElseBranch::If(nested)) => eliminate_if(*nested),
                None => None,
            }
        };
    }

    let alternative = alternative.and_then(|branch| match branch {
        ElseBranch::Block(block) => Some(ElseBranch::Block(eliminate_block(block))),
        ElseBranch::If(nested) => match eliminate_if(*nested)? {
            Statement::If(nested) => Some(ElseBranch::If(Box::new(nested))),
            Statement::Block(block) => Some(ElseBranch::Block(block)),
            _ => None,
        },
    });

    Some(Statement::If(IfStatement {
        condition,
        consequence: eliminate_block(consequence),
        alternative,
        span,
    }))
}
