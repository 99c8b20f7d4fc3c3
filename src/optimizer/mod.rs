//! AST-to-AST rewrites that preserve observable semantics.
//!
//! Three passes run in order: constant folding, dead-code elimination and
//! the (reserved, inert) constant propagation. The pipeline is idempotent:
//! optimising an already optimised program is a no-op.

mod constant_folding;
mod constant_propagation;
mod dead_code;

// The evaluator shares these so folded and interpreted arithmetic agree.
pub(crate) use constant_folding::{floor_div, wrapping_pow};

use constant_folding::ConstantFolding;
use constant_propagation::ConstantPropagation;
use dead_code::DeadCodeElimination;

use log::debug;

use crate::parser::ast::Program;

pub trait OptimizerPass {
    fn run(&self, program: Program) -> Program;
}

pub fn optimize(program: Program) -> Program {
    let passes: Vec<Box<&dyn OptimizerPass>> = vec![
        Box::new(&ConstantFolding),
        Box::new(&DeadCodeElimination),
        Box::new(&ConstantPropagation),
    ];

    let mut program = program;
    for pass in &passes {
        program = pass.run(program);
    }

    debug!("optimizer pipeline finished");
    program
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::ast::{Expression, Number, Statement};
    use crate::parser::Parser;

    fn optimized(source: &str) -> Program {
        let tokens = Lexer::new(source).lex();
        let (program, errors) = Parser::new(tokens).parse();
        assert!(errors.is_empty(), "parse errors: {errors:?}");
        optimize(program)
    }

    fn first_binding_value(program: &Program) -> &Expression {
        match &program.statements[0] {
            Statement::VarBinding(binding) => &binding.value,
            other => panic!("expected a binding, got {other:?}"),
        }
    }

    #[test]
    fn test_folds_integer_arithmetic() {
        let program = optimized("x := 5 + 3 * 2");
        assert_eq!(
            first_binding_value(&program),
            &Expression::NumberLit {
                value: Number::Integer(11),
                span: Default::default()
            }
        );
    }

    #[test]
    fn test_folds_comparison_to_boolean() {
        let program = optimized("x := 2 < 3");
        assert_eq!(
            first_binding_value(&program),
            &Expression::BooleanLit {
                value: true,
                span: Default::default()
            }
        );
    }

    #[test]
    fn test_does_not_fold_division_by_zero() {
        let program = optimized("x := 1 / 0");
        assert!(matches!(
            first_binding_value(&program),
            Expression::Infix { .. }
        ));
    }

    #[test]
    fn test_does_not_fold_modulo_by_zero() {
        let program = optimized("x := 1 % 0");
        assert!(matches!(
            first_binding_value(&program),
            Expression::Infix { .. }
        ));
    }

    #[test]
    fn test_folds_unary_minus() {
        let program = optimized("x := -(4)");
        assert_eq!(
            first_binding_value(&program),
            &Expression::NumberLit {
                value: Number::Integer(-4),
                span: Default::default()
            }
        );
    }

    #[test]
    fn test_integer_overflow_wraps_like_the_evaluator() {
        let program = optimized(&format!("x := {} + 1", i64::MAX));
        assert_eq!(
            first_binding_value(&program),
            &Expression::NumberLit {
                value: Number::Integer(i64::MIN),
                span: Default::default()
            }
        );
    }

    #[test]
    fn test_dead_branch_is_removed() {
        let program = optimized("if true { x := 1 } else { y := 2 }");
        let Statement::Block(block) = &program.statements[0] else {
            panic!("expected the taken branch as a block");
        };
        assert_eq!(block.statements.len(), 1);
        assert!(matches!(&block.statements[0], Statement::VarBinding(b) if b.name == "x"));
    }

    #[test]
    fn test_false_condition_without_else_disappears() {
        let program = optimized("if false { x := 1 }\ny := 2");
        assert_eq!(program.statements.len(), 1);
        assert!(matches!(&program.statements[0], Statement::VarBinding(b) if b.name == "y"));
    }

    #[test]
    fn test_statements_after_return_are_dropped() {
        let program = optimized("func f() { return 1\nx := 2 }");
        let Statement::FunctionDecl(decl) = &program.statements[0] else {
            panic!("expected a function declaration");
        };
        assert_eq!(decl.body.statements.len(), 1);
    }

    #[test]
    fn test_optimizer_is_idempotent() {
        let source = "x := 1 + 2\nif true { show.log(x) }\nfunc f() { return 1\ny := 2 }";
        let once = optimized(source);
        let twice = optimize(once.clone());
        assert_eq!(once, twice);
    }
}
