//! Semantic analysis: scope construction and type checking.
//!
//! The analyser traverses the AST once, building a tree of scopes and
//! accumulating diagnostics. It never mutates the AST and never aborts;
//! unresolved constructs degrade to `any` so one mistake does not cascade.

pub mod builtins;
mod scope;
mod types;

pub use scope::{define, resolve, resolve_local, Scope, ScopeRef, Symbol, SymbolTable};
pub use types::{ClassType, Type};

use std::collections::HashMap;

use log::debug;

use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::lexer::Span;
use crate::parser::ast::{
    ArrowBody, Block, ClassDecl, ElseBranch, Expression, FunctionDecl, Ident, ImportTarget,
    InfixOperator, Number, Parameter, Pattern, PrefixOperator, Program, Statement, TemplatePart,
    TypeName, VarBinding,
};

pub fn analyze(program: &Program) -> (SymbolTable, Vec<Diagnostic>) {
    let mut checker = TypeChecker::new();
    for statement in &program.statements {
        checker.check_statement(statement);
    }
    debug!(
        "semantic analysis finished with {} diagnostics",
        checker.diagnostics.len()
    );
    (
        SymbolTable {
            root: checker.root,
        },
        checker.diagnostics,
    )
}

/// Typed bindings and assignments accept anything assignable plus the
/// primitive pairs the evaluator coerces automatically (int, float, string
/// and bool convert into each other at runtime).
fn binding_compatible(target: &Type, value: &Type) -> bool {
    let coercible =
        |ty: &Type| matches!(ty, Type::Int | Type::Float | Type::String | Type::Bool);
    Type::assignable(target, value) || (coercible(target) && coercible(value))
}

struct TypeChecker {
    root: ScopeRef,
    current: ScopeRef,
    diagnostics: Vec<Diagnostic>,
    classes: HashMap<String, ClassType>,
    /// Stack of enclosing function signatures: (return type, is_void).
    returns: Vec<(Type, bool)>,
    /// Stack of enclosing class types for `this`/`super`.
    class_stack: Vec<ClassType>,
    loop_depth: usize,
}

impl TypeChecker {
    fn new() -> Self {
        let root = Scope::root();
        builtins::install_builtins(&root);
        TypeChecker {
            current: std::rc::Rc::clone(&root),
            root,
            diagnostics: vec![],
            classes: HashMap::new(),
            returns: vec![],
            class_stack: vec![],
            loop_depth: 0,
        }
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    fn enter_scope(&mut self, name: impl Into<String>, is_function_boundary: bool) -> ScopeRef {
        let child = Scope::child(&self.current, name, is_function_boundary);
        std::mem::replace(&mut self.current, child)
    }

    fn exit_scope(&mut self, previous: ScopeRef) {
        self.current = previous;
    }

    fn resolve_type_name(&mut self, type_name: &TypeName, span: &Span) -> Type {
        if let TypeName::Named(name) = type_name {
            return match self.classes.get(name) {
                Some(class) => Type::Class(Box::new(class.clone())),
                None => {
                    self.report(Diagnostic::error(
                        ErrorCode::UndefinedSymbol,
                        format!("unknown type '{name}'"),
                        span,
                    ));
                    Type::Any
                }
            };
        }
        Type::from(type_name)
    }

    // ------------------------------------------------------------------
    // statements

    fn check_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::VarBinding(binding) => self.check_var_binding(binding),
            Statement::FunctionDecl(decl) => self.check_function_decl(decl),
            Statement::ClassDecl(decl) => self.check_class_decl(decl),
            Statement::Return { value, span } => self.check_return(value.as_ref(), span),
            Statement::If(if_statement) => {
                self.check_condition(&if_statement.condition);
                self.check_block_scoped(&if_statement.consequence, "if");
                let mut alternative = if_statement.alternative.as_ref();
                while let Some(branch) = alternative {
                    match branch {
                        ElseBranch::Block(block) => {
                            self.check_block_scoped(block, "else");
                            alternative = None;
                        }
                        ElseBranch::If(nested) => {
                            self.check_condition(&nested.condition);
                            self.check_block_scoped(&nested.consequence, "elif");
                            alternative = nested.alternative.as_ref();
                        }
                    }
                }
            }
            Statement::While {
                condition, body, ..
            } => {
                self.check_condition(condition);
                self.loop_depth += 1;
                self.check_block_scoped(body, "while");
                self.loop_depth -= 1;
            }
            Statement::For(for_statement) => {
                let previous = self.enter_scope("for", false);
                self.check_statement(&for_statement.init);
                self.check_condition(&for_statement.condition);
                self.check_statement(&for_statement.post);
                self.loop_depth += 1;
                self.check_block_scoped(&for_statement.body, "for body");
                self.loop_depth -= 1;
                self.exit_scope(previous);
            }
            Statement::ForIn {
                variable,
                iterable,
                body,
                ..
            } => {
                let iterable_ty = self.infer_expression(iterable);
                let element_ty = match &iterable_ty {
                    Type::List(element) => element.as_ref().clone(),
                    Type::String => Type::String,
                    Type::Any => Type::Any,
                    other => {
                        self.report(
                            Diagnostic::error(
                                ErrorCode::InvalidOperandTypes,
                                format!("cannot iterate over a value of type {other}"),
                                &iterable.span(),
                            )
                            .with_received(other.to_string()),
                        );
                        Type::Any
                    }
                };
                let previous = self.enter_scope("for-in", false);
                define(&self.current, variable.clone(), element_ty, false);
                self.loop_depth += 1;
                self.check_block_scoped(body, "for-in body");
                self.loop_depth -= 1;
                self.exit_scope(previous);
            }
            Statement::Break { span } | Statement::Continue { span } => {
                if self.loop_depth == 0 {
                    let keyword = if matches!(statement, Statement::Break { .. }) {
                        "break"
                    } else {
                        "continue"
                    };
                    self.report(Diagnostic::error(
                        ErrorCode::BreakOutsideLoop,
                        format!("'{keyword}' used outside of a loop"),
                        span,
                    ));
                }
            }
            Statement::Try(try_statement) => {
                self.check_block_scoped(&try_statement.body, "try");
                if let Some(catch) = &try_statement.catch {
                    let previous = self.enter_scope("catch", false);
                    if let Some(parameter) = &catch.parameter {
                        define(&self.current, parameter.clone(), Type::String, false);
                    }
                    for statement in &catch.body.statements {
                        self.check_statement(statement);
                    }
                    self.exit_scope(previous);
                }
                if let Some(finally) = &try_statement.finally {
                    self.check_block_scoped(finally, "finally");
                }
            }
            Statement::Throw { value, .. } => {
                self.infer_expression(value);
            }
            Statement::Block(block) => self.check_block_scoped(block, "block"),
            Statement::Expression(expression) => {
                self.infer_expression(expression);
            }
            Statement::Import { target, span } => self.check_import(target, span),
            Statement::Export { inner, .. } => self.check_statement(inner),
            Statement::Switch(switch) => {
                self.infer_expression(&switch.discriminant);
                for case in &switch.cases {
                    self.infer_expression(&case.value);
                    let previous = self.enter_scope("case", false);
                    for statement in &case.body {
                        self.check_statement(statement);
                    }
                    self.exit_scope(previous);
                }
                if let Some(default) = &switch.default {
                    let previous = self.enter_scope("default", false);
                    for statement in default {
                        self.check_statement(statement);
                    }
                    self.exit_scope(previous);
                }
            }
            Statement::Match(match_statement) => {
                let discriminant_ty = self.infer_expression(&match_statement.discriminant);
                for arm in &match_statement.arms {
                    let previous = self.enter_scope("match arm", false);
                    match &arm.pattern {
                        Pattern::Literal(literal) => {
                            self.infer_expression(literal);
                        }
                        Pattern::Binder { name, .. } => {
                            define(&self.current, name.clone(), discriminant_ty.clone(), false);
                        }
                        Pattern::Type {
                            type_name,
                            binder,
                            span,
                        } => {
                            let ty = self.resolve_type_name(type_name, span);
                            if let Some(binder) = binder {
                                define(&self.current, binder.clone(), ty, false);
                            }
                        }
                    }
                    for statement in &arm.body.statements {
                        self.check_statement(statement);
                    }
                    self.exit_scope(previous);
                }
            }
            Statement::Spawn { body, .. } => {
                // A spawned block materialises a closure, so its scope is a
                // function boundary for capture tracking.
                let previous = self.enter_scope("spawn", true);
                for statement in &body.statements {
                    self.check_statement(statement);
                }
                self.exit_scope(previous);
            }
        }
    }

    fn check_var_binding(&mut self, binding: &VarBinding) {
        let value_ty = self.infer_expression(&binding.value);

        if let Some(existing) = resolve_local(&self.current, &binding.name) {
            if existing.constant {
                self.report(Diagnostic::error(
                    ErrorCode::RedefinedConstant,
                    format!("constant '{}' is already defined", binding.name),
                    &binding.span,
                ));
            }
        }

        let symbol_ty = match &binding.type_annotation {
            Some(annotation) => {
                let annotated = self.resolve_type_name(annotation, &binding.span);
                if !binding_compatible(&annotated, &value_ty) {
                    self.report(
                        Diagnostic::error(
                            ErrorCode::TypeMismatch,
                            format!("initialiser is not assignable to '{}'", binding.name),
                            &binding.value.span(),
                        )
                        .with_expected(annotated.to_string())
                        .with_received(value_ty.to_string()),
                    );
                }
                annotated
            }
            None => value_ty,
        };

        define(&self.current, binding.name.clone(), symbol_ty, binding.constant);
    }

    fn function_type(&mut self, params: &[Parameter], return_type: Option<&TypeName>, span: &Span) -> Type {
        let param_types = params
            .iter()
            .map(|p| {
                p.type_annotation
                    .as_ref()
                    .map(|t| self.resolve_type_name(t, &p.span))
                    .unwrap_or(Type::Any)
            })
            .collect();
        let return_ty = return_type
            .map(|t| self.resolve_type_name(t, span))
            .unwrap_or(Type::Any);
        Type::Function {
            params: param_types,
            return_type: Box::new(return_ty),
            variadic: false,
        }
    }

    fn check_function_decl(&mut self, decl: &FunctionDecl) {
        let fn_type = self.function_type(&decl.params, decl.return_type.as_ref(), &decl.span);
        define(&self.current, decl.name.clone(), fn_type.clone(), false);
        self.check_function_body(&decl.name, &decl.params, &fn_type, decl.is_void, &decl.body);
    }

    fn check_function_body(
        &mut self,
        name: &str,
        params: &[Parameter],
        fn_type: &Type,
        is_void: bool,
        body: &Block,
    ) {
        let Type::Function {
            params: param_types,
            return_type,
            ..
        } = fn_type
        else {
            return;
        };

        let previous = self.enter_scope(format!("fn {name}"), true);
        for (parameter, ty) in params.iter().zip(param_types) {
            define(&self.current, parameter.name.clone(), ty.clone(), false);
        }
        self.returns.push((return_type.as_ref().clone(), is_void));
        let saved_loop_depth = std::mem::take(&mut self.loop_depth);
        for statement in &body.statements {
            self.check_statement(statement);
        }
        self.loop_depth = saved_loop_depth;
        self.returns.pop();
        self.exit_scope(previous);
    }

    fn check_class_decl(&mut self, decl: &ClassDecl) {
        let superclass = match &decl.superclass {
            Some(name) => {
                if !self.classes.contains_key(name) {
                    self.report(Diagnostic::error(
                        ErrorCode::UndefinedSymbol,
                        format!("unknown superclass '{name}'"),
                        &decl.span,
                    ));
                    None
                } else {
                    Some(name.clone())
                }
            }
            None => None,
        };

        let mut fields = vec![];
        for field in &decl.fields {
            let ty = match &field.type_annotation {
                Some(annotation) => self.resolve_type_name(annotation, &field.span),
                None => self.infer_expression(&field.default),
            };
            fields.push((field.name.clone(), ty));
        }

        let mut methods = vec![];
        for method in &decl.methods {
            let ty = self.function_type(&method.params, method.return_type.as_ref(), &method.span);
            methods.push((method.name.clone(), ty));
        }
        if let Some(constructor) = &decl.constructor {
            let ty = self.function_type(
                &constructor.params,
                constructor.return_type.as_ref(),
                &constructor.span,
            );
            methods.push(("init".into(), ty));
        }

        let class_type = ClassType {
            name: decl.name.clone(),
            superclass,
            fields,
            methods,
        };
        self.classes.insert(decl.name.clone(), class_type.clone());
        define(
            &self.current,
            decl.name.clone(),
            Type::Class(Box::new(class_type.clone())),
            false,
        );

        self.class_stack.push(class_type.clone());
        for method in decl.methods.iter().chain(decl.constructor.iter()) {
            let fn_type = self.function_type(&method.params, method.return_type.as_ref(), &method.span);
            let previous = self.enter_scope(format!("method {}.{}", decl.name, method.name), true);
            define(
                &self.current,
                "this",
                Type::Class(Box::new(class_type.clone())),
                true,
            );
            let Type::Function {
                params: param_types,
                return_type,
                ..
            } = &fn_type
            else {
                unreachable!("function_type always builds a function");
            };
            for (parameter, ty) in method.params.iter().zip(param_types) {
                define(&self.current, parameter.name.clone(), ty.clone(), false);
            }
            self.returns
                .push((return_type.as_ref().clone(), method.is_void));
            for statement in &method.body.statements {
                self.check_statement(statement);
            }
            self.returns.pop();
            self.exit_scope(previous);
        }
        self.class_stack.pop();
    }

    fn check_return(&mut self, value: Option<&Expression>, span: &Span) {
        let Some((return_type, is_void)) = self.returns.last().cloned() else {
            self.report(Diagnostic::error(
                ErrorCode::ReturnTypeMismatch,
                "return used outside of a function",
                span,
            ));
            if let Some(value) = value {
                self.infer_expression(value);
            }
            return;
        };

        match value {
            Some(value) => {
                let value_ty = self.infer_expression(value);
                if is_void {
                    self.report(Diagnostic::error(
                        ErrorCode::ReturnTypeMismatch,
                        "void function may not return a value",
                        span,
                    ));
                } else if !Type::assignable(&return_type, &value_ty) {
                    self.report(
                        Diagnostic::error(
                            ErrorCode::ReturnTypeMismatch,
                            "return value does not match the function's return type",
                            &value.span(),
                        )
                        .with_expected(return_type.to_string())
                        .with_received(value_ty.to_string()),
                    );
                }
            }
            None => {
                if !is_void && !matches!(return_type, Type::Null | Type::Any) {
                    self.report(
                        Diagnostic::error(
                            ErrorCode::ReturnTypeMismatch,
                            "bare return in a function with a declared return type",
                            span,
                        )
                        .with_expected(return_type.to_string()),
                    );
                }
            }
        }
    }

    fn check_import(&mut self, target: &ImportTarget, span: &Span) {
        match target {
            ImportTarget::Module(name) => match builtins::stdlib_module(name) {
                Some(ty) => define(&self.current, name.clone(), ty, true),
                None => self.report(
                    Diagnostic::error(
                        ErrorCode::UnknownModule,
                        format!("unknown module '{name}'"),
                        span,
                    )
                    .with_suggestion(
                        "available modules: math, string, json, io, time, list, map",
                    ),
                ),
            },
            ImportTarget::Path(path) => {
                // Local file imports are an open question upstream; warn
                // instead of guessing a semantics.
                self.report(Diagnostic::warning(
                    ErrorCode::UnknownModule,
                    format!("module path '{path}' is not resolved"),
                    span,
                ));
                let name = path
                    .rsplit('/')
                    .next()
                    .unwrap_or(path)
                    .trim_end_matches(".zylo")
                    .to_owned();
                define(&self.current, name, Type::Any, false);
            }
        }
    }

    fn check_condition(&mut self, condition: &Expression) {
        let ty = self.infer_expression(condition);
        if !matches!(ty, Type::Bool | Type::Any) {
            self.report(
                Diagnostic::error(
                    ErrorCode::InvalidCondition,
                    "condition must be a boolean",
                    &condition.span(),
                )
                .with_expected(Type::Bool.to_string())
                .with_received(ty.to_string()),
            );
        }
    }

    fn check_block_scoped(&mut self, block: &Block, name: &str) {
        let previous = self.enter_scope(name, false);
        for statement in &block.statements {
            self.check_statement(statement);
        }
        self.exit_scope(previous);
    }

    // ------------------------------------------------------------------
    // expressions

    fn infer_expression(&mut self, expression: &Expression) -> Type {
        match expression {
            Expression::NumberLit { value, .. } => match value {
                Number::Integer(_) => Type::Int,
                Number::Float(_) => Type::Float,
            },
            Expression::StringLit { .. } => Type::String,
            Expression::TemplateString { parts, .. } => {
                for part in parts {
                    if let TemplatePart::Expr(inner) = part {
                        self.infer_expression(inner);
                    }
                }
                Type::String
            }
            Expression::BooleanLit { .. } => Type::Bool,
            Expression::NullLit { .. } => Type::Null,
            Expression::ListLit { elements, .. } => {
                let mut element_ty: Option<Type> = None;
                for element in elements {
                    let ty = self.infer_expression(element);
                    element_ty = Some(match element_ty {
                        Some(acc) => acc.unify(&ty),
                        None => ty,
                    });
                }
                Type::List(Box::new(element_ty.unwrap_or(Type::Any)))
            }
            Expression::MapLit { entries, .. } => {
                let mut value_ty: Option<Type> = None;
                for (key, value) in entries {
                    let key_ty = self.infer_expression(key);
                    if !matches!(key_ty, Type::String | Type::Any) {
                        self.report(
                            Diagnostic::error(
                                ErrorCode::TypeMismatch,
                                "map keys must be strings",
                                &key.span(),
                            )
                            .with_expected(Type::String.to_string())
                            .with_received(key_ty.to_string()),
                        );
                    }
                    let ty = self.infer_expression(value);
                    value_ty = Some(match value_ty {
                        Some(acc) => acc.unify(&ty),
                        None => ty,
                    });
                }
                Type::Map(
                    Box::new(Type::String),
                    Box::new(value_ty.unwrap_or(Type::Any)),
                )
            }
            Expression::SetLit { elements, .. } => {
                let mut element_ty: Option<Type> = None;
                for element in elements {
                    let ty = self.infer_expression(element);
                    element_ty = Some(match element_ty {
                        Some(acc) => acc.unify(&ty),
                        None => ty,
                    });
                }
                Type::List(Box::new(element_ty.unwrap_or(Type::Any)))
            }
            Expression::Identifier(ident) => self.infer_identifier(ident),
            Expression::Prefix {
                operator,
                operand,
                span,
            } => {
                let operand_ty = self.infer_expression(operand);
                match operator {
                    PrefixOperator::Negate => {
                        if operand_ty.is_numeric() || operand_ty.is_any() {
                            operand_ty
                        } else {
                            self.report(
                                Diagnostic::error(
                                    ErrorCode::InvalidOperandTypes,
                                    "unary '-' requires a numeric operand",
                                    span,
                                )
                                .with_received(operand_ty.to_string()),
                            );
                            Type::Any
                        }
                    }
                    PrefixOperator::Not => Type::Bool,
                }
            }
            Expression::Infix {
                left,
                operator,
                right,
                span,
            } => self.infer_infix(left, *operator, right, span),
            Expression::Assign {
                target,
                operator: _,
                value,
                span,
            } => self.infer_assignment(target, value, span),
            Expression::Call { callee, args, span } => self.infer_call(callee, args, span),
            Expression::MethodCall {
                object,
                method,
                args,
                span,
            } => self.infer_method_call(object, method, args, span),
            Expression::Member {
                object,
                property,
                span,
            } => self.infer_member(object, property, span),
            Expression::Index {
                object,
                index,
                span,
            } => self.infer_index(object, index, span),
            Expression::Slice {
                object,
                start,
                end,
                span,
            } => {
                for bound in [start, end].into_iter().flatten() {
                    let bound_ty = self.infer_expression(bound);
                    if !matches!(bound_ty, Type::Int | Type::Any) {
                        self.report(
                            Diagnostic::error(
                                ErrorCode::TypeMismatch,
                                "slice bounds must be integers",
                                &bound.span(),
                            )
                            .with_expected(Type::Int.to_string())
                            .with_received(bound_ty.to_string()),
                        );
                    }
                }
                let object_ty = self.infer_expression(object);
                match object_ty {
                    Type::List(_) | Type::String | Type::Any => object_ty,
                    other => {
                        self.report(
                            Diagnostic::error(
                                ErrorCode::InvalidOperandTypes,
                                format!("cannot slice a value of type {other}"),
                                span,
                            )
                            .with_received(other.to_string()),
                        );
                        Type::Any
                    }
                }
            }
            Expression::Range { start, end, span } => {
                for bound in [start, end] {
                    let ty = self.infer_expression(bound);
                    if !matches!(ty, Type::Int | Type::Any) {
                        self.report(
                            Diagnostic::error(
                                ErrorCode::InvalidOperandTypes,
                                "range bounds must be integers",
                                span,
                            )
                            .with_received(ty.to_string()),
                        );
                    }
                }
                Type::List(Box::new(Type::Int))
            }
            Expression::This { span } => match self.class_stack.last() {
                Some(class) => Type::Class(Box::new(class.clone())),
                None => {
                    self.report(Diagnostic::error(
                        ErrorCode::UndefinedSymbol,
                        "'this' used outside of a class",
                        span,
                    ));
                    Type::Any
                }
            },
            Expression::SuperRef { span } => {
                let superclass = self
                    .class_stack
                    .last()
                    .and_then(|c| c.superclass.clone())
                    .and_then(|name| self.classes.get(&name).cloned());
                match superclass {
                    Some(class) => Type::Class(Box::new(class)),
                    None => {
                        self.report(Diagnostic::error(
                            ErrorCode::UndefinedSymbol,
                            "'super' used outside of a class with a superclass",
                            span,
                        ));
                        Type::Any
                    }
                }
            }
            Expression::Await { inner, .. } => self.infer_expression(inner),
            Expression::Cast { value, target, span } => {
                self.infer_expression(value);
                self.resolve_type_name(target, span)
            }
            Expression::IfExpr {
                then_value,
                condition,
                else_value,
                ..
            } => {
                self.check_condition(condition);
                let then_ty = self.infer_expression(then_value);
                let else_ty = self.infer_expression(else_value);
                then_ty.unify(&else_ty)
            }
            Expression::BlockExpr(block) => {
                self.check_block_scoped(block, "block");
                Type::Any
            }
            Expression::FunctionLit {
                params,
                return_type,
                body,
                span,
                ..
            } => {
                let fn_type = self.function_type(params, return_type.as_ref(), span);
                self.check_function_body("<anonymous>", params, &fn_type, false, body);
                fn_type
            }
            Expression::ArrowFunction {
                params,
                return_type,
                body,
                span,
            } => {
                let fn_type = self.function_type(params, return_type.as_ref(), span);
                match body {
                    ArrowBody::Block(block) => {
                        self.check_function_body("<arrow>", params, &fn_type, false, block);
                        fn_type
                    }
                    ArrowBody::Expr(expression) => {
                        let Type::Function {
                            params: param_types,
                            return_type: declared_return,
                            ..
                        } = &fn_type
                        else {
                            unreachable!("function_type always builds a function");
                        };
                        let previous = self.enter_scope("fn <arrow>", true);
                        for (parameter, ty) in params.iter().zip(param_types) {
                            define(&self.current, parameter.name.clone(), ty.clone(), false);
                        }
                        let body_ty = self.infer_expression(expression);
                        self.exit_scope(previous);

                        let return_ty = if return_type.is_some() {
                            declared_return.as_ref().clone()
                        } else {
                            body_ty
                        };
                        Type::Function {
                            params: param_types.clone(),
                            return_type: Box::new(return_ty),
                            variadic: false,
                        }
                    }
                }
            }
        }
    }

    fn infer_identifier(&mut self, ident: &Ident) -> Type {
        match resolve(&self.current, &ident.name) {
            Some(symbol) => symbol.ty,
            None => {
                self.report(
                    Diagnostic::error(
                        ErrorCode::UndefinedSymbol,
                        format!("undefined variable '{}'", ident.name),
                        &ident.span,
                    )
                    .with_suggestion(format!("declare it first, e.g. '{} := ...'", ident.name)),
                );
                Type::Any
            }
        }
    }

    fn infer_infix(
        &mut self,
        left: &Expression,
        operator: InfixOperator,
        right: &Expression,
        span: &Span,
    ) -> Type {
        let left_ty = self.infer_expression(left);
        let right_ty = self.infer_expression(right);

        let numeric = |ty: &Type| ty.is_numeric() || ty.is_any();
        let widened = |l: &Type, r: &Type| {
            if l.is_any() || r.is_any() {
                Type::Any
            } else if matches!(l, Type::Float) || matches!(r, Type::Float) {
                Type::Float
            } else {
                Type::Int
            }
        };

        match operator {
            InfixOperator::Add => {
                let stringish =
                    |ty: &Type| matches!(ty, Type::String | Type::Int | Type::Float | Type::Any);
                if (matches!(left_ty, Type::String) && stringish(&right_ty))
                    || (matches!(right_ty, Type::String) && stringish(&left_ty))
                {
                    Type::String
                } else if numeric(&left_ty) && numeric(&right_ty) {
                    widened(&left_ty, &right_ty)
                } else {
                    self.invalid_operands("+", &left_ty, &right_ty, span);
                    Type::Any
                }
            }
            InfixOperator::Subtract
            | InfixOperator::Multiply
            | InfixOperator::Divide
            | InfixOperator::Modulo
            | InfixOperator::Power
            | InfixOperator::FloorDivide => {
                if numeric(&left_ty) && numeric(&right_ty) {
                    widened(&left_ty, &right_ty)
                } else {
                    self.invalid_operands(operator.symbol(), &left_ty, &right_ty, span);
                    Type::Any
                }
            }
            InfixOperator::LessThan
            | InfixOperator::LessOrEqual
            | InfixOperator::GreaterThan
            | InfixOperator::GreaterOrEqual => {
                if !(numeric(&left_ty) && numeric(&right_ty)) {
                    self.invalid_operands(operator.symbol(), &left_ty, &right_ty, span);
                }
                Type::Bool
            }
            InfixOperator::Equal
            | InfixOperator::NotEqual
            | InfixOperator::And
            | InfixOperator::Or
            | InfixOperator::In => Type::Bool,
        }
    }

    fn invalid_operands(&mut self, operator: &str, left: &Type, right: &Type, span: &Span) {
        self.report(
            Diagnostic::error(
                ErrorCode::InvalidOperandTypes,
                format!("operator '{operator}' cannot combine {left} and {right}"),
                span,
            )
            .with_received(format!("{left}, {right}")),
        );
    }

    fn infer_assignment(&mut self, target: &Expression, value: &Expression, span: &Span) -> Type {
        let value_ty = self.infer_expression(value);

        match target {
            Expression::Identifier(ident) => match resolve(&self.current, &ident.name) {
                Some(symbol) => {
                    if symbol.constant {
                        // Reassignment of a constant is an execution error
                        // (the evaluator raises it); surface a warning here.
                        self.report(Diagnostic::warning(
                            ErrorCode::RedefinedConstant,
                            format!("reassignment of constant '{}' will fail at runtime", ident.name),
                            span,
                        ));
                    } else if !binding_compatible(&symbol.ty, &value_ty) {
                        self.report(
                            Diagnostic::error(
                                ErrorCode::TypeMismatch,
                                format!("value is not assignable to '{}'", ident.name),
                                &value.span(),
                            )
                            .with_expected(symbol.ty.to_string())
                            .with_received(value_ty.to_string()),
                        );
                    }
                }
                None => {
                    self.report(Diagnostic::error(
                        ErrorCode::UndefinedSymbol,
                        format!("assignment to undefined variable '{}'", ident.name),
                        &ident.span,
                    ));
                }
            },
            Expression::Member { object, .. } => {
                self.infer_expression(object);
            }
            Expression::Index { object, index, .. } => {
                self.infer_expression(object);
                self.infer_expression(index);
            }
            _ => {}
        }

        value_ty
    }

    fn infer_call(&mut self, callee: &Expression, args: &[Expression], span: &Span) -> Type {
        let callee_ty = self.infer_expression(callee);
        let arg_types: Vec<Type> = args.iter().map(|a| self.infer_expression(a)).collect();

        match callee_ty {
            Type::Function {
                params,
                return_type,
                variadic,
            } => {
                self.check_arguments(&params, variadic, &arg_types, args, span);
                return_type.as_ref().clone()
            }
            Type::Class(class) => {
                if let Some(Type::Function { params, variadic, .. }) = class.method("init").cloned()
                {
                    self.check_arguments(&params, variadic, &arg_types, args, span);
                }
                Type::Class(class)
            }
            Type::Any => Type::Any,
            other => {
                self.report(
                    Diagnostic::error(
                        ErrorCode::InvalidOperandTypes,
                        format!("value of type {other} is not callable"),
                        span,
                    )
                    .with_received(other.to_string()),
                );
                Type::Any
            }
        }
    }

    fn check_arguments(
        &mut self,
        params: &[Type],
        variadic: bool,
        arg_types: &[Type],
        args: &[Expression],
        span: &Span,
    ) {
        if variadic {
            return;
        }
        if params.len() != arg_types.len() {
            self.report(
                Diagnostic::error(
                    ErrorCode::TypeMismatch,
                    format!(
                        "call expects {} argument(s), found {}",
                        params.len(),
                        arg_types.len()
                    ),
                    span,
                )
                .with_expected(params.len().to_string())
                .with_received(arg_types.len().to_string()),
            );
            return;
        }
        for ((param, arg_ty), arg) in params.iter().zip(arg_types).zip(args) {
            if !Type::assignable(param, arg_ty) {
                self.report(
                    Diagnostic::error(
                        ErrorCode::TypeMismatch,
                        "argument type does not match the parameter",
                        &arg.span(),
                    )
                    .with_expected(param.to_string())
                    .with_received(arg_ty.to_string()),
                );
            }
        }
    }

    /// Walk a class and its superclasses for a member.
    fn lookup_class_member(&self, class: &ClassType, name: &str) -> Option<Type> {
        let mut current = Some(class.clone());
        while let Some(class) = current {
            if let Some(ty) = class.field(name) {
                return Some(ty.clone());
            }
            if let Some(ty) = class.method(name) {
                return Some(ty.clone());
            }
            current = class
                .superclass
                .as_ref()
                .and_then(|n| self.classes.get(n).cloned());
        }
        None
    }

    fn infer_method_call(
        &mut self,
        object: &Expression,
        method: &str,
        args: &[Expression],
        span: &Span,
    ) -> Type {
        let object_ty = self.infer_expression(object);
        let arg_types: Vec<Type> = args.iter().map(|a| self.infer_expression(a)).collect();

        let method_ty = match &object_ty {
            Type::Class(class) => self.lookup_class_member(class, method),
            Type::List(_) | Type::Map(_, _) | Type::String => {
                builtins::collection_method(&object_ty, method)
            }
            Type::Any => return Type::Any,
            _ => None,
        };

        match method_ty {
            Some(Type::Function {
                params,
                return_type,
                variadic,
            }) => {
                self.check_arguments(&params, variadic, &arg_types, args, span);
                return_type.as_ref().clone()
            }
            Some(other) => other,
            None => {
                self.report(
                    Diagnostic::error(
                        ErrorCode::UndefinedSymbol,
                        format!("unknown method '{method}' on {object_ty}"),
                        span,
                    )
                    .with_received(object_ty.to_string()),
                );
                Type::Any
            }
        }
    }

    fn infer_member(&mut self, object: &Expression, property: &str, span: &Span) -> Type {
        let object_ty = self.infer_expression(object);
        match &object_ty {
            Type::Class(class) => match self.lookup_class_member(class, property) {
                Some(ty) => ty,
                None => {
                    self.report(
                        Diagnostic::error(
                            ErrorCode::UndefinedSymbol,
                            format!("unknown member '{property}' on {object_ty}"),
                            span,
                        )
                        .with_received(object_ty.to_string()),
                    );
                    Type::Any
                }
            },
            Type::Any => Type::Any,
            other => {
                self.report(
                    Diagnostic::error(
                        ErrorCode::InvalidOperandTypes,
                        format!("value of type {other} has no members"),
                        span,
                    )
                    .with_received(other.to_string()),
                );
                Type::Any
            }
        }
    }

    fn infer_index(&mut self, object: &Expression, index: &Expression, span: &Span) -> Type {
        let object_ty = self.infer_expression(object);
        let index_ty = self.infer_expression(index);

        match &object_ty {
            Type::List(element) => {
                if !matches!(index_ty, Type::Int | Type::Any) {
                    self.report(
                        Diagnostic::error(
                            ErrorCode::TypeMismatch,
                            "list indices must be integers",
                            &index.span(),
                        )
                        .with_expected(Type::Int.to_string())
                        .with_received(index_ty.to_string()),
                    );
                }
                element.as_ref().clone()
            }
            Type::String => {
                if !matches!(index_ty, Type::Int | Type::Any) {
                    self.report(
                        Diagnostic::error(
                            ErrorCode::TypeMismatch,
                            "string indices must be integers",
                            &index.span(),
                        )
                        .with_expected(Type::Int.to_string())
                        .with_received(index_ty.to_string()),
                    );
                }
                Type::String
            }
            Type::Map(_, value) => {
                if !matches!(index_ty, Type::String | Type::Any) {
                    self.report(
                        Diagnostic::error(
                            ErrorCode::TypeMismatch,
                            "map keys must be strings",
                            &index.span(),
                        )
                        .with_expected(Type::String.to_string())
                        .with_received(index_ty.to_string()),
                    );
                }
                value.as_ref().clone()
            }
            Type::Any => Type::Any,
            other => {
                self.report(
                    Diagnostic::error(
                        ErrorCode::InvalidOperandTypes,
                        format!("cannot index a value of type {other}"),
                        span,
                    )
                    .with_received(other.to_string()),
                );
                Type::Any
            }
        }
    }
}
