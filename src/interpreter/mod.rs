//! The tree-walking evaluator.
//!
//! Statement evaluation yields a [`Signal`] (normal value or one of the
//! control-flow sentinels); runtime failures travel as [`RuntimeError`]
//! through `Result`, never as host panics. The interpreter itself runs
//! single-threaded; `spawn` blocks and `async` calls run on background
//! threads that synchronise with the caller through single-slot futures.

pub mod builtins;
mod environment;
mod value;

pub use environment::Environment;
pub use value::*;

use std::fmt::Display;
use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::diagnostics::ErrorCode;
use crate::lexer::Span;
use crate::optimizer::{floor_div, wrapping_pow};
use crate::parser::ast::{
    ArrowBody, AssignOperator, Block, ElseBranch, Expression, Ident, ImportTarget, InfixOperator,
    Number, Pattern, PrefixOperator, Program, Statement, TemplatePart, TypeName,
};

const MAX_EVAL_DEPTH: usize = 10_000;
const MAX_CALL_DEPTH: usize = 100_000;

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub code: ErrorCode,
    pub message: String,
    pub span: Span,
}

impl RuntimeError {
    pub fn new(code: ErrorCode, message: impl Into<String>, span: &Span) -> Self {
        RuntimeError {
            code,
            message: message.into(),
            span: *span,
        }
    }
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RuntimeError {}

/// The result of evaluating a statement: either a value or one of the
/// control-flow sentinels consumed by enclosing constructs.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Normal(Value),
    Break,
    Continue,
    Return(Value),
}

pub type EvalResult<T> = Result<T, RuntimeError>;

pub type OutputSink = Arc<Mutex<dyn Write + Send>>;

pub struct Interpreter {
    globals: Arc<Environment>,
    output: OutputSink,
    eval_depth: usize,
    call_depth: usize,
    max_eval_depth: usize,
    max_call_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_output(Arc::new(Mutex::new(std::io::stdout())))
    }

    pub fn with_output(output: OutputSink) -> Self {
        let globals = Environment::root();
        builtins::install(&globals);
        Interpreter {
            globals,
            output,
            eval_depth: 0,
            call_depth: 0,
            max_eval_depth: MAX_EVAL_DEPTH,
            max_call_depth: MAX_CALL_DEPTH,
        }
    }

    /// Override the recursion guards, mainly for tests that want to hit
    /// them without deep host stacks.
    pub fn with_limits(mut self, max_eval_depth: usize, max_call_depth: usize) -> Self {
        self.max_eval_depth = max_eval_depth;
        self.max_call_depth = max_call_depth;
        self
    }

    /// A sibling interpreter for a background task: same globals and output
    /// sink, fresh depth counters.
    fn from_parts(globals: Arc<Environment>, output: OutputSink) -> Self {
        Interpreter {
            globals,
            output,
            eval_depth: 0,
            call_depth: 0,
            max_eval_depth: MAX_EVAL_DEPTH,
            max_call_depth: MAX_CALL_DEPTH,
        }
    }

    pub fn output(&self) -> OutputSink {
        Arc::clone(&self.output)
    }

    pub fn run(&mut self, program: &Program) -> Result<(), RuntimeError> {
        let globals = Arc::clone(&self.globals);
        for statement in &program.statements {
            match self.eval_statement(statement, &globals)? {
                Signal::Normal(_) => {}
                // Stray sentinels at the top level end the program; the
                // analyser reports them before execution normally starts.
                Signal::Return(_) | Signal::Break | Signal::Continue => return Ok(()),
            }
        }

        // A user-defined `main` runs after the top-level statements.
        if let Some(Value::Function(main)) = self.globals.get("main") {
            if main.params.is_empty() && !main.is_async {
                self.call_function(&main, vec![], None, &Span::default())?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // statements

    fn eval_statements(
        &mut self,
        statements: &[Statement],
        env: &Arc<Environment>,
    ) -> EvalResult<Signal> {
        for statement in statements {
            match self.eval_statement(statement, env)? {
                Signal::Normal(_) => {}
                other => return Ok(other),
            }
        }
        Ok(Signal::Normal(Value::Null))
    }

    fn eval_block(&mut self, block: &Block, env: &Arc<Environment>) -> EvalResult<Signal> {
        let scope = Environment::child(env);
        self.eval_statements(&block.statements, &scope)
    }

    fn eval_statement(
        &mut self,
        statement: &Statement,
        env: &Arc<Environment>,
    ) -> EvalResult<Signal> {
        match statement {
            Statement::VarBinding(binding) => {
                let mut value = self.eval_expression(&binding.value, env)?;
                if let Some(annotation) = &binding.type_annotation {
                    value = self.coerce(value, annotation, &binding.span)?;
                }
                env.define(
                    binding.name.clone(),
                    value,
                    binding.constant,
                    binding.type_annotation.clone(),
                );
                Ok(Signal::Normal(Value::Null))
            }
            Statement::FunctionDecl(decl) => {
                let function = FunctionValue {
                    name: decl.name.clone(),
                    params: decl.params.clone(),
                    body: FunctionBody::Block(decl.body.clone()),
                    env: Arc::clone(env),
                    is_async: decl.is_async,
                };
                env.define(
                    decl.name.clone(),
                    Value::Function(Arc::new(function)),
                    false,
                    None,
                );
                Ok(Signal::Normal(Value::Null))
            }
            Statement::ClassDecl(decl) => {
                let superclass = match &decl.superclass {
                    Some(name) => match env.get(name) {
                        Some(Value::Class(class)) => Some(class),
                        Some(other) => {
                            return Err(RuntimeError::new(
                                ErrorCode::InvalidCast,
                                format!("superclass '{name}' is not a class, it is {}", other.type_name()),
                                &decl.span,
                            ))
                        }
                        None => {
                            return Err(RuntimeError::new(
                                ErrorCode::UndefinedVariable,
                                format!("variable not defined: {name}"),
                                &decl.span,
                            ))
                        }
                    },
                    None => None,
                };

                let mut methods = std::collections::HashMap::new();
                for method in &decl.methods {
                    methods.insert(
                        method.name.clone(),
                        Arc::new(FunctionValue {
                            name: format!("{}.{}", decl.name, method.name),
                            params: method.params.clone(),
                            body: FunctionBody::Block(method.body.clone()),
                            env: Arc::clone(env),
                            is_async: method.is_async,
                        }),
                    );
                }
                let constructor = decl.constructor.as_ref().map(|constructor| {
                    Arc::new(FunctionValue {
                        name: format!("{}.init", decl.name),
                        params: constructor.params.clone(),
                        body: FunctionBody::Block(constructor.body.clone()),
                        env: Arc::clone(env),
                        is_async: false,
                    })
                });

                let class = ClassValue {
                    name: decl.name.clone(),
                    superclass,
                    fields: decl.fields.clone(),
                    constructor,
                    methods,
                    env: Arc::clone(env),
                };
                env.define(decl.name.clone(), Value::Class(Arc::new(class)), false, None);
                Ok(Signal::Normal(Value::Null))
            }
            Statement::Return { value, .. } => {
                let value = match value {
                    Some(value) => self.eval_expression(value, env)?,
                    None => Value::Null,
                };
                Ok(Signal::Return(value))
            }
            Statement::If(if_statement) => {
                if self.eval_expression(&if_statement.condition, env)?.truthy() {
                    return self.eval_block(&if_statement.consequence, env);
                }
                match &if_statement.alternative {
                    Some(ElseBranch::Block(block)) => self.eval_block(block, env),
                    Some(ElseBranch::If(nested)) => {
                        self.eval_statement(&Statement::If((**nested).clone()), env)
                    }
                    None => Ok(Signal::Normal(Value::Null)),
                }
            }
            Statement::While {
                condition, body, ..
            } => {
                while self.eval_expression(condition, env)?.truthy() {
                    match self.eval_block(body, env)? {
                        Signal::Break => break,
                        Signal::Continue | Signal::Normal(_) => {}
                        Signal::Return(value) => return Ok(Signal::Return(value)),
                    }
                }
                Ok(Signal::Normal(Value::Null))
            }
            Statement::For(for_statement) => {
                let header = Environment::child(env);
                self.eval_statement(&for_statement.init, &header)?;
                while self
                    .eval_expression(&for_statement.condition, &header)?
                    .truthy()
                {
                    match self.eval_block(&for_statement.body, &header)? {
                        Signal::Break => break,
                        Signal::Continue | Signal::Normal(_) => {}
                        Signal::Return(value) => return Ok(Signal::Return(value)),
                    }
                    self.eval_statement(&for_statement.post, &header)?;
                }
                Ok(Signal::Normal(Value::Null))
            }
            Statement::ForIn {
                variable,
                iterable,
                body,
                span,
            } => {
                let iterable = self.eval_expression(iterable, env)?;
                let items: Vec<Value> = match &iterable {
                    Value::List(values) => values.lock().clone(),
                    Value::String(text) => text
                        .chars()
                        .map(|c| Value::String(c.to_string()))
                        .collect(),
                    other => {
                        return Err(RuntimeError::new(
                            ErrorCode::InvalidIteration,
                            format!("cannot iterate over {}", other.type_name()),
                            span,
                        ))
                    }
                };

                for item in items {
                    let scope = Environment::child(env);
                    scope.define(variable.clone(), item, false, None);
                    match self.eval_statements(&body.statements, &scope)? {
                        Signal::Break => break,
                        Signal::Continue | Signal::Normal(_) => {}
                        Signal::Return(value) => return Ok(Signal::Return(value)),
                    }
                }
                Ok(Signal::Normal(Value::Null))
            }
            Statement::Break { .. } => Ok(Signal::Break),
            Statement::Continue { .. } => Ok(Signal::Continue),
            Statement::Try(try_statement) => {
                let outcome = match self.eval_block(&try_statement.body, env) {
                    Err(error) if try_statement.catch.is_some() => {
                        let catch = try_statement
                            .catch
                            .as_ref()
                            .expect("catch presence just checked");
                        let scope = Environment::child(env);
                        if let Some(parameter) = &catch.parameter {
                            scope.define(
                                parameter.clone(),
                                Value::String(error.message),
                                false,
                                None,
                            );
                        }
                        self.eval_statements(&catch.body.statements, &scope)
                    }
                    other => other,
                };

                if let Some(finally) = &try_statement.finally {
                    match self.eval_block(finally, env)? {
                        Signal::Normal(_) => {}
                        signal => return Ok(signal),
                    }
                }
                outcome
            }
            Statement::Throw { value, span } => {
                let value = self.eval_expression(value, env)?;
                let message = match value {
                    Value::String(message) => message,
                    _ => "thrown exception".to_owned(),
                };
                Err(RuntimeError::new(ErrorCode::UncaughtThrow, message, span))
            }
            Statement::Block(block) => self.eval_block(block, env),
            Statement::Expression(expression) => {
                let value = self.eval_expression(expression, env)?;
                Ok(Signal::Normal(value))
            }
            Statement::Import { target, span } => {
                match target {
                    ImportTarget::Module(name) => match builtins::stdlib_module_value(name) {
                        Some(module) => env.define(name.clone(), module, true, None),
                        None => {
                            return Err(RuntimeError::new(
                                ErrorCode::UndefinedVariable,
                                format!("unknown module '{name}'"),
                                span,
                            ))
                        }
                    },
                    ImportTarget::Path(path) => {
                        // Unresolved local imports bind null; the analyser
                        // already warned about them.
                        let name = path
                            .rsplit('/')
                            .next()
                            .unwrap_or(path)
                            .trim_end_matches(".zylo")
                            .to_owned();
                        env.define(name, Value::Null, false, None);
                    }
                }
                Ok(Signal::Normal(Value::Null))
            }
            Statement::Export { inner, .. } => self.eval_statement(inner, env),
            Statement::Switch(switch) => {
                let discriminant = self.eval_expression(&switch.discriminant, env)?;
                for case in &switch.cases {
                    let value = self.eval_expression(&case.value, env)?;
                    if discriminant == value {
                        let scope = Environment::child(env);
                        return match self.eval_statements(&case.body, &scope)? {
                            // A break inside a case exits the switch.
                            Signal::Break => Ok(Signal::Normal(Value::Null)),
                            signal => Ok(signal),
                        };
                    }
                }
                if let Some(default) = &switch.default {
                    let scope = Environment::child(env);
                    return match self.eval_statements(default, &scope)? {
                        Signal::Break => Ok(Signal::Normal(Value::Null)),
                        signal => Ok(signal),
                    };
                }
                Ok(Signal::Normal(Value::Null))
            }
            Statement::Match(match_statement) => {
                let discriminant = self.eval_expression(&match_statement.discriminant, env)?;
                for arm in &match_statement.arms {
                    let scope = Environment::child(env);
                    let matched = match &arm.pattern {
                        Pattern::Literal(literal) => {
                            let value = self.eval_expression(literal, &scope)?;
                            value == discriminant
                        }
                        Pattern::Binder { name, .. } => {
                            scope.define(name.clone(), discriminant.clone(), false, None);
                            true
                        }
                        Pattern::Type {
                            type_name, binder, ..
                        } => {
                            if discriminant.matches_type(type_name) {
                                if let Some(binder) = binder {
                                    scope.define(
                                        binder.clone(),
                                        discriminant.clone(),
                                        false,
                                        None,
                                    );
                                }
                                true
                            } else {
                                false
                            }
                        }
                    };
                    if matched {
                        return self.eval_statements(&arm.body.statements, &scope);
                    }
                }
                Ok(Signal::Normal(Value::Null))
            }
            Statement::Spawn { body, .. } => {
                let body = body.clone();
                let env = Arc::clone(env);
                let globals = Arc::clone(&self.globals);
                let output = Arc::clone(&self.output);
                std::thread::spawn(move || {
                    let mut task = Interpreter::from_parts(globals, output);
                    let scope = Environment::child(&env);
                    if let Err(error) = task.eval_statements(&body.statements, &scope) {
                        log::error!("spawned task failed: {error}");
                    }
                });
                Ok(Signal::Normal(Value::Null))
            }
        }
    }

    // ------------------------------------------------------------------
    // expressions

    pub fn eval_expression(
        &mut self,
        expression: &Expression,
        env: &Arc<Environment>,
    ) -> EvalResult<Value> {
        self.eval_depth += 1;
        if self.eval_depth > self.max_eval_depth {
            self.eval_depth -= 1;
            return Err(RuntimeError::new(
                ErrorCode::StackOverflow,
                "stack overflow: expression nesting too deep",
                &expression.span(),
            ));
        }
        let result = self.eval_expression_inner(expression, env);
        self.eval_depth -= 1;
        result
    }

    fn eval_expression_inner(
        &mut self,
        expression: &Expression,
        env: &Arc<Environment>,
    ) -> EvalResult<Value> {
        match expression {
            Expression::NumberLit { value, .. } => Ok(match value {
                Number::Integer(v) => Value::Integer(*v),
                Number::Float(v) => Value::Float(*v),
            }),
            Expression::StringLit { value, .. } => Ok(Value::String(value.clone())),
            Expression::TemplateString { parts, .. } => {
                let mut rendered = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => rendered.push_str(text),
                        TemplatePart::Expr(inner) => {
                            let value = self.eval_expression(inner, env)?;
                            rendered.push_str(&value.to_string());
                        }
                    }
                }
                Ok(Value::String(rendered))
            }
            Expression::BooleanLit { value, .. } => Ok(Value::Boolean(*value)),
            Expression::NullLit { .. } => Ok(Value::Null),
            Expression::ListLit { elements, .. } => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval_expression(element, env)?);
                }
                Ok(Value::List(shared(values)))
            }
            Expression::MapLit { entries, .. } => {
                let mut map = OrderedMap::default();
                for (key, value) in entries {
                    let key = self.map_key(key, env)?;
                    let value = self.eval_expression(value, env)?;
                    map.set(key, value);
                }
                Ok(Value::Map(shared(map)))
            }
            Expression::SetLit { elements, .. } => {
                let mut values: Vec<Value> = vec![];
                for element in elements {
                    let value = self.eval_expression(element, env)?;
                    if !values.contains(&value) {
                        values.push(value);
                    }
                }
                Ok(Value::List(shared(values)))
            }
            Expression::Identifier(Ident { name, span }) => env.get(name).ok_or_else(|| {
                RuntimeError::new(
                    ErrorCode::UndefinedVariable,
                    format!("variable not defined: {name}"),
                    span,
                )
            }),
            Expression::Prefix {
                operator,
                operand,
                span,
            } => {
                let value = self.eval_expression(operand, env)?;
                match operator {
                    PrefixOperator::Not => Ok(Value::Boolean(!value.truthy())),
                    PrefixOperator::Negate => match value {
                        Value::Integer(v) => Ok(Value::Integer(v.wrapping_neg())),
                        Value::Float(v) => Ok(Value::Float(-v)),
                        other => Err(RuntimeError::new(
                            ErrorCode::InvalidCast,
                            format!("unary '-' requires a number, found {}", other.type_name()),
                            span,
                        )),
                    },
                }
            }
            Expression::Infix {
                left,
                operator,
                right,
                span,
            } => {
                // Short-circuit forms evaluate the right side lazily.
                match operator {
                    InfixOperator::And => {
                        let left = self.eval_expression(left, env)?;
                        if !left.truthy() {
                            return Ok(Value::Boolean(false));
                        }
                        let right = self.eval_expression(right, env)?;
                        return Ok(Value::Boolean(right.truthy()));
                    }
                    InfixOperator::Or => {
                        let left = self.eval_expression(left, env)?;
                        if left.truthy() {
                            return Ok(Value::Boolean(true));
                        }
                        let right = self.eval_expression(right, env)?;
                        return Ok(Value::Boolean(right.truthy()));
                    }
                    _ => {}
                }

                let left = self.eval_expression(left, env)?;
                let right = self.eval_expression(right, env)?;
                self.apply_infix(*operator, left, right, span)
            }
            Expression::Assign {
                target,
                operator,
                value,
                span,
            } => self.eval_assignment(target, *operator, value, env, span),
            Expression::Call { callee, args, span } => {
                let callee = self.eval_expression(callee, env)?;
                let args = self.eval_arguments(args, env)?;
                self.call_value(callee, args, span)
            }
            Expression::MethodCall {
                object,
                method,
                args,
                span,
            } => {
                let receiver = self.eval_expression(object, env)?;
                let args = self.eval_arguments(args, env)?;
                match &receiver {
                    Value::Instance(_)
                    | Value::Module(_)
                    | Value::Class(_)
                    | Value::Super { .. } => {
                        let member = self.member_value(&receiver, method, span)?;
                        self.call_value(member, args, span)
                    }
                    Value::List(_) | Value::Map(_) | Value::String(_) => {
                        builtins::collection_method(self, &receiver, method, args, span)
                    }
                    other => Err(RuntimeError::new(
                        ErrorCode::NotCallable,
                        format!("cannot call method '{method}' on {}", other.type_name()),
                        span,
                    )),
                }
            }
            Expression::Member {
                object,
                property,
                span,
            } => {
                let object = self.eval_expression(object, env)?;
                self.member_value(&object, property, span)
            }
            Expression::Index {
                object,
                index,
                span,
            } => {
                let object = self.eval_expression(object, env)?;
                let index = self.eval_expression(index, env)?;
                self.index_value(&object, &index, span)
            }
            Expression::Slice {
                object,
                start,
                end,
                span,
            } => {
                let object = self.eval_expression(object, env)?;
                let start = match start {
                    Some(start) => Some(self.expect_int(start, env)?),
                    None => None,
                };
                let end = match end {
                    Some(end) => Some(self.expect_int(end, env)?),
                    None => None,
                };
                self.slice_value(&object, start, end, span)
            }
            Expression::Range { start, end, span } => {
                let start = self.expect_int(start, env)?;
                let end = self.expect_int(end, env)?;
                let values: Vec<Value> = (start..end).map(Value::Integer).collect();
                let _ = span;
                Ok(Value::List(shared(values)))
            }
            Expression::This { span } => env.get("this").ok_or_else(|| {
                RuntimeError::new(
                    ErrorCode::UndefinedVariable,
                    "'this' used outside of a method",
                    span,
                )
            }),
            Expression::SuperRef { span } => {
                let this = env.get("this").ok_or_else(|| {
                    RuntimeError::new(
                        ErrorCode::UndefinedVariable,
                        "'super' used outside of a method",
                        span,
                    )
                })?;
                let Value::Instance(instance) = this else {
                    return Err(RuntimeError::new(
                        ErrorCode::InvalidCast,
                        "'super' requires an instance receiver",
                        span,
                    ));
                };
                let class = instance.class.superclass.clone().ok_or_else(|| {
                    RuntimeError::new(
                        ErrorCode::UndefinedVariable,
                        format!("class '{}' has no superclass", instance.class.name),
                        span,
                    )
                })?;
                Ok(Value::Super { instance, class })
            }
            Expression::Await { inner, span } => {
                let value = self.eval_expression(inner, env)?;
                let Value::Future(future) = value else {
                    return Err(RuntimeError::new(
                        ErrorCode::AwaitError,
                        format!("await requires a future, found {}", value.type_name()),
                        span,
                    ));
                };
                let receiver = future.receiver.lock().take().ok_or_else(|| {
                    RuntimeError::new(ErrorCode::AwaitError, "future already awaited", span)
                })?;
                match receiver.recv() {
                    Ok(result) => result,
                    Err(_) => Err(RuntimeError::new(
                        ErrorCode::AwaitError,
                        "background task terminated without producing a value",
                        span,
                    )),
                }
            }
            Expression::Cast {
                value,
                target,
                span,
            } => {
                let value = self.eval_expression(value, env)?;
                self.coerce(value, target, span)
            }
            Expression::IfExpr {
                then_value,
                condition,
                else_value,
                ..
            } => {
                if self.eval_expression(condition, env)?.truthy() {
                    self.eval_expression(then_value, env)
                } else {
                    self.eval_expression(else_value, env)
                }
            }
            Expression::BlockExpr(block) => {
                let scope = Environment::child(env);
                let mut last = Value::Null;
                for statement in &block.statements {
                    match self.eval_statement(statement, &scope)? {
                        Signal::Normal(value) => last = value,
                        _ => {
                            return Err(RuntimeError::new(
                                ErrorCode::InvalidIteration,
                                "control flow cannot leave a block expression",
                                &block.span,
                            ))
                        }
                    }
                }
                Ok(last)
            }
            Expression::FunctionLit {
                params,
                body,
                is_async,
                span,
                ..
            } => {
                let _ = span;
                Ok(Value::Function(Arc::new(FunctionValue {
                    name: "<anonymous>".into(),
                    params: params.clone(),
                    body: FunctionBody::Block(body.clone()),
                    env: Arc::clone(env),
                    is_async: *is_async,
                })))
            }
            Expression::ArrowFunction {
                params, body, span, ..
            } => {
                let _ = span;
                let body = match body {
                    ArrowBody::Block(block) => FunctionBody::Block(block.clone()),
                    ArrowBody::Expr(expression) => FunctionBody::Expr((**expression).clone()),
                };
                Ok(Value::Function(Arc::new(FunctionValue {
                    name: "<arrow>".into(),
                    params: params.clone(),
                    body,
                    env: Arc::clone(env),
                    is_async: false,
                })))
            }
        }
    }

    fn eval_arguments(
        &mut self,
        args: &[Expression],
        env: &Arc<Environment>,
    ) -> EvalResult<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expression(arg, env)?);
        }
        Ok(values)
    }

    fn expect_int(&mut self, expression: &Expression, env: &Arc<Environment>) -> EvalResult<i64> {
        match self.eval_expression(expression, env)? {
            Value::Integer(value) => Ok(value),
            other => Err(RuntimeError::new(
                ErrorCode::InvalidCast,
                format!("expected an integer, found {}", other.type_name()),
                &expression.span(),
            )),
        }
    }

    fn map_key(&mut self, key: &Expression, env: &Arc<Environment>) -> EvalResult<String> {
        let value = self.eval_expression(key, env)?;
        match value {
            Value::String(key) => Ok(key),
            other => Ok(other.to_string()),
        }
    }

    // ------------------------------------------------------------------
    // operators

    fn apply_infix(
        &mut self,
        operator: InfixOperator,
        left: Value,
        right: Value,
        span: &Span,
    ) -> EvalResult<Value> {
        use InfixOperator::*;

        match operator {
            Equal => return Ok(Value::Boolean(left == right)),
            NotEqual => return Ok(Value::Boolean(left != right)),
            In => return self.contains(&left, &right, span),
            _ => {}
        }

        // `+` with a string on either side concatenates via stringification.
        if operator == Add {
            let stringish = |v: &Value| {
                matches!(v, Value::String(_) | Value::Integer(_) | Value::Float(_))
            };
            match (&left, &right) {
                (Value::String(_), r) if stringish(r) => {
                    return Ok(Value::String(format!("{left}{right}")));
                }
                (l, Value::String(_)) if stringish(l) => {
                    return Ok(Value::String(format!("{left}{right}")));
                }
                _ => {}
            }
        }

        match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => self.integer_op(operator, *l, *r, span),
            (Value::Integer(l), Value::Float(r)) => self.float_op(operator, *l as f64, *r, span),
            (Value::Float(l), Value::Integer(r)) => self.float_op(operator, *l, *r as f64, span),
            (Value::Float(l), Value::Float(r)) => self.float_op(operator, *l, *r, span),
            _ => Err(RuntimeError::new(
                ErrorCode::InvalidCast,
                format!(
                    "operator '{}' cannot combine {} and {}",
                    operator.symbol(),
                    left.type_name(),
                    right.type_name()
                ),
                span,
            )),
        }
    }

    fn integer_op(
        &mut self,
        operator: InfixOperator,
        l: i64,
        r: i64,
        span: &Span,
    ) -> EvalResult<Value> {
        use InfixOperator::*;
        let value = match operator {
            Add => Value::Integer(l.wrapping_add(r)),
            Subtract => Value::Integer(l.wrapping_sub(r)),
            Multiply => Value::Integer(l.wrapping_mul(r)),
            Divide => {
                if r == 0 {
                    return Err(self.division_by_zero(span));
                }
                Value::Integer(l.wrapping_div(r))
            }
            Modulo => {
                if r == 0 {
                    return Err(self.division_by_zero(span));
                }
                Value::Integer(l.wrapping_rem(r))
            }
            FloorDivide => {
                if r == 0 {
                    return Err(self.division_by_zero(span));
                }
                Value::Integer(floor_div(l, r))
            }
            Power => {
                if r >= 0 {
                    Value::Integer(wrapping_pow(l, r as u64))
                } else {
                    Value::Float((l as f64).powf(r as f64))
                }
            }
            LessThan => Value::Boolean(l < r),
            LessOrEqual => Value::Boolean(l <= r),
            GreaterThan => Value::Boolean(l > r),
            GreaterOrEqual => Value::Boolean(l >= r),
            _ => unreachable!("operator handled before numeric dispatch"),
        };
        Ok(value)
    }

    fn float_op(
        &mut self,
        operator: InfixOperator,
        l: f64,
        r: f64,
        span: &Span,
    ) -> EvalResult<Value> {
        use InfixOperator::*;
        let value = match operator {
            Add => Value::Float(l + r),
            Subtract => Value::Float(l - r),
            Multiply => Value::Float(l * r),
            Divide => {
                if r == 0.0 {
                    return Err(self.division_by_zero(span));
                }
                Value::Float(l / r)
            }
            Modulo => {
                if r == 0.0 {
                    return Err(self.division_by_zero(span));
                }
                Value::Float(l % r)
            }
            FloorDivide => {
                if r == 0.0 {
                    return Err(self.division_by_zero(span));
                }
                Value::Float((l / r).floor())
            }
            Power => Value::Float(l.powf(r)),
            LessThan => Value::Boolean(l < r),
            LessOrEqual => Value::Boolean(l <= r),
            GreaterThan => Value::Boolean(l > r),
            GreaterOrEqual => Value::Boolean(l >= r),
            _ => unreachable!("operator handled before numeric dispatch"),
        };
        Ok(value)
    }

    fn division_by_zero(&self, span: &Span) -> RuntimeError {
        RuntimeError::new(ErrorCode::DivisionByZero, "division by zero", span)
    }

    fn contains(&mut self, needle: &Value, haystack: &Value, span: &Span) -> EvalResult<Value> {
        match haystack {
            Value::List(values) => Ok(Value::Boolean(values.lock().contains(needle))),
            Value::Map(map) => match needle {
                Value::String(key) => Ok(Value::Boolean(map.lock().get(key).is_some())),
                other => Err(RuntimeError::new(
                    ErrorCode::InvalidCast,
                    format!("map membership requires a string key, found {}", other.type_name()),
                    span,
                )),
            },
            Value::String(text) => match needle {
                Value::String(sub) => Ok(Value::Boolean(text.contains(sub.as_str()))),
                other => Err(RuntimeError::new(
                    ErrorCode::InvalidCast,
                    format!("string membership requires a string, found {}", other.type_name()),
                    span,
                )),
            },
            other => Err(RuntimeError::new(
                ErrorCode::InvalidCast,
                format!("'in' requires a list, map or string, found {}", other.type_name()),
                span,
            )),
        }
    }

    // ------------------------------------------------------------------
    // assignment

    fn eval_assignment(
        &mut self,
        target: &Expression,
        operator: AssignOperator,
        value: &Expression,
        env: &Arc<Environment>,
        span: &Span,
    ) -> EvalResult<Value> {
        let mut new_value = self.eval_expression(value, env)?;

        if let Some(binary) = operator.binary() {
            let current = self.read_target(target, env, span)?;
            new_value = self.apply_infix(binary, current, new_value, span)?;
        }

        self.write_target(target, new_value.clone(), env, span)?;
        Ok(new_value)
    }

    fn read_target(
        &mut self,
        target: &Expression,
        env: &Arc<Environment>,
        span: &Span,
    ) -> EvalResult<Value> {
        match target {
            Expression::Identifier(Ident { name, .. }) => env.get(name).ok_or_else(|| {
                RuntimeError::new(
                    ErrorCode::UndefinedVariable,
                    format!("variable not defined: {name}"),
                    span,
                )
            }),
            _ => self.eval_expression(target, env),
        }
    }

    fn write_target(
        &mut self,
        target: &Expression,
        value: Value,
        env: &Arc<Environment>,
        span: &Span,
    ) -> EvalResult<()> {
        match target {
            Expression::Identifier(Ident { name, .. }) => {
                let value = match env.declared_type(name) {
                    Some(annotation) => self.coerce(value, &annotation, span)?,
                    None => value,
                };
                env.update(name, value).map_err(|error| match error {
                    environment::UpdateError::Constant => RuntimeError::new(
                        ErrorCode::ConstantReassignment,
                        format!("no se puede reasignar constante: {name}"),
                        span,
                    ),
                    environment::UpdateError::NotDefined => RuntimeError::new(
                        ErrorCode::UndefinedVariable,
                        format!("variable not defined: {name}"),
                        span,
                    ),
                })
            }
            Expression::Index { object, index, .. } => {
                let object = self.eval_expression(object, env)?;
                let index = self.eval_expression(index, env)?;
                match (&object, &index) {
                    (Value::List(values), Value::Integer(i)) => {
                        let mut values = values.lock();
                        let length = values.len();
                        let position = normalize_index(*i, length).ok_or_else(|| {
                            self.index_error(*i, length, span)
                        })?;
                        values[position] = value;
                        Ok(())
                    }
                    (Value::Map(map), Value::String(key)) => {
                        map.lock().set(key.clone(), value);
                        Ok(())
                    }
                    (Value::Map(map), other) => {
                        map.lock().set(other.to_string(), value);
                        Ok(())
                    }
                    (other, _) => Err(RuntimeError::new(
                        ErrorCode::InvalidCast,
                        format!("cannot assign into {}", other.type_name()),
                        span,
                    )),
                }
            }
            Expression::Member {
                object, property, ..
            } => {
                let object = self.eval_expression(object, env)?;
                match object {
                    Value::Instance(instance) => {
                        instance.fields.lock().set(property.clone(), value);
                        Ok(())
                    }
                    other => Err(RuntimeError::new(
                        ErrorCode::InvalidCast,
                        format!("cannot assign a member of {}", other.type_name()),
                        span,
                    )),
                }
            }
            _ => Err(RuntimeError::new(
                ErrorCode::InvalidCast,
                "invalid assignment target",
                span,
            )),
        }
    }

    // ------------------------------------------------------------------
    // member lookup, indexing, slicing

    fn member_value(&mut self, object: &Value, property: &str, span: &Span) -> EvalResult<Value> {
        match object {
            Value::Instance(instance) => {
                if let Some(value) = instance.fields.lock().get(property) {
                    return Ok(value.clone());
                }
                instance
                    .class
                    .find_method(property)
                    .map(|function| Value::BoundMethod {
                        receiver: Arc::clone(instance),
                        function,
                    })
                    .ok_or_else(|| {
                        RuntimeError::new(
                            ErrorCode::UndefinedVariable,
                            format!(
                                "unknown member '{property}' on instance of {}",
                                instance.class.name
                            ),
                            span,
                        )
                    })
            }
            Value::Module(module) => module.members.get(property).cloned().ok_or_else(|| {
                RuntimeError::new(
                    ErrorCode::UndefinedVariable,
                    format!("unknown member '{property}' on module {}", module.name),
                    span,
                )
            }),
            Value::Class(class) => class
                .find_method(property)
                .map(Value::Function)
                .ok_or_else(|| {
                    RuntimeError::new(
                        ErrorCode::UndefinedVariable,
                        format!("unknown method '{property}' on class {}", class.name),
                        span,
                    )
                }),
            Value::Super { instance, class } => class
                .find_method(property)
                .map(|function| Value::BoundMethod {
                    receiver: Arc::clone(instance),
                    function,
                })
                .ok_or_else(|| {
                    RuntimeError::new(
                        ErrorCode::UndefinedVariable,
                        format!("unknown method '{property}' on superclass {}", class.name),
                        span,
                    )
                }),
            other => Err(RuntimeError::new(
                ErrorCode::InvalidCast,
                format!("value of type {} has no members", other.type_name()),
                span,
            )),
        }
    }

    fn index_error(&self, index: i64, length: usize, span: &Span) -> RuntimeError {
        RuntimeError::new(
            ErrorCode::IndexOutOfRange,
            format!("index {index} out of range for length {length}"),
            span,
        )
    }

    fn index_value(&mut self, object: &Value, index: &Value, span: &Span) -> EvalResult<Value> {
        match (object, index) {
            (Value::List(values), Value::Integer(i)) => {
                let values = values.lock();
                let position = normalize_index(*i, values.len())
                    .ok_or_else(|| self.index_error(*i, values.len(), span))?;
                Ok(values[position].clone())
            }
            (Value::String(text), Value::Integer(i)) => {
                let chars: Vec<char> = text.chars().collect();
                let position = normalize_index(*i, chars.len())
                    .ok_or_else(|| self.index_error(*i, chars.len(), span))?;
                Ok(Value::String(chars[position].to_string()))
            }
            (Value::Map(map), Value::String(key)) => {
                Ok(map.lock().get(key).cloned().unwrap_or(Value::Null))
            }
            (Value::Map(map), other) => Ok(map
                .lock()
                .get(&other.to_string())
                .cloned()
                .unwrap_or(Value::Null)),
            (other, index) => Err(RuntimeError::new(
                ErrorCode::InvalidCast,
                format!(
                    "cannot index {} with {}",
                    other.type_name(),
                    index.type_name()
                ),
                span,
            )),
        }
    }

    fn slice_value(
        &mut self,
        object: &Value,
        start: Option<i64>,
        end: Option<i64>,
        span: &Span,
    ) -> EvalResult<Value> {
        let slice_bounds = |length: usize| {
            let length = length as i64;
            let normalize = |bound: i64| {
                let bound = if bound < 0 { bound + length } else { bound };
                bound.clamp(0, length) as usize
            };
            let from = normalize(start.unwrap_or(0));
            let to = normalize(end.unwrap_or(length));
            (from, from.max(to))
        };

        match object {
            Value::List(values) => {
                let values = values.lock();
                let (from, to) = slice_bounds(values.len());
                Ok(Value::List(shared(values[from..to].to_vec())))
            }
            Value::String(text) => {
                let chars: Vec<char> = text.chars().collect();
                let (from, to) = slice_bounds(chars.len());
                Ok(Value::String(chars[from..to].iter().collect()))
            }
            other => Err(RuntimeError::new(
                ErrorCode::InvalidCast,
                format!("cannot slice {}", other.type_name()),
                span,
            )),
        }
    }

    // ------------------------------------------------------------------
    // calls and instantiation

    pub(crate) fn call_value(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        span: &Span,
    ) -> EvalResult<Value> {
        match callee {
            Value::Function(function) => self.call_function(&function, args, None, span),
            Value::BoundMethod { receiver, function } => {
                self.call_function(&function, args, Some(Value::Instance(receiver)), span)
            }
            Value::Builtin(builtin) => (builtin.func)(self, args, span),
            Value::Class(class) => self.instantiate(&class, args, span),
            other => Err(RuntimeError::new(
                ErrorCode::NotCallable,
                format!("value of type {} is not callable", other.type_name()),
                span,
            )),
        }
    }

    fn call_function(
        &mut self,
        function: &Arc<FunctionValue>,
        args: Vec<Value>,
        this: Option<Value>,
        span: &Span,
    ) -> EvalResult<Value> {
        self.call_depth += 1;
        if self.call_depth > self.max_call_depth {
            self.call_depth -= 1;
            return Err(RuntimeError::new(
                ErrorCode::StackOverflow,
                "stack overflow: call depth exceeded",
                span,
            ));
        }

        let result = if function.is_async {
            let (sender, receiver) = crossbeam_channel::bounded(1);
            let function = Arc::clone(function);
            let globals = Arc::clone(&self.globals);
            let output = Arc::clone(&self.output);
            let span = *span;
            std::thread::spawn(move || {
                let mut task = Interpreter::from_parts(globals, output);
                let result = task.invoke(&function, args, this, &span);
                let _ = sender.send(result);
            });
            Ok(Value::Future(Arc::new(FutureValue {
                receiver: Mutex::new(Some(receiver)),
            })))
        } else {
            self.invoke(function, args, this, span)
        };

        self.call_depth -= 1;
        result
    }

    fn invoke(
        &mut self,
        function: &Arc<FunctionValue>,
        args: Vec<Value>,
        this: Option<Value>,
        span: &Span,
    ) -> EvalResult<Value> {
        if args.len() != function.params.len() {
            return Err(RuntimeError::new(
                ErrorCode::NotCallable,
                format!(
                    "{} expects {} argument(s), found {}",
                    function.name,
                    function.params.len(),
                    args.len()
                ),
                span,
            ));
        }

        let scope = Environment::child(&function.env);
        if let Some(this) = this {
            scope.define("this", this, true, None);
        }
        for (parameter, arg) in function.params.iter().zip(args) {
            let arg = match &parameter.type_annotation {
                Some(annotation) => self.coerce(arg, annotation, span)?,
                None => arg,
            };
            scope.define(
                parameter.name.clone(),
                arg,
                false,
                parameter.type_annotation.clone(),
            );
        }

        match &function.body {
            FunctionBody::Block(block) => {
                match self.eval_statements(&block.statements, &scope)? {
                    Signal::Return(value) => Ok(value),
                    _ => Ok(Value::Null),
                }
            }
            FunctionBody::Expr(expression) => self.eval_expression(expression, &scope),
        }
    }

    fn instantiate(
        &mut self,
        class: &Arc<ClassValue>,
        args: Vec<Value>,
        span: &Span,
    ) -> EvalResult<Value> {
        let instance = Arc::new(InstanceValue {
            class: Arc::clone(class),
            fields: Mutex::new(OrderedMap::default()),
        });

        // Field defaults run base-class first so subclasses can override.
        let mut chain = vec![];
        let mut current = Some(Arc::clone(class));
        while let Some(link) = current {
            current = link.superclass.clone();
            chain.push(link);
        }
        for link in chain.iter().rev() {
            for field in &link.fields {
                let mut value = self.eval_expression(&field.default, &link.env)?;
                if let Some(annotation) = &field.type_annotation {
                    value = self.coerce(value, annotation, span)?;
                }
                instance.fields.lock().set(field.name.clone(), value);
            }
        }

        match class.find_constructor() {
            Some(constructor) => {
                self.call_function(
                    &constructor,
                    args,
                    Some(Value::Instance(Arc::clone(&instance))),
                    span,
                )?;
            }
            None if !args.is_empty() => {
                return Err(RuntimeError::new(
                    ErrorCode::NotCallable,
                    format!("class '{}' has no constructor taking arguments", class.name),
                    span,
                ));
            }
            None => {}
        }

        Ok(Value::Instance(instance))
    }

    // ------------------------------------------------------------------
    // coercion

    /// Automatic coercion used by typed bindings and `as` casts: int and
    /// float convert into each other, anything stringifies, truthiness
    /// produces bools, strings parse into numbers.
    pub(crate) fn coerce(
        &mut self,
        value: Value,
        target: &TypeName,
        span: &Span,
    ) -> EvalResult<Value> {
        let mismatch = |value: &Value| {
            RuntimeError::new(
                ErrorCode::InvalidCast,
                format!("cannot convert {} to {target}", value.type_name()),
                span,
            )
        };

        let coerced = match target {
            TypeName::Any => value,
            TypeName::Int => match &value {
                Value::Integer(_) => value,
                Value::Float(v) => Value::Integer(*v as i64),
                Value::Boolean(v) => Value::Integer(i64::from(*v)),
                Value::String(text) => match text.trim().parse::<i64>() {
                    Ok(parsed) => Value::Integer(parsed),
                    Err(_) => match text.trim().parse::<f64>() {
                        Ok(parsed) => Value::Integer(parsed as i64),
                        Err(_) => {
                            return Err(RuntimeError::new(
                                ErrorCode::InvalidCast,
                                format!("cannot parse '{text}' as int"),
                                span,
                            ))
                        }
                    },
                },
                _ => return Err(mismatch(&value)),
            },
            TypeName::Float => match &value {
                Value::Float(_) => value,
                Value::Integer(v) => Value::Float(*v as f64),
                Value::Boolean(v) => Value::Float(f64::from(u8::from(*v))),
                Value::String(text) => match text.trim().parse::<f64>() {
                    Ok(parsed) => Value::Float(parsed),
                    Err(_) => {
                        return Err(RuntimeError::new(
                            ErrorCode::InvalidCast,
                            format!("cannot parse '{text}' as float"),
                            span,
                        ))
                    }
                },
                _ => return Err(mismatch(&value)),
            },
            TypeName::String => Value::String(value.to_string()),
            TypeName::Bool => Value::Boolean(value.truthy()),
            TypeName::List => match value {
                Value::List(_) => value,
                _ => return Err(mismatch(&value)),
            },
            TypeName::Map => match value {
                Value::Map(_) => value,
                _ => return Err(mismatch(&value)),
            },
            TypeName::Named(_) => {
                if value.matches_type(target) {
                    value
                } else {
                    return Err(mismatch(&value));
                }
            }
        };
        Ok(coerced)
    }
}

fn normalize_index(index: i64, length: usize) -> Option<usize> {
    let length = length as i64;
    let index = if index < 0 { index + length } else { index };
    if (0..length).contains(&index) {
        Some(index as usize)
    } else {
        None
    }
}
