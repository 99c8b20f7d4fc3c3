//! Expression emission: each expression yields a Rust source fragment and
//! the static representation the fragment evaluates to.

use crate::parser::ast::{
    Expression, Ident, InfixOperator, Number, PrefixOperator, TypeName,
};
use crate::typechecker::Type;

use super::{emit_type_of, rust_ident, rust_string, EmitType, RustEmitter};

impl RustEmitter<'_> {
    pub(crate) fn emit_expression(&mut self, expression: &Expression) -> (String, EmitType) {
        match expression {
            Expression::NumberLit { value, .. } => match value {
                Number::Integer(v) => {
                    if *v < 0 {
                        (format!("({v}i64)"), EmitType::Int)
                    } else {
                        (format!("{v}i64"), EmitType::Int)
                    }
                }
                Number::Float(v) => (format!("{v:?}f64"), EmitType::Float),
            },
            Expression::StringLit { value, .. } => (
                format!("String::from({})", rust_string(value)),
                EmitType::Str,
            ),
            Expression::BooleanLit { value, .. } => (value.to_string(), EmitType::Bool),
            Expression::NullLit { .. } => ("Dyn::Null".into(), EmitType::Dyn),
            Expression::Identifier(Ident { name, .. }) => {
                let name = rust_ident(name);
                let ty = self.type_of_name(&name);
                (name, ty)
            }
            Expression::This { .. } => {
                let ty = self
                    .current_class
                    .clone()
                    .map(EmitType::Class)
                    .unwrap_or(EmitType::Dyn);
                ("self".into(), ty)
            }
            Expression::Prefix {
                operator, operand, ..
            } => {
                let (src, ty) = self.emit_expression(operand);
                match operator {
                    PrefixOperator::Not => {
                        let cond = self.truthy_src(src, &ty);
                        (format!("(!{cond})"), EmitType::Bool)
                    }
                    PrefixOperator::Negate if ty.is_numeric() => {
                        (format!("(-{src})"), ty)
                    }
                    PrefixOperator::Negate => {
                        let boxed = self.boxed(src, &ty);
                        (
                            format!("zy_arith('-', Dyn::Int(0), {boxed})"),
                            EmitType::Dyn,
                        )
                    }
                }
            }
            Expression::Infix {
                left,
                operator,
                right,
                ..
            } => {
                let (l, lt) = self.emit_expression(left);
                let (r, rt) = self.emit_expression(right);
                self.emit_binary_src(l, lt, *operator, r, rt)
            }
            Expression::IfExpr {
                then_value,
                condition,
                else_value,
                ..
            } => {
                let cond = self.emit_condition(condition);
                let (then_src, then_ty) = self.emit_expression(then_value);
                let (else_src, else_ty) = self.emit_expression(else_value);
                if then_ty == else_ty {
                    (
                        format!("(if {cond} {{ {then_src} }} else {{ {else_src} }})"),
                        then_ty,
                    )
                } else {
                    let then_src = self.boxed(then_src, &then_ty);
                    let else_src = self.boxed(else_src, &else_ty);
                    (
                        format!("(if {cond} {{ {then_src} }} else {{ {else_src} }})"),
                        EmitType::Dyn,
                    )
                }
            }
            Expression::Call { callee, args, .. } => self.emit_call(callee, args),
            Expression::MethodCall {
                object,
                method,
                args,
                ..
            } => self.emit_method_call(object, method, args),
            Expression::Member {
                object, property, ..
            } => {
                let (src, ty) = self.emit_expression(object);
                if let EmitType::Class(class) = &ty {
                    let fields = self.flattened_fields(class);
                    if let Some((_, field_ty, _)) =
                        fields.iter().find(|(name, _, _)| name == property)
                    {
                        return (
                            format!("{src}.{}", rust_ident(property)),
                            field_ty.clone(),
                        );
                    }
                }
                self.stub_expression(&format!("member access '{property}'"))
            }
            Expression::Index { object, index, .. } => {
                let (object_src, object_ty) = self.emit_expression(object);
                let (index_src, index_ty) = self.emit_expression(index);
                let object_src = self.boxed(object_src, &object_ty);
                let index_src = self.boxed(index_src, &index_ty);
                (
                    format!("zy_index(&{object_src}, &{index_src}).unwrap()"),
                    EmitType::Dyn,
                )
            }
            Expression::Slice {
                object, start, end, ..
            } => {
                let (object_src, object_ty) = self.emit_expression(object);
                let object_src = self.boxed(object_src, &object_ty);
                let start = self.emit_slice_bound(start.as_deref());
                let end = self.emit_slice_bound(end.as_deref());
                (
                    format!("zy_slice(&{object_src}, {start}, {end}).unwrap()"),
                    EmitType::Dyn,
                )
            }
            Expression::Range { start, end, .. } => {
                let (start_src, start_ty) = self.emit_expression(start);
                let (end_src, end_ty) = self.emit_expression(end);
                let start_src = self.coerce_src(start_src, &start_ty, &EmitType::Int);
                let end_src = self.coerce_src(end_src, &end_ty, &EmitType::Int);
                (
                    format!("Dyn::List(({start_src}..{end_src}).map(Dyn::Int).collect())"),
                    EmitType::Dyn,
                )
            }
            Expression::ListLit { elements, .. } => {
                let rendered: Vec<String> = elements
                    .iter()
                    .map(|element| {
                        let (src, ty) = self.emit_expression(element);
                        self.boxed(src, &ty)
                    })
                    .collect();
                (
                    format!("Dyn::List(vec![{}])", rendered.join(", ")),
                    EmitType::Dyn,
                )
            }
            Expression::SetLit { elements, .. } => {
                // Sets are outside the guaranteed subset; a list literal
                // keeps the elements observable.
                let rendered: Vec<String> = elements
                    .iter()
                    .map(|element| {
                        let (src, ty) = self.emit_expression(element);
                        self.boxed(src, &ty)
                    })
                    .collect();
                (
                    format!("Dyn::List(vec![{}])", rendered.join(", ")),
                    EmitType::Dyn,
                )
            }
            Expression::MapLit { entries, .. } => {
                let rendered: Vec<String> = entries
                    .iter()
                    .map(|(key, value)| {
                        let key_src = match key {
                            Expression::StringLit { value, .. } => {
                                format!("String::from({})", rust_string(value))
                            }
                            other => {
                                let (src, ty) = self.emit_expression(other);
                                let boxed = self.boxed(src, &ty);
                                format!("zy_to_string(&{boxed})")
                            }
                        };
                        let (value_src, value_ty) = self.emit_expression(value);
                        let value_src = self.boxed(value_src, &value_ty);
                        format!("({key_src}, {value_src})")
                    })
                    .collect();
                (
                    format!("Dyn::Map(vec![{}])", rendered.join(", ")),
                    EmitType::Dyn,
                )
            }
            Expression::Cast { value, target, .. } => {
                let (src, ty) = self.emit_expression(value);
                let target_ty = match target {
                    TypeName::Int => EmitType::Int,
                    TypeName::Float => EmitType::Float,
                    TypeName::String => EmitType::Str,
                    TypeName::Bool => EmitType::Bool,
                    _ => EmitType::Dyn,
                };
                let src = self.coerce_src(src, &ty, &target_ty);
                (src, target_ty)
            }
            Expression::Assign { .. } => {
                // Assignments are emitted at statement level only.
                self.stub_expression("assignment in expression position")
            }
            Expression::TemplateString { .. } => self.stub_expression("template string"),
            Expression::Await { .. } => self.stub_expression("await"),
            Expression::SuperRef { .. } => self.stub_expression("super"),
            Expression::BlockExpr(_) => self.stub_expression("block expression"),
            Expression::FunctionLit { .. } => self.stub_expression("function literal"),
            Expression::ArrowFunction { .. } => self.stub_expression("arrow function"),
        }
    }

    pub(crate) fn stub_expression(&mut self, what: &str) -> (String, EmitType) {
        (
            format!("Dyn::Null /* zylo: unsupported {what} */"),
            EmitType::Dyn,
        )
    }

    fn emit_slice_bound(&mut self, bound: Option<&Expression>) -> String {
        match bound {
            Some(bound) => {
                let (src, ty) = self.emit_expression(bound);
                let src = self.coerce_src(src, &ty, &EmitType::Int);
                format!("Some({src})")
            }
            None => "None".into(),
        }
    }

    // ------------------------------------------------------------------
    // operators

    pub(crate) fn emit_binary_src(
        &mut self,
        l: String,
        lt: EmitType,
        operator: InfixOperator,
        r: String,
        rt: EmitType,
    ) -> (String, EmitType) {
        use InfixOperator::*;

        let native_numeric = lt.is_numeric() && rt.is_numeric();
        let widened = || {
            if lt == EmitType::Float || rt == EmitType::Float {
                EmitType::Float
            } else {
                EmitType::Int
            }
        };
        let cast = |src: &str, from: &EmitType, to: &EmitType| {
            if from == to {
                src.to_owned()
            } else {
                format!("(({src}) as f64)")
            }
        };

        match operator {
            Add | Subtract | Multiply | Divide | Modulo => {
                if operator == Add && lt == EmitType::Str && rt == EmitType::Str {
                    return (format!("format!(\"{{}}{{}}\", {l}, {r})"), EmitType::Str);
                }
                if operator == Add
                    && (lt == EmitType::Str && rt.is_numeric()
                        || lt.is_numeric() && rt == EmitType::Str)
                {
                    return (format!("format!(\"{{}}{{}}\", {l}, {r})"), EmitType::Str);
                }
                if native_numeric {
                    let ty = widened();
                    let l = cast(&l, &lt, &ty);
                    let r = cast(&r, &rt, &ty);
                    let op = match operator {
                        Add => "+",
                        Subtract => "-",
                        Multiply => "*",
                        Divide => "/",
                        Modulo => "%",
                        _ => unreachable!(),
                    };
                    return (format!("({l} {op} {r})"), ty);
                }
                let op = match operator {
                    Add => '+',
                    Subtract => '-',
                    Multiply => '*',
                    Divide => '/',
                    Modulo => '%',
                    _ => unreachable!(),
                };
                let l = self.boxed(l, &lt);
                let r = self.boxed(r, &rt);
                (format!("zy_arith('{op}', {l}, {r})"), EmitType::Dyn)
            }
            Power => {
                if lt == EmitType::Int && rt == EmitType::Int {
                    (format!("zy_powi({l}, {r})"), EmitType::Int)
                } else if native_numeric {
                    let l = cast(&l, &lt, &EmitType::Float);
                    let r = cast(&r, &rt, &EmitType::Float);
                    (format!("({l}).powf({r})"), EmitType::Float)
                } else {
                    self.stub_expression("'**' on untyped operands")
                }
            }
            FloorDivide => {
                if lt == EmitType::Int && rt == EmitType::Int {
                    (format!("zy_fdivi({l}, {r})"), EmitType::Int)
                } else if native_numeric {
                    let l = cast(&l, &lt, &EmitType::Float);
                    let r = cast(&r, &rt, &EmitType::Float);
                    (format!("(({l}) / ({r})).floor()"), EmitType::Float)
                } else {
                    self.stub_expression("'//' on untyped operands")
                }
            }
            LessThan | LessOrEqual | GreaterThan | GreaterOrEqual => {
                let op = match operator {
                    LessThan => "<",
                    LessOrEqual => "<=",
                    GreaterThan => ">",
                    GreaterOrEqual => ">=",
                    _ => unreachable!(),
                };
                if native_numeric {
                    let ty = widened();
                    let l = cast(&l, &lt, &ty);
                    let r = cast(&r, &rt, &ty);
                    (format!("({l} {op} {r})"), EmitType::Bool)
                } else {
                    let l = self.boxed(l, &lt);
                    let r = self.boxed(r, &rt);
                    (format!("zy_cmp(\"{op}\", &{l}, &{r})"), EmitType::Bool)
                }
            }
            Equal | NotEqual => {
                let negate = operator == NotEqual;
                let src = if lt == rt && lt != EmitType::Dyn {
                    format!("({l} == {r})")
                } else {
                    let l = self.boxed(l, &lt);
                    let r = self.boxed(r, &rt);
                    format!("zy_eq(&{l}, &{r})")
                };
                let src = if negate { format!("(!{src})") } else { src };
                (src, EmitType::Bool)
            }
            And | Or => {
                let l = self.truthy_src(l, &lt);
                let r = self.truthy_src(r, &rt);
                let op = if operator == And { "&&" } else { "||" };
                (format!("({l} {op} {r})"), EmitType::Bool)
            }
            In => self.stub_expression("'in' operator"),
        }
    }

    // ------------------------------------------------------------------
    // calls

    fn emit_call(&mut self, callee: &Expression, args: &[Expression]) -> (String, EmitType) {
        if let Expression::Member {
            object, property, ..
        } = callee
        {
            let is_show = matches!(
                object.as_ref(),
                Expression::Identifier(Ident { name, .. }) if name == "show"
            );
            if is_show && property == "log" {
                let call = self.emit_show_log(args);
                return (format!("{{ {call}; Dyn::Null }}"), EmitType::Dyn);
            }
        }

        if let Expression::Identifier(Ident { name, .. }) = callee {
            // Constructor call.
            if self.classes.contains_key(name) {
                let constructor = self.nearest_constructor_params(name);
                let rendered = self.emit_arguments(args, constructor.as_deref());
                return (
                    format!("{}::new({})", rust_ident(name), rendered.join(", ")),
                    EmitType::Class(name.clone()),
                );
            }

            match name.as_str() {
                "print" | "println" => {
                    let call = self.emit_show_log(args);
                    return (format!("{{ {call}; Dyn::Null }}"), EmitType::Dyn);
                }
                "len" => {
                    if let [arg] = args {
                        let (src, ty) = self.emit_expression(arg);
                        let boxed = self.boxed(src, &ty);
                        return (format!("zy_len(&{boxed})"), EmitType::Int);
                    }
                }
                "string" | "int" | "float" | "bool" => {
                    if let [arg] = args {
                        let (src, ty) = self.emit_expression(arg);
                        let target = match name.as_str() {
                            "string" => EmitType::Str,
                            "int" => EmitType::Int,
                            "float" => EmitType::Float,
                            _ => EmitType::Bool,
                        };
                        let src = self.coerce_src(src, &ty, &target);
                        return (src, target);
                    }
                }
                _ => {}
            }

            // User function with a known signature from the symbol table.
            if let Some(symbol) = self.table_symbol(name) {
                if let Type::Function {
                    params,
                    return_type,
                    ..
                } = &symbol
                {
                    let param_types: Vec<EmitType> = params.iter().map(emit_type_of).collect();
                    let rendered = self.emit_arguments(args, Some(&param_types));
                    return (
                        format!("{}({})", rust_ident(name), rendered.join(", ")),
                        emit_type_of(return_type),
                    );
                }
            }
        }

        self.stub_expression("dynamic call")
    }

    fn emit_method_call(
        &mut self,
        object: &Expression,
        method: &str,
        args: &[Expression],
    ) -> (String, EmitType) {
        let (src, ty) = self.emit_expression(object);
        let EmitType::Class(class) = &ty else {
            return self.stub_expression(&format!("method call '{method}'"));
        };

        let Some(signature) = self.method_signature(class, method) else {
            return self.stub_expression(&format!("method call '{method}'"));
        };
        let (param_types, return_ty) = signature;
        let rendered = self.emit_arguments(args, Some(&param_types));
        (
            format!("{src}.{}({})", rust_ident(method), rendered.join(", ")),
            return_ty,
        )
    }

    fn emit_arguments(
        &mut self,
        args: &[Expression],
        params: Option<&[EmitType]>,
    ) -> Vec<String> {
        args.iter()
            .enumerate()
            .map(|(index, arg)| {
                let (src, ty) = self.emit_expression(arg);
                match params.and_then(|p| p.get(index)) {
                    Some(target) => self.coerce_src(src, &ty, target),
                    None => self.boxed(src, &ty),
                }
            })
            .collect()
    }

    pub(crate) fn emit_show_log(&mut self, args: &[Expression]) -> String {
        if args.is_empty() {
            return "println!()".into();
        }
        let slots = vec!["{}"; args.len()].join(" ");
        let rendered: Vec<String> = args
            .iter()
            .map(|arg| {
                let (src, _) = self.emit_expression(arg);
                src
            })
            .collect();
        format!("println!(\"{slots}\", {})", rendered.join(", "))
    }

    // ------------------------------------------------------------------
    // representation plumbing

    fn method_signature(&self, class: &str, method: &str) -> Option<(Vec<EmitType>, EmitType)> {
        let mut current = self.classes.get(class);
        while let Some(decl) = current {
            if let Some(found) = decl.methods.iter().find(|m| m.name == method) {
                let params = found
                    .params
                    .iter()
                    .map(|p| super::emit_type_of_annotation(p.type_annotation.as_ref()))
                    .collect();
                let return_ty =
                    super::emit_type_of_annotation(found.return_type.as_ref());
                return Some((params, return_ty));
            }
            current = decl
                .superclass
                .as_ref()
                .and_then(|parent| self.classes.get(parent));
        }
        None
    }

    fn nearest_constructor_params(&self, class: &str) -> Option<Vec<EmitType>> {
        let mut current = self.classes.get(class);
        while let Some(decl) = current {
            if let Some(constructor) = &decl.constructor {
                return Some(
                    constructor
                        .params
                        .iter()
                        .map(|p| super::emit_type_of_annotation(p.type_annotation.as_ref()))
                        .collect(),
                );
            }
            current = decl
                .superclass
                .as_ref()
                .and_then(|parent| self.classes.get(parent));
        }
        None
    }

    fn table_symbol(&self, name: &str) -> Option<Type> {
        self.table.resolve_global(name).map(|symbol| symbol.ty)
    }

    pub(crate) fn emit_condition(&mut self, condition: &Expression) -> String {
        let (src, ty) = self.emit_expression(condition);
        self.truthy_src(src, &ty)
    }

    pub(crate) fn truthy_src(&mut self, src: String, ty: &EmitType) -> String {
        match ty {
            EmitType::Bool => src,
            EmitType::Dyn => format!("zy_truthy(&({src}))"),
            EmitType::Int => format!("(({src}) != 0)"),
            EmitType::Str => format!("(!({src}).is_empty())"),
            _ => format!("zy_truthy(&{})", self.boxed(src, ty)),
        }
    }

    /// Wrap a native fragment into the boxed representation. Non-`Copy`
    /// sources are cloned so a variable can appear in several boxed spots.
    pub(crate) fn boxed(&mut self, src: String, ty: &EmitType) -> String {
        match ty {
            EmitType::Int => format!("Dyn::Int({src})"),
            EmitType::Float => format!("Dyn::Float({src})"),
            EmitType::Str => format!("Dyn::Str(({src}).clone())"),
            EmitType::Bool => format!("Dyn::Bool({src})"),
            EmitType::Dyn => format!("({src}).clone()"),
            EmitType::Class(_) => "Dyn::Null".into(),
        }
    }

    /// Convert a fragment from one representation to another.
    pub(crate) fn coerce_src(&mut self, src: String, from: &EmitType, to: &EmitType) -> String {
        if from == to {
            return src;
        }
        match (from, to) {
            (EmitType::Int, EmitType::Float) => format!("(({src}) as f64)"),
            (EmitType::Float, EmitType::Int) => format!("(({src}) as i64)"),
            (_, EmitType::Dyn) => self.boxed(src, from),
            (EmitType::Dyn, EmitType::Int) => format!("zy_to_int(&({src}))"),
            (EmitType::Dyn, EmitType::Float) => format!("zy_to_float(&({src}))"),
            (EmitType::Dyn, EmitType::Str) => format!("zy_to_string(&({src}))"),
            (EmitType::Dyn, EmitType::Bool) => format!("zy_to_bool(&({src}))"),
            (EmitType::Int | EmitType::Float | EmitType::Bool, EmitType::Str) => {
                format!("format!(\"{{}}\", {src})")
            }
            _ => src,
        }
    }
}
