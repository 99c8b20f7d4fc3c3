//! Statement emission.

use crate::parser::ast::{
    ClassDecl, ElseBranch, Expression, FieldDecl, FunctionDecl, Ident, Statement, VarBinding,
};

use super::{emit_type_of_annotation, rust_ident, EmitType, RustEmitter};

impl RustEmitter<'_> {
    pub(crate) fn emit_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::VarBinding(binding) => self.emit_binding(binding),
            Statement::FunctionDecl(decl) => self.emit_function(decl, None),
            Statement::ClassDecl(decl) => self.emit_class(decl),
            Statement::Return { value, .. } => {
                let target = self.current_return.clone().unwrap_or(EmitType::Dyn);
                match value {
                    Some(value) => {
                        let (src, ty) = self.emit_expression(value);
                        let src = self.coerce_src(src, &ty, &target);
                        self.line(format!("return {src};"));
                    }
                    None => match target {
                        EmitType::Dyn => self.line("return Dyn::Null;"),
                        _ => self.line("return;"),
                    },
                }
            }
            Statement::If(if_statement) => {
                let cond = self.emit_condition(&if_statement.condition);
                self.line(format!("if {cond} {{"));
                self.emit_block_body(&if_statement.consequence.statements);
                let mut alternative = if_statement.alternative.as_ref();
                while let Some(branch) = alternative {
                    match branch {
                        ElseBranch::Block(block) => {
                            self.line("} else {");
                            self.emit_block_body(&block.statements);
                            alternative = None;
                        }
                        ElseBranch::If(nested) => {
                            let cond = self.emit_condition(&nested.condition);
                            self.line(format!("}} else if {cond} {{"));
                            self.emit_block_body(&nested.consequence.statements);
                            alternative = nested.alternative.as_ref();
                        }
                    }
                }
                self.line("}");
            }
            Statement::While {
                condition, body, ..
            } => {
                let cond = self.emit_condition(condition);
                self.line(format!("while {cond} {{"));
                self.emit_block_body(&body.statements);
                self.line("}");
            }
            Statement::For(for_statement) => {
                // The init and post land inside a dedicated scope so the
                // header variables stay local to the loop.
                self.line("{");
                self.push_scope();
                self.indented(|emitter| {
                    emitter.emit_statement(&for_statement.init);
                    let cond = emitter.emit_condition(&for_statement.condition);
                    emitter.line(format!("while {cond} {{"));
                    emitter.indented(|emitter| {
                        emitter.push_scope();
                        for statement in &for_statement.body.statements {
                            emitter.emit_statement(statement);
                        }
                        emitter.emit_statement(&for_statement.post);
                        emitter.pop_scope();
                    });
                    emitter.line("}");
                });
                self.pop_scope();
                self.line("}");
            }
            Statement::ForIn {
                variable,
                iterable,
                body,
                ..
            } => {
                let (src, ty) = self.emit_expression(iterable);
                let boxed = self.boxed(src, &ty);
                let variable = rust_ident(variable);
                self.line(format!("for {variable} in zy_iter({boxed}) {{"));
                self.push_scope();
                self.bind_local(&variable, EmitType::Dyn);
                self.indented(|emitter| {
                    for statement in &body.statements {
                        emitter.emit_statement(statement);
                    }
                });
                self.pop_scope();
                self.line("}");
            }
            Statement::Break { .. } => self.line("break;"),
            Statement::Continue { .. } => self.line("continue;"),
            Statement::Block(block) => {
                self.line("{");
                self.emit_block_body(&block.statements);
                self.line("}");
            }
            Statement::Expression(expression) => self.emit_expression_statement(expression),
            Statement::Export { inner, .. } => self.emit_statement(inner),
            Statement::Try(_) => self.stub("try/catch"),
            Statement::Throw { .. } => self.stub("throw"),
            Statement::Import { .. } => self.stub("import"),
            Statement::Switch(_) => self.stub("switch"),
            Statement::Match(_) => self.stub("match"),
            Statement::Spawn { .. } => self.stub("spawn"),
        }
    }

    fn emit_block_body(&mut self, statements: &[Statement]) {
        self.push_scope();
        self.indented(|emitter| {
            for statement in statements {
                emitter.emit_statement(statement);
            }
        });
        self.pop_scope();
    }

    fn emit_binding(&mut self, binding: &VarBinding) {
        let (src, value_ty) = self.emit_expression(&binding.value);
        let target_ty = match &binding.type_annotation {
            Some(annotation) => emit_type_of_annotation(Some(annotation)),
            None => value_ty.clone(),
        };
        let src = self.coerce_src(src, &value_ty, &target_ty);
        let name = rust_ident(&binding.name);
        let mutability = if binding.constant { "" } else { "mut " };
        self.line(format!(
            "let {mutability}{name}: {} = {src};",
            target_ty.rust_name()
        ));
        self.bind_local(&name, target_ty);
    }

    pub(crate) fn emit_function(&mut self, decl: &FunctionDecl, receiver: Option<&str>) {
        if decl.is_async {
            self.stub(&format!("async function '{}'", decl.name));
            return;
        }

        let return_ty = if decl.is_void {
            None
        } else {
            Some(emit_type_of_annotation(decl.return_type.as_ref()))
        };

        let mut params: Vec<String> = vec![];
        if let Some(receiver) = receiver {
            params.push(receiver.to_owned());
        }
        let mut param_types = vec![];
        for parameter in &decl.params {
            let ty = emit_type_of_annotation(parameter.type_annotation.as_ref());
            params.push(format!("{}: {}", rust_ident(&parameter.name), ty.rust_name()));
            param_types.push((rust_ident(&parameter.name), ty));
        }

        let signature = match &return_ty {
            Some(ty) => format!(
                "fn {}({}) -> {} {{",
                rust_ident(&decl.name),
                params.join(", "),
                ty.rust_name()
            ),
            None => format!("fn {}({}) {{", rust_ident(&decl.name), params.join(", ")),
        };
        self.line(signature);

        self.push_scope();
        for (name, ty) in param_types {
            self.bind_local(&name, ty);
        }
        let previous_return = self.current_return.clone();
        self.current_return = return_ty.clone();
        self.indented(|emitter| {
            for statement in &decl.body.statements {
                emitter.emit_statement(statement);
            }
            // Fallthrough value for bodies that do not end in a return.
            if let Some(ty) = &return_ty {
                emitter.line(default_value(ty));
            }
        });
        self.current_return = previous_return;
        self.pop_scope();
        self.line("}");
    }

    fn emit_class(&mut self, decl: &ClassDecl) {
        let name = rust_ident(&decl.name);
        let fields = self.flattened_field_decls(&decl.name);

        self.line(format!("#[derive(Clone, Debug)]"));
        self.line(format!("struct {name} {{"));
        self.indented(|emitter| {
            for field in &fields {
                let ty = emit_type_of_annotation(field.type_annotation.as_ref());
                emitter.line(format!("{}: {},", rust_ident(&field.name), ty.rust_name()));
            }
        });
        self.line("}");
        self.line("");

        self.line(format!("impl Default for {name} {{"));
        self.indented(|emitter| {
            emitter.line(format!("fn default() -> {name} {{"));
            emitter.indented(|emitter| {
                emitter.line(format!("{name} {{"));
                emitter.indented(|emitter| {
                    for field in &fields {
                        let target = emit_type_of_annotation(field.type_annotation.as_ref());
                        let (src, ty) = emitter.emit_expression(&field.default);
                        let src = emitter.coerce_src(src, &ty, &target);
                        emitter.line(format!("{}: {src},", rust_ident(&field.name)));
                    }
                });
                emitter.line("}");
            });
            emitter.line("}");
        });
        self.line("}");
        self.line("");

        let previous_class = self.current_class.replace(decl.name.clone());
        self.line(format!("impl {name} {{"));
        self.indented(|emitter| {
            match emitter.nearest_constructor(&decl.name) {
                Some(constructor) => {
                    let params: Vec<String> = constructor
                        .params
                        .iter()
                        .map(|p| {
                            format!(
                                "{}: {}",
                                rust_ident(&p.name),
                                emit_type_of_annotation(p.type_annotation.as_ref()).rust_name()
                            )
                        })
                        .collect();
                    let forwarded: Vec<String> = constructor
                        .params
                        .iter()
                        .map(|p| rust_ident(&p.name))
                        .collect();
                    emitter.line(format!(
                        "fn new({}) -> {name} {{",
                        params.join(", ")
                    ));
                    emitter.indented(|emitter| {
                        emitter.line(format!("let mut this = {name}::default();"));
                        emitter.line(format!("this.init({});", forwarded.join(", ")));
                        emitter.line("this");
                    });
                    emitter.line("}");
                    emitter.line("");
                    emitter.emit_function(&constructor, Some("&mut self"));
                }
                None => {
                    emitter.line(format!("fn new() -> {name} {{"));
                    emitter.indented(|emitter| emitter.line(format!("{name}::default()")));
                    emitter.line("}");
                }
            }

            for method in emitter.flattened_methods(&decl.name) {
                emitter.line("");
                emitter.emit_function(&method, Some("&mut self"));
            }
        });
        self.line("}");
        self.current_class = previous_class;
    }

    /// Fields of the class with superclass fields first.
    fn flattened_field_decls(&self, name: &str) -> Vec<FieldDecl> {
        let mut chain = vec![];
        let mut current = self.classes.get(name);
        while let Some(decl) = current {
            chain.push(decl);
            current = decl
                .superclass
                .as_ref()
                .and_then(|parent| self.classes.get(parent));
        }
        let mut fields = vec![];
        for decl in chain.iter().rev() {
            for field in &decl.fields {
                fields.retain(|f: &FieldDecl| f.name != field.name);
                fields.push(field.clone());
            }
        }
        fields
    }

    /// Methods including inherited ones, with subclass overrides winning.
    fn flattened_methods(&self, name: &str) -> Vec<FunctionDecl> {
        let mut chain = vec![];
        let mut current = self.classes.get(name);
        while let Some(decl) = current {
            chain.push(decl);
            current = decl
                .superclass
                .as_ref()
                .and_then(|parent| self.classes.get(parent));
        }
        let mut methods: Vec<FunctionDecl> = vec![];
        for decl in chain.iter().rev() {
            for method in &decl.methods {
                methods.retain(|m| m.name != method.name);
                methods.push(method.clone());
            }
        }
        methods
    }

    fn nearest_constructor(&self, name: &str) -> Option<FunctionDecl> {
        let mut current = self.classes.get(name);
        while let Some(decl) = current {
            if let Some(constructor) = &decl.constructor {
                return Some(constructor.clone());
            }
            current = decl
                .superclass
                .as_ref()
                .and_then(|parent| self.classes.get(parent));
        }
        None
    }

    fn emit_expression_statement(&mut self, expression: &Expression) {
        match expression {
            // `show.log(…)` becomes a direct println!.
            Expression::Call { callee, args, .. } if is_show_log(callee) => {
                let call = self.emit_show_log(args);
                self.line(format!("{call};"));
            }
            Expression::Assign { .. } => {
                if let Some(line) = self.emit_assignment_statement(expression) {
                    self.line(line);
                }
            }
            Expression::Call { .. } | Expression::MethodCall { .. } => {
                let (src, _) = self.emit_expression(expression);
                self.line(format!("{src};"));
            }
            other => {
                let (src, _) = self.emit_expression(other);
                self.line(format!("let _ = {src};"));
            }
        }
    }

    fn emit_assignment_statement(&mut self, expression: &Expression) -> Option<String> {
        let Expression::Assign {
            target,
            operator,
            value,
            ..
        } = expression
        else {
            return None;
        };

        let (value_src, value_ty) = self.emit_expression(value);

        let (target_src, target_ty) = match target.as_ref() {
            Expression::Identifier(Ident { name, .. }) => {
                let name = rust_ident(name);
                let ty = self.type_of_name(&name);
                (name, ty)
            }
            Expression::Member { .. } | Expression::Index { .. } => {
                let (src, ty) = self.emit_expression(target);
                (src, ty)
            }
            _ => {
                self.stub("assignment target");
                return None;
            }
        };

        // Indexed writes have no native place expression in the subset.
        if matches!(target.as_ref(), Expression::Index { .. }) {
            self.stub("index assignment");
            return None;
        }

        let rhs = match operator.binary() {
            Some(op) => {
                let combined = self.emit_binary_src(
                    target_src.clone(),
                    target_ty.clone(),
                    op,
                    value_src,
                    value_ty,
                );
                self.coerce_src(combined.0, &combined.1, &target_ty)
            }
            None => self.coerce_src(value_src, &value_ty, &target_ty),
        };

        Some(format!("{target_src} = {rhs};"))
    }
}

fn is_show_log(callee: &Expression) -> bool {
    matches!(
        callee,
        Expression::Member { object, property, .. }
            if property == "log"
                && matches!(object.as_ref(), Expression::Identifier(Ident { name, .. }) if name == "show")
    )
}

pub(crate) fn default_value(ty: &EmitType) -> String {
    match ty {
        EmitType::Int => "0i64".into(),
        EmitType::Float => "0f64".into(),
        EmitType::Str => "String::new()".into(),
        EmitType::Bool => "false".into(),
        EmitType::Dyn => "Dyn::Null".into(),
        EmitType::Class(name) => format!("{name}::default()"),
    }
}
