//! Syntactic analysis: token stream to AST.
//!
//! Statements are recognised by their leading token (with a small lookahead
//! for identifier-led forms); expressions are parsed by Pratt-style
//! precedence climbing in [`expressions`]. Errors are accumulated rather
//! than thrown: on a malformed statement the parser records a diagnostic,
//! resynchronises at the next statement boundary and keeps going.

pub mod ast;
mod expressions;

pub use expressions::Precedence;

use log::debug;

use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::lexer::{Literal, Span, Token, TokenKind};

use self::ast::{
    Block, CatchClause, ClassDecl, ElseBranch, Expression, FieldDecl, ForStatement, FunctionDecl,
    IfStatement, ImportTarget, MatchArm, MatchStatement, Parameter, Pattern, Program, Statement,
    SwitchCase, SwitchStatement, TryStatement, TypeName, VarBinding, Visibility,
};

type ParseResult<T> = Result<T, Diagnostic>;

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    errors: Vec<Diagnostic>,
    /// Depth of enclosing `(`/`[` groups; newlines are insignificant
    /// inside them.
    pub(crate) group_depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            position: 0,
            errors: vec![],
            group_depth: 0,
        }
    }

    pub fn parse(mut self) -> (Program, Vec<Diagnostic>) {
        let mut statements = vec![];
        self.skip_terminators();

        while !self.at_end() {
            let before = self.position;
            match self.parse_statement() {
                Ok(statement) => statements.push(statement),
                Err(diagnostic) => {
                    self.errors.push(diagnostic);
                    self.synchronize();
                    // Stray closers have no block to consume them here.
                    if self.position == before && !self.at_end() {
                        self.advance();
                    }
                }
            }
            self.skip_terminators();
        }

        debug!("parsed {} top-level statements", statements.len());
        (Program { statements }, self.errors)
    }

    // ------------------------------------------------------------------
    // token plumbing

    pub(crate) fn current(&self) -> &Token {
        self.tokens
            .get(self.position)
            .unwrap_or_else(|| self.tokens.last().expect("token stream ends in EOF"))
    }

    pub(crate) fn kind(&self) -> TokenKind {
        self.current().kind
    }

    pub(crate) fn peek_kind(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.position + offset)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    pub(crate) fn span(&self) -> Span {
        self.current().span
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.position + 1 < self.tokens.len() {
            self.position += 1;
        }
        token
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    pub(crate) fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind, context: &str) -> ParseResult<Token> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        Err(self.unexpected(context, Some(kind)))
    }

    pub(crate) fn unexpected(&self, context: &str, expected: Option<TokenKind>) -> Diagnostic {
        let current = self.current();
        let code = if current.kind == TokenKind::Eof {
            ErrorCode::UnexpectedEof
        } else {
            ErrorCode::UnexpectedToken
        };
        let mut diagnostic = Diagnostic::error(
            code,
            format!("unexpected {} while parsing {context}", current.kind),
            &current.span,
        )
        .with_received(current.kind.to_string());
        if let Some(expected) = expected {
            diagnostic = diagnostic.with_expected(expected.to_string());
        }
        diagnostic
    }

    /// Turn a lexer error token into a positioned syntax diagnostic.
    pub(crate) fn error_token_diagnostic(&self, token: &Token) -> Diagnostic {
        let message = match &token.literal {
            Some(Literal::Str(message)) => message.clone(),
            _ => format!("invalid token '{}'", token.lexeme),
        };
        let code = if message.contains("string") {
            ErrorCode::UnterminatedString
        } else if message.contains("comment") {
            ErrorCode::UnterminatedComment
        } else if message.contains("escape") {
            ErrorCode::InvalidEscape
        } else if message.contains("literal") {
            ErrorCode::InvalidNumber
        } else if message.contains("operator") {
            ErrorCode::InvalidOperator
        } else {
            ErrorCode::UnexpectedToken
        };
        Diagnostic::error(code, message, &token.span)
    }

    pub(crate) fn checkpoint(&self) -> usize {
        self.position
    }

    pub(crate) fn rewind(&mut self, checkpoint: usize) {
        self.position = checkpoint;
    }

    pub(crate) fn at_end(&self) -> bool {
        self.kind() == TokenKind::Eof
    }

    pub(crate) fn skip_newlines(&mut self) {
        while self.check(TokenKind::Newline) {
            self.advance();
        }
    }

    fn skip_terminators(&mut self) {
        while matches!(self.kind(), TokenKind::Newline | TokenKind::Semicolon) {
            self.advance();
        }
    }

    /// Advance past the offending tokens up to the next statement boundary.
    /// A closing brace is left for the enclosing block to consume.
    fn synchronize(&mut self) {
        if !self.at_end()
            && !matches!(
                self.kind(),
                TokenKind::Newline | TokenKind::Semicolon | TokenKind::RBrace
            )
        {
            self.advance();
        }
        while !self.at_end() {
            match self.kind() {
                TokenKind::Newline | TokenKind::Semicolon => {
                    self.advance();
                    return;
                }
                TokenKind::RBrace => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // statements

    pub(crate) fn parse_statement(&mut self) -> ParseResult<Statement> {
        match self.kind() {
            TokenKind::Error => {
                let token = self.advance();
                Err(self.error_token_diagnostic(&token))
            }
            TokenKind::Public | TokenKind::Private | TokenKind::Void | TokenKind::Export => {
                self.parse_modified_declaration()
            }
            TokenKind::Var | TokenKind::Const => self.parse_keyword_binding(),
            TokenKind::Func | TokenKind::Async => {
                self.parse_function_decl(Visibility::Package, false)
            }
            TokenKind::Class => self.parse_class_decl(Visibility::Package),
            TokenKind::Return => self.parse_return(),
            TokenKind::If => self.parse_if().map(Statement::If),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Break => {
                let span = self.advance().span;
                Ok(Statement::Break { span })
            }
            TokenKind::Continue => {
                let span = self.advance().span;
                Ok(Statement::Continue { span })
            }
            TokenKind::Try => self.parse_try(),
            TokenKind::Throw => {
                let span = self.advance().span;
                let value = self.parse_expression(Precedence::Lowest)?;
                Ok(Statement::Throw { value, span })
            }
            TokenKind::Import => self.parse_import(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Match => self.parse_match(),
            TokenKind::Spawn => {
                let span = self.advance().span;
                let body = self.parse_block()?;
                Ok(Statement::Spawn { body, span })
            }
            TokenKind::LBrace => self.parse_brace_statement(),
            TokenKind::Identifier => self.parse_identifier_led(),
            _ => {
                let expression = self.parse_expression(Precedence::Lowest)?;
                Ok(Statement::Expression(expression))
            }
        }
    }

    /// `public | private | void | export` prefixes before a declaration.
    fn parse_modified_declaration(&mut self) -> ParseResult<Statement> {
        let mut visibility = Visibility::Package;
        let mut is_void = false;
        let mut export_span = None;

        loop {
            match self.kind() {
                TokenKind::Public => {
                    visibility = Visibility::Public;
                    self.advance();
                }
                TokenKind::Private => {
                    visibility = Visibility::Private;
                    self.advance();
                }
                TokenKind::Void => {
                    is_void = true;
                    self.advance();
                }
                TokenKind::Export => {
                    export_span = Some(self.advance().span);
                    visibility = Visibility::Public;
                }
                _ => break,
            }
        }

        let inner = match self.kind() {
            TokenKind::Func | TokenKind::Async => self.parse_function_decl(visibility, is_void)?,
            TokenKind::Class if !is_void => self.parse_class_decl(visibility)?,
            TokenKind::Var | TokenKind::Const if !is_void => self.parse_keyword_binding()?,
            TokenKind::Identifier if !is_void => self.parse_identifier_led()?,
            _ => {
                return Err(Diagnostic::error(
                    ErrorCode::MalformedDeclaration,
                    format!("expected a declaration after modifier, found {}", self.kind()),
                    &self.span(),
                ))
            }
        };

        match export_span {
            Some(span) => Ok(Statement::Export {
                inner: Box::new(inner),
                span,
            }),
            None => Ok(inner),
        }
    }

    /// Statements led by a bare identifier: walrus binding, typed binding
    /// or (with a deeper lookahead) a `func`-less function declaration;
    /// everything else is an expression statement.
    fn parse_identifier_led(&mut self) -> ParseResult<Statement> {
        if self.peek_kind(1) == TokenKind::Walrus {
            return self.parse_walrus_binding(None);
        }

        let next = self.peek_kind(1);
        if (next.is_type_keyword() || next == TokenKind::Identifier)
            && self.peek_kind(2) == TokenKind::Walrus
        {
            let name = self.advance();
            let annotation = self.parse_type_name("type annotation")?;
            return self.parse_walrus_binding_with_name(name, Some(annotation));
        }

        if next == TokenKind::LParen {
            let checkpoint = self.checkpoint();
            if let Some(decl) = self.try_parse_unmarked_function()? {
                return Ok(decl);
            }
            self.rewind(checkpoint);
        }

        let expression = self.parse_expression(Precedence::Lowest)?;
        Ok(Statement::Expression(expression))
    }

    fn parse_walrus_binding(&mut self, annotation: Option<TypeName>) -> ParseResult<Statement> {
        let name = self.advance();
        self.parse_walrus_binding_with_name(name, annotation)
    }

    fn parse_walrus_binding_with_name(
        &mut self,
        name: Token,
        annotation: Option<TypeName>,
    ) -> ParseResult<Statement> {
        self.expect(TokenKind::Walrus, "binding")?;
        let value = self.parse_expression(Precedence::Lowest)?;
        let constant = is_constant_name(&name.lexeme);
        Ok(Statement::VarBinding(VarBinding {
            name: name.lexeme,
            type_annotation: annotation,
            value,
            constant,
            span: name.span,
        }))
    }

    /// `var x [: type] = expr` and `const X [: type] = expr`.
    fn parse_keyword_binding(&mut self) -> ParseResult<Statement> {
        let keyword = self.advance();
        let name = self.expect(TokenKind::Identifier, "binding name")?;

        let mut annotation = None;
        if self.matches(TokenKind::Colon) {
            annotation = Some(self.parse_type_name("type annotation")?);
        }

        if !self.matches(TokenKind::Assign) {
            return Err(Diagnostic::error(
                ErrorCode::MissingInitializer,
                format!("binding for '{}' requires an initialiser", name.lexeme),
                &name.span,
            )
            .with_suggestion(format!("write '{} = <value>'", name.lexeme)));
        }

        let value = self.parse_expression(Precedence::Lowest)?;
        let constant = keyword.kind == TokenKind::Const || is_constant_name(&name.lexeme);
        Ok(Statement::VarBinding(VarBinding {
            name: name.lexeme,
            type_annotation: annotation,
            value,
            constant,
            span: keyword.span,
        }))
    }

    /// `name(params) [: type] { … }` without the `func` keyword. Returns
    /// `None` (after the caller rewinds) when the shape turns out to be a
    /// call expression instead.
    fn try_parse_unmarked_function(&mut self) -> ParseResult<Option<Statement>> {
        let name = self.advance();
        let checkpoint = self.checkpoint();

        let Ok(params) = self.parse_parameters() else {
            self.rewind(checkpoint);
            return Ok(None);
        };

        let mut return_type = None;
        if self.check(TokenKind::Colon) {
            self.advance();
            let Ok(annotation) = self.parse_type_name("return type") else {
                return Ok(None);
            };
            return_type = Some(annotation);
        }

        if !self.check(TokenKind::LBrace) {
            return Ok(None);
        }

        let body = self.parse_block()?;
        Ok(Some(Statement::FunctionDecl(FunctionDecl {
            name: name.lexeme,
            params,
            return_type,
            body,
            is_async: false,
            is_void: false,
            visibility: Visibility::Package,
            span: name.span,
        })))
    }

    fn parse_function_decl(
        &mut self,
        visibility: Visibility,
        is_void: bool,
    ) -> ParseResult<Statement> {
        let is_async = self.matches(TokenKind::Async);
        let keyword_span = self.span();
        self.matches(TokenKind::Func);

        let name = self.expect(TokenKind::Identifier, "function name")?;
        let params = self.parse_parameters()?;

        let mut return_type = None;
        if self.matches(TokenKind::Colon) {
            return_type = Some(self.parse_type_name("return type")?);
        }

        let body = self.parse_block()?;
        Ok(Statement::FunctionDecl(FunctionDecl {
            name: name.lexeme,
            params,
            return_type,
            body,
            is_async,
            is_void,
            visibility,
            span: keyword_span,
        }))
    }

    /// `( name [type | : type] , … )` — an absent annotation means `any`.
    pub(crate) fn parse_parameters(&mut self) -> ParseResult<Vec<Parameter>> {
        self.expect(TokenKind::LParen, "parameter list")?;
        self.group_depth += 1;
        let result = self.parse_parameters_inner();
        self.group_depth -= 1;
        result
    }

    fn parse_parameters_inner(&mut self) -> ParseResult<Vec<Parameter>> {
        let mut params = vec![];
        self.skip_newlines();
        while !self.check(TokenKind::RParen) {
            let name = self.expect(TokenKind::Identifier, "parameter name")?;
            let mut annotation = None;
            if self.matches(TokenKind::Colon) {
                annotation = Some(self.parse_type_name("parameter type")?);
            } else if self.kind().is_type_keyword() || self.check(TokenKind::Identifier) {
                annotation = Some(self.parse_type_name("parameter type")?);
            }
            params.push(Parameter {
                name: name.lexeme,
                type_annotation: annotation,
                span: name.span,
            });
            self.skip_newlines();
            if !self.matches(TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }
        self.expect(TokenKind::RParen, "parameter list")?;
        Ok(params)
    }

    pub(crate) fn parse_type_name(&mut self, context: &str) -> ParseResult<TypeName> {
        let token = self.advance();
        let type_name = match token.kind {
            TokenKind::TypeInt => TypeName::Int,
            TokenKind::TypeFloat => TypeName::Float,
            TokenKind::TypeString => TypeName::String,
            TokenKind::TypeBool => TypeName::Bool,
            TokenKind::TypeList => TypeName::List,
            TokenKind::TypeMap => TypeName::Map,
            TokenKind::TypeAny => TypeName::Any,
            TokenKind::Nil => TypeName::Any,
            TokenKind::Identifier => TypeName::Named(token.lexeme),
            _ => {
                return Err(Diagnostic::error(
                    ErrorCode::UnexpectedToken,
                    format!("expected a type name for {context}, found {}", token.kind),
                    &token.span,
                ))
            }
        };
        Ok(type_name)
    }

    fn parse_class_decl(&mut self, visibility: Visibility) -> ParseResult<Statement> {
        let keyword = self.advance();
        let name = self.expect(TokenKind::Identifier, "class name")?;

        let mut superclass = None;
        if self.matches(TokenKind::Extends) {
            superclass = Some(self.expect(TokenKind::Identifier, "superclass name")?.lexeme);
        }

        self.expect(TokenKind::LBrace, "class body")?;

        let mut fields: Vec<FieldDecl> = vec![];
        let mut constructor: Option<FunctionDecl> = None;
        let mut methods: Vec<FunctionDecl> = vec![];

        loop {
            self.skip_terminators();
            if self.check(TokenKind::RBrace) || self.at_end() {
                break;
            }

            match self.kind() {
                TokenKind::Func | TokenKind::Async | TokenKind::Void | TokenKind::Public
                | TokenKind::Private => {
                    let member = self.parse_class_method()?;
                    self.add_class_member(&name.lexeme, member, &mut constructor, &mut methods)?;
                }
                TokenKind::Var | TokenKind::Const => {
                    let Statement::VarBinding(binding) = self.parse_keyword_binding()? else {
                        unreachable!("keyword bindings always produce VarBinding");
                    };
                    fields.push(FieldDecl {
                        name: binding.name,
                        type_annotation: binding.type_annotation,
                        default: binding.value,
                        span: binding.span,
                    });
                }
                TokenKind::Identifier if self.peek_kind(1) == TokenKind::LParen => {
                    let member = self.parse_class_method()?;
                    self.add_class_member(&name.lexeme, member, &mut constructor, &mut methods)?;
                }
                TokenKind::Identifier => fields.push(self.parse_field_decl()?),
                _ => return Err(self.unexpected("class member", None)),
            }
        }

        self.expect(TokenKind::RBrace, "class body")?;
        Ok(Statement::ClassDecl(ClassDecl {
            name: name.lexeme,
            superclass,
            fields,
            constructor,
            methods,
            visibility,
            span: keyword.span,
        }))
    }

    fn parse_class_method(&mut self) -> ParseResult<FunctionDecl> {
        let mut visibility = Visibility::Package;
        let mut is_void = false;
        loop {
            match self.kind() {
                TokenKind::Public => {
                    visibility = Visibility::Public;
                    self.advance();
                }
                TokenKind::Private => {
                    visibility = Visibility::Private;
                    self.advance();
                }
                TokenKind::Void => {
                    is_void = true;
                    self.advance();
                }
                _ => break,
            }
        }

        let is_async = self.matches(TokenKind::Async);
        let span = self.span();
        self.matches(TokenKind::Func);
        let name = self.expect(TokenKind::Identifier, "method name")?;
        let params = self.parse_parameters()?;
        let mut return_type = None;
        if self.matches(TokenKind::Colon) {
            return_type = Some(self.parse_type_name("return type")?);
        }
        let body = self.parse_block()?;

        Ok(FunctionDecl {
            name: name.lexeme,
            params,
            return_type,
            body,
            is_async,
            is_void,
            visibility,
            span,
        })
    }

    fn add_class_member(
        &mut self,
        class_name: &str,
        member: FunctionDecl,
        constructor: &mut Option<FunctionDecl>,
        methods: &mut Vec<FunctionDecl>,
    ) -> ParseResult<()> {
        if member.name == "init" {
            if constructor.is_some() {
                return Err(Diagnostic::error(
                    ErrorCode::MalformedDeclaration,
                    format!("class '{class_name}' declares more than one constructor"),
                    &member.span,
                ));
            }
            *constructor = Some(member);
            return Ok(());
        }
        if methods.iter().any(|m| m.name == member.name) {
            return Err(Diagnostic::error(
                ErrorCode::MalformedDeclaration,
                format!(
                    "duplicate method '{}' in class '{class_name}'",
                    member.name
                ),
                &member.span,
            ));
        }
        methods.push(member);
        Ok(())
    }

    /// `name [type] = expr` inside a class body.
    fn parse_field_decl(&mut self) -> ParseResult<FieldDecl> {
        let name = self.advance();
        let mut annotation = None;
        if self.kind().is_type_keyword() || self.check(TokenKind::Identifier) {
            annotation = Some(self.parse_type_name("field type")?);
        } else if self.matches(TokenKind::Colon) {
            annotation = Some(self.parse_type_name("field type")?);
        }
        self.expect(TokenKind::Assign, "field default")?;
        let default = self.parse_expression(Precedence::Lowest)?;
        Ok(FieldDecl {
            name: name.lexeme,
            type_annotation: annotation,
            default,
            span: name.span,
        })
    }

    fn parse_return(&mut self) -> ParseResult<Statement> {
        let span = self.advance().span;
        let value = if matches!(
            self.kind(),
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
        ) {
            None
        } else {
            Some(self.parse_expression(Precedence::Lowest)?)
        };
        Ok(Statement::Return { value, span })
    }

    fn parse_if(&mut self) -> ParseResult<IfStatement> {
        let span = self.advance().span;
        self.parse_if_tail(span)
    }

    /// Shared by `if` and `elif`: the keyword has already been consumed.
    fn parse_if_tail(&mut self, span: Span) -> ParseResult<IfStatement> {
        let condition = self.parse_expression(Precedence::Lowest)?;
        let consequence = self.parse_block()?;

        let checkpoint = self.checkpoint();
        self.skip_newlines();

        let alternative = match self.kind() {
            TokenKind::Elif => {
                let elif_span = self.advance().span;
                Some(ElseBranch::If(Box::new(self.parse_if_tail(elif_span)?)))
            }
            TokenKind::Else => {
                self.advance();
                if self.check(TokenKind::If) {
                    Some(ElseBranch::If(Box::new(self.parse_if()?)))
                } else {
                    Some(ElseBranch::Block(self.parse_block()?))
                }
            }
            _ => {
                self.rewind(checkpoint);
                None
            }
        };

        Ok(IfStatement {
            condition,
            consequence,
            alternative,
            span,
        })
    }

    fn parse_while(&mut self) -> ParseResult<Statement> {
        let span = self.advance().span;
        let condition = self.parse_expression(Precedence::Lowest)?;
        let body = self.parse_block()?;
        Ok(Statement::While {
            condition,
            body,
            span,
        })
    }

    fn parse_for(&mut self) -> ParseResult<Statement> {
        let span = self.advance().span;

        if self.check(TokenKind::Identifier) && self.peek_kind(1) == TokenKind::In {
            let variable = self.advance().lexeme;
            self.advance();
            let iterable = self.parse_expression(Precedence::Lowest)?;
            let body = self.parse_block()?;
            return Ok(Statement::ForIn {
                variable,
                iterable,
                body,
                span,
            });
        }

        let init = Box::new(self.parse_simple_statement()?);
        self.expect(TokenKind::Semicolon, "for loop")?;
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.expect(TokenKind::Semicolon, "for loop")?;
        let post = Box::new(self.parse_simple_statement()?);
        let body = self.parse_block()?;

        Ok(Statement::For(ForStatement {
            init,
            condition,
            post,
            body,
            span,
        }))
    }

    /// The restricted statement forms allowed in a C-style `for` header.
    fn parse_simple_statement(&mut self) -> ParseResult<Statement> {
        match self.kind() {
            TokenKind::Var | TokenKind::Const => self.parse_keyword_binding(),
            TokenKind::Identifier if self.peek_kind(1) == TokenKind::Walrus => {
                self.parse_walrus_binding(None)
            }
            _ => {
                let expression = self.parse_expression(Precedence::Lowest)?;
                Ok(Statement::Expression(expression))
            }
        }
    }

    fn parse_try(&mut self) -> ParseResult<Statement> {
        let span = self.advance().span;
        let body = self.parse_block()?;

        let mut checkpoint = self.checkpoint();
        self.skip_newlines();

        let mut catch = None;
        if self.check(TokenKind::Catch) {
            let catch_span = self.advance().span;
            let parameter = if self.check(TokenKind::Identifier) {
                Some(self.advance().lexeme)
            } else if self.matches(TokenKind::LParen) {
                let name = self.expect(TokenKind::Identifier, "catch parameter")?;
                self.expect(TokenKind::RParen, "catch parameter")?;
                Some(name.lexeme)
            } else {
                None
            };
            let body = self.parse_block()?;
            catch = Some(CatchClause {
                parameter,
                body,
                span: catch_span,
            });
            checkpoint = self.checkpoint();
            self.skip_newlines();
        }

        let mut finally = None;
        if self.matches(TokenKind::Finally) {
            finally = Some(self.parse_block()?);
        } else {
            self.rewind(checkpoint);
        }

        if catch.is_none() && finally.is_none() {
            return Err(Diagnostic::error(
                ErrorCode::MalformedDeclaration,
                "try block requires a catch or finally clause",
                &span,
            ));
        }

        Ok(Statement::Try(TryStatement {
            body,
            catch,
            finally,
            span,
        }))
    }

    fn parse_import(&mut self) -> ParseResult<Statement> {
        let span = self.advance().span;
        let token = self.advance();
        let target = match (token.kind, &token.literal) {
            (TokenKind::Identifier, _) => ImportTarget::Module(token.lexeme),
            (TokenKind::TypeString | TokenKind::TypeMap | TokenKind::TypeList, _) => {
                // `import string` names the stdlib module, not the type.
                ImportTarget::Module(token.lexeme)
            }
            (TokenKind::StringLit, Some(Literal::Str(path))) => ImportTarget::Path(path.clone()),
            _ => {
                return Err(Diagnostic::error(
                    ErrorCode::UnexpectedToken,
                    format!("expected a module name or path after import, found {}", token.kind),
                    &token.span,
                ))
            }
        };
        Ok(Statement::Import { target, span })
    }

    fn parse_switch(&mut self) -> ParseResult<Statement> {
        let span = self.advance().span;
        let discriminant = self.parse_expression(Precedence::Lowest)?;
        self.expect(TokenKind::LBrace, "switch body")?;

        let mut cases = vec![];
        let mut default = None;

        loop {
            self.skip_terminators();
            match self.kind() {
                TokenKind::Case => {
                    let case_span = self.advance().span;
                    let value = self.parse_expression(Precedence::Lowest)?;
                    self.expect(TokenKind::Colon, "switch case")?;
                    let body = self.parse_case_body()?;
                    cases.push(SwitchCase {
                        value,
                        body,
                        span: case_span,
                    });
                }
                TokenKind::Default => {
                    let default_span = self.advance().span;
                    self.expect(TokenKind::Colon, "switch default")?;
                    if default.is_some() {
                        return Err(Diagnostic::error(
                            ErrorCode::MalformedDeclaration,
                            "switch has more than one default clause",
                            &default_span,
                        ));
                    }
                    default = Some(self.parse_case_body()?);
                }
                TokenKind::RBrace => break,
                _ => return Err(self.unexpected("switch body", Some(TokenKind::Case))),
            }
        }

        self.expect(TokenKind::RBrace, "switch body")?;
        Ok(Statement::Switch(SwitchStatement {
            discriminant,
            cases,
            default,
            span,
        }))
    }

    fn parse_case_body(&mut self) -> ParseResult<Vec<Statement>> {
        let mut statements = vec![];
        loop {
            self.skip_terminators();
            if matches!(
                self.kind(),
                TokenKind::Case | TokenKind::Default | TokenKind::RBrace | TokenKind::Eof
            ) {
                return Ok(statements);
            }
            statements.push(self.parse_statement()?);
        }
    }

    fn parse_match(&mut self) -> ParseResult<Statement> {
        let span = self.advance().span;
        let discriminant = self.parse_expression(Precedence::Lowest)?;
        self.expect(TokenKind::LBrace, "match body")?;

        let mut arms = vec![];
        loop {
            self.skip_terminators();
            if self.check(TokenKind::RBrace) || self.at_end() {
                break;
            }
            let arm_span = self.expect(TokenKind::Case, "match arm")?.span;
            let pattern = self.parse_pattern()?;
            let body = self.parse_block()?;
            arms.push(MatchArm {
                pattern,
                body,
                span: arm_span,
            });
        }

        self.expect(TokenKind::RBrace, "match body")?;
        Ok(Statement::Match(MatchStatement {
            discriminant,
            arms,
            span,
        }))
    }

    fn parse_pattern(&mut self) -> ParseResult<Pattern> {
        match self.kind() {
            TokenKind::Number
            | TokenKind::StringLit
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Nil
            | TokenKind::Minus => {
                let literal = self.parse_expression(Precedence::Prefix)?;
                Ok(Pattern::Literal(literal))
            }
            kind if kind.is_type_keyword() => {
                let span = self.span();
                let type_name = self.parse_type_name("pattern")?;
                let binder = if self.check(TokenKind::Identifier) {
                    Some(self.advance().lexeme)
                } else {
                    None
                };
                Ok(Pattern::Type {
                    type_name,
                    binder,
                    span,
                })
            }
            TokenKind::Identifier => {
                let token = self.advance();
                Ok(Pattern::Binder {
                    name: token.lexeme,
                    span: token.span,
                })
            }
            _ => Err(self.unexpected("match pattern", None)),
        }
    }

    /// A `{` in statement position opens a map, a set or a block. The
    /// decision needs one expression of lookahead and a single rewind.
    fn parse_brace_statement(&mut self) -> ParseResult<Statement> {
        let checkpoint = self.checkpoint();
        self.advance();
        self.skip_newlines();

        if self.check(TokenKind::RBrace) {
            self.rewind(checkpoint);
            let expression = self.parse_expression(Precedence::Lowest)?;
            return Ok(Statement::Expression(expression));
        }

        let decision = self.parse_expression(Precedence::Lowest);
        let next = self.kind();
        self.rewind(checkpoint);

        match (decision, next) {
            (Ok(_), TokenKind::Colon | TokenKind::Comma | TokenKind::RBrace) => {
                let expression = self.parse_expression(Precedence::Lowest)?;
                Ok(Statement::Expression(expression))
            }
            _ => Ok(Statement::Block(self.parse_block()?)),
        }
    }

    pub(crate) fn parse_block(&mut self) -> ParseResult<Block> {
        self.skip_newlines();
        let open = self.expect(TokenKind::LBrace, "block")?;
        let mut statements = vec![];

        loop {
            self.skip_terminators();
            if self.check(TokenKind::RBrace) || self.at_end() {
                break;
            }
            match self.parse_statement() {
                Ok(statement) => statements.push(statement),
                Err(diagnostic) => {
                    self.errors.push(diagnostic);
                    self.synchronize();
                }
            }
        }

        let close = self.expect(TokenKind::RBrace, "block")?;
        Ok(Block {
            statements,
            span: open.span.merge(&close.span),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::ast::*;
    use super::*;
    use crate::lexer::Lexer;

    fn parse_ok(source: &str) -> Program {
        let (program, errors) = Parser::new(Lexer::new(source).lex()).parse();
        assert!(errors.is_empty(), "unexpected parse errors: {errors:#?}");
        program
    }

    fn parse_with_errors(source: &str) -> (Program, Vec<Diagnostic>) {
        Parser::new(Lexer::new(source).lex()).parse()
    }

    #[test]
    fn test_walrus_binding() {
        let program = parse_ok("x := 42");
        let Statement::VarBinding(binding) = &program.statements[0] else {
            panic!("expected a binding");
        };
        assert_eq!(binding.name, "x");
        assert!(!binding.constant);
        assert_eq!(
            binding.value,
            Expression::NumberLit {
                value: Number::Integer(42),
                span: Span::default()
            }
        );
    }

    #[test]
    fn test_uppercase_walrus_is_constant() {
        let program = parse_ok("MAX := 10");
        let Statement::VarBinding(binding) = &program.statements[0] else {
            panic!("expected a binding");
        };
        assert!(binding.constant);
    }

    #[test]
    fn test_typed_walrus_binding() {
        let program = parse_ok("x int := 5");
        let Statement::VarBinding(binding) = &program.statements[0] else {
            panic!("expected a binding");
        };
        assert_eq!(binding.type_annotation, Some(TypeName::Int));
    }

    #[test]
    fn test_var_binding_with_annotation() {
        let program = parse_ok("var name: string = \"zylo\"");
        let Statement::VarBinding(binding) = &program.statements[0] else {
            panic!("expected a binding");
        };
        assert_eq!(binding.type_annotation, Some(TypeName::String));
    }

    #[test]
    fn test_binding_without_initialiser_is_rejected() {
        let (_, errors) = parse_with_errors("var x");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::MissingInitializer);
    }

    #[test]
    fn test_product_binds_tighter_than_sum() {
        let program = parse_ok("x := 1 + 2 * 3");
        let Statement::VarBinding(binding) = &program.statements[0] else {
            panic!("expected a binding");
        };
        let Expression::Infix {
            operator, right, ..
        } = &binding.value
        else {
            panic!("expected an infix expression");
        };
        assert_eq!(*operator, InfixOperator::Add);
        assert!(matches!(
            right.as_ref(),
            Expression::Infix {
                operator: InfixOperator::Multiply,
                ..
            }
        ));
    }

    #[test]
    fn test_power_is_right_associative() {
        let program = parse_ok("x := 2 ** 3 ** 2");
        let Statement::VarBinding(binding) = &program.statements[0] else {
            panic!("expected a binding");
        };
        let Expression::Infix { left, right, .. } = &binding.value else {
            panic!("expected an infix expression");
        };
        assert!(matches!(left.as_ref(), Expression::NumberLit { .. }));
        assert!(matches!(
            right.as_ref(),
            Expression::Infix {
                operator: InfixOperator::Power,
                ..
            }
        ));
    }

    #[test]
    fn test_dotted_call_is_a_method_call() {
        let program = parse_ok("xs.push(1)");
        assert!(matches!(
            &program.statements[0],
            Statement::Expression(Expression::MethodCall { method, .. }) if method == "push"
        ));
    }

    #[test]
    fn test_show_log_stays_a_plain_call() {
        let program = parse_ok("show.log(1)");
        let Statement::Expression(Expression::Call { callee, .. }) = &program.statements[0] else {
            panic!("expected a call");
        };
        assert!(matches!(
            callee.as_ref(),
            Expression::Member { property, .. } if property == "log"
        ));
    }

    #[test]
    fn test_brace_disambiguation() {
        let program = parse_ok("{\"a\": 1}");
        assert!(matches!(
            &program.statements[0],
            Statement::Expression(Expression::MapLit { .. })
        ));

        let program = parse_ok("{1, 2, 3}");
        assert!(matches!(
            &program.statements[0],
            Statement::Expression(Expression::SetLit { .. })
        ));

        let program = parse_ok("{ y := 1\nshow.log(y) }");
        assert!(matches!(&program.statements[0], Statement::Block(_)));
    }

    #[test]
    fn test_empty_braces_are_an_empty_map() {
        let program = parse_ok("{}");
        assert!(matches!(
            &program.statements[0],
            Statement::Expression(Expression::MapLit { entries, .. }) if entries.is_empty()
        ));
    }

    #[test]
    fn test_index_and_slice() {
        let program = parse_ok("x := xs[-1]\ny := xs[1:4]\nz := xs[:2]");
        assert!(matches!(
            &program.statements[0],
            Statement::VarBinding(VarBinding {
                value: Expression::Index { .. },
                ..
            })
        ));
        assert!(matches!(
            &program.statements[1],
            Statement::VarBinding(VarBinding {
                value: Expression::Slice {
                    start: Some(_),
                    end: Some(_),
                    ..
                },
                ..
            })
        ));
        assert!(matches!(
            &program.statements[2],
            Statement::VarBinding(VarBinding {
                value: Expression::Slice {
                    start: None,
                    end: Some(_),
                    ..
                },
                ..
            })
        ));
    }

    #[test]
    fn test_postfix_conditional_expression() {
        let program = parse_ok("x := \"a\" if 1 < 2 else \"b\"");
        let Statement::VarBinding(binding) = &program.statements[0] else {
            panic!("expected a binding");
        };
        assert!(matches!(&binding.value, Expression::IfExpr { .. }));
    }

    #[test]
    fn test_arrow_functions() {
        let program = parse_ok("f := (a, b) => a + b\ng := x => x");
        let Statement::VarBinding(binding) = &program.statements[0] else {
            panic!("expected a binding");
        };
        let Expression::ArrowFunction { params, .. } = &binding.value else {
            panic!("expected an arrow function");
        };
        assert_eq!(params.len(), 2);

        let Statement::VarBinding(binding) = &program.statements[1] else {
            panic!("expected a binding");
        };
        assert!(matches!(
            &binding.value,
            Expression::ArrowFunction { params, .. } if params.len() == 1
        ));
    }

    #[test]
    fn test_function_declaration_with_elided_keyword() {
        let program = parse_ok("add(a int, b int): int { return a + b }");
        let Statement::FunctionDecl(decl) = &program.statements[0] else {
            panic!("expected a function declaration");
        };
        assert_eq!(decl.name, "add");
        assert_eq!(decl.params.len(), 2);
        assert_eq!(decl.return_type, Some(TypeName::Int));
    }

    #[test]
    fn test_class_declaration() {
        let program = parse_ok(
            "class Point extends Base {\n    x int = 0\n    init(x) { this.x = x }\n    norm() { return this.x }\n}",
        );
        let Statement::ClassDecl(decl) = &program.statements[0] else {
            panic!("expected a class declaration");
        };
        assert_eq!(decl.superclass.as_deref(), Some("Base"));
        assert_eq!(decl.fields.len(), 1);
        assert!(decl.constructor.is_some());
        assert_eq!(decl.methods.len(), 1);
    }

    #[test]
    fn test_duplicate_method_is_rejected() {
        let (_, errors) = parse_with_errors("class C {\n    m() { }\n    m() { }\n}");
        assert!(errors
            .iter()
            .any(|e| e.code == ErrorCode::MalformedDeclaration));
    }

    #[test]
    fn test_match_patterns() {
        let program = parse_ok(
            "match v {\n    case 1 { }\n    case int n { }\n    case other { }\n}",
        );
        let Statement::Match(match_statement) = &program.statements[0] else {
            panic!("expected a match statement");
        };
        assert!(matches!(&match_statement.arms[0].pattern, Pattern::Literal(_)));
        assert!(matches!(
            &match_statement.arms[1].pattern,
            Pattern::Type {
                type_name: TypeName::Int,
                binder: Some(_),
                ..
            }
        ));
        assert!(matches!(&match_statement.arms[2].pattern, Pattern::Binder { .. }));
    }

    #[test]
    fn test_recovery_continues_past_errors() {
        let (program, errors) = parse_with_errors("x := := 1\ny := 2\nz := )\nw := 3");
        assert!(errors.len() >= 2);
        let names: Vec<_> = program
            .statements
            .iter()
            .filter_map(|s| match s {
                Statement::VarBinding(b) => Some(b.name.as_str()),
                _ => None,
            })
            .collect();
        assert!(names.contains(&"y"));
        assert!(names.contains(&"w"));
    }

    #[test]
    fn test_newline_after_infix_operator_continues_the_expression() {
        let program = parse_ok("x := 1 +\n    2");
        let Statement::VarBinding(binding) = &program.statements[0] else {
            panic!("expected a binding");
        };
        assert!(matches!(
            &binding.value,
            Expression::Infix {
                operator: InfixOperator::Add,
                ..
            }
        ));
    }

    #[test]
    fn test_structural_equality_ignores_formatting() {
        let compact = parse_ok("func f(a, b) { return a + b }");
        let spread = parse_ok("func f(\n    a,\n    b\n) {\n    return a + b\n}");
        assert_eq!(compact, spread);
    }

    #[test]
    fn test_template_string_interpolation_is_structured() {
        let program = parse_ok("x := `hi ${name}!`");
        let Statement::VarBinding(binding) = &program.statements[0] else {
            panic!("expected a binding");
        };
        let Expression::TemplateString { parts, .. } = &binding.value else {
            panic!("expected a template string");
        };
        assert_eq!(parts.len(), 3);
        assert!(matches!(&parts[0], TemplatePart::Text(t) if t == "hi "));
        assert!(matches!(&parts[1], TemplatePart::Expr(Expression::Identifier(_))));
        assert!(matches!(&parts[2], TemplatePart::Text(t) if t == "!"));
    }

    #[test]
    fn test_type_keyword_receivers_parse_as_identifiers() {
        let program = parse_ok("import string\nstring.to_upper(\"abc\")\nint(\"5\")");
        assert!(matches!(
            &program.statements[1],
            Statement::Expression(Expression::MethodCall { method, .. }) if method == "to_upper"
        ));
        assert!(matches!(
            &program.statements[2],
            Statement::Expression(Expression::Call { .. })
        ));
    }

    #[test]
    fn test_for_loops() {
        let program = parse_ok("for i := 0; i < 3; i += 1 { }\nfor x in xs { }");
        assert!(matches!(&program.statements[0], Statement::For(_)));
        assert!(matches!(&program.statements[1], Statement::ForIn { .. }));
    }

    #[test]
    fn test_try_catch_finally() {
        let program = parse_ok("try { } catch e { } finally { }");
        let Statement::Try(try_statement) = &program.statements[0] else {
            panic!("expected a try statement");
        };
        assert_eq!(
            try_statement.catch.as_ref().and_then(|c| c.parameter.as_deref()),
            Some("e")
        );
        assert!(try_statement.finally.is_some());
    }

    #[test]
    fn test_elif_chain() {
        let program = parse_ok("if a { } elif b { } else { }");
        let Statement::If(if_statement) = &program.statements[0] else {
            panic!("expected an if statement");
        };
        let Some(ElseBranch::If(nested)) = &if_statement.alternative else {
            panic!("expected an elif branch");
        };
        assert!(matches!(nested.alternative, Some(ElseBranch::Block(_))));
    }
}

pub(crate) fn is_constant_name(name: &str) -> bool {
    let mut has_letter = false;
    for c in name.chars() {
        if c.is_lowercase() {
            return false;
        }
        if c.is_alphabetic() {
            has_letter = true;
        }
    }
    has_letter
}
