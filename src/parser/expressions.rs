//! Expression parsing via Pratt-style precedence climbing.
//!
//! Every token kind has at most one prefix handler and at most one infix
//! handler; the climbing loop keeps folding infix handlers into the left
//! operand while the next operator binds tighter than the caller's floor.

use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::lexer::{Lexer, Literal, Span, TokenKind};

use super::ast::{
    ArrowBody, AssignOperator, Expression, Ident, InfixOperator, Number, Parameter,
    PrefixOperator, TemplatePart,
};
use super::{ParseResult, Parser};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    Lowest,
    Assign,
    Conditional,
    AndOr,
    Equals,
    LessGreater,
    Sum,
    Product,
    Power,
    Prefix,
    Call,
    Index,
}

fn precedence_of(kind: TokenKind) -> Precedence {
    match kind {
        TokenKind::Assign
        | TokenKind::PlusAssign
        | TokenKind::MinusAssign
        | TokenKind::StarAssign
        | TokenKind::SlashAssign
        | TokenKind::PercentAssign
        | TokenKind::FatArrow => Precedence::Assign,
        TokenKind::If => Precedence::Conditional,
        TokenKind::And | TokenKind::Or => Precedence::AndOr,
        TokenKind::EqualEqual | TokenKind::BangEqual | TokenKind::In => Precedence::Equals,
        TokenKind::Less | TokenKind::LessEqual | TokenKind::Greater | TokenKind::GreaterEqual => {
            Precedence::LessGreater
        }
        TokenKind::Plus | TokenKind::Minus | TokenKind::DotDot => Precedence::Sum,
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent | TokenKind::FloorDiv => {
            Precedence::Product
        }
        TokenKind::Power => Precedence::Power,
        TokenKind::Dot | TokenKind::LParen | TokenKind::As => Precedence::Call,
        TokenKind::LBracket => Precedence::Index,
        _ => Precedence::Lowest,
    }
}

fn infix_operator(kind: TokenKind) -> Option<InfixOperator> {
    let operator = match kind {
        TokenKind::Plus => InfixOperator::Add,
        TokenKind::Minus => InfixOperator::Subtract,
        TokenKind::Star => InfixOperator::Multiply,
        TokenKind::Slash => InfixOperator::Divide,
        TokenKind::Percent => InfixOperator::Modulo,
        TokenKind::Power => InfixOperator::Power,
        TokenKind::FloorDiv => InfixOperator::FloorDivide,
        TokenKind::EqualEqual => InfixOperator::Equal,
        TokenKind::BangEqual => InfixOperator::NotEqual,
        TokenKind::Less => InfixOperator::LessThan,
        TokenKind::LessEqual => InfixOperator::LessOrEqual,
        TokenKind::Greater => InfixOperator::GreaterThan,
        TokenKind::GreaterEqual => InfixOperator::GreaterOrEqual,
        TokenKind::And => InfixOperator::And,
        TokenKind::Or => InfixOperator::Or,
        TokenKind::In => InfixOperator::In,
        _ => return None,
    };
    Some(operator)
}

fn assign_operator(kind: TokenKind) -> Option<AssignOperator> {
    let operator = match kind {
        TokenKind::Assign => AssignOperator::Assign,
        TokenKind::PlusAssign => AssignOperator::AddAssign,
        TokenKind::MinusAssign => AssignOperator::SubtractAssign,
        TokenKind::StarAssign => AssignOperator::MultiplyAssign,
        TokenKind::SlashAssign => AssignOperator::DivideAssign,
        TokenKind::PercentAssign => AssignOperator::ModuloAssign,
        _ => return None,
    };
    Some(operator)
}

impl Parser {
    pub(crate) fn parse_expression(&mut self, min: Precedence) -> ParseResult<Expression> {
        if self.group_depth > 0 {
            self.skip_newlines();
        }
        let mut left = self.parse_prefix()?;

        loop {
            if self.group_depth > 0 {
                self.skip_newlines();
            }
            if precedence_of(self.kind()) <= min {
                break;
            }
            left = self.parse_infix(left)?;
        }

        Ok(left)
    }

    // ------------------------------------------------------------------
    // prefix handlers

    fn parse_prefix(&mut self) -> ParseResult<Expression> {
        match self.kind() {
            TokenKind::Number => {
                let token = self.advance();
                let value = match token.literal {
                    Some(Literal::Integer(value)) => Number::Integer(value),
                    Some(Literal::Float(value)) => Number::Float(value),
                    _ => {
                        return Err(Diagnostic::error(
                            ErrorCode::InvalidNumber,
                            format!("malformed number literal '{}'", token.lexeme),
                            &token.span,
                        ))
                    }
                };
                Ok(Expression::NumberLit {
                    value,
                    span: token.span,
                })
            }
            TokenKind::StringLit => {
                let token = self.advance();
                let value = match token.literal {
                    Some(Literal::Str(value)) => value,
                    _ => String::new(),
                };
                Ok(Expression::StringLit {
                    value,
                    span: token.span,
                })
            }
            TokenKind::TemplateString => self.parse_template_string(),
            TokenKind::True => {
                let span = self.advance().span;
                Ok(Expression::BooleanLit { value: true, span })
            }
            TokenKind::False => {
                let span = self.advance().span;
                Ok(Expression::BooleanLit { value: false, span })
            }
            TokenKind::Nil => {
                let span = self.advance().span;
                Ok(Expression::NullLit { span })
            }
            TokenKind::This => {
                let span = self.advance().span;
                Ok(Expression::This { span })
            }
            TokenKind::Super => {
                let span = self.advance().span;
                Ok(Expression::SuperRef { span })
            }
            TokenKind::Identifier => {
                let token = self.advance();
                Ok(Expression::Identifier(Ident {
                    name: token.lexeme,
                    span: token.span,
                }))
            }
            // Conversion builtins and stdlib modules share their names with
            // type keywords: `string(x)`, `int(x)`, `string.to_upper(s)`.
            kind if kind.is_type_keyword()
                && matches!(self.peek_kind(1), TokenKind::LParen | TokenKind::Dot) =>
            {
                let token = self.advance();
                Ok(Expression::Identifier(Ident {
                    name: token.lexeme,
                    span: token.span,
                }))
            }
            TokenKind::Minus => {
                let span = self.advance().span;
                let operand = self.parse_expression(Precedence::Prefix)?;
                Ok(Expression::Prefix {
                    operator: PrefixOperator::Negate,
                    operand: Box::new(operand),
                    span,
                })
            }
            TokenKind::Bang | TokenKind::Not => {
                let span = self.advance().span;
                let operand = self.parse_expression(Precedence::Prefix)?;
                Ok(Expression::Prefix {
                    operator: PrefixOperator::Not,
                    operand: Box::new(operand),
                    span,
                })
            }
            TokenKind::Await => {
                let span = self.advance().span;
                let inner = self.parse_expression(Precedence::Prefix)?;
                Ok(Expression::Await {
                    inner: Box::new(inner),
                    span,
                })
            }
            TokenKind::LParen => self.parse_paren_or_arrow(),
            TokenKind::LBracket => self.parse_list_literal(),
            TokenKind::LBrace => self.parse_brace_expression(),
            TokenKind::Func | TokenKind::Async => self.parse_function_literal(),
            TokenKind::Error => {
                let token = self.advance();
                Err(self.error_token_diagnostic(&token))
            }
            _ => Err(self.unexpected("an expression", None)),
        }
    }

    // ------------------------------------------------------------------
    // infix handlers

    fn parse_infix(&mut self, left: Expression) -> ParseResult<Expression> {
        let kind = self.kind();

        if let Some(operator) = infix_operator(kind) {
            let token = self.advance();
            // A newline after an infix operator continues the expression.
            self.skip_newlines();
            // `**` is right-associative, everything else here binds left.
            let floor = match kind {
                TokenKind::Power => Precedence::Product,
                _ => precedence_of(kind),
            };
            let right = self.parse_expression(floor)?;
            return Ok(Expression::Infix {
                left: Box::new(left),
                operator,
                right: Box::new(right),
                span: token.span,
            });
        }

        if let Some(operator) = assign_operator(kind) {
            let token = self.advance();
            if !matches!(
                left,
                Expression::Identifier(_) | Expression::Member { .. } | Expression::Index { .. }
            ) {
                return Err(Diagnostic::error(
                    ErrorCode::UnexpectedToken,
                    "invalid assignment target",
                    &token.span,
                ));
            }
            self.skip_newlines();
            let value = self.parse_expression(Precedence::Lowest)?;
            return Ok(Expression::Assign {
                target: Box::new(left),
                operator,
                value: Box::new(value),
                span: token.span,
            });
        }

        match kind {
            TokenKind::DotDot => {
                let token = self.advance();
                let end = self.parse_expression(Precedence::Sum)?;
                Ok(Expression::Range {
                    start: Box::new(left),
                    end: Box::new(end),
                    span: token.span,
                })
            }
            TokenKind::If => {
                let span = self.advance().span;
                let condition = self.parse_expression(Precedence::Conditional)?;
                self.expect(TokenKind::Else, "conditional expression")?;
                let else_value = self.parse_expression(Precedence::Assign)?;
                Ok(Expression::IfExpr {
                    then_value: Box::new(left),
                    condition: Box::new(condition),
                    else_value: Box::new(else_value),
                    span,
                })
            }
            TokenKind::Dot => {
                let span = self.advance().span;
                let property = self.parse_property_name()?;
                Ok(Expression::Member {
                    object: Box::new(left),
                    property,
                    span,
                })
            }
            TokenKind::LParen => self.parse_call(left),
            TokenKind::LBracket => self.parse_index_or_slice(left),
            TokenKind::As => {
                let span = self.advance().span;
                let target = self.parse_type_name("cast")?;
                Ok(Expression::Cast {
                    value: Box::new(left),
                    target,
                    span,
                })
            }
            TokenKind::FatArrow => {
                let token = self.advance();
                let Expression::Identifier(Ident { name, span }) = left else {
                    return Err(Diagnostic::error(
                        ErrorCode::UnexpectedToken,
                        "arrow function parameter must be an identifier",
                        &token.span,
                    ));
                };
                let params = vec![Parameter {
                    name,
                    type_annotation: None,
                    span,
                }];
                let body = self.parse_arrow_body()?;
                Ok(Expression::ArrowFunction {
                    params,
                    return_type: None,
                    body,
                    span: token.span,
                })
            }
            _ => Err(self.unexpected("an operator", None)),
        }
    }

    /// Member names after `.` may collide with keywords (`read.int`,
    /// `string.split`), so type keywords are accepted as property names.
    fn parse_property_name(&mut self) -> ParseResult<String> {
        let token = self.advance();
        if token.kind == TokenKind::Identifier || token.kind.is_type_keyword() {
            Ok(token.lexeme)
        } else {
            Err(Diagnostic::error(
                ErrorCode::UnexpectedToken,
                format!("expected a member name after '.', found {}", token.kind),
                &token.span,
            ))
        }
    }

    fn parse_call(&mut self, left: Expression) -> ParseResult<Expression> {
        let span = self.advance().span;
        self.group_depth += 1;
        let args = self.parse_expression_list(TokenKind::RParen, "argument list");
        self.group_depth -= 1;
        let args = args?;

        // `x.y(…)` is a collection method call, except when the receiver is
        // the `show` pseudo-module: `show.log(…)` stays a plain call so the
        // emitter can map it onto the host print function.
        if let Expression::Member {
            object,
            property,
            span: member_span,
        } = left
        {
            let is_show = matches!(
                object.as_ref(),
                Expression::Identifier(Ident { name, .. }) if name == "show"
            );
            if is_show {
                return Ok(Expression::Call {
                    callee: Box::new(Expression::Member {
                        object,
                        property,
                        span: member_span,
                    }),
                    args,
                    span,
                });
            }
            return Ok(Expression::MethodCall {
                object,
                method: property,
                args,
                span,
            });
        }

        Ok(Expression::Call {
            callee: Box::new(left),
            args,
            span,
        })
    }

    fn parse_index_or_slice(&mut self, left: Expression) -> ParseResult<Expression> {
        let span = self.advance().span;
        self.group_depth += 1;
        let result = self.parse_index_or_slice_inner(left, span);
        self.group_depth -= 1;
        result
    }

    fn parse_index_or_slice_inner(
        &mut self,
        left: Expression,
        span: Span,
    ) -> ParseResult<Expression> {
        if self.matches(TokenKind::Colon) {
            let end = if self.check(TokenKind::RBracket) {
                None
            } else {
                Some(Box::new(self.parse_expression(Precedence::Lowest)?))
            };
            self.expect(TokenKind::RBracket, "slice")?;
            return Ok(Expression::Slice {
                object: Box::new(left),
                start: None,
                end,
                span,
            });
        }

        let first = self.parse_expression(Precedence::Lowest)?;
        if self.matches(TokenKind::Colon) {
            let end = if self.check(TokenKind::RBracket) {
                None
            } else {
                Some(Box::new(self.parse_expression(Precedence::Lowest)?))
            };
            self.expect(TokenKind::RBracket, "slice")?;
            return Ok(Expression::Slice {
                object: Box::new(left),
                start: Some(Box::new(first)),
                end,
                span,
            });
        }

        self.expect(TokenKind::RBracket, "index expression")?;
        Ok(Expression::Index {
            object: Box::new(left),
            index: Box::new(first),
            span,
        })
    }

    // ------------------------------------------------------------------
    // bracketed literals and groups

    fn parse_expression_list(
        &mut self,
        closing: TokenKind,
        context: &str,
    ) -> ParseResult<Vec<Expression>> {
        let mut items = vec![];
        self.skip_newlines();
        while !self.check(closing) {
            items.push(self.parse_expression(Precedence::Lowest)?);
            self.skip_newlines();
            if !self.matches(TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }
        self.expect(closing, context)?;
        Ok(items)
    }

    fn parse_list_literal(&mut self) -> ParseResult<Expression> {
        let span = self.advance().span;
        self.group_depth += 1;
        let elements = self.parse_expression_list(TokenKind::RBracket, "list literal");
        self.group_depth -= 1;
        Ok(Expression::ListLit {
            elements: elements?,
            span,
        })
    }

    fn parse_paren_or_arrow(&mut self) -> ParseResult<Expression> {
        let checkpoint = self.checkpoint();
        if let Some(arrow) = self.try_parse_arrow_function()? {
            return Ok(arrow);
        }
        self.rewind(checkpoint);

        self.advance();
        self.group_depth += 1;
        let inner = self.parse_expression(Precedence::Lowest);
        let result = inner.and_then(|expression| {
            self.expect(TokenKind::RParen, "grouped expression")?;
            Ok(expression)
        });
        self.group_depth -= 1;
        result
    }

    /// `( params ) [-> type] => ( expr | block )`. Returns `None` when the
    /// parenthesis turns out to open a grouped expression instead; the
    /// caller rewinds.
    fn try_parse_arrow_function(&mut self) -> ParseResult<Option<Expression>> {
        let span = self.span();
        let Ok(params) = self.parse_parameters() else {
            return Ok(None);
        };

        let mut return_type = None;
        if self.matches(TokenKind::ThinArrow) {
            match self.parse_type_name("arrow return type") {
                Ok(annotation) => return_type = Some(annotation),
                Err(_) => return Ok(None),
            }
        }

        if !self.matches(TokenKind::FatArrow) {
            return Ok(None);
        }

        let body = self.parse_arrow_body()?;
        Ok(Some(Expression::ArrowFunction {
            params,
            return_type,
            body,
            span,
        }))
    }

    fn parse_arrow_body(&mut self) -> ParseResult<ArrowBody> {
        if self.check(TokenKind::LBrace) {
            Ok(ArrowBody::Block(self.parse_block()?))
        } else {
            Ok(ArrowBody::Expr(Box::new(
                self.parse_expression(Precedence::Lowest)?,
            )))
        }
    }

    fn parse_function_literal(&mut self) -> ParseResult<Expression> {
        let is_async = self.matches(TokenKind::Async);
        let span = self.span();
        self.expect(TokenKind::Func, "function literal")?;
        let params = self.parse_parameters()?;
        let mut return_type = None;
        if self.matches(TokenKind::Colon) {
            return_type = Some(self.parse_type_name("return type")?);
        }
        let body = self.parse_block()?;
        Ok(Expression::FunctionLit {
            params,
            return_type,
            body,
            is_async,
            span,
        })
    }

    /// A `{` in expression position opens a map, a set or a block
    /// expression; one expression of lookahead decides, with a single
    /// rewind.
    pub(crate) fn parse_brace_expression(&mut self) -> ParseResult<Expression> {
        let checkpoint = self.checkpoint();
        let open = self.advance();
        self.group_depth += 1;
        self.skip_newlines();

        if self.check(TokenKind::RBrace) {
            self.advance();
            self.group_depth -= 1;
            return Ok(Expression::MapLit {
                entries: vec![],
                span: open.span,
            });
        }

        let first = self.parse_expression(Precedence::Lowest);
        let next = self.kind();
        self.group_depth -= 1;
        self.rewind(checkpoint);

        match (first, next) {
            (Ok(_), TokenKind::Colon) => self.parse_map_literal(),
            (Ok(_), TokenKind::Comma | TokenKind::RBrace) => self.parse_set_literal(),
            _ => Ok(Expression::BlockExpr(self.parse_block()?)),
        }
    }

    fn parse_map_literal(&mut self) -> ParseResult<Expression> {
        let span = self.advance().span;
        self.group_depth += 1;
        let result = self.parse_map_entries(span);
        self.group_depth -= 1;
        result
    }

    fn parse_map_entries(&mut self, span: Span) -> ParseResult<Expression> {
        let mut entries = vec![];
        self.skip_newlines();
        while !self.check(TokenKind::RBrace) {
            let key = self.parse_expression(Precedence::Lowest)?;
            self.expect(TokenKind::Colon, "map literal")?;
            let value = self.parse_expression(Precedence::Lowest)?;
            entries.push((key, value));
            self.skip_newlines();
            if !self.matches(TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }
        self.expect(TokenKind::RBrace, "map literal")?;
        Ok(Expression::MapLit { entries, span })
    }

    fn parse_set_literal(&mut self) -> ParseResult<Expression> {
        let span = self.advance().span;
        self.group_depth += 1;
        let elements = self.parse_expression_list(TokenKind::RBrace, "set literal");
        self.group_depth -= 1;
        Ok(Expression::SetLit {
            elements: elements?,
            span,
        })
    }

    // ------------------------------------------------------------------
    // template strings

    fn parse_template_string(&mut self) -> ParseResult<Expression> {
        let token = self.advance();
        let text = match &token.literal {
            Some(Literal::Str(text)) => text.clone(),
            _ => String::new(),
        };
        let parts = template_parts(&text, &token.span)?;
        Ok(Expression::TemplateString {
            parts,
            span: token.span,
        })
    }
}

/// Split template text into literal segments and parsed `${ … }` holes.
fn template_parts(text: &str, span: &Span) -> ParseResult<Vec<TemplatePart>> {
    let chars: Vec<char> = text.chars().collect();
    let mut parts = vec![];
    let mut buffer = String::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '$' && chars.get(i + 1) == Some(&'{') {
            if !buffer.is_empty() {
                parts.push(TemplatePart::Text(std::mem::take(&mut buffer)));
            }
            i += 2;
            let mut depth = 1usize;
            let mut inner = String::new();
            while i < chars.len() && depth > 0 {
                match chars[i] {
                    '{' => {
                        depth += 1;
                        inner.push('{');
                    }
                    '}' => {
                        depth -= 1;
                        if depth > 0 {
                            inner.push('}');
                        }
                    }
                    c => inner.push(c),
                }
                i += 1;
            }
            if depth > 0 {
                return Err(Diagnostic::error(
                    ErrorCode::UnterminatedString,
                    "unterminated interpolation in template string",
                    span,
                ));
            }
            parts.push(TemplatePart::Expr(parse_interpolation(&inner, span)?));
        } else {
            buffer.push(chars[i]);
            i += 1;
        }
    }

    if !buffer.is_empty() {
        parts.push(TemplatePart::Text(buffer));
    }
    Ok(parts)
}

fn parse_interpolation(source: &str, span: &Span) -> ParseResult<Expression> {
    let tokens = Lexer::new(source).lex();
    let mut parser = Parser::new(tokens);
    let expression = parser.parse_expression(Precedence::Lowest).map_err(|_| {
        Diagnostic::error(
            ErrorCode::UnexpectedToken,
            format!("invalid interpolation '{source}' in template string"),
            span,
        )
    })?;
    parser.skip_newlines();
    if !parser.at_end() || !parser.errors.is_empty() {
        return Err(Diagnostic::error(
            ErrorCode::UnexpectedToken,
            format!("invalid interpolation '{source}' in template string"),
            span,
        ));
    }
    Ok(expression)
}
