//! Lexical analysis for Zylo source text.
//!
//! The lexer walks the decoded code points of a source file and produces a
//! vector of positioned [`Token`]s terminated by an EOF sentinel. Horizontal
//! whitespace is discarded, newlines become tokens (the parser decides when
//! they are significant) and malformed input yields `Error` tokens carrying
//! a message instead of aborting the scan.

mod token;

pub use token::*;

pub struct Lexer {
    chars: Vec<char>,
    position: usize,
    tokens: Vec<Token>,
    /// Position of the next unconsumed code point, 1-based.
    line: usize,
    col: usize,
    /// Position of the most recently consumed code point.
    last: (usize, usize),
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        // A leading byte-order mark is not part of the program.
        let input = input.strip_prefix('\u{feff}').unwrap_or(input);

        Lexer {
            chars: input.chars().collect(),
            position: 0,
            tokens: vec![],
            line: 1,
            col: 1,
            last: (1, 1),
        }
    }

    pub fn lex(mut self) -> Vec<Token> {
        while self.peek().is_some() {
            self.eat_whitespace();
            if self.peek().is_none() {
                break;
            }
            self.lex_token();
        }

        let eof_span = Span::new((self.line, 0), (self.line, 0));
        self.tokens.push(Token::new(TokenKind::Eof, "", eof_span));
        log::debug!("lexed {} tokens", self.tokens.len());
        self.tokens
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.position + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.get(self.position).copied()?;
        self.position += 1;
        self.last = (self.line, self.col);
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn advance_if(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn start(&self) -> (usize, usize) {
        (self.line, self.col)
    }

    fn push(&mut self, kind: TokenKind, lexeme: impl Into<String>, start: (usize, usize)) {
        let span = Span::new(start, self.last);
        self.tokens.push(Token::new(kind, lexeme, span));
    }

    fn push_error(&mut self, message: impl Into<String>, lexeme: String, start: (usize, usize)) {
        let span = Span::new(start, self.last);
        self.tokens.push(
            Token::new(TokenKind::Error, lexeme, span).with_literal(Literal::Str(message.into())),
        );
    }

    /// Carriage returns count as horizontal whitespace; newlines do not,
    /// they are emitted as tokens of their own.
    fn eat_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c == ' ' || c == '\t' || c == '\r' {
                self.advance();
            } else {
                return;
            }
        }
    }

    fn lex_token(&mut self) {
        let start = self.start();
        let Some(c) = self.peek() else {
            return;
        };

        match c {
            '\n' => {
                self.advance();
                self.push(TokenKind::Newline, "\n", start);
            }
            '#' => self.eat_line_comment(),
            '/' if self.peek_at(1) == Some('/') && !self.previous_ends_expression() => {
                self.eat_line_comment()
            }
            '/' if self.peek_at(1) == Some('*') => self.eat_block_comment(start),
            c if c.is_alphabetic() || c == '_' => self.lex_identifier(start),
            c if c.is_ascii_digit() => self.lex_number(start),
            '"' if self.peek_at(1) == Some('"') && self.peek_at(2) == Some('"') => {
                self.lex_triple_string(start)
            }
            '"' | '\'' => self.lex_string(c, start),
            '`' => self.lex_template(start),
            _ => self.lex_operator(start),
        }
    }

    /// A `//` directly after something that can end an expression is the
    /// floor-division operator; anywhere else it opens a line comment.
    fn previous_ends_expression(&self) -> bool {
        matches!(
            self.tokens.last().map(|t| t.kind),
            Some(
                TokenKind::Identifier
                    | TokenKind::Number
                    | TokenKind::StringLit
                    | TokenKind::TemplateString
                    | TokenKind::RParen
                    | TokenKind::RBracket
                    | TokenKind::True
                    | TokenKind::False
                    | TokenKind::Nil
                    | TokenKind::This
            )
        )
    }

    fn eat_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                return;
            }
            self.advance();
        }
    }

    fn eat_block_comment(&mut self, start: (usize, usize)) {
        self.advance();
        self.advance();
        let mut depth = 1usize;

        while depth > 0 {
            match (self.peek(), self.peek_at(1)) {
                (Some('/'), Some('*')) => {
                    self.advance();
                    self.advance();
                    depth += 1;
                }
                (Some('*'), Some('/')) => {
                    self.advance();
                    self.advance();
                    depth -= 1;
                }
                (Some(_), _) => {
                    self.advance();
                }
                (None, _) => {
                    self.push_error("unterminated block comment", "/*".into(), start);
                    return;
                }
            }
        }
    }

    fn lex_identifier(&mut self, start: (usize, usize)) {
        let mut lexeme = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                lexeme.push(c);
                self.advance();
            } else {
                break;
            }
        }

        match KEYWORDS.get(lexeme.as_str()) {
            Some(kind) => self.push(*kind, lexeme, start),
            None => self.push(TokenKind::Identifier, lexeme, start),
        }
    }

    fn lex_number(&mut self, start: (usize, usize)) {
        let mut lexeme = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                lexeme.push(c);
                self.advance();
            } else {
                break;
            }
        }

        // A fraction needs a digit after the dot; `1..5` is a range.
        let mut is_float = false;
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            lexeme.push('.');
            self.advance();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    lexeme.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
        }

        if is_float {
            match lexeme.parse::<f64>() {
                Ok(value) => {
                    let span = Span::new(start, self.last);
                    self.tokens.push(
                        Token::new(TokenKind::Number, lexeme, span)
                            .with_literal(Literal::Float(value)),
                    );
                }
                Err(_) => self.push_error("malformed float literal", lexeme, start),
            }
        } else {
            match lexeme.parse::<i64>() {
                Ok(value) => {
                    let span = Span::new(start, self.last);
                    self.tokens.push(
                        Token::new(TokenKind::Number, lexeme, span)
                            .with_literal(Literal::Integer(value)),
                    );
                }
                Err(_) => self.push_error("integer literal out of 64-bit range", lexeme, start),
            }
        }
    }

    fn lex_string(&mut self, quote: char, start: (usize, usize)) {
        self.advance();
        let mut lexeme = String::from(quote);
        let mut value = String::new();
        let mut escape_error: Option<String> = None;

        loop {
            match self.peek() {
                None | Some('\n') => {
                    self.push_error("unterminated string literal", lexeme, start);
                    return;
                }
                Some(c) if c == quote => {
                    lexeme.push(c);
                    self.advance();
                    break;
                }
                Some('\\') => {
                    lexeme.push('\\');
                    self.advance();
                    match self.lex_escape(&mut lexeme) {
                        Ok(decoded) => value.push(decoded),
                        Err(message) => escape_error = escape_error.or(Some(message)),
                    }
                }
                Some(c) => {
                    lexeme.push(c);
                    value.push(c);
                    self.advance();
                }
            }
        }

        match escape_error {
            Some(message) => self.push_error(message, lexeme, start),
            None => {
                let span = Span::new(start, self.last);
                self.tokens.push(
                    Token::new(TokenKind::StringLit, lexeme, span)
                        .with_literal(Literal::Str(value)),
                );
            }
        }
    }

    fn lex_escape(&mut self, lexeme: &mut String) -> Result<char, String> {
        let Some(c) = self.peek() else {
            return Err("unfinished escape sequence".into());
        };
        lexeme.push(c);
        self.advance();

        match c {
            'n' => Ok('\n'),
            't' => Ok('\t'),
            '"' => Ok('"'),
            '\'' => Ok('\''),
            '\\' => Ok('\\'),
            'u' => {
                let mut code = 0u32;
                for _ in 0..4 {
                    let digit = self.peek().filter(|c| c.is_ascii_hexdigit());
                    let Some(digit) = digit else {
                        return Err("\\u escape requires exactly four hex digits".into());
                    };
                    lexeme.push(digit);
                    self.advance();
                    code = code * 16 + digit.to_digit(16).unwrap_or(0);
                }
                char::from_u32(code).ok_or_else(|| format!("invalid unicode escape \\u{code:04X}"))
            }
            other => Err(format!("unknown escape sequence '\\{other}'")),
        }
    }

    fn lex_triple_string(&mut self, start: (usize, usize)) {
        self.advance();
        self.advance();
        self.advance();
        let mut value = String::new();

        loop {
            if self.peek() == Some('"') && self.peek_at(1) == Some('"') && self.peek_at(2) == Some('"')
            {
                self.advance();
                self.advance();
                self.advance();
                break;
            }
            match self.advance() {
                Some(c) => value.push(c),
                None => {
                    self.push_error(
                        "unterminated multi-line string literal",
                        "\"\"\"".into(),
                        start,
                    );
                    return;
                }
            }
        }

        // Contents are verbatim apart from a newline directly after the
        // opening delimiter.
        let value = value.strip_prefix('\n').map(str::to_owned).unwrap_or(value);
        let span = Span::new(start, self.last);
        let lexeme = format!("\"\"\"{value}\"\"\"");
        self.tokens
            .push(Token::new(TokenKind::StringLit, lexeme, span).with_literal(Literal::Str(value)));
    }

    fn lex_template(&mut self, start: (usize, usize)) {
        self.advance();
        let mut value = String::new();

        loop {
            match self.peek() {
                None => {
                    self.push_error("unterminated template string", format!("`{value}"), start);
                    return;
                }
                Some('`') => {
                    self.advance();
                    break;
                }
                Some('$') if self.peek_at(1) == Some('{') => {
                    value.push('$');
                    value.push('{');
                    self.advance();
                    self.advance();
                    // Consume the interpolation body up to the matching
                    // brace so map literals inside `${ … }` stay intact.
                    let mut depth = 1usize;
                    while depth > 0 {
                        match self.advance() {
                            Some('{') => {
                                value.push('{');
                                depth += 1;
                            }
                            Some('}') => {
                                depth -= 1;
                                if depth > 0 {
                                    value.push('}');
                                }
                            }
                            Some(c) => value.push(c),
                            None => {
                                self.push_error(
                                    "unterminated interpolation in template string",
                                    format!("`{value}"),
                                    start,
                                );
                                return;
                            }
                        }
                    }
                    value.push('}');
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }

        let span = Span::new(start, self.last);
        let lexeme = format!("`{value}`");
        self.tokens.push(
            Token::new(TokenKind::TemplateString, lexeme, span).with_literal(Literal::Str(value)),
        );
    }

    fn lex_operator(&mut self, start: (usize, usize)) {
        let Some(c) = self.advance() else {
            return;
        };

        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '.' => {
                if self.advance_if('.') {
                    TokenKind::DotDot
                } else {
                    TokenKind::Dot
                }
            }
            '+' => {
                if self.advance_if('=') {
                    TokenKind::PlusAssign
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.advance_if('=') {
                    TokenKind::MinusAssign
                } else if self.advance_if('>') {
                    TokenKind::ThinArrow
                } else {
                    TokenKind::Minus
                }
            }
            '*' => {
                if self.advance_if('*') {
                    TokenKind::Power
                } else if self.advance_if('=') {
                    TokenKind::StarAssign
                } else {
                    TokenKind::Star
                }
            }
            '/' => {
                if self.advance_if('/') {
                    TokenKind::FloorDiv
                } else if self.advance_if('=') {
                    TokenKind::SlashAssign
                } else {
                    TokenKind::Slash
                }
            }
            '%' => {
                if self.advance_if('=') {
                    TokenKind::PercentAssign
                } else {
                    TokenKind::Percent
                }
            }
            ':' => {
                if self.advance_if('=') {
                    TokenKind::Walrus
                } else {
                    TokenKind::Colon
                }
            }
            '!' => {
                if self.advance_if('=') {
                    TokenKind::BangEqual
                } else {
                    TokenKind::Bang
                }
            }
            '=' => {
                if self.advance_if('=') {
                    TokenKind::EqualEqual
                } else if self.advance_if('>') {
                    TokenKind::FatArrow
                } else {
                    TokenKind::Assign
                }
            }
            '>' => {
                if self.advance_if('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }
            '<' => {
                if self.advance_if('=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                }
            }
            '&' => {
                if self.advance_if('&') {
                    TokenKind::And
                } else {
                    self.push_error(
                        "single '&' is not an operator, use '&&' or 'and'",
                        "&".into(),
                        start,
                    );
                    return;
                }
            }
            '|' => {
                if self.advance_if('|') {
                    TokenKind::Or
                } else {
                    self.push_error(
                        "single '|' is not an operator, use '||' or 'or'",
                        "|".into(),
                        start,
                    );
                    return;
                }
            }
            other => {
                self.push_error(format!("unexpected character '{other}'"), other.into(), start);
                return;
            }
        };

        let lexeme: String = {
            let end = self.position;
            let begin = end - kind_len(kind);
            self.chars[begin..end].iter().collect()
        };
        self.push(kind, lexeme, start);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input).lex().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_lex_walrus_binding() {
        assert_eq!(
            kinds("x := 5"),
            vec![
                TokenKind::Identifier,
                TokenKind::Walrus,
                TokenKind::Number,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_lex_keywords_and_aliases() {
        assert_eq!(
            kinds("self this func"),
            vec![
                TokenKind::This,
                TokenKind::This,
                TokenKind::Func,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_lex_newline_token() {
        assert_eq!(
            kinds("a\nb"),
            vec![
                TokenKind::Identifier,
                TokenKind::Newline,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_lex_number_literals() {
        let tokens = Lexer::new("42 3.25").lex();
        assert_eq!(tokens[0].literal, Some(Literal::Integer(42)));
        assert_eq!(tokens[1].literal, Some(Literal::Float(3.25)));
    }

    #[test]
    fn test_range_is_not_a_float() {
        assert_eq!(
            kinds("1..5"),
            vec![
                TokenKind::Number,
                TokenKind::DotDot,
                TokenKind::Number,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_positions_are_one_based() {
        let tokens = Lexer::new("ab cd").lex();
        assert_eq!(tokens[0].span.start, (1, 1));
        assert_eq!(tokens[0].span.end, (1, 2));
        assert_eq!(tokens[1].span.start, (1, 4));
        assert_eq!(tokens[1].span.end, (1, 5));
    }

    #[test]
    fn test_eof_has_column_zero() {
        let tokens = Lexer::new("x").lex();
        let eof = tokens.last().unwrap();
        assert_eq!(eof.kind, TokenKind::Eof);
        assert_eq!(eof.span.start.1, 0);
    }

    #[test]
    fn test_string_escapes() {
        let tokens = Lexer::new(r#""a\nbA""#).lex();
        assert_eq!(tokens[0].literal, Some(Literal::Str("a\nbA".into())));
    }

    #[test]
    fn test_unterminated_string_is_error_token() {
        let tokens = Lexer::new("\"abc\nx").lex();
        assert_eq!(tokens[0].kind, TokenKind::Error);
        assert_eq!(
            tokens[0].literal,
            Some(Literal::Str("unterminated string literal".into()))
        );
        // The lexer keeps going after the error.
        assert_eq!(tokens[1].kind, TokenKind::Newline);
        assert_eq!(tokens[2].kind, TokenKind::Identifier);
    }

    #[test]
    fn test_bad_escape_is_error_token() {
        let tokens = Lexer::new(r#""a\q""#).lex();
        assert_eq!(tokens[0].kind, TokenKind::Error);
    }

    #[test]
    fn test_nested_block_comment() {
        assert_eq!(kinds("a /* x /* y */ z */ b"), vec![
            TokenKind::Identifier,
            TokenKind::Identifier,
            TokenKind::Eof
        ]);
    }

    #[test]
    fn test_hash_comment() {
        assert_eq!(kinds("# nothing here"), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_floor_div_after_expression() {
        assert_eq!(
            kinds("7 // 2"),
            vec![
                TokenKind::Number,
                TokenKind::FloorDiv,
                TokenKind::Number,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_line_comment_at_statement_start() {
        assert_eq!(kinds("// a comment"), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_single_ampersand_is_error() {
        let tokens = Lexer::new("a & b").lex();
        assert_eq!(tokens[1].kind, TokenKind::Error);
    }

    #[test]
    fn test_template_string_keeps_interpolation_text() {
        let tokens = Lexer::new("`hi ${name}!`").lex();
        assert_eq!(tokens[0].kind, TokenKind::TemplateString);
        assert_eq!(tokens[0].literal, Some(Literal::Str("hi ${name}!".into())));
    }

    #[test]
    fn test_triple_string_strips_leading_newline() {
        let tokens = Lexer::new("\"\"\"\nline one\nline two\"\"\"").lex();
        assert_eq!(
            tokens[0].literal,
            Some(Literal::Str("line one\nline two".into()))
        );
    }

    #[test]
    fn test_lexemes_cover_the_source() {
        // Concatenated lexemes reproduce the source minus whitespace and
        // comments.
        let source = "x := 1 + 2 /* gone */\nshow.log(x) # gone too";
        let concatenated: String = Lexer::new(source)
            .lex()
            .iter()
            .map(|t| t.lexeme.as_str())
            .collect();
        assert_eq!(concatenated, "x:=1+2\nshow.log(x)");
    }

    #[test]
    fn test_lexing_twice_yields_equal_streams() {
        let source = "x := 1 + 2\nshow.log(x)";
        assert_eq!(Lexer::new(source).lex(), Lexer::new(source).lex());
    }

    #[test]
    fn test_bom_is_skipped() {
        let tokens = Lexer::new("\u{feff}x").lex();
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].span.start, (1, 1));
    }

    #[test]
    fn test_compound_operators() {
        assert_eq!(
            kinds("a += 1; b **= 2"),
            vec![
                TokenKind::Identifier,
                TokenKind::PlusAssign,
                TokenKind::Number,
                TokenKind::Semicolon,
                TokenKind::Identifier,
                TokenKind::Power,
                TokenKind::Assign,
                TokenKind::Number,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_integer_overflow_is_error_token() {
        let tokens = Lexer::new("99999999999999999999").lex();
        assert_eq!(tokens[0].kind, TokenKind::Error);
    }
}

fn kind_len(kind: TokenKind) -> usize {
    match kind {
        TokenKind::DotDot
        | TokenKind::PlusAssign
        | TokenKind::MinusAssign
        | TokenKind::StarAssign
        | TokenKind::SlashAssign
        | TokenKind::PercentAssign
        | TokenKind::Power
        | TokenKind::FloorDiv
        | TokenKind::Walrus
        | TokenKind::BangEqual
        | TokenKind::EqualEqual
        | TokenKind::FatArrow
        | TokenKind::ThinArrow
        | TokenKind::GreaterEqual
        | TokenKind::LessEqual
        | TokenKind::And
        | TokenKind::Or => 2,
        _ => 1,
    }
}
