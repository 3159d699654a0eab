pub use pine_ast::{
    Argument, BinOp, DeclKind, Expr, FunctionParam, ImportInfo, Literal, MethodParam, Program,
    Stmt, SwitchCase, TypeField, UnOp,
};
use pine_lexer::{Token, TokenType};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ParserError {
    #[error("Unexpected token: {0:?} at line {1}")]
    UnexpectedToken(TokenType, usize),

    #[error("Expected {expected} but found {found:?} at line {line}")]
    ExpectedToken {
        expected: String,
        found: TokenType,
        line: usize,
    },

    #[error("Expected variable name at line {0}")]
    ExpectedVariableName(usize),

    #[error("Expected parameter name at line {0}")]
    ExpectedParameterName(usize),

    #[error("Expected identifier after '.' at line {0}")]
    ExpectedIdentifierAfterDot(usize),

    #[error("Expected 'Type this' as the first method parameter at line {0}")]
    ExpectedBoundType(usize),

    #[error("Expected '/' in import path at line {0}")]
    ExpectedImportSlash(usize),

    #[error("Expected 'type', 'method' or a function declaration after 'export' at line {0}")]
    InvalidExport(usize),
}

impl ParserError {
    pub fn line(&self) -> usize {
        match self {
            ParserError::UnexpectedToken(_, line)
            | ParserError::ExpectedToken { line, .. }
            | ParserError::ExpectedVariableName(line)
            | ParserError::ExpectedParameterName(line)
            | ParserError::ExpectedIdentifierAfterDot(line)
            | ParserError::ExpectedBoundType(line)
            | ParserError::ExpectedImportSlash(line)
            | ParserError::InvalidExport(line) => *line,
        }
    }
}

/// Helper trait to convert TokenType to operators
trait TokenTypeExt {
    fn to_binop(&self) -> Option<BinOp>;
}

impl TokenTypeExt for TokenType {
    fn to_binop(&self) -> Option<BinOp> {
        match self {
            TokenType::Plus => Some(BinOp::Add),
            TokenType::Minus => Some(BinOp::Sub),
            TokenType::Star => Some(BinOp::Mul),
            TokenType::Slash => Some(BinOp::Div),
            TokenType::Percent => Some(BinOp::Mod),
            TokenType::Equal => Some(BinOp::Eq),
            TokenType::NotEqual => Some(BinOp::NotEq),
            TokenType::Less => Some(BinOp::Less),
            TokenType::Greater => Some(BinOp::Greater),
            TokenType::LessEqual => Some(BinOp::LessEq),
            TokenType::GreaterEqual => Some(BinOp::GreaterEq),
            TokenType::And => Some(BinOp::And),
            TokenType::Or => Some(BinOp::Or),
            TokenType::PlusAssign => Some(BinOp::Add),
            TokenType::MinusAssign => Some(BinOp::Sub),
            TokenType::StarAssign => Some(BinOp::Mul),
            TokenType::SlashAssign => Some(BinOp::Div),
            _ => None,
        }
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    errors: Vec<ParserError>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            errors: vec![],
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().typ, TokenType::Eof)
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        &self.tokens[self.current - 1]
    }

    fn check(&self, typ: &TokenType) -> bool {
        !self.is_at_end() && &self.peek().typ == typ
    }

    fn match_token(&mut self, types: &[TokenType]) -> bool {
        for typ in types {
            if self.check(typ) {
                self.advance();
                return true;
            }
        }
        false
    }

    /// Try to parse something speculatively. If parsing fails, restore
    /// position and return None.
    fn try_parse<T, F>(&mut self, f: F) -> Option<T>
    where
        F: FnOnce(&mut Self) -> Result<T, ParserError>,
    {
        let saved_pos = self.current;
        match f(self) {
            Ok(val) => Some(val),
            Err(_) => {
                self.current = saved_pos;
                None
            }
        }
    }

    /// Skip any newline tokens
    fn skip_newlines(&mut self) {
        while self.match_token(&[TokenType::Newline]) {}
    }

    /// Skip newlines, indents, and dedents (whitespace tokens)
    fn skip_whitespace(&mut self) {
        while self.match_token(&[TokenType::Newline, TokenType::Indent, TokenType::Dedent]) {}
    }

    /// Parse an expression that may be on an indented continuation line.
    fn parse_indented_expression(&mut self) -> Result<Expr, ParserError> {
        self.skip_newlines();

        let has_indent = self.match_token(&[TokenType::Indent]);
        let expr = self.expression()?;
        if has_indent {
            self.match_token(&[TokenType::Dedent]);
        }

        Ok(expr)
    }

    fn consume(&mut self, typ: TokenType, message: &str) -> Result<&Token, ParserError> {
        if self.check(&typ) {
            Ok(self.advance())
        } else {
            Err(ParserError::ExpectedToken {
                expected: message.to_string(),
                found: self.peek().typ.clone(),
                line: self.peek().line,
            })
        }
    }

    fn expect_ident(&mut self, on_err: fn(usize) -> ParserError) -> Result<String, ParserError> {
        if let TokenType::Ident(name) = &self.peek().typ {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(on_err(self.peek().line))
        }
    }

    /// Drop tokens through the end of the current line so parsing can pick
    /// up with the next statement.
    fn synchronize(&mut self) {
        while !self.is_at_end() {
            if matches!(self.advance().typ, TokenType::Newline) {
                return;
            }
        }
    }

    /// Parse a program (top-level). Errors are recorded per line; parsing
    /// always reaches the end of the token stream.
    pub fn parse(&mut self) -> (Vec<Stmt>, Vec<ParserError>) {
        let mut statements = vec![];

        while !self.is_at_end() {
            // Skip leading newlines and stray indentation tokens left over
            // from recovery
            self.skip_whitespace();

            if self.is_at_end() {
                break;
            }

            match self.declaration() {
                Ok(stmt) => statements.push(stmt),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize();
                }
            }
        }

        (statements, std::mem::take(&mut self.errors))
    }

    // Declarations (var declarations, type/method/import declarations, etc.)
    fn declaration(&mut self) -> Result<Stmt, ParserError> {
        if self.match_token(&[TokenType::Import]) {
            return self.import_statement();
        }

        if self.match_token(&[TokenType::Export]) {
            return self.export_declaration();
        }

        if self.match_token(&[TokenType::Type]) {
            return self.type_declaration(false);
        }

        if self.match_token(&[TokenType::Method]) {
            return self.method_declaration(false);
        }

        // var/varip declarations, optionally with a type annotation
        let kind = if self.match_token(&[TokenType::Varip]) {
            Some(DeclKind::Varip)
        } else if self.match_token(&[TokenType::Var]) {
            Some(DeclKind::Var)
        } else {
            None
        };

        if let Some(kind) = kind {
            let type_annotation = self.try_parse(|p| {
                let annotation = p.parse_type_name()?;
                // Must be followed by the variable name to be an annotation
                if !matches!(p.peek().typ, TokenType::Ident(_)) {
                    return Err(ParserError::ExpectedVariableName(p.peek().line));
                }
                Ok(annotation)
            });
            return self.typed_var_declaration(type_annotation, kind);
        }

        // Bare type-annotated declaration: float x = ..., chart.point p = ...
        if matches!(self.peek().typ, TokenType::Ident(_)) {
            if let Some(annotation) = self.try_parse(|p| {
                let annotation = p.parse_type_name()?;
                // Two adjacent identifiers can only be annotation + name
                if !matches!(p.peek().typ, TokenType::Ident(_)) {
                    return Err(ParserError::ExpectedVariableName(p.peek().line));
                }
                Ok(annotation)
            }) {
                return self.typed_var_declaration(Some(annotation), DeclKind::Bare);
            }
        }

        self.statement()
    }

    fn export_declaration(&mut self) -> Result<Stmt, ParserError> {
        if self.match_token(&[TokenType::Type]) {
            return self.type_declaration(true);
        }
        if self.match_token(&[TokenType::Method]) {
            return self.method_declaration(true);
        }

        // export f(params) => body
        if matches!(self.peek().typ, TokenType::Ident(_)) {
            if let Some(stmt) = self.try_parse(|p| p.function_declaration(true)) {
                return Ok(stmt);
            }
        }

        Err(ParserError::InvalidExport(self.peek().line))
    }

    /// `import Publisher/Name/Version [as alias]`
    fn import_statement(&mut self) -> Result<Stmt, ParserError> {
        let publisher = self.expect_ident(ParserError::ExpectedVariableName)?;

        if !self.match_token(&[TokenType::Slash]) {
            return Err(ParserError::ExpectedImportSlash(self.peek().line));
        }
        let name = self.expect_ident(ParserError::ExpectedVariableName)?;

        if !self.match_token(&[TokenType::Slash]) {
            return Err(ParserError::ExpectedImportSlash(self.peek().line));
        }

        let version = match &self.peek().typ {
            TokenType::Number(n) => {
                let version = if n.fract() == 0.0 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                };
                self.advance();
                version
            }
            TokenType::Ident(name) => {
                let version = name.clone();
                self.advance();
                version
            }
            _ => {
                return Err(ParserError::ExpectedToken {
                    expected: "library version".to_string(),
                    found: self.peek().typ.clone(),
                    line: self.peek().line,
                })
            }
        };

        let alias = if self.match_token(&[TokenType::As]) {
            Some(self.expect_ident(ParserError::ExpectedVariableName)?)
        } else {
            None
        };

        Ok(Stmt::Import(ImportInfo {
            publisher,
            name,
            version,
            alias,
        }))
    }

    /// A type name: `float`, `chart.point`, `array<float>`, `int[]`
    fn parse_type_name(&mut self) -> Result<String, ParserError> {
        let mut name = self.expect_ident(ParserError::ExpectedVariableName)?;

        // Qualified name: chart.point
        if self.check(&TokenType::Dot) {
            self.advance();
            let member = self.expect_ident(ParserError::ExpectedIdentifierAfterDot)?;
            name = format!("{}.{}", name, member);
        }

        // Generic argument: array<float>
        if self.check(&TokenType::Less) {
            if let Some(generic) = self.try_parse(|p| {
                p.advance(); // consume '<'
                let inner = p.parse_type_name()?;
                p.consume(TokenType::Greater, "'>' after type argument")?;
                Ok(inner)
            }) {
                name = format!("{}<{}>", name, generic);
            }
        }

        // Array suffix: int[]
        if self.check(&TokenType::LBracket) {
            if let Some(()) = self.try_parse(|p| {
                p.advance(); // consume '['
                p.consume(TokenType::RBracket, "']' after '[' in array type")?;
                Ok(())
            }) {
                name = format!("{}[]", name);
            }
        }

        Ok(name)
    }

    fn type_declaration(&mut self, exported: bool) -> Result<Stmt, ParserError> {
        let type_name = self.expect_ident(ParserError::ExpectedVariableName)?;

        self.consume(TokenType::Newline, "newline after type name")?;
        self.consume(TokenType::Indent, "indented field block")?;

        let mut fields = Vec::new();

        loop {
            self.skip_newlines();

            if self.check(&TokenType::Dedent) {
                self.advance();
                break;
            }
            if self.is_at_end() {
                break;
            }

            // Field: type_annotation field_name [= default_value]
            let field_type = self.parse_type_name()?;
            let field_name = self.expect_ident(ParserError::ExpectedVariableName)?;

            let default_value = if self.match_token(&[TokenType::Assign]) {
                Some(self.expression()?)
            } else {
                None
            };

            fields.push(TypeField {
                name: field_name,
                type_annotation: field_type,
                default_value,
            });
        }

        Ok(Stmt::TypeDecl {
            name: type_name,
            fields,
            exported,
        })
    }

    /// `method m(BoundType this[, p ...]) => body`
    fn method_declaration(&mut self, exported: bool) -> Result<Stmt, ParserError> {
        let method_name = self.expect_ident(ParserError::ExpectedVariableName)?;

        self.consume(TokenType::LParen, "'(' after method name")?;
        let params = self.method_params()?;
        self.consume(TokenType::RParen, "')' after parameters")?;

        // The first parameter must be `BoundType this`
        let mut params = params.into_iter();
        let bound_type = match params.next() {
            Some(first) if first.name == "this" && first.type_annotation.is_some() => {
                // SAFETY: checked is_some above
                first.type_annotation.unwrap()
            }
            _ => return Err(ParserError::ExpectedBoundType(self.peek().line)),
        };

        self.consume(TokenType::Arrow, "'=>' after method parameters")?;

        let body = self.parse_block()?;

        Ok(Stmt::MethodDecl {
            name: method_name,
            bound_type,
            params: params.collect(),
            body,
            exported,
        })
    }

    fn method_params(&mut self) -> Result<Vec<MethodParam>, ParserError> {
        let mut params = Vec::new();

        if !self.check(&TokenType::RParen) {
            loop {
                self.skip_newlines();

                // Optional type annotation: an identifier (or type syntax)
                // followed by another identifier
                let type_annotation = self.try_parse(|p| {
                    let annotation = p.parse_type_name()?;
                    if !matches!(p.peek().typ, TokenType::Ident(_)) {
                        return Err(ParserError::ExpectedParameterName(p.peek().line));
                    }
                    Ok(annotation)
                });

                let param_name = self.expect_ident(ParserError::ExpectedParameterName)?;

                let default_value = if self.match_token(&[TokenType::Assign]) {
                    Some(self.expression()?)
                } else {
                    None
                };

                params.push(MethodParam {
                    type_annotation,
                    name: param_name,
                    default_value,
                });

                if !self.match_token(&[TokenType::Comma]) {
                    break;
                }
                self.skip_newlines();
            }
        }

        Ok(params)
    }

    /// `name(params) => body`, with the identifier already pending
    fn function_declaration(&mut self, exported: bool) -> Result<Stmt, ParserError> {
        let name = self.expect_ident(ParserError::ExpectedVariableName)?;

        self.consume(TokenType::LParen, "'('")?;
        let params = self.function_params()?;
        self.consume(TokenType::RParen, "')' after function parameters")?;
        self.consume(TokenType::Arrow, "'=>'")?;

        let body = self.parse_block()?;

        Ok(Stmt::FunctionDecl {
            name,
            params,
            body,
            exported,
        })
    }

    fn typed_var_declaration(
        &mut self,
        type_annotation: Option<String>,
        kind: DeclKind,
    ) -> Result<Stmt, ParserError> {
        let name = self.expect_ident(ParserError::ExpectedVariableName)?;

        let initializer = if self.match_token(&[TokenType::Assign]) {
            Some(self.parse_indented_expression()?)
        } else {
            None
        };

        Ok(Stmt::VarDecl {
            name,
            type_annotation,
            initializer,
            kind,
        })
    }

    fn statement(&mut self) -> Result<Stmt, ParserError> {
        if self.match_token(&[TokenType::If]) {
            return self.if_statement();
        }
        if self.match_token(&[TokenType::For]) {
            return self.for_statement();
        }
        if self.match_token(&[TokenType::While]) {
            return self.while_statement();
        }
        if self.match_token(&[TokenType::Break]) {
            return Ok(Stmt::Break);
        }
        if self.match_token(&[TokenType::Continue]) {
            return Ok(Stmt::Continue);
        }

        // Tuple destructuring: [a, b, c] = expr (only when the bracket group
        // is all identifiers followed by '=')
        if self.check(&TokenType::LBracket) {
            if let Some((names, value)) = self.try_parse(|p| {
                p.advance(); // consume [

                let mut names = vec![];
                if !p.check(&TokenType::RBracket) {
                    loop {
                        names.push(p.expect_ident(ParserError::ExpectedVariableName)?);
                        if !p.match_token(&[TokenType::Comma]) {
                            break;
                        }
                    }
                }

                p.consume(TokenType::RBracket, "']' in tuple destructuring")?;
                p.consume(TokenType::Assign, "'=' after tuple pattern")?;
                p.skip_newlines();

                let value = p.expression()?;
                Ok((names, value))
            }) {
                return Ok(Stmt::TupleAssignment { names, value });
            }
        }

        // name(params) => body   (function declaration)
        // name = expr            (declaration)
        // name := expr           (reassignment)
        // name op= expr          (compound reassignment, desugared)
        if let TokenType::Ident(name) = &self.peek().typ {
            let name = name.clone();

            if let Some(stmt) = self.try_parse(|p| p.function_declaration(false)) {
                return Ok(stmt);
            }

            if let Some(stmt) = self.try_parse(|p| {
                p.advance(); // consume identifier

                if p.match_token(&[TokenType::Assign]) {
                    let initializer = Some(p.parse_indented_expression()?);
                    return Ok(Stmt::VarDecl {
                        name: name.clone(),
                        type_annotation: None,
                        initializer,
                        kind: DeclKind::Bare,
                    });
                } else if p.match_token(&[TokenType::ColonAssign]) {
                    let value = p.parse_indented_expression()?;
                    return Ok(Stmt::Assignment {
                        target: Expr::Variable(name.clone()),
                        value,
                    });
                } else if p.match_token(&[
                    TokenType::PlusAssign,
                    TokenType::MinusAssign,
                    TokenType::StarAssign,
                    TokenType::SlashAssign,
                ]) {
                    // x += 5 desugars to x := x + 5
                    let op = p.tokens[p.current - 1]
                        .typ
                        .to_binop()
                        .expect("compound assign token should convert to binop");

                    let right = p.parse_indented_expression()?;
                    let value = Expr::Binary {
                        left: Box::new(Expr::Variable(name.clone())),
                        op,
                        right: Box::new(right),
                    };
                    return Ok(Stmt::Assignment {
                        target: Expr::Variable(name.clone()),
                        value,
                    });
                }

                Err(ParserError::UnexpectedToken(
                    p.peek().typ.clone(),
                    p.peek().line,
                ))
            }) {
                return Ok(stmt);
            }
        }

        self.expression_statement()
    }

    fn function_params(&mut self) -> Result<Vec<FunctionParam>, ParserError> {
        let mut params = vec![];

        if !self.check(&TokenType::RParen) {
            loop {
                let name = self.expect_ident(ParserError::ExpectedParameterName)?;

                let default_value = if self.match_token(&[TokenType::Assign]) {
                    Some(self.expression()?)
                } else {
                    None
                };

                params.push(FunctionParam {
                    name,
                    default_value,
                });

                if !self.match_token(&[TokenType::Comma]) {
                    break;
                }
                self.skip_newlines();
            }
        }

        Ok(params)
    }

    fn for_statement(&mut self) -> Result<Stmt, ParserError> {
        // Tuple form: for [index, item] in collection
        if self.check(&TokenType::LBracket) {
            self.advance();

            let index_var = self.expect_ident(ParserError::ExpectedVariableName)?;
            self.consume(TokenType::Comma, "',' in for...in tuple")?;
            let item_var = self.expect_ident(ParserError::ExpectedVariableName)?;
            self.consume(TokenType::RBracket, "']' after for...in tuple")?;
            self.consume(TokenType::In, "'in' in for...in loop")?;

            let collection = self.expression()?;
            let body = self.parse_block()?;

            return Ok(Stmt::ForIn {
                index_var: Some(index_var),
                item_var,
                collection,
                body,
            });
        }

        let var_name = self.expect_ident(ParserError::ExpectedVariableName)?;

        // for x in collection
        if self.match_token(&[TokenType::In]) {
            let collection = self.expression()?;
            let body = self.parse_block()?;

            return Ok(Stmt::ForIn {
                index_var: None,
                item_var: var_name,
                collection,
                body,
            });
        }

        // for i = from to to_expr [by step]
        self.consume(TokenType::Assign, "'=' in for loop")?;
        let from = self.expression()?;
        self.consume(TokenType::To, "'to' in for loop")?;
        let to = self.expression()?;

        let step = if self.match_token(&[TokenType::By]) {
            Some(self.expression()?)
        } else {
            None
        };

        let body = self.parse_block()?;

        Ok(Stmt::For {
            var_name,
            from,
            to,
            step,
            body,
        })
    }

    fn while_statement(&mut self) -> Result<Stmt, ParserError> {
        let condition = self.expression()?;
        let body = self.parse_block()?;

        Ok(Stmt::While { condition, body })
    }

    fn if_statement(&mut self) -> Result<Stmt, ParserError> {
        // No parentheses required around the condition
        let condition = self.expression()?;

        let then_branch = self.parse_block()?;

        let mut else_if_branches = Vec::new();

        loop {
            self.skip_newlines();

            if self.check(&TokenType::Else) {
                let saved_pos = self.current;
                self.advance(); // consume 'else'

                if self.match_token(&[TokenType::If]) {
                    let else_if_condition = self.expression()?;
                    let else_if_body = self.parse_block()?;
                    else_if_branches.push((else_if_condition, else_if_body));
                } else {
                    // Plain 'else', restore position
                    self.current = saved_pos;
                    break;
                }
            } else {
                break;
            }
        }

        self.skip_newlines();

        let else_branch = if self.match_token(&[TokenType::Else]) {
            Some(self.parse_block()?)
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_if_branches,
            else_branch,
        })
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParserError> {
        let mut stmts = vec![];

        // Single-line body on the same line as the opening statement
        if !self.check(&TokenType::Newline) {
            if !self.check(&TokenType::Else)
                && !self.check(&TokenType::Dedent)
                && !self.is_at_end()
            {
                stmts.push(self.declaration()?);
            }
            return Ok(stmts);
        }

        // Peek past the newline for an indented block; without one the body
        // is empty and the next line belongs to the enclosing level
        let saved_pos = self.current;
        self.skip_newlines();
        if !self.match_token(&[TokenType::Indent]) {
            self.current = saved_pos;
            return Ok(stmts);
        }

        loop {
            self.skip_newlines();

            if self.check(&TokenType::Else) {
                break;
            }

            if self.check(&TokenType::Dedent) {
                self.advance();
                self.skip_newlines();
                break;
            }

            if self.is_at_end() {
                break;
            }

            stmts.push(self.declaration()?);
        }

        Ok(stmts)
    }

    fn expression_statement(&mut self) -> Result<Stmt, ParserError> {
        let expr = self.expression()?;

        // Member reassignment: obj.field := value
        if self.match_token(&[TokenType::ColonAssign]) {
            let value = self.parse_indented_expression()?;
            return Ok(Stmt::Assignment {
                target: expr,
                value,
            });
        }

        Ok(Stmt::Expression(expr))
    }

    // Expression parsing with precedence
    fn expression(&mut self) -> Result<Expr, ParserError> {
        self.ternary()
    }

    /// Generic binary operator parser using left-associativity
    fn binary_left_assoc(
        &mut self,
        operators: &[TokenType],
        next_precedence: fn(&mut Self) -> Result<Expr, ParserError>,
    ) -> Result<Expr, ParserError> {
        let mut expr = next_precedence(self)?;

        loop {
            if !self.match_token(operators) {
                break;
            }

            let op = self.tokens[self.current - 1]
                .typ
                .to_binop()
                .expect("matched operator token should convert to binop");

            // Multi-line expressions continue on indented lines
            self.skip_newlines();
            self.match_token(&[TokenType::Indent]);

            let right = next_precedence(self)?;
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn ternary(&mut self) -> Result<Expr, ParserError> {
        let mut expr = self.logical_or()?;

        // Allow the '?' on an indented continuation line
        if self.check(&TokenType::Indent) {
            let saved_pos = self.current;
            self.advance();
            if !self.check(&TokenType::Question) {
                self.current = saved_pos;
            }
        }

        if self.match_token(&[TokenType::Question]) {
            self.skip_newlines();
            self.match_token(&[TokenType::Indent]);

            let then_expr = self.expression()?;

            self.skip_newlines();
            if self.check(&TokenType::Indent) {
                let saved_pos = self.current;
                self.advance();
                if !self.check(&TokenType::Colon) {
                    self.current = saved_pos;
                }
            }

            self.consume(TokenType::Colon, "':' in ternary expression")?;

            self.skip_newlines();
            self.match_token(&[TokenType::Indent]);

            let else_expr = self.expression()?;
            expr = Expr::Ternary {
                condition: Box::new(expr),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            };
        }

        Ok(expr)
    }

    fn logical_or(&mut self) -> Result<Expr, ParserError> {
        self.binary_left_assoc(&[TokenType::Or], Self::logical_and)
    }

    fn logical_and(&mut self) -> Result<Expr, ParserError> {
        self.binary_left_assoc(&[TokenType::And], Self::equality)
    }

    fn equality(&mut self) -> Result<Expr, ParserError> {
        self.binary_left_assoc(&[TokenType::Equal, TokenType::NotEqual], Self::comparison)
    }

    fn comparison(&mut self) -> Result<Expr, ParserError> {
        self.binary_left_assoc(
            &[
                TokenType::Greater,
                TokenType::Less,
                TokenType::GreaterEqual,
                TokenType::LessEqual,
            ],
            Self::term,
        )
    }

    fn term(&mut self) -> Result<Expr, ParserError> {
        self.binary_left_assoc(&[TokenType::Plus, TokenType::Minus], Self::factor)
    }

    fn factor(&mut self) -> Result<Expr, ParserError> {
        self.binary_left_assoc(
            &[TokenType::Star, TokenType::Slash, TokenType::Percent],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr, ParserError> {
        if self.match_token(&[TokenType::Minus]) {
            let expr = self.unary()?;
            return Ok(Expr::Unary {
                op: UnOp::Neg,
                expr: Box::new(expr),
            });
        }

        // Unary plus is a no-op
        if self.match_token(&[TokenType::Plus]) {
            return self.unary();
        }

        if self.match_token(&[TokenType::Not]) {
            let expr = self.unary()?;
            return Ok(Expr::Unary {
                op: UnOp::Not,
                expr: Box::new(expr),
            });
        }

        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ParserError> {
        let mut expr = self.primary()?;

        loop {
            if self.match_token(&[TokenType::Dot]) {
                // Member access: expr.member; keywords are allowed as member
                // names (input.int, array.from)
                let member = match &self.peek().typ {
                    TokenType::Ident(name) => {
                        let name = name.clone();
                        self.advance();
                        name
                    }
                    _ => {
                        let lexeme = self.peek().lexeme.clone();
                        if !lexeme.is_empty() {
                            self.advance();
                            lexeme
                        } else {
                            return Err(ParserError::ExpectedIdentifierAfterDot(self.peek().line));
                        }
                    }
                };
                expr = Expr::MemberAccess {
                    object: Box::new(expr),
                    member,
                };
            } else if self.match_token(&[TokenType::LBracket]) {
                // Historical reference: expr[offset]
                let offset = self.expression()?;
                self.consume(TokenType::RBracket, "']'")?;
                expr = Expr::HistoryAccess {
                    expr: Box::new(expr),
                    offset: Box::new(offset),
                };
            } else if self.check(&TokenType::Less) {
                // Generic call: array.new<float>(...). Backtracks so that
                // `a < b` still parses as a comparison.
                let generic = self.try_parse(|p| {
                    p.advance(); // consume '<'
                    let type_arg = p.parse_type_name()?;
                    p.consume(TokenType::Greater, "'>' after type argument")?;
                    p.consume(TokenType::LParen, "'(' after type argument")?;
                    let args = p.arguments()?;
                    p.consume(TokenType::RParen, "')'")?;
                    Ok((type_arg, args))
                });

                match generic {
                    Some((type_arg, args)) => {
                        expr = Expr::Call {
                            callee: Box::new(expr),
                            type_args: vec![type_arg],
                            args,
                        };
                    }
                    None => break,
                }
            } else if self.match_token(&[TokenType::LParen]) {
                let args = self.arguments()?;
                self.consume(TokenType::RParen, "')'")?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    type_args: vec![],
                    args,
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn arguments(&mut self) -> Result<Vec<Argument>, ParserError> {
        let mut args = vec![];

        self.skip_newlines();
        self.match_token(&[TokenType::Indent]);

        if !self.check(&TokenType::RParen) {
            loop {
                // Named argument: name=value
                if let TokenType::Ident(name) = &self.peek().typ {
                    let name = name.clone();
                    let saved_pos = self.current;
                    self.advance();

                    if self.check(&TokenType::Assign) {
                        self.advance(); // consume =
                        let value = self.expression()?;
                        args.push(Argument::Named { name, value });
                    } else {
                        self.current = saved_pos;
                        let expr = self.expression()?;
                        args.push(Argument::Positional(expr));
                    }
                } else {
                    let expr = self.expression()?;
                    args.push(Argument::Positional(expr));
                }

                self.skip_newlines();

                if !self.match_token(&[TokenType::Comma]) {
                    break;
                }

                self.skip_newlines();
                self.match_token(&[TokenType::Indent]);
            }
        }

        self.skip_newlines();
        self.match_token(&[TokenType::Dedent]);

        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, ParserError> {
        if let TokenType::Number(n) = self.peek().typ {
            self.advance();
            return Ok(Expr::Literal(Literal::Number(n)));
        }

        if let TokenType::String(ref s) = self.peek().typ {
            let s = s.clone();
            self.advance();
            return Ok(Expr::Literal(Literal::String(s)));
        }

        if let TokenType::Bool(b) = self.peek().typ {
            self.advance();
            return Ok(Expr::Literal(Literal::Bool(b)));
        }

        if let TokenType::HexColor(ref hex) = self.peek().typ {
            let hex = hex.clone();
            self.advance();
            return Ok(Expr::Literal(Literal::HexColor(hex)));
        }

        if self.match_token(&[TokenType::Na]) {
            return Ok(Expr::Literal(Literal::Na));
        }

        if let TokenType::Ident(ref name) = self.peek().typ {
            let name = name.clone();
            self.advance();
            return Ok(Expr::Variable(name));
        }

        if self.match_token(&[TokenType::LParen]) {
            self.skip_newlines();
            let had_indent = self.match_token(&[TokenType::Indent]);

            let expr = self.expression()?;

            self.skip_newlines();
            if had_indent {
                self.match_token(&[TokenType::Dedent]);
            }

            self.consume(TokenType::RParen, "')'")?;
            return Ok(expr);
        }

        if self.match_token(&[TokenType::Switch]) {
            return self.switch_expression();
        }

        // Array literal: [1, 2, 3]
        if self.match_token(&[TokenType::LBracket]) {
            let mut elements = vec![];

            self.skip_newlines();
            self.match_token(&[TokenType::Indent]);

            if !self.check(&TokenType::RBracket) {
                loop {
                    elements.push(self.expression()?);

                    self.skip_newlines();
                    if !self.match_token(&[TokenType::Comma]) {
                        break;
                    }
                    self.skip_newlines();
                    self.match_token(&[TokenType::Indent]);
                }
            }

            self.skip_newlines();
            self.match_token(&[TokenType::Dedent]);

            self.consume(TokenType::RBracket, "']'")?;
            return Ok(Expr::Array(elements));
        }

        Err(ParserError::UnexpectedToken(
            self.peek().typ.clone(),
            self.peek().line,
        ))
    }

    /// `switch [scrutinee]` followed by indented `pattern => result` lines.
    /// A bare `=> result` line is the default arm; without a scrutinee the
    /// cases form a condition ladder.
    fn switch_expression(&mut self) -> Result<Expr, ParserError> {
        let scrutinee = if self.check(&TokenType::Newline) || self.check(&TokenType::Indent) {
            None
        } else {
            Some(Box::new(self.expression()?))
        };

        self.match_token(&[TokenType::Newline]);
        let has_indent = self.match_token(&[TokenType::Indent]);

        let mut cases = vec![];
        let mut default = None;

        loop {
            self.skip_newlines();

            if self.check(&TokenType::Dedent) {
                if has_indent {
                    self.advance();
                }
                break;
            }
            if self.is_at_end() {
                break;
            }

            // Default arm: => result
            if self.match_token(&[TokenType::Arrow]) {
                self.skip_newlines();
                let result = self.expression()?;
                if default.is_none() {
                    default = Some(Box::new(result));
                }
                continue;
            }

            let saved_pos = self.current;
            match self.expression() {
                Ok(pattern) => {
                    if !self.match_token(&[TokenType::Arrow]) {
                        // Not a case, backtrack
                        self.current = saved_pos;
                        break;
                    }

                    self.skip_newlines();
                    let result = self.expression()?;
                    cases.push(SwitchCase { pattern, result });
                }
                Err(_) => {
                    self.current = saved_pos;
                    break;
                }
            }
        }

        Ok(Expr::Switch {
            scrutinee,
            cases,
            default,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pine_lexer::Lexer;

    fn parse_ok(input: &str) -> Vec<Stmt> {
        let (tokens, lex_errors) = Lexer::new(input).tokenize();
        assert!(lex_errors.is_empty(), "lexer errors: {:?}", lex_errors);
        let mut parser = Parser::new(tokens);
        let (stmts, errors) = parser.parse();
        assert!(errors.is_empty(), "parser errors: {:?}", errors);
        stmts
    }

    fn parse_expr(input: &str) -> Expr {
        let stmts = parse_ok(input);
        if let Some(Stmt::Expression(expr)) = stmts.first() {
            expr.clone()
        } else {
            panic!("Expected expression statement, got {:?}", stmts.first())
        }
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse_expr("42"), Expr::Literal(Literal::Number(42.0)));
        assert_eq!(
            parse_expr(r#""hello""#),
            Expr::Literal(Literal::String("hello".to_string()))
        );
        assert_eq!(parse_expr("true"), Expr::Literal(Literal::Bool(true)));
        assert_eq!(parse_expr("na"), Expr::Literal(Literal::Na));
        assert_eq!(
            parse_expr("#FF0000"),
            Expr::Literal(Literal::HexColor("#FF0000".to_string()))
        );
    }

    #[test]
    fn test_history_access() {
        let expr = parse_expr("close[1]");
        if let Expr::HistoryAccess { expr: base, offset } = expr {
            assert_eq!(*base, Expr::Variable("close".to_string()));
            assert_eq!(*offset, Expr::Literal(Literal::Number(1.0)));
        } else {
            panic!("Expected history access");
        }

        // Chained history access
        let expr = parse_expr("close[1][2]");
        assert!(matches!(expr, Expr::HistoryAccess { .. }));
    }

    #[test]
    fn test_dotted_call() {
        let expr = parse_expr("ta.sma(close, 14)");
        if let Expr::Call { callee, args, .. } = expr {
            assert_eq!(callee.dotted_name(), Some("ta.sma".to_string()));
            assert_eq!(args.len(), 2);
        } else {
            panic!("Expected call");
        }
    }

    #[test]
    fn test_named_arguments() {
        let expr = parse_expr(r#"plot(x, title="MA", color=color.blue)"#);
        if let Expr::Call { args, .. } = expr {
            assert_eq!(args.len(), 3);
            assert!(matches!(args[0], Argument::Positional(_)));
            assert!(matches!(&args[1], Argument::Named { name, .. } if name == "title"));
            assert!(matches!(&args[2], Argument::Named { name, .. } if name == "color"));
        } else {
            panic!("Expected call");
        }
    }

    #[test]
    fn test_generic_call() {
        let expr = parse_expr("array.new<float>(10, 0)");
        if let Expr::Call {
            callee,
            type_args,
            args,
        } = expr
        {
            assert_eq!(callee.dotted_name(), Some("array.new".to_string()));
            assert_eq!(type_args, vec!["float".to_string()]);
            assert_eq!(args.len(), 2);
        } else {
            panic!("Expected generic call");
        }

        // '<' without a generic call still parses as comparison
        let expr = parse_expr("a < b");
        assert!(matches!(expr, Expr::Binary { op: BinOp::Less, .. }));
    }

    #[test]
    fn test_precedence() {
        // 2 + 3 * 4 = 2 + (3 * 4)
        let expr = parse_expr("2 + 3 * 4");
        if let Expr::Binary { op, right, .. } = expr {
            assert_eq!(op, BinOp::Add);
            assert!(matches!(*right, Expr::Binary { op: BinOp::Mul, .. }));
        } else {
            panic!("Expected binary");
        }

        // Ternary binds loosest
        let expr = parse_expr("a > b ? 1 : 0");
        assert!(matches!(expr, Expr::Ternary { .. }));
    }

    #[test]
    fn test_word_and_symbol_logic_operators() {
        let expr = parse_expr("a and b or not c");
        assert!(matches!(expr, Expr::Binary { op: BinOp::Or, .. }));

        let expr = parse_expr("a && b || !c");
        assert!(matches!(expr, Expr::Binary { op: BinOp::Or, .. }));
    }

    #[test]
    fn test_var_declarations() {
        let stmts = parse_ok("var x = 10");
        assert!(matches!(
            &stmts[0],
            Stmt::VarDecl { name, kind: DeclKind::Var, .. } if name == "x"
        ));

        let stmts = parse_ok("varip y = 1");
        assert!(matches!(
            &stmts[0],
            Stmt::VarDecl { kind: DeclKind::Varip, .. }
        ));

        let stmts = parse_ok("z = close");
        assert!(matches!(
            &stmts[0],
            Stmt::VarDecl { kind: DeclKind::Bare, .. }
        ));

        let stmts = parse_ok("var float f = 0.0");
        if let Stmt::VarDecl {
            type_annotation, ..
        } = &stmts[0]
        {
            assert_eq!(type_annotation.as_deref(), Some("float"));
        } else {
            panic!("Expected var decl");
        }
    }

    #[test]
    fn test_reassignment() {
        let stmts = parse_ok("x := x + 5");
        if let Stmt::Assignment { target, value } = &stmts[0] {
            assert_eq!(*target, Expr::Variable("x".to_string()));
            assert!(matches!(value, Expr::Binary { op: BinOp::Add, .. }));
        } else {
            panic!("Expected assignment");
        }
    }

    #[test]
    fn test_compound_assignment_desugars() {
        let stmts = parse_ok("x += 5");
        if let Stmt::Assignment { value, .. } = &stmts[0] {
            assert!(matches!(value, Expr::Binary { op: BinOp::Add, .. }));
        } else {
            panic!("Expected assignment");
        }
    }

    #[test]
    fn test_tuple_destructuring() {
        let stmts = parse_ok("[a, b] = f()");
        if let Stmt::TupleAssignment { names, .. } = &stmts[0] {
            assert_eq!(names, &["a".to_string(), "b".to_string()]);
        } else {
            panic!("Expected tuple assignment");
        }

        // An array literal is not destructuring
        let stmts = parse_ok("x = [1, 2]");
        assert!(matches!(&stmts[0], Stmt::VarDecl { .. }));
    }

    #[test]
    fn test_import() {
        let stmts = parse_ok("import acme/MathLib/2 as m");
        if let Stmt::Import(info) = &stmts[0] {
            assert_eq!(info.publisher, "acme");
            assert_eq!(info.name, "MathLib");
            assert_eq!(info.version, "2");
            assert_eq!(info.alias.as_deref(), Some("m"));
        } else {
            panic!("Expected import");
        }

        let stmts = parse_ok("import acme/MathLib/2");
        if let Stmt::Import(info) = &stmts[0] {
            assert_eq!(info.alias, None);
        } else {
            panic!("Expected import");
        }
    }

    #[test]
    fn test_import_missing_slash_reports() {
        let (tokens, _) = Lexer::new("import acme MathLib 2").tokenize();
        let mut parser = Parser::new(tokens);
        let (_, errors) = parser.parse();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ParserError::ExpectedImportSlash(_))));
    }

    #[test]
    fn test_type_declaration() {
        let source = "type Point\n    float x\n    float y = 0\n    chart.point anchor\n";
        let stmts = parse_ok(source);
        if let Stmt::TypeDecl {
            name,
            fields,
            exported,
        } = &stmts[0]
        {
            assert_eq!(name, "Point");
            assert!(!exported);
            assert_eq!(fields.len(), 3);
            assert_eq!(fields[0].name, "x");
            assert_eq!(fields[1].default_value, Some(Expr::Literal(Literal::Number(0.0))));
            assert_eq!(fields[2].type_annotation, "chart.point");
        } else {
            panic!("Expected type declaration");
        }
    }

    #[test]
    fn test_export_type() {
        let stmts = parse_ok("export type Point\n    float x\n");
        assert!(matches!(&stmts[0], Stmt::TypeDecl { exported: true, .. }));
    }

    #[test]
    fn test_method_declaration() {
        let stmts = parse_ok("method dist(Point this, Point other) => this.x - other.x");
        if let Stmt::MethodDecl {
            name,
            bound_type,
            params,
            ..
        } = &stmts[0]
        {
            assert_eq!(name, "dist");
            assert_eq!(bound_type, "Point");
            assert_eq!(params.len(), 1);
            assert_eq!(params[0].name, "other");
        } else {
            panic!("Expected method declaration");
        }
    }

    #[test]
    fn test_function_declaration() {
        let source = "f(x, y = 2) =>\n    z = x + y\n    z * 2\n";
        let stmts = parse_ok(source);
        if let Stmt::FunctionDecl {
            name,
            params,
            body,
            exported,
        } = &stmts[0]
        {
            assert_eq!(name, "f");
            assert!(!exported);
            assert_eq!(params.len(), 2);
            assert!(params[1].default_value.is_some());
            assert_eq!(body.len(), 2);
        } else {
            panic!("Expected function declaration");
        }
    }

    #[test]
    fn test_for_variants() {
        let stmts = parse_ok("for i = 0 to 10\n    x = i\n");
        assert!(matches!(&stmts[0], Stmt::For { step: None, .. }));

        let stmts = parse_ok("for i = 0 to 10 by 2\n    x = i\n");
        assert!(matches!(&stmts[0], Stmt::For { step: Some(_), .. }));

        let stmts = parse_ok("for x in arr\n    y = x\n");
        assert!(matches!(&stmts[0], Stmt::ForIn { index_var: None, .. }));

        let stmts = parse_ok("for [i, x] in arr\n    y = x\n");
        assert!(matches!(&stmts[0], Stmt::ForIn { index_var: Some(_), .. }));
    }

    #[test]
    fn test_switch_with_scrutinee() {
        let source = "x = switch mode\n    \"a\" => 1\n    \"b\" => 2\n    => 0\n";
        let stmts = parse_ok(source);
        if let Stmt::VarDecl {
            initializer: Some(Expr::Switch {
                scrutinee,
                cases,
                default,
            }),
            ..
        } = &stmts[0]
        {
            assert!(scrutinee.is_some());
            assert_eq!(cases.len(), 2);
            assert!(default.is_some());
        } else {
            panic!("Expected switch initializer, got {:?}", stmts[0]);
        }
    }

    #[test]
    fn test_switch_condition_ladder() {
        let source = "x = switch\n    a > b => 1\n    a < b => 2\n    => 0\n";
        let stmts = parse_ok(source);
        if let Stmt::VarDecl {
            initializer: Some(Expr::Switch { scrutinee, .. }),
            ..
        } = &stmts[0]
        {
            assert!(scrutinee.is_none());
        } else {
            panic!("Expected switch initializer");
        }
    }

    #[test]
    fn test_if_else_chain() {
        let source = "if a\n    x = 1\nelse if b\n    x = 2\nelse\n    x = 3\n";
        let stmts = parse_ok(source);
        if let Stmt::If {
            else_if_branches,
            else_branch,
            ..
        } = &stmts[0]
        {
            assert_eq!(else_if_branches.len(), 1);
            assert!(else_branch.is_some());
        } else {
            panic!("Expected if statement");
        }
    }

    #[test]
    fn test_error_recovery_keeps_going() {
        let (tokens, _) = Lexer::new("x = )\ny = 2\n").tokenize();
        let mut parser = Parser::new(tokens);
        let (stmts, errors) = parser.parse();
        assert!(!errors.is_empty());
        assert!(stmts
            .iter()
            .any(|s| matches!(s, Stmt::VarDecl { name, .. } if name == "y")));
    }

    #[test]
    fn test_missing_to_reports() {
        let (tokens, _) = Lexer::new("for i = 0\n    x = i\n").tokenize();
        let mut parser = Parser::new(tokens);
        let (_, errors) = parser.parse();
        assert!(errors.iter().any(|e| matches!(
            e,
            ParserError::ExpectedToken { expected, .. } if expected.contains("'to'")
        )));
    }

    #[test]
    fn test_member_reassignment() {
        let stmts = parse_ok("p.x := 5");
        if let Stmt::Assignment { target, .. } = &stmts[0] {
            assert!(matches!(target, Expr::MemberAccess { .. }));
        } else {
            panic!("Expected assignment");
        }
    }

    #[test]
    fn test_multiline_ternary() {
        let source = "x = cond ?\n     a :\n     b\n";
        let stmts = parse_ok(source);
        assert!(matches!(
            &stmts[0],
            Stmt::VarDecl { initializer: Some(Expr::Ternary { .. }), .. }
        ));
    }

    #[test]
    fn test_indicator_call_statement() {
        let stmts = parse_ok(r#"indicator(title="MA", overlay=true)"#);
        assert!(matches!(&stmts[0], Stmt::Expression(Expr::Call { .. })));
    }
}
