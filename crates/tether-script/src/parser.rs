//! Recursive-descent parser.
//!
//! Binary operators are parsed by precedence climbing; everything else is a
//! plain descent. Nesting depth is bounded so hostile input fails with a
//! syntax error instead of exhausting the native stack.

use crate::ast::*;
use crate::error::ScriptError;
use crate::lexer::Lexer;
use crate::token::{Span, TemplatePart, Token};
use std::sync::Arc;

const MAX_NESTING: usize = 256;

/// Parse a complete program.
pub fn parse(source: &str) -> Result<Program, ScriptError> {
    let tokens = Lexer::new(source).tokenize().map_err(|errors| {
        let first = &errors[0];
        ScriptError::syntax(first.message(), first.span())
    })?;
    let mut parser = Parser::new(tokens);
    parser.parse_program()
}

pub struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    depth: usize,
    function_depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<(Token, Span)>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            function_depth: 0,
        }
    }

    pub fn parse_program(&mut self) -> Result<Program, ScriptError> {
        let mut body = Vec::new();
        while !self.at(&Token::Eof) {
            body.push(self.statement()?);
        }
        Ok(Program { body })
    }

    // ========================================================================
    // Token cursor
    // ========================================================================

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].0
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let index = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[index].0
    }

    fn span(&self) -> Span {
        self.tokens[self.pos.min(self.tokens.len() - 1)].1
    }

    fn previous_span(&self) -> Span {
        self.tokens[self.pos.saturating_sub(1)].1
    }

    fn at(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn advance(&mut self) -> (Token, Span) {
        let entry = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        entry
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.at(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<Span, ScriptError> {
        if self.at(token) {
            Ok(self.advance().1)
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> ScriptError {
        match self.peek() {
            Token::Eof => ScriptError::syntax("Unexpected end of input", self.span()),
            token => ScriptError::syntax(format!("Unexpected token '{}'", token), self.span()),
        }
    }

    fn identifier(&mut self) -> Result<(Arc<str>, Span), ScriptError> {
        match self.peek().clone() {
            Token::Identifier(name) => {
                let span = self.advance().1;
                Ok((Arc::from(name.as_str()), span))
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Identifier or keyword in property-name position
    fn property_name(&mut self) -> Result<Arc<str>, ScriptError> {
        let name = match self.peek() {
            Token::Identifier(name) => Arc::from(name.as_str()),
            Token::String(s) => Arc::from(s.as_str()),
            Token::Number(n) => Arc::from(crate::value::number_to_string(*n).as_str()),
            other => match other.keyword_text() {
                Some(keyword) => Arc::from(keyword),
                None => return Err(self.unexpected()),
            },
        };
        self.advance();
        Ok(name)
    }

    fn consume_semicolon(&mut self) {
        self.eat(&Token::Semicolon);
    }

    fn enter(&mut self) -> Result<(), ScriptError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(ScriptError::syntax("Nesting too deep", self.span()));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        self.enter()?;
        let result = self.statement_inner();
        self.leave();
        result
    }

    fn statement_inner(&mut self) -> Result<Stmt, ScriptError> {
        match self.peek() {
            Token::Let | Token::Const | Token::Var => {
                let stmt = self.declaration()?;
                self.consume_semicolon();
                Ok(stmt)
            }
            Token::Function if matches!(self.peek_at(1), Token::Identifier(_)) => {
                let start = self.advance().1;
                let (name, _) = self.identifier()?;
                let node = self.function_rest(Some(name), start)?;
                Ok(Stmt::Function(node))
            }
            Token::LeftBrace => Ok(Stmt::Block(self.block()?)),
            Token::If => self.if_statement(),
            Token::While => {
                self.advance();
                self.expect(&Token::LeftParen)?;
                let test = self.expression()?;
                self.expect(&Token::RightParen)?;
                let body = Box::new(self.statement()?);
                Ok(Stmt::While { test, body })
            }
            Token::For => self.for_statement(),
            Token::Return => {
                let span = self.advance().1;
                if self.function_depth == 0 {
                    return Err(ScriptError::syntax("Illegal return statement", span));
                }
                let value = if matches!(
                    self.peek(),
                    Token::Semicolon | Token::RightBrace | Token::Eof
                ) {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.consume_semicolon();
                Ok(Stmt::Return { value, span })
            }
            Token::Break => {
                let span = self.advance().1;
                self.consume_semicolon();
                Ok(Stmt::Break(span))
            }
            Token::Continue => {
                let span = self.advance().1;
                self.consume_semicolon();
                Ok(Stmt::Continue(span))
            }
            Token::Throw => {
                let span = self.advance().1;
                let value = self.expression()?;
                self.consume_semicolon();
                Ok(Stmt::Throw { value, span })
            }
            Token::Try => self.try_statement(),
            Token::Semicolon => {
                self.advance();
                Ok(Stmt::Empty)
            }
            _ => {
                let expr = self.expression()?;
                self.consume_semicolon();
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn declaration(&mut self) -> Result<Stmt, ScriptError> {
        let kind = match self.advance().0 {
            Token::Let => DeclKind::Let,
            Token::Const => DeclKind::Const,
            _ => DeclKind::Var,
        };
        let mut declarators = Vec::new();
        loop {
            let (name, span) = self.identifier()?;
            let init = if self.eat(&Token::Assign) {
                Some(self.assignment()?)
            } else {
                if kind == DeclKind::Const {
                    return Err(ScriptError::syntax(
                        "Missing initializer in const declaration",
                        span,
                    ));
                }
                None
            };
            declarators.push(Declarator { name, init, span });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(Stmt::Declaration { kind, declarators })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.expect(&Token::LeftBrace)?;
        let mut body = Vec::new();
        while !self.at(&Token::RightBrace) {
            if self.at(&Token::Eof) {
                return Err(self.unexpected());
            }
            body.push(self.statement()?);
        }
        self.advance();
        Ok(body)
    }

    fn if_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.advance();
        self.expect(&Token::LeftParen)?;
        let test = self.expression()?;
        self.expect(&Token::RightParen)?;
        let consequent = Box::new(self.statement()?);
        let alternate = if self.eat(&Token::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            consequent,
            alternate,
        })
    }

    fn for_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.advance();
        self.expect(&Token::LeftParen)?;
        let init = match self.peek() {
            Token::Semicolon => None,
            Token::Let | Token::Const | Token::Var => Some(Box::new(self.declaration()?)),
            _ => Some(Box::new(Stmt::Expr(self.expression()?))),
        };
        self.expect(&Token::Semicolon)?;
        let test = if self.at(&Token::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(&Token::Semicolon)?;
        let update = if self.at(&Token::RightParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(&Token::RightParen)?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    fn try_statement(&mut self) -> Result<Stmt, ScriptError> {
        let span = self.advance().1;
        let block = self.block()?;
        let mut param = None;
        let mut handler = None;
        if self.eat(&Token::Catch) {
            if self.eat(&Token::LeftParen) {
                param = Some(self.identifier()?.0);
                self.expect(&Token::RightParen)?;
            }
            handler = Some(self.block()?);
        }
        let finalizer = if self.eat(&Token::Finally) {
            Some(self.block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(ScriptError::syntax("Missing catch or finally after try", span));
        }
        Ok(Stmt::Try {
            block,
            param,
            handler,
            finalizer,
        })
    }

    /// Parameter list and body; the `function` keyword and name are consumed.
    fn function_rest(
        &mut self,
        name: Option<Arc<str>>,
        start: Span,
    ) -> Result<Arc<FunctionNode>, ScriptError> {
        let params = self.parameters()?;
        self.function_depth += 1;
        let body = self.block();
        self.function_depth -= 1;
        Ok(Arc::new(FunctionNode {
            name,
            params,
            body: FunctionBody::Block(body?),
            is_arrow: false,
            span: start.to(self.previous_span()),
        }))
    }

    fn parameters(&mut self) -> Result<Vec<Arc<str>>, ScriptError> {
        self.expect(&Token::LeftParen)?;
        let mut params = Vec::new();
        while !self.at(&Token::RightParen) {
            params.push(self.identifier()?.0);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RightParen)?;
        Ok(params)
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    pub fn expression(&mut self) -> Result<Expr, ScriptError> {
        self.enter()?;
        let result = self.assignment();
        self.leave();
        result
    }

    fn assignment(&mut self) -> Result<Expr, ScriptError> {
        if let Some(arrow) = self.try_arrow()? {
            return Ok(arrow);
        }
        let target = self.conditional()?;
        let op = match self.peek() {
            Token::Assign => AssignOp::Assign,
            Token::PlusAssign => AssignOp::Compound(BinaryOp::Add),
            Token::MinusAssign => AssignOp::Compound(BinaryOp::Sub),
            Token::StarAssign => AssignOp::Compound(BinaryOp::Mul),
            Token::SlashAssign => AssignOp::Compound(BinaryOp::Div),
            Token::PercentAssign => AssignOp::Compound(BinaryOp::Rem),
            _ => return Ok(target),
        };
        let op_span = self.advance().1;
        if !matches!(target, Expr::Ident(..) | Expr::Member { .. }) {
            return Err(ScriptError::syntax(
                "Invalid left-hand side in assignment",
                op_span,
            ));
        }
        self.enter()?;
        let value = self.assignment();
        self.leave();
        let value = value?;
        let span = target.span().to(value.span());
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
            span,
        })
    }

    /// Arrow function if one starts here: `x => ...` or `(a, b) => ...`.
    fn try_arrow(&mut self) -> Result<Option<Expr>, ScriptError> {
        let start = self.span();
        let params = match self.peek() {
            Token::Identifier(name) if self.peek_at(1) == &Token::Arrow => {
                let name: Arc<str> = Arc::from(name.as_str());
                self.advance();
                vec![name]
            }
            Token::LeftParen if self.parenthesized_arrow_ahead() => self.parameters()?,
            _ => return Ok(None),
        };
        self.expect(&Token::Arrow)?;
        self.function_depth += 1;
        let body = if self.at(&Token::LeftBrace) {
            self.block().map(FunctionBody::Block)
        } else {
            self.assignment().map(|e| FunctionBody::Expr(Box::new(e)))
        };
        self.function_depth -= 1;
        Ok(Some(Expr::Function(Arc::new(FunctionNode {
            name: None,
            params,
            body: body?,
            is_arrow: true,
            span: start.to(self.previous_span()),
        }))))
    }

    fn parenthesized_arrow_ahead(&self) -> bool {
        let mut depth = 0usize;
        let mut index = self.pos;
        while index < self.tokens.len() {
            match self.tokens[index].0 {
                Token::LeftParen => depth += 1,
                Token::RightParen => {
                    depth -= 1;
                    if depth == 0 {
                        return matches!(self.tokens.get(index + 1), Some((Token::Arrow, _)));
                    }
                }
                Token::Eof => return false,
                _ => {}
            }
            index += 1;
        }
        false
    }

    fn conditional(&mut self) -> Result<Expr, ScriptError> {
        let test = self.binary(0)?;
        if !self.eat(&Token::Question) {
            return Ok(test);
        }
        let consequent = self.assignment()?;
        self.expect(&Token::Colon)?;
        let alternate = self.assignment()?;
        let span = test.span().to(alternate.span());
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
            span,
        })
    }

    fn binary(&mut self, min_precedence: u8) -> Result<Expr, ScriptError> {
        let mut left = self.unary()?;
        loop {
            let Some((precedence, kind)) = binary_operator(self.peek()) else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            self.advance();
            self.enter()?;
            let right = self.binary(precedence + 1);
            self.leave();
            let right = right?;
            let span = left.span().to(right.span());
            left = match kind {
                OperatorKind::Binary(op) => Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                    span,
                },
                OperatorKind::Logical(op) => Expr::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                    span,
                },
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        let start = self.span();
        let op = match self.peek() {
            Token::Bang => UnaryOp::Not,
            Token::Minus => UnaryOp::Negate,
            Token::Plus => UnaryOp::Plus,
            Token::Typeof => UnaryOp::Typeof,
            Token::PlusPlus | Token::MinusMinus => {
                let increment = self.advance().0 == Token::PlusPlus;
                let target = self.unary()?;
                if !matches!(target, Expr::Ident(..) | Expr::Member { .. }) {
                    return Err(ScriptError::syntax(
                        "Invalid left-hand side expression in prefix operation",
                        start,
                    ));
                }
                let span = start.to(target.span());
                return Ok(Expr::Update {
                    increment,
                    prefix: true,
                    target: Box::new(target),
                    span,
                });
            }
            _ => return self.postfix(),
        };
        self.advance();
        self.enter()?;
        let operand = self.unary();
        self.leave();
        let operand = operand?;
        let span = start.to(operand.span());
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
            span,
        })
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let expr = self.call_member()?;
        match self.peek() {
            Token::PlusPlus | Token::MinusMinus => {
                if !matches!(expr, Expr::Ident(..) | Expr::Member { .. }) {
                    return Err(ScriptError::syntax(
                        "Invalid left-hand side expression in postfix operation",
                        self.span(),
                    ));
                }
                let (token, end) = self.advance();
                let span = expr.span().to(end);
                Ok(Expr::Update {
                    increment: token == Token::PlusPlus,
                    prefix: false,
                    target: Box::new(expr),
                    span,
                })
            }
            _ => Ok(expr),
        }
    }

    fn call_member(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = if self.at(&Token::New) {
            self.new_expression()?
        } else {
            self.primary()?
        };
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let name = self.property_name()?;
                    let span = expr.span().to(self.previous_span());
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property: PropertyKey::Named(name),
                        span,
                    };
                }
                Token::LeftBracket => {
                    self.advance();
                    let index = self.expression()?;
                    let end = self.expect(&Token::RightBracket)?;
                    let span = expr.span().to(end);
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property: PropertyKey::Computed(Box::new(index)),
                        span,
                    };
                }
                Token::LeftParen => {
                    let args = self.arguments()?;
                    let span = expr.span().to(self.previous_span());
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        span,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn new_expression(&mut self) -> Result<Expr, ScriptError> {
        let start = self.advance().1;
        let mut callee = if self.at(&Token::New) {
            self.new_expression()?
        } else {
            self.primary()?
        };
        // Member accesses bind tighter than `new`; the first call's
        // arguments belong to the construction.
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let name = self.property_name()?;
                    let span = callee.span().to(self.previous_span());
                    callee = Expr::Member {
                        object: Box::new(callee),
                        property: PropertyKey::Named(name),
                        span,
                    };
                }
                Token::LeftBracket => {
                    self.advance();
                    let index = self.expression()?;
                    let end = self.expect(&Token::RightBracket)?;
                    let span = callee.span().to(end);
                    callee = Expr::Member {
                        object: Box::new(callee),
                        property: PropertyKey::Computed(Box::new(index)),
                        span,
                    };
                }
                _ => break,
            }
        }
        let args = if self.at(&Token::LeftParen) {
            self.arguments()?
        } else {
            Vec::new()
        };
        Ok(Expr::New {
            callee: Box::new(callee),
            args,
            span: start.to(self.previous_span()),
        })
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ScriptError> {
        self.expect(&Token::LeftParen)?;
        let mut args = Vec::new();
        while !self.at(&Token::RightParen) {
            args.push(self.expression()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RightParen)?;
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let (token, span) = self.advance();
        match token {
            Token::Number(n) => Ok(Expr::Number(n, span)),
            Token::String(s) => Ok(Expr::String(Arc::from(s.as_str()), span)),
            Token::True => Ok(Expr::Bool(true, span)),
            Token::False => Ok(Expr::Bool(false, span)),
            Token::Null => Ok(Expr::Null(span)),
            Token::This => Ok(Expr::This(span)),
            Token::Identifier(name) if name == "undefined" => Ok(Expr::Undefined(span)),
            Token::Identifier(name) => Ok(Expr::Ident(Arc::from(name.as_str()), span)),
            Token::Template(parts) => self.template(parts, span),
            Token::LeftParen => {
                let expr = self.expression()?;
                self.expect(&Token::RightParen)?;
                Ok(expr)
            }
            Token::LeftBracket => {
                let mut items = Vec::new();
                while !self.at(&Token::RightBracket) {
                    items.push(self.expression()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                let end = self.expect(&Token::RightBracket)?;
                Ok(Expr::Array(items, span.to(end)))
            }
            Token::LeftBrace => self.object_literal(span),
            Token::Function => {
                let name = match self.peek() {
                    Token::Identifier(_) => Some(self.identifier()?.0),
                    _ => None,
                };
                Ok(Expr::Function(self.function_rest(name, span)?))
            }
            Token::Eof => Err(ScriptError::syntax("Unexpected end of input", span)),
            other => Err(ScriptError::syntax(
                format!("Unexpected token '{}'", other),
                span,
            )),
        }
    }

    fn object_literal(&mut self, start: Span) -> Result<Expr, ScriptError> {
        let mut properties = Vec::new();
        while !self.at(&Token::RightBrace) {
            let key_span = self.span();
            let shorthand = matches!(self.peek(), Token::Identifier(_));
            let key = self.property_name()?;
            let value = match self.peek() {
                Token::Colon => {
                    self.advance();
                    self.expression()?
                }
                Token::LeftParen => {
                    Expr::Function(self.function_rest(Some(key.clone()), key_span)?)
                }
                _ if shorthand => Expr::Ident(key.clone(), key_span),
                _ => return Err(self.unexpected()),
            };
            properties.push((key, value));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        let end = self.expect(&Token::RightBrace)?;
        Ok(Expr::Object(properties, start.to(end)))
    }

    fn template(&mut self, parts: Vec<TemplatePart>, span: Span) -> Result<Expr, ScriptError> {
        let mut segments = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                TemplatePart::Text(text) => {
                    segments.push(TemplateSegment::Text(Arc::from(text.as_str())))
                }
                TemplatePart::Expression(tokens) => {
                    let mut inner = Parser::new(tokens);
                    inner.depth = self.depth;
                    inner.function_depth = self.function_depth;
                    let expr = inner.expression()?;
                    if !inner.at(&Token::Eof) {
                        return Err(inner.unexpected());
                    }
                    segments.push(TemplateSegment::Expr(expr));
                }
            }
        }
        Ok(Expr::Template(segments, span))
    }
}

enum OperatorKind {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

fn binary_operator(token: &Token) -> Option<(u8, OperatorKind)> {
    use OperatorKind::*;
    Some(match token {
        Token::QuestionQuestion => (1, Logical(LogicalOp::Coalesce)),
        Token::PipePipe => (2, Logical(LogicalOp::Or)),
        Token::AmpAmp => (3, Logical(LogicalOp::And)),
        Token::Equal => (4, Binary(BinaryOp::Equal)),
        Token::NotEqual => (4, Binary(BinaryOp::NotEqual)),
        Token::StrictEqual => (4, Binary(BinaryOp::StrictEqual)),
        Token::StrictNotEqual => (4, Binary(BinaryOp::StrictNotEqual)),
        Token::Less => (5, Binary(BinaryOp::Less)),
        Token::LessEqual => (5, Binary(BinaryOp::LessEqual)),
        Token::Greater => (5, Binary(BinaryOp::Greater)),
        Token::GreaterEqual => (5, Binary(BinaryOp::GreaterEqual)),
        Token::Plus => (6, Binary(BinaryOp::Add)),
        Token::Minus => (6, Binary(BinaryOp::Sub)),
        Token::Star => (7, Binary(BinaryOp::Mul)),
        Token::Slash => (7, Binary(BinaryOp::Div)),
        Token::Percent => (7, Binary(BinaryOp::Rem)),
        _ => return None,
    })
}
