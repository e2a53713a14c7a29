//! tl script parser
//!
//! Recursive descent over the token stream; one statement per line or `;`.

use std::rc::Rc;

use super::ast::{BinOp, Expr, Stmt, StmtKind, UnaryOp};
use super::error::ScriptError;
use super::lexer::{tokenize, Token, TokenKind};

/// Deepest bracket, block and unary nesting the parser accepts
pub const MAX_NESTING: usize = 64;

/// Tallest syntax tree the parser builds; each link of an operator chain
/// adds a level on top of the nesting
pub const MAX_HEIGHT: usize = 512;

/// Parse a whole program; `origin` names the source in error messages
pub fn parse(
    source: &str,
    origin: &str,
) -> Result<Vec<Stmt>, ScriptError> {
    let tokens = tokenize(source).map_err(|e| ScriptError::Syntax {
        origin: origin.to_string(),
        line: e.line(),
        message: e.to_string(),
    })?;
    Parser {
        tokens,
        pos: 0,
        depth: 0,
        height: 0,
        origin,
    }
    .program()
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    height: usize,
    origin: &'a str,
}

type ParseResult<T> = Result<T, ScriptError>;

impl Parser<'_> {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn line(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].line
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        kind
    }

    fn check(
        &self,
        kind: &TokenKind,
    ) -> bool {
        self.peek() == kind
    }

    fn eat(
        &mut self,
        kind: &TokenKind,
    ) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error<T>(
        &self,
        message: impl Into<String>,
    ) -> ParseResult<T> {
        Err(ScriptError::Syntax {
            origin: self.origin.to_string(),
            line: self.line(),
            message: message.into(),
        })
    }

    fn expect(
        &mut self,
        kind: &TokenKind,
        what: &str,
    ) -> ParseResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            self.error(format!("expected {}, found {}", what, describe(self.peek())))
        }
    }

    /// One level deeper; fails past [`MAX_NESTING`]
    fn descend(&mut self) -> ParseResult<()> {
        if self.depth >= MAX_NESTING {
            return self.error("expression nested too deeply");
        }
        self.link()?;
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
        self.height -= 1;
    }

    /// One more operator in a chain; fails past [`MAX_HEIGHT`]
    fn link(&mut self) -> ParseResult<()> {
        if self.height >= MAX_HEIGHT {
            return self.error("expression too long");
        }
        self.height += 1;
        Ok(())
    }

    fn ident(&mut self) -> ParseResult<String> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => self.error(format!("expected identifier, found {}", describe(&other))),
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), TokenKind::Newline | TokenKind::Semicolon) {
            self.advance();
        }
    }

    fn program(mut self) -> ParseResult<Vec<Stmt>> {
        let stmts = self.statements(&TokenKind::Eof)?;
        Ok(stmts)
    }

    /// Statements up to (not including) `end`
    fn statements(
        &mut self,
        end: &TokenKind,
    ) -> ParseResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        self.skip_separators();
        while !self.check(end) {
            if self.check(&TokenKind::Eof) {
                return self.error(format!("expected {}, found end of input", describe(end)));
            }
            stmts.push(self.statement()?);
            if !matches!(
                self.peek(),
                TokenKind::Newline | TokenKind::Semicolon | TokenKind::Eof
            ) && !self.check(end)
            {
                return self.error(format!(
                    "expected end of statement, found {}",
                    describe(self.peek())
                ));
            }
            self.skip_separators();
        }
        Ok(stmts)
    }

    fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect(&TokenKind::LBrace, "'{'")?;
        self.descend()?;
        let stmts = self.statements(&TokenKind::RBrace)?;
        self.leave();
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(stmts)
    }

    fn params(&mut self) -> ParseResult<Vec<String>> {
        self.expect(&TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                params.push(self.ident()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        Ok(params)
    }

    fn statement(&mut self) -> ParseResult<Stmt> {
        let line = self.line();
        let kind = match self.peek() {
            TokenKind::Let => {
                self.advance();
                let name = self.ident()?;
                self.expect(&TokenKind::Assign, "'='")?;
                StmtKind::Let(name, self.expression()?)
            }
            TokenKind::Fn if self.named_fn_ahead() => {
                self.advance();
                let name = self.ident()?;
                let params = self.params()?;
                let body: Rc<[Stmt]> = self.block()?.into();
                StmtKind::FnDef { name, params, body }
            }
            TokenKind::Return => {
                self.advance();
                if matches!(
                    self.peek(),
                    TokenKind::Newline | TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
                ) {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.expression()?))
                }
            }
            TokenKind::If => return self.if_statement(),
            TokenKind::While => {
                self.advance();
                let cond = self.expression()?;
                StmtKind::While(cond, self.block()?)
            }
            _ => {
                let expr = self.expression()?;
                if self.eat(&TokenKind::Assign) {
                    match expr {
                        Expr::Ident(name) => StmtKind::Assign(name, self.expression()?),
                        _ => return self.error("invalid assignment target"),
                    }
                } else {
                    StmtKind::Expr(expr)
                }
            }
        };
        Ok(Stmt { kind, line })
    }

    /// `fn name(...)` rather than an anonymous `fn(...)`
    fn named_fn_ahead(&self) -> bool {
        matches!(
            self.tokens.get(self.pos + 1),
            Some(Token {
                kind: TokenKind::Ident(_),
                ..
            })
        )
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        let line = self.line();
        self.expect(&TokenKind::If, "'if'")?;
        let cond = self.expression()?;
        let then = self.block()?;

        // `else` may sit on the line after the closing brace
        let mark = self.pos;
        while self.check(&TokenKind::Newline) {
            self.advance();
        }
        let otherwise = if self.eat(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                vec![self.if_statement()?]
            } else {
                self.block()?
            }
        } else {
            self.pos = mark;
            Vec::new()
        };

        Ok(Stmt {
            kind: StmtKind::If {
                cond,
                then,
                otherwise,
            },
            line,
        })
    }

    fn expression(&mut self) -> ParseResult<Expr> {
        self.descend()?;
        let expr = self.or()?;
        self.leave();
        Ok(expr)
    }

    fn or(&mut self) -> ParseResult<Expr> {
        let base = (self.depth, self.height);
        let mut left = self.and()?;
        while self.eat(&TokenKind::Or) {
            self.link()?;
            let right = self.and()?;
            left = Expr::Binary(BinOp::Or, Box::new(left), Box::new(right));
        }
        (self.depth, self.height) = base;
        Ok(left)
    }

    fn and(&mut self) -> ParseResult<Expr> {
        let base = (self.depth, self.height);
        let mut left = self.comparison()?;
        while self.eat(&TokenKind::And) {
            self.link()?;
            let right = self.comparison()?;
            left = Expr::Binary(BinOp::And, Box::new(left), Box::new(right));
        }
        (self.depth, self.height) = base;
        Ok(left)
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let base = (self.depth, self.height);
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::NotEq => BinOp::Ne,
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Ge => BinOp::Ge,
                _ => {
                    (self.depth, self.height) = base;
                    return Ok(left);
                }
            };
            self.advance();
            self.link()?;
            let right = self.additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn additive(&mut self) -> ParseResult<Expr> {
        let base = (self.depth, self.height);
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => {
                    (self.depth, self.height) = base;
                    return Ok(left);
                }
            };
            self.advance();
            self.link()?;
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn multiplicative(&mut self) -> ParseResult<Expr> {
        let base = (self.depth, self.height);
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Rem,
                _ => {
                    (self.depth, self.height) = base;
                    return Ok(left);
                }
            };
            self.advance();
            self.link()?;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        let op = if self.eat(&TokenKind::Minus) {
            UnaryOp::Neg
        } else if self.eat(&TokenKind::Bang) {
            UnaryOp::Not
        } else {
            return self.postfix();
        };
        self.descend()?;
        let operand = self.unary()?;
        self.leave();
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn postfix(&mut self) -> ParseResult<Expr> {
        let base = (self.depth, self.height);
        let mut expr = self.primary()?;
        loop {
            if matches!(
                self.peek(),
                TokenKind::LParen | TokenKind::LBracket | TokenKind::Dot
            ) {
                self.link()?;
            }
            if self.eat(&TokenKind::LParen) {
                let args = self.list_items(&TokenKind::RParen)?;
                self.expect(&TokenKind::RParen, "')'")?;
                expr = Expr::Call(Box::new(expr), args);
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.expression()?;
                self.expect(&TokenKind::RBracket, "']'")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat(&TokenKind::Dot) {
                let name = self.ident()?;
                expr = Expr::Attr(Box::new(expr), name);
            } else {
                (self.depth, self.height) = base;
                return Ok(expr);
            }
        }
    }

    fn list_items(
        &mut self,
        close: &TokenKind,
    ) -> ParseResult<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.check(close) {
            items.push(self.expression()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(items)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        let expr = match self.advance() {
            TokenKind::Int(i) => Expr::Int(i),
            TokenKind::Str(s) => Expr::Str(Rc::from(s)),
            TokenKind::True => Expr::Bool(true),
            TokenKind::False => Expr::Bool(false),
            TokenKind::Nil => Expr::Nil,
            TokenKind::Ident(name) => Expr::Ident(name),
            TokenKind::LParen => {
                let inner = self.expression()?;
                self.expect(&TokenKind::RParen, "')'")?;
                inner
            }
            TokenKind::LBracket => {
                let items = self.list_items(&TokenKind::RBracket)?;
                self.expect(&TokenKind::RBracket, "']'")?;
                Expr::List(items)
            }
            TokenKind::Fn => {
                let params = self.params()?;
                let body: Rc<[Stmt]> = self.block()?.into();
                Expr::Lambda(params, body)
            }
            other => {
                return Err(ScriptError::Syntax {
                    origin: self.origin.to_string(),
                    line,
                    message: format!("unexpected {}", describe(&other)),
                });
            }
        };
        Ok(expr)
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Ident(name) => format!("identifier '{}'", name),
        TokenKind::Int(i) => format!("number {}", i),
        TokenKind::Str(_) => "string".to_string(),
        TokenKind::Newline => "end of line".to_string(),
        TokenKind::Eof => "end of input".to_string(),
        TokenKind::LBrace => "'{'".to_string(),
        TokenKind::RBrace => "'}'".to_string(),
        TokenKind::LParen => "'('".to_string(),
        TokenKind::RParen => "')'".to_string(),
        TokenKind::LBracket => "'['".to_string(),
        TokenKind::RBracket => "']'".to_string(),
        other => format!("{:?}", other).to_lowercase(),
    }
}
