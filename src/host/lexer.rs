//! tl script lexer

use std::iter::Peekable;
use std::str::Chars;

/// Lexer error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexError {
    #[error("unterminated string starting on line {line}")]
    UnterminatedString { line: usize },
    #[error("invalid escape sequence: \\{ch}")]
    InvalidEscape { ch: char, line: usize },
    #[error("invalid number literal: {text}")]
    InvalidNumber { text: String, line: usize },
    #[error("unexpected character: '{ch}'")]
    UnexpectedChar { ch: char, line: usize },
}

impl LexError {
    pub fn line(&self) -> usize {
        match self {
            LexError::UnterminatedString { line }
            | LexError::InvalidEscape { line, .. }
            | LexError::InvalidNumber { line, .. }
            | LexError::UnexpectedChar { line, .. } => *line,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Str(String),
    // keywords
    Let,
    Fn,
    Return,
    If,
    Else,
    While,
    True,
    False,
    Nil,
    And,
    Or,
    // punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Semicolon,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

/// Tokenize source code.
///
/// Newlines are significant as statement separators, except directly inside
/// parentheses and brackets.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let eof = token.kind == TokenKind::Eof;
        tokens.push(token);
        if eof {
            return Ok(tokens);
        }
    }
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    /// Open brackets; newlines only separate statements outside `(` and `[`
    nesting: Vec<char>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            nesting: Vec::new(),
        }
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c == Some('\n') {
            self.line += 1;
        }
        c
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn eat(
        &mut self,
        expected: char,
    ) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn token(
        &self,
        kind: TokenKind,
        line: usize,
    ) -> Token {
        Token { kind, line }
    }

    fn skip_blank(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' => {
                    self.advance();
                }
                '\n' if matches!(self.nesting.last(), Some('(' | '[')) => {
                    self.advance();
                }
                '#' => {
                    while matches!(self.peek(), Some(c) if c != '\n') {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_blank();
        let line = self.line;
        let Some(c) = self.advance() else {
            return Ok(self.token(TokenKind::Eof, line));
        };

        let kind = match c {
            '\n' => TokenKind::Newline,
            '(' => {
                self.nesting.push('(');
                TokenKind::LParen
            }
            ')' => {
                self.nesting.pop();
                TokenKind::RParen
            }
            '[' => {
                self.nesting.push('[');
                TokenKind::LBracket
            }
            ']' => {
                self.nesting.pop();
                TokenKind::RBracket
            }
            '{' => {
                self.nesting.push('{');
                TokenKind::LBrace
            }
            '}' => {
                self.nesting.pop();
                TokenKind::RBrace
            }
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            ';' => TokenKind::Semicolon,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '=' if self.eat('=') => TokenKind::EqEq,
            '=' => TokenKind::Assign,
            '!' if self.eat('=') => TokenKind::NotEq,
            '!' => TokenKind::Bang,
            '<' if self.eat('=') => TokenKind::Le,
            '<' => TokenKind::Lt,
            '>' if self.eat('=') => TokenKind::Ge,
            '>' => TokenKind::Gt,
            '"' => self.string(line)?,
            c if c.is_ascii_digit() => self.number(c, line)?,
            c if c == '_' || unicode_ident::is_xid_start(c) => self.ident(c),
            ch => return Err(LexError::UnexpectedChar { ch, line }),
        };
        Ok(self.token(kind, line))
    }

    fn string(
        &mut self,
        line: usize,
    ) -> Result<TokenKind, LexError> {
        let mut value = String::new();
        loop {
            match self.advance() {
                None => return Err(LexError::UnterminatedString { line }),
                Some('"') => return Ok(TokenKind::Str(value)),
                Some('\\') => {
                    let escaped = match self.advance() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('\\') => '\\',
                        Some('"') => '"',
                        Some('0') => '\0',
                        Some(ch) => {
                            return Err(LexError::InvalidEscape {
                                ch,
                                line: self.line,
                            })
                        }
                        None => return Err(LexError::UnterminatedString { line }),
                    };
                    value.push(escaped);
                }
                Some(c) => value.push(c),
            }
        }
    }

    fn number(
        &mut self,
        first: char,
        line: usize,
    ) -> Result<TokenKind, LexError> {
        let mut text = String::from(first);
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        text.replace('_', "")
            .parse()
            .map(TokenKind::Int)
            .map_err(|_| LexError::InvalidNumber { text, line })
    }

    fn ident(
        &mut self,
        first: char,
    ) -> TokenKind {
        let mut text = String::from(first);
        while let Some(c) = self.peek() {
            if unicode_ident::is_xid_continue(c) {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        match text.as_str() {
            "let" => TokenKind::Let,
            "fn" => TokenKind::Fn,
            "return" => TokenKind::Return,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "nil" => TokenKind::Nil,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            _ => TokenKind::Ident(text),
        }
    }
}
