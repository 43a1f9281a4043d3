//! Lexical analysis (tokenization)
//!
//! The lexer converts Alien source code into a stream of tokens carrying
//! line numbers. Whitespace is separative; there is no comment syntax.

use crate::diagnostic::Diagnostic;
use crate::token::{Token, TokenKind};

/// Lexer state for tokenizing source code
pub struct Lexer {
    /// Characters of source code
    chars: Vec<char>,
    /// Current position in chars
    current: usize,
    /// Start position of the token being scanned
    start: usize,
    /// Current line number (1-indexed)
    line: u32,
    /// Collected diagnostics
    diagnostics: Vec<Diagnostic>,
}

impl Lexer {
    /// Create a new lexer for the given source code
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            current: 0,
            start: 0,
            line: 1,
            diagnostics: Vec::new(),
        }
    }

    /// Tokenize the source code, returning tokens and any diagnostics
    ///
    /// The token stream always ends with a single `Eof` token.
    pub fn tokenize(mut self) -> (Vec<Token>, Vec<Diagnostic>) {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token() {
            tokens.push(token);
        }
        tokens.push(Token {
            kind: TokenKind::Eof,
            line: self.line,
        });
        (tokens, self.diagnostics)
    }

    /// Scan the next token, or `None` at end of input
    ///
    /// Lexical errors are recorded as diagnostics and scanning continues
    /// with the following character.
    fn next_token(&mut self) -> Option<Token> {
        loop {
            self.skip_whitespace();
            self.start = self.current;
            let c = self.advance()?;

            if is_name_start(c) {
                return Some(self.identifier());
            }
            if c.is_ascii_digit() {
                return Some(self.number());
            }

            let kind = match c {
                '+' => TokenKind::Plus,
                '-' => TokenKind::Minus,
                '*' => TokenKind::Star,
                '/' => TokenKind::Slash,
                '(' => TokenKind::LeftParen,
                ')' => TokenKind::RightParen,
                '{' => TokenKind::LeftBrace,
                '}' => TokenKind::RightBrace,
                ',' => TokenKind::Comma,
                ';' => TokenKind::Semicolon,
                '.' => TokenKind::Dot,
                '>' => {
                    if self.match_char('=') {
                        TokenKind::GreaterEqual
                    } else {
                        TokenKind::Greater
                    }
                }
                '<' => {
                    if self.match_char('=') {
                        TokenKind::LessEqual
                    } else {
                        TokenKind::Less
                    }
                }
                '!' => {
                    if self.match_char('=') {
                        TokenKind::BangEqual
                    } else {
                        TokenKind::Bang
                    }
                }
                '=' => {
                    if self.match_char('=') {
                        TokenKind::EqualEqual
                    } else {
                        TokenKind::Equal
                    }
                }
                '"' => match self.string() {
                    Some(kind) => kind,
                    None => continue,
                },
                other => {
                    self.diagnostics.push(Diagnostic::error(
                        format!("Unknown character '{other}'."),
                        self.line,
                    ));
                    continue;
                }
            };
            return Some(self.token(kind));
        }
    }

    fn token(&self, kind: TokenKind) -> Token {
        Token {
            kind,
            line: self.line,
        }
    }

    fn identifier(&mut self) -> Token {
        while self.peek().is_some_and(|c| is_name_start(c) || c.is_ascii_digit()) {
            self.current += 1;
        }
        let lexeme: String = self.chars[self.start..self.current].iter().collect();
        let kind = keyword(&lexeme).unwrap_or(TokenKind::Ident(lexeme));
        self.token(kind)
    }

    fn number(&mut self) -> Token {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.current += 1;
        }
        // A fractional part needs a digit after the dot, otherwise the dot
        // is a property access.
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.current += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.current += 1;
            }
        }
        let lexeme: String = self.chars[self.start..self.current].iter().collect();
        let value = lexeme
            .parse()
            .expect("lexer scanned an invalid number literal");
        self.token(TokenKind::Number(value))
    }

    /// Scan a string literal; the opening quote is already consumed
    fn string(&mut self) -> Option<TokenKind> {
        while let Some(c) = self.peek() {
            if c == '"' {
                break;
            }
            if c == '\n' {
                self.line += 1;
            }
            self.current += 1;
        }
        if self.peek().is_none() {
            self.diagnostics
                .push(Diagnostic::error("Unterminated string.", self.line));
            return None;
        }
        self.current += 1;
        let lexeme: String = self.chars[self.start + 1..self.current - 1].iter().collect();
        Some(TokenKind::Str(lexeme))
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\r' | '\t' => self.current += 1,
                '\n' => {
                    self.line += 1;
                    self.current += 1;
                }
                _ => return,
            }
        }
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.get(self.current).copied()?;
        self.current += 1;
        Some(c)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.current).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.current + 1).copied()
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.current += 1;
            true
        } else {
            false
        }
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn keyword(lexeme: &str) -> Option<TokenKind> {
    let kind = match lexeme {
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "func" => TokenKind::Func,
        "class" => TokenKind::Class,
        "var" => TokenKind::Var,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "nil" => TokenKind::Nil,
        "print" => TokenKind::Print,
        "return" => TokenKind::Return,
        "this" => TokenKind::This,
        "or" => TokenKind::Or,
        "and" => TokenKind::And,
        _ => return None,
    };
    Some(kind)
}
