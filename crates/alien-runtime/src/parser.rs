//! Parsing (tokens to AST)
//!
//! Recursive-descent parser with panic-mode recovery. After an error the
//! parser suppresses further diagnostics until it reaches a statement
//! boundary, so one mistake produces one message.

use crate::ast::{
    BinaryOp, ClassDecl, Expr, ForStmt, FuncDecl, IfStmt, LogicalOp, Program, ReturnStmt, Stmt,
    UnaryOp, VarDecl, WhileStmt,
};
use crate::diagnostic::Diagnostic;
use crate::token::{Token, TokenKind};

/// Parser state for building an AST from tokens
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    diagnostics: Vec<Diagnostic>,
    panic_mode: bool,
}

impl Parser {
    /// Create a new parser for the given tokens
    ///
    /// The token stream must end with an `Eof` token, as produced by
    /// [`crate::lexer::Lexer::tokenize`].
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            diagnostics: Vec::new(),
            panic_mode: false,
        }
    }

    /// Parse the token stream into a program plus any diagnostics
    pub fn parse(mut self) -> (Program, Vec<Diagnostic>) {
        let mut decls = Vec::new();
        while !self.check(&TokenKind::Eof) {
            if let Some(decl) = self.declaration() {
                decls.push(decl);
            }
        }
        (Program { decls }, self.diagnostics)
    }

    // ── Declarations ─────────────────────────────────────────────────────

    /// The top level holds only declarations
    fn declaration(&mut self) -> Option<Stmt> {
        let decl = if self.match_kind(&TokenKind::Class) {
            self.class_declaration()
        } else if self.match_kind(&TokenKind::Func) {
            self.func_declaration().map(Stmt::Func)
        } else if self.match_kind(&TokenKind::Var) {
            self.var_declaration().map(Stmt::Var)
        } else {
            self.error_at_current("Expect a class, function, or variable declaration.");
            self.advance();
            None
        };
        if self.panic_mode {
            self.synchronize();
        }
        decl
    }

    fn class_declaration(&mut self) -> Option<Stmt> {
        let (name, line) = self.consume_identifier("Expect class name.")?;
        self.consume(&TokenKind::LeftBrace, "Expect '{' after class name.");
        let mut methods = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.check(&TokenKind::Eof) {
            self.consume(&TokenKind::Func, "Expect 'func' before method declaration.");
            match self.func_declaration() {
                Some(method) => methods.push(method),
                None => break,
            }
        }
        self.consume(&TokenKind::RightBrace, "Expect '}' after class body.");
        Some(Stmt::Class(ClassDecl {
            name,
            line,
            methods,
        }))
    }

    /// Parse a function after the `func` keyword has been consumed
    fn func_declaration(&mut self) -> Option<FuncDecl> {
        let (name, line) = self.consume_identifier("Expect function name.")?;
        self.consume(&TokenKind::LeftParen, "Expect '(' after function name.");
        let mut params = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                if let Some((param, _)) = self.consume_identifier("Expect parameter name.") {
                    params.push(param);
                } else {
                    return None;
                }
                if !self.match_kind(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(&TokenKind::LeftBrace, "Expect '{' before function body.");
        let body = self.block();
        Some(FuncDecl {
            name,
            line,
            params,
            body,
        })
    }

    fn var_declaration(&mut self) -> Option<VarDecl> {
        let (name, line) = self.consume_identifier("Expect variable name.")?;
        let initializer = if self.match_kind(&TokenKind::Equal) {
            Some(self.expression())
        } else {
            None
        };
        self.consume(
            &TokenKind::Semicolon,
            "Expect ';' after variable declaration.",
        );
        Some(VarDecl {
            name,
            line,
            initializer,
        })
    }

    // ── Statements ───────────────────────────────────────────────────────

    fn statement(&mut self) -> Stmt {
        if self.match_kind(&TokenKind::If) {
            self.if_statement()
        } else if self.match_kind(&TokenKind::While) {
            self.while_statement()
        } else if self.match_kind(&TokenKind::For) {
            self.for_statement()
        } else if self.match_kind(&TokenKind::Print) {
            self.print_statement()
        } else if self.match_kind(&TokenKind::Return) {
            self.return_statement()
        } else if self.match_kind(&TokenKind::LeftBrace) {
            Stmt::Block(self.block())
        } else {
            self.expression_statement()
        }
    }

    /// Parse statements up to the closing brace; the brace itself is consumed
    fn block(&mut self) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.check(&TokenKind::Eof) {
            let before = self.current;
            if self.match_kind(&TokenKind::Var) {
                if let Some(decl) = self.var_declaration() {
                    stmts.push(Stmt::Var(decl));
                }
            } else {
                stmts.push(self.statement());
            }
            // guarantee progress on malformed input
            if self.current == before {
                self.advance();
            }
        }
        self.consume(&TokenKind::RightBrace, "Expect '}' after block.");
        stmts
    }

    fn if_statement(&mut self) -> Stmt {
        let line = self.previous().line;
        self.consume(&TokenKind::LeftParen, "Expect '(' after 'if'.");
        let condition = self.expression();
        self.consume(&TokenKind::RightParen, "Expect ')' after condition.");
        self.consume(&TokenKind::LeftBrace, "Expect '{' after ')'.");
        let then_branch = self.block();
        let else_branch = if self.match_kind(&TokenKind::Else) {
            self.consume(&TokenKind::LeftBrace, "Expect '{' after 'else'.");
            Some(self.block())
        } else {
            None
        };
        Stmt::If(IfStmt {
            line,
            condition,
            then_branch,
            else_branch,
        })
    }

    fn while_statement(&mut self) -> Stmt {
        let line = self.previous().line;
        self.consume(&TokenKind::LeftParen, "Expect '(' after 'while'.");
        let condition = self.expression();
        self.consume(&TokenKind::RightParen, "Expect ')' after condition.");
        self.consume(&TokenKind::LeftBrace, "Expect '{' after ')'.");
        let body = self.block();
        Stmt::While(WhileStmt {
            line,
            condition,
            body,
        })
    }

    fn for_statement(&mut self) -> Stmt {
        let line = self.previous().line;
        self.consume(&TokenKind::LeftParen, "Expect '(' after 'for'.");

        let initializer = if self.match_kind(&TokenKind::Semicolon) {
            None
        } else if self.match_kind(&TokenKind::Var) {
            self.var_declaration().map(|d| Box::new(Stmt::Var(d)))
        } else {
            Some(Box::new(self.expression_statement()))
        };

        let condition = if self.match_kind(&TokenKind::Semicolon) {
            None
        } else {
            let condition = self.expression();
            self.consume(&TokenKind::Semicolon, "Expect ';' after loop condition.");
            Some(condition)
        };

        let increment = if self.match_kind(&TokenKind::RightParen) {
            None
        } else {
            let increment = self.expression();
            self.consume(&TokenKind::RightParen, "Expect ')' after for clauses.");
            Some(increment)
        };

        self.consume(&TokenKind::LeftBrace, "Expect '{' after ')'.");
        let body = self.block();
        Stmt::For(ForStmt {
            line,
            initializer,
            condition,
            increment,
            body,
        })
    }

    fn print_statement(&mut self) -> Stmt {
        let expr = self.expression();
        self.consume(&TokenKind::Semicolon, "Expect ';' after print statement.");
        Stmt::Print(expr)
    }

    fn return_statement(&mut self) -> Stmt {
        let line = self.previous().line;
        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression())
        };
        self.consume(&TokenKind::Semicolon, "Expect ';' after return statement.");
        Stmt::Return(ReturnStmt { line, value })
    }

    fn expression_statement(&mut self) -> Stmt {
        let expr = self.expression();
        self.consume(&TokenKind::Semicolon, "Expect ';' after expression.");
        Stmt::Expr(expr)
    }

    // ── Expressions ──────────────────────────────────────────────────────

    fn expression(&mut self) -> Expr {
        self.assignment()
    }

    fn assignment(&mut self) -> Expr {
        let expr = self.or();
        if self.match_kind(&TokenKind::Equal) {
            let line = self.previous().line;
            let value = Box::new(self.assignment());
            return match expr {
                Expr::Variable { name } => Expr::Assign { name, line, value },
                Expr::Get { object, name } => Expr::Set {
                    object,
                    name,
                    value,
                },
                other => {
                    self.error(line, "Invalid assignment target.");
                    other
                }
            };
        }
        expr
    }

    fn or(&mut self) -> Expr {
        let mut expr = self.and();
        while self.match_kind(&TokenKind::Or) {
            let right = self.and();
            expr = Expr::Logical {
                left: Box::new(expr),
                op: LogicalOp::Or,
                right: Box::new(right),
            };
        }
        expr
    }

    fn and(&mut self) -> Expr {
        let mut expr = self.equality();
        while self.match_kind(&TokenKind::And) {
            let right = self.equality();
            expr = Expr::Logical {
                left: Box::new(expr),
                op: LogicalOp::And,
                right: Box::new(right),
            };
        }
        expr
    }

    fn equality(&mut self) -> Expr {
        let mut expr = self.comparison();
        loop {
            let op = if self.match_kind(&TokenKind::EqualEqual) {
                BinaryOp::Equal
            } else if self.match_kind(&TokenKind::BangEqual) {
                BinaryOp::NotEqual
            } else {
                break;
            };
            let right = self.comparison();
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        expr
    }

    fn comparison(&mut self) -> Expr {
        let mut expr = self.term();
        loop {
            let op = if self.match_kind(&TokenKind::Greater) {
                BinaryOp::Greater
            } else if self.match_kind(&TokenKind::GreaterEqual) {
                BinaryOp::GreaterEqual
            } else if self.match_kind(&TokenKind::Less) {
                BinaryOp::Less
            } else if self.match_kind(&TokenKind::LessEqual) {
                BinaryOp::LessEqual
            } else {
                break;
            };
            let right = self.term();
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        expr
    }

    fn term(&mut self) -> Expr {
        let mut expr = self.factor();
        loop {
            let op = if self.match_kind(&TokenKind::Plus) {
                BinaryOp::Add
            } else if self.match_kind(&TokenKind::Minus) {
                BinaryOp::Subtract
            } else {
                break;
            };
            let right = self.factor();
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        expr
    }

    fn factor(&mut self) -> Expr {
        let mut expr = self.unary();
        loop {
            let op = if self.match_kind(&TokenKind::Star) {
                BinaryOp::Multiply
            } else if self.match_kind(&TokenKind::Slash) {
                BinaryOp::Divide
            } else {
                break;
            };
            let right = self.unary();
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        expr
    }

    fn unary(&mut self) -> Expr {
        let op = if self.match_kind(&TokenKind::Bang) {
            UnaryOp::Not
        } else if self.match_kind(&TokenKind::Minus) {
            UnaryOp::Negate
        } else {
            return self.call();
        };
        let operand = Box::new(self.unary());
        Expr::Unary { op, operand }
    }

    fn call(&mut self) -> Expr {
        let mut expr = self.primary();
        loop {
            if self.match_kind(&TokenKind::LeftParen) {
                let line = self.previous().line;
                let mut args = Vec::new();
                if !self.check(&TokenKind::RightParen) {
                    loop {
                        args.push(self.expression());
                        if !self.match_kind(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.consume(&TokenKind::RightParen, "Expect ')' after arguments.");
                expr = Expr::Call {
                    callee: Box::new(expr),
                    line,
                    args,
                };
            } else if self.match_kind(&TokenKind::Dot) {
                match self.consume_identifier("Expect property name after '.'.") {
                    Some((name, _)) => {
                        expr = Expr::Get {
                            object: Box::new(expr),
                            name,
                        };
                    }
                    None => break,
                }
            } else {
                break;
            }
        }
        expr
    }

    fn primary(&mut self) -> Expr {
        let kind = self.peek().kind.clone();
        match kind {
            TokenKind::Nil => {
                self.advance();
                Expr::Nil
            }
            TokenKind::True => {
                self.advance();
                Expr::Bool(true)
            }
            TokenKind::False => {
                self.advance();
                Expr::Bool(false)
            }
            TokenKind::This => {
                self.advance();
                Expr::This
            }
            TokenKind::Number(value) => {
                self.advance();
                Expr::Number(value)
            }
            TokenKind::Str(value) => {
                self.advance();
                Expr::Str(value)
            }
            TokenKind::Ident(name) => {
                self.advance();
                Expr::Variable { name }
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.expression();
                self.consume(
                    &TokenKind::RightParen,
                    "Expect ')' after grouping expression.",
                );
                Expr::Grouping(Box::new(expr))
            }
            _ => {
                self.error_at_current("Expect expression.");
                Expr::Nil
            }
        }
    }

    // ── Token plumbing ───────────────────────────────────────────────────

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek().kind == *kind
    }

    fn advance(&mut self) {
        if !self.check(&TokenKind::Eof) {
            self.current += 1;
        }
    }

    fn match_kind(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: &TokenKind, message: &str) {
        if self.check(kind) {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    fn consume_identifier(&mut self, message: &str) -> Option<(String, u32)> {
        let token = self.peek();
        if let TokenKind::Ident(name) = &token.kind {
            let result = (name.clone(), token.line);
            self.advance();
            Some(result)
        } else {
            self.error_at_current(message);
            None
        }
    }

    // ── Error handling ───────────────────────────────────────────────────

    fn error(&mut self, line: u32, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.diagnostics.push(Diagnostic::error(message, line));
    }

    fn error_at_current(&mut self, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        let (line, message) = {
            let token = self.peek();
            let message = if token.kind == TokenKind::Eof {
                format!("at end: {message}")
            } else {
                format!("at '{}': {}", token.kind, message)
            };
            (token.line, message)
        };
        self.diagnostics.push(Diagnostic::error(message, line));
    }

    /// Skip forward to the next statement boundary after an error
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while !self.check(&TokenKind::Eof) {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            match self.peek().kind {
                TokenKind::Class
                | TokenKind::Func
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => self.advance(),
            }
        }
    }
}
