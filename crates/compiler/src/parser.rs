//! Lexer and recursive-descent parser for Mini-C
//!
//! Grammar summary:
//! ```text
//! program     := (struct-decl | var-decl | func-decl)*
//! struct-decl := "struct" IDENT "{" var-decl* "}" ";"
//! func-decl   := type declarator "(" params ")" (block | ";")
//! stmt        := block | if | while | for | switch | return | break
//!              | continue | "input" IDENT ";" | "output" expr ";"
//!              | "case" INT ":" | "default" ":" | var-decl | expr ";"
//! ```
//! Expression precedence, loosest first: assignment, equality, relational,
//! additive, multiplicative, unary (`-` `*` `&`), postfix (call), primary.
//!
//! String literals keep their escape sequences undecoded; the assembly
//! emitter expands them when laying out the static section.

use crate::ast::{Decl, Expr, FuncDecl, Param, Program, Stmt, StructDecl, VarDecl};
use crate::tac::TacOp;
use crate::types::{DataType, Type};

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Ident(String),
    Int(i32),
    CharLit(char),
    Str(String),
    KwInt,
    KwChar,
    KwVoid,
    KwStruct,
    KwIf,
    KwElse,
    KwWhile,
    KwFor,
    KwReturn,
    KwBreak,
    KwContinue,
    KwInput,
    KwOutput,
    KwSwitch,
    KwCase,
    KwDefault,
    Plus,
    Minus,
    Star,
    Slash,
    Amp,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Dot,
    Arrow,
    Colon,
}

/// A token with the 1-based source line it started on.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: Tok,
    pub line: usize,
}

fn keyword(word: &str) -> Option<Tok> {
    Some(match word {
        "int" => Tok::KwInt,
        "char" => Tok::KwChar,
        "void" => Tok::KwVoid,
        "struct" => Tok::KwStruct,
        "if" => Tok::KwIf,
        "else" => Tok::KwElse,
        "while" => Tok::KwWhile,
        "for" => Tok::KwFor,
        "return" => Tok::KwReturn,
        "break" => Tok::KwBreak,
        "continue" => Tok::KwContinue,
        "input" => Tok::KwInput,
        "output" => Tok::KwOutput,
        "switch" => Tok::KwSwitch,
        "case" => Tok::KwCase,
        "default" => Tok::KwDefault,
        _ => return None,
    })
}

fn decode_escape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        other => other,
    }
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line = 1usize;

    macro_rules! push {
        ($kind:expr) => {
            tokens.push(Token { kind: $kind, line })
        };
    }

    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '/' => {
                chars.next();
                match chars.peek() {
                    Some('/') => {
                        while let Some(&c) = chars.peek() {
                            if c == '\n' {
                                break;
                            }
                            chars.next();
                        }
                    }
                    Some('*') => {
                        chars.next();
                        let mut closed = false;
                        while let Some(c) = chars.next() {
                            if c == '\n' {
                                line += 1;
                            }
                            if c == '*' && chars.peek() == Some(&'/') {
                                chars.next();
                                closed = true;
                                break;
                            }
                        }
                        if !closed {
                            return Err(format!("line {}: unterminated block comment", line));
                        }
                    }
                    _ => push!(Tok::Slash),
                }
            }
            c if c.is_ascii_digit() => {
                let mut value: i64 = 0;
                while let Some(&d) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    value = value * 10 + (d as i64 - '0' as i64);
                    if value > i32::MAX as i64 {
                        return Err(format!("line {}: integer literal too large", line));
                    }
                    chars.next();
                }
                push!(Tok::Int(value as i32));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if !ch.is_ascii_alphanumeric() && ch != '_' {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                match keyword(&word) {
                    Some(kw) => push!(kw),
                    None => push!(Tok::Ident(word)),
                }
            }
            '\'' => {
                chars.next();
                let c = match chars.next() {
                    Some('\\') => {
                        let esc = chars
                            .next()
                            .ok_or_else(|| format!("line {}: unterminated character literal", line))?;
                        decode_escape(esc)
                    }
                    Some(c) if c != '\'' => c,
                    _ => return Err(format!("line {}: empty character literal", line)),
                };
                if chars.next() != Some('\'') {
                    return Err(format!("line {}: unterminated character literal", line));
                }
                push!(Tok::CharLit(c));
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\n' => return Err(format!("line {}: unterminated string literal", line)),
                        '\\' => {
                            // Keep escapes raw; the backend decodes them.
                            text.push('\\');
                            match chars.next() {
                                Some(e) => text.push(e),
                                None => break,
                            }
                        }
                        c => text.push(c),
                    }
                }
                if !closed {
                    return Err(format!("line {}: unterminated string literal", line));
                }
                push!(Tok::Str(text));
            }
            _ => {
                chars.next();
                let kind = match c {
                    '+' => Tok::Plus,
                    '-' => {
                        if chars.peek() == Some(&'>') {
                            chars.next();
                            Tok::Arrow
                        } else {
                            Tok::Minus
                        }
                    }
                    '*' => Tok::Star,
                    '&' => Tok::Amp,
                    '=' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            Tok::EqEq
                        } else {
                            Tok::Assign
                        }
                    }
                    '!' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            Tok::NotEq
                        } else {
                            return Err(format!("line {}: unexpected character '!'", line));
                        }
                    }
                    '<' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            Tok::Le
                        } else {
                            Tok::Lt
                        }
                    }
                    '>' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            Tok::Ge
                        } else {
                            Tok::Gt
                        }
                    }
                    '(' => Tok::LParen,
                    ')' => Tok::RParen,
                    '{' => Tok::LBrace,
                    '}' => Tok::RBrace,
                    '[' => Tok::LBracket,
                    ']' => Tok::RBracket,
                    ';' => Tok::Semi,
                    ',' => Tok::Comma,
                    '.' => Tok::Dot,
                    ':' => Tok::Colon,
                    other => {
                        return Err(format!("line {}: unexpected character '{}'", line, other));
                    }
                };
                push!(kind);
            }
        }
    }

    Ok(tokens)
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(source: &str) -> Result<Parser, String> {
        Ok(Parser {
            tokens: tokenize(source)?,
            pos: 0,
        })
    }

    pub fn parse(&mut self) -> Result<Program, String> {
        let mut program = Program::new();
        while !self.is_at_end() {
            program.decls.push(self.parse_top_decl()?);
        }
        Ok(program)
    }

    // ---- token plumbing ----

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&Tok> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map(|t| t.line)
            .unwrap_or(0)
    }

    fn err(&self, msg: impl Into<String>) -> String {
        format!("line {}: {}", self.line(), msg.into())
    }

    fn advance(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).map(|t| t.kind.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &Tok) -> bool {
        self.peek() == Some(kind)
    }

    fn eat(&mut self, kind: &Tok) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &Tok, what: &str) -> Result<(), String> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.err(format!("expected {}", what)))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, String> {
        if let Some(Tok::Ident(_)) = self.peek() {
            if let Some(Tok::Ident(name)) = self.advance() {
                return Ok(name);
            }
        }
        Err(self.err(format!("expected {}", what)))
    }

    fn starts_type(&self) -> bool {
        matches!(
            self.peek(),
            Some(Tok::KwInt | Tok::KwChar | Tok::KwVoid | Tok::KwStruct)
        )
    }

    // ---- declarations ----

    fn parse_top_decl(&mut self) -> Result<Decl, String> {
        // `struct Name { ... };` defines a type; `struct Name x;` declares a
        // variable of that type.
        if self.check(&Tok::KwStruct)
            && matches!(self.peek_at(1), Some(Tok::Ident(_)))
            && self.peek_at(2) == Some(&Tok::LBrace)
        {
            return Ok(Decl::Struct(self.parse_struct_decl()?));
        }

        let base = self.parse_base_type()?;
        let (ty, name) = self.parse_declarator(base)?;
        if self.check(&Tok::LParen) {
            Ok(Decl::Func(self.parse_func_decl(ty, name)?))
        } else {
            Ok(Decl::Var(self.finish_var_decl(ty, name)?))
        }
    }

    fn parse_struct_decl(&mut self) -> Result<StructDecl, String> {
        self.expect(&Tok::KwStruct, "'struct'")?;
        let name = self.expect_ident("struct name")?;
        self.expect(&Tok::LBrace, "'{'")?;
        let mut fields = Vec::new();
        while !self.check(&Tok::RBrace) {
            if self.is_at_end() {
                return Err(self.err("unterminated struct declaration"));
            }
            let base = self.parse_base_type()?;
            let (ty, field_name) = self.parse_declarator(base)?;
            self.expect(&Tok::Semi, "';' after struct field")?;
            fields.push(VarDecl {
                ty,
                name: field_name,
                init: None,
            });
        }
        self.expect(&Tok::RBrace, "'}'")?;
        self.expect(&Tok::Semi, "';' after struct declaration")?;
        Ok(StructDecl { name, fields })
    }

    fn parse_base_type(&mut self) -> Result<Type, String> {
        match self.advance() {
            Some(Tok::KwInt) => Ok(Type::basic(DataType::Int)),
            Some(Tok::KwChar) => Ok(Type::basic(DataType::Char)),
            Some(Tok::KwVoid) => Ok(Type::basic(DataType::Void)),
            Some(Tok::KwStruct) => {
                let name = self.expect_ident("struct name")?;
                Ok(Type::Struct(name))
            }
            _ => Err(self.err("expected a type")),
        }
    }

    /// Pointer stars, a name, then optional array dimensions.
    fn parse_declarator(&mut self, base: Type) -> Result<(Type, String), String> {
        let mut ty = base;
        while self.eat(&Tok::Star) {
            ty = Type::pointer(ty);
        }
        let name = self.expect_ident("a name")?;
        let mut dims = Vec::new();
        while self.eat(&Tok::LBracket) {
            let size = match self.advance() {
                Some(Tok::Int(n)) => n,
                _ => return Err(self.err("expected array size")),
            };
            self.expect(&Tok::RBracket, "']'")?;
            dims.push(size);
        }
        for size in dims.into_iter().rev() {
            ty = Type::array(ty, size);
        }
        Ok((ty, name))
    }

    fn finish_var_decl(&mut self, ty: Type, name: String) -> Result<VarDecl, String> {
        let init = if self.eat(&Tok::Assign) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(&Tok::Semi, "';' after declaration")?;
        Ok(VarDecl { ty, name, init })
    }

    fn parse_func_decl(&mut self, ret: Type, name: String) -> Result<FuncDecl, String> {
        self.expect(&Tok::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.check(&Tok::RParen) {
            // `f(void)` declares no parameters.
            if self.check(&Tok::KwVoid) && self.peek_at(1) == Some(&Tok::RParen) {
                self.advance();
            } else {
                loop {
                    let base = self.parse_base_type()?;
                    let (ty, param_name) = self.parse_declarator(base)?;
                    params.push(Param {
                        ty,
                        name: param_name,
                    });
                    if !self.eat(&Tok::Comma) {
                        break;
                    }
                }
            }
        }
        self.expect(&Tok::RParen, "')'")?;

        let body = if self.eat(&Tok::Semi) {
            None
        } else {
            Some(self.parse_block()?)
        };
        Ok(FuncDecl {
            ret,
            name,
            params,
            body,
        })
    }

    // ---- statements ----

    fn parse_block(&mut self) -> Result<Vec<Stmt>, String> {
        self.expect(&Tok::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.check(&Tok::RBrace) {
            if self.is_at_end() {
                return Err(self.err("unterminated block"));
            }
            stmts.push(self.parse_stmt()?);
        }
        self.expect(&Tok::RBrace, "'}'")?;
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, String> {
        match self.peek() {
            Some(Tok::LBrace) => Ok(Stmt::Block(self.parse_block()?)),
            Some(Tok::KwIf) => self.parse_if(),
            Some(Tok::KwWhile) => self.parse_while(),
            Some(Tok::KwFor) => self.parse_for(),
            Some(Tok::KwSwitch) => self.parse_switch(),
            Some(Tok::KwReturn) => {
                self.advance();
                let value = if self.check(&Tok::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(&Tok::Semi, "';' after return")?;
                Ok(Stmt::Return(value))
            }
            Some(Tok::KwBreak) => {
                self.advance();
                self.expect(&Tok::Semi, "';' after break")?;
                Ok(Stmt::Break)
            }
            Some(Tok::KwContinue) => {
                self.advance();
                self.expect(&Tok::Semi, "';' after continue")?;
                Ok(Stmt::Continue)
            }
            Some(Tok::KwInput) => {
                self.advance();
                let name = self.expect_ident("a variable name after 'input'")?;
                self.expect(&Tok::Semi, "';' after input")?;
                Ok(Stmt::Input(name))
            }
            Some(Tok::KwOutput) => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&Tok::Semi, "';' after output")?;
                Ok(Stmt::Output(expr))
            }
            Some(Tok::KwCase) => {
                self.advance();
                let negative = self.eat(&Tok::Minus);
                let value = match self.advance() {
                    Some(Tok::Int(n)) => {
                        if negative {
                            -n
                        } else {
                            n
                        }
                    }
                    _ => return Err(self.err("expected integer after 'case'")),
                };
                self.expect(&Tok::Colon, "':' after case value")?;
                Ok(Stmt::Case(value))
            }
            Some(Tok::KwDefault) => {
                self.advance();
                self.expect(&Tok::Colon, "':' after default")?;
                Ok(Stmt::Default)
            }
            _ if self.starts_type() => {
                let base = self.parse_base_type()?;
                let (ty, name) = self.parse_declarator(base)?;
                Ok(Stmt::VarDecl(self.finish_var_decl(ty, name)?))
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect(&Tok::Semi, "';' after expression")?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_if(&mut self) -> Result<Stmt, String> {
        self.expect(&Tok::KwIf, "'if'")?;
        self.expect(&Tok::LParen, "'(' after if")?;
        let cond = self.parse_expr()?;
        self.expect(&Tok::RParen, "')'")?;
        let then_branch = Box::new(self.parse_stmt()?);
        let else_branch = if self.eat(&Tok::KwElse) {
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, String> {
        self.expect(&Tok::KwWhile, "'while'")?;
        self.expect(&Tok::LParen, "'(' after while")?;
        let cond = self.parse_expr()?;
        self.expect(&Tok::RParen, "')'")?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::While { cond, body })
    }

    fn parse_for(&mut self) -> Result<Stmt, String> {
        self.expect(&Tok::KwFor, "'for'")?;
        self.expect(&Tok::LParen, "'(' after for")?;

        let init = if self.eat(&Tok::Semi) {
            None
        } else if self.starts_type() {
            let base = self.parse_base_type()?;
            let (ty, name) = self.parse_declarator(base)?;
            Some(Box::new(Stmt::VarDecl(self.finish_var_decl(ty, name)?)))
        } else {
            let expr = self.parse_expr()?;
            self.expect(&Tok::Semi, "';' after for initializer")?;
            Some(Box::new(Stmt::Expr(expr)))
        };

        let cond = if self.check(&Tok::Semi) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&Tok::Semi, "';' after for condition")?;

        let update = if self.check(&Tok::RParen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&Tok::RParen, "')'")?;

        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::For {
            init,
            cond,
            update,
            body,
        })
    }

    fn parse_switch(&mut self) -> Result<Stmt, String> {
        self.expect(&Tok::KwSwitch, "'switch'")?;
        self.expect(&Tok::LParen, "'(' after switch")?;
        let cond = self.parse_expr()?;
        self.expect(&Tok::RParen, "')'")?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::Switch { cond, body })
    }

    // ---- expressions ----

    pub fn parse_expr(&mut self) -> Result<Expr, String> {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> Result<Expr, String> {
        let target = self.parse_equality()?;
        if self.eat(&Tok::Assign) {
            if !matches!(
                target,
                Expr::Ident(_) | Expr::Deref(_) | Expr::ArrayAccess { .. } | Expr::MemberAccess { .. }
            ) {
                return Err(self.err("assignment target is not assignable"));
            }
            let value = self.parse_assign()?;
            return Ok(Expr::Assign {
                target: Box::new(target),
                value: Box::new(value),
            });
        }
        Ok(target)
    }

    fn parse_equality(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Some(Tok::EqEq) => TacOp::Eq,
                Some(Tok::NotEq) => TacOp::Ne,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Lt) => TacOp::Lt,
                Some(Tok::Le) => TacOp::Le,
                Some(Tok::Gt) => TacOp::Gt,
                Some(Tok::Ge) => TacOp::Ge,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => TacOp::Add,
                Some(Tok::Minus) => TacOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => TacOp::Mul,
                Some(Tok::Slash) => TacOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Some(Tok::Minus) => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::Unary {
                    op: TacOp::Neg,
                    operand: Box::new(operand),
                })
            }
            Some(Tok::Star) => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::Deref(Box::new(operand)))
            }
            Some(Tok::Amp) => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::AddressOf(Box::new(operand)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Tok::LParen) => {
                    let name = match &expr {
                        Expr::Ident(name) => name.clone(),
                        _ => return Err(self.err("only simple names can be called")),
                    };
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(&Tok::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if !self.eat(&Tok::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(&Tok::RParen, "')' after arguments")?;
                    expr = Expr::Call { name, args };
                }
                Some(Tok::LBracket) => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(&Tok::RBracket, "']'")?;
                    expr = Expr::ArrayAccess {
                        array: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Some(Tok::Dot) => {
                    self.advance();
                    let member = self.expect_ident("member name after '.'")?;
                    expr = Expr::MemberAccess {
                        object: Box::new(expr),
                        member,
                        through_pointer: false,
                    };
                }
                Some(Tok::Arrow) => {
                    self.advance();
                    let member = self.expect_ident("member name after '->'")?;
                    expr = Expr::MemberAccess {
                        object: Box::new(expr),
                        member,
                        through_pointer: true,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        let unexpected = self.err("expected an expression");
        match self.peek() {
            Some(Tok::LParen) => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&Tok::RParen, "')'")?;
                Ok(expr)
            }
            Some(Tok::Int(_) | Tok::CharLit(_) | Tok::Str(_) | Tok::Ident(_)) => {
                match self.advance() {
                    Some(Tok::Int(n)) => Ok(Expr::ConstInt(n)),
                    Some(Tok::CharLit(c)) => Ok(Expr::ConstChar(c)),
                    Some(Tok::Str(s)) => Ok(Expr::StringLit(s)),
                    Some(Tok::Ident(name)) => Ok(Expr::Ident(name)),
                    _ => Err(unexpected),
                }
            }
            _ => Err(unexpected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Program {
        Parser::new(source).unwrap().parse().unwrap()
    }

    #[test]
    fn parse_global_and_function() {
        let program = parse(
            r#"
int counter;

int main() {
    counter = 3;
    output counter;
    return 0;
}
"#,
        );
        assert_eq!(program.decls.len(), 2);
        assert!(matches!(&program.decls[0], Decl::Var(v) if v.name == "counter"));
        let main = program.find_func("main").unwrap();
        assert_eq!(main.body.as_ref().unwrap().len(), 3);
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let program = parse("int main() { int a; a = 1 + 2 * 3; }");
        let body = program.find_func("main").unwrap().body.as_ref().unwrap();
        let Stmt::Expr(Expr::Assign { value, .. }) = &body[1] else {
            panic!("expected assignment");
        };
        let Expr::Binary { op: TacOp::Add, right, .. } = value.as_ref() else {
            panic!("expected addition at the top");
        };
        assert!(matches!(right.as_ref(), Expr::Binary { op: TacOp::Mul, .. }));
    }

    #[test]
    fn relational_binds_tighter_than_equality() {
        let program = parse("int main() { int a; a = 1 == 2 < 3; }");
        let body = program.find_func("main").unwrap().body.as_ref().unwrap();
        let Stmt::Expr(Expr::Assign { value, .. }) = &body[1] else {
            panic!("expected assignment");
        };
        assert!(matches!(value.as_ref(), Expr::Binary { op: TacOp::Eq, .. }));
    }

    #[test]
    fn parse_control_flow() {
        let program = parse(
            r#"
int main() {
    int i;
    for (i = 0; i < 3; i = i + 1) output i;
    while (1) { break; }
    if (i == 3) output 1; else output 2;
}
"#,
        );
        let body = program.find_func("main").unwrap().body.as_ref().unwrap();
        assert!(matches!(&body[1], Stmt::For { .. }));
        assert!(matches!(&body[2], Stmt::While { .. }));
        assert!(matches!(&body[3], Stmt::If { else_branch: Some(_), .. }));
    }

    #[test]
    fn parse_switch_cases() {
        let program = parse(
            r#"
int main() {
    int x;
    switch (x) {
        case 1: output 10; break;
        case -2: output 20; break;
        default: output 0;
    }
}
"#,
        );
        let body = program.find_func("main").unwrap().body.as_ref().unwrap();
        let Stmt::Switch { body: switch_body, .. } = &body[1] else {
            panic!("expected switch");
        };
        let Stmt::Block(stmts) = switch_body.as_ref() else {
            panic!("expected block body");
        };
        assert_eq!(stmts[0], Stmt::Case(1));
        assert_eq!(stmts[3], Stmt::Case(-2));
        assert_eq!(stmts[6], Stmt::Default);
    }

    #[test]
    fn parse_declarators() {
        let program = parse(
            r#"
struct point { int x; int y; };
int grid[5][10];
char *name;
int add(int a, int b) { return a + b; }
"#,
        );
        let Decl::Struct(s) = &program.decls[0] else {
            panic!("expected struct");
        };
        assert_eq!(s.fields.len(), 2);

        let Decl::Var(grid) = &program.decls[1] else {
            panic!("expected var");
        };
        assert_eq!(grid.ty.array_dims(), vec![5, 10]);

        let Decl::Var(name) = &program.decls[2] else {
            panic!("expected var");
        };
        assert!(name.ty.is_pointer());

        let add = program.find_func("add").unwrap();
        assert_eq!(add.params.len(), 2);
    }

    #[test]
    fn parse_pointer_expressions() {
        let program = parse("int main() { int x; int *p; p = &x; *p = 4; output *p; }");
        let body = program.find_func("main").unwrap().body.as_ref().unwrap();
        assert!(matches!(
            &body[2],
            Stmt::Expr(Expr::Assign { value, .. }) if matches!(value.as_ref(), Expr::AddressOf(_))
        ));
        assert!(matches!(
            &body[3],
            Stmt::Expr(Expr::Assign { target, .. }) if matches!(target.as_ref(), Expr::Deref(_))
        ));
    }

    #[test]
    fn char_and_string_literals() {
        let program = parse(r#"int main() { char c; c = '\n'; output "hi\n"; }"#);
        let body = program.find_func("main").unwrap().body.as_ref().unwrap();
        assert!(matches!(
            &body[1],
            Stmt::Expr(Expr::Assign { value, .. }) if **value == Expr::ConstChar('\n')
        ));
        // Escapes in strings stay raw for the backend.
        assert!(matches!(
            &body[2],
            Stmt::Output(Expr::StringLit(s)) if s == "hi\\n"
        ));
    }

    #[test]
    fn comments_are_skipped() {
        let program = parse(
            r#"
// leading comment
int main() {
    /* block
       comment */
    return 0;
}
"#,
        );
        assert!(program.find_func("main").is_some());
    }

    #[test]
    fn errors_carry_line_numbers() {
        let err = Parser::new("int main() {\n  output 1\n}").unwrap().parse().unwrap_err();
        assert!(err.contains("line 3"), "unexpected error: {}", err);

        let err = Parser::new("int main() { 3 = x; }").unwrap().parse().unwrap_err();
        assert!(err.contains("not assignable"), "unexpected error: {}", err);

        assert!(Parser::new("char c = 'x").is_err());
        assert!(Parser::new("\"unterminated").is_err());
    }

    #[test]
    fn forward_declaration_has_no_body() {
        let program = parse("int helper(int a); int main() { return helper(1); }");
        let helper = program.find_func("helper").unwrap();
        assert!(helper.body.is_none());
    }
}
