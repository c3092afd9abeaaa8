//! Lexer and precedence-climbing parser for template expressions.
//!
//! The accepted language is the expression subset of a scripting language
//! that templates actually use: literals (including backtick templates),
//! member and index access with optional chaining, calls, unary, binary,
//! logical and conditional operators, array and object literals, and arrow
//! functions for callbacks such as `items.filter(i => i.done)`.

use std::sync::Arc;

use super::ast::{BinaryOp, Expr, LogicalOp, TemplatePart, UnaryOp};
use crate::value::Value;

const PUNCTUATORS: &[&str] = &[
    "===", "!==", "=>", "==", "!=", "<=", ">=", "&&", "||", "??", "?.", "(", ")", "[", "]", "{",
    "}", ",", ".", "?", ":", "!", "+", "-", "*", "/", "%", "<", ">",
];

#[derive(Debug, Clone, PartialEq)]
enum Chunk {
    Str(String),
    Expr(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Str(String),
    Template(Vec<Chunk>),
    Ident(String),
    Punct(&'static str),
    Eof,
}

pub type ParseResult<T> = std::result::Result<T, String>;

// ----------------------------------------------------------------------------
// Lexer
// ----------------------------------------------------------------------------

fn tokenize(src: &str) -> ParseResult<Vec<Token>> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && matches!(chars[i], 'e' | 'E') {
                i += 1;
                if i < chars.len() && matches!(chars[i], '+' | '-') {
                    i += 1;
                }
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().collect();
            let n = text
                .parse::<f64>()
                .map_err(|_| format!("invalid number `{text}`"))?;
            tokens.push(Token::Num(n));
            continue;
        }

        if c == '"' || c == '\'' {
            let (text, end) = lex_string(&chars, i + 1, c)?;
            tokens.push(Token::Str(text));
            i = end;
            continue;
        }

        if c == '`' {
            let (chunks, end) = lex_template(&chars, i + 1)?;
            tokens.push(Token::Template(chunks));
            i = end;
            continue;
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }

        let punct = PUNCTUATORS.iter().find(|p| {
            p.chars()
                .enumerate()
                .all(|(k, pc)| chars.get(i + k) == Some(&pc))
        });
        match punct {
            // `a?.5:b` is a conditional, not optional chaining
            Some(&"?.") if chars.get(i + 2).is_some_and(char::is_ascii_digit) => {
                tokens.push(Token::Punct("?"));
                i += 1;
            }
            Some(p) => {
                tokens.push(Token::Punct(*p));
                i += p.chars().count();
            }
            None => return Err(format!("unexpected character `{c}`")),
        }
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

fn lex_escape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        other => other,
    }
}

fn lex_string(chars: &[char], mut i: usize, quote: char) -> ParseResult<(String, usize)> {
    let mut out = String::new();
    while i < chars.len() {
        match chars[i] {
            c if c == quote => return Ok((out, i + 1)),
            '\\' if i + 1 < chars.len() => {
                out.push(lex_escape(chars[i + 1]));
                i += 2;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err("unterminated string literal".to_string())
}

fn lex_template(chars: &[char], mut i: usize) -> ParseResult<(Vec<Chunk>, usize)> {
    let mut chunks = Vec::new();
    let mut text = String::new();

    while i < chars.len() {
        match chars[i] {
            '`' => {
                if !text.is_empty() {
                    chunks.push(Chunk::Str(text));
                }
                return Ok((chunks, i + 1));
            }
            '\\' if i + 1 < chars.len() => {
                text.push(lex_escape(chars[i + 1]));
                i += 2;
            }
            '$' if chars.get(i + 1) == Some(&'{') => {
                if !text.is_empty() {
                    chunks.push(Chunk::Str(std::mem::take(&mut text)));
                }
                let start = i + 2;
                let mut depth = 1;
                let mut j = start;
                while j < chars.len() {
                    match chars[j] {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    j += 1;
                }
                if depth != 0 {
                    return Err("unterminated `${` in template literal".to_string());
                }
                chunks.push(Chunk::Expr(chars[start..j].iter().collect()));
                i = j + 1;
            }
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    Err("unterminated template literal".to_string())
}

// ----------------------------------------------------------------------------
// Parser
// ----------------------------------------------------------------------------

fn binary_op(token: &Token) -> Option<(u8, BinOrLogical)> {
    let Token::Punct(p) = token else {
        return None;
    };
    let op = match *p {
        "??" => (1, BinOrLogical::Logical(LogicalOp::Nullish)),
        "||" => (2, BinOrLogical::Logical(LogicalOp::Or)),
        "&&" => (3, BinOrLogical::Logical(LogicalOp::And)),
        "==" => (4, BinOrLogical::Binary(BinaryOp::Eq)),
        "!=" => (4, BinOrLogical::Binary(BinaryOp::Ne)),
        "===" => (4, BinOrLogical::Binary(BinaryOp::StrictEq)),
        "!==" => (4, BinOrLogical::Binary(BinaryOp::StrictNe)),
        "<" => (5, BinOrLogical::Binary(BinaryOp::Lt)),
        "<=" => (5, BinOrLogical::Binary(BinaryOp::Le)),
        ">" => (5, BinOrLogical::Binary(BinaryOp::Gt)),
        ">=" => (5, BinOrLogical::Binary(BinaryOp::Ge)),
        "+" => (6, BinOrLogical::Binary(BinaryOp::Add)),
        "-" => (6, BinOrLogical::Binary(BinaryOp::Sub)),
        "*" => (7, BinOrLogical::Binary(BinaryOp::Mul)),
        "/" => (7, BinOrLogical::Binary(BinaryOp::Div)),
        "%" => (7, BinOrLogical::Binary(BinaryOp::Mod)),
        _ => return None,
    };
    Some(op)
}

#[derive(Clone, Copy)]
enum BinOrLogical {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&Token::Eof)
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(self.peek(), Token::Punct(q) if *q == p)
    }

    fn eat(&mut self, p: &str) -> bool {
        if self.is_punct(p) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, p: &str) -> ParseResult<()> {
        if self.eat(p) {
            Ok(())
        } else {
            Err(format!("expected `{p}`, found {}", describe(self.peek())))
        }
    }

    fn expression(&mut self) -> ParseResult<Expr> {
        if self.arrow_ahead() {
            return self.arrow();
        }

        let test = self.binary(0)?;
        if !self.eat("?") {
            return Ok(test);
        }
        let consequent = self.expression()?;
        self.expect(":")?;
        let alternate = self.expression()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn arrow_ahead(&self) -> bool {
        let is_arrow = |t: &Token| matches!(t, Token::Punct("=>"));
        match self.peek() {
            Token::Ident(_) => is_arrow(self.peek_at(1)),
            Token::Punct("(") => {
                let mut k = 1;
                if matches!(self.peek_at(k), Token::Punct(")")) {
                    return is_arrow(self.peek_at(k + 1));
                }
                loop {
                    if !matches!(self.peek_at(k), Token::Ident(_)) {
                        return false;
                    }
                    k += 1;
                    match self.peek_at(k) {
                        Token::Punct(",") => k += 1,
                        Token::Punct(")") => return is_arrow(self.peek_at(k + 1)),
                        _ => return false,
                    }
                }
            }
            _ => false,
        }
    }

    fn arrow(&mut self) -> ParseResult<Expr> {
        let mut params = Vec::new();
        if self.eat("(") {
            while !self.eat(")") {
                if let Token::Ident(name) = self.next() {
                    params.push(name);
                }
                self.eat(",");
            }
        } else if let Token::Ident(name) = self.next() {
            params.push(name);
        }
        self.expect("=>")?;
        let body = self.expression()?;
        Ok(Expr::Arrow {
            params,
            body: Arc::new(body),
        })
    }

    fn binary(&mut self, min_prec: u8) -> ParseResult<Expr> {
        let mut left = self.unary()?;

        while let Some((prec, op)) = binary_op(self.peek()) {
            if prec < min_prec {
                break;
            }
            self.pos += 1;
            let right = self.binary(prec + 1)?;
            left = match op {
                BinOrLogical::Binary(op) => Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                BinOrLogical::Logical(op) => Expr::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        let op = match self.peek() {
            Token::Punct("!") => UnaryOp::Not,
            Token::Punct("-") => UnaryOp::Neg,
            Token::Punct("+") => UnaryOp::Plus,
            Token::Ident(name) if name == "typeof" => UnaryOp::TypeOf,
            _ => return self.postfix(),
        };
        self.pos += 1;
        let expr = self.unary()?;
        Ok(Expr::Unary {
            op,
            expr: Box::new(expr),
        })
    }

    fn postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;

        loop {
            if self.eat(".") {
                let property = self.property_name()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                    optional: false,
                };
            } else if self.eat("?.") {
                expr = if self.eat("(") {
                    Expr::Call {
                        callee: Box::new(expr),
                        args: self.arguments()?,
                        optional: true,
                    }
                } else if self.eat("[") {
                    let index = self.expression()?;
                    self.expect("]")?;
                    Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        optional: true,
                    }
                } else {
                    Expr::Member {
                        object: Box::new(expr),
                        property: self.property_name()?,
                        optional: true,
                    }
                };
            } else if self.eat("[") {
                let index = self.expression()?;
                self.expect("]")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                    optional: false,
                };
            } else if self.eat("(") {
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args: self.arguments()?,
                    optional: false,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn property_name(&mut self) -> ParseResult<String> {
        match self.next() {
            Token::Ident(name) => Ok(name),
            other => Err(format!("expected property name, found {}", describe(&other))),
        }
    }

    /// Arguments after an opening `(`, through the closing `)`.
    fn arguments(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        while !self.eat(")") {
            args.push(self.expression()?);
            if !self.eat(",") {
                self.expect(")")?;
                break;
            }
        }
        Ok(args)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        match self.next() {
            Token::Num(n) => Ok(Expr::Literal(Value::Number(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Template(chunks) => {
                let parts = chunks
                    .into_iter()
                    .map(|chunk| match chunk {
                        Chunk::Str(s) => Ok(TemplatePart::Str(s)),
                        Chunk::Expr(src) => parse(&src).map(TemplatePart::Expr),
                    })
                    .collect::<ParseResult<Vec<_>>>()?;
                Ok(Expr::Template(parts))
            }
            Token::Ident(name) => Ok(match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" => Expr::Literal(Value::Null),
                "undefined" => Expr::Literal(Value::Undefined),
                _ => Expr::Ident(name),
            }),
            Token::Punct("(") => {
                let expr = self.expression()?;
                self.expect(")")?;
                Ok(expr)
            }
            Token::Punct("[") => {
                let mut items = Vec::new();
                while !self.eat("]") {
                    items.push(self.expression()?);
                    if !self.eat(",") {
                        self.expect("]")?;
                        break;
                    }
                }
                Ok(Expr::Array(items))
            }
            Token::Punct("{") => self.object(),
            other => Err(format!("unexpected {}", describe(&other))),
        }
    }

    fn object(&mut self) -> ParseResult<Expr> {
        let mut entries = Vec::new();
        while !self.eat("}") {
            let key = match self.next() {
                Token::Ident(name) => name,
                Token::Str(s) => s,
                Token::Num(n) => crate::value::format_number(n),
                other => return Err(format!("expected object key, found {}", describe(&other))),
            };
            let value = if self.eat(":") {
                self.expression()?
            } else {
                Expr::Ident(key.clone())
            };
            entries.push((key, value));
            if !self.eat(",") {
                self.expect("}")?;
                break;
            }
        }
        Ok(Expr::Object(entries))
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Num(n) => format!("number {n}"),
        Token::Str(s) => format!("string {s:?}"),
        Token::Template(_) => "template literal".to_string(),
        Token::Ident(name) => format!("`{name}`"),
        Token::Punct(p) => format!("`{p}`"),
        Token::Eof => "end of expression".to_string(),
    }
}

/// Parse a complete expression.
pub fn parse(src: &str) -> ParseResult<Expr> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expression()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(format!("unexpected {} after expression", describe(other))),
    }
}
