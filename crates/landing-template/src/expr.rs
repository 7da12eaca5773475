//! Expression syntax: tokenizer, AST and recursive-descent parser.
//!
//! Precedence from loosest to tightest:
//!
//! | Level          | Operators                                   |
//! |----------------|---------------------------------------------|
//! | ternary        | `c ? a : b`                                 |
//! | or             | `or`, `\|\|`                                |
//! | and            | `and`, `&&`                                 |
//! | comparison     | `== != < > <= >= in not in contains`        |
//! | range          | `a..b`                                      |
//! | additive       | `+ - ~`                                     |
//! | multiplicative | `* / %`                                     |
//! | unary          | `not ! - +`                                 |
//! | postfix        | `.name`, `[expr]`, `\| filter(args)`        |
//!
//! Filters accept arguments either in parentheses or Liquid style after a
//! colon (`x | truncatewords: 5, "…"`).

use std::fmt;

use crate::value::Value;

const SYMBOLS: &[&str] = &[
    "..", "==", "!=", "<=", ">=", "&&", "||", "<", ">", "+", "-", "*", "/", "%", "~", "!", "?",
    ":", ",", ".", "|", "(", ")", "[", "]", "{", "}", "=",
];

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Sym(&'static str),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(s) => write!(f, "`{s}`"),
            Self::Int(i) => write!(f, "`{i}`"),
            Self::Float(x) => write!(f, "`{x}`"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Sym(s) => write!(f, "`{s}`"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Contains,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Concat,
}

/// Parsed expression.
#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Literal(Value),
    Var(String),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Filter {
        subject: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Range(Box<Expr>, Box<Expr>),
    Array(Vec<Expr>),
    Map(Vec<(String, Expr)>),
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let is_float = i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit();
            if is_float {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().collect();
            tokens.push(if is_float {
                Token::Float(text.parse().map_err(|_| format!("bad number `{text}`"))?)
            } else {
                Token::Int(text.parse().map_err(|_| format!("bad number `{text}`"))?)
            });
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else if c == '"' || c == '\'' {
            let (text, next) = read_string(&chars, i)?;
            tokens.push(Token::Str(text));
            i = next;
        } else {
            let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
            let Some(sym) = SYMBOLS.iter().find(|sym| rest.starts_with(**sym)) else {
                return Err(format!("unexpected character `{c}`"));
            };
            tokens.push(Token::Sym(sym));
            i += sym.len();
        }
    }

    Ok(tokens)
}

fn read_string(chars: &[char], start: usize) -> Result<(String, usize), String> {
    let quote = chars[start];
    let mut text = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            c if c == quote => return Ok((text, i + 1)),
            '\\' if i + 1 < chars.len() => {
                i += 1;
                text.push(match chars[i] {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
            }
            c => text.push(c),
        }
        i += 1;
    }
    Err("unterminated string".to_owned())
}

/// Parse a complete expression.
pub(crate) fn parse(source: &str) -> Result<Expr, String> {
    let mut parser = Parser::new(source)?;
    let expr = parser.parse_expr()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Token cursor shared by expression and tag-header parsing.
pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    no_filters: bool,
}

impl Parser {
    pub(crate) fn new(source: &str) -> Result<Self, String> {
        Ok(Self {
            tokens: tokenize(source)?,
            pos: 0,
            no_filters: false,
        })
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub(crate) fn expect_end(&self) -> Result<(), String> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(format!("unexpected {token}")),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn peek_sym(&self, sym: &str) -> bool {
        matches!(self.peek(), Some(Token::Sym(s)) if *s == sym)
    }

    pub(crate) fn eat_sym(&mut self, sym: &str) -> bool {
        let found = self.peek_sym(sym);
        if found {
            self.pos += 1;
        }
        found
    }

    pub(crate) fn expect_sym(&mut self, sym: &str) -> Result<(), String> {
        if self.eat_sym(sym) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("`{sym}`")))
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s == keyword)
    }

    pub(crate) fn eat_keyword(&mut self, keyword: &str) -> bool {
        let found = self.peek_keyword(keyword);
        if found {
            self.pos += 1;
        }
        found
    }

    pub(crate) fn expect_ident(&mut self) -> Result<String, String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected("a name")),
        }
    }

    /// Whether the next two tokens are `name =`.
    pub(crate) fn at_assignment(&self) -> bool {
        matches!(self.peek(), Some(Token::Ident(_)))
            && matches!(self.peek_at(1), Some(Token::Sym("=")))
    }

    fn unexpected(&self, wanted: &str) -> String {
        match self.peek() {
            Some(token) => format!("expected {wanted}, found {token}"),
            None => format!("expected {wanted}, found end of expression"),
        }
    }

    pub(crate) fn parse_expr(&mut self) -> Result<Expr, String> {
        let condition = self.parse_or()?;
        if !self.eat_sym("?") {
            return Ok(condition);
        }
        let then = self.parse_expr()?;
        self.expect_sym(":")?;
        let otherwise = self.parse_expr()?;
        Ok(Expr::Ternary(
            Box::new(condition),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    /// Parse an expression without a top-level ternary, as used for filter
    /// arguments after a colon and `for` options.
    pub(crate) fn parse_or(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("or") || self.eat_sym("||") {
            let right = self.parse_and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_comparison()?;
        while self.eat_keyword("and") || self.eat_sym("&&") {
            let right = self.parse_comparison()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_range()?;
        loop {
            let op = if self.eat_sym("==") {
                BinaryOp::Eq
            } else if self.eat_sym("!=") {
                BinaryOp::Ne
            } else if self.eat_sym("<=") {
                BinaryOp::Le
            } else if self.eat_sym(">=") {
                BinaryOp::Ge
            } else if self.eat_sym("<") {
                BinaryOp::Lt
            } else if self.eat_sym(">") {
                BinaryOp::Gt
            } else if self.eat_keyword("in") {
                BinaryOp::In
            } else if self.eat_keyword("contains") {
                BinaryOp::Contains
            } else if self.peek_keyword("not")
                && matches!(self.peek_at(1), Some(Token::Ident(s)) if s == "in")
            {
                self.pos += 2;
                BinaryOp::NotIn
            } else {
                return Ok(left);
            };
            let right = self.parse_range()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_range(&mut self) -> Result<Expr, String> {
        let start = self.parse_additive()?;
        if self.eat_sym("..") {
            let end = self.parse_additive()?;
            return Ok(Expr::Range(Box::new(start), Box::new(end)));
        }
        Ok(start)
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.eat_sym("+") {
                BinaryOp::Add
            } else if self.eat_sym("-") {
                BinaryOp::Sub
            } else if self.eat_sym("~") {
                BinaryOp::Concat
            } else {
                return Ok(left);
            };
            let right = self.parse_multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.eat_sym("*") {
                BinaryOp::Mul
            } else if self.eat_sym("/") {
                BinaryOp::Div
            } else if self.eat_sym("%") {
                BinaryOp::Rem
            } else {
                return Ok(left);
            };
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        let op = if self.eat_keyword("not") || self.eat_sym("!") {
            UnaryOp::Not
        } else if self.eat_sym("-") {
            UnaryOp::Neg
        } else if self.eat_sym("+") {
            UnaryOp::Pos
        } else {
            return self.parse_postfix();
        };
        Ok(Expr::Unary(op, Box::new(self.parse_unary()?)))
    }

    fn parse_postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_sym(".") {
                expr = match self.next() {
                    Some(Token::Ident(name)) => Expr::Attr(Box::new(expr), name),
                    Some(Token::Int(i)) => {
                        Expr::Index(Box::new(expr), Box::new(Expr::Literal(Value::Int(i))))
                    }
                    _ => return Err("expected a name after `.`".to_owned()),
                };
            } else if self.eat_sym("[") {
                let key = self.nested(Self::parse_expr)?;
                self.expect_sym("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(key));
            } else if !self.no_filters && self.eat_sym("|") {
                let name = self.expect_ident()?;
                let args = if self.eat_sym("(") {
                    self.nested(|p| p.parse_list(")"))?
                } else if self.eat_sym(":") {
                    self.parse_colon_args()?
                } else {
                    Vec::new()
                };
                expr = Expr::Filter {
                    subject: Box::new(expr),
                    name,
                    args,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_colon_args(&mut self) -> Result<Vec<Expr>, String> {
        let saved = std::mem::replace(&mut self.no_filters, true);
        let mut args = Vec::new();
        let result = loop {
            match self.parse_or() {
                Ok(arg) => args.push(arg),
                Err(e) => break Err(e),
            }
            if !self.eat_sym(",") {
                break Ok(args);
            }
        };
        self.no_filters = saved;
        result
    }

    /// Run `f` with filters enabled, as inside brackets.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, String>) -> Result<T, String> {
        let saved = std::mem::replace(&mut self.no_filters, false);
        let result = f(self);
        self.no_filters = saved;
        result
    }

    /// Comma-separated expressions up to and including `close`.
    fn parse_list(&mut self, close: &str) -> Result<Vec<Expr>, String> {
        let mut items = Vec::new();
        if self.eat_sym(close) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_expr()?);
            if self.eat_sym(close) {
                return Ok(items);
            }
            self.expect_sym(",")?;
            // Trailing comma.
            if self.eat_sym(close) {
                return Ok(items);
            }
        }
    }

    fn parse_map(&mut self) -> Result<Vec<(String, Expr)>, String> {
        let mut entries = Vec::new();
        if self.eat_sym("}") {
            return Ok(entries);
        }
        loop {
            let key = match self.next() {
                Some(Token::Ident(s) | Token::Str(s)) => s,
                Some(Token::Int(i)) => i.to_string(),
                _ => return Err("expected a map key".to_owned()),
            };
            self.expect_sym(":")?;
            entries.push((key, self.parse_expr()?));
            if self.eat_sym("}") {
                return Ok(entries);
            }
            self.expect_sym(",")?;
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Int(i)) => Ok(Expr::Literal(Value::Int(i))),
            Some(Token::Float(f)) => Ok(Expr::Literal(Value::Float(f))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" | "nil" | "none" => Ok(Expr::Literal(Value::Null)),
                _ if self.eat_sym("(") => {
                    let args = self.nested(|p| p.parse_list(")"))?;
                    Ok(Expr::Call(name, args))
                }
                _ => Ok(Expr::Var(name)),
            },
            Some(Token::Sym("(")) => {
                let expr = self.nested(Self::parse_expr)?;
                self.expect_sym(")")?;
                Ok(expr)
            }
            Some(Token::Sym("[")) => Ok(Expr::Array(self.nested(|p| p.parse_list("]"))?)),
            Some(Token::Sym("{")) => Ok(Expr::Map(self.nested(Self::parse_map)?)),
            Some(token) => Err(format!("unexpected {token}")),
            None => Err("unexpected end of expression".to_owned()),
        }
    }
}
