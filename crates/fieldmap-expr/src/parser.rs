//! Recursive-descent parser producing [`Expression`]s

use std::fmt;

use fieldmap_model::Value;
use regex::Regex;

use crate::ast::{BinaryOp, Expr, Pattern, UnaryOp};
use crate::eval::{self, EvaluationContext};
use crate::lexer::{Spanned, Token, is_identifier, tokenize};
use crate::{EvalError, ParseError};

/// Deepest nesting of parentheses, brackets, and unary operators accepted
pub const MAX_NESTING: usize = 256;

/// A parsed expression together with its source text
#[derive(Debug, Clone)]
pub struct Expression {
    text: String,
    ast: Expr,
}

impl Expression {
    /// Parse an expression
    ///
    /// # Errors
    ///
    /// Returns an error when the text is empty, does not tokenize, does not
    /// follow the grammar, nests deeper than [`MAX_NESTING`], or carries an
    /// invalid literal `matches` pattern.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ParseError::new("Empty expression", 0));
        }

        let mut parser = Parser {
            tokens: tokenize(trimmed)?,
            pos: 0,
            depth: 0,
        };
        let ast = parser.parse_or()?;
        parser.expect(&Token::Eof)?;

        Ok(Self {
            text: trimmed.to_string(),
            ast,
        })
    }

    /// Expression reading a single property, for any field name
    pub fn property(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            text: property_text(&name),
            ast: Expr::Property(name),
        }
    }

    /// The normalized source text
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    /// Name of the root property when the expression is a bare property
    #[must_use]
    pub fn root_property(&self) -> Option<&str> {
        match &self.ast {
            Expr::Property(name) => Some(name),
            _ => None,
        }
    }

    /// Evaluate against a context
    ///
    /// # Errors
    ///
    /// Returns an error when evaluation fails.
    pub fn evaluate(&self, context: &EvaluationContext<'_>) -> crate::Result<Value> {
        eval::evaluate(&self.ast, context)
    }

    /// Evaluate as a guard condition: `null` counts as false.
    ///
    /// # Errors
    ///
    /// Returns an error when evaluation fails or the result is not a boolean.
    pub fn evaluate_condition(&self, context: &EvaluationContext<'_>) -> crate::Result<bool> {
        match self.evaluate(context)? {
            Value::Boolean(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(EvalError::type_mismatch(
                "condition",
                format!("{} (expected boolean)", other.kind()),
            )),
        }
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Text form of a single-property access
pub(crate) fn property_text(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        format!("['{}']", name.replace('\'', "''"))
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos].offset
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].token.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), ParseError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(ParseError::new(
                format!("Expected {}, found {}", describe(token), describe(self.peek())),
                self.offset(),
            ))
        }
    }

    /// Count one more level of nesting, failing past `MAX_NESTING`
    fn deepen(&mut self, offset: usize) -> Result<(), ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(ParseError::new("Expression nested too deeply", offset));
        }
        self.depth += 1;
        Ok(())
    }

    /// Run a nested production one level deeper
    fn nested<T>(
        &mut self,
        offset: usize,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        self.deepen(offset)?;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    // Operator chains fold into left-deep trees, so each link counts as a level

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let depth = self.depth;
        let mut left = self.parse_and()?;
        while self.peek() == &Token::Or {
            self.deepen(self.offset())?;
            self.advance();
            let right = self.parse_and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let depth = self.depth;
        let mut left = self.parse_not()?;
        while self.peek() == &Token::And {
            self.deepen(self.offset())?;
            self.advance();
            let right = self.parse_not()?;
            left = binary(BinaryOp::And, left, right);
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        let offset = self.offset();
        if self.eat(&Token::Not) {
            let operand = self.nested(offset, Self::parse_not)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_additive()?;

        let op = match self.peek() {
            Token::Eq => BinaryOp::Eq,
            Token::Ne => BinaryOp::Ne,
            Token::Lt => BinaryOp::Lt,
            Token::Le => BinaryOp::Le,
            Token::Gt => BinaryOp::Gt,
            Token::Ge => BinaryOp::Ge,
            Token::Matches => {
                self.advance();
                let offset = self.offset();
                let right = self.parse_additive()?;
                return Ok(Expr::Matches {
                    subject: Box::new(left),
                    pattern: compile_pattern(right, offset)?,
                });
            }
            _ => return Ok(left),
        };

        self.advance();
        let right = self.parse_additive()?;
        Ok(binary(op, left, right))
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let depth = self.depth;
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => {
                    self.depth = depth;
                    return Ok(left);
                }
            };
            self.deepen(self.offset())?;
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::Minus) {
            let offset = self.offset();
            let operand = self.nested(offset, Self::parse_unary)?;
            return match operand {
                Expr::Literal(Value::Integer(i)) => i
                    .checked_neg()
                    .map(|n| Expr::Literal(Value::Integer(n)))
                    .ok_or_else(|| ParseError::new("Integer literal overflows", offset)),
                Expr::Literal(Value::Decimal(d)) => Ok(Expr::Literal(Value::Decimal(-d))),
                operand => Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                }),
            };
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let depth = self.depth;
        let mut expr = self.parse_primary()?;
        loop {
            if self.peek() == &Token::Dot {
                self.deepen(self.offset())?;
                self.advance();
                let offset = self.offset();
                match self.advance() {
                    Token::Ident(name) => {
                        expr = Expr::Member {
                            target: Box::new(expr),
                            name,
                        };
                    }
                    other => {
                        return Err(ParseError::new(
                            format!("Expected property name after '.', found {}", describe(&other)),
                            offset,
                        ));
                    }
                }
            } else if self.peek() == &Token::LBracket {
                let offset = self.offset();
                self.deepen(offset)?;
                self.advance();
                let index = self.nested(offset, Self::parse_or)?;
                self.expect(&Token::RBracket)?;
                expr = Expr::Index {
                    target: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                self.depth = depth;
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let offset = self.offset();
        let expr = match self.advance() {
            Token::Integer(i) => Expr::Literal(Value::Integer(i)),
            Token::Decimal(d) => Expr::Literal(Value::Decimal(d)),
            Token::Str(s) => Expr::Literal(Value::String(s)),
            Token::True => Expr::Literal(Value::Boolean(true)),
            Token::False => Expr::Literal(Value::Boolean(false)),
            Token::Null => Expr::Literal(Value::Null),
            Token::Ident(name) => Expr::Property(name),
            Token::Variable(name) => Expr::Variable(name),
            Token::LParen => {
                let inner = self.nested(offset, Self::parse_or)?;
                self.expect(&Token::RParen)?;
                inner
            }
            // Lets `['key']` stand alone as a root property access
            Token::LBracket => {
                let key = match self.advance() {
                    Token::Str(key) => key,
                    other => {
                        return Err(ParseError::new(
                            format!("Expected quoted key after '[', found {}", describe(&other)),
                            offset + 1,
                        ));
                    }
                };
                self.expect(&Token::RBracket)?;
                Expr::Property(key)
            }
            other => {
                return Err(ParseError::new(
                    format!("Unexpected {}", describe(&other)),
                    offset,
                ));
            }
        };
        Ok(expr)
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// `matches` is a full match, as if the pattern were anchored at both ends
fn compile_pattern(right: Expr, offset: usize) -> Result<Pattern, ParseError> {
    match right {
        Expr::Literal(Value::String(pattern)) => Regex::new(&format!("^(?:{pattern})$"))
            .map(Pattern::Compiled)
            .map_err(|e| ParseError::new(format!("Invalid regular expression '{pattern}': {e}"), offset)),
        other => Ok(Pattern::Dynamic(Box::new(other))),
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Ident(name) => format!("identifier '{name}'"),
        Token::Variable(name) => format!("variable '#{name}'"),
        Token::Integer(i) => format!("number {i}"),
        Token::Decimal(d) => format!("number {d}"),
        Token::Str(s) => format!("string '{s}'"),
        Token::True => "'true'".to_string(),
        Token::False => "'false'".to_string(),
        Token::Null => "'null'".to_string(),
        Token::Dot => "'.'".to_string(),
        Token::LBracket => "'['".to_string(),
        Token::RBracket => "']'".to_string(),
        Token::LParen => "'('".to_string(),
        Token::RParen => "')'".to_string(),
        Token::Plus => "'+'".to_string(),
        Token::Minus => "'-'".to_string(),
        Token::Not => "'!'".to_string(),
        Token::And => "'&&'".to_string(),
        Token::Or => "'||'".to_string(),
        Token::Eq => "'=='".to_string(),
        Token::Ne => "'!='".to_string(),
        Token::Lt => "'<'".to_string(),
        Token::Le => "'<='".to_string(),
        Token::Gt => "'>'".to_string(),
        Token::Ge => "'>='".to_string(),
        Token::Matches => "'matches'".to_string(),
        Token::Eof => "end of expression".to_string(),
    }
}
