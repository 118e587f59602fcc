//! Tokenizer for the expression language

use crate::ParseError;

/// Lexical tokens
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    /// `#name`
    Variable(String),
    Integer(i64),
    Decimal(f64),
    Str(String),
    True,
    False,
    Null,
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Plus,
    Minus,
    Not,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Matches,
    Eof,
}

/// A token with the character offset where it starts
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// Split an expression into tokens. The result always ends with `Eof`.
///
/// # Errors
///
/// Returns an error on unterminated strings, malformed numbers, and
/// characters outside the language.
pub fn tokenize(input: &str) -> Result<Vec<Spanned>, ParseError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        let start = pos;

        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        let token = match c {
            '.' => {
                pos += 1;
                Token::Dot
            }
            '[' => {
                pos += 1;
                Token::LBracket
            }
            ']' => {
                pos += 1;
                Token::RBracket
            }
            '(' => {
                pos += 1;
                Token::LParen
            }
            ')' => {
                pos += 1;
                Token::RParen
            }
            '+' => {
                pos += 1;
                Token::Plus
            }
            '-' => {
                pos += 1;
                Token::Minus
            }
            '!' if chars.get(pos + 1) == Some(&'=') => {
                pos += 2;
                Token::Ne
            }
            '!' => {
                pos += 1;
                Token::Not
            }
            '=' if chars.get(pos + 1) == Some(&'=') => {
                pos += 2;
                Token::Eq
            }
            '<' if chars.get(pos + 1) == Some(&'=') => {
                pos += 2;
                Token::Le
            }
            '<' => {
                pos += 1;
                Token::Lt
            }
            '>' if chars.get(pos + 1) == Some(&'=') => {
                pos += 2;
                Token::Ge
            }
            '>' => {
                pos += 1;
                Token::Gt
            }
            '&' if chars.get(pos + 1) == Some(&'&') => {
                pos += 2;
                Token::And
            }
            '|' if chars.get(pos + 1) == Some(&'|') => {
                pos += 2;
                Token::Or
            }
            '\'' | '"' => {
                let (text, next) = read_string(&chars, pos)?;
                pos = next;
                Token::Str(text)
            }
            '#' => {
                pos += 1;
                let name = read_ident(&chars, &mut pos);
                if name.is_empty() {
                    return Err(ParseError::new("Expected variable name after '#'", start));
                }
                Token::Variable(name)
            }
            c if c.is_ascii_digit() => {
                let (token, next) = read_number(&chars, pos)?;
                pos = next;
                token
            }
            c if is_ident_start(c) => {
                let word = read_ident(&chars, &mut pos);
                match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "matches" => Token::Matches,
                    _ => Token::Ident(word),
                }
            }
            other => {
                return Err(ParseError::new(
                    format!("Unexpected character '{other}'"),
                    start,
                ));
            }
        };

        tokens.push(Spanned {
            token,
            offset: start,
        });
    }

    tokens.push(Spanned {
        token: Token::Eof,
        offset: chars.len(),
    });
    Ok(tokens)
}

/// Whether a name can be written as a bare identifier
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    is_ident_start(first)
        && chars.all(is_ident_part)
        && !matches!(
            name,
            "true" | "false" | "null" | "and" | "or" | "not" | "matches"
        )
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn read_ident(chars: &[char], pos: &mut usize) -> String {
    let start = *pos;
    if *pos < chars.len() && is_ident_start(chars[*pos]) {
        *pos += 1;
        while *pos < chars.len() && is_ident_part(chars[*pos]) {
            *pos += 1;
        }
    }
    chars[start..*pos].iter().collect()
}

/// Quoted string; the quote character is escaped by doubling it
fn read_string(chars: &[char], start: usize) -> Result<(String, usize), ParseError> {
    let quote = chars[start];
    let mut pos = start + 1;
    let mut text = String::new();

    while pos < chars.len() {
        let c = chars[pos];
        if c == quote {
            if chars.get(pos + 1) == Some(&quote) {
                text.push(quote);
                pos += 2;
                continue;
            }
            return Ok((text, pos + 1));
        }
        text.push(c);
        pos += 1;
    }

    Err(ParseError::new("Unterminated string literal", start))
}

fn read_number(chars: &[char], start: usize) -> Result<(Token, usize), ParseError> {
    let mut pos = start;
    while pos < chars.len() && chars[pos].is_ascii_digit() {
        pos += 1;
    }

    // A dot only belongs to the number when a digit follows it
    let is_decimal = chars.get(pos) == Some(&'.')
        && chars.get(pos + 1).is_some_and(char::is_ascii_digit);
    if is_decimal {
        pos += 1;
        while pos < chars.len() && chars[pos].is_ascii_digit() {
            pos += 1;
        }
    }

    let text: String = chars[start..pos].iter().collect();
    let token = if is_decimal {
        Token::Decimal(
            text.parse()
                .map_err(|_| ParseError::new(format!("Invalid number '{text}'"), start))?,
        )
    } else {
        Token::Integer(
            text.parse()
                .map_err(|_| ParseError::new(format!("Integer '{text}' is too large"), start))?,
        )
    };
    Ok((token, pos))
}
