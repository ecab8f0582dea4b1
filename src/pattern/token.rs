// Tue Jan 13 2026 - Alex

use super::error::PatternError;
use crate::analysis::parse_number;
use std::fmt;

const OPERATORS: &str = "+-*/=!<>&|^~%#:?.$@;";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Bracket,
    Separator,
    Operator,
    Text,
    Number,
}

/// A lexical token. `value` is set for numbers only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub value: Option<i64>,
    pub quoted: bool,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            value: None,
            quoted: false,
        }
    }

    fn number(text: String, value: i64) -> Self {
        Self {
            kind: TokenKind::Number,
            text,
            value: Some(value),
            quoted: false,
        }
    }

    pub fn is(&self, kind: TokenKind, text: &str) -> bool {
        self.kind == kind && self.text == text
    }

    pub fn is_wildcard(&self) -> bool {
        self.text == "?" && !self.quoted
    }

    pub fn is_register_wildcard(&self) -> bool {
        self.text == "r?" && !self.quoted
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.quoted {
            write!(f, "\"{}\"", self.text)
        } else {
            write!(f, "{}", self.text)
        }
    }
}

/// Splits `input` into tokens.
///
/// Names are `[A-Za-z_][A-Za-z0-9_.]*`, numbers are decimal (optionally signed)
/// or `0x` hex, strings are double-quoted with `\"` standing for a quote.
pub fn tokenize(input: &str) -> Result<Vec<Token>, PatternError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::new(TokenKind::Text, chars[start..i].iter().collect::<String>()));
            continue;
        }

        let signed_number = c == '-'
            && chars.get(i + 1).map_or(false, |n| n.is_ascii_digit())
            && !ends_operand(tokens.last());
        if c.is_ascii_digit() || signed_number {
            let start = i;
            i += 1;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let value = parse_number(&text).ok_or_else(|| PatternError::InvalidNumber(text.clone()))?;
            tokens.push(Token::number(text, value));
            continue;
        }

        if c == '"' {
            let start = i;
            let mut text = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err(PatternError::UnterminatedString(start + 1)),
                    Some('\\') if chars.get(i + 1) == Some(&'"') => {
                        text.push('"');
                        i += 2;
                    }
                    Some('"') => {
                        i += 1;
                        break;
                    }
                    Some(&other) => {
                        text.push(other);
                        i += 1;
                    }
                }
            }
            let mut token = Token::new(TokenKind::Text, text);
            token.quoted = true;
            tokens.push(token);
            continue;
        }

        let kind = match c {
            '[' | ']' | '{' | '}' | '(' | ')' => TokenKind::Bracket,
            ',' => TokenKind::Separator,
            _ if OPERATORS.contains(c) => TokenKind::Operator,
            _ => return Err(PatternError::Syntax { column: i + 1, character: c }),
        };
        tokens.push(Token::new(kind, c.to_string()));
        i += 1;
    }

    Ok(tokens)
}

/// Tokenizer used on both sides of an instruction match: lowercases, drops `#`
/// and folds `r` followed by `?` into the `r?` register wildcard.
pub fn tokenize_instruction(input: &str) -> Result<Vec<Token>, PatternError> {
    let cleaned: String = input.to_lowercase().chars().filter(|&c| c != '#').collect();
    let raw = tokenize(&cleaned)?;

    let mut tokens: Vec<Token> = Vec::with_capacity(raw.len());
    for token in raw {
        if token.is(TokenKind::Operator, "?") {
            if let Some(last) = tokens.last_mut() {
                if last.is(TokenKind::Text, "r") {
                    last.text = "r?".to_string();
                    continue;
                }
            }
        }
        tokens.push(token);
    }
    Ok(tokens)
}

// A '-' after a value is subtraction, not a sign.
fn ends_operand(previous: Option<&Token>) -> bool {
    match previous {
        Some(t) => matches!(t.kind, TokenKind::Number | TokenKind::Text) || t.is(TokenKind::Bracket, ")"),
        None => false,
    }
}
