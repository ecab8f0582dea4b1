// Tue Jan 13 2026 - Alex

use super::error::PatternError;
use super::token::{tokenize_instruction, Token, TokenKind};
use crate::analysis::Instruction;

/// Matches tokenized instruction text against a tokenized pattern.
///
/// The mnemonic comparison lets the instruction carry an extra `.w` suffix
/// that the pattern lacks, never the other way around. Past the mnemonic a
/// `?` stands for exactly one token, so it never spans a bracketed operand.
pub fn matches(instruction: &[Token], pattern: &[Token]) -> bool {
    let (Some(mnemonic), Some(wanted)) = (instruction.first(), pattern.first()) else {
        return false;
    };

    if pattern.len() == 1 && wanted.is_wildcard() {
        return true;
    }

    let same_mnemonic = mnemonic.text == wanted.text
        || mnemonic
            .text
            .strip_suffix(".w")
            .map_or(false, |base| base == wanted.text);
    if !same_mnemonic {
        return false;
    }

    if pattern.len() == 1 || (pattern.len() == 2 && pattern[1].is_wildcard()) {
        return true;
    }

    if instruction.len() != pattern.len() {
        return false;
    }

    instruction[1..]
        .iter()
        .zip(&pattern[1..])
        .all(|(actual, expected)| token_matches(actual, expected))
}

fn token_matches(actual: &Token, expected: &Token) -> bool {
    if expected.is_wildcard() {
        return true;
    }
    if expected.is_register_wildcard() {
        return actual.text.starts_with('r');
    }
    if actual.text == expected.text {
        return true;
    }
    actual.kind == TokenKind::Number
        && expected.kind == TokenKind::Number
        && actual.value.is_some()
        && actual.value == expected.value
}

/// Convenience wrapper tokenizing both sides.
pub fn matches_text(instruction: &str, pattern: &str) -> Result<bool, PatternError> {
    Ok(matches(&tokenize_instruction(instruction)?, &tokenize_instruction(pattern)?))
}

/// A `;`-separated sequence of instruction patterns matched against
/// consecutive instructions.
#[derive(Debug, Clone)]
pub struct InstructionPattern {
    source: String,
    parts: Vec<Vec<Token>>,
}

impl InstructionPattern {
    pub fn parse(source: &str) -> Result<Self, PatternError> {
        let parts = source
            .split(';')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(tokenize_instruction)
            .collect::<Result<Vec<_>, _>>()?;

        if parts.is_empty() {
            return Err(PatternError::Empty);
        }

        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Whether `run` starts with instructions matching every part in order.
    pub fn matches_run<'a, I>(&self, run: I) -> bool
    where
        I: IntoIterator<Item = &'a Instruction>,
    {
        let mut run = run.into_iter();
        self.parts.iter().all(|part| match run.next() {
            Some(instr) => match tokenize_instruction(&instr.text()) {
                Ok(tokens) => matches(&tokens, part),
                Err(_) => false,
            },
            None => false,
        })
    }
}
